use std::io::Write;

use price_scan::config::EngineConfig;
use price_scan::error::EngineError;
use price_scan::point::{Point, parse_timestamp};
use price_scan::PriceEngine;

fn ts(s: &str) -> chrono::DateTime<chrono::Utc> {
    parse_timestamp(s).unwrap()
}

fn ndjson(points: &[(&str, f64)]) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    for (t, price) in points {
        writeln!(file, "{{\"timestamp\":\"{}\",\"price\":{}}}", t, price).unwrap();
    }
    file.flush().unwrap();
    file
}

/// Minute series with a deterministic zig-zag price.
fn minute_series(n: usize) -> (tempfile::NamedTempFile, Vec<Point>) {
    let base = ts("2025-01-01T00:00:00Z");
    let mut file = tempfile::NamedTempFile::new().unwrap();
    let mut points = Vec::with_capacity(n);
    for i in 0..n {
        let t = base + chrono::Duration::minutes(i as i64);
        let price = 100.0 + ((i * 37) % 23) as f64 + (i as f64) * 0.01;
        writeln!(
            file,
            "{{\"timestamp\":\"{}\",\"price\":{}}}",
            t.to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
            price
        )
        .unwrap();
        points.push(Point::new(t, price));
    }
    file.flush().unwrap();
    (file, points)
}

fn small_stride() -> EngineConfig {
    EngineConfig {
        index_stride: 16,
        ..EngineConfig::default()
    }
}

#[test]
fn simple_two_point_scenario() {
    let file = ndjson(&[("2024-01-01T09:00:00Z", 100.0), ("2024-01-01T10:00:00Z", 120.0)]);
    let engine = PriceEngine::open(file.path(), EngineConfig::default()).unwrap();
    let report = engine
        .compute_profit(ts("2024-01-01T09:00:00Z"), ts("2024-01-01T10:00:00Z"), 1000.0)
        .unwrap();
    assert_eq!(report.buy_time, ts("2024-01-01T09:00:00Z"));
    assert_eq!(report.sell_time, ts("2024-01-01T10:00:00Z"));
    assert_eq!(report.num_shares, 10.0);
    assert_eq!(report.profit, 200.0);
    assert_eq!(report.net_profit, 200.0);
    assert_eq!(report.total_cost, 1000.0);
    assert_eq!(report.chart_data.len(), 2);
}

#[test]
fn tie_break_picks_shortest_hold() {
    let file = ndjson(&[
        ("2024-01-01T09:00:00Z", 100.0),
        ("2024-01-01T09:30:00Z", 120.0),
        ("2024-01-01T10:00:00Z", 100.0),
        ("2024-01-01T11:00:00Z", 120.0),
        ("2024-01-01T12:00:00Z", 100.0),
        ("2024-01-01T13:00:00Z", 120.0),
    ]);
    let engine = PriceEngine::open(file.path(), EngineConfig::default()).unwrap();
    let report = engine
        .compute_profit(ts("2024-01-01T09:00:00Z"), ts("2024-01-01T14:00:00Z"), 1000.0)
        .unwrap();
    assert_eq!(report.buy_time, ts("2024-01-01T09:00:00Z"));
    assert_eq!(report.sell_time, ts("2024-01-01T09:30:00Z"));
    assert_eq!(report.profit, 200.0);
}

#[test]
fn profit_report_invariants_hold() {
    let (file, _) = minute_series(2_000);
    let engine = PriceEngine::open(file.path(), small_stride()).unwrap();
    let windows = [
        ("2025-01-01T00:00:00Z", "2025-01-01T03:00:00Z", 1000.0),
        ("2025-01-01T05:17:00Z", "2025-01-01T09:42:30Z", 12_345.67),
        ("2025-01-01T20:00:00Z", "2025-01-02T10:00:00Z", 3.5),
    ];
    for (s, e, funds) in windows {
        let report = engine.compute_profit(ts(s), ts(e), funds).unwrap();
        assert!(report.buy_time <= report.sell_time);
        assert!(report.buy_price > 0.0);

        let buy = report.chart_data.first().map(|p| p.timestamp).unwrap();
        assert!(buy >= ts(s));

        let expected_shares = (funds / report.buy_price * 10_000.0).round() / 10_000.0;
        assert!((report.num_shares - expected_shares).abs() < 1e-3, "{s}..{e}");
        let diff = ((report.sell_price - report.buy_price) * 100.0).round() / 100.0;
        assert!((report.profit - diff * report.num_shares).abs() <= 0.01, "{s}..{e}");
    }
}

#[test]
fn repeated_queries_are_identical_and_cached() {
    let (file, _) = minute_series(1_000);
    let engine = PriceEngine::open(file.path(), small_stride()).unwrap();
    let (s, e) = (ts("2025-01-01T01:00:00Z"), ts("2025-01-01T12:00:00Z"));

    let first = engine.compute_profit(s, e, 1000.0).unwrap();
    assert_eq!(engine.cache_sizes(), (1, 1));
    let second = engine.compute_profit(s, e, 1000.0).unwrap();
    assert_eq!(first.buy_time, second.buy_time);
    assert_eq!(first.sell_time, second.sell_time);
    assert_eq!(first.net_profit, second.net_profit);
    assert_eq!(engine.cache_sizes(), (1, 1));

    // Same range, other funds: the cached pair is reused.
    let third = engine.compute_profit(s, e, 5000.0).unwrap();
    assert_eq!(third.buy_time, first.buy_time);
    assert_eq!(third.sell_time, first.sell_time);
    assert_eq!(engine.cache_sizes(), (1, 1));
}

#[test]
fn matches_naive_full_scan() {
    let (file, points) = minute_series(3_000);
    let engine = PriceEngine::open(file.path(), small_stride()).unwrap();
    let (s, e) = (ts("2025-01-01T07:13:00Z"), ts("2025-01-02T01:01:00Z"));

    let in_range: Vec<_> = points
        .iter()
        .copied()
        .filter(|p| p.timestamp >= s && p.timestamp <= e)
        .map(Ok)
        .collect();
    let want = price_scan::profit::best_trade(in_range).unwrap();
    let got = engine.best_pair(s, e).unwrap();
    assert_eq!(got, want);
}

#[test]
fn falling_series_has_no_trade() {
    let file = ndjson(&[
        ("2024-01-01T09:00:00Z", 130.0),
        ("2024-01-01T10:00:00Z", 120.0),
        ("2024-01-01T11:00:00Z", 120.0),
        ("2024-01-01T12:00:00Z", 100.0),
    ]);
    let engine = PriceEngine::open(file.path(), EngineConfig::default()).unwrap();
    let err = engine
        .compute_profit(ts("2024-01-01T09:00:00Z"), ts("2024-01-01T12:00:00Z"), 1000.0)
        .unwrap_err();
    assert!(matches!(err, EngineError::NoProfitableTrade));
}

#[test]
fn sub_cent_rise_is_not_a_trade() {
    let file = ndjson(&[("2024-01-01T09:00:00Z", 100.0), ("2024-01-01T10:00:00Z", 100.004)]);
    let engine = PriceEngine::open(file.path(), EngineConfig::default()).unwrap();
    let err = engine
        .compute_profit(ts("2024-01-01T09:00:00Z"), ts("2024-01-01T10:00:00Z"), 100_000.0)
        .unwrap_err();
    assert!(matches!(err, EngineError::NoProfitableTrade));
}

#[test]
fn json_output_keeps_millisecond_timestamps() {
    let file = ndjson(&[("2024-01-01T09:00:00Z", 100.0), ("2024-01-01T10:00:00Z", 120.0)]);
    let engine = PriceEngine::open(file.path(), EngineConfig::default()).unwrap();
    let min_max = serde_json::to_value(engine.get_min_max().unwrap()).unwrap();
    assert_eq!(min_max["start"], "2024-01-01T09:00:00.000Z");
    assert_eq!(min_max["end"], "2024-01-01T10:00:00.000Z");

    assert!(engine.warm_up().recv().unwrap());
    let stats = serde_json::to_value(engine.get_stats().unwrap()).unwrap();
    assert_eq!(stats["dateRange"]["start"], "2024-01-01T09:00:00.000Z");
}

#[test]
fn single_point_range_is_empty() {
    let file = ndjson(&[("2024-01-01T09:00:00Z", 100.0), ("2024-01-03T09:00:00Z", 120.0)]);
    let engine = PriceEngine::open(file.path(), EngineConfig::default()).unwrap();
    let err = engine
        .compute_profit(ts("2024-01-01T00:00:00Z"), ts("2024-01-02T00:00:00Z"), 1000.0)
        .unwrap_err();
    assert!(matches!(err, EngineError::EmptyRange { found: 1, needed: 2 }));
}

#[test]
fn validation_happens_before_any_scan() {
    let (file, _) = minute_series(100);
    let engine = PriceEngine::open(file.path(), EngineConfig::default()).unwrap();

    let err = engine
        .compute_profit(ts("2025-01-01T00:00:00Z"), ts("2025-04-02T00:00:00Z"), 1000.0)
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidRange(_)));

    let err = engine
        .compute_profit(ts("2025-01-02T00:00:00Z"), ts("2025-01-01T00:00:00Z"), 1000.0)
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidRange(_)));

    for funds in [0.0, -1.0, f64::NAN, 100_000_001.0] {
        let err = engine
            .compute_profit(ts("2025-01-01T00:00:00Z"), ts("2025-01-01T01:00:00Z"), funds)
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidFunds(_)), "funds {funds}");
    }

    assert!(!engine.is_indexed());
    assert_eq!(engine.cache_sizes(), (0, 0));
}

#[test]
fn chart_data_is_bounded_and_ordered() {
    let (file, _) = minute_series(5_000);
    let engine = PriceEngine::open(file.path(), small_stride()).unwrap();
    let (s, e) = (ts("2025-01-01T10:00:00Z"), ts("2025-01-03T10:00:00Z"));
    for buckets in [1, 7, 100, 1000, 5000] {
        let series = engine.get_chart_data(s, e, buckets).unwrap();
        assert!(series.len() <= buckets.min(1000), "buckets {buckets}");
        assert!(series.windows(2).all(|w| w[0].timestamp < w[1].timestamp));
        assert!(series.first().unwrap().timestamp >= s);
        assert!(series.last().unwrap().timestamp <= e);
    }
    assert!(matches!(
        engine.get_chart_data(s, e, 0),
        Err(EngineError::InvalidRange(_))
    ));
}

#[test]
fn array_sources_are_scanned_in_full() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(
        br#"[
  {"timestamp":"2024-01-01T09:00:00Z","price":100},
  {"timestamp":"2024-01-01T10:00:00Z","price":90},
  {"timestamp":"2024-01-01T11:00:00Z","price":117}
]"#,
    )
    .unwrap();
    file.flush().unwrap();

    let engine = PriceEngine::open(file.path(), EngineConfig::default()).unwrap();
    let report = engine
        .compute_profit(ts("2024-01-01T09:00:00Z"), ts("2024-01-01T11:00:00Z"), 900.0)
        .unwrap();
    assert_eq!(report.buy_time, ts("2024-01-01T10:00:00Z"));
    assert_eq!(report.num_shares, 10.0);
    assert_eq!(report.profit, 270.0);
    assert!(engine.index().unwrap().is_empty());

    let min_max = engine.get_min_max().unwrap();
    assert_eq!(min_max.start, ts("2024-01-01T09:00:00Z"));
    assert_eq!(min_max.end, ts("2024-01-01T11:00:00Z"));
}

#[test]
fn min_max_reads_file_ends() {
    let (file, points) = minute_series(500);
    let engine = PriceEngine::open(file.path(), EngineConfig::default()).unwrap();
    let min_max = engine.get_min_max().unwrap();
    assert_eq!(min_max.start, points[0].timestamp);
    assert_eq!(min_max.end, points[499].timestamp);
    assert!(!engine.is_indexed());
}

#[test]
fn stats_warm_up_once() {
    let (file, points) = minute_series(300);
    let engine = PriceEngine::open(file.path(), EngineConfig::default()).unwrap();
    assert!(matches!(engine.get_stats(), Err(EngineError::StatsNotReady)));

    assert!(engine.warm_up().recv().unwrap());
    assert!(engine.is_stats_ready());
    let stats = engine.get_stats().unwrap();
    assert_eq!(stats.total_points, 300);
    assert_eq!(stats.date_range.start, points[0].timestamp);
    assert_eq!(stats.date_range.end, points[299].timestamp);
    let min = points.iter().map(|p| p.price).fold(f64::INFINITY, f64::min);
    assert_eq!(stats.price_range.min, min);
}

#[test]
fn missing_file_is_data_not_found() {
    let err = PriceEngine::open("/no/such/prices.ndjson", EngineConfig::default())
        .err()
        .unwrap();
    assert!(matches!(err, EngineError::DataNotFound(_)));
}

#[test]
fn index_file_is_written_and_reused() {
    let (file, _) = minute_series(400);
    let dir = tempfile::tempdir().unwrap();
    let idx_path = dir.path().join("prices.idx");
    let config = EngineConfig {
        index_stride: 10,
        index_path: Some(idx_path.clone()),
        ..EngineConfig::default()
    };

    let first = PriceEngine::open(file.path(), config.clone()).unwrap();
    let built = first.index().unwrap().clone();
    assert_eq!(built.len(), 40);
    assert!(idx_path.exists());

    let second = PriceEngine::open(file.path(), config).unwrap();
    assert_eq!(second.index().unwrap(), &built);

    // A different stride invalidates the file.
    let third = PriceEngine::open(
        file.path(),
        EngineConfig {
            index_stride: 20,
            index_path: Some(idx_path),
            ..EngineConfig::default()
        },
    )
    .unwrap();
    assert_eq!(third.index().unwrap().len(), 20);
}

#[test]
fn concurrent_queries_share_one_index() {
    let (file, _) = minute_series(2_000);
    let engine = std::sync::Arc::new(PriceEngine::open(file.path(), small_stride()).unwrap());
    let handles: Vec<_> = (0..4)
        .map(|i| {
            let engine = std::sync::Arc::clone(&engine);
            std::thread::spawn(move || {
                let s = ts("2025-01-01T00:00:00Z") + chrono::Duration::hours(i);
                engine.best_pair(s, s + chrono::Duration::hours(6)).unwrap()
            })
        })
        .collect();
    for h in handles {
        let pair = h.join().unwrap();
        assert!(pair.buy.timestamp <= pair.sell.timestamp);
    }
    assert_eq!(engine.index().unwrap().len(), 2_000usize.div_ceil(16));
}
