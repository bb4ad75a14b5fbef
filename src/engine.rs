use crate::cache;
use crate::config;
use crate::error;
use crate::index;
use crate::point;
use crate::profit;
use crate::resample;
use crate::scanner;
use crate::source;
use crate::stats;

/// Best-pair cache key: `start|end` in epoch milliseconds.
type RangeKey = (i64, i64);
/// Chart cache key: `start|end|maxBuckets`.
type ChartKey = (i64, i64, usize);

/// First and last timestamps of the series.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
pub struct MinMax {
    #[serde(serialize_with = "crate::utils::serialize_timestamp")]
    pub start: chrono::DateTime<chrono::Utc>,
    #[serde(serialize_with = "crate::utils::serialize_timestamp")]
    pub end: chrono::DateTime<chrono::Utc>,
}

/// Query facade over one price file.
///
/// Owns the source, the build-once sparse index, the stats aggregator and
/// the two bounded caches. Every query opens its own pass over the file, so
/// a shared `PriceEngine` can serve concurrent callers.
pub struct PriceEngine {
    source: source::PointSource,
    config: config::EngineConfig,
    index: std::sync::OnceLock<index::SparseIndex>,
    index_lock: std::sync::Mutex<()>,
    stats: std::sync::Arc<stats::StatsAggregator>,
    pair_cache: std::sync::Mutex<cache::LruCache<RangeKey, profit::BestPair>>,
    chart_cache: std::sync::Mutex<cache::LruCache<ChartKey, Vec<point::Point>>>,
}

/// Locks a cache, recovering it if another thread panicked while holding it.
///
/// Cached values are always re-derivable, so a poisoned lock carries no risk
/// beyond a stale entry.
fn lock<T>(mutex: &std::sync::Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

fn range_key(start: &chrono::DateTime<chrono::Utc>, end: &chrono::DateTime<chrono::Utc>) -> RangeKey {
    (start.timestamp_millis(), end.timestamp_millis())
}

impl PriceEngine {
    /// Opens the price file at `path`.
    ///
    /// # Arguments
    /// * `path` - NDJSON or JSON-array price file.
    /// * `config` - Engine tunables.
    ///
    /// # Returns
    /// * `error::Result<PriceEngine>` - `DataNotFound` if the file does not exist.
    pub fn open<P: AsRef<std::path::Path>>(path: P, config: config::EngineConfig) -> error::Result<Self> {
        let source = source::PointSource::open(path)?;
        Ok(PriceEngine {
            source,
            pair_cache: std::sync::Mutex::new(cache::LruCache::new(config.pair_cache_capacity)),
            chart_cache: std::sync::Mutex::new(cache::LruCache::new(config.chart_cache_capacity)),
            config,
            index: std::sync::OnceLock::new(),
            index_lock: std::sync::Mutex::new(()),
            stats: std::sync::Arc::new(stats::StatsAggregator::new()),
        })
    }

    pub fn config(&self) -> &config::EngineConfig {
        &self.config
    }

    pub fn source(&self) -> &source::PointSource {
        &self.source
    }

    /// Returns the sparse index, building it on first use.
    ///
    /// Construction runs at most once: concurrent first callers wait on a
    /// lock and then observe the fully built index. When an index file is
    /// configured it is reused if it matches the source, and rewritten
    /// otherwise.
    pub fn index(&self) -> error::Result<&index::SparseIndex> {
        if let Some(index) = self.index.get() {
            return Ok(index);
        }
        let _guard = lock(&self.index_lock);
        if let Some(index) = self.index.get() {
            return Ok(index);
        }
        let built = self.load_or_build_index()?;
        Ok(self.index.get_or_init(|| built))
    }

    /// Whether the sparse index has been built or loaded.
    pub fn is_indexed(&self) -> bool {
        self.index.get().is_some()
    }

    fn load_or_build_index(&self) -> error::Result<index::SparseIndex> {
        let stride = self.config.index_stride;
        if let Some(path) = &self.config.index_path {
            match index::SparseIndex::load(path) {
                Ok(loaded) if loaded.matches(&self.source, stride) => {
                    tracing::info!(path = %path.display(), entries = loaded.len(), "sparse index loaded");
                    return Ok(loaded);
                }
                Ok(_) => tracing::warn!(path = %path.display(), "index file does not match source, rebuilding"),
                Err(e) => tracing::debug!(path = %path.display(), "no usable index file: {}", e),
            }
        }

        let built = index::SparseIndex::build(&self.source, stride)?;
        if let Some(path) = &self.config.index_path {
            if let Err(e) = built.save(path) {
                tracing::warn!(path = %path.display(), "failed to write index file: {}", e);
            }
        }
        Ok(built)
    }

    /// Starts the background stats pass. See [`stats::StatsAggregator::warm_up`].
    pub fn warm_up(&self) -> std::sync::mpsc::Receiver<bool> {
        self.stats.warm_up(self.source.clone())
    }

    pub fn is_stats_ready(&self) -> bool {
        self.stats.is_ready()
    }

    /// Cached series stats, or `StatsNotReady` while warm-up is running.
    pub fn get_stats(&self) -> error::Result<stats::Stats> {
        self.stats.get()
    }

    /// First and last timestamps, read from the two ends of the file only.
    pub fn get_min_max(&self) -> error::Result<MinMax> {
        let (first, last) = self.source.first_and_last()?;
        Ok(MinMax {
            start: first.timestamp,
            end: last.timestamp,
        })
    }

    /// Rejects reversed, empty or over-long ranges.
    pub fn validate_range(
        &self,
        start: &chrono::DateTime<chrono::Utc>,
        end: &chrono::DateTime<chrono::Utc>,
    ) -> error::Result<()> {
        if start >= end {
            return Err(error::EngineError::InvalidRange(
                "start must be before end".to_string(),
            ));
        }
        let span = end.timestamp_millis() - start.timestamp_millis();
        if span > self.config.max_span_ms() {
            return Err(error::EngineError::InvalidRange(format!(
                "date range cannot exceed {} days",
                self.config.max_span_days
            )));
        }
        Ok(())
    }

    /// Rejects non-positive, non-finite or too large fund amounts.
    pub fn validate_funds(&self, funds: f64) -> error::Result<()> {
        if !funds.is_finite() || funds <= 0.0 {
            return Err(error::EngineError::InvalidFunds(
                "funds must be a positive number".to_string(),
            ));
        }
        if funds > self.config.max_funds {
            return Err(error::EngineError::InvalidFunds(format!(
                "funds amount too large (max {})",
                self.config.max_funds
            )));
        }
        Ok(())
    }

    /// Points with `start <= timestamp <= end`, seeking through the index.
    pub fn range(
        &self,
        start: chrono::DateTime<chrono::Utc>,
        end: chrono::DateTime<chrono::Utc>,
    ) -> error::Result<scanner::RangeScan<'_>> {
        scanner::scan(&self.source, self.index()?, start, end)
    }

    /// Best buy-then-sell pair over `[start, end]`, through the pair cache.
    pub fn best_pair(
        &self,
        start: chrono::DateTime<chrono::Utc>,
        end: chrono::DateTime<chrono::Utc>,
    ) -> error::Result<profit::BestPair> {
        self.validate_range(&start, &end)?;
        let key = range_key(&start, &end);
        if let Some(pair) = lock(&self.pair_cache).get(&key) {
            tracing::debug!(?key, "best pair cache hit");
            return Ok(pair);
        }
        self.scan_pair(start, end)
    }

    /// Downsampled series over `[start, end]`, through the chart cache.
    ///
    /// `max_buckets` is capped at the configured chart point limit.
    pub fn get_chart_data(
        &self,
        start: chrono::DateTime<chrono::Utc>,
        end: chrono::DateTime<chrono::Utc>,
        max_buckets: usize,
    ) -> error::Result<Vec<point::Point>> {
        self.validate_range(&start, &end)?;
        if max_buckets == 0 {
            return Err(error::EngineError::InvalidRange(
                "maxBuckets must be positive".to_string(),
            ));
        }
        let buckets = max_buckets.min(self.config.max_chart_points);
        let (s, e) = range_key(&start, &end);
        if let Some(series) = lock(&self.chart_cache).get(&(s, e, buckets)) {
            tracing::debug!(start_ms = s, end_ms = e, buckets, "chart cache hit");
            return Ok(series);
        }
        self.scan_chart(start, end, buckets)
    }

    /// Best trade for `funds` over `[start, end]`, with chart data.
    ///
    /// Validation happens before any file access. When neither the pair nor
    /// the chart is cached, both are computed in a single pass.
    ///
    /// # Errors
    /// * `InvalidFunds`, `InvalidRange` on bad input.
    /// * `EmptyRange` if the range holds fewer than two points.
    /// * `NoProfitableTrade` if no pair earns at least the configured minimum.
    pub fn compute_profit(
        &self,
        start: chrono::DateTime<chrono::Utc>,
        end: chrono::DateTime<chrono::Utc>,
        funds: f64,
    ) -> error::Result<profit::ProfitReport> {
        self.validate_funds(funds)?;
        self.validate_range(&start, &end)?;

        let key = range_key(&start, &end);
        let buckets = self.config.max_chart_points;
        let cached_pair = lock(&self.pair_cache).get(&key);
        let cached_chart = lock(&self.chart_cache).get(&(key.0, key.1, buckets));
        tracing::debug!(
            ?key,
            pair_hit = cached_pair.is_some(),
            chart_hit = cached_chart.is_some(),
            "profit query"
        );

        let (pair, chart) = match (cached_pair, cached_chart) {
            (Some(pair), Some(chart)) => (pair, chart),
            (Some(pair), None) => (pair, self.scan_chart(start, end, buckets)?),
            (None, Some(chart)) => (self.scan_pair(start, end)?, chart),
            (None, None) => self.scan_fused(start, end, buckets)?,
        };

        let report = profit::ProfitReport::new(&pair, funds, chart)?;
        profit::ensure_meaningful(&report, self.config.min_profit)?;
        Ok(report)
    }

    fn scan_pair(
        &self,
        start: chrono::DateTime<chrono::Utc>,
        end: chrono::DateTime<chrono::Utc>,
    ) -> error::Result<profit::BestPair> {
        let t0 = std::time::Instant::now();
        let pair = profit::best_trade(self.range(start, end)?)?;
        tracing::debug!(elapsed_ms = t0.elapsed().as_millis() as u64, "best pair scan");
        lock(&self.pair_cache).put(range_key(&start, &end), pair);
        Ok(pair)
    }

    fn scan_chart(
        &self,
        start: chrono::DateTime<chrono::Utc>,
        end: chrono::DateTime<chrono::Utc>,
        buckets: usize,
    ) -> error::Result<Vec<point::Point>> {
        let t0 = std::time::Instant::now();
        let series = resample::downsample(self.range(start, end)?, start, end, buckets)?;
        tracing::debug!(
            points = series.len(),
            elapsed_ms = t0.elapsed().as_millis() as u64,
            "chart scan"
        );
        let (s, e) = range_key(&start, &end);
        lock(&self.chart_cache).put((s, e, buckets), series.clone());
        Ok(series)
    }

    /// One pass feeding both the profit scanner and the downsampler.
    ///
    /// The chart is cached even when the range holds no profitable trade.
    fn scan_fused(
        &self,
        start: chrono::DateTime<chrono::Utc>,
        end: chrono::DateTime<chrono::Utc>,
        buckets: usize,
    ) -> error::Result<(profit::BestPair, Vec<point::Point>)> {
        let t0 = std::time::Instant::now();
        let mut scanner = profit::ProfitScanner::new();
        let mut sampler = resample::Downsampler::new(start, end, buckets)?;
        for p in self.range(start, end)? {
            let p = p?;
            scanner.push(p)?;
            sampler.push(p);
        }
        tracing::debug!(
            points = scanner.seen(),
            elapsed_ms = t0.elapsed().as_millis() as u64,
            "fused profit and chart scan"
        );

        let key = range_key(&start, &end);
        let chart = sampler.finish();
        lock(&self.chart_cache).put((key.0, key.1, buckets), chart.clone());
        let pair = scanner.finish()?;
        lock(&self.pair_cache).put(key, pair);
        Ok((pair, chart))
    }

    /// Number of entries currently held by the pair and chart caches.
    pub fn cache_sizes(&self) -> (usize, usize) {
        (lock(&self.pair_cache).len(), lock(&self.chart_cache).len())
    }
}
