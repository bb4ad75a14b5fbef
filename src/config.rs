/// Tunables of the engine.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Records between sparse index entries (K).
    pub index_stride: usize,
    /// Longest range a profit query may span.
    pub max_span_days: i64,
    /// Largest amount a profit query may invest.
    pub max_funds: f64,
    /// Smallest profit worth reporting; anything lower counts as no trade.
    pub min_profit: f64,
    /// Cap on chart points per query.
    pub max_chart_points: usize,
    pub pair_cache_capacity: usize,
    pub chart_cache_capacity: usize,
    /// Optional `.idx` companion file for the sparse index.
    pub index_path: Option<std::path::PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            index_stride: 1000,
            max_span_days: 90,
            max_funds: 100_000_000.0,
            min_profit: 0.01,
            max_chart_points: 1000,
            pair_cache_capacity: 200,
            chart_cache_capacity: 50,
            index_path: None,
        }
    }
}

impl EngineConfig {
    /// Defaults overlaid with the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overlaid with whatever `lookup` returns for each variable.
    ///
    /// Values that fail to parse are ignored with a warning.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = EngineConfig::default();
        overlay(&lookup, "INDEX_STRIDE", &mut config.index_stride);
        overlay(&lookup, "MAX_DATE_RANGE_DAYS", &mut config.max_span_days);
        overlay(&lookup, "MAX_FUNDS", &mut config.max_funds);
        overlay(&lookup, "MIN_PROFIT", &mut config.min_profit);
        overlay(&lookup, "MAX_CHART_POINTS", &mut config.max_chart_points);
        overlay(&lookup, "PAIR_CACHE_CAPACITY", &mut config.pair_cache_capacity);
        overlay(&lookup, "CHART_CACHE_CAPACITY", &mut config.chart_cache_capacity);
        if let Some(path) = lookup("INDEX_PATH").filter(|p| !p.trim().is_empty()) {
            config.index_path = Some(std::path::PathBuf::from(path));
        }
        config
    }

    /// Longest allowed range in milliseconds.
    pub fn max_span_ms(&self) -> i64 {
        self.max_span_days.saturating_mul(86_400_000)
    }
}

fn overlay<F, T>(lookup: &F, key: &str, slot: &mut T)
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    let Some(raw) = lookup(key) else {
        return;
    };
    match raw.trim().parse::<T>() {
        Ok(value) => *slot = value,
        Err(e) => tracing::warn!("ignoring {}={:?}: {}", key, raw, e),
    }
}
