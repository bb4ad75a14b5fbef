use crate::error;
use crate::source;

#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
pub struct DateRange {
    #[serde(serialize_with = "crate::utils::serialize_timestamp")]
    pub start: chrono::DateTime<chrono::Utc>,
    #[serde(serialize_with = "crate::utils::serialize_timestamp")]
    pub end: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
pub struct PriceRange {
    pub min: f64,
    pub max: f64,
}

/// Whole-series summary.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Stats {
    pub total_points: u64,
    pub date_range: DateRange,
    pub price_range: PriceRange,
}

/// Computes count, first/last timestamp and min/max price in one full pass.
///
/// # Errors
/// * `EmptyRange` if the source holds no points.
/// * Any parse or I/O error met during the pass.
pub fn compute_stats(source: &source::PointSource) -> error::Result<Stats> {
    let mut total_points = 0u64;
    let mut first = None;
    let mut last = None;
    let mut min = f64::INFINITY;
    let mut max = f64::NEG_INFINITY;

    for p in source.iterate()? {
        let p = p?;
        total_points += 1;
        first.get_or_insert(p.timestamp);
        last = Some(p.timestamp);
        min = min.min(p.price);
        max = max.max(p.price);
    }

    match (first, last) {
        (Some(start), Some(end)) => Ok(Stats {
            total_points,
            date_range: DateRange { start, end },
            price_range: PriceRange { min, max },
        }),
        _ => Err(error::EngineError::EmptyRange { found: 0, needed: 1 }),
    }
}

/// Progress of the background stats pass.
#[derive(Debug, Default)]
enum WarmUp {
    #[default]
    Idle,
    /// Pass in flight; every caller waiting on it.
    Running(Vec<std::sync::mpsc::Sender<bool>>),
    Done(bool),
}

/// Owner of the once-computed series stats.
///
/// Empty until the warm-up finishes successfully, then fixed for the life of
/// the process. A failed warm-up is logged and leaves the aggregator
/// permanently not ready.
#[derive(Debug, Default)]
pub struct StatsAggregator {
    stats: std::sync::OnceLock<Stats>,
    progress: std::sync::Mutex<WarmUp>,
}

impl StatsAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_ready(&self) -> bool {
        self.stats.get().is_some()
    }

    /// Returns the cached stats, or `StatsNotReady` before warm-up completes.
    pub fn get(&self) -> error::Result<Stats> {
        self.stats.get().copied().ok_or(error::EngineError::StatsNotReady)
    }

    fn state(&self) -> std::sync::MutexGuard<'_, WarmUp> {
        self.progress.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Runs the stats pass on the rayon pool without blocking the caller.
    ///
    /// Only the first call starts a pass. Every receiver, whichever call
    /// returned it, yields the outcome of that one pass: `true` once stats
    /// are available and `false` if the pass failed.
    pub fn warm_up(
        self: &std::sync::Arc<Self>,
        source: source::PointSource,
    ) -> std::sync::mpsc::Receiver<bool> {
        let (tx, rx) = std::sync::mpsc::channel();
        {
            let mut state = self.state();
            if let WarmUp::Done(ready) = *state {
                let _ = tx.send(ready);
                return rx;
            }
            if let WarmUp::Running(waiters) = &mut *state {
                waiters.push(tx);
                return rx;
            }
            *state = WarmUp::Running(vec![tx]);
        }

        let this = std::sync::Arc::clone(self);
        rayon::spawn(move || {
            let start = std::time::Instant::now();
            let ready = match compute_stats(&source) {
                Ok(stats) => {
                    let _ = this.stats.set(stats);
                    tracing::info!(
                        total_points = stats.total_points,
                        elapsed_ms = start.elapsed().as_millis() as u64,
                        "stats cache ready"
                    );
                    true
                }
                Err(e) => {
                    tracing::warn!("failed to preload stats: {}", e);
                    false
                }
            };
            let waiters = match std::mem::replace(&mut *this.state(), WarmUp::Done(ready)) {
                WarmUp::Running(waiters) => waiters,
                _ => Vec::new(),
            };
            for tx in waiters {
                let _ = tx.send(ready);
            }
        });
        rx
    }
}
