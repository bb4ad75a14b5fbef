use crate::error;
use crate::point;

/// Time-bucket downsampler for charting.
///
/// Splits `[start, end]` into at most `max_buckets` equal-width buckets and
/// keeps the first point that lands in each one. Later points of an occupied
/// bucket are dropped; there is no averaging or peak preservation.
#[derive(Debug)]
pub struct Downsampler {
    start: chrono::DateTime<chrono::Utc>,
    end: chrono::DateTime<chrono::Utc>,
    start_ms: i64,
    bucket_ms: i64,
    max_buckets: usize,
    last_bucket: Option<usize>,
    series: Vec<point::Point>,
}

impl Downsampler {
    /// Prepares a downsampler over `[start, end]`.
    ///
    /// Bucket width is `max(1, ceil((end - start) / max_buckets))` ms; the
    /// bucket holding `end` is folded into the last one so the output never
    /// exceeds `max_buckets` points.
    ///
    /// # Errors
    /// * `InvalidRange` if `max_buckets` is zero or `end` precedes `start`.
    pub fn new(
        start: chrono::DateTime<chrono::Utc>,
        end: chrono::DateTime<chrono::Utc>,
        max_buckets: usize,
    ) -> error::Result<Self> {
        if max_buckets == 0 {
            return Err(error::EngineError::InvalidRange(
                "maxBuckets must be positive".to_string(),
            ));
        }
        let start_ms = start.timestamp_millis();
        let span = end.timestamp_millis() - start_ms;
        if span < 0 {
            return Err(error::EngineError::InvalidRange(
                "end precedes start".to_string(),
            ));
        }
        let buckets = max_buckets as i64;
        let bucket_ms = ((span + buckets - 1) / buckets).max(1);

        Ok(Downsampler {
            start,
            end,
            start_ms,
            bucket_ms,
            max_buckets,
            last_bucket: None,
            series: Vec::with_capacity(max_buckets.min(4096)),
        })
    }

    /// Feeds the next point. Points outside `[start, end]` are ignored.
    pub fn push(&mut self, p: point::Point) {
        if p.timestamp < self.start || p.timestamp > self.end {
            return;
        }
        let offset = (p.millis() - self.start_ms).max(0);
        let bucket = ((offset / self.bucket_ms) as usize).min(self.max_buckets - 1);
        if self.last_bucket.is_some_and(|last| bucket <= last) {
            return;
        }
        self.last_bucket = Some(bucket);
        self.series.push(p);
    }

    /// Returns the retained points in bucket order.
    pub fn finish(self) -> Vec<point::Point> {
        self.series
    }
}

/// Downsamples an ordered range of points to at most `max_buckets` points.
///
/// # Arguments
/// * `points` - Ordered points of the range.
/// * `start`, `end` - Range bounds the buckets are laid over.
/// * `max_buckets` - Output size cap.
///
/// # Returns
/// * `error::Result<Vec<point::Point>>` - One point per occupied bucket.
pub fn downsample<I>(
    points: I,
    start: chrono::DateTime<chrono::Utc>,
    end: chrono::DateTime<chrono::Utc>,
    max_buckets: usize,
) -> error::Result<Vec<point::Point>>
where
    I: IntoIterator<Item = error::Result<point::Point>>,
{
    let mut sampler = Downsampler::new(start, end, max_buckets)?;
    for p in points {
        sampler.push(p?);
    }
    Ok(sampler.finish())
}
