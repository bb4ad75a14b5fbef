use crate::error;
use crate::index;
use crate::point;
use crate::source;

/// Lazy sequence of the points with `start <= timestamp <= end`.
///
/// The scan seeks near `start` using the sparse index, skips leading points
/// before the window and stops at the first point past `end`. If the seeked
/// pass yields nothing at all it is replayed from the top of the file, so a
/// bad or missing index can only cost time, never points.
pub struct RangeScan<'a> {
    source: &'a source::PointSource,
    start: chrono::DateTime<chrono::Utc>,
    end: chrono::DateTime<chrono::Utc>,
    iter: source::PointIter,
    seeked: bool,
    yielded: usize,
    finished: bool,
}

/// Opens a range scan over `source`.
///
/// # Arguments
/// * `source` - The price file.
/// * `index` - Sparse index used to pick the seek offset; may be empty.
/// * `start` - Inclusive lower bound.
/// * `end` - Inclusive upper bound.
///
/// # Returns
/// * `error::Result<RangeScan>`
pub fn scan<'a>(
    source: &'a source::PointSource,
    index: &index::SparseIndex,
    start: chrono::DateTime<chrono::Utc>,
    end: chrono::DateTime<chrono::Utc>,
) -> error::Result<RangeScan<'a>> {
    let start_ms = start.timestamp_millis();
    let offset = index.find_offset(start_ms);
    tracing::debug!(start_ms, offset, entries = index.len(), "range scan seek");

    Ok(RangeScan {
        source,
        start,
        end,
        iter: source.iterate_from(offset)?,
        seeked: offset > 0,
        yielded: 0,
        finished: false,
    })
}

impl RangeScan<'_> {
    /// Restarts from the beginning of the file after a fruitless seek.
    fn fall_back(&mut self) -> error::Result<()> {
        tracing::debug!(
            start = %self.start,
            end = %self.end,
            "seeked scan yielded nothing, rescanning from start"
        );
        self.iter = self.source.iterate()?;
        self.seeked = false;
        Ok(())
    }

    /// Number of points yielded so far.
    pub fn yielded(&self) -> usize {
        self.yielded
    }
}

impl Iterator for RangeScan<'_> {
    type Item = error::Result<point::Point>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        loop {
            let next = match self.iter.next() {
                Some(Ok(p)) if p.timestamp < self.start => continue,
                Some(Ok(p)) if p.timestamp > self.end => None,
                Some(Ok(p)) => Some(p),
                Some(Err(e)) => {
                    self.finished = true;
                    return Some(Err(e));
                }
                None => None,
            };

            match next {
                Some(p) => {
                    self.yielded += 1;
                    return Some(Ok(p));
                }
                None if self.seeked && self.yielded == 0 => {
                    if let Err(e) = self.fall_back() {
                        self.finished = true;
                        return Some(Err(e));
                    }
                }
                None => {
                    self.finished = true;
                    return None;
                }
            }
        }
    }
}
