use crate::error;
use crate::point;
use crate::source;

/// Index entry mapping a record timestamp to the byte offset where the record starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct IndexEntry {
    pub timestamp_ms: i64,
    pub byte_offset: u64,
}

/// Sparse time index: one entry every `stride` records.
///
/// Entries are non-decreasing in both fields. The index is only a hint for
/// seeking; a scan that finds nothing after seeking falls back to a full pass.
/// Saved as a `.idx` companion file via bincode.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SparseIndex {
    pub stride: usize,
    pub source_len: u64,
    pub entries: Vec<IndexEntry>,
}

impl SparseIndex {
    /// Builds the index by a single forward pass over the source.
    ///
    /// Every `stride`-th parsable record contributes an entry holding its
    /// timestamp and the offset of its first byte. Unparsable lines are
    /// skipped silently. Whole-array sources get an empty index.
    ///
    /// # Arguments
    /// * `source` - The price file to index.
    /// * `stride` - Records between entries (K). Zero is treated as one.
    ///
    /// # Returns
    /// * `error::Result<SparseIndex>`
    pub fn build(source: &source::PointSource, stride: usize) -> error::Result<Self> {
        let stride = stride.max(1);
        let mut index = SparseIndex {
            stride,
            source_len: source.len(),
            entries: Vec::new(),
        };
        if source.encoding() == source::Encoding::Array {
            return Ok(index);
        }

        let start = std::time::Instant::now();
        let mut lines = source.lines_from(0)?;
        let mut count = 0usize;
        while let Some((offset, line)) = lines.next_record() {
            let Ok(p) = point::parse_record(line, offset) else {
                continue;
            };
            if count % stride == 0 {
                index.push(p.millis(), offset);
            }
            count += 1;
        }

        tracing::info!(
            records = count,
            entries = index.entries.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "sparse index built"
        );
        Ok(index)
    }

    /// Appends an entry, dropping any that would break timestamp ordering.
    fn push(&mut self, timestamp_ms: i64, byte_offset: u64) {
        if let Some(last) = self.entries.last() {
            if timestamp_ms < last.timestamp_ms || byte_offset < last.byte_offset {
                return;
            }
        }
        self.entries.push(IndexEntry { timestamp_ms, byte_offset });
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Byte offset to seek to when looking for `target_ms`.
    ///
    /// Returns the offset of the last entry whose timestamp is strictly below
    /// the target, or 0 when there is none. Stopping strictly below matters for
    /// series with repeated timestamps: an entry equal to the target may sit in
    /// the middle of a run whose earlier records also match.
    pub fn find_offset(&self, target_ms: i64) -> u64 {
        let idx = self.entries.partition_point(|e| e.timestamp_ms < target_ms);
        match idx {
            0 => 0,
            i => self.entries[i - 1].byte_offset,
        }
    }

    /// Serializes the index to `path`.
    pub fn save<P: AsRef<std::path::Path>>(&self, path: P) -> error::Result<()> {
        let data = bincode::serialize(self)?;
        std::fs::write(path, data)?;
        Ok(())
    }

    /// Loads an index from `path`.
    pub fn load<P: AsRef<std::path::Path>>(path: P) -> error::Result<Self> {
        let data = std::fs::read(path)?;
        let index = bincode::deserialize(&data)?;
        Ok(index)
    }

    /// Whether a loaded index was built from a file like `source` with `stride`.
    pub fn matches(&self, source: &source::PointSource, stride: usize) -> bool {
        self.source_len == source.len() && self.stride == stride.max(1)
    }
}
