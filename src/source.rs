use crate::error;
use crate::point;

/// On-disk layout of a price file, detected from its first non-whitespace byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    /// One JSON object per line (NDJSON). Seekable.
    Lines,
    /// A single JSON array of records. Loaded fully into memory.
    Array,
}

/// Read-only view over a price file.
///
/// The source holds no open handle: every pass maps the file afresh, so
/// concurrent scans never share a cursor.
#[derive(Debug, Clone)]
pub struct PointSource {
    path: std::path::PathBuf,
    encoding: Encoding,
    len: u64,
}

/// Bytes of one mapped pass over the file.
enum SourceBytes {
    Mapped(memmap2::Mmap),
    Empty,
}

impl std::ops::Deref for SourceBytes {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        match self {
            SourceBytes::Mapped(mmap) => &mmap[..],
            SourceBytes::Empty => &[],
        }
    }
}

/// Maps the file at `path`, translating a missing file into `DataNotFound`.
fn map_file(path: &std::path::Path) -> error::Result<SourceBytes> {
    let file = std::fs::File::open(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => error::EngineError::DataNotFound(path.display().to_string()),
        _ => error::EngineError::Io(e),
    })?;
    if file.metadata()?.len() == 0 {
        return Ok(SourceBytes::Empty);
    }
    // The file is treated as an immutable snapshot for the process lifetime.
    let mmap = unsafe { memmap2::Mmap::map(&file)? };
    Ok(SourceBytes::Mapped(mmap))
}

impl PointSource {
    /// Opens a price file and detects its encoding.
    ///
    /// # Arguments
    /// * `path` - Path to the NDJSON or JSON-array file.
    ///
    /// # Returns
    /// * `error::Result<PointSource>` - `DataNotFound` if the path does not exist.
    pub fn open<P: AsRef<std::path::Path>>(path: P) -> error::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let bytes = map_file(&path)?;
        let encoding = match bytes.iter().find(|b| !b.is_ascii_whitespace()) {
            Some(&b'[') => Encoding::Array,
            _ => Encoding::Lines,
        };
        tracing::debug!(path = %path.display(), ?encoding, len = bytes.len(), "opened price source");

        Ok(PointSource {
            path,
            encoding,
            len: bytes.len() as u64,
        })
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }

    pub fn encoding(&self) -> Encoding {
        self.encoding
    }

    /// File length in bytes observed at `open`.
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Starts a fresh pass over every point, from the beginning of the file.
    ///
    /// A malformed record ends the pass with `EngineError::Parse`.
    pub fn iterate(&self) -> error::Result<PointIter> {
        self.iterate_from(0)
    }

    /// Starts a pass at byte `offset`.
    ///
    /// When `offset` is non-zero the first record read may be the tail of a
    /// line cut by the seek; if it does not parse it is dropped silently.
    /// Whole-array sources cannot be seeked and always start from the top.
    pub fn iterate_from(&self, offset: u64) -> error::Result<PointIter> {
        match self.encoding {
            Encoding::Lines => {
                let lines = self.lines_from(offset)?;
                Ok(PointIter {
                    inner: IterInner::Lines {
                        lines,
                        lenient_first: offset > 0,
                        done: false,
                    },
                })
            }
            Encoding::Array => Ok(PointIter {
                inner: IterInner::Array(self.load_array()?.into_iter()),
            }),
        }
    }

    /// Raw record reader starting at `offset`. Line-delimited sources only.
    pub fn lines_from(&self, offset: u64) -> error::Result<Lines> {
        let bytes = map_file(&self.path)?;
        let pos = (offset as usize).min(bytes.len());
        Ok(Lines { bytes, pos })
    }

    /// Reads the first and last records without visiting the rest of the file.
    ///
    /// # Returns
    /// * `error::Result<(Point, Point)>` - `EmptyRange` when the file holds no records.
    pub fn first_and_last(&self) -> error::Result<(point::Point, point::Point)> {
        match self.encoding {
            Encoding::Array => {
                let points = self.load_array()?;
                match (points.first(), points.last()) {
                    (Some(first), Some(last)) => Ok((*first, *last)),
                    _ => Err(error::EngineError::EmptyRange { found: 0, needed: 1 }),
                }
            }
            Encoding::Lines => {
                let mut lines = self.lines_from(0)?;
                let first = match lines.next_record() {
                    Some((offset, line)) => point::parse_record(line, offset)?,
                    None => return Err(error::EngineError::EmptyRange { found: 0, needed: 1 }),
                };
                let (offset, line) = lines
                    .last_record()
                    .ok_or(error::EngineError::EmptyRange { found: 0, needed: 1 })?;
                let last = point::parse_record(line, offset)?;
                Ok((first, last))
            }
        }
    }

    fn load_array(&self) -> error::Result<Vec<point::Point>> {
        let bytes = map_file(&self.path)?;
        let raw: Vec<point::RawRecord> =
            serde_json::from_slice(&bytes).map_err(|e| error::EngineError::Parse {
                offset: 0,
                message: e.to_string(),
            })?;
        raw.into_iter().map(|r| r.into_point(0)).collect()
    }
}

/// Forward record reader over a mapped line-delimited file.
///
/// Yields each non-blank line together with the byte offset of its first
/// byte. Both `\n` and `\r\n` terminators are handled, so the offsets always
/// address record starts.
pub struct Lines {
    bytes: SourceBytes,
    pos: usize,
}

impl Lines {
    /// Returns the next non-blank record and its start offset.
    pub fn next_record(&mut self) -> Option<(u64, &[u8])> {
        loop {
            if self.pos >= self.bytes.len() {
                return None;
            }
            let start = self.pos;
            let rest = &self.bytes[start..];
            let (line_len, advance) = match rest.iter().position(|&b| b == b'\n') {
                Some(i) => (i, i + 1),
                None => (rest.len(), rest.len()),
            };
            self.pos = start + advance;

            let line = trim_line(&self.bytes[start..start + line_len]);
            if !line.is_empty() {
                return Some((start as u64, line));
            }
        }
    }

    /// Locates the last non-blank record by walking backwards from the end.
    pub fn last_record(&self) -> Option<(u64, &[u8])> {
        let bytes: &[u8] = &self.bytes;
        let mut end = bytes.len();
        loop {
            while end > 0 && bytes[end - 1].is_ascii_whitespace() {
                end -= 1;
            }
            if end == 0 {
                return None;
            }
            let start = bytes[..end]
                .iter()
                .rposition(|&b| b == b'\n')
                .map_or(0, |i| i + 1);
            let line = trim_line(&bytes[start..end]);
            if !line.is_empty() {
                return Some((start as u64, line));
            }
            end = start;
        }
    }

    /// Byte position of the next unread record.
    pub fn position(&self) -> u64 {
        self.pos as u64
    }
}

/// Strips surrounding ASCII whitespace, including a trailing `\r`.
fn trim_line(line: &[u8]) -> &[u8] {
    let start = line.iter().position(|b| !b.is_ascii_whitespace()).unwrap_or(line.len());
    let end = line.iter().rposition(|b| !b.is_ascii_whitespace()).map_or(start, |i| i + 1);
    &line[start..end]
}

/// Lazy, ordered sequence of points from one pass over a source.
pub struct PointIter {
    inner: IterInner,
}

enum IterInner {
    Lines {
        lines: Lines,
        lenient_first: bool,
        done: bool,
    },
    Array(std::vec::IntoIter<point::Point>),
}

impl Iterator for PointIter {
    type Item = error::Result<point::Point>;

    fn next(&mut self) -> Option<Self::Item> {
        match &mut self.inner {
            IterInner::Array(points) => points.next().map(Ok),
            IterInner::Lines { lines, lenient_first, done } => {
                if *done {
                    return None;
                }
                loop {
                    let Some((offset, line)) = lines.next_record() else {
                        *done = true;
                        return None;
                    };
                    let lenient = std::mem::take(lenient_first);
                    match point::parse_record(line, offset) {
                        Ok(p) => return Some(Ok(p)),
                        Err(e) if lenient => {
                            tracing::debug!(offset, "skipping partial record after seek: {}", e);
                        }
                        Err(e) => {
                            *done = true;
                            return Some(Err(e));
                        }
                    }
                }
            }
        }
    }
}
