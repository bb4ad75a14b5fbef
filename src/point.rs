use crate::error;

/// A single (timestamp, price) sample of the series.
///
/// Points are immutable once read. Within one series timestamps are
/// non-decreasing; the engine relies on that ordering and never re-sorts.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Point {
    #[serde(serialize_with = "crate::utils::serialize_timestamp")]
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub price: f64,
}

impl Point {
    pub fn new(timestamp: chrono::DateTime<chrono::Utc>, price: f64) -> Self {
        Point { timestamp, price }
    }

    /// Timestamp as milliseconds since the Unix epoch.
    #[inline]
    pub fn millis(&self) -> i64 {
        self.timestamp.timestamp_millis()
    }
}

/// Represents a single record as stored on disk.
///
/// `{"timestamp":"2025-01-01T00:00:00.000Z","price":100.0}`
#[derive(Debug, serde::Deserialize)]
pub struct RawRecord<'a> {
    #[serde(borrow)]
    timestamp: std::borrow::Cow<'a, str>,
    price: f64,
}

impl RawRecord<'_> {
    /// Converts the raw record into a `Point`.
    ///
    /// # Arguments
    /// * `offset` - Byte offset of the record, used only for error reporting.
    pub fn into_point(self, offset: u64) -> error::Result<Point> {
        let timestamp = chrono::DateTime::parse_from_rfc3339(&self.timestamp)
            .map_err(|e| error::EngineError::Parse {
                offset,
                message: format!("bad timestamp {:?}: {}", self.timestamp, e),
            })?
            .with_timezone(&chrono::Utc);

        if !self.price.is_finite() {
            return Err(error::EngineError::Parse {
                offset,
                message: format!("non-finite price {}", self.price),
            });
        }

        Ok(Point::new(timestamp, self.price))
    }
}

/// Parses one line-delimited record.
///
/// # Arguments
/// * `line` - Raw bytes of the record, without its line terminator.
/// * `offset` - Byte offset of the record start in the source.
///
/// # Returns
/// * `error::Result<Point>` - The parsed point or `EngineError::Parse`.
pub fn parse_record(line: &[u8], offset: u64) -> error::Result<Point> {
    let raw: RawRecord = serde_json::from_slice(line).map_err(|e| error::EngineError::Parse {
        offset,
        message: e.to_string(),
    })?;
    raw.into_point(offset)
}

/// Parses a caller-supplied range bound.
///
/// Accepts RFC 3339 / ISO-8601 with an explicit offset. Anything else is an
/// `InvalidRange`, since a bound that cannot be read cannot bound a range.
pub fn parse_timestamp(value: &str) -> error::Result<chrono::DateTime<chrono::Utc>> {
    chrono::DateTime::parse_from_rfc3339(value.trim())
        .map(|dt| dt.with_timezone(&chrono::Utc))
        .map_err(|e| error::EngineError::InvalidRange(format!("bad timestamp {:?}: {}", value, e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_ndjson_record() {
        let line = br#"{"timestamp":"2024-01-01T09:00:00.000Z","price":100.5}"#;
        let point = parse_record(line, 0).unwrap();
        assert_eq!(point.price, 100.5);
        assert_eq!(point.timestamp, parse_timestamp("2024-01-01T09:00:00Z").unwrap());
    }

    #[test]
    fn serializes_with_milliseconds() {
        let point = Point::new(parse_timestamp("2024-01-01T09:00:00Z").unwrap(), 100.5);
        let json = serde_json::to_string(&point).unwrap();
        assert_eq!(json, r#"{"timestamp":"2024-01-01T09:00:00.000Z","price":100.5}"#);
        let back: Point = serde_json::from_str(&json).unwrap();
        assert_eq!(back, point);
    }

    #[test]
    fn rejects_fragment() {
        let err = parse_record(br#"0Z","price":100.5}"#, 42).unwrap_err();
        match err {
            error::EngineError::Parse { offset, .. } => assert_eq!(offset, 42),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn rejects_bad_timestamp() {
        let err = parse_record(br#"{"timestamp":"yesterday","price":1}"#, 0).unwrap_err();
        assert!(matches!(err, error::EngineError::Parse { .. }));
    }

    #[test]
    fn range_bound_accepts_offsets() {
        let a = parse_timestamp("2024-01-01T11:00:00+02:00").unwrap();
        let b = parse_timestamp(" 2024-01-01T09:00:00Z ").unwrap();
        assert_eq!(a, b);
        assert!(matches!(
            parse_timestamp("not a date"),
            Err(error::EngineError::InvalidRange(_))
        ));
    }
}
