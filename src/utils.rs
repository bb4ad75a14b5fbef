use crate::error;

use rust_decimal::prelude::ToPrimitive;

/// Configures a custom Rayon thread pool with specified size.
///
/// Used by the CLI to bound the pool that runs background work such as the
/// stats warm-up.
///
/// # Arguments
/// * `num_threads` - Desired number of threads for the pool.
///
/// # Returns
/// * `anyhow::Result<rayon::ThreadPool>` - Created thread pool or an error if creation fails.
pub fn configure_thread_pool(num_threads: usize) -> anyhow::Result<rayon::ThreadPool> {
    rayon::ThreadPoolBuilder::new()
        .num_threads(num_threads)
        .thread_name(|i| format!("price-scan-{}", i))
        .build()
        .map_err(|e| anyhow::anyhow!("Failed to build thread pool: {}", e))
}

/// Converts an `f64` to a `Decimal` through its shortest round-trip text form.
///
/// `2.345_f64` becomes exactly `2.345`, not the binary neighbour
/// `2.34499999...`, so half-up rounding behaves the way a reader expects.
pub fn to_decimal(value: f64) -> error::Result<rust_decimal::Decimal> {
    value
        .to_string()
        .parse::<rust_decimal::Decimal>()
        .map_err(|e| error::EngineError::InvalidState(format!("cannot represent {} as decimal: {}", value, e)))
}

/// Converts a `Decimal` back to `f64`.
pub fn from_decimal(value: rust_decimal::Decimal) -> error::Result<f64> {
    value
        .to_f64()
        .ok_or_else(|| error::EngineError::InvalidState(format!("cannot represent {} as f64", value)))
}

/// Rounds to `dp` decimal places, ties away from zero.
pub fn round_half_up(value: rust_decimal::Decimal, dp: u32) -> rust_decimal::Decimal {
    value.round_dp_with_strategy(dp, rust_decimal::RoundingStrategy::MidpointAwayFromZero)
}

/// Rounds a monetary amount to cents.
pub fn round_to_cents(value: f64) -> error::Result<f64> {
    from_decimal(round_half_up(to_decimal(value)?, 2))
}

/// Formats a timestamp as ISO-8601 with millisecond precision.
///
/// # Example Output
/// ```text
/// 2025-01-01T00:00:00.000Z
/// ```
pub fn format_timestamp(ts: &chrono::DateTime<chrono::Utc>) -> String {
    ts.to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

/// Serde adapter writing timestamps in the `format_timestamp` form.
pub fn serialize_timestamp<S>(ts: &chrono::DateTime<chrono::Utc>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.serialize_str(&format_timestamp(ts))
}
