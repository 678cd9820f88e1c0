//! Session keys and timeframe arithmetic.

use chrono::{DateTime, NaiveDate, Utc};

pub const MS_PER_DAY: i64 = 86_400_000;

/// Default session key: the UTC calendar day of an epoch-millisecond
/// timestamp. Session-scoped accumulators reset exactly when this value
/// changes between consecutive admitted events.
pub fn utc_day(ts_ms: i64) -> NaiveDate {
    DateTime::<Utc>::from_timestamp_millis(ts_ms)
        .unwrap_or_default()
        .date_naive()
}

/// Parses a timeframe string ("250ms", "30s", "1m", "4h", "1d") into
/// milliseconds. Unparseable input falls back to one minute, matching the
/// historical engine default.
pub fn timeframe_ms(tf: &str) -> i64 {
    const DEFAULT: i64 = 60_000;

    let s = tf.trim().to_ascii_lowercase();
    let (digits, unit_ms) = if let Some(d) = s.strip_suffix("ms") {
        (d, 1)
    } else if let Some(d) = s.strip_suffix('s') {
        (d, 1_000)
    } else if let Some(d) = s.strip_suffix('m') {
        (d, 60_000)
    } else if let Some(d) = s.strip_suffix('h') {
        (d, 3_600_000)
    } else if let Some(d) = s.strip_suffix('d') {
        (d, MS_PER_DAY)
    } else {
        return DEFAULT;
    };

    match digits.parse::<i64>() {
        Ok(n) if n > 0 => n * unit_ms,
        _ => DEFAULT,
    }
}

/// Start of the fixed time bucket containing `ts_ms`.
pub fn bucket_start(ts_ms: i64, bucket_ms: i64) -> i64 {
    if bucket_ms <= 0 {
        return ts_ms;
    }
    ts_ms.div_euclid(bucket_ms) * bucket_ms
}
