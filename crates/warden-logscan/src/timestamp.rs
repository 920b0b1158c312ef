//! Timestamp prefixes found in text logs.
//!
//! Recognized forms:
//! - Gunicorn: `[2024-05-01 12:00:00 +0000] [1234] [ERROR] ...`
//! - RFC 3339: `2024-05-01T12:00:00.123Z ...`
//! - Python logging: `2024-05-01 12:00:00,123 ERROR ...` (local time)

use chrono::{DateTime, Local, NaiveDateTime, TimeZone};

/// Parse the leading timestamp of `line` into epoch microseconds.
pub fn parse_prefix(line: &str) -> Option<u64> {
    let line = line.trim_start();
    if let Some(rest) = line.strip_prefix('[') {
        let end = rest.find(']')?;
        return DateTime::parse_from_str(&rest[..end], "%Y-%m-%d %H:%M:%S %z")
            .ok()
            .and_then(|dt| to_micros(dt.timestamp_micros()));
    }

    let first = line.split_whitespace().next()?;
    if let Ok(dt) = DateTime::parse_from_rfc3339(first) {
        return to_micros(dt.timestamp_micros());
    }

    // "YYYY-MM-DD HH:MM:SS" with an optional ",mmm" or ".mmm" suffix.
    let head = line.get(..19)?;
    let naive = NaiveDateTime::parse_from_str(head, "%Y-%m-%d %H:%M:%S").ok()?;
    let millis = line
        .get(19..23)
        .filter(|frac| frac.starts_with([',', '.']))
        .and_then(|frac| frac[1..].parse::<u32>().ok())
        .unwrap_or(0);
    let local = Local.from_local_datetime(&naive).earliest()?;
    to_micros(local.timestamp_micros() + i64::from(millis) * 1000)
}

fn to_micros(value: i64) -> Option<u64> {
    u64::try_from(value).ok()
}
