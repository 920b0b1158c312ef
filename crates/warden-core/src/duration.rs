//! Duration strings like "5s", "500ms", "5m", "1h".

use std::time::Duration;

/// Parse a duration string. A bare number is read as seconds.
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    if let Some(ms) = s.strip_suffix("ms") {
        ms.trim().parse::<u64>().ok().map(Duration::from_millis)
    } else if let Some(secs) = s.strip_suffix('s') {
        secs.trim().parse::<u64>().ok().map(Duration::from_secs)
    } else if let Some(mins) = s.strip_suffix('m') {
        scaled(mins, 60)
    } else if let Some(hours) = s.strip_suffix('h') {
        scaled(hours, 3600)
    } else {
        s.parse::<u64>().ok().map(Duration::from_secs)
    }
}

/// `n * unit` seconds, `None` on overflow.
fn scaled(n: &str, unit: u64) -> Option<Duration> {
    n.trim()
        .parse::<u64>()
        .ok()
        .and_then(|n| n.checked_mul(unit))
        .map(Duration::from_secs)
}
