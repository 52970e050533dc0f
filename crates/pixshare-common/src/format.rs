//! Display formatting for sizes and timestamps.

use chrono::{DateTime, Utc};

const UNITS: [&str; 4] = ["Bytes", "KB", "MB", "GB"];

/// Format a byte count with 1024-based units and at most two decimals.
///
/// Trailing zeros are dropped, so `1024` renders as `1 KB` and `1536` as
/// `1.5 KB`. Anything at or above 1024 GB stays in GB.
pub fn format_bytes(bytes: u64) -> String {
    if bytes == 0 {
        return "0 Bytes".to_string();
    }

    let mut unit = 0;
    while unit < UNITS.len() - 1 && bytes >= 1024u64.pow(unit as u32 + 1) {
        unit += 1;
    }

    let value = bytes as f64 / 1024f64.powi(unit as i32);
    let fixed = format!("{:.2}", value);
    let trimmed = fixed.trim_end_matches('0').trim_end_matches('.');

    format!("{} {}", trimmed, UNITS[unit])
}

/// Format a timestamp the way share pages and listings show it.
pub fn format_timestamp(at: &DateTime<Utc>) -> String {
    at.format("%b %-d, %Y %H:%M UTC").to_string()
}
