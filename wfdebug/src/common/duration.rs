//! Human-friendly duration strings such as `90s`, `15m`, `1h` or `7d`

use std::time::Duration;

/// Parse `<n>[s|m|h|d]` into a [`Duration`]
///
/// A bare number is read as seconds.
pub fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("empty duration string".to_string());
    }

    let (value_str, multiplier) = if let Some(stripped) = s.strip_suffix('s') {
        (stripped, 1)
    } else if let Some(stripped) = s.strip_suffix('m') {
        (stripped, 60)
    } else if let Some(stripped) = s.strip_suffix('h') {
        (stripped, 3_600)
    } else if let Some(stripped) = s.strip_suffix('d') {
        (stripped, 86_400)
    } else {
        (s, 1)
    };

    let value: u64 = value_str
        .trim()
        .parse()
        .map_err(|_| format!("invalid duration value: {s}"))?;

    value
        .checked_mul(multiplier)
        .map(Duration::from_secs)
        .ok_or_else(|| format!("duration out of range: {s}"))
}

/// Render a [`Duration`] back into the largest whole unit
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs != 0 && secs % 86_400 == 0 {
        format!("{}d", secs / 86_400)
    } else if secs != 0 && secs % 3_600 == 0 {
        format!("{}h", secs / 3_600)
    } else if secs != 0 && secs % 60 == 0 {
        format!("{}m", secs / 60)
    } else {
        format!("{secs}s")
    }
}
