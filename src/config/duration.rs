//! Human-readable durations for the `timeouts:` section.
//!
//! Values look like `"500ms"`, `"30s"`, `"5m"`, or a bare number of seconds.

use serde::{Deserialize, Deserializer, Serializer};
use std::time::Duration;

/// Parse a duration string like "10s", "30s", "1m", "500ms".
///
/// Returns `None` if the string cannot be parsed.
///
/// ```
/// use mysql_service::config::parse_duration_string;
/// use std::time::Duration;
///
/// assert_eq!(parse_duration_string("5s"), Some(Duration::from_secs(5)));
/// assert_eq!(parse_duration_string("500ms"), Some(Duration::from_millis(500)));
/// assert_eq!(parse_duration_string("2m"), Some(Duration::from_secs(120)));
/// ```
pub fn parse_duration_string(s: &str) -> Option<Duration> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }

    let (digits, millis_per_unit) = if let Some(ms) = s.strip_suffix("ms") {
        (ms, 1)
    } else if let Some(secs) = s.strip_suffix('s') {
        (secs, 1_000)
    } else if let Some(mins) = s.strip_suffix('m') {
        (mins, 60_000)
    } else {
        (s, 1_000)
    };

    digits
        .parse::<u64>()
        .ok()
        .and_then(|n| n.checked_mul(millis_per_unit))
        .map(Duration::from_millis)
}

/// Render a duration back into the shortest exact string form.
pub fn format_duration(d: &Duration) -> String {
    let millis = d.as_millis();
    if millis % 60_000 == 0 && millis > 0 {
        format!("{}m", millis / 60_000)
    } else if millis % 1000 == 0 {
        format!("{}s", millis / 1000)
    } else {
        format!("{}ms", millis)
    }
}

pub(crate) fn deserialize<'de, D>(deserializer: D) -> std::result::Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Seconds(u64),
        Text(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Seconds(secs) => Ok(Duration::from_secs(secs)),
        Raw::Text(text) => parse_duration_string(&text).ok_or_else(|| {
            serde::de::Error::custom(format!(
                "invalid duration '{}'. Use formats like '5s', '30s', '1m', '500ms'",
                text
            ))
        }),
    }
}

pub(crate) fn serialize<S>(d: &Duration, serializer: S) -> std::result::Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&format_duration(d))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_duration_units() {
        assert_eq!(parse_duration_string("30s"), Some(Duration::from_secs(30)));
        assert_eq!(parse_duration_string("5m"), Some(Duration::from_secs(300)));
        assert_eq!(
            parse_duration_string(" 100ms "),
            Some(Duration::from_millis(100))
        );
        assert_eq!(parse_duration_string("10"), Some(Duration::from_secs(10)));
    }

    #[test]
    fn test_parse_duration_invalid() {
        assert_eq!(parse_duration_string(""), None);
        assert_eq!(parse_duration_string("soon"), None);
        assert_eq!(parse_duration_string("5h"), None);
        assert_eq!(parse_duration_string("-5s"), None);
    }

    #[test]
    fn test_format_duration_picks_largest_exact_unit() {
        assert_eq!(format_duration(&Duration::from_secs(300)), "5m");
        assert_eq!(format_duration(&Duration::from_secs(30)), "30s");
        assert_eq!(format_duration(&Duration::from_millis(1500)), "1500ms");
        assert_eq!(format_duration(&Duration::ZERO), "0s");
    }
}
