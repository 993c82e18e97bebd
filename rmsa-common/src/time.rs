//! Timestamp utilities
//!
//! Survey backends export save times in several shapes: epoch seconds,
//! RFC 3339 with or without `Z`, and naive ISO-like strings. Everything is
//! normalised to `DateTime<Utc>`; anything unparsable is `None`, never an error.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde_json::Value;

/// Offset-aware formats tried after RFC 3339
const OFFSET_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f%z", "%Y-%m-%dT%H:%M:%S%z"];

/// Naive formats, interpreted as UTC
const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
];

/// Get current UTC timestamp
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Parse a timestamp string in any of the accepted literal/ISO formats
pub fn parse_timestamp_str(raw: &str) -> Option<DateTime<Utc>> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }

    for fmt in OFFSET_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(s, fmt) {
            return Some(dt.with_timezone(&Utc));
        }
    }

    for fmt in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }

    None
}

/// Parse a JSON scalar as a timestamp
///
/// Numbers are Unix epoch seconds (fractional part kept to the nanosecond).
pub fn parse_timestamp_value(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::Number(n) => {
            let secs = n.as_f64()?;
            if !secs.is_finite() {
                return None;
            }
            let whole = secs.floor();
            let nanos = ((secs - whole) * 1e9).round() as u32;
            Utc.timestamp_opt(whole as i64, nanos.min(999_999_999)).single()
        }
        Value::String(s) => parse_timestamp_str(s),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;
    use serde_json::json;

    #[test]
    fn test_now_returns_valid_timestamp() {
        let timestamp = now();
        assert!(timestamp.timestamp() > 946_684_800); // 2000-01-01 00:00:00 UTC
    }

    #[test]
    fn test_rfc3339_with_z_suffix() {
        let ts = parse_timestamp_str("2025-03-01T10:15:30Z").unwrap();
        assert_eq!(ts.to_rfc3339(), "2025-03-01T10:15:30+00:00");
    }

    #[test]
    fn test_offset_is_normalised_to_utc() {
        let ts = parse_timestamp_str("2025-03-01T10:15:30+02:00").unwrap();
        assert_eq!(ts.hour(), 8);
    }

    #[test]
    fn test_compact_offset_format() {
        let ts = parse_timestamp_str("2025-03-01T10:15:30.250+0100").unwrap();
        assert_eq!(ts.hour(), 9);
        assert_eq!(ts.nanosecond(), 250_000_000);
    }

    #[test]
    fn test_naive_formats_read_as_utc() {
        let a = parse_timestamp_str("2025-03-01T10:15:30").unwrap();
        let b = parse_timestamp_str("2025-03-01 10:15:30").unwrap();
        let c = parse_timestamp_str("2025-03-01T10:15:30.5").unwrap();
        assert_eq!(a, b);
        assert!(c > a);
    }

    #[test]
    fn test_unparsable_yields_none() {
        assert!(parse_timestamp_str("yesterday afternoon").is_none());
        assert!(parse_timestamp_str("   ").is_none());
        assert!(parse_timestamp_value(&json!(true)).is_none());
        assert!(parse_timestamp_value(&json!(null)).is_none());
    }

    #[test]
    fn test_epoch_seconds() {
        let ts = parse_timestamp_value(&json!(1_700_000_000)).unwrap();
        assert_eq!(ts.timestamp(), 1_700_000_000);

        let frac = parse_timestamp_value(&json!(1_700_000_000.5)).unwrap();
        assert_eq!(frac.timestamp_subsec_millis(), 500);
    }
}
