//! Time utility functions

use chrono::{DateTime, NaiveDateTime, Utc};

/// Convert milliseconds since Unix epoch to DateTime<Utc>
pub fn millis_to_datetime(millis: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp_millis(millis)
}

/// Parse an RFC 3339 timestamp, or a naive `YYYY-MM-DD HH:MM:SS[.f]` one as UTC
pub fn parse_timestamp(ts: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(ts) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(ts, "%Y-%m-%d %H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    #[test]
    fn test_millis_to_datetime_known_value() {
        // 2024-01-01 00:00:00 UTC
        let dt = millis_to_datetime(1_704_067_200_000).unwrap();
        assert_eq!(dt.year(), 2024);
        assert_eq!(dt.month(), 1);
        assert_eq!(dt.hour(), 0);
    }

    #[test]
    fn test_millis_to_datetime_with_subsecond() {
        let dt = millis_to_datetime(1_500).unwrap();
        assert_eq!(dt.timestamp(), 1);
        assert_eq!(dt.timestamp_subsec_millis(), 500);
    }

    #[test]
    fn test_parse_timestamp_rfc3339_with_offset() {
        let dt = parse_timestamp("2024-01-15T12:30:45+02:00").unwrap();
        assert_eq!(dt.hour(), 10);
        assert_eq!(dt.minute(), 30);
    }

    #[test]
    fn test_parse_timestamp_naive() {
        let dt = parse_timestamp("2024-01-15 12:30:45").unwrap();
        assert_eq!(dt.hour(), 12);
        let dt = parse_timestamp("2024-01-15 12:30:45.250").unwrap();
        assert_eq!(dt.timestamp_subsec_millis(), 250);
    }

    #[test]
    fn test_parse_timestamp_invalid() {
        assert!(parse_timestamp("yesterday").is_none());
        assert!(parse_timestamp("").is_none());
    }
}
