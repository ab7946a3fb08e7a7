use chrono::{DateTime, Datelike, NaiveDate, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Inclusive report date range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    /// Parse `YYYY-MM-DD` bounds. The start must not be after the end.
    pub fn parse(start: &str, end: &str) -> Result<Self> {
        let start = parse_date("start_date", start)?;
        let end = parse_date("end_date", end)?;
        if start > end {
            return Err(Error::InvalidArgument(format!(
                "start_date {start} is after end_date {end}"
            )));
        }
        Ok(Self { start, end })
    }

    /// Number of days covered, counting both ends.
    pub fn days(&self) -> i64 {
        (self.end - self.start).num_days() + 1
    }

    pub fn start_key(&self) -> String {
        self.start.format("%Y-%m-%d").to_string()
    }

    pub fn end_key(&self) -> String {
        self.end.format("%Y-%m-%d").to_string()
    }
}

fn parse_date(field: &str, s: &str) -> Result<NaiveDate> {
    let s = s.trim();
    if s.is_empty() {
        return Err(Error::InvalidArgument(format!("{field} is required")));
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .map_err(|e| Error::InvalidArgument(format!("{field} '{s}' is not YYYY-MM-DD: {e}")))
}

/// Calendar-month key (`YYYY-MM`) used to partition usage counters.
pub fn month_key(at: DateTime<Utc>) -> String {
    format!("{}-{:02}", at.year(), at.month())
}

/// First day of the month after `at`; the day usage counters roll over.
pub fn next_month_start(at: DateTime<Utc>) -> NaiveDate {
    let (year, month) = if at.month() == 12 {
        (at.year() + 1, 1)
    } else {
        (at.year(), at.month() + 1)
    };
    NaiveDate::from_ymd_opt(year, month, 1).unwrap_or_else(|| at.date_naive())
}

/// RFC 3339 UTC timestamp with second precision. Lexically ordered.
pub fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Truncate to at most `max` characters without splitting a code point.
pub fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((i, _)) => &s[..i],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_parse_range() {
        let r = DateRange::parse("2025-01-01", "2025-01-31").unwrap();
        assert_eq!(r.days(), 31);
        assert_eq!(r.start_key(), "2025-01-01");
        assert_eq!(r.end_key(), "2025-01-31");
    }

    #[test]
    fn test_parse_range_single_day() {
        let r = DateRange::parse("2025-03-05", "2025-03-05").unwrap();
        assert_eq!(r.days(), 1);
    }

    #[test]
    fn test_parse_range_rejects_inverted() {
        let err = DateRange::parse("2025-02-01", "2025-01-01").unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[test]
    fn test_parse_range_rejects_missing_and_malformed() {
        assert!(matches!(
            DateRange::parse("", "2025-01-01"),
            Err(Error::InvalidArgument(_))
        ));
        assert!(matches!(
            DateRange::parse("2025/01/01", "2025-01-02"),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_month_key() {
        let at = Utc.with_ymd_and_hms(2025, 3, 9, 12, 0, 0).unwrap();
        assert_eq!(month_key(at), "2025-03");
    }

    #[test]
    fn test_next_month_start() {
        let at = Utc.with_ymd_and_hms(2025, 12, 31, 23, 0, 0).unwrap();
        assert_eq!(
            next_month_start(at),
            NaiveDate::from_ymd_opt(2026, 1, 1).unwrap()
        );
        let at = Utc.with_ymd_and_hms(2025, 2, 10, 0, 0, 0).unwrap();
        assert_eq!(
            next_month_start(at),
            NaiveDate::from_ymd_opt(2025, 3, 1).unwrap()
        );
    }

    #[test]
    fn test_timestamp_is_second_precision_utc() {
        let at = Utc.with_ymd_and_hms(2025, 6, 1, 8, 30, 15).unwrap();
        assert_eq!(timestamp(at), "2025-06-01T08:30:15Z");
    }

    #[test]
    fn test_truncate_multibyte() {
        assert_eq!(truncate("改善提案です", 2), "改善");
        assert_eq!(truncate("abc", 10), "abc");
    }
}
