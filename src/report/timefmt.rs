//! Date formatting for report tables.
//!
//! Relative phrases follow the vocabulary dashboard users already know
//! ("about 2 hours ago", "3 days ago", "over 1 year ago"). Months are
//! 30 days and a year is twelve of them.

use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, Utc};
use std::fmt::Write;

const MINUTES_IN_HOUR: i64 = 60;
const MINUTES_IN_DAY: i64 = 1440;
const MINUTES_IN_MONTH: i64 = 43_200;
const MINUTES_IN_TWO_MONTHS: i64 = 86_400;

/// Format a timestamp with a chrono format string, or `No date`.
///
/// A format string chrono cannot render yields `Invalid date`.
pub fn format_date(timestamp: Option<DateTime<Utc>>, format: &str) -> String {
    let Some(ts) = timestamp else {
        return "No date".to_string();
    };

    let mut out = String::new();
    match write!(out, "{}", ts.format(format)) {
        Ok(()) => out,
        Err(_) => "Invalid date".to_string(),
    }
}

/// Whether chrono understands every specifier in `format`.
pub fn is_valid_format(format: &str) -> bool {
    !StrftimeItems::new(format).any(|item| matches!(item, Item::Error))
}

/// Distance between `timestamp` and `now`, with an `ago`/`in` suffix.
pub fn format_time_ago(timestamp: Option<DateTime<Utc>>, now: DateTime<Utc>) -> String {
    let Some(ts) = timestamp else {
        return "No date".to_string();
    };

    let seconds = (now - ts).num_seconds();
    let distance = distance_in_words(seconds.unsigned_abs());

    if seconds >= 0 {
        format!("{} ago", distance)
    } else {
        format!("in {}", distance)
    }
}

fn distance_in_words(seconds: u64) -> String {
    let seconds = seconds as i64;
    let minutes = (seconds as f64 / 60.0).round() as i64;

    if minutes < 1 {
        return "less than a minute".to_string();
    }
    if minutes < 2 {
        return "1 minute".to_string();
    }
    if minutes < 45 {
        return format!("{} minutes", minutes);
    }
    if minutes < 90 {
        return "about 1 hour".to_string();
    }
    if minutes < MINUTES_IN_DAY {
        let hours = (minutes as f64 / MINUTES_IN_HOUR as f64).round() as i64;
        return format!("about {} hours", hours);
    }
    if minutes < 2520 {
        return "1 day".to_string();
    }
    if minutes < MINUTES_IN_MONTH {
        let days = (minutes as f64 / MINUTES_IN_DAY as f64).round() as i64;
        return format!("{} days", days);
    }
    if minutes < MINUTES_IN_TWO_MONTHS {
        let months = (minutes as f64 / MINUTES_IN_MONTH as f64).round() as i64;
        return plural("about", months, "month");
    }

    let months = seconds / (MINUTES_IN_MONTH * 60);
    if months < 12 {
        let months = (minutes as f64 / MINUTES_IN_MONTH as f64).round() as i64;
        return format!("{} months", months);
    }

    let years = months / 12;
    let remainder = months % 12;
    if remainder < 3 {
        plural("about", years, "year")
    } else if remainder < 9 {
        plural("over", years, "year")
    } else {
        plural("almost", years + 1, "year")
    }
}

fn plural(prefix: &str, count: i64, unit: &str) -> String {
    if count == 1 {
        format!("{} 1 {}", prefix, unit)
    } else {
        format!("{} {} {}s", prefix, count, unit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    fn ago(d: Duration) -> String {
        format_time_ago(Some(now() - d), now())
    }

    #[test]
    fn test_format_date() {
        let ts = Utc.with_ymd_and_hms(2024, 3, 5, 14, 7, 0).unwrap();
        assert_eq!(format_date(Some(ts), "%b %-d, %Y"), "Mar 5, 2024");
        assert_eq!(format_date(Some(ts), "%b %-d, %Y %H:%M"), "Mar 5, 2024 14:07");
        assert_eq!(format_date(None, "%b %-d, %Y"), "No date");
    }

    #[test]
    fn test_bad_format_does_not_panic() {
        let ts = Utc.with_ymd_and_hms(2024, 3, 5, 14, 7, 0).unwrap();
        assert_eq!(format_date(Some(ts), "%Q"), "Invalid date");
        assert!(!is_valid_format("%Q"));
        assert!(is_valid_format("%b %-d, %Y %H:%M"));
    }

    #[test]
    fn test_short_distances() {
        assert_eq!(ago(Duration::seconds(10)), "less than a minute ago");
        assert_eq!(ago(Duration::seconds(70)), "1 minute ago");
        assert_eq!(ago(Duration::minutes(12)), "12 minutes ago");
        assert_eq!(ago(Duration::minutes(60)), "about 1 hour ago");
        assert_eq!(ago(Duration::hours(5)), "about 5 hours ago");
    }

    #[test]
    fn test_day_and_month_distances() {
        assert_eq!(ago(Duration::hours(30)), "1 day ago");
        assert_eq!(ago(Duration::days(3)), "3 days ago");
        assert_eq!(ago(Duration::days(35)), "about 1 month ago");
        assert_eq!(ago(Duration::days(120)), "4 months ago");
    }

    #[test]
    fn test_year_distances() {
        assert_eq!(ago(Duration::days(370)), "about 1 year ago");
        assert_eq!(ago(Duration::days(365 + 180)), "over 1 year ago");
        assert_eq!(ago(Duration::days(365 + 330)), "almost 2 years ago");
    }

    #[test]
    fn test_year_is_twelve_months() {
        assert_eq!(ago(Duration::days(359)), "12 months ago");
        assert_eq!(ago(Duration::days(361)), "about 1 year ago");
    }

    #[test]
    fn test_future_and_missing() {
        assert_eq!(
            format_time_ago(Some(now() + Duration::hours(1)), now()),
            "in about 1 hour"
        );
        assert_eq!(format_time_ago(None, now()), "No date");
    }
}
