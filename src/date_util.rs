use chrono::{Duration, NaiveDate};

use crate::error::{Error, Result};

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Parse a `YYYY-MM-DD` string.
pub fn parse_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), DATE_FORMAT).map_err(|_| Error::DateParse(s.to_string()))
}

pub fn format_date(d: NaiveDate) -> String {
    d.format(DATE_FORMAT).to_string()
}

/// Abbreviated weekday name ("Mon", "Tue", ...).
pub fn weekday_abbrev(d: NaiveDate) -> String {
    d.format("%a").to_string()
}

/// All dates from `start` through `end`, inclusive. Empty if `start > end`.
pub fn date_range(start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
    if start > end {
        return vec![];
    }
    let days = (end - start).num_days();
    (0..=days).map(|i| start + Duration::days(i)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn test_parse_and_format() {
        assert_eq!(parse_date("2024-02-29").unwrap(), d(2024, 2, 29));
        assert_eq!(format_date(d(2024, 3, 5)), "2024-03-05");
        assert!(parse_date("2023-02-29").is_err());
        assert!(parse_date("not a date").is_err());
    }

    #[test]
    fn test_weekday_abbrev() {
        assert_eq!(weekday_abbrev(d(2024, 1, 1)), "Mon");
        assert_eq!(weekday_abbrev(d(2024, 1, 7)), "Sun");
    }

    #[test]
    fn test_date_range() {
        let r = date_range(d(2024, 2, 27), d(2024, 3, 1));
        assert_eq!(r, vec![d(2024, 2, 27), d(2024, 2, 28), d(2024, 2, 29), d(2024, 3, 1)]);
        assert_eq!(date_range(d(2024, 1, 1), d(2024, 1, 1)), vec![d(2024, 1, 1)]);
        assert!(date_range(d(2024, 1, 2), d(2024, 1, 1)).is_empty());
    }
}
