//! Date parsing and inclusive date-range expansion.
//!
//! The pipeline works one day at a time: each day maps to one table
//! partition and one sharded input table suffix.

use chrono::{Days, NaiveDate};

use crate::error::CoreError;

/// Canonical date format accepted on the command line and rendered into SQL.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Suffix format used by date-sharded tables (`messages_scored_20210101`).
pub const TABLE_SUFFIX_FORMAT: &str = "%Y%m%d";

/// Parse a strict `YYYY-MM-DD` date.
pub fn parse_date(s: &str) -> Result<NaiveDate, CoreError> {
    NaiveDate::parse_from_str(s, DATE_FORMAT)
        .map_err(|_| CoreError::Validation(format!("Not a valid date: '{s}'.")))
}

/// Format a date as `YYYY-MM-DD`.
pub fn as_date_str(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

/// Format a date as the `YYYYMMDD` shard suffix.
pub fn table_suffix(date: NaiveDate) -> String {
    date.format(TABLE_SUFFIX_FORMAT).to_string()
}

// ---------------------------------------------------------------------------
// DateRange
// ---------------------------------------------------------------------------

/// Inclusive range of calendar days.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    start: NaiveDate,
    end: NaiveDate,
}

impl DateRange {
    /// Build a range, rejecting `start > end`.
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, CoreError> {
        if start > end {
            return Err(CoreError::Validation(format!(
                "start date {} is after end date {}",
                as_date_str(start),
                as_date_str(end)
            )));
        }
        Ok(Self { start, end })
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }

    /// Number of days in the range (always at least 1).
    pub fn len(&self) -> usize {
        (self.end - self.start).num_days() as usize + 1
    }

    /// Always `false`; a range holds at least one day.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Iterate each day from `start` through `end`.
    pub fn days(&self) -> impl Iterator<Item = NaiveDate> {
        let end = self.end;
        std::iter::successors(Some(self.start), move |d| {
            d.checked_add_days(Days::new(1)).filter(|next| *next <= end)
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    fn date(s: &str) -> NaiveDate {
        parse_date(s).expect("valid test date")
    }

    #[test]
    fn parse_date_accepts_iso_format() {
        let d = parse_date("2021-03-04").unwrap();
        assert_eq!(d, NaiveDate::from_ymd_opt(2021, 3, 4).unwrap());
    }

    #[test]
    fn parse_date_rejects_other_formats() {
        let err = parse_date("04/03/2021").unwrap_err();
        assert_eq!(
            err.to_string(),
            "Validation failed: Not a valid date: '04/03/2021'."
        );
        assert!(parse_date("2021-02-30").is_err());
        assert!(parse_date("").is_err());
    }

    #[test]
    fn formats_date_and_suffix() {
        let d = date("2021-01-09");
        assert_eq!(as_date_str(d), "2021-01-09");
        assert_eq!(table_suffix(d), "20210109");
    }

    #[test]
    fn single_day_range() {
        let range = DateRange::new(date("2021-05-01"), date("2021-05-01")).unwrap();
        assert_eq!(range.len(), 1);
        assert_eq!(range.days().collect::<Vec<_>>(), vec![date("2021-05-01")]);
    }

    #[test]
    fn range_crosses_month_and_leap_day() {
        let range = DateRange::new(date("2020-02-27"), date("2020-03-02")).unwrap();
        let days: Vec<String> = range.days().map(as_date_str).collect();
        assert_eq!(
            days,
            vec![
                "2020-02-27",
                "2020-02-28",
                "2020-02-29",
                "2020-03-01",
                "2020-03-02"
            ]
        );
        assert_eq!(range.len(), days.len());
    }

    #[test]
    fn full_year_has_365_days() {
        let range = DateRange::new(date("2021-01-01"), date("2021-12-31")).unwrap();
        assert_eq!(range.len(), 365);
        assert_eq!(range.days().last(), Some(date("2021-12-31")));
    }

    #[test]
    fn inverted_range_is_rejected() {
        let result = DateRange::new(date("2021-02-01"), date("2021-01-31"));
        assert_matches!(result, Err(CoreError::Validation(_)));
    }
}
