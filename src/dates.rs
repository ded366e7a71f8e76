use chrono::{Datelike, Months, NaiveDate};

use crate::foundation::{
    core::YearRange,
    error::{AnimatorError, AnimatorResult},
};

/// First-of-month dates for every month touched by `[start, end]`, ascending.
///
/// Returns an empty list when `start > end`.
pub fn monthly_dates(start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
    if start > end {
        return Vec::new();
    }
    let Some(mut cursor) = first_of_month(start) else {
        return Vec::new();
    };

    let mut out = Vec::new();
    while cursor <= end {
        out.push(cursor);
        match cursor.checked_add_months(Months::new(1)) {
            Some(next) => cursor = next,
            None => break,
        }
    }
    out
}

/// Monthly dates covering `start-01-01 ..= end-12-31` of a year range.
pub fn monthly_dates_for_years(range: YearRange) -> AnimatorResult<Vec<NaiveDate>> {
    let start = NaiveDate::from_ymd_opt(range.start(), 1, 1)
        .ok_or_else(|| AnimatorError::validation(format!("year {} out of range", range.start())))?;
    let end = NaiveDate::from_ymd_opt(range.end(), 12, 31)
        .ok_or_else(|| AnimatorError::validation(format!("year {} out of range", range.end())))?;
    Ok(monthly_dates(start, end))
}

/// Same as [`monthly_dates`] over `YYYY-MM-DD` strings.
pub fn monthly_date_strings(start: &str, end: &str) -> AnimatorResult<Vec<String>> {
    let start = parse_iso_date(start)?;
    let end = parse_iso_date(end)?;
    Ok(monthly_dates(start, end)
        .into_iter()
        .map(format_iso_date)
        .collect())
}

pub fn parse_iso_date(s: &str) -> AnimatorResult<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .map_err(|e| AnimatorError::validation(format!("invalid date '{s}': {e}")))
}

pub fn format_iso_date(d: NaiveDate) -> String {
    d.format("%Y-%m-%d").to_string()
}

fn first_of_month(d: NaiveDate) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(d.year(), d.month(), 1)
}
