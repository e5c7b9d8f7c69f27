// src/utils/timestamp.rs

//! Validation of wayback timestamps (`yyyyMMddHHmmss`, truncatable to `yyyy`).

use chrono::{Datelike, NaiveDate};

use crate::error::{AppError, Result};

const MIN: i64 = 1001;
const MAX: i64 = 9999_1231_235959;

/// Validate an optional timestamp; `name` is used in the error message.
///
/// A timestamp may be truncated after any component, so `2004`, `200402`
/// and `20040215103000` are all accepted. Each component that is present
/// is range checked.
pub fn validate_timestamp(value: Option<i64>, name: &str) -> Result<()> {
    let Some(value) = value else {
        return Ok(());
    };

    if !(MIN..=MAX).contains(&value) {
        return Err(AppError::validation(format!(
            "{name} timestamp invalid. Value expected to be in the range '{MIN}' to '{MAX}'."
        )));
    }

    let digits = value.to_string();
    let field = |range: std::ops::Range<usize>| -> Option<u32> {
        digits.get(range).and_then(|s| s.parse().ok())
    };

    let year = field(0..4).unwrap_or_default() as i32;

    let Some(month) = field(4..6) else {
        return Ok(());
    };
    if !(1..=12).contains(&month) {
        return Err(AppError::validation(format!(
            "{name} timestamp invalid. Month value must be in the range 1 - 12."
        )));
    }

    let Some(day) = field(6..8) else {
        return Ok(());
    };
    let days_in_month = days_in_month(year, month);
    if !(1..=days_in_month).contains(&day) {
        return Err(AppError::validation(format!(
            "{name} timestamp invalid. Day value must be in the range 1 - {days_in_month}."
        )));
    }

    for (range, label, upper) in [(8..10, "Hour", 23), (10..12, "Minute", 59), (12..14, "Second", 59)] {
        let Some(component) = field(range) else {
            return Ok(());
        };
        if component > upper {
            return Err(AppError::validation(format!(
                "{name} timestamp invalid. {label} value must be in the range 0 - {upper}."
            )));
        }
    }

    Ok(())
}

fn days_in_month(year: i32, month: u32) -> u32 {
    let (next_year, next_month) = if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    };
    NaiveDate::from_ymd_opt(next_year, next_month, 1)
        .and_then(|d| d.pred_opt())
        .map(|d| d.day0() + 1)
        .unwrap_or(31)
}
