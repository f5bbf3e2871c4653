use chrono::{Local, NaiveDate};

use crate::error::{ClientError, Result};

pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Today's local date as `YYYY-MM-DD`.
pub fn today() -> String {
    Local::now().date_naive().format(DATE_FORMAT).to_string()
}

/// Checks a `YYYY-MM-DD` date and returns it normalized.
pub fn normalize_date(value: &str) -> Result<String> {
    let parsed = NaiveDate::parse_from_str(value.trim(), DATE_FORMAT)
        .map_err(|err| ClientError::Validation(format!("invalid date {}: {}", value, err)))?;
    Ok(parsed.format(DATE_FORMAT).to_string())
}
