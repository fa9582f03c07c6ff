use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::de::DeserializeOwned;

use crate::errors::AppError;

/// Accepts RFC3339, ISO local datetimes, the SQLite `CURRENT_TIMESTAMP` format and bare dates.
///
/// Returns the wall-clock time as written. An RFC3339 offset is dropped, not applied, so the
/// calendar day stays the one in the text.
pub fn parse_local_datetime(s: &str) -> Result<NaiveDateTime, AppError> {
    let s = s.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.naive_local());
    }

    // SQLite default timestamp format: "YYYY-MM-DD HH:MM:SS" (with optional fractional seconds)
    // and its ISO form with a 'T' separator and no offset
    for format in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, format) {
            return Ok(naive);
        }
    }

    // Date-only format: "YYYY-MM-DD"
    if let Ok(naive_date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return naive_date
            .and_hms_opt(0, 0, 0)
            .ok_or_else(|| AppError::internal("invalid datetime: date out of range".to_string()));
    }

    Err(AppError::internal(format!("invalid datetime: {}", s)))
}

/// Decodes a JSON text column, naming the column and the JSON path on failure.
pub fn parse_json_column<T: DeserializeOwned>(column: &str, raw: &str) -> Result<T, AppError> {
    let de = &mut serde_json::Deserializer::from_str(raw);
    serde_path_to_error::deserialize(de).map_err(|err| {
        AppError::internal(format!("invalid JSON in {column} at '{}': {}", err.path(), err.inner()))
    })
}
