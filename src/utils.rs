use chrono::{DateTime, Utc};

use crate::db::row_parsers::parse_local_datetime;

pub fn utc_now() -> DateTime<Utc> {
    Utc::now()
}

/// `YYYY-MM` of a business date, or `None` when it is missing or unparseable.
///
/// The month is read from the date as written. An offset timestamp keeps its own calendar day
/// and is not shifted to UTC first.
pub fn period_key(business_date: Option<&str>) -> Option<String> {
    let raw = business_date?.trim();
    if raw.is_empty() {
        return None;
    }
    parse_local_datetime(raw).ok().map(|naive| naive.format("%Y-%m").to_string())
}
