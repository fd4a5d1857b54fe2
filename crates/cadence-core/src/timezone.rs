use crate::error::CoreError;
use chrono::{DateTime, Duration, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use std::str::FromStr;

/// Validate IANA timezone name
pub fn validate_timezone(timezone: &str) -> Result<(), CoreError> {
    parse_timezone(timezone).map(|_| ())
}

pub fn parse_timezone(timezone: &str) -> Result<Tz, CoreError> {
    Tz::from_str(timezone)
        .map_err(|_| CoreError::InvalidInput(format!("Invalid timezone: {}", timezone)))
}

/// Resolve a wall-clock time in `tz` to UTC across DST transitions.
///
/// Ambiguous times (fall back) take the earliest instant. Times that do not
/// exist (spring forward) move one hour later.
pub fn resolve_local(tz: &Tz, local: NaiveDateTime) -> Option<DateTime<Utc>> {
    match tz.from_local_datetime(&local).earliest() {
        Some(local_dt) => Some(local_dt.with_timezone(&Utc)),
        None => tz
            .from_local_datetime(&(local + Duration::hours(1)))
            .earliest()
            .map(|local_dt| local_dt.with_timezone(&Utc)),
    }
}
