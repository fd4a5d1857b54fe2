use anyhow::Result;
use chrono::{DateTime, Utc};
use chrono_english::{parse_date_string, Dialect};

/// Parse an RFC 3339 timestamp, or a natural-language time relative to `now`.
pub fn parse_time(input: &str, now: DateTime<Utc>) -> Result<DateTime<Utc>> {
    if let Ok(at) = DateTime::parse_from_rfc3339(input.trim()) {
        return Ok(at.with_timezone(&Utc));
    }
    parse_date_string(input, now, Dialect::Us)
        .map_err(|e| anyhow::anyhow!("Failed to parse time '{}': {}", input, e))
}
