use cadence_core::error::CoreError;
use cadence_core::timezone::{parse_timezone, validate_timezone};
use chrono::{DateTime, Utc};

/// Detect system timezone
pub fn detect_system_timezone() -> String {
    if let Ok(tz) = std::env::var("TZ") {
        if !tz.is_empty() && validate_timezone(&tz).is_ok() {
            return tz;
        }
    }

    if let Ok(tz) = iana_time_zone::get_timezone() {
        if validate_timezone(&tz).is_ok() {
            return tz;
        }
    }

    "UTC".to_string()
}

const COMMON_TIMEZONES: [&str; 18] = [
    "UTC",
    "America/New_York",
    "America/Chicago",
    "America/Denver",
    "America/Los_Angeles",
    "America/Sao_Paulo",
    "Europe/London",
    "Europe/Paris",
    "Europe/Berlin",
    "Europe/Madrid",
    "Europe/Istanbul",
    "Asia/Dubai",
    "Asia/Kolkata",
    "Asia/Shanghai",
    "Asia/Tokyo",
    "Australia/Sydney",
    "Pacific/Auckland",
    "Africa/Johannesburg",
];

/// Suggest similar timezone for invalid input
pub fn suggest_timezone(invalid: &str) -> Vec<&'static str> {
    let invalid_lower = invalid.to_lowercase();
    let mut matches: Vec<_> = COMMON_TIMEZONES
        .into_iter()
        .filter(|tz| {
            let tz_lower = tz.to_lowercase();
            tz_lower.contains(&invalid_lower)
                || invalid_lower.contains(&tz_lower)
                || tz.split('/').any(|part| part.to_lowercase().contains(&invalid_lower))
        })
        .collect();
    matches.truncate(5);
    matches
}

/// Convert user-friendly timezone input to an IANA name
pub fn normalize_timezone_input(input: &str) -> Result<String, CoreError> {
    if validate_timezone(input).is_ok() {
        return Ok(input.to_string());
    }

    let normalized = match input.to_lowercase().as_str() {
        "est" | "eastern" => "America/New_York",
        "cst" | "central" => "America/Chicago",
        "mst" | "mountain" => "America/Denver",
        "pst" | "pacific" => "America/Los_Angeles",
        "gmt" | "utc" => "UTC",
        "bst" | "london" => "Europe/London",
        "cet" | "paris" => "Europe/Paris",
        "jst" | "tokyo" => "Asia/Tokyo",
        _ => {
            let suggestions = suggest_timezone(input);
            let hint = if suggestions.is_empty() {
                "Use IANA names like 'America/New_York'".to_string()
            } else {
                format!("Did you mean: {}?", suggestions.join(", "))
            };
            return Err(CoreError::InvalidInput(format!("Unknown timezone '{}'. {}", input, hint)));
        }
    };

    validate_timezone(normalized)?;
    Ok(normalized.to_string())
}

/// `2025-03-10 09:00 (EDT)` style rendering in the given zone
pub fn format_in_timezone(datetime: DateTime<Utc>, timezone: &str) -> String {
    match parse_timezone(timezone) {
        Ok(tz) => datetime.with_timezone(&tz).format("%Y-%m-%d %H:%M (%Z)").to_string(),
        Err(_) => datetime.format("%Y-%m-%d %H:%M UTC").to_string(),
    }
}
