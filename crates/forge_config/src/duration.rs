//! Human-readable duration parsing for timeouts.

use std::time::Duration;

use serde::{Deserialize, Deserializer};

use crate::error::ConfigError;

/// Parses a human-readable duration string.
///
/// Supports units: `ms`, `s`, `m`, `h`.
/// Examples: `"500ms"`, `"90s"`, `"10m"`, `"1h"`.
pub fn parse_duration(s: &str) -> Result<Duration, ConfigError> {
    let s = s.trim();
    if s.is_empty() {
        return Err(ConfigError::ValidationError("empty duration string".into()));
    }

    let digit_end = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
    if digit_end == 0 {
        return Err(ConfigError::ValidationError(format!(
            "invalid duration: no numeric value in '{s}'"
        )));
    }

    let number: u64 = s[..digit_end]
        .parse()
        .map_err(|_| ConfigError::ValidationError(format!("invalid number in duration '{s}'")))?;

    let duration = match s[digit_end..].trim() {
        "ms" => Duration::from_millis(number),
        "s" => Duration::from_secs(number),
        "m" => Duration::from_secs(number * 60),
        "h" => Duration::from_secs(number * 3600),
        "" => {
            return Err(ConfigError::ValidationError(format!(
                "missing unit in duration '{s}' (use ms, s, m, or h)"
            )))
        }
        unit => {
            return Err(ConfigError::ValidationError(format!(
                "unknown duration unit '{unit}' (use ms, s, m, or h)"
            )))
        }
    };

    if duration.is_zero() {
        return Err(ConfigError::ValidationError(format!(
            "duration '{s}' must be greater than zero"
        )));
    }

    Ok(duration)
}

/// Serde adapter for `timeout = "10m"` style fields.
pub(crate) fn deserialize_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_duration(&raw).map_err(serde::de::Error::custom)
}
