/// Formatting helpers for log output
use time::macros::format_description;
use time::OffsetDateTime;

use crate::models::Reading;

/// Format a timestamp as `YYYY-MM-DD HH:MM:SS` for logging.
///
/// Falls back to the default representation if formatting fails.
pub fn format_datetime(dt: &OffsetDateTime) -> String {
    dt.format(format_description!(
        "[year]-[month]-[day] [hour]:[minute]:[second]"
    ))
    .unwrap_or_else(|_| dt.to_string())
}

/// Human readable form of a reading, e.g. `23.4°C, 65.2%`.
pub fn describe_reading(reading: &Reading) -> String {
    format!("{:.1}°C, {:.1}%", reading.temperature, reading.humidity)
}
