/// InfluxDB line protocol formatting
use crate::models::Reading;

/// Format a reading as one line protocol record:
///
/// `<measurement>,location=<location> temperature=<t>,humidity=<h>`
///
/// Both fields are written with one decimal place, matching the sensor's
/// resolution. No timestamp is sent, so the server assigns its own.
pub fn format_record(measurement: &str, location: &str, reading: &Reading) -> String {
    format!(
        "{},location={} temperature={:.1},humidity={:.1}",
        escape(measurement, &[',', ' ']),
        escape(location, &[',', '=', ' ']),
        reading.temperature,
        reading.humidity
    )
}

fn escape(value: &str, special: &[char]) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if special.contains(&c) {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}
