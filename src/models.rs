/// One temperature/humidity measurement.
///
/// The sensor reports both channels in tenths of a unit, so every value
/// produced by the decoder has exactly one decimal place. Aggregated
/// readings are plain means and may carry more precision.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reading {
    /// Degrees Celsius, negative below freezing
    pub temperature: f32,
    /// Relative humidity in percent
    pub humidity: f32,
}

impl Reading {
    pub fn new(temperature: f32, humidity: f32) -> Self {
        Self {
            temperature,
            humidity,
        }
    }

    /// Build a reading from the integer tenths carried on the wire.
    pub fn from_tenths(temperature_tenths: i16, humidity_tenths: u16) -> Self {
        Self {
            temperature: f32::from(temperature_tenths) / 10.0,
            humidity: f32::from(humidity_tenths) / 10.0,
        }
    }
}
