//! DHT22 temperature/humidity collector.
//!
//! Reads the sensor by bit-banging its single-wire protocol on a GPIO line,
//! smooths a batch of readings with a trimmed mean, and pushes the result to
//! InfluxDB over HTTP.

pub mod aggregation;
pub mod config;
pub mod influx;
pub mod models;
pub mod sensor;
pub mod service;
pub mod utils;
