pub mod client;
pub mod line_protocol;

pub use client::{InfluxClient, PushError, ReadingSink};
pub use line_protocol::format_record;
