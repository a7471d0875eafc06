pub mod decoder;
pub mod gpio;

pub use decoder::{Decoder, FrameError, RawFrame};
pub use gpio::{DataLine, GpioError, Level, PinMode, RpiLine};
