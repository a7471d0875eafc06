/// Single-wire DHT22 frame capture and decoding
use log::trace;
use thiserror::Error;

use crate::config::DecoderConfig;
use crate::models::Reading;
use crate::sensor::gpio::{DataLine, Level, PinMode};

/// Payload size of one frame: humidity (2), temperature (2), checksum (1)
const FRAME_BYTES: usize = 5;
const FRAME_BITS: usize = FRAME_BYTES * 8;

/// Sign flag in the high temperature byte
const TEMPERATURE_SIGN: u8 = 0x80;

/// Why a read attempt produced no reading.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    #[error("line stalled at transition {transition} after {bits} bits")]
    Stalled { transition: usize, bits: usize },

    #[error("captured {captured} bits, expected 40")]
    BitCount { captured: usize },

    #[error("checksum mismatch: expected {expected:#04x}, got {actual:#04x}")]
    Checksum { expected: u8, actual: u8 },
}

/// The 40 bits of one frame, packed MSB-first as they arrive.
///
/// Only the first 40 bits are stored; any extra bit is counted so the frame
/// can be rejected as over-long.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawFrame {
    bytes: [u8; FRAME_BYTES],
    bits: usize,
}

impl RawFrame {
    /// A fully captured frame holding `bytes`.
    pub fn from_bytes(bytes: [u8; FRAME_BYTES]) -> Self {
        Self {
            bytes,
            bits: FRAME_BITS,
        }
    }

    pub fn push_bit(&mut self, one: bool) {
        if let Some(byte) = self.bytes.get_mut(self.bits / 8) {
            *byte = (*byte << 1) | u8::from(one);
        }
        self.bits += 1;
    }

    pub fn bits(&self) -> usize {
        self.bits
    }

    pub fn bytes(&self) -> &[u8; FRAME_BYTES] {
        &self.bytes
    }

    /// Low 8 bits of the sum of the four payload bytes.
    pub fn expected_checksum(&self) -> u8 {
        self.bytes[..4]
            .iter()
            .fold(0u8, |sum, byte| sum.wrapping_add(*byte))
    }

    pub fn checksum_ok(&self) -> bool {
        self.bytes[4] == self.expected_checksum()
    }

    /// Relative humidity in tenths of a percent (bytes 0-1, big-endian).
    pub fn humidity_tenths(&self) -> u16 {
        u16::from_be_bytes([self.bytes[0], self.bytes[1]])
    }

    /// Temperature in tenths of a degree (bytes 2-3, sign-magnitude).
    pub fn temperature_tenths(&self) -> i16 {
        let magnitude =
            u16::from_be_bytes([self.bytes[2] & !TEMPERATURE_SIGN, self.bytes[3]]) as i16;
        if self.bytes[2] & TEMPERATURE_SIGN != 0 {
            -magnitude
        } else {
            magnitude
        }
    }

    /// Validate length and checksum, then decode both channels.
    pub fn into_reading(self) -> Result<Reading, FrameError> {
        if self.bits != FRAME_BITS {
            return Err(FrameError::BitCount {
                captured: self.bits,
            });
        }
        if !self.checksum_ok() {
            return Err(FrameError::Checksum {
                expected: self.expected_checksum(),
                actual: self.bytes[4],
            });
        }

        Ok(Reading::from_tenths(
            self.temperature_tenths(),
            self.humidity_tenths(),
        ))
    }
}

/// Bit-banging reader for a DHT22 on one data line.
///
/// Protocol timeline after the host releases the line:
/// - Transitions 0-3: bus release and the sensor's 80 µs low / 80 µs high
///   response, followed by the first bit's low pulse
/// - Then 40 bits, each a ~50 µs low pulse followed by a high pulse whose
///   length encodes the bit (~26 µs for 0, ~70 µs for 1)
/// - Finally the sensor releases the line, which idles high until the
///   stall limit ends the capture
///
/// Durations are measured by counting polling iterations, so no hardware
/// timer is needed. Every exit from the capture loop is bounded by either
/// `max_transitions` or `stall_limit`.
#[derive(Debug)]
pub struct Decoder<L> {
    line: L,
    config: DecoderConfig,
}

impl<L: DataLine> Decoder<L> {
    pub fn new(line: L, config: DecoderConfig) -> Self {
        Self { line, config }
    }

    pub fn line(&self) -> &L {
        &self.line
    }

    pub fn into_line(self) -> L {
        self.line
    }

    /// Try to read one measurement.
    ///
    /// Any protocol failure (stalled line, short frame, bad checksum) yields
    /// `None`. Failed frames are expected and are not retried here.
    pub fn attempt_read(&mut self) -> Option<Reading> {
        match self.read_frame() {
            Ok(reading) => Some(reading),
            Err(e) => {
                trace!("Discarded sensor frame: {}", e);
                None
            }
        }
    }

    /// Like [`Decoder::attempt_read`] but reports why a frame was discarded.
    pub fn read_frame(&mut self) -> Result<Reading, FrameError> {
        self.line.enter_critical();
        let (frame, stalled_at) = self.capture();
        self.line.exit_critical();

        match stalled_at {
            Some(transition) if frame.bits() < FRAME_BITS => Err(FrameError::Stalled {
                transition,
                bits: frame.bits(),
            }),
            _ => frame.into_reading(),
        }
    }

    /// Send the start signal and sample the response.
    ///
    /// Returns the captured bits and, if the stall limit ended the loop, the
    /// transition at which it happened.
    fn capture(&mut self) -> (RawFrame, Option<usize>) {
        let DecoderConfig {
            start_signal_ms,
            max_transitions,
            stall_limit,
            skipped_transitions,
            bit_threshold,
        } = self.config;

        // Hold the line low to wake the sensor, then hand it over
        self.line.set_pin_mode(PinMode::Output);
        self.line.write_pin(Level::Low);
        self.line.sleep_ms(start_signal_ms);
        self.line.set_pin_mode(PinMode::Input);

        let mut frame = RawFrame::default();
        let mut last = Level::High;

        for transition in 0..max_transitions {
            let mut held = 0u32;
            while self.line.read_pin() == last {
                held += 1;
                self.line.sleep_us(1);
                if held >= stall_limit {
                    break;
                }
            }
            last = self.line.read_pin();

            if held >= stall_limit {
                return (frame, Some(transition));
            }

            // Only the high half of each bit carries data
            if transition >= skipped_transitions && (transition - skipped_transitions) % 2 == 0 {
                frame.push_bit(held > bit_threshold);
            }
        }

        (frame, None)
    }
}
