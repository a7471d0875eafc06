//! Shared fixtures for integration tests
//!
//! - `SimulatedLine`: a data line driven by a virtual microsecond clock that
//!   replays scripted sensor responses
//! - Frame builders turning readings into pulse sequences

#![allow(dead_code)]

use std::collections::VecDeque;

use rust_dht22_etl::sensor::{DataLine, Level, PinMode};

/// A level held for a number of polling ticks
pub type Pulse = (Level, u64);

/// High pulse widths, in ticks, for the default bit threshold of 16
pub const ZERO_HIGH: u64 = 8;
pub const ONE_HIGH: u64 = 24;
pub const BIT_LOW: u64 = 12;

/// Everything the decoder asked of the line, apart from reads and µs sleeps
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineEvent {
    Mode(PinMode),
    Write(Level),
    SleepMs(u64),
    EnterCritical,
    ExitCritical,
}

/// Line whose level is a function of virtual time since it was released.
///
/// Each switch to input mode starts the next queued response. Once a
/// response runs out, or when none is queued, the line idles high like a
/// pulled-up bus with no sensor driving it.
#[derive(Debug, Default)]
pub struct SimulatedLine {
    responses: VecDeque<Vec<Pulse>>,
    current: Vec<Pulse>,
    now_us: u64,
    released_at: Option<u64>,
    events: Vec<LineEvent>,
}

impl SimulatedLine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_responses<I>(responses: I) -> Self
    where
        I: IntoIterator<Item = Vec<Pulse>>,
    {
        Self {
            responses: responses.into_iter().collect(),
            ..Self::default()
        }
    }

    pub fn push_response(&mut self, pulses: Vec<Pulse>) {
        self.responses.push_back(pulses);
    }

    pub fn events(&self) -> &[LineEvent] {
        &self.events
    }

    /// Number of read attempts the decoder has started
    pub fn releases(&self) -> usize {
        self.events
            .iter()
            .filter(|e| **e == LineEvent::Mode(PinMode::Input))
            .count()
    }

    fn level_at(&self, elapsed: u64) -> Level {
        let mut start = 0;
        for (level, width) in &self.current {
            if elapsed < start + width {
                return *level;
            }
            start += width;
        }
        Level::High
    }
}

impl DataLine for SimulatedLine {
    fn set_pin_mode(&mut self, mode: PinMode) {
        self.events.push(LineEvent::Mode(mode));
        match mode {
            PinMode::Input => {
                self.current = self.responses.pop_front().unwrap_or_default();
                self.released_at = Some(self.now_us);
            }
            PinMode::Output => self.released_at = None,
        }
    }

    fn write_pin(&mut self, level: Level) {
        self.events.push(LineEvent::Write(level));
    }

    fn read_pin(&mut self) -> Level {
        match self.released_at {
            Some(start) => self.level_at(self.now_us - start),
            None => Level::High,
        }
    }

    fn sleep_ms(&mut self, ms: u64) {
        self.events.push(LineEvent::SleepMs(ms));
        self.now_us += ms * 1000;
    }

    fn sleep_us(&mut self, us: u64) {
        self.now_us += us;
    }

    fn enter_critical(&mut self) {
        self.events.push(LineEvent::EnterCritical);
    }

    fn exit_critical(&mut self) {
        self.events.push(LineEvent::ExitCritical);
    }
}

/// Wire bytes for a reading, checksum included.
pub fn frame_bytes(humidity_tenths: u16, temperature_tenths: i16) -> [u8; 5] {
    let [h_hi, h_lo] = humidity_tenths.to_be_bytes();
    let [t_hi, t_lo] = temperature_tenths.unsigned_abs().to_be_bytes();
    let t_hi = if temperature_tenths < 0 { t_hi | 0x80 } else { t_hi };
    let sum = [h_hi, h_lo, t_hi, t_lo]
        .iter()
        .fold(0u8, |s, b| s.wrapping_add(*b));
    [h_hi, h_lo, t_hi, t_lo, sum]
}

/// Sensor response for `bytes` with explicit high pulse widths.
pub fn frame_pulses_with(bytes: [u8; 5], zero_high: u64, one_high: u64) -> Vec<Pulse> {
    // Bus release, then the 80/80 response handshake
    let mut pulses = vec![(Level::High, 4), (Level::Low, 20), (Level::High, 20)];

    for byte in bytes {
        for shift in (0..8).rev() {
            let width = if (byte >> shift) & 1 == 1 {
                one_high
            } else {
                zero_high
            };
            pulses.push((Level::Low, BIT_LOW));
            pulses.push((Level::High, width));
        }
    }

    // End of frame, then the line is released and idles high
    pulses.push((Level::Low, BIT_LOW));
    pulses
}

pub fn frame_pulses(bytes: [u8; 5]) -> Vec<Pulse> {
    frame_pulses_with(bytes, ZERO_HIGH, ONE_HIGH)
}

pub fn reading_pulses(humidity_tenths: u16, temperature_tenths: i16) -> Vec<Pulse> {
    frame_pulses(frame_bytes(humidity_tenths, temperature_tenths))
}

/// Frame with one bit of the checksum byte flipped
pub fn corrupted_pulses(humidity_tenths: u16, temperature_tenths: i16) -> Vec<Pulse> {
    let mut bytes = frame_bytes(humidity_tenths, temperature_tenths);
    bytes[4] ^= 0x01;
    frame_pulses(bytes)
}
