/// GPIO access for the sensor data line
use std::thread;
use std::time::{Duration, Instant};

use log::{debug, warn};
use rppal::gpio::{Gpio, IoPin, Mode};
use thiserror::Error;

/// Real-time priority requested while a frame is being captured
const CAPTURE_PRIORITY: libc::c_int = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Low,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinMode {
    Input,
    Output,
}

#[derive(Debug, Error)]
pub enum GpioError {
    #[error("GPIO subsystem unavailable: {0}")]
    Unavailable(rppal::gpio::Error),

    #[error("GPIO pin {pin} unavailable: {error}")]
    Pin { pin: u8, error: rppal::gpio::Error },
}

/// The single bidirectional line the sensor talks on.
///
/// Implementations are bound to one pin. Level reads and writes cannot fail
/// once the line has been opened.
pub trait DataLine {
    fn set_pin_mode(&mut self, mode: PinMode);
    fn write_pin(&mut self, level: Level);
    fn read_pin(&mut self) -> Level;
    fn sleep_ms(&mut self, ms: u64);
    fn sleep_us(&mut self, us: u64);

    /// Called right before the start signal is sent.
    fn enter_critical(&mut self) {}

    /// Called once the capture loop has finished, on every path.
    fn exit_critical(&mut self) {}
}

/// Sensor line on a Raspberry Pi header pin.
pub struct RpiLine {
    pin: IoPin,
    realtime_warned: bool,
}

impl RpiLine {
    /// Open `pin` (BCM numbering) as a reconfigurable input/output.
    pub fn open(pin: u8) -> Result<Self, GpioError> {
        let gpio = Gpio::new().map_err(GpioError::Unavailable)?;
        let io = gpio
            .get(pin)
            .map_err(|error| GpioError::Pin { pin, error })?
            .into_io(Mode::Input);

        debug!("Opened GPIO {} for the sensor line", pin);

        Ok(Self {
            pin: io,
            realtime_warned: false,
        })
    }

    fn set_scheduler(&mut self, policy: libc::c_int, priority: libc::c_int) {
        let param = libc::sched_param {
            sched_priority: priority,
        };
        // SAFETY: pid 0 targets the calling thread and `param` outlives the call.
        let result = unsafe { libc::sched_setscheduler(0, policy, &param) };

        if result != 0 && !self.realtime_warned {
            warn!(
                "Could not change scheduling policy ({}), reading at normal priority; grant CAP_SYS_NICE for steadier timing",
                std::io::Error::last_os_error()
            );
            self.realtime_warned = true;
        }
    }
}

impl DataLine for RpiLine {
    fn set_pin_mode(&mut self, mode: PinMode) {
        self.pin.set_mode(match mode {
            PinMode::Input => Mode::Input,
            PinMode::Output => Mode::Output,
        });
    }

    fn write_pin(&mut self, level: Level) {
        self.pin.write(match level {
            Level::Low => rppal::gpio::Level::Low,
            Level::High => rppal::gpio::Level::High,
        });
    }

    fn read_pin(&mut self) -> Level {
        match self.pin.read() {
            rppal::gpio::Level::Low => Level::Low,
            rppal::gpio::Level::High => Level::High,
        }
    }

    fn sleep_ms(&mut self, ms: u64) {
        thread::sleep(Duration::from_millis(ms));
    }

    // A scheduler sleep overshoots by tens of microseconds, so spin instead.
    fn sleep_us(&mut self, us: u64) {
        let deadline = Instant::now() + Duration::from_micros(us);
        while Instant::now() < deadline {
            std::hint::spin_loop();
        }
    }

    fn enter_critical(&mut self) {
        self.set_scheduler(libc::SCHED_FIFO, CAPTURE_PRIORITY);
    }

    fn exit_critical(&mut self) {
        self.set_scheduler(libc::SCHED_OTHER, 0);
    }
}
