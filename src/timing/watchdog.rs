//! Exposure-timeout watchdog
//!
//! A one-shot timerfd armed after every trigger. If the exposure-end or
//! transfer-end acknowledgment never arrives, the fd becomes readable and the
//! acquisition loop observes it as the last slot of its wait set, treating it
//! as a lost acknowledgment.

use std::os::fd::RawFd;
use std::os::unix::io::AsRawFd;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use nix::sys::time::TimeSpec;
use nix::sys::timerfd::{ClockId, Expiration, TimerFd, TimerFlags, TimerSetTimeFlags};
use nix::unistd::read;

use crate::error::{FringeError, Result};

/// One-shot watchdog timer, pollable alongside events
#[derive(Debug)]
pub struct ExposureWatchdog {
    timer: TimerFd,
    armed: AtomicBool,
}

impl ExposureWatchdog {
    /// Allocate a disarmed watchdog
    pub fn new() -> Result<Self> {
        let timer = TimerFd::new(
            ClockId::CLOCK_MONOTONIC,
            TimerFlags::TFD_CLOEXEC | TimerFlags::TFD_NONBLOCK,
        )
        .map_err(|e| FringeError::timer(format!("timerfd create: {}", e)))?;
        Ok(Self {
            timer,
            armed: AtomicBool::new(false),
        })
    }

    /// Raw fd for the acquisition wait set
    pub fn fd(&self) -> RawFd {
        self.timer.as_raw_fd()
    }

    /// Arm (or re-arm) the one-shot countdown
    pub fn arm(&self, interval: Duration) -> Result<()> {
        self.drain();
        self.timer
            .set(
                Expiration::OneShot(TimeSpec::from_duration(interval)),
                TimerSetTimeFlags::empty(),
            )
            .map_err(|e| FringeError::timer(format!("timerfd arm: {}", e)))?;
        self.armed.store(true, Ordering::Release);
        Ok(())
    }

    /// Disarm the countdown and clear any pending expiration
    pub fn disarm(&self) -> Result<()> {
        self.timer
            .unset()
            .map_err(|e| FringeError::timer(format!("timerfd disarm: {}", e)))?;
        self.drain();
        self.armed.store(false, Ordering::Release);
        Ok(())
    }

    /// Acknowledge a firing: clears the readable state, leaves the watchdog
    /// disarmed until the next `arm`
    pub fn acknowledge(&self) {
        self.drain();
        self.armed.store(false, Ordering::Release);
    }

    /// Whether the watchdog is currently armed
    pub fn is_armed(&self) -> bool {
        self.armed.load(Ordering::Acquire)
    }

    fn drain(&self) {
        let mut buf = [0u8; 8];
        let _ = read(self.timer.as_raw_fd(), &mut buf);
    }
}

/// Watchdog interval policy: ten exposure intervals, floored
///
/// The multiple absorbs ordinary scheduling jitter across several refresh
/// periods; the floor keeps very short exposures from producing a hair-trigger
/// watchdog.
pub fn watchdog_interval(exposure_interval: Duration, floor: Duration) -> Duration {
    let scaled = exposure_interval.saturating_mul(crate::config::WATCHDOG_EXPOSURE_MULTIPLE);
    scaled.max(floor)
}
