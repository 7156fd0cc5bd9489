//! Sub-millisecond precision waits
//!
//! OS sleeps carry multi-millisecond jitter; trigger timing needs to land
//! within a fraction of the display refresh interval. The timer sleeps the
//! coarse part of an interval natively and spins the final approach, so the
//! processor is only burned for the last stretch before a deadline.

use std::time::{Duration, Instant};

use spin_sleep::SpinSleeper;

use crate::timing::ticks::duration_to_ms;

/// Native sleep accuracy the spin sleeper assumes before switching to a spin
const NATIVE_ACCURACY_NS: u32 = 100_000;

/// Precision wait timer with relative-interval and absolute-deadline modes
///
/// Single-owner: records the start/stop instants of the last wait, so one
/// timer belongs to one thread.
#[derive(Debug)]
pub struct SpinTimer {
    interval: Duration,
    sleeper: SpinSleeper,
    last_start: Option<Instant>,
    last_stop: Option<Instant>,
}

impl SpinTimer {
    /// Create a timer with a zero interval configured
    pub fn new() -> Self {
        Self {
            interval: Duration::ZERO,
            sleeper: SpinSleeper::new(NATIVE_ACCURACY_NS),
            last_start: None,
            last_stop: None,
        }
    }

    /// Configure the relative wait interval
    pub fn set_interval(&mut self, interval: Duration) {
        self.interval = interval;
    }

    /// Configure the relative wait interval in microseconds
    pub fn set_interval_us(&mut self, us: f64) {
        self.interval = crate::timing::ticks::us_to_duration(us);
    }

    /// Currently configured interval
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Wait out the configured interval from now
    pub fn wait(&mut self) -> Instant {
        let start = Instant::now();
        self.sleeper.sleep(self.interval);
        let stop = Instant::now();
        self.last_start = Some(start);
        self.last_stop = Some(stop);
        stop
    }

    /// Wait until an absolute deadline; returns the actual stop instant
    ///
    /// A deadline already in the past returns immediately.
    pub fn wait_until(&mut self, deadline: Instant) -> Instant {
        let start = Instant::now();
        if deadline > start {
            self.sleeper.sleep(deadline - start);
        }
        let stop = Instant::now();
        self.last_start = Some(start);
        self.last_stop = Some(stop);
        stop
    }

    /// Wait until `stop`, treating `start` as the informational window begin
    ///
    /// Returns immediately without spinning when `start > stop` or `stop` has
    /// already elapsed, so a mis-ordered window can never produce a
    /// negative-duration spin. Overrun detection against a separate limit is
    /// the caller's job, using the returned actual stop instant.
    pub fn wait_from_to(&mut self, start: Instant, stop: Instant) -> Instant {
        let now = Instant::now();
        if start > stop || stop <= now {
            self.last_start = Some(now);
            self.last_stop = Some(now);
            return now;
        }
        self.wait_until(stop)
    }

    /// Duration of the last recorded wait
    pub fn last_wait(&self) -> Duration {
        match (self.last_start, self.last_stop) {
            (Some(start), Some(stop)) => stop.saturating_duration_since(start),
            _ => Duration::ZERO,
        }
    }

    /// Duration of the last recorded wait in fractional milliseconds
    pub fn last_wait_ms(&self) -> f64 {
        duration_to_ms(self.last_wait())
    }
}

impl Default for SpinTimer {
    fn default() -> Self {
        Self::new()
    }
}
