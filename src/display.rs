//! Display/projector collaborator surface
//!
//! The acquisition thread only touches the display through this block: the
//! refresh-rate rational and derived interval, the acquisition mode flags,
//! the lock-guarded scheduled pre-trigger delay, and a VBlank wait. Rendering
//! internals (GPU presentation, swap chains) live outside the core; the
//! VBlank here is derived from the refresh interval against a fixed origin.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use spin_sleep::SpinSleeper;

use crate::error::{FringeError, Result};
use crate::timing::ticks::us_to_duration;

/// Display parameters supplied at link construction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisplayConfig {
    /// Refresh rate numerator (e.g. 60000)
    pub refresh_num: u32,
    /// Refresh rate denominator (e.g. 1001)
    pub refresh_den: u32,
    /// Present-then-wait-for-capture causal ordering; no frame dropped
    pub blocking: bool,
    /// Single projected pattern captured repeatedly
    pub fixed_pattern: bool,
    /// Pre-trigger delay exceeds exposure, next present overlaps exposure
    pub concurrent_delay: bool,
    /// Pre-trigger delay in microseconds
    pub scheduled_delay_us: f64,
    /// Lead time before a scheduled present at which triggering must start
    pub trigger_lead_us: f64,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            refresh_num: crate::config::DEFAULT_REFRESH_NUM,
            refresh_den: crate::config::DEFAULT_REFRESH_DEN,
            blocking: true,
            fixed_pattern: false,
            concurrent_delay: false,
            scheduled_delay_us: 0.0,
            trigger_lead_us: 500.0,
        }
    }
}

/// Snapshot of the acquisition mode flags
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModeFlags {
    pub blocking: bool,
    pub fixed: bool,
    pub concurrent_delay: bool,
}

/// Shared per-projector display block
#[derive(Debug)]
pub struct DisplayLink {
    origin: Instant,
    refresh_num: u32,
    refresh_den: u32,
    refresh_interval: Duration,
    blocking: AtomicBool,
    fixed_pattern: AtomicBool,
    concurrent_delay: AtomicBool,
    scheduled_delay_us: RwLock<f64>,
    trigger_lead: Duration,
}

impl DisplayLink {
    /// Build a display link from its config
    pub fn new(config: DisplayConfig) -> Result<Self> {
        if config.refresh_num == 0 || config.refresh_den == 0 {
            return Err(FringeError::invalid_parameter(
                "refresh rate",
                format!("{}/{} is not a valid rational", config.refresh_num, config.refresh_den),
            ));
        }
        let interval_ns = 1_000_000_000u64 * config.refresh_den as u64 / config.refresh_num as u64;
        Ok(Self {
            origin: Instant::now(),
            refresh_num: config.refresh_num,
            refresh_den: config.refresh_den,
            refresh_interval: Duration::from_nanos(interval_ns),
            blocking: AtomicBool::new(config.blocking),
            fixed_pattern: AtomicBool::new(config.fixed_pattern),
            concurrent_delay: AtomicBool::new(config.concurrent_delay),
            scheduled_delay_us: RwLock::new(config.scheduled_delay_us),
            trigger_lead: us_to_duration(config.trigger_lead_us),
        })
    }

    /// Refresh-rate rational as (numerator, denominator)
    pub fn refresh_rate(&self) -> (u32, u32) {
        (self.refresh_num, self.refresh_den)
    }

    /// One refresh period
    pub fn refresh_interval(&self) -> Duration {
        self.refresh_interval
    }

    /// Current acquisition mode flags
    pub fn modes(&self) -> ModeFlags {
        ModeFlags {
            blocking: self.blocking.load(Ordering::Acquire),
            fixed: self.fixed_pattern.load(Ordering::Acquire),
            concurrent_delay: self.concurrent_delay.load(Ordering::Acquire),
        }
    }

    /// Switch acquisition modes (takes effect at the next batch preparation)
    pub fn set_modes(&self, blocking: bool, fixed_pattern: bool, concurrent_delay: bool) {
        self.blocking.store(blocking, Ordering::Release);
        self.fixed_pattern.store(fixed_pattern, Ordering::Release);
        self.concurrent_delay.store(concurrent_delay, Ordering::Release);
    }

    /// Scheduled pre-trigger delay in microseconds
    pub fn scheduled_delay_us(&self) -> f64 {
        *self.scheduled_delay_us.read().unwrap()
    }

    /// Update the scheduled pre-trigger delay
    pub fn set_scheduled_delay_us(&self, delay_us: f64) {
        *self.scheduled_delay_us.write().unwrap() = delay_us;
    }

    /// Lead time the trigger call needs before a scheduled present
    pub fn trigger_lead(&self) -> Duration {
        self.trigger_lead
    }

    /// Next refresh boundary strictly after `t`
    pub fn next_vblank_after(&self, t: Instant) -> Instant {
        let elapsed = t.saturating_duration_since(self.origin);
        let periods = elapsed.as_nanos() / self.refresh_interval.as_nanos().max(1);
        self.origin + self.refresh_interval * (periods as u32 + 1)
    }

    /// Block until the next refresh boundary; returns that boundary
    pub fn wait_for_vblank(&self) -> Instant {
        let target = self.next_vblank_after(Instant::now());
        let now = Instant::now();
        if target > now {
            SpinSleeper::default().sleep(target - now);
        }
        target
    }
}
