//! Deterministic in-process camera backend
//!
//! Behaves like a well-mannered hardware camera with scriptable misbehavior:
//! trigger latency, bounded exposure range, a failure budget for the next N
//! triggers, and an optional callback-driven mode where exposure-end is never
//! self-reported (exercises the watchdog path). A `CameraProbe` handle exposes
//! counters to tests and the CLI without reaching into the boxed backend.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::debug;
use serde::{Deserialize, Serialize};
use spin_sleep::SpinSleeper;

use crate::events::Event;
use crate::frames::FrameMetadata;

use super::CameraBackend;

/// Tunables for the simulated device
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulatedCameraConfig {
    /// Shortest exposure the device can achieve, microseconds
    pub min_exposure_us: f64,
    /// Longest exposure the device can achieve, microseconds
    pub max_exposure_us: f64,
    /// Wall time one trigger call takes
    pub trigger_latency_us: f64,
    /// When true the device reports exposure-end via an external callback
    /// only, never synchronously
    pub callback_driven: bool,
    /// Whether the device applies pre-trigger delay in hardware
    pub hardware_delay: bool,
}

impl Default for SimulatedCameraConfig {
    fn default() -> Self {
        Self {
            min_exposure_us: 50.0,
            max_exposure_us: 1_000_000.0,
            trigger_latency_us: 50.0,
            callback_driven: false,
            hardware_delay: false,
        }
    }
}

/// Shared observation handle onto a simulated camera
#[derive(Debug, Default)]
pub struct CameraProbe {
    /// Trigger calls made
    pub triggers_attempted: AtomicU64,
    /// Trigger calls that succeeded
    pub triggers_succeeded: AtomicU64,
    /// `start_transfer` calls
    pub transfer_starts: AtomicU64,
    /// `stop_transfer` calls
    pub transfer_stops: AtomicU64,
    /// `finish_exposure` completions
    pub exposures_finished: AtomicU64,
    /// Whether a transfer stream is active
    pub transferring: AtomicBool,
    /// Achieved exposure, nanoseconds
    pub achieved_exposure_ns: AtomicU64,
}

impl CameraProbe {
    /// Trigger calls made so far
    pub fn attempted(&self) -> u64 {
        self.triggers_attempted.load(Ordering::Acquire)
    }

    /// Successful trigger calls so far
    pub fn succeeded(&self) -> u64 {
        self.triggers_succeeded.load(Ordering::Acquire)
    }

    /// Completed post-exposure actions so far
    pub fn finished(&self) -> u64 {
        self.exposures_finished.load(Ordering::Acquire)
    }
}

/// Simulated camera device
#[derive(Debug)]
pub struct SimulatedCamera {
    config: SimulatedCameraConfig,
    probe: Arc<CameraProbe>,
    fail_budget: u64,
    exposure_us: f64,
    sleeper: SpinSleeper,
    transfer_event: Option<Arc<Event>>,
}

impl SimulatedCamera {
    /// Create a simulated camera with the given tunables
    pub fn new(config: SimulatedCameraConfig) -> Self {
        Self {
            config,
            probe: Arc::new(CameraProbe::default()),
            fail_budget: 0,
            exposure_us: 0.0,
            sleeper: SpinSleeper::default(),
            transfer_event: None,
        }
    }

    /// Create a simulated camera with default tunables
    pub fn with_defaults() -> Self {
        Self::new(SimulatedCameraConfig::default())
    }

    /// Observation handle for tests and diagnostics
    pub fn probe(&self) -> Arc<CameraProbe> {
        Arc::clone(&self.probe)
    }

    /// Make the next `n` trigger calls fail
    pub fn fail_next_triggers(&mut self, n: u64) {
        self.fail_budget = n;
    }

    /// Event to signal when a frame finishes transferring (TransferEnd)
    pub fn set_transfer_event(&mut self, event: Arc<Event>) {
        self.transfer_event = Some(event);
    }
}

impl CameraBackend for SimulatedCamera {
    fn name(&self) -> &str {
        "simulated"
    }

    fn trigger(&mut self) -> bool {
        self.probe.triggers_attempted.fetch_add(1, Ordering::AcqRel);
        if self.fail_budget > 0 {
            self.fail_budget -= 1;
            debug!("simulated trigger failure ({} left in budget)", self.fail_budget);
            return false;
        }
        self.sleeper
            .sleep(crate::timing::us_to_duration(self.config.trigger_latency_us));
        self.probe.triggers_succeeded.fetch_add(1, Ordering::AcqRel);
        true
    }

    fn is_ready(&self) -> bool {
        self.fail_budget == 0
    }

    fn adjust_exposure_and_delay(
        &mut self,
        requested_us: f64,
        _hardware_delay_us: Option<f64>,
    ) -> f64 {
        let achieved = requested_us.clamp(self.config.min_exposure_us, self.config.max_exposure_us);
        self.exposure_us = achieved;
        self.probe
            .achieved_exposure_ns
            .store((achieved * 1_000.0) as u64, Ordering::Release);
        achieved
    }

    fn start_transfer(&mut self) -> bool {
        self.probe.transfer_starts.fetch_add(1, Ordering::AcqRel);
        self.probe.transferring.store(true, Ordering::Release);
        true
    }

    fn stop_transfer(&mut self) -> bool {
        self.probe.transfer_stops.fetch_add(1, Ordering::AcqRel);
        self.probe.transferring.store(false, Ordering::Release);
        true
    }

    fn finish_exposure(&mut self, _frame: &FrameMetadata, scheduled_end: Option<Instant>) -> bool {
        // Simulate the tail of the exposure window when it has not elapsed yet
        if let Some(end) = scheduled_end {
            let now = Instant::now();
            if end > now {
                self.sleeper.sleep(end - now);
            }
        }
        self.probe.exposures_finished.fetch_add(1, Ordering::AcqRel);
        if self.probe.transferring.load(Ordering::Acquire) {
            if let Some(ref event) = self.transfer_event {
                let _ = event.set();
            }
        }
        true
    }

    fn connect_transfer_signal(&mut self, event: Arc<Event>) {
        self.set_transfer_event(event);
    }

    fn signals_exposure_via_callback(&self) -> bool {
        self.config.callback_driven
    }

    fn uses_hardware_delay(&self) -> bool {
        self.config.hardware_delay
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_budget_is_consumed_in_order() {
        let mut camera = SimulatedCamera::with_defaults();
        let probe = camera.probe();
        camera.fail_next_triggers(2);

        assert!(!camera.trigger());
        assert!(!camera.is_ready());
        assert!(!camera.trigger());
        assert!(camera.trigger());
        assert_eq!(probe.attempted(), 3);
        assert_eq!(probe.succeeded(), 1);
    }

    #[test]
    fn exposure_clamps_to_device_range() {
        let mut camera = SimulatedCamera::new(SimulatedCameraConfig {
            min_exposure_us: 100.0,
            max_exposure_us: 20_000.0,
            ..SimulatedCameraConfig::default()
        });
        assert_eq!(camera.adjust_exposure_and_delay(5.0, None), 100.0);
        assert_eq!(camera.adjust_exposure_and_delay(10_000.0, None), 10_000.0);
        assert_eq!(camera.adjust_exposure_and_delay(1e9, None), 20_000.0);
    }

    #[test]
    fn finish_exposure_signals_transfer_when_streaming() {
        let mut camera = SimulatedCamera::with_defaults();
        let event = Event::new_shared().unwrap();
        camera.set_transfer_event(Arc::clone(&event));
        let frame = FrameMetadata::new(0, crate::frames::PatternKind::Normal, 0.0, 100.0);

        // Not streaming: no signal
        camera.finish_exposure(&frame, None);
        assert!(!event.is_signaled());

        camera.start_transfer();
        camera.finish_exposure(&frame, Some(Instant::now() + Duration::from_millis(2)));
        assert!(event.is_signaled());
    }
}
