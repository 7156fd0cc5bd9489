//! Per-camera acquisition parameters and shared state
//!
//! One `AcquisitionShared` block exists per camera thread. The thread itself
//! owns the run loop; callback threads (SDK transfer completion) and control
//! threads (ID changes, batch preparation) touch only the lock-guarded or
//! atomic parts of this block plus the event registry.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::camera::CameraBackend;
use crate::display::DisplayLink;
use crate::events::EventRegistry;
use crate::frames::FrameQueue;
use crate::stats::FrameStatistics;
use crate::timing::ticks::us_to_duration;

/// Construction parameters for one acquisition thread
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AcquisitionConfig {
    /// Camera instance index in the event registry
    pub camera_id: usize,
    /// Projector instance this camera is attached to
    pub projector_id: usize,
    /// Encoder instance draining this camera's frames
    pub encoder_id: usize,
    /// Requested exposure time in microseconds
    pub requested_exposure_us: f64,
    /// Watchdog floor in microseconds (the 10x-exposure policy never goes
    /// below this)
    pub watchdog_floor_us: f64,
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            camera_id: 0,
            projector_id: 0,
            encoder_id: 0,
            requested_exposure_us: crate::config::DEFAULT_EXPOSURE_US,
            watchdog_floor_us: crate::config::DEFAULT_WATCHDOG_FLOOR_US,
        }
    }
}

/// Exposure timing as requested and as achieved by the device
#[derive(Debug, Clone, Copy)]
pub struct ExposureSettings {
    /// Requested exposure, microseconds
    pub requested_us: f64,
    /// Exposure the device actually achieved, microseconds
    pub achieved_us: f64,
    /// Achieved exposure as a precomputed duration
    pub duration: Duration,
}

/// Snapshot block published by the trigger path and SDK callbacks
///
/// Callback-driven SDKs fire on arbitrary threads; they write here so the
/// acquisition thread (and status queries) read a consistent last-transfer
/// view under the lock.
#[derive(Debug, Clone, Default)]
pub struct TransferSnapshot {
    /// Timestamp immediately before the last trigger call
    pub before_trigger: Option<Instant>,
    /// Timestamp immediately after the last trigger call returned
    pub after_trigger: Option<Instant>,
    /// Projected end of the running exposure window
    pub scheduled_exposure_end: Option<Instant>,
    /// Key of the last frame triggered
    pub last_key: Option<u64>,
    /// File name of the last replayed/stored frame
    pub last_file_name: Option<String>,
}

/// Shared state of one camera acquisition thread
pub struct AcquisitionShared {
    camera_id: AtomicUsize,
    projector_id: AtomicUsize,
    encoder_id: AtomicUsize,
    exposure: RwLock<ExposureSettings>,
    trigger_counter: AtomicU64,
    exposure_in_progress: AtomicBool,
    waiting: AtomicBool,
    snapshot: RwLock<TransferSnapshot>,
    watchdog_floor: Duration,
    pub(crate) registry: Arc<EventRegistry>,
    pub(crate) display: Arc<DisplayLink>,
    pub(crate) queue: Arc<FrameQueue>,
    pub(crate) camera: Mutex<Box<dyn CameraBackend>>,
    pub(crate) stats_trigger_duration: Arc<FrameStatistics>,
    pub(crate) stats_trigger_frequency: Arc<FrameStatistics>,
    pub(crate) stats_acquisition: Arc<FrameStatistics>,
}

impl std::fmt::Debug for AcquisitionShared {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AcquisitionShared")
            .field("camera_id", &self.camera_id())
            .field("projector_id", &self.projector_id())
            .field("encoder_id", &self.encoder_id())
            .field("trigger_counter", &self.trigger_count())
            .finish_non_exhaustive()
    }
}

impl AcquisitionShared {
    /// Build the shared block for one camera thread
    ///
    /// Exactly one camera backend is attached here for the lifetime of the
    /// block; swapping devices means tearing the thread down.
    pub fn new(
        config: AcquisitionConfig,
        registry: Arc<EventRegistry>,
        display: Arc<DisplayLink>,
        queue: Arc<FrameQueue>,
        camera: Box<dyn CameraBackend>,
    ) -> Arc<Self> {
        let requested = config.requested_exposure_us;
        Arc::new(Self {
            camera_id: AtomicUsize::new(config.camera_id),
            projector_id: AtomicUsize::new(config.projector_id),
            encoder_id: AtomicUsize::new(config.encoder_id),
            exposure: RwLock::new(ExposureSettings {
                requested_us: requested,
                achieved_us: requested,
                duration: us_to_duration(requested),
            }),
            trigger_counter: AtomicU64::new(0),
            exposure_in_progress: AtomicBool::new(false),
            waiting: AtomicBool::new(false),
            snapshot: RwLock::new(TransferSnapshot::default()),
            watchdog_floor: us_to_duration(config.watchdog_floor_us),
            registry,
            display,
            queue,
            camera: Mutex::new(camera),
            stats_trigger_duration: Arc::new(FrameStatistics::new()),
            stats_trigger_frequency: Arc::new(FrameStatistics::new()),
            stats_acquisition: Arc::new(FrameStatistics::new()),
        })
    }

    /// Camera instance index
    pub fn camera_id(&self) -> usize {
        self.camera_id.load(Ordering::Acquire)
    }

    /// Projector instance index
    pub fn projector_id(&self) -> usize {
        self.projector_id.load(Ordering::Acquire)
    }

    /// Encoder instance index
    pub fn encoder_id(&self) -> usize {
        self.encoder_id.load(Ordering::Acquire)
    }

    pub(crate) fn set_camera_id(&self, id: usize) {
        self.camera_id.store(id, Ordering::Release);
    }

    pub(crate) fn set_projector_id(&self, id: usize) {
        self.projector_id.store(id, Ordering::Release);
    }

    pub(crate) fn set_encoder_id(&self, id: usize) {
        self.encoder_id.store(id, Ordering::Release);
    }

    /// Current exposure settings
    pub fn exposure(&self) -> ExposureSettings {
        *self.exposure.read().unwrap()
    }

    /// Change the requested exposure; applied to the device at the next batch
    /// preparation
    pub fn set_requested_exposure_us(&self, requested_us: f64) {
        let mut exposure = self.exposure.write().unwrap();
        exposure.requested_us = requested_us;
    }

    pub(crate) fn apply_achieved_exposure(&self, achieved_us: f64) {
        let mut exposure = self.exposure.write().unwrap();
        exposure.achieved_us = achieved_us;
        exposure.duration = us_to_duration(achieved_us);
    }

    /// Triggers fired in the current batch
    pub fn trigger_count(&self) -> u64 {
        self.trigger_counter.load(Ordering::Acquire)
    }

    pub(crate) fn reset_trigger_count(&self) {
        self.trigger_counter.store(0, Ordering::Release);
    }

    /// Whether an exposure window is currently open
    pub fn exposure_in_progress(&self) -> bool {
        self.exposure_in_progress.load(Ordering::Acquire)
    }

    pub(crate) fn set_exposure_in_progress(&self, value: bool) {
        self.exposure_in_progress.store(value, Ordering::Release);
    }

    /// Whether the thread is parked in its main event wait
    pub fn is_waiting(&self) -> bool {
        self.waiting.load(Ordering::Acquire)
    }

    pub(crate) fn set_waiting(&self, value: bool) {
        self.waiting.store(value, Ordering::Release);
    }

    /// Watchdog floor for this camera
    pub fn watchdog_floor(&self) -> Duration {
        self.watchdog_floor
    }

    /// Copy of the last-transfer snapshot
    pub fn snapshot(&self) -> TransferSnapshot {
        self.snapshot.read().unwrap().clone()
    }

    /// Publish a successful trigger: counter, snapshot and statistics
    pub(crate) fn record_trigger(
        &self,
        key: u64,
        before: Instant,
        after: Instant,
        scheduled_end: Instant,
    ) {
        self.trigger_counter.fetch_add(1, Ordering::AcqRel);
        {
            let mut snapshot = self.snapshot.write().unwrap();
            snapshot.before_trigger = Some(before);
            snapshot.after_trigger = Some(after);
            snapshot.scheduled_exposure_end = Some(scheduled_end);
            snapshot.last_key = Some(key);
        }
        self.stats_trigger_duration.add_measurement(before, after);
        self.stats_trigger_frequency.add_frame();
    }

    pub(crate) fn record_file_name(&self, name: Option<String>) {
        self.snapshot.write().unwrap().last_file_name = name;
    }

    pub(crate) fn clear_snapshot(&self) {
        *self.snapshot.write().unwrap() = TransferSnapshot::default();
    }

    /// Trigger-duration statistics (time spent inside the trigger call)
    pub fn trigger_duration_stats(&self) -> Arc<FrameStatistics> {
        Arc::clone(&self.stats_trigger_duration)
    }

    /// Trigger-frequency statistics (gaps between successive triggers)
    pub fn trigger_frequency_stats(&self) -> Arc<FrameStatistics> {
        Arc::clone(&self.stats_trigger_frequency)
    }

    /// Acquisition-duration statistics (trigger to transfer complete)
    pub fn acquisition_stats(&self) -> Arc<FrameStatistics> {
        Arc::clone(&self.stats_acquisition)
    }

    pub(crate) fn reset_batch_state(&self) {
        self.reset_trigger_count();
        self.set_exposure_in_progress(false);
        self.clear_snapshot();
        self.stats_trigger_duration.reset();
        self.stats_trigger_frequency.reset();
        self.stats_acquisition.reset();
    }

    /// Whether the attached backend replays frames from files
    pub fn is_replay_source(&self) -> bool {
        self.camera.lock().unwrap().is_replay_source()
    }

    /// Stop a running transfer stream on the backend
    pub fn stop_transfer(&self) -> bool {
        self.camera.lock().unwrap().stop_transfer()
    }
}
