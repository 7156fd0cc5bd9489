//! Per-camera acquisition thread
//!
//! One OS thread per camera parks in a single infinite multi-wait over the
//! camera's control events plus its exposure watchdog, and dispatches to the
//! handlers below. The wait set is rebuilt from the registry whenever the
//! thread is re-homed to a different camera instance (ChangeId), so event
//! handles are never stale.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

use log::{debug, error, warn};

use crate::config;
use crate::error::{FringeError, Result};
use crate::events::wait::{wait_any, WaitOutcome};
use crate::events::{CameraCode, DrawCode, EncoderCode, Event, EventRegistry};
use crate::frames::{FrameMetadata, PatternKind};
use crate::timing::spin::SpinTimer;
use crate::timing::watchdog::ExposureWatchdog;

use super::params::AcquisitionShared;
use super::trigger::{consume_draw_event, handle_trigger, InFlightTrigger};

// Wait-set slot layout. Slots 0-6 are camera control events, slot 7 is the
// exposure watchdog timer. The multi-wait resolves ties by lowest index, so
// completions of the in-flight frame outrank newly posted triggers; a
// pending ExposureEnd or TransferEnd is always drained before the next
// trigger can overwrite the in-flight context.
const SLOT_TERMINATE: usize = 0;
const SLOT_PREPARE: usize = 1;
const SLOT_EXPOSURE_END: usize = 2;
const SLOT_TRANSFER_END: usize = 3;
const SLOT_SEND_TRIGGER: usize = 4;
const SLOT_REPEAT_TRIGGER: usize = 5;
const SLOT_CHANGE_ID: usize = 6;
const SLOT_WATCHDOG: usize = 7;

/// Registry handles for one camera instance, fetched together so the loop
/// never races a remove/re-add of the instance between lookups
pub(crate) struct CameraEvents {
    pub terminate: Arc<Event>,
    pub prepare: Arc<Event>,
    pub send_trigger: Arc<Event>,
    pub repeat_trigger: Arc<Event>,
    pub exposure_begin: Arc<Event>,
    pub exposure_end: Arc<Event>,
    pub transfer_end: Arc<Event>,
    pub change_id: Arc<Event>,
    pub ready: Arc<Event>,
    pub prepare_done: Arc<Event>,
    pub last_frame_done: Arc<Event>,
}

impl CameraEvents {
    fn fetch(registry: &EventRegistry, camera: usize) -> Result<Self> {
        Ok(Self {
            terminate: registry.event(CameraCode::Terminate, camera)?,
            prepare: registry.event(CameraCode::Prepare, camera)?,
            send_trigger: registry.event(CameraCode::SendTrigger, camera)?,
            repeat_trigger: registry.event(CameraCode::RepeatTrigger, camera)?,
            exposure_begin: registry.event(CameraCode::ExposureBegin, camera)?,
            exposure_end: registry.event(CameraCode::ExposureEnd, camera)?,
            transfer_end: registry.event(CameraCode::TransferEnd, camera)?,
            change_id: registry.event(CameraCode::ChangeId, camera)?,
            ready: registry.event(CameraCode::Ready, camera)?,
            prepare_done: registry.event(CameraCode::PrepareDone, camera)?,
            last_frame_done: registry.event(CameraCode::LastFrameDone, camera)?,
        })
    }

    /// Clear stale batch events before a new batch is armed. The control
    /// events (Terminate, Prepare, ChangeId) are left untouched, so a stop
    /// or re-home posted while preparation runs is never lost.
    fn reset_batch_events(&self) {
        self.send_trigger.reset();
        self.repeat_trigger.reset();
        self.exposure_begin.reset();
        self.exposure_end.reset();
        self.transfer_end.reset();
        self.ready.reset();
        self.prepare_done.reset();
        self.last_frame_done.reset();
    }

    fn wait_fds(&self, watchdog: &ExposureWatchdog) -> [std::os::unix::io::RawFd; 8] {
        [
            self.terminate.fd(),
            self.prepare.fd(),
            self.exposure_end.fd(),
            self.transfer_end.fd(),
            self.send_trigger.fd(),
            self.repeat_trigger.fd(),
            self.change_id.fd(),
            watchdog.fd(),
        ]
    }
}

/// Loop state owned by the acquisition thread
pub(crate) struct LoopState {
    pub in_flight: Option<InFlightTrigger>,
    pub next_key: u64,
    pub spin: SpinTimer,
}

impl LoopState {
    fn new() -> Self {
        Self {
            in_flight: None,
            next_key: 0,
            spin: SpinTimer::new(),
        }
    }
}

/// Thread body: run the event loop, then unwind transfers on the way out
pub(crate) fn run(shared: Arc<AcquisitionShared>) -> Result<()> {
    raise_thread_priority();
    let watchdog = ExposureWatchdog::new()?;
    let mut state = LoopState::new();
    let result = event_loop(&shared, &watchdog, &mut state);
    if let Err(ref e) = result {
        error!("camera {}: acquisition loop failed: {}", shared.camera_id(), e);
    }
    let _ = shared.stop_transfer();
    let _ = watchdog.disarm();
    result
}

fn event_loop(
    shared: &AcquisitionShared,
    watchdog: &ExposureWatchdog,
    state: &mut LoopState,
) -> Result<()> {
    'rebuild: loop {
        let events = CameraEvents::fetch(&shared.registry, shared.camera_id())?;
        let fds = events.wait_fds(watchdog);
        loop {
            shared.set_waiting(true);
            let outcome = wait_any(&fds, None);
            shared.set_waiting(false);
            let index = match outcome? {
                WaitOutcome::Signaled(index) => index,
                _ => continue,
            };
            match index {
                SLOT_TERMINATE => {
                    events.terminate.reset();
                    debug!("camera {}: terminating", shared.camera_id());
                    return Ok(());
                }
                SLOT_PREPARE => {
                    events.prepare.reset();
                    handle_prepare(shared, &events, state, watchdog)?;
                }
                SLOT_SEND_TRIGGER => {
                    events.send_trigger.reset();
                    handle_trigger(shared, &events, state, watchdog, false)?;
                }
                SLOT_REPEAT_TRIGGER => {
                    events.repeat_trigger.reset();
                    handle_trigger(shared, &events, state, watchdog, true)?;
                }
                SLOT_EXPOSURE_END => {
                    events.exposure_end.reset();
                    handle_exposure_end(shared, &events, state, watchdog)?;
                }
                SLOT_TRANSFER_END => {
                    events.transfer_end.reset();
                    handle_transfer_end(shared, &events, state)?;
                }
                SLOT_CHANGE_ID => {
                    state.in_flight = None;
                    shared.clear_snapshot();
                    debug!(
                        "thread re-homed to camera {} projector {} encoder {}",
                        shared.camera_id(),
                        shared.projector_id(),
                        shared.encoder_id()
                    );
                    // Resetting the event is the acknowledgment the caller
                    // polls for; ids must be re-read before this point
                    events.change_id.reset();
                    continue 'rebuild;
                }
                SLOT_WATCHDOG => handle_watchdog(shared, &events, state, watchdog)?,
                _ => unreachable!("wait set has exactly 8 slots"),
            }
        }
    }
}

/// Batch preparation: reset statistics, negotiate exposure with the device,
/// start the transfer stream, clear stale events and report readiness
fn handle_prepare(
    shared: &AcquisitionShared,
    events: &CameraEvents,
    state: &mut LoopState,
    watchdog: &ExposureWatchdog,
) -> Result<()> {
    watchdog.disarm()?;
    state.in_flight = None;
    state.next_key = 0;
    shared.reset_batch_state();

    let requested = shared.exposure().requested_us;
    {
        let mut camera = shared.camera.lock().unwrap();
        let hardware_delay_us = if camera.uses_hardware_delay() {
            Some(shared.display.scheduled_delay_us())
        } else {
            None
        };
        let achieved = camera.adjust_exposure_and_delay(requested, hardware_delay_us);
        shared.apply_achieved_exposure(achieved);
        camera.connect_transfer_signal(Arc::clone(&events.transfer_end));
        if !camera.start_transfer() {
            warn!("camera {}: transfer did not start", shared.camera_id());
        }
    }

    events.reset_batch_events();
    events.ready.set()?;
    events.prepare_done.set()?;
    Ok(())
}

/// Exposure window closed: retrieve the frame from the device and, unless
/// the mode requires waiting for the presentation handshake, report ready
fn handle_exposure_end(
    shared: &AcquisitionShared,
    events: &CameraEvents,
    state: &mut LoopState,
    watchdog: &ExposureWatchdog,
) -> Result<()> {
    watchdog.disarm()?;
    let modes = shared.display.modes();
    let Some(in_flight) = state.in_flight else {
        warn!("camera {}: spurious exposure end", shared.camera_id());
        return Ok(());
    };

    let meta = if modes.fixed {
        FrameMetadata::new(
            in_flight.key,
            PatternKind::Fixed,
            shared.display.scheduled_delay_us(),
            shared.exposure().achieved_us,
        )
    } else {
        shared.queue.peek_by_key(in_flight.key).unwrap_or_else(|| {
            FrameMetadata::new(
                in_flight.key,
                PatternKind::Normal,
                0.0,
                shared.exposure().achieved_us,
            )
        })
    };

    let finished = {
        let mut camera = shared.camera.lock().unwrap();
        let ok = camera.finish_exposure(&meta, Some(in_flight.scheduled_end));
        shared.record_file_name(camera.last_file_name().map(str::to_owned));
        ok
    };
    if !finished {
        warn!(
            "camera {}: frame {} retrieval failed",
            shared.camera_id(),
            in_flight.key
        );
    }
    shared.set_exposure_in_progress(false);

    // Blocking non-concurrent mode reports ready from the transfer handler
    // instead, after the next present is requested
    if !(modes.blocking && !modes.concurrent_delay && !modes.fixed) {
        events.ready.set()?;
    }
    Ok(())
}

/// Transfer complete: close out the in-flight frame, then run the
/// mode-dependent presentation handshake
fn handle_transfer_end(
    shared: &AcquisitionShared,
    events: &CameraEvents,
    state: &mut LoopState,
) -> Result<()> {
    let modes = shared.display.modes();
    let projector = shared.projector_id();

    if let Some(in_flight) = state.in_flight.take() {
        shared
            .stats_acquisition
            .add_measurement(in_flight.before, Instant::now());
        if !modes.fixed {
            shared.queue.pop_by_key(in_flight.key);
            if modes.blocking {
                state.next_key = in_flight.key + 1;
            }
        }
        if in_flight.last_frame {
            events.last_frame_done.set()?;
        }
    } else {
        warn!("camera {}: transfer end without a trigger", shared.camera_id());
    }

    if modes.blocking && !modes.concurrent_delay && !modes.fixed {
        if !consume_draw_event(shared, events, DrawCode::PresentReady)? {
            return Ok(());
        }
        shared.registry.set_conditional(DrawCode::Present, projector)?;
        events.ready.set()?;
    } else if modes.blocking {
        shared
            .registry
            .set_conditional(DrawCode::SyncTriggers, projector)?;
    }
    Ok(())
}

/// The exposure window elapsed without the device confirming: give up on
/// the frame and either retry it or drop it, depending on the mode
fn handle_watchdog(
    shared: &AcquisitionShared,
    events: &CameraEvents,
    state: &mut LoopState,
    watchdog: &ExposureWatchdog,
) -> Result<()> {
    watchdog.acknowledge();
    let modes = shared.display.modes();
    warn!(
        "camera {}: exposure watchdog fired, frame confirmation lost",
        shared.camera_id()
    );
    shared.set_exposure_in_progress(false);

    if modes.blocking || modes.fixed {
        // The batch cannot advance past a missing frame; retry it
        state.in_flight = None;
        debug_assert!(!events.send_trigger.is_signaled());
        events.repeat_trigger.set()?;
    } else if let Some(in_flight) = state.in_flight.take() {
        shared.queue.pop_by_key(in_flight.key);
        state.next_key = in_flight.key + 1;
        events.ready.set()?;
    } else {
        events.ready.set()?;
    }
    Ok(())
}

/// Best effort SCHED_FIFO; needs CAP_SYS_NICE, keeps the default otherwise
fn raise_thread_priority() {
    unsafe {
        let priority = libc::sched_get_priority_max(libc::SCHED_FIFO);
        if priority > 0 {
            let param = libc::sched_param {
                sched_priority: priority,
            };
            let _ = libc::pthread_setschedparam(libc::pthread_self(), libc::SCHED_FIFO, &param);
        }
    }
}

/// Handle to a running per-camera acquisition thread
pub struct AcquisitionThread {
    shared: Arc<AcquisitionShared>,
    handle: Option<JoinHandle<Result<()>>>,
}

impl AcquisitionThread {
    /// Spawn the acquisition thread for the camera instance the shared
    /// block currently points at
    pub fn start(shared: Arc<AcquisitionShared>) -> Result<Self> {
        // Surface a missing registry block here rather than in the thread
        shared
            .registry
            .event(CameraCode::Terminate, shared.camera_id())?;
        let thread_shared = Arc::clone(&shared);
        let handle = thread::Builder::new()
            .name(format!("acq-cam{}", shared.camera_id()))
            .spawn(move || run(thread_shared))
            .map_err(|e| FringeError::thread(format!("spawn failed: {}", e)))?;
        Ok(Self {
            shared,
            handle: Some(handle),
        })
    }

    /// Shared acquisition block of this thread
    pub fn shared(&self) -> Arc<AcquisitionShared> {
        Arc::clone(&self.shared)
    }

    /// Signal Terminate and join the thread
    pub fn stop(mut self) -> Result<()> {
        self.shutdown()
    }

    fn shutdown(&mut self) -> Result<()> {
        let Some(handle) = self.handle.take() else {
            return Ok(());
        };
        self.shared
            .registry
            .set(CameraCode::Terminate, self.shared.camera_id())?;
        match handle.join() {
            Ok(result) => result,
            Err(_) => Err(FringeError::thread("acquisition thread panicked")),
        }
    }

    /// Re-home the thread to a different projector instance
    ///
    /// The thread must be parked in its wait state. A no-op when the id is
    /// unchanged.
    pub fn set_new_projector_id(&self, projector_id: usize) -> Result<()> {
        if self.shared.projector_id() == projector_id {
            return Ok(());
        }
        self.shared
            .registry
            .event(DrawCode::Present, projector_id)?;
        let change = self.parked_change_event()?;
        self.shared.set_projector_id(projector_id);
        change.set()?;
        await_change_ack(&change)
    }

    /// Re-home the thread to a different camera and encoder instance
    ///
    /// The previously attached encoder is nudged with its own ChangeId so it
    /// stops watching this camera's events; no acknowledgment is awaited
    /// from it.
    pub fn set_new_camera_and_encoder_id(&self, camera_id: usize, encoder_id: usize) -> Result<()> {
        if self.shared.camera_id() == camera_id && self.shared.encoder_id() == encoder_id {
            return Ok(());
        }
        self.shared.registry.event(CameraCode::Terminate, camera_id)?;
        let change = self.parked_change_event()?;
        let old_encoder = self.shared.encoder_id();
        self.shared.set_camera_id(camera_id);
        self.shared.set_encoder_id(encoder_id);
        if encoder_id != old_encoder {
            let _ = self.shared.registry.set(EncoderCode::ChangeId, old_encoder);
        }
        change.set()?;
        await_change_ack(&change)
    }

    fn parked_change_event(&self) -> Result<Arc<Event>> {
        if !self.shared.is_waiting() {
            return Err(FringeError::rendezvous(
                "acquisition thread is not parked in its wait state",
            ));
        }
        let change = self
            .shared
            .registry
            .event(CameraCode::ChangeId, self.shared.camera_id())?;
        debug_assert!(!change.is_signaled(), "unacknowledged ID change pending");
        Ok(change)
    }
}

impl Drop for AcquisitionThread {
    fn drop(&mut self) {
        let _ = self.shutdown();
    }
}

/// The thread acknowledges an ID change by resetting the event after it has
/// re-read the ids; poll until that happens
fn await_change_ack(change: &Event) -> Result<()> {
    let deadline = Instant::now() + config::ID_CHANGE_ACK_TIMEOUT;
    while change.is_signaled() {
        if Instant::now() > deadline {
            return Err(FringeError::rendezvous(
                "ID change was not acknowledged in time",
            ));
        }
        thread::sleep(config::ID_CHANGE_POLL_INTERVAL);
    }
    Ok(())
}
