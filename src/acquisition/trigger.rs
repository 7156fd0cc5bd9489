//! Trigger dispatch for the acquisition state machine
//!
//! Handles SendTrigger/RepeatTrigger: fetch (or synthesize) the frame record,
//! run down the pre-trigger delay in the mode-appropriate way, fire the
//! device, validate absolute-mode timing against the slack deadline, publish
//! timestamps and statistics, then dispatch the follow-up events per the
//! acquisition mode matrix. The in-flight context produced here is what the
//! ExposureEnd/TransferEnd/watchdog handlers consume.

use std::time::Instant;

use log::{debug, warn};

use crate::display::ModeFlags;
use crate::error::Result;
use crate::events::wait::{wait_any, WaitOutcome};
use crate::events::DrawCode;
use crate::frames::{FrameMetadata, PatternKind};
use crate::timing::watchdog::{watchdog_interval, ExposureWatchdog};

use super::params::AcquisitionShared;
use super::thread::{CameraEvents, LoopState};

/// Context of one fired trigger, carried explicitly between state-machine
/// steps instead of loop-persistent locals
#[derive(Debug, Clone, Copy)]
pub(crate) struct InFlightTrigger {
    pub key: u64,
    pub before: Instant,
    pub scheduled_end: Instant,
    pub last_frame: bool,
}

/// Wait for a projector-side event, bailing out if Terminate fires first
///
/// The draw event is consumed with a counted reset so that every camera
/// attached to the projector observes the same cycle before it clears.
/// Returns false when Terminate was observed (it is left signaled for the
/// main loop to consume).
pub(crate) fn consume_draw_event(
    shared: &AcquisitionShared,
    events: &CameraEvents,
    code: DrawCode,
) -> Result<bool> {
    let draw = shared.registry.event(code, shared.projector_id())?;
    match wait_any(&[events.terminate.fd(), draw.fd()], None)? {
        WaitOutcome::Signaled(0) => Ok(false),
        WaitOutcome::Signaled(_) => {
            draw.reset_conditional();
            Ok(true)
        }
        _ => Ok(false),
    }
}

/// Handle SendTrigger or RepeatTrigger for the current frame
pub(crate) fn handle_trigger(
    shared: &AcquisitionShared,
    events: &CameraEvents,
    state: &mut LoopState,
    watchdog: &ExposureWatchdog,
    repeat: bool,
) -> Result<()> {
    let modes = shared.display.modes();
    let exposure = shared.exposure();
    if repeat {
        debug!("camera {}: retrying trigger", shared.camera_id());
    }

    // Protocol invariant: never both trigger events pending at once
    debug_assert!(
        !(events.send_trigger.is_signaled() && events.repeat_trigger.is_signaled()),
        "send and repeat trigger simultaneously pending"
    );

    // Fixed pattern: there is no rendering producer, the record is ours
    let meta = if modes.fixed {
        FrameMetadata::new(
            shared.trigger_count(),
            PatternKind::Fixed,
            shared.display.scheduled_delay_us(),
            exposure.achieved_us,
        )
    } else {
        match shared.queue.peek_by_key(state.next_key) {
            Some(meta) => meta,
            None => {
                warn!(
                    "camera {}: no metadata queued for frame {}",
                    shared.camera_id(),
                    state.next_key
                );
                if !modes.blocking {
                    state.next_key += 1;
                    events.ready.set()?;
                }
                return Ok(());
            }
        }
    };

    let absolute = !modes.blocking && !modes.fixed;
    let hardware_delay = shared.camera.lock().unwrap().uses_hardware_delay();

    // Calibration shots in blocking mode align to the display scan-out
    if modes.blocking && meta.pattern == PatternKind::Calibration {
        shared.display.wait_for_vblank();
    }

    // Run down the pre-trigger delay
    if absolute {
        if let Some(present) = meta.scheduled_present {
            // A lead reaching past the clock's origin means the window is
            // already gone; trigger immediately
            if let Some(deadline) = present.checked_sub(shared.display.trigger_lead()) {
                state.spin.wait_from_to(Instant::now(), deadline);
            }
        }
    } else if !hardware_delay && meta.delay_us > 0.0 {
        state.spin.set_interval_us(meta.delay_us);
        state.spin.wait();
    }

    // The trigger call itself, timestamped on both sides
    let (triggered, before, after) = {
        let mut camera = shared.camera.lock().unwrap();
        let before = Instant::now();
        let ok = camera.trigger();
        (ok, before, Instant::now())
    };

    if !triggered {
        warn!(
            "camera {}: trigger failed for frame {}",
            shared.camera_id(),
            meta.key
        );
        if modes.blocking || modes.fixed {
            debug_assert!(!events.send_trigger.is_signaled());
            events.repeat_trigger.set()?;
        } else {
            // Dropped frame: the orphaned record leaves the queue, the camera
            // reports ready for the next present
            shared.queue.pop_by_key(meta.key);
            state.next_key = meta.key + 1;
            events.ready.set()?;
        }
        return Ok(());
    }

    // Absolute timing: a miss of the slack deadline is counted but flagged,
    // never treated as a failure
    let mut on_time = true;
    if absolute {
        if let Some(present) = meta.scheduled_present {
            let late = match present.checked_add(shared.display.refresh_interval()) {
                Some(limit) => match limit.checked_sub(exposure.duration) {
                    Some(slack) => after > slack,
                    // Slack deadline collapses past the clock's origin
                    None => true,
                },
                None => false,
            };
            if late {
                on_time = false;
                debug!(
                    "camera {}: frame {} triggered outside its strict slot",
                    shared.camera_id(),
                    meta.key
                );
            }
        }
    }

    let scheduled_end = after + exposure.duration;
    shared.record_trigger(meta.key, before, after, scheduled_end);
    if !modes.fixed {
        shared.queue.adjust_acquisition_fields(
            meta.key,
            meta.delay_us,
            exposure.achieved_us,
            before,
            after,
            true,
            on_time,
        );
    }

    shared.set_exposure_in_progress(true);
    let base = exposure.duration.max(shared.display.refresh_interval());
    watchdog.arm(watchdog_interval(base, shared.watchdog_floor()))?;
    state.in_flight = Some(InFlightTrigger {
        key: meta.key,
        before,
        scheduled_end,
        last_frame: meta.last_frame,
    });

    dispatch_after_trigger(shared, events, state, modes, scheduled_end)
}

/// Mode-matrix follow-up dispatch after a successful trigger
fn dispatch_after_trigger(
    shared: &AcquisitionShared,
    events: &CameraEvents,
    state: &mut LoopState,
    modes: ModeFlags,
    scheduled_end: Instant,
) -> Result<()> {
    if modes.blocking && !modes.fixed && modes.concurrent_delay {
        // Exposure overlaps the next present: request it as soon as staged
        if !consume_draw_event(shared, events, DrawCode::PresentReady)? {
            return Ok(());
        }
        shared
            .registry
            .set_conditional(DrawCode::Present, shared.projector_id())?;
        events.exposure_begin.set()?;
        state.spin.wait_from_to(Instant::now(), scheduled_end);
        events.exposure_end.set()?;
    } else if modes.blocking && !modes.fixed {
        // Causal ordering: the render handshake happens inside the exposure
        events.exposure_begin.set()?;
        if !consume_draw_event(shared, events, DrawCode::RenderReady)? {
            return Ok(());
        }
        shared
            .registry
            .set_conditional(DrawCode::Render, shared.projector_id())?;
        state.spin.wait_from_to(Instant::now(), scheduled_end);
        events.exposure_end.set()?;
    } else if modes.blocking {
        // Fixed pattern: nothing to re-render, just wait out the window
        events.exposure_begin.set()?;
        state.spin.wait_from_to(Instant::now(), scheduled_end);
        events.exposure_end.set()?;
    } else {
        // Non-blocking: presentation never waits for this camera
        let callback_driven = shared.camera.lock().unwrap().signals_exposure_via_callback();
        events.exposure_begin.set()?;
        if !callback_driven {
            events.exposure_end.set()?;
        }
        if !modes.fixed {
            state.next_key += 1;
        }
    }
    Ok(())
}
