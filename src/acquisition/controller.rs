//! Batch-level orchestration helpers
//!
//! Free functions the owning application calls between batches: size the
//! projector barriers to the set of attached cameras, run the prepare
//! rendezvous, and wait out the tail of a batch.

use std::os::unix::io::RawFd;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{FringeError, Result};
use crate::events::wait::{wait_all, wait_any_and_all, WaitOutcome};
use crate::events::{CameraCode, DrawCode, Event, EventRegistry, MainCode};

use super::params::AcquisitionShared;

/// Size the counted barriers of a projector's draw events to the number of
/// cameras attached to it
///
/// Present, Render and SyncTriggers become visible only once every camera
/// has requested them; PresentReady and RenderReady stay visible until
/// every camera has consumed them.
pub fn configure_projector_barriers(
    registry: &EventRegistry,
    projector: usize,
    camera_count: usize,
) -> Result<()> {
    let width = camera_count as i64;
    for code in [DrawCode::Present, DrawCode::Render, DrawCode::SyncTriggers] {
        registry.configure_set_counter(code, projector, width)?;
    }
    for code in [DrawCode::PresentReady, DrawCode::RenderReady] {
        registry.configure_reset_counter(code, projector, width)?;
    }
    Ok(())
}

/// Run batch preparation on a set of cameras and wait for all of them to
/// report PrepareDone
pub fn prepare_cameras(
    registry: &EventRegistry,
    cameras: &[usize],
    timeout: Option<Duration>,
) -> Result<()> {
    let mut done_events: Vec<Arc<Event>> = Vec::with_capacity(cameras.len());
    for &camera in cameras {
        let done = registry.event(CameraCode::PrepareDone, camera)?;
        done.reset();
        registry.set(CameraCode::Prepare, camera)?;
        done_events.push(done);
    }
    let fds: Vec<RawFd> = done_events.iter().map(|e| e.fd()).collect();
    match wait_all(&fds, timeout)? {
        WaitOutcome::AllSignaled => {
            for done in &done_events {
                done.reset();
            }
            Ok(())
        }
        _ => Err(FringeError::rendezvous(
            "cameras did not finish batch preparation in time",
        )),
    }
}

/// Wait for every camera's LastFrameDone, unless Terminate or AbortBatch
/// cuts the batch short first
///
/// Returns the raw wait outcome: AllSignaled means the batch completed,
/// Signaled(i) names the interrupting main event, Timeout means the
/// deadline passed.
pub fn await_last_frames(
    registry: &EventRegistry,
    cameras: &[usize],
    timeout: Option<Duration>,
) -> Result<WaitOutcome> {
    let terminate = registry.event(MainCode::Terminate, 0)?;
    let abort = registry.event(MainCode::AbortBatch, 0)?;
    let done_events: Vec<Arc<Event>> = cameras
        .iter()
        .map(|&camera| registry.event(CameraCode::LastFrameDone, camera))
        .collect::<Result<_>>()?;

    let any = [terminate.fd(), abort.fd()];
    let all: Vec<RawFd> = done_events.iter().map(|e| e.fd()).collect();
    let outcome = wait_any_and_all(&any, &all, timeout)?;
    if outcome == WaitOutcome::AllSignaled {
        for done in &done_events {
            done.reset();
        }
    }
    Ok(outcome)
}

/// Whether every attached camera replays from files rather than driving
/// hardware; an empty set counts as live
pub fn all_replay_sources(cameras: &[Arc<AcquisitionShared>]) -> bool {
    !cameras.is_empty() && cameras.iter().all(|shared| shared.is_replay_source())
}

/// Stop the transfer stream of every camera; each stop runs regardless of
/// earlier failures, and the result is the conjunction
pub fn stop_all_transfers(cameras: &[Arc<AcquisitionShared>]) -> bool {
    cameras
        .iter()
        .fold(true, |all_ok, shared| shared.stop_transfer() && all_ok)
}
