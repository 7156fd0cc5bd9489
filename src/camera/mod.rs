//! Camera SDK abstraction
//!
//! The acquisition state machine drives a camera exclusively through this
//! trait; vendor SDK bindings live behind it as an open extension point. Two
//! backends ship with the core: a deterministic simulated camera (tests,
//! diagnostics) and the file-replay source used as the fallback when real SDK
//! creation fails.

pub mod replay;
pub mod simulated;

use std::time::Instant;

use crate::frames::FrameMetadata;

pub use replay::FileReplayCamera;
pub use simulated::{CameraProbe, SimulatedCamera, SimulatedCameraConfig};

/// Capability surface of one camera device
///
/// All calls report success as booleans; transient failures feed the
/// retry/drop logic in the acquisition loop and never unwind it.
pub trait CameraBackend: Send {
    /// Backend name for diagnostics
    fn name(&self) -> &str;

    /// Fire one exposure; false on a transient failure (device busy, ack lost)
    fn trigger(&mut self) -> bool;

    /// Whether the device can accept a trigger right now
    fn is_ready(&self) -> bool;

    /// Apply exposure time (and optional hardware pre-trigger delay), both in
    /// microseconds; returns the exposure the device actually achieved
    fn adjust_exposure_and_delay(&mut self, requested_us: f64, hardware_delay_us: Option<f64>)
        -> f64;

    /// Begin streaming frame transfers
    fn start_transfer(&mut self) -> bool;

    /// Stop streaming frame transfers
    fn stop_transfer(&mut self) -> bool;

    /// SDK-specific post-exposure action (simulate the exposure wait, throttle,
    /// read the replay file). `scheduled_end` is the projected exposure-end
    /// instant published at trigger time.
    fn finish_exposure(&mut self, frame: &FrameMetadata, scheduled_end: Option<Instant>) -> bool;

    /// Attach the event this backend signals when a frame finishes
    /// transferring. Default is a no-op for SDKs that deliver completion
    /// through their own callback channel wiring.
    fn connect_transfer_signal(&mut self, _event: std::sync::Arc<crate::events::Event>) {}

    /// Whether the SDK delivers exposure-end itself via a callback thread
    fn signals_exposure_via_callback(&self) -> bool {
        false
    }

    /// Whether the device applies the pre-trigger delay in hardware
    fn uses_hardware_delay(&self) -> bool {
        false
    }

    /// Whether this backend reads frames from files instead of a device
    fn is_replay_source(&self) -> bool {
        false
    }

    /// File name of the most recently replayed frame, when applicable
    fn last_file_name(&self) -> Option<&str> {
        None
    }
}
