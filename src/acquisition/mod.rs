//! Per-camera acquisition state machine and batch orchestration
//!
//! Each camera gets one dedicated thread parked in a multi-wait over its
//! control events; the mode flags on the shared display block select how
//! triggering, exposure and presentation interleave. The controller module
//! holds the batch-level rendezvous helpers the owning application drives.

pub mod controller;
pub mod params;
mod thread;
mod trigger;

pub use controller::{
    all_replay_sources, await_last_frames, configure_projector_barriers, prepare_cameras,
    stop_all_transfers,
};
pub use params::{AcquisitionConfig, AcquisitionShared, ExposureSettings, TransferSnapshot};
pub use thread::AcquisitionThread;
