//! Cross-thread synchronization events
//!
//! The signaling backbone of the acquisition pipeline: manually-reset binary
//! events retrievable by `(group, code, instance)`, counted conditional
//! signaling for many-to-one barriers, and blocking multi-waits over up to
//! eight events at a time. Display, camera, encoder and decoder threads
//! communicate exclusively through these signals.

pub mod barrier;
pub mod codes;
pub mod event;
pub mod registry;
pub mod wait;

pub use barrier::CountdownBarrier;
pub use codes::{CameraCode, DecoderCode, DrawCode, EncoderCode, EventCode, EventGroup, MainCode};
pub use event::Event;
pub use registry::EventRegistry;
pub use wait::{wait_all, wait_any, wait_any_and_all, WaitOutcome, WaitSet};
