//! fringesync: synchronization core for multi-camera, multi-projector
//! structured-light acquisition
//!
//! The crate is built around a registry of named manual-reset signals backed
//! by eventfds, so that every cross-thread rendezvous reduces to a poll()
//! over a small, fixed wait set. On top of that sit counted barriers for
//! fan-in/fan-out across cameras sharing a projector, a hybrid
//! sleep-then-spin timer for microsecond-scale trigger delays, a per-frame
//! statistics aggregator, and the per-camera acquisition state machine that
//! ties them together.
//!
//! ```no_run
//! use fringesync::events::{CameraCode, EventRegistry};
//!
//! let registry = EventRegistry::new_shared()?;
//! let camera = registry.add_camera()?;
//! registry.set(CameraCode::Prepare, camera)?;
//! # Ok::<(), fringesync::error::FringeError>(())
//! ```

pub mod acquisition;
pub mod camera;
pub mod display;
pub mod error;
pub mod events;
pub mod frames;
pub mod stats;
pub mod timing;

pub use acquisition::{AcquisitionConfig, AcquisitionShared, AcquisitionThread};
pub use display::{DisplayConfig, DisplayLink, ModeFlags};
pub use error::{FringeError, Result};
pub use events::{CameraCode, DrawCode, Event, EventRegistry, MainCode};
pub use frames::{FrameMetadata, FrameQueue, PatternKind};
pub use stats::FrameStatistics;

/// Crate-wide tuning constants
pub mod config {
    use std::time::Duration;

    /// Crate version, as reported by the CLI
    pub const VERSION: &str = env!("CARGO_PKG_VERSION");

    /// A wait set covers one camera's seven control events plus its
    /// watchdog timer
    pub const WAIT_SET_CAPACITY: usize = 8;

    /// Default requested exposure, one 60 Hz frame
    pub const DEFAULT_EXPOSURE_US: f64 = 16_666.0;

    /// Default lower bound on the watchdog interval
    pub const DEFAULT_WATCHDOG_FLOOR_US: f64 = 5_000_000.0;

    /// The watchdog fires after this many exposure intervals
    pub const WATCHDOG_EXPOSURE_MULTIPLE: u32 = 10;

    /// Default display refresh rate as a rational, numerator part
    pub const DEFAULT_REFRESH_NUM: u32 = 60;

    /// Default display refresh rate as a rational, denominator part
    pub const DEFAULT_REFRESH_DEN: u32 = 1;

    /// How long an ID-change caller waits for the thread's acknowledgment
    pub const ID_CHANGE_ACK_TIMEOUT: Duration = Duration::from_secs(2);

    /// Poll interval while waiting for an ID-change acknowledgment
    pub const ID_CHANGE_POLL_INTERVAL: Duration = Duration::from_millis(1);
}
