//! Precision timing utilities
//!
//! The spin timer covers the sub-millisecond approach to a trigger deadline;
//! the watchdog covers the opposite failure where an acknowledgment never
//! arrives at all.

pub mod spin;
pub mod ticks;
pub mod watchdog;

pub use spin::SpinTimer;
pub use ticks::{duration_to_ms, duration_to_us, us_to_duration};
pub use watchdog::{watchdog_interval, ExposureWatchdog};
