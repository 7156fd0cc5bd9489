//! Statistics accumulators for trigger and acquisition timing

pub mod frame_stats;

pub use frame_stats::{FrameStatistics, StatsSnapshot};
