//! Per-frame metadata records and the keyed metadata queue
//!
//! Records are produced by the rendering thread (or synthesized by the
//! acquisition thread in fixed-pattern mode), updated by the acquisition
//! thread as triggers complete, and removed once the frame is transferred or
//! confirmed dropped. Access is by key only, never by position, so producer
//! and consumer stay safe under concurrent access.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Instant;

use serde::{Deserialize, Serialize};

/// Pattern classification carried on each frame record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PatternKind {
    /// Ordinary structured-light pattern
    Normal,
    /// Specialized calibration pattern (VBlank-aligned in blocking mode)
    Calibration,
    /// Single fixed pattern captured repeatedly without re-rendering
    Fixed,
}

impl Default for PatternKind {
    fn default() -> Self {
        Self::Normal
    }
}

/// Metadata for one frame, keyed by the present/frame counter
#[derive(Debug, Clone)]
pub struct FrameMetadata {
    /// Frame/present counter key
    pub key: u64,
    /// Pattern classification
    pub pattern: PatternKind,
    /// Pre-trigger delay in microseconds
    pub delay_us: f64,
    /// Exposure duration in microseconds
    pub exposure_us: f64,
    /// Scheduled presentation instant (absolute-deadline timing)
    pub scheduled_present: Option<Instant>,
    /// Timestamp taken immediately before the trigger call
    pub before_trigger: Option<Instant>,
    /// Timestamp taken immediately after the trigger call returned
    pub after_trigger: Option<Instant>,
    /// Whether the trigger call succeeded
    pub triggered: bool,
    /// Whether the trigger landed inside its strict timing slot
    pub on_time: bool,
    /// Whether this is the final frame of the batch
    pub last_frame: bool,
    /// File name for replay-sourced frames
    pub file_name: Option<String>,
}

impl FrameMetadata {
    /// Create a record with acquisition fields unset
    pub fn new(key: u64, pattern: PatternKind, delay_us: f64, exposure_us: f64) -> Self {
        Self {
            key,
            pattern,
            delay_us,
            exposure_us,
            scheduled_present: None,
            before_trigger: None,
            after_trigger: None,
            triggered: false,
            on_time: true,
            last_frame: false,
            file_name: None,
        }
    }

    /// Builder-style scheduled presentation instant
    pub fn with_scheduled_present(mut self, at: Instant) -> Self {
        self.scheduled_present = Some(at);
        self
    }

    /// Builder-style last-frame marker
    pub fn with_last_frame(mut self, last: bool) -> Self {
        self.last_frame = last;
        self
    }
}

/// Internally synchronized, key-addressed frame metadata queue
#[derive(Debug, Default)]
pub struct FrameQueue {
    records: Mutex<VecDeque<FrameMetadata>>,
}

impl FrameQueue {
    /// Create an empty queue
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a record
    pub fn push_back(&self, record: FrameMetadata) {
        self.records.lock().unwrap().push_back(record);
    }

    /// Copy out the record with the given key, if present
    pub fn peek_by_key(&self, key: u64) -> Option<FrameMetadata> {
        self.records
            .lock()
            .unwrap()
            .iter()
            .find(|r| r.key == key)
            .cloned()
    }

    /// Remove and return the record with the given key
    pub fn pop_by_key(&self, key: u64) -> Option<FrameMetadata> {
        let mut records = self.records.lock().unwrap();
        let idx = records.iter().position(|r| r.key == key)?;
        records.remove(idx)
    }

    /// Update the acquisition-owned fields of a record in place
    ///
    /// Returns false when no record with the key exists (frame already
    /// dropped or never queued).
    #[allow(clippy::too_many_arguments)]
    pub fn adjust_acquisition_fields(
        &self,
        key: u64,
        delay_us: f64,
        exposure_us: f64,
        before_trigger: Instant,
        after_trigger: Instant,
        triggered: bool,
        on_time: bool,
    ) -> bool {
        let mut records = self.records.lock().unwrap();
        match records.iter_mut().find(|r| r.key == key) {
            Some(record) => {
                record.delay_us = delay_us;
                record.exposure_us = exposure_us;
                record.before_trigger = Some(before_trigger);
                record.after_trigger = Some(after_trigger);
                record.triggered = triggered;
                record.on_time = on_time;
                true
            }
            None => false,
        }
    }

    /// Number of queued records
    pub fn len(&self) -> usize {
        self.records.lock().unwrap().len()
    }

    /// Whether the queue is empty
    pub fn is_empty(&self) -> bool {
        self.records.lock().unwrap().is_empty()
    }

    /// Drop all records
    pub fn clear(&self) {
        self.records.lock().unwrap().clear();
    }
}

/// File name for a replay frame: `frame_%05d[_suffix].png`
///
/// This is the one literal external naming contract the core carries; replay
/// directories produced by other tools are matched against it.
pub fn replay_file_name(index: u64, suffix: Option<&str>) -> String {
    match suffix {
        Some(suffix) => format!("frame_{:05}_{}.png", index, suffix),
        None => format!("frame_{:05}.png", index),
    }
}
