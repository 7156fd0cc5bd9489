//! File-replay acquisition source
//!
//! Stands in for a camera when no device is available (or when real SDK
//! creation failed and the pipeline falls back): triggering always succeeds
//! and the post-exposure action is reading the frame's replay file from disk,
//! named by the `frame_%05d[_suffix].png` contract.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use log::warn;

use crate::error::{FringeError, Result};
use crate::events::Event;
use crate::frames::{replay_file_name, FrameMetadata};

use super::CameraBackend;

/// Camera backend replaying pre-recorded frame files
#[derive(Debug)]
pub struct FileReplayCamera {
    directory: PathBuf,
    suffix: Option<String>,
    exposure_us: f64,
    last_file: Option<String>,
    transferring: bool,
    transfer_event: Option<Arc<Event>>,
}

impl FileReplayCamera {
    /// Open a replay source on a directory of frame files
    pub fn new(directory: impl Into<PathBuf>, suffix: Option<&str>) -> Result<Self> {
        let directory = directory.into();
        if !directory.is_dir() {
            return Err(FringeError::replay(format!(
                "replay directory does not exist: {}",
                directory.display()
            )));
        }
        Ok(Self {
            directory,
            suffix: suffix.map(str::to_owned),
            exposure_us: 0.0,
            last_file: None,
            transferring: false,
            transfer_event: None,
        })
    }

    /// Directory the source replays from
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Event to signal when a frame finishes "transferring" (file read)
    pub fn set_transfer_event(&mut self, event: Arc<Event>) {
        self.transfer_event = Some(event);
    }

    /// Count the consecutive frame files present, starting at index 0
    pub fn frame_count(&self) -> usize {
        let mut count = 0usize;
        loop {
            let name = replay_file_name(count as u64, self.suffix.as_deref());
            if !self.directory.join(name).is_file() {
                return count;
            }
            count += 1;
        }
    }

    fn frame_path(&self, key: u64) -> PathBuf {
        self.directory
            .join(replay_file_name(key, self.suffix.as_deref()))
    }
}

impl CameraBackend for FileReplayCamera {
    fn name(&self) -> &str {
        "file-replay"
    }

    fn trigger(&mut self) -> bool {
        true
    }

    fn is_ready(&self) -> bool {
        true
    }

    fn adjust_exposure_and_delay(
        &mut self,
        requested_us: f64,
        _hardware_delay_us: Option<f64>,
    ) -> f64 {
        // No device: whatever is requested is "achieved"
        self.exposure_us = requested_us;
        requested_us
    }

    fn start_transfer(&mut self) -> bool {
        self.transferring = true;
        true
    }

    fn stop_transfer(&mut self) -> bool {
        self.transferring = false;
        true
    }

    fn finish_exposure(&mut self, frame: &FrameMetadata, _scheduled_end: Option<Instant>) -> bool {
        let path = self.frame_path(frame.key);
        if !path.is_file() {
            warn!("replay frame missing: {}", path.display());
            self.last_file = None;
            return false;
        }
        self.last_file = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned());
        if self.transferring {
            if let Some(ref event) = self.transfer_event {
                let _ = event.set();
            }
        }
        true
    }

    fn connect_transfer_signal(&mut self, event: Arc<Event>) {
        self.set_transfer_event(event);
    }

    fn is_replay_source(&self) -> bool {
        true
    }

    fn last_file_name(&self) -> Option<&str> {
        self.last_file.as_deref()
    }
}
