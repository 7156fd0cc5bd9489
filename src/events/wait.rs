//! Blocking multi-wait over event file descriptors
//!
//! Wait operations take raw fds that were fetched from the registry under its
//! lock beforehand; the blocking `poll` itself holds no locks. Interrupted
//! waits (EINTR, e.g. an SDK completion callback delivered to this thread)
//! restart with the remaining timeout, so a timeout is honored end to end.

use std::os::fd::RawFd;
use std::time::{Duration, Instant};

use nix::{
    errno::Errno,
    poll::{poll, PollFd, PollFlags},
};

use crate::config;
use crate::error::{FringeError, Result};

/// Outcome of a blocking multi-wait
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// The fd at this index became signaled (for combined waits: index into
    /// the any-set)
    Signaled(usize),
    /// Every fd of the all-set has been observed signaled at least once
    AllSignaled,
    /// The timeout elapsed first
    Timeout,
}

fn remaining_ms(deadline: Option<Instant>) -> i32 {
    match deadline {
        None => -1,
        Some(deadline) => {
            let now = Instant::now();
            if deadline <= now {
                0
            } else {
                // Round up so a sub-millisecond remainder still waits
                let remaining = deadline - now;
                let ms = (remaining.as_micros() + 999) / 1000;
                ms.min(i32::MAX as u128) as i32
            }
        }
    }
}

fn poll_once(fds: &[RawFd], timeout_ms: i32) -> Result<Vec<bool>> {
    let mut pollfds: Vec<PollFd> = fds
        .iter()
        .map(|&fd| PollFd::new(fd, PollFlags::POLLIN))
        .collect();
    match poll(&mut pollfds, timeout_ms) {
        Ok(0) => Ok(vec![false; fds.len()]),
        Ok(_) => Ok(pollfds
            .iter()
            .map(|p| {
                p.revents()
                    .map(|r| r.intersects(PollFlags::POLLIN | PollFlags::POLLERR))
                    .unwrap_or(false)
            })
            .collect()),
        Err(Errno::EINTR) => Ok(vec![false; fds.len()]),
        Err(e) => Err(FringeError::wait_failed(format!("poll: {}", e))),
    }
}

/// Block until any fd becomes signaled or the timeout elapses
///
/// Returns the index of the first signaled fd. Pass `None` for an infinite
/// wait. At most [`config::WAIT_SET_CAPACITY`] fds are supported.
pub fn wait_any(fds: &[RawFd], timeout: Option<Duration>) -> Result<WaitOutcome> {
    debug_assert!(fds.len() <= config::WAIT_SET_CAPACITY);
    if fds.is_empty() {
        return Err(FringeError::wait_failed("empty wait set"));
    }
    let deadline = timeout.map(|t| Instant::now() + t);
    loop {
        let fired = poll_once(fds, remaining_ms(deadline))?;
        if let Some(idx) = fired.iter().position(|&f| f) {
            return Ok(WaitOutcome::Signaled(idx));
        }
        if let Some(deadline) = deadline {
            if Instant::now() >= deadline {
                return Ok(WaitOutcome::Timeout);
            }
        }
    }
}

/// Block until every fd has been observed signaled at least once
///
/// Observation is sticky: the fds do not need to be signaled simultaneously,
/// each only has to fire at some point during the wait.
pub fn wait_all(fds: &[RawFd], timeout: Option<Duration>) -> Result<WaitOutcome> {
    debug_assert!(fds.len() <= config::WAIT_SET_CAPACITY);
    if fds.is_empty() {
        return Ok(WaitOutcome::AllSignaled);
    }
    let deadline = timeout.map(|t| Instant::now() + t);
    let mut observed = vec![false; fds.len()];
    loop {
        let pending: Vec<RawFd> = fds
            .iter()
            .zip(observed.iter())
            .filter(|(_, &seen)| !seen)
            .map(|(&fd, _)| fd)
            .collect();
        if pending.is_empty() {
            return Ok(WaitOutcome::AllSignaled);
        }
        let fired = poll_once(&pending, remaining_ms(deadline))?;
        let mut pending_idx = 0;
        for seen in observed.iter_mut().filter(|seen| !**seen) {
            if fired[pending_idx] {
                *seen = true;
            }
            pending_idx += 1;
        }
        if observed.iter().all(|&s| s) {
            return Ok(WaitOutcome::AllSignaled);
        }
        if let Some(deadline) = deadline {
            if Instant::now() >= deadline {
                return Ok(WaitOutcome::Timeout);
            }
        }
    }
}

/// Block until any member of `any` fires, or every member of `all` has fired
///
/// Used to detect "all cameras confirmed their last frame OR the drawing
/// thread needs to bail out". The any-set wins ties.
pub fn wait_any_and_all(
    any: &[RawFd],
    all: &[RawFd],
    timeout: Option<Duration>,
) -> Result<WaitOutcome> {
    debug_assert!(any.len() + all.len() <= config::WAIT_SET_CAPACITY);
    if any.is_empty() && all.is_empty() {
        return Ok(WaitOutcome::AllSignaled);
    }
    let deadline = timeout.map(|t| Instant::now() + t);
    let mut observed = vec![false; all.len()];
    loop {
        let mut combined: Vec<RawFd> = any.to_vec();
        let pending: Vec<usize> = observed
            .iter()
            .enumerate()
            .filter(|(_, &seen)| !seen)
            .map(|(i, _)| i)
            .collect();
        combined.extend(pending.iter().map(|&i| all[i]));

        if pending.is_empty() && !all.is_empty() {
            return Ok(WaitOutcome::AllSignaled);
        }

        let fired = poll_once(&combined, remaining_ms(deadline))?;
        if let Some(idx) = fired[..any.len()].iter().position(|&f| f) {
            return Ok(WaitOutcome::Signaled(idx));
        }
        for (slot, &all_idx) in pending.iter().enumerate() {
            if fired[any.len() + slot] {
                observed[all_idx] = true;
            }
        }
        if !all.is_empty() && observed.iter().all(|&s| s) {
            return Ok(WaitOutcome::AllSignaled);
        }
        if let Some(deadline) = deadline {
            if Instant::now() >= deadline {
                return Ok(WaitOutcome::Timeout);
            }
        }
    }
}

/// Fixed-capacity wait set built once per batch by the acquisition loop
#[derive(Debug)]
pub struct WaitSet {
    fds: [RawFd; config::WAIT_SET_CAPACITY],
    len: usize,
}

impl WaitSet {
    /// Create an empty wait set
    pub fn new() -> Self {
        Self {
            fds: [-1; config::WAIT_SET_CAPACITY],
            len: 0,
        }
    }

    /// Append an fd; returns the slot index it occupies
    pub fn push(&mut self, fd: RawFd) -> Result<usize> {
        if self.len >= config::WAIT_SET_CAPACITY {
            return Err(FringeError::wait_failed("wait set full"));
        }
        let slot = self.len;
        self.fds[slot] = fd;
        self.len += 1;
        Ok(slot)
    }

    /// Number of registered fds
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the set is empty
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Block until any registered fd fires
    pub fn wait(&self, timeout: Option<Duration>) -> Result<WaitOutcome> {
        wait_any(&self.fds[..self.len], timeout)
    }
}

impl Default for WaitSet {
    fn default() -> Self {
        Self::new()
    }
}
