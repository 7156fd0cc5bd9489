//! Manually-reset binary events backed by eventfd
//!
//! An event is a level-triggered signal: `set` makes the underlying eventfd
//! readable and it stays readable until someone drains it with `reset`.
//! Waiting never consumes the signal, which gives the manual-reset semantics
//! the acquisition protocol is built on. The raw fd is exposed so a wait set
//! can poll several events (and a watchdog timerfd) in one blocking call.

use std::os::fd::RawFd;
use std::sync::Arc;

use nix::{
    errno::Errno,
    poll::{poll, PollFd, PollFlags},
    sys::eventfd::{eventfd, EfdFlags},
    unistd::{close, read, write},
};

use crate::error::{FringeError, Result};

use super::barrier::CountdownBarrier;

/// A named, manually-reset cross-thread signal
///
/// Carries one countdown barrier per side (set/reset) for conditional
/// signaling. Handles are shared as `Arc<Event>`; the fd is closed when the
/// last handle drops.
#[derive(Debug)]
pub struct Event {
    fd: RawFd,
    set_barrier: CountdownBarrier,
    reset_barrier: CountdownBarrier,
}

impl Event {
    /// Allocate a fresh unsignaled event
    pub fn new() -> Result<Self> {
        let fd = eventfd(0, EfdFlags::EFD_CLOEXEC | EfdFlags::EFD_NONBLOCK)
            .map_err(|e| FringeError::signal(format!("eventfd create: {}", e)))?;
        Ok(Self {
            fd,
            set_barrier: CountdownBarrier::new(),
            reset_barrier: CountdownBarrier::new(),
        })
    }

    /// Allocate a shared handle to a fresh event
    pub fn new_shared() -> Result<Arc<Self>> {
        Ok(Arc::new(Self::new()?))
    }

    /// Raw fd for external wait sets
    pub fn fd(&self) -> RawFd {
        self.fd
    }

    /// Signal the event; stays signaled until `reset`
    pub fn set(&self) -> Result<()> {
        let buf = 1u64.to_ne_bytes();
        match write(self.fd, &buf) {
            Ok(_) => Ok(()),
            // Counter saturated: the event is already well past signaled
            Err(Errno::EAGAIN) => Ok(()),
            Err(e) => Err(FringeError::signal(format!("eventfd write: {}", e))),
        }
    }

    /// Clear the event; returns whether it was signaled beforehand
    pub fn reset(&self) -> bool {
        let mut buf = [0u8; 8];
        match read(self.fd, &mut buf) {
            Ok(_) => true,
            Err(_) => false,
        }
    }

    /// Non-blocking check of the signaled state
    pub fn is_signaled(&self) -> bool {
        let mut fds = [PollFd::new(self.fd, PollFlags::POLLIN)];
        matches!(poll(&mut fds, 0), Ok(n) if n > 0)
    }

    /// Conditional set: one arrival on the set-side barrier; the event is only
    /// actually signaled on the arrival that trips the barrier. Returns whether
    /// the underlying event fired.
    pub fn set_conditional(&self) -> Result<bool> {
        if self.set_barrier.arrive() {
            self.set()?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    /// Conditional reset, symmetric to `set_conditional`
    pub fn reset_conditional(&self) -> bool {
        if self.reset_barrier.arrive() {
            self.reset();
            true
        } else {
            false
        }
    }

    /// Set-side barrier (width configuration and introspection)
    pub fn set_barrier(&self) -> &CountdownBarrier {
        &self.set_barrier
    }

    /// Reset-side barrier
    pub fn reset_barrier(&self) -> &CountdownBarrier {
        &self.reset_barrier
    }
}

impl Drop for Event {
    fn drop(&mut self) {
        let _ = close(self.fd);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_reset_cycle() {
        let event = Event::new().unwrap();
        assert!(!event.is_signaled());

        event.set().unwrap();
        assert!(event.is_signaled());
        // Manual reset: checking does not consume the signal
        assert!(event.is_signaled());

        assert!(event.reset());
        assert!(!event.is_signaled());
        assert!(!event.reset());
    }

    #[test]
    fn repeated_sets_drain_in_one_reset() {
        let event = Event::new().unwrap();
        event.set().unwrap();
        event.set().unwrap();
        event.set().unwrap();
        assert!(event.reset());
        assert!(!event.is_signaled());
    }

    #[test]
    fn conditional_set_fires_on_trip_only() {
        let event = Event::new().unwrap();
        event.set_barrier().set_start(3);

        assert!(!event.set_conditional().unwrap());
        assert!(!event.is_signaled());
        assert!(!event.set_conditional().unwrap());
        assert!(!event.is_signaled());
        assert!(event.set_conditional().unwrap());
        assert!(event.is_signaled());
        // Counter re-armed to the start value after the trip
        assert_eq!(event.set_barrier().remaining(), 3);
    }
}
