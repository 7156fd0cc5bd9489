//! Countdown barrier for many-to-one conditional signaling
//!
//! A conditional event only actually fires once N independent producers have
//! each requested it. The countdown is a single CAS loop so the trip decision
//! and the reset-to-start are one atomic step: for a start value of N, any
//! interleaving of k arrivals trips exactly floor(k / N) times.

use std::sync::atomic::{AtomicI64, Ordering};

/// Atomic countdown with auto-reset-to-start on trip
#[derive(Debug)]
pub struct CountdownBarrier {
    /// Remaining arrivals before the barrier trips
    remaining: AtomicI64,
    /// Value the countdown resets to after tripping
    start: AtomicI64,
}

impl CountdownBarrier {
    /// Create a barrier that trips on every arrival (start value 1)
    pub fn new() -> Self {
        Self::with_start(1)
    }

    /// Create a barrier that trips after `start` arrivals
    pub fn with_start(start: i64) -> Self {
        let start = start.max(1);
        Self {
            remaining: AtomicI64::new(start),
            start: AtomicI64::new(start),
        }
    }

    /// Register one arrival; returns true when the barrier trips
    ///
    /// On a trip the countdown is atomically reset to the start value, so the
    /// next arrival begins a fresh cycle.
    pub fn arrive(&self) -> bool {
        let start = self.start.load(Ordering::Relaxed);
        let mut current = self.remaining.load(Ordering::Relaxed);
        loop {
            let (next, trips) = if current <= 1 {
                (start, true)
            } else {
                (current - 1, false)
            };
            match self.remaining.compare_exchange_weak(
                current,
                next,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => return trips,
                Err(observed) => current = observed,
            }
        }
    }

    /// Reconfigure the barrier width and restart the current cycle
    pub fn set_start(&self, start: i64) {
        let start = start.max(1);
        self.start.store(start, Ordering::Relaxed);
        self.remaining.store(start, Ordering::Release);
    }

    /// Arrivals still needed before the next trip
    pub fn remaining(&self) -> i64 {
        self.remaining.load(Ordering::Acquire)
    }

    /// Configured width of the barrier
    pub fn start_value(&self) -> i64 {
        self.start.load(Ordering::Relaxed)
    }
}

impl Default for CountdownBarrier {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn trips_every_n_arrivals() {
        let barrier = CountdownBarrier::with_start(3);
        assert!(!barrier.arrive());
        assert!(!barrier.arrive());
        assert!(barrier.arrive());
        // Counter is back at the start value immediately after the trip
        assert_eq!(barrier.remaining(), 3);
        assert!(!barrier.arrive());
        assert!(!barrier.arrive());
        assert!(barrier.arrive());
    }

    #[test]
    fn start_of_one_always_trips() {
        let barrier = CountdownBarrier::new();
        for _ in 0..10 {
            assert!(barrier.arrive());
        }
    }

    #[test]
    fn trip_count_is_exact_under_contention() {
        let barrier = Arc::new(CountdownBarrier::with_start(4));
        let arrivals_per_thread = 1000;
        let threads = 8;

        let handles: Vec<_> = (0..threads)
            .map(|_| {
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    let mut trips = 0u64;
                    for _ in 0..arrivals_per_thread {
                        if barrier.arrive() {
                            trips += 1;
                        }
                    }
                    trips
                })
            })
            .collect();

        let total_trips: u64 = handles.into_iter().map(|h| h.join().unwrap()).sum();
        let total_arrivals = (threads * arrivals_per_thread) as u64;
        assert_eq!(total_trips, total_arrivals / 4);
        assert_eq!(barrier.remaining(), 4);
    }

    #[test]
    fn reconfigure_restarts_cycle() {
        let barrier = CountdownBarrier::with_start(2);
        assert!(!barrier.arrive());
        barrier.set_start(3);
        assert_eq!(barrier.remaining(), 3);
        assert!(!barrier.arrive());
        assert!(!barrier.arrive());
        assert!(barrier.arrive());
    }
}
