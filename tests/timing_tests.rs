//! Tests for the spin timer and the exposure watchdog
//!
//! Timing assertions use generous lower bounds and loose upper bounds so
//! they hold on loaded CI machines.

use std::time::{Duration, Instant};

use fringesync::events::{wait_any, WaitOutcome};
use fringesync::timing::spin::SpinTimer;
use fringesync::timing::ticks::{duration_to_ms, duration_to_us, us_to_duration};
use fringesync::timing::watchdog::{watchdog_interval, ExposureWatchdog};

#[cfg(test)]
mod timing_tests {
    use super::*;

    /// Test: microsecond/Duration conversions, including invalid inputs
    #[test]
    fn test_tick_conversions() {
        assert_eq!(us_to_duration(1_000.0), Duration::from_millis(1));
        assert_eq!(us_to_duration(-5.0), Duration::ZERO);
        assert_eq!(us_to_duration(f64::NAN), Duration::ZERO);
        assert!((duration_to_ms(Duration::from_micros(1_500)) - 1.5).abs() < 1e-9);
        assert!((duration_to_us(Duration::from_millis(2)) - 2_000.0).abs() < 1e-9);
    }

    /// Test: interval wait never returns early
    #[test]
    fn test_spin_timer_waits_full_interval() {
        let mut timer = SpinTimer::new();
        timer.set_interval(Duration::from_millis(5));

        let start = Instant::now();
        timer.wait();
        let elapsed = start.elapsed();

        assert!(elapsed >= Duration::from_millis(5), "returned after {:?}", elapsed);
        assert!(elapsed < Duration::from_millis(50), "overshot to {:?}", elapsed);
        assert!(timer.last_wait() >= Duration::from_millis(5));
    }

    /// Test: sub-millisecond intervals are honored by the spin phase
    #[test]
    fn test_spin_timer_microsecond_interval() {
        let mut timer = SpinTimer::new();
        timer.set_interval_us(300.0);

        let start = Instant::now();
        timer.wait();
        let elapsed = start.elapsed();

        assert!(elapsed >= Duration::from_micros(300));
        assert!(elapsed < Duration::from_millis(20));
    }

    /// Test: a deadline already in the past returns immediately
    #[test]
    fn test_wait_from_to_past_deadline() {
        let mut timer = SpinTimer::new();
        let now = Instant::now();

        let start = Instant::now();
        timer.wait_from_to(now, now - Duration::from_millis(10));
        assert!(start.elapsed() < Duration::from_millis(5));

        // Inverted window is also an immediate no-op
        let start = Instant::now();
        timer.wait_from_to(now, now - Duration::from_secs(1));
        assert!(start.elapsed() < Duration::from_millis(5));
    }

    /// Test: wait_until holds out to an absolute deadline
    #[test]
    fn test_wait_until_absolute_deadline() {
        let mut timer = SpinTimer::new();
        let deadline = Instant::now() + Duration::from_millis(8);
        timer.wait_until(deadline);
        assert!(Instant::now() >= deadline);
    }

    /// Test: watchdog interval policy, exposure multiple with a floor
    #[test]
    fn test_watchdog_interval_policy() {
        let floor = Duration::from_secs(5);

        // Short exposures land on the floor
        assert_eq!(watchdog_interval(Duration::from_millis(16), floor), floor);

        // Long exposures scale past it
        assert_eq!(
            watchdog_interval(Duration::from_secs(1), floor),
            Duration::from_secs(10)
        );
    }

    /// Test: an armed watchdog becomes pollable after the interval
    #[test]
    fn test_watchdog_fires_when_armed() {
        let watchdog = ExposureWatchdog::new().unwrap();
        assert!(!watchdog.is_armed());

        watchdog.arm(Duration::from_millis(20)).unwrap();
        assert!(watchdog.is_armed());

        let outcome = wait_any(&[watchdog.fd()], Some(Duration::from_secs(2))).unwrap();
        assert_eq!(outcome, WaitOutcome::Signaled(0));

        watchdog.acknowledge();
        assert!(!watchdog.is_armed());
    }

    /// Test: disarming before expiry suppresses the timeout
    #[test]
    fn test_watchdog_disarm_suppresses_expiry() {
        let watchdog = ExposureWatchdog::new().unwrap();
        watchdog.arm(Duration::from_millis(30)).unwrap();
        watchdog.disarm().unwrap();
        assert!(!watchdog.is_armed());

        let outcome = wait_any(&[watchdog.fd()], Some(Duration::from_millis(80))).unwrap();
        assert_eq!(outcome, WaitOutcome::Timeout);
    }

    /// Test: re-arming replaces the pending interval
    #[test]
    fn test_watchdog_rearm_replaces_interval() {
        let watchdog = ExposureWatchdog::new().unwrap();
        watchdog.arm(Duration::from_secs(60)).unwrap();
        watchdog.arm(Duration::from_millis(15)).unwrap();

        let start = Instant::now();
        let outcome = wait_any(&[watchdog.fd()], Some(Duration::from_secs(2))).unwrap();
        assert_eq!(outcome, WaitOutcome::Signaled(0));
        assert!(start.elapsed() < Duration::from_secs(1));
        watchdog.acknowledge();
    }
}
