//! Running frame and trigger statistics
//!
//! Welford online accumulator for duration samples (trigger duration, trigger
//! frequency, acquisition duration), with running min/max and a first/last
//! timestamp pair for FPS and total-duration estimates. Accessors return NaN
//! until enough samples exist, so an unfilled accumulator is visibly
//! undefined instead of silently zero.

use std::sync::RwLock;
use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::timing::ticks::duration_to_ms;

#[derive(Debug, Clone, Copy)]
struct Aggregate {
    count: u64,
    mean: f64,
    m2: f64,
    min: f64,
    max: f64,
    /// Timestamped events seen (a baseline `add_frame` counts here but not in
    /// `count`)
    events: u64,
    first: Option<Instant>,
    last: Option<Instant>,
}

impl Aggregate {
    fn empty() -> Self {
        Self {
            count: 0,
            mean: 0.0,
            m2: 0.0,
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
            events: 0,
            first: None,
            last: None,
        }
    }

    fn push(&mut self, value_ms: f64) {
        self.count += 1;
        let delta = value_ms - self.mean;
        self.mean += delta / self.count as f64;
        self.m2 += delta * (value_ms - self.mean);
        self.min = self.min.min(value_ms);
        self.max = self.max.max(value_ms);
    }

    fn observe(&mut self, tic: Instant, toc: Instant) {
        if self.first.is_none() {
            self.first = Some(tic);
            self.events += 1;
        }
        self.last = Some(toc);
        self.events += 1;
    }
}

/// Plain snapshot of an accumulator, for reporting and serialization
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub count: u64,
    pub mean_ms: f64,
    pub deviation_ms: f64,
    pub min_ms: f64,
    pub max_ms: f64,
    pub fps: f64,
    pub total_time_ms: f64,
}

/// Lock-guarded Welford accumulator for duration samples
#[derive(Debug)]
pub struct FrameStatistics {
    inner: RwLock<Aggregate>,
}

impl FrameStatistics {
    /// Create an empty accumulator
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Aggregate::empty()),
        }
    }

    /// Add one duration sample spanning `tic..toc`
    ///
    /// An inverted pair (`toc < tic`) is ignored rather than recorded as a
    /// negative duration.
    pub fn add_measurement(&self, tic: Instant, toc: Instant) {
        if toc < tic {
            return;
        }
        let value_ms = duration_to_ms(toc - tic);
        let mut agg = self.inner.write().unwrap();
        agg.push(value_ms);
        agg.observe(tic, toc);
    }

    /// Add a frame event; the sample is the gap since the previous call
    ///
    /// The first call only records a baseline timestamp.
    pub fn add_frame(&self) {
        let now = Instant::now();
        let mut agg = self.inner.write().unwrap();
        match agg.last {
            Some(prev) => {
                let value_ms = duration_to_ms(now.saturating_duration_since(prev));
                agg.push(value_ms);
                agg.last = Some(now);
                agg.events += 1;
            }
            None => {
                agg.first = Some(now);
                agg.last = Some(now);
                agg.events = 1;
            }
        }
    }

    /// Record the begin instant of an explicit tic/toc pair
    pub fn tic(&self) -> Instant {
        Instant::now()
    }

    /// Close an explicit tic/toc pair started with [`FrameStatistics::tic`]
    pub fn toc(&self, tic: Instant) {
        self.add_measurement(tic, Instant::now());
    }

    /// Clear all samples
    pub fn reset(&self) {
        *self.inner.write().unwrap() = Aggregate::empty();
    }

    /// Number of recorded samples
    pub fn count(&self) -> u64 {
        self.inner.read().unwrap().count
    }

    /// Sample mean in milliseconds; NaN below one sample
    pub fn mean_ms(&self) -> f64 {
        let agg = self.inner.read().unwrap();
        if agg.count >= 1 {
            agg.mean
        } else {
            f64::NAN
        }
    }

    /// Smallest sample in milliseconds; NaN below one sample
    pub fn min_ms(&self) -> f64 {
        let agg = self.inner.read().unwrap();
        if agg.count >= 1 {
            agg.min
        } else {
            f64::NAN
        }
    }

    /// Largest sample in milliseconds; NaN below one sample
    pub fn max_ms(&self) -> f64 {
        let agg = self.inner.read().unwrap();
        if agg.count >= 1 {
            agg.max
        } else {
            f64::NAN
        }
    }

    /// Sample standard deviation in milliseconds; NaN below two samples
    pub fn deviation_ms(&self) -> f64 {
        let agg = self.inner.read().unwrap();
        if agg.count >= 2 {
            (agg.m2 / (agg.count - 1) as f64).sqrt()
        } else {
            f64::NAN
        }
    }

    /// Events per second over the observed span; NaN below two events
    pub fn fps(&self) -> f64 {
        let agg = self.inner.read().unwrap();
        match (agg.first, agg.last) {
            (Some(first), Some(last)) if agg.events >= 2 && last > first => {
                (agg.events - 1) as f64 / (last - first).as_secs_f64()
            }
            _ => f64::NAN,
        }
    }

    /// Wall time between the first and last event in milliseconds; NaN below
    /// two events
    pub fn total_time_ms(&self) -> f64 {
        let agg = self.inner.read().unwrap();
        match (agg.first, agg.last) {
            (Some(first), Some(last)) if agg.events >= 2 => duration_to_ms(last - first),
            _ => f64::NAN,
        }
    }

    /// Merge two accumulators into a new one (parallel-variance combination)
    ///
    /// Either side being empty yields the other side unchanged.
    pub fn combine(a: &FrameStatistics, b: &FrameStatistics) -> FrameStatistics {
        let agg_a = *a.inner.read().unwrap();
        let agg_b = *b.inner.read().unwrap();

        let merged = if agg_a.count == 0 {
            Self::merge_timestamps(agg_b, agg_a)
        } else if agg_b.count == 0 {
            Self::merge_timestamps(agg_a, agg_b)
        } else {
            let n_a = agg_a.count as f64;
            let n_b = agg_b.count as f64;
            let n = n_a + n_b;
            let delta = agg_b.mean - agg_a.mean;
            Aggregate {
                count: agg_a.count + agg_b.count,
                mean: agg_a.mean + delta * n_b / n,
                m2: agg_a.m2 + agg_b.m2 + delta * delta * n_a * n_b / n,
                min: agg_a.min.min(agg_b.min),
                max: agg_a.max.max(agg_b.max),
                events: agg_a.events + agg_b.events,
                first: Self::earlier(agg_a.first, agg_b.first),
                last: Self::later(agg_a.last, agg_b.last),
            }
        };

        FrameStatistics {
            inner: RwLock::new(merged),
        }
    }

    fn merge_timestamps(mut keep: Aggregate, other: Aggregate) -> Aggregate {
        keep.first = Self::earlier(keep.first, other.first);
        keep.last = Self::later(keep.last, other.last);
        keep.events += other.events;
        keep
    }

    fn earlier(a: Option<Instant>, b: Option<Instant>) -> Option<Instant> {
        match (a, b) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (x, None) | (None, x) => x,
        }
    }

    fn later(a: Option<Instant>, b: Option<Instant>) -> Option<Instant> {
        match (a, b) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (x, None) | (None, x) => x,
        }
    }

    /// Snapshot the current aggregate for reporting
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            count: self.count(),
            mean_ms: self.mean_ms(),
            deviation_ms: self.deviation_ms(),
            min_ms: self.min_ms(),
            max_ms: self.max_ms(),
            fps: self.fps(),
            total_time_ms: self.total_time_ms(),
        }
    }
}

impl Default for FrameStatistics {
    fn default() -> Self {
        Self::new()
    }
}
