// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Per-second rates from cumulative counters (network bytes, disk sectors).
//!
//! Counter resets are not special-cased: a counter that goes backwards yields a negative rate
//! for one sample, which callers display as-is.

use std::sync::{Mutex, PoisonError};
use tokio::time::Instant;

#[derive(Debug, Clone, Copy)]
struct RateState {
    last_value: f64,
    last_timestamp: Instant,
}

/// Tracks one counter. Each tracker has its own lock and never shares state with another.
#[derive(Debug, Default)]
pub struct RateTracker {
    state: Mutex<Option<RateState>>,
}

impl RateTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `value` and returns the rate since the previous sample, in units per second.
    /// The first sample after construction or [`RateTracker::reset`] returns `0.0`.
    pub fn sample(&self, value: f64) -> f64 {
        self.sample_at(value, Instant::now())
    }

    pub fn sample_at(&self, value: f64, now: Instant) -> f64 {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let previous = state.replace(RateState {
            last_value: value,
            last_timestamp: now,
        });

        let Some(previous) = previous else {
            return 0.0;
        };
        // a clock that did not move forward yields 0 for this sample only; state still advances
        let elapsed = now
            .checked_duration_since(previous.last_timestamp)
            .map_or(0.0, |elapsed| elapsed.as_secs_f64());
        if elapsed <= 0.0 {
            return 0.0;
        }
        (value - previous.last_value) / elapsed
    }

    pub fn reset(&self) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::Duration;

    #[test]
    fn test_first_sample_returns_zero() {
        let tracker = RateTracker::new();
        assert_eq!(tracker.sample(1000.0), 0.0);
    }

    #[test]
    fn test_rate_between_samples() {
        let tracker = RateTracker::new();
        let start = Instant::now();

        tracker.sample_at(1000.0, start);
        let rate = tracker.sample_at(2000.0, start + Duration::from_millis(100));

        assert!((rate - 10_000.0).abs() < 1e-6, "rate was {rate}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_with_wall_clock() {
        let tracker = RateTracker::new();
        tracker.sample(1000.0);
        tokio::time::advance(Duration::from_millis(100)).await;
        let rate = tracker.sample(2000.0);

        assert!((rate - 10_000.0).abs() < 1.0, "rate was {rate}");
    }

    #[test]
    fn test_reset_behaves_like_first_sample() {
        let tracker = RateTracker::new();
        let start = Instant::now();
        tracker.sample_at(1000.0, start);
        tracker.reset();

        assert_eq!(
            tracker.sample_at(2000.0, start + Duration::from_secs(1)),
            0.0
        );
        let rate = tracker.sample_at(2500.0, start + Duration::from_secs(2));
        assert!((rate - 500.0).abs() < 1e-6);
    }

    #[test]
    fn test_zero_elapsed_returns_zero_and_advances_state() {
        let tracker = RateTracker::new();
        let start = Instant::now();
        tracker.sample_at(1000.0, start);

        assert_eq!(tracker.sample_at(5000.0, start), 0.0);

        // the stalled sample was still recorded as the new baseline
        let rate = tracker.sample_at(6000.0, start + Duration::from_secs(1));
        assert!((rate - 1000.0).abs() < 1e-6);
    }

    #[test]
    fn test_counter_reset_yields_negative_rate() {
        let tracker = RateTracker::new();
        let start = Instant::now();
        tracker.sample_at(10_000.0, start);

        let rate = tracker.sample_at(0.0, start + Duration::from_secs(2));
        assert!((rate + 5000.0).abs() < 1e-6);
    }

    #[test]
    fn test_trackers_are_independent() {
        let rx = RateTracker::new();
        let tx = RateTracker::new();
        let start = Instant::now();

        rx.sample_at(100.0, start);
        assert_eq!(tx.sample_at(100.0, start + Duration::from_secs(1)), 0.0);
        let rate = rx.sample_at(300.0, start + Duration::from_secs(1));
        assert!((rate - 200.0).abs() < 1e-6);
    }
}
