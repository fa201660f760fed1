//! Monotonic clocks, injectable so timing-sensitive code can be tested
//! without real wall-clock delay.
//!
//! All clocks report milliseconds as `f64` since an arbitrary origin.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use rand::Rng;

/// A monotonic millisecond clock.
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> f64;
}

/// Real clock backed by [`Instant`].
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now_ms(&self) -> f64 {
        self.origin.elapsed().as_secs_f64() * 1000.0
    }
}

/// A clock that only moves when told to.
///
/// Clones share the same time source.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Arc<Mutex<f64>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, ms: f64) {
        let mut now = self.now.lock().unwrap_or_else(PoisonError::into_inner);
        *now += ms.max(0.0);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> f64 {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Rounds another clock down to a fixed resolution, like a coarse timer.
pub struct RoundedClock<C> {
    inner: C,
    resolution_ms: f64,
}

impl<C: Clock> RoundedClock<C> {
    pub fn new(inner: C, resolution_ms: f64) -> Self {
        Self {
            inner,
            resolution_ms,
        }
    }
}

impl<C: Clock> Clock for RoundedClock<C> {
    fn now_ms(&self) -> f64 {
        if self.resolution_ms <= 0.0 {
            return self.inner.now_ms();
        }
        (self.inner.now_ms() / self.resolution_ms).floor() * self.resolution_ms
    }
}

/// Stretches every elapsed interval of another clock by a random factor in
/// `[1 - amount, 1 + amount]`, like a noisy timer. Stays monotonic.
pub struct JitteredClock<C> {
    inner: C,
    amount: f64,
    // (last inner reading, last reported reading)
    last: Mutex<Option<(f64, f64)>>,
}

impl<C: Clock> JitteredClock<C> {
    pub fn new(inner: C, amount: f64) -> Self {
        Self {
            inner,
            amount: amount.clamp(0.0, 1.0),
            last: Mutex::new(None),
        }
    }
}

impl<C: Clock> Clock for JitteredClock<C> {
    fn now_ms(&self) -> f64 {
        let real = self.inner.now_ms();
        let mut last = self.last.lock().unwrap_or_else(PoisonError::into_inner);
        let reported = match *last {
            None => real,
            Some((prev_real, prev_reported)) => {
                let factor = if self.amount > 0.0 {
                    1.0 + rand::rng().random_range(-self.amount..=self.amount)
                } else {
                    1.0
                };
                prev_reported + (real - prev_real).max(0.0) * factor
            }
        };
        *last = Some((real, reported));
        reported
    }
}

impl<C: Clock + ?Sized> Clock for Arc<C> {
    fn now_ms(&self) -> f64 {
        (**self).now_ms()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_advances_only_forward() {
        let clock = ManualClock::new();
        clock.advance(5.0);
        clock.advance(-3.0);
        assert_eq!(clock.now_ms(), 5.0);
    }

    #[test]
    fn rounded_clock_truncates_to_resolution() {
        let base = ManualClock::new();
        let rounded = RoundedClock::new(base.clone(), 10.0);
        base.advance(9.9);
        assert_eq!(rounded.now_ms(), 0.0);
        base.advance(0.2);
        assert_eq!(rounded.now_ms(), 10.0);
    }

    #[test]
    fn jittered_clock_is_monotonic_and_bounded() {
        let base = ManualClock::new();
        let jittered = JitteredClock::new(base.clone(), 0.2);
        let mut previous = jittered.now_ms();
        for _ in 0..50 {
            base.advance(10.0);
            let now = jittered.now_ms();
            let delta = now - previous;
            assert!((7.99..=12.01).contains(&delta), "delta {delta} out of range");
            previous = now;
        }
    }
}
