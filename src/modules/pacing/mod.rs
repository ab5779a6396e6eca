//! Human-like pacing between requests.
//!
//! [`DelayWindow`] draws the pause between warm-up and query, [`Backoff`]
//! spaces out retries in the optional retry decorator.

use rand::Rng;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("delay window minimum {min:?} exceeds maximum {max:?}")]
pub struct DelayWindowError {
    pub min: Duration,
    pub max: Duration,
}

/// Uniform random pause in `[min, max]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DelayWindow {
    min: Duration,
    max: Duration,
}

impl DelayWindow {
    pub fn new(min: Duration, max: Duration) -> Result<Self, DelayWindowError> {
        if min > max {
            return Err(DelayWindowError { min, max });
        }
        Ok(Self { min, max })
    }

    /// No pause at all.
    pub fn none() -> Self {
        Self {
            min: Duration::ZERO,
            max: Duration::ZERO,
        }
    }

    pub fn min(&self) -> Duration {
        self.min
    }

    pub fn max(&self) -> Duration {
        self.max
    }

    pub fn sample(&self) -> Duration {
        if self.min == self.max {
            return self.min;
        }
        let millis = rand::thread_rng()
            .gen_range(self.min.as_millis() as u64..=self.max.as_millis() as u64);
        Duration::from_millis(millis)
    }
}

impl Default for DelayWindow {
    fn default() -> Self {
        Self {
            min: Duration::from_millis(1_000),
            max: Duration::from_millis(3_000),
        }
    }
}

/// Exponential backoff with symmetric jitter.
#[derive(Debug, Clone)]
pub struct Backoff {
    base: Duration,
    max: Duration,
    variance_pct: f64,
}

impl Backoff {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max,
            variance_pct: 0.25,
        }
    }

    pub fn with_variance(mut self, variance_pct: f64) -> Self {
        self.variance_pct = variance_pct.clamp(0.0, 1.0);
        self
    }

    /// Delay before retry number `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        let mut delay = self.base.as_millis() as f64 * f64::from(1u32 << exponent);
        delay = delay.min(self.max.as_millis() as f64);

        let variance = delay * self.variance_pct;
        let jitter = rand::random::<f64>() * variance - (variance / 2.0);
        delay = (delay + jitter).clamp(0.0, self.max.as_millis() as f64);
        Duration::from_millis(delay as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn samples_within_window() {
        let window = DelayWindow::default();
        for _ in 0..200 {
            let delay = window.sample();
            assert!(delay >= Duration::from_secs(1) && delay <= Duration::from_secs(3));
        }
    }

    #[test]
    fn degenerate_and_invalid_windows() {
        assert_eq!(DelayWindow::none().sample(), Duration::ZERO);
        assert!(DelayWindow::new(Duration::from_secs(2), Duration::from_secs(1)).is_err());
    }

    #[test]
    fn backoff_grows_and_caps() {
        let backoff = Backoff::new(Duration::from_millis(100), Duration::from_millis(1_000))
            .with_variance(0.0);
        assert_eq!(backoff.delay_for(1), Duration::from_millis(100));
        assert_eq!(backoff.delay_for(2), Duration::from_millis(200));
        assert_eq!(backoff.delay_for(3), Duration::from_millis(400));
        assert_eq!(backoff.delay_for(10), Duration::from_millis(1_000));
    }
}
