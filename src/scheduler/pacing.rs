//! Randomized human-like delays.

use std::time::Duration;

use rand::Rng;

/// A uniform delay interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DelayRange {
    pub min: Duration,
    pub max: Duration,
}

impl DelayRange {
    pub const ZERO: DelayRange = DelayRange {
        min: Duration::ZERO,
        max: Duration::ZERO,
    };

    /// Build a range; bounds given in the wrong order are swapped.
    pub fn new(min: Duration, max: Duration) -> Self {
        if min <= max {
            Self { min, max }
        } else {
            Self { min: max, max: min }
        }
    }

    pub fn from_secs(min: u64, max: u64) -> Self {
        Self::new(Duration::from_secs(min), Duration::from_secs(max))
    }

    /// Draw a delay uniformly from the range, at millisecond resolution.
    pub fn sample(&self) -> Duration {
        self.sample_with(&mut rand::rng())
    }

    pub fn sample_with<R: Rng + ?Sized>(&self, rng: &mut R) -> Duration {
        let min = self.min.as_millis() as u64;
        let max = self.max.as_millis() as u64;
        if min >= max {
            return self.min;
        }
        Duration::from_millis(rng.random_range(min..=max))
    }

    /// Sleep for a sampled delay and return it.
    pub async fn pause(&self) -> Duration {
        let delay = self.sample();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        delay
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_samples_stay_in_range() {
        let range = DelayRange::from_secs(5, 10);
        for _ in 0..200 {
            let d = range.sample();
            assert!(d >= Duration::from_secs(5) && d <= Duration::from_secs(10));
        }
    }

    #[test]
    fn test_inverted_bounds_are_swapped() {
        let range = DelayRange::from_secs(9, 3);
        assert_eq!(range.min, Duration::from_secs(3));
        assert_eq!(range.max, Duration::from_secs(9));
    }

    #[tokio::test]
    async fn test_zero_range_does_not_sleep() {
        assert_eq!(DelayRange::ZERO.pause().await, Duration::ZERO);
    }
}
