//! Backoff policy: decides retry delays.

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Exponential backoff with a cap and multiplicative jitter.
///
/// `delay = floor(min(base^retry_count, max_delay) * (1 + U))`, `U ∈ [0, jitter_ratio)`,
/// in whole seconds (the transport's delay granularity).
///
/// Example with the defaults (base=2, max=300s, jitter=0.1):
/// - retry 1: 2s
/// - retry 2: 4s
/// - retry 4: 16..17s
/// - retry 9 and above: 300..329s
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffPolicy {
    pub base: u32,
    pub max_delay_secs: u64,
    pub jitter_ratio: f64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base: 2,
            max_delay_secs: 300,
            jitter_ratio: 0.1,
        }
    }
}

impl BackoffPolicy {
    pub fn max_delay(&self) -> Duration {
        Duration::from_secs(self.max_delay_secs)
    }

    /// `min(base^retry_count, max_delay)` in seconds. Overflow saturates at the cap.
    pub fn capped_secs(&self, retry_count: u32) -> u64 {
        u64::from(self.base)
            .checked_pow(retry_count)
            .map_or(self.max_delay_secs, |secs| secs.min(self.max_delay_secs))
    }

    /// Delay for `retry_count` with an explicit jitter draw.
    ///
    /// `jitter` is clamped into `[0, jitter_ratio)`; NaN counts as zero. The
    /// result never exceeds the upper value of [`BackoffPolicy::bounds`].
    pub fn delay_for(&self, retry_count: u32, jitter: f64) -> Duration {
        let ratio = self.jitter_ratio.max(0.0);
        let jitter = if jitter.is_nan() {
            0.0
        } else {
            jitter.clamp(0.0, ratio)
        };
        let capped = self.capped_secs(retry_count) as f64;
        let secs = (capped * (1.0 + jitter)).floor() as u64;
        let (_, upper) = self.bounds(retry_count);
        Duration::from_secs(secs).min(upper)
    }

    /// Delay for `retry_count` with one uniform draw from `rng`.
    pub fn compute_delay<R: Rng + ?Sized>(&self, retry_count: u32, rng: &mut R) -> Duration {
        let jitter = if self.jitter_ratio > 0.0 {
            rng.gen_range(0.0..self.jitter_ratio)
        } else {
            0.0
        };
        self.delay_for(retry_count, jitter)
    }

    /// Smallest and largest delay `compute_delay` can return for `retry_count`.
    ///
    /// The jitter range is half-open, so when `capped * (1 + jitter_ratio)` is a
    /// whole number of seconds that value itself is out of reach.
    pub fn bounds(&self, retry_count: u32) -> (Duration, Duration) {
        let capped = self.capped_secs(retry_count);
        let ratio = self.jitter_ratio.max(0.0);
        if ratio == 0.0 || ratio.is_nan() {
            return (Duration::from_secs(capped), Duration::from_secs(capped));
        }

        // Largest whole second strictly below the product, tolerating float error.
        let top = capped as f64 * (1.0 + ratio);
        let upper = ((top - 1e-9).ceil() - 1.0).max(capped as f64) as u64;
        (Duration::from_secs(capped), Duration::from_secs(upper))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use rstest::rstest;

    #[test]
    fn default_policy_matches_requirements() {
        let policy = BackoffPolicy::default();
        assert_eq!(policy.base, 2);
        assert_eq!(policy.max_delay(), Duration::from_secs(300));
        assert_eq!(policy.jitter_ratio, 0.1);
    }

    #[rstest]
    #[case(0, 1)]
    #[case(1, 2)]
    #[case(2, 4)]
    #[case(3, 8)]
    #[case(8, 256)]
    #[case(9, 300)]
    #[case(20, 300)]
    #[case(64, 300)]
    #[case(u32::MAX, 300)]
    fn without_jitter_grows_then_caps(#[case] retry_count: u32, #[case] secs: u64) {
        let policy = BackoffPolicy::default();
        assert_eq!(policy.delay_for(retry_count, 0.0), Duration::from_secs(secs));
    }

    #[rstest]
    #[case(1, 0.0999, 2)]
    #[case(4, 0.0999, 17)]
    #[case(9, 0.05, 315)]
    #[case(9, 0.0999, 329)]
    fn jitter_is_multiplicative_and_floored(
        #[case] retry_count: u32,
        #[case] jitter: f64,
        #[case] secs: u64,
    ) {
        let policy = BackoffPolicy::default();
        assert_eq!(policy.delay_for(retry_count, jitter), Duration::from_secs(secs));
    }

    #[test]
    fn out_of_range_jitter_is_clamped() {
        let policy = BackoffPolicy::default();
        assert_eq!(policy.delay_for(9, -1.0), Duration::from_secs(300));
        assert_eq!(policy.delay_for(9, 5.0), Duration::from_secs(329));
        assert_eq!(policy.delay_for(9, f64::NAN), Duration::from_secs(300));
    }

    #[test]
    fn random_delays_stay_within_bounds() {
        let policy = BackoffPolicy::default();
        let mut rng = StdRng::seed_from_u64(7);

        for retry_count in 0..20 {
            let (low, high) = policy.bounds(retry_count);
            for _ in 0..200 {
                let delay = policy.compute_delay(retry_count, &mut rng);
                assert!(
                    (low..=high).contains(&delay),
                    "retry_count={retry_count} delay={delay:?} bounds=[{low:?}, {high:?}]"
                );
            }
        }
    }

    #[test]
    fn average_delay_does_not_decrease() {
        let policy = BackoffPolicy::default();
        let mut rng = StdRng::seed_from_u64(42);

        let mut mean = |retry_count: u32| {
            let total: u64 = (0..500)
                .map(|_| policy.compute_delay(retry_count, &mut rng).as_secs())
                .sum();
            total as f64 / 500.0
        };

        let mut previous = 0.0;
        for retry_count in 0..=9 {
            let current = mean(retry_count);
            assert!(current >= previous, "retry_count={retry_count}");
            previous = current;
        }

        // Past the cap the mean stays inside the jittered cap range.
        for retry_count in 10..16 {
            let current = mean(retry_count);
            assert!((300.0..330.0).contains(&current), "retry_count={retry_count}");
        }
    }

    #[test]
    fn zero_jitter_ratio_is_deterministic() {
        let policy = BackoffPolicy {
            jitter_ratio: 0.0,
            ..BackoffPolicy::default()
        };
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(policy.compute_delay(5, &mut rng), Duration::from_secs(32));
    }

    #[rstest]
    #[case(1, 2, 2)]
    #[case(4, 16, 17)]
    #[case(8, 256, 281)]
    #[case(9, 300, 329)]
    #[case(40, 300, 329)]
    fn bounds_exclude_the_jitter_ratio_itself(
        #[case] retry_count: u32,
        #[case] low: u64,
        #[case] high: u64,
    ) {
        let policy = BackoffPolicy::default();
        assert_eq!(
            policy.bounds(retry_count),
            (Duration::from_secs(low), Duration::from_secs(high))
        );
        assert_eq!(
            policy.delay_for(retry_count, policy.jitter_ratio),
            Duration::from_secs(high)
        );
    }

    #[test]
    fn zero_jitter_bounds_collapse() {
        let policy = BackoffPolicy {
            jitter_ratio: 0.0,
            ..BackoffPolicy::default()
        };
        assert_eq!(
            policy.bounds(5),
            (Duration::from_secs(32), Duration::from_secs(32))
        );
    }
}
