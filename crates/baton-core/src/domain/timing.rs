//! Lock timing: durations that drive the lock state machine and its backoff.

use std::time::Duration;

use rand::Rng;

/// Timing configuration for one lock acquisition.
///
/// Every duration here is a tunable, not a protocol constant. The defaults
/// suit a handful of CI jobs writing to one pull-request comment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockTiming {
    /// Base delay between searches for a document before creating one.
    /// Listing and creating are slower than reading by id, so this gets its
    /// own knob.
    pub create_retry_delay: Duration,

    /// Number of search rounds before committing to create a new document.
    pub create_attempts: u32,

    /// Minimum time the lock must be observed as ours, unchallenged, before
    /// we trust that we hold it.
    pub min_hold_time: Duration,

    /// Sleep between checks while confirming the hold.
    pub check_delay: Duration,

    /// Lower bound of the randomized wait after seeing another holder.
    pub min_wait_time: Duration,

    /// Upper bound of the randomized wait after seeing another holder.
    pub max_wait_time: Duration,

    /// Give up once the accumulated contended wait reaches this ceiling.
    pub wait_timeout: Duration,
}

/// Invalid timing configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TimingError {
    #[error("min_hold_time must be greater than zero")]
    ZeroHoldTime,

    #[error("check_delay must be greater than zero")]
    ZeroCheckDelay,

    #[error("min_wait_time ({min:?}) is greater than max_wait_time ({max:?})")]
    InvertedWaitRange { min: Duration, max: Duration },

    #[error("create_attempts must be at least 1")]
    ZeroCreateAttempts,
}

/// `min(500ms, min_hold_time / 2)`
pub fn default_check_delay(min_hold_time: Duration) -> Duration {
    Duration::from_millis(500).min(min_hold_time / 2)
}

impl Default for LockTiming {
    fn default() -> Self {
        let min_hold_time = Duration::from_millis(2500);
        Self {
            create_retry_delay: Duration::from_millis(1000),
            create_attempts: 2,
            min_hold_time,
            check_delay: default_check_delay(min_hold_time),
            min_wait_time: Duration::from_millis(1000),
            max_wait_time: Duration::from_millis(3000),
            wait_timeout: Duration::from_secs(60),
        }
    }
}

impl LockTiming {
    /// Set the hold time and re-derive `check_delay` from it.
    pub fn with_min_hold_time(mut self, min_hold_time: Duration) -> Self {
        self.min_hold_time = min_hold_time;
        self.check_delay = default_check_delay(min_hold_time);
        self
    }

    pub fn with_check_delay(mut self, check_delay: Duration) -> Self {
        self.check_delay = check_delay;
        self
    }

    pub fn with_wait_range(mut self, min: Duration, max: Duration) -> Self {
        self.min_wait_time = min;
        self.max_wait_time = max;
        self
    }

    pub fn with_wait_timeout(mut self, wait_timeout: Duration) -> Self {
        self.wait_timeout = wait_timeout;
        self
    }

    pub fn with_create_retry_delay(mut self, delay: Duration) -> Self {
        self.create_retry_delay = delay;
        self
    }

    pub fn with_create_attempts(mut self, attempts: u32) -> Self {
        self.create_attempts = attempts;
        self
    }

    pub fn validate(&self) -> Result<(), TimingError> {
        if self.min_hold_time.is_zero() {
            return Err(TimingError::ZeroHoldTime);
        }
        if self.check_delay.is_zero() {
            return Err(TimingError::ZeroCheckDelay);
        }
        if self.min_wait_time > self.max_wait_time {
            return Err(TimingError::InvertedWaitRange {
                min: self.min_wait_time,
                max: self.max_wait_time,
            });
        }
        if self.create_attempts == 0 {
            return Err(TimingError::ZeroCreateAttempts);
        }
        Ok(())
    }

    /// Delay before the `attempt`-th search (1-indexed) for a document.
    ///
    /// Grows linearly with the attempt number, plus jitter in
    /// `[0, create_retry_delay / 2)` so that jobs started together spread out.
    pub fn create_delay<R: Rng + ?Sized>(&self, attempt: u32, rng: &mut R) -> Duration {
        let base = self.create_retry_delay.saturating_mul(attempt.max(1));
        let jitter_ceiling = as_millis(self.create_retry_delay) / 2;
        let jitter = if jitter_ceiling == 0 {
            0
        } else {
            rng.gen_range(0..jitter_ceiling)
        };
        base + Duration::from_millis(jitter)
    }

    /// Randomized wait in `[min_wait_time, max_wait_time]` after seeing the
    /// lock held by another writer.
    pub fn wait_delay<R: Rng + ?Sized>(&self, rng: &mut R) -> Duration {
        let min = as_millis(self.min_wait_time);
        let max = as_millis(self.max_wait_time).max(min);
        Duration::from_millis(rng.gen_range(min..=max))
    }
}

/// Whole milliseconds, saturating at `u64::MAX`.
pub(crate) fn as_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use rstest::rstest;

    #[test]
    fn default_timing_matches_documented_values() {
        let timing = LockTiming::default();
        assert_eq!(timing.min_hold_time, Duration::from_millis(2500));
        assert_eq!(timing.check_delay, Duration::from_millis(500));
        assert_eq!(timing.min_wait_time, Duration::from_millis(1000));
        assert_eq!(timing.max_wait_time, Duration::from_millis(3000));
        assert_eq!(timing.create_attempts, 2);
        assert!(timing.validate().is_ok());
    }

    #[rstest]
    #[case(2500, 500)]
    #[case(1000, 500)]
    #[case(600, 300)]
    #[case(100, 50)]
    fn check_delay_is_derived_from_hold_time(#[case] hold_ms: u64, #[case] expected_ms: u64) {
        let timing = LockTiming::default().with_min_hold_time(Duration::from_millis(hold_ms));
        assert_eq!(timing.check_delay, Duration::from_millis(expected_ms));
    }

    #[test]
    fn wait_delay_stays_in_range() {
        let timing = LockTiming::default();
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..200 {
            let delay = timing.wait_delay(&mut rng);
            assert!(delay >= timing.min_wait_time);
            assert!(delay <= timing.max_wait_time);
        }
    }

    #[test]
    fn create_delay_grows_with_attempts() {
        let timing = LockTiming::default();
        let mut rng = StdRng::seed_from_u64(7);

        let first = timing.create_delay(1, &mut rng);
        let second = timing.create_delay(2, &mut rng);

        assert!(first >= Duration::from_millis(1000));
        assert!(first < Duration::from_millis(1500));
        assert!(second >= Duration::from_millis(2000));
        assert!(second < Duration::from_millis(2500));
    }

    #[test]
    fn validate_rejects_inverted_wait_range() {
        let timing = LockTiming::default()
            .with_wait_range(Duration::from_millis(3000), Duration::from_millis(1000));
        assert!(matches!(
            timing.validate(),
            Err(TimingError::InvertedWaitRange { .. })
        ));
    }

    #[test]
    fn validate_rejects_zero_hold_time() {
        let timing = LockTiming::default().with_min_hold_time(Duration::ZERO);
        assert_eq!(timing.validate(), Err(TimingError::ZeroHoldTime));
    }
}
