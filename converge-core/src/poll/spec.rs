//! Poll specification: label sets and timings for one convergence run

use std::collections::BTreeSet;
use std::time::Duration;

use super::error::SpecError;

/// Initial delay before the first probe
pub const DEFAULT_DELAY: Duration = Duration::from_secs(10);

/// Lower bound on the gap between two probes
pub const DEFAULT_MIN_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// Consecutive absent observations tolerated before giving up
pub const DEFAULT_NOT_FOUND_CHECKS: u32 = 20;

/// First backoff step when no fixed interval is configured
pub const DEFAULT_BACKOFF_INITIAL: Duration = Duration::from_millis(100);

/// Backoff ceiling when no fixed interval is configured
pub const DEFAULT_BACKOFF_MAX: Duration = Duration::from_secs(10);

/// How long to sleep between probes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollInterval {
    /// Sleep the same amount after every probe
    Fixed(Duration),
    /// Double the sleep after every probe, starting at `initial`, capped at `max`
    Backoff { initial: Duration, max: Duration },
}

impl PollInterval {
    /// Sleep before probe number `attempt + 1`, where `attempt` counts from 1,
    /// never less than `min`.
    pub fn delay_after(&self, attempt: u32, min: Duration) -> Duration {
        let raw = match *self {
            PollInterval::Fixed(interval) => interval,
            PollInterval::Backoff { initial, max } => {
                let shift = attempt.saturating_sub(1).min(31);
                initial.saturating_mul(1u32 << shift).min(max)
            }
        };
        raw.max(min)
    }
}

impl Default for PollInterval {
    fn default() -> Self {
        PollInterval::Fixed(DEFAULT_MIN_POLL_INTERVAL)
    }
}

/// What to do with a status label that is neither pending nor target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnclassifiedPolicy {
    /// Log a warning and keep polling
    #[default]
    Pending,
    /// Stop with [`super::PollError::UnclassifiedStatus`]
    Fail,
}

/// Configuration for one convergence run
#[derive(Debug, Clone, PartialEq)]
pub struct PollSpec {
    /// Labels meaning "still in progress"
    pub pending: BTreeSet<String>,
    /// Labels meaning "converged", in priority order
    pub target: Vec<String>,
    /// Wait before the first probe
    pub delay: Duration,
    /// Sleep between probes
    pub interval: PollInterval,
    /// Lower bound applied to every sleep between probes
    pub min_poll_interval: Duration,
    /// Total budget, measured from the start of the run (delay included)
    pub timeout: Duration,
    /// Consecutive target observations required before succeeding
    pub continuous_target_occurrence: u32,
    /// Consecutive absent observations tolerated while not at a target
    pub not_found_checks: u32,
    /// Handling of labels outside both sets
    pub unclassified: UnclassifiedPolicy,
}

impl PollSpec {
    pub fn new<P, T>(pending: P, target: T, timeout: Duration) -> Self
    where
        P: IntoIterator,
        P::Item: Into<String>,
        T: IntoIterator,
        T::Item: Into<String>,
    {
        Self {
            pending: pending.into_iter().map(Into::into).collect(),
            target: target.into_iter().map(Into::into).collect(),
            delay: DEFAULT_DELAY,
            interval: PollInterval::default(),
            min_poll_interval: DEFAULT_MIN_POLL_INTERVAL,
            timeout,
            continuous_target_occurrence: 1,
            not_found_checks: DEFAULT_NOT_FOUND_CHECKS,
            unclassified: UnclassifiedPolicy::default(),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.interval = PollInterval::Fixed(interval);
        self
    }

    pub fn with_backoff(mut self, initial: Duration, max: Duration) -> Self {
        self.interval = PollInterval::Backoff { initial, max };
        self
    }

    pub fn with_min_poll_interval(mut self, min: Duration) -> Self {
        self.min_poll_interval = min;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_continuous_target_occurrence(mut self, occurrences: u32) -> Self {
        self.continuous_target_occurrence = occurrences;
        self
    }

    pub fn with_not_found_checks(mut self, checks: u32) -> Self {
        self.not_found_checks = checks;
        self
    }

    pub fn with_unclassified(mut self, policy: UnclassifiedPolicy) -> Self {
        self.unclassified = policy;
        self
    }

    pub fn is_pending(&self, label: &str) -> bool {
        self.pending.contains(label)
    }

    pub fn is_target(&self, label: &str) -> bool {
        self.target.iter().any(|t| t == label)
    }

    /// Check the invariants the poller relies on
    pub fn validate(&self) -> Result<(), SpecError> {
        if self.timeout.is_zero() {
            return Err(SpecError::ZeroTimeout);
        }
        if self.continuous_target_occurrence == 0 {
            return Err(SpecError::ZeroOccurrence);
        }
        let overlap: Vec<String> = self
            .target
            .iter()
            .filter(|t| self.pending.contains(t.as_str()))
            .cloned()
            .collect();
        if !overlap.is_empty() {
            return Err(SpecError::OverlappingLabels(overlap));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_applies_defaults() {
        let spec = PollSpec::new(["provisioning"], ["active"], Duration::from_secs(60));
        assert_eq!(spec.delay, DEFAULT_DELAY);
        assert_eq!(spec.min_poll_interval, DEFAULT_MIN_POLL_INTERVAL);
        assert_eq!(spec.continuous_target_occurrence, 1);
        assert_eq!(spec.not_found_checks, DEFAULT_NOT_FOUND_CHECKS);
        assert_eq!(spec.unclassified, UnclassifiedPolicy::Pending);
        assert!(spec.is_pending("provisioning"));
        assert!(spec.is_target("active"));
        assert!(spec.validate().is_ok());
    }

    #[test]
    fn overlapping_labels_are_rejected() {
        let spec = PollSpec::new(["retry", "active"], ["active"], Duration::from_secs(60));
        assert_eq!(
            spec.validate(),
            Err(SpecError::OverlappingLabels(vec!["active".to_string()]))
        );
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let spec = PollSpec::new(["pending"], ["done"], Duration::ZERO);
        assert_eq!(spec.validate(), Err(SpecError::ZeroTimeout));
    }

    #[test]
    fn zero_occurrence_is_rejected() {
        let spec = PollSpec::new(["pending"], ["done"], Duration::from_secs(1))
            .with_continuous_target_occurrence(0);
        assert_eq!(spec.validate(), Err(SpecError::ZeroOccurrence));
    }

    #[test]
    fn fixed_interval_is_clamped_to_minimum() {
        let interval = PollInterval::Fixed(Duration::from_secs(1));
        assert_eq!(
            interval.delay_after(1, Duration::from_secs(10)),
            Duration::from_secs(10)
        );
        assert_eq!(
            interval.delay_after(5, Duration::ZERO),
            Duration::from_secs(1)
        );
    }

    #[test]
    fn backoff_doubles_until_capped() {
        let interval = PollInterval::Backoff {
            initial: DEFAULT_BACKOFF_INITIAL,
            max: DEFAULT_BACKOFF_MAX,
        };
        let delays: Vec<Duration> = (1..=9)
            .map(|n| interval.delay_after(n, Duration::ZERO))
            .collect();
        assert_eq!(delays[0], Duration::from_millis(100));
        assert_eq!(delays[1], Duration::from_millis(200));
        assert_eq!(delays[2], Duration::from_millis(400));
        assert_eq!(delays[6], Duration::from_millis(6400));
        assert_eq!(delays[7], Duration::from_secs(10));
        assert_eq!(delays[8], Duration::from_secs(10));
    }

    #[test]
    fn backoff_respects_minimum() {
        let interval = PollInterval::Backoff {
            initial: Duration::from_millis(100),
            max: Duration::from_secs(10),
        };
        assert_eq!(
            interval.delay_after(1, Duration::from_secs(5)),
            Duration::from_secs(5)
        );
    }
}
