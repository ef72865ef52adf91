use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

// ============================================================================
// Retry Policy
// ============================================================================
//
// delay(attempt) = initial_delay × multiplier^(attempt-1) + buffer
//
// The buffer covers the external subscriber's own backoff so that it is
// already listening when the publishing attempt fires.
//
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct BackoffSchedule {
    pub initial_delay: Duration,
    pub multiplier: f64,
    pub buffer: Duration,
}

impl BackoffSchedule {
    /// Delay for a 1-based attempt, truncated to whole milliseconds.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1) as i32;
        let scaled_ms = self.initial_delay.as_millis() as f64 * self.multiplier.powi(exponent);
        Duration::from_millis(scaled_ms as u64) + self.buffer
    }
}

/// Decides which scheduled attempts actually publish.
pub trait AttemptPolicy: Send + Sync {
    fn should_publish(&self, attempt: u32, max_attempts: u32) -> bool;
    fn name(&self) -> &'static str;
}

/// Fault injection: every attempt before the last is a simulated failure.
pub struct SuppressUntilFinal;

impl AttemptPolicy for SuppressUntilFinal {
    fn should_publish(&self, attempt: u32, max_attempts: u32) -> bool {
        attempt == max_attempts
    }

    fn name(&self) -> &'static str {
        "suppress-until-final"
    }
}

/// Every attempt publishes.
pub struct EveryAttempt;

impl AttemptPolicy for EveryAttempt {
    fn should_publish(&self, _attempt: u32, _max_attempts: u32) -> bool {
        true
    }

    fn name(&self) -> &'static str {
        "every-attempt"
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PolicyKind {
    SuppressUntilFinal,
    EveryAttempt,
}

impl PolicyKind {
    pub fn build(&self) -> Arc<dyn AttemptPolicy> {
        match self {
            PolicyKind::SuppressUntilFinal => Arc::new(SuppressUntilFinal),
            PolicyKind::EveryAttempt => Arc::new(EveryAttempt),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn default_schedule() -> BackoffSchedule {
        BackoffSchedule {
            initial_delay: Duration::from_secs(5),
            multiplier: 2.0,
            buffer: Duration::from_secs(2),
        }
    }

    #[test]
    fn test_default_delays() {
        let schedule = default_schedule();
        assert_eq!(schedule.delay_for(1), Duration::from_secs(7));
        assert_eq!(schedule.delay_for(2), Duration::from_secs(12));
        assert_eq!(schedule.delay_for(3), Duration::from_secs(22));
    }

    #[test]
    fn test_fractional_multiplier_truncates_to_millis() {
        let schedule = BackoffSchedule {
            initial_delay: Duration::from_millis(1_000),
            multiplier: 1.5,
            buffer: Duration::ZERO,
        };
        assert_eq!(schedule.delay_for(3), Duration::from_millis(2_250));
        assert_eq!(schedule.delay_for(4), Duration::from_millis(3_375));
    }

    #[test]
    fn test_suppress_until_final_publishes_only_last() {
        let policy = PolicyKind::SuppressUntilFinal.build();
        let decisions: Vec<bool> = (1..=5).map(|a| policy.should_publish(a, 5)).collect();
        assert_eq!(decisions, vec![false, false, false, false, true]);
        assert_eq!(policy.name(), "suppress-until-final");
    }

    #[test]
    fn test_every_attempt_policy() {
        let policy = PolicyKind::EveryAttempt.build();
        assert!((1..=3).all(|a| policy.should_publish(a, 3)));
    }
}
