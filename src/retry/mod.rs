// ============================================================================
// Retry Scheduler
// ============================================================================
//
// Schedules N delayed republish attempts for a diverted cancellation. The
// scheduler owns no state beyond the batch it just scheduled: it never sees
// downstream acknowledgements, so "retry" means a timer-driven republish,
// not a reaction to an observed failure.
//
// ============================================================================

mod policy;
mod scheduler;

pub use policy::{AttemptPolicy, BackoffSchedule, EveryAttempt, PolicyKind, SuppressUntilFinal};
pub use scheduler::{Scheduler, TimerPool};

#[cfg(test)]
pub use scheduler::testing::ManualScheduler;

use futures_util::FutureExt;
use std::sync::Arc;
use std::time::Duration;

use crate::config::CancelRetryConfig;
use crate::messaging::RetryMessagePublisher;
use crate::metrics::Metrics;

pub struct RetryScheduler {
    scheduler: Arc<dyn Scheduler>,
    /// Absent when the inbound binding is not configured for retries.
    publisher: Option<Arc<dyn RetryMessagePublisher>>,
    schedule: BackoffSchedule,
    policy: Arc<dyn AttemptPolicy>,
    max_attempts: u32,
    metrics: Arc<Metrics>,
}

impl RetryScheduler {
    pub fn new(
        scheduler: Arc<dyn Scheduler>,
        publisher: Option<Arc<dyn RetryMessagePublisher>>,
        schedule: BackoffSchedule,
        policy: Arc<dyn AttemptPolicy>,
        max_attempts: u32,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            scheduler,
            publisher,
            schedule,
            policy,
            max_attempts,
            metrics,
        }
    }

    pub fn from_config(
        config: &CancelRetryConfig,
        scheduler: Arc<dyn Scheduler>,
        publisher: Option<Arc<dyn RetryMessagePublisher>>,
        metrics: Arc<Metrics>,
    ) -> Self {
        let schedule = BackoffSchedule {
            initial_delay: config.initial_delay(),
            multiplier: config.multiplier,
            buffer: config.buffer(),
        };
        Self::new(
            scheduler,
            publisher,
            schedule,
            config.policy.build(),
            config.max_attempts,
            metrics,
        )
    }

    /// Schedule every attempt up front and return their delays. Never blocks.
    pub fn schedule(&self, channel: &str, payload: String, correlation_id: &str) -> Vec<Duration> {
        let payload: Arc<str> = payload.into();
        let channel: Arc<str> = channel.into();
        let correlation_id: Arc<str> = correlation_id.into();

        let delays: Vec<Duration> = (1..=self.max_attempts)
            .map(|attempt| self.schedule.delay_for(attempt))
            .collect();

        for (attempt, delay) in (1..=self.max_attempts).zip(delays.iter().copied()) {
            let task = RetryAttempt {
                attempt,
                max_attempts: self.max_attempts,
                delay,
                channel: channel.clone(),
                payload: payload.clone(),
                correlation_id: correlation_id.clone(),
                publisher: self.publisher.clone(),
                policy: self.policy.clone(),
                metrics: self.metrics.clone(),
            };
            self.scheduler.schedule_after(delay, task.run().boxed());
        }

        self.metrics.retries_scheduled.inc();
        tracing::info!(
            channel = %channel,
            correlation_id = %correlation_id,
            attempts = self.max_attempts,
            policy = self.policy.name(),
            delays_ms = ?delays.iter().map(|d| d.as_millis() as u64).collect::<Vec<_>>(),
            "Scheduled retry attempts"
        );
        delays
    }
}

struct RetryAttempt {
    attempt: u32,
    max_attempts: u32,
    delay: Duration,
    channel: Arc<str>,
    payload: Arc<str>,
    correlation_id: Arc<str>,
    publisher: Option<Arc<dyn RetryMessagePublisher>>,
    policy: Arc<dyn AttemptPolicy>,
    metrics: Arc<Metrics>,
}

impl RetryAttempt {
    async fn run(self) {
        tracing::info!(
            attempt = self.attempt,
            channel = %self.channel,
            scheduled_ms = self.delay.as_millis() as u64,
            "Retry attempt fired"
        );

        if !self.policy.should_publish(self.attempt, self.max_attempts) {
            tracing::warn!(attempt = self.attempt, "Simulating failure on retry attempt");
            self.metrics.record_retry_attempt(self.attempt, "suppressed");
            return;
        }

        let Some(publisher) = self.publisher else {
            tracing::warn!(
                attempt = self.attempt,
                channel = %self.channel,
                "No RetryMessagePublisher for the inbound transport, retry not published"
            );
            self.metrics.record_retry_attempt(self.attempt, "skipped");
            return;
        };

        match publisher
            .publish(&self.channel, &self.payload, &self.correlation_id)
            .await
        {
            Ok(()) => {
                tracing::info!(
                    attempt = self.attempt,
                    channel = %self.channel,
                    correlation_id = %self.correlation_id,
                    "Retry message published"
                );
                self.metrics.record_retry_attempt(self.attempt, "published");
            }
            Err(e) => {
                tracing::error!(
                    error = %e,
                    attempt = self.attempt,
                    channel = %self.channel,
                    "Retry attempt failed to publish"
                );
                self.metrics.record_retry_attempt(self.attempt, "failed");
            }
        }
    }
}
