use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

// ============================================================================
// Circuit Breaker
// ============================================================================
//
// Guards the outbound publisher so a dead broker turns into immediate
// TransportFailures instead of every listener worker waiting out the
// transport timeout.
//
//   Closed ──(failure_threshold failures)──► Open
//   Open ──(timeout elapsed, next call)────► HalfOpen
//   HalfOpen ──(success_threshold ok)──────► Closed
//   HalfOpen ──(any failure)───────────────► Open
//
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        }
    }
}

#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    /// How long the circuit stays open before letting a trial call through
    pub timeout: Duration,
    pub success_threshold: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            timeout: Duration::from_secs(30),
            success_threshold: 3,
        }
    }
}

impl From<&crate::config::CircuitBreakerSettings> for CircuitBreakerConfig {
    fn from(settings: &crate::config::CircuitBreakerSettings) -> Self {
        Self {
            failure_threshold: settings.failure_threshold,
            timeout: Duration::from_secs(settings.timeout_seconds),
            success_threshold: settings.success_threshold,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CircuitBreakerError<E> {
    #[error("circuit breaker is open")]
    CircuitOpen,
    #[error(transparent)]
    OperationFailed(E),
}

struct Counters {
    state: CircuitState,
    failures: u32,
    successes: u32,
    opened_at: Option<Instant>,
}

#[derive(Clone)]
pub struct CircuitBreaker {
    counters: Arc<Mutex<Counters>>,
    config: CircuitBreakerConfig,
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            counters: Arc::new(Mutex::new(Counters {
                state: CircuitState::Closed,
                failures: 0,
                successes: 0,
                opened_at: None,
            })),
            config,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Counters> {
        // A panic while holding the lock cannot leave the counters invalid
        self.counters.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub async fn call<F, T, E>(&self, operation: F) -> Result<T, CircuitBreakerError<E>>
    where
        F: std::future::Future<Output = Result<T, E>>,
    {
        self.admit()?;

        match operation.await {
            Ok(value) => {
                self.on_success();
                Ok(value)
            }
            Err(err) => {
                self.on_failure();
                Err(CircuitBreakerError::OperationFailed(err))
            }
        }
    }

    fn admit<E>(&self) -> Result<(), CircuitBreakerError<E>> {
        let mut counters = self.lock();
        if counters.state != CircuitState::Open {
            return Ok(());
        }

        let cooled_down = counters
            .opened_at
            .map_or(true, |opened| opened.elapsed() >= self.config.timeout);
        if !cooled_down {
            return Err(CircuitBreakerError::CircuitOpen);
        }

        tracing::info!("Circuit breaker half-open, letting a trial call through");
        counters.state = CircuitState::HalfOpen;
        counters.successes = 0;
        Ok(())
    }

    fn on_success(&self) {
        let mut counters = self.lock();
        match counters.state {
            CircuitState::HalfOpen => {
                counters.successes += 1;
                if counters.successes >= self.config.success_threshold {
                    tracing::info!(successes = counters.successes, "Circuit breaker closed");
                    counters.state = CircuitState::Closed;
                    counters.failures = 0;
                    counters.successes = 0;
                    counters.opened_at = None;
                }
            }
            CircuitState::Closed => counters.failures = 0,
            CircuitState::Open => {}
        }
    }

    fn on_failure(&self) {
        let mut counters = self.lock();
        counters.failures += 1;

        let trip = match counters.state {
            CircuitState::Closed => counters.failures >= self.config.failure_threshold,
            CircuitState::HalfOpen => true,
            CircuitState::Open => false,
        };

        if trip {
            tracing::warn!(failures = counters.failures, "Circuit breaker opened");
            counters.state = CircuitState::Open;
            counters.successes = 0;
            counters.opened_at = Some(Instant::now());
        }
    }

    pub fn get_state(&self) -> CircuitState {
        self.lock().state
    }
}
