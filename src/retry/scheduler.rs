use futures_util::future::BoxFuture;
use std::time::Duration;
use tokio::runtime::{Builder, Runtime};

// ============================================================================
// Scheduler Abstraction
// ============================================================================

/// Runs `task` once after `delay`. Fire-and-forget: there is no handle and
/// no cancellation.
pub trait Scheduler: Send + Sync {
    fn schedule_after(&self, delay: Duration, task: BoxFuture<'static, ()>);
}

/// Dedicated multi-threaded tokio runtime used only for delayed retries, so
/// timers keep firing regardless of what the listener runtime is doing.
pub struct TimerPool {
    runtime: Option<Runtime>,
}

impl TimerPool {
    pub fn new(threads: usize) -> std::io::Result<Self> {
        let runtime = Builder::new_multi_thread()
            .worker_threads(threads.max(2))
            .thread_name("retry-timer")
            .enable_all()
            .build()?;

        tracing::debug!(threads = threads.max(2), "Retry timer pool started");
        Ok(Self { runtime: Some(runtime) })
    }
}

impl Scheduler for TimerPool {
    fn schedule_after(&self, delay: Duration, task: BoxFuture<'static, ()>) {
        if let Some(runtime) = &self.runtime {
            runtime.spawn(async move {
                tokio::time::sleep(delay).await;
                task.await;
            });
        }
    }
}

impl Drop for TimerPool {
    fn drop(&mut self) {
        // Dropping a runtime from async context panics; background shutdown does not
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}
