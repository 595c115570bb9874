//! # Error-Logging Task Wrapper
//!
//! Every run of every task submitted to a [`ScheduledPool`](super::ScheduledPool)
//! goes through [`TaskRunner`]. It catches both error returns and panics,
//! logs them, and hands back a [`TaskError`] value instead of letting the
//! failure unwind into the worker thread. A failing task therefore never
//! takes a worker, the pool, or any other task down with it.

use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use futures::FutureExt;
use tracing::{error, trace, Instrument};

use rebuild_timer_api::{PoolId, TaskError, TaskKind, TaskOutcome, TaskResult, TaskStatus};

use super::handle::TaskState;
use super::pool::PoolCounters;

/// Runs task bodies on behalf of one submitted task.
#[derive(Debug, Clone)]
pub(crate) struct TaskRunner {
    pool_id: PoolId,
    kind: TaskKind,
    state: Arc<TaskState>,
    counters: Arc<PoolCounters>,
    /// The owning pool's shutdown flag.
    pool_shutdown: Arc<AtomicBool>,
}

impl TaskRunner {
    pub(crate) fn new(
        pool_id: PoolId,
        kind: TaskKind,
        state: Arc<TaskState>,
        counters: Arc<PoolCounters>,
        pool_shutdown: Arc<AtomicBool>,
    ) -> Self {
        Self {
            pool_id,
            kind,
            state,
            counters,
            pool_shutdown,
        }
    }

    /// Claim the next run. Returns `false` if the task was cancelled meanwhile
    /// or the pool has been shut down.
    ///
    /// Workers can still pick up queued tasks for a short while after the
    /// runtime is told to stop, so the flag is checked on every run.
    pub(crate) fn begin(&self) -> bool {
        if self.pool_shutdown.load(Ordering::Acquire) {
            let _ = self.state.finish(TaskStatus::Cancelled);
            trace!(pool_id = %self.pool_id, kind = %self.kind, "Run skipped, pool is shut down");
            return false;
        }
        self.state.transition(TaskStatus::Scheduled, TaskStatus::Running)
    }

    /// Execute one run of a synchronous task body.
    pub(crate) fn run<F>(&self, task: &mut F) -> Result<(), TaskError>
    where
        F: FnMut() -> TaskResult,
    {
        let _span = crate::pool_span!(self.pool_id, kind = %self.kind).entered();
        let started = Instant::now();
        let result = match panic::catch_unwind(AssertUnwindSafe(|| task())) {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(TaskError::Failed(e)),
            Err(payload) => Err(TaskError::from_panic(payload)),
        };
        self.record(&result, started);
        result
    }

    /// Execute an async task body.
    pub(crate) async fn run_async<Fut>(&self, fut: Fut) -> Result<(), TaskError>
    where
        Fut: Future<Output = TaskResult>,
    {
        let span = crate::pool_span!(self.pool_id, kind = %self.kind);
        let started = Instant::now();
        let result = match AssertUnwindSafe(fut.instrument(span)).catch_unwind().await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(TaskError::Failed(e)),
            Err(payload) => Err(TaskError::from_panic(payload)),
        };
        self.record(&result, started);
        result
    }

    /// Put a periodic task back to waiting after a successful run.
    /// Returns `false` if it was cancelled while running.
    pub(crate) fn reschedule(&self) -> bool {
        self.state.transition(TaskStatus::Running, TaskStatus::Scheduled)
    }

    /// Turn the result of a final run into the task's outcome.
    ///
    /// A task cancelled while its last run was in flight stays cancelled.
    pub(crate) fn finish(&self, result: Result<(), TaskError>) -> TaskOutcome {
        match result {
            Ok(()) => match self.state.finish(TaskStatus::Completed) {
                TaskStatus::Cancelled => TaskOutcome::Cancelled,
                _ => TaskOutcome::Completed,
            },
            Err(e) => {
                let _ = self.state.finish(TaskStatus::Failed);
                if self.kind.is_periodic() {
                    error!(
                        pool_id = %self.pool_id,
                        kind = %self.kind,
                        "Periodic task failed, later runs are suppressed"
                    );
                }
                TaskOutcome::Failed(e)
            }
        }
    }

    fn record(&self, result: &Result<(), TaskError>, started: Instant) {
        let elapsed_ms = started.elapsed().as_millis() as u64;
        match result {
            Ok(()) => {
                self.counters.record_completed();
                trace!(pool_id = %self.pool_id, kind = %self.kind, elapsed_ms, "Task run completed");
            }
            Err(e) => {
                self.counters.record_failed();
                error!(
                    pool_id = %self.pool_id,
                    kind = %self.kind,
                    elapsed_ms,
                    error = %e,
                    "Error while executing scheduled task"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    fn runner(kind: TaskKind) -> (TaskRunner, Arc<TaskState>, Arc<PoolCounters>) {
        let (runner, state, counters, _) = runner_with_flag(kind);
        (runner, state, counters)
    }

    fn runner_with_flag(
        kind: TaskKind,
    ) -> (TaskRunner, Arc<TaskState>, Arc<PoolCounters>, Arc<AtomicBool>) {
        let state = TaskState::new();
        let counters = Arc::new(PoolCounters::default());
        let shutdown = Arc::new(AtomicBool::new(false));
        let runner = TaskRunner::new(
            PoolId::new(),
            kind,
            state.clone(),
            counters.clone(),
            shutdown.clone(),
        );
        (runner, state, counters, shutdown)
    }

    #[test]
    fn error_return_is_captured() {
        let (runner, state, counters) = runner(TaskKind::Immediate);
        assert!(runner.begin());

        let mut task = || -> TaskResult { Err(anyhow!("no graph")) };
        let result = runner.run(&mut task);
        assert!(matches!(result, Err(TaskError::Failed(_))));

        let outcome = runner.finish(result);
        assert!(outcome.is_failed());
        assert_eq!(state.status(), TaskStatus::Failed);
        assert_eq!(counters.failed(), 1);
    }

    #[test]
    fn panic_is_captured() {
        let (runner, _, counters) = runner(TaskKind::Delayed);
        assert!(runner.begin());

        let mut task = || -> TaskResult { panic!("rebuild exploded") };
        let result = runner.run(&mut task);
        match result {
            Err(TaskError::Panicked(msg)) => assert_eq!(msg, "rebuild exploded"),
            other => panic!("expected panic capture, got {other:?}"),
        }
        assert_eq!(counters.failed(), 1);
    }

    #[test]
    fn cancelled_task_cannot_begin() {
        let (runner, state, _) = runner(TaskKind::Delayed);
        assert!(state.transition(TaskStatus::Scheduled, TaskStatus::Cancelled));
        assert!(!runner.begin());
    }

    #[test]
    fn shut_down_pool_refuses_to_begin() {
        let (runner, state, _, shutdown) = runner_with_flag(TaskKind::Immediate);
        shutdown.store(true, Ordering::Release);

        assert!(!runner.begin());
        assert_eq!(state.status(), TaskStatus::Cancelled);
    }

    #[test]
    fn periodic_task_stops_after_shutdown() {
        let (runner, state, _, shutdown) = runner_with_flag(TaskKind::FixedDelay);
        assert!(runner.begin());
        assert!(runner.run(&mut || -> TaskResult { Ok(()) }).is_ok());
        assert!(runner.reschedule());

        shutdown.store(true, Ordering::Release);
        assert!(!runner.begin());
        assert_eq!(state.status(), TaskStatus::Cancelled);
    }

    #[test]
    fn cancellation_during_last_run_is_kept() {
        let (runner, state, _) = runner(TaskKind::Async);
        assert!(runner.begin());
        assert!(state.transition(TaskStatus::Running, TaskStatus::Cancelled));

        assert!(runner.finish(Ok(())).is_cancelled());
        assert_eq!(state.status(), TaskStatus::Cancelled);
    }

    #[test]
    fn periodic_run_returns_to_scheduled() {
        let (runner, state, counters) = runner(TaskKind::FixedRate);
        assert!(runner.begin());
        let mut task = || -> TaskResult { Ok(()) };
        assert!(runner.run(&mut task).is_ok());
        assert!(runner.reschedule());
        assert_eq!(state.status(), TaskStatus::Scheduled);
        assert_eq!(counters.completed(), 1);
    }

    #[tokio::test]
    async fn async_panic_is_captured() {
        let (runner, _, counters) = runner(TaskKind::Async);
        assert!(runner.begin());

        let result = runner
            .run_async(async {
                if counters.submitted() == 0 {
                    panic!("async boom");
                }
                Ok(())
            })
            .await;
        assert!(matches!(result, Err(TaskError::Panicked(_))));
        assert_eq!(counters.failed(), 1);
    }
}
