use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::trace;

use rebuild_timer_api::{PoolId, TaskError, TaskKind, TaskOutcome, TaskStatus};

use super::pool::PoolCounters;

/// State shared between a running task and its [`ScheduledHandle`].
///
/// Transitions only ever move forward out of `Scheduled`/`Running`; once a
/// terminal status is stored it is never overwritten.
#[derive(Debug)]
pub(crate) struct TaskState {
    status: AtomicU8,
}

impl TaskState {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            status: AtomicU8::new(TaskStatus::Scheduled as u8),
        })
    }

    pub(crate) fn status(&self) -> TaskStatus {
        TaskStatus::from_u8(self.status.load(Ordering::Acquire))
    }

    /// Move `from` -> `to`. Fails if the current status is not `from`.
    pub(crate) fn transition(&self, from: TaskStatus, to: TaskStatus) -> bool {
        self.status
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Store a terminal status unless one is already set. Returns the status
    /// the task ends with.
    pub(crate) fn finish(&self, to: TaskStatus) -> TaskStatus {
        match self
            .status
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                if TaskStatus::from_u8(current).is_terminal() {
                    None
                } else {
                    Some(to as u8)
                }
            }) {
            Ok(_) => to,
            Err(current) => TaskStatus::from_u8(current),
        }
    }
}

/// Marks a task cancelled if its future is dropped before reaching a
/// terminal status, which is what happens on abort and on pool shutdown.
pub(crate) struct CancelOnDrop(pub(crate) Arc<TaskState>);

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        let _ = self.0.finish(TaskStatus::Cancelled);
    }
}

/// Handle to a task submitted to a [`ScheduledPool`](super::ScheduledPool).
pub struct ScheduledHandle {
    pool_id: PoolId,
    kind: TaskKind,
    state: Arc<TaskState>,
    join: JoinHandle<TaskOutcome>,
    counters: Arc<PoolCounters>,
}

impl fmt::Debug for ScheduledHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScheduledHandle")
            .field("pool_id", &self.pool_id)
            .field("kind", &self.kind)
            .field("status", &self.state.status())
            .finish()
    }
}

impl ScheduledHandle {
    pub(crate) fn new(
        pool_id: PoolId,
        kind: TaskKind,
        state: Arc<TaskState>,
        join: JoinHandle<TaskOutcome>,
        counters: Arc<PoolCounters>,
    ) -> Self {
        Self {
            pool_id,
            kind,
            state,
            join,
            counters,
        }
    }

    pub fn pool_id(&self) -> PoolId {
        self.pool_id
    }

    pub fn kind(&self) -> TaskKind {
        self.kind
    }

    pub fn status(&self) -> TaskStatus {
        self.state.status()
    }

    /// Whether the task will not run again.
    pub fn is_done(&self) -> bool {
        self.status().is_terminal()
    }

    pub fn is_cancelled(&self) -> bool {
        self.status() == TaskStatus::Cancelled
    }

    /// Cancel this task.
    ///
    /// A task still waiting for its delay or for a worker never runs. A
    /// periodic task caught mid-run finishes that run and does not run again;
    /// an async task caught mid-run stops at its next await point. A one-shot
    /// synchronous run cannot be stopped once started.
    ///
    /// Returns `true` only for the call that actually cancelled the task:
    /// `false` if it had already finished, was already cancelled, or is a
    /// one-shot synchronous run in progress.
    pub fn cancel(&self) -> bool {
        let cancelled = self.state.transition(TaskStatus::Scheduled, TaskStatus::Cancelled)
            || (self.interruptible_while_running()
                && self.state.transition(TaskStatus::Running, TaskStatus::Cancelled));
        if cancelled {
            self.counters.record_cancelled();
            self.join.abort();
            trace!(pool_id = %self.pool_id, kind = %self.kind, "Task cancelled");
        }
        cancelled
    }

    fn interruptible_while_running(&self) -> bool {
        self.kind == TaskKind::Async || self.kind.is_periodic()
    }

    /// Wait for the task to reach its final outcome.
    pub async fn join(self) -> TaskOutcome {
        match self.join.await {
            Ok(outcome) => outcome,
            Err(e) if e.is_cancelled() => TaskOutcome::Cancelled,
            Err(e) => TaskOutcome::Failed(TaskError::from_panic(e.into_panic())),
        }
    }

    /// Blocking variant of [`join`](Self::join) for callers outside async code.
    ///
    /// Must not be called from inside an async task.
    pub fn wait(self) -> TaskOutcome {
        futures::executor::block_on(self.join())
    }
}
