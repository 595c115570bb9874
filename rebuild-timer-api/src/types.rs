use std::fmt;

use uuid::Uuid;

use crate::errors::TaskError;

/// Identity of one constructed scheduled pool.
///
/// Every pool built by the timer gets a fresh id, so two epochs never share
/// one. Log records carry it to tell pools apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PoolId(Uuid);

impl PoolId {
    pub fn new() -> Self {
        PoolId(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for PoolId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for PoolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How a task was submitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskKind {
    /// Runs once, as soon as a worker is free.
    Immediate,
    /// Runs once after a delay.
    Delayed,
    /// Async unit of work, runs once after a delay.
    Async,
    /// Repeats with ticks anchored to the first run.
    FixedRate,
    /// Repeats with a pause measured from the end of the previous run.
    FixedDelay,
}

impl TaskKind {
    pub fn is_periodic(&self) -> bool {
        matches!(self, TaskKind::FixedRate | TaskKind::FixedDelay)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskKind::Immediate => "immediate",
            TaskKind::Delayed => "delayed",
            TaskKind::Async => "async",
            TaskKind::FixedRate => "fixed_rate",
            TaskKind::FixedDelay => "fixed_delay",
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle state of a submitted task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    /// Waiting for its delay to elapse or for a free worker.
    Scheduled = 0,
    /// Currently executing on a worker.
    Running = 1,
    /// Finished successfully. Periodic tasks never reach this on their own.
    Completed = 2,
    /// The last run returned an error or panicked.
    Failed = 3,
    /// Cancelled before it could finish, individually or by pool shutdown.
    Cancelled = 4,
}

impl TaskStatus {
    pub fn from_u8(value: u8) -> Self {
        match value {
            0 => TaskStatus::Scheduled,
            1 => TaskStatus::Running,
            2 => TaskStatus::Completed,
            3 => TaskStatus::Failed,
            _ => TaskStatus::Cancelled,
        }
    }

    /// Whether the task will not run again.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled
        )
    }
}

/// Final result of a submitted task as seen by whoever holds its handle.
#[derive(Debug)]
pub enum TaskOutcome {
    Completed,
    Failed(TaskError),
    Cancelled,
}

impl TaskOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, TaskOutcome::Completed)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, TaskOutcome::Failed(_))
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, TaskOutcome::Cancelled)
    }
}

/// Point-in-time counters for a scheduled pool.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PoolMetrics {
    /// Worker thread count the pool was built with.
    pub capacity: usize,
    /// Tasks accepted by the pool.
    pub submitted: usize,
    /// Task runs that finished without error. Periodic tasks count each run.
    pub completed: usize,
    /// Task runs that returned an error or panicked.
    pub failed: usize,
    /// Tasks cancelled individually.
    pub cancelled: usize,
    /// Whether `shutdown_now` has been called.
    pub is_shutdown: bool,
}
