//! # Timer Error Types
//!
//! Errors surfaced by the shared rebuild timer and its collaborators.
//!
//! Two families exist and they never mix:
//! - [`TimerError`] is returned to callers. Construction-time problems (bad
//!   configuration, threads that cannot be started) and submissions to a pool
//!   that has already been shut down end up here.
//! - [`TaskError`] describes a failure *inside* a scheduled task. It is
//!   captured and logged by the pool and only ever reaches user code through a
//!   task's outcome, never as a propagated error.

use std::io;

use thiserror::Error;

use crate::types::PoolId;

/// Errors returned by timer operations.
#[derive(Error, Debug)]
pub enum TimerError {
    /// The configured worker capacity cannot be used to build a pool.
    ///
    /// Raised by the first `acquire()` of an epoch. No pool is retained.
    #[error("Invalid configuration for '{key}' (value: {value}): {reason}")]
    Configuration {
        key: String,
        value: String,
        reason: String,
    },

    /// The worker runtime could not be started.
    #[error("Failed to construct scheduled pool: {0}")]
    PoolConstruction(#[from] io::Error),

    /// A task was submitted to a pool that has been shut down.
    #[error("Scheduled pool {0} is shut down, task rejected")]
    Rejected(PoolId),

    /// A submission argument is out of range, e.g. a zero period.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// A configuration file could not be loaded.
    #[error("Failed to load configuration: {0}")]
    ConfigLoad(String),
}

impl TimerError {
    /// Shorthand for building a [`TimerError::Configuration`].
    pub fn configuration(
        key: impl Into<String>,
        value: impl ToString,
        reason: impl Into<String>,
    ) -> Self {
        TimerError::Configuration {
            key: key.into(),
            value: value.to_string(),
            reason: reason.into(),
        }
    }

    /// Whether this error was caused by configuration rather than the runtime.
    pub fn is_configuration(&self) -> bool {
        matches!(self, TimerError::Configuration { .. } | TimerError::ConfigLoad(_))
    }
}

/// A failure raised by a scheduled task.
#[derive(Error, Debug)]
pub enum TaskError {
    /// The task returned an error.
    #[error("Task failed: {0:#}")]
    Failed(#[source] anyhow::Error),

    /// The task panicked. Holds the panic message when one could be recovered.
    #[error("Task panicked: {0}")]
    Panicked(String),
}

impl TaskError {
    /// Build a [`TaskError::Panicked`] from a payload caught by `catch_unwind`.
    pub fn from_panic(payload: Box<dyn std::any::Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&'static str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "unknown panic payload".to_string()
        };
        TaskError::Panicked(message)
    }
}

/// Result type returned by timer operations.
pub type TimerResult<T> = Result<T, TimerError>;

/// Result type returned by a task body.
pub type TaskResult = anyhow::Result<()>;
