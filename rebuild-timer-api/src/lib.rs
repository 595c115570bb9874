//! # Rebuild Timer API
//!
//! Contracts between the shared rebuild timer and the host application:
//!
//! - **Errors**: [`TimerError`] for callers, [`TaskError`] for failures inside tasks
//! - **Configuration**: [`ConfigSource`] and the settings the timer reads from it
//! - **Threads**: [`ThreadFactory`] for worker names and daemon policy
//! - **Types**: pool identity, task status and outcome, metrics
//!
//! The implementation lives in the `rebuild-timer` crate.

pub mod config;
pub mod errors;
pub mod thread;
pub mod types;

pub use config::{
    ConfigSource, EnvConfig, JsonFileConfig, MapConfig, TimerConfig, DEFAULT_POOL_SIZE,
    DEFAULT_THREAD_NAME, MAX_POOL_SIZE, POOL_SIZE_KEY,
};
pub use errors::{TaskError, TaskResult, TimerError, TimerResult};
pub use thread::{DaemonThreadFactory, JoiningThreadFactory, NamingThreadFactory, ThreadFactory};
pub use types::{PoolId, PoolMetrics, TaskKind, TaskOutcome, TaskStatus};
