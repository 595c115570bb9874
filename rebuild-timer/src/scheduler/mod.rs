//! # Scheduled Pool Module
//!
//! The scheduled executor behind the shared rebuild timer.
//!
//! ## Key Concepts
//! - Worker threads: a fixed number, named by a [`ThreadFactory`](rebuild_timer_api::ThreadFactory)
//! - Timer: delayed, fixed-rate and fixed-delay scheduling
//! - Error containment: every run is wrapped, failures are logged, never propagated
//!
//! ## Thread Safety
//! - Pools are shared through `Arc` and take `&self` everywhere
//! - Task state is a single atomic shared with the task's handle

mod error_logging;
mod handle;
mod pool;

pub use handle::ScheduledHandle;
pub use pool::{ScheduledPool, NON_DAEMON_JOIN_TIMEOUT};
