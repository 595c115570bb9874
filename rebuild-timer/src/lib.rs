// Rebuild Timer
//
// Process-wide scheduled pool for asynchronous dependency-graph rebuilds.
// The pool is created on first use, shared by every caller, and thrown away
// on shutdown; the next use builds a fresh one.

pub mod logging;
pub mod scheduler;
pub mod shared;
pub mod timer;

// Re-export commonly used types
pub use rebuild_timer_api::*;
pub use scheduler::{ScheduledHandle, ScheduledPool};
pub use shared::SharedScheduler;
pub use timer::{get, shutdown};
