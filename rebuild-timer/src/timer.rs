//! Process-wide rebuild timer.
//!
//! One [`SharedScheduler`] per process, configured from the environment
//! (`REBUILD_TIMER_DGC_THREAD_POOL_SIZE`, default 10). The host calls
//! [`get`] wherever it needs to schedule a rebuild and [`shutdown`] from its
//! own shutdown sequence.

use std::sync::Arc;

use lazy_static::lazy_static;

use rebuild_timer_api::{EnvConfig, TimerConfig, TimerResult};

use crate::scheduler::ScheduledPool;
use crate::shared::SharedScheduler;

lazy_static! {
    static ref REBUILD_TIMER: SharedScheduler =
        SharedScheduler::new(TimerConfig::default(), Arc::new(EnvConfig::new()));
}

/// The pool used for asynchronous dependency-graph rebuilds, created on first use.
pub fn get() -> TimerResult<Arc<ScheduledPool>> {
    REBUILD_TIMER.acquire()
}

/// Shut the timer's pool down and throw it away. A later [`get`] builds a new one.
pub fn shutdown() -> bool {
    REBUILD_TIMER.shutdown()
}

/// The process-wide holder itself.
pub fn instance() -> &'static SharedScheduler {
    &REBUILD_TIMER
}
