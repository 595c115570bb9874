//! # Shared Scheduler
//!
//! [`SharedScheduler`] holds at most one [`ScheduledPool`] and hands the same
//! pool to every caller until it is shut down.
//!
//! ## Lifecycle
//! ```text
//! Absent --acquire()--> Active --shutdown()--> Absent --acquire()--> Active ...
//! ```
//! The period between one construction and the next shutdown is an epoch.
//! Every `acquire()` in an epoch returns the same `Arc`.
//!
//! ## Locking
//! One mutex guards the check-and-create in `acquire()` and the take in
//! `shutdown()`. Nothing under the lock waits for tasks: pool construction
//! only starts threads, and the pool's cancellation happens after the lock
//! is released.
//!
//! A `shutdown()` racing an `acquire()` that is still constructing is
//! serialised by the mutex: it either runs first and finds nothing to do, or
//! runs second and tears the new pool down. Which one wins is not defined.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, info, warn};

use rebuild_timer_api::{
    ConfigSource, DaemonThreadFactory, JoiningThreadFactory, NamingThreadFactory, ThreadFactory,
    TimerConfig, TimerResult,
};

use crate::scheduler::ScheduledPool;

#[derive(Debug, Default)]
struct HandleState {
    pool: Option<Arc<ScheduledPool>>,
    /// Read from the config source at the first successful construction.
    capacity: Option<usize>,
}

/// Lazily created, explicitly destroyed holder of one scheduled pool.
pub struct SharedScheduler {
    config: TimerConfig,
    source: Arc<dyn ConfigSource>,
    thread_factory: Arc<dyn ThreadFactory>,
    state: Mutex<HandleState>,
}

impl fmt::Debug for SharedScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock();
        f.debug_struct("SharedScheduler")
            .field("config", &self.config)
            .field("source", &self.source)
            .field("thread_factory", &self.thread_factory)
            .field("pool", &state.pool.as_ref().map(|p| p.id()))
            .field("capacity", &state.capacity)
            .finish()
    }
}

impl SharedScheduler {
    /// Create an empty holder. No pool exists until the first [`acquire`](Self::acquire).
    ///
    /// Workers are named after `config.thread_name` and are daemon-style
    /// unless `config.daemon` is off.
    pub fn new(config: TimerConfig, source: Arc<dyn ConfigSource>) -> Self {
        let thread_factory: Arc<dyn ThreadFactory> = if config.daemon {
            Arc::new(NamingThreadFactory::new(
                DaemonThreadFactory::new(),
                config.thread_name.clone(),
            ))
        } else {
            Arc::new(NamingThreadFactory::new(
                JoiningThreadFactory,
                config.thread_name.clone(),
            ))
        };
        Self::with_thread_factory(config, source, thread_factory)
    }

    /// Create an empty holder using a custom thread factory.
    pub fn with_thread_factory(
        config: TimerConfig,
        source: Arc<dyn ConfigSource>,
        thread_factory: Arc<dyn ThreadFactory>,
    ) -> Self {
        Self {
            config,
            source,
            thread_factory,
            state: Mutex::new(HandleState::default()),
        }
    }

    /// Return the active pool, constructing it if there is none.
    ///
    /// The worker capacity is read from the config source the first time a
    /// pool is successfully built and reused for every later epoch.
    ///
    /// # Errors
    /// Construction errors propagate unchanged and leave the holder empty.
    pub fn acquire(&self) -> TimerResult<Arc<ScheduledPool>> {
        let mut state = self.lock();

        if let Some(pool) = &state.pool {
            if !pool.is_shutdown() {
                return Ok(pool.clone());
            }
            warn!(pool_id = %pool.id(), "Shared pool was shut down outside the scheduler, replacing it");
            state.pool = None;
        }

        let capacity = match state.capacity {
            Some(capacity) => capacity,
            None => self.config.resolve_capacity(self.source.as_ref())?,
        };

        let pool = Arc::new(ScheduledPool::new(capacity, self.thread_factory.clone())?);
        state.capacity = Some(capacity);
        state.pool = Some(pool.clone());

        info!(pool_id = %pool.id(), capacity, "Shared scheduled pool created");
        Ok(pool)
    }

    /// Cancel all work of the active pool and forget it.
    ///
    /// Does not wait for running tasks. Returns `false` when there was no
    /// active pool, in which case nothing happens.
    pub fn shutdown(&self) -> bool {
        let pool = self.lock().pool.take();

        match pool {
            Some(pool) => {
                pool.shutdown_now();
                info!(pool_id = %pool.id(), "Shared scheduled pool released");
                true
            }
            None => {
                debug!("Shutdown requested with no active pool");
                false
            }
        }
    }

    /// Whether a pool is currently held.
    pub fn is_active(&self) -> bool {
        self.lock().pool.is_some()
    }

    /// Worker capacity read at the first construction, if one happened.
    pub fn capacity(&self) -> Option<usize> {
        self.lock().capacity
    }

    pub fn config(&self) -> &TimerConfig {
        &self.config
    }

    fn lock(&self) -> MutexGuard<'_, HandleState> {
        // The guarded value is replaced whole, never left half-written.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for SharedScheduler {
    fn drop(&mut self) {
        let pool = self
            .state
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .pool
            .take();
        if let Some(pool) = pool {
            pool.shutdown_now();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rebuild_timer_api::{MapConfig, POOL_SIZE_KEY};

    fn scheduler(config: &Arc<MapConfig>) -> SharedScheduler {
        SharedScheduler::new(TimerConfig::default(), config.clone())
    }

    #[test]
    fn starts_absent() {
        let shared = scheduler(&Arc::new(MapConfig::new()));
        assert!(!shared.is_active());
        assert_eq!(shared.capacity(), None);
    }

    #[test]
    fn failed_construction_keeps_handle_absent() {
        let config = Arc::new(MapConfig::new().with(POOL_SIZE_KEY, 0));
        let shared = scheduler(&config);

        assert!(shared.acquire().unwrap_err().is_configuration());
        assert!(!shared.is_active());
        assert_eq!(shared.capacity(), None);

        config.set(POOL_SIZE_KEY, 2);
        let pool = shared.acquire().unwrap();
        assert_eq!(pool.capacity(), 2);
        assert_eq!(shared.capacity(), Some(2));
        assert!(shared.shutdown());
    }

    #[test]
    fn externally_shut_down_pool_is_replaced() {
        let shared = scheduler(&Arc::new(MapConfig::new().with(POOL_SIZE_KEY, 1)));
        let first = shared.acquire().unwrap();
        first.shutdown_now();

        let second = shared.acquire().unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
        assert!(!second.is_shutdown());
        assert!(shared.shutdown());
    }

    #[test]
    fn drop_shuts_active_pool_down() {
        let shared = scheduler(&Arc::new(MapConfig::new().with(POOL_SIZE_KEY, 1)));
        let pool = shared.acquire().unwrap();
        drop(shared);
        assert!(pool.is_shutdown());
    }
}
