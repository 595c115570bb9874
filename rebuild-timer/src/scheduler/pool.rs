use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::runtime::{Builder, Handle, Runtime};
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, warn};

use rebuild_timer_api::{
    PoolId, PoolMetrics, TaskKind, TaskOutcome, TaskResult, ThreadFactory, TimerError,
    TimerResult, MAX_POOL_SIZE,
};

use crate::log_pool;

use super::error_logging::TaskRunner;
use super::handle::{CancelOnDrop, ScheduledHandle, TaskState};

/// How long dropping a non-daemon pool waits for its workers.
pub const NON_DAEMON_JOIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Counters behind [`PoolMetrics`].
#[derive(Debug, Default)]
pub(crate) struct PoolCounters {
    submitted: AtomicUsize,
    completed: AtomicUsize,
    failed: AtomicUsize,
    cancelled: AtomicUsize,
}

impl PoolCounters {
    pub(crate) fn record_submitted(&self) {
        self.submitted.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_completed(&self) {
        self.completed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_cancelled(&self) {
        self.cancelled.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn submitted(&self) -> usize {
        self.submitted.load(Ordering::Relaxed)
    }

    pub(crate) fn completed(&self) -> usize {
        self.completed.load(Ordering::Relaxed)
    }

    pub(crate) fn failed(&self) -> usize {
        self.failed.load(Ordering::Relaxed)
    }

    pub(crate) fn cancelled(&self) -> usize {
        self.cancelled.load(Ordering::Relaxed)
    }
}

/// A fixed set of named worker threads plus a timer.
///
/// Work can run immediately, after a delay, at a fixed rate, or with a fixed
/// delay between runs. Each run goes through the error-logging wrapper, so a
/// failing task is logged and contained; it never takes a worker down.
///
/// # Thread Safety
/// - All methods take `&self`; share the pool behind an `Arc`
/// - Workers are the threads of a private multi-thread tokio runtime,
///   named by the pool's [`ThreadFactory`]
///
/// # Shutdown
/// [`shutdown_now`](Self::shutdown_now) cancels every pending task and
/// returns without waiting. Tasks blocked in synchronous code finish their
/// current run on their own; async tasks stop at their next await point.
pub struct ScheduledPool {
    id: PoolId,
    capacity: usize,
    daemon: bool,
    thread_name_prefix: String,

    /// Taken on shutdown.
    runtime: Mutex<Option<Runtime>>,

    /// Spawn handle, still valid (but inert) after shutdown.
    handle: Handle,

    /// Shared with every task's runner.
    is_shutdown: Arc<AtomicBool>,
    counters: Arc<PoolCounters>,
}

impl fmt::Debug for ScheduledPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScheduledPool")
            .field("id", &self.id)
            .field("capacity", &self.capacity)
            .field("daemon", &self.daemon)
            .field("thread_name_prefix", &self.thread_name_prefix)
            .field("is_shutdown", &self.is_shutdown())
            .finish()
    }
}

impl ScheduledPool {
    /// Build a pool with `capacity` worker threads.
    ///
    /// # Errors
    /// - [`TimerError::Configuration`] if `capacity` is zero or too large
    /// - [`TimerError::PoolConstruction`] if the worker threads cannot be started
    pub fn new(capacity: usize, thread_factory: Arc<dyn ThreadFactory>) -> TimerResult<Self> {
        if capacity == 0 || capacity > MAX_POOL_SIZE {
            return Err(TimerError::configuration(
                "capacity",
                capacity,
                format!("worker capacity must be between 1 and {}", MAX_POOL_SIZE),
            ));
        }

        let id = PoolId::new();
        let next_index = Arc::new(AtomicUsize::new(0));
        let factory = thread_factory.clone();

        let runtime = Builder::new_multi_thread()
            .worker_threads(capacity)
            .thread_name_fn(move || factory.thread_name(next_index.fetch_add(1, Ordering::Relaxed)))
            .enable_time()
            .build()?;

        let pool = Self {
            id,
            capacity,
            daemon: thread_factory.is_daemon(),
            thread_name_prefix: thread_factory.name_prefix(),
            handle: runtime.handle().clone(),
            runtime: Mutex::new(Some(runtime)),
            is_shutdown: Arc::new(AtomicBool::new(false)),
            counters: Arc::new(PoolCounters::default()),
        };

        log_pool!(
            pool.id,
            "started",
            capacity,
            daemon = pool.daemon,
            thread_name = %pool.thread_name_prefix
        );
        Ok(pool)
    }

    pub fn id(&self) -> PoolId {
        self.id
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_daemon(&self) -> bool {
        self.daemon
    }

    /// Prefix of every worker thread name.
    pub fn thread_name_prefix(&self) -> &str {
        &self.thread_name_prefix
    }

    pub fn is_shutdown(&self) -> bool {
        self.is_shutdown.load(Ordering::Acquire)
    }

    pub fn metrics(&self) -> PoolMetrics {
        PoolMetrics {
            capacity: self.capacity,
            submitted: self.counters.submitted(),
            completed: self.counters.completed(),
            failed: self.counters.failed(),
            cancelled: self.counters.cancelled(),
            is_shutdown: self.is_shutdown(),
        }
    }

    /// Run `task` once, as soon as a worker is free.
    pub fn execute<F>(&self, task: F) -> TimerResult<ScheduledHandle>
    where
        F: FnOnce() -> TaskResult + Send + 'static,
    {
        self.submit_once(TaskKind::Immediate, Duration::ZERO, task)
    }

    /// Run `task` once after `delay`.
    pub fn schedule<F>(&self, delay: Duration, task: F) -> TimerResult<ScheduledHandle>
    where
        F: FnOnce() -> TaskResult + Send + 'static,
    {
        self.submit_once(TaskKind::Delayed, delay, task)
    }

    /// Run an async unit of work once after `delay`.
    pub fn schedule_async<Fut>(&self, delay: Duration, fut: Fut) -> TimerResult<ScheduledHandle>
    where
        Fut: Future<Output = TaskResult> + Send + 'static,
    {
        self.spawn_task(TaskKind::Async, move |runner| async move {
            time::sleep(delay).await;
            if !runner.begin() {
                return TaskOutcome::Cancelled;
            }
            let result = runner.run_async(fut).await;
            runner.finish(result)
        })
    }

    /// Run `task` every `period`, first after `initial_delay`.
    ///
    /// Ticks are anchored to the first run; runs that fall behind are caught
    /// up back to back. A failed run stops the task.
    pub fn schedule_at_fixed_rate<F>(
        &self,
        initial_delay: Duration,
        period: Duration,
        mut task: F,
    ) -> TimerResult<ScheduledHandle>
    where
        F: FnMut() -> TaskResult + Send + 'static,
    {
        if period.is_zero() {
            return Err(TimerError::InvalidArgument(
                "fixed-rate period must be non-zero".to_string(),
            ));
        }

        let first_run = Instant::now().checked_add(initial_delay).ok_or_else(|| {
            TimerError::InvalidArgument(format!(
                "fixed-rate initial delay {:?} is out of range",
                initial_delay
            ))
        })?;

        self.spawn_task(TaskKind::FixedRate, move |runner| async move {
            let mut ticker = time::interval_at(first_run, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Burst);
            loop {
                ticker.tick().await;
                if !runner.begin() {
                    return TaskOutcome::Cancelled;
                }
                if let Err(e) = runner.run(&mut task) {
                    return runner.finish(Err(e));
                }
                if !runner.reschedule() {
                    return TaskOutcome::Cancelled;
                }
            }
        })
    }

    /// Run `task` repeatedly, waiting `delay` between the end of one run and
    /// the start of the next. A failed run stops the task.
    pub fn schedule_with_fixed_delay<F>(
        &self,
        initial_delay: Duration,
        delay: Duration,
        mut task: F,
    ) -> TimerResult<ScheduledHandle>
    where
        F: FnMut() -> TaskResult + Send + 'static,
    {
        if delay.is_zero() {
            return Err(TimerError::InvalidArgument(
                "fixed delay must be non-zero".to_string(),
            ));
        }

        self.spawn_task(TaskKind::FixedDelay, move |runner| async move {
            time::sleep(initial_delay).await;
            loop {
                if !runner.begin() {
                    return TaskOutcome::Cancelled;
                }
                if let Err(e) = runner.run(&mut task) {
                    return runner.finish(Err(e));
                }
                if !runner.reschedule() {
                    return TaskOutcome::Cancelled;
                }
                time::sleep(delay).await;
            }
        })
    }

    /// Cancel everything and stop the workers without waiting for them.
    ///
    /// Returns `false` if the pool was already shut down.
    pub fn shutdown_now(&self) -> bool {
        if self.is_shutdown.swap(true, Ordering::AcqRel) {
            return false;
        }

        let runtime = self
            .runtime
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(runtime) = runtime {
            runtime.shutdown_background();
        }

        log_pool!(
            self.id,
            "shut_down",
            submitted = self.counters.submitted(),
            completed = self.counters.completed(),
            failed = self.counters.failed()
        );
        true
    }

    fn submit_once<F>(&self, kind: TaskKind, delay: Duration, task: F) -> TimerResult<ScheduledHandle>
    where
        F: FnOnce() -> TaskResult + Send + 'static,
    {
        self.spawn_task(kind, move |runner| async move {
            if !delay.is_zero() {
                time::sleep(delay).await;
            }
            if !runner.begin() {
                return TaskOutcome::Cancelled;
            }
            let mut task = Some(task);
            let mut once = move || match task.take() {
                Some(task) => task(),
                None => Ok(()),
            };
            let result = runner.run(&mut once);
            runner.finish(result)
        })
    }

    fn spawn_task<B, Fut>(&self, kind: TaskKind, body: B) -> TimerResult<ScheduledHandle>
    where
        B: FnOnce(TaskRunner) -> Fut,
        Fut: Future<Output = TaskOutcome> + Send + 'static,
    {
        if self.is_shutdown() {
            warn!(pool_id = %self.id, kind = %kind, "Task rejected, pool is shut down");
            return Err(TimerError::Rejected(self.id));
        }

        let state = TaskState::new();
        let runner = TaskRunner::new(
            self.id,
            kind,
            state.clone(),
            self.counters.clone(),
            self.is_shutdown.clone(),
        );
        let guard = CancelOnDrop(state.clone());
        let fut = body(runner);

        let join = self.handle.spawn(async move {
            let _guard = guard;
            fut.await
        });

        self.counters.record_submitted();
        debug!(pool_id = %self.id, kind = %kind, "Task submitted");

        Ok(ScheduledHandle::new(self.id, kind, state, join, self.counters.clone()))
    }
}

impl Drop for ScheduledPool {
    fn drop(&mut self) {
        let runtime = self
            .runtime
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(runtime) = runtime else {
            return;
        };

        self.is_shutdown.store(true, Ordering::Release);
        if self.daemon || Handle::try_current().is_ok() {
            runtime.shutdown_background();
        } else {
            runtime.shutdown_timeout(NON_DAEMON_JOIN_TIMEOUT);
        }
        debug!(pool_id = %self.id, "Scheduled pool dropped");
    }
}
