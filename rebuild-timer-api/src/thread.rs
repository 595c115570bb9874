//! # Thread Factories
//!
//! A [`ThreadFactory`] decides what the pool's worker threads are called and
//! whether they are daemon-style. Factories compose: [`NamingThreadFactory`]
//! wraps any base factory and only overrides the name.
//!
//! A daemon-style worker never holds up its owner's teardown. When a daemon
//! pool is dropped its workers are detached instead of joined.

use std::fmt;

/// Decides names and daemon policy for the worker threads of a pool.
pub trait ThreadFactory: fmt::Debug + Send + Sync + 'static {
    /// Name for the worker created at position `index` (0-based, in creation order).
    fn thread_name(&self, index: usize) -> String;

    /// Whether created workers are daemon-style.
    fn is_daemon(&self) -> bool;

    /// Prefix shared by every name this factory produces.
    fn name_prefix(&self) -> String;
}

/// Base factory producing daemon workers with generic names.
#[derive(Debug, Clone, Default)]
pub struct DaemonThreadFactory;

impl DaemonThreadFactory {
    pub fn new() -> Self {
        DaemonThreadFactory
    }
}

impl ThreadFactory for DaemonThreadFactory {
    fn thread_name(&self, index: usize) -> String {
        format!("{}{}", self.name_prefix(), index + 1)
    }

    fn is_daemon(&self) -> bool {
        true
    }

    fn name_prefix(&self) -> String {
        "pool-worker-".to_string()
    }
}

/// Decorates a base factory with a fixed diagnostic name.
///
/// Workers are called `"{name} [#{n}]"`, `n` starting at 1. The daemon flag
/// comes from the wrapped factory.
#[derive(Debug, Clone)]
pub struct NamingThreadFactory<F> {
    inner: F,
    name: String,
}

impl<F: ThreadFactory> NamingThreadFactory<F> {
    pub fn new(inner: F, name: impl Into<String>) -> Self {
        Self {
            inner,
            name: name.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn inner(&self) -> &F {
        &self.inner
    }
}

impl<F: ThreadFactory> ThreadFactory for NamingThreadFactory<F> {
    fn thread_name(&self, index: usize) -> String {
        format!("{} [#{}]", self.name, index + 1)
    }

    fn is_daemon(&self) -> bool {
        self.inner.is_daemon()
    }

    fn name_prefix(&self) -> String {
        format!("{} [#", self.name)
    }
}

/// Non-daemon base factory. Pools built with it join their workers on drop.
#[derive(Debug, Clone, Default)]
pub struct JoiningThreadFactory;

impl ThreadFactory for JoiningThreadFactory {
    fn thread_name(&self, index: usize) -> String {
        format!("{}{}", self.name_prefix(), index + 1)
    }

    fn is_daemon(&self) -> bool {
        false
    }

    fn name_prefix(&self) -> String {
        "pool-worker-".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn daemon_factory_names_from_one() {
        let factory = DaemonThreadFactory::new();
        assert_eq!(factory.thread_name(0), "pool-worker-1");
        assert_eq!(factory.thread_name(4), "pool-worker-5");
        assert!(factory.is_daemon());
    }

    #[test]
    fn naming_factory_overrides_name_and_keeps_daemon_flag() {
        let daemon = NamingThreadFactory::new(DaemonThreadFactory::new(), "rebuild");
        assert_eq!(daemon.thread_name(0), "rebuild [#1]");
        assert!(daemon.thread_name(2).starts_with(&daemon.name_prefix()));
        assert!(daemon.is_daemon());

        let joining = NamingThreadFactory::new(JoiningThreadFactory, "rebuild");
        assert!(!joining.is_daemon());
    }
}
