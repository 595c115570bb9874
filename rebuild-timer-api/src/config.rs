//! # Configuration
//!
//! The timer reads exactly one value from the host: the worker capacity of
//! the pool. Hosts plug in whatever backs their settings through
//! [`ConfigSource`]; three sources ship here.
//!
//! - [`EnvConfig`]: `REBUILD_TIMER_<KEY>` environment variables
//! - [`MapConfig`]: in-memory, can be changed at runtime
//! - [`JsonFileConfig`]: a flat JSON object loaded from disk

use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::{PoisonError, RwLock};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::errors::{TimerError, TimerResult};

/// Parameter key holding the pool's worker capacity.
pub const POOL_SIZE_KEY: &str = "dgcThreadPoolSize";

/// Capacity used when the parameter is unset or unparsable.
pub const DEFAULT_POOL_SIZE: i64 = 10;

/// Largest worker capacity the timer accepts.
pub const MAX_POOL_SIZE: usize = 4096;

/// Diagnostic name given to the timer's worker threads.
pub const DEFAULT_THREAD_NAME: &str = "dependency-graph-rebuild-timer";

/// A read-only view of host settings.
pub trait ConfigSource: fmt::Debug + Send + Sync {
    /// Raw value for `key`, if set.
    fn get(&self, key: &str) -> Option<String>;
}

/// Read an integer parameter, falling back to `default` when it is unset or
/// cannot be parsed.
pub fn int_parameter(source: &dyn ConfigSource, key: &str, default: i64) -> i64 {
    match source.get(key) {
        None => default,
        Some(raw) => match raw.trim().parse::<i64>() {
            Ok(value) => value,
            Err(e) => {
                warn!(key, value = %raw, error = %e, default, "Unparsable integer parameter, using default");
                default
            }
        },
    }
}

/// Settings of the shared timer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimerConfig {
    /// Key of the capacity parameter in the config source.
    pub pool_size_key: String,

    /// Capacity used when the parameter is unset or unparsable.
    pub default_pool_size: i64,

    /// Diagnostic name for worker threads.
    pub thread_name: String,

    /// Whether worker threads are daemon-style.
    pub daemon: bool,
}

impl Default for TimerConfig {
    fn default() -> Self {
        Self {
            pool_size_key: POOL_SIZE_KEY.to_string(),
            default_pool_size: DEFAULT_POOL_SIZE,
            thread_name: DEFAULT_THREAD_NAME.to_string(),
            daemon: true,
        }
    }
}

impl TimerConfig {
    /// Read and validate the worker capacity from `source`.
    pub fn resolve_capacity(&self, source: &dyn ConfigSource) -> TimerResult<usize> {
        let value = int_parameter(source, &self.pool_size_key, self.default_pool_size);
        validate_capacity(&self.pool_size_key, value)
    }
}

/// Check that `value` can be used as a worker count.
pub fn validate_capacity(key: &str, value: i64) -> TimerResult<usize> {
    if value <= 0 {
        return Err(TimerError::configuration(
            key,
            value,
            "worker capacity must be positive",
        ));
    }
    let capacity = value as usize;
    if capacity > MAX_POOL_SIZE {
        return Err(TimerError::configuration(
            key,
            value,
            format!("worker capacity must not exceed {}", MAX_POOL_SIZE),
        ));
    }
    Ok(capacity)
}

/// Environment-backed settings.
///
/// Key `dgcThreadPoolSize` is looked up as `REBUILD_TIMER_DGC_THREAD_POOL_SIZE`.
#[derive(Debug, Clone)]
pub struct EnvConfig {
    prefix: String,
}

impl EnvConfig {
    pub const DEFAULT_PREFIX: &'static str = "REBUILD_TIMER_";

    pub fn new() -> Self {
        Self::with_prefix(Self::DEFAULT_PREFIX)
    }

    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// Environment variable name for `key`.
    pub fn var_name(&self, key: &str) -> String {
        format!("{}{}", self.prefix, screaming_snake_case(key))
    }
}

impl Default for EnvConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigSource for EnvConfig {
    fn get(&self, key: &str) -> Option<String> {
        std::env::var(self.var_name(key)).ok()
    }
}

fn screaming_snake_case(key: &str) -> String {
    let mut out = String::with_capacity(key.len() + 4);
    let mut prev_lower = false;
    for c in key.chars() {
        if c == '-' || c == '.' || c == '_' {
            out.push('_');
            prev_lower = false;
            continue;
        }
        if c.is_uppercase() && prev_lower {
            out.push('_');
        }
        prev_lower = c.is_lowercase() || c.is_ascii_digit();
        out.extend(c.to_uppercase());
    }
    out
}

/// In-memory settings that can be changed while the host runs.
#[derive(Debug, Default)]
pub struct MapConfig {
    values: RwLock<HashMap<String, String>>,
}

impl MapConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(self, key: impl Into<String>, value: impl ToString) -> Self {
        self.set(key, value);
        self
    }

    pub fn set(&self, key: impl Into<String>, value: impl ToString) {
        self.values
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.into(), value.to_string());
    }

    pub fn remove(&self, key: &str) -> Option<String> {
        self.values
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key)
    }
}

impl ConfigSource for MapConfig {
    fn get(&self, key: &str) -> Option<String> {
        self.values
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }
}

/// Settings loaded once from a flat JSON object.
///
/// ```json
/// { "dgcThreadPoolSize": 4 }
/// ```
///
/// Strings are used as-is, every other scalar through its JSON text.
#[derive(Debug, Clone, Default)]
pub struct JsonFileConfig {
    values: HashMap<String, String>,
}

impl JsonFileConfig {
    pub fn load(path: impl AsRef<Path>) -> TimerResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| TimerError::ConfigLoad(format!("{}: {}", path.display(), e)))?;
        Self::from_json_str(&text)
            .map_err(|e| TimerError::ConfigLoad(format!("{}: {}", path.display(), e)))
    }

    pub fn from_json_str(text: &str) -> TimerResult<Self> {
        let parsed: serde_json::Map<String, serde_json::Value> = serde_json::from_str(text)
            .map_err(|e| TimerError::ConfigLoad(e.to_string()))?;

        let values = parsed
            .into_iter()
            .filter_map(|(key, value)| match value {
                serde_json::Value::String(s) => Some((key, s)),
                serde_json::Value::Null => None,
                other => Some((key, other.to_string())),
            })
            .collect();

        Ok(Self { values })
    }
}

impl ConfigSource for JsonFileConfig {
    fn get(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }
}
