// Logging setup for the rebuild timer
//
// The timer itself only emits `tracing` events. Hosts that do not install a
// subscriber of their own can use the helpers here.
//
// # Usage
//
// ```rust,no_run
// use rebuild_timer::logging;
//
// // INFO level, console output
// logging::init_default();
//
// // Or pick the fields yourself
// let config = logging::LogConfig {
//     level: tracing::Level::DEBUG,
//     json_format: false,
//     ..Default::default()
// };
// logging::init(config);
// ```
//
// Task failures are logged at ERROR with the target
// `rebuild_timer::scheduler::error_logging`, pool lifecycle at INFO, single
// task submissions at DEBUG.

use std::fs::OpenOptions;
use std::io;
use std::path::Path;
use std::sync::{Mutex, Once};

use tracing::{Level, Subscriber};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::Layered;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{fmt, prelude::*, EnvFilter, Layer, Registry};

/// Configuration for the logging helpers.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Minimum log level to display
    pub level: Level,
    /// Whether to use JSON format for logs
    pub json_format: bool,
    /// Whether to include file and line information
    pub show_file_line: bool,
    /// Whether to include thread name/id. Worker names identify the pool.
    pub show_thread_info: bool,
    /// Whether to include timestamps
    pub show_time: bool,
    /// Target filter expressions (format: "target=level,target2=level2,...")
    pub target_filters: Option<String>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            json_format: false,
            show_file_line: true,
            show_thread_info: true,
            show_time: true,
            target_filters: None,
        }
    }
}

// Only the first initialization takes effect
static INIT: Once = Once::new();

type Base = Layered<EnvFilter, Registry>;

fn env_filter(config: &LogConfig) -> EnvFilter {
    let mut filter = EnvFilter::from_default_env().add_directive(LevelFilter::from_level(config.level).into());
    if let Some(filters) = &config.target_filters {
        for directive in filters.split(',') {
            match directive.trim().parse() {
                Ok(directive) => filter = filter.add_directive(directive),
                Err(e) => eprintln!("Ignoring invalid log filter '{}': {}", directive, e),
            }
        }
    }
    filter
}

fn console_layer<S>(config: &LogConfig) -> Box<dyn Layer<S> + Send + Sync>
where
    S: Subscriber + for<'a> LookupSpan<'a> + 'static,
{
    let layer = fmt::layer()
        .with_ansi(atty::is(atty::Stream::Stdout))
        .with_file(config.show_file_line)
        .with_line_number(config.show_file_line)
        .with_thread_names(config.show_thread_info)
        .with_thread_ids(config.show_thread_info);

    match (config.json_format, config.show_time) {
        (true, _) => layer.json().flatten_event(true).boxed(),
        (false, true) => layer.boxed(),
        (false, false) => layer.without_time().boxed(),
    }
}

fn set_global_subscriber<S>(subscriber: S)
where
    S: Subscriber + Send + Sync + 'static,
{
    if let Err(err) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Error setting global tracing subscriber: {}", err);
    }
}

/// Install a global subscriber for `config`. Later calls are ignored.
pub fn init(config: LogConfig) {
    INIT.call_once(|| {
        let subscriber = tracing_subscriber::registry()
            .with(env_filter(&config))
            .with(console_layer::<Base>(&config));
        set_global_subscriber(subscriber);
    });
}

/// Like [`init`], and also append plain-text records to `log_file`.
///
/// # Errors
/// Returns an error if the file cannot be opened or created. Nothing is
/// installed in that case.
pub fn init_with_file(config: LogConfig, log_file: impl AsRef<Path>) -> io::Result<()> {
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_file.as_ref())?;

    INIT.call_once(move || {
        let file_layer = fmt::layer()
            .with_ansi(false)
            .with_writer(Mutex::new(file))
            .with_file(true)
            .with_line_number(true)
            .with_thread_names(true)
            .with_thread_ids(true);

        let subscriber = tracing_subscriber::registry()
            .with(env_filter(&config))
            .with(console_layer::<Base>(&config))
            .with(file_layer);
        set_global_subscriber(subscriber);
    });
    Ok(())
}

/// INFO level, human-readable console output.
pub fn init_default() {
    init(LogConfig::default());
}

/// DEBUG for the timer, TRACE for the pool internals.
pub fn init_development() {
    init(LogConfig {
        level: Level::DEBUG,
        target_filters: Some("rebuild_timer=debug,rebuild_timer::scheduler=trace".to_string()),
        ..Default::default()
    });
}

/// JSON records without file/line, for log aggregation.
pub fn init_production() {
    init(LogConfig {
        level: Level::INFO,
        json_format: true,
        show_file_line: false,
        show_thread_info: true,
        show_time: true,
        target_filters: None,
    });
}

/// Production settings plus a file copy of every record.
pub fn init_production_with_file(path: impl AsRef<Path>) -> io::Result<()> {
    init_with_file(
        LogConfig {
            json_format: true,
            show_file_line: false,
            ..Default::default()
        },
        path,
    )
}

/// WARN and above, compact output for test runs.
///
/// Task failures log at ERROR, so tests that provoke them still show the
/// records.
pub fn init_test() {
    init(LogConfig {
        level: Level::WARN,
        json_format: false,
        show_file_line: true,
        show_thread_info: false,
        show_time: false,
        target_filters: None,
    });
}

/// Span covering work done on behalf of one pool.
///
/// ```rust,no_run
/// let span = rebuild_timer::pool_span!("4f0c...", capacity = 10);
/// let _guard = span.enter();
/// ```
#[macro_export]
macro_rules! pool_span {
    ($pool_id:expr) => {
        tracing::info_span!("scheduled_pool", pool_id = %$pool_id)
    };
    ($pool_id:expr, $($fields:tt)*) => {
        tracing::info_span!("scheduled_pool", pool_id = %$pool_id, $($fields)*)
    };
}

/// Log a pool lifecycle event.
///
/// ```rust,no_run
/// rebuild_timer::log_pool!("4f0c...", "started");
/// rebuild_timer::log_pool!("4f0c...", "shut_down", pending = 3);
/// ```
#[macro_export]
macro_rules! log_pool {
    ($pool_id:expr, $event:expr) => {
        tracing::info!(pool_id = %$pool_id, event = $event);
    };
    ($pool_id:expr, $event:expr, $($fields:tt)*) => {
        tracing::info!(pool_id = %$pool_id, event = $event, $($fields)*);
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = LogConfig::default();
        assert_eq!(config.level, Level::INFO);
        assert!(!config.json_format);
        assert!(config.target_filters.is_none());
    }

    #[test]
    fn filter_accepts_target_directives() {
        let config = LogConfig {
            target_filters: Some("rebuild_timer=trace, not a directive ==".to_string()),
            ..Default::default()
        };
        let filter = env_filter(&config);
        assert!(filter.to_string().contains("rebuild_timer=trace"));
    }
}
