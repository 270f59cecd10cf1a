use connector_config::Environment;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::{Arc, Once};
use std::{
    backtrace::{Backtrace, BacktraceStatus},
    panic::PanicHookInfo,
};
use thiserror::Error;
use tracing::subscriber::{SetGlobalDefaultError, set_global_default};
use tracing_appender::{
    non_blocking::WorkerGuard,
    rolling::{self, InitError},
};
use tracing_log::{LogTracer, log_tracer::SetLoggerError};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::{EnvFilter, FmtSubscriber, Registry, fmt, layer::SubscriberExt};

/// JSON field naming the connector that emitted a log entry.
const CONNECTOR_KEY_IN_LOG: &str = "connector";

/// Errors that can occur during tracing initialization.
#[derive(Debug, Error)]
pub enum TracingError {
    #[error("failed to build rolling file appender: {0}")]
    InitAppender(#[from] InitError),

    #[error("failed to init log tracer: {0}")]
    InitLogTracer(#[from] SetLoggerError),

    #[error("failed to set global default subscriber: {0}")]
    SetGlobalDefault(#[from] SetGlobalDefaultError),

    #[error("an io error occurred: {0}")]
    Io(#[from] io::Error),
}

/// Handle keeping buffered log lines alive until they are written.
///
/// In production the logs go through a non-blocking file writer whose [`WorkerGuard`] must be
/// held until the program exits.
#[must_use]
pub enum LogFlusher {
    Flusher(WorkerGuard),
    NullFlusher,
}

/// Settings of [`init_tracing_with_options`].
#[derive(Debug, Clone)]
pub struct TracingOptions {
    /// Prefix of the log files.
    pub app_name: String,
    /// Directory receiving the log files in production.
    pub log_dir: PathBuf,
    /// Number of daily log files kept before the oldest is removed.
    pub max_log_files: usize,
    /// Connector name added to every JSON log entry.
    pub connector: Option<String>,
}

impl TracingOptions {
    pub fn new(app_name: impl Into<String>) -> Self {
        Self {
            app_name: app_name.into(),
            log_dir: PathBuf::from("logs"),
            max_log_files: 5,
            connector: None,
        }
    }

    pub fn with_connector(mut self, connector: impl Into<String>) -> Self {
        self.connector = Some(connector.into());
        self
    }
}

static INIT_TEST_TRACING: Once = Once::new();

/// Initializes tracing for test environments.
///
/// Call once at the beginning of tests. Set `ENABLE_TRACING=1` to view tracing output:
/// ```bash
/// ENABLE_TRACING=1 cargo test test_name
/// ```
pub fn init_test_tracing() {
    INIT_TEST_TRACING.call_once(|| {
        if std::env::var("ENABLE_TRACING").is_ok() {
            // Without an environment the logs would go to files instead of the terminal.
            Environment::Dev.set();
            let _log_flusher =
                init_tracing("test").expect("Failed to initialize tracing for tests");
        }
    });
}

/// Writer adding the connector name to JSON log entries that do not carry one.
struct ConnectorFieldWriter<W> {
    inner: W,
    connector: Option<Arc<str>>,
}

impl<W> ConnectorFieldWriter<W> {
    fn new(inner: W, connector: Option<Arc<str>>) -> Self {
        Self { inner, connector }
    }
}

impl<W> Write for ConnectorFieldWriter<W>
where
    W: Write,
{
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if let Some(connector) = &self.connector
            && let Ok(line) = std::str::from_utf8(buf)
            && let Ok(serde_json::Value::Object(mut entry)) =
                serde_json::from_str::<serde_json::Value>(line)
            && !entry.contains_key(CONNECTOR_KEY_IN_LOG)
        {
            entry.insert(
                CONNECTOR_KEY_IN_LOG.to_string(),
                serde_json::Value::String(connector.to_string()),
            );

            if let Ok(mut output) = serde_json::to_string(&entry) {
                if line.ends_with('\n') {
                    output.push('\n');
                }
                self.inner.write_all(output.as_bytes())?;

                // The caller only knows about its own buffer.
                return Ok(buf.len());
            }
        }

        self.inner.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Initializes tracing for the application with default options.
///
/// Production environments log JSON to rotating files, development pretty-prints to the console.
pub fn init_tracing(app_name: &str) -> Result<LogFlusher, TracingError> {
    init_tracing_with_options(TracingOptions::new(app_name))
}

/// Initializes tracing for the application.
///
/// The log level is read from `RUST_LOG` and defaults to `info`.
pub fn init_tracing_with_options(options: TracingOptions) -> Result<LogFlusher, TracingError> {
    // Forward records of crates logging through the `log` facade.
    LogTracer::init()?;

    let is_prod = Environment::load()?.is_prod();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());

    let log_flusher = if is_prod {
        configure_prod_tracing(filter, options)?
    } else {
        configure_dev_tracing(filter)?
    };

    set_tracing_panic_hook();

    Ok(log_flusher)
}

fn configure_prod_tracing(
    filter: EnvFilter,
    options: TracingOptions,
) -> Result<LogFlusher, TracingError> {
    let file_appender = rolling::Builder::new()
        .filename_prefix(&options.app_name)
        .filename_suffix("log")
        .rotation(rolling::Rotation::DAILY)
        .max_log_files(options.max_log_files)
        .build(&options.log_dir)?;

    let (file_appender, guard) = tracing_appender::non_blocking(file_appender);
    let connector: Option<Arc<str>> = options.connector.map(Into::into);

    let format = fmt::format()
        .with_level(true)
        .with_ansi(false)
        .with_target(false);

    let subscriber = Registry::default().with(filter).with(
        fmt::layer()
            .event_format(format)
            .with_writer(move || {
                ConnectorFieldWriter::new(file_appender.make_writer(), connector.clone())
            })
            .json()
            .with_current_span(true)
            .with_span_list(true),
    );

    set_global_default(subscriber)?;

    Ok(LogFlusher::Flusher(guard))
}

fn configure_dev_tracing(filter: EnvFilter) -> Result<LogFlusher, TracingError> {
    let format = fmt::format()
        .with_level(true)
        .with_ansi(true)
        .pretty()
        .with_line_number(false)
        .with_file(false)
        .with_target(true);

    let subscriber = FmtSubscriber::builder()
        .event_format(format)
        .with_env_filter(filter)
        .finish();

    set_global_default(subscriber)?;

    Ok(LogFlusher::NullFlusher)
}

/// Routes panics through `tracing` before running the previous hook, so that they reach the log
/// files in production.
fn set_tracing_panic_hook() {
    let prev_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        panic_hook(info);
        prev_hook(info);
    }));
}

fn panic_hook(panic_info: &PanicHookInfo) {
    let backtrace = Backtrace::capture();
    let (backtrace, note) = match backtrace.status() {
        BacktraceStatus::Captured => (Some(backtrace), None),
        BacktraceStatus::Disabled => (
            None,
            Some("run with RUST_BACKTRACE=1 to display backtraces"),
        ),
        BacktraceStatus::Unsupported => {
            (None, Some("backtraces are not supported on this platform"))
        }
        _ => (None, Some("backtrace status is unknown")),
    };

    let payload = if let Some(s) = panic_info.payload().downcast_ref::<&str>() {
        s
    } else if let Some(s) = panic_info.payload().downcast_ref::<String>() {
        s
    } else {
        "unknown panic payload"
    };

    let location = panic_info.location().map(|location| location.to_string());

    tracing::error!(
        panic.payload = payload,
        panic.location = location,
        panic.backtrace = backtrace.map(tracing::field::display),
        panic.note = note,
        "a panic occurred",
    );
}
