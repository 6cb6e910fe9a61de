//! Structured logging facade
//!
//! A [`Logger`] owns its own `tracing` subscriber with up to two sinks:
//!
//! - **File**: JSON records, one per line, written through [`RollingFile`].
//!   Fields attached with [`Logger::with`] become top-level keys.
//! - **Console**: colored human-readable text on stdout
//!
//! Both sinks share the minimum [`Severity`] and a millisecond timestamp
//! format. Loggers are plain values, so tests and libraries can build and
//! pass their own; the process-wide instance behind [`logger()`] and the
//! free functions is optional convenience on top.
//!
//! ## Process-wide lifecycle
//!
//! - [`init`] builds a logger from config and replaces the current one
//! - [`set`] installs an already-built logger
//! - [`reset`] clears it; the next call re-creates the default lazily
//! - [`logger`] returns the current one, creating the default on first use

mod json;
pub mod redact;
pub mod rolling;
pub mod severity;

pub use rolling::{RollingFile, RotationPolicy};
pub use severity::{Severity, FATAL_TARGET, PANIC_TARGET};

use crate::config::LogConfig;
use crate::error::LogError;
use arc_swap::ArcSwapOption;
use std::fmt::{self, Display};
use std::panic::Location;
use std::sync::{Arc, Mutex, Once, OnceLock};
use tracing::Dispatch;
use tracing_subscriber::filter::filter_fn;
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::time::FormatTime;
use tracing_subscriber::fmt::writer::{BoxMakeWriter, MakeWriter};
use tracing_subscriber::prelude::*;

/// Timestamp format shared by both sinks
pub const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

#[derive(Debug, Clone, Copy, Default)]
struct MillisTimer;

impl FormatTime for MillisTimer {
    fn format_time(&self, w: &mut Writer<'_>) -> fmt::Result {
        write!(w, "{}", chrono::Local::now().format(TIME_FORMAT))
    }
}

/// A configured logging sink set
#[derive(Debug, Clone)]
pub struct Logger {
    dispatch: Dispatch,
    level: Severity,
    fields: json::Fields,
    /// `fields` rendered once as `k=v k=v` for the console
    context: Option<String>,
}

/// Assembles a [`Logger`] from arbitrary writers
pub struct LoggerBuilder {
    level: Severity,
    console: Option<(BoxMakeWriter, bool)>,
    file: Option<BoxMakeWriter>,
}

impl LoggerBuilder {
    pub fn new(level: Severity) -> Self {
        Self {
            level,
            console: None,
            file: None,
        }
    }

    /// Human-readable sink; `ansi` turns on level colors
    pub fn console<W>(mut self, writer: W, ansi: bool) -> Self
    where
        W: for<'a> MakeWriter<'a> + Send + Sync + 'static,
    {
        self.console = Some((BoxMakeWriter::new(writer), ansi));
        self
    }

    /// JSON sink
    pub fn file<W>(mut self, writer: W) -> Self
    where
        W: for<'a> MakeWriter<'a> + Send + Sync + 'static,
    {
        self.file = Some(BoxMakeWriter::new(writer));
        self
    }

    pub fn build(self) -> Logger {
        let level = self.level;

        let file_layer = self.file.map(|writer| {
            tracing_subscriber::fmt::layer()
                .event_format(json::JsonFormat)
                .with_writer(writer)
                .with_filter(filter_fn(move |metadata| Severity::of(metadata) >= level))
        });

        let console_layer = self.console.map(|(writer, ansi)| {
            tracing_subscriber::fmt::layer()
                .with_timer(MillisTimer)
                .with_ansi(ansi)
                .with_target(false)
                .with_writer(writer)
                .with_filter(filter_fn(move |metadata| Severity::of(metadata) >= level))
        });

        let subscriber = tracing_subscriber::registry()
            .with(file_layer)
            .with(console_layer);

        Logger {
            dispatch: Dispatch::new(subscriber),
            level,
            fields: json::Fields::default(),
            context: None,
        }
    }
}

impl Logger {
    /// Build the sinks described by `cfg`
    ///
    /// An unknown level string behaves as `info`. The log directory is
    /// created when missing.
    pub fn new(cfg: &LogConfig) -> Result<Self, LogError> {
        let mut builder = LoggerBuilder::new(Severity::parse_or_info(&cfg.level));

        if !cfg.filename.is_empty() {
            let file = RollingFile::open(&cfg.filename, RotationPolicy::from_config(cfg))?;
            builder = builder.file(Mutex::new(file));
        }
        if cfg.console {
            builder = builder.console(std::io::stdout, true);
        }

        Ok(builder.build())
    }

    pub fn builder(level: Severity) -> LoggerBuilder {
        LoggerBuilder::new(level)
    }

    pub fn level(&self) -> Severity {
        self.level
    }

    pub fn enabled(&self, severity: Severity) -> bool {
        severity >= self.level
    }

    /// The underlying subscriber, e.g. for `tracing::dispatcher::set_global_default`
    pub fn dispatch(&self) -> &Dispatch {
        &self.dispatch
    }

    /// Derive a logger that attaches `fields` to every record
    ///
    /// Values of secret-looking keys (password, token, ...) are masked.
    pub fn with<I, K, V>(&self, fields: I) -> Logger
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Display,
    {
        let mut merged = Vec::clone(&self.fields);
        for (key, value) in fields {
            let key = key.as_ref();
            merged.push((key.to_string(), redact::sanitize_field(key, &value.to_string())));
        }

        let context = (!merged.is_empty()).then(|| {
            merged
                .iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect::<Vec<_>>()
                .join(" ")
        });

        Logger {
            dispatch: self.dispatch.clone(),
            level: self.level,
            fields: Arc::new(merged),
            context,
        }
    }

    #[track_caller]
    pub fn debug(&self, message: impl Display) {
        self.log(Severity::Debug, &message, Location::caller());
    }

    #[track_caller]
    pub fn info(&self, message: impl Display) {
        self.log(Severity::Info, &message, Location::caller());
    }

    #[track_caller]
    pub fn warn(&self, message: impl Display) {
        self.log(Severity::Warn, &message, Location::caller());
    }

    #[track_caller]
    pub fn error(&self, message: impl Display) {
        self.log(Severity::Error, &message, Location::caller());
    }

    /// Log, then unwind the current thread
    #[track_caller]
    pub fn panic(&self, message: impl Display) -> ! {
        self.log(Severity::Panic, &message, Location::caller());
        panic!("{message}")
    }

    /// Log, then terminate the process with status 1
    #[track_caller]
    pub fn fatal(&self, message: impl Display) -> ! {
        self.log(Severity::Fatal, &message, Location::caller());
        std::process::exit(1)
    }

    fn log(&self, severity: Severity, message: &dyn Display, caller: &'static Location<'static>) {
        let context = self.context.as_deref();

        json::scoped(&self.fields, || {
            tracing::dispatcher::with_default(&self.dispatch, || match severity {
                Severity::Debug => tracing::debug!(caller = %caller, context, "{message}"),
                Severity::Info => tracing::info!(caller = %caller, context, "{message}"),
                Severity::Warn => tracing::warn!(caller = %caller, context, "{message}"),
                Severity::Error => tracing::error!(caller = %caller, context, "{message}"),
                // tracing has no level above ERROR; the target and label carry it
                Severity::Panic => tracing::error!(
                    target: PANIC_TARGET,
                    severity = Severity::Panic.as_str(),
                    caller = %caller,
                    context,
                    "{message}"
                ),
                Severity::Fatal => tracing::error!(
                    target: FATAL_TARGET,
                    severity = Severity::Fatal.as_str(),
                    caller = %caller,
                    context,
                    "{message}"
                ),
            })
        });
    }
}

static GLOBAL: OnceLock<ArcSwapOption<Logger>> = OnceLock::new();
static BOOTSTRAP_FAILURE: Once = Once::new();

fn slot() -> &'static ArcSwapOption<Logger> {
    GLOBAL.get_or_init(ArcSwapOption::empty)
}

/// Replace the process-wide logger with one built from `cfg`
pub fn init(cfg: &LogConfig) -> Result<(), LogError> {
    set(Logger::new(cfg)?);
    Ok(())
}

/// Install `logger` as the process-wide logger
pub fn set(logger: Logger) {
    slot().store(Some(Arc::new(logger)));
}

/// Drop the process-wide logger
pub fn reset() {
    slot().store(None);
}

/// The process-wide logger, created from `LogConfig::default()` on first use
///
/// Returns `None` when that default cannot be built (for example the log
/// directory cannot be created); the failure is reported once on stderr.
pub fn logger() -> Option<Arc<Logger>> {
    if let Some(current) = slot().load_full() {
        return Some(current);
    }

    match Logger::new(&LogConfig::default()) {
        Ok(logger) => {
            let fresh = Arc::new(logger);
            // Another thread may have installed one meanwhile; keep theirs
            let previous = slot().compare_and_swap(&None::<Arc<Logger>>, Some(fresh.clone()));
            match &*previous {
                Some(winner) => Some(winner.clone()),
                None => Some(fresh),
            }
        }
        Err(e) => {
            BOOTSTRAP_FAILURE.call_once(|| {
                eprintln!("dbkit: failed to initialize default logger: {e}");
            });
            None
        }
    }
}

/// Derived process-wide logger carrying `fields`
pub fn with<I, K, V>(fields: I) -> Option<Logger>
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: Display,
{
    logger().map(|l| l.with(fields))
}

#[track_caller]
pub fn debug(message: impl Display) {
    if let Some(l) = logger() {
        l.log(Severity::Debug, &message, Location::caller());
    }
}

#[track_caller]
pub fn info(message: impl Display) {
    if let Some(l) = logger() {
        l.log(Severity::Info, &message, Location::caller());
    }
}

#[track_caller]
pub fn warn(message: impl Display) {
    if let Some(l) = logger() {
        l.log(Severity::Warn, &message, Location::caller());
    }
}

#[track_caller]
pub fn error(message: impl Display) {
    if let Some(l) = logger() {
        l.log(Severity::Error, &message, Location::caller());
    }
}

#[track_caller]
pub fn panic(message: impl Display) -> ! {
    if let Some(l) = logger() {
        l.log(Severity::Panic, &message, Location::caller());
    }
    panic!("{message}")
}

#[track_caller]
pub fn fatal(message: impl Display) -> ! {
    if let Some(l) = logger() {
        l.log(Severity::Fatal, &message, Location::caller());
    }
    std::process::exit(1)
}

/// `format!`-style [`debug`]
#[macro_export]
macro_rules! debugf {
    ($($arg:tt)+) => {
        $crate::logger::debug(::std::format_args!($($arg)+))
    };
}

/// `format!`-style [`info`]
#[macro_export]
macro_rules! infof {
    ($($arg:tt)+) => {
        $crate::logger::info(::std::format_args!($($arg)+))
    };
}

/// `format!`-style [`warn`]
#[macro_export]
macro_rules! warnf {
    ($($arg:tt)+) => {
        $crate::logger::warn(::std::format_args!($($arg)+))
    };
}

/// `format!`-style [`error`]
#[macro_export]
macro_rules! errorf {
    ($($arg:tt)+) => {
        $crate::logger::error(::std::format_args!($($arg)+))
    };
}

/// `format!`-style [`panic`](fn@panic)
#[macro_export]
macro_rules! panicf {
    ($($arg:tt)+) => {
        $crate::logger::panic(::std::format_args!($($arg)+))
    };
}

/// `format!`-style [`fatal`]
#[macro_export]
macro_rules! fatalf {
    ($($arg:tt)+) => {
        $crate::logger::fatal(::std::format_args!($($arg)+))
    };
}
