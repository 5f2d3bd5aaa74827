//! Logging for the tracker node
//!
//! Provides structured logging with console and file output:
//! - Writes `log.csv` in the data directory (`time,level,target,message`)
//! - Also prints to stdout
//! - Verbosity can be changed at runtime through [`LevelControl`]

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use tracing::{Event, Subscriber};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::{FmtContext, FormatEvent, FormatFields};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{reload, EnvFilter, Registry};
use tracker_shared::{FrameworkError, FrameworkResult};

pub const LOG_FILE: &str = "log.csv";

/// Device log levels, in their numeric order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum LogLevel {
    Trace = 0,
    Debug = 1,
    Info = 2,
    Warn = 3,
    Error = 4,
    Fatal = 5,
}

impl LogLevel {
    const ALL: [LogLevel; 6] = [
        LogLevel::Trace,
        LogLevel::Debug,
        LogLevel::Info,
        LogLevel::Warn,
        LogLevel::Error,
        LogLevel::Fatal,
    ];

    pub fn from_index(index: i32) -> Option<Self> {
        usize::try_from(index)
            .ok()
            .and_then(|i| Self::ALL.get(i))
            .copied()
    }

    /// Parse a level name (`INFO`) or its number (`2`)
    pub fn parse(value: &str) -> Option<Self> {
        if let Ok(index) = value.parse::<i32>() {
            return Self::from_index(index);
        }
        Self::ALL
            .iter()
            .copied()
            .find(|level| level.as_str().eq_ignore_ascii_case(value))
    }

    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Trace => "TRACE",
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR",
            LogLevel::Fatal => "FATAL",
        }
    }

    /// Filter directive for this level; fatal records are logged as errors
    pub fn directive(self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error | LogLevel::Fatal => "error",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

type FilterHandle = reload::Handle<EnvFilter, Registry>;

/// Changes the active log filter at runtime
#[derive(Clone)]
pub struct LevelControl {
    handle: FilterHandle,
    current: Arc<AtomicU8>,
}

impl LevelControl {
    fn new(handle: FilterHandle, level: LogLevel) -> Self {
        Self {
            handle,
            current: Arc::new(AtomicU8::new(level as u8)),
        }
    }

    pub fn level(&self) -> LogLevel {
        LogLevel::from_index(i32::from(self.current.load(Ordering::Relaxed)))
            .unwrap_or(LogLevel::Info)
    }

    pub fn set_level(&self, level: LogLevel) -> FrameworkResult {
        self.handle
            .reload(EnvFilter::new(level.directive()))
            .map_err(|e| FrameworkError::fatal(format!("log filter reload failed: {}", e)))?;
        self.current.store(level as u8, Ordering::Relaxed);
        tracing::info!("log level set to {}", level);
        Ok(())
    }
}

/// One CSV record per event: `time,level,target,message`
struct CsvFormat;

impl<S, N> FormatEvent<S, N> for CsvFormat
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let meta = event.metadata();
        write!(
            writer,
            "{},{},{},",
            chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f"),
            meta.level(),
            meta.target()
        )?;
        ctx.field_format().format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}

/// The on-device log store
///
/// Owns the file writer's guard. [`LogSink::close`] is the critical section
/// run at shutdown once every activity has stopped.
pub struct LogSink {
    path: PathBuf,
    guard: Mutex<Option<WorkerGuard>>,
    levels: LevelControl,
}

impl LogSink {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn levels(&self) -> &LevelControl {
        &self.levels
    }

    /// Record a line at a device log level
    pub fn append(&self, level: LogLevel, line: &str) {
        record(level, line);
    }

    /// Flush pending records and close the file; later records go to stdout only
    pub fn close(&self) {
        let mut guard = self.guard.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(writer) = guard.take() {
            tracing::info!("closing log {}", self.path.display());
            drop(writer);
        }
    }

    pub fn is_open(&self) -> bool {
        self.guard
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .is_some()
    }
}

/// Emit `line` through the installed subscriber at a device log level
pub fn record(level: LogLevel, line: &str) {
    match level {
        LogLevel::Trace => tracing::trace!("{}", line),
        LogLevel::Debug => tracing::debug!("{}", line),
        LogLevel::Info => tracing::info!("{}", line),
        LogLevel::Warn => tracing::warn!("{}", line),
        LogLevel::Error => tracing::error!("{}", line),
        LogLevel::Fatal => tracing::error!("FATAL: {}", line),
    }
}

/// Install the global subscriber
///
/// `RUST_LOG` overrides `level` for the initial filter.
pub fn init_logging(data_dir: &Path, level: LogLevel, stdout: bool) -> Result<LogSink> {
    std::fs::create_dir_all(data_dir)
        .with_context(|| format!("creating data directory {}", data_dir.display()))?;

    let file_appender = tracing_appender::rolling::never(data_dir, LOG_FILE);
    let (non_blocking_file, file_guard) = tracing_appender::non_blocking(file_appender);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.directive()));
    let (filter_layer, handle) = reload::Layer::new(filter);

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(non_blocking_file)
        .with_ansi(false)
        .event_format(CsvFormat);

    let stdout_layer = stdout.then(|| {
        tracing_subscriber::fmt::layer()
            .with_writer(io::stdout)
            .with_target(false)
    });

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(stdout_layer)
        .with(file_layer)
        .try_init()
        .context("installing tracing subscriber")?;

    Ok(LogSink {
        path: data_dir.join(LOG_FILE),
        guard: Mutex::new(Some(file_guard)),
        levels: LevelControl::new(handle, level),
    })
}

#[cfg(test)]
pub(crate) fn detached_level_control() -> (reload::Layer<EnvFilter, Registry>, LevelControl) {
    let (layer, handle) = reload::Layer::new(EnvFilter::new("info"));
    (layer, LevelControl::new(handle, LogLevel::Info))
}

/// In-memory writer for asserting on formatted records
#[cfg(test)]
#[derive(Clone, Default)]
pub(crate) struct CapturedLog(Arc<Mutex<Vec<u8>>>);

#[cfg(test)]
impl CapturedLog {
    pub(crate) fn text(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

#[cfg(test)]
impl io::Write for CapturedLog {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
