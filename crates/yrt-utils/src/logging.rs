//! Logging bootstrap for the yrt binaries.
//!
//! Events emitted through `tracing` by `yrt-reflect` are routed to a console
//! layer (stderr, so command output on stdout stays clean) and optionally to
//! a log file.
//!
//! ## Environment
//!
//! - `RUST_LOG`: filter directives, used when no explicit level is given
//! - `YRT_LOG_FORMAT`: `pretty` (default) or `json`
//! - `YRT_LOG_FILE`: directory receiving a daily-rotated `yrt.log`

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::time::ChronoUtc;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, Layer, Registry};

/// Variable selecting the console format.
pub const LOG_FORMAT_ENV: &str = "YRT_LOG_FORMAT";

/// Variable naming the log file directory.
pub const LOG_FILE_ENV: &str = "YRT_LOG_FILE";

/// File name prefix of rotated log files.
const LOG_FILE_PREFIX: &str = "yrt.log";

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat
{
    /// Human-readable format with colors (default)
    #[default]
    Pretty,
    /// Structured JSON format
    Json,
}

impl FromStr for LogFormat
{
    type Err = LoggingError;

    fn from_str(s: &str) -> Result<Self, Self::Err>
    {
        match s.to_lowercase().as_str() {
            "pretty" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            _ => Err(LoggingError::InvalidFormat(s.to_string())),
        }
    }
}

impl fmt::Display for LogFormat
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        match self {
            LogFormat::Pretty => write!(f, "pretty"),
            LogFormat::Json => write!(f, "json"),
        }
    }
}

/// Log level
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel
{
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl FromStr for LogLevel
{
    type Err = LoggingError;

    fn from_str(s: &str) -> Result<Self, Self::Err>
    {
        match s.to_lowercase().as_str() {
            "trace" => Ok(LogLevel::Trace),
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            _ => Err(LoggingError::InvalidLevel(s.to_string())),
        }
    }
}

impl From<LogLevel> for Level
{
    fn from(level: LogLevel) -> Self
    {
        match level {
            LogLevel::Trace => Level::TRACE,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Info => Level::INFO,
            LogLevel::Warn => Level::WARN,
            LogLevel::Error => Level::ERROR,
        }
    }
}

/// Where and how to log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig
{
    /// Fixed level; `None` defers to `RUST_LOG`, then `info`.
    pub level: Option<LogLevel>,
    /// Console format.
    pub format: LogFormat,
    /// Write events to stderr.
    pub console: bool,
    /// Directory for daily-rotated log files.
    pub file_dir: Option<PathBuf>,
}

impl Default for LoggingConfig
{
    fn default() -> Self
    {
        Self {
            level: None,
            format: LogFormat::Pretty,
            console: true,
            file_dir: None,
        }
    }
}

impl LoggingConfig
{
    /// Configuration read from `YRT_LOG_FORMAT` and `YRT_LOG_FILE`.
    ///
    /// ## Errors
    ///
    /// Returns `InvalidFormat` if `YRT_LOG_FORMAT` is set to an unknown format.
    pub fn from_env() -> Result<Self, LoggingError>
    {
        let format = match std::env::var(LOG_FORMAT_ENV) {
            Ok(value) => value.parse()?,
            Err(_) => LogFormat::default(),
        };
        let file_dir = std::env::var_os(LOG_FILE_ENV).map(PathBuf::from);
        Ok(Self {
            format,
            file_dir,
            ..Self::default()
        })
    }

    /// Use a fixed level instead of `RUST_LOG`.
    #[must_use]
    pub fn with_level(mut self, level: LogLevel) -> Self
    {
        self.level = Some(level);
        self
    }

    /// Override the console format.
    #[must_use]
    pub fn with_format(mut self, format: LogFormat) -> Self
    {
        self.format = format;
        self
    }

    /// Also write to rotated files under `dir`.
    #[must_use]
    pub fn with_file_dir(mut self, dir: impl Into<PathBuf>) -> Self
    {
        self.file_dir = Some(dir.into());
        self
    }

    fn filter(&self) -> Result<EnvFilter, LoggingError>
    {
        match self.level {
            Some(level) => Ok(EnvFilter::new(Level::from(level).as_str())),
            None => match EnvFilter::try_from_default_env() {
                Ok(filter) => Ok(filter),
                Err(_) if std::env::var_os(EnvFilter::DEFAULT_ENV).is_none() => Ok(EnvFilter::new("info")),
                Err(err) => Err(LoggingError::InvalidLevel(err.to_string())),
            },
        }
    }
}

/// Keeps background log writers alive; drop it only at exit.
#[derive(Debug, Default)]
#[must_use = "dropping the guard stops file logging"]
pub struct LoggingGuard
{
    file: Option<PathBuf>,
    _worker: Option<WorkerGuard>,
}

impl LoggingGuard
{
    /// Directory or file receiving log output, if file logging is on.
    pub fn file(&self) -> Option<&Path>
    {
        self.file.as_deref()
    }
}

/// Initialize logging from the environment.
///
/// ## Example
///
/// ```no_run
/// let _guard = yrt_utils::init_logging().expect("Failed to initialize logging");
/// tracing::info!("Application started");
/// ```
///
/// ## Errors
///
/// Returns an error if the environment is invalid or a subscriber is already installed.
pub fn init_logging() -> Result<LoggingGuard, LoggingError>
{
    init_logging_with(&LoggingConfig::from_env()?)
}

/// Initialize logging from an explicit configuration.
///
/// ## Errors
///
/// Returns an error if the filter is invalid, the log directory cannot be
/// created, or a subscriber is already installed.
pub fn init_logging_with(config: &LoggingConfig) -> Result<LoggingGuard, LoggingError>
{
    let mut layers: Vec<BoxedLayer> = Vec::new();
    let mut guard = LoggingGuard::default();

    if config.console {
        let layer = match config.format {
            LogFormat::Pretty => tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_timer(ChronoUtc::rfc_3339())
                .with_target(true)
                .with_thread_ids(false)
                .with_filter(config.filter()?)
                .boxed(),
            LogFormat::Json => tracing_subscriber::fmt::layer()
                .json()
                .with_writer(std::io::stderr)
                .with_timer(ChronoUtc::rfc_3339())
                .with_current_span(true)
                .with_span_list(true)
                .with_filter(config.filter()?)
                .boxed(),
        };
        layers.push(layer);
    }

    if let Some(dir) = &config.file_dir {
        std::fs::create_dir_all(dir)?;
        let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
        let (writer, worker) = tracing_appender::non_blocking(appender);
        layers.push(file_layer(writer, config.filter()?));
        guard.file = Some(dir.clone());
        guard._worker = Some(worker);
    }

    tracing_subscriber::registry()
        .with(layers)
        .try_init()
        .map_err(|err| LoggingError::InitializationFailed(err.to_string()))?;
    Ok(guard)
}

/// Initialize file-only logging into a dated file under `dir`.
///
/// Used when stderr belongs to someone else, e.g. a host process embedding
/// the reflection layer. The file is named `yrt-YYYY-MM-DD.log`.
///
/// ## Errors
///
/// Returns an error if the directory cannot be created or a subscriber is
/// already installed.
pub fn init_logging_to_dir(dir: impl AsRef<Path>, level: LogLevel) -> Result<LoggingGuard, LoggingError>
{
    let dir = dir.as_ref();
    std::fs::create_dir_all(dir)?;
    let name = format!("yrt-{}.log", chrono::Utc::now().format("%Y-%m-%d"));
    let appender = tracing_appender::rolling::never(dir, &name);
    let (writer, worker) = tracing_appender::non_blocking(appender);

    let filter = EnvFilter::new(Level::from(level).as_str());
    tracing_subscriber::registry()
        .with(vec![file_layer(writer, filter)])
        .try_init()
        .map_err(|err| LoggingError::InitializationFailed(err.to_string()))?;

    Ok(LoggingGuard {
        file: Some(dir.join(name)),
        _worker: Some(worker),
    })
}

fn file_layer(writer: tracing_appender::non_blocking::NonBlocking, filter: EnvFilter) -> BoxedLayer
{
    tracing_subscriber::fmt::layer()
        .with_writer(writer)
        .with_timer(ChronoUtc::rfc_3339())
        .with_ansi(false)
        .with_target(true)
        .with_filter(filter)
        .boxed()
}

/// Logging errors
#[derive(Debug, thiserror::Error)]
pub enum LoggingError
{
    #[error("Invalid log format: {0}")]
    InvalidFormat(String),

    #[error("Invalid log level: {0}")]
    InvalidLevel(String),

    #[error("Failed to initialize logging: {0}")]
    InitializationFailed(String),

    #[error("Failed to prepare log directory: {0}")]
    FileError(#[from] std::io::Error),
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn test_log_format_from_str()
    {
        assert_eq!("pretty".parse::<LogFormat>().unwrap(), LogFormat::Pretty);
        assert_eq!("json".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert_eq!("JSON".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert!("invalid".parse::<LogFormat>().is_err());
    }

    #[test]
    fn test_log_level_from_str()
    {
        assert_eq!("trace".parse::<LogLevel>().unwrap(), LogLevel::Trace);
        assert_eq!("debug".parse::<LogLevel>().unwrap(), LogLevel::Debug);
        assert_eq!("info".parse::<LogLevel>().unwrap(), LogLevel::Info);
        assert_eq!("warn".parse::<LogLevel>().unwrap(), LogLevel::Warn);
        assert_eq!("warning".parse::<LogLevel>().unwrap(), LogLevel::Warn);
        assert_eq!("error".parse::<LogLevel>().unwrap(), LogLevel::Error);
        assert!("invalid".parse::<LogLevel>().is_err());
    }

    #[test]
    fn test_log_level_to_tracing_level()
    {
        assert_eq!(Level::from(LogLevel::Trace), Level::TRACE);
        assert_eq!(Level::from(LogLevel::Debug), Level::DEBUG);
        assert_eq!(Level::from(LogLevel::Info), Level::INFO);
        assert_eq!(Level::from(LogLevel::Warn), Level::WARN);
        assert_eq!(Level::from(LogLevel::Error), Level::ERROR);
    }

    #[test]
    fn test_config_builders()
    {
        let config = LoggingConfig::default()
            .with_level(LogLevel::Debug)
            .with_format(LogFormat::Json)
            .with_file_dir("/tmp/yrt-logs");
        assert_eq!(config.level, Some(LogLevel::Debug));
        assert_eq!(config.format, LogFormat::Json);
        assert!(config.console);
        assert_eq!(config.file_dir.as_deref(), Some(Path::new("/tmp/yrt-logs")));
        assert_eq!(LogFormat::Json.to_string(), "json");
    }

    #[test]
    fn test_init_logging_to_dir_writes_dated_file()
    {
        let dir = tempfile::tempdir().unwrap();
        let logs = dir.path().join("logs");

        let guard = init_logging_to_dir(&logs, LogLevel::Debug).unwrap();
        assert!(logs.is_dir());
        let file = guard.file().unwrap();
        assert_eq!(file.parent(), Some(logs.as_path()));
        let name = file.file_name().unwrap().to_string_lossy();
        assert!(name.starts_with("yrt-") && name.ends_with(".log"), "unexpected log file {name}");

        // Only one subscriber per process
        assert!(matches!(
            init_logging_to_dir(&logs, LogLevel::Info),
            Err(LoggingError::InitializationFailed(_))
        ));
    }

    #[test]
    fn test_fixed_level_filter_ignores_rust_log()
    {
        let config = LoggingConfig::default().with_level(LogLevel::Warn);
        assert!(config.filter().unwrap().to_string().contains("warn"));
    }
}
