//! Diagnostic logging for sonar.
//!
//! Logs go to stderr through `tracing-subscriber` so that command output on
//! stdout (including `--json`) stays machine-readable. `RUST_LOG` overrides
//! the level chosen from `-q`/`-v`.

use std::ffi::OsString;
use std::io::IsTerminal;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Logging configuration.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Minimum log level to display.
    pub level: LogLevel,
    /// Output format for log messages.
    pub format: LogFormat,
    /// Include timestamps in log output.
    pub timestamps: bool,
    /// Include target (module path) in log output.
    pub target: bool,
    /// Enable ANSI colors in output.
    pub colors: bool,
}

/// Log level configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
    Off,
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Multi-line, human-oriented.
    Pretty,
    /// Single line per event.
    Compact,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Warn,
            format: LogFormat::Compact,
            timestamps: false,
            target: false,
            colors: true,
        }
    }
}

impl LogConfig {
    /// Errors only.
    #[must_use]
    pub const fn quiet() -> Self {
        Self {
            level: LogLevel::Error,
            format: LogFormat::Compact,
            timestamps: false,
            target: false,
            colors: true,
        }
    }

    /// Debug level with timestamps and module paths.
    #[must_use]
    pub const fn verbose() -> Self {
        Self {
            level: LogLevel::Debug,
            format: LogFormat::Pretty,
            timestamps: true,
            target: true,
            colors: true,
        }
    }
}

impl LogLevel {
    const fn to_filter_string(self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Warn => "warn",
            Self::Info => "info",
            Self::Debug => "debug",
            Self::Trace => "trace",
            Self::Off => "off",
        }
    }
}

impl std::str::FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "error" | "e" => Ok(Self::Error),
            "warn" | "warning" | "w" => Ok(Self::Warn),
            "info" | "i" => Ok(Self::Info),
            "debug" | "d" => Ok(Self::Debug),
            "trace" | "t" => Ok(Self::Trace),
            "off" | "none" | "quiet" => Ok(Self::Off),
            _ => Err(format!("Invalid log level: {s}")),
        }
    }
}

fn env_filter(level: LogLevel) -> EnvFilter {
    if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        EnvFilter::new(format!("sonar={}", level.to_filter_string()))
    }
}

/// ANSI escapes only go to a terminal, and never when `NO_COLOR` is set to
/// a non-empty value.
fn ansi_allowed(no_color: Option<OsString>, is_terminal: bool) -> bool {
    is_terminal && no_color.is_none_or(|v| v.is_empty())
}

/// Install the global subscriber. Later calls are ignored.
pub fn init_logging(config: &LogConfig) {
    let filter = env_filter(config.level);
    let ansi = config.colors
        && ansi_allowed(std::env::var_os("NO_COLOR"), std::io::stderr().is_terminal());
    let layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(ansi)
        .with_target(config.target);

    match (config.format, config.timestamps) {
        (LogFormat::Pretty, true) => tracing_subscriber::registry()
            .with(filter)
            .with(layer.pretty())
            .try_init()
            .ok(),
        (LogFormat::Pretty, false) => tracing_subscriber::registry()
            .with(filter)
            .with(layer.pretty().without_time())
            .try_init()
            .ok(),
        (LogFormat::Compact, true) => tracing_subscriber::registry()
            .with(filter)
            .with(layer.compact())
            .try_init()
            .ok(),
        (LogFormat::Compact, false) => tracing_subscriber::registry()
            .with(filter)
            .with(layer.compact().without_time())
            .try_init()
            .ok(),
    };
}

/// Initialize logging with defaults suitable for CLI use.
pub fn init_cli_logging(quiet: bool, verbose: bool) {
    let config = if quiet {
        LogConfig::quiet()
    } else if verbose {
        LogConfig::verbose()
    } else {
        LogConfig::default()
    };
    init_logging(&config);
}

/// Logs the start, duration and outcome of an operation.
pub struct OperationGuard {
    name: &'static str,
    start: std::time::Instant,
}

impl OperationGuard {
    pub fn new(name: &'static str) -> Self {
        tracing::info!(operation = name, "Starting operation");
        Self {
            name,
            start: std::time::Instant::now(),
        }
    }

    pub fn complete(self) {
        tracing::info!(
            operation = self.name,
            duration_ms = self.start.elapsed().as_millis(),
            "Operation completed"
        );
    }

    /// Record a failure. The caller reports the error to the user, so this
    /// stays below the default CLI level.
    pub fn fail(self, error: &dyn std::error::Error) {
        tracing::debug!(
            operation = self.name,
            duration_ms = self.start.elapsed().as_millis(),
            error = %error,
            "Operation failed"
        );
    }

    /// Log the outcome of `result` and hand it back.
    pub fn finish<T, E: std::error::Error>(self, result: Result<T, E>) -> Result<T, E> {
        match &result {
            Ok(_) => self.complete(),
            Err(e) => self.fail(e),
        }
        result
    }
}
