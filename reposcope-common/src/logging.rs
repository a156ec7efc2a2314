//! Tracing subscriber setup shared by the CLI and tests.
//!
//! The level comes from the loaded `[general]` section (file value or
//! `REPOSCOPE_LOG_LEVEL`), the format from `REPOSCOPE_LOG_FORMAT`.

use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use crate::config::GeneralConfig;

/// Output format for log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    pub level: String,
    pub format: LogFormat,
    /// Write to stderr instead of stdout (keeps stdout clean for JSON output).
    pub stderr: bool,
}

impl LogConfig {
    /// Level from a loaded `[general]` section, falling back to `warn` when
    /// blank.
    pub fn from_config(general: &GeneralConfig) -> Self {
        Self::from_config_lookup(general, |name| std::env::var(name).ok())
    }

    pub(crate) fn from_config_lookup(
        general: &GeneralConfig,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Self {
        let level = match general.log_level.trim() {
            "" => "warn".to_string(),
            level => level.to_string(),
        };
        Self {
            level,
            format: format_from(&lookup),
            stderr: false,
        }
    }

    pub fn with_stderr(mut self) -> Self {
        self.stderr = true;
        self
    }

    pub fn with_level(mut self, level: &str) -> Self {
        self.level = level.to_string();
        self
    }

    fn filter(&self) -> EnvFilter {
        EnvFilter::try_new(&self.level).unwrap_or_else(|_| EnvFilter::new("info"))
    }
}

fn format_from(lookup: &impl Fn(&str) -> Option<String>) -> LogFormat {
    match lookup("REPOSCOPE_LOG_FORMAT").as_deref().map(str::trim) {
        Some(f) if f.eq_ignore_ascii_case("json") => LogFormat::Json,
        _ => LogFormat::Pretty,
    }
}

/// Install the global subscriber.
///
/// Returns `false` when a subscriber was already installed; the existing one
/// stays in place.
pub fn init_logging(config: &LogConfig) -> bool {
    let registry = tracing_subscriber::registry().with(config.filter());
    let result = match (config.format, config.stderr) {
        (LogFormat::Json, true) => registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init(),
        (LogFormat::Json, false) => registry.with(fmt::layer().json()).try_init(),
        (LogFormat::Pretty, true) => registry
            .with(fmt::layer().with_writer(std::io::stderr))
            .try_init(),
        (LogFormat::Pretty, false) => registry.with(fmt::layer()).try_init(),
    };
    result.is_ok()
}
