//! Logging setup.
//!
//! Read straight from the environment so it can run before `Settings` load
//! (a configuration error should still be logged properly).
//! `RUST_LOG` wins over `LOG_LEVEL`.

use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl LogFormat {
    /// Unknown values fall back to text.
    pub fn parse(value: &str) -> Self {
        if value.trim().eq_ignore_ascii_case("json") {
            LogFormat::Json
        } else {
            LogFormat::Text
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogSettings {
    /// `RUST_LOG`-style directive.
    pub directive: String,
    pub format: LogFormat,
}

impl LogSettings {
    pub fn from_env() -> Self {
        Self::from_vars(
            std::env::var("RUST_LOG").ok(),
            std::env::var("LOG_LEVEL").ok(),
            std::env::var("LOG_FORMAT").ok(),
        )
    }

    fn from_vars(rust_log: Option<String>, level: Option<String>, format: Option<String>) -> Self {
        let non_empty = |v: Option<String>| v.filter(|s| !s.trim().is_empty());
        let directive = non_empty(rust_log)
            .or_else(|| non_empty(level).map(|l| l.trim().to_ascii_lowercase()))
            .unwrap_or_else(|| "info".to_string());
        Self {
            directive,
            format: format.as_deref().map(LogFormat::parse).unwrap_or_default(),
        }
    }

    fn filter(&self) -> EnvFilter {
        EnvFilter::try_new(&self.directive).unwrap_or_else(|_| EnvFilter::new("info"))
    }
}

/// Install the global subscriber. Fails if one is already installed.
pub fn init_tracing(settings: &LogSettings) -> Result<(), TryInitError> {
    let registry = tracing_subscriber::registry().with(settings.filter());
    match settings.format {
        LogFormat::Text => registry.with(fmt::layer().with_target(false)).try_init(),
        LogFormat::Json => registry
            .with(fmt::layer().json().with_current_span(true))
            .try_init(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rust_log_overrides_log_level() {
        let s = LogSettings::from_vars(Some("bkpnsync=debug".into()), Some("WARN".into()), None);
        assert_eq!(s.directive, "bkpnsync=debug");
        assert_eq!(s.format, LogFormat::Text);
    }

    #[test]
    fn log_level_is_lowercased_and_defaults_to_info() {
        let s = LogSettings::from_vars(None, Some("WARN".into()), Some("json".into()));
        assert_eq!(s.directive, "warn");
        assert_eq!(s.format, LogFormat::Json);

        let s = LogSettings::from_vars(Some(" ".into()), None, Some("yaml".into()));
        assert_eq!(s.directive, "info");
        assert_eq!(s.format, LogFormat::Text);
    }
}
