//! Logging setup
//!
//! Everything goes to stderr: worker processes report their outcome on
//! stdout, so stdout must stay free of log lines.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt as log_fmt, reload, EnvFilter, Registry};

/// Overrides the computed filter when set, e.g. `seismograph=trace,tokio=debug`
pub const LOG_FILTER_ENV: &str = "SEISMOGRAPH_LOG";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    #[default]
    Warn,
    Error,
    Off,
}

impl LogLevel {
    /// Parse a level name, case-insensitively. `warning` and `none` are accepted too.
    pub fn parse(name: &str) -> Option<Self> {
        let level = match name.trim().to_ascii_lowercase().as_str() {
            "trace" => LogLevel::Trace,
            "debug" => LogLevel::Debug,
            "info" => LogLevel::Info,
            "warn" | "warning" => LogLevel::Warn,
            "error" => LogLevel::Error,
            "off" | "none" => LogLevel::Off,
            _ => return None,
        };
        Some(level)
    }

    fn filter(self) -> LevelFilter {
        match self {
            LogLevel::Trace => LevelFilter::TRACE,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Error => LevelFilter::ERROR,
            LogLevel::Off => LevelFilter::OFF,
        }
    }

    /// Filter directive scoping the level to this crate.
    pub fn directive(self) -> String {
        format!("seismograph={}", self.filter())
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.filter())
    }
}

static FILTER: OnceLock<reload::Handle<EnvFilter, Registry>> = OnceLock::new();

/// Install the global subscriber. Later calls are no-ops.
///
/// The level can still be changed afterwards with [`set_log_level`], once
/// the configuration file has been read.
pub fn init_logger(level: LogLevel) {
    let filter = EnvFilter::try_from_env(LOG_FILTER_ENV)
        .unwrap_or_else(|_| EnvFilter::new(level.directive()));
    let (filter, handle) = reload::Layer::new(filter);

    let installed = tracing_subscriber::registry()
        .with(filter)
        .with(
            log_fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr)
                .compact(),
        )
        .try_init();

    if installed.is_ok() {
        let _ = FILTER.set(handle);
    }
}

/// Switch the installed logger to `level`.
///
/// Returns false when no logger was installed by [`init_logger`] or when
/// `SEISMOGRAPH_LOG` pins the filter.
pub fn set_log_level(level: LogLevel) -> bool {
    if std::env::var_os(LOG_FILTER_ENV).is_some() {
        return false;
    }
    match FILTER.get() {
        Some(handle) => handle.reload(EnvFilter::new(level.directive())).is_ok(),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_levels() {
        assert_eq!(LogLevel::parse("info"), Some(LogLevel::Info));
        assert_eq!(LogLevel::parse(" DEBUG "), Some(LogLevel::Debug));
        assert_eq!(LogLevel::parse("warning"), Some(LogLevel::Warn));
        assert_eq!(LogLevel::parse("none"), Some(LogLevel::Off));
        assert_eq!(LogLevel::parse("loud"), None);
    }

    #[test]
    fn test_directive() {
        assert_eq!(LogLevel::Debug.directive(), "seismograph=debug");
        assert_eq!(LogLevel::Off.directive(), "seismograph=off");
        assert!(LogLevel::Error > LogLevel::Info);
    }

    #[test]
    fn test_init_logger_twice_then_reload() {
        init_logger(LogLevel::Debug);
        init_logger(LogLevel::Info);

        if std::env::var_os(LOG_FILTER_ENV).is_none() {
            assert!(set_log_level(LogLevel::Trace));
            assert!(set_log_level(LogLevel::Warn));
        }
    }
}
