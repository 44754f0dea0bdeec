//! Environment variable configuration
//!
//! Provides environment variable overrides for configuration.

use std::env;

/// Environment variable prefix
pub const ENV_PREFIX: &str = "SEISMOGRAPH";

/// Set on multiprocess workers to the name of the suite they must run
pub const WORKER_ENV: &str = "SEISMOGRAPH_WORKER";

/// Configuration from environment variables
#[derive(Clone, Debug, Default)]
pub struct EnvConfig {
    /// SEISMOGRAPH_COOPERATIVE
    pub cooperative: Option<bool>,
    /// SEISMOGRAPH_THREADING
    pub threading: Option<bool>,
    /// SEISMOGRAPH_MULTIPROCESSING
    pub multiprocessing: Option<bool>,
    /// SEISMOGRAPH_WORKERS
    pub workers: Option<usize>,
    /// SEISMOGRAPH_OUTPUT
    pub output: Option<String>,
    /// SEISMOGRAPH_FORMAT
    pub format: Option<String>,
    /// SEISMOGRAPH_ROUND_RUNTIME
    pub round_runtime: Option<u32>,
    /// SEISMOGRAPH_LOG_LEVEL
    pub log_level: Option<String>,
    /// SEISMOGRAPH_CONFIG
    pub config_file: Option<String>,
    /// SEISMOGRAPH_WORKER
    pub worker_suite: Option<String>,
}

impl EnvConfig {
    /// Load configuration from the process environment
    pub fn load() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |name: &str| lookup(&format!("{ENV_PREFIX}_{name}"));
        let get_bool = |name: &str| get(name).map(|v| parse_bool(&v));

        Self {
            cooperative: get_bool("COOPERATIVE"),
            threading: get_bool("THREADING"),
            multiprocessing: get_bool("MULTIPROCESSING"),
            workers: get("WORKERS").and_then(|v| v.parse().ok()),
            output: get("OUTPUT"),
            format: get("FORMAT"),
            round_runtime: get("ROUND_RUNTIME").and_then(|v| v.parse().ok()),
            log_level: get("LOG_LEVEL"),
            config_file: get("CONFIG"),
            worker_suite: lookup(WORKER_ENV).filter(|v| !v.is_empty()),
        }
    }

    /// Check if any environment variables are set
    pub fn has_any(&self) -> bool {
        self.cooperative.is_some()
            || self.threading.is_some()
            || self.multiprocessing.is_some()
            || self.workers.is_some()
            || self.output.is_some()
            || self.format.is_some()
            || self.round_runtime.is_some()
            || self.log_level.is_some()
            || self.config_file.is_some()
            || self.worker_suite.is_some()
    }
}

fn parse_bool(value: &str) -> bool {
    matches!(
        value.to_lowercase().as_str(),
        "1" | "true" | "yes" | "on" | "enabled"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn from_pairs(pairs: &[(&str, &str)]) -> EnvConfig {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        EnvConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_env_config_default() {
        let config = EnvConfig::default();
        assert!(config.threading.is_none());
        assert!(!config.has_any());
    }

    #[test]
    fn test_env_lookup() {
        let config = from_pairs(&[
            ("SEISMOGRAPH_THREADING", "yes"),
            ("SEISMOGRAPH_MULTIPROCESSING", "0"),
            ("SEISMOGRAPH_WORKERS", "12"),
            ("SEISMOGRAPH_ROUND_RUNTIME", "not-a-number"),
        ]);

        assert_eq!(config.threading, Some(true));
        assert_eq!(config.multiprocessing, Some(false));
        assert_eq!(config.workers, Some(12));
        assert_eq!(config.round_runtime, None);
        assert!(config.has_any());
    }

    #[test]
    fn test_empty_worker_ignored() {
        let config = from_pairs(&[(WORKER_ENV, "")]);
        assert!(config.worker_suite.is_none());

        let config = from_pairs(&[(WORKER_ENV, "smoke")]);
        assert_eq!(config.worker_suite.as_deref(), Some("smoke"));
    }
}
