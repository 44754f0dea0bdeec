//! Configuration module
//!
//! Merges defaults, an optional config file, `SEISMOGRAPH_*` environment
//! variables and command-line flags into one read-only [`Config`].

mod env;
mod file;

pub use env::{EnvConfig, ENV_PREFIX, WORKER_ENV};
pub use file::{expand_path, find_config_file, is_yaml_file};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::cli::Args;
use crate::error::SeismographError;
use crate::utils::LogLevel;

/// Default decimal places for reported runtimes
pub const DEFAULT_ROUND_RUNTIME: u32 = 5;

/// Run configuration consumed by the program driver and the group selector
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Run suites as cooperative tasks on one thread
    #[serde(alias = "gevent")]
    pub cooperative: bool,

    /// Run suites on OS threads
    pub threading: bool,

    /// Run suites in worker processes
    pub multiprocessing: bool,

    /// Maximum concurrent worker processes
    pub workers: usize,

    /// Output target for the report; stdout when unset
    pub output: Option<PathBuf>,

    /// Report format (table, json, json-pretty, csv, summary)
    pub format: String,

    /// Decimal places used when presenting runtimes
    pub round_runtime: u32,

    /// Suite module to load
    pub module: Option<String>,

    /// Suite manifest to load
    pub path: Option<PathBuf>,

    pub log_level: LogLevel,

    pub no_color: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cooperative: false,
            threading: false,
            multiprocessing: false,
            workers: default_workers(),
            output: None,
            format: "table".to_string(),
            round_runtime: DEFAULT_ROUND_RUNTIME,
            module: None,
            path: None,
            log_level: LogLevel::default(),
            no_color: false,
        }
    }
}

impl Config {
    /// Load configuration from a YAML or JSON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Self = if is_yaml_file(path) {
            serde_yaml::from_str(&content)
                .with_context(|| format!("Failed to parse YAML config: {}", path.display()))?
        } else {
            serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse JSON config: {}", path.display()))?
        };

        config.validate()?;
        Ok(config)
    }

    /// Resolve the effective configuration: defaults < file < environment < flags
    pub fn resolve(args: &Args, env: &EnvConfig) -> Result<Self> {
        let file = args
            .config
            .clone()
            .or_else(|| env.config_file.as_deref().map(expand_path))
            .or_else(find_config_file);

        let mut config = match file {
            Some(path) => Self::load(&path)?,
            None => Self::default(),
        };

        config.apply_env(env);
        config.apply_args(args);
        config.validate()?;
        Ok(config)
    }

    pub fn apply_env(&mut self, env: &EnvConfig) {
        if let Some(v) = env.cooperative {
            self.cooperative = v;
        }
        if let Some(v) = env.threading {
            self.threading = v;
        }
        if let Some(v) = env.multiprocessing {
            self.multiprocessing = v;
        }
        if let Some(v) = env.workers {
            self.workers = v;
        }
        if let Some(v) = &env.output {
            self.output = Some(PathBuf::from(v));
        }
        if let Some(v) = &env.format {
            self.format = v.clone();
        }
        if let Some(v) = env.round_runtime {
            self.round_runtime = v;
        }
        if let Some(level) = env.log_level.as_deref().and_then(LogLevel::parse) {
            self.log_level = level;
        }
    }

    pub fn apply_args(&mut self, args: &Args) {
        self.cooperative |= args.cooperative;
        self.threading |= args.threading;
        self.multiprocessing |= args.multiprocessing;
        self.no_color |= args.no_color;

        if let Some(v) = args.workers {
            self.workers = v;
        }
        if let Some(v) = &args.output {
            self.output = Some(v.clone());
        }
        if let Some(v) = &args.format {
            self.format = v.clone();
        }
        if let Some(v) = args.round_runtime {
            self.round_runtime = v;
        }
        if let Some(v) = &args.module {
            self.module = Some(v.clone());
        }
        if let Some(v) = &args.path {
            self.path = Some(v.clone());
        }
        if let Some(level) = args.log_level.as_deref().and_then(LogLevel::parse) {
            self.log_level = level;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            return Err(SeismographError::Config("workers must be at least 1".to_string()).into());
        }
        if self.round_runtime > 9 {
            return Err(SeismographError::Config(format!(
                "round_runtime must be between 0 and 9, got {}",
                self.round_runtime
            ))
            .into());
        }
        Ok(())
    }
}

fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}
