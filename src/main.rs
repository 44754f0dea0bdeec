//! Seismograph - test execution orchestrator
//!
//! Command-line entry point with a small built-in suite catalog.
//!
//! ## Usage
//!
//! ```bash
//! # Run the demo module sequentially
//! seismograph --module demo
//!
//! # Run it on threads, or in 4 worker processes
//! seismograph --module demo --threading
//! seismograph --module demo --multiprocessing --workers 4
//!
//! # Cooperative tasks, JSON report to a file
//! seismograph --module demo --gevent --format json --output report.json
//!
//! # Suites selected by a manifest
//! seismograph --path suites.yaml
//! ```

use anyhow::Result;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use seismograph::config::EnvConfig;
use seismograph::ensure_that;
use seismograph::utils::{init_logger, LogLevel};
use seismograph::{Case, Config, Layer, LayerRegistry, Program, Runnable, SuiteCatalog, Suite};

/// Logs every lifecycle phase at info level
struct PhaseLogger;

impl Layer for PhaseLogger {
    fn on_init(&self, program: &dyn Runnable) -> Result<()> {
        info!("Program \"{}\" initialized", program.name());
        Ok(())
    }

    fn on_config(&self, program: &dyn Runnable, config: &Config) -> Result<()> {
        info!(
            "Program \"{}\" configured (format: {}, workers: {})",
            program.name(),
            config.format,
            config.workers
        );
        Ok(())
    }

    fn on_setup(&self, program: &dyn Runnable) -> Result<()> {
        info!("Program \"{}\" context started", program.name());
        Ok(())
    }

    fn on_teardown(&self, program: &dyn Runnable) -> Result<()> {
        info!("Program \"{}\" context stopped", program.name());
        Ok(())
    }
}

fn arithmetic() -> Suite {
    Suite::new("arithmetic")
        .case("addition", || {
            ensure_that!(2 + 2 == 4, "2 + 2 should be 4");
            Ok(())
        })
        .case("overflow_checked", || {
            ensure_that!(u8::MAX.checked_add(1).is_none(), "u8 overflow not detected");
            Ok(())
        })
}

fn text() -> Suite {
    Suite::new("text")
        .case("uppercase", || {
            ensure_that!("seismo".to_uppercase() == "SEISMO", "uppercase mismatch");
            Ok(())
        })
        .with_case(Case::new("unicode_width", || Ok(())).skip("needs terminal width data"))
}

fn timers() -> Suite {
    Suite::new("timers").async_case("sleep_resolves", || async {
        let start = std::time::Instant::now();
        tokio::time::sleep(Duration::from_millis(20)).await;
        ensure_that!(start.elapsed() >= Duration::from_millis(20), "woke up early");
        anyhow::Ok(())
    })
}

fn catalog() -> SuiteCatalog {
    SuiteCatalog::new()
        .register("demo", arithmetic)
        .register("demo", text)
        .register("demo", timers)
}

/// `--log-level` is needed before the full option parser exists.
fn early_log_level(env: &EnvConfig) -> LogLevel {
    let args: Vec<String> = std::env::args().collect();
    args.iter()
        .position(|a| a == "--log-level")
        .and_then(|i| args.get(i + 1).cloned())
        .or_else(|| env.log_level.clone())
        .and_then(|level| LogLevel::parse(&level))
        .unwrap_or_default()
}

fn main() -> ExitCode {
    let env = EnvConfig::load();
    init_logger(early_log_level(&env));

    let registry = LayerRegistry::shared();
    registry.add_layer(Arc::new(PhaseLogger));

    let mut program = Program::new("seismograph", registry).with_loader(Arc::new(catalog()));

    match program.run_with_env(std::env::args_os(), &env) {
        Ok(report) if report.is_success() => ExitCode::SUCCESS,
        Ok(_) => ExitCode::from(1),
        Err(err) => {
            if let Some(clap_err) = err.downcast_ref::<clap::Error>() {
                clap_err.exit();
            }
            eprintln!("Error: {err:#}");
            ExitCode::from(2)
        }
    }
}
