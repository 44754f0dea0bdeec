//! Lifecycle layers
//!
//! Layers are observers that take part in every lifecycle phase of a program
//! (or of a suite). Each layer carries an enabled switch; disabled layers are
//! filtered out of the effective sequence but stay registered.

mod registry;

pub use registry::{LayerRegistry, LayerView};
pub(crate) use registry::{layer_enabled, suite_layer_enabled};

use anyhow::Result;
use clap::Command;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::config::Config;
use crate::models::Runnable;
use crate::program::RunReport;
use crate::suite::Suite;

/// Observer of program lifecycle phases.
///
/// Every hook defaults to a no-op so implementors only override what they need.
/// A hook returning `Err` stops its chain and fails the phase.
pub trait Layer: Send + Sync {
    fn enabled(&self) -> bool {
        true
    }

    fn on_init(&self, _program: &dyn Runnable) -> Result<()> {
        Ok(())
    }

    /// Called once the option parser is built and before arguments are parsed.
    fn on_option_parser(&self, _parser: &mut Command) -> Result<()> {
        Ok(())
    }

    fn on_config(&self, _program: &dyn Runnable, _config: &Config) -> Result<()> {
        Ok(())
    }

    fn on_setup(&self, _program: &dyn Runnable) -> Result<()> {
        Ok(())
    }

    fn on_teardown(&self, _program: &dyn Runnable) -> Result<()> {
        Ok(())
    }

    fn on_run(&self, _program: &dyn Runnable) -> Result<()> {
        Ok(())
    }

    /// Called when a phase fails; the in-progress report may be annotated.
    fn on_error(
        &self,
        _error: &anyhow::Error,
        _program: &dyn Runnable,
        _result: &mut RunReport,
    ) -> Result<()> {
        Ok(())
    }
}

/// Observer of suite lifecycle phases, run inside whichever worker executes the suite.
pub trait SuiteLayer: Send + Sync {
    fn enabled(&self) -> bool {
        true
    }

    fn on_setup(&self, _suite: &Suite) -> Result<()> {
        Ok(())
    }

    fn on_teardown(&self, _suite: &Suite) -> Result<()> {
        Ok(())
    }

    fn on_error(&self, _error: &anyhow::Error, _suite: &Suite) -> Result<()> {
        Ok(())
    }
}

/// Wraps a layer with a runtime on/off switch.
#[derive(Debug)]
pub struct Toggle<L> {
    inner: L,
    on: AtomicBool,
}

impl<L> Toggle<L> {
    pub fn new(inner: L) -> Self {
        Self {
            inner,
            on: AtomicBool::new(true),
        }
    }

    pub fn disabled(inner: L) -> Self {
        Self {
            inner,
            on: AtomicBool::new(false),
        }
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.on.store(enabled, Ordering::SeqCst);
    }

    pub fn is_enabled(&self) -> bool {
        self.on.load(Ordering::SeqCst)
    }

    pub fn inner(&self) -> &L {
        &self.inner
    }
}

impl<L: Layer> Layer for Toggle<L> {
    fn enabled(&self) -> bool {
        self.is_enabled() && self.inner.enabled()
    }

    fn on_init(&self, program: &dyn Runnable) -> Result<()> {
        self.inner.on_init(program)
    }

    fn on_option_parser(&self, parser: &mut Command) -> Result<()> {
        self.inner.on_option_parser(parser)
    }

    fn on_config(&self, program: &dyn Runnable, config: &Config) -> Result<()> {
        self.inner.on_config(program, config)
    }

    fn on_setup(&self, program: &dyn Runnable) -> Result<()> {
        self.inner.on_setup(program)
    }

    fn on_teardown(&self, program: &dyn Runnable) -> Result<()> {
        self.inner.on_teardown(program)
    }

    fn on_run(&self, program: &dyn Runnable) -> Result<()> {
        self.inner.on_run(program)
    }

    fn on_error(
        &self,
        error: &anyhow::Error,
        program: &dyn Runnable,
        result: &mut RunReport,
    ) -> Result<()> {
        self.inner.on_error(error, program, result)
    }
}

impl<L: SuiteLayer> SuiteLayer for Toggle<L> {
    fn enabled(&self) -> bool {
        self.is_enabled() && self.inner.enabled()
    }

    fn on_setup(&self, suite: &Suite) -> Result<()> {
        self.inner.on_setup(suite)
    }

    fn on_teardown(&self, suite: &Suite) -> Result<()> {
        self.inner.on_teardown(suite)
    }

    fn on_error(&self, error: &anyhow::Error, suite: &Suite) -> Result<()> {
        self.inner.on_error(error, suite)
    }
}
