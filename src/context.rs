//! Program context
//!
//! Drives the program lifecycle: every phase composes the enabled layers'
//! hooks (defaults first, then custom layers) and, for start/stop, the
//! context's own setup/teardown callbacks. Failures are logged, tagged on the
//! program via [`stopped_on`], and handed back to the caller unchanged.

use anyhow::Result;
use clap::Command;
use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tracing::debug;

use crate::chain::{ChainRunner, SerialChain};
use crate::config::Config;
use crate::layer::{layer_enabled, Layer, LayerRegistry, LayerView};
use crate::models::{stopped_on, Runnable};
use crate::program::RunReport;

/// User setup/teardown callback.
pub type Callback = Box<dyn Fn() -> Result<()> + Send + Sync>;

/// Lifecycle phases of a program.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Phase {
    Init,
    OptionParser,
    Config,
    StartContext,
    Run,
    StopContext,
    Error,
}

impl Phase {
    /// Name recorded in failure tags.
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Init => "on_init",
            Phase::OptionParser => "on_option_parser",
            Phase::Config => "on_config",
            Phase::StartContext => "start_context",
            Phase::Run => "on_run",
            Phase::StopContext => "stop_context",
            Phase::Error => "on_error",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle state machine of one program.
pub struct ProgramContext<C = SerialChain> {
    setup_callbacks: Vec<Callback>,
    teardown_callbacks: Vec<Callback>,
    layers: Vec<Arc<dyn Layer>>,
    defaults: Arc<LayerRegistry>,
    chain: C,
}

impl ProgramContext<SerialChain> {
    pub fn new(defaults: Arc<LayerRegistry>) -> Self {
        Self::with_chain(defaults, SerialChain)
    }
}

impl<C: ChainRunner> ProgramContext<C> {
    /// Create a context that drives its chains through `chain`.
    pub fn with_chain(defaults: Arc<LayerRegistry>, chain: C) -> Self {
        Self {
            setup_callbacks: Vec::new(),
            teardown_callbacks: Vec::new(),
            layers: Vec::new(),
            defaults,
            chain,
        }
    }

    pub fn add_setup(&mut self, callback: impl Fn() -> Result<()> + Send + Sync + 'static) {
        self.setup_callbacks.push(Box::new(callback));
    }

    pub fn add_teardown(&mut self, callback: impl Fn() -> Result<()> + Send + Sync + 'static) {
        self.teardown_callbacks.push(Box::new(callback));
    }

    /// Append custom layers; they run after the defaults, in this order.
    pub fn add_layers(&mut self, layers: impl IntoIterator<Item = Arc<dyn Layer>>) {
        self.layers.extend(layers);
    }

    pub fn setup_callbacks(&self) -> &[Callback] {
        &self.setup_callbacks
    }

    pub fn teardown_callbacks(&self) -> &[Callback] {
        &self.teardown_callbacks
    }

    pub fn custom_layers(&self) -> &[Arc<dyn Layer>] {
        &self.layers
    }

    pub fn chain(&self) -> &C {
        &self.chain
    }

    /// Fresh one-shot view of the effective layer sequence.
    pub fn layers(&self) -> LayerView<dyn Layer> {
        LayerView::new(
            self.defaults.program_layers(),
            self.layers.clone(),
            layer_enabled,
        )
    }

    pub fn on_init(&self, program: &dyn Runnable) -> Result<()> {
        debug!(
            "Call to chain callbacks \"on_init\" of program \"{}\"",
            program.name()
        );
        guarded(Phase::Init, Some(program), || {
            self.chain
                .run(self.layers().map(|layer| move || layer.on_init(program)))
        })
    }

    /// No program exists yet when the parser is built, so nothing is tagged.
    pub fn on_option_parser(&self, parser: &mut Command) -> Result<()> {
        debug!("Call to chain callbacks \"on_option_parser\" of program");
        let parser = &RefCell::new(parser);
        guarded(Phase::OptionParser, None, || {
            self.chain.run(self.layers().map(|layer| {
                move || {
                    let mut parser = parser.borrow_mut();
                    layer.on_option_parser(&mut **parser)
                }
            }))
        })
    }

    pub fn on_config(&self, program: &dyn Runnable, config: &Config) -> Result<()> {
        debug!(
            "Call to chain callbacks \"on_config\" of program \"{}\"",
            program.name()
        );
        guarded(Phase::Config, Some(program), || {
            self.chain.run(
                self.layers()
                    .map(|layer| move || layer.on_config(program, config)),
            )
        })
    }

    /// Layer setup hooks first, then the setup callbacks.
    pub fn start_context(&self, program: &dyn Runnable) -> Result<()> {
        debug!("Start context of program \"{}\"", program.name());
        guarded(Phase::StartContext, Some(program), || {
            self.chain
                .run(self.layers().map(|layer| move || layer.on_setup(program)))?;
            self.chain
                .run(self.setup_callbacks.iter().map(|callback| move || callback()))
        })
    }

    /// Layer teardown hooks first, then the teardown callbacks.
    pub fn stop_context(&self, program: &dyn Runnable) -> Result<()> {
        debug!("Stop context of program \"{}\"", program.name());
        guarded(Phase::StopContext, Some(program), || {
            self.chain
                .run(self.layers().map(|layer| move || layer.on_teardown(program)))?;
            self.chain.run(
                self.teardown_callbacks
                    .iter()
                    .map(|callback| move || callback()),
            )
        })
    }

    pub fn on_run(&self, program: &dyn Runnable) -> Result<()> {
        debug!(
            "Call to chain callbacks \"on_run\" of program \"{}\"",
            program.name()
        );
        guarded(Phase::Run, Some(program), || {
            self.chain
                .run(self.layers().map(|layer| move || layer.on_run(program)))
        })
    }

    pub fn on_error(
        &self,
        error: &anyhow::Error,
        program: &dyn Runnable,
        result: &mut RunReport,
    ) -> Result<()> {
        debug!(
            "Call to chain callbacks \"on_error\" of program \"{}\"",
            program.name()
        );
        let result = &RefCell::new(result);
        guarded(Phase::Error, Some(program), || {
            self.chain.run(self.layers().map(|layer| {
                move || {
                    let mut result = result.borrow_mut();
                    layer.on_error(error, program, &mut **result)
                }
            }))
        })
    }
}

/// Run one phase body, tagging and forwarding any failure.
///
/// Errors come back unchanged; panics are resumed with their original payload.
fn guarded<F>(phase: Phase, program: Option<&dyn Runnable>, body: F) -> Result<()>
where
    F: FnOnce() -> Result<()>,
{
    match panic::catch_unwind(AssertUnwindSafe(body)) {
        Ok(Ok(())) => Ok(()),
        Ok(Err(err)) => {
            record_failure(phase, program, &err.to_string());
            Err(err)
        }
        Err(payload) => {
            record_failure(phase, program, panic_message(payload.as_ref()));
            panic::resume_unwind(payload)
        }
    }
}

fn record_failure(phase: Phase, program: Option<&dyn Runnable>, reason: &str) {
    match program {
        Some(program) => {
            debug!(
                "Phase \"{}\" of program \"{}\" failed: {}",
                phase,
                program.name(),
                reason
            );
            stopped_on(program, phase.as_str());
        }
        None => debug!("Phase \"{}\" of program failed: {}", phase, reason),
    }
}

/// Best-effort text of a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "panic with non-string payload"
    }
}
