//! Suites, cases and scripts
//!
//! A suite owns an ordered list of cases plus its own setup/teardown
//! callbacks and suite layers. Suites are what runnable groups schedule.

mod case;
mod script;

pub use case::{AsyncCaseFn, Case, CaseFn};
pub use script::Script;

use anyhow::{anyhow, Result};
use futures::future::join_all;
use std::fmt;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::chain::call_chain;
use crate::context::{panic_message, Callback};
use crate::group::outside_runtime;
use crate::layer::{suite_layer_enabled, LayerView, SuiteLayer};
use crate::models::{stopped_on, OutcomeStatus, Runnable, StopSlot, SuiteOutcome};
use crate::utils::Timer;

/// How a suite schedules its own cases.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CaseScheduling {
    /// One after another, in registration order
    #[default]
    Sequential,
    /// Every case polled together; async cases overlap at their awaits.
    /// Outcomes keep registration order.
    Concurrent,
}

/// An ordered collection of cases run as one unit.
pub struct Suite {
    name: String,
    cases: Vec<Case>,
    scheduling: CaseScheduling,
    setup_callbacks: Vec<Callback>,
    teardown_callbacks: Vec<Callback>,
    layers: Vec<Arc<dyn SuiteLayer>>,
    skip: Option<String>,
    slot: StopSlot,
}

impl Suite {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            cases: Vec::new(),
            scheduling: CaseScheduling::default(),
            setup_callbacks: Vec::new(),
            teardown_callbacks: Vec::new(),
            layers: Vec::new(),
            skip: None,
            slot: StopSlot::new(),
        }
    }

    pub fn case(self, name: impl Into<String>, body: impl Fn() -> Result<()> + Send + Sync + 'static) -> Self {
        self.with_case(Case::new(name, body))
    }

    pub fn async_case<F, Fut>(self, name: impl Into<String>, body: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + 'static,
    {
        self.with_case(Case::new_async(name, body))
    }

    pub fn with_case(mut self, case: Case) -> Self {
        self.cases.push(case);
        self
    }

    pub fn setup(mut self, callback: impl Fn() -> Result<()> + Send + Sync + 'static) -> Self {
        self.setup_callbacks.push(Box::new(callback));
        self
    }

    pub fn teardown(mut self, callback: impl Fn() -> Result<()> + Send + Sync + 'static) -> Self {
        self.teardown_callbacks.push(Box::new(callback));
        self
    }

    pub fn layer(mut self, layer: Arc<dyn SuiteLayer>) -> Self {
        self.layers.push(layer);
        self
    }

    pub fn skip(mut self, reason: impl Into<String>) -> Self {
        self.skip = Some(reason.into());
        self
    }

    pub fn schedule_cases(mut self, scheduling: CaseScheduling) -> Self {
        self.scheduling = scheduling;
        self
    }

    pub fn scheduling(&self) -> CaseScheduling {
        self.scheduling
    }

    pub fn cases(&self) -> &[Case] {
        &self.cases
    }

    pub fn has_async_cases(&self) -> bool {
        self.cases.iter().any(Case::is_async)
    }

    /// Fresh one-shot view: enabled default suite layers, then this suite's own.
    pub fn layers(&self, defaults: &[Arc<dyn SuiteLayer>]) -> LayerView<dyn SuiteLayer> {
        LayerView::new(defaults.to_vec(), self.layers.clone(), suite_layer_enabled)
    }

    /// Run the suite to completion on the calling thread.
    pub fn run(&self, defaults: &[Arc<dyn SuiteLayer>]) -> SuiteOutcome {
        if !self.has_async_cases() {
            return futures::executor::block_on(self.execute(defaults, false));
        }

        let run_async = || match tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
        {
            Ok(runtime) => runtime.block_on(self.execute(defaults, false)),
            Err(e) => SuiteOutcome::error(
                &self.name,
                0.0,
                format!("Failed to start runtime for async cases: {e}"),
            ),
        };

        outside_runtime(run_async).unwrap_or_else(|payload| panic::resume_unwind(payload))
    }

    /// Run setup, every case, then teardown.
    ///
    /// With `cooperative` set the suite yields to the scheduler before each case.
    pub(crate) async fn execute(
        &self,
        defaults: &[Arc<dyn SuiteLayer>],
        cooperative: bool,
    ) -> SuiteOutcome {
        if let Some(reason) = &self.skip {
            debug!("Suite \"{}\" skipped: {}", self.name, reason);
            return SuiteOutcome::skipped(&self.name, reason);
        }

        let timer = Timer::start(&self.name);
        debug!("Start suite \"{}\" ({} cases)", self.name, self.cases.len());

        if let Err(err) = shielded("setup", || self.start(defaults)) {
            stopped_on(self, "setup");
            self.notify_error(defaults, &err);
            return SuiteOutcome::error(
                &self.name,
                timer.elapsed_secs(),
                format!("Setup failed: {err:#}"),
            )
            .with_stopped_on(self.slot.get());
        }

        let cases = match self.scheduling {
            CaseScheduling::Sequential => {
                let mut cases = Vec::with_capacity(self.cases.len());
                for case in &self.cases {
                    if cooperative {
                        tokio::task::yield_now().await;
                    }
                    cases.push(case.execute().await);
                }
                cases
            }
            CaseScheduling::Concurrent => {
                if cooperative {
                    tokio::task::yield_now().await;
                }
                join_all(self.cases.iter().map(|case| case.execute())).await
            }
        };

        let teardown = shielded("teardown", || self.stop(defaults));
        let mut outcome = SuiteOutcome::from_cases(&self.name, cases, timer.elapsed_secs());

        if let Err(err) = teardown {
            stopped_on(self, "teardown");
            self.notify_error(defaults, &err);
            outcome.status = OutcomeStatus::Error;
            outcome.message = Some(format!("Teardown failed: {err:#}"));
        }

        debug!("Finish suite \"{}\": {}", self.name, outcome.status);
        outcome.with_stopped_on(self.slot.get())
    }

    fn start(&self, defaults: &[Arc<dyn SuiteLayer>]) -> Result<()> {
        call_chain(self.layers(defaults).map(|layer| move || layer.on_setup(self)))?;
        call_chain(self.setup_callbacks.iter().map(|callback| move || callback()))
    }

    fn stop(&self, defaults: &[Arc<dyn SuiteLayer>]) -> Result<()> {
        call_chain(self.layers(defaults).map(|layer| move || layer.on_teardown(self)))?;
        call_chain(self.teardown_callbacks.iter().map(|callback| move || callback()))
    }

    fn notify_error(&self, defaults: &[Arc<dyn SuiteLayer>], error: &anyhow::Error) {
        let notified = shielded("on_error", || {
            call_chain(
                self.layers(defaults)
                    .map(|layer| move || layer.on_error(error, self)),
            )
        });
        if let Err(hook_err) = notified {
            warn!("Suite layer on_error failed for \"{}\": {}", self.name, hook_err);
        }
    }
}

/// Run a suite phase, turning a panic into an error naming the phase.
fn shielded(phase: &str, body: impl FnOnce() -> Result<()>) -> Result<()> {
    panic::catch_unwind(AssertUnwindSafe(body)).unwrap_or_else(|payload| {
        Err(anyhow!("{} panicked: {}", phase, panic_message(payload.as_ref())))
    })
}

impl Runnable for Suite {
    fn name(&self) -> &str {
        &self.name
    }

    fn stop_slot(&self) -> &StopSlot {
        &self.slot
    }
}

impl fmt::Debug for Suite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Suite")
            .field("name", &self.name)
            .field("cases", &self.cases)
            .field("scheduling", &self.scheduling)
            .field("skip", &self.skip)
            .finish()
    }
}
