//! Scripts
//!
//! A script is a named body run once on the orchestrator thread, after the
//! program context is started and before the suite group runs.

use anyhow::Result;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tracing::info;

use super::case::{classify, CaseFn};
use crate::models::{stopped_on, Runnable, StopSlot, SuiteOutcome};
use crate::utils::Timer;

pub struct Script {
    name: String,
    body: CaseFn,
    slot: StopSlot,
}

impl Script {
    pub fn new(name: impl Into<String>, body: impl Fn() -> Result<()> + Send + Sync + 'static) -> Self {
        Self {
            name: name.into(),
            body: Arc::new(body),
            slot: StopSlot::new(),
        }
    }

    pub fn run(&self) -> SuiteOutcome {
        info!("Running script \"{}\"", self.name);
        let timer = Timer::start(&self.name);
        let result = panic::catch_unwind(AssertUnwindSafe(|| (self.body)()));
        let elapsed = timer.elapsed_secs();

        let case = classify(&self.name, result, elapsed);
        if !case.status.is_success() {
            stopped_on(self, "run");
        }

        SuiteOutcome::from_cases(&self.name, vec![case], elapsed).with_stopped_on(self.slot.get())
    }
}

impl Runnable for Script {
    fn name(&self) -> &str {
        &self.name
    }

    fn stop_slot(&self) -> &StopSlot {
        &self.slot
    }
}

impl fmt::Debug for Script {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Script").field("name", &self.name).finish()
    }
}
