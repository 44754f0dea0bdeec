//! Sequential backend

use std::panic::{self, AssertUnwindSafe};
use tracing::info;

use super::{lost_member, GroupKind, GroupOptions, Members, RunnableGroup};
use crate::context::panic_message;
use crate::error::SeismographError;
use crate::models::{stopped_on, ResultAggregate, Runnable};
use crate::suite::Suite;
use crate::utils::Timer;

/// Runs members one at a time, in registration order, on the calling thread.
pub struct SequentialGroup {
    members: Members,
    options: GroupOptions,
}

impl SequentialGroup {
    pub fn new(suites: Vec<Suite>, options: GroupOptions) -> Result<Self, SeismographError> {
        Ok(Self {
            members: Members::new(suites)?,
            options,
        })
    }

    pub fn build(
        suites: Vec<Suite>,
        options: GroupOptions,
    ) -> Result<Box<dyn RunnableGroup>, SeismographError> {
        Ok(Box::new(Self::new(suites, options)?))
    }
}

impl RunnableGroup for SequentialGroup {
    fn kind(&self) -> GroupKind {
        GroupKind::Sequential
    }

    fn members(&self) -> Vec<&str> {
        self.members.names()
    }

    fn run(self: Box<Self>) -> ResultAggregate {
        info!("Running {} suites sequentially", self.members.len());
        let timer = Timer::start("sequential group");
        let defaults = &self.options.suite_layers;
        let mut aggregate = ResultAggregate::new();

        for suite in self.members.iter() {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| suite.run(defaults)))
                .unwrap_or_else(|payload| {
                    stopped_on(suite, "run");
                    lost_member(
                        suite.name(),
                        format!("Suite panicked: {}", panic_message(&*payload)),
                    )
                });
            aggregate.insert(outcome);
        }

        info!(
            "Sequential group finished {} suites in {:.3}s",
            aggregate.len(),
            timer.elapsed_secs()
        );
        aggregate
    }
}
