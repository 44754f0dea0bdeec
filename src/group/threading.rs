//! Threaded backend

use std::sync::{Mutex, PoisonError};
use std::thread;
use tracing::{info, warn};

use super::{lost_member, GroupKind, GroupOptions, Members, RunnableGroup};
use crate::context::panic_message;
use crate::error::SeismographError;
use crate::models::{ResultAggregate, Runnable};
use crate::suite::Suite;
use crate::utils::Timer;

/// Runs every member on its own OS thread.
pub struct ThreadGroup {
    members: Members,
    options: GroupOptions,
}

impl ThreadGroup {
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

impl RunnableGroup for ThreadGroup {
    fn kind(&self) -> GroupKind {
        GroupKind::Threading
    }

    fn members(&self) -> Vec<&str> {
        self.members.names()
    }

    fn run(self: Box<Self>) -> ResultAggregate {
        info!("Running {} suites on threads", self.members.len());
        let timer = Timer::start("thread group");
        let defaults = &self.options.suite_layers;
        let aggregate = Mutex::new(ResultAggregate::new());

        thread::scope(|scope| {
            let handles: Vec<_> = self
                .members
                .iter()
                .map(|suite| {
                    let aggregate = &aggregate;
                    let handle = thread::Builder::new()
                        .name(format!("suite-{}", suite.name()))
                        .spawn_scoped(scope, move || {
                            let outcome = suite.run(defaults);
                            aggregate
                                .lock()
                                .unwrap_or_else(PoisonError::into_inner)
                                .insert(outcome);
                        });
                    (suite.name(), handle)
                })
                .collect();

            for (name, handle) in handles {
                let crash = match handle {
                    Ok(handle) => match handle.join() {
                        Ok(()) => continue,
                        Err(payload) => format!("Suite thread panicked: {}", panic_message(&*payload)),
                    },
                    Err(e) => format!("Failed to spawn suite thread: {e}"),
                };
                warn!("Suite \"{}\" lost: {}", name, crash);
                aggregate
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .insert(lost_member(name, crash));
            }
        });

        let mut aggregate = aggregate.into_inner().unwrap_or_else(PoisonError::into_inner);
        aggregate.fill_missing(self.members.names(), "Suite thread never reported");

        info!(
            "Thread group finished {} suites in {:.3}s",
            aggregate.len(),
            timer.elapsed_secs()
        );
        aggregate
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::group::tests::{assert_isolated, mixed_suites};
    use std::sync::{Arc, Barrier};

    #[test]
    fn test_threads_isolate_failures() {
        let aggregate = ThreadGroup::build(mixed_suites(), GroupOptions::default())
            .unwrap()
            .run();
        assert_isolated(&aggregate);
    }

    #[test]
    fn test_members_run_concurrently() {
        // Each suite waits for all others; only completes if they overlap.
        let barrier = Arc::new(Barrier::new(4));
        let suites = (0..4)
            .map(|i| {
                let barrier = barrier.clone();
                Suite::new(format!("s{i}")).case("meet", move || {
                    barrier.wait();
                    Ok(())
                })
            })
            .collect();

        let aggregate = ThreadGroup::build(suites, GroupOptions::default())
            .unwrap()
            .run();
        assert_eq!(aggregate.len(), 4);
        assert!(aggregate.outcomes().all(|o| o.status.is_success()));
    }
}
