//! Cooperative backend
//!
//! Members are local tasks on a single-threaded runtime. A suite yields
//! between cases and at every await inside async cases; a blocking
//! synchronous case stalls every other member until it returns.

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;
use tokio::runtime::Builder;
use tokio::task::LocalSet;
use tracing::{info, warn};

use super::{lost_member, outside_runtime, GroupKind, GroupOptions, Members, RunnableGroup};
use crate::context::panic_message;
use crate::error::SeismographError;
use crate::layer::SuiteLayer;
use crate::models::{ResultAggregate, Runnable};
use crate::suite::Suite;
use crate::utils::Timer;

pub struct CooperativeGroup {
    members: Members,
    options: GroupOptions,
}

impl CooperativeGroup {
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

impl RunnableGroup for CooperativeGroup {
    fn kind(&self) -> GroupKind {
        GroupKind::Cooperative
    }

    fn members(&self) -> Vec<&str> {
        self.members.names()
    }

    fn run(self: Box<Self>) -> ResultAggregate {
        let Self { members, options } = *self;
        let names = members.owned_names();
        info!("Running {} suites as cooperative tasks", names.len());
        let timer = Timer::start("cooperative group");

        let mut aggregate = outside_runtime(move || run_tasks(members, options.suite_layers))
            .unwrap_or_else(|payload| {
                warn!("Cooperative scheduler panicked: {}", panic_message(&*payload));
                ResultAggregate::new()
            });
        aggregate.fill_missing(names.iter().map(String::as_str), "Suite task never reported");

        info!(
            "Cooperative group finished {} suites in {:.3}s",
            aggregate.len(),
            timer.elapsed_secs()
        );
        aggregate
    }
}

/// Drive every member as a local task on a private single-threaded runtime.
fn run_tasks(members: Members, suite_layers: Vec<Arc<dyn SuiteLayer>>) -> ResultAggregate {
    let runtime = match Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(e) => {
            warn!("Failed to start cooperative runtime: {}", e);
            let mut aggregate = ResultAggregate::new();
            aggregate.fill_missing(
                members.names(),
                &format!("Failed to start cooperative runtime: {e}"),
            );
            return aggregate;
        }
    };

    let aggregate = Rc::new(RefCell::new(ResultAggregate::new()));
    let defaults = Rc::new(suite_layers);
    let local = LocalSet::new();

    local.block_on(&runtime, async {
        let handles: Vec<_> = members
            .into_inner()
            .into_iter()
            .map(|suite| {
                let name = suite.name().to_string();
                let aggregate = aggregate.clone();
                let defaults = defaults.clone();
                let handle = tokio::task::spawn_local(async move {
                    let outcome = suite.execute(&defaults, true).await;
                    aggregate.borrow_mut().insert(outcome);
                });
                (name, handle)
            })
            .collect();

        for (name, handle) in handles {
            if let Err(err) = handle.await {
                let reason = if err.is_panic() {
                    let payload = err.into_panic();
                    format!("Suite task panicked: {}", panic_message(&*payload))
                } else {
                    format!("Suite task was cancelled: {err}")
                };
                warn!("Suite \"{}\" lost: {}", name, reason);
                aggregate.borrow_mut().insert(lost_member(&name, reason));
            }
        }
    });

    aggregate.take()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::group::tests::{assert_isolated, mixed_suites};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    #[test]
    fn test_cooperative_isolates_failures() {
        let aggregate = CooperativeGroup::build(mixed_suites(), GroupOptions::default())
            .unwrap()
            .run();
        assert_isolated(&aggregate);
    }

    #[tokio::test]
    async fn test_runs_inside_an_existing_runtime() {
        let suites = vec![
            Suite::new("waits").async_case("sleep", || async {
                tokio::time::sleep(Duration::from_millis(5)).await;
                anyhow::Ok(())
            }),
            Suite::new("plain").case("ok", || Ok(())),
        ];

        let aggregate = CooperativeGroup::build(suites, GroupOptions::default())
            .unwrap()
            .run();
        assert_eq!(aggregate.len(), 2);
        assert!(aggregate.outcomes().all(|o| o.status.is_success()));
    }

    #[test]
    fn test_tasks_interleave_at_awaits() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let suite = |name: &'static str| {
            let log = log.clone();
            Suite::new(name).async_case("steps", move || {
                let log = log.clone();
                async move {
                    for step in 0..2 {
                        log.lock().unwrap().push(format!("{name}{step}"));
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                    anyhow::Ok(())
                }
            })
        };

        let aggregate = CooperativeGroup::build(vec![suite("a"), suite("b")], GroupOptions::default())
            .unwrap()
            .run();
        assert_eq!(aggregate.len(), 2);

        // Both tasks started before either finished its first sleep.
        let log = log.lock().unwrap();
        assert_eq!(log.len(), 4);
        assert!(log[..2].contains(&"a0".to_string()));
        assert!(log[..2].contains(&"b0".to_string()));
    }
}
