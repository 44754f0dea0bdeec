//! Test cases

use anyhow::Result;
use futures::future::{FutureExt, LocalBoxFuture};
use std::fmt;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use crate::context::panic_message;
use crate::error::Failure;
use crate::models::{stopped_on, CaseOutcome, Runnable, StopSlot};
use crate::utils::Timer;

pub type CaseFn = Arc<dyn Fn() -> Result<()> + Send + Sync>;
pub type AsyncCaseFn = Arc<dyn Fn() -> LocalBoxFuture<'static, Result<()>> + Send + Sync>;

#[derive(Clone)]
enum Body {
    Sync(CaseFn),
    Async(AsyncCaseFn),
}

/// A single named test body.
pub struct Case {
    name: String,
    body: Body,
    skip: Option<String>,
    slot: StopSlot,
}

impl Case {
    pub fn new(name: impl Into<String>, body: impl Fn() -> Result<()> + Send + Sync + 'static) -> Self {
        Self {
            name: name.into(),
            body: Body::Sync(Arc::new(body)),
            skip: None,
            slot: StopSlot::new(),
        }
    }

    /// Case whose body awaits; under the cooperative backend every await
    /// point lets other suites progress.
    pub fn new_async<F, Fut>(name: impl Into<String>, body: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + 'static,
    {
        Self {
            name: name.into(),
            body: Body::Async(Arc::new(move || body().boxed_local())),
            skip: None,
            slot: StopSlot::new(),
        }
    }

    pub fn skip(mut self, reason: impl Into<String>) -> Self {
        self.skip = Some(reason.into());
        self
    }

    pub fn is_async(&self) -> bool {
        matches!(self.body, Body::Async(_))
    }

    pub fn is_skipped(&self) -> bool {
        self.skip.is_some()
    }

    pub(crate) async fn execute(&self) -> CaseOutcome {
        if let Some(reason) = &self.skip {
            return CaseOutcome::skip(&self.name, reason);
        }

        let timer = Timer::start(&self.name);
        let result = match &self.body {
            Body::Sync(body) => panic::catch_unwind(AssertUnwindSafe(|| body())),
            Body::Async(body) => AssertUnwindSafe(async move { body().await })
                .catch_unwind()
                .await,
        };

        let outcome = classify(&self.name, result, timer.elapsed_secs());
        if !outcome.status.is_success() {
            stopped_on(self, "run");
        }
        outcome
    }
}

impl Runnable for Case {
    fn name(&self) -> &str {
        &self.name
    }

    fn stop_slot(&self) -> &StopSlot {
        &self.slot
    }
}

impl fmt::Debug for Case {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Case")
            .field("name", &self.name)
            .field("async", &self.is_async())
            .field("skip", &self.skip)
            .finish()
    }
}

/// Map a body result to an outcome.
///
/// `Failure` errors and panics are failures; any other error is an error.
pub(crate) fn classify(
    name: &str,
    result: std::thread::Result<Result<()>>,
    elapsed_secs: f64,
) -> CaseOutcome {
    match result {
        Ok(Ok(())) => CaseOutcome::pass(name, elapsed_secs),
        Ok(Err(err)) if err.is::<Failure>() => CaseOutcome::fail(name, elapsed_secs, err.to_string()),
        Ok(Err(err)) => CaseOutcome::error(name, elapsed_secs, format!("{err:#}")),
        Err(payload) => CaseOutcome::fail(name, elapsed_secs, panic_message(payload.as_ref())),
    }
}
