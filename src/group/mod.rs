//! Runnable groups
//!
//! A group owns a fixed set of suites and runs all of them on one
//! concurrency backend, producing exactly one outcome per member.

mod cooperative;
mod process;
mod sequential;
mod threading;

pub use cooperative::CooperativeGroup;
pub use process::{format_outcome_line, parse_outcome, ProcessGroup, WorkerCommand, OUTCOME_MARKER};
pub use sequential::SequentialGroup;
pub use threading::ThreadGroup;

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;
use tokio::runtime::Handle;

use crate::config::Config;
use crate::error::SeismographError;
use crate::layer::SuiteLayer;
use crate::models::{ResultAggregate, Runnable, StopTag, SuiteOutcome};
use crate::suite::Suite;

/// Builds a group for one run.
pub type GroupFactory = fn(Vec<Suite>, GroupOptions) -> Result<Box<dyn RunnableGroup>, SeismographError>;

pub trait RunnableGroup: Send {
    fn kind(&self) -> GroupKind;

    /// Member identities in registration order
    fn members(&self) -> Vec<&str>;

    /// Run every member to completion.
    ///
    /// The returned aggregate holds exactly one entry per member.
    fn run(self: Box<Self>) -> ResultAggregate;
}

/// Concurrency backend
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupKind {
    Sequential,
    Threading,
    Multiprocessing,
    Cooperative,
}

impl GroupKind {
    /// Backend requested by the configuration flags.
    ///
    /// Cooperative wins over threading, threading over multiprocessing.
    pub fn from_config(config: &Config) -> Self {
        if config.cooperative {
            GroupKind::Cooperative
        } else if config.threading {
            GroupKind::Threading
        } else if config.multiprocessing {
            GroupKind::Multiprocessing
        } else {
            GroupKind::Sequential
        }
    }

    pub fn factory(self) -> GroupFactory {
        match self {
            GroupKind::Sequential => SequentialGroup::build,
            GroupKind::Threading => ThreadGroup::build,
            GroupKind::Multiprocessing => ProcessGroup::build,
            GroupKind::Cooperative => CooperativeGroup::build,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            GroupKind::Sequential => "sequential",
            GroupKind::Threading => "threading",
            GroupKind::Multiprocessing => "multiprocessing",
            GroupKind::Cooperative => "cooperative",
        }
    }
}

impl fmt::Display for GroupKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Pick the group factory for a run. An explicit override always wins.
pub fn select_group(config: &Config, override_factory: Option<GroupFactory>) -> GroupFactory {
    match override_factory {
        Some(factory) => factory,
        None => GroupKind::from_config(config).factory(),
    }
}

/// Settings shared by every backend
#[derive(Clone)]
pub struct GroupOptions {
    /// Maximum concurrent worker processes
    pub workers: usize,
    /// Command re-executed for each worker process; the current executable when unset
    pub worker_command: Option<WorkerCommand>,
    /// Default suite layers applied to every member
    pub suite_layers: Vec<Arc<dyn SuiteLayer>>,
}

impl GroupOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            workers: config.workers.max(1),
            ..Self::default()
        }
    }

    pub fn with_worker_command(mut self, command: Option<WorkerCommand>) -> Self {
        self.worker_command = command;
        self
    }

    pub fn with_suite_layers(mut self, layers: Vec<Arc<dyn SuiteLayer>>) -> Self {
        self.suite_layers = layers;
        self
    }
}

impl Default for GroupOptions {
    fn default() -> Self {
        Self {
            workers: 1,
            worker_command: None,
            suite_layers: Vec::new(),
        }
    }
}

impl fmt::Debug for GroupOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GroupOptions")
            .field("workers", &self.workers)
            .field("worker_command", &self.worker_command)
            .field("suite_layers", &self.suite_layers.len())
            .finish()
    }
}

/// Run `work` somewhere a private tokio runtime may be started and blocked on.
///
/// Inside an active runtime the work moves to a scoped helper thread. A panic
/// in `work` comes back as `Err` on either path.
pub(crate) fn outside_runtime<T, F>(work: F) -> thread::Result<T>
where
    F: FnOnce() -> T + Send,
    T: Send,
{
    if Handle::try_current().is_err() {
        return panic::catch_unwind(AssertUnwindSafe(work));
    }
    thread::scope(|scope| scope.spawn(work).join())
}

/// Entry for a member whose run escaped its own error handling.
pub(crate) fn lost_member(name: &str, reason: impl Into<String>) -> SuiteOutcome {
    SuiteOutcome::crashed(name, reason).with_stopped_on(Some(StopTag {
        runnable: name.to_string(),
        phase: "run".to_string(),
    }))
}

/// Fixed membership shared by the backends. Names are unique.
pub(crate) struct Members {
    suites: Vec<Suite>,
}

impl Members {
    pub(crate) fn new(suites: Vec<Suite>) -> Result<Self, SeismographError> {
        let mut seen = HashSet::new();
        for suite in &suites {
            if !seen.insert(suite.name()) {
                return Err(SeismographError::DuplicateMember(suite.name().to_string()));
            }
        }
        Ok(Self { suites })
    }

    pub(crate) fn names(&self) -> Vec<&str> {
        self.suites.iter().map(|s| s.name()).collect()
    }

    pub(crate) fn owned_names(&self) -> Vec<String> {
        self.suites.iter().map(|s| s.name().to_string()).collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.suites.len()
    }

    pub(crate) fn iter(&self) -> std::slice::Iter<'_, Suite> {
        self.suites.iter()
    }

    pub(crate) fn into_inner(self) -> Vec<Suite> {
        self.suites
    }
}
