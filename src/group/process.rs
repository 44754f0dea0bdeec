//! Multiprocess backend
//!
//! Each member runs in a child process started from a [`WorkerCommand`]
//! with `SEISMOGRAPH_WORKER` naming the suite. The child reports its
//! outcome as one marked JSON line on stdout; the parent assembles the
//! aggregate from those lines.

use anyhow::{Context, Result};
use futures::future::join_all;
use std::ffi::OsString;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use tokio::process::Command;
use tokio::runtime::Builder;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use super::{lost_member, outside_runtime, GroupKind, GroupOptions, Members, RunnableGroup};
use crate::config::WORKER_ENV;
use crate::context::panic_message;
use crate::error::SeismographError;
use crate::models::{ResultAggregate, SuiteOutcome};
use crate::suite::Suite;
use crate::utils::Timer;

/// Prefix of the stdout line carrying a worker's outcome
pub const OUTCOME_MARKER: &str = "SEISMOGRAPH-OUTCOME ";

/// Number of stderr lines kept when a worker dies without reporting
const STDERR_TAIL_LINES: usize = 10;

/// Command line used to start a worker process
#[derive(Clone, Debug)]
pub struct WorkerCommand {
    program: PathBuf,
    args: Vec<OsString>,
    envs: Vec<(OsString, OsString)>,
}

impl WorkerCommand {
    pub fn new<I, S>(program: impl Into<PathBuf>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
            envs: Vec::new(),
        }
    }

    /// Re-run the current executable with the process arguments
    pub fn current() -> Result<Self> {
        Self::current_with_args(std::env::args_os().skip(1))
    }

    /// Re-run the current executable with `args` (binary name excluded)
    pub fn current_with_args<I, S>(args: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        let program = std::env::current_exe().context("Failed to locate current executable")?;
        Ok(Self::new(program, args))
    }

    pub fn args(&self) -> &[OsString] {
        &self.args
    }

    pub fn env(mut self, key: impl Into<OsString>, value: impl Into<OsString>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    fn command(&self, suite: &str) -> Command {
        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .envs(self.envs.iter().map(|(k, v)| (k, v)))
            .env(WORKER_ENV, suite)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        command
    }
}

/// Render the line a worker prints for its parent
pub fn format_outcome_line(outcome: &SuiteOutcome) -> Result<String> {
    let json = serde_json::to_string(outcome).context("Failed to serialize suite outcome")?;
    Ok(format!("{OUTCOME_MARKER}{json}"))
}

/// Find the last well-formed outcome line in a worker's stdout
pub fn parse_outcome(stdout: &str) -> Option<SuiteOutcome> {
    stdout
        .lines()
        .rev()
        .filter_map(|line| line.trim_end().strip_prefix(OUTCOME_MARKER))
        .find_map(|json| serde_json::from_str(json).ok())
}

fn stderr_tail(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
    let start = lines.len().saturating_sub(STDERR_TAIL_LINES);
    lines[start..].join("\n")
}

async fn run_worker(command: &WorkerCommand, suite: &str) -> SuiteOutcome {
    debug!("Spawning worker for suite \"{}\"", suite);

    let output = match command.command(suite).output().await {
        Ok(output) => output,
        Err(e) => {
            warn!("Failed to spawn worker for \"{}\": {}", suite, e);
            return lost_member(suite, format!("Failed to spawn worker: {e}"));
        }
    };

    let stdout = String::from_utf8_lossy(&output.stdout);
    match parse_outcome(&stdout) {
        Some(outcome) if outcome.suite == suite => {
            debug!("Worker for \"{}\" reported {}", suite, outcome.status);
            outcome
        }
        Some(outcome) => lost_member(
            suite,
            format!("Worker reported an outcome for \"{}\" instead", outcome.suite),
        ),
        None => {
            let tail = stderr_tail(&output.stderr);
            warn!("Worker for \"{}\" exited with {} without an outcome", suite, output.status);
            let reason = if tail.is_empty() {
                format!("Worker exited with {} without reporting an outcome", output.status)
            } else {
                format!(
                    "Worker exited with {} without reporting an outcome:\n{}",
                    output.status, tail
                )
            };
            lost_member(suite, reason)
        }
    }
}

/// Runs members in worker processes, at most `workers` at a time.
pub struct ProcessGroup {
    members: Members,
    options: GroupOptions,
}

impl ProcessGroup {
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

    async fn run_workers(command: WorkerCommand, names: &[String], workers: usize) -> Vec<SuiteOutcome> {
        let semaphore = Arc::new(Semaphore::new(workers.max(1)));
        let command = &command;

        let jobs = names.iter().map(|name| {
            let semaphore = semaphore.clone();
            async move {
                let _permit = semaphore.acquire_owned().await.ok();
                run_worker(command, name).await
            }
        });

        join_all(jobs).await
    }
}

impl RunnableGroup for ProcessGroup {
    fn kind(&self) -> GroupKind {
        GroupKind::Multiprocessing
    }

    fn members(&self) -> Vec<&str> {
        self.members.names()
    }

    fn run(self: Box<Self>) -> ResultAggregate {
        let names = self.members.owned_names();
        info!(
            "Running {} suites in worker processes (max {} concurrent)",
            names.len(),
            self.options.workers
        );
        let timer = Timer::start("process group");
        let mut aggregate = ResultAggregate::new();

        let command = match self.options.worker_command.clone() {
            Some(command) => Ok(command),
            None => WorkerCommand::current(),
        };

        let workers = self.options.workers;
        let started = command.and_then(|command| {
            let drive = || -> Result<Vec<SuiteOutcome>> {
                let runtime = Builder::new_current_thread()
                    .enable_all()
                    .build()
                    .context("Failed to start worker runtime")?;
                Ok(runtime.block_on(Self::run_workers(command, &names, workers)))
            };
            outside_runtime(drive).unwrap_or_else(|payload| {
                Err(anyhow::anyhow!(
                    "Worker scheduler panicked: {}",
                    panic_message(&*payload)
                ))
            })
        });

        match started {
            Ok(outcomes) => outcomes.into_iter().for_each(|o| aggregate.insert(o)),
            Err(e) => warn!("Worker processes could not be started: {:#}", e),
        }
        aggregate.fill_missing(names.iter().map(String::as_str), "Worker never reported an outcome");

        info!(
            "Process group finished {} suites in {:.3}s",
            aggregate.len(),
            timer.elapsed_secs()
        );
        aggregate
    }
}
