//! Wall-clock timing for suites, groups and program phases

use std::time::{Duration, Instant};
use tracing::trace;

/// Times one unit of work; logs at trace when dropped.
#[derive(Debug)]
pub struct Timer {
    label: String,
    started: Instant,
}

impl Timer {
    pub fn start(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            started: Instant::now(),
        }
    }

    pub fn elapsed_secs(&self) -> f64 {
        self.started.elapsed().as_secs_f64()
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        trace!("\"{}\" took {:?}", self.label, self.started.elapsed());
    }
}

/// Splits a run into consecutive named phases.
#[derive(Debug)]
pub struct Stopwatch {
    started: Instant,
    last: Instant,
    phases: Vec<(String, Duration)>,
}

impl Stopwatch {
    pub fn new() -> Self {
        let now = Instant::now();
        Self {
            started: now,
            last: now,
            phases: Vec::new(),
        }
    }

    /// Close the current phase under `label` and start the next one.
    pub fn lap(&mut self, label: impl Into<String>) {
        let now = Instant::now();
        self.phases.push((label.into(), now - self.last));
        self.last = now;
    }

    pub fn phases(&self) -> &[(String, Duration)] {
        &self.phases
    }

    pub fn total(&self) -> Duration {
        self.started.elapsed()
    }

    /// One line such as `on_init=0ms start_context=3ms total=12ms`
    pub fn format(&self) -> String {
        self.phases
            .iter()
            .map(|(label, took)| format!("{label}={}ms", took.as_millis()))
            .chain(std::iter::once(format!("total={}ms", self.total().as_millis())))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl Default for Stopwatch {
    fn default() -> Self {
        Self::new()
    }
}
