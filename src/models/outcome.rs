//! Outcome models
//!
//! Defines per-case and per-suite outcomes, the result aggregate, and run summaries.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use super::StopTag;

/// Outcome status
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutcomeStatus {
    Pass,
    Fail,
    Skip,
    Error,
}

impl OutcomeStatus {
    pub fn symbol(&self) -> &'static str {
        match self {
            OutcomeStatus::Pass => "✓",
            OutcomeStatus::Fail => "✗",
            OutcomeStatus::Skip => "○",
            OutcomeStatus::Error => "!",
        }
    }

    /// Pass and skip both count as success.
    pub fn is_success(&self) -> bool {
        matches!(self, OutcomeStatus::Pass | OutcomeStatus::Skip)
    }
}

impl fmt::Display for OutcomeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutcomeStatus::Pass => write!(f, "PASS"),
            OutcomeStatus::Fail => write!(f, "FAIL"),
            OutcomeStatus::Skip => write!(f, "SKIP"),
            OutcomeStatus::Error => write!(f, "ERROR"),
        }
    }
}

/// Outcome of a single case
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CaseOutcome {
    pub case: String,
    pub status: OutcomeStatus,
    #[serde(default)]
    pub duration_secs: f64,
    #[serde(default)]
    pub message: Option<String>,
}

impl CaseOutcome {
    pub fn pass(case: impl Into<String>, duration_secs: f64) -> Self {
        Self {
            case: case.into(),
            status: OutcomeStatus::Pass,
            duration_secs,
            message: None,
        }
    }

    pub fn fail(case: impl Into<String>, duration_secs: f64, message: impl Into<String>) -> Self {
        Self {
            case: case.into(),
            status: OutcomeStatus::Fail,
            duration_secs,
            message: Some(message.into()),
        }
    }

    pub fn skip(case: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            case: case.into(),
            status: OutcomeStatus::Skip,
            duration_secs: 0.0,
            message: Some(reason.into()),
        }
    }

    pub fn error(case: impl Into<String>, duration_secs: f64, error: impl Into<String>) -> Self {
        Self {
            case: case.into(),
            status: OutcomeStatus::Error,
            duration_secs,
            message: Some(error.into()),
        }
    }
}

impl fmt::Display for CaseOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} [{:.3}s]", self.status.symbol(), self.case, self.duration_secs)?;
        if let Some(msg) = &self.message {
            write!(f, " - {msg}")?;
        }
        Ok(())
    }
}

/// Outcome of a suite (or script)
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SuiteOutcome {
    pub suite: String,
    pub status: OutcomeStatus,
    #[serde(default)]
    pub duration_secs: f64,
    #[serde(default)]
    pub cases: Vec<CaseOutcome>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub stopped_on: Option<StopTag>,
    /// Set when the outcome was produced on behalf of a worker that never reported.
    #[serde(default)]
    pub synthesized: bool,
}

impl SuiteOutcome {
    /// Build an outcome from finished cases; status is the worst case status.
    pub fn from_cases(suite: impl Into<String>, cases: Vec<CaseOutcome>, duration_secs: f64) -> Self {
        let status = if cases.iter().any(|c| c.status == OutcomeStatus::Error) {
            OutcomeStatus::Error
        } else if cases.iter().any(|c| c.status == OutcomeStatus::Fail) {
            OutcomeStatus::Fail
        } else if !cases.is_empty() && cases.iter().all(|c| c.status == OutcomeStatus::Skip) {
            OutcomeStatus::Skip
        } else {
            OutcomeStatus::Pass
        };

        Self {
            suite: suite.into(),
            status,
            duration_secs,
            cases,
            message: None,
            stopped_on: None,
            synthesized: false,
        }
    }

    pub fn skipped(suite: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            suite: suite.into(),
            status: OutcomeStatus::Skip,
            duration_secs: 0.0,
            cases: Vec::new(),
            message: Some(reason.into()),
            stopped_on: None,
            synthesized: false,
        }
    }

    pub fn error(suite: impl Into<String>, duration_secs: f64, error: impl Into<String>) -> Self {
        Self {
            suite: suite.into(),
            status: OutcomeStatus::Error,
            duration_secs,
            cases: Vec::new(),
            message: Some(error.into()),
            stopped_on: None,
            synthesized: false,
        }
    }

    /// Error entry standing in for a worker that was lost before reporting.
    pub fn crashed(suite: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            synthesized: true,
            ..Self::error(suite, 0.0, reason)
        }
    }

    pub fn with_stopped_on(mut self, tag: Option<StopTag>) -> Self {
        self.stopped_on = tag;
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

impl fmt::Display for SuiteOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} [{:.3}s]", self.status.symbol(), self.suite, self.duration_secs)?;
        if let Some(msg) = &self.message {
            write!(f, " - {msg}")?;
        }
        Ok(())
    }
}

/// One outcome per group member, keyed by runnable identity.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultAggregate {
    entries: BTreeMap<String, SuiteOutcome>,
}

impl ResultAggregate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an outcome; a second outcome for the same member replaces the first.
    pub fn insert(&mut self, outcome: SuiteOutcome) {
        self.entries.insert(outcome.suite.clone(), outcome);
    }

    pub fn get(&self, suite: &str) -> Option<&SuiteOutcome> {
        self.entries.get(suite)
    }

    pub fn contains(&self, suite: &str) -> bool {
        self.entries.contains_key(suite)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn outcomes(&self) -> impl Iterator<Item = &SuiteOutcome> {
        self.entries.values()
    }

    /// Synthesize an error entry for every expected member without one.
    pub fn fill_missing<'a>(
        &mut self,
        members: impl IntoIterator<Item = &'a str>,
        reason: &str,
    ) -> usize {
        let mut filled = 0;
        for name in members {
            if !self.contains(name) {
                self.insert(SuiteOutcome::crashed(name, reason));
                filled += 1;
            }
        }
        filled
    }
}

/// Counts over a set of suite outcomes
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub errors: usize,
    pub cases: usize,
    pub total_duration_secs: f64,
}

impl RunSummary {
    pub fn new<'a>(outcomes: impl IntoIterator<Item = &'a SuiteOutcome>) -> Self {
        let mut summary = Self::default();
        for outcome in outcomes {
            summary.total += 1;
            summary.cases += outcome.cases.len();
            summary.total_duration_secs += outcome.duration_secs;
            match outcome.status {
                OutcomeStatus::Pass => summary.passed += 1,
                OutcomeStatus::Fail => summary.failed += 1,
                OutcomeStatus::Skip => summary.skipped += 1,
                OutcomeStatus::Error => summary.errors += 1,
            }
        }
        summary
    }

    pub fn pass_rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            (self.passed as f64 / self.total as f64) * 100.0
        }
    }

    pub fn is_all_passed(&self) -> bool {
        self.failed == 0 && self.errors == 0
    }
}
