//! Data models for test orchestration
//!
//! Runnable identity, failure tags, and the outcomes produced by runnable groups.

mod outcome;
mod runnable;

pub use outcome::{CaseOutcome, OutcomeStatus, ResultAggregate, RunSummary, SuiteOutcome};
pub use runnable::{stopped_on, Runnable, StopSlot, StopTag};
