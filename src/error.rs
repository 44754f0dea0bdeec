//! Crate-level error types
//!
//! Hook and case failures travel as `anyhow::Error` so the original value
//! survives untouched; the variants here cover driver and registration faults.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SeismographError {
    #[error("There are no suites or scripts for running")]
    NothingToRun,

    #[error("Duplicate runnable in group: {0}")]
    DuplicateMember(String),

    #[error("Unknown suite module: {0}")]
    UnknownModule(String),

    #[error("Unknown suite: {0}")]
    UnknownSuite(String),

    #[error("Invalid suite manifest {path}: {reason}")]
    Manifest { path: PathBuf, reason: String },

    #[error("Worker was asked to run suite {0} which is not registered")]
    WorkerSuiteMissing(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

/// Assertion-style failure raised by case bodies.
///
/// A case returning this error is reported as failed; any other error is
/// reported as an error outcome.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct Failure(pub String);

impl Failure {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Bail out of a case with a [`Failure`] unless the condition holds.
#[macro_export]
macro_rules! ensure_that {
    ($cond:expr, $($arg:tt)+) => {
        if !$cond {
            return Err($crate::error::Failure::new(format!($($arg)+)).into());
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_display() {
        let err = anyhow::Error::from(Failure::new("expected 2, got 3"));
        assert_eq!(err.to_string(), "expected 2, got 3");
        assert!(err.is::<Failure>());
    }

    #[test]
    fn test_ensure_that_macro() {
        fn check(v: u32) -> anyhow::Result<()> {
            ensure_that!(v == 2, "expected 2, got {}", v);
            Ok(())
        }

        assert!(check(2).is_ok());
        let err = check(5).unwrap_err();
        assert!(err.is::<Failure>());
        assert_eq!(err.to_string(), "expected 2, got 5");
    }
}
