//! Runnable identity and failure tagging

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Mutex, PoisonError};

/// Anything the orchestrator can run and tag on failure.
pub trait Runnable {
    /// Identity of the runnable; unique within one group.
    fn name(&self) -> &str;

    /// Slot recording where this runnable first stopped.
    fn stop_slot(&self) -> &StopSlot;
}

/// Which runnable stopped, and in which phase.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StopTag {
    pub runnable: String,
    pub phase: String,
}

impl fmt::Display for StopTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} stopped on {}", self.runnable, self.phase)
    }
}

/// Interior-mutable failure slot shared by every runnable kind.
#[derive(Debug, Default)]
pub struct StopSlot(Mutex<Option<StopTag>>);

impl StopSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current tag, if the runnable has stopped.
    pub fn get(&self) -> Option<StopTag> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn is_stopped(&self) -> bool {
        self.get().is_some()
    }

    /// Store the tag unless one is already present. Returns whether it was stored.
    fn set_once(&self, tag: StopTag) -> bool {
        let mut slot = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.is_some() {
            return false;
        }
        *slot = Some(tag);
        true
    }
}

/// Tag `runnable` as stopped on `phase`.
///
/// The first tag wins; returns `false` when the runnable was already tagged.
pub fn stopped_on(runnable: &dyn Runnable, phase: &str) -> bool {
    runnable.stop_slot().set_once(StopTag {
        runnable: runnable.name().to_string(),
        phase: phase.to_string(),
    })
}
