//! Shared utilities
//!
//! Logging setup and timing helpers.

pub mod logger;
mod timer;

pub use logger::{init_logger, set_log_level, LogLevel};
pub use timer::{Stopwatch, Timer};
