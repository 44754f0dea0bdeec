//! Output formatting module
//!
//! Renders run reports in the configured format.

mod formatter;

pub use formatter::{OutputFormat, ResultFormatter};
