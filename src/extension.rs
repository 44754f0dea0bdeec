//! Option parser extensions
//!
//! An extension contributes arguments to the program's option parser and
//! receives the parsed matches afterwards.

use anyhow::Result;
use clap::{ArgMatches, Command};
use std::sync::Arc;
use tracing::debug;

pub trait Extension: Send + Sync {
    fn name(&self) -> &str;

    /// Add arguments to the parser
    fn add_options(&self, parser: Command) -> Command {
        parser
    }

    /// Receive the parsed arguments
    fn configure(&self, _matches: &ArgMatches) -> Result<()> {
        Ok(())
    }
}

#[derive(Default, Clone)]
pub struct ExtensionRegistry {
    extensions: Vec<Arc<dyn Extension>>,
}

impl ExtensionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, extension: Arc<dyn Extension>) {
        self.extensions.push(extension);
    }

    pub fn len(&self) -> usize {
        self.extensions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.extensions.is_empty()
    }

    /// Let one extension extend the parser
    pub fn add_options(extension: &dyn Extension, parser: Command) -> Command {
        debug!("Add options from extension \"{}\"", extension.name());
        extension.add_options(parser)
    }

    /// Let every registered extension extend the parser, in registration order
    pub fn extend(&self, parser: Command) -> Command {
        self.extensions
            .iter()
            .fold(parser, |parser, extension| Self::add_options(extension.as_ref(), parser))
    }

    pub fn configure(&self, matches: &ArgMatches) -> Result<()> {
        for extension in &self.extensions {
            extension.configure(matches)?;
        }
        Ok(())
    }
}
