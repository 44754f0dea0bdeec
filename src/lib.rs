//! Seismograph - test execution orchestrator
//!
//! Runs suites of test cases through a fixed program lifecycle
//! (init, option parsing, configuration, start, run, stop) while letting
//! layers observe every phase, and schedules the suites on one of four
//! backends: sequential, OS threads, worker processes or cooperative tasks.
//!
//! ## Example
//!
//! ```no_run
//! use seismograph::{LayerRegistry, Program, Suite};
//!
//! let mut program = Program::new("smoke", LayerRegistry::shared())
//!     .with_suites(vec![Suite::new("health").case("ping", || Ok(()))]);
//!
//! let report = program.run().unwrap();
//! assert!(report.is_success());
//! ```

pub mod chain;
pub mod cli;
pub mod config;
pub mod context;
pub mod error;
pub mod extension;
pub mod group;
pub mod layer;
pub mod loader;
pub mod models;
pub mod output;
pub mod program;
pub mod suite;
pub mod utils;

pub use chain::{call_chain, ChainRunner, SerialChain};
pub use config::Config;
pub use context::{Phase, ProgramContext};
pub use error::{Failure, SeismographError};
pub use extension::{Extension, ExtensionRegistry};
pub use group::{select_group, GroupFactory, GroupKind, GroupOptions, RunnableGroup, WorkerCommand};
pub use layer::{Layer, LayerRegistry, LayerView, SuiteLayer, Toggle};
pub use loader::{SuiteCatalog, SuiteLoader};
pub use models::{stopped_on, OutcomeStatus, ResultAggregate, Runnable, SuiteOutcome};
pub use program::{Program, RunReport};
pub use suite::{Case, CaseScheduling, Script, Suite};
