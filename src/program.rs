//! Program driver
//!
//! Wires option parsing, configuration, suite loading and group selection
//! around a [`ProgramContext`]. Every lifecycle failure is reported to the
//! layers' `on_error` hooks and then returned to the caller unchanged.

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::cli::{self, Args};
use crate::config::{Config, EnvConfig};
use crate::context::ProgramContext;
use crate::error::SeismographError;
use crate::extension::{Extension, ExtensionRegistry};
use crate::group::{format_outcome_line, select_group, GroupFactory, GroupOptions, WorkerCommand};
use crate::layer::{Layer, LayerRegistry};
use crate::loader::SuiteLoader;
use crate::models::{ResultAggregate, RunSummary, Runnable, StopSlot, SuiteOutcome};
use crate::output::{OutputFormat, ResultFormatter};
use crate::suite::{Script, Suite};
use crate::utils::{set_log_level, Stopwatch};

/// Everything a run produced
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RunReport {
    pub program: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub scripts: Vec<SuiteOutcome>,
    pub aggregate: ResultAggregate,
    pub summary: RunSummary,
    /// Free-form annotations, typically added by layers on error
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub notes: Vec<String>,
}

impl RunReport {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            started_at: Utc::now(),
            finished_at: None,
            scripts: Vec::new(),
            aggregate: ResultAggregate::new(),
            summary: RunSummary::default(),
            notes: Vec::new(),
        }
    }

    /// Script outcomes followed by suite outcomes
    pub fn outcomes(&self) -> impl Iterator<Item = &SuiteOutcome> {
        self.scripts.iter().chain(self.aggregate.outcomes())
    }

    /// Stamp the finish time and recompute the summary
    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
        self.summary = RunSummary::new(self.scripts.iter().chain(self.aggregate.outcomes()));
    }

    pub fn is_success(&self) -> bool {
        self.outcomes().all(|o| o.status.is_success())
    }

    pub fn duration_secs(&self) -> f64 {
        self.finished_at
            .map(|end| (end - self.started_at).num_milliseconds() as f64 / 1000.0)
            .unwrap_or(0.0)
    }
}

/// A named test program
pub struct Program {
    name: String,
    context: ProgramContext,
    defaults: Arc<LayerRegistry>,
    suites: Vec<Suite>,
    scripts: Vec<Script>,
    loader: Option<Arc<dyn SuiteLoader>>,
    extensions: ExtensionRegistry,
    group_factory: Option<GroupFactory>,
    worker_command: Option<WorkerCommand>,
    slot: StopSlot,
}

impl Program {
    pub fn new(name: impl Into<String>, defaults: Arc<LayerRegistry>) -> Self {
        Self {
            name: name.into(),
            context: ProgramContext::new(defaults.clone()),
            defaults,
            suites: Vec::new(),
            scripts: Vec::new(),
            loader: None,
            extensions: ExtensionRegistry::new(),
            group_factory: None,
            worker_command: None,
            slot: StopSlot::new(),
        }
    }

    pub fn with_layers(mut self, layers: impl IntoIterator<Item = Arc<dyn Layer>>) -> Self {
        self.context.add_layers(layers);
        self
    }

    pub fn with_setup(mut self, callback: impl Fn() -> Result<()> + Send + Sync + 'static) -> Self {
        self.context.add_setup(callback);
        self
    }

    pub fn with_teardown(mut self, callback: impl Fn() -> Result<()> + Send + Sync + 'static) -> Self {
        self.context.add_teardown(callback);
        self
    }

    pub fn with_suites(mut self, suites: impl IntoIterator<Item = Suite>) -> Self {
        self.suites.extend(suites);
        self
    }

    pub fn with_scripts(mut self, scripts: impl IntoIterator<Item = Script>) -> Self {
        self.scripts.extend(scripts);
        self
    }

    pub fn with_loader(mut self, loader: Arc<dyn SuiteLoader>) -> Self {
        self.loader = Some(loader);
        self
    }

    pub fn with_extension(mut self, extension: Arc<dyn Extension>) -> Self {
        self.extensions.register(extension);
        self
    }

    /// Use this group factory regardless of the backend flags
    pub fn with_group_factory(mut self, factory: GroupFactory) -> Self {
        self.group_factory = Some(factory);
        self
    }

    pub fn with_worker_command(mut self, command: WorkerCommand) -> Self {
        self.worker_command = Some(command);
        self
    }

    pub fn context(&self) -> &ProgramContext {
        &self.context
    }

    pub fn suites(&self) -> &[Suite] {
        &self.suites
    }

    /// Load suites through the configured loader: from a manifest when a
    /// path is given, otherwise from the named module.
    pub fn load_suites(&mut self, path: Option<&Path>, module: Option<&str>) -> Result<usize> {
        let Some(loader) = self.loader.clone() else {
            return Ok(0);
        };

        let loaded = match (path, module) {
            (Some(path), _) => loader.load_from_path(path)?,
            (None, Some(module)) => loader.load_from_module(module)?,
            (None, None) => return Ok(0),
        };

        let count = loaded.len();
        self.suites.extend(loaded);
        Ok(count)
    }

    /// Run with the process arguments and environment
    pub fn run(&mut self) -> Result<RunReport> {
        self.run_from(std::env::args_os())
    }

    /// Run with explicit arguments; the first one is the binary name
    pub fn run_from<I, T>(&mut self, args: I) -> Result<RunReport>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString>,
    {
        self.run_with_env(args, &EnvConfig::load())
    }

    pub fn run_with_env<I, T>(&mut self, args: I, env: &EnvConfig) -> Result<RunReport>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString>,
    {
        let args: Vec<OsString> = args.into_iter().map(Into::into).collect();

        if let Some(suite) = env.worker_suite.clone() {
            return self.run_worker(args, env, &suite);
        }

        let mut report = RunReport::new(&self.name);
        let mut stopwatch = Stopwatch::new();

        match self.drive(args, env, &mut report, &mut stopwatch) {
            Ok(()) => {
                report.finish();
                debug!("Program \"{}\" phases: {}", self.name, stopwatch.format());
                Ok(report)
            }
            Err(err) => {
                report.finish();
                if let Err(hook_err) = self.context.on_error(&err, &*self, &mut report) {
                    warn!("Layer on_error failed for program \"{}\": {:#}", self.name, hook_err);
                }
                Err(err)
            }
        }
    }

    fn drive(
        &mut self,
        args: Vec<OsString>,
        env: &EnvConfig,
        report: &mut RunReport,
        stopwatch: &mut Stopwatch,
    ) -> Result<()> {
        self.context.on_init(&*self)?;
        stopwatch.lap("on_init");

        let config = self.parse_config(args.clone(), env)?;
        stopwatch.lap("options");

        self.context.on_config(&*self, &config)?;
        stopwatch.lap("on_config");

        self.load_suites(config.path.as_deref(), config.module.as_deref())?;
        if self.suites.is_empty() && self.scripts.is_empty() {
            return Err(SeismographError::NothingToRun.into());
        }

        self.context.start_context(&*self)?;
        stopwatch.lap("start_context");

        // Once started, the context is always stopped; the first error wins.
        let ran = self.run_started(&config, &args, report, stopwatch);
        let stopped = self.context.stop_context(&*self);
        stopwatch.lap("stop_context");

        if let (Err(_), Err(stop_err)) = (&ran, &stopped) {
            warn!("Program \"{}\" also failed to stop: {:#}", self.name, stop_err);
        }
        ran?;
        stopped?;

        report.finish();
        write_report(report, &config)
    }

    /// Scripts, then the suite group, then the `on_run` hooks.
    fn run_started(
        &mut self,
        config: &Config,
        args: &[OsString],
        report: &mut RunReport,
        stopwatch: &mut Stopwatch,
    ) -> Result<()> {
        for script in &self.scripts {
            report.scripts.push(script.run());
        }
        stopwatch.lap("scripts");

        let factory = select_group(config, self.group_factory);
        let group = factory(std::mem::take(&mut self.suites), self.group_options(config, args))?;
        info!(
            "Program \"{}\" runs {} suites with the {} backend",
            self.name,
            group.members().len(),
            group.kind()
        );

        report.aggregate = group.run();
        stopwatch.lap("run");

        self.context.on_run(&*self)
    }

    /// Group settings for this run. Workers re-run the current executable
    /// with this run's arguments unless a worker command was configured.
    fn group_options(&self, config: &Config, args: &[OsString]) -> GroupOptions {
        let worker_command = self.worker_command.clone().or_else(|| {
            WorkerCommand::current_with_args(args.iter().skip(1).cloned())
                .map_err(|e| warn!("No default worker command: {:#}", e))
                .ok()
        });

        GroupOptions::from_config(config)
            .with_worker_command(worker_command)
            .with_suite_layers(self.defaults.suite_layers())
    }

    /// Build the option parser, let extensions and layers extend it, then
    /// resolve the configuration from the parsed arguments.
    fn parse_config(&self, args: Vec<OsString>, env: &EnvConfig) -> Result<Config> {
        let mut parser = self.extensions.extend(cli::command(&self.name));
        self.context.on_option_parser(&mut parser)?;

        let matches = parser.try_get_matches_from(args)?;
        self.extensions.configure(&matches)?;

        let args = Args::from_matches(&matches)?;
        let config = Config::resolve(&args, env)?;
        set_log_level(config.log_level);
        Ok(config)
    }

    /// Worker mode: run the one named suite and print its outcome line.
    fn run_worker(&mut self, args: Vec<OsString>, env: &EnvConfig, suite: &str) -> Result<RunReport> {
        debug!("Program \"{}\" runs as worker for suite \"{}\"", self.name, suite);
        let config = self.parse_config(args, env)?;
        self.load_suites(config.path.as_deref(), config.module.as_deref())?;

        let member = self
            .suites
            .iter()
            .find(|s| s.name() == suite)
            .ok_or_else(|| SeismographError::WorkerSuiteMissing(suite.to_string()))?;

        let outcome = member.run(&self.defaults.suite_layers());
        println!("{}", format_outcome_line(&outcome)?);

        let mut report = RunReport::new(&self.name);
        report.aggregate.insert(outcome);
        report.finish();
        Ok(report)
    }
}

impl Runnable for Program {
    fn name(&self) -> &str {
        &self.name
    }

    fn stop_slot(&self) -> &StopSlot {
        &self.slot
    }
}

impl fmt::Debug for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Program")
            .field("name", &self.name)
            .field("suites", &self.suites.len())
            .field("scripts", &self.scripts.len())
            .field("extensions", &self.extensions.len())
            .finish()
    }
}

fn write_report(report: &RunReport, config: &Config) -> Result<()> {
    let format = OutputFormat::from_str(&config.format).unwrap_or_else(|| {
        warn!("Unknown output format \"{}\", using table", config.format);
        OutputFormat::Table
    });

    let mut formatter = ResultFormatter::new(format).with_precision(config.round_runtime);
    if config.no_color || config.output.is_some() {
        formatter = formatter.no_color();
    }

    match &config.output {
        Some(path) => formatter.write_to_file(report, path),
        None => {
            println!("{}", formatter.format_report(report)?);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Failure;
    use crate::group::{GroupKind, RunnableGroup};
    use crate::loader::SuiteCatalog;
    use crate::models::OutcomeStatus;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tempfile::tempdir;

    struct Trace {
        log: Arc<Mutex<Vec<String>>>,
    }

    impl Trace {
        fn push(&self, entry: &str) -> Result<()> {
            self.log.lock().unwrap().push(entry.to_string());
            Ok(())
        }
    }

    impl Layer for Trace {
        fn on_init(&self, _program: &dyn Runnable) -> Result<()> {
            self.push("on_init")
        }

        fn on_option_parser(&self, _parser: &mut clap::Command) -> Result<()> {
            self.push("on_option_parser")
        }

        fn on_config(&self, _program: &dyn Runnable, config: &Config) -> Result<()> {
            self.push(&format!("on_config:{}", config.format))
        }

        fn on_setup(&self, _program: &dyn Runnable) -> Result<()> {
            self.push("on_setup")
        }

        fn on_teardown(&self, _program: &dyn Runnable) -> Result<()> {
            self.push("on_teardown")
        }

        fn on_run(&self, _program: &dyn Runnable) -> Result<()> {
            self.push("on_run")
        }

        fn on_error(
            &self,
            error: &anyhow::Error,
            _program: &dyn Runnable,
            result: &mut RunReport,
        ) -> Result<()> {
            result.notes.push(error.to_string());
            self.push("on_error")
        }
    }

    fn quiet_args(dir: &Path) -> Vec<String> {
        let output = dir.join("report.json").to_string_lossy().to_string();
        vec![
            "prog".to_string(),
            "--format".to_string(),
            "json".to_string(),
            "--output".to_string(),
            output,
        ]
    }

    #[test]
    fn test_full_lifecycle_order() {
        let dir = tempdir().unwrap();
        let log = Arc::new(Mutex::new(Vec::new()));
        let trace: Arc<dyn Layer> = Arc::new(Trace { log: log.clone() });
        let (setup_log, teardown_log, case_log) = (log.clone(), log.clone(), log.clone());

        let mut program = Program::new("prog", LayerRegistry::shared())
            .with_layers(vec![trace])
            .with_setup(move || {
                setup_log.lock().unwrap().push("setup".to_string());
                Ok(())
            })
            .with_teardown(move || {
                teardown_log.lock().unwrap().push("teardown".to_string());
                Ok(())
            })
            .with_suites(vec![Suite::new("s").case("c", move || {
                case_log.lock().unwrap().push("case".to_string());
                Ok(())
            })]);

        let report = program
            .run_with_env(quiet_args(dir.path()), &EnvConfig::default())
            .unwrap();

        assert!(report.is_success());
        assert_eq!(report.aggregate.len(), 1);
        assert_eq!(
            *log.lock().unwrap(),
            vec![
                "on_init",
                "on_option_parser",
                "on_config:json",
                "on_setup",
                "setup",
                "case",
                "on_run",
                "on_teardown",
                "teardown",
            ]
        );

        let written = std::fs::read_to_string(dir.path().join("report.json")).unwrap();
        let parsed: RunReport = serde_json::from_str(&written).unwrap();
        assert_eq!(parsed.program, "prog");
        assert_eq!(parsed.summary.total, 1);
    }

    #[test]
    fn test_nothing_to_run_goes_through_on_error() {
        let dir = tempdir().unwrap();
        let log = Arc::new(Mutex::new(Vec::new()));
        let trace: Arc<dyn Layer> = Arc::new(Trace { log: log.clone() });

        let mut program = Program::new("empty", LayerRegistry::shared()).with_layers(vec![trace]);
        let err = program
            .run_with_env(quiet_args(dir.path()), &EnvConfig::default())
            .unwrap_err();

        assert!(matches!(
            err.downcast_ref::<SeismographError>(),
            Some(SeismographError::NothingToRun)
        ));
        assert_eq!(log.lock().unwrap().last().map(String::as_str), Some("on_error"));
        assert!(!log.lock().unwrap().contains(&"on_setup".to_string()));
    }

    #[test]
    fn test_setup_failure_is_tagged_and_returned() {
        let dir = tempdir().unwrap();
        let mut program = Program::new("prog", LayerRegistry::shared())
            .with_setup(|| Err(Failure::new("no database").into()))
            .with_suites(vec![Suite::new("s")]);

        let err = program
            .run_with_env(quiet_args(dir.path()), &EnvConfig::default())
            .unwrap_err();
        assert_eq!(err.downcast_ref::<Failure>().unwrap().0, "no database");

        let tag = program.stop_slot().get().unwrap();
        assert_eq!(tag.runnable, "prog");
        assert_eq!(tag.phase, "start_context");
    }

    #[test]
    fn test_failed_run_still_stops_the_context() {
        struct Refusing;
        impl Layer for Refusing {
            fn on_run(&self, _program: &dyn Runnable) -> Result<()> {
                anyhow::bail!("on_run refused")
            }
        }

        let dir = tempdir().unwrap();
        let teardowns = Arc::new(AtomicUsize::new(0));
        let counted = teardowns.clone();

        let mut program = Program::new("prog", LayerRegistry::shared())
            .with_layers(vec![Arc::new(Refusing) as Arc<dyn Layer>])
            .with_teardown(move || {
                counted.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .with_suites(vec![Suite::new("s").case("c", || Ok(()))]);

        let err = program
            .run_with_env(quiet_args(dir.path()), &EnvConfig::default())
            .unwrap_err();
        assert_eq!(err.to_string(), "on_run refused");
        assert_eq!(teardowns.load(Ordering::SeqCst), 1);
        assert_eq!(program.stop_slot().get().unwrap().phase, "on_run");
    }

    #[test]
    fn test_default_workers_get_this_runs_arguments() {
        let program = Program::new("prog", LayerRegistry::shared());
        let args: Vec<OsString> = ["prog", "--module", "core", "--multiprocessing"]
            .into_iter()
            .map(OsString::from)
            .collect();

        let options = program.group_options(&Config::default(), &args);
        let command = options.worker_command.unwrap();
        assert_eq!(command.args(), &args[1..]);

        let pinned = Program::new("prog", LayerRegistry::shared())
            .with_worker_command(WorkerCommand::new("/bin/true", ["fixed"]));
        let options = pinned.group_options(&Config::default(), &args);
        assert_eq!(options.worker_command.unwrap().args(), [OsString::from("fixed")]);
    }

    #[test]
    fn test_scripts_run_before_suites() {
        let dir = tempdir().unwrap();
        let order = Arc::new(Mutex::new(Vec::new()));
        let (script_order, case_order) = (order.clone(), order.clone());

        let mut program = Program::new("prog", LayerRegistry::shared())
            .with_scripts(vec![Script::new("migrate", move || {
                script_order.lock().unwrap().push("script");
                Ok(())
            })])
            .with_suites(vec![Suite::new("s").case("c", move || {
                case_order.lock().unwrap().push("case");
                Ok(())
            })]);

        let report = program
            .run_with_env(quiet_args(dir.path()), &EnvConfig::default())
            .unwrap();
        assert_eq!(report.scripts.len(), 1);
        assert_eq!(report.aggregate.len(), 1);
        assert!(!report.aggregate.contains("migrate"));
        assert_eq!(*order.lock().unwrap(), vec!["script", "case"]);
    }

    static OVERRIDE_BUILDS: AtomicUsize = AtomicUsize::new(0);

    fn override_factory(
        suites: Vec<Suite>,
        options: GroupOptions,
    ) -> Result<Box<dyn RunnableGroup>, SeismographError> {
        OVERRIDE_BUILDS.fetch_add(1, Ordering::SeqCst);
        GroupKind::Sequential.factory()(suites, options)
    }

    #[test]
    fn test_group_override_and_loader() {
        fn smoke() -> Suite {
            Suite::new("smoke").case("ping", || Err(Failure::new("no pong").into()))
        }

        let dir = tempdir().unwrap();
        let catalog = SuiteCatalog::new().register("core", smoke);
        let mut program = Program::new("prog", LayerRegistry::shared())
            .with_loader(Arc::new(catalog))
            .with_group_factory(override_factory);

        let mut args = quiet_args(dir.path());
        args.extend(["--module".to_string(), "core".to_string(), "--threading".to_string()]);

        let before = OVERRIDE_BUILDS.load(Ordering::SeqCst);
        let report = program.run_with_env(args, &EnvConfig::default()).unwrap();

        assert_eq!(OVERRIDE_BUILDS.load(Ordering::SeqCst), before + 1);
        assert!(!report.is_success());
        assert_eq!(report.aggregate.get("smoke").unwrap().status, OutcomeStatus::Fail);
    }

    #[test]
    fn test_worker_mode_runs_one_suite() {
        let env = EnvConfig {
            worker_suite: Some("b".to_string()),
            ..EnvConfig::default()
        };
        let ran = Arc::new(AtomicUsize::new(0));
        let ran_a = ran.clone();

        let mut program = Program::new("prog", LayerRegistry::shared()).with_suites(vec![
            Suite::new("a").case("x", move || {
                ran_a.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }),
            Suite::new("b").case("y", || Ok(())),
        ]);

        let report = program.run_with_env(["prog"], &env).unwrap();
        assert_eq!(report.aggregate.len(), 1);
        assert!(report.aggregate.contains("b"));
        assert_eq!(ran.load(Ordering::SeqCst), 0);

        let missing = EnvConfig {
            worker_suite: Some("zzz".to_string()),
            ..EnvConfig::default()
        };
        assert!(program.run_with_env(["prog"], &missing).is_err());
    }
}
