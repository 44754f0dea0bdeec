//! End-to-end lifecycle and group behaviour through the public API

use anyhow::Result;
use std::cell::Cell;
use std::sync::{Arc, Mutex};

use seismograph::models::StopSlot;
use seismograph::{
    select_group, ChainRunner, Config, Failure, GroupKind, GroupOptions, Layer, LayerRegistry,
    OutcomeStatus, ProgramContext, Runnable, SeismographError, Suite, Toggle,
};

struct FakeProgram {
    slot: StopSlot,
}

impl FakeProgram {
    fn new() -> Self {
        Self {
            slot: StopSlot::new(),
        }
    }
}

impl Runnable for FakeProgram {
    fn name(&self) -> &str {
        "integration"
    }

    fn stop_slot(&self) -> &StopSlot {
        &self.slot
    }
}

/// Records its name whenever `on_run` is called.
struct Named {
    name: &'static str,
    seen: Arc<Mutex<Vec<&'static str>>>,
}

impl Layer for Named {
    fn on_run(&self, _program: &dyn Runnable) -> Result<()> {
        self.seen.lock().unwrap().push(self.name);
        Ok(())
    }
}

fn named(name: &'static str, seen: &Arc<Mutex<Vec<&'static str>>>, enabled: bool) -> Arc<dyn Layer> {
    let layer = Named {
        name,
        seen: seen.clone(),
    };
    if enabled {
        Arc::new(Toggle::new(layer))
    } else {
        Arc::new(Toggle::disabled(layer))
    }
}

#[test]
fn effective_layers_are_defaults_then_custom_and_single_pass() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let registry = LayerRegistry::shared();
    registry.add_layer(named("d1", &seen, true));
    registry.add_layer(named("d-off", &seen, false));
    registry.add_layer(named("d2", &seen, true));

    let mut context = ProgramContext::new(registry);
    context.add_layers(vec![named("c1", &seen, true), named("c-off", &seen, false)]);
    context.add_layers(vec![named("c2", &seen, true)]);

    let program = FakeProgram::new();
    let mut view = context.layers();
    let mut count = 0;
    for layer in view.by_ref() {
        layer.on_run(&program).unwrap();
        count += 1;
    }

    assert_eq!(count, 4);
    assert_eq!(*seen.lock().unwrap(), vec!["d1", "d2", "c1", "c2"]);
    assert!(view.next().is_none());

    // A new view starts over.
    assert_eq!(context.layers().count(), 4);
}

#[derive(Default)]
struct CountingChain {
    calls: Cell<usize>,
}

impl ChainRunner for CountingChain {
    fn run<I, F>(&self, chain: I) -> Result<()>
    where
        I: IntoIterator<Item = F>,
        F: FnOnce() -> Result<()>,
    {
        self.calls.set(self.calls.get() + 1);
        seismograph::call_chain(chain)
    }
}

#[test]
fn each_phase_invokes_the_expected_number_of_chains() {
    let context = ProgramContext::with_chain(LayerRegistry::shared(), CountingChain::default());
    let program = FakeProgram::new();
    let calls = || context.chain().calls.get();

    let mut expected = 0;
    let mut step = |done: usize, per_phase: usize| {
        expected += per_phase;
        assert_eq!(done, expected);
    };

    context.on_init(&program).unwrap();
    step(calls(), 1);

    let mut parser = seismograph::cli::command("integration");
    context.on_option_parser(&mut parser).unwrap();
    step(calls(), 1);

    context.on_config(&program, &Config::default()).unwrap();
    step(calls(), 1);

    context.start_context(&program).unwrap();
    step(calls(), 2);

    context.on_run(&program).unwrap();
    step(calls(), 1);

    context.stop_context(&program).unwrap();
    step(calls(), 2);

    let mut report = seismograph::RunReport::new("integration");
    context
        .on_error(&anyhow::anyhow!("late failure"), &program, &mut report)
        .unwrap();
    step(calls(), 1);
}

#[derive(Debug, thiserror::Error)]
#[error("socket closed after {0} bytes")]
struct SocketClosed(usize);

#[test]
fn failing_setup_is_tagged_once_and_returned_unchanged() {
    struct Refusing;
    impl Layer for Refusing {
        fn on_setup(&self, _program: &dyn Runnable) -> Result<()> {
            Err(SocketClosed(512).into())
        }
    }

    let mut context = ProgramContext::new(LayerRegistry::shared());
    context.add_layers(vec![Arc::new(Refusing) as Arc<dyn Layer>]);
    let setup_ran = Arc::new(Mutex::new(false));
    let flag = setup_ran.clone();
    context.add_setup(move || {
        *flag.lock().unwrap() = true;
        Ok(())
    });

    let program = FakeProgram::new();
    let err = context.start_context(&program).unwrap_err();

    assert_eq!(err.downcast_ref::<SocketClosed>().unwrap().0, 512);
    assert!(!*setup_ran.lock().unwrap());

    let tag = program.stop_slot().get().unwrap();
    assert_eq!(tag.runnable, "integration");
    assert_eq!(tag.phase, "start_context");

    // A second failure does not overwrite the first tag.
    let _ = context.on_run(&program);
    let _ = context.start_context(&program);
    assert_eq!(program.stop_slot().get().unwrap().phase, "start_context");
}

#[test]
fn backend_selection_follows_priority() {
    let kind = |config: &Config| {
        select_group(config, None)(Vec::new(), GroupOptions::default())
            .unwrap()
            .kind()
    };

    assert_eq!(kind(&Config::default()), GroupKind::Sequential);
    assert_eq!(
        kind(&Config {
            multiprocessing: true,
            ..Config::default()
        }),
        GroupKind::Multiprocessing
    );
    assert_eq!(
        kind(&Config {
            threading: true,
            multiprocessing: true,
            ..Config::default()
        }),
        GroupKind::Threading
    );

    let forced = select_group(
        &Config {
            cooperative: true,
            threading: true,
            ..Config::default()
        },
        Some(GroupKind::Sequential.factory()),
    );
    assert_eq!(
        forced(Vec::new(), GroupOptions::default()).unwrap().kind(),
        GroupKind::Sequential
    );
}

fn five_suites() -> Vec<Suite> {
    (0..5)
        .map(|i| {
            let suite = Suite::new(format!("suite-{i}")).case("check", || Ok(()));
            if i == 2 {
                suite.case("broken", || Err(Failure::new("value drifted").into()))
            } else {
                suite
            }
        })
        .collect()
}

#[test]
fn every_in_memory_backend_reports_every_member() {
    for kind in [GroupKind::Sequential, GroupKind::Threading, GroupKind::Cooperative] {
        let group = kind.factory()(five_suites(), GroupOptions::default()).unwrap();
        let aggregate = group.run();

        assert_eq!(aggregate.len(), 5, "{kind}");
        for i in 0..5 {
            let outcome = aggregate.get(&format!("suite-{i}")).unwrap();
            let expected = if i == 2 {
                OutcomeStatus::Fail
            } else {
                OutcomeStatus::Pass
            };
            assert_eq!(outcome.status, expected, "{kind} suite-{i}");
            assert!(!outcome.cases.is_empty());
        }
    }
}

#[cfg(unix)]
#[test]
fn process_backend_reports_every_member() {
    use seismograph::WorkerCommand;

    let script = r#"
        if [ "$SEISMOGRAPH_WORKER" = "suite-2" ]; then
            kill -9 $$
        fi
        printf 'SEISMOGRAPH-OUTCOME {"suite":"%s","status":"pass"}\n' "$SEISMOGRAPH_WORKER"
    "#;
    let options = GroupOptions {
        workers: 3,
        ..GroupOptions::default()
    }
    .with_worker_command(Some(WorkerCommand::new("/bin/sh", ["-c", script])));

    let aggregate = GroupKind::Multiprocessing.factory()(five_suites(), options)
        .unwrap()
        .run();

    assert_eq!(aggregate.len(), 5);
    let killed = aggregate.get("suite-2").unwrap();
    assert_eq!(killed.status, OutcomeStatus::Error);
    assert!(killed.synthesized);
    for i in [0, 1, 3, 4] {
        assert_eq!(
            aggregate.get(&format!("suite-{i}")).unwrap().status,
            OutcomeStatus::Pass
        );
    }
}

#[test]
fn duplicate_suite_names_are_rejected() {
    let suites = vec![Suite::new("twin"), Suite::new("twin")];
    let err = GroupKind::Threading.factory()(suites, GroupOptions::default())
        .err()
        .unwrap();
    assert!(matches!(err, SeismographError::DuplicateMember(_)));
}

#[test]
fn start_then_stop_invokes_each_callback_once_in_order() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let (setup_log, teardown_log) = (log.clone(), log.clone());

    let mut context = ProgramContext::new(LayerRegistry::shared());
    context.add_setup(move || {
        setup_log.lock().unwrap().push("setup");
        Ok(())
    });
    context.add_teardown(move || {
        teardown_log.lock().unwrap().push("teardown");
        Ok(())
    });

    let program = FakeProgram::new();
    context.start_context(&program).unwrap();
    context.stop_context(&program).unwrap();

    assert_eq!(*log.lock().unwrap(), vec!["setup", "teardown"]);
    assert!(program.stop_slot().get().is_none());
}
