use rdevs::core::config::ExperimentConfig;
use rdevs::core::dynamics::{
    Dynamics, DynamicsRegistry, DynamicsResult, ExternalEvent, InitConditions, OutputBag,
};
use rdevs::core::error::{DynamicsError, SimulationError};
use rdevs::core::execution::{ConfluentPolicy, KernelConfig, RootCoordinator, RunState};
use rdevs::core::graph::ModelGraph;
use rdevs::core::observation::ViewSpec;
use rdevs::core::types::{ModelId, Time, INFINITY};
use rdevs::core::values::Value;
use rdevs::ProjectConfig;
use std::sync::{Arc, Mutex};

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Emits its clock on `out` every time unit from the start and fails on
/// the third output
struct Flaky {
    calls: u32,
    sigma: Time,
}

impl Dynamics for Flaky {
    fn time_advance(&self) -> Time {
        self.sigma
    }

    fn internal_transition(&mut self, _time: Time) -> DynamicsResult<()> {
        self.sigma = 1.0;
        Ok(())
    }

    fn output(&mut self, time: Time, outputs: &mut OutputBag) -> DynamicsResult<()> {
        self.calls += 1;
        if self.calls == 3 {
            return Err(DynamicsError::new("third output refused"));
        }
        outputs.emit("out", time);
        Ok(())
    }
}

/// Logs every transition it runs as `<kind>@<time>`, then goes passive
struct Logged {
    log: Arc<Mutex<Vec<String>>>,
    sigma: Time,
    own_confluent: bool,
}

impl Logged {
    fn record(&mut self, kind: &str, time: Time) {
        if let Ok(mut log) = self.log.lock() {
            log.push(format!("{}@{}", kind, time));
        }
        self.sigma = INFINITY;
    }
}

impl Dynamics for Logged {
    fn time_advance(&self) -> Time {
        self.sigma
    }

    fn internal_transition(&mut self, time: Time) -> DynamicsResult<()> {
        self.record("int", time);
        Ok(())
    }

    fn external_transition(&mut self, _events: &[ExternalEvent], time: Time) -> DynamicsResult<()> {
        self.record("ext", time);
        Ok(())
    }

    fn has_confluent_transition(&self) -> bool {
        self.own_confluent
    }

    fn confluent_transition(
        &mut self,
        _events: &[ExternalEvent],
        time: Time,
    ) -> DynamicsResult<()> {
        self.record("conf", time);
        Ok(())
    }
}

/// A single pulse at t=1 reaches B exactly when B's own internal event is
/// due; returns the transitions B ran
fn simultaneous_events(config: KernelConfig, own_confluent: bool) -> Vec<String> {
    let log = Arc::new(Mutex::new(Vec::new()));
    let shared = Arc::clone(&log);
    let mut registry = DynamicsRegistry::with_builtins();
    registry.register("logged", move |_| {
        Ok(Box::new(Logged {
            log: Arc::clone(&shared),
            sigma: 1.0,
            own_confluent,
        }) as Box<dyn Dynamics>)
    });

    let mut graph = ModelGraph::new("top");
    let top = graph.root();
    let a = graph
        .add_atomic(
            top,
            "A",
            "generator",
            InitConditions::new().with("start", 1.0).with("limit", 1i64),
        )
        .unwrap();
    graph.add_output_port(a, "out").unwrap();
    let b = graph
        .add_atomic(top, "B", "logged", InitConditions::new())
        .unwrap();
    graph.add_input_port(b, "in").unwrap();
    graph.connect_internal(a.output("out"), b.input("in")).unwrap();

    let mut root = RootCoordinator::new(config, registry);
    root.load_graph(&ExperimentConfig::new("conf", 0.0, 1.0), graph, vec![])
        .unwrap();
    root.run_all().unwrap();
    root.finish().unwrap();

    let entries = log.lock().unwrap().clone();
    entries
}

fn registry() -> DynamicsRegistry {
    let mut registry = DynamicsRegistry::with_builtins();
    registry.register("flaky", |_| {
        Ok(Box::new(Flaky {
            calls: 0,
            sigma: 0.0,
        }) as Box<dyn Dynamics>)
    });
    registry
}

fn root() -> RootCoordinator {
    RootCoordinator::new(KernelConfig::default(), registry())
}

/// `A.out -> B.in` with A bound to `dynamics`
fn pipeline(dynamics: &str, conditions: InitConditions) -> ModelGraph {
    let mut graph = ModelGraph::new("top");
    let top = graph.root();
    let a = graph.add_atomic(top, "A", dynamics, conditions).unwrap();
    graph.add_output_port(a, "out").unwrap();
    let b = graph
        .add_atomic(top, "B", "recorder", InitConditions::new())
        .unwrap();
    graph.add_input_port(b, "in").unwrap();
    graph.connect_internal(a.output("out"), b.input("in")).unwrap();
    graph
}

fn counter(graph: &mut ModelGraph, parent: ModelId, name: &str) -> ModelId {
    let id = graph
        .add_atomic(parent, name, "counter", InitConditions::new())
        .unwrap();
    graph.add_input_port(id, "in").unwrap();
    graph.add_output_port(id, "count").unwrap();
    id
}

#[test]
fn test_scenario_a_timed_view_on_pipeline() {
    init_logger();
    let mut root = root();
    root.load_graph(
        &ExperimentConfig::new("a", 0.0, 5.0),
        pipeline("generator", InitConditions::new()),
        vec![ViewSpec::timed("view", 1.0).observe("top:B", "in")],
    )
    .unwrap();

    root.run_all().unwrap();
    assert_eq!(root.state(), RunState::Finished);
    root.finish().unwrap();

    let outputs = root.outputs().unwrap();
    let matrix = &outputs["view"];
    assert_eq!(matrix.row_count(), 6);
    assert_eq!(matrix.column_names(), vec!["time", "top:B.in"]);
    let values: Vec<Option<&Value>> = matrix.column("top:B.in").unwrap();
    let expected: Vec<Value> = (0..6).map(|t| Value::Double(t as f64)).collect();
    assert_eq!(values, expected.iter().map(Some).collect::<Vec<_>>());
}

#[test]
fn test_scenario_b_fan_out_is_atomic() {
    init_logger();
    let mut graph = ModelGraph::new("top");
    let top = graph.root();
    let clock = graph
        .add_atomic(top, "clock", "generator", InitConditions::new())
        .unwrap();
    graph.add_output_port(clock, "out").unwrap();
    let pulse = graph
        .add_atomic(
            top,
            "pulse",
            "generator",
            InitConditions::new().with("start", 2.0).with("limit", 1i64),
        )
        .unwrap();
    graph.add_output_port(pulse, "out").unwrap();
    let sub = graph.add_coupled(top, "sub").unwrap();
    graph.add_input_port(sub, "in").unwrap();
    let c1 = counter(&mut graph, sub, "C1");
    let c2 = counter(&mut graph, sub, "C2");
    graph.connect_internal(pulse.output("out"), sub.input("in")).unwrap();
    graph.connect_input(sub.input("in"), c1.input("in")).unwrap();
    graph.connect_input(sub.input("in"), c2.input("in")).unwrap();

    let mut root = root();
    root.load_graph(&ExperimentConfig::new("b", 0.0, 5.0), graph, vec![])
        .unwrap();

    // steps at t=0, 1 and 2
    for _ in 0..3 {
        assert!(root.run().unwrap());
    }
    assert_eq!(root.current_time(), 2.0);

    let coordinator = root.coordinator().unwrap();
    assert_eq!(coordinator.current_time(), 3.0);
    let counts: Vec<Option<Value>> = coordinator
        .simulators()
        .iter()
        .filter(|s| s.path().starts_with("top:sub:"))
        .map(|s| s.observation("count", 2.0))
        .collect();
    assert_eq!(counts, vec![Some(Value::Integer(1)), Some(Value::Integer(1))]);
}

#[test]
fn test_scenario_c_dangling_port_fails_at_load() {
    init_logger();
    let mut graph = pipeline("generator", InitConditions::new());
    let a = graph.find("top:A").unwrap();
    let b = graph.find("top:B").unwrap();
    graph.connect_internal(a.output("out"), b.input("missing")).unwrap();

    let mut root = root();
    let error = root
        .load_graph(&ExperimentConfig::new("c", 0.0, 5.0), graph, vec![])
        .unwrap_err();
    assert!(error.is_structural());
    assert_eq!(root.state(), RunState::Failed);
    assert!(matches!(root.run(), Err(SimulationError::NotResumable)));
}

#[test]
fn test_scenario_d_failure_keeps_previous_rows() {
    init_logger();
    let mut root = root();
    root.load_graph(
        &ExperimentConfig::new("d", 0.0, 5.0),
        pipeline("flaky", InitConditions::new()),
        vec![ViewSpec::timed("view", 1.0).observe("top:B", "in")],
    )
    .unwrap();

    assert!(root.run().unwrap());
    assert!(root.run().unwrap());
    match root.run() {
        Err(SimulationError::Behavioral { model, time, source }) => {
            assert_eq!(model, "top:A");
            assert_eq!(time, 2.0);
            assert_eq!(source.message, "third output refused");
        }
        other => panic!("expected a behavioral error, got {:?}", other),
    }
    assert_eq!(root.state(), RunState::Failed);
    assert!(matches!(root.run(), Err(SimulationError::NotResumable)));

    let outputs = root.outputs().unwrap();
    let matrix = &outputs["view"];
    assert_eq!(matrix.times(), vec![0.0, 1.0]);
    assert_eq!(matrix.get(1, "top:B.in"), Some(&Value::Double(1.0)));
}

#[test]
fn test_empty_graph_stops_immediately() {
    let mut root = root();
    root.load_graph(
        &ExperimentConfig::new("empty", 0.0, 10.0),
        ModelGraph::new("top"),
        vec![],
    )
    .unwrap();
    assert!(!root.run().unwrap());
    assert_eq!(root.current_time(), INFINITY);
    assert_eq!(root.coordinator().unwrap().current_time(), INFINITY);
    assert!(root.outputs().is_none());
}

#[test]
fn test_time_never_decreases() {
    let mut root = root();
    root.load_graph(
        &ExperimentConfig::new("mono", 0.0, 20.0).with_seed(3),
        pipeline(
            "generator",
            InitConditions::new().with("distribution", "exponential"),
        ),
        vec![ViewSpec::timed("view", 0.7).observe("top:B", "in")],
    )
    .unwrap();

    let mut last = root.current_time();
    while root.run().unwrap() {
        assert!(root.current_time() >= last);
        last = root.current_time();
    }
    assert!(last <= 20.0);
}

#[test]
fn test_finish_is_idempotent() {
    let mut root = root();
    root.load_graph(
        &ExperimentConfig::new("fin", 0.0, 3.0),
        pipeline("generator", InitConditions::new()),
        vec![ViewSpec::timed("view", 1.0).observe("top:B", "in")],
    )
    .unwrap();
    root.run_all().unwrap();

    root.finish().unwrap();
    root.finish().unwrap();
    assert_eq!(root.state(), RunState::Finished);
    assert!(!root.run().unwrap());

    let outputs = root.outputs().unwrap();
    assert_eq!(outputs["view"].row_count(), 4);
    assert!(root.outputs().is_none());
}

#[test]
fn test_outputs_is_a_copy_while_running() {
    let mut root = root();
    root.load_graph(
        &ExperimentConfig::new("live", 0.0, 3.0),
        pipeline("generator", InitConditions::new()),
        vec![ViewSpec::timed("view", 1.0).observe("top:B", "in")],
    )
    .unwrap();
    root.run().unwrap();
    root.run().unwrap();

    let first = root.outputs().unwrap();
    let second = root.outputs().unwrap();
    assert_eq!(first, second);
    assert_eq!(first["view"].row_count(), 2);
}

#[test]
fn test_same_seed_same_tables() {
    let run = || {
        let mut root = root();
        root.load_graph(
            &ExperimentConfig::new("det", 0.0, 50.0).with_seed(42),
            pipeline(
                "generator",
                InitConditions::new()
                    .with("distribution", "exponential")
                    .with("period", 2.0),
            ),
            vec![
                ViewSpec::event("events").observe("top:B", "in"),
                ViewSpec::timed("timed", 1.5).observe("top:B", "in"),
            ],
        )
        .unwrap();
        root.run_all().unwrap();
        root.finish().unwrap();
        root.outputs().unwrap()
    };

    let first = run();
    let second = run();
    assert_eq!(first, second);
    assert_eq!(first["events"].to_csv(';'), second["events"].to_csv(';'));
}

#[test]
fn test_timed_view_row_count() {
    let mut root = root();
    root.load_graph(
        &ExperimentConfig::new("rows", 1.0, 3.0),
        pipeline("generator", InitConditions::new().with("period", 0.25)),
        vec![ViewSpec::timed("view", 0.5).observe("top:A", "emitted")],
    )
    .unwrap();
    root.run_all().unwrap();
    root.finish().unwrap();

    let outputs = root.outputs().unwrap();
    // floor((end - begin) / period) + 1
    assert_eq!(outputs["view"].row_count(), 7);
    assert_eq!(outputs["view"].times().last(), Some(&4.0));
}

#[test]
fn test_finish_view_has_one_row_at_final_time() {
    let mut root = root();
    root.load_graph(
        &ExperimentConfig::new("end", 0.0, 5.0),
        pipeline("generator", InitConditions::new()),
        vec![ViewSpec::finish("last").observe("top:A", "emitted")],
    )
    .unwrap();
    root.run_all().unwrap();
    root.finish().unwrap();

    let outputs = root.outputs().unwrap();
    let matrix = &outputs["last"];
    assert_eq!(matrix.row_count(), 1);
    assert_eq!(matrix.times(), vec![5.0]);
    assert_eq!(matrix.get(0, "top:A.emitted"), Some(&Value::Integer(6)));
}

#[test]
fn test_init_replays_loaded_experiment() {
    let mut root = root();
    root.load_graph(
        &ExperimentConfig::new("again", 0.0, 4.0),
        pipeline("generator", InitConditions::new()),
        vec![ViewSpec::timed("view", 1.0).observe("top:B", "in")],
    )
    .unwrap();
    let first_id = root.run_id();
    let steps = root.run_all().unwrap();
    let first = root.outputs().unwrap();

    root.init().unwrap();
    assert_eq!(root.state(), RunState::NotStarted);
    assert_eq!(root.current_time(), 0.0);
    assert_ne!(root.run_id(), first_id);
    assert_eq!(root.run_all().unwrap(), steps);
    assert_eq!(root.outputs().unwrap(), first);
}

#[test]
fn test_run_before_load() {
    let mut root = root();
    assert!(matches!(root.run(), Err(SimulationError::NotLoaded)));
    assert!(matches!(root.init(), Err(SimulationError::NotLoaded)));
}

#[test]
fn test_project_file_end_to_end() {
    init_logger();
    let project = ProjectConfig::from_json_str(
        r#"{
            "experiment": {"name": "json", "begin": 0.0, "duration": 3.0},
            "conditions": {"src": {"period": {"double": 1.0}, "value": {"integer": 7}}},
            "model": {
                "type": "coupled",
                "name": "top",
                "outputs": ["out"],
                "children": [
                    {"type": "atomic", "name": "A", "outputs": ["out"],
                     "dynamics": "generator", "conditions": ["src"]},
                    {"type": "atomic", "name": "C", "inputs": ["in"], "outputs": ["count"],
                     "dynamics": "counter"}
                ],
                "connections": [
                    {"kind": "internal", "source": {"model": "A", "port": "out"},
                     "target": {"model": "C", "port": "in"}},
                    {"kind": "output", "source": {"model": "C", "port": "count"},
                     "target": {"port": "out"}}
                ]
            },
            "views": [
                {"name": "counts", "kind": "event",
                 "observables": [{"model": "top:C", "port": "count"}]}
            ]
        }"#,
    )
    .unwrap();

    let mut root = root();
    root.load(&project).unwrap();
    root.run_all().unwrap();

    let outputs = root.take_root_outputs();
    let counts: Vec<Value> = outputs.into_iter().map(|o| o.value).collect();
    assert_eq!(
        counts,
        (1..=4).map(Value::Integer).collect::<Vec<_>>()
    );

    root.finish().unwrap();
    let outputs = root.outputs().unwrap();
    assert_eq!(
        outputs["counts"].get(3, "top:C.count"),
        Some(&Value::Integer(4))
    );
}

#[test]
fn test_own_confluent_transition_runs_once() {
    let config = KernelConfig::new().with_confluent_policy(ConfluentPolicy::ExternalFirst);
    assert_eq!(simultaneous_events(config, true), vec!["conf@1"]);
}

#[test]
fn test_confluent_policy_orders_transitions() {
    let config = KernelConfig::new().with_confluent_policy(ConfluentPolicy::ExternalFirst);
    assert_eq!(simultaneous_events(config, false), vec!["ext@1", "int@1"]);
    assert_eq!(
        simultaneous_events(KernelConfig::default(), false),
        vec!["int@1", "ext@1"]
    );
}

#[test]
fn test_failed_reload_stops_previous_run() {
    let mut root = root();
    root.load_graph(
        &ExperimentConfig::new("first", 0.0, 5.0),
        pipeline("generator", InitConditions::new()),
        vec![ViewSpec::timed("view", 1.0).observe("top:B", "in")],
    )
    .unwrap();
    assert!(root.run().unwrap());

    let broken = ProjectConfig::from_json_str(
        r#"{"experiment": {"duration": 1.0},
            "model": {"type": "coupled", "name": "top", "children": [
                {"type": "atomic", "name": "A", "dynamics": "counter", "conditions": ["nope"]}
            ]}}"#,
    )
    .unwrap();
    assert!(matches!(root.load(&broken), Err(SimulationError::Config(_))));
    assert_eq!(root.state(), RunState::Failed);
    assert!(root.coordinator().is_none());
    assert!(root.outputs().is_none());
    assert!(matches!(root.run(), Err(SimulationError::NotResumable)));

    let invalid = ExperimentConfig::new("second", 0.0, -1.0);
    let graph = pipeline("generator", InitConditions::new());
    assert!(root.load_graph(&invalid, graph, vec![]).is_err());
    assert!(matches!(root.run(), Err(SimulationError::NotResumable)));

    root.load_graph(
        &ExperimentConfig::new("third", 0.0, 2.0),
        pipeline("generator", InitConditions::new()),
        vec![],
    )
    .unwrap();
    assert_eq!(root.state(), RunState::NotStarted);
    assert_eq!(root.run_all().unwrap(), 3);
}
