use crate::core::dynamics::{DynamicsInit, DynamicsRegistry, ExternalEvent};
use crate::core::error::{DynamicsError, SimResult, SimulationError, StructuralError};
use crate::core::execution::config::KernelConfig;
use crate::core::execution::scheduler::Scheduler;
use crate::core::execution::simulator::Simulator;
use crate::core::graph::{ModelGraph, ModelKind, PortValidator};
use crate::core::observation::stream::StreamWriter;
use crate::core::observation::{Matrix, Observable, OutputSpec, View, ViewKind, ViewSink, ViewSpec};
use crate::core::types::{ModelId, SimulatorId, Time, INFINITY};
use crate::core::values::Value;
use log::{debug, info, trace, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

/// Where a value emitted on an output port ends up
#[derive(Debug, Clone, PartialEq)]
enum Destination {
    /// Input port of an atomic model
    Simulator { simulator: SimulatorId, port: String },
    /// Output port of the root coupled model
    Root { port: String },
}

/// A value that left the root coupled model
#[derive(Debug, Clone, PartialEq)]
pub struct RootOutput {
    pub time: Time,
    pub port: String,
    pub value: Value,
}

/// Owns the simulators, the scheduler and the views of one run.
///
/// Routing tables are flattened at `init`: every (simulator, output port)
/// maps directly to the atomic input ports and root output ports it reaches
/// through the internal, external-output and external-input relations.
pub struct Coordinator {
    config: KernelConfig,
    registry: Arc<DynamicsRegistry>,
    view_specs: Vec<ViewSpec>,
    seed: u64,
    run_id: String,
    graph: ModelGraph,
    simulators: Vec<Simulator>,
    simulator_of: HashMap<ModelId, SimulatorId>,
    routes: HashMap<(SimulatorId, String), Vec<Destination>>,
    scheduler: Scheduler,
    views: Vec<View>,
    root_outputs: Vec<RootOutput>,
    begin: Time,
    end: Time,
    last_time: Time,
    steps: u64,
    failed: bool,
    finished: bool,
}

impl Coordinator {
    pub fn new(
        config: KernelConfig,
        registry: Arc<DynamicsRegistry>,
        view_specs: Vec<ViewSpec>,
        seed: u64,
        run_id: String,
    ) -> Self {
        Self {
            config,
            registry,
            view_specs,
            seed,
            run_id,
            graph: ModelGraph::new("top"),
            simulators: Vec::new(),
            simulator_of: HashMap::new(),
            routes: HashMap::new(),
            scheduler: Scheduler::new(0),
            views: Vec::new(),
            root_outputs: Vec::new(),
            begin: 0.0,
            end: 0.0,
            last_time: 0.0,
            steps: 0,
            failed: false,
            finished: false,
        }
    }

    /// Build simulators, routes and views for `graph` and schedule the first events
    pub fn init(&mut self, graph: ModelGraph, begin: Time, end: Time) -> SimResult<()> {
        PortValidator::validate_graph(&graph)?;

        self.graph = graph;
        self.begin = begin;
        self.end = end;
        self.last_time = begin;
        self.steps = 0;
        self.failed = false;
        self.finished = false;
        self.simulators.clear();
        self.simulator_of.clear();
        self.routes.clear();
        self.views.clear();
        self.root_outputs.clear();

        self.create_simulators()?;
        self.build_routes();

        self.scheduler = Scheduler::new(self.simulators.len());
        for index in 0..self.simulators.len() {
            let next = self.simulators[index].init(begin)?;
            self.scheduler.schedule(SimulatorId(index), next);
        }

        self.create_views()?;
        for view in self.views.iter_mut() {
            if let ViewKind::Event = view.kind() {
                sample_view(view, &self.simulators, None, begin)?;
            }
        }
        self.flush_views()?;

        info!(
            "run {}: {} simulator(s), {} view(s), t=[{}, {}]",
            self.run_id,
            self.simulators.len(),
            self.views.len(),
            begin,
            end
        );
        Ok(())
    }

    fn create_simulators(&mut self) -> SimResult<()> {
        let mut master = StdRng::seed_from_u64(self.seed);
        for model in self.graph.preorder_atomics() {
            let node = self
                .graph
                .node(model)
                .ok_or_else(|| StructuralError::UnknownModel(model.to_string()))?;
            let atomic = match node.kind() {
                ModelKind::Atomic(atomic) => atomic,
                ModelKind::Coupled(_) => continue,
            };
            let path = self.graph.path(model);
            let parent_path = node
                .parent()
                .map(|parent| self.graph.path(parent))
                .unwrap_or_default();

            let init = DynamicsInit {
                model: path.clone(),
                conditions: atomic.conditions.clone(),
                rng: StdRng::seed_from_u64(master.gen()),
            };
            let dynamics = match self.registry.create(&atomic.dynamics, init) {
                Some(Ok(dynamics)) => dynamics,
                Some(Err(source)) => {
                    return Err(SimulationError::Behavioral {
                        model: path,
                        time: self.begin,
                        source,
                    })
                }
                None => {
                    return Err(StructuralError::UnknownDynamics {
                        model: path,
                        name: atomic.dynamics.clone(),
                    }
                    .into())
                }
            };

            let id = SimulatorId(self.simulators.len());
            debug!("{} -> {} ({})", id, path, atomic.dynamics);
            self.simulator_of.insert(model, id);
            self.simulators
                .push(Simulator::new(id, model, path, parent_path, dynamics));
        }
        Ok(())
    }

    fn build_routes(&mut self) {
        let mut routes = HashMap::new();
        for simulator in &self.simulators {
            let node = match self.graph.node(simulator.model()) {
                Some(node) => node,
                None => continue,
            };
            for port in node.output_ports() {
                let mut destinations = Vec::new();
                self.route_output(simulator.model(), port, &mut destinations);
                routes.insert((simulator.id(), port.to_string()), destinations);
            }
        }
        self.routes = routes;
    }

    /// Follow an output port of `model` upwards and across siblings
    fn route_output(&self, model: ModelId, port: &str, destinations: &mut Vec<Destination>) {
        let parent = match self.graph.node(model).and_then(|node| node.parent()) {
            Some(parent) => parent,
            None => {
                destinations.push(Destination::Root {
                    port: port.to_string(),
                });
                return;
            }
        };
        let coupled = match self.graph.node(parent).and_then(|node| node.as_coupled()) {
            Some(coupled) => coupled,
            None => return,
        };
        for connection in &coupled.internal_connections {
            if connection.source.model == model && connection.source.port == port {
                self.route_input(connection.target.model, &connection.target.port, destinations);
            }
        }
        for connection in &coupled.output_connections {
            if connection.source.model == model && connection.source.port == port {
                self.route_output(parent, &connection.target.port, destinations);
            }
        }
    }

    /// Follow an input port of `model` down to atomic models
    fn route_input(&self, model: ModelId, port: &str, destinations: &mut Vec<Destination>) {
        let node = match self.graph.node(model) {
            Some(node) => node,
            None => return,
        };
        match node.kind() {
            ModelKind::Atomic(_) => {
                if let Some(simulator) = self.simulator_of.get(&model) {
                    destinations.push(Destination::Simulator {
                        simulator: *simulator,
                        port: port.to_string(),
                    });
                }
            }
            ModelKind::Coupled(coupled) => {
                for connection in &coupled.input_connections {
                    if connection.source.port == port {
                        self.route_input(
                            connection.target.model,
                            &connection.target.port,
                            destinations,
                        );
                    }
                }
            }
        }
    }

    /// Open every configured view. On failure the views opened so far are
    /// closed, so their consumers still receive `Close`.
    fn create_views(&mut self) -> SimResult<()> {
        let result = self.open_views();
        if result.is_err() {
            for view in self.views.iter_mut() {
                if let Err(e) = view.close(self.begin) {
                    warn!("closing view '{}': {}", view.name(), e);
                }
            }
        }
        result
    }

    fn open_views(&mut self) -> SimResult<()> {
        let specs = self.view_specs.clone();
        let mut names = BTreeSet::new();
        for spec in specs {
            if !names.insert(spec.name.clone()) {
                return Err(SimulationError::config(format!(
                    "duplicate view '{}'",
                    spec.name
                )));
            }
            spec.kind.validate(&spec.name)?;
            let sink = match &spec.output {
                OutputSpec::Storage => ViewSink::Storage(Matrix::new()),
                OutputSpec::Stream(stream) => ViewSink::Stream(StreamWriter::connect(
                    &stream.host,
                    stream.port,
                    self.config.stream_write_timeout,
                    self.config.stream_buffer_size,
                )?),
            };
            let mut view = View::new(&spec.name, spec.kind, self.begin, sink)?;
            let bound = self.bind_view(&mut view, &spec);
            self.views.push(view);
            bound?;
        }
        Ok(())
    }

    fn bind_view(&self, view: &mut View, spec: &ViewSpec) -> SimResult<()> {
        if let OutputSpec::Stream(stream) = &spec.output {
            view.open_stream(
                &stream.plugin,
                stream.location.as_deref().unwrap_or(&self.run_id),
                stream.file.as_deref().unwrap_or(&spec.name),
                stream.parameter.clone(),
            )?;
        }
        for observable in &spec.observables {
            let observable = self.resolve_observable(&observable.model, &observable.port)?;
            view.add_observable(observable, self.begin)?;
        }
        Ok(())
    }

    fn resolve_observable(&self, model: &str, port: &str) -> SimResult<Observable> {
        let id = self
            .graph
            .find(model)
            .ok_or_else(|| StructuralError::UnknownModel(model.to_string()))?;
        let simulator = *self.simulator_of.get(&id).ok_or_else(|| {
            StructuralError::UnknownModel(format!("{} (not an atomic model)", model))
        })?;
        let simulator_ref = &self.simulators[simulator.0];
        Ok(Observable {
            simulator,
            model: simulator_ref.path().to_string(),
            parent: simulator_ref.parent_path().to_string(),
            port: port.to_string(),
        })
    }

    /// Time of the next step: earliest internal event or timed view sample
    pub fn current_time(&self) -> Time {
        self.views
            .iter()
            .map(View::next_time)
            .fold(self.scheduler.next_time(), f64::min)
    }

    /// Execute one step at `current_time()`.
    ///
    /// Any error stops the run for good: later calls return `NotResumable`.
    pub fn run(&mut self) -> SimResult<()> {
        if self.failed || self.finished {
            return Err(SimulationError::NotResumable);
        }
        let time = self.current_time();
        if time == INFINITY {
            return Ok(());
        }
        match self.step(time) {
            Ok(()) => {
                self.last_time = time;
                self.steps += 1;
                Ok(())
            }
            Err(e) => {
                self.failed = true;
                Err(e)
            }
        }
    }

    fn step(&mut self, time: Time) -> SimResult<()> {
        debug!("step {} at t={}", self.steps + 1, time);

        let mut iterations = 0;
        loop {
            // every output of the round is routed before any transition runs
            let imminent = self.pop_imminent(time);
            if imminent.is_empty() {
                break;
            }
            iterations += 1;
            if iterations > self.config.max_cascade_iterations {
                return Err(StructuralError::InstantaneousCascade {
                    time,
                    iterations: self.config.max_cascade_iterations,
                }
                .into());
            }

            let mut bags: BTreeMap<SimulatorId, Vec<ExternalEvent>> = BTreeMap::new();
            for id in &imminent {
                let outputs = self.simulators[id.0].output(time)?;
                for (port, value) in outputs {
                    self.route(*id, &port, value, time, &mut bags)?;
                }
            }

            let due: BTreeSet<SimulatorId> =
                imminent.iter().copied().chain(bags.keys().copied()).collect();
            for id in due {
                let internal = imminent.contains(&id);
                let simulator = &mut self.simulators[id.0];
                let next = match (internal, bags.remove(&id)) {
                    (true, Some(events)) => {
                        simulator.confluent(&events, time, self.config.confluent_policy)?
                    }
                    (true, None) => simulator.internal(time)?,
                    (false, Some(events)) => simulator.external(&events, time)?,
                    (false, None) => continue,
                };
                // a zero time advance makes it imminent again in the next round
                self.scheduler.schedule(id, next);
                self.sample_event_views(id, time)?;
            }
        }

        for view in self.views.iter_mut() {
            if view.next_time() == time {
                sample_view(view, &self.simulators, None, time)?;
                view.advance();
            }
        }
        self.flush_views()
    }

    fn pop_imminent(&mut self, time: Time) -> Vec<SimulatorId> {
        if self.scheduler.next_time() == time {
            self.scheduler.pop_imminent(time)
        } else {
            Vec::new()
        }
    }

    /// Deliver one emitted value to every destination of its port
    fn route(
        &mut self,
        source: SimulatorId,
        port: &str,
        value: Value,
        time: Time,
        bags: &mut BTreeMap<SimulatorId, Vec<ExternalEvent>>,
    ) -> SimResult<()> {
        let destinations = match self.routes.get(&(source, port.to_string())) {
            Some(destinations) => destinations,
            None => {
                return Err(SimulationError::Behavioral {
                    model: self.simulators[source.0].path().to_string(),
                    time,
                    source: DynamicsError::new(format!(
                        "emitted on undeclared output port '{}'",
                        port
                    )),
                })
            }
        };
        for destination in destinations {
            match destination {
                Destination::Simulator { simulator, port: target } => {
                    trace!("t={} {}.{} -> {}.{}", time, source, port, simulator, target);
                    bags.entry(*simulator)
                        .or_default()
                        .push(ExternalEvent::new(target, value.clone()));
                }
                Destination::Root { port: target } => {
                    trace!("t={} {}.{} -> root output {}", time, source, port, target);
                    self.root_outputs.push(RootOutput {
                        time,
                        port: target.clone(),
                        value: value.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    fn sample_event_views(&mut self, simulator: SimulatorId, time: Time) -> SimResult<()> {
        for view in self.views.iter_mut() {
            if let ViewKind::Event = view.kind() {
                sample_view(view, &self.simulators, Some(simulator), time)?;
            }
        }
        Ok(())
    }

    fn flush_views(&mut self) -> SimResult<()> {
        for view in self.views.iter_mut() {
            view.flush()?;
        }
        Ok(())
    }

    /// Sample finish views, close every view and release the dynamics.
    /// Calling it again is a no-op.
    pub fn finish(&mut self) -> SimResult<()> {
        if self.finished {
            return Ok(());
        }
        self.finished = true;
        let time = self.last_time;
        let mut result = Ok(());
        for view in self.views.iter_mut() {
            if let ViewKind::Finish = view.kind() {
                if let Err(e) = sample_view(view, &self.simulators, None, time) {
                    result = result.and(Err(e));
                }
            }
            // keep the first error but still close the remaining views
            if let Err(e) = view.close(time) {
                result = result.and(Err(e));
            }
        }
        for simulator in self.simulators.iter_mut() {
            simulator.finish();
        }
        info!("run {} finished at t={} after {} step(s)", self.run_id, time, self.steps);
        result
    }

    /// Bind (model, port) to a view during a run
    pub fn add_observable(&mut self, view: &str, model: &str, port: &str) -> SimResult<()> {
        let observable = self.resolve_observable(model, port)?;
        let time = self.last_time;
        let sampled = self.steps > 0;
        let view = self.view_mut(view)?;
        view.add_observable(observable, time)?;
        view.catch_up(time, sampled);
        Ok(())
    }

    /// Remove a binding; returns false if it did not exist
    pub fn del_observable(&mut self, view: &str, model: &str, port: &str) -> SimResult<bool> {
        let observable = self.resolve_observable(model, port)?;
        let time = self.last_time;
        self.view_mut(view)?
            .del_observable(observable.simulator, port, time)
    }

    fn view_mut(&mut self, name: &str) -> SimResult<&mut View> {
        self.views
            .iter_mut()
            .find(|view| view.name() == name)
            .ok_or_else(|| SimulationError::config(format!("view '{}' not found", name)))
    }

    pub fn views(&self) -> &[View] {
        &self.views
    }

    pub fn simulators(&self) -> &[Simulator] {
        &self.simulators
    }

    /// Copy of every storage view's matrix, keyed by view name
    pub fn matrices(&self) -> BTreeMap<String, Matrix> {
        self.views
            .iter()
            .filter_map(|view| view.matrix().map(|m| (view.name().to_string(), m.clone())))
            .collect()
    }

    /// Move every storage view's matrix out
    pub fn take_matrices(&mut self) -> BTreeMap<String, Matrix> {
        self.views
            .iter_mut()
            .filter_map(|view| {
                let name = view.name().to_string();
                view.take_matrix().map(|m| (name, m))
            })
            .collect()
    }

    /// True if at least one view accumulates in process
    pub fn has_storage(&self) -> bool {
        self.views.iter().any(|view| !view.is_stream())
    }

    /// Drain the values that left the root model so far
    pub fn take_root_outputs(&mut self) -> Vec<RootOutput> {
        std::mem::take(&mut self.root_outputs)
    }

    pub fn graph(&self) -> &ModelGraph {
        &self.graph
    }

    pub fn begin(&self) -> Time {
        self.begin
    }

    pub fn end(&self) -> Time {
        self.end
    }

    /// Time of the last executed step, `begin` before the first one
    pub fn last_time(&self) -> Time {
        self.last_time
    }

    pub fn steps(&self) -> u64 {
        self.steps
    }

    pub fn is_failed(&self) -> bool {
        self.failed
    }
}

/// Sample the bindings of `view`, restricted to one simulator if given
fn sample_view(
    view: &mut View,
    simulators: &[Simulator],
    only: Option<SimulatorId>,
    time: Time,
) -> SimResult<()> {
    let bindings: Vec<(usize, SimulatorId, String)> = view
        .observables()
        .iter()
        .enumerate()
        .filter(|(_, o)| only.map_or(true, |id| o.simulator == id))
        .map(|(index, o)| (index, o.simulator, o.port.clone()))
        .collect();
    for (index, simulator, port) in bindings {
        let value = simulators
            .get(simulator.0)
            .and_then(|s| s.observation(&port, time));
        view.record(index, time, value)?;
    }
    Ok(())
}
