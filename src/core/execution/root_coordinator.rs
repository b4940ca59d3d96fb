use crate::core::config::{ExperimentConfig, ProjectConfig};
use crate::core::dynamics::DynamicsRegistry;
use crate::core::error::{SimResult, SimulationError};
use crate::core::execution::config::KernelConfig;
use crate::core::execution::coordinator::{Coordinator, RootOutput};
use crate::core::graph::ModelGraph;
use crate::core::observation::{Matrix, ViewSpec};
use crate::core::types::{is_infinity, Time};
use log::{info, warn};
use std::collections::BTreeMap;
use std::sync::Arc;
use uuid::Uuid;

/// Lifecycle of a loaded experiment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    /// Loaded, no step executed yet
    NotStarted,
    Running,
    /// End time reached or `finish()` called
    Finished,
    /// A fatal error stopped the run
    Failed,
}

/// Per-view result tables, keyed by view name
pub type Outputs = BTreeMap<String, Matrix>;

/// Top-level driver of one experiment.
///
/// `run()` executes a single step and hands control back to the caller, who
/// decides when to call it again. `run_all()` loops until the end time.
pub struct RootCoordinator {
    config: KernelConfig,
    registry: Arc<DynamicsRegistry>,
    coordinator: Option<Coordinator>,
    graph: Option<ModelGraph>,
    views: Vec<ViewSpec>,
    experiment: String,
    seed: u64,
    run_id: Option<Uuid>,
    begin: Time,
    end: Time,
    current_time: Time,
    state: RunState,
    results: Option<Outputs>,
}

impl RootCoordinator {
    pub fn new(config: KernelConfig, registry: DynamicsRegistry) -> Self {
        Self {
            config,
            registry: Arc::new(registry),
            coordinator: None,
            graph: None,
            views: Vec::new(),
            experiment: String::new(),
            seed: 0,
            run_id: None,
            begin: 0.0,
            end: 0.0,
            current_time: 0.0,
            state: RunState::NotStarted,
            results: None,
        }
    }

    /// Load a project: build its graph and initialise a fresh coordinator.
    ///
    /// Any previous run is discarded first, even when the project turns out
    /// to be invalid; a failed load leaves the root coordinator `Failed`.
    pub fn load(&mut self, project: &ProjectConfig) -> SimResult<()> {
        self.discard();
        let graph = project
            .validate()
            .and_then(|_| project.build_graph())
            .map_err(|e| self.fail(e))?;
        self.load_graph(&project.experiment, graph, project.views.clone())
    }

    /// Load an already built graph. Any previous run is discarded.
    pub fn load_graph(
        &mut self,
        experiment: &ExperimentConfig,
        graph: ModelGraph,
        views: Vec<ViewSpec>,
    ) -> SimResult<()> {
        self.discard();
        experiment.validate().map_err(|e| self.fail(e))?;

        self.experiment = experiment.name.clone();
        self.seed = experiment.seed;
        self.begin = experiment.begin;
        self.end = experiment.end();
        self.graph = Some(graph);
        self.views = views;
        self.init()
    }

    fn discard(&mut self) {
        if let Some(mut coordinator) = self.coordinator.take() {
            if let Err(e) = coordinator.finish() {
                warn!("discarding previous run: {}", e);
            }
        }
        self.graph = None;
        self.run_id = None;
        self.results = None;
    }

    fn fail(&mut self, error: SimulationError) -> SimulationError {
        warn!("load failed: {}", error);
        self.state = RunState::Failed;
        error
    }

    /// Restart the loaded experiment from `begin`, keeping its graph
    pub fn init(&mut self) -> SimResult<()> {
        let graph = self.graph.clone().ok_or(SimulationError::NotLoaded)?;
        if let Some(mut coordinator) = self.coordinator.take() {
            if let Err(e) = coordinator.finish() {
                warn!("restarting run: {}", e);
            }
        }

        let run_id = Uuid::new_v4();
        self.run_id = Some(run_id);
        self.current_time = self.begin;
        self.results = None;

        let mut coordinator = Coordinator::new(
            self.config.clone(),
            Arc::clone(&self.registry),
            self.views.clone(),
            self.seed,
            run_id.to_string(),
        );
        match coordinator.init(graph, self.begin, self.end) {
            Ok(()) => {
                info!(
                    "loaded experiment '{}' (run {}), t=[{}, {}]",
                    self.experiment, run_id, self.begin, self.end
                );
                self.coordinator = Some(coordinator);
                self.state = RunState::NotStarted;
                Ok(())
            }
            Err(e) => {
                self.state = RunState::Failed;
                Err(e)
            }
        }
    }

    /// Execute one step. Returns false once there is nothing left to do
    /// before the end time.
    pub fn run(&mut self) -> SimResult<bool> {
        if self.state == RunState::Failed {
            return Err(SimulationError::NotResumable);
        }
        let coordinator = match self.coordinator.as_mut() {
            Some(coordinator) => coordinator,
            None if self.state == RunState::Finished => return Ok(false),
            None => return Err(SimulationError::NotLoaded),
        };

        self.current_time = coordinator.current_time();
        if is_infinity(self.current_time) || self.end - self.current_time < 0.0 {
            self.state = RunState::Finished;
            return Ok(false);
        }

        match coordinator.run() {
            Ok(()) => {
                self.state = RunState::Running;
                Ok(true)
            }
            Err(e) => {
                warn!("run stopped at t={}: {}", self.current_time, e);
                self.state = RunState::Failed;
                Err(e)
            }
        }
    }

    /// Step until the end time; returns the number of executed steps
    pub fn run_all(&mut self) -> SimResult<u64> {
        let mut steps = 0;
        while self.run()? {
            steps += 1;
        }
        Ok(steps)
    }

    /// Flush finish views, keep the result tables and tear the run down.
    /// A second call is a no-op.
    pub fn finish(&mut self) -> SimResult<()> {
        let mut coordinator = match self.coordinator.take() {
            Some(coordinator) => coordinator,
            None => return Ok(()),
        };
        let result = coordinator.finish();
        if coordinator.has_storage() {
            self.results = Some(coordinator.take_matrices());
        }
        self.graph = None;
        if self.state != RunState::Failed {
            self.state = RunState::Finished;
        }
        info!("experiment '{}' finished", self.experiment);
        result
    }

    /// Result tables.
    ///
    /// While the run is alive this is a copy of the current tables. After
    /// `finish()` the stored tables are handed over once; later calls return
    /// `None`. `None` as well when no view stores in process.
    pub fn outputs(&mut self) -> Option<Outputs> {
        match &self.coordinator {
            Some(coordinator) if coordinator.has_storage() => Some(coordinator.matrices()),
            Some(_) => None,
            None => self.results.take(),
        }
    }

    /// Values that left the root model since the last call
    pub fn take_root_outputs(&mut self) -> Vec<RootOutput> {
        self.coordinator
            .as_mut()
            .map(Coordinator::take_root_outputs)
            .unwrap_or_default()
    }

    pub fn add_observable(&mut self, view: &str, model: &str, port: &str) -> SimResult<()> {
        self.coordinator
            .as_mut()
            .ok_or(SimulationError::NotLoaded)?
            .add_observable(view, model, port)
    }

    pub fn del_observable(&mut self, view: &str, model: &str, port: &str) -> SimResult<bool> {
        self.coordinator
            .as_mut()
            .ok_or(SimulationError::NotLoaded)?
            .del_observable(view, model, port)
    }

    pub fn coordinator(&self) -> Option<&Coordinator> {
        self.coordinator.as_ref()
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    /// Time of the last step attempted, `begin` right after loading
    pub fn current_time(&self) -> Time {
        self.current_time
    }

    pub fn begin(&self) -> Time {
        self.begin
    }

    pub fn end(&self) -> Time {
        self.end
    }

    pub fn run_id(&self) -> Option<Uuid> {
        self.run_id
    }

    pub fn config(&self) -> &KernelConfig {
        &self.config
    }
}

impl Default for RootCoordinator {
    fn default() -> Self {
        Self::new(KernelConfig::default(), DynamicsRegistry::with_builtins())
    }
}
