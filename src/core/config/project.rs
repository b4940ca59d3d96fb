//! Serde model of a project file.
//!
//! A project holds the experiment window, named condition sets, the model
//! hierarchy and the views. It is read from JSON and turned into a
//! `ModelGraph` for the root coordinator.

use crate::core::dynamics::InitConditions;
use crate::core::error::{SimResult, SimulationError, StructuralError};
use crate::core::graph::{ModelGraph, PATH_SEPARATOR};
use crate::core::observation::ViewSpec;
use crate::core::types::{ModelId, Time};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentConfig {
    #[serde(default = "default_experiment_name")]
    pub name: String,
    #[serde(default)]
    pub begin: Time,
    pub duration: Time,
    #[serde(default)]
    pub seed: u64,
}

fn default_experiment_name() -> String {
    "experiment".to_string()
}

impl ExperimentConfig {
    pub fn new(name: &str, begin: Time, duration: Time) -> Self {
        Self {
            name: name.to_string(),
            begin,
            duration,
            seed: 0,
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn end(&self) -> Time {
        self.begin + self.duration
    }

    pub fn validate(&self) -> SimResult<()> {
        if !self.begin.is_finite() {
            return Err(SimulationError::config(format!(
                "experiment '{}': begin must be finite, found {}",
                self.name, self.begin
            )));
        }
        if !self.duration.is_finite() || self.duration < 0.0 {
            return Err(SimulationError::config(format!(
                "experiment '{}': duration must be finite and non-negative, found {}",
                self.name, self.duration
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionKind {
    /// Coupled input port to a child input port
    Input,
    /// Child output port to a sibling input port
    Internal,
    /// Child output port to a coupled output port
    Output,
}

/// Port reference inside a coupled model; `model` is a child name, or
/// absent for the coupled model itself
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortRefConfig {
    #[serde(default)]
    pub model: Option<String>,
    pub port: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    pub kind: ConnectionKind,
    pub source: PortRefConfig,
    pub target: PortRefConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ModelConfig {
    Atomic {
        name: String,
        #[serde(default)]
        inputs: Vec<String>,
        #[serde(default)]
        outputs: Vec<String>,
        dynamics: String,
        /// Names of condition sets, merged in order
        #[serde(default)]
        conditions: Vec<String>,
    },
    Coupled {
        name: String,
        #[serde(default)]
        inputs: Vec<String>,
        #[serde(default)]
        outputs: Vec<String>,
        #[serde(default)]
        children: Vec<ModelConfig>,
        #[serde(default)]
        connections: Vec<ConnectionConfig>,
    },
}

impl ModelConfig {
    pub fn name(&self) -> &str {
        match self {
            ModelConfig::Atomic { name, .. } | ModelConfig::Coupled { name, .. } => name,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectConfig {
    pub experiment: ExperimentConfig,
    #[serde(default)]
    pub conditions: BTreeMap<String, InitConditions>,
    pub model: ModelConfig,
    #[serde(default)]
    pub views: Vec<ViewSpec>,
}

impl ProjectConfig {
    /// Parse and validate a project from JSON text
    pub fn from_json_str(text: &str) -> SimResult<Self> {
        let project: ProjectConfig = serde_json::from_str(text)
            .map_err(|e| SimulationError::config(format!("invalid project: {}", e)))?;
        project.validate()?;
        Ok(project)
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> SimResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            SimulationError::config(format!("cannot read '{}': {}", path.display(), e))
        })?;
        Self::from_json_str(&text)
    }

    /// Checks that do not need the model graph
    pub fn validate(&self) -> SimResult<()> {
        self.experiment.validate()?;
        if let ModelConfig::Atomic { name, .. } = &self.model {
            return Err(SimulationError::config(format!(
                "root model '{}' must be coupled",
                name
            )));
        }
        for view in &self.views {
            view.kind.validate(&view.name)?;
        }
        Ok(())
    }

    /// Build the model graph described by `model`
    pub fn build_graph(&self) -> SimResult<ModelGraph> {
        let (name, inputs, outputs, children, connections) = match &self.model {
            ModelConfig::Coupled {
                name,
                inputs,
                outputs,
                children,
                connections,
            } => (name, inputs, outputs, children, connections),
            ModelConfig::Atomic { name, .. } => {
                return Err(SimulationError::config(format!(
                    "root model '{}' must be coupled",
                    name
                )))
            }
        };
        check_name(name)?;
        let mut graph = ModelGraph::new(name);
        let root = graph.root();
        add_ports(&mut graph, root, inputs, outputs)?;
        self.add_children(&mut graph, root, children, connections)?;
        Ok(graph)
    }

    fn add_children(
        &self,
        graph: &mut ModelGraph,
        parent: ModelId,
        children: &[ModelConfig],
        connections: &[ConnectionConfig],
    ) -> SimResult<()> {
        let mut ids = HashMap::new();
        for child in children {
            check_name(child.name())?;
            let id = match child {
                ModelConfig::Atomic {
                    name,
                    inputs,
                    outputs,
                    dynamics,
                    conditions,
                } => {
                    let merged = self.merge_conditions(name, conditions)?;
                    let id = graph.add_atomic(parent, name, dynamics, merged)?;
                    add_ports(graph, id, inputs, outputs)?;
                    id
                }
                ModelConfig::Coupled {
                    name,
                    inputs,
                    outputs,
                    children,
                    connections,
                } => {
                    let id = graph.add_coupled(parent, name)?;
                    add_ports(graph, id, inputs, outputs)?;
                    self.add_children(graph, id, children, connections)?;
                    id
                }
            };
            ids.insert(child.name().to_string(), id);
        }

        let child = |reference: &PortRefConfig, graph: &ModelGraph| -> SimResult<ModelId> {
            let name = reference.model.as_deref().ok_or_else(|| {
                SimulationError::config(format!(
                    "connection in '{}' needs a child model for port '{}'",
                    graph.path(parent),
                    reference.port
                ))
            })?;
            ids.get(name).copied().ok_or_else(|| {
                StructuralError::UnknownModel(format!(
                    "{}{}{}",
                    graph.path(parent),
                    PATH_SEPARATOR,
                    name
                ))
                .into()
            })
        };
        let itself = |reference: &PortRefConfig, graph: &ModelGraph| -> SimResult<()> {
            match &reference.model {
                None => Ok(()),
                Some(name) => Err(SimulationError::config(format!(
                    "connection in '{}' must use the coupled model's own port, found model '{}'",
                    graph.path(parent),
                    name
                ))),
            }
        };

        for connection in connections {
            match connection.kind {
                ConnectionKind::Input => {
                    itself(&connection.source, graph)?;
                    let target = child(&connection.target, graph)?;
                    graph.connect_input(
                        parent.input(&connection.source.port),
                        target.input(&connection.target.port),
                    )?;
                }
                ConnectionKind::Internal => {
                    let source = child(&connection.source, graph)?;
                    let target = child(&connection.target, graph)?;
                    graph.connect_internal(
                        source.output(&connection.source.port),
                        target.input(&connection.target.port),
                    )?;
                }
                ConnectionKind::Output => {
                    let source = child(&connection.source, graph)?;
                    itself(&connection.target, graph)?;
                    graph.connect_output(
                        source.output(&connection.source.port),
                        parent.output(&connection.target.port),
                    )?;
                }
            }
        }
        Ok(())
    }

    fn merge_conditions(&self, model: &str, names: &[String]) -> SimResult<InitConditions> {
        let mut merged = InitConditions::new();
        for name in names {
            let conditions = self.conditions.get(name).ok_or_else(|| {
                SimulationError::config(format!(
                    "model '{}' uses unknown condition '{}'",
                    model, name
                ))
            })?;
            merged.merge(conditions);
        }
        Ok(merged)
    }
}

fn check_name(name: &str) -> SimResult<()> {
    if name.is_empty() || name.contains(PATH_SEPARATOR) {
        return Err(SimulationError::config(format!(
            "invalid model name '{}'",
            name
        )));
    }
    Ok(())
}

fn add_ports(
    graph: &mut ModelGraph,
    model: ModelId,
    inputs: &[String],
    outputs: &[String],
) -> SimResult<()> {
    for port in inputs {
        graph.add_input_port(model, port)?;
    }
    for port in outputs {
        graph.add_output_port(model, port)?;
    }
    Ok(())
}
