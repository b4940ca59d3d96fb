pub mod core;

// Re-export commonly used types
pub use crate::core::config::{ExperimentConfig, ProjectConfig};
pub use crate::core::dynamics::{
    Dynamics, DynamicsInit, DynamicsRegistry, DynamicsResult, ExternalEvent, InitConditions,
    OutputBag,
};
pub use crate::core::error::{
    DataError, DynamicsError, SimResult, SimulationError, StreamError, StructuralError,
};
pub use crate::core::execution::{ConfluentPolicy, KernelConfig, RootCoordinator, RunState};
pub use crate::core::graph::ModelGraph;
pub use crate::core::observation::{Matrix, ViewKind, ViewSpec};
pub use crate::core::types::{ModelId, SimulatorId, Time, INFINITY};
pub use crate::core::values::{Table, Value};
