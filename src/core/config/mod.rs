pub mod project;

pub use project::{
    ConnectionConfig, ConnectionKind, ExperimentConfig, ModelConfig, PortRefConfig, ProjectConfig,
};
