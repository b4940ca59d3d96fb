pub mod model;
pub mod validator;

// Re-export commonly used types
pub use model::{
    AtomicModel, Connection, CoupledModel, Endpoint, ModelGraph, ModelKind, ModelNode,
    PATH_SEPARATOR,
};
pub use validator::PortValidator;
