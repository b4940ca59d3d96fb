pub mod builtin;
pub mod registry;
pub mod traits;

// Re-export commonly used types
pub use registry::{DynamicsFactory, DynamicsRegistry};
pub use traits::{
    Dynamics, DynamicsInit, DynamicsResult, ExternalEvent, InitConditions, OutputBag,
};
