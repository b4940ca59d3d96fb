pub mod config;
pub mod coordinator;
pub mod root_coordinator;
pub mod scheduler;
pub mod simulator;

// Re-export commonly used types
pub use config::{ConfluentPolicy, KernelConfig};
pub use coordinator::{Coordinator, RootOutput};
pub use root_coordinator::{Outputs, RootCoordinator, RunState};
pub use scheduler::Scheduler;
pub use simulator::Simulator;
