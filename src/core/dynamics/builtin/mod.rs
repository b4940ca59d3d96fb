//! Behavioural units shipped with the kernel.

pub mod counter;
pub mod difference_equation;
pub mod generator;
pub mod recorder;

pub use counter::Counter;
pub use difference_equation::{DifferenceEquation, EquationState};
pub use generator::{Arrivals, Generator};
pub use recorder::Recorder;
