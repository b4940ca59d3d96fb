pub mod config;
pub mod dynamics;
pub mod error;
pub mod execution;
pub mod graph;
pub mod observation;
pub mod types;
pub mod values;

#[cfg(test)]
mod tests;
