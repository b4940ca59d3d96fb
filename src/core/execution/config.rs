/// Configuration for kernel execution
///
/// This module provides the explicit settings handed to the root coordinator:
/// cascade bound, confluent policy and observation stream tuning.
use std::time::Duration;

/// Order applied when a simulator has an internal and an external event at
/// the same instant and its dynamics declares no confluent transition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConfluentPolicy {
    /// Internal transition, then external transition
    #[default]
    InternalFirst,
    /// External transition, then internal transition
    ExternalFirst,
}

/// Configuration for simulation execution
///
/// Nothing here is global: each `RootCoordinator` owns its copy for the
/// lifetime of the runs it drives.
#[derive(Debug, Clone, PartialEq)]
pub struct KernelConfig {
    /// Upper bound on event propagation rounds within one instant
    pub max_cascade_iterations: usize,
    pub confluent_policy: ConfluentPolicy,
    /// Bound on a blocking write to a stream consumer. `None` blocks forever.
    pub stream_write_timeout: Option<Duration>,
    /// Producer side buffer of stream views, in bytes
    pub stream_buffer_size: usize,
}

impl KernelConfig {
    pub const DEFAULT_MAX_CASCADE_ITERATIONS: usize = 10_000;

    /// Create a configuration with default values
    pub fn new() -> Self {
        Self {
            max_cascade_iterations: Self::DEFAULT_MAX_CASCADE_ITERATIONS,
            confluent_policy: ConfluentPolicy::default(),
            stream_write_timeout: Some(Duration::from_secs(5)),
            stream_buffer_size: 4096,
        }
    }

    /// Set the cascade bound
    ///
    /// # Arguments
    /// * `iterations` - Maximum number of propagation rounds per instant, at least 1
    pub fn with_max_cascade_iterations(mut self, iterations: usize) -> Self {
        self.max_cascade_iterations = iterations.max(1);
        self
    }

    pub fn with_confluent_policy(mut self, policy: ConfluentPolicy) -> Self {
        self.confluent_policy = policy;
        self
    }

    pub fn with_stream_write_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.stream_write_timeout = timeout;
        self
    }

    pub fn with_stream_buffer_size(mut self, size: usize) -> Self {
        self.stream_buffer_size = size.max(1);
        self
    }
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = KernelConfig::default();
        assert_eq!(config.max_cascade_iterations, 10_000);
        assert_eq!(config.confluent_policy, ConfluentPolicy::InternalFirst);
        assert_eq!(config.stream_write_timeout, Some(Duration::from_secs(5)));
        assert_eq!(config.stream_buffer_size, 4096);
    }

    #[test]
    fn test_config_builder() {
        let config = KernelConfig::new()
            .with_max_cascade_iterations(0)
            .with_confluent_policy(ConfluentPolicy::ExternalFirst)
            .with_stream_write_timeout(None)
            .with_stream_buffer_size(128);

        assert_eq!(config.max_cascade_iterations, 1);
        assert_eq!(config.confluent_policy, ConfluentPolicy::ExternalFirst);
        assert_eq!(config.stream_write_timeout, None);
        assert_eq!(config.stream_buffer_size, 128);
    }
}
