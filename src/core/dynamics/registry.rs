use crate::core::dynamics::builtin::{Counter, DifferenceEquation, Generator, Recorder};
use crate::core::dynamics::traits::{Dynamics, DynamicsInit, DynamicsResult};
use std::collections::HashMap;

/// Builds a behavioural unit from its initialisation data
pub type DynamicsFactory =
    Box<dyn Fn(DynamicsInit) -> DynamicsResult<Box<dyn Dynamics>> + Send + Sync>;

/// Name-keyed table of behavioural unit factories.
///
/// Atomic models refer to their dynamics by name; the coordinator asks the
/// registry for one fresh instance per simulator.
pub struct DynamicsRegistry {
    factories: HashMap<String, DynamicsFactory>,
}

impl DynamicsRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Create a registry holding the built-in units
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register("generator", |init| {
            Ok(Box::new(Generator::from_init(init)?) as Box<dyn Dynamics>)
        });
        registry.register("counter", |_| Ok(Box::new(Counter::new()) as Box<dyn Dynamics>));
        registry.register("recorder", |_| Ok(Box::new(Recorder::new()) as Box<dyn Dynamics>));
        registry.register("difference-equation", |init| {
            Ok(Box::new(DifferenceEquation::linear_from_init(&init)?) as Box<dyn Dynamics>)
        });
        registry
    }

    /// Register a factory, replacing any previous one with the same name
    pub fn register<F>(&mut self, name: &str, factory: F)
    where
        F: Fn(DynamicsInit) -> DynamicsResult<Box<dyn Dynamics>> + Send + Sync + 'static,
    {
        if self
            .factories
            .insert(name.to_string(), Box::new(factory))
            .is_some()
        {
            log::debug!("dynamics '{}' re-registered", name);
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Instantiate the named dynamics; `None` if the name is unknown
    pub fn create(
        &self,
        name: &str,
        init: DynamicsInit,
    ) -> Option<DynamicsResult<Box<dyn Dynamics>>> {
        self.factories.get(name).map(|factory| factory(init))
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl Default for DynamicsRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::dynamics::InitConditions;
    use crate::core::types::INFINITY;
    use rand::SeedableRng;

    fn init(conditions: InitConditions) -> DynamicsInit {
        DynamicsInit {
            model: "top:x".to_string(),
            conditions,
            rng: rand::rngs::StdRng::seed_from_u64(1),
        }
    }

    #[test]
    fn test_builtins_present() {
        let registry = DynamicsRegistry::with_builtins();
        assert_eq!(
            registry.names(),
            vec!["counter", "difference-equation", "generator", "recorder"]
        );
    }

    #[test]
    fn test_create_unknown() {
        let registry = DynamicsRegistry::new();
        assert!(registry.create("nope", init(InitConditions::new())).is_none());
    }

    #[test]
    fn test_custom_factory() {
        struct Idle;
        impl Dynamics for Idle {
            fn time_advance(&self) -> f64 {
                INFINITY
            }
        }

        let mut registry = DynamicsRegistry::new();
        registry.register("idle", |_| Ok(Box::new(Idle) as Box<dyn Dynamics>));
        let unit = registry
            .create("idle", init(InitConditions::new()))
            .unwrap()
            .unwrap();
        assert_eq!(unit.time_advance(), INFINITY);
    }
}
