use crate::core::error::DynamicsError;
use crate::core::types::Time;
use crate::core::values::Value;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub type DynamicsResult<T> = Result<T, DynamicsError>;

/// Named initial values handed to a behavioural unit when it is created
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InitConditions {
    values: BTreeMap<String, Value>,
}

impl InitConditions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insertion
    pub fn with(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: &str, value: impl Into<Value>) {
        self.values.insert(name.to_string(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    /// Get a numeric condition, failing if it is absent or not a number
    pub fn get_double(&self, name: &str) -> DynamicsResult<f64> {
        match self.values.get(name) {
            Some(value) => value.to_double().ok_or_else(|| {
                DynamicsError::new(format!(
                    "condition '{}' must be a number, found {}",
                    name,
                    value.type_name()
                ))
            }),
            None => Err(DynamicsError::new(format!("missing condition '{}'", name))),
        }
    }

    /// Get a numeric condition or `default` when absent
    pub fn get_double_or(&self, name: &str, default: f64) -> DynamicsResult<f64> {
        if self.values.contains_key(name) {
            self.get_double(name)
        } else {
            Ok(default)
        }
    }

    /// Overlay `other` onto these conditions; later values win
    pub fn merge(&mut self, other: &InitConditions) {
        for (name, value) in &other.values {
            self.values.insert(name.clone(), value.clone());
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// One value delivered to an input port
#[derive(Debug, Clone, PartialEq)]
pub struct ExternalEvent {
    pub port: String,
    pub value: Value,
}

impl ExternalEvent {
    pub fn new(port: &str, value: Value) -> Self {
        Self {
            port: port.to_string(),
            value,
        }
    }
}

/// Values produced by one call to `Dynamics::output`
#[derive(Debug, Default)]
pub struct OutputBag {
    events: Vec<(String, Value)>,
}

impl OutputBag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Emit a value on an output port
    pub fn emit(&mut self, port: &str, value: impl Into<Value>) {
        self.events.push((port.to_string(), value.into()));
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.events.iter().map(|(port, value)| (port.as_str(), value))
    }

    pub fn into_events(self) -> Vec<(String, Value)> {
        self.events
    }
}

/// Everything a factory needs to build one behavioural unit
pub struct DynamicsInit {
    /// Full path of the atomic model
    pub model: String,
    pub conditions: InitConditions,
    /// Generator seeded from the experiment, private to this unit
    pub rng: StdRng,
}

/// Capability interface of a behavioural unit.
///
/// The kernel drives it with the DEVS protocol: `output` then
/// `internal_transition` when its time advance expires, `external_transition`
/// when a bag arrives, and `confluent_transition` when both happen at once.
/// `time_advance` is read after `init` and after every transition and is a
/// duration from that instant; `INFINITY` makes the unit passive.
pub trait Dynamics: Send {
    fn init(&mut self, _time: Time) -> DynamicsResult<()> {
        Ok(())
    }

    fn time_advance(&self) -> Time;

    fn output(&mut self, _time: Time, _outputs: &mut OutputBag) -> DynamicsResult<()> {
        Ok(())
    }

    fn internal_transition(&mut self, _time: Time) -> DynamicsResult<()> {
        Ok(())
    }

    fn external_transition(
        &mut self,
        _events: &[ExternalEvent],
        _time: Time,
    ) -> DynamicsResult<()> {
        Ok(())
    }

    /// Whether `confluent_transition` is implemented. When false the kernel
    /// applies its configured confluent policy instead.
    fn has_confluent_transition(&self) -> bool {
        false
    }

    fn confluent_transition(&mut self, events: &[ExternalEvent], time: Time) -> DynamicsResult<()> {
        self.internal_transition(time)?;
        self.external_transition(events, time)
    }

    /// Current value of an observable port, if the unit exposes one
    fn observation(&self, _port: &str, _time: Time) -> Option<Value> {
        None
    }

    fn finish(&mut self) {}
}
