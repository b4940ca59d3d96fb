use crate::core::dynamics::traits::{Dynamics, DynamicsResult, ExternalEvent};
use crate::core::types::{Time, INFINITY};
use crate::core::values::Value;
use std::collections::BTreeMap;

/// Passive unit keeping the last value received on each input port.
/// Every input port is observable under its own name.
#[derive(Default)]
pub struct Recorder {
    last: BTreeMap<String, Value>,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Dynamics for Recorder {
    fn time_advance(&self) -> Time {
        INFINITY
    }

    fn external_transition(&mut self, events: &[ExternalEvent], _time: Time) -> DynamicsResult<()> {
        for event in events {
            self.last.insert(event.port.clone(), event.value.clone());
        }
        Ok(())
    }

    fn observation(&self, port: &str, _time: Time) -> Option<Value> {
        self.last.get(port).cloned()
    }
}
