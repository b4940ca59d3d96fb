use crate::core::dynamics::traits::{Dynamics, DynamicsResult, ExternalEvent, OutputBag};
use crate::core::types::{Time, INFINITY};
use crate::core::values::Value;

/// Counts received events and announces the new total on `count`.
pub struct Counter {
    count: i64,
    sigma: Time,
}

impl Counter {
    pub fn new() -> Self {
        Self {
            count: 0,
            sigma: INFINITY,
        }
    }

    pub fn count(&self) -> i64 {
        self.count
    }
}

impl Default for Counter {
    fn default() -> Self {
        Self::new()
    }
}

impl Dynamics for Counter {
    fn time_advance(&self) -> Time {
        self.sigma
    }

    fn output(&mut self, _time: Time, outputs: &mut OutputBag) -> DynamicsResult<()> {
        outputs.emit("count", Value::Integer(self.count));
        Ok(())
    }

    fn internal_transition(&mut self, _time: Time) -> DynamicsResult<()> {
        self.sigma = INFINITY;
        Ok(())
    }

    fn external_transition(&mut self, events: &[ExternalEvent], _time: Time) -> DynamicsResult<()> {
        self.count += events.len() as i64;
        self.sigma = 0.0;
        Ok(())
    }

    fn observation(&self, port: &str, _time: Time) -> Option<Value> {
        match port {
            "count" => Some(Value::Integer(self.count)),
            _ => None,
        }
    }
}
