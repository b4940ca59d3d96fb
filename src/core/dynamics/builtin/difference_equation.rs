use crate::core::dynamics::traits::{
    Dynamics, DynamicsInit, DynamicsResult, ExternalEvent, OutputBag,
};
use crate::core::error::DynamicsError;
use crate::core::types::Time;
use crate::core::values::Value;
use std::collections::BTreeMap;

/// State visible to a difference equation's step function
#[derive(Debug, Clone)]
pub struct EquationState {
    /// Value at the current step
    pub value: f64,
    pub time_step: f64,
    /// Time of the current step
    pub time: Time,
    /// Last value received for each external variable
    pub inputs: BTreeMap<String, f64>,
}

impl EquationState {
    /// Value of an external variable, if one has been received
    pub fn input(&self, name: &str) -> Option<f64> {
        self.inputs.get(name).copied()
    }
}

type StepFn = Box<dyn FnMut(&EquationState) -> f64 + Send>;

/// Fixed-step difference equation.
///
/// Every `time_step` it computes the next value from the current state and
/// emits it on `update`. Values arriving on input ports become external
/// variables and are read by the step function. The current value is
/// observable as `value`.
pub struct DifferenceEquation {
    state: EquationState,
    compute: StepFn,
    started: bool,
    pending: Option<f64>,
    next_time: Time,
    sigma: Time,
}

impl DifferenceEquation {
    pub fn new<F>(time_step: f64, init_value: f64, compute: F) -> DynamicsResult<Self>
    where
        F: FnMut(&EquationState) -> f64 + Send + 'static,
    {
        if !(time_step > 0.0) || time_step.is_infinite() {
            return Err(DynamicsError::new(format!(
                "time-step must be positive and finite, found {}",
                time_step
            )));
        }
        Ok(Self {
            state: EquationState {
                value: init_value,
                time_step,
                time: 0.0,
                inputs: BTreeMap::new(),
            },
            compute: Box::new(compute),
            started: false,
            pending: None,
            next_time: 0.0,
            sigma: 0.0,
        })
    }

    /// Build `x' = x + h * (a * x - b * (sum of inputs) * x)` from the
    /// conditions `time-step`, `init-value`, `a` and `b`.
    pub fn linear_from_init(init: &DynamicsInit) -> DynamicsResult<Self> {
        let conditions = &init.conditions;
        let time_step = conditions.get_double_or("time-step", 1.0)?;
        let init_value = conditions.get_double_or("init-value", 0.0)?;
        let a = conditions.get_double_or("a", 0.0)?;
        let b = conditions.get_double_or("b", 0.0)?;
        Self::new(time_step, init_value, move |state| {
            let coupling: f64 = state.inputs.values().sum();
            state.value + state.time_step * (a * state.value - b * coupling * state.value)
        })
    }

    pub fn value(&self) -> f64 {
        self.state.value
    }
}

impl Dynamics for DifferenceEquation {
    fn init(&mut self, time: Time) -> DynamicsResult<()> {
        self.state.time = time;
        self.next_time = time;
        self.sigma = 0.0;
        Ok(())
    }

    fn time_advance(&self) -> Time {
        self.sigma
    }

    fn output(&mut self, time: Time, outputs: &mut OutputBag) -> DynamicsResult<()> {
        let next = if self.started {
            (self.compute)(&self.state)
        } else {
            self.state.value
        };
        if !next.is_finite() {
            return Err(DynamicsError::new(format!(
                "step at t={} produced a non-finite value",
                time
            )));
        }
        self.pending = Some(next);
        outputs.emit("update", Value::Double(next));
        Ok(())
    }

    fn internal_transition(&mut self, time: Time) -> DynamicsResult<()> {
        if let Some(next) = self.pending.take() {
            self.state.value = next;
        }
        self.started = true;
        self.state.time = time;
        self.next_time = time + self.state.time_step;
        self.sigma = self.state.time_step;
        Ok(())
    }

    fn external_transition(&mut self, events: &[ExternalEvent], time: Time) -> DynamicsResult<()> {
        for event in events {
            let value = event.value.to_double().ok_or_else(|| {
                DynamicsError::new(format!(
                    "external variable '{}' must be numeric, found {}",
                    event.port,
                    event.value.type_name()
                ))
            })?;
            self.state.inputs.insert(event.port.clone(), value);
        }
        self.sigma = (self.next_time - time).max(0.0);
        Ok(())
    }

    fn observation(&self, port: &str, _time: Time) -> Option<Value> {
        match port {
            "value" => Some(Value::Double(self.state.value)),
            _ => None,
        }
    }
}
