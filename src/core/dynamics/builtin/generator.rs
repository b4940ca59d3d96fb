use crate::core::dynamics::traits::{Dynamics, DynamicsInit, DynamicsResult, OutputBag};
use crate::core::error::DynamicsError;
use crate::core::types::{Time, INFINITY};
use crate::core::values::Value;
use rand::rngs::StdRng;
use rand_distr::{Distribution, Exp};

/// Inter-arrival law of a generator
#[derive(Debug, Clone)]
pub enum Arrivals {
    /// Constant period
    Fixed(f64),
    /// Exponentially distributed, mean given by the period
    Exponential(Exp<f64>),
}

/// Emits on `out` at a fixed or random rate.
///
/// Conditions: `period` (default 1), `distribution` (`fixed` or
/// `exponential`), `start` delay (default 0), `value` payload (default: the
/// emission time), `limit` on the number of emissions.
pub struct Generator {
    arrivals: Arrivals,
    rng: StdRng,
    start: Time,
    sigma: Time,
    payload: Option<Value>,
    limit: Option<u64>,
    emitted: u64,
    last: Option<Value>,
}

impl Generator {
    pub fn new(arrivals: Arrivals, rng: StdRng) -> Self {
        Self {
            arrivals,
            rng,
            start: 0.0,
            sigma: INFINITY,
            payload: None,
            limit: None,
            emitted: 0,
            last: None,
        }
    }

    pub fn from_init(init: DynamicsInit) -> DynamicsResult<Self> {
        let conditions = &init.conditions;
        let period = conditions.get_double_or("period", 1.0)?;
        if !(period > 0.0) || period.is_infinite() {
            return Err(DynamicsError::new(format!(
                "generator period must be positive and finite, found {}",
                period
            )));
        }

        let distribution = conditions
            .get("distribution")
            .and_then(Value::as_str)
            .unwrap_or("fixed");
        let arrivals = match distribution {
            "fixed" => Arrivals::Fixed(period),
            "exponential" => Arrivals::Exponential(
                Exp::new(1.0 / period).map_err(|e| DynamicsError::new(e.to_string()))?,
            ),
            other => {
                return Err(DynamicsError::new(format!(
                    "unknown distribution '{}'",
                    other
                )))
            }
        };

        let start = conditions.get_double_or("start", 0.0)?;
        if start < 0.0 {
            return Err(DynamicsError::new("generator start must not be negative"));
        }

        let limit = match conditions.get("limit") {
            Some(value) => Some(
                value
                    .as_integer()
                    .filter(|n| *n >= 0)
                    .ok_or_else(|| DynamicsError::new("limit must be a non-negative integer"))?
                    as u64,
            ),
            None => None,
        };

        let mut generator = Self::new(arrivals, init.rng);
        generator.start = start;
        generator.payload = conditions.get("value").cloned();
        generator.limit = limit;
        Ok(generator)
    }

    fn next_interval(&mut self) -> Time {
        match &self.arrivals {
            Arrivals::Fixed(period) => *period,
            Arrivals::Exponential(exp) => exp.sample(&mut self.rng),
        }
    }

    fn exhausted(&self) -> bool {
        self.limit.map_or(false, |limit| self.emitted >= limit)
    }
}

impl Dynamics for Generator {
    fn init(&mut self, _time: Time) -> DynamicsResult<()> {
        self.sigma = if self.exhausted() { INFINITY } else { self.start };
        Ok(())
    }

    fn time_advance(&self) -> Time {
        self.sigma
    }

    fn output(&mut self, time: Time, outputs: &mut OutputBag) -> DynamicsResult<()> {
        let value = self.payload.clone().unwrap_or(Value::Double(time));
        outputs.emit("out", value.clone());
        self.last = Some(value);
        Ok(())
    }

    fn internal_transition(&mut self, _time: Time) -> DynamicsResult<()> {
        self.emitted += 1;
        self.sigma = if self.exhausted() {
            INFINITY
        } else {
            self.next_interval()
        };
        Ok(())
    }

    fn observation(&self, port: &str, _time: Time) -> Option<Value> {
        match port {
            "out" => self.last.clone(),
            "emitted" => Some(Value::Integer(self.emitted as i64)),
            _ => None,
        }
    }
}
