use crate::core::dynamics::{Dynamics, ExternalEvent, OutputBag};
use crate::core::error::{DynamicsError, SimResult, SimulationError};
use crate::core::execution::config::ConfluentPolicy;
use crate::core::types::{ModelId, SimulatorId, Time, INFINITY};
use crate::core::values::Value;
use log::trace;

/// Runtime counterpart of one atomic model
pub struct Simulator {
    id: SimulatorId,
    model: ModelId,
    path: String,
    parent_path: String,
    dynamics: Box<dyn Dynamics>,
    last_time: Time,
    next_time: Time,
}

impl Simulator {
    pub fn new(
        id: SimulatorId,
        model: ModelId,
        path: String,
        parent_path: String,
        dynamics: Box<dyn Dynamics>,
    ) -> Self {
        Self {
            id,
            model,
            path,
            parent_path,
            dynamics,
            last_time: 0.0,
            next_time: INFINITY,
        }
    }

    pub fn id(&self) -> SimulatorId {
        self.id
    }

    pub fn model(&self) -> ModelId {
        self.model
    }

    /// Full path of the atomic model
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn parent_path(&self) -> &str {
        &self.parent_path
    }

    pub fn last_time(&self) -> Time {
        self.last_time
    }

    pub fn next_time(&self) -> Time {
        self.next_time
    }

    fn behavioral(&self, time: Time, source: DynamicsError) -> SimulationError {
        SimulationError::Behavioral {
            model: self.path.clone(),
            time,
            source,
        }
    }

    /// Read the time advance and derive the next internal time
    fn update_time(&mut self, time: Time) -> SimResult<Time> {
        let advance = self.dynamics.time_advance();
        if advance.is_nan() || advance < 0.0 {
            return Err(self.behavioral(
                time,
                DynamicsError::new(format!("invalid time advance {}", advance)),
            ));
        }
        self.last_time = time;
        self.next_time = time + advance;
        Ok(self.next_time)
    }

    /// Initialise the dynamics; returns the first internal event time
    pub fn init(&mut self, time: Time) -> SimResult<Time> {
        self.dynamics
            .init(time)
            .map_err(|e| self.behavioral(time, e))?;
        self.update_time(time)
    }

    /// Run the output function
    pub fn output(&mut self, time: Time) -> SimResult<Vec<(String, Value)>> {
        let mut bag = OutputBag::new();
        self.dynamics
            .output(time, &mut bag)
            .map_err(|e| self.behavioral(time, e))?;
        trace!("{} produced {} output(s) at t={}", self.path, bag.len(), time);
        Ok(bag.into_events())
    }

    pub fn internal(&mut self, time: Time) -> SimResult<Time> {
        self.dynamics
            .internal_transition(time)
            .map_err(|e| self.behavioral(time, e))?;
        self.update_time(time)
    }

    pub fn external(&mut self, events: &[ExternalEvent], time: Time) -> SimResult<Time> {
        self.dynamics
            .external_transition(events, time)
            .map_err(|e| self.behavioral(time, e))?;
        self.update_time(time)
    }

    /// Internal and external events at the same instant
    pub fn confluent(
        &mut self,
        events: &[ExternalEvent],
        time: Time,
        policy: ConfluentPolicy,
    ) -> SimResult<Time> {
        let result = if self.dynamics.has_confluent_transition() {
            self.dynamics.confluent_transition(events, time)
        } else {
            match policy {
                ConfluentPolicy::InternalFirst => self
                    .dynamics
                    .internal_transition(time)
                    .and_then(|_| self.dynamics.external_transition(events, time)),
                ConfluentPolicy::ExternalFirst => self
                    .dynamics
                    .external_transition(events, time)
                    .and_then(|_| self.dynamics.internal_transition(time)),
            }
        };
        result.map_err(|e| self.behavioral(time, e))?;
        self.update_time(time)
    }

    pub fn observation(&self, port: &str, time: Time) -> Option<Value> {
        self.dynamics.observation(port, time)
    }

    pub fn finish(&mut self) {
        self.dynamics.finish();
    }
}

impl std::fmt::Debug for Simulator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Simulator")
            .field("id", &self.id)
            .field("path", &self.path)
            .field("last_time", &self.last_time)
            .field("next_time", &self.next_time)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::dynamics::DynamicsResult;

    /// Records the order of transitions it receives
    struct Trace {
        log: Vec<&'static str>,
        advance: Time,
    }

    impl Dynamics for Trace {
        fn time_advance(&self) -> Time {
            self.advance
        }

        fn internal_transition(&mut self, _time: Time) -> DynamicsResult<()> {
            self.log.push("int");
            Ok(())
        }

        fn external_transition(
            &mut self,
            _events: &[ExternalEvent],
            _time: Time,
        ) -> DynamicsResult<()> {
            self.log.push("ext");
            Ok(())
        }

        fn observation(&self, _port: &str, _time: Time) -> Option<Value> {
            Some(Value::List(
                self.log.iter().map(|s| Value::from(*s)).collect(),
            ))
        }
    }

    fn simulator(advance: Time) -> Simulator {
        Simulator::new(
            SimulatorId(0),
            ModelId(1),
            "top:A".to_string(),
            "top".to_string(),
            Box::new(Trace {
                log: Vec::new(),
                advance,
            }),
        )
    }

    #[test]
    fn test_init_schedules_from_time_advance() {
        let mut sim = simulator(2.5);
        assert_eq!(sim.init(1.0).unwrap(), 3.5);
        assert_eq!(sim.last_time(), 1.0);
        assert_eq!(sim.next_time(), 3.5);
    }

    #[test]
    fn test_confluent_policies() {
        let events = [ExternalEvent::new("in", Value::Null)];
        let mut sim = simulator(1.0);
        sim.confluent(&events, 0.0, ConfluentPolicy::InternalFirst).unwrap();
        sim.confluent(&events, 1.0, ConfluentPolicy::ExternalFirst).unwrap();
        let log = sim.observation("log", 1.0).unwrap();
        assert_eq!(
            log,
            Value::List(vec!["int".into(), "ext".into(), "ext".into(), "int".into()])
        );
    }

    #[test]
    fn test_negative_time_advance_is_behavioral() {
        let mut sim = simulator(-1.0);
        match sim.init(0.0) {
            Err(SimulationError::Behavioral { model, .. }) => assert_eq!(model, "top:A"),
            other => panic!("unexpected {:?}", other.map(|_| ())),
        }
    }
}
