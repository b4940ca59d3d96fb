/// Simulated time. `INFINITY` means "never".
pub type Time = f64;

/// The time of an event that never happens.
pub const INFINITY: Time = f64::INFINITY;

/// Returns true if `time` is positive infinity.
pub fn is_infinity(time: Time) -> bool {
    time.is_infinite() && time.is_sign_positive()
}

/// Identifier of a node in the model graph arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModelId(pub(crate) usize);

impl ModelId {
    /// Get the raw arena index
    pub fn index(&self) -> usize {
        self.0
    }

    /// Create an output port handle
    pub fn output(&self, port: &str) -> OutputPort {
        OutputPort {
            model_id: *self,
            port_name: port.to_string(),
        }
    }

    /// Create an input port handle
    pub fn input(&self, port: &str) -> InputPort {
        InputPort {
            model_id: *self,
            port_name: port.to_string(),
        }
    }
}

impl std::fmt::Display for ModelId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "M{}", self.0)
    }
}

/// Identifier of a simulator: its atomic model's position in a pre-order
/// walk of the graph. Used as the deterministic tie-break between
/// simultaneous events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SimulatorId(pub(crate) usize);

impl SimulatorId {
    pub fn index(&self) -> usize {
        self.0
    }
}

impl std::fmt::Display for SimulatorId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "S{}", self.0)
    }
}

/// Handle for an output port
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputPort {
    pub(crate) model_id: ModelId,
    pub(crate) port_name: String,
}

impl OutputPort {
    pub fn model_id(&self) -> ModelId {
        self.model_id
    }

    pub fn port_name(&self) -> &str {
        &self.port_name
    }
}

/// Handle for an input port
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputPort {
    pub(crate) model_id: ModelId,
    pub(crate) port_name: String,
}

impl InputPort {
    pub fn model_id(&self) -> ModelId {
        self.model_id
    }

    pub fn port_name(&self) -> &str {
        &self.port_name
    }
}
