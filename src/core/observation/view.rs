use crate::core::error::{SimResult, SimulationError, StreamError};
use crate::core::observation::matrix::Matrix;
use crate::core::observation::stream::{StreamMessage, StreamWriter};
use crate::core::types::{SimulatorId, Time, INFINITY};
use crate::core::values::Value;
use log::warn;
use serde::{Deserialize, Serialize};

/// When a view samples its observables
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ViewKind {
    /// On the grid `begin + k * period`
    Timed { period: f64 },
    /// Once, when the run finishes
    Finish,
    /// After every transition of an observed simulator
    Event,
}

impl ViewKind {
    /// A timed view needs a positive, finite period
    pub fn validate(&self, view: &str) -> SimResult<()> {
        if let ViewKind::Timed { period } = *self {
            if !(period > 0.0) || period.is_infinite() {
                return Err(SimulationError::config(format!(
                    "view '{}': period must be positive and finite, found {}",
                    view, period
                )));
            }
        }
        Ok(())
    }
}

/// Where to send a stream view
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamSpec {
    #[serde(default = "default_host")]
    pub host: String,
    pub port: u16,
    #[serde(default = "default_plugin")]
    pub plugin: String,
    /// Defaults to the run identifier
    #[serde(default)]
    pub location: Option<String>,
    /// Defaults to the view name
    #[serde(default)]
    pub file: Option<String>,
    #[serde(default)]
    pub parameter: Value,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_plugin() -> String {
    "storage".to_string()
}

impl StreamSpec {
    pub fn new(host: &str, port: u16) -> Self {
        Self {
            host: host.to_string(),
            port,
            plugin: default_plugin(),
            location: None,
            file: None,
            parameter: Value::Null,
        }
    }
}

/// Output sink descriptor of a view
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputSpec {
    /// Accumulate a matrix in process
    #[default]
    Storage,
    /// Push samples to a remote consumer
    Stream(StreamSpec),
}

/// Reference to an observed port of an atomic model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservableSpec {
    /// Full model path, e.g. `top:B`
    pub model: String,
    pub port: String,
}

/// Configuration of one view
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewSpec {
    pub name: String,
    pub kind: ViewKind,
    #[serde(default)]
    pub output: OutputSpec,
    #[serde(default)]
    pub observables: Vec<ObservableSpec>,
}

impl ViewSpec {
    pub fn new(name: &str, kind: ViewKind) -> Self {
        Self {
            name: name.to_string(),
            kind,
            output: OutputSpec::Storage,
            observables: Vec::new(),
        }
    }

    pub fn timed(name: &str, period: f64) -> Self {
        Self::new(name, ViewKind::Timed { period })
    }

    pub fn finish(name: &str) -> Self {
        Self::new(name, ViewKind::Finish)
    }

    pub fn event(name: &str) -> Self {
        Self::new(name, ViewKind::Event)
    }

    /// Add an observable (builder style)
    pub fn observe(mut self, model: &str, port: &str) -> Self {
        self.observables.push(ObservableSpec {
            model: model.to_string(),
            port: port.to_string(),
        });
        self
    }

    pub fn streaming(mut self, spec: StreamSpec) -> Self {
        self.output = OutputSpec::Stream(spec);
        self
    }
}

/// A (simulator, port) pair bound to a view
#[derive(Debug, Clone, PartialEq)]
pub struct Observable {
    pub simulator: SimulatorId,
    /// Full path of the atomic model
    pub model: String,
    /// Full path of its parent
    pub parent: String,
    pub port: String,
}

impl Observable {
    /// Matrix column of this observable: `<model path>.<port>`
    pub fn column_name(&self) -> String {
        format!("{}.{}", self.model, self.port)
    }
}

pub enum ViewSink {
    Storage(Matrix),
    Stream(StreamWriter),
}

/// A named observation channel
pub struct View {
    name: String,
    kind: ViewKind,
    begin: Time,
    tick: u64,
    observables: Vec<Observable>,
    sink: ViewSink,
    closed: bool,
}

impl View {
    pub fn new(name: &str, kind: ViewKind, begin: Time, sink: ViewSink) -> SimResult<Self> {
        kind.validate(name)?;
        Ok(Self {
            name: name.to_string(),
            kind,
            begin,
            tick: 0,
            observables: Vec::new(),
            sink,
            closed: false,
        })
    }

    /// Send the stream's opening `Parameter` message; no-op for storage views
    pub fn open_stream(
        &mut self,
        plugin: &str,
        location: &str,
        file: &str,
        parameter: Value,
    ) -> SimResult<()> {
        if let ViewSink::Stream(writer) = &mut self.sink {
            writer.send(&StreamMessage::Parameter {
                plugin: plugin.to_string(),
                location: location.to_string(),
                file: file.to_string(),
                parameter,
                time: self.begin,
            })?;
        }
        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> ViewKind {
        self.kind
    }

    pub fn observables(&self) -> &[Observable] {
        &self.observables
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn is_stream(&self) -> bool {
        matches!(self.sink, ViewSink::Stream(_))
    }

    /// Next sampling time of a timed view; `INFINITY` for other kinds or
    /// when nothing is observed
    pub fn next_time(&self) -> Time {
        match self.kind {
            ViewKind::Timed { period } if !self.closed && !self.observables.is_empty() => {
                self.begin + self.tick as f64 * period
            }
            _ => INFINITY,
        }
    }

    /// Move a timed view to its next grid point
    pub fn advance(&mut self) {
        self.tick += 1;
    }

    /// Skip grid points before `time`, and at `time` as well when
    /// `inclusive`. Used when a binding is added to a running view.
    pub fn catch_up(&mut self, time: Time, inclusive: bool) {
        if let ViewKind::Timed { .. } = self.kind {
            while self.next_time() < time || (inclusive && self.next_time() == time) {
                self.tick += 1;
            }
        }
    }

    /// Bind an observable
    pub fn add_observable(&mut self, observable: Observable, time: Time) -> SimResult<()> {
        if self
            .observables
            .iter()
            .any(|o| o.simulator == observable.simulator && o.port == observable.port)
        {
            return Ok(());
        }
        match &mut self.sink {
            ViewSink::Storage(matrix) => {
                matrix.add_column(&observable.column_name());
            }
            ViewSink::Stream(writer) => {
                writer.send(&StreamMessage::NewObservable {
                    simulator: observable.model.clone(),
                    parent: observable.parent.clone(),
                    port: observable.port.clone(),
                    view: self.name.clone(),
                    time,
                })?;
            }
        }
        self.observables.push(observable);
        Ok(())
    }

    /// Unbind an observable; returns false if it was not bound
    pub fn del_observable(
        &mut self,
        simulator: SimulatorId,
        port: &str,
        time: Time,
    ) -> SimResult<bool> {
        let position = match self
            .observables
            .iter()
            .position(|o| o.simulator == simulator && o.port == port)
        {
            Some(position) => position,
            None => return Ok(false),
        };
        let observable = self.observables.remove(position);
        self.send_del(&observable, time)?;
        Ok(true)
    }

    fn send_del(&mut self, observable: &Observable, time: Time) -> Result<(), StreamError> {
        if let ViewSink::Stream(writer) = &mut self.sink {
            writer.send(&StreamMessage::DelObservable {
                simulator: observable.model.clone(),
                parent: observable.parent.clone(),
                port: observable.port.clone(),
                view: self.name.clone(),
                time,
            })?;
        }
        Ok(())
    }

    /// Write one sample of the observable at `index`. `None` marks a missing
    /// sample: storage views still get a row at `time`, streams send a value
    /// frame without a value.
    pub fn record(&mut self, index: usize, time: Time, value: Option<Value>) -> SimResult<()> {
        if self.closed {
            return Ok(());
        }
        let observable = match self.observables.get(index) {
            Some(observable) => observable,
            None => return Ok(()),
        };
        match &mut self.sink {
            ViewSink::Storage(matrix) => {
                let result = match value {
                    Some(value) => matrix.add_value(time, &observable.column_name(), value),
                    None => matrix.ensure_row(time),
                };
                // a sample behind the last row is dropped; rows stay ordered
                if let Err(e) = result {
                    warn!("view '{}': {}", self.name, e);
                }
            }
            ViewSink::Stream(writer) => {
                writer.send(&StreamMessage::Value {
                    simulator: observable.model.clone(),
                    parent: observable.parent.clone(),
                    port: observable.port.clone(),
                    view: self.name.clone(),
                    time,
                    value,
                })?;
            }
        }
        Ok(())
    }

    /// Push buffered stream frames
    pub fn flush(&mut self) -> SimResult<()> {
        if let ViewSink::Stream(writer) = &mut self.sink {
            writer.flush()?;
        }
        Ok(())
    }

    /// Close the view. Streams announce every observable's removal and then
    /// `Close`. Closing twice is a no-op.
    pub fn close(&mut self, time: Time) -> SimResult<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        if self.is_stream() {
            let observables = std::mem::take(&mut self.observables);
            for observable in &observables {
                self.send_del(observable, time)?;
            }
            self.observables = observables;
            if let ViewSink::Stream(writer) = &mut self.sink {
                writer.send(&StreamMessage::Close { time })?;
            }
        }
        Ok(())
    }

    /// The accumulated matrix of a storage view
    pub fn matrix(&self) -> Option<&Matrix> {
        match &self.sink {
            ViewSink::Storage(matrix) => Some(matrix),
            ViewSink::Stream(_) => None,
        }
    }

    /// Move the matrix out of a storage view, leaving an empty one
    pub fn take_matrix(&mut self) -> Option<Matrix> {
        match &mut self.sink {
            ViewSink::Storage(matrix) => Some(std::mem::take(matrix)),
            ViewSink::Stream(_) => None,
        }
    }
}
