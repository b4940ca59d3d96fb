use crate::core::error::StreamError;
use crate::core::observation::matrix::Matrix;
use crate::core::observation::stream::protocol::{FrameDecoder, StreamMessage, DEFAULT_BUFFER_SIZE};
use crate::core::types::Time;
use crate::core::values::Value;
use log::{debug, info, warn};
use std::collections::BTreeMap;
use std::io::{ErrorKind, Read};
use std::net::{SocketAddr, TcpListener, ToSocketAddrs};

/// Consumer side callbacks, one per message kind
pub trait StreamReader {
    fn on_parameter(
        &mut self,
        _plugin: &str,
        _location: &str,
        _file: &str,
        _parameter: Value,
        _time: Time,
    ) {
    }

    fn on_new_observable(
        &mut self,
        _simulator: &str,
        _parent: &str,
        _port: &str,
        _view: &str,
        _time: Time,
    ) {
    }

    fn on_del_observable(
        &mut self,
        _simulator: &str,
        _parent: &str,
        _port: &str,
        _view: &str,
        _time: Time,
    ) {
    }

    /// `value` is `None` for a sample the observable could not provide
    fn on_value(
        &mut self,
        simulator: &str,
        parent: &str,
        port: &str,
        view: &str,
        time: Time,
        value: Option<Value>,
    );

    fn on_close(&mut self, _time: Time) {}
}

/// Hand one decoded message to the matching callback
pub fn dispatch(reader: &mut dyn StreamReader, message: StreamMessage) {
    match message {
        StreamMessage::Parameter {
            plugin,
            location,
            file,
            parameter,
            time,
        } => reader.on_parameter(&plugin, &location, &file, parameter, time),
        StreamMessage::NewObservable {
            simulator,
            parent,
            port,
            view,
            time,
        } => reader.on_new_observable(&simulator, &parent, &port, &view, time),
        StreamMessage::DelObservable {
            simulator,
            parent,
            port,
            view,
            time,
        } => reader.on_del_observable(&simulator, &parent, &port, &view, time),
        StreamMessage::Value {
            simulator,
            parent,
            port,
            view,
            time,
            value,
        } => reader.on_value(&simulator, &parent, &port, &view, time, value),
        StreamMessage::Close { time } => reader.on_close(time),
    }
}

/// Read frames from `input` with a fixed-size buffer until `Close` or end of
/// input. Returns true if the stream was closed properly.
pub fn read_stream<R: Read>(
    input: &mut R,
    buffer_size: usize,
    reader: &mut dyn StreamReader,
) -> Result<bool, StreamError> {
    let mut buffer = vec![0u8; buffer_size.max(1)];
    let mut decoder = FrameDecoder::new();
    loop {
        let read = match input.read(&mut buffer) {
            Ok(0) => {
                if decoder.pending() > 0 {
                    warn!("stream ended with {} undecoded bytes", decoder.pending());
                }
                return Ok(false);
            }
            Ok(read) => read,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        };
        decoder.push(&buffer[..read]);
        while let Some(message) = decoder.next_message()? {
            let closing = matches!(message, StreamMessage::Close { .. });
            dispatch(reader, message);
            if closing {
                return Ok(true);
            }
        }
    }
}

/// TCP consumer accepting producer connections
pub struct NetStreamReader {
    listener: TcpListener,
    buffer_size: usize,
}

impl NetStreamReader {
    pub fn bind<A: ToSocketAddrs>(addr: A) -> Result<Self, StreamError> {
        Ok(Self {
            listener: TcpListener::bind(addr)?,
            buffer_size: DEFAULT_BUFFER_SIZE,
        })
    }

    pub fn set_buffer_size(&mut self, size: usize) {
        self.buffer_size = size.max(1);
    }

    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    pub fn local_addr(&self) -> Result<SocketAddr, StreamError> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept one producer and consume its stream to the end
    pub fn process(&self, reader: &mut dyn StreamReader) -> Result<bool, StreamError> {
        let (mut stream, peer) = self.listener.accept()?;
        info!("observation producer connected from {}", peer);
        let closed = read_stream(&mut stream, self.buffer_size, reader)?;
        debug!("producer {} done (closed: {})", peer, closed);
        Ok(closed)
    }
}

/// Rebuilds one matrix per view from a stream
#[derive(Debug, Default)]
pub struct MatrixReader {
    matrices: BTreeMap<String, Matrix>,
    closed_at: Option<Time>,
}

impl MatrixReader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn matrices(&self) -> &BTreeMap<String, Matrix> {
        &self.matrices
    }

    pub fn into_matrices(self) -> BTreeMap<String, Matrix> {
        self.matrices
    }

    pub fn closed_at(&self) -> Option<Time> {
        self.closed_at
    }
}

impl StreamReader for MatrixReader {
    fn on_new_observable(
        &mut self,
        simulator: &str,
        _parent: &str,
        port: &str,
        view: &str,
        _time: Time,
    ) {
        self.matrices
            .entry(view.to_string())
            .or_default()
            .add_column(&format!("{}.{}", simulator, port));
    }

    fn on_value(
        &mut self,
        simulator: &str,
        _parent: &str,
        port: &str,
        view: &str,
        time: Time,
        value: Option<Value>,
    ) {
        let column = format!("{}.{}", simulator, port);
        let matrix = match self.matrices.get_mut(view) {
            Some(matrix) => matrix,
            None => {
                warn!("value for undeclared view '{}'", view);
                return;
            }
        };
        let result = match value {
            Some(value) => matrix.add_value(time, &column, value),
            None => matrix.ensure_row(time),
        };
        if let Err(e) = result {
            warn!("view '{}': {}", view, e);
        }
    }

    fn on_close(&mut self, time: Time) {
        self.closed_at = Some(time);
    }
}
