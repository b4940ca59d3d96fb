//! Wire format of the observation stream.
//!
//! Each message is one frame: a 4-byte big-endian body length followed by
//! the JSON encoding of a `StreamMessage`.

use crate::core::error::StreamError;
use crate::core::types::Time;
use crate::core::values::Value;
use serde::{Deserialize, Serialize};

/// Size of the length prefix
pub const FRAME_HEADER_SIZE: usize = 4;

/// Largest accepted frame body
pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Default consumer read buffer
pub const DEFAULT_BUFFER_SIZE: usize = 4096;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamMessage {
    /// First message of a stream, lets the consumer configure itself
    Parameter {
        plugin: String,
        location: String,
        file: String,
        parameter: Value,
        time: Time,
    },
    /// Sent before the first value of a (simulator, port, view)
    NewObservable {
        simulator: String,
        parent: String,
        port: String,
        view: String,
        time: Time,
    },
    /// Sent after the last value of a (simulator, port, view)
    DelObservable {
        simulator: String,
        parent: String,
        port: String,
        view: String,
        time: Time,
    },
    /// One sample; `None` when the observable had nothing to report
    Value {
        simulator: String,
        parent: String,
        port: String,
        view: String,
        time: Time,
        #[serde(default)]
        value: Option<Value>,
    },
    /// Last message of a stream
    Close { time: Time },
}

impl StreamMessage {
    pub fn time(&self) -> Time {
        match self {
            StreamMessage::Parameter { time, .. }
            | StreamMessage::NewObservable { time, .. }
            | StreamMessage::DelObservable { time, .. }
            | StreamMessage::Value { time, .. }
            | StreamMessage::Close { time } => *time,
        }
    }
}

/// Encode one message as a length-prefixed frame
pub fn encode_frame(message: &StreamMessage) -> Result<Vec<u8>, StreamError> {
    let body = serde_json::to_vec(message)?;
    if body.len() > MAX_FRAME_SIZE {
        return Err(StreamError::FrameTooLarge {
            size: body.len(),
            limit: MAX_FRAME_SIZE,
        });
    }
    let mut frame = Vec::with_capacity(FRAME_HEADER_SIZE + body.len());
    frame.extend_from_slice(&(body.len() as u32).to_be_bytes());
    frame.extend_from_slice(&body);
    Ok(frame)
}

/// Reassembles frames from arbitrarily split reads
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buffer: Vec<u8>,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append bytes received from the transport
    pub fn push(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// Bytes received but not yet decoded
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    /// Decode the next complete frame, if one is buffered
    pub fn next_message(&mut self) -> Result<Option<StreamMessage>, StreamError> {
        if self.buffer.len() < FRAME_HEADER_SIZE {
            return Ok(None);
        }
        let mut header = [0u8; FRAME_HEADER_SIZE];
        header.copy_from_slice(&self.buffer[..FRAME_HEADER_SIZE]);
        let size = u32::from_be_bytes(header) as usize;
        if size > MAX_FRAME_SIZE {
            return Err(StreamError::FrameTooLarge {
                size,
                limit: MAX_FRAME_SIZE,
            });
        }
        if self.buffer.len() < FRAME_HEADER_SIZE + size {
            return Ok(None);
        }
        let body = &self.buffer[FRAME_HEADER_SIZE..FRAME_HEADER_SIZE + size];
        let message = serde_json::from_slice(body)?;
        self.buffer.drain(..FRAME_HEADER_SIZE + size);
        Ok(Some(message))
    }
}
