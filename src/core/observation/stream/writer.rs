use crate::core::error::StreamError;
use crate::core::observation::stream::protocol::{encode_frame, StreamMessage};
use crate::core::types::Time;
use log::{debug, warn};
use std::io::{BufWriter, Write};
use std::net::TcpStream;
use std::time::Duration;

/// Producer side of the observation stream.
///
/// Frames are buffered and pushed to the transport when the buffer fills
/// and at the end of every simulation step. Writes block while the consumer
/// is slow; with a write timeout the block is bounded and turns into a
/// `StreamError` instead of silently dropping samples.
pub struct StreamWriter {
    out: BufWriter<Box<dyn Write + Send>>,
    last_time: Time,
    closed: bool,
    frames: u64,
}

impl StreamWriter {
    /// Wrap any byte sink
    pub fn from_writer(writer: Box<dyn Write + Send>, buffer_size: usize) -> Self {
        Self {
            out: BufWriter::with_capacity(buffer_size.max(1), writer),
            last_time: f64::NEG_INFINITY,
            closed: false,
            frames: 0,
        }
    }

    /// Connect to a consumer over TCP
    pub fn connect(
        host: &str,
        port: u16,
        write_timeout: Option<Duration>,
        buffer_size: usize,
    ) -> Result<Self, StreamError> {
        let stream = TcpStream::connect((host, port))?;
        stream.set_nodelay(true)?;
        stream.set_write_timeout(write_timeout)?;
        debug!("observation stream connected to {}:{}", host, port);
        Ok(Self::from_writer(Box::new(stream), buffer_size))
    }

    /// Queue one message
    pub fn send(&mut self, message: &StreamMessage) -> Result<(), StreamError> {
        if self.closed {
            return Err(StreamError::Closed);
        }
        let time = message.time();
        if time < self.last_time {
            warn!(
                "stream message at t={} after t={}; consumer may reorder",
                time, self.last_time
            );
        } else {
            self.last_time = time;
        }
        let frame = encode_frame(message)?;
        self.out.write_all(&frame)?;
        self.frames += 1;
        if let StreamMessage::Close { .. } = message {
            self.out.flush()?;
            self.closed = true;
        }
        Ok(())
    }

    /// Push buffered frames to the transport
    pub fn flush(&mut self) -> Result<(), StreamError> {
        if self.closed {
            return Ok(());
        }
        self.out.flush()?;
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Number of frames sent so far
    pub fn frames(&self) -> u64 {
        self.frames
    }
}

impl std::fmt::Debug for StreamWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamWriter")
            .field("last_time", &self.last_time)
            .field("closed", &self.closed)
            .field("frames", &self.frames)
            .finish()
    }
}
