pub mod protocol;
pub mod reader;
pub mod writer;

pub use protocol::{encode_frame, FrameDecoder, StreamMessage, DEFAULT_BUFFER_SIZE, MAX_FRAME_SIZE};
pub use reader::{dispatch, read_stream, MatrixReader, NetStreamReader, StreamReader};
pub use writer::StreamWriter;
