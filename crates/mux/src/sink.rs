//! Stream sink composition.
//!
//! A stream's write path is a chain of sinks, each holding and forwarding to
//! an inner one:
//!
//! ```text
//! SequentialStream (ordering worker)
//!   -> EncodingVideoSink / EncodingAudioSink (optional)
//!     -> EngineSink (admission into the container)
//! ```

use fc_common::{ensure_buffer_capacity, AudioEncoder, VideoEncoder};
use std::sync::Arc;
use tracing::debug;

use crate::engine::Engine;
use crate::error::MuxResult;

/// One stage of a stream's write path.
pub trait StreamSink: Send {
    /// Write one frame or block. Audio data is always a key frame.
    fn write(&mut self, is_key_frame: bool, data: &[u8]) -> MuxResult<()>;

    /// Called once when the writer closes, after all writes completed.
    fn finish(&mut self) -> MuxResult<()>;
}

/// Terminal sink: admits data into the container.
pub(crate) struct EngineSink {
    engine: Arc<Engine>,
    stream: usize,
}

impl EngineSink {
    pub fn new(engine: Arc<Engine>, stream: usize) -> Self {
        Self { engine, stream }
    }
}

impl StreamSink for EngineSink {
    fn write(&mut self, is_key_frame: bool, data: &[u8]) -> MuxResult<()> {
        self.engine.write_stream_frame(self.stream, is_key_frame, data)
    }

    fn finish(&mut self) -> MuxResult<()> {
        Ok(())
    }
}

/// Encodes raw frames before passing them on. The encoder decides which
/// frames are key frames.
pub struct EncodingVideoSink<S> {
    inner: S,
    encoder: Box<dyn VideoEncoder>,
    buffer: Vec<u8>,
}

impl<S: StreamSink> EncodingVideoSink<S> {
    pub fn new(inner: S, encoder: Box<dyn VideoEncoder>) -> Self {
        let buffer = vec![0; encoder.max_encoded_size()];
        Self {
            inner,
            encoder,
            buffer,
        }
    }
}

impl<S: StreamSink> StreamSink for EncodingVideoSink<S> {
    fn write(&mut self, _is_key_frame: bool, data: &[u8]) -> MuxResult<()> {
        let needed = self.encoder.max_encoded_size();
        if self.buffer.len() < needed {
            self.buffer.resize(needed, 0);
        }

        let encoded = self.encoder.encode_frame(data, &mut self.buffer)?;
        self.inner
            .write(encoded.is_key_frame, &self.buffer[..encoded.len])
    }

    fn finish(&mut self) -> MuxResult<()> {
        self.inner.finish()
    }
}

/// Encodes raw audio before passing it on, flushing the encoder on finish.
pub struct EncodingAudioSink<S> {
    inner: S,
    encoder: Box<dyn AudioEncoder>,
    buffer: Vec<u8>,
}

impl<S: StreamSink> EncodingAudioSink<S> {
    pub fn new(inner: S, encoder: Box<dyn AudioEncoder>) -> Self {
        Self {
            inner,
            encoder,
            buffer: Vec::new(),
        }
    }

    fn reserve(&mut self, source_len: usize) {
        let needed = self.encoder.max_encoded_length(source_len);
        if ensure_buffer_capacity(&mut self.buffer, needed) {
            debug!(size = self.buffer.len(), "Grew audio encode buffer");
        }
    }
}

impl<S: StreamSink> StreamSink for EncodingAudioSink<S> {
    fn write(&mut self, _is_key_frame: bool, data: &[u8]) -> MuxResult<()> {
        self.reserve(data.len());
        let len = self.encoder.encode(data, &mut self.buffer)?;
        if len > 0 {
            self.inner.write(true, &self.buffer[..len])?;
        }
        Ok(())
    }

    fn finish(&mut self) -> MuxResult<()> {
        self.reserve(0);
        let len = self.encoder.flush(&mut self.buffer)?;
        if len > 0 {
            self.inner.write(true, &self.buffer[..len])?;
        }
        self.inner.finish()
    }
}
