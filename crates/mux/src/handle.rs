//! Stream handles returned by [`AviWriter`](crate::AviWriter).
//!
//! Handles are cheap to clone and may be moved to producer threads. Every
//! write goes through the stream's sequential serializer.

use fc_common::{AviCodec, BitsPerPixel, FourCc, WaveFormat};
use std::sync::Arc;

use crate::engine::Engine;
use crate::error::MuxResult;
use crate::sequential::{SequentialStream, WriteCompletion};
use crate::stream::StreamInfo;

#[derive(Clone)]
struct StreamHandle {
    index: usize,
    engine: Arc<Engine>,
    pipeline: Arc<SequentialStream>,
}

impl StreamHandle {
    fn read<R>(&self, f: impl FnOnce(&StreamInfo) -> R) -> R {
        self.engine.with_stream(self.index, f)
    }

    fn update(&self, f: impl FnOnce(&mut StreamInfo) -> MuxResult<()>) -> MuxResult<()> {
        self.engine.update_stream(self.index, f)
    }
}

/// Handle to a video stream.
#[derive(Clone)]
pub struct VideoStream {
    handle: StreamHandle,
}

/// Handle to an audio stream.
#[derive(Clone)]
pub struct AudioStream {
    handle: StreamHandle,
}

macro_rules! common_stream_methods {
    () => {
        /// Zero-based stream index, also the `NN` of its chunk tags.
        pub fn index(&self) -> usize {
            self.handle.index
        }

        pub fn name(&self) -> Option<String> {
            self.handle.read(|s| s.name().map(str::to_owned))
        }

        /// Set the stream name written as `strn`. Only before writing starts.
        pub fn set_name(&self, name: Option<&str>) -> MuxResult<()> {
            let name = name.map(str::to_owned);
            self.handle.update(|s| s.set_name(name))
        }

        /// Data chunk tag; `None` until writing starts.
        pub fn chunk_tag(&self) -> Option<FourCc> {
            self.handle.read(StreamInfo::chunk_tag)
        }

        /// Block until every write submitted to this stream so far has been
        /// applied. Returns the first failure of a write whose completion was
        /// dropped unobserved.
        pub fn drain(&self) -> MuxResult<()> {
            self.handle.pipeline.drain()
        }
    };
}

impl VideoStream {
    pub(crate) fn new(index: usize, engine: Arc<Engine>, pipeline: Arc<SequentialStream>) -> Self {
        Self {
            handle: StreamHandle {
                index,
                engine,
                pipeline,
            },
        }
    }

    common_stream_methods!();

    pub fn width(&self) -> u32 {
        self.handle.read(|s| s.video_props().map_or(0, |v| v.width))
    }

    pub fn set_width(&self, width: u32) -> MuxResult<()> {
        self.handle.update(|s| s.set_width(width))
    }

    pub fn height(&self) -> u32 {
        self.handle.read(|s| s.video_props().map_or(0, |v| v.height))
    }

    pub fn set_height(&self, height: u32) -> MuxResult<()> {
        self.handle.update(|s| s.set_height(height))
    }

    pub fn bits_per_pixel(&self) -> BitsPerPixel {
        self.handle
            .read(|s| s.video_props().map(|v| v.bits_per_pixel).unwrap_or_default())
    }

    pub fn set_bits_per_pixel(&self, bits_per_pixel: BitsPerPixel) -> MuxResult<()> {
        self.handle.update(|s| s.set_bits_per_pixel(bits_per_pixel))
    }

    pub fn codec(&self) -> AviCodec {
        self.handle
            .read(|s| s.video_props().map(|v| v.codec).unwrap_or_default())
    }

    pub fn set_codec(&self, codec: AviCodec) -> MuxResult<()> {
        self.handle.update(|s| s.set_codec(codec))
    }

    /// Frames admitted into the file so far.
    pub fn frames_written(&self) -> u64 {
        self.handle.engine.chunks_written(self.handle.index)
    }

    /// Write one frame and wait until it is in the file.
    ///
    /// For encoding streams `data` is the raw frame and `is_key_frame` is
    /// decided by the encoder.
    pub fn write_frame(&self, is_key_frame: bool, data: &[u8]) -> MuxResult<()> {
        self.handle.pipeline.write(is_key_frame, data)
    }

    /// Queue one frame behind all earlier writes of this stream.
    pub fn write_frame_async(&self, is_key_frame: bool, data: Vec<u8>) -> MuxResult<WriteCompletion> {
        self.handle.pipeline.submit(is_key_frame, data)
    }
}

impl AudioStream {
    pub(crate) fn new(index: usize, engine: Arc<Engine>, pipeline: Arc<SequentialStream>) -> Self {
        Self {
            handle: StreamHandle {
                index,
                engine,
                pipeline,
            },
        }
    }

    common_stream_methods!();

    pub fn wave_format(&self) -> WaveFormat {
        self.handle
            .read(|s| s.wave_format().cloned().unwrap_or_default())
    }

    pub fn set_wave_format(&self, wave_format: WaveFormat) -> MuxResult<()> {
        self.handle.update(|s| s.set_wave_format(wave_format))
    }

    /// Blocks admitted into the file so far.
    pub fn blocks_written(&self) -> u64 {
        self.handle.engine.chunks_written(self.handle.index)
    }

    /// Write one block of audio data and wait until it is in the file.
    pub fn write_block(&self, data: &[u8]) -> MuxResult<()> {
        self.handle.pipeline.write(true, data)
    }

    pub fn write_block_async(&self, data: Vec<u8>) -> MuxResult<WriteCompletion> {
        self.handle.pipeline.submit(true, data)
    }
}
