//! Public writer API.

use fc_common::{AudioEncoder, BitsPerPixel, VideoEncoder, WaveFormat};
use std::fs::File;
use std::io::{BufWriter, Seek, Write};
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::MuxerConfig;
use crate::engine::Engine;
use crate::error::MuxResult;
use crate::handle::{AudioStream, VideoStream};
use crate::riff::{TrackedOutput, WriteSeek};
use crate::sequential::SequentialStream;
use crate::sink::{EncodingAudioSink, EncodingVideoSink, EngineSink, StreamSink};
use crate::stream::{StreamInfo, VideoProps};

const FILE_BUFFER_SIZE: usize = 1024 * 1024;

/// Streaming AVI (OpenDML) writer.
///
/// Add streams, then write frames through the returned handles from any
/// number of threads. Writing the first frame freezes the stream set. The
/// header is rewritten with the final counts by [`close`](Self::close),
/// which also runs on drop.
pub struct AviWriter {
    engine: Arc<Engine>,
    pipelines: Vec<Arc<SequentialStream>>,
}

impl AviWriter {
    /// Create (or truncate) the file at `path`.
    pub fn create(path: impl AsRef<Path>, config: MuxerConfig) -> MuxResult<Self> {
        let file = File::create(path.as_ref())?;
        Self::new(BufWriter::with_capacity(FILE_BUFFER_SIZE, file), config)
    }

    /// Write into any seekable output. Writing starts at its current
    /// position.
    pub fn new<W>(output: W, config: MuxerConfig) -> MuxResult<Self>
    where
        W: Write + Seek + Send + 'static,
    {
        config.validate()?;
        let output: Box<dyn WriteSeek> = Box::new(output);
        let output = TrackedOutput::new(output)?;

        Ok(Self {
            engine: Arc::new(Engine::new(output, config)),
            pipelines: Vec::new(),
        })
    }

    pub fn config(&self) -> MuxerConfig {
        self.engine.config()
    }

    /// Video frame rate; only before writing starts.
    pub fn set_frames_per_second(&self, frames_per_second: f64) -> MuxResult<()> {
        self.engine
            .update_config(|c| c.frames_per_second = frames_per_second)
    }

    pub fn set_emit_legacy_index(&self, emit: bool) -> MuxResult<()> {
        self.engine.update_config(|c| c.emit_legacy_index = emit)
    }

    pub fn stream_count(&self) -> usize {
        self.engine.stream_count()
    }

    /// Add a video stream that takes already encoded (or raw) frames.
    /// The codec defaults to uncompressed; change it with
    /// [`VideoStream::set_codec`] before writing.
    pub fn add_video_stream(
        &mut self,
        width: u32,
        height: u32,
        bits_per_pixel: BitsPerPixel,
    ) -> MuxResult<VideoStream> {
        let props = VideoProps {
            width,
            height,
            bits_per_pixel,
            codec: Default::default(),
        };
        self.register_video(props, None)
    }

    /// Add a video stream whose frames pass through `encoder`. Codec and
    /// bits per pixel come from the encoder.
    pub fn add_encoding_video_stream(
        &mut self,
        encoder: Box<dyn VideoEncoder>,
        width: u32,
        height: u32,
    ) -> MuxResult<VideoStream> {
        let props = VideoProps {
            width,
            height,
            bits_per_pixel: encoder.bits_per_pixel(),
            codec: encoder.codec(),
        };
        self.register_video(props, Some(encoder))
    }

    pub fn add_audio_stream(&mut self, wave_format: WaveFormat) -> MuxResult<AudioStream> {
        self.register_audio(wave_format, None)
    }

    /// Add an audio stream whose blocks pass through `encoder`. The wave
    /// format comes from the encoder.
    pub fn add_encoding_audio_stream(
        &mut self,
        encoder: Box<dyn AudioEncoder>,
    ) -> MuxResult<AudioStream> {
        let wave_format = encoder.wave_format();
        self.register_audio(wave_format, Some(encoder))
    }

    fn register_video(
        &mut self,
        props: VideoProps,
        encoder: Option<Box<dyn VideoEncoder>>,
    ) -> MuxResult<VideoStream> {
        let engine = Arc::clone(&self.engine);
        let pipeline = self.engine.register_stream(|index| {
            let base = EngineSink::new(Arc::clone(&engine), index);
            let encoder_defined = encoder.is_some();
            let sink: Box<dyn StreamSink> = match encoder {
                Some(encoder) => Box::new(EncodingVideoSink::new(base, encoder)),
                None => Box::new(base),
            };
            let pipeline = Arc::new(SequentialStream::spawn(index, sink)?);

            info!(
                stream = index,
                width = props.width,
                height = props.height,
                codec = %props.codec,
                encoded = encoder_defined,
                "Added video stream"
            );
            Ok((StreamInfo::video(index, props, encoder_defined), pipeline))
        })?;

        self.pipelines.push(Arc::clone(&pipeline));
        let index = self.pipelines.len() - 1;
        Ok(VideoStream::new(index, engine, pipeline))
    }

    fn register_audio(
        &mut self,
        wave_format: WaveFormat,
        encoder: Option<Box<dyn AudioEncoder>>,
    ) -> MuxResult<AudioStream> {
        let engine = Arc::clone(&self.engine);
        let pipeline = self.engine.register_stream(|index| {
            let base = EngineSink::new(Arc::clone(&engine), index);
            let encoder_defined = encoder.is_some();
            let sink: Box<dyn StreamSink> = match encoder {
                Some(encoder) => Box::new(EncodingAudioSink::new(base, encoder)),
                None => Box::new(base),
            };
            let pipeline = Arc::new(SequentialStream::spawn(index, sink)?);

            info!(
                stream = index,
                sample_rate = wave_format.sample_rate,
                channels = wave_format.channels,
                encoded = encoder_defined,
                "Added audio stream"
            );
            Ok((StreamInfo::audio(index, wave_format, encoder_defined), pipeline))
        })?;

        self.pipelines.push(Arc::clone(&pipeline));
        let index = self.pipelines.len() - 1;
        Ok(AudioStream::new(index, engine, pipeline))
    }

    /// Finish every stream, flush the indexes and rewrite the header.
    ///
    /// Closing twice is a no-op. The writer is closed afterwards even when
    /// this returns an error.
    pub fn close(&mut self) -> MuxResult<()> {
        if self.engine.is_closed() {
            return Ok(());
        }

        // Streams drain and finish outside the engine lock: their last
        // writes need it. A queued write may start the session, so `started`
        // is read only once every queue is empty.
        let mut first_error = None;
        for pipeline in &self.pipelines {
            if let Err(e) = pipeline.drain() {
                first_error.get_or_insert(e);
            }
        }
        let started = self.engine.is_started();
        for pipeline in &self.pipelines {
            if let Err(e) = pipeline.finish(started) {
                first_error.get_or_insert(e);
            }
        }

        let finalized = self.engine.finalize();
        match first_error {
            Some(e) => {
                if let Err(finalize_error) = finalized {
                    warn!(error = %finalize_error, "Finalize failed after stream error");
                }
                Err(e)
            }
            None => finalized,
        }
    }
}

impl Drop for AviWriter {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!(error = %e, "Closing AVI writer on drop failed");
        }
    }
}
