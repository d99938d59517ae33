//! `fc-mux` -- streaming AVI container muxer with OpenDML extensions.
//!
//! Frames from several producer threads are written straight into a RIFF
//! file. Files grow past the classic 1 GiB / 2 GiB limits through `AVIX`
//! segments and two-level OpenDML indexes; an optional legacy `idx1` index
//! covers the first segment for older players.
//!
//! # Architecture
//!
//! - **Single writer** -- one engine lock guards the output, the index
//!   aggregators and segment rotation
//! - **Per-stream ordering** -- each stream has a worker thread that applies
//!   writes in submission order, blocking or not
//! - **Sink chain** -- optional encoding stages sit between the ordering
//!   worker and the engine
//! - **Two-pass header** -- `hdrl` is written with placeholders when the
//!   first frame arrives and rewritten in place on close
//!
//! # Usage
//!
//! ```ignore
//! use fc_mux::{AviWriter, MuxerConfig};
//! use fc_common::{BitsPerPixel, WaveFormat};
//!
//! let mut writer = AviWriter::create("capture.avi", MuxerConfig {
//!     frames_per_second: 30.0,
//!     ..Default::default()
//! })?;
//!
//! let video = writer.add_video_stream(1280, 720, BitsPerPixel::Bpp24)?;
//! let audio = writer.add_audio_stream(WaveFormat::pcm(44_100, 16, 2))?;
//!
//! video.write_frame(true, &frame)?;
//! audio.write_block(&samples)?;
//!
//! writer.close()?;
//! ```

pub mod config;
mod engine;
pub mod error;
pub mod handle;
mod header;
pub mod index;
pub mod riff;
pub mod sequential;
pub mod sink;
pub mod stream;
pub mod writer;

// Re-export primary API types
pub use config::MuxerConfig;
pub use error::{MuxError, MuxResult};
pub use handle::{AudioStream, VideoStream};
pub use sequential::WriteCompletion;
pub use sink::{EncodingAudioSink, EncodingVideoSink, StreamSink};
pub use writer::AviWriter;
