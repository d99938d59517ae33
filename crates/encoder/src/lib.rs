//! `fc-encoder` -- Encoder collaborators for the framecap AVI muxer.
//!
//! Encoders plug into `fc-mux` encoding streams through the
//! `VideoEncoder` / `AudioEncoder` traits from `fc-common`. External
//! libraries are loaded dynamically at runtime, so a missing codec only
//! fails the stream that needs it.
//!
//! # Architecture
//!
//! - [`uncompressed`] -- BGR32 top-down to BGR24 bottom-up conversion
//! - [`single_threaded`] -- Confines a non-`Send` encoder to its own thread
//! - [`lame`] -- MP3 audio through the LAME shared library (`libloading`)
//! - [`factory`] -- `EncodingStreamFactory`, shortcuts on `AviWriter`
//!
//! # Encode Pipeline
//!
//! ```text
//! raw frame / PCM block
//!   --> stream worker (submission order)
//!     --> encoder (this crate)
//!       --> AVI engine (chunk + index entry)
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use fc_encoder::{EncodingStreamFactory, LameLibrary};
//! use fc_common::Mp3EncoderConfig;
//! use fc_mux::{AviWriter, MuxerConfig};
//!
//! let mut writer = AviWriter::create("capture.avi", MuxerConfig::default())?;
//! let video = writer.add_uncompressed_video_stream(1920, 1080)?;
//! let audio = writer.add_mp3_audio_stream(
//!     Arc::new(LameLibrary::load()?),
//!     Mp3EncoderConfig::default(),
//! )?;
//!
//! video.write_frame(true, &bgr32_frame)?;
//! audio.write_block(&pcm16)?;
//! writer.close()?;
//! ```

pub mod error;
pub mod factory;
pub mod lame;
pub mod single_threaded;
pub mod uncompressed;

pub use error::LameLoadError;
pub use factory::EncodingStreamFactory;
pub use lame::{LameLibrary, Mp3AudioEncoder};
pub use single_threaded::{SingleThreadedVideoEncoder, ThreadBoundVideoEncoder};
pub use uncompressed::UncompressedVideoEncoder;
