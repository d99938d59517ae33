//! `fc-common` -- Shared types, traits, and errors for the framecap capture toolkit.
//!
//! This crate is the foundation the muxer and encoder crates depend on.
//! It defines:
//!
//! - **Types**: `FourCc`, `Rational`, `Resolution` (newtypes for safety)
//! - **Codecs**: `AviCodec`, `BitsPerPixel`
//! - **Audio formats**: `WaveFormat` (PCM, IEEE float, MPEG layer 3)
//! - **Encoder traits**: `VideoEncoder`, `AudioEncoder` (collaborator interfaces)
//! - **Errors**: `EncodeError` (thiserror-based)
//! - **Config**: `Mp3EncoderConfig`

pub mod codec;
pub mod config;
pub mod encoder;
pub mod error;
pub mod types;
pub mod wave;

// Re-export commonly used items at crate root
pub use codec::{AviCodec, BitsPerPixel};
pub use config::{Mp3EncoderConfig, MP3_SUPPORTED_BIT_RATES};
pub use encoder::{ensure_buffer_capacity, AudioEncoder, EncodedFrame, VideoEncoder};
pub use error::{EncodeError, EncodeResult};
pub use types::{FourCc, Rational, Resolution};
pub use wave::{Mp3Padding, WaveEncoding, WaveFormat};
