//! MP3 audio encoding through the LAME shared library.
//!
//! The library is loaded at runtime via `libloading`; nothing links against
//! LAME at build time. Load it once and share it between encoders:
//!
//! ```ignore
//! let library = Arc::new(LameLibrary::load()?);
//! let encoder = Mp3AudioEncoder::new(library, Mp3EncoderConfig::default())?;
//! ```

use std::ffi::{c_int, c_void};
use std::path::Path;
use std::ptr::NonNull;
use std::sync::Arc;

use fc_common::{
    AudioEncoder, EncodeError, EncodeResult, Mp3EncoderConfig, Mp3Padding, WaveFormat,
};
use libloading::Library;
use tracing::{debug, info};

use crate::error::LameLoadError;

/// Opaque `lame_global_flags *`.
type LameContext = *mut c_void;

type InitFn = unsafe extern "C" fn() -> LameContext;
type CloseFn = unsafe extern "C" fn(LameContext) -> c_int;
type SetIntFn = unsafe extern "C" fn(LameContext, c_int) -> c_int;
type GetIntFn = unsafe extern "C" fn(LameContext) -> c_int;
type SetFlagFn = unsafe extern "C" fn(LameContext, c_int);
type EncodeBufferFn =
    unsafe extern "C" fn(LameContext, *const i16, *const i16, c_int, *mut u8, c_int) -> c_int;
type EncodeInterleavedFn =
    unsafe extern "C" fn(LameContext, *mut i16, c_int, *mut u8, c_int) -> c_int;
type FlushFn = unsafe extern "C" fn(LameContext, *mut u8, c_int) -> c_int;

/// `MPEG_mode` values.
const MODE_STEREO: c_int = 0;
const MODE_MONO: c_int = 3;
/// `vbr_off`.
const VBR_OFF: c_int = 0;

const SAMPLE_BYTES: usize = 2;

/// LAME entry points used by [`Mp3AudioEncoder`].
struct LameApi {
    init: InitFn,
    close: CloseFn,
    set_num_channels: SetIntFn,
    set_in_samplerate: SetIntFn,
    set_brate: SetIntFn,
    set_mode: SetIntFn,
    set_vbr: SetIntFn,
    set_write_vbr_tag: SetIntFn,
    set_decode_only: SetIntFn,
    set_write_id3tag_automatic: SetFlagFn,
    init_params: GetIntFn,
    get_framesize: GetIntFn,
    get_encoder_delay: GetIntFn,
    encode_buffer: EncodeBufferFn,
    encode_buffer_interleaved: EncodeInterleavedFn,
    encode_flush: FlushFn,
}

/// Dynamically loaded LAME library.
pub struct LameLibrary {
    /// Keeps the symbols below valid.
    _lib: Library,
    api: LameApi,
}

impl std::fmt::Debug for LameLibrary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LameLibrary")
            .field("loaded", &true)
            .finish()
    }
}

impl LameLibrary {
    /// Load LAME from the default library search path.
    pub fn load() -> Result<Self, LameLoadError> {
        let lib_name = Self::library_name();
        info!(library = %lib_name, "Loading LAME library");

        // SAFETY: Loading the system LAME library runs no initialization
        // code beyond the C runtime's.
        let lib = unsafe { Library::new(lib_name) }.map_err(|e| {
            LameLoadError::LibraryNotFound(format!("Failed to load {lib_name}: {e}"))
        })?;

        Self::load_functions(lib)
    }

    /// Load LAME from a specific path.
    pub fn load_from(path: &Path) -> Result<Self, LameLoadError> {
        info!(path = %path.display(), "Loading LAME library from custom path");

        // SAFETY: The caller asserts this is a LAME build.
        let lib = unsafe { Library::new(path) }.map_err(|e| {
            LameLoadError::LibraryNotFound(format!("Failed to load {}: {e}", path.display()))
        })?;

        Self::load_functions(lib)
    }

    fn load_functions(lib: Library) -> Result<Self, LameLoadError> {
        /// Copy the function pointer `name` out of `lib`.
        ///
        /// # Safety
        /// `T` must match the C signature of the symbol.
        unsafe fn symbol<T: Copy>(lib: &Library, name: &str) -> Result<T, LameLoadError> {
            let mut c_name = name.as_bytes().to_vec();
            c_name.push(0);
            // SAFETY: Guaranteed by the caller.
            unsafe { lib.get::<T>(&c_name) }
                .map(|s| *s)
                .map_err(|e| LameLoadError::SymbolNotFound(format!("{name}: {e}")))
        }

        // SAFETY: Every signature below matches `lame.h` (LAME 3.100).
        let api = unsafe {
            LameApi {
                init: symbol(&lib, "lame_init")?,
                close: symbol(&lib, "lame_close")?,
                set_num_channels: symbol(&lib, "lame_set_num_channels")?,
                set_in_samplerate: symbol(&lib, "lame_set_in_samplerate")?,
                set_brate: symbol(&lib, "lame_set_brate")?,
                set_mode: symbol(&lib, "lame_set_mode")?,
                set_vbr: symbol(&lib, "lame_set_VBR")?,
                set_write_vbr_tag: symbol(&lib, "lame_set_bWriteVbrTag")?,
                set_decode_only: symbol(&lib, "lame_set_decode_only")?,
                set_write_id3tag_automatic: symbol(&lib, "lame_set_write_id3tag_automatic")?,
                init_params: symbol(&lib, "lame_init_params")?,
                get_framesize: symbol(&lib, "lame_get_framesize")?,
                get_encoder_delay: symbol(&lib, "lame_get_encoder_delay")?,
                encode_buffer: symbol(&lib, "lame_encode_buffer")?,
                encode_buffer_interleaved: symbol(&lib, "lame_encode_buffer_interleaved")?,
                encode_flush: symbol(&lib, "lame_encode_flush")?,
            }
        };

        debug!("LAME entry points resolved");
        Ok(Self { _lib: lib, api })
    }

    fn library_name() -> &'static str {
        if cfg!(target_os = "windows") {
            "libmp3lame.dll"
        } else if cfg!(target_os = "macos") {
            "libmp3lame.dylib"
        } else {
            "libmp3lame.so.0"
        }
    }
}

/// MP3 encoder over 16-bit little-endian PCM (interleaved when stereo).
pub struct Mp3AudioEncoder {
    library: Arc<LameLibrary>,
    context: NonNull<c_void>,
    config: Mp3EncoderConfig,
    wave_format: WaveFormat,
    samples: Vec<i16>,
    blocks: u64,
}

// SAFETY: The LAME context is only touched through `&mut self` (or in
// drop), so it is never used from two threads at once. LAME keeps no
// thread-local state per context.
unsafe impl Send for Mp3AudioEncoder {}

impl Mp3AudioEncoder {
    pub fn new(library: Arc<LameLibrary>, config: Mp3EncoderConfig) -> EncodeResult<Self> {
        config.validate()?;
        let api = &library.api;

        // SAFETY: lame_init has no preconditions.
        let context = NonNull::new(unsafe { (api.init)() })
            .ok_or_else(|| EncodeError::EncoderInit("lame_init failed".into()))?;
        let ctx = context.as_ptr();

        let mode = if config.channels == 1 {
            MODE_MONO
        } else {
            MODE_STEREO
        };
        // SAFETY: ctx is a live context from lame_init.
        let (status, frame_size, encoder_delay) = unsafe {
            (api.set_num_channels)(ctx, c_int::from(config.channels));
            (api.set_in_samplerate)(ctx, config.sample_rate as c_int);
            (api.set_brate)(ctx, config.bit_rate_kbps as c_int);
            (api.set_mode)(ctx, mode);
            (api.set_vbr)(ctx, VBR_OFF);
            (api.set_write_id3tag_automatic)(ctx, 0);
            (api.set_write_vbr_tag)(ctx, 0);
            (api.set_decode_only)(ctx, 0);
            let status = (api.init_params)(ctx);
            (
                status,
                (api.get_framesize)(ctx),
                (api.get_encoder_delay)(ctx),
            )
        };
        if status != 0 {
            // SAFETY: ctx is live and not used afterwards.
            unsafe { (api.close)(ctx) };
            return Err(EncodeError::EncoderInit(format!(
                "lame_init_params returned {status}"
            )));
        }

        let wave_format = WaveFormat::mp3(
            config.sample_rate,
            config.channels,
            config.bit_rate_kbps,
            u16::try_from(frame_size).unwrap_or(0),
            u16::try_from(encoder_delay).unwrap_or(0),
            Mp3Padding::Off,
        );
        info!(
            channels = config.channels,
            sample_rate = config.sample_rate,
            kbps = config.bit_rate_kbps,
            frame_size,
            encoder_delay,
            "Created MP3 encoder"
        );

        Ok(Self {
            library,
            context,
            config,
            wave_format,
            samples: Vec::new(),
            blocks: 0,
        })
    }

    fn check_status(&self, status: c_int, call: &str) -> EncodeResult<usize> {
        usize::try_from(status).map_err(|_| EncodeError::EncodeFailed {
            frame: self.blocks,
            reason: format!("{call} returned {status}"),
        })
    }
}

/// Worst-case MP3 output for `samples` input samples, as documented by LAME.
fn max_mp3_length(samples: usize) -> usize {
    (samples * 5).div_ceil(4) + 7200
}

fn buffer_len(dst: &[u8]) -> c_int {
    c_int::try_from(dst.len()).unwrap_or(c_int::MAX)
}

impl AudioEncoder for Mp3AudioEncoder {
    fn wave_format(&self) -> WaveFormat {
        self.wave_format.clone()
    }

    fn max_encoded_length(&self, source_len: usize) -> usize {
        max_mp3_length(source_len / SAMPLE_BYTES)
    }

    fn encode(&mut self, src: &[u8], dst: &mut [u8]) -> EncodeResult<usize> {
        self.samples.clear();
        self.samples.extend(
            src.chunks_exact(SAMPLE_BYTES)
                .map(|b| i16::from_le_bytes([b[0], b[1]])),
        );
        let count = self.samples.len();
        if count == 0 {
            return Ok(0);
        }

        let api = &self.library.api;
        let ctx = self.context.as_ptr();
        let samples = self.samples.as_mut_ptr();
        // SAFETY: ctx is live; `samples` holds `count` values and dst is
        // writable for the length passed.
        let status = unsafe {
            if self.config.channels == 1 {
                (api.encode_buffer)(
                    ctx,
                    samples,
                    samples,
                    count as c_int,
                    dst.as_mut_ptr(),
                    buffer_len(dst),
                )
            } else {
                (api.encode_buffer_interleaved)(
                    ctx,
                    samples,
                    (count / 2) as c_int,
                    dst.as_mut_ptr(),
                    buffer_len(dst),
                )
            }
        };
        let written = self.check_status(status, "lame_encode_buffer")?;
        self.blocks += 1;
        Ok(written)
    }

    fn flush(&mut self, dst: &mut [u8]) -> EncodeResult<usize> {
        // SAFETY: ctx is live and dst is writable for the length passed.
        let status = unsafe {
            (self.library.api.encode_flush)(self.context.as_ptr(), dst.as_mut_ptr(), buffer_len(dst))
        };
        self.check_status(status, "lame_encode_flush")
    }
}

impl Drop for Mp3AudioEncoder {
    fn drop(&mut self) {
        // SAFETY: The context came from lame_init and is closed once.
        unsafe { (self.library.api.close)(self.context.as_ptr()) };
    }
}
