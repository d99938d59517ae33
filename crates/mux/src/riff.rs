//! Low-level RIFF chunk and list writing primitives.
//!
//! RIFF files are structured as nested items. Each item has:
//! - 4-byte tag (e.g. "RIFF", "LIST", "avih", "00dc")
//! - 4-byte little-endian payload size (excludes the 8-byte header)
//! - payload, followed by one pad byte when its length is odd
//!
//! Lists are chunks whose payload starts with a 4-byte list type, followed
//! by nested chunks and lists.

use byteorder::{LittleEndian, WriteBytesExt};
use fc_common::FourCc;
use std::io::{self, Seek, SeekFrom, Write};

use crate::error::{MuxError, MuxResult};

/// Tag + size.
pub const ITEM_HEADER_SIZE: u64 = 8;

/// Tags and list types used by AVI files.
pub mod tags {
    use fc_common::FourCc;

    pub const RIFF: FourCc = FourCc::new(b"RIFF");
    pub const LIST: FourCc = FourCc::new(b"LIST");

    pub const AVI: FourCc = FourCc::new(b"AVI ");
    pub const AVIX: FourCc = FourCc::new(b"AVIX");
    pub const HEADER_LIST: FourCc = FourCc::new(b"hdrl");
    pub const STREAM_LIST: FourCc = FourCc::new(b"strl");
    pub const ODML_LIST: FourCc = FourCc::new(b"odml");
    pub const MOVIE_LIST: FourCc = FourCc::new(b"movi");

    pub const MAIN_HEADER: FourCc = FourCc::new(b"avih");
    pub const STREAM_HEADER: FourCc = FourCc::new(b"strh");
    pub const STREAM_FORMAT: FourCc = FourCc::new(b"strf");
    pub const STREAM_NAME: FourCc = FourCc::new(b"strn");
    pub const SUPER_INDEX: FourCc = FourCc::new(b"indx");
    pub const LEGACY_INDEX: FourCc = FourCc::new(b"idx1");
    pub const ODML_HEADER: FourCc = FourCc::new(b"dmlh");
    pub const JUNK: FourCc = FourCc::new(b"JUNK");

    pub const VIDEO_STREAM: FourCc = FourCc::new(b"vids");
    pub const AUDIO_STREAM: FourCc = FourCc::new(b"auds");
}

/// Any seekable output the writer can own.
pub trait WriteSeek: Write + Seek + Send {}

impl<T: Write + Seek + Send> WriteSeek for T {}

/// An open chunk or list whose size field may still need patching.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct RiffItem {
    data_start: u64,
    declared_size: Option<u32>,
}

impl RiffItem {
    /// Offset of the first payload byte (for lists, the list type).
    pub fn data_start(&self) -> u64 {
        self.data_start
    }

    /// Offset of the item's tag.
    pub fn item_start(&self) -> u64 {
        self.data_start - ITEM_HEADER_SIZE
    }

    pub fn declared_size(&self) -> Option<u32> {
        self.declared_size
    }
}

/// Write a chunk header and return the open item.
///
/// With `declared_size == None` a zero placeholder is written and patched
/// by [`close_item`].
pub fn open_chunk<W: Write + Seek + ?Sized>(
    w: &mut W,
    tag: FourCc,
    declared_size: Option<u32>,
) -> MuxResult<RiffItem> {
    w.write_all(tag.as_bytes())?;
    w.write_u32::<LittleEndian>(declared_size.unwrap_or(0))?;
    let data_start = w.stream_position()?;
    Ok(RiffItem {
        data_start,
        declared_size,
    })
}

/// Write a list header (`tag` is "RIFF" or "LIST") followed by its type.
pub fn open_list<W: Write + Seek + ?Sized>(
    w: &mut W,
    tag: FourCc,
    list_type: FourCc,
) -> MuxResult<RiffItem> {
    let item = open_chunk(w, tag, None)?;
    w.write_all(list_type.as_bytes())?;
    Ok(item)
}

/// Close an item: patch or verify its size, then pad to an even offset.
///
/// Returns the payload size.
pub fn close_item<W: Write + Seek + ?Sized>(w: &mut W, item: RiffItem) -> MuxResult<u32> {
    let position = w.stream_position()?;
    let actual = position - item.data_start;

    match item.declared_size {
        Some(declared) if declared as u64 != actual => {
            return Err(MuxError::SizeMismatch { declared, actual });
        }
        Some(declared) => {
            pad_to_even(w, position)?;
            Ok(declared)
        }
        None => {
            let size = u32::try_from(actual).map_err(|_| MuxError::ItemTooLarge(actual))?;
            w.seek(SeekFrom::Start(item.data_start - 4))?;
            w.write_u32::<LittleEndian>(size)?;
            w.seek(SeekFrom::Start(position))?;
            pad_to_even(w, position)?;
            Ok(size)
        }
    }
}

fn pad_to_even<W: Write + ?Sized>(w: &mut W, position: u64) -> io::Result<()> {
    if position % 2 == 1 {
        w.write_u8(0)?;
    }
    Ok(())
}

/// Write `count` zero bytes.
pub fn write_zeros<W: Write + ?Sized>(w: &mut W, count: usize) -> io::Result<()> {
    const ZEROS: [u8; 256] = [0; 256];
    let mut remaining = count;
    while remaining > 0 {
        let n = remaining.min(ZEROS.len());
        w.write_all(&ZEROS[..n])?;
        remaining -= n;
    }
    Ok(())
}

/// Output wrapper that tracks its own position.
///
/// `BufWriter` flushes on every `stream_position` call; caching the
/// position keeps small header writes buffered.
pub struct TrackedOutput<W> {
    inner: W,
    position: u64,
}

impl<W: Write + Seek> TrackedOutput<W> {
    pub fn new(mut inner: W) -> io::Result<Self> {
        let position = inner.stream_position()?;
        Ok(Self { inner, position })
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: Write> Write for TrackedOutput<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.position += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

impl<W: Seek> Seek for TrackedOutput<W> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.position = self.inner.seek(pos)?;
        Ok(self.position)
    }

    fn stream_position(&mut self) -> io::Result<u64> {
        Ok(self.position)
    }
}
