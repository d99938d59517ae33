//! The `hdrl` header list: main header, stream lists, OpenDML header and
//! the `JUNK` filler that reserves unused super index slots.
//!
//! The header is written twice with identical size: provisionally when
//! writing starts, and again with final counts when the writer closes.

use byteorder::{LittleEndian, WriteBytesExt};
use fc_common::{AviCodec, BitsPerPixel, Rational, WaveFormat};
use std::io::{Seek, Write};

use crate::error::MuxResult;
use crate::index::{StreamIndex, MAX_SUPER_INDEX_ENTRIES, SUPER_INDEX_ENTRY_SIZE};
use crate::riff::{self, tags, RiffItem, ITEM_HEADER_SIZE};
use crate::stream::{StreamInfo, StreamKind, VideoProps};

/// `avih` flags.
const AVIF_HAS_INDEX: u32 = 0x10;
const AVIF_IS_INTERLEAVED: u32 = 0x100;
const AVIF_TRUST_CK_TYPE: u32 = 0x800;

/// Everything the header reflects.
pub(crate) struct HeaderInfo<'a> {
    pub streams: &'a [StreamInfo],
    pub indexes: &'a [StreamIndex],
    pub frame_rate: Rational,
    pub emit_legacy_index: bool,
    /// Video frames in the first RIFF segment (0 until it closes).
    pub first_segment_frames: u32,
}

impl HeaderInfo<'_> {
    fn video_frame_counts(&self) -> impl Iterator<Item = u64> + '_ {
        self.streams
            .iter()
            .zip(self.indexes)
            .filter(|(s, _)| s.is_video())
            .map(|(_, i)| i.frame_count())
    }

    /// Frames of the longest video stream across all segments.
    fn total_video_frames(&self) -> u32 {
        saturate(self.video_frame_counts().max().unwrap_or(0))
    }
}

/// Write the whole `hdrl` list and return its item.
pub(crate) fn write_header<W: Write + Seek + ?Sized>(
    w: &mut W,
    info: &HeaderInfo<'_>,
) -> MuxResult<RiffItem> {
    let header = riff::open_list(w, tags::LIST, tags::HEADER_LIST)?;
    write_main_header(w, info)?;
    for (stream, index) in info.streams.iter().zip(info.indexes) {
        write_stream_list(w, info, stream, index)?;
    }
    write_odml_header(w, info)?;
    write_junk_for_missing_super_index_entries(w, info.indexes)?;
    riff::close_item(w, header)?;
    Ok(header)
}

fn write_main_header<W: Write + Seek + ?Sized>(w: &mut W, info: &HeaderInfo<'_>) -> MuxResult<()> {
    let fps = info.frame_rate.as_f64();
    let max_chunk_sum: u64 = info.indexes.iter().map(|i| i.max_chunk_size() as u64).sum();

    let mut flags = AVIF_IS_INTERLEAVED | AVIF_TRUST_CK_TYPE;
    if info.emit_legacy_index {
        flags |= AVIF_HAS_INDEX;
    }

    let (width, height) = info
        .streams
        .iter()
        .find_map(StreamInfo::video_props)
        .map_or((0, 0), |v| (v.width, v.height));

    // AVIMAINHEADER
    let chunk = riff::open_chunk(w, tags::MAIN_HEADER, None)?;
    w.write_u32::<LittleEndian>((1_000_000.0 / fps).round() as u32)?; // microseconds per frame
    w.write_u32::<LittleEndian>((fps * max_chunk_sum as f64) as u32)?; // max bytes per second
    w.write_u32::<LittleEndian>(0)?; // padding granularity
    w.write_u32::<LittleEndian>(flags)?;
    w.write_u32::<LittleEndian>(info.first_segment_frames)?;
    w.write_u32::<LittleEndian>(0)?; // initial frames
    w.write_u32::<LittleEndian>(info.streams.len() as u32)?;
    w.write_u32::<LittleEndian>(0)?; // suggested buffer size
    w.write_u32::<LittleEndian>(width)?;
    w.write_u32::<LittleEndian>(height)?;
    riff::write_zeros(w, 4 * 4)?; // reserved
    riff::close_item(w, chunk)?;
    Ok(())
}

fn write_stream_list<W: Write + Seek + ?Sized>(
    w: &mut W,
    info: &HeaderInfo<'_>,
    stream: &StreamInfo,
    index: &StreamIndex,
) -> MuxResult<()> {
    let list = riff::open_list(w, tags::LIST, tags::STREAM_LIST)?;

    let chunk = riff::open_chunk(w, tags::STREAM_HEADER, None)?;
    match stream.kind() {
        StreamKind::Video(video) => write_video_stream_header(w, info.frame_rate, video, index)?,
        StreamKind::Audio(wave) => write_audio_stream_header(w, wave, index)?,
    }
    riff::close_item(w, chunk)?;

    let chunk = riff::open_chunk(w, tags::STREAM_FORMAT, None)?;
    match stream.kind() {
        StreamKind::Video(video) => write_bitmap_info_header(w, video)?,
        StreamKind::Audio(wave) => wave.write_to(w)?,
    }
    riff::close_item(w, chunk)?;

    if let Some(name) = stream.name().filter(|n| !n.is_empty()) {
        let chunk = riff::open_chunk(w, tags::STREAM_NAME, None)?;
        let ascii: Vec<u8> = name
            .chars()
            .map(|c| if c.is_ascii() && c != '\0' { c as u8 } else { b'?' })
            .collect();
        w.write_all(&ascii)?;
        w.write_u8(0)?;
        riff::close_item(w, chunk)?;
    }

    let chunk = riff::open_chunk(w, tags::SUPER_INDEX, Some(index.super_index_size()))?;
    index.write_super_index(w)?;
    riff::close_item(w, chunk)?;

    riff::close_item(w, list)?;
    Ok(())
}

fn write_video_stream_header<W: Write + ?Sized>(
    w: &mut W,
    frame_rate: Rational,
    video: &VideoProps,
    index: &StreamIndex,
) -> MuxResult<()> {
    // AVISTREAMHEADER
    w.write_all(tags::VIDEO_STREAM.as_bytes())?;
    w.write_all(video.codec.fourcc.as_bytes())?;
    w.write_u32::<LittleEndian>(0)?; // flags
    w.write_u16::<LittleEndian>(0)?; // priority
    w.write_u16::<LittleEndian>(0)?; // language
    w.write_u32::<LittleEndian>(0)?; // initial frames
    w.write_u32::<LittleEndian>(frame_rate.den)?; // scale
    w.write_u32::<LittleEndian>(frame_rate.num)?; // rate
    w.write_u32::<LittleEndian>(0)?; // start
    w.write_u32::<LittleEndian>(saturate(index.frame_count()))?; // length
    w.write_u32::<LittleEndian>(index.max_chunk_size())?; // suggested buffer size
    w.write_u32::<LittleEndian>(0)?; // quality
    w.write_u32::<LittleEndian>(0)?; // sample size
    w.write_i16::<LittleEndian>(0)?; // frame left
    w.write_i16::<LittleEndian>(0)?; // frame top
    w.write_i16::<LittleEndian>(video.width as i16)?;
    w.write_i16::<LittleEndian>(video.height as i16)?;
    Ok(())
}

fn write_audio_stream_header<W: Write + ?Sized>(
    w: &mut W,
    wave: &WaveFormat,
    index: &StreamIndex,
) -> MuxResult<()> {
    let block_align = wave.block_align.max(1) as u64;

    // AVISTREAMHEADER
    w.write_all(tags::AUDIO_STREAM.as_bytes())?;
    w.write_u32::<LittleEndian>(0)?; // no codec
    w.write_u32::<LittleEndian>(0)?; // flags
    w.write_u16::<LittleEndian>(0)?; // priority
    w.write_u16::<LittleEndian>(0)?; // language
    w.write_u32::<LittleEndian>(0)?; // initial frames
    w.write_u32::<LittleEndian>(wave.block_align as u32)?; // scale
    w.write_u32::<LittleEndian>(wave.average_bytes_per_second)?; // rate
    w.write_u32::<LittleEndian>(0)?; // start
    w.write_u32::<LittleEndian>(saturate(index.total_bytes() / block_align))?; // length in blocks
    w.write_u32::<LittleEndian>(wave.average_bytes_per_second / 2)?; // suggested buffer size
    w.write_i32::<LittleEndian>(-1)?; // quality
    w.write_u32::<LittleEndian>(wave.block_align as u32)?; // sample size
    riff::write_zeros(w, 4 * 2)?; // frame rectangle
    Ok(())
}

fn write_bitmap_info_header<W: Write + ?Sized>(w: &mut W, video: &VideoProps) -> MuxResult<()> {
    let bits = video.bits_per_pixel.bits();
    let image_size = video.width as u64 * video.height as u64 * (bits / 8) as u64;
    let grayscale_palette =
        video.bits_per_pixel == BitsPerPixel::Bpp8 && video.codec == AviCodec::UNCOMPRESSED;

    // BITMAPINFOHEADER
    w.write_u32::<LittleEndian>(40)?;
    w.write_i32::<LittleEndian>(video.width as i32)?;
    w.write_i32::<LittleEndian>(video.height as i32)?;
    w.write_u16::<LittleEndian>(1)?; // planes
    w.write_u16::<LittleEndian>(bits)?;
    w.write_all(video.codec.fourcc.as_bytes())?; // compression
    w.write_u32::<LittleEndian>(saturate(image_size))?;
    w.write_i32::<LittleEndian>(0)?; // x pixels per meter
    w.write_i32::<LittleEndian>(0)?; // y pixels per meter

    if grayscale_palette {
        w.write_u32::<LittleEndian>(256)?; // colors used
        w.write_u32::<LittleEndian>(0)?; // colors important
        for level in 0..=255u8 {
            w.write_all(&[level, level, level, 0])?;
        }
    } else {
        w.write_u32::<LittleEndian>(0)?;
        w.write_u32::<LittleEndian>(0)?;
    }
    Ok(())
}

fn write_odml_header<W: Write + Seek + ?Sized>(w: &mut W, info: &HeaderInfo<'_>) -> MuxResult<()> {
    let list = riff::open_list(w, tags::LIST, tags::ODML_LIST)?;
    let chunk = riff::open_chunk(w, tags::ODML_HEADER, None)?;
    w.write_u32::<LittleEndian>(info.total_video_frames())?;
    riff::write_zeros(w, 61 * 4)?; // reserved
    riff::close_item(w, chunk)?;
    riff::close_item(w, list)?;
    Ok(())
}

/// Fill the space unused super index slots will take once the header is
/// rewritten, keeping the header's total size constant.
fn write_junk_for_missing_super_index_entries<W: Write + Seek + ?Sized>(
    w: &mut W,
    indexes: &[StreamIndex],
) -> MuxResult<()> {
    let missing: usize = indexes
        .iter()
        .map(|i| MAX_SUPER_INDEX_ENTRIES.saturating_sub(i.super_index().len()))
        .sum();
    if missing == 0 {
        return Ok(());
    }

    let junk_size = missing * SUPER_INDEX_ENTRY_SIZE - ITEM_HEADER_SIZE as usize;
    let chunk = riff::open_chunk(w, tags::JUNK, Some(junk_size as u32))?;
    riff::write_zeros(w, junk_size)?;
    riff::close_item(w, chunk)?;
    Ok(())
}

fn saturate(value: u64) -> u32 {
    u32::try_from(value).unwrap_or(u32::MAX)
}
