//! Per-stream statistics and OpenDML / legacy index aggregation.
//!
//! Each stream collects:
//! - a pending **standard index** of data chunk offsets, flushed to disk as an
//!   `ixNN` chunk when full or when offsets no longer fit 32-bit deltas
//! - a **super index** pointing at every flushed `ixNN` chunk, written into
//!   the header's `indx` chunk (at most 256 entries)
//! - optionally a **legacy index** for the first RIFF segment, merged across
//!   streams into one offset-ordered `idx1` chunk

use byteorder::{LittleEndian, WriteBytesExt};
use fc_common::FourCc;
use std::cmp::Reverse;
use std::collections::{BinaryHeap, VecDeque};
use std::io::Write;

use crate::error::{MuxError, MuxResult};
use crate::riff::write_zeros;

/// Hard ceiling on super index entries per stream.
pub const MAX_SUPER_INDEX_ENTRIES: usize = 256;

/// Default standard index capacity before a flush.
pub const MAX_STANDARD_INDEX_ENTRIES: usize = 15_000;

pub const SUPER_INDEX_ENTRY_SIZE: usize = 16;
pub const LEGACY_INDEX_ENTRY_SIZE: u64 = 16;

/// Set on standard index sizes of non-key frames.
pub const NON_KEY_FRAME_FLAG: u32 = 0x8000_0000;

/// `idx1` flag of key frames (AVIIF_KEYFRAME).
pub const LEGACY_KEY_FRAME_FLAG: u32 = 0x10;

/// `bIndexType` values.
const INDEX_OF_INDEXES: u8 = 0;
const INDEX_OF_CHUNKS: u8 = 1;

const STANDARD_INDEX_HEADER_SIZE: u32 = 24;
const STANDARD_INDEX_ENTRY_SIZE: u32 = 8;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct StandardIndexEntry {
    /// Absolute offset of the chunk payload.
    pub data_offset: u64,
    /// Payload size, with [`NON_KEY_FRAME_FLAG`] set for non-key frames.
    pub size_and_flag: u32,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct SuperIndexEntry {
    /// Absolute offset of the `ixNN` chunk header.
    pub chunk_offset: u64,
    /// Size of the `ixNN` chunk including its header.
    pub chunk_size: u32,
    /// Number of entries in that chunk.
    pub duration: u32,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct LegacyIndexEntry {
    pub is_key_frame: bool,
    /// Offset of the chunk header from the `movi` list type.
    pub offset: u32,
    pub size: u32,
}

/// Running totals and index buffers of one stream.
#[derive(Debug)]
pub struct StreamIndex {
    stream: usize,
    chunk_tag: FourCc,
    index_chunk_tag: FourCc,
    frame_count: u64,
    max_chunk_size: u32,
    total_bytes: u64,
    standard: Vec<StandardIndexEntry>,
    super_index: Vec<SuperIndexEntry>,
    legacy: VecDeque<LegacyIndexEntry>,
    exhausted: bool,
}

impl StreamIndex {
    pub fn new(stream: usize, chunk_tag: FourCc, index_chunk_tag: FourCc) -> Self {
        Self {
            stream,
            chunk_tag,
            index_chunk_tag,
            frame_count: 0,
            max_chunk_size: 0,
            total_bytes: 0,
            standard: Vec::new(),
            super_index: Vec::new(),
            legacy: VecDeque::new(),
            exhausted: false,
        }
    }

    pub fn chunk_tag(&self) -> FourCc {
        self.chunk_tag
    }

    pub fn index_chunk_tag(&self) -> FourCc {
        self.index_chunk_tag
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    pub fn max_chunk_size(&self) -> u32 {
        self.max_chunk_size
    }

    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }

    pub fn pending_entries(&self) -> &[StandardIndexEntry] {
        &self.standard
    }

    pub fn super_index(&self) -> &[SuperIndexEntry] {
        &self.super_index
    }

    pub fn legacy_len(&self) -> usize {
        self.legacy.len()
    }

    /// Whether the stream was refused further frames.
    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    /// Check that one more frame can be indexed, given whether admitting it
    /// requires flushing the pending entries first.
    ///
    /// Every admitted frame ends up in some super index slot, so a flush
    /// that would fill the last slot leaves nowhere for the new frame.
    /// A refused stream stays refused.
    pub fn check_capacity(&mut self, flush_needed: bool) -> MuxResult<()> {
        let used = self.super_index.len() + usize::from(flush_needed);
        if self.exhausted || used >= MAX_SUPER_INDEX_ENTRIES {
            self.exhausted = true;
            return Err(MuxError::SuperIndexFull {
                stream: self.stream,
            });
        }
        Ok(())
    }

    /// Whether pending entries must be flushed before a chunk whose payload
    /// may start at `next_data_offset`.
    pub fn needs_flush(&self, max_entries: usize, next_data_offset: u64) -> bool {
        match self.standard.first() {
            None => false,
            Some(_) if self.standard.len() >= max_entries => true,
            Some(first) => next_data_offset.saturating_sub(first.data_offset) > u32::MAX as u64,
        }
    }

    /// Update totals and append a standard index entry for a written chunk.
    pub fn record_chunk(&mut self, data_offset: u64, size: u32, is_key_frame: bool) {
        self.frame_count += 1;
        self.max_chunk_size = self.max_chunk_size.max(size);
        self.total_bytes += size as u64;

        let size_and_flag = if is_key_frame {
            size
        } else {
            size | NON_KEY_FRAME_FLAG
        };
        self.standard.push(StandardIndexEntry {
            data_offset,
            size_and_flag,
        });
    }

    pub fn record_legacy(&mut self, entry: LegacyIndexEntry) {
        self.legacy.push_back(entry);
    }

    /// Payload size of the `ixNN` chunk for the pending entries.
    pub fn standard_index_size(&self) -> u32 {
        STANDARD_INDEX_HEADER_SIZE + self.standard.len() as u32 * STANDARD_INDEX_ENTRY_SIZE
    }

    /// Write the AVISTDINDEX payload for the pending entries.
    pub fn write_standard_index<W: Write + ?Sized>(&self, w: &mut W) -> MuxResult<()> {
        let base_offset = self.standard.first().map_or(0, |e| e.data_offset);

        w.write_u16::<LittleEndian>(2)?; // u32 words per entry
        w.write_u8(0)?; // sub-type
        w.write_u8(INDEX_OF_CHUNKS)?;
        w.write_u32::<LittleEndian>(self.standard.len() as u32)?;
        w.write_all(self.chunk_tag.as_bytes())?;
        w.write_u64::<LittleEndian>(base_offset)?;
        w.write_u32::<LittleEndian>(0)?; // reserved

        for entry in &self.standard {
            let delta = u32::try_from(entry.data_offset - base_offset)
                .map_err(|_| MuxError::ItemTooLarge(entry.data_offset - base_offset))?;
            w.write_u32::<LittleEndian>(delta)?;
            w.write_u32::<LittleEndian>(entry.size_and_flag)?;
        }
        Ok(())
    }

    /// Register a flushed `ixNN` chunk and clear the pending entries.
    pub fn commit_flush(&mut self, chunk_offset: u64, chunk_size: u32) -> MuxResult<()> {
        if self.super_index.len() >= MAX_SUPER_INDEX_ENTRIES {
            self.exhausted = true;
            return Err(MuxError::SuperIndexFull {
                stream: self.stream,
            });
        }
        self.super_index.push(SuperIndexEntry {
            chunk_offset,
            chunk_size,
            duration: self.standard.len() as u32,
        });
        self.standard.clear();
        Ok(())
    }

    /// Payload size of the `indx` chunk for the current entries.
    pub fn super_index_size(&self) -> u32 {
        (24 + self.super_index.len() * SUPER_INDEX_ENTRY_SIZE) as u32
    }

    /// Write the AVISUPERINDEX payload.
    pub fn write_super_index<W: Write + ?Sized>(&self, w: &mut W) -> MuxResult<()> {
        w.write_u16::<LittleEndian>(4)?; // u32 words per entry
        w.write_u8(0)?; // sub-type
        w.write_u8(INDEX_OF_INDEXES)?;
        w.write_u32::<LittleEndian>(self.super_index.len() as u32)?;
        w.write_all(self.chunk_tag.as_bytes())?;
        write_zeros(w, 3 * 4)?; // reserved

        for entry in &self.super_index {
            w.write_u64::<LittleEndian>(entry.chunk_offset)?;
            w.write_u32::<LittleEndian>(entry.chunk_size)?;
            w.write_u32::<LittleEndian>(entry.duration)?;
        }
        Ok(())
    }
}

/// Write the `idx1` payload: every stream's legacy entries, merged into
/// ascending offset order. Drains the entries. Returns how many were written.
pub fn write_legacy_index<W: Write + ?Sized>(
    w: &mut W,
    streams: &mut [StreamIndex],
) -> MuxResult<usize> {
    let mut heads: BinaryHeap<Reverse<(u32, usize)>> = streams
        .iter()
        .enumerate()
        .filter_map(|(i, s)| s.legacy.front().map(|e| Reverse((e.offset, i))))
        .collect();

    let mut written = 0;
    while let Some(Reverse((_, i))) = heads.pop() {
        let stream = &mut streams[i];
        let Some(entry) = stream.legacy.pop_front() else {
            continue;
        };

        w.write_all(stream.chunk_tag.as_bytes())?;
        w.write_u32::<LittleEndian>(if entry.is_key_frame {
            LEGACY_KEY_FRAME_FLAG
        } else {
            0
        })?;
        w.write_u32::<LittleEndian>(entry.offset)?;
        w.write_u32::<LittleEndian>(entry.size)?;
        written += 1;

        if let Some(next) = stream.legacy.front() {
            heads.push(Reverse((next.offset, i)));
        }
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index(stream: usize) -> StreamIndex {
        StreamIndex::new(
            stream,
            FourCc::indexed(stream, b"dc"),
            FourCc::prefixed(b"ix", stream),
        )
    }

    fn read_u32(buf: &[u8], at: usize) -> u32 {
        u32::from_le_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]])
    }

    #[test]
    fn test_record_chunk_updates_totals() {
        let mut idx = index(0);
        idx.record_chunk(100, 50, true);
        idx.record_chunk(160, 70, false);
        assert_eq!(idx.frame_count(), 2);
        assert_eq!(idx.max_chunk_size(), 70);
        assert_eq!(idx.total_bytes(), 120);
        assert_eq!(idx.pending_entries()[0].size_and_flag, 50);
        assert_eq!(idx.pending_entries()[1].size_and_flag, 70 | NON_KEY_FRAME_FLAG);
    }

    #[test]
    fn test_needs_flush_on_count() {
        let mut idx = index(0);
        assert!(!idx.needs_flush(2, 0));
        idx.record_chunk(8, 4, true);
        assert!(!idx.needs_flush(2, 20));
        idx.record_chunk(20, 4, true);
        assert!(idx.needs_flush(2, 32));
    }

    #[test]
    fn test_needs_flush_on_offset_range() {
        let mut idx = index(0);
        idx.record_chunk(1000, 4, true);
        assert!(!idx.needs_flush(15_000, 1000 + u32::MAX as u64));
        assert!(idx.needs_flush(15_000, 1001 + u32::MAX as u64));
    }

    #[test]
    fn test_standard_index_layout() {
        let mut idx = index(1);
        idx.record_chunk(1_000, 10, true);
        idx.record_chunk(1_020, 12, false);

        let mut buf = Vec::new();
        idx.write_standard_index(&mut buf).unwrap();
        assert_eq!(buf.len() as u32, idx.standard_index_size());
        assert_eq!(&buf[0..2], &2u16.to_le_bytes());
        assert_eq!(buf[3], INDEX_OF_CHUNKS);
        assert_eq!(read_u32(&buf, 4), 2);
        assert_eq!(&buf[8..12], b"01dc");
        assert_eq!(&buf[12..20], &1_000u64.to_le_bytes());
        // entries: delta, size
        assert_eq!(read_u32(&buf, 24), 0);
        assert_eq!(read_u32(&buf, 28), 10);
        assert_eq!(read_u32(&buf, 32), 20);
        assert_eq!(read_u32(&buf, 36), 12 | NON_KEY_FRAME_FLAG);
    }

    #[test]
    fn test_commit_flush_adds_one_super_entry() {
        let mut idx = index(0);
        idx.record_chunk(8, 4, true);
        idx.record_chunk(20, 4, true);
        idx.commit_flush(40, 48).unwrap();
        assert!(idx.pending_entries().is_empty());
        assert_eq!(
            idx.super_index(),
            &[SuperIndexEntry {
                chunk_offset: 40,
                chunk_size: 48,
                duration: 2
            }]
        );
        assert_eq!(idx.frame_count(), 2);
    }

    #[test]
    fn test_super_index_ceiling() {
        let mut idx = index(0);
        for i in 0..MAX_SUPER_INDEX_ENTRIES as u64 {
            idx.record_chunk(i * 100, 4, true);
            idx.commit_flush(i * 100 + 50, 40).unwrap();
        }
        idx.record_chunk(1_000_000, 4, true);
        assert!(matches!(
            idx.commit_flush(2_000_000, 40),
            Err(MuxError::SuperIndexFull { stream: 0 })
        ));
        assert_eq!(idx.super_index().len(), MAX_SUPER_INDEX_ENTRIES);
        assert!(idx.is_exhausted());
        assert!(idx.check_capacity(false).is_err());
    }

    #[test]
    fn test_capacity_reserves_last_slot() {
        let mut idx = index(0);
        for i in 0..(MAX_SUPER_INDEX_ENTRIES - 1) as u64 {
            idx.record_chunk(i * 100, 4, true);
            idx.commit_flush(i * 100 + 50, 40).unwrap();
        }
        assert!(idx.check_capacity(false).is_ok());
        assert!(idx.check_capacity(true).is_err());
        // refusal sticks
        assert!(idx.check_capacity(false).is_err());
    }

    #[test]
    fn test_super_index_layout() {
        let mut idx = index(2);
        idx.record_chunk(8, 4, true);
        idx.commit_flush(0x1_0000_0000, 40).unwrap();

        let mut buf = Vec::new();
        idx.write_super_index(&mut buf).unwrap();
        assert_eq!(buf.len() as u32, idx.super_index_size());
        assert_eq!(&buf[0..2], &4u16.to_le_bytes());
        assert_eq!(buf[3], INDEX_OF_INDEXES);
        assert_eq!(read_u32(&buf, 4), 1);
        assert_eq!(&buf[8..12], b"02dc");
        assert_eq!(&buf[24..32], &0x1_0000_0000u64.to_le_bytes());
        assert_eq!(read_u32(&buf, 32), 40);
        assert_eq!(read_u32(&buf, 36), 1);
    }

    #[test]
    fn test_legacy_index_merged_by_offset() {
        let mut video = index(0);
        let mut audio = StreamIndex::new(1, FourCc::new(b"01wb"), FourCc::new(b"ix01"));
        for offset in [4, 40, 90] {
            video.record_legacy(LegacyIndexEntry {
                is_key_frame: offset == 4,
                offset,
                size: 10,
            });
        }
        for offset in [20, 60, 70, 120] {
            audio.record_legacy(LegacyIndexEntry {
                is_key_frame: true,
                offset,
                size: 6,
            });
        }

        let mut streams = vec![video, audio];
        let mut buf = Vec::new();
        let written = write_legacy_index(&mut buf, &mut streams).unwrap();
        assert_eq!(written, 7);
        assert_eq!(buf.len(), 7 * 16);

        let offsets: Vec<u32> = buf.chunks(16).map(|e| read_u32(e, 8)).collect();
        assert_eq!(offsets, vec![4, 20, 40, 60, 70, 90, 120]);
        assert_eq!(&buf[0..4], b"00dc");
        assert_eq!(read_u32(&buf, 4), LEGACY_KEY_FRAME_FLAG);
        assert_eq!(&buf[16..20], b"01wb");
        // second video entry is not a key frame
        assert_eq!(read_u32(&buf, 32 + 4), 0);
        assert!(streams.iter().all(|s| s.legacy_len() == 0));
    }
}
