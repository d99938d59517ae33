//! The multiplexer engine: single logical writer over the output.
//!
//! All structural mutation (admission, index flushes, segment rotation,
//! finalization) happens under one lock. Stream handles and sinks only hold
//! an `Arc<Engine>` and a stream index.

use fc_common::{FourCc, Rational};
use parking_lot::Mutex;
use std::io::{Seek, SeekFrom, Write};
use tracing::{debug, info};

use crate::config::MuxerConfig;
use crate::error::{MuxError, MuxResult};
use crate::header::{self, HeaderInfo};
use crate::index::{self, LegacyIndexEntry, StreamIndex, LEGACY_INDEX_ENTRY_SIZE, NON_KEY_FRAME_FLAG};
use crate::riff::{self, tags, RiffItem, TrackedOutput, WriteSeek, ITEM_HEADER_SIZE};
use crate::stream::StreamInfo;

pub(crate) type Output = TrackedOutput<Box<dyn WriteSeek>>;

/// Bytes that may precede the next payload: its chunk header and the
/// RIFF and `movi` list headers of a new segment.
const MAX_PAYLOAD_LEAD: u64 = ITEM_HEADER_SIZE + 2 * (ITEM_HEADER_SIZE + 4);

pub(crate) struct Engine {
    state: Mutex<WriterState>,
}

struct WriterState {
    config: MuxerConfig,
    streams: Vec<StreamInfo>,
    /// `None` once released by close.
    output: Option<Output>,
    /// Present once writing started.
    session: Option<Session>,
    closed: bool,
}

/// Writer state that exists once the first frame is admitted.
struct Session {
    /// Frozen snapshot of the stream set.
    streams: Vec<StreamInfo>,
    indexes: Vec<StreamIndex>,
    frame_rate: Rational,
    emit_legacy_index: bool,
    max_standard_index_entries: usize,
    extended_segment_threshold: u64,
    header: RiffItem,
    header_end: u64,
    riff: RiffItem,
    /// Current `movi` list; legacy offsets are relative to its list type.
    movie: RiffItem,
    first_segment: bool,
    segment_threshold: u64,
    segment_count: u32,
    first_segment_frames: u32,
    legacy_entries: usize,
}

impl Engine {
    pub fn new(output: Output, config: MuxerConfig) -> Self {
        Self {
            state: Mutex::new(WriterState {
                config,
                streams: Vec::new(),
                output: Some(output),
                session: None,
                closed: false,
            }),
        }
    }

    pub fn config(&self) -> MuxerConfig {
        self.state.lock().config.clone()
    }

    /// Change writer settings; only before writing starts.
    pub fn update_config(&self, f: impl FnOnce(&mut MuxerConfig)) -> MuxResult<()> {
        let mut state = self.state.lock();
        state.check_configurable()?;
        let mut config = state.config.clone();
        f(&mut config);
        config.validate()?;
        state.config = config;
        Ok(())
    }

    pub fn is_started(&self) -> bool {
        self.state.lock().session.is_some()
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    pub fn stream_count(&self) -> usize {
        self.state.lock().streams.len()
    }

    /// Register a stream built by `make` for the next free index. `make`
    /// runs under the lock, so registration is atomic with its setup.
    pub fn register_stream<T>(
        &self,
        make: impl FnOnce(usize) -> MuxResult<(StreamInfo, T)>,
    ) -> MuxResult<T> {
        let mut state = self.state.lock();
        state.check_configurable()?;
        if state.streams.len() >= FourCc::INDEX_LIMIT {
            return Err(MuxError::TooManyStreams(FourCc::INDEX_LIMIT));
        }
        let (info, extra) = make(state.streams.len())?;
        state.streams.push(info);
        Ok(extra)
    }

    pub fn with_stream<R>(&self, stream: usize, f: impl FnOnce(&StreamInfo) -> R) -> R {
        f(&self.state.lock().streams[stream])
    }

    pub fn update_stream(
        &self,
        stream: usize,
        f: impl FnOnce(&mut StreamInfo) -> MuxResult<()>,
    ) -> MuxResult<()> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(MuxError::Closed);
        }
        let info = state
            .streams
            .get_mut(stream)
            .ok_or(MuxError::UnknownStream(stream))?;
        f(info)
    }

    /// Chunks admitted for a stream so far.
    pub fn chunks_written(&self, stream: usize) -> u64 {
        let state = self.state.lock();
        state
            .session
            .as_ref()
            .and_then(|s| s.indexes.get(stream))
            .map_or(0, StreamIndex::frame_count)
    }

    /// Admit one encoded frame or audio block.
    pub fn write_stream_frame(&self, stream: usize, is_key_frame: bool, data: &[u8]) -> MuxResult<()> {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        if state.closed {
            return Err(MuxError::Closed);
        }
        if stream >= state.streams.len() {
            return Err(MuxError::UnknownStream(stream));
        }
        let output = state.output.as_mut().ok_or(MuxError::Closed)?;

        let session = match &mut state.session {
            Some(session) => session,
            empty => empty.insert(Session::start(output, &mut state.streams, &state.config)?),
        };
        session.write_frame(output, stream, is_key_frame, data)
    }

    /// Flush indexes, close the open lists, rewrite the header and release
    /// the output. A second call does nothing.
    ///
    /// The writer counts as closed even when this fails.
    pub fn finalize(&self) -> MuxResult<()> {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        if state.closed {
            return Ok(());
        }
        state.closed = true;

        let Some(mut output) = state.output.take() else {
            return Ok(());
        };
        if let Some(session) = &mut state.session {
            session.finish(&mut output)?;
        }
        output.flush()?;
        Ok(())
    }
}

impl WriterState {
    fn check_configurable(&self) -> MuxResult<()> {
        if self.closed {
            return Err(MuxError::Closed);
        }
        if self.session.is_some() {
            return Err(MuxError::AlreadyStarted);
        }
        Ok(())
    }
}

impl Session {
    /// Freeze the streams, open the first segment and write the provisional
    /// header.
    fn start(
        out: &mut Output,
        streams: &mut [StreamInfo],
        config: &MuxerConfig,
    ) -> MuxResult<Self> {
        let indexes: Vec<StreamIndex> = streams
            .iter_mut()
            .map(|s| {
                let tag = s.freeze();
                StreamIndex::new(s.index(), tag, s.index_chunk_tag())
            })
            .collect();
        let frame_rate = Rational::from_frame_rate(config.frames_per_second);

        let riff = riff::open_list(out, tags::RIFF, tags::AVI)?;
        let header = header::write_header(
            out,
            &HeaderInfo {
                streams,
                indexes: &indexes,
                frame_rate,
                emit_legacy_index: config.emit_legacy_index,
                first_segment_frames: 0,
            },
        )?;
        let header_end = out.stream_position()?;
        let movie = riff::open_list(out, tags::LIST, tags::MOVIE_LIST)?;

        info!(
            streams = streams.len(),
            frame_rate = %frame_rate,
            legacy_index = config.emit_legacy_index,
            "Started writing AVI"
        );

        Ok(Self {
            streams: streams.to_vec(),
            indexes,
            frame_rate,
            emit_legacy_index: config.emit_legacy_index,
            max_standard_index_entries: config.max_standard_index_entries,
            extended_segment_threshold: config.extended_segment_threshold,
            header,
            header_end,
            riff,
            movie,
            first_segment: true,
            segment_threshold: config.first_segment_threshold,
            segment_count: 1,
            first_segment_frames: 0,
            legacy_entries: 0,
        })
    }

    fn write_frame(
        &mut self,
        out: &mut Output,
        stream: usize,
        is_key_frame: bool,
        data: &[u8],
    ) -> MuxResult<()> {
        let size = u32::try_from(data.len())
            .ok()
            .filter(|&s| s & NON_KEY_FRAME_FLAG == 0)
            .ok_or(MuxError::ItemTooLarge(data.len() as u64))?;

        let next_data_offset = out.stream_position()? + MAX_PAYLOAD_LEAD;
        let flush_needed =
            self.indexes[stream].needs_flush(self.max_standard_index_entries, next_data_offset);
        self.indexes[stream].check_capacity(flush_needed)?;
        if flush_needed {
            self.flush_stream_index(out, stream)?;
        }

        let legacy_entry = self.emit_legacy_index && self.first_segment;
        let mut next_item = ITEM_HEADER_SIZE + size as u64;
        if legacy_entry {
            next_item += LEGACY_INDEX_ENTRY_SIZE;
        }
        self.rotate_segment_if_needed(out, next_item)?;

        let index = &mut self.indexes[stream];
        let chunk = riff::open_chunk(out, index.chunk_tag(), Some(size))?;
        out.write_all(data)?;
        riff::close_item(out, chunk)?;

        index.record_chunk(chunk.data_start(), size, is_key_frame);

        // Rotation may have just closed the first segment.
        if legacy_entry && self.first_segment {
            let offset = chunk.item_start() - self.movie.data_start();
            index.record_legacy(LegacyIndexEntry {
                is_key_frame,
                offset: u32::try_from(offset).map_err(|_| MuxError::ItemTooLarge(offset))?,
                size,
            });
            self.legacy_entries += 1;
        }
        Ok(())
    }

    /// Write the pending standard index of `stream` as an `ixNN` chunk and
    /// register it in the super index.
    fn flush_stream_index(&mut self, out: &mut Output, stream: usize) -> MuxResult<()> {
        let index = &self.indexes[stream];
        if index.pending_entries().is_empty() {
            return Ok(());
        }
        if index.super_index().len() >= index::MAX_SUPER_INDEX_ENTRIES {
            return Err(MuxError::SuperIndexFull { stream });
        }

        let size = index.standard_index_size();
        self.rotate_segment_if_needed(out, ITEM_HEADER_SIZE + size as u64)?;

        let index = &mut self.indexes[stream];
        let chunk = riff::open_chunk(out, index.index_chunk_tag(), Some(size))?;
        index.write_standard_index(out)?;
        riff::close_item(out, chunk)?;

        let entries = index.pending_entries().len();
        index.commit_flush(chunk.item_start(), size + ITEM_HEADER_SIZE as u32)?;

        debug!(
            stream,
            entries,
            offset = chunk.item_start(),
            super_entries = index.super_index().len(),
            "Flushed standard index"
        );
        Ok(())
    }

    /// Start a new `AVIX` segment when an item of `next_item_size` bytes
    /// would push the current one past its threshold.
    fn rotate_segment_if_needed(&mut self, out: &mut Output, next_item_size: u64) -> MuxResult<()> {
        let position = out.stream_position()?;
        let mut estimate = position + next_item_size - self.riff.item_start();
        if self.first_segment && self.emit_legacy_index {
            estimate += ITEM_HEADER_SIZE + self.legacy_entries as u64 * LEGACY_INDEX_ENTRY_SIZE;
        }
        if estimate <= self.segment_threshold {
            return Ok(());
        }

        self.close_segment(out)?;
        self.riff = riff::open_list(out, tags::RIFF, tags::AVIX)?;
        self.movie = riff::open_list(out, tags::LIST, tags::MOVIE_LIST)?;
        self.segment_count += 1;

        info!(
            segment = self.segment_count,
            offset = self.riff.item_start(),
            "Started extended RIFF segment"
        );
        Ok(())
    }

    fn close_segment(&mut self, out: &mut Output) -> MuxResult<()> {
        riff::close_item(out, self.movie)?;

        if self.first_segment {
            self.first_segment_frames = self.max_video_frames();
            if self.emit_legacy_index {
                self.write_legacy_index(out)?;
            }
            self.segment_threshold = self.extended_segment_threshold;
        }

        riff::close_item(out, self.riff)?;
        self.first_segment = false;
        Ok(())
    }

    fn write_legacy_index(&mut self, out: &mut Output) -> MuxResult<()> {
        let size = self.legacy_entries as u64 * LEGACY_INDEX_ENTRY_SIZE;
        let size = u32::try_from(size).map_err(|_| MuxError::ItemTooLarge(size))?;
        let chunk = riff::open_chunk(out, tags::LEGACY_INDEX, Some(size))?;
        let written = index::write_legacy_index(out, &mut self.indexes)?;
        riff::close_item(out, chunk)?;
        debug!(entries = written, "Wrote legacy index");
        self.legacy_entries = 0;
        Ok(())
    }

    fn max_video_frames(&self) -> u32 {
        let frames = self
            .streams
            .iter()
            .zip(&self.indexes)
            .filter(|(s, _)| s.is_video())
            .map(|(_, i)| i.frame_count())
            .max()
            .unwrap_or(0);
        u32::try_from(frames).unwrap_or(u32::MAX)
    }

    fn finish(&mut self, out: &mut Output) -> MuxResult<()> {
        for stream in 0..self.indexes.len() {
            self.flush_stream_index(out, stream)?;
        }
        self.close_segment(out)?;
        let file_size = out.stream_position()?;

        out.seek(SeekFrom::Start(self.header.item_start()))?;
        header::write_header(
            out,
            &HeaderInfo {
                streams: &self.streams,
                indexes: &self.indexes,
                frame_rate: self.frame_rate,
                emit_legacy_index: self.emit_legacy_index,
                first_segment_frames: self.first_segment_frames,
            },
        )?;
        let header_end = out.stream_position()?;
        if header_end != self.header_end {
            return Err(MuxError::HeaderGrew {
                reserved: self.header_end - self.header.item_start(),
                actual: header_end - self.header.item_start(),
            });
        }
        out.seek(SeekFrom::Start(file_size))?;

        info!(
            segments = self.segment_count,
            bytes = file_size,
            frames = self.max_video_frames(),
            "Finalized AVI"
        );
        Ok(())
    }
}
