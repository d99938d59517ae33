//! Per-stream sequential write serializer.
//!
//! Every stream owns one worker thread fed by a FIFO job queue. Writes from
//! any producer, blocking or not, are applied to the stream's sink strictly
//! in submission order.
//!
//! ```text
//!  producer ──write_async──> [ job queue ] ──> worker ──> sink chain
//!     │                                          │
//!     └──────── WriteCompletion <── slot ────────┘
//! ```
//!
//! A failed write whose completion was dropped unobserved is kept and
//! reported by the next `drain` or by `finish`.

use crossbeam::channel::{self, Receiver, Sender};
use parking_lot::{Condvar, Mutex};
use std::mem;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::debug;

use crate::error::{MuxError, MuxResult};
use crate::sink::StreamSink;

enum Job {
    Write {
        is_key_frame: bool,
        data: Vec<u8>,
        completion: PendingWrite,
    },
    Drain(Sender<()>),
    Finish {
        flush: bool,
        done: Sender<MuxResult<()>>,
    },
}

// ---------------------------------------------------------------------------
// Completion
// ---------------------------------------------------------------------------

enum SlotState {
    Pending,
    Done(MuxResult<()>),
    /// Result handed to the waiter.
    Taken,
    /// The completion was dropped.
    Abandoned,
}

struct CompletionSlot {
    state: Mutex<SlotState>,
    ready: Condvar,
}

/// First error nobody observed.
#[derive(Default)]
struct DeferredError(Mutex<Option<MuxError>>);

impl DeferredError {
    fn record(&self, err: MuxError) {
        let mut slot = self.0.lock();
        if slot.is_none() {
            *slot = Some(err);
        }
    }

    fn take(&self) -> MuxResult<()> {
        match self.0.lock().take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

/// Worker side of a [`WriteCompletion`]. Completes with an error if dropped
/// before the write was applied.
struct PendingWrite {
    slot: Arc<CompletionSlot>,
    deferred: Arc<DeferredError>,
    completed: bool,
}

impl PendingWrite {
    fn complete(mut self, result: MuxResult<()>) {
        self.completed = true;
        self.publish(result);
    }

    fn publish(&self, result: MuxResult<()>) {
        let mut state = self.slot.state.lock();
        match *state {
            SlotState::Abandoned => {
                if let Err(err) = result {
                    self.deferred.record(err);
                }
            }
            _ => {
                *state = SlotState::Done(result);
                self.slot.ready.notify_all();
            }
        }
    }
}

impl Drop for PendingWrite {
    fn drop(&mut self) {
        if !self.completed {
            self.publish(Err(MuxError::WorkerUnavailable(
                "stream stopped before the write was applied".into(),
            )));
        }
    }
}

/// Handle to a write submitted with `write_frame_async` / `write_block_async`.
///
/// Dropping it without waiting is allowed; a failure is then reported by the
/// stream's next drain or by closing the writer.
#[must_use = "dropping a completion defers its error to the next drain"]
pub struct WriteCompletion {
    slot: Arc<CompletionSlot>,
    deferred: Arc<DeferredError>,
}

impl WriteCompletion {
    /// Block until the write has been applied.
    pub fn wait(self) -> MuxResult<()> {
        let mut state = self.slot.state.lock();
        while matches!(*state, SlotState::Pending) {
            self.slot.ready.wait(&mut state);
        }
        match mem::replace(&mut *state, SlotState::Taken) {
            SlotState::Done(result) => result,
            _ => Ok(()),
        }
    }

    pub fn is_complete(&self) -> bool {
        !matches!(*self.slot.state.lock(), SlotState::Pending)
    }
}

impl Drop for WriteCompletion {
    fn drop(&mut self) {
        let mut state = self.slot.state.lock();
        if let SlotState::Done(Err(err)) = mem::replace(&mut *state, SlotState::Abandoned) {
            self.deferred.record(err);
        }
    }
}

// ---------------------------------------------------------------------------
// SequentialStream
// ---------------------------------------------------------------------------

/// Ordering gate in front of one stream's sink chain.
pub(crate) struct SequentialStream {
    stream: usize,
    jobs: Sender<Job>,
    deferred: Arc<DeferredError>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl SequentialStream {
    /// Spawn the stream's worker thread around `sink`.
    pub fn spawn(stream: usize, sink: Box<dyn StreamSink>) -> MuxResult<Self> {
        let (jobs, queue) = channel::unbounded::<Job>();
        let deferred = Arc::new(DeferredError::default());

        let worker = thread::Builder::new()
            .name(format!("avi-stream-{stream}"))
            .spawn(move || worker_main(sink, queue))
            .map_err(|e| MuxError::WorkerUnavailable(format!("spawn failed: {e}")))?;

        Ok(Self {
            stream,
            jobs,
            deferred,
            worker: Mutex::new(Some(worker)),
        })
    }

    /// Queue a write behind all earlier submissions.
    pub fn submit(&self, is_key_frame: bool, data: Vec<u8>) -> MuxResult<WriteCompletion> {
        let slot = Arc::new(CompletionSlot {
            state: Mutex::new(SlotState::Pending),
            ready: Condvar::new(),
        });
        let completion = PendingWrite {
            slot: Arc::clone(&slot),
            deferred: Arc::clone(&self.deferred),
            completed: false,
        };
        let job = Job::Write {
            is_key_frame,
            data,
            completion,
        };
        if let Err(channel::SendError(job)) = self.jobs.send(job) {
            if let Job::Write { mut completion, .. } = job {
                completion.completed = true;
            }
            return Err(MuxError::Closed);
        }

        Ok(WriteCompletion {
            slot,
            deferred: Arc::clone(&self.deferred),
        })
    }

    /// Submit a write and wait for it.
    pub fn write(&self, is_key_frame: bool, data: &[u8]) -> MuxResult<()> {
        self.submit(is_key_frame, data.to_vec())?.wait()
    }

    /// Wait until every write submitted so far has been applied. Returns
    /// the first unobserved failure, if any.
    pub fn drain(&self) -> MuxResult<()> {
        let (done, wait) = channel::bounded(1);
        if self.jobs.send(Job::Drain(done)).is_ok() {
            // Disconnection means the worker already finished.
            let _ = wait.recv();
        }
        self.deferred.take()
    }

    /// Apply all pending writes, then finish the sink chain (when `flush`)
    /// and stop the worker. Later calls do nothing.
    pub fn finish(&self, flush: bool) -> MuxResult<()> {
        let Some(worker) = self.worker.lock().take() else {
            return Ok(());
        };

        let (done, wait) = channel::bounded(1);
        let result = match self.jobs.send(Job::Finish { flush, done }) {
            Ok(()) => wait.recv().unwrap_or_else(|_| {
                Err(MuxError::WorkerUnavailable("stream worker stopped".into()))
            }),
            Err(_) => Err(MuxError::WorkerUnavailable("stream worker stopped".into())),
        };

        if worker.join().is_err() {
            return Err(MuxError::WorkerUnavailable(format!(
                "worker of stream {} panicked",
                self.stream
            )));
        }
        debug!(stream = self.stream, "Stream worker finished");

        self.deferred.take().and(result)
    }
}

impl Drop for SequentialStream {
    fn drop(&mut self) {
        let _ = self.finish(false);
    }
}

fn worker_main(mut sink: Box<dyn StreamSink>, queue: Receiver<Job>) {
    for job in queue.iter() {
        match job {
            Job::Write {
                is_key_frame,
                data,
                completion,
            } => completion.complete(sink.write(is_key_frame, &data)),
            Job::Drain(done) => {
                let _ = done.send(());
            }
            Job::Finish { flush, done } => {
                let result = if flush { sink.finish() } else { Ok(()) };
                let _ = done.send(result);
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::tests::RecordingSink;
    use std::time::Duration;

    /// Fails every write whose first byte is 0xFF.
    struct FailingSink(RecordingSink);

    impl StreamSink for FailingSink {
        fn write(&mut self, is_key_frame: bool, data: &[u8]) -> MuxResult<()> {
            if data.first() == Some(&0xFF) {
                return Err(MuxError::InvalidConfig("rejected".into()));
            }
            self.0.write(is_key_frame, data)
        }

        fn finish(&mut self) -> MuxResult<()> {
            self.0.finish()
        }
    }

    /// Sleeps before recording, so queued writes pile up.
    struct SlowSink(RecordingSink);

    impl StreamSink for SlowSink {
        fn write(&mut self, is_key_frame: bool, data: &[u8]) -> MuxResult<()> {
            thread::sleep(Duration::from_millis(2));
            self.0.write(is_key_frame, data)
        }

        fn finish(&mut self) -> MuxResult<()> {
            self.0.finish()
        }
    }

    #[test]
    fn test_async_writes_apply_in_submission_order() {
        let recorder = RecordingSink::default();
        let stream = SequentialStream::spawn(0, Box::new(SlowSink(recorder.clone()))).unwrap();

        let completions: Vec<_> = (0..20u8)
            .map(|i| stream.submit(true, vec![i]).unwrap())
            .collect();
        stream.write(false, &[100]).unwrap();
        for completion in completions {
            assert!(completion.is_complete());
            completion.wait().unwrap();
        }

        let writes = recorder.writes.lock();
        let order: Vec<u8> = writes.iter().map(|(_, d)| d[0]).collect();
        let mut expected: Vec<u8> = (0..20).collect();
        expected.push(100);
        assert_eq!(order, expected);
        assert!(!writes[20].0);
    }

    #[test]
    fn test_drain_waits_for_outstanding_writes() {
        let recorder = RecordingSink::default();
        let stream = SequentialStream::spawn(1, Box::new(SlowSink(recorder.clone()))).unwrap();
        for i in 0..10u8 {
            drop(stream.submit(true, vec![i]).unwrap());
        }
        stream.drain().unwrap();
        assert_eq!(recorder.writes.lock().len(), 10);
    }

    #[test]
    fn test_sync_write_error_is_returned_directly() {
        let recorder = RecordingSink::default();
        let stream = SequentialStream::spawn(2, Box::new(FailingSink(recorder))).unwrap();
        assert!(matches!(
            stream.write(true, &[0xFF]),
            Err(MuxError::InvalidConfig(_))
        ));
        // observed, so nothing deferred
        stream.drain().unwrap();
    }

    #[test]
    fn test_dropped_completion_error_surfaces_on_drain() {
        let recorder = RecordingSink::default();
        let stream = SequentialStream::spawn(3, Box::new(FailingSink(recorder.clone()))).unwrap();
        drop(stream.submit(true, vec![1]).unwrap());
        drop(stream.submit(true, vec![0xFF]).unwrap());
        drop(stream.submit(true, vec![2]).unwrap());

        assert!(matches!(stream.drain(), Err(MuxError::InvalidConfig(_))));
        // reported once
        stream.drain().unwrap();
        assert_eq!(recorder.writes.lock().len(), 2);
    }

    #[test]
    fn test_finish_reports_deferred_error_and_stops() {
        let recorder = RecordingSink::default();
        let stream = SequentialStream::spawn(4, Box::new(FailingSink(recorder.clone()))).unwrap();
        drop(stream.submit(true, vec![0xFF]).unwrap());

        assert!(stream.finish(true).is_err());
        assert!(*recorder.finished.lock());
        assert!(matches!(stream.submit(true, vec![1]), Err(MuxError::Closed)));
        // second finish is a no-op
        stream.finish(true).unwrap();
    }

    #[test]
    fn test_finish_without_flush_skips_sink_finish() {
        let recorder = RecordingSink::default();
        let stream = SequentialStream::spawn(5, Box::new(SlowSink(recorder.clone()))).unwrap();
        stream.finish(false).unwrap();
        assert!(!*recorder.finished.lock());
    }

    #[test]
    fn test_concurrent_producers() {
        let recorder = RecordingSink::default();
        let stream = Arc::new(SequentialStream::spawn(6, Box::new(recorder.clone())).unwrap());

        let producers: Vec<_> = (0..4u8)
            .map(|p| {
                let stream = Arc::clone(&stream);
                thread::spawn(move || {
                    for i in 0..25u8 {
                        stream.write(true, &[p, i]).unwrap();
                    }
                })
            })
            .collect();
        for producer in producers {
            producer.join().unwrap();
        }

        let writes = recorder.writes.lock();
        assert_eq!(writes.len(), 100);
        // each producer's own writes stay in order
        for p in 0..4u8 {
            let seq: Vec<u8> = writes
                .iter()
                .filter(|(_, d)| d[0] == p)
                .map(|(_, d)| d[1])
                .collect();
            assert_eq!(seq, (0..25).collect::<Vec<u8>>());
        }
    }
}
