//! Thread confinement for encoders that must stay on the thread that
//! created them.
//!
//! ```text
//! stream worker ──EncodeRequest──> encoder thread (owns E)
//!       ▲                                │
//!       └──────── encoded bytes ─────────┘
//! ```

use crossbeam::channel::{self, Receiver, Sender};
use fc_common::{AviCodec, BitsPerPixel, EncodeError, EncodeResult, EncodedFrame, VideoEncoder};
use std::thread::{self, JoinHandle};
use tracing::debug;

/// Video encoder without the `Send` requirement. Every `VideoEncoder` is one.
pub trait ThreadBoundVideoEncoder {
    fn codec(&self) -> AviCodec;
    fn bits_per_pixel(&self) -> BitsPerPixel;
    fn max_encoded_size(&self) -> usize;
    fn encode_frame(&mut self, src: &[u8], dst: &mut [u8]) -> EncodeResult<EncodedFrame>;
}

impl<T: VideoEncoder> ThreadBoundVideoEncoder for T {
    fn codec(&self) -> AviCodec {
        VideoEncoder::codec(self)
    }

    fn bits_per_pixel(&self) -> BitsPerPixel {
        VideoEncoder::bits_per_pixel(self)
    }

    fn max_encoded_size(&self) -> usize {
        VideoEncoder::max_encoded_size(self)
    }

    fn encode_frame(&mut self, src: &[u8], dst: &mut [u8]) -> EncodeResult<EncodedFrame> {
        VideoEncoder::encode_frame(self, src, dst)
    }
}

struct EncodeRequest {
    src: Vec<u8>,
    reply: Sender<EncodeResult<(EncodedFrame, Vec<u8>)>>,
}

struct EncoderProps {
    codec: AviCodec,
    bits_per_pixel: BitsPerPixel,
    max_encoded_size: usize,
}

/// Runs an encoder on a dedicated thread and forwards every call to it.
///
/// The encoder is created by `factory` on that thread, so it never has to
/// be `Send`.
pub struct SingleThreadedVideoEncoder {
    requests: Option<Sender<EncodeRequest>>,
    worker: Option<JoinHandle<()>>,
    props: EncoderProps,
    frames: u64,
}

impl SingleThreadedVideoEncoder {
    pub fn new<E, F>(factory: F) -> EncodeResult<Self>
    where
        E: ThreadBoundVideoEncoder + 'static,
        F: FnOnce() -> EncodeResult<E> + Send + 'static,
    {
        let (requests, queue) = channel::unbounded::<EncodeRequest>();
        let (ready_tx, ready) = channel::bounded::<EncodeResult<EncoderProps>>(1);

        let worker = thread::Builder::new()
            .name("fc-encoder".into())
            .spawn(move || {
                let encoder = match factory() {
                    Ok(encoder) => encoder,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                let props = EncoderProps {
                    codec: encoder.codec(),
                    bits_per_pixel: encoder.bits_per_pixel(),
                    max_encoded_size: encoder.max_encoded_size(),
                };
                if ready_tx.send(Ok(props)).is_ok() {
                    encoder_main(encoder, queue);
                }
            })
            .map_err(|e| EncodeError::EncoderInit(format!("encoder thread spawn failed: {e}")))?;

        let props = match ready.recv() {
            Ok(props) => props,
            Err(_) => Err(EncodeError::EncoderInit(
                "encoder thread stopped during creation".into(),
            )),
        };
        let props = match props {
            Ok(props) => props,
            Err(e) => {
                let _ = worker.join();
                return Err(e);
            }
        };
        debug!(codec = %props.codec, "Started single-threaded encoder");

        Ok(Self {
            requests: Some(requests),
            worker: Some(worker),
            props,
            frames: 0,
        })
    }

    fn stopped(&self) -> EncodeError {
        EncodeError::EncodeFailed {
            frame: self.frames,
            reason: "encoder thread stopped".into(),
        }
    }
}

fn encoder_main<E: ThreadBoundVideoEncoder>(mut encoder: E, queue: Receiver<EncodeRequest>) {
    let mut buffer = Vec::new();
    for request in queue.iter() {
        let needed = encoder.max_encoded_size();
        if buffer.len() < needed {
            buffer.resize(needed, 0);
        }
        let result = encoder
            .encode_frame(&request.src, &mut buffer)
            .map(|frame| (frame, buffer[..frame.len].to_vec()));
        let _ = request.reply.send(result);
    }
}

impl VideoEncoder for SingleThreadedVideoEncoder {
    fn codec(&self) -> AviCodec {
        self.props.codec
    }

    fn bits_per_pixel(&self) -> BitsPerPixel {
        self.props.bits_per_pixel
    }

    fn max_encoded_size(&self) -> usize {
        self.props.max_encoded_size
    }

    fn encode_frame(&mut self, src: &[u8], dst: &mut [u8]) -> EncodeResult<EncodedFrame> {
        let requests = self.requests.as_ref().ok_or_else(|| self.stopped())?;
        let (reply, result) = channel::bounded(1);
        requests
            .send(EncodeRequest {
                src: src.to_vec(),
                reply,
            })
            .map_err(|_| self.stopped())?;
        let (frame, bytes) = result.recv().map_err(|_| self.stopped())??;
        self.frames += 1;

        if dst.len() < bytes.len() {
            return Err(EncodeError::BufferTooSmall {
                needed: bytes.len(),
                available: dst.len(),
            });
        }
        dst[..bytes.len()].copy_from_slice(&bytes);
        Ok(frame)
    }
}

impl Drop for SingleThreadedVideoEncoder {
    fn drop(&mut self) {
        // Disconnecting the queue ends the encoder thread.
        self.requests.take();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::rc::Rc;
    use std::thread::ThreadId;

    /// Not `Send`; checks every call happens on its creating thread.
    struct PinnedEncoder {
        _not_send: Rc<()>,
        thread: ThreadId,
    }

    impl ThreadBoundVideoEncoder for PinnedEncoder {
        fn codec(&self) -> AviCodec {
            AviCodec::XVID
        }

        fn bits_per_pixel(&self) -> BitsPerPixel {
            BitsPerPixel::Bpp24
        }

        fn max_encoded_size(&self) -> usize {
            8
        }

        fn encode_frame(&mut self, src: &[u8], dst: &mut [u8]) -> EncodeResult<EncodedFrame> {
            assert_eq!(thread::current().id(), self.thread);
            for (d, s) in dst.iter_mut().zip(src.iter().rev()) {
                *d = *s;
            }
            Ok(EncodedFrame {
                len: src.len(),
                is_key_frame: src.first() == Some(&0),
            })
        }
    }

    fn pinned() -> EncodeResult<PinnedEncoder> {
        Ok(PinnedEncoder {
            _not_send: Rc::new(()),
            thread: thread::current().id(),
        })
    }

    #[test]
    fn forwards_calls_to_encoder_thread() {
        let mut encoder = SingleThreadedVideoEncoder::new(pinned).unwrap();
        assert_eq!(VideoEncoder::codec(&encoder), AviCodec::XVID);
        assert_eq!(VideoEncoder::max_encoded_size(&encoder), 8);

        let mut dst = [0u8; 8];
        let frame = VideoEncoder::encode_frame(&mut encoder, &[0, 1, 2], &mut dst).unwrap();
        assert_eq!(frame.len, 3);
        assert!(frame.is_key_frame);
        assert_eq!(&dst[..3], &[2, 1, 0]);

        let frame = VideoEncoder::encode_frame(&mut encoder, &[5, 6], &mut dst).unwrap();
        assert!(!frame.is_key_frame);
        assert_eq!(&dst[..2], &[6, 5]);
    }

    #[test]
    fn factory_error_is_returned() {
        let result = SingleThreadedVideoEncoder::new(|| -> EncodeResult<PinnedEncoder> {
            Err(EncodeError::EncoderInit("no device".into()))
        });
        assert!(matches!(result, Err(EncodeError::EncoderInit(ref m)) if m == "no device"));
    }

    #[test]
    fn small_destination_is_rejected() {
        let mut encoder = SingleThreadedVideoEncoder::new(pinned).unwrap();
        let mut dst = [0u8; 2];
        assert!(matches!(
            VideoEncoder::encode_frame(&mut encoder, &[1, 2, 3], &mut dst),
            Err(EncodeError::BufferTooSmall { needed: 3, available: 2 })
        ));
    }
}
