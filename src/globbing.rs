//! Coalescing of small payloads into larger writes.

use bytes::BytesMut;

use crate::producer::{Producer, Pull};

/// Default accumulation threshold in bytes.
pub const DEFAULT_GLOB_SIZE: usize = 1 << 16;

/// Accumulates payloads from the wrapped producer until at least
/// `threshold` bytes are buffered, the producer has nothing more for now,
/// or it is exhausted.
///
/// The threshold is checked after each append, so a returned payload can be
/// larger than the threshold by up to one inner payload.
pub struct GlobbingProducer<P> {
    inner: P,
    threshold: usize,
    buf: BytesMut,
    exhausted: bool,
}

impl<P: Producer> GlobbingProducer<P> {
    pub fn new(inner: P, threshold: usize) -> Self {
        Self {
            inner,
            threshold: threshold.max(1),
            buf: BytesMut::new(),
            exhausted: false,
        }
    }

    fn flush(&mut self) -> Pull {
        Pull::from_bytes(self.buf.split().freeze())
    }
}

impl<P: Producer> Producer for GlobbingProducer<P> {
    fn more(&mut self) -> Pull {
        if self.exhausted {
            return self.flush();
        }
        while self.buf.len() < self.threshold {
            match self.inner.more() {
                Pull::Pending if self.buf.is_empty() => return Pull::Pending,
                Pull::Pending => break,
                Pull::Data(data) => self.buf.extend_from_slice(&data),
                Pull::Done => {
                    self.exhausted = true;
                    break;
                }
            }
        }
        self.flush()
    }
}
