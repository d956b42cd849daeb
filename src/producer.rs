//! Pull-based content producers.
//!
//! A producer hands out its output one piece at a time. Each call to
//! [`Producer::more`] yields one of three outcomes: some bytes, a signal that
//! nothing is available yet, or the end of the stream. Producers never block;
//! whoever drives them decides when to ask again after a [`Pull::Pending`].

use bytes::Bytes;

/// Outcome of a single pull on a [`Producer`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Pull {
    /// Nothing available right now; ask again later.
    Pending,
    /// A non-empty payload.
    Data(Bytes),
    /// The producer is exhausted and will only ever return `Done` again.
    Done,
}

impl Pull {
    /// Wraps a buffer, mapping an empty one to [`Pull::Done`].
    pub fn from_bytes(bytes: impl Into<Bytes>) -> Self {
        let bytes = bytes.into();
        if bytes.is_empty() {
            Pull::Done
        } else {
            Pull::Data(bytes)
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, Pull::Pending)
    }

    pub fn is_done(&self) -> bool {
        matches!(self, Pull::Done)
    }

    /// Payload length; zero for `Pending` and `Done`.
    pub fn len(&self) -> usize {
        match self {
            Pull::Data(bytes) => bytes.len(),
            _ => 0,
        }
    }
}

/// Something that produces a stream of bytes on demand.
///
/// Implementors must never block and must keep returning [`Pull::Done`]
/// once they have returned it.
pub trait Producer: Send {
    fn more(&mut self) -> Pull;
}

pub type BoxProducer = Box<dyn Producer>;

impl<P: Producer + ?Sized> Producer for Box<P> {
    fn more(&mut self) -> Pull {
        (**self).more()
    }
}

/// Default slice size for [`BytesProducer`].
pub const DEFAULT_SLICE_SIZE: usize = 512;

/// Serves content that is already in memory, a slice at a time.
pub struct BytesProducer {
    data: Bytes,
    slice_size: usize,
}

impl BytesProducer {
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self::with_slice_size(data, DEFAULT_SLICE_SIZE)
    }

    pub fn with_slice_size(data: impl Into<Bytes>, slice_size: usize) -> Self {
        Self {
            data: data.into(),
            slice_size: slice_size.max(1),
        }
    }
}

impl Producer for BytesProducer {
    fn more(&mut self) -> Pull {
        let n = self.slice_size.min(self.data.len());
        Pull::from_bytes(self.data.split_to(n))
    }
}
