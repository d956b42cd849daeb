//! Byte-count callbacks around a producer.

use crate::producer::{Producer, Pull};

pub type ByteCallback = Box<dyn FnMut(usize) + Send>;

enum Mode {
    EachPull,
    OnFinish { total: usize, fired: bool },
}

/// Reports how many bytes flow through a producer without touching them.
pub struct HookedProducer<P> {
    inner: P,
    callback: ByteCallback,
    mode: Mode,
}

impl<P: Producer> HookedProducer<P> {
    /// Calls `callback` with the payload length after every pull that is not
    /// `Pending`, and with 0 when the inner producer reports `Done`.
    pub fn new(inner: P, callback: impl FnMut(usize) + Send + 'static) -> Self {
        Self {
            inner,
            callback: Box::new(callback),
            mode: Mode::EachPull,
        }
    }

    /// Calls `callback` once, when the inner producer is exhausted, with the
    /// total number of bytes it delivered.
    pub fn on_finish(inner: P, callback: impl FnMut(usize) + Send + 'static) -> Self {
        Self {
            inner,
            callback: Box::new(callback),
            mode: Mode::OnFinish {
                total: 0,
                fired: false,
            },
        }
    }
}

impl<P: Producer> Producer for HookedProducer<P> {
    fn more(&mut self) -> Pull {
        if let Mode::OnFinish { fired: true, .. } = self.mode {
            return Pull::Done;
        }
        let result = self.inner.more();
        if result.is_pending() {
            return result;
        }
        match &mut self.mode {
            Mode::EachPull => (self.callback)(result.len()),
            Mode::OnFinish { total, fired } => {
                if result.is_done() {
                    *fired = true;
                    (self.callback)(*total);
                } else {
                    *total += result.len();
                }
            }
        }
        result
    }
}
