//! HTTP/1.1 chunked transfer-encoding framing over any producer.

use bytes::{BufMut, Bytes, BytesMut};

use crate::producer::{Producer, Pull};

/// Frames each payload of the wrapped producer as one chunk and emits the
/// terminating chunk, with optional trailer fields, once the producer is
/// exhausted.
pub struct ChunkedProducer<P> {
    inner: P,
    trailers: Vec<String>,
    finished: bool,
}

impl<P: Producer> ChunkedProducer<P> {
    pub fn new(inner: P) -> Self {
        Self::with_trailers(inner, Vec::new())
    }

    /// Each trailer is a complete `Name: value` line without the CRLF.
    pub fn with_trailers(inner: P, trailers: Vec<String>) -> Self {
        Self {
            inner,
            trailers,
            finished: false,
        }
    }

    fn terminator(&self) -> Bytes {
        let mut out = BytesMut::from(&b"0\r\n"[..]);
        for line in &self.trailers {
            out.put_slice(line.as_bytes());
            out.put_slice(b"\r\n");
        }
        out.put_slice(b"\r\n");
        out.freeze()
    }
}

impl<P: Producer> Producer for ChunkedProducer<P> {
    fn more(&mut self) -> Pull {
        if self.finished {
            return Pull::Done;
        }
        match self.inner.more() {
            Pull::Pending => Pull::Pending,
            // a zero-length chunk would terminate the body early
            Pull::Data(data) if data.is_empty() => Pull::Pending,
            Pull::Data(data) => {
                let header = format!("{:x}\r\n", data.len());
                let mut out = BytesMut::with_capacity(header.len() + data.len() + 2);
                out.put_slice(header.as_bytes());
                out.put_slice(&data);
                out.put_slice(b"\r\n");
                Pull::Data(out.freeze())
            }
            Pull::Done => {
                self.finished = true;
                Pull::Data(self.terminator())
            }
        }
    }
}
