//! The per-request state a handler fills in and the server drains.

use std::collections::VecDeque;
use std::time::SystemTime;

use chrono::{DateTime, Utc};

use crate::producer::BoxProducer;

pub struct Request {
    pub method: String,
    pub path: String,
    pub version: String,
    headers: Vec<(String, String)>,
    status: u16,
    done: bool,
    producers: VecDeque<BoxProducer>,
}

impl Request {
    pub fn new(method: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            path: path.into(),
            version: "HTTP/1.1".to_string(),
            headers: Vec::new(),
            status: 200,
            done: false,
            producers: VecDeque::new(),
        }
    }

    /// Sets a response header, replacing any previous value for the same
    /// name (compared case-insensitively).
    pub fn set_header(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        match self.headers.iter_mut().find(|(n, _)| n.eq_ignore_ascii_case(name)) {
            Some(slot) => slot.1 = value,
            None => self.headers.push((name.to_string(), value)),
        }
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// Fails the request with `code` and marks it done.
    pub fn error(&mut self, code: u16) {
        self.status = code;
        self.done = true;
    }

    /// The error code set by [`Request::error`], if any.
    pub fn error_code(&self) -> Option<u16> {
        (self.status >= 400).then_some(self.status)
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    /// Whether the client understands chunked transfer encoding.
    pub fn accepts_chunked(&self) -> bool {
        !self.version.eq_ignore_ascii_case("HTTP/1.0")
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Queues a body producer; the front of the queue is drained first.
    pub fn push(&mut self, producer: BoxProducer) {
        self.producers.push_back(producer);
    }

    pub fn producers(&self) -> &VecDeque<BoxProducer> {
        &self.producers
    }

    pub fn take_producers(&mut self) -> VecDeque<BoxProducer> {
        std::mem::take(&mut self.producers)
    }
}

/// Formats a timestamp as an HTTP date, e.g. `Sun, 06 Nov 1994 08:49:37 GMT`.
pub fn http_date(time: SystemTime) -> String {
    DateTime::<Utc>::from(time)
        .format("%a, %d %b %Y %H:%M:%S GMT")
        .to_string()
}

pub fn reason(code: u16) -> &'static str {
    match code {
        200 => "OK",
        400 => "Bad Request",
        404 => "Not Found",
        405 => "Method Not Allowed",
        410 => "Gone",
        500 => "Internal Server Error",
        _ => "Unknown",
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, UNIX_EPOCH};

    use super::*;
    use crate::producer::BytesProducer;

    #[test]
    fn http_date_is_rfc1123() {
        let t = UNIX_EPOCH + Duration::from_secs(784111777);
        assert_eq!(http_date(t), "Sun, 06 Nov 1994 08:49:37 GMT");
    }

    #[test]
    fn http_date_drops_subseconds() {
        let t = UNIX_EPOCH + Duration::from_millis(784111777_999);
        assert_eq!(http_date(t), "Sun, 06 Nov 1994 08:49:37 GMT");
    }

    #[test]
    fn set_header_replaces_case_insensitively() {
        let mut r = Request::new("GET", "/");
        r.set_header("Content-Type", "text/html");
        r.set_header("content-type", "text/plain");
        assert_eq!(r.headers().len(), 1);
        assert_eq!(r.header("CONTENT-TYPE"), Some("text/plain"));
    }

    #[test]
    fn error_marks_done() {
        let mut r = Request::new("GET", "/");
        assert_eq!(r.error_code(), None);
        r.error(410);
        assert_eq!(r.error_code(), Some(410));
        assert!(r.is_done());
    }

    #[test]
    fn only_http10_refuses_chunked() {
        let mut r = Request::new("GET", "/");
        assert!(r.accepts_chunked());
        r.version = "HTTP/1.0".to_string();
        assert!(!r.accepts_chunked());
    }

    #[test]
    fn producers_queue_in_order() {
        let mut r = Request::new("GET", "/");
        r.push(Box::new(BytesProducer::new("a")));
        r.push(Box::new(BytesProducer::new("b")));
        assert_eq!(r.producers().len(), 2);
        assert_eq!(r.take_producers().len(), 2);
        assert!(r.producers().is_empty());
    }
}
