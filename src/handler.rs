//! `GET /logtail/<process>`: streams a process's log as it grows.

use std::path::PathBuf;
use std::sync::{Arc, LazyLock};

use regex::Regex;
use thiserror::Error;
use tracing::{debug, info};

use crate::chunked::ChunkedProducer;
use crate::log::TailProducer;
use crate::registry::ProcessRegistry;
use crate::request::{http_date, Request};

/// Bytes of existing log served before following new output.
pub const HEAD_BYTES: u64 = 1024;

static ROUTE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^/logtail/([^?#]*)").expect("static route pattern")
});

/// Why a tail request could not be served. All of these answer 410.
#[derive(Debug, Error)]
pub enum LogtailError {
    #[error("no such process: {0}")]
    UnknownProcess(String),
    #[error("process {0} has no log file configured")]
    NoLogfile(String),
    #[error("cannot open {}: {source}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub struct LogtailHandler {
    registry: Arc<dyn ProcessRegistry>,
    head: u64,
}

impl LogtailHandler {
    pub fn new(registry: Arc<dyn ProcessRegistry>) -> Self {
        Self {
            registry,
            head: HEAD_BYTES,
        }
    }

    pub fn with_head(mut self, head: u64) -> Self {
        self.head = head;
        self
    }

    pub fn matches(&self, path: &str) -> bool {
        ROUTE.is_match(path)
    }

    pub fn handle_request(&self, request: &mut Request) {
        match self.open(&request.path) {
            Ok(tail) => {
                let modified = tail.metadata().and_then(|m| m.modified());
                request.set_header("Content-Type", "text/plain");
                if let Ok(mtime) = modified {
                    request.set_header("Last-Modified", http_date(mtime));
                }
                info!(path = %tail.path().display(), "tailing log");
                if request.accepts_chunked() {
                    request.set_header("Transfer-Encoding", "chunked");
                    request.push(Box::new(ChunkedProducer::new(tail)));
                } else {
                    // HTTP/1.0: the body ends when the connection closes
                    request.push(Box::new(tail));
                }
            }
            Err(err) => {
                debug!(path = %request.path, %err, "logtail unavailable");
                request.error(410);
            }
        }
    }

    fn open(&self, path: &str) -> Result<TailProducer, LogtailError> {
        let name = ROUTE
            .captures(path)
            .map(|c| percent_decode(c[1].trim_end_matches('/')))
            .ok_or_else(|| LogtailError::UnknownProcess(path.to_string()))?;
        let process = self
            .registry
            .get(&name)
            .ok_or_else(|| LogtailError::UnknownProcess(name.clone()))?;
        let logfile = process
            .stdout_logfile
            .as_ref()
            .filter(|p| !p.as_os_str().is_empty())
            .ok_or_else(|| LogtailError::NoLogfile(name.clone()))?;
        TailProducer::open(logfile, self.head).map_err(|source| LogtailError::Open {
            path: logfile.clone(),
            source,
        })
    }
}

/// Decodes `%XX` escapes; malformed escapes and invalid UTF-8 are kept raw.
fn percent_decode(s: &str) -> String {
    urlencoding::decode(s)
        .map(|decoded| decoded.into_owned())
        .unwrap_or_else(|_| s.to_string())
}
