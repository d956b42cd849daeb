//! Log ingestion layer: follows a growing log file like `tail -f`, without
//! ever waiting for data to show up.
//!
//! [`TailProducer`] remembers how far into the file it has read. Each pull
//! compares that offset with the current file size and either hands out the
//! new bytes, reports [`Pull::Pending`], or announces that the file shrank.

use std::fs::{File, Metadata};
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use bytes::Bytes;
use tracing::{debug, info, warn};

use crate::producer::{Producer, Pull};

/// Payload emitted once each time the followed file shrinks.
pub const TRUNCATED_NOTICE: &[u8] = b"==> File truncated <==\n";

/// Largest payload a single pull reads from disk.
pub const DEFAULT_MAX_READ: usize = 1 << 16;

/// File-tail source. Owns its file handle for as long as it lives.
pub struct TailProducer {
    path: PathBuf,
    file: File,
    inode: Option<u64>,
    offset: u64,
    head: Option<Bytes>,
    max_read: usize,
    failed: bool,
}

impl TailProducer {
    /// Opens `path` and buffers up to `head` trailing bytes, which the first
    /// pull returns. Everything written after this call is streamed by later
    /// pulls.
    pub fn open(path: impl Into<PathBuf>, head: u64) -> io::Result<Self> {
        let path = path.into();
        let mut file = File::open(&path)?;
        let meta = file.metadata()?;
        let size = meta.len();
        let start = size.saturating_sub(head);
        file.seek(SeekFrom::Start(start))?;
        let mut buf = Vec::with_capacity((size - start) as usize);
        (&mut file).take(size - start).read_to_end(&mut buf)?;
        debug!(path = %path.display(), size, head = buf.len(), "opened log for tailing");
        Ok(Self {
            inode: inode(&meta),
            offset: start + buf.len() as u64,
            head: Some(Bytes::from(buf)),
            path,
            file,
            max_read: DEFAULT_MAX_READ,
            failed: false,
        })
    }

    pub fn with_max_read(mut self, max_read: usize) -> Self {
        self.max_read = max_read.max(1);
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Byte offset of the next read.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Metadata of the currently open handle.
    pub fn metadata(&self) -> io::Result<Metadata> {
        self.file.metadata()
    }

    fn read_new(&mut self) -> io::Result<Pull> {
        let pull = self.read_current()?;
        // the old file is drained before a rotated one is picked up
        if pull.is_pending() && self.reopen_if_rotated() {
            return self.read_current();
        }
        Ok(pull)
    }

    fn read_current(&mut self) -> io::Result<Pull> {
        let size = self.file.metadata()?.len();
        if size < self.offset {
            info!(path = %self.path.display(), from = self.offset, to = size, "log truncated");
            self.offset = size;
            return Ok(Pull::Data(Bytes::from_static(TRUNCATED_NOTICE)));
        }
        if size == self.offset {
            return Ok(Pull::Pending);
        }

        let want = (size - self.offset).min(self.max_read as u64);
        self.file.seek(SeekFrom::Start(self.offset))?;
        let mut buf = Vec::with_capacity(want as usize);
        (&mut self.file).take(want).read_to_end(&mut buf)?;
        if buf.is_empty() {
            return Ok(Pull::Pending);
        }
        self.offset += buf.len() as u64;
        Ok(Pull::Data(Bytes::from(buf)))
    }

    /// Switches to the file now at `path` if it was replaced (log rotation).
    /// A path that vanished keeps the old handle.
    fn reopen_if_rotated(&mut self) -> bool {
        let Some(current) = std::fs::metadata(&self.path).ok().and_then(|m| inode(&m)) else {
            return false;
        };
        if Some(current) == self.inode {
            return false;
        }
        match File::open(&self.path) {
            Ok(file) => {
                info!(path = %self.path.display(), "log rotated; reopening");
                self.inode = file.metadata().ok().and_then(|m| inode(&m));
                self.file = file;
                self.offset = 0;
                true
            }
            Err(err) => {
                debug!(path = %self.path.display(), %err, "rotated log not yet readable");
                false
            }
        }
    }
}

impl Producer for TailProducer {
    fn more(&mut self) -> Pull {
        if let Some(head) = self.head.take() {
            if !head.is_empty() {
                return Pull::Data(head);
            }
        }
        if self.failed {
            return Pull::Done;
        }
        match self.read_new() {
            Ok(pull) => pull,
            Err(err) => {
                warn!(path = %self.path.display(), %err, "tailing stopped");
                self.failed = true;
                Pull::Done
            }
        }
    }
}

#[cfg(unix)]
fn inode(meta: &Metadata) -> Option<u64> {
    use std::os::unix::fs::MetadataExt;
    Some(meta.ino())
}

#[cfg(not(unix))]
fn inode(_meta: &Metadata) -> Option<u64> {
    None
}
