//! Minimal HTTP/1.1 front end that drives producer chains.
//!
//! Each connection is one cooperative task. The task pulls from the
//! response's producer chain, writes whatever it gets, and on
//! [`Pull::Pending`] sleeps for the poll interval before asking again. Once
//! the client has gone away the next write fails, which ends the task and
//! drops the chain together with any open log files.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::composite::CompositeProducer;
use crate::globbing::{GlobbingProducer, DEFAULT_GLOB_SIZE};
use crate::handler::LogtailHandler;
use crate::hooked::HookedProducer;
use crate::producer::{BoxProducer, BytesProducer, Producer, Pull};
use crate::request::{reason, Request};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

const MAX_HEADER_LINES: usize = 100;

pub struct Server {
    listener: TcpListener,
    handler: Arc<LogtailHandler>,
    poll_interval: Duration,
}

impl Server {
    pub async fn bind(addr: SocketAddr, handler: LogtailHandler) -> Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("binding {addr}"))?;
        Ok(Self {
            listener,
            handler: Arc::new(handler),
            poll_interval: DEFAULT_POLL_INTERVAL,
        })
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accepts connections until `shutdown` is cancelled.
    pub async fn run(self, shutdown: CancellationToken) -> Result<()> {
        info!(addr = %self.local_addr()?, "http server listening");
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                accepted = self.listener.accept() => {
                    let (stream, peer) = match accepted {
                        Ok(conn) => conn,
                        Err(err) => {
                            warn!(%err, "accept failed");
                            continue;
                        }
                    };
                    let handler = Arc::clone(&self.handler);
                    let poll = self.poll_interval;
                    let shutdown = shutdown.clone();
                    tokio::spawn(async move {
                        if let Err(err) = serve_connection(stream, peer, handler, poll, shutdown).await {
                            debug!(%peer, "connection ended: {err:#}");
                        }
                    });
                }
            }
        }
        info!("http server stopped");
        Ok(())
    }
}

async fn serve_connection(
    stream: TcpStream,
    peer: SocketAddr,
    handler: Arc<LogtailHandler>,
    poll: Duration,
    shutdown: CancellationToken,
) -> Result<()> {
    let (rd, mut wr) = stream.into_split();
    let mut reader = BufReader::new(rd);
    let mut request = read_request(&mut reader).await?;

    if request.error_code().is_none() {
        if !handler.matches(&request.path) {
            request.error(404);
        } else if request.method != "GET" {
            request.error(405);
        } else {
            handler.handle_request(&mut request);
        }
    }

    let mut chain = response_chain(&mut request, peer);
    drive(&mut chain, &mut reader, &mut wr, poll, &shutdown).await?;
    Ok(())
}

/// Parses the request line and skips the header block.
async fn read_request<R: AsyncBufRead + Unpin>(reader: &mut R) -> Result<Request> {
    let mut line = String::new();
    if reader.read_line(&mut line).await? == 0 {
        anyhow::bail!("connection closed before request line");
    }
    let mut parts = line.split_whitespace();
    let mut request = match (parts.next(), parts.next(), parts.next()) {
        (Some(method), Some(path), Some(version)) => {
            let mut request = Request::new(method, path);
            request.version = version.to_string();
            request
        }
        _ => {
            let mut request = Request::new("", "");
            request.error(400);
            return Ok(request);
        }
    };
    for _ in 0..MAX_HEADER_LINES {
        line.clear();
        if reader.read_line(&mut line).await? == 0 || line.trim_end().is_empty() {
            return Ok(request);
        }
    }
    request.error(400);
    Ok(request)
}

/// Builds the outgoing chain: status line and headers, then the queued
/// body producers, coalesced and counted.
fn response_chain(request: &mut Request, peer: SocketAddr) -> impl Producer + use<> {
    let status = request.status();
    let mut body: Vec<BoxProducer> = Vec::new();
    if let Some(code) = request.error_code() {
        let text = format!("{code} {}\n", reason(code));
        request.set_header("Content-Type", "text/plain");
        request.set_header("Content-Length", text.len().to_string());
        body.push(Box::new(BytesProducer::new(text)));
    } else {
        body.extend(request.take_producers());
    }
    request.set_header("Connection", "close");

    let mut head = format!("HTTP/1.1 {status} {}\r\n", reason(status));
    for (name, value) in request.headers() {
        head.push_str(&format!("{name}: {value}\r\n"));
    }
    head.push_str("\r\n");

    let mut composite = CompositeProducer::new([Box::new(BytesProducer::new(head)) as BoxProducer]);
    for producer in body {
        composite.push(producer);
    }

    let method = request.method.clone();
    let path = request.path.clone();
    HookedProducer::on_finish(GlobbingProducer::new(composite, DEFAULT_GLOB_SIZE), move |bytes| {
        info!(%peer, %method, %path, status, bytes, "request complete");
    })
}

/// Pulls `producer` to completion, writing each payload to `out`.
///
/// While the producer is pending, `input` is drained so it never backs up.
/// End of input is only a half-close and does not stop the stream; a failed
/// write is what ends it. Returns the number of bytes written.
pub async fn drive<P, R, W>(
    producer: &mut P,
    input: &mut R,
    out: &mut W,
    poll: Duration,
    shutdown: &CancellationToken,
) -> io::Result<u64>
where
    P: Producer + ?Sized,
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut written = 0u64;
    let mut scratch = [0u8; 512];
    let mut input_open = true;
    loop {
        match producer.more() {
            Pull::Data(data) => {
                out.write_all(&data).await?;
                written += data.len() as u64;
            }
            Pull::Pending => {
                out.flush().await?;
                tokio::select! {
                    _ = sleep(poll) => {}
                    _ = shutdown.cancelled() => return Ok(written),
                    n = input.read(&mut scratch), if input_open => match n {
                        Ok(0) => input_open = false,
                        Ok(_) => {}
                        Err(err) => return Err(err),
                    },
                }
            }
            Pull::Done => {
                out.flush().await?;
                return Ok(written);
            }
        }
    }
}
