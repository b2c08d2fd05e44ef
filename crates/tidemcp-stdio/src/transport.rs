//! Line transport implementation.
//!
//! This module provides [`StdioTransport`], which reads newline-delimited
//! JSON-RPC requests from one byte stream and writes newline-delimited
//! responses to another.
//!
//! # Interior Mutability Pattern
//!
//! - **parking_lot::Mutex** for state and one-shot handles (short-lived locks, never cross .await)
//! - **AtomicMetrics** for lock-free counter updates
//! - **tokio::sync::Mutex** for the output stream (held across the write and flush)

use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use futures::SinkExt;
use parking_lot::Mutex;
use tidemcp_core::{Request, Response};
use tidemcp_transport_traits::{
    AtomicMetrics, CancellationToken, ProtocolViolation, RequestStream, Transport, TransportError,
    TransportMetrics, TransportResult, TransportState, TransportType, decode_request,
    encode_response,
};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, BufReader};
use tokio::sync::{Mutex as TokioMutex, mpsc};
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::codec::{FramedWrite, LinesCodec};
use tracing::{debug, error, trace, warn};

use crate::config::StdioConfig;

// Type aliases for boxed async I/O to support both process stdio and arbitrary streams
type BoxedAsyncRead = Pin<Box<dyn AsyncRead + Send + Sync + 'static>>;
type BoxedAsyncWrite = Pin<Box<dyn AsyncWrite + Send + Sync + 'static>>;
type LineReader = BufReader<BoxedAsyncRead>;
type LineWriter = FramedWrite<BoxedAsyncWrite, LinesCodec>;
type SharedWriter = Arc<TokioMutex<LineWriter>>;

/// Line transport over a reader/writer pair.
///
/// One physical connection, one logical session. Accepted requests flow into a
/// bounded queue handed out by [`Transport::receive`]; malformed input is
/// answered immediately on the output stream.
///
/// # Examples
///
/// ## Using current process stdio
///
/// ```rust,ignore
/// use tidemcp_stdio::{StdioConfig, StdioTransport};
///
/// let transport = StdioTransport::new(StdioConfig::default());
/// ```
///
/// ## Using in-memory streams
///
/// ```rust,ignore
/// let (client, server) = tokio::io::duplex(4096);
/// let (server_read, server_write) = tokio::io::split(server);
/// let transport = StdioTransport::from_raw(server_read, server_write, StdioConfig::default());
/// ```
pub struct StdioTransport {
    config: StdioConfig,

    /// Lifecycle state (parking_lot - never crosses await)
    state: Mutex<TransportState>,

    /// Lock-free atomic metrics
    metrics: Arc<AtomicMetrics>,

    /// Input stream, moved into the reader task by `start`
    reader: Mutex<Option<LineReader>>,

    /// Output stream (tokio mutex - held across write and flush)
    writer: SharedWriter,

    /// Producer side of the inbound queue, moved into the reader task by `start`
    inbound_tx: Mutex<Option<mpsc::Sender<Request>>>,

    /// Consumer side of the inbound queue, handed out once by `receive`
    inbound_rx: Mutex<Option<mpsc::Receiver<Request>>>,

    /// Child of the token passed to `start`; cancelled by `close`
    shutdown: Mutex<Option<CancellationToken>>,
}

impl std::fmt::Debug for StdioTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StdioTransport")
            .field("config", &self.config)
            .field("state", &*self.state.lock())
            .field("metrics", &self.metrics)
            .field("reader", &"<LineReader>")
            .field("writer", &"<LineWriter>")
            .finish()
    }
}

impl StdioTransport {
    /// Create a line transport over the current process's stdin/stdout
    #[must_use]
    pub fn new(config: StdioConfig) -> Self {
        Self::from_raw(tokio::io::stdin(), tokio::io::stdout(), config)
    }

    /// Create a line transport from raw async read/write streams.
    ///
    /// * `reader` - The stream requests are read from
    /// * `writer` - The stream responses are written to
    pub fn from_raw<R, W>(reader: R, writer: W, config: StdioConfig) -> Self
    where
        R: AsyncRead + Send + Sync + 'static,
        W: AsyncWrite + Send + Sync + 'static,
    {
        let boxed_reader: BoxedAsyncRead = Box::pin(reader);
        let boxed_writer: BoxedAsyncWrite = Box::pin(writer);
        let (tx, rx) = mpsc::channel(config.effective_capacity());

        Self {
            config,
            state: Mutex::new(TransportState::Created),
            metrics: Arc::new(AtomicMetrics::new()),
            reader: Mutex::new(Some(BufReader::new(boxed_reader))),
            writer: Arc::new(TokioMutex::new(FramedWrite::new(
                boxed_writer,
                LinesCodec::new(),
            ))),
            inbound_tx: Mutex::new(Some(tx)),
            inbound_rx: Mutex::new(Some(rx)),
            shutdown: Mutex::new(None),
        }
    }

    /// The configuration this transport runs with
    pub fn config(&self) -> &StdioConfig {
        &self.config
    }
}

/// Refuses anything that would break line framing.
///
/// Compact JSON never contains a raw newline, but the output stream must stay
/// one-message-per-line no matter what the encoder produced.
fn frame_line(json: String) -> TransportResult<String> {
    if json.contains('\n') || json.contains('\r') {
        return Err(TransportError::ProtocolError(
            "Encoded message contains embedded newlines".to_string(),
        ));
    }
    Ok(json)
}

/// Encodes `response` and writes it as one flushed line.
async fn write_response(
    writer: &SharedWriter,
    metrics: &AtomicMetrics,
    mut response: Response,
) -> TransportResult<()> {
    let line = frame_line(encode_response(&mut response)?)?;
    let size = line.len();

    let mut writer = writer.lock().await;
    writer.send(line).await.map_err(|e| {
        error!("Failed to write response: {}", e);
        TransportError::SendFailed(e.to_string())
    })?;

    metrics.record_response(size);
    trace!("Sent response: {} bytes", size);
    Ok(())
}

/// What one bounded read produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LineRead {
    /// A complete line is in the buffer, newline stripped.
    Line,
    /// The current line passed the size limit after this many bytes. The
    /// remainder of the line is skipped on the following reads.
    TooLong(usize),
    Eof,
}

/// Line reader that never buffers more than `max` bytes of one line.
///
/// Bytes are taken straight from the `BufReader`'s internal buffer, so a peer
/// that never sends a newline costs at most `max` bytes of memory and is
/// answered as soon as the limit is crossed.
struct BoundedLines {
    reader: LineReader,
    buf: Vec<u8>,
    max: usize,
    skipping: bool,
}

impl BoundedLines {
    fn new(reader: LineReader, max: usize) -> Self {
        Self {
            reader,
            buf: Vec::new(),
            max,
            skipping: false,
        }
    }

    fn line(&self) -> &[u8] {
        &self.buf
    }

    /// Not cancel safe: a partially read line is lost if the future is dropped.
    async fn next_line(&mut self) -> std::io::Result<LineRead> {
        self.buf.clear();
        loop {
            let available = self.reader.fill_buf().await?;
            if available.is_empty() {
                // A final line without a newline still counts
                return Ok(if self.skipping || self.buf.is_empty() {
                    LineRead::Eof
                } else {
                    LineRead::Line
                });
            }

            let newline = available.iter().position(|&b| b == b'\n');
            let content = newline.unwrap_or(available.len());
            let consumed = newline.map_or(content, |i| i + 1);

            if self.skipping {
                self.reader.consume(consumed);
                if newline.is_some() {
                    self.skipping = false;
                }
                continue;
            }

            let seen = self.buf.len() + content;
            if seen > self.max {
                self.buf.clear();
                self.reader.consume(consumed);
                self.skipping = newline.is_none();
                return Ok(LineRead::TooLong(seen));
            }

            self.buf.extend_from_slice(&available[..content]);
            self.reader.consume(consumed);
            if newline.is_some() {
                return Ok(LineRead::Line);
            }
        }
    }
}

/// Background loop: read, validate, enqueue or answer, until EOF, read failure,
/// receiver drop, or cancellation.
async fn read_loop(
    reader: LineReader,
    inbound: mpsc::Sender<Request>,
    writer: SharedWriter,
    metrics: Arc<AtomicMetrics>,
    max_message_size: usize,
    shutdown: CancellationToken,
) {
    let mut lines = BoundedLines::new(reader, max_message_size);

    loop {
        let read = tokio::select! {
            biased;
            () = shutdown.cancelled() => {
                debug!("Line transport cancelled");
                break;
            }
            read = lines.next_line() => read,
        };

        let decoded = match read {
            Ok(LineRead::Eof) => {
                debug!("Input stream closed");
                break;
            }
            Ok(LineRead::TooLong(size)) => Err(ProtocolViolation::TooLarge {
                size,
                max: max_message_size,
            }),
            Ok(LineRead::Line) => {
                let payload = lines.line().trim_ascii();
                if payload.is_empty() {
                    continue;
                }
                decode_request(payload, max_message_size).map(|request| (request, payload.len()))
            }
            Err(e) => {
                error!("Failed to read from input stream: {}", e);
                break;
            }
        };

        let (request, size) = match decoded {
            Ok(decoded) => decoded,
            Err(violation) => {
                warn!("Rejecting inbound line: {}", violation);
                AtomicMetrics::incr(&metrics.protocol_errors);
                if let Err(e) = write_response(&writer, &metrics, violation.into_response()).await
                {
                    error!("Failed to write error response: {}", e);
                }
                continue;
            }
        };

        trace!(method = %request.method, "Accepted request");

        // Waits for queue space; cancellation abandons the pending request.
        tokio::select! {
            biased;
            () = shutdown.cancelled() => {
                debug!("Line transport cancelled while enqueuing");
                break;
            }
            sent = inbound.send(request) => {
                if sent.is_err() {
                    debug!("Request stream dropped, stopping reader task");
                    break;
                }
                metrics.record_request(size);
            }
        }
    }

    debug!("Line reader task completed");
}

#[async_trait]
impl Transport for StdioTransport {
    fn transport_type(&self) -> TransportType {
        TransportType::Stdio
    }

    async fn state(&self) -> TransportState {
        *self.state.lock()
    }

    async fn start(&self, shutdown: CancellationToken) -> TransportResult<()> {
        let mut state = self.state.lock();
        match *state {
            TransportState::Closed => return Err(TransportError::Closed),
            TransportState::Running => {
                debug!("Line transport already started");
                return Ok(());
            }
            TransportState::Created => {}
        }

        let reader = self
            .reader
            .lock()
            .take()
            .ok_or_else(|| TransportError::Internal("Input stream already consumed".into()))?;
        let inbound = self
            .inbound_tx
            .lock()
            .take()
            .ok_or_else(|| TransportError::Internal("Inbound queue already consumed".into()))?;

        let token = shutdown.child_token();
        *self.shutdown.lock() = Some(token.clone());
        *state = TransportState::Running;

        tokio::spawn(read_loop(
            reader,
            inbound,
            self.writer.clone(),
            self.metrics.clone(),
            self.config.max_message_size,
            token,
        ));

        debug!("Line transport started");
        Ok(())
    }

    async fn send(&self, response: Response) -> TransportResult<()> {
        if self.state.lock().is_closed() {
            return Err(TransportError::Closed);
        }
        write_response(&self.writer, &self.metrics, response).await
    }

    fn receive(&self) -> TransportResult<RequestStream> {
        let receiver = self
            .inbound_rx
            .lock()
            .take()
            .ok_or(TransportError::ReceiverTaken)?;
        Ok(Box::pin(ReceiverStream::new(receiver)))
    }

    async fn close(&self) -> TransportResult<()> {
        {
            let mut state = self.state.lock();
            if state.is_closed() {
                return Ok(());
            }
            *state = TransportState::Closed;
        }

        if let Some(token) = self.shutdown.lock().take() {
            token.cancel();
        }
        // Never started: release the queue so the request stream ends.
        self.inbound_tx.lock().take();
        self.reader.lock().take();

        debug!("Line transport closed");
        Ok(())
    }

    fn metrics(&self) -> TransportMetrics {
        self.metrics.snapshot()
    }

    fn endpoint(&self) -> Option<String> {
        Some("stdio://".to_string())
    }
}
