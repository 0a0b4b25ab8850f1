//! Transport layer for framed message exchange with the language server
//!
//! Bridges the child process's stdin/stdout to payload channels. Wire
//! format is the length-prefixed framing the server speaks:
//! `Content-Length: <n>\r\n\r\n<payload>`. Framing is handled by a
//! `tokio_util::codec` codec on both directions, so the rest of the crate
//! only ever sees complete payloads.

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{ChildStdin, ChildStdout};
use tokio::sync::mpsc;
use tokio_util::bytes::{Buf, BytesMut};
use tokio_util::codec::{Decoder, Encoder};
use tracing::{error, trace};

// ============================================================================
// Constants
// ============================================================================

/// Maximum frame payload size. Declared lengths beyond this are rejected
/// outright so a misbehaving server cannot make us buffer without bound.
pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Maximum accumulated header size before the separator must have appeared
const MAX_HEADER_SIZE: usize = 8 * 1024;

/// Initial capacity of the reader's accumulation buffer
const READ_BUFFER_CAPACITY: usize = 8192;

const HEADER_SEPARATOR: &[u8] = b"\r\n\r\n";

// ============================================================================
// Frame Codec
// ============================================================================

/// Error types for frame encoding/decoding
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid frame header: {0}")]
    InvalidHeader(String),

    #[error("Missing Content-Length header")]
    MissingContentLength,

    #[error("Invalid Content-Length value: {0}")]
    InvalidContentLength(String),

    #[error("Frame too large: {size} bytes (max: {max})")]
    FrameTooLarge { size: usize, max: usize },

    #[error("Frame payload is not valid UTF-8: {0}")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),
}

/// Codec for `Content-Length`-framed protocol messages
///
/// Decodes byte streams into complete payload strings and encodes payloads
/// with the framing header. The size limit applies in both directions.
#[derive(Debug)]
pub struct FrameCodec {
    max_frame_size: usize,
}

impl FrameCodec {
    pub fn new() -> Self {
        Self {
            max_frame_size: MAX_FRAME_SIZE,
        }
    }

    /// Create a codec with a custom frame size limit
    #[cfg(test)]
    pub fn with_limit(max_frame_size: usize) -> Self {
        Self { max_frame_size }
    }

    /// Parse the Content-Length value out of an extracted header block
    fn parse_content_length(&self, header: &str) -> Result<usize, FrameError> {
        for line in header.split("\r\n") {
            if let Some(value) = line.strip_prefix("Content-Length:") {
                let value = value.trim();
                let length = value
                    .parse::<usize>()
                    .map_err(|_| FrameError::InvalidContentLength(value.to_string()))?;

                if length > self.max_frame_size {
                    return Err(FrameError::FrameTooLarge {
                        size: length,
                        max: self.max_frame_size,
                    });
                }

                return Ok(length);
            }
        }

        Err(FrameError::MissingContentLength)
    }
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new()
    }
}

/// Locate the `\r\n\r\n` separator terminating the header block
fn find_header_end(buf: &[u8]) -> Option<usize> {
    buf.windows(HEADER_SEPARATOR.len())
        .position(|window| window == HEADER_SEPARATOR)
}

impl Decoder for FrameCodec {
    type Item = String;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<String>, FrameError> {
        let Some(header_end) = find_header_end(src) else {
            if src.len() > MAX_HEADER_SIZE {
                return Err(FrameError::InvalidHeader(format!(
                    "no header separator within {MAX_HEADER_SIZE} bytes"
                )));
            }
            return Ok(None);
        };

        let header = std::str::from_utf8(&src[..header_end])
            .map_err(|_| FrameError::InvalidHeader("header is not valid UTF-8".to_string()))?;
        let content_length = self.parse_content_length(header)?;

        let frame_end = header_end + HEADER_SEPARATOR.len() + content_length;
        if src.len() < frame_end {
            // Incomplete payload; reserve what we know is still coming
            src.reserve(frame_end - src.len());
            return Ok(None);
        }

        let mut frame = src.split_to(frame_end);
        frame.advance(header_end + HEADER_SEPARATOR.len());

        trace!("FrameCodec: decoded frame ({} bytes)", content_length);
        Ok(Some(String::from_utf8(frame.to_vec())?))
    }
}

impl Encoder<String> for FrameCodec {
    type Error = FrameError;

    fn encode(&mut self, item: String, dst: &mut BytesMut) -> Result<(), FrameError> {
        if item.len() > self.max_frame_size {
            return Err(FrameError::FrameTooLarge {
                size: item.len(),
                max: self.max_frame_size,
            });
        }

        let header = format!("Content-Length: {}\r\n\r\n", item.len());
        dst.reserve(header.len() + item.len());
        dst.extend_from_slice(header.as_bytes());
        dst.extend_from_slice(item.as_bytes());

        trace!("FrameCodec: encoded frame ({} bytes)", item.len());
        Ok(())
    }
}

// ============================================================================
// Transport Trait
// ============================================================================

/// Core transport trait for bidirectional payload exchange
#[async_trait]
pub trait Transport: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Send one payload (framing is the transport's concern)
    async fn send(&mut self, message: &str) -> Result<(), Self::Error>;

    /// Receive one complete payload
    async fn receive(&mut self) -> Result<String, Self::Error>;

    /// Close the transport
    async fn close(&mut self) -> Result<(), Self::Error>;

    /// Check if transport is still active
    fn is_connected(&self) -> bool;
}

// ============================================================================
// Stdio Transport Implementation
// ============================================================================

/// Error types for the stdio transport
#[derive(Debug, thiserror::Error)]
pub enum StdioTransportError {
    #[error("Transport is disconnected")]
    Disconnected,

    #[error("Channel error: {0}")]
    Channel(String),
}

/// Transport over a child process's stdin/stdout streams
///
/// Two background tasks own the raw pipes: the writer frames outgoing
/// payloads, the reader accumulates bytes and emits complete frames.
/// `send` never blocks on the pipe; `receive` awaits the next frame.
#[derive(Debug)]
pub struct StdioTransport {
    /// Channel delivering payloads to the stdin writer task
    stdin_sender: Option<mpsc::UnboundedSender<String>>,

    /// Channel receiving decoded frames from the stdout reader task
    stdout_receiver: Option<mpsc::UnboundedReceiver<String>>,

    /// Connection status
    connected: bool,
}

impl StdioTransport {
    /// Create a new StdioTransport from child process streams
    pub fn new(stdin: ChildStdin, stdout: ChildStdout) -> Self {
        let (stdin_sender, stdin_receiver) = mpsc::unbounded_channel();
        let (stdout_sender, stdout_receiver) = mpsc::unbounded_channel();

        tokio::spawn(Self::stdin_writer_task(stdin, stdin_receiver));
        tokio::spawn(Self::stdout_reader_task(stdout, stdout_sender));

        Self {
            stdin_sender: Some(stdin_sender),
            stdout_receiver: Some(stdout_receiver),
            connected: true,
        }
    }

    /// Background task framing payloads onto stdin
    async fn stdin_writer_task(
        mut stdin: ChildStdin,
        mut receiver: mpsc::UnboundedReceiver<String>,
    ) {
        let mut codec = FrameCodec::new();
        let mut buffer = BytesMut::new();

        while let Some(payload) = receiver.recv().await {
            buffer.clear();
            if let Err(e) = codec.encode(payload, &mut buffer) {
                error!("Failed to encode outgoing frame: {}", e);
                break;
            }

            if let Err(e) = stdin.write_all(&buffer).await {
                error!("Failed to write to stdin: {}", e);
                break;
            }

            if let Err(e) = stdin.flush().await {
                error!("Failed to flush stdin: {}", e);
                break;
            }
        }

        trace!("StdioTransport: stdin writer task finished");
    }

    /// Background task decoding frames from stdout
    async fn stdout_reader_task(mut stdout: ChildStdout, sender: mpsc::UnboundedSender<String>) {
        let mut codec = FrameCodec::new();
        let mut buffer = BytesMut::with_capacity(READ_BUFFER_CAPACITY);

        loop {
            // Drain every complete frame already in the buffer
            loop {
                match codec.decode(&mut buffer) {
                    Ok(Some(frame)) => {
                        if sender.send(frame).is_err() {
                            trace!("StdioTransport: stdout receiver dropped, stopping reader");
                            return;
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        error!("Failed to decode frame from stdout: {}", e);
                        return;
                    }
                }
            }

            match stdout.read_buf(&mut buffer).await {
                Ok(0) => {
                    // EOF; anything left over is a truncated frame
                    if !buffer.is_empty() {
                        error!(
                            "StdioTransport: {} bytes of incomplete frame at EOF",
                            buffer.len()
                        );
                    }
                    break;
                }
                Ok(_) => {}
                Err(e) => {
                    error!("Failed to read from stdout: {}", e);
                    break;
                }
            }
        }

        trace!("StdioTransport: stdout reader task finished");
    }
}

#[async_trait]
impl Transport for StdioTransport {
    type Error = StdioTransportError;

    async fn send(&mut self, message: &str) -> Result<(), Self::Error> {
        if !self.connected {
            return Err(StdioTransportError::Disconnected);
        }

        let sender = self
            .stdin_sender
            .as_ref()
            .ok_or(StdioTransportError::Disconnected)?;

        sender
            .send(message.to_string())
            .map_err(|e| StdioTransportError::Channel(e.to_string()))?;

        Ok(())
    }

    async fn receive(&mut self) -> Result<String, Self::Error> {
        if !self.connected {
            return Err(StdioTransportError::Disconnected);
        }

        let receiver = self
            .stdout_receiver
            .as_mut()
            .ok_or(StdioTransportError::Disconnected)?;

        receiver
            .recv()
            .await
            .ok_or(StdioTransportError::Disconnected)
    }

    async fn close(&mut self) -> Result<(), Self::Error> {
        self.connected = false;
        self.stdin_sender.take();
        self.stdout_receiver.take();
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected
    }
}

// ============================================================================
// Mock Transport Implementation
// ============================================================================

/// Error type for mock transport
#[cfg(test)]
#[derive(Debug, thiserror::Error)]
pub enum MockTransportError {
    #[error("Transport is disconnected")]
    Disconnected,
}

/// Mock transport for testing; operates at the payload level
///
/// `receive` awaits payloads pushed through the paired handle, so tests can
/// script server behavior while a client is blocked on a request. Dropping
/// the handle disconnects the receive side.
#[cfg(test)]
pub struct MockTransport {
    /// Payloads that were sent via this transport
    sent_messages: std::sync::Arc<std::sync::Mutex<Vec<String>>>,

    /// Incoming payloads pushed by the test
    incoming: mpsc::UnboundedReceiver<String>,

    /// Connection status
    connected: bool,
}

/// Test-side handle controlling a `MockTransport`
#[cfg(test)]
#[derive(Clone)]
pub struct MockTransportHandle {
    sent_messages: std::sync::Arc<std::sync::Mutex<Vec<String>>>,
    incoming: mpsc::UnboundedSender<String>,
}

#[cfg(test)]
impl MockTransport {
    pub fn new() -> (Self, MockTransportHandle) {
        let sent_messages = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));
        let (incoming_tx, incoming_rx) = mpsc::unbounded_channel();

        let transport = Self {
            sent_messages: std::sync::Arc::clone(&sent_messages),
            incoming: incoming_rx,
            connected: true,
        };
        let handle = MockTransportHandle {
            sent_messages,
            incoming: incoming_tx,
        };
        (transport, handle)
    }

    /// Create a mock transport with payloads already queued
    pub fn with_responses(responses: Vec<String>) -> (Self, MockTransportHandle) {
        let (transport, handle) = Self::new();
        for response in responses {
            handle.push_response(response);
        }
        (transport, handle)
    }
}

#[cfg(test)]
impl MockTransportHandle {
    /// Queue a payload to be returned by a later receive() call
    pub fn push_response(&self, response: impl Into<String>) {
        let _ = self.incoming.send(response.into());
    }

    /// All payloads that were sent via the paired transport
    pub fn sent_messages(&self) -> Vec<String> {
        self.sent_messages.lock().unwrap().clone()
    }
}

#[cfg(test)]
#[async_trait]
impl Transport for MockTransport {
    type Error = MockTransportError;

    async fn send(&mut self, message: &str) -> Result<(), Self::Error> {
        if !self.connected {
            return Err(MockTransportError::Disconnected);
        }

        self.sent_messages.lock().unwrap().push(message.to_string());
        Ok(())
    }

    async fn receive(&mut self) -> Result<String, Self::Error> {
        if !self.connected {
            return Err(MockTransportError::Disconnected);
        }

        self.incoming
            .recv()
            .await
            .ok_or(MockTransportError::Disconnected)
    }

    async fn close(&mut self) -> Result<(), Self::Error> {
        self.connected = false;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected
    }
}

// ============================================================================
// Tests
// ============================================================================
