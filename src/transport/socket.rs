//! Byte-exact framing over a stream socket.
//!
//! - Writes either flush the whole buffer or fail.
//! - Reads accumulate partial socket reads until the request is satisfied.
//! - Any failure is terminal: the socket is dropped and every later
//!   operation fails without touching it again.
//!
//! # Example
//!
//! ```ignore
//! use surrender_client::transport::Transport;
//!
//! let mut transport = Transport::connect("localhost", 5151).await?;
//! transport.send(&request_bytes).await?;
//! let frame = transport.recv_frame().await?;
//! ```

use std::time::Duration;

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;

use crate::error::{Result, SurrenderError};
use crate::protocol::{FrameBuffer, VariantMap};

/// Size of the scratch buffer used for each socket read.
const READ_CHUNK_SIZE: usize = 64 * 1024;

/// Any bidirectional byte stream the transport can own.
pub trait Stream: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> Stream for T {}

/// Connection lifecycle.
///
/// `Unconnected → Connected → (Disconnected | Closed)`. Both end states are
/// terminal; reconnecting means building a new transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportState {
    Unconnected,
    Connected,
    /// Peer closed, I/O failed, timed out, or framing was lost.
    Disconnected,
    /// Closed locally.
    Closed,
}

/// Owner of the socket and its receive buffer.
pub struct Transport {
    stream: Option<Box<dyn Stream>>,
    buffer: FrameBuffer,
    read_chunk: Box<[u8]>,
    state: TransportState,
    read_timeout: Option<Duration>,
    cancel: CancellationToken,
}

impl Transport {
    /// A transport with no socket. Every operation fails with `NotConnected`.
    pub fn new() -> Self {
        Self {
            stream: None,
            buffer: FrameBuffer::new(),
            read_chunk: vec![0u8; READ_CHUNK_SIZE].into_boxed_slice(),
            state: TransportState::Unconnected,
            read_timeout: None,
            cancel: CancellationToken::new(),
        }
    }

    /// Connect over TCP with `TCP_NODELAY` and `SO_KEEPALIVE` enabled.
    pub async fn connect(host: &str, port: u16) -> Result<Self> {
        let stream = TcpStream::connect((host, port)).await?;
        configure_socket(&stream);
        tracing::info!("Connected to {}:{}", host, port);
        Ok(Self::from_stream(stream))
    }

    /// Wrap an already connected stream.
    pub fn from_stream<S: Stream + 'static>(stream: S) -> Self {
        let mut transport = Self::new();
        transport.stream = Some(Box::new(stream));
        transport.state = TransportState::Connected;
        transport
    }

    /// Limit on any single field or count in received frames.
    pub fn with_max_payload(mut self, max_payload_size: u32) -> Self {
        self.buffer = FrameBuffer::with_max_payload(max_payload_size);
        self
    }

    /// Deadline for each wait on the socket. `None` waits forever.
    pub fn set_read_timeout(&mut self, timeout: Option<Duration>) {
        self.read_timeout = timeout;
    }

    pub fn read_timeout(&self) -> Option<Duration> {
        self.read_timeout
    }

    #[inline]
    pub fn state(&self) -> TransportState {
        self.state
    }

    /// Connected and not cancelled.
    pub fn is_connected(&self) -> bool {
        self.state == TransportState::Connected && !self.cancel.is_cancelled()
    }

    /// Token that aborts any pending or future operation when cancelled.
    ///
    /// Cancelling is the only way to unblock a read stuck waiting on a
    /// silent server; the blocked operation fails with `Disconnected`.
    pub fn cancel_handle(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Write the whole buffer and flush.
    pub async fn send(&mut self, bytes: &[u8]) -> Result<()> {
        self.ensure_connected()?;
        let cancel = self.cancel.clone();
        let Some(stream) = self.stream.as_mut() else {
            return Err(SurrenderError::NotConnected);
        };

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            result = async {
                stream.write_all(bytes).await?;
                stream.flush().await
            } => Some(result),
        };

        match outcome {
            Some(Ok(())) => Ok(()),
            Some(Err(e)) => {
                tracing::warn!("Write failed: {}", e);
                Err(self.fail(SurrenderError::Disconnected))
            }
            None => Err(self.fail(SurrenderError::Disconnected)),
        }
    }

    /// Read exactly `n` bytes.
    pub async fn recv_exact(&mut self, n: usize) -> Result<Bytes> {
        loop {
            if let Some(bytes) = self.buffer.take(n) {
                return Ok(bytes);
            }
            self.fill().await?;
        }
    }

    /// Read one complete frame.
    ///
    /// A frame that cannot be decoded leaves the stream desynchronized, so
    /// the connection is dropped along with the error.
    pub async fn recv_frame(&mut self) -> Result<VariantMap> {
        loop {
            match self.buffer.try_extract() {
                Ok(Some(frame)) => return Ok(frame),
                Ok(None) => {}
                Err(e) => {
                    tracing::error!("Dropping connection after decode failure: {}", e);
                    return Err(self.fail(e));
                }
            }
            self.fill().await?;
        }
    }

    /// Close the socket locally.
    pub async fn close(&mut self) {
        self.cancel.cancel();
        if let Some(mut stream) = self.stream.take() {
            let _ = stream.shutdown().await;
        }
        if self.state != TransportState::Disconnected {
            self.state = TransportState::Closed;
        }
        self.buffer.clear();
    }

    /// Read once from the socket into the frame buffer.
    async fn fill(&mut self) -> Result<()> {
        self.ensure_connected()?;
        let cancel = self.cancel.clone();
        let timeout = self.read_timeout;
        let Some(stream) = self.stream.as_mut() else {
            return Err(SurrenderError::NotConnected);
        };
        let chunk = &mut self.read_chunk[..];

        let read = async {
            match timeout {
                Some(limit) => match tokio::time::timeout(limit, stream.read(chunk)).await {
                    Ok(result) => result.map_err(SurrenderError::Io),
                    Err(_) => Err(SurrenderError::Timeout(limit)),
                },
                None => stream.read(chunk).await.map_err(SurrenderError::Io),
            }
        };

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(SurrenderError::Disconnected),
            result = read => result,
        };

        match outcome {
            Ok(0) => {
                tracing::info!("Server closed the connection");
                Err(self.fail(SurrenderError::Disconnected))
            }
            Ok(n) => {
                self.buffer.extend(&self.read_chunk[..n]);
                Ok(())
            }
            Err(SurrenderError::Io(e)) => {
                tracing::warn!("Read failed: {}", e);
                Err(self.fail(SurrenderError::Disconnected))
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    fn ensure_connected(&self) -> Result<()> {
        match self.state {
            TransportState::Connected if self.cancel.is_cancelled() => {
                Err(SurrenderError::Disconnected)
            }
            TransportState::Connected => Ok(()),
            TransportState::Unconnected => Err(SurrenderError::NotConnected),
            TransportState::Disconnected | TransportState::Closed => {
                Err(SurrenderError::Disconnected)
            }
        }
    }

    /// Enter the terminal `Disconnected` state and hand back `err`.
    fn fail(&mut self, err: SurrenderError) -> SurrenderError {
        self.state = TransportState::Disconnected;
        self.stream = None;
        self.buffer.clear();
        self.cancel.cancel();
        err
    }
}

impl Default for Transport {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transport")
            .field("state", &self.state)
            .field("buffered", &self.buffer.len())
            .field("read_timeout", &self.read_timeout)
            .finish()
    }
}

/// Best-effort socket options. Failures are logged and ignored.
fn configure_socket(stream: &TcpStream) {
    if let Err(e) = stream.set_nodelay(true) {
        tracing::debug!("Could not enable TCP_NODELAY: {}", e);
    }
    if let Err(e) = socket2::SockRef::from(stream).set_keepalive(true) {
        tracing::debug!("Could not enable SO_KEEPALIVE: {}", e);
    }
}
