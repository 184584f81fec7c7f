//! Session builder and connection lifecycle.
//!
//! The [`SessionBuilder`] provides a fluent API for configuring a session.
//! The [`Session`] owns at most one live connection:
//! 1. Connect (TCP) or attach an existing stream
//! 2. Issue commands, one at a time
//! 3. Disconnect, sending the `close` handshake when possible
//!
//! # Example
//!
//! ```ignore
//! use surrender_client::Session;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> surrender_client::Result<()> {
//!     let session = Session::builder()
//!         .verbosity(3)
//!         .response_timeout(Duration::from_secs(30))
//!         .connect("localhost", 5151)
//!         .await?;
//!
//!     session.render().await?;
//!     let image = session.get_image().await?;
//!     println!("{}x{}", image.width(), image.height());
//!
//!     session.disconnect().await;
//!     Ok(())
//! }
//! ```

use std::time::Duration;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use crate::correlator::{Correlator, FileChunk, LogPolicy, DEFAULT_CHUNK_SIZE};
use crate::error::{Result, SurrenderError};
use crate::protocol::{VariantMap, DEFAULT_MAX_PAYLOAD_SIZE};
use crate::transport::{Stream, Transport};

/// Default port of the rendering server.
pub const DEFAULT_PORT: u16 = 5151;

/// Session settings.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    /// Server log verbosity: 0 quiet, 1 errors, 2 errors and warnings, 3 everything.
    pub verbosity: u8,
    /// Deadline for each wait on the socket. `None` waits forever.
    pub response_timeout: Option<Duration>,
    /// Skip reading responses of commands that return nothing.
    pub async_mode: bool,
    /// zlib level for uploads; -1 or 0 sends raw bytes.
    pub compression_level: i32,
    /// Abort a call when the server logs an error.
    pub fail_on_error: bool,
    /// Abort a call when the server logs a warning.
    pub fail_on_warning: bool,
    /// Chunk size for file uploads.
    pub chunk_size: usize,
    /// Upper bound for any length or count in received frames.
    pub max_payload_size: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            verbosity: 2,
            response_timeout: None,
            async_mode: true,
            compression_level: -1,
            fail_on_error: true,
            fail_on_warning: false,
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_payload_size: DEFAULT_MAX_PAYLOAD_SIZE,
        }
    }
}

impl SessionConfig {
    fn log_policy(&self) -> LogPolicy {
        LogPolicy {
            verbosity: self.verbosity,
            fail_on_error: self.fail_on_error,
            fail_on_warning: self.fail_on_warning,
        }
    }
}

/// Builder for configuring and creating a [`Session`].
#[derive(Debug, Clone, Default)]
pub struct SessionBuilder {
    config: SessionConfig,
}

impl SessionBuilder {
    /// Create a new session builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Server log verbosity (0-3).
    ///
    /// Default: 2
    pub fn verbosity(mut self, level: u8) -> Self {
        self.config.verbosity = level;
        self
    }

    /// Deadline for each wait on the socket.
    ///
    /// Default: none
    pub fn response_timeout(mut self, timeout: Duration) -> Self {
        self.config.response_timeout = Some(timeout);
        self
    }

    /// Skip reading responses of setter-style commands.
    ///
    /// Default: true
    pub fn async_mode(mut self, enabled: bool) -> Self {
        self.config.async_mode = enabled;
        self
    }

    /// zlib level for uploads (-1 or 0 for raw, 1-9).
    ///
    /// Default: -1
    pub fn compression_level(mut self, level: i32) -> Self {
        self.config.compression_level = level;
        self
    }

    /// Default: true
    pub fn fail_on_error(mut self, enabled: bool) -> Self {
        self.config.fail_on_error = enabled;
        self
    }

    /// Default: false
    pub fn fail_on_warning(mut self, enabled: bool) -> Self {
        self.config.fail_on_warning = enabled;
        self
    }

    /// Chunk size for file uploads.
    ///
    /// Default: 1 MiB
    pub fn chunk_size(mut self, size: usize) -> Self {
        self.config.chunk_size = size;
        self
    }

    /// Upper bound for any length or count in received frames.
    ///
    /// Default: 1 GiB
    pub fn max_payload_size(mut self, size: u32) -> Self {
        self.config.max_payload_size = size;
        self
    }

    /// Build an unconnected session.
    pub fn build(self) -> Session {
        Session::with_config(self.config)
    }

    /// Build the session and connect it over TCP.
    pub async fn connect(self, host: &str, port: u16) -> Result<Session> {
        let session = self.build();
        session.connect(host, port).await?;
        Ok(session)
    }

    /// Build the session over an already connected stream.
    pub async fn attach<S: Stream + 'static>(self, stream: S) -> Session {
        let session = self.build();
        session.attach(stream).await;
        session
    }
}

/// A client session with a rendering server.
///
/// Commands are serialized: concurrent callers queue until the one in
/// flight has its response. Typed wrappers for individual commands live in
/// [`crate::facade`].
pub struct Session {
    config: Mutex<SessionConfig>,
    link: tokio::sync::Mutex<Option<Correlator>>,
    /// Cancels the live transport, usable while a call holds `link`.
    cancel: Mutex<CancellationToken>,
}

impl Session {
    /// Create a new session builder.
    pub fn builder() -> SessionBuilder {
        SessionBuilder::new()
    }

    /// An unconnected session with default settings.
    pub fn new() -> Self {
        Self::with_config(SessionConfig::default())
    }

    pub fn with_config(config: SessionConfig) -> Self {
        Self {
            config: Mutex::new(config),
            link: tokio::sync::Mutex::new(None),
            cancel: Mutex::new(CancellationToken::new()),
        }
    }

    /// Connect to a server, replacing any current connection.
    pub async fn connect(&self, host: &str, port: u16) -> Result<()> {
        self.disconnect().await;
        let transport = Transport::connect(host, port).await?;
        self.install(transport).await;
        Ok(())
    }

    /// Use an already connected stream, replacing any current connection.
    pub async fn attach<S: Stream + 'static>(&self, stream: S) {
        self.disconnect().await;
        self.install(Transport::from_stream(stream)).await;
    }

    async fn install(&self, transport: Transport) {
        let max_payload_size = self.config.lock().max_payload_size;
        let transport = transport.with_max_payload(max_payload_size);
        *self.cancel.lock() = transport.cancel_handle();
        *self.link.lock().await = Some(Correlator::new(transport));
    }

    /// Close the connection.
    ///
    /// An idle connection gets the `close` handshake first. A call blocked
    /// on the server is aborted and fails with `Disconnected`.
    pub async fn disconnect(&self) {
        let cancel = self.cancel.lock().clone();
        let mut link = match self.link.try_lock() {
            Ok(guard) => guard,
            Err(_) => {
                cancel.cancel();
                self.link.lock().await
            }
        };

        if let Some(mut correlator) = link.take() {
            if correlator.transport().is_connected() {
                if let Err(e) = correlator.send("close", VariantMap::new()).await {
                    tracing::debug!("Close handshake failed: {}", e);
                }
            }
            correlator.into_transport().close().await;
            tracing::info!("Disconnected from server");
        }
    }

    /// Whether a live connection exists.
    ///
    /// A call in progress counts as connected.
    pub fn is_connected(&self) -> bool {
        match self.link.try_lock() {
            Ok(link) => link
                .as_ref()
                .is_some_and(|correlator| correlator.transport().is_connected()),
            Err(_) => !self.cancel.lock().is_cancelled(),
        }
    }

    /// Snapshot of the current settings.
    pub fn config(&self) -> SessionConfig {
        self.config.lock().clone()
    }

    /// Server log verbosity: 0 quiet, 1 errors, 2 errors and warnings, 3 everything.
    pub fn set_verbosity_level(&self, level: u8) {
        self.config.lock().verbosity = level;
    }

    /// Deadline for each wait on the socket. `None` waits forever.
    pub fn set_timeout(&self, timeout: Option<Duration>) {
        self.config.lock().response_timeout = timeout;
    }

    /// Skip reading responses of setter-style commands.
    pub fn set_async(&self, enabled: bool) {
        self.config.lock().async_mode = enabled;
    }

    pub fn is_async(&self) -> bool {
        self.config.lock().async_mode
    }

    pub fn set_fail_on_error(&self, enabled: bool) {
        self.config.lock().fail_on_error = enabled;
    }

    pub fn set_fail_on_warning(&self, enabled: bool) {
        self.config.lock().fail_on_warning = enabled;
    }

    /// Send a command and wait for its response.
    ///
    /// Connection-level failures drop the connection: later calls fail with
    /// `NotConnected` until the session reconnects.
    pub async fn call(&self, command: &str, params: VariantMap) -> Result<VariantMap> {
        let mut link = self.link.lock().await;
        let correlator = self.ready(&mut link)?;
        let result = correlator.call(command, params).await;
        Self::settle(&mut link, result)
    }

    /// Send a command without reading its response.
    pub async fn send(&self, command: &str, params: VariantMap) -> Result<()> {
        let mut link = self.link.lock().await;
        let correlator = self.ready(&mut link)?;
        let result = correlator.send(command, params).await;
        Self::settle(&mut link, result)
    }

    /// Send a command that returns nothing, waiting only when async mode is off.
    pub async fn exec(&self, command: &str, params: VariantMap) -> Result<()> {
        if self.is_async() {
            self.send(command, params).await
        } else {
            self.call(command, params).await.map(drop)
        }
    }

    /// Upload a file to the server under `filename`.
    ///
    /// Contents larger than the chunk size are written in pieces at
    /// increasing offsets. The configured compression level applies to each.
    pub async fn send_file(&self, filename: &str, data: &[u8]) -> Result<()> {
        let (level, chunk_size) = {
            let config = self.config.lock();
            (config.compression_level, config.chunk_size.max(1))
        };

        let mut link = self.link.lock().await;
        let correlator = self.ready(&mut link)?;

        let mut offset = 0u64;
        let result = loop {
            let end = data.len().min(offset as usize + chunk_size);
            let chunk = FileChunk {
                filename,
                data: &data[offset as usize..end],
                compression_level: level,
                offset,
                append: offset > 0,
            };
            let sent = correlator.send_file(chunk).await;
            offset = end as u64;
            if sent.is_err() || end == data.len() {
                break sent;
            }
        };

        Self::settle(&mut link, result)
    }

    /// Set the zlib level (0-9) the server uses for image transfers.
    pub async fn set_compression_level(&self, level: u32) -> Result<()> {
        if level > 9 {
            return Err(SurrenderError::InvalidArgument(format!(
                "compression level {} is outside 0-9",
                level
            )));
        }
        let mut params = VariantMap::new();
        params.insert("compression_level".into(), level.into());
        self.call("setCompressionLevel", params).await.map(drop)
    }

    /// The live correlator, configured with the current settings.
    fn ready<'a>(&self, link: &'a mut Option<Correlator>) -> Result<&'a mut Correlator> {
        let correlator = link.as_mut().ok_or(SurrenderError::NotConnected)?;
        self.configure(correlator);
        Ok(correlator)
    }

    fn configure(&self, correlator: &mut Correlator) {
        let config = self.config.lock();
        correlator.set_policy(config.log_policy());
        correlator.set_chunk_size(config.chunk_size);
        correlator
            .transport_mut()
            .set_read_timeout(config.response_timeout);
    }

    /// Drop the connection when `result` says it is no longer usable.
    fn settle<T>(link: &mut Option<Correlator>, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            if e.is_fatal() {
                tracing::warn!("Connection lost: {}", e);
                *link = None;
            }
        }
        result
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("config", &*self.config.lock())
            .field("connected", &self.is_connected())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use bytes::BytesMut;
    use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt, DuplexStream};

    use crate::codec::{VariantCodec, ZlibCodec};
    use crate::protocol::{build_command, FrameBuffer, Variant, COMMAND_KEY};

    async fn scripted(builder: SessionBuilder) -> (Session, DuplexStream) {
        let (client, server) = duplex(1 << 20);
        (builder.attach(client).await, server)
    }

    async fn reply(server: &mut DuplexStream, frames: &[VariantMap]) {
        let mut buf = BytesMut::new();
        for frame in frames {
            buf.extend_from_slice(&VariantCodec::encode_frame(frame).unwrap());
        }
        server.write_all(&buf).await.unwrap();
    }

    async fn next_request(server: &mut DuplexStream, buffer: &mut FrameBuffer) -> VariantMap {
        let mut chunk = [0u8; 4096];
        loop {
            if let Some(frame) = buffer.try_extract().unwrap() {
                return frame;
            }
            let n = server.read(&mut chunk).await.unwrap();
            assert!(n > 0, "client closed early");
            buffer.extend(&chunk[..n]);
        }
    }

    fn ack(command: &str) -> VariantMap {
        build_command(command, VariantMap::new())
    }

    #[test]
    fn test_builder_defaults() {
        let config = Session::builder().build().config();
        assert_eq!(config, SessionConfig::default());
        assert_eq!(config.verbosity, 2);
        assert!(config.async_mode);
        assert_eq!(config.compression_level, -1);
        assert_eq!(config.chunk_size, 1024 * 1024);
    }

    #[test]
    fn test_runtime_setters() {
        let session = Session::new();
        session.set_verbosity_level(3);
        session.set_timeout(Some(Duration::from_secs(2)));
        session.set_async(false);
        session.set_fail_on_warning(true);

        let config = session.config();
        assert_eq!(config.verbosity, 3);
        assert_eq!(config.response_timeout, Some(Duration::from_secs(2)));
        assert!(!config.async_mode);
        assert!(config.fail_on_warning);
    }

    #[tokio::test]
    async fn test_unconnected_session() {
        let session = Session::new();
        assert!(!session.is_connected());
        assert!(matches!(
            session.call("render", VariantMap::new()).await,
            Err(SurrenderError::NotConnected)
        ));
        assert!(matches!(
            session.send("render", VariantMap::new()).await,
            Err(SurrenderError::NotConnected)
        ));
        session.disconnect().await;
    }

    #[tokio::test]
    async fn test_exec_honors_async_mode() {
        let (session, mut server) = scripted(Session::builder()).await;
        let mut buffer = FrameBuffer::new();

        session.exec("render", VariantMap::new()).await.unwrap();
        assert_eq!(next_request(&mut server, &mut buffer).await, ack("render"));

        session.set_async(false);
        reply(&mut server, &[ack("render")]).await;
        session.exec("render", VariantMap::new()).await.unwrap();
        assert_eq!(next_request(&mut server, &mut buffer).await, ack("render"));
    }

    #[tokio::test]
    async fn test_stale_async_response_is_skipped() {
        let (session, mut server) = scripted(Session::builder()).await;
        session.exec("setSunPower", VariantMap::new()).await.unwrap();

        let mut size = ack("getImageSize");
        size.insert("size".into(), Variant::list([64, 32]));
        reply(&mut server, &[ack("setSunPower"), size.clone()]).await;

        assert_eq!(session.call("getImageSize", VariantMap::new()).await.unwrap(), size);
    }

    #[tokio::test]
    async fn test_set_compression_level() {
        let (session, mut server) = scripted(Session::builder()).await;

        let err = session.set_compression_level(12).await.unwrap_err();
        assert!(matches!(err, SurrenderError::InvalidArgument(_)));

        reply(&mut server, &[ack("setCompressionLevel")]).await;
        session.set_compression_level(5).await.unwrap();

        let mut buffer = FrameBuffer::new();
        let request = next_request(&mut server, &mut buffer).await;
        assert_eq!(request[COMMAND_KEY], Variant::from("setCompressionLevel"));
        assert_eq!(request["compression_level"], Variant::Int32(5));
    }

    #[tokio::test]
    async fn test_send_file_chunks_and_compresses() {
        let (session, mut server) =
            scripted(Session::builder().compression_level(6).chunk_size(4096)).await;
        let content = vec![0x5Au8; 10_000];
        reply(&mut server, &[ack("sendFile"), ack("sendFile"), ack("sendFile")]).await;

        session.send_file("textures/flat.bin", &content).await.unwrap();

        let mut buffer = FrameBuffer::new();
        let mut received = Vec::new();
        for offset in [0i32, 4096, 8192] {
            let request = next_request(&mut server, &mut buffer).await;
            assert_eq!(request["filename"], Variant::from("textures/flat.bin"));
            assert_eq!(request["compressed"], Variant::Bool(true));
            assert_eq!(request["offset"], Variant::Int32(offset));
            assert_eq!(request["append"], Variant::Bool(offset > 0));
            let body = request["data"].as_bytes().unwrap();
            received.extend(ZlibCodec::decompress(body).unwrap());
        }
        assert_eq!(received, content);
    }

    #[tokio::test]
    async fn test_send_empty_file() {
        let (session, mut server) = scripted(Session::builder()).await;
        reply(&mut server, &[ack("sendFile")]).await;

        session.send_file("empty.txt", &[]).await.unwrap();

        let mut buffer = FrameBuffer::new();
        let request = next_request(&mut server, &mut buffer).await;
        assert_eq!(request["data"], Variant::bytes(Vec::<u8>::new()));
        assert_eq!(request["append"], Variant::Bool(false));
    }

    #[tokio::test]
    async fn test_send_file_stops_after_failed_chunk() {
        let (session, mut server) = scripted(Session::builder().chunk_size(4096)).await;
        let mut log = VariantMap::new();
        log.insert("data".into(), Variant::bytes(&b"[error] disk full"[..]));
        reply(&mut server, &[log]).await;

        let err = session.send_file("big.bin", &[1u8; 10_000]).await.unwrap_err();
        assert!(matches!(err, SurrenderError::Server(_)));
        session.send("version", VariantMap::new()).await.unwrap();

        let mut buffer = FrameBuffer::new();
        let first = next_request(&mut server, &mut buffer).await;
        assert_eq!(first[COMMAND_KEY], Variant::from("sendFile"));
        assert_eq!(first["offset"], Variant::Int32(0));
        let second = next_request(&mut server, &mut buffer).await;
        assert_eq!(second, ack("version"));
    }

    #[tokio::test]
    async fn test_disconnect_sends_close_handshake() {
        let (session, mut server) = scripted(Session::builder()).await;
        assert!(session.is_connected());

        session.disconnect().await;

        assert!(!session.is_connected());
        let mut buffer = FrameBuffer::new();
        assert_eq!(next_request(&mut server, &mut buffer).await, ack("close"));
        let mut rest = Vec::new();
        server.read_to_end(&mut rest).await.unwrap();
        assert!(rest.is_empty());
    }

    #[tokio::test]
    async fn test_disconnect_unblocks_pending_call() {
        let (session, _server) = scripted(Session::builder()).await;
        let session = Arc::new(session);

        let caller = {
            let session = session.clone();
            tokio::spawn(async move { session.call("render", VariantMap::new()).await })
        };
        tokio::task::yield_now().await;
        assert!(session.is_connected());

        session.disconnect().await;

        let result = caller.await.unwrap();
        assert!(matches!(result, Err(SurrenderError::Disconnected)));
        assert!(!session.is_connected());
        assert!(matches!(
            session.call("render", VariantMap::new()).await,
            Err(SurrenderError::NotConnected)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_drops_connection() {
        let (session, _server) =
            scripted(Session::builder().response_timeout(Duration::from_millis(500))).await;

        let err = session.call("render", VariantMap::new()).await.unwrap_err();

        assert!(matches!(err, SurrenderError::Timeout(_)));
        assert!(!session.is_connected());
    }

    #[tokio::test]
    async fn test_server_error_keeps_connection() {
        let (session, mut server) = scripted(Session::builder()).await;
        let mut log = VariantMap::new();
        log.insert("data".into(), Variant::bytes(&b"[error] no such body"[..]));
        reply(&mut server, &[log, ack("render"), ack("render")]).await;

        let err = session.call("render", VariantMap::new()).await.unwrap_err();
        assert!(matches!(err, SurrenderError::Server(_)));
        assert!(session.is_connected());

        session.call("render", VariantMap::new()).await.unwrap();
    }
}
