//! Request/response correlation.
//!
//! The protocol allows one request in flight per connection and carries no
//! request IDs. A response is recognized by its command name alone, so the
//! correlator sends a command and then keeps reading frames until one is
//! tagged with the same name:
//!
//! ```text
//! send {"": cmd, ...}
//!   ├─ {"": cmd, ...}           → return it
//!   ├─ {"data": b"[info] ..."}  → log, keep reading
//!   ├─ {"files2update": [...]}  → remember the uploads, keep reading
//!   └─ {"": other, ...}         → discard, keep reading
//! ```
//!
//! Requested uploads are served once the awaited response has arrived,
//! through `sendFile` commands on the same connection.

use std::collections::VecDeque;

use tokio::fs::File;
use tokio::io::AsyncReadExt;

use crate::codec::{VariantCodec, ZlibCodec};
use crate::error::{Result, SurrenderError};
use crate::protocol::{
    build_command, classify, file_requests, FileRequest, Inbound, LogLine, Severity, Variant,
    VariantMap,
};
use crate::transport::Transport;

/// Default size of the chunks read from disk for each `sendFile` upload.
pub const DEFAULT_CHUNK_SIZE: usize = 1024 * 1024;

/// How server log lines are filtered and escalated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogPolicy {
    /// 0 quiet, 1 errors, 2 errors and warnings, 3 everything.
    pub verbosity: u8,
    /// Abort the call on an error line.
    pub fail_on_error: bool,
    /// Abort the call on a warning line (implies failing on errors).
    pub fail_on_warning: bool,
}

impl Default for LogPolicy {
    fn default() -> Self {
        Self {
            verbosity: 2,
            fail_on_error: true,
            fail_on_warning: false,
        }
    }
}

impl LogPolicy {
    /// Whether a line of this severity aborts the call.
    pub fn is_fatal(&self, severity: Severity) -> bool {
        match severity {
            Severity::Error => self.fail_on_error || self.fail_on_warning,
            Severity::Warning => self.fail_on_warning,
            Severity::Info | Severity::Debug => false,
        }
    }
}

/// Parameters of a single `sendFile` upload.
#[derive(Debug, Clone)]
pub struct FileChunk<'a> {
    /// Name of the file on the server.
    pub filename: &'a str,
    pub data: &'a [u8],
    /// zlib level; <= 0 sends the bytes as-is.
    pub compression_level: i32,
    /// Byte offset of `data` in the file.
    pub offset: u64,
    /// Keep existing content instead of truncating.
    pub append: bool,
}

impl FileChunk<'_> {
    fn into_params(self) -> Result<VariantMap> {
        let compressed = self.compression_level > 0;
        let data = if compressed {
            ZlibCodec::compress(self.data, self.compression_level as u32)?
        } else {
            bytes::Bytes::copy_from_slice(self.data)
        };

        let mut params = VariantMap::new();
        params.insert("filename".into(), self.filename.into());
        params.insert("compressed".into(), compressed.into());
        params.insert("offset".into(), self.offset.into());
        params.insert("append".into(), self.append.into());
        params.insert("data".into(), Variant::ByteArray(data));
        Ok(params)
    }
}

/// Owns the transport and matches each command to its response.
#[derive(Debug)]
pub struct Correlator {
    transport: Transport,
    policy: LogPolicy,
    chunk_size: usize,
}

impl Correlator {
    pub fn new(transport: Transport) -> Self {
        Self {
            transport,
            policy: LogPolicy::default(),
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    pub fn set_policy(&mut self, policy: LogPolicy) {
        self.policy = policy;
    }

    /// Chunk size for uploads requested by the server. Zero is treated as one.
    pub fn set_chunk_size(&mut self, chunk_size: usize) {
        self.chunk_size = chunk_size.max(1);
    }

    pub fn transport(&self) -> &Transport {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut Transport {
        &mut self.transport
    }

    pub fn into_transport(self) -> Transport {
        self.transport
    }

    /// Send a command without waiting for its response.
    ///
    /// The response, when the server sends one, is discarded by a later
    /// exchange as an unrelated frame.
    pub async fn send(&mut self, command: &str, params: VariantMap) -> Result<()> {
        let frame = build_command(command, params);
        let bytes = VariantCodec::encode_frame(&frame)?;
        tracing::debug!(command, bytes = bytes.len(), "Sending command");
        self.transport.send(&bytes).await
    }

    /// Send a command and wait for the frame tagged with the same name.
    ///
    /// File uploads requested by the server while waiting are performed
    /// before returning.
    pub async fn call(&mut self, command: &str, params: VariantMap) -> Result<VariantMap> {
        let (response, requests) = self.exchange(command, params).await?;
        self.serve_file_requests(requests).await?;
        Ok(response)
    }

    /// Upload one chunk of a file.
    pub async fn send_file(&mut self, chunk: FileChunk<'_>) -> Result<()> {
        let (_, requests) = self.exchange("sendFile", chunk.into_params()?).await?;
        self.serve_file_requests(requests).await
    }

    async fn exchange(
        &mut self,
        command: &str,
        params: VariantMap,
    ) -> Result<(VariantMap, Vec<FileRequest>)> {
        self.send(command, params).await?;
        self.await_response(command).await
    }

    async fn await_response(&mut self, command: &str) -> Result<(VariantMap, Vec<FileRequest>)> {
        let mut requests = Vec::new();

        loop {
            let frame = self.transport.recv_frame().await?;
            requests.extend(file_requests(&frame));

            match classify(&frame, command) {
                Inbound::Response => {
                    tracing::debug!(command, fields = frame.len(), "Received response");
                    return Ok((frame, requests));
                }
                Inbound::Log(line) => self.handle_log(line)?,
                Inbound::Unrelated(Some(other)) => {
                    tracing::debug!(awaited = command, received = %other, "Discarding unrelated response");
                }
                Inbound::Unrelated(None) => {
                    if frame.is_empty() {
                        tracing::trace!("Discarding empty frame");
                    } else {
                        tracing::debug!(awaited = command, fields = frame.len(), "Discarding untagged frame");
                    }
                }
            }
        }
    }

    fn handle_log(&self, line: LogLine) -> Result<()> {
        if line.severity.is_visible_at(self.policy.verbosity) {
            match line.severity {
                Severity::Error => tracing::error!(target: "surrender::server", "{}", line),
                Severity::Warning => tracing::warn!(target: "surrender::server", "{}", line),
                Severity::Info => tracing::info!(target: "surrender::server", "{}", line),
                Severity::Debug => tracing::debug!(target: "surrender::server", "{}", line),
            }
        }

        if self.policy.is_fatal(line.severity) {
            return Err(SurrenderError::Server(line.to_string()));
        }
        Ok(())
    }

    async fn serve_file_requests(&mut self, requests: Vec<FileRequest>) -> Result<()> {
        let mut queue = VecDeque::from(requests);
        while let Some(request) = queue.pop_front() {
            let more = self.upload(&request).await?;
            queue.extend(more);
        }
        Ok(())
    }

    /// Stream one requested file in bounded chunks.
    async fn upload(&mut self, request: &FileRequest) -> Result<Vec<FileRequest>> {
        let path = request.local_path();
        let target = request.target_name().to_string();
        tracing::info!(path = %path, remote = %target, "Sending file to server");

        let mut file = File::open(&path).await?;
        let total = file.metadata().await?.len();
        let mut more = Vec::new();
        let mut offset = 0u64;
        let mut buf = Vec::with_capacity(self.chunk_size.min(total as usize).max(1));

        loop {
            buf.clear();
            (&mut file)
                .take(self.chunk_size as u64)
                .read_to_end(&mut buf)
                .await?;
            if buf.is_empty() {
                break;
            }

            let chunk = FileChunk {
                filename: &target,
                data: &buf,
                compression_level: request.compression_level,
                offset,
                append: offset > 0,
            };
            let (_, requests) = self.exchange("sendFile", chunk.into_params()?).await?;
            more.extend(requests);

            offset += buf.len() as u64;
            tracing::debug!(remote = %target, sent = offset, total, "Upload progress");
        }

        Ok(more)
    }
}
