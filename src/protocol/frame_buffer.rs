//! Frame buffer for accumulating partial reads.
//!
//! Uses `bytes::BytesMut` for buffer management. Frames carry no outer
//! length, so a `FrameScanner` walks the structure as bytes arrive and
//! picks up where it stopped on the next push. The frame is decoded once,
//! when the walk closes its top-level map.
//!
//! # Example
//!
//! ```ignore
//! use surrender_client::protocol::FrameBuffer;
//!
//! let mut buffer = FrameBuffer::new();
//!
//! // Data arrives in chunks from socket
//! let frames = buffer.push(&chunk)?;
//!
//! for frame in frames {
//!     println!("Got frame: {:?}", frame.get(""));
//! }
//! ```

use bytes::{Bytes, BytesMut};

use super::variant::VariantMap;
use super::wire_format::{Decoder, FrameScanner, DEFAULT_MAX_PAYLOAD_SIZE};
use crate::error::Result;

/// Buffer for accumulating incoming bytes and extracting complete frames.
pub struct FrameBuffer {
    /// Accumulated bytes from socket reads.
    buffer: BytesMut,
    /// Walk over the frame at the front of the buffer.
    scanner: FrameScanner,
    /// Maximum allowed length or count field.
    max_payload_size: u32,
    #[cfg(test)]
    decodes: usize,
}

impl FrameBuffer {
    /// Create a new frame buffer with default settings.
    ///
    /// Default capacity: 64KB, max payload: 1GB.
    pub fn new() -> Self {
        Self::with_max_payload(DEFAULT_MAX_PAYLOAD_SIZE)
    }

    /// Create a new frame buffer with custom max payload size.
    pub fn with_max_payload(max_payload_size: u32) -> Self {
        Self {
            buffer: BytesMut::with_capacity(64 * 1024),
            scanner: FrameScanner::new(),
            max_payload_size,
            #[cfg(test)]
            decodes: 0,
        }
    }

    /// Push data into the buffer and extract all complete frames.
    ///
    /// If data is fragmented, partial data is buffered internally for the
    /// next push.
    ///
    /// # Errors
    ///
    /// Returns a protocol error if the buffered bytes can never form a frame
    /// (unknown kind tag, oversized length).
    pub fn push(&mut self, data: &[u8]) -> Result<Vec<VariantMap>> {
        self.extend(data);

        let mut frames = Vec::new();
        while let Some(frame) = self.try_extract()? {
            frames.push(frame);
        }
        Ok(frames)
    }

    /// Try to extract a single frame from the buffer.
    ///
    /// Returns:
    /// - `Ok(Some(frame))` if a complete frame was extracted
    /// - `Ok(None)` if more data is needed
    /// - `Err(...)` on a protocol violation
    pub fn try_extract(&mut self) -> Result<Option<VariantMap>> {
        if self.buffer.is_empty() {
            return Ok(None);
        }

        let scanned = self.scanner.advance(&self.buffer, self.max_payload_size);
        let end = match scanned {
            Ok(Some(end)) => end,
            Ok(None) => return Ok(None),
            Err(e) => {
                self.scanner.reset();
                return Err(e.into());
            }
        };

        let bytes = self.buffer.split_to(end).freeze();
        self.scanner.reset();
        #[cfg(test)]
        {
            self.decodes += 1;
        }

        let mut decoder = Decoder::with_max_len(&bytes, self.max_payload_size);
        Ok(Some(decoder.map()?))
    }

    /// Remove exactly `n` raw bytes from the front, if buffered.
    pub fn take(&mut self, n: usize) -> Option<Bytes> {
        if self.buffer.len() < n {
            return None;
        }
        self.scanner.reset();
        Some(self.buffer.split_to(n).freeze())
    }

    /// Append data to the buffer without extracting frames.
    pub fn extend(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Get the number of buffered bytes.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Check if the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Clear the buffer and reset state.
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.scanner.reset();
    }

    #[cfg(test)]
    fn state_name(&self) -> &'static str {
        if self.scanner.in_progress() {
            "WaitingForBytes"
        } else {
            "WaitingForFrame"
        }
    }
}

impl Default for FrameBuffer {
    fn default() -> Self {
        Self::new()
    }
}
