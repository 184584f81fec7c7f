//! Compressed payload codec.
//!
//! Image buffers and file bodies may travel compressed:
//! ```text
//! ┌─────────────────────┬──────────────────────┐
//! │ Uncompressed size   │ zlib (DEFLATE) stream│
//! │ uint32 BE           │                      │
//! └─────────────────────┴──────────────────────┘
//! ```
//!
//! # Example
//!
//! ```
//! use surrender_client::codec::ZlibCodec;
//!
//! let data = vec![0u8; 4096];
//! let packed = ZlibCodec::compress(&data, 6).unwrap();
//! assert_eq!(&packed[..4], &4096u32.to_be_bytes());
//! assert_eq!(ZlibCodec::decompress(&packed).unwrap(), data);
//! ```

use std::io::{Read, Write};

use bytes::{BufMut, Bytes, BytesMut};
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;

use crate::error::{Result, SurrenderError};

/// Highest zlib compression level.
pub const MAX_LEVEL: u32 = 9;

/// Size of the uncompressed-length prefix.
pub const SIZE_PREFIX: usize = 4;

/// Output bytes reserved per compressed byte before decompressing.
const PREALLOC_RATIO: usize = 64;

/// Codec for size-prefixed zlib payloads.
pub struct ZlibCodec;

impl ZlibCodec {
    /// Compress `data` at `level` (0-9).
    ///
    /// # Errors
    ///
    /// Returns `Compression` if the level is out of range or the input does
    /// not fit the 32-bit size prefix.
    pub fn compress(data: &[u8], level: u32) -> Result<Bytes> {
        if level > MAX_LEVEL {
            return Err(SurrenderError::Compression(format!(
                "compression level {} out of range 0-{}",
                level, MAX_LEVEL
            )));
        }
        let size = u32::try_from(data.len()).map_err(|_| {
            SurrenderError::Compression(format!("{} bytes exceed the size prefix", data.len()))
        })?;

        let mut out = BytesMut::with_capacity(SIZE_PREFIX + data.len() / 2 + 64);
        out.put_u32(size);
        let mut encoder = ZlibEncoder::new(out.writer(), Compression::new(level));
        encoder.write_all(data)?;
        let out = encoder.finish()?.into_inner();

        Ok(out.freeze())
    }

    /// Decompress a size-prefixed payload, checking the prefix.
    ///
    /// # Errors
    ///
    /// Returns `Compression` if the payload is shorter than the prefix, the
    /// stream is corrupt, or the decompressed length differs from the prefix.
    pub fn decompress(payload: &[u8]) -> Result<Vec<u8>> {
        if payload.len() < SIZE_PREFIX {
            return Err(SurrenderError::Compression(format!(
                "payload of {} bytes has no size prefix",
                payload.len()
            )));
        }
        let expected = u32::from_be_bytes([payload[0], payload[1], payload[2], payload[3]]) as usize;

        // The prefix is untrusted; reserve no more than the stream can
        // plausibly produce and let the vector grow past that.
        let mut out = Vec::with_capacity(initial_capacity(expected, payload.len()));
        // One extra byte is enough to detect an oversized stream.
        ZlibDecoder::new(&payload[SIZE_PREFIX..])
            .take(expected as u64 + 1)
            .read_to_end(&mut out)
            .map_err(|e| SurrenderError::Compression(format!("corrupt zlib stream: {}", e)))?;

        if out.len() != expected {
            return Err(SurrenderError::Compression(format!(
                "decompressed {} bytes, size prefix says {}",
                out.len(),
                expected
            )));
        }
        Ok(out)
    }
}

fn initial_capacity(expected: usize, compressed: usize) -> usize {
    expected.min(compressed.saturating_mul(PREALLOC_RATIO))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_megabyte_of_zeros_round_trip() {
        let data = vec![0u8; 1024 * 1024];
        let packed = ZlibCodec::compress(&data, 6).unwrap();

        assert_eq!(&packed[..4], &(1024u32 * 1024).to_be_bytes());
        assert!(packed.len() < data.len() / 100);

        let unpacked = ZlibCodec::decompress(&packed).unwrap();
        assert_eq!(unpacked.len(), data.len());
        assert_eq!(unpacked, data);
    }

    #[test]
    fn test_level_zero_still_round_trips() {
        let data: Vec<u8> = (0..10_000u32).map(|i| (i % 251) as u8).collect();
        let packed = ZlibCodec::compress(&data, 0).unwrap();
        assert_eq!(ZlibCodec::decompress(&packed).unwrap(), data);
    }

    #[test]
    fn test_empty_input() {
        let packed = ZlibCodec::compress(&[], 9).unwrap();
        assert_eq!(&packed[..4], &[0, 0, 0, 0]);
        assert!(ZlibCodec::decompress(&packed).unwrap().is_empty());
    }

    #[test]
    fn test_level_out_of_range() {
        let err = ZlibCodec::compress(b"abc", 10).unwrap_err();
        assert!(err.to_string().contains("out of range"));
    }

    #[test]
    fn test_size_prefix_mismatch() {
        let mut packed = ZlibCodec::compress(b"hello hello hello", 6).unwrap().to_vec();
        packed[..4].copy_from_slice(&5u32.to_be_bytes());
        let err = ZlibCodec::decompress(&packed).unwrap_err();
        assert!(err.to_string().contains("size prefix says 5"));

        packed[..4].copy_from_slice(&100u32.to_be_bytes());
        let err = ZlibCodec::decompress(&packed).unwrap_err();
        assert!(err.to_string().contains("decompressed 17 bytes"));
    }

    #[test]
    fn test_corrupt_stream() {
        let mut payload = 10u32.to_be_bytes().to_vec();
        payload.extend_from_slice(b"not zlib at all");
        assert!(matches!(
            ZlibCodec::decompress(&payload),
            Err(SurrenderError::Compression(_))
        ));
        assert!(ZlibCodec::decompress(&[0, 1]).is_err());
    }

    #[test]
    fn test_huge_size_prefix_is_not_trusted() {
        let mut packed = ZlibCodec::compress(b"tiny", 6).unwrap().to_vec();
        packed[..4].copy_from_slice(&u32::MAX.to_be_bytes());

        assert_eq!(initial_capacity(u32::MAX as usize, packed.len()), packed.len() * 64);
        assert_eq!(initial_capacity(10, packed.len()), 10);

        let err = ZlibCodec::decompress(&packed).unwrap_err();
        assert!(matches!(err, SurrenderError::Compression(_)));
        assert!(err.to_string().contains("decompressed 4 bytes"));
    }
}
