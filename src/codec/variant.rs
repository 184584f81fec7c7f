//! Variant codec - whole-value encoding and decoding.
//!
//! Wraps the wire format for callers holding complete buffers. Streaming
//! input goes through [`FrameBuffer`](crate::protocol::FrameBuffer) instead.
//!
//! # Example
//!
//! ```
//! use surrender_client::codec::VariantCodec;
//! use surrender_client::protocol::Variant;
//!
//! let value = Variant::list([Variant::from("rgb"), Variant::from(3)]);
//! let encoded = VariantCodec::encode(&value).unwrap();
//! let decoded = VariantCodec::decode(&encoded).unwrap();
//! assert_eq!(decoded, value);
//! ```

use bytes::{Bytes, BytesMut};

use crate::error::{Result, SurrenderError};
use crate::protocol::{encode_map, encode_variant, Decoder, Variant, VariantMap};

/// Codec for tagged values and frames.
pub struct VariantCodec;

impl VariantCodec {
    /// Encode a tagged value.
    ///
    /// # Errors
    ///
    /// Returns `Unencodable` if a length does not fit the 32-bit field.
    pub fn encode(value: &Variant) -> Result<Bytes> {
        let mut buf = BytesMut::new();
        encode_variant(value, &mut buf)?;
        Ok(buf.freeze())
    }

    /// Decode exactly one tagged value from `bytes`.
    ///
    /// # Errors
    ///
    /// Returns `Protocol` if the input is malformed, truncated, or has
    /// trailing bytes.
    pub fn decode(bytes: &[u8]) -> Result<Variant> {
        let mut decoder = Decoder::new(bytes);
        let value = decoder.variant()?;
        Self::expect_end(&decoder, bytes.len())?;
        Ok(value)
    }

    /// Encode a frame (bare map, no kind tag).
    pub fn encode_frame(frame: &VariantMap) -> Result<Bytes> {
        let mut buf = BytesMut::new();
        encode_map(frame, &mut buf)?;
        Ok(buf.freeze())
    }

    /// Decode exactly one frame from `bytes`.
    pub fn decode_frame(bytes: &[u8]) -> Result<VariantMap> {
        let mut decoder = Decoder::new(bytes);
        let frame = decoder.map()?;
        Self::expect_end(&decoder, bytes.len())?;
        Ok(frame)
    }

    fn expect_end(decoder: &Decoder<'_>, len: usize) -> Result<()> {
        if decoder.position() != len {
            return Err(SurrenderError::Protocol(format!(
                "{} trailing bytes after value",
                len - decoder.position()
            )));
        }
        Ok(())
    }
}
