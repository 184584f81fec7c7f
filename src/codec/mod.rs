//! Codec module - serialization of tagged values and payload compression.
//!
//! - [`VariantCodec`] - Whole-value encode/decode of tagged values and frames
//! - [`ZlibCodec`] - Size-prefixed zlib payloads for images and file bodies
//!
//! # Design
//!
//! Codecs are marker structs with static methods rather than trait objects,
//! matching the fixed set of formats the server speaks.

mod variant;
mod zlib;

pub use variant::VariantCodec;
pub use zlib::{ZlibCodec, MAX_LEVEL, SIZE_PREFIX};
