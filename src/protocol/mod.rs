//! Protocol module - tagged values, wire format, framing, and command maps.
//!
//! This module implements the binary protocol spoken with the server:
//! - Self-describing tagged values ([`Variant`])
//! - Big-endian encoding/decoding of values and frames
//! - Frame buffer for accumulating partial reads
//! - Command-map conventions and side-channel frames

mod command;
mod frame_buffer;
mod variant;
mod wire_format;

pub use command::{
    build_command, classify, command_name, file_requests, FileRequest, Inbound, LogLine, Severity,
    COMMAND_KEY, FILES_TO_UPDATE_KEY, LOG_DATA_KEY,
};
pub use frame_buffer::FrameBuffer;
pub use variant::{Variant, VariantMap};
pub use wire_format::{
    encode_map, encode_string, encode_variant, kind, DecodeError, Decoder, FrameScanner,
    DEFAULT_MAX_PAYLOAD_SIZE, EMPTY_LENGTH, KIND_HEADER_SIZE, MAX_DEPTH,
};
