//! Wire format encoding and decoding.
//!
//! Every value is a kind tag followed by a reserved byte and a payload:
//! ```text
//! ┌──────────┬──────────┬─────────────────────────┐
//! │ Kind     │ Reserved │ Payload                 │
//! │ uint32 BE│ 1 byte   │ shape fixed by the kind │
//! └──────────┴──────────┴─────────────────────────┘
//! ```
//!
//! Strings are UTF-16BE prefixed by their byte length, byte arrays are
//! length-prefixed, lists and maps are count-prefixed. A length of
//! `0xFFFFFFFF` denotes an empty string or byte array.
//!
//! A frame is a bare map: the count and key/value pairs, without a kind tag
//! of its own.
//!
//! All multi-byte integers are Big Endian.

use bytes::{BufMut, Bytes, BytesMut};

use super::variant::{Variant, VariantMap};
use crate::error::{Result, SurrenderError};

/// Size of the kind tag plus the reserved byte.
pub const KIND_HEADER_SIZE: usize = 5;

/// Length value marking an empty string or byte array.
pub const EMPTY_LENGTH: u32 = 0xFFFF_FFFF;

/// Default maximum for any length or count field (1 GB).
pub const DEFAULT_MAX_PAYLOAD_SIZE: u32 = 1_073_741_824;

/// Nesting limit for lists and maps.
pub const MAX_DEPTH: usize = 64;

/// Kind tags.
pub mod kind {
    pub const INVALID: u32 = 0;
    pub const BOOL: u32 = 1;
    pub const INT32: u32 = 2;
    pub const UINT32: u32 = 3;
    pub const UINT64: u32 = 5;
    pub const DOUBLE: u32 = 6;
    pub const MAP: u32 = 8;
    pub const LIST: u32 = 9;
    pub const STRING: u32 = 10;
    pub const BYTE_ARRAY: u32 = 12;
    /// Alias of `MAP`, decoded identically.
    pub const HASH: u32 = 28;
}

// ============================================================================
// Encoding
// ============================================================================

/// Encode a value, kind tag included.
pub fn encode_variant(value: &Variant, buf: &mut BytesMut) -> Result<()> {
    buf.put_u32(value.kind());
    buf.put_u8(0);

    match value {
        Variant::Invalid => {}
        Variant::Bool(v) => buf.put_u8(u8::from(*v)),
        Variant::Int32(v) => buf.put_i32(*v),
        Variant::UInt32(v) => buf.put_u32(*v),
        Variant::UInt64(v) => buf.put_u64(*v),
        Variant::Double(v) => buf.put_f64(*v),
        Variant::String(s) => encode_string(s, buf)?,
        Variant::ByteArray(data) => {
            if data.is_empty() {
                buf.put_u32(EMPTY_LENGTH);
            } else {
                buf.put_u32(wire_length(data.len(), "byte array")?);
                buf.put_slice(data);
            }
        }
        Variant::List(items) => {
            buf.put_u32(wire_length(items.len(), "list")?);
            for item in items {
                encode_variant(item, buf)?;
            }
        }
        Variant::Map(map) => encode_map(map, buf)?,
    }

    Ok(())
}

/// Encode a map body (count and pairs, no kind tag).
pub fn encode_map(map: &VariantMap, buf: &mut BytesMut) -> Result<()> {
    buf.put_u32(wire_length(map.len(), "map")?);
    for (key, value) in map {
        encode_string(key, buf)?;
        encode_variant(value, buf)?;
    }
    Ok(())
}

/// Encode a string body as UTF-16BE with its byte length.
pub fn encode_string(s: &str, buf: &mut BytesMut) -> Result<()> {
    if s.is_empty() {
        buf.put_u32(EMPTY_LENGTH);
        return Ok(());
    }

    let units: Vec<u16> = s.encode_utf16().collect();
    buf.put_u32(wire_length(units.len() * 2, "string")?);
    buf.reserve(units.len() * 2);
    for unit in units {
        buf.put_u16(unit);
    }
    Ok(())
}

/// Check a length against the u32 field, keeping the empty sentinel free.
fn wire_length(len: usize, what: &str) -> Result<u32> {
    match u32::try_from(len) {
        Ok(n) if n != EMPTY_LENGTH => Ok(n),
        _ => Err(SurrenderError::Unencodable(format!(
            "{} of {} elements exceeds the 32-bit length field",
            what, len
        ))),
    }
}

// ============================================================================
// Decoding
// ============================================================================

/// Why a decode attempt stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// Input ended early; at least this many bytes (from the start) are needed.
    Incomplete(usize),
    /// The bytes can never form a valid value.
    Invalid(String),
}

impl From<DecodeError> for SurrenderError {
    fn from(err: DecodeError) -> Self {
        match err {
            DecodeError::Incomplete(needed) => {
                SurrenderError::Protocol(format!("truncated value, {} bytes required", needed))
            }
            DecodeError::Invalid(msg) => SurrenderError::Protocol(msg),
        }
    }
}

type DecodeResult<T> = std::result::Result<T, DecodeError>;

/// Cursor over a byte slice that reports how much input is missing.
pub struct Decoder<'a> {
    buf: &'a [u8],
    pos: usize,
    max_len: u32,
}

impl<'a> Decoder<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self::with_max_len(buf, DEFAULT_MAX_PAYLOAD_SIZE)
    }

    /// Reject any length or count field above `max_len`.
    pub fn with_max_len(buf: &'a [u8], max_len: u32) -> Self {
        Self {
            buf,
            pos: 0,
            max_len,
        }
    }

    /// Bytes consumed so far.
    #[inline]
    pub fn position(&self) -> usize {
        self.pos
    }

    fn take(&mut self, n: usize) -> DecodeResult<&'a [u8]> {
        let end = self.pos.checked_add(n).ok_or_else(|| {
            DecodeError::Invalid(format!("length {} overflows the read position", n))
        })?;
        if end > self.buf.len() {
            return Err(DecodeError::Incomplete(end));
        }
        let slice = &self.buf[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn array<const N: usize>(&mut self) -> DecodeResult<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    fn u8(&mut self) -> DecodeResult<u8> {
        Ok(self.take(1)?[0])
    }

    fn u32(&mut self) -> DecodeResult<u32> {
        Ok(u32::from_be_bytes(self.array()?))
    }

    /// Length or count field, checked against the configured maximum.
    fn length(&mut self, what: &str) -> DecodeResult<u32> {
        let len = self.u32()?;
        check_length(len, what, self.max_len)?;
        Ok(len)
    }

    /// Decode one tagged value.
    pub fn variant(&mut self) -> DecodeResult<Variant> {
        self.variant_at(0)
    }

    fn variant_at(&mut self, depth: usize) -> DecodeResult<Variant> {
        let tag = self.u32()?;
        let _reserved = self.u8()?;

        match tag {
            kind::INVALID => Ok(Variant::Invalid),
            kind::BOOL => Ok(Variant::Bool(self.u8()? != 0)),
            kind::INT32 => Ok(Variant::Int32(i32::from_be_bytes(self.array()?))),
            kind::UINT32 => Ok(Variant::UInt32(self.u32()?)),
            kind::UINT64 => Ok(Variant::UInt64(u64::from_be_bytes(self.array()?))),
            kind::DOUBLE => Ok(Variant::Double(f64::from_be_bytes(self.array()?))),
            kind::STRING => Ok(Variant::String(self.string()?)),
            kind::BYTE_ARRAY => {
                let len = self.length("byte array")?;
                if len == EMPTY_LENGTH || len == 0 {
                    return Ok(Variant::ByteArray(Bytes::new()));
                }
                Ok(Variant::ByteArray(Bytes::copy_from_slice(
                    self.take(len as usize)?,
                )))
            }
            kind::LIST => {
                let depth = Self::nested(depth)?;
                let count = self.length("list")?;
                let mut items = Vec::with_capacity(count.min(1024) as usize);
                for _ in 0..count {
                    items.push(self.variant_at(depth)?);
                }
                Ok(Variant::List(items))
            }
            kind::MAP | kind::HASH => Ok(Variant::Map(self.map_at(Self::nested(depth)?)?)),
            other => Err(DecodeError::Invalid(format!("unsupported kind tag {}", other))),
        }
    }

    /// Decode a map body (count and pairs, no kind tag).
    pub fn map(&mut self) -> DecodeResult<VariantMap> {
        self.map_at(0)
    }

    fn map_at(&mut self, depth: usize) -> DecodeResult<VariantMap> {
        let count = self.length("map")?;
        let mut map = VariantMap::with_capacity(count.min(1024) as usize);
        for _ in 0..count {
            let key = self.string()?;
            let value = self.variant_at(depth)?;
            map.insert(key, value);
        }
        Ok(map)
    }

    /// Decode a string body.
    pub fn string(&mut self) -> DecodeResult<String> {
        let len = self.length("string")?;
        if len == EMPTY_LENGTH {
            return Ok(String::new());
        }
        if len % 2 != 0 {
            return Err(DecodeError::Invalid(format!(
                "odd UTF-16 string length {}",
                len
            )));
        }

        let raw = self.take(len as usize)?;
        let units: Vec<u16> = raw
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        String::from_utf16(&units)
            .map_err(|e| DecodeError::Invalid(format!("invalid UTF-16 string: {}", e)))
    }

    fn nested(depth: usize) -> DecodeResult<usize> {
        if depth >= MAX_DEPTH {
            return Err(DecodeError::Invalid(format!(
                "nesting deeper than {} levels",
                MAX_DEPTH
            )));
        }
        Ok(depth + 1)
    }
}

fn check_length(len: u32, what: &str, max_len: u32) -> DecodeResult<()> {
    if len != EMPTY_LENGTH && len > max_len {
        return Err(DecodeError::Invalid(format!(
            "{} length {} exceeds maximum {}",
            what, len, max_len
        )));
    }
    Ok(())
}

// ============================================================================
// Frame scanning
// ============================================================================

/// A list or map whose elements have not all arrived.
#[derive(Debug, Clone, Copy)]
struct Open {
    remaining: u32,
    is_map: bool,
    /// Between a map key and its value.
    awaiting_value: bool,
}

/// Resumable structural walk over one frame.
///
/// Frames have no outer length, so the end is found by walking kind tags,
/// lengths and counts. The walk keeps its offset and a stack of open
/// containers between calls and never builds values, so each byte is
/// inspected once however the frame is split across reads.
#[derive(Debug, Default)]
pub struct FrameScanner {
    pos: usize,
    open: Vec<Open>,
    started: bool,
    #[cfg(test)]
    tokens: usize,
}

impl FrameScanner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bytes of the current frame already walked.
    #[inline]
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Whether part of a frame has been walked.
    #[inline]
    pub fn in_progress(&self) -> bool {
        self.started
    }

    /// Forget the current frame.
    pub fn reset(&mut self) {
        self.pos = 0;
        self.open.clear();
        self.started = false;
    }

    /// Continue the walk over `buf`.
    ///
    /// `buf` starts at the frame's first byte and extends what earlier
    /// calls were given. Returns the frame length once the top-level map
    /// closes, `None` while more input is needed.
    pub fn advance(&mut self, buf: &[u8], max_len: u32) -> DecodeResult<Option<usize>> {
        if !self.started {
            let Some(count) = read_u32(buf) else {
                return Ok(None);
            };
            check_length(count, "map", max_len)?;
            self.pos = 4;
            self.started = true;
            self.open.push(Open {
                remaining: count,
                is_map: true,
                awaiting_value: false,
            });
            self.count_token();
        }

        loop {
            let depth = self.open.len().saturating_sub(1);
            let Some(top) = self.open.last_mut() else {
                return Ok(Some(self.pos));
            };
            if top.remaining == 0 {
                self.open.pop();
                continue;
            }

            let rest = &buf[self.pos..];
            if top.is_map && !top.awaiting_value {
                let Some(size) = string_extent(rest, max_len)? else {
                    return Ok(None);
                };
                top.awaiting_value = true;
                self.pos += size;
                self.count_token();
                continue;
            }

            let Some((size, child)) = value_extent(rest, depth, max_len)? else {
                return Ok(None);
            };
            top.remaining -= 1;
            top.awaiting_value = false;
            self.pos += size;
            if let Some(child) = child {
                self.open.push(child);
            }
            self.count_token();
        }
    }

    #[inline]
    fn count_token(&mut self) {
        #[cfg(test)]
        {
            self.tokens += 1;
        }
    }

    /// Headers, keys and values walked since creation.
    #[cfg(test)]
    pub(crate) fn tokens(&self) -> usize {
        self.tokens
    }
}

fn read_u32(buf: &[u8]) -> Option<u32> {
    let bytes: [u8; 4] = buf.get(..4)?.try_into().ok()?;
    Some(u32::from_be_bytes(bytes))
}

/// Size of a string body at the front of `buf`, once fully buffered.
fn string_extent(buf: &[u8], max_len: u32) -> DecodeResult<Option<usize>> {
    let Some(len) = read_u32(buf) else {
        return Ok(None);
    };
    if len == EMPTY_LENGTH {
        return Ok(Some(4));
    }
    check_length(len, "string", max_len)?;
    if len % 2 != 0 {
        return Err(DecodeError::Invalid(format!(
            "odd UTF-16 string length {}",
            len
        )));
    }
    let size = 4 + len as usize;
    Ok((buf.len() >= size).then_some(size))
}

/// Size of a tagged value at the front of `buf`. Lists and maps count only
/// their header and come back as a new open container.
fn value_extent(
    buf: &[u8],
    depth: usize,
    max_len: u32,
) -> DecodeResult<Option<(usize, Option<Open>)>> {
    if buf.len() < KIND_HEADER_SIZE {
        return Ok(None);
    }
    let tag = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]);
    let body = &buf[KIND_HEADER_SIZE..];
    let fixed = |n: usize| (body.len() >= n).then_some((KIND_HEADER_SIZE + n, None));

    match tag {
        kind::INVALID => Ok(fixed(0)),
        kind::BOOL => Ok(fixed(1)),
        kind::INT32 | kind::UINT32 => Ok(fixed(4)),
        kind::UINT64 | kind::DOUBLE => Ok(fixed(8)),
        kind::STRING => {
            Ok(string_extent(body, max_len)?.map(|n| (KIND_HEADER_SIZE + n, None)))
        }
        kind::BYTE_ARRAY => {
            let Some(len) = read_u32(body) else {
                return Ok(None);
            };
            check_length(len, "byte array", max_len)?;
            let len = if len == EMPTY_LENGTH { 0 } else { len as usize };
            Ok(fixed(4 + len))
        }
        kind::LIST | kind::MAP | kind::HASH => {
            if depth >= MAX_DEPTH {
                return Err(DecodeError::Invalid(format!(
                    "nesting deeper than {} levels",
                    MAX_DEPTH
                )));
            }
            let Some(count) = read_u32(body) else {
                return Ok(None);
            };
            let is_map = tag != kind::LIST;
            check_length(count, if is_map { "map" } else { "list" }, max_len)?;
            Ok(Some((
                KIND_HEADER_SIZE + 4,
                Some(Open {
                    remaining: count,
                    is_map,
                    awaiting_value: false,
                }),
            )))
        }
        other => Err(DecodeError::Invalid(format!("unsupported kind tag {}", other))),
    }
}
