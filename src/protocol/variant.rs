//! Dynamically typed wire values.
//!
//! [`Variant`] is the closed set of values the server understands. Every
//! request and response is a [`VariantMap`] whose values are variants.
//!
//! # Example
//!
//! ```
//! use surrender_client::protocol::{Variant, VariantMap};
//!
//! let mut params = VariantMap::new();
//! params.insert("object_name".into(), "camera".into());
//! params.insert("pos".into(), Variant::from([0.0, 0.0, -10.0]));
//! params.insert("width".into(), 640u32.into());
//!
//! assert_eq!(params["width"], Variant::Int32(640));
//! ```

use std::fmt;

use bytes::Bytes;
use indexmap::IndexMap;

use super::wire_format::kind;
use crate::error::{Result, SurrenderError};

/// String-keyed map of variants.
///
/// Insertion order is kept for readable encoding but carries no meaning on
/// the wire; equality ignores it.
pub type VariantMap = IndexMap<String, Variant>;

/// A single tagged value.
#[derive(Debug, Clone, Default)]
pub enum Variant {
    /// Empty or absent value.
    #[default]
    Invalid,
    Bool(bool),
    Int32(i32),
    UInt32(u32),
    UInt64(u64),
    /// IEEE-754 double. There is no single-precision kind on the wire.
    Double(f64),
    String(String),
    ByteArray(Bytes),
    List(Vec<Variant>),
    Map(VariantMap),
}

impl Variant {
    /// Build an integer variant using the narrowest wire kind that holds `value`.
    ///
    /// Negative values below `i32::MIN` have no wire representation.
    pub fn int(value: i64) -> Result<Self> {
        if let Ok(v) = i32::try_from(value) {
            return Ok(Variant::Int32(v));
        }
        match u64::try_from(value) {
            Ok(v) => Ok(Variant::from(v)),
            Err(_) => Err(SurrenderError::Unencodable(format!(
                "integer {} is below the signed 32-bit range",
                value
            ))),
        }
    }

    /// Build a byte array variant.
    pub fn bytes(data: impl Into<Bytes>) -> Self {
        Variant::ByteArray(data.into())
    }

    /// Build a list from anything convertible to variants.
    pub fn list<I, T>(items: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<Variant>,
    {
        Variant::List(items.into_iter().map(Into::into).collect())
    }

    /// Wire kind tag for this value.
    ///
    /// Maps are tagged as `Hash`, matching what the server itself emits.
    pub fn kind(&self) -> u32 {
        match self {
            Variant::Invalid => kind::INVALID,
            Variant::Bool(_) => kind::BOOL,
            Variant::Int32(_) => kind::INT32,
            Variant::UInt32(_) => kind::UINT32,
            Variant::UInt64(_) => kind::UINT64,
            Variant::Double(_) => kind::DOUBLE,
            Variant::String(_) => kind::STRING,
            Variant::ByteArray(_) => kind::BYTE_ARRAY,
            Variant::List(_) => kind::LIST,
            Variant::Map(_) => kind::HASH,
        }
    }

    /// Human-readable kind name, used in error messages.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Variant::Invalid => "invalid",
            Variant::Bool(_) => "bool",
            Variant::Int32(_) => "int32",
            Variant::UInt32(_) => "uint32",
            Variant::UInt64(_) => "uint64",
            Variant::Double(_) => "double",
            Variant::String(_) => "string",
            Variant::ByteArray(_) => "byte array",
            Variant::List(_) => "list",
            Variant::Map(_) => "map",
        }
    }

    #[inline]
    pub fn is_invalid(&self) -> bool {
        matches!(self, Variant::Invalid)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Variant::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Any integer kind as `i64`, if it fits.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Variant::Int32(v) => Some(i64::from(*v)),
            Variant::UInt32(v) => Some(i64::from(*v)),
            Variant::UInt64(v) => i64::try_from(*v).ok(),
            _ => None,
        }
    }

    /// Any non-negative integer kind as `u64`.
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Variant::Int32(v) => u64::try_from(*v).ok(),
            Variant::UInt32(v) => Some(u64::from(*v)),
            Variant::UInt64(v) => Some(*v),
            _ => None,
        }
    }

    /// Doubles, and integers widened to `f64`.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Variant::Double(v) => Some(*v),
            Variant::Int32(v) => Some(f64::from(*v)),
            Variant::UInt32(v) => Some(f64::from(*v)),
            Variant::UInt64(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Variant::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&Bytes> {
        match self {
            Variant::ByteArray(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Variant]> {
        match self {
            Variant::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&VariantMap> {
        match self {
            Variant::Map(map) => Some(map),
            _ => None,
        }
    }

    /// A list of numbers as a flat `f64` vector.
    pub fn to_f64_vec(&self) -> Option<Vec<f64>> {
        self.as_list()?.iter().map(Variant::as_f64).collect()
    }
}

/// Structural equality. Doubles compare by bit pattern so that NaN payloads
/// and signed zeros survive round-trip checks.
impl PartialEq for Variant {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Variant::Invalid, Variant::Invalid) => true,
            (Variant::Bool(a), Variant::Bool(b)) => a == b,
            (Variant::Int32(a), Variant::Int32(b)) => a == b,
            (Variant::UInt32(a), Variant::UInt32(b)) => a == b,
            (Variant::UInt64(a), Variant::UInt64(b)) => a == b,
            (Variant::Double(a), Variant::Double(b)) => a.to_bits() == b.to_bits(),
            (Variant::String(a), Variant::String(b)) => a == b,
            (Variant::ByteArray(a), Variant::ByteArray(b)) => a == b,
            (Variant::List(a), Variant::List(b)) => a == b,
            (Variant::Map(a), Variant::Map(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Variant::Invalid => write!(f, "<invalid>"),
            Variant::Bool(v) => write!(f, "{}", v),
            Variant::Int32(v) => write!(f, "{}", v),
            Variant::UInt32(v) => write!(f, "{}", v),
            Variant::UInt64(v) => write!(f, "{}", v),
            Variant::Double(v) => write!(f, "{}", v),
            Variant::String(v) => write!(f, "{:?}", v),
            Variant::ByteArray(v) => write!(f, "<{} bytes>", v.len()),
            Variant::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            Variant::Map(map) => {
                write!(f, "{{")?;
                for (i, (key, value)) in map.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{:?}: {}", key, value)?;
                }
                write!(f, "}}")
            }
        }
    }
}

impl From<bool> for Variant {
    fn from(v: bool) -> Self {
        Variant::Bool(v)
    }
}

impl From<i32> for Variant {
    fn from(v: i32) -> Self {
        Variant::Int32(v)
    }
}

/// Narrowest of Int32, UInt32, UInt64.
impl From<u64> for Variant {
    fn from(v: u64) -> Self {
        if let Ok(v) = i32::try_from(v) {
            Variant::Int32(v)
        } else if let Ok(v) = u32::try_from(v) {
            Variant::UInt32(v)
        } else {
            Variant::UInt64(v)
        }
    }
}

impl From<u32> for Variant {
    fn from(v: u32) -> Self {
        Variant::from(u64::from(v))
    }
}

impl From<usize> for Variant {
    fn from(v: usize) -> Self {
        Variant::from(v as u64)
    }
}

impl TryFrom<i64> for Variant {
    type Error = SurrenderError;

    fn try_from(v: i64) -> Result<Self> {
        Variant::int(v)
    }
}

impl From<f64> for Variant {
    fn from(v: f64) -> Self {
        Variant::Double(v)
    }
}

impl From<f32> for Variant {
    fn from(v: f32) -> Self {
        Variant::Double(f64::from(v))
    }
}

impl From<&str> for Variant {
    fn from(v: &str) -> Self {
        Variant::String(v.to_owned())
    }
}

impl From<String> for Variant {
    fn from(v: String) -> Self {
        Variant::String(v)
    }
}

impl From<&String> for Variant {
    fn from(v: &String) -> Self {
        Variant::String(v.clone())
    }
}

impl From<Bytes> for Variant {
    fn from(v: Bytes) -> Self {
        Variant::ByteArray(v)
    }
}

impl From<Vec<Variant>> for Variant {
    fn from(v: Vec<Variant>) -> Self {
        Variant::List(v)
    }
}

impl From<VariantMap> for Variant {
    fn from(v: VariantMap) -> Self {
        Variant::Map(v)
    }
}

impl From<&[f64]> for Variant {
    fn from(v: &[f64]) -> Self {
        Variant::List(v.iter().copied().map(Variant::Double).collect())
    }
}

impl<const N: usize> From<[f64; N]> for Variant {
    fn from(v: [f64; N]) -> Self {
        Variant::from(&v[..])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integer_width_selection() {
        assert_eq!(Variant::from(2_147_483_647u64), Variant::Int32(i32::MAX));
        assert_eq!(
            Variant::from(2_147_483_648u64),
            Variant::UInt32(2_147_483_648)
        );
        assert_eq!(
            Variant::from(4_294_967_296u64),
            Variant::UInt64(4_294_967_296)
        );
        assert_eq!(Variant::int(-1).unwrap(), Variant::Int32(-1));
        assert_eq!(Variant::from(5u32), Variant::Int32(5));
        assert_eq!(Variant::from(3_000_000_000u32), Variant::UInt32(3_000_000_000));
    }

    #[test]
    fn test_int_below_i32_range_is_rejected() {
        let result = Variant::int(i64::from(i32::MIN) - 1);
        assert!(matches!(result, Err(SurrenderError::Unencodable(_))));
        assert_eq!(Variant::int(i64::from(i32::MIN)).unwrap(), Variant::Int32(i32::MIN));
    }

    #[test]
    fn test_floats_are_doubles() {
        assert_eq!(Variant::from(1.5f32), Variant::Double(1.5));
        assert_eq!(Variant::from(2.25f64).kind(), kind::DOUBLE);
    }

    #[test]
    fn test_nan_equality_is_bitwise() {
        assert_eq!(Variant::Double(f64::NAN), Variant::Double(f64::NAN));
        assert_ne!(Variant::Double(0.0), Variant::Double(-0.0));
    }

    #[test]
    fn test_map_equality_ignores_order() {
        let mut a = VariantMap::new();
        a.insert("x".into(), 1.into());
        a.insert("y".into(), 2.into());
        let mut b = VariantMap::new();
        b.insert("y".into(), 2.into());
        b.insert("x".into(), 1.into());
        assert_eq!(Variant::Map(a), Variant::Map(b));
    }

    #[test]
    fn test_accessors() {
        assert_eq!(Variant::UInt32(7).as_i64(), Some(7));
        assert_eq!(Variant::UInt64(u64::MAX).as_i64(), None);
        assert_eq!(Variant::Int32(-3).as_u64(), None);
        assert_eq!(Variant::Int32(4).as_f64(), Some(4.0));
        assert_eq!(Variant::from("abc").as_str(), Some("abc"));
        assert_eq!(Variant::Bool(true).as_bool(), Some(true));
        assert_eq!(
            Variant::from([1.0, 2.0, 3.0]).to_f64_vec(),
            Some(vec![1.0, 2.0, 3.0])
        );
        assert_eq!(Variant::list([1, 2]).to_f64_vec(), Some(vec![1.0, 2.0]));
        assert_eq!(Variant::list(["a"]).to_f64_vec(), None);
    }

    #[test]
    fn test_maps_use_hash_tag() {
        assert_eq!(Variant::Map(VariantMap::new()).kind(), kind::HASH);
    }

    #[test]
    fn test_display() {
        let v = Variant::list([Variant::from("a"), Variant::from(1), Variant::bytes(vec![0u8; 3])]);
        assert_eq!(v.to_string(), "[\"a\", 1, <3 bytes>]");
    }
}
