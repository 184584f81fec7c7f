//! Typed wrappers for server commands.
//!
//! Each wrapper builds a command map with the server's field names, runs it
//! through the session, and extracts typed values from the response.
//! Commands that return nothing go through [`Session::exec`] and honor async
//! mode. Anything returning data always waits.
//!
//! Commands without a wrapper are reachable through [`Session::call`] and
//! [`Session::send`].
//!
//! [`Session::exec`]: crate::Session::exec
//! [`Session::call`]: crate::Session::call
//! [`Session::send`]: crate::Session::send

mod camera;
mod images;
mod resources;
mod scene;

use crate::error::{Result, SurrenderError};
use crate::protocol::{command_name, Variant, VariantMap};

/// Typed access to response fields.
///
/// Errors name the command the response belongs to.
pub trait ResponseFields {
    /// The raw value of `name`.
    fn field(&self, name: &str) -> Result<&Variant>;

    fn f64_field(&self, name: &str) -> Result<f64> {
        self.field(name)?
            .as_f64()
            .ok_or_else(|| unexpected(name, "a number"))
    }

    fn i64_field(&self, name: &str) -> Result<i64> {
        self.field(name)?
            .as_i64()
            .ok_or_else(|| unexpected(name, "an integer"))
    }

    /// A non-negative integer that fits `usize`, e.g. an image dimension.
    fn usize_field(&self, name: &str) -> Result<usize> {
        self.field(name)?
            .as_u64()
            .and_then(|v| usize::try_from(v).ok())
            .ok_or_else(|| unexpected(name, "a non-negative integer"))
    }

    fn bool_field(&self, name: &str) -> Result<bool> {
        self.field(name)?
            .as_bool()
            .ok_or_else(|| unexpected(name, "a boolean"))
    }

    fn str_field(&self, name: &str) -> Result<&str> {
        self.field(name)?
            .as_str()
            .ok_or_else(|| unexpected(name, "a string"))
    }

    fn bytes_field(&self, name: &str) -> Result<&[u8]> {
        self.field(name)?
            .as_bytes()
            .map(|b| &b[..])
            .ok_or_else(|| unexpected(name, "a byte array"))
    }

    fn f64_vec_field(&self, name: &str) -> Result<Vec<f64>> {
        self.field(name)?
            .to_f64_vec()
            .ok_or_else(|| unexpected(name, "a list of numbers"))
    }
}

impl ResponseFields for VariantMap {
    fn field(&self, name: &str) -> Result<&Variant> {
        self.get(name).ok_or_else(|| SurrenderError::MissingField {
            command: command_name(self).unwrap_or_default().to_string(),
            field: name.to_string(),
        })
    }
}

fn unexpected(field: &str, expected: &'static str) -> SurrenderError {
    SurrenderError::UnexpectedType {
        field: field.to_string(),
        expected,
    }
}

/// Build a parameter map from `(field, value)` pairs.
fn params<const N: usize>(fields: [(&str, Variant); N]) -> VariantMap {
    fields
        .into_iter()
        .map(|(key, value)| (key.to_string(), value))
        .collect()
}

/// A fixed-size vector field.
fn fixed<const N: usize>(response: &VariantMap, name: &str) -> Result<[f64; N]> {
    let values = response.f64_vec_field(name)?;
    <[f64; N]>::try_from(values)
        .map_err(|_| unexpected(name, "a list of the expected length"))
}


#[cfg(test)]
mod tests {
    use super::*;

    fn response() -> VariantMap {
        params([
            ("", Variant::from("getImageSize")),
            ("size", Variant::list([640, 480])),
            ("name", Variant::from("camera")),
            ("on", Variant::Bool(true)),
            ("w", Variant::Int32(-3)),
        ])
    }

    #[test]
    fn test_missing_field_names_command() {
        let err = response().f64_field("fov").unwrap_err();
        assert_eq!(
            err.to_string(),
            "Response to 'getImageSize' has no field 'fov'"
        );
    }

    #[test]
    fn test_typed_fields() {
        let response = response();
        assert_eq!(response.f64_vec_field("size").unwrap(), vec![640.0, 480.0]);
        assert_eq!(response.str_field("name").unwrap(), "camera");
        assert!(response.bool_field("on").unwrap());
        assert_eq!(response.i64_field("w").unwrap(), -3);
        assert_eq!(fixed::<2>(&response, "size").unwrap(), [640.0, 480.0]);
    }

    #[test]
    fn test_type_mismatches() {
        let response = response();
        assert!(matches!(
            response.usize_field("w"),
            Err(SurrenderError::UnexpectedType { .. })
        ));
        assert!(matches!(
            response.bool_field("name"),
            Err(SurrenderError::UnexpectedType { .. })
        ));
        assert!(matches!(
            fixed::<3>(&response, "size"),
            Err(SurrenderError::UnexpectedType { .. })
        ));
    }
}
