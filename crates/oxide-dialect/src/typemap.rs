//! Native type descriptors consumed by [`Dialect::sql_tag`].
//!
//! Native types are classified into a closed [`NativeKind`] at the call
//! boundary, so every dialect's type mapper is a plain `match` over a known
//! enumeration. Kinds a dialect cannot store are rejected with
//! [`DialectError::UnsupportedType`].
//!
//! [`Dialect::sql_tag`]: crate::dialect::Dialect::sql_tag

use std::borrow::Cow;
use std::fmt;

use chrono::{DateTime, NaiveDateTime, Utc};
use tracing::error;
use uuid::Uuid;

use crate::error::DialectError;

/// Largest sized field width used by the relational type mappers.
pub const MAX_FIELD_WIDTH: usize = 65532;

/// Semantic kind of a native value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[deny(missing_docs)]
pub enum NativeKind {
    /// `bool`.
    Bool,
    /// `i8`.
    Int8,
    /// `i16`.
    Int16,
    /// `i32`.
    Int32,
    /// Pointer-sized signed integer.
    Int,
    /// `u8`.
    Uint8,
    /// `u16`.
    Uint16,
    /// `u32`.
    Uint32,
    /// Pointer-sized unsigned integer.
    Uint,
    /// Unsigned integer wide enough to hold an address.
    Uintptr,
    /// `i64`, the kind auto-increment keys usually take.
    Int64,
    /// `u64`.
    Uint64,
    /// Single-precision float.
    Float32,
    /// Double-precision float.
    Float64,
    /// UTF-8 text; the declared size bounds its column width.
    String,
    /// A composite carrying a point in time.
    Timestamp,
    /// Raw byte sequence.
    Bytes,
    /// Universally unique identifier.
    Uuid,
    /// Any other composite value.
    Struct,
    /// A sequence of values other than bytes.
    Slice,
    /// A key-value collection.
    Map,
    /// Anything the classifier does not recognize.
    Other,
}

impl NativeKind {
    /// Returns a lowercase name for the kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Bool => "bool",
            Self::Int8 => "int8",
            Self::Int16 => "int16",
            Self::Int32 => "int32",
            Self::Int => "int",
            Self::Uint8 => "uint8",
            Self::Uint16 => "uint16",
            Self::Uint32 => "uint32",
            Self::Uint => "uint",
            Self::Uintptr => "uintptr",
            Self::Int64 => "int64",
            Self::Uint64 => "uint64",
            Self::Float32 => "float32",
            Self::Float64 => "float64",
            Self::String => "string",
            Self::Timestamp => "timestamp",
            Self::Bytes => "bytes",
            Self::Uuid => "uuid",
            Self::Struct => "struct",
            Self::Slice => "slice",
            Self::Map => "map",
            Self::Other => "other",
        }
    }

    /// Parses the name returned by [`NativeKind::as_str`].
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        const ALL: [NativeKind; 22] = [
            NativeKind::Bool,
            NativeKind::Int8,
            NativeKind::Int16,
            NativeKind::Int32,
            NativeKind::Int,
            NativeKind::Uint8,
            NativeKind::Uint16,
            NativeKind::Uint32,
            NativeKind::Uint,
            NativeKind::Uintptr,
            NativeKind::Int64,
            NativeKind::Uint64,
            NativeKind::Float32,
            NativeKind::Float64,
            NativeKind::String,
            NativeKind::Timestamp,
            NativeKind::Bytes,
            NativeKind::Uuid,
            NativeKind::Struct,
            NativeKind::Slice,
            NativeKind::Map,
            NativeKind::Other,
        ];
        let name = name.to_ascii_lowercase();
        ALL.into_iter().find(|k| k.as_str() == name)
    }
}

impl fmt::Display for NativeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A classified native type: its kind and a human-readable type name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NativeType {
    /// Semantic kind.
    pub kind: NativeKind,
    /// Type name, reported when the kind cannot be mapped.
    pub name: Cow<'static, str>,
}

impl NativeType {
    /// Creates a descriptor from an explicit kind and name.
    pub fn new(kind: NativeKind, name: impl Into<Cow<'static, str>>) -> Self {
        Self {
            kind,
            name: name.into(),
        }
    }

    /// Classifies a Rust type.
    #[must_use]
    pub fn of<T: HasNativeKind + ?Sized>() -> Self {
        Self::new(T::KIND, std::any::type_name::<T>())
    }

    /// Builds the classification error a dialect returns for this type.
    #[must_use]
    pub fn unsupported(&self, dialect: &'static str) -> DialectError {
        error!(
            dialect,
            kind = self.kind.as_str(),
            type_name = %self.name,
            "Native type has no column type"
        );
        DialectError::UnsupportedType {
            dialect,
            kind: self.kind.as_str(),
            type_name: self.name.to_string(),
        }
    }
}

/// Rust types with a fixed native kind.
pub trait HasNativeKind {
    /// Kind of this type.
    const KIND: NativeKind;
}

macro_rules! native_kind {
    ($($t:ty => $kind:ident),* $(,)?) => {
        $(
            impl HasNativeKind for $t {
                const KIND: NativeKind = NativeKind::$kind;
            }
        )*
    };
}

native_kind! {
    bool => Bool,
    i8 => Int8,
    i16 => Int16,
    i32 => Int32,
    isize => Int,
    u8 => Uint8,
    u16 => Uint16,
    u32 => Uint32,
    usize => Uint,
    i64 => Int64,
    u64 => Uint64,
    f32 => Float32,
    f64 => Float64,
    String => String,
    str => String,
    DateTime<Utc> => Timestamp,
    NaiveDateTime => Timestamp,
    Vec<u8> => Bytes,
    [u8] => Bytes,
    Uuid => Uuid,
}

impl<T: HasNativeKind> HasNativeKind for Option<T> {
    const KIND: NativeKind = T::KIND;
}

impl<T: HasNativeKind + ?Sized> HasNativeKind for &T {
    const KIND: NativeKind = T::KIND;
}

/// Formats a sized column type, clamping to [`MAX_FIELD_WIDTH`].
///
/// Returns `None` when no positive size below the maximum was declared.
#[must_use]
pub(crate) fn sized(base: &str, size: usize) -> Option<String> {
    (size > 0 && size < MAX_FIELD_WIDTH).then(|| format!("{base}({size})"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_native_type_of() {
        assert_eq!(NativeType::of::<u16>().kind, NativeKind::Uint16);
        assert_eq!(NativeType::of::<Option<i64>>().kind, NativeKind::Int64);
        assert_eq!(NativeType::of::<&str>().kind, NativeKind::String);
        assert_eq!(NativeType::of::<Vec<u8>>().kind, NativeKind::Bytes);
        assert_eq!(NativeType::of::<NaiveDateTime>().kind, NativeKind::Timestamp);
        assert!(NativeType::of::<Uuid>().name.contains("Uuid"));
    }

    #[test]
    fn test_kind_parse() {
        assert_eq!(NativeKind::parse("int64"), Some(NativeKind::Int64));
        assert_eq!(NativeKind::parse("UUID"), Some(NativeKind::Uuid));
        assert_eq!(NativeKind::parse("decimal"), None);
    }

    #[test]
    fn test_every_kind_parses_from_its_name() {
        let names = [
            "bool", "int8", "int16", "int32", "int", "uint8", "uint16", "uint32", "uint",
            "uintptr", "int64", "uint64", "float32", "float64", "string", "timestamp", "bytes",
            "uuid", "struct", "slice", "map", "other",
        ];
        for name in names {
            let kind = NativeKind::parse(name).unwrap();
            assert_eq!(kind.as_str(), name);
            assert_eq!(kind.to_string(), name);
        }
    }

    #[test]
    fn test_unsupported_names_type() {
        let ty = NativeType::new(NativeKind::Map, std::any::type_name::<HashMap<String, i64>>());
        let err = ty.unsupported("cassandra");
        assert!(err.is_fatal());
        assert!(err.to_string().contains("(map) for cassandra"));
    }

    #[test]
    fn test_sized_clamp() {
        assert_eq!(sized("VARCHAR", 255).as_deref(), Some("VARCHAR(255)"));
        assert_eq!(sized("VARCHAR", 0), None);
        assert_eq!(sized("VARCHAR", MAX_FIELD_WIDTH), None);
    }
}
