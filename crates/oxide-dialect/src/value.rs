//! Statement arguments and column values.
//!
//! The same [`SqlValue`] type carries bound arguments into a statement and
//! column values out of a cursor, whatever the backend.

use chrono::{DateTime, NaiveDateTime, Utc};
use uuid::Uuid;

use crate::error::{DialectError, Result};
use crate::typemap::{NativeKind, NativeType};

/// A value bound to, or read from, a statement.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    /// NULL value.
    Null,
    /// Boolean value.
    Bool(bool),
    /// Integer value.
    Int(i64),
    /// Float value.
    Float(f64),
    /// Text value.
    Text(String),
    /// Binary value.
    Bytes(Vec<u8>),
    /// Point in time.
    Timestamp(DateTime<Utc>),
    /// Universally unique identifier.
    Uuid(Uuid),
}

impl SqlValue {
    /// Returns whether the value is NULL.
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Returns the native type a column holding this value would need.
    ///
    /// NULL carries no type information and classifies as `Other`.
    #[must_use]
    pub fn native_type(&self) -> NativeType {
        match self {
            Self::Null => NativeType::new(NativeKind::Other, "null"),
            Self::Bool(_) => NativeType::of::<bool>(),
            Self::Int(_) => NativeType::of::<i64>(),
            Self::Float(_) => NativeType::of::<f64>(),
            Self::Text(_) => NativeType::of::<String>(),
            Self::Bytes(_) => NativeType::of::<Vec<u8>>(),
            Self::Timestamp(_) => NativeType::of::<DateTime<Utc>>(),
            Self::Uuid(_) => NativeType::of::<Uuid>(),
        }
    }

    fn type_label(&self) -> &'static str {
        match self {
            Self::Null => "NULL",
            Self::Bool(_) => "bool",
            Self::Int(_) => "integer",
            Self::Float(_) => "float",
            Self::Text(_) => "text",
            Self::Bytes(_) => "bytes",
            Self::Timestamp(_) => "timestamp",
            Self::Uuid(_) => "uuid",
        }
    }
}

macro_rules! impl_from_int {
    ($($t:ty),*) => {
        $(
            impl From<$t> for SqlValue {
                fn from(v: $t) -> Self {
                    Self::Int(i64::from(v))
                }
            }
        )*
    };
}

impl_from_int!(i8, i16, i32, i64, u8, u16, u32);

impl From<bool> for SqlValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<f32> for SqlValue {
    fn from(v: f32) -> Self {
        Self::Float(f64::from(v))
    }
}

impl From<f64> for SqlValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<Vec<u8>> for SqlValue {
    fn from(v: Vec<u8>) -> Self {
        Self::Bytes(v)
    }
}

impl From<&[u8]> for SqlValue {
    fn from(v: &[u8]) -> Self {
        Self::Bytes(v.to_vec())
    }
}

impl From<DateTime<Utc>> for SqlValue {
    fn from(v: DateTime<Utc>) -> Self {
        Self::Timestamp(v)
    }
}

impl From<NaiveDateTime> for SqlValue {
    fn from(v: NaiveDateTime) -> Self {
        Self::Timestamp(v.and_utc())
    }
}

impl From<Uuid> for SqlValue {
    fn from(v: Uuid) -> Self {
        Self::Uuid(v)
    }
}

impl<T: Into<Self>> From<Option<T>> for SqlValue {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}

/// Conversion from a column value into a Rust type.
pub trait FromSqlValue: Sized {
    /// Converts the value found in column `column`.
    fn from_sql_value(value: &SqlValue, column: usize) -> Result<Self>;
}

fn mismatch<T>(value: &SqlValue, column: usize, wanted: &str) -> Result<T> {
    Err(DialectError::decode(
        column,
        format!("expected {wanted}, found {}", value.type_label()),
    ))
}

impl FromSqlValue for SqlValue {
    fn from_sql_value(value: &SqlValue, _column: usize) -> Result<Self> {
        Ok(value.clone())
    }
}

impl FromSqlValue for bool {
    fn from_sql_value(value: &SqlValue, column: usize) -> Result<Self> {
        match value {
            SqlValue::Bool(b) => Ok(*b),
            // SQLite and MySQL store booleans as integers
            SqlValue::Int(0) => Ok(false),
            SqlValue::Int(1) => Ok(true),
            other => mismatch(other, column, "bool"),
        }
    }
}

impl FromSqlValue for i64 {
    fn from_sql_value(value: &SqlValue, column: usize) -> Result<Self> {
        match value {
            SqlValue::Int(n) => Ok(*n),
            other => mismatch(other, column, "integer"),
        }
    }
}

macro_rules! impl_from_sql_narrow_int {
    ($($t:ty),*) => {
        $(
            impl FromSqlValue for $t {
                fn from_sql_value(value: &SqlValue, column: usize) -> Result<Self> {
                    let wide = i64::from_sql_value(value, column)?;
                    <$t>::try_from(wide).map_err(|_| {
                        DialectError::decode(
                            column,
                            format!("{wide} out of range for {}", stringify!($t)),
                        )
                    })
                }
            }
        )*
    };
}

impl_from_sql_narrow_int!(i32, i16, u32, u64, usize);

impl FromSqlValue for f64 {
    fn from_sql_value(value: &SqlValue, column: usize) -> Result<Self> {
        match value {
            SqlValue::Float(f) => Ok(*f),
            #[allow(clippy::cast_precision_loss)]
            SqlValue::Int(n) => Ok(*n as f64),
            other => mismatch(other, column, "float"),
        }
    }
}

impl FromSqlValue for String {
    fn from_sql_value(value: &SqlValue, column: usize) -> Result<Self> {
        match value {
            SqlValue::Text(s) => Ok(s.clone()),
            other => mismatch(other, column, "text"),
        }
    }
}

impl FromSqlValue for Vec<u8> {
    fn from_sql_value(value: &SqlValue, column: usize) -> Result<Self> {
        match value {
            SqlValue::Bytes(b) => Ok(b.clone()),
            other => mismatch(other, column, "bytes"),
        }
    }
}

impl FromSqlValue for DateTime<Utc> {
    fn from_sql_value(value: &SqlValue, column: usize) -> Result<Self> {
        match value {
            SqlValue::Timestamp(ts) => Ok(*ts),
            SqlValue::Text(s) => DateTime::parse_from_rfc3339(s)
                .map(|dt| dt.with_timezone(&Utc))
                .or_else(|_| {
                    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").map(|dt| dt.and_utc())
                })
                .map_err(|e| DialectError::decode(column, e.to_string())),
            other => mismatch(other, column, "timestamp"),
        }
    }
}

impl FromSqlValue for Uuid {
    fn from_sql_value(value: &SqlValue, column: usize) -> Result<Self> {
        match value {
            SqlValue::Uuid(u) => Ok(*u),
            SqlValue::Text(s) => {
                Uuid::parse_str(s).map_err(|e| DialectError::decode(column, e.to_string()))
            }
            other => mismatch(other, column, "uuid"),
        }
    }
}

impl<T: FromSqlValue> FromSqlValue for Option<T> {
    fn from_sql_value(value: &SqlValue, column: usize) -> Result<Self> {
        if value.is_null() {
            Ok(None)
        } else {
            T::from_sql_value(value, column).map(Some)
        }
    }
}

/// Conversion from a whole row into a Rust type, usually a tuple.
pub trait FromRow: Sized {
    /// Converts the row values.
    fn from_row(values: &[SqlValue]) -> Result<Self>;
}

macro_rules! impl_from_row_tuple {
    ($len:expr; $($idx:tt => $t:ident),+) => {
        impl<$($t: FromSqlValue),+> FromRow for ($($t,)+) {
            fn from_row(values: &[SqlValue]) -> Result<Self> {
                if values.len() < $len {
                    return Err(DialectError::decode(
                        values.len(),
                        format!("row has {} columns, expected {}", values.len(), $len),
                    ));
                }
                Ok(($($t::from_sql_value(&values[$idx], $idx)?,)+))
            }
        }
    };
}

impl_from_row_tuple!(1; 0 => A);
impl_from_row_tuple!(2; 0 => A, 1 => B);
impl_from_row_tuple!(3; 0 => A, 1 => B, 2 => C);
impl_from_row_tuple!(4; 0 => A, 1 => B, 2 => C, 3 => D);

impl FromRow for Vec<SqlValue> {
    fn from_row(values: &[SqlValue]) -> Result<Self> {
        Ok(values.to_vec())
    }
}
