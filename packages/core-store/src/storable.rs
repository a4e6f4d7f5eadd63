//! Types that can be stored directly in a container.

use crate::{Error, Result, Value};

/// A type with a natural storable representation.
///
/// `Storable` is the bridge between primitive Rust types and [`Value`].
/// Reading is checked: a stored value of the wrong shape yields
/// [`Error::TypeMismatch`], an integer that does not fit yields
/// [`Error::OutOfRange`].
pub trait Storable: Sized + Send + 'static {
    /// Convert into the stored representation.
    fn into_value(self) -> Value;

    /// Recover from the stored representation.
    fn from_value(value: Value) -> Result<Self>;
}

fn mismatch(expected: &'static str, found: &Value) -> Error {
    Error::TypeMismatch {
        expected,
        found: found.kind(),
    }
}

impl Storable for Value {
    fn into_value(self) -> Value {
        self
    }

    fn from_value(value: Value) -> Result<Self> {
        Ok(value)
    }
}

impl Storable for bool {
    fn into_value(self) -> Value {
        Value::Bool(self)
    }

    fn from_value(value: Value) -> Result<Self> {
        value.as_bool().ok_or_else(|| mismatch("bool", &value))
    }
}

impl Storable for i64 {
    fn into_value(self) -> Value {
        Value::Integer(self)
    }

    fn from_value(value: Value) -> Result<Self> {
        value.as_i64().ok_or_else(|| mismatch("integer", &value))
    }
}

macro_rules! narrow_integer {
    ($($ty:ty),*) => {
        $(
            impl Storable for $ty {
                fn into_value(self) -> Value {
                    Value::Integer(self as i64)
                }

                fn from_value(value: Value) -> Result<Self> {
                    let wide = value.as_i64().ok_or_else(|| mismatch("integer", &value))?;
                    <$ty>::try_from(wide).map_err(|_| Error::OutOfRange {
                        value: wide,
                        target: stringify!($ty),
                    })
                }
            }
        )*
    };
}

narrow_integer!(i8, i16, i32, u8, u16, u32);

impl Storable for u64 {
    fn into_value(self) -> Value {
        // Values above i64::MAX are stored as strings rather than wrapping.
        match i64::try_from(self) {
            Ok(i) => Value::Integer(i),
            Err(_) => Value::String(self.to_string()),
        }
    }

    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Integer(i) => u64::try_from(i).map_err(|_| Error::OutOfRange {
                value: i,
                target: "u64",
            }),
            Value::String(ref s) => s.parse().map_err(|_| mismatch("integer", &value)),
            other => Err(mismatch("integer", &other)),
        }
    }
}

impl Storable for f64 {
    fn into_value(self) -> Value {
        Value::Float(self)
    }

    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Float(f) => Ok(f),
            Value::Integer(i) => Ok(i as f64),
            other => Err(mismatch("float", &other)),
        }
    }
}

impl Storable for String {
    fn into_value(self) -> Value {
        Value::String(self)
    }

    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::String(s) => Ok(s),
            other => Err(mismatch("string", &other)),
        }
    }
}

impl Storable for Vec<u8> {
    fn into_value(self) -> Value {
        Value::Bytes(self)
    }

    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Bytes(b) => Ok(b),
            other => Err(mismatch("bytes", &other)),
        }
    }
}
