//! Element data types.

use std::fmt;

/// The element type of an [`crate::NdArray`].
///
/// Arrays hold their values as `f64` internally; the data type decides how
/// values are normalized on construction and how wide each element is on
/// the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataType {
    Float32,
    Float64,
    Int8,
    Uint8,
    Int32,
    Int64,
    Boolean,
}

impl DataType {
    /// Width of one element in the binary encoding.
    pub fn size_bytes(self) -> usize {
        match self {
            DataType::Float32 | DataType::Int32 => 4,
            DataType::Float64 | DataType::Int64 => 8,
            DataType::Int8 | DataType::Uint8 | DataType::Boolean => 1,
        }
    }

    /// Stable one-byte code used by the binary encoding.
    pub fn code(self) -> u8 {
        match self {
            DataType::Float32 => 0,
            DataType::Float64 => 1,
            DataType::Int8 => 2,
            DataType::Uint8 => 3,
            DataType::Int32 => 4,
            DataType::Int64 => 5,
            DataType::Boolean => 6,
        }
    }

    /// Inverse of [`DataType::code`].
    pub fn from_code(code: u8) -> Option<Self> {
        Some(match code {
            0 => DataType::Float32,
            1 => DataType::Float64,
            2 => DataType::Int8,
            3 => DataType::Uint8,
            4 => DataType::Int32,
            5 => DataType::Int64,
            6 => DataType::Boolean,
            _ => return None,
        })
    }

    pub fn is_floating(self) -> bool {
        matches!(self, DataType::Float32 | DataType::Float64)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DataType::Float32 => "float32",
            DataType::Float64 => "float64",
            DataType::Int8 => "int8",
            DataType::Uint8 => "uint8",
            DataType::Int32 => "int32",
            DataType::Int64 => "int64",
            DataType::Boolean => "boolean",
        }
    }

    /// Bring a raw value into the representable range of this type.
    ///
    /// Integer types truncate toward zero and wrap like a native cast;
    /// Boolean maps every non-zero value (including NaN) to 1.
    pub fn normalize(self, value: f64) -> f64 {
        match self {
            DataType::Float32 => value as f32 as f64,
            DataType::Float64 => value,
            DataType::Int8 => value as i64 as i8 as f64,
            DataType::Uint8 => value as i64 as u8 as f64,
            DataType::Int32 => value as i64 as i32 as f64,
            DataType::Int64 => value as i64 as f64,
            DataType::Boolean => {
                if value != 0.0 {
                    1.0
                } else {
                    0.0
                }
            }
        }
    }

    /// The type both operands of a mixed binary operation are lifted to.
    pub fn promote(self, other: DataType) -> DataType {
        if self == other {
            return self;
        }
        if self.rank() >= other.rank() {
            self
        } else {
            other
        }
    }

    fn rank(self) -> u8 {
        match self {
            DataType::Boolean => 0,
            DataType::Uint8 => 1,
            DataType::Int8 => 2,
            DataType::Int32 => 3,
            DataType::Int64 => 4,
            DataType::Float32 => 5,
            DataType::Float64 => 6,
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_round_trip() {
        for dtype in [
            DataType::Float32,
            DataType::Float64,
            DataType::Int8,
            DataType::Uint8,
            DataType::Int32,
            DataType::Int64,
            DataType::Boolean,
        ] {
            assert_eq!(DataType::from_code(dtype.code()), Some(dtype));
        }
        assert_eq!(DataType::from_code(42), None);
    }

    #[test]
    fn normalize_per_type() {
        assert_eq!(DataType::Int32.normalize(3.7), 3.0);
        assert_eq!(DataType::Int32.normalize(-3.7), -3.0);
        assert_eq!(DataType::Uint8.normalize(256.0), 0.0);
        assert_eq!(DataType::Boolean.normalize(-2.0), 1.0);
        assert_eq!(DataType::Boolean.normalize(0.0), 0.0);
        assert!(DataType::Float32.normalize(f64::NAN).is_nan());
        assert_eq!(DataType::Float32.normalize(0.1), 0.1f32 as f64);
    }

    #[test]
    fn promotion_prefers_wider_type() {
        assert_eq!(DataType::Int32.promote(DataType::Float32), DataType::Float32);
        assert_eq!(DataType::Float64.promote(DataType::Float32), DataType::Float64);
        assert_eq!(DataType::Boolean.promote(DataType::Int8), DataType::Int8);
        assert_eq!(DataType::Int64.promote(DataType::Int64), DataType::Int64);
    }
}
