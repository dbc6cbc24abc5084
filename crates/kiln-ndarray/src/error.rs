//! Array error types.

use std::io;

use crate::dtype::DataType;
use crate::shape::Shape;

/// Errors that can occur during array construction, comparison or encoding.
#[derive(Debug, thiserror::Error)]
pub enum NdArrayError {
    /// Two shapes do not broadcast to a common shape.
    #[error("incompatible shapes for {op}: {lhs} vs {rhs}")]
    ShapeMismatch {
        op: &'static str,
        lhs: Shape,
        rhs: Shape,
    },

    /// The element buffer does not hold exactly one value per shape element.
    #[error("buffer holds {actual} elements but shape {shape} needs {expected}")]
    BufferSizeMismatch {
        shape: Shape,
        expected: usize,
        actual: usize,
    },

    /// A reshape asked for a different element count.
    #[error("cannot reshape {from} into {to}")]
    InvalidReshape { from: Shape, to: Shape },

    /// The operation needs a Boolean condition array.
    #[error("expected a boolean condition array, got {dtype}")]
    NotBoolean { dtype: DataType },

    /// Encoded data does not start with the array magic bytes.
    #[error("invalid magic bytes: expected NDAR")]
    InvalidMagic,

    /// Encoded data carries an encoding version this build cannot read.
    #[error("unsupported array encoding version {version}")]
    UnsupportedVersion { version: u8 },

    /// Encoded data names an unknown element type.
    #[error("unknown data type code {code}")]
    UnknownDataType { code: u8 },

    /// Encoded header describes an array that cannot exist.
    #[error("malformed array header: {detail}")]
    MalformedHeader { detail: String },

    /// I/O error while encoding or decoding.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Result type alias for array operations.
pub type Result<T> = std::result::Result<T, NdArrayError>;
