//! Self-delimiting binary array encoding.
//!
//! ```text
//! ┌──────────────────────────────┐
//! │ Magic: "NDAR"                │  4 bytes
//! │ Version                      │  1 byte
//! │ Data type code               │  1 byte
//! │ Rank                         │  u32 LE
//! │ Dimensions                   │  rank × u64 LE
//! ├──────────────────────────────┤
//! │ Elements (row-major)         │  size × dtype width, LE
//! └──────────────────────────────┘
//! ```
//!
//! The element count follows from the dimensions, so a reader consumes
//! exactly one array and leaves the stream positioned after it. Several
//! encodings can be concatenated without length prefixes.

use std::io::{Read, Write};

use crate::array::NdArray;
use crate::dtype::DataType;
use crate::error::{NdArrayError, Result};
use crate::shape::Shape;

/// Magic bytes identifying an encoded array.
pub const MAGIC: [u8; 4] = *b"NDAR";

/// The current encoding version.
pub const VERSION: u8 = 1;

/// Highest rank a decoder accepts.
pub const MAX_RANK: usize = 32;

/// Elements reserved up front while decoding; larger arrays grow as their
/// bytes arrive.
const PREALLOC_ELEMENTS: usize = 1 << 16;

impl NdArray {
    /// Write this array to `writer`.
    pub fn encode<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_all(&MAGIC)?;
        writer.write_all(&[VERSION, self.dtype().code()])?;
        writer.write_all(&(self.shape().rank() as u32).to_le_bytes())?;
        for &dim in self.shape().dims() {
            writer.write_all(&(dim as u64).to_le_bytes())?;
        }
        let dtype = self.dtype();
        for &value in self.as_slice() {
            write_element(writer, dtype, value)?;
        }
        Ok(())
    }

    /// Encode into a fresh byte vector.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        self.encode(&mut buf)?;
        Ok(buf)
    }

    /// Read exactly one array from `reader`.
    pub fn decode<R: Read>(reader: &mut R) -> Result<Self> {
        let mut magic = [0u8; 4];
        reader.read_exact(&mut magic)?;
        if magic != MAGIC {
            return Err(NdArrayError::InvalidMagic);
        }

        let mut head = [0u8; 2];
        reader.read_exact(&mut head)?;
        if head[0] != VERSION {
            return Err(NdArrayError::UnsupportedVersion { version: head[0] });
        }
        let dtype =
            DataType::from_code(head[1]).ok_or(NdArrayError::UnknownDataType { code: head[1] })?;

        let rank = read_u32(reader)? as usize;
        if rank > MAX_RANK {
            return Err(NdArrayError::MalformedHeader {
                detail: format!("rank {rank} exceeds {MAX_RANK}"),
            });
        }
        let mut dims = Vec::with_capacity(rank);
        for _ in 0..rank {
            let dim = read_u64(reader)?;
            let dim = usize::try_from(dim).map_err(|_| NdArrayError::MalformedHeader {
                detail: format!("dimension {dim} does not fit in memory"),
            })?;
            dims.push(dim);
        }
        let shape = Shape::new(dims);

        let size = shape
            .checked_size()
            .filter(|&n| n.checked_mul(dtype.size_bytes()).is_some())
            .ok_or_else(|| NdArrayError::MalformedHeader {
                detail: format!("element count of {shape} overflows"),
            })?;
        let mut data = Vec::with_capacity(size.min(PREALLOC_ELEMENTS));
        for _ in 0..size {
            data.push(read_element(reader, dtype)?);
        }
        Ok(NdArray::from_parts(shape, dtype, data))
    }

    pub fn from_bytes(mut data: &[u8]) -> Result<Self> {
        Self::decode(&mut data)
    }
}

fn write_element<W: Write>(writer: &mut W, dtype: DataType, value: f64) -> Result<()> {
    match dtype {
        DataType::Float32 => writer.write_all(&(value as f32).to_le_bytes())?,
        DataType::Float64 => writer.write_all(&value.to_le_bytes())?,
        DataType::Int8 => writer.write_all(&(value as i8).to_le_bytes())?,
        DataType::Uint8 | DataType::Boolean => writer.write_all(&[value as u8])?,
        DataType::Int32 => writer.write_all(&(value as i32).to_le_bytes())?,
        DataType::Int64 => writer.write_all(&(value as i64).to_le_bytes())?,
    }
    Ok(())
}

fn read_element<R: Read>(reader: &mut R, dtype: DataType) -> Result<f64> {
    Ok(match dtype {
        DataType::Float32 => {
            let mut b = [0u8; 4];
            reader.read_exact(&mut b)?;
            f32::from_le_bytes(b) as f64
        }
        DataType::Float64 => {
            let mut b = [0u8; 8];
            reader.read_exact(&mut b)?;
            f64::from_le_bytes(b)
        }
        DataType::Int8 => {
            let mut b = [0u8; 1];
            reader.read_exact(&mut b)?;
            i8::from_le_bytes(b) as f64
        }
        DataType::Uint8 => {
            let mut b = [0u8; 1];
            reader.read_exact(&mut b)?;
            b[0] as f64
        }
        DataType::Boolean => {
            let mut b = [0u8; 1];
            reader.read_exact(&mut b)?;
            DataType::Boolean.normalize(b[0] as f64)
        }
        DataType::Int32 => {
            let mut b = [0u8; 4];
            reader.read_exact(&mut b)?;
            i32::from_le_bytes(b) as f64
        }
        DataType::Int64 => {
            let mut b = [0u8; 8];
            reader.read_exact(&mut b)?;
            i64::from_le_bytes(b) as f64
        }
    })
}

fn read_u32<R: Read>(reader: &mut R) -> Result<u32> {
    let mut b = [0u8; 4];
    reader.read_exact(&mut b)?;
    Ok(u32::from_le_bytes(b))
}

fn read_u64<R: Read>(reader: &mut R) -> Result<u64> {
    let mut b = [0u8; 8];
    reader.read_exact(&mut b)?;
    Ok(u64::from_le_bytes(b))
}
