//! Trainable parameters and their on-disk form.

use std::io::{Read, Write};

use kiln_ndarray::{DataType, NdArray, Shape};

use crate::error::{BlockError, Result};

/// Encoding version written before every parameter.
pub const PARAMETER_VERSION: u8 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParameterKind {
    Weight,
    Bias,
}

/// How a parameter's array is filled on first initialization.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Initializer {
    Zeros,
    Ones,
    Constant(f64),
    /// Values drawn from `[-scale, scale)` with a seeded generator.
    Uniform { scale: f64, seed: u64 },
}

impl Initializer {
    pub fn create(&self, shape: &Shape, dtype: DataType) -> Result<NdArray> {
        let array = match *self {
            Initializer::Zeros => NdArray::zeros(shape.clone(), dtype),
            Initializer::Ones => NdArray::ones(shape.clone(), dtype),
            Initializer::Constant(value) => NdArray::full(shape.clone(), value, dtype),
            Initializer::Uniform { scale, seed } => {
                let mut rng = fastrand::Rng::with_seed(seed);
                let values = (0..shape.size())
                    .map(|_| (rng.f64() * 2.0 - 1.0) * scale)
                    .collect();
                NdArray::from_vec(shape.clone(), dtype, values)?
            }
        };
        Ok(array)
    }
}

/// A named array owned by a leaf block.
///
/// The array stays `None` until the owning block is initialized or a
/// saved value is loaded into it.
#[derive(Debug, Clone)]
pub struct Parameter {
    name: String,
    kind: ParameterKind,
    initializer: Initializer,
    array: Option<NdArray>,
}

impl Parameter {
    pub fn new(name: impl Into<String>, kind: ParameterKind) -> Self {
        let initializer = match kind {
            ParameterKind::Weight => Initializer::Uniform {
                scale: 0.07,
                seed: 0,
            },
            ParameterKind::Bias => Initializer::Zeros,
        };
        Self {
            name: name.into(),
            kind,
            initializer,
            array: None,
        }
    }

    pub fn with_initializer(mut self, initializer: Initializer) -> Self {
        self.initializer = initializer;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> ParameterKind {
        self.kind
    }

    pub fn initializer(&self) -> Initializer {
        self.initializer
    }

    pub fn set_initializer(&mut self, initializer: Initializer) {
        self.initializer = initializer;
    }

    pub fn array(&self) -> Option<&NdArray> {
        self.array.as_ref()
    }

    pub fn shape(&self) -> Option<&Shape> {
        self.array.as_ref().map(NdArray::shape)
    }

    pub fn is_initialized(&self) -> bool {
        self.array.is_some()
    }

    pub fn set_array(&mut self, array: NdArray) {
        self.array = Some(array);
    }

    /// Fill the array from the initializer unless it already holds a value.
    pub fn initialize(&mut self, shape: &Shape, dtype: DataType) -> Result<()> {
        if self.array.is_none() {
            self.array = Some(self.initializer.create(shape, dtype)?);
        }
        Ok(())
    }

    /// `[version][u16 name len][name][has-array][array encoding]`
    pub fn save<W: Write>(&self, writer: &mut W) -> Result<()> {
        let name = self.name.as_bytes();
        let len = u16::try_from(name.len()).map_err(|_| BlockError::Malformed {
            detail: format!("parameter name `{}` is too long", self.name),
        })?;
        writer.write_all(&[PARAMETER_VERSION])?;
        writer.write_all(&len.to_le_bytes())?;
        writer.write_all(name)?;
        match &self.array {
            Some(array) => {
                writer.write_all(&[1])?;
                array.encode(writer)?;
            }
            None => writer.write_all(&[0])?,
        }
        Ok(())
    }

    /// Read a value written by [`Parameter::save`] for a parameter of the same name.
    pub fn load<R: Read>(&mut self, reader: &mut R) -> Result<()> {
        let mut byte = [0u8; 1];
        reader.read_exact(&mut byte)?;
        if byte[0] != PARAMETER_VERSION {
            return Err(BlockError::UnsupportedVersion { version: byte[0] });
        }

        let mut len = [0u8; 2];
        reader.read_exact(&mut len)?;
        let mut name = vec![0u8; u16::from_le_bytes(len) as usize];
        reader.read_exact(&mut name)?;
        let name = String::from_utf8(name).map_err(|e| BlockError::Malformed {
            detail: format!("parameter name is not UTF-8: {e}"),
        })?;
        if name != self.name {
            return Err(BlockError::ParameterMismatch {
                expected: self.name.clone(),
                found: name,
            });
        }

        reader.read_exact(&mut byte)?;
        self.array = match byte[0] {
            0 => None,
            1 => Some(NdArray::decode(reader)?),
            other => {
                return Err(BlockError::Malformed {
                    detail: format!("invalid array marker {other}"),
                })
            }
        };
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initialize_is_idempotent() {
        let mut p = Parameter::new("weight", ParameterKind::Weight)
            .with_initializer(Initializer::Constant(2.0));
        p.initialize(&Shape::from([2, 3]), DataType::Float32).unwrap();
        p.set_initializer(Initializer::Zeros);
        p.initialize(&Shape::from([4]), DataType::Float32).unwrap();
        assert_eq!(p.shape(), Some(&Shape::from([2, 3])));
        assert_eq!(p.array().unwrap().as_slice(), &[2.0; 6]);
    }

    #[test]
    fn uniform_is_seeded() {
        let init = Initializer::Uniform {
            scale: 0.5,
            seed: 42,
        };
        let a = init.create(&Shape::from([16]), DataType::Float64).unwrap();
        let b = init.create(&Shape::from([16]), DataType::Float64).unwrap();
        assert_eq!(a, b);
        assert!(a.as_slice().iter().all(|v| (-0.5..0.5).contains(v)));
    }

    #[test]
    fn save_load_preserves_value() {
        let mut p = Parameter::new("bias", ParameterKind::Bias);
        p.set_array(NdArray::vector(&[0.5, -1.0]));
        let mut buf = Vec::new();
        p.save(&mut buf).unwrap();
        assert_eq!(buf[0], PARAMETER_VERSION);
        assert_eq!(&buf[1..3], &4u16.to_le_bytes());
        assert_eq!(&buf[3..7], b"bias");

        let mut fresh = Parameter::new("bias", ParameterKind::Bias);
        fresh.load(&mut buf.as_slice()).unwrap();
        assert_eq!(fresh.array(), p.array());
    }

    #[test]
    fn uninitialized_parameter_round_trips_as_empty() {
        let p = Parameter::new("weight", ParameterKind::Weight);
        let mut buf = Vec::new();
        p.save(&mut buf).unwrap();
        assert_eq!(buf.last(), Some(&0));

        let mut fresh = Parameter::new("weight", ParameterKind::Weight);
        fresh.set_array(NdArray::vector(&[1.0]));
        fresh.load(&mut buf.as_slice()).unwrap();
        assert!(!fresh.is_initialized());
    }

    #[test]
    fn load_rejects_other_name() {
        let mut p = Parameter::new("weight", ParameterKind::Weight);
        p.set_array(NdArray::vector(&[1.0]));
        let mut buf = Vec::new();
        p.save(&mut buf).unwrap();

        let mut other = Parameter::new("bias", ParameterKind::Bias);
        let err = other.load(&mut buf.as_slice()).unwrap_err();
        assert!(matches!(err, BlockError::ParameterMismatch { .. }));
    }

    #[test]
    fn load_rejects_future_version() {
        let mut other = Parameter::new("bias", ParameterKind::Bias);
        let err = other.load(&mut [9u8, 0, 0].as_slice()).unwrap_err();
        assert!(matches!(err, BlockError::UnsupportedVersion { version: 9 }));
    }
}
