//! The owned array type.

use crate::dtype::DataType;
use crate::error::{NdArrayError, Result};
use crate::shape::Shape;

/// An owned, row-major n-dimensional array.
///
/// Values are stored as `f64` and normalized through [`DataType::normalize`]
/// on construction, so an `Int32` array never holds a fractional value and
/// a `Boolean` array only holds 0 and 1.
#[derive(Debug, Clone)]
pub struct NdArray {
    shape: Shape,
    dtype: DataType,
    data: Vec<f64>,
}

impl NdArray {
    /// Build an array from raw values, normalizing each to `dtype`.
    pub fn from_vec(shape: impl Into<Shape>, dtype: DataType, values: Vec<f64>) -> Result<Self> {
        let shape = shape.into();
        let expected = shape.size();
        if values.len() != expected {
            return Err(NdArrayError::BufferSizeMismatch {
                shape,
                expected,
                actual: values.len(),
            });
        }
        let data = values.into_iter().map(|v| dtype.normalize(v)).collect();
        Ok(Self { shape, dtype, data })
    }

    pub fn from_f32(shape: impl Into<Shape>, values: &[f32]) -> Result<Self> {
        Self::from_vec(
            shape,
            DataType::Float32,
            values.iter().map(|&v| v as f64).collect(),
        )
    }

    pub fn from_f64(shape: impl Into<Shape>, values: &[f64]) -> Result<Self> {
        Self::from_vec(shape, DataType::Float64, values.to_vec())
    }

    pub fn from_i32(shape: impl Into<Shape>, values: &[i32]) -> Result<Self> {
        Self::from_vec(
            shape,
            DataType::Int32,
            values.iter().map(|&v| v as f64).collect(),
        )
    }

    pub fn from_i64(shape: impl Into<Shape>, values: &[i64]) -> Result<Self> {
        Self::from_vec(
            shape,
            DataType::Int64,
            values.iter().map(|&v| v as f64).collect(),
        )
    }

    pub fn from_bool(shape: impl Into<Shape>, values: &[bool]) -> Result<Self> {
        Self::from_vec(
            shape,
            DataType::Boolean,
            values.iter().map(|&v| if v { 1.0 } else { 0.0 }).collect(),
        )
    }

    /// A 1-D `Float32` array from a slice.
    pub fn vector(values: &[f32]) -> Self {
        Self {
            shape: Shape::new(vec![values.len()]),
            dtype: DataType::Float32,
            data: values.iter().map(|&v| v as f64).collect(),
        }
    }

    /// A rank-0 array holding `value`.
    pub fn scalar(value: f64, dtype: DataType) -> Self {
        Self {
            shape: Shape::scalar(),
            dtype,
            data: vec![dtype.normalize(value)],
        }
    }

    /// An array of `shape` with every element set to `value`.
    pub fn full(shape: impl Into<Shape>, value: f64, dtype: DataType) -> Self {
        let shape = shape.into();
        let data = vec![dtype.normalize(value); shape.size()];
        Self { shape, dtype, data }
    }

    pub fn zeros(shape: impl Into<Shape>, dtype: DataType) -> Self {
        Self::full(shape, 0.0, dtype)
    }

    pub fn ones(shape: impl Into<Shape>, dtype: DataType) -> Self {
        Self::full(shape, 1.0, dtype)
    }

    /// `Float32` values `start, start + 1, ..` below `end`.
    pub fn arange(start: i64, end: i64) -> Self {
        let data: Vec<f64> = (start..end).map(|v| v as f64).collect();
        Self {
            shape: Shape::new(vec![data.len()]),
            dtype: DataType::Float32,
            data,
        }
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    pub fn dtype(&self) -> DataType {
        self.dtype
    }

    /// Number of elements.
    pub fn size(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Elements in row-major order.
    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }

    pub fn to_vec(&self) -> Vec<f64> {
        self.data.clone()
    }

    /// Boolean view of the elements (non-zero is true).
    pub fn to_bool_vec(&self) -> Vec<bool> {
        self.data.iter().map(|&v| v != 0.0).collect()
    }

    /// Element at a flat row-major index.
    pub fn get(&self, index: usize) -> Option<f64> {
        self.data.get(index).copied()
    }

    /// The same elements under a new shape with the same element count.
    pub fn reshape(&self, shape: impl Into<Shape>) -> Result<Self> {
        let shape = shape.into();
        if shape.size() != self.shape.size() {
            return Err(NdArrayError::InvalidReshape {
                from: self.shape.clone(),
                to: shape,
            });
        }
        Ok(Self {
            shape,
            dtype: self.dtype,
            data: self.data.clone(),
        })
    }

    /// Convert to another element type.
    pub fn as_type(&self, dtype: DataType) -> Self {
        Self {
            shape: self.shape.clone(),
            dtype,
            data: self.data.iter().map(|&v| dtype.normalize(v)).collect(),
        }
    }

    /// Materialize this array stretched to `target`.
    pub fn broadcast_to(&self, target: &Shape) -> Result<Self> {
        if &self.shape == target {
            return Ok(self.clone());
        }
        if !self.shape.broadcasts_to(target) {
            return Err(NdArrayError::ShapeMismatch {
                op: "broadcast",
                lhs: self.shape.clone(),
                rhs: target.clone(),
            });
        }
        let data = broadcast_indices(&self.shape, target)
            .into_iter()
            .map(|i| self.data[i])
            .collect();
        Ok(Self {
            shape: target.clone(),
            dtype: self.dtype,
            data,
        })
    }

    pub(crate) fn from_parts(shape: Shape, dtype: DataType, data: Vec<f64>) -> Self {
        Self { shape, dtype, data }
    }
}

/// For every element of `target`, the flat index it reads from in `source`.
///
/// `source` must broadcast to `target`.
pub(crate) fn broadcast_indices(source: &Shape, target: &Shape) -> Vec<usize> {
    let size = target.size();
    if size == 0 {
        return Vec::new();
    }
    let offset = target.rank() - source.rank();
    let src_strides = source.strides();
    // Stride 0 along stretched axes.
    let strides: Vec<usize> = (0..target.rank())
        .map(|axis| {
            if axis < offset || source.dims()[axis - offset] == 1 {
                0
            } else {
                src_strides[axis - offset]
            }
        })
        .collect();
    let dims = target.dims();

    let mut out = Vec::with_capacity(size);
    let mut counter = vec![0usize; dims.len()];
    for _ in 0..size {
        out.push(counter.iter().zip(&strides).map(|(c, s)| c * s).sum());
        for axis in (0..dims.len()).rev() {
            counter[axis] += 1;
            if counter[axis] < dims[axis] {
                break;
            }
            counter[axis] = 0;
        }
    }
    out
}

/// Arrays are equal when dtype, shape and every element agree.
///
/// NaN elements never compare equal here, matching IEEE semantics; use
/// [`crate::all_close`] with `equal_nan` for NaN-tolerant checks.
impl PartialEq for NdArray {
    fn eq(&self, other: &Self) -> bool {
        crate::compare::content_equals(self, other)
    }
}
