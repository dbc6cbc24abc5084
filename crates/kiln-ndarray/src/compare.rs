//! Elementwise comparison and closeness.
//!
//! Binary operators broadcast both operands to a common shape and produce a
//! `Boolean` array of that shape. When the common shape has a zero
//! dimension the result is an empty `Boolean` array; no element is ever
//! compared.

use crate::array::{broadcast_indices, NdArray};
use crate::dtype::DataType;
use crate::error::{NdArrayError, Result};
use crate::shape::Shape;

/// Default relative tolerance for [`all_close_default`].
pub const DEFAULT_RTOL: f64 = 1e-5;
/// Default absolute tolerance for [`all_close_default`].
pub const DEFAULT_ATOL: f64 = 1e-8;

fn broadcast_shape(op: &'static str, a: &NdArray, b: &NdArray) -> Result<Shape> {
    a.shape()
        .broadcast(b.shape())
        .ok_or_else(|| NdArrayError::ShapeMismatch {
            op,
            lhs: a.shape().clone(),
            rhs: b.shape().clone(),
        })
}

/// Apply `f` to every broadcast element pair.
fn zip_with(
    op: &'static str,
    a: &NdArray,
    b: &NdArray,
    dtype: DataType,
    f: impl Fn(f64, f64) -> f64,
) -> Result<NdArray> {
    let shape = broadcast_shape(op, a, b)?;
    let ia = broadcast_indices(a.shape(), &shape);
    let ib = broadcast_indices(b.shape(), &shape);
    let (da, db) = (a.as_slice(), b.as_slice());
    let data = ia
        .into_iter()
        .zip(ib)
        .map(|(i, j)| dtype.normalize(f(da[i], db[j])))
        .collect();
    Ok(NdArray::from_parts(shape, dtype, data))
}

fn compare_with(
    op: &'static str,
    a: &NdArray,
    b: &NdArray,
    pred: impl Fn(f64, f64) -> bool,
) -> Result<NdArray> {
    zip_with(op, a, b, DataType::Boolean, |x, y| {
        if pred(x, y) {
            1.0
        } else {
            0.0
        }
    })
}

pub fn eq(a: &NdArray, b: &NdArray) -> Result<NdArray> {
    compare_with("eq", a, b, |x, y| x == y)
}

pub fn neq(a: &NdArray, b: &NdArray) -> Result<NdArray> {
    compare_with("neq", a, b, |x, y| x != y)
}

pub fn gt(a: &NdArray, b: &NdArray) -> Result<NdArray> {
    compare_with("gt", a, b, |x, y| x > y)
}

pub fn gte(a: &NdArray, b: &NdArray) -> Result<NdArray> {
    compare_with("gte", a, b, |x, y| x >= y)
}

pub fn lt(a: &NdArray, b: &NdArray) -> Result<NdArray> {
    compare_with("lt", a, b, |x, y| x < y)
}

pub fn lte(a: &NdArray, b: &NdArray) -> Result<NdArray> {
    compare_with("lte", a, b, |x, y| x <= y)
}

/// Elementwise maximum; NaN in either operand propagates.
pub fn maximum(a: &NdArray, b: &NdArray) -> Result<NdArray> {
    let dtype = a.dtype().promote(b.dtype());
    zip_with("maximum", a, b, dtype, |x, y| {
        if x.is_nan() || y.is_nan() {
            f64::NAN
        } else {
            x.max(y)
        }
    })
}

/// Elementwise minimum; NaN in either operand propagates.
pub fn minimum(a: &NdArray, b: &NdArray) -> Result<NdArray> {
    let dtype = a.dtype().promote(b.dtype());
    zip_with("minimum", a, b, dtype, |x, y| {
        if x.is_nan() || y.is_nan() {
            f64::NAN
        } else {
            x.min(y)
        }
    })
}

/// Pick from `x` where `condition` is true and from `y` elsewhere.
///
/// All three operands broadcast to one common shape.
pub fn where_cond(condition: &NdArray, x: &NdArray, y: &NdArray) -> Result<NdArray> {
    if condition.dtype() != DataType::Boolean {
        return Err(NdArrayError::NotBoolean {
            dtype: condition.dtype(),
        });
    }
    let values = broadcast_shape("where", x, y)?;
    let shape = condition
        .shape()
        .broadcast(&values)
        .ok_or_else(|| NdArrayError::ShapeMismatch {
            op: "where",
            lhs: condition.shape().clone(),
            rhs: values.clone(),
        })?;
    let dtype = x.dtype().promote(y.dtype());
    let ic = broadcast_indices(condition.shape(), &shape);
    let ix = broadcast_indices(x.shape(), &shape);
    let iy = broadcast_indices(y.shape(), &shape);
    let (dc, dx, dy) = (condition.as_slice(), x.as_slice(), y.as_slice());
    let data = (0..shape.size())
        .map(|k| {
            let v = if dc[ic[k]] != 0.0 { dx[ix[k]] } else { dy[iy[k]] };
            dtype.normalize(v)
        })
        .collect();
    Ok(NdArray::from_parts(shape, dtype, data))
}

/// Whether every element pair satisfies `|a - b| <= atol + rtol * |b|`.
///
/// Operands broadcast against each other. NaN matches NaN only when
/// `equal_nan` is set and never matches a number. An empty broadcast shape
/// is vacuously close.
///
/// Shapes that cannot broadcast are an error, except when either operand
/// holds no elements: an empty operand that cannot meet the other shape is
/// simply not close, so `(0, 0, 2)` against `(2, 0, 0)` returns `Ok(false)`.
pub fn all_close(a: &NdArray, b: &NdArray, rtol: f64, atol: f64, equal_nan: bool) -> Result<bool> {
    let shape = match a.shape().broadcast(b.shape()) {
        Some(shape) => shape,
        None if a.is_empty() || b.is_empty() => return Ok(false),
        None => {
            return Err(NdArrayError::ShapeMismatch {
                op: "all_close",
                lhs: a.shape().clone(),
                rhs: b.shape().clone(),
            })
        }
    };
    if shape.is_zero_size() {
        return Ok(true);
    }
    let ia = broadcast_indices(a.shape(), &shape);
    let ib = broadcast_indices(b.shape(), &shape);
    let (da, db) = (a.as_slice(), b.as_slice());
    Ok(ia
        .into_iter()
        .zip(ib)
        .all(|(i, j)| is_close(da[i], db[j], rtol, atol, equal_nan)))
}

/// [`all_close`] with `rtol = 1e-5`, `atol = 1e-8` and NaN never equal.
pub fn all_close_default(a: &NdArray, b: &NdArray) -> Result<bool> {
    all_close(a, b, DEFAULT_RTOL, DEFAULT_ATOL, false)
}

fn is_close(x: f64, y: f64, rtol: f64, atol: f64, equal_nan: bool) -> bool {
    match (x.is_nan(), y.is_nan()) {
        (true, true) => equal_nan,
        (true, false) | (false, true) => false,
        // Infinities only match themselves; inf - inf is NaN.
        _ if x == y => true,
        _ => (x - y).abs() <= atol + rtol * y.abs(),
    }
}

/// Exact equality of dtype, shape and elements.
///
/// Arrays of different data types are never content-equal, even when the
/// values agree. No broadcasting takes place.
pub fn content_equals(a: &NdArray, b: &NdArray) -> bool {
    a.dtype() == b.dtype() && a.shape() == b.shape() && a.as_slice() == b.as_slice()
}

impl NdArray {
    /// The scalar operand for `value`, typed so `value` is never truncated.
    ///
    /// Floating arrays and values exact in this array's type keep the
    /// array's type; anything else is a `Float64` operand and promotes.
    fn scalar_operand(&self, value: f64) -> NdArray {
        let dtype = self.dtype();
        if dtype.is_floating() || dtype.normalize(value) == value {
            NdArray::scalar(value, dtype)
        } else {
            NdArray::scalar(value, DataType::Float64)
        }
    }

    /// Compare every element against a scalar.
    pub fn eq_scalar(&self, value: f64) -> Result<NdArray> {
        eq(self, &self.scalar_operand(value))
    }

    pub fn neq_scalar(&self, value: f64) -> Result<NdArray> {
        neq(self, &self.scalar_operand(value))
    }

    pub fn gt_scalar(&self, value: f64) -> Result<NdArray> {
        gt(self, &self.scalar_operand(value))
    }

    pub fn gte_scalar(&self, value: f64) -> Result<NdArray> {
        gte(self, &self.scalar_operand(value))
    }

    pub fn lt_scalar(&self, value: f64) -> Result<NdArray> {
        lt(self, &self.scalar_operand(value))
    }

    pub fn lte_scalar(&self, value: f64) -> Result<NdArray> {
        lte(self, &self.scalar_operand(value))
    }

    /// Elementwise maximum with a scalar; a fractional scalar promotes an
    /// integer array to `Float64`.
    pub fn maximum_scalar(&self, value: f64) -> Result<NdArray> {
        maximum(self, &self.scalar_operand(value))
    }

    pub fn minimum_scalar(&self, value: f64) -> Result<NdArray> {
        minimum(self, &self.scalar_operand(value))
    }

    pub fn all_close(&self, other: &NdArray, rtol: f64, atol: f64, equal_nan: bool) -> Result<bool> {
        all_close(self, other, rtol, atol, equal_nan)
    }

    pub fn content_equals(&self, other: &NdArray) -> bool {
        content_equals(self, other)
    }
}
