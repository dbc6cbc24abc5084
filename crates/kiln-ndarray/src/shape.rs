//! Array shapes and broadcasting.

use std::fmt;

/// The dimensions of an [`crate::NdArray`].
///
/// A rank-0 shape describes a scalar and holds one element. Any zero
/// dimension makes the shape hold no elements at all.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Shape {
    dims: Vec<usize>,
}

impl Shape {
    pub fn new(dims: impl Into<Vec<usize>>) -> Self {
        Self { dims: dims.into() }
    }

    /// A rank-0 shape.
    pub fn scalar() -> Self {
        Self { dims: Vec::new() }
    }

    pub fn rank(&self) -> usize {
        self.dims.len()
    }

    pub fn dims(&self) -> &[usize] {
        &self.dims
    }

    /// Size of dimension `axis`, or `None` if out of range.
    pub fn dim(&self, axis: usize) -> Option<usize> {
        self.dims.get(axis).copied()
    }

    /// Number of elements described by this shape.
    pub fn size(&self) -> usize {
        if self.is_zero_size() {
            return 0;
        }
        self.dims.iter().product()
    }

    /// [`Shape::size`] without overflow; `None` when the count does not fit
    /// in `usize`.
    pub fn checked_size(&self) -> Option<usize> {
        if self.is_zero_size() {
            return Some(0);
        }
        self.dims.iter().try_fold(1usize, |acc, &d| acc.checked_mul(d))
    }

    /// Whether the shape holds no elements (some dimension is zero).
    pub fn is_zero_size(&self) -> bool {
        self.dims.contains(&0)
    }

    /// Row-major strides, in elements.
    pub fn strides(&self) -> Vec<usize> {
        let mut strides = vec![1usize; self.dims.len()];
        for i in (0..self.dims.len().saturating_sub(1)).rev() {
            strides[i] = strides[i + 1] * self.dims[i + 1];
        }
        strides
    }

    /// The common shape two operands broadcast to, if any.
    ///
    /// Dimensions are aligned from the right. Each aligned pair must be
    /// equal or contain a 1, in which case the other size wins; this lets a
    /// 1 stretch to a 0 but never lets a 0 meet a size greater than 1.
    pub fn broadcast(&self, other: &Shape) -> Option<Shape> {
        let rank = self.rank().max(other.rank());
        let mut dims = vec![0usize; rank];
        for i in 0..rank {
            let a = self.from_right(i);
            let b = other.from_right(i);
            dims[rank - 1 - i] = match (a, b) {
                (a, b) if a == b => a,
                (1, b) => b,
                (a, 1) => a,
                _ => return None,
            };
        }
        Some(Shape { dims })
    }

    /// Whether `self` can be stretched to `target` without changing `target`.
    pub fn broadcasts_to(&self, target: &Shape) -> bool {
        self.rank() <= target.rank()
            && (0..self.rank()).all(|i| {
                let d = self.from_right(i);
                d == 1 || d == target.from_right(i)
            })
    }

    /// Dimension `i` counted from the last one, with implicit leading 1s.
    fn from_right(&self, i: usize) -> usize {
        if i < self.dims.len() {
            self.dims[self.dims.len() - 1 - i]
        } else {
            1
        }
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (i, d) in self.dims.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{d}")?;
        }
        write!(f, ")")
    }
}

impl From<Vec<usize>> for Shape {
    fn from(dims: Vec<usize>) -> Self {
        Self::new(dims)
    }
}

impl From<&[usize]> for Shape {
    fn from(dims: &[usize]) -> Self {
        Self::new(dims.to_vec())
    }
}

impl<const N: usize> From<[usize; N]> for Shape {
    fn from(dims: [usize; N]) -> Self {
        Self::new(dims.to_vec())
    }
}
