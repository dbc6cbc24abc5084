//! Dense n-dimensional arrays for the Kiln engine layer.
//!
//! The heavy tensor math belongs to the native engines Kiln binds. This
//! crate pins down the parts every engine must agree on:
//!
//! - [`Shape`]: dimensions and the trailing-dimension broadcast rule
//! - [`DataType`]: element types and their wire codes
//! - [`NdArray`]: an owned, row-major array
//! - [`compare`]: elementwise comparisons, `all_close`, `content_equals`
//! - [`encode`]: the self-delimiting binary array encoding
//!
//! ## Zero-size shapes
//!
//! A shape with any zero dimension holds no elements. Comparisons between
//! such arrays return an empty Boolean array of the broadcast shape, and
//! `all_close` over them is vacuously true, provided the shapes broadcast.

pub mod array;
pub mod compare;
pub mod dtype;
pub mod encode;
pub mod error;
pub mod shape;

pub use array::NdArray;
pub use compare::{all_close, all_close_default, content_equals};
pub use dtype::DataType;
pub use error::{NdArrayError, Result};
pub use shape::Shape;
