//! Block composition for Kiln models.
//!
//! Blocks live in a [`BlockArena`] and are addressed by [`BlockId`]. A
//! sequential block chains its children, infers output shapes through
//! them, initializes their parameters once, and saves or loads their
//! parameters as a versioned byte stream. Trees can also be described in
//! TOML and built with [`BlockArena::build`].

pub mod arena;
pub mod block;
pub mod describe;
pub mod error;
pub mod parameter;
mod sequential;
pub mod serialize;

pub use arena::{BlockArena, BlockId, BlockNode};
pub use block::{Activation, BlockKind, ShapeFn};
pub use describe::{load_block_toml, parse_block_toml, BlockDescription};
pub use error::{BlockError, Result};
pub use parameter::{Initializer, Parameter, ParameterKind};
pub use serialize::BLOCK_VERSION;
