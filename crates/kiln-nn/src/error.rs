//! Block error types.

use std::io;

use kiln_ndarray::NdArrayError;

use crate::arena::BlockId;

/// Errors from building, initializing, or serializing blocks.
#[derive(Debug, thiserror::Error)]
pub enum BlockError {
    /// A shape query or initialization reached a sequential block with no
    /// children.
    #[error("The sequential block is empty")]
    EmptyComposite,

    /// A parameter stream was written with a version this build cannot read.
    #[error("unsupported encoding version: {version}")]
    UnsupportedVersion { version: u8 },

    /// The id does not belong to this arena.
    #[error("block {0} not found")]
    BlockNotFound(BlockId),

    /// The child already has a parent.
    #[error("block {child} is already attached to block {parent}")]
    AlreadyAttached { child: BlockId, parent: BlockId },

    /// The child is the parent itself or one of its ancestors.
    #[error("attaching block {child} to block {parent} would create a cycle")]
    CycleDetected { parent: BlockId, child: BlockId },

    /// The operation needs a sequential block.
    #[error("block {0} is not a sequential block")]
    NotComposite(BlockId),

    /// Parameters were requested from a block that owns none.
    #[error("{block} has no direct parameters")]
    NoParameters { block: String },

    /// The block has no parameter by that name.
    #[error("unknown parameter `{name}` on {block}")]
    UnknownParameter { block: String, name: String },

    /// A loaded parameter name differs from the one in the tree.
    #[error("parameter mismatch: expected `{expected}`, found `{found}`")]
    ParameterMismatch { expected: String, found: String },

    /// Input shapes the block cannot accept.
    #[error("invalid input for {block}: {detail}")]
    InvalidInput { block: String, detail: String },

    /// A parameter stream is structurally invalid.
    #[error("malformed parameter stream: {detail}")]
    Malformed { detail: String },

    /// Array construction or decoding failed.
    #[error(transparent)]
    Array(#[from] NdArrayError),

    /// A block description is not valid TOML or names an unknown layer.
    #[error("invalid block description: {0}")]
    Toml(#[from] toml::de::Error),

    /// I/O error while saving or loading parameters.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Result type alias for block operations.
pub type Result<T> = std::result::Result<T, BlockError>;
