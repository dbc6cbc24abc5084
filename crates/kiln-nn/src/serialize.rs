//! Versioned parameter streams.
//!
//! ```text
//! sequential: [u8 version][child 0]..[child n-1]
//! leaf:       [u8 version][parameter 0]..[parameter m-1]
//! ```
//!
//! Nothing records the tree structure, so a stream can only be loaded into
//! a tree built the same way as the one that wrote it.

use std::io::{Read, Write};

use crate::arena::{BlockArena, BlockId};
use crate::error::{BlockError, Result};

/// Encoding version written at the start of every block.
pub const BLOCK_VERSION: u8 = 1;

impl BlockArena {
    /// Write the parameters of `id` and all its descendants.
    pub fn save_parameters<W: Write>(&self, id: BlockId, writer: &mut W) -> Result<()> {
        let node = self.node(id)?;
        writer.write_all(&[BLOCK_VERSION])?;
        for param in &node.parameters {
            param.save(writer)?;
        }
        for &child in &node.children {
            self.save_parameters(child, writer)?;
        }
        Ok(())
    }

    /// Read parameters written by [`BlockArena::save_parameters`].
    ///
    /// The version byte is checked before any child reads from `reader`.
    pub fn load_parameters<R: Read>(&mut self, id: BlockId, reader: &mut R) -> Result<()> {
        let mut version = [0u8; 1];
        reader.read_exact(&mut version)?;
        if version[0] != BLOCK_VERSION {
            return Err(BlockError::UnsupportedVersion {
                version: version[0],
            });
        }

        let node = self.node_mut(id)?;
        for param in &mut node.parameters {
            param.load(reader)?;
        }
        let children = node.children.clone();
        for child in children {
            self.load_parameters(child, reader)?;
        }
        log::debug!("loaded parameters for block {id}");
        Ok(())
    }

    pub fn parameters_to_bytes(&self, id: BlockId) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        self.save_parameters(id, &mut buf)?;
        Ok(buf)
    }
}
