//! Block trees described in TOML.
//!
//! ```toml
//! type = "sequential"
//!
//! [[layers]]
//! type = "flatten"
//!
//! [[layers]]
//! type = "linear"
//! units = 10
//!
//! [[layers]]
//! type = "activation"
//! function = "relu"
//! ```
//!
//! Lambda blocks carry a function pointer and cannot be described.

use std::path::Path;

use serde::Deserialize;

use crate::arena::{BlockArena, BlockId};
use crate::block::Activation;
use crate::error::Result;

/// A block and, for sequential blocks, its children in order.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum BlockDescription {
    Sequential {
        #[serde(default)]
        layers: Vec<BlockDescription>,
    },
    Linear {
        units: usize,
        #[serde(default = "default_bias")]
        bias: bool,
    },
    Activation {
        function: Activation,
    },
    Flatten,
}

fn default_bias() -> bool {
    true
}

/// Parse a block description from a TOML string.
pub fn parse_block_toml(text: &str) -> Result<BlockDescription> {
    Ok(toml::from_str(text)?)
}

/// Load a block description from a TOML file.
pub fn load_block_toml(path: &Path) -> Result<BlockDescription> {
    let text = std::fs::read_to_string(path)?;
    parse_block_toml(&text)
}

impl BlockArena {
    /// Insert the blocks of `description` and return the root.
    pub fn build(&mut self, description: &BlockDescription) -> Result<BlockId> {
        let id = match description {
            BlockDescription::Sequential { layers } => {
                let id = self.sequential();
                for layer in layers {
                    let child = self.build(layer)?;
                    self.add(id, child)?;
                }
                id
            }
            BlockDescription::Linear { units, bias: true } => self.linear(*units),
            BlockDescription::Linear { units, bias: false } => self.linear_without_bias(*units),
            BlockDescription::Activation { function } => self.activation(*function),
            BlockDescription::Flatten => self.flatten(),
        };
        Ok(id)
    }
}
