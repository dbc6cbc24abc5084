//! Arena storage for block trees.

use std::fmt;

use kiln_ndarray::Shape;

use crate::block::{Activation, BlockKind, ShapeFn};
use crate::error::{BlockError, Result};
use crate::parameter::{Parameter, ParameterKind};

/// Index of a block inside a [`BlockArena`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(usize);

impl BlockId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// One block in the arena.
#[derive(Debug, Clone)]
pub struct BlockNode {
    pub(crate) kind: BlockKind,
    pub(crate) parameters: Vec<Parameter>,
    pub(crate) children: Vec<BlockId>,
    pub(crate) parent: Option<BlockId>,
    pub(crate) initialized: bool,
}

impl BlockNode {
    fn new(kind: BlockKind) -> Self {
        let parameters = match &kind {
            BlockKind::Linear { bias, .. } => {
                let mut params = vec![Parameter::new("weight", ParameterKind::Weight)];
                if *bias {
                    params.push(Parameter::new("bias", ParameterKind::Bias));
                }
                params
            }
            _ => Vec::new(),
        };
        Self {
            kind,
            parameters,
            children: Vec::new(),
            parent: None,
            initialized: false,
        }
    }

    pub fn kind(&self) -> &BlockKind {
        &self.kind
    }

    pub fn children(&self) -> &[BlockId] {
        &self.children
    }

    pub fn parent(&self) -> Option<BlockId> {
        self.parent
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }
}

/// Owns every block of one or more trees.
///
/// Blocks refer to each other only through [`BlockId`]s. A block has at
/// most one parent, and detached blocks stay in the arena so they can be
/// attached elsewhere.
#[derive(Debug, Clone, Default)]
pub struct BlockArena {
    nodes: Vec<BlockNode>,
}

impl BlockArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Add a detached block of `kind`.
    pub fn insert(&mut self, kind: BlockKind) -> BlockId {
        let id = BlockId(self.nodes.len());
        self.nodes.push(BlockNode::new(kind));
        id
    }

    pub fn sequential(&mut self) -> BlockId {
        self.insert(BlockKind::Sequential)
    }

    /// A linear layer with a bias term.
    pub fn linear(&mut self, units: usize) -> BlockId {
        self.insert(BlockKind::Linear { units, bias: true })
    }

    pub fn linear_without_bias(&mut self, units: usize) -> BlockId {
        self.insert(BlockKind::Linear { units, bias: false })
    }

    pub fn activation(&mut self, activation: Activation) -> BlockId {
        self.insert(BlockKind::Activation(activation))
    }

    pub fn flatten(&mut self) -> BlockId {
        self.insert(BlockKind::Flatten)
    }

    pub fn lambda(&mut self, name: impl Into<String>, shape_fn: ShapeFn) -> BlockId {
        self.insert(BlockKind::Lambda {
            name: name.into(),
            shape_fn,
        })
    }

    pub fn node(&self, id: BlockId) -> Result<&BlockNode> {
        self.nodes.get(id.0).ok_or(BlockError::BlockNotFound(id))
    }

    pub(crate) fn node_mut(&mut self, id: BlockId) -> Result<&mut BlockNode> {
        self.nodes.get_mut(id.0).ok_or(BlockError::BlockNotFound(id))
    }

    pub fn kind(&self, id: BlockId) -> Result<&BlockKind> {
        Ok(&self.node(id)?.kind)
    }

    pub fn is_initialized(&self, id: BlockId) -> Result<bool> {
        Ok(self.node(id)?.initialized)
    }

    /// Parameters owned directly by `id`. Always empty for composites.
    pub fn direct_parameters(&self, id: BlockId) -> Result<&[Parameter]> {
        Ok(&self.node(id)?.parameters)
    }

    pub fn parameter_mut(&mut self, id: BlockId, name: &str) -> Result<&mut Parameter> {
        let node = self.node_mut(id)?;
        let block = node.kind.type_name();
        node.parameters
            .iter_mut()
            .find(|p| p.name() == name)
            .ok_or_else(|| BlockError::UnknownParameter {
                block: block.to_string(),
                name: name.to_string(),
            })
    }

    /// Shape the named direct parameter takes for the given inputs.
    pub fn parameter_shape(&self, id: BlockId, name: &str, inputs: &[Shape]) -> Result<Shape> {
        self.node(id)?.kind.parameter_shape(name, inputs)
    }

    /// Every parameter under `id`, named by its path from `id`.
    ///
    /// Path segments are child names as listed by
    /// [`BlockArena::children`], joined with `/`.
    pub fn parameters(&self, id: BlockId) -> Result<Vec<(String, &Parameter)>> {
        let mut out = Vec::new();
        self.collect_parameters(id, "", &mut out)?;
        Ok(out)
    }

    fn collect_parameters<'a>(
        &'a self,
        id: BlockId,
        prefix: &str,
        out: &mut Vec<(String, &'a Parameter)>,
    ) -> Result<()> {
        let node = self.node(id)?;
        for param in &node.parameters {
            out.push((format!("{prefix}{}", param.name()), param));
        }
        for (name, child) in self.children(id)? {
            self.collect_parameters(child, &format!("{prefix}{name}/"), out)?;
        }
        Ok(())
    }

    /// Clear the initialized flag on `id` and every ancestor.
    pub(crate) fn invalidate(&mut self, id: BlockId) -> Result<()> {
        let mut current = Some(id);
        while let Some(block) = current {
            let node = self.node_mut(block)?;
            node.initialized = false;
            current = node.parent;
        }
        Ok(())
    }

    /// Whether `ancestor` is `id` or lies on the path from `id` to its root.
    pub(crate) fn is_ancestor(&self, ancestor: BlockId, id: BlockId) -> Result<bool> {
        let mut current = Some(id);
        while let Some(block) = current {
            if block == ancestor {
                return Ok(true);
            }
            current = self.node(block)?.parent;
        }
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn linear_owns_weight_and_bias() {
        let mut arena = BlockArena::new();
        let with_bias = arena.linear(4);
        let without = arena.linear_without_bias(4);
        let names: Vec<&str> = arena
            .direct_parameters(with_bias)
            .unwrap()
            .iter()
            .map(Parameter::name)
            .collect();
        assert_eq!(names, ["weight", "bias"]);
        assert_eq!(arena.direct_parameters(without).unwrap().len(), 1);
    }

    #[test]
    fn unknown_block_is_reported() {
        let arena = BlockArena::new();
        assert!(matches!(
            arena.node(BlockId(3)),
            Err(BlockError::BlockNotFound(BlockId(3)))
        ));
    }

    #[test]
    fn parameter_lookup_by_name() {
        let mut arena = BlockArena::new();
        let id = arena.linear(2);
        assert!(arena.parameter_mut(id, "bias").is_ok());
        assert!(matches!(
            arena.parameter_mut(id, "gamma"),
            Err(BlockError::UnknownParameter { .. })
        ));
    }
}
