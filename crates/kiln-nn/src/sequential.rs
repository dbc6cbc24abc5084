//! Sequential composition: child management, shape inference and
//! initialization.

use kiln_ndarray::{DataType, Shape};

use crate::arena::{BlockArena, BlockId};
use crate::block::{BlockKind, ShapeFn};
use crate::error::{BlockError, Result};

impl BlockArena {
    /// Append `child` to the sequential block `parent`.
    ///
    /// Fails if `child` already has a parent or if attaching it would make
    /// `parent` its own descendant.
    pub fn add(&mut self, parent: BlockId, child: BlockId) -> Result<()> {
        self.check_attach(parent, child)?;
        self.node_mut(parent)?.children.push(child);
        self.node_mut(child)?.parent = Some(parent);
        self.invalidate(parent)
    }

    /// Append each of `children` in order, stopping at the first failure.
    pub fn add_all(
        &mut self,
        parent: BlockId,
        children: impl IntoIterator<Item = BlockId>,
    ) -> Result<()> {
        for child in children {
            self.add(parent, child)?;
        }
        Ok(())
    }

    /// Wrap `shape_fn` in a lambda block and append it.
    pub fn add_lambda(
        &mut self,
        parent: BlockId,
        name: impl Into<String>,
        shape_fn: ShapeFn,
    ) -> Result<BlockId> {
        self.require_composite(parent)?;
        let child = self.lambda(name, shape_fn);
        self.add(parent, child)?;
        Ok(child)
    }

    /// Detach and return the last child, if any.
    pub fn remove_last(&mut self, parent: BlockId) -> Result<Option<BlockId>> {
        self.require_composite(parent)?;
        let removed = self.node_mut(parent)?.children.pop();
        if let Some(child) = removed {
            self.node_mut(child)?.parent = None;
            self.invalidate(parent)?;
        }
        Ok(removed)
    }

    /// Swap the last child for `child` and return the detached one.
    ///
    /// On an empty block this behaves like [`BlockArena::add`].
    pub fn replace_last(&mut self, parent: BlockId, child: BlockId) -> Result<Option<BlockId>> {
        self.check_attach(parent, child)?;
        let removed = self.node_mut(parent)?.children.pop();
        if let Some(old) = removed {
            self.node_mut(old)?.parent = None;
        }
        self.node_mut(parent)?.children.push(child);
        self.node_mut(child)?.parent = Some(parent);
        self.invalidate(parent)?;
        Ok(removed)
    }

    /// Children of `id` with their positional names.
    ///
    /// Names are `{index}:{type}` with the index zero-padded to the digit
    /// count of the number of children, so twelve children are listed as
    /// `00:Linear` through `11:Linear`.
    pub fn children(&self, id: BlockId) -> Result<Vec<(String, BlockId)>> {
        let node = self.node(id)?;
        let width = node.children.len().to_string().len();
        node.children
            .iter()
            .enumerate()
            .map(|(index, &child)| {
                let type_name = self.node(child)?.kind.type_name();
                Ok((format!("{index:0width$}:{type_name}"), child))
            })
            .collect()
    }

    /// Output shapes of `id` for the given input shapes.
    pub fn output_shapes(&self, id: BlockId, inputs: &[Shape]) -> Result<Vec<Shape>> {
        let node = self.node(id)?;
        if !node.kind.is_composite() {
            return node.kind.leaf_output_shapes(inputs);
        }
        if node.children.is_empty() {
            return Err(BlockError::EmptyComposite);
        }
        let mut shapes = inputs.to_vec();
        for &child in &node.children {
            shapes = self.output_shapes(child, &shapes)?;
        }
        Ok(shapes)
    }

    /// Initialize every parameter under `id` and return its output shapes.
    ///
    /// A block that is already initialized is not initialized again until
    /// its children change.
    pub fn initialize(
        &mut self,
        id: BlockId,
        dtype: DataType,
        inputs: &[Shape],
    ) -> Result<Vec<Shape>> {
        let node = self.node(id)?;
        if node.initialized {
            return self.output_shapes(id, inputs);
        }

        if node.kind.is_composite() {
            if node.children.is_empty() {
                return Err(BlockError::EmptyComposite);
            }
            let children = node.children.clone();
            let mut shapes = inputs.to_vec();
            for child in children {
                shapes = self.initialize(child, dtype, &shapes)?;
            }
            self.node_mut(id)?.initialized = true;
            log::debug!("initialized sequential block {id} with {inputs:?}");
            return Ok(shapes);
        }

        let shapes = node
            .parameters
            .iter()
            .map(|p| node.kind.parameter_shape(p.name(), inputs))
            .collect::<Result<Vec<_>>>()?;
        let node = self.node_mut(id)?;
        for (param, shape) in node.parameters.iter_mut().zip(&shapes) {
            param.initialize(shape, dtype)?;
        }
        node.initialized = true;
        self.output_shapes(id, inputs)
    }

    fn require_composite(&self, id: BlockId) -> Result<()> {
        match self.node(id)?.kind {
            BlockKind::Sequential => Ok(()),
            _ => Err(BlockError::NotComposite(id)),
        }
    }

    fn check_attach(&self, parent: BlockId, child: BlockId) -> Result<()> {
        self.require_composite(parent)?;
        if let Some(existing) = self.node(child)?.parent {
            return Err(BlockError::AlreadyAttached {
                child,
                parent: existing,
            });
        }
        if self.is_ancestor(child, parent)? {
            return Err(BlockError::CycleDetected { parent, child });
        }
        Ok(())
    }
}
