//! Block kinds and leaf shape rules.

use kiln_ndarray::Shape;
use serde::Deserialize;

use crate::error::{BlockError, Result};

/// Output shapes of a lambda block given its input shapes.
pub type ShapeFn = fn(&[Shape]) -> Vec<Shape>;

/// Element-wise activations. Output shape equals input shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Activation {
    Relu,
    Sigmoid,
    Tanh,
}

#[derive(Debug, Clone)]
pub enum BlockKind {
    /// Runs its children in order, each fed the previous one's output.
    Sequential,
    /// Fully connected layer mapping the last input axis to `units`.
    Linear { units: usize, bias: bool },
    Activation(Activation),
    /// Collapses every axis after the first.
    Flatten,
    Lambda { name: String, shape_fn: ShapeFn },
}

impl BlockKind {
    /// The name used in child listings.
    pub fn type_name(&self) -> &'static str {
        match self {
            BlockKind::Sequential => "SequentialBlock",
            BlockKind::Linear { .. } => "Linear",
            BlockKind::Activation(_) => "Activation",
            BlockKind::Flatten => "Flatten",
            BlockKind::Lambda { .. } => "LambdaBlock",
        }
    }

    pub fn is_composite(&self) -> bool {
        matches!(self, BlockKind::Sequential)
    }

    /// Output shapes of a leaf block. Composites are handled by the arena.
    pub(crate) fn leaf_output_shapes(&self, inputs: &[Shape]) -> Result<Vec<Shape>> {
        match self {
            BlockKind::Sequential => Err(BlockError::EmptyComposite),
            BlockKind::Linear { units, .. } => {
                let input = self.first_input(inputs)?;
                let mut dims = input.dims().to_vec();
                match dims.last_mut() {
                    Some(last) => *last = *units,
                    None => return Err(self.invalid("input must have at least one axis")),
                }
                Ok(vec![Shape::new(dims)])
            }
            BlockKind::Activation(_) => Ok(inputs.to_vec()),
            BlockKind::Flatten => {
                let input = self.first_input(inputs)?;
                match input.dims().split_first() {
                    Some((batch, rest)) => {
                        Ok(vec![Shape::new(vec![*batch, rest.iter().product()])])
                    }
                    None => Err(self.invalid("cannot flatten a scalar")),
                }
            }
            BlockKind::Lambda { shape_fn, .. } => Ok(shape_fn(inputs)),
        }
    }

    /// Shape of the named direct parameter for the given inputs.
    pub(crate) fn parameter_shape(&self, name: &str, inputs: &[Shape]) -> Result<Shape> {
        match self {
            BlockKind::Linear { units, bias } => {
                let input = self.first_input(inputs)?;
                let features = input
                    .dims()
                    .last()
                    .copied()
                    .ok_or_else(|| self.invalid("input must have at least one axis"))?;
                match name {
                    "weight" => Ok(Shape::new(vec![*units, features])),
                    "bias" if *bias => Ok(Shape::new(vec![*units])),
                    _ => Err(BlockError::UnknownParameter {
                        block: self.type_name().to_string(),
                        name: name.to_string(),
                    }),
                }
            }
            other => Err(BlockError::NoParameters {
                block: other.type_name().to_string(),
            }),
        }
    }

    fn first_input<'a>(&self, inputs: &'a [Shape]) -> Result<&'a Shape> {
        inputs.first().ok_or_else(|| self.invalid("expected one input"))
    }

    fn invalid(&self, detail: &str) -> BlockError {
        BlockError::InvalidInput {
            block: self.type_name().to_string(),
            detail: detail.to_string(),
        }
    }
}
