// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Learnable tensors with an accumulated gradient.

use crate::{Tensor, TensorError};

/// A learnable value plus the gradient accumulated by backward passes.
///
/// The gradient is allocated on the first [`accumulate_grad`] and summed
/// into afterwards, until [`zero_grad`] clears it.
///
/// [`accumulate_grad`]: Parameter::accumulate_grad
/// [`zero_grad`]: Parameter::zero_grad
#[derive(Debug, Clone)]
pub struct Parameter {
    value: Tensor,
    grad: Option<Tensor>,
}

impl Parameter {
    pub fn new(value: Tensor) -> Self {
        Self { value, grad: None }
    }

    pub fn value(&self) -> &Tensor {
        &self.value
    }

    pub fn value_mut(&mut self) -> &mut Tensor {
        &mut self.value
    }

    /// The accumulated gradient, if any backward pass has run.
    pub fn grad(&self) -> Option<&Tensor> {
        self.grad.as_ref()
    }

    /// Adds `delta` to the gradient.
    ///
    /// # Errors
    /// [`TensorError::ShapeMismatch`] or [`TensorError::DTypeMismatch`]
    /// when `delta` does not match the value.
    pub fn accumulate_grad(&mut self, delta: &Tensor) -> Result<(), TensorError> {
        crate::tensor::check_operands("accumulate_grad", &self.value, delta)?;
        match &mut self.grad {
            Some(g) => {
                let sum = g.add(delta)?;
                *g = sum;
            }
            None => self.grad = Some(delta.to_contiguous()?),
        }
        Ok(())
    }

    pub fn zero_grad(&mut self) {
        self.grad = None;
    }

    /// Consumes the parameter, returning the value.
    pub fn into_value(self) -> Tensor {
        self.value
    }
}

impl From<Tensor> for Parameter {
    fn from(value: Tensor) -> Self {
        Self::new(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{DType, Shape};

    #[test]
    fn test_grad_accumulates() {
        let mut p = Parameter::new(Tensor::new(DType::F32, Shape::vector(2)).unwrap());
        assert!(p.grad().is_none());
        let g = Tensor::from_slice(Shape::vector(2), &[1.0f32, 2.0]).unwrap();
        p.accumulate_grad(&g).unwrap();
        p.accumulate_grad(&g).unwrap();
        assert_eq!(p.grad().unwrap().to_vec::<f32>().unwrap(), vec![2.0, 4.0]);
        // The first gradient is copied, not shared.
        assert_eq!(g.to_vec::<f32>().unwrap(), vec![1.0, 2.0]);

        p.zero_grad();
        assert!(p.grad().is_none());
    }

    #[test]
    fn test_grad_shape_checked() {
        let mut p = Parameter::new(Tensor::new(DType::F32, Shape::vector(2)).unwrap());
        let wrong = Tensor::new(DType::F32, Shape::vector(3)).unwrap();
        assert!(matches!(
            p.accumulate_grad(&wrong),
            Err(TensorError::ShapeMismatch { .. })
        ));
    }
}
