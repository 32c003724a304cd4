// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Operation kinds carried by graph nodes.
//!
//! The allocator never executes ops. It only needs to know whether a
//! tensor is a leaf, whether it aliases another tensor's memory, and
//! whether its kernel may write its result over one of its inputs.

use crate::GraphError;
use std::str::FromStr;

/// The operation that produces a tensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Op {
    /// No producing op: a leaf (weight, input, constant).
    None,
    /// Byte-range view into another tensor.
    View,
    /// View with a different shape over the same bytes.
    Reshape,
    /// View with permuted axes.
    Permute,
    /// View with the two innermost axes swapped.
    Transpose,
    Dup,
    Cpy,
    Cont,
    Add,
    Sub,
    Mul,
    Div,
    Sqr,
    Sqrt,
    Log,
    Scale,
    Gelu,
    Silu,
    Relu,
    Norm,
    RmsNorm,
    SoftMax,
    DiagMaskInf,
    DiagMaskZero,
    Rope,
    MulMat,
    GetRows,
    Concat,
}

impl Op {
    /// Ops whose result aliases the memory of their source.
    pub fn is_view(self) -> bool {
        matches!(self, Op::View | Op::Reshape | Op::Permute | Op::Transpose)
    }

    /// Element-wise style ops whose kernels tolerate `dst == src`.
    ///
    /// The graph allocator may let such a node take over the region of a
    /// source whose only remaining consumer it is.
    pub fn can_inplace(self) -> bool {
        matches!(
            self,
            Op::Scale
                | Op::DiagMaskZero
                | Op::DiagMaskInf
                | Op::Add
                | Op::Sub
                | Op::Mul
                | Op::Div
                | Op::Sqr
                | Op::Sqrt
                | Op::Log
                | Op::Gelu
                | Op::Silu
                | Op::Relu
                | Op::Rope
                | Op::RmsNorm
                | Op::SoftMax
        )
    }

    /// Returns the snake_case name used in manifests.
    pub fn as_str(self) -> &'static str {
        match self {
            Op::None => "none",
            Op::View => "view",
            Op::Reshape => "reshape",
            Op::Permute => "permute",
            Op::Transpose => "transpose",
            Op::Dup => "dup",
            Op::Cpy => "cpy",
            Op::Cont => "cont",
            Op::Add => "add",
            Op::Sub => "sub",
            Op::Mul => "mul",
            Op::Div => "div",
            Op::Sqr => "sqr",
            Op::Sqrt => "sqrt",
            Op::Log => "log",
            Op::Scale => "scale",
            Op::Gelu => "gelu",
            Op::Silu => "silu",
            Op::Relu => "relu",
            Op::Norm => "norm",
            Op::RmsNorm => "rms_norm",
            Op::SoftMax => "soft_max",
            Op::DiagMaskInf => "diag_mask_inf",
            Op::DiagMaskZero => "diag_mask_zero",
            Op::Rope => "rope",
            Op::MulMat => "mul_mat",
            Op::GetRows => "get_rows",
            Op::Concat => "concat",
        }
    }
}

const ALL_OPS: &[Op] = &[
    Op::None,
    Op::View,
    Op::Reshape,
    Op::Permute,
    Op::Transpose,
    Op::Dup,
    Op::Cpy,
    Op::Cont,
    Op::Add,
    Op::Sub,
    Op::Mul,
    Op::Div,
    Op::Sqr,
    Op::Sqrt,
    Op::Log,
    Op::Scale,
    Op::Gelu,
    Op::Silu,
    Op::Relu,
    Op::Norm,
    Op::RmsNorm,
    Op::SoftMax,
    Op::DiagMaskInf,
    Op::DiagMaskZero,
    Op::Rope,
    Op::MulMat,
    Op::GetRows,
    Op::Concat,
];

impl FromStr for Op {
    type Err = GraphError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.to_lowercase();
        ALL_OPS
            .iter()
            .copied()
            .find(|op| op.as_str() == lower)
            .ok_or_else(|| GraphError::UnknownOp(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_roundtrip_names() {
        for &op in ALL_OPS {
            assert_eq!(op.as_str().parse::<Op>().unwrap(), op);
        }
        assert!("conv2d".parse::<Op>().is_err());
    }

    #[test]
    fn test_view_ops_never_inplace() {
        for &op in ALL_OPS.iter().filter(|op| op.is_view()) {
            assert!(!op.can_inplace(), "{} should not be in-place", op.as_str());
        }
    }

    #[test]
    fn test_mul_mat_not_inplace() {
        assert!(!Op::MulMat.can_inplace());
        assert!(Op::Add.can_inplace());
    }
}
