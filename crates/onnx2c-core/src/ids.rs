// Copyright (c) ONNX Project Contributors
// SPDX-License-Identifier: Apache-2.0

//! Arena indices into [`crate::graph::Graph`].
//!
//! Tensors and operator instances reference each other only through these
//! newtypes. Neither side owns the other: the `Graph` arenas (`Vec<Tensor>`,
//! `Vec<Node>`) are the sole owners, which is what keeps the tensor/operator
//! cross-reference from becoming a reference cycle.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TensorId(pub(crate) u32);

impl TensorId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for TensorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "t{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) u32);

impl NodeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}
