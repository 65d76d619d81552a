// Copyright (c) ONNX Project Contributors
// SPDX-License-Identifier: Apache-2.0

//! The resolved dataflow graph (§3 "Graph").
//!
//! Tensors and nodes are arena-allocated in append-only `Vec`s; every
//! cross-reference (a node's inputs/outputs, a tensor's `consumers`) is a
//! [`crate::ids::TensorId`]/[`crate::ids::NodeId`] index rather than an
//! owning pointer, which is what keeps the tensor <-> operator cycle from
//! being an actual reference cycle (§5, §9 Design Notes).

use crate::enums::DataType;
use crate::ids::{NodeId, TensorId};
use crate::operator::OperatorInstance;
use crate::tensor::Tensor;
use std::collections::HashMap;

#[derive(Debug)]
pub struct Graph {
    /// Append-only; stable iteration order used by the emitter (§3).
    pub tensors: Vec<Tensor>,
    /// Resolved operator instances, in the order `resolve()` succeeded —
    /// the canonical topological order for every later pass (§5).
    pub nodes: Vec<OperatorInstance>,
    /// Slot `i` holds the currently-resident tensor in arena slot `i`
    /// (§4.5). Populated by the unionization pass; empty until it runs.
    pub tensor_unions: Vec<Option<TensorId>>,
    pub ir_version: i64,
    pub opset_version: i64,
    /// `entry()`'s parameter order (§4.7): graph inputs, then graph outputs,
    /// each in ONNX declaration order. Populated by the loader once node
    /// resolution finishes.
    pub graph_inputs: Vec<TensorId>,
    pub graph_outputs: Vec<TensorId>,

    by_name: HashMap<String, TensorId>,
    anonymous_nodes: u32,
}

impl Graph {
    pub fn new() -> Self {
        Graph {
            tensors: Vec::new(),
            nodes: Vec::new(),
            tensor_unions: Vec::new(),
            ir_version: 0,
            opset_version: 0,
            graph_inputs: Vec::new(),
            graph_outputs: Vec::new(),
            by_name: HashMap::new(),
            anonymous_nodes: 0,
        }
    }

    pub fn tensor(&self, id: TensorId) -> &Tensor {
        &self.tensors[id.index()]
    }

    pub fn tensor_mut(&mut self, id: TensorId) -> &mut Tensor {
        &mut self.tensors[id.index()]
    }

    pub fn find_tensor(&self, name: &str) -> Option<TensorId> {
        self.by_name.get(name).copied()
    }

    /// Adds a tensor to the arena. A tensor named the same as an existing
    /// one triggers the merge semantics of §4.1: flags are OR-combined,
    /// a provided buffer is adopted, and the existing `TensorId` is
    /// returned rather than a new one — this is how a graph-input tensor is
    /// upgraded with initializer data.
    pub fn add_tensor(&mut self, tensor: Tensor) -> TensorId {
        if !tensor.name.is_empty() {
            if let Some(&existing) = self.by_name.get(&tensor.name) {
                let cur = &mut self.tensors[existing.index()];
                cur.initialize |= tensor.initialize;
                cur.is_io |= tensor.is_io;
                cur.is_recursive |= tensor.is_recursive;
                if tensor.buffer.is_some() {
                    cur.buffer = tensor.buffer;
                }
                if cur.data_type == DataType::Undefined {
                    cur.data_type = tensor.data_type;
                }
                if cur.shape.rank() == 0 && tensor.shape.rank() != 0 {
                    cur.shape = tensor.shape;
                }
                return existing;
            }
        }
        let id = TensorId(self.tensors.len() as u32);
        if !tensor.name.is_empty() {
            self.by_name.insert(tensor.name.clone(), id);
        }
        self.tensors.push(tensor);
        id
    }

    /// `anonymous_<op_kind>_<n>`, `n` a graph-scoped monotonic counter
    /// shared across all op kinds (§4.1).
    pub fn anonymous_name(&mut self, op_kind: &str) -> String {
        let n = self.anonymous_nodes;
        self.anonymous_nodes += 1;
        format!("anonymous_{op_kind}_{n}")
    }

    /// Renames a tensor after the fact, updating the `by_name` lookup table
    /// along with it (§4.1). The loader uses this to swap an operator's
    /// internal `anonymous_name` placeholder for the ONNX-declared output
    /// name once a node resolves.
    pub fn rename_tensor(&mut self, id: TensorId, new_name: impl Into<String>) {
        let new_name = new_name.into();
        let old_name = std::mem::replace(&mut self.tensors[id.index()].name, new_name.clone());
        if !old_name.is_empty() {
            self.by_name.remove(&old_name);
        }
        if !new_name.is_empty() {
            self.by_name.insert(new_name, id);
        }
    }

    /// Appends a resolved node, wiring the back-reference: pushes this
    /// node's id into every (non-`None`) input tensor's `consumers` (§4.1
    /// "wire inputs").
    pub fn push_node(&mut self, node: OperatorInstance) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        for input in node.inputs.iter().flatten() {
            self.tensors[input.index()].consumers.push(id);
        }
        self.nodes.push(node);
        id
    }

    pub fn node(&self, id: NodeId) -> &OperatorInstance {
        &self.nodes[id.index()]
    }
}

impl Default for Graph {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shape::Shape;

    #[test]
    fn add_tensor_dedupes_by_name() {
        let mut g = Graph::new();
        let a = g.add_tensor(Tensor::new("x", DataType::Float, Shape::new(vec![2])));
        let b = g.add_tensor(Tensor::new("x", DataType::Float, Shape::new(vec![2])));
        assert_eq!(a, b);
        assert_eq!(g.tensors.len(), 1);
    }

    #[test]
    fn add_tensor_merges_initializer_into_graph_input() {
        let mut g = Graph::new();
        let mut input = Tensor::new("w", DataType::Float, Shape::new(vec![2]));
        input.is_io = true;
        g.add_tensor(input);

        let mut init = Tensor::new("w", DataType::Float, Shape::new(vec![2]));
        init.initialize = true;
        init.buffer = Some(vec![0u8; 8]);
        let id = g.add_tensor(init);

        let merged = g.tensor(id);
        assert!(merged.is_io);
        assert!(merged.initialize);
        assert!(merged.buffer.is_some());
    }

    #[test]
    fn anonymous_name_counter_is_monotonic_and_shared() {
        let mut g = Graph::new();
        assert_eq!(g.anonymous_name("Relu"), "anonymous_Relu_0");
        assert_eq!(g.anonymous_name("Add"), "anonymous_Add_1");
        assert_eq!(g.anonymous_name("Relu"), "anonymous_Relu_2");
    }
}
