// Copyright (c) ONNX Project Contributors
// SPDX-License-Identifier: Apache-2.0

//! The operator capability set (§3 "Operator instance", §4.3).
//!
//! An [`OperatorInstance`] is the graph-owned, resolved record of one ONNX
//! node: its `op_kind`, its wired input/output [`TensorId`]s, and the
//! [`Operator`] trait object holding the op-specific parsed attributes and
//! shape-inference/emission logic. Per §9 Design Notes, optional inputs are
//! carried explicitly as `None` slots rather than through a sentinel tensor.

use crate::error::Result;
use crate::graph::Graph;
use crate::ids::TensorId;
use std::fmt;

/// One `(tensor, local_name)` pair used when emitting a node's C function:
/// `local_name` is the identifier used inside the function body, decoupled
/// from the tensor's global `cname()`.
#[derive(Debug, Clone)]
pub struct Param {
    pub tensor: TensorId,
    pub local_name: String,
}

/// The graph-owned record of one resolved ONNX node.
#[derive(Debug)]
pub struct OperatorInstance {
    pub op_kind: String,
    pub onnx_name: String,
    /// Ordered like the ONNX operator spec's input list; `None` marks a
    /// missing optional input.
    pub inputs: Vec<Option<TensorId>>,
    /// Ordered like the ONNX operator spec's output list; `None` marks an
    /// output that was neither named nor needed as recursive state.
    pub outputs: Vec<Option<TensorId>>,
    pub input_params: Vec<Param>,
    pub output_params: Vec<Param>,
    pub is_resolved: bool,
    /// Per declared output slot: true iff some other node reads it, it is a
    /// graph output, or it is a carved-out recursive output (§4.1).
    pub output_used: Vec<bool>,
    pub op: Box<dyn Operator>,
}

impl OperatorInstance {
    pub fn new(op_kind: impl Into<String>, onnx_name: impl Into<String>, op: Box<dyn Operator>) -> Self {
        OperatorInstance {
            op_kind: op_kind.into(),
            onnx_name: onnx_name.into(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            input_params: Vec::new(),
            output_params: Vec::new(),
            is_resolved: false,
            output_used: Vec::new(),
            op,
        }
    }

    /// The C identifier this node's function is emitted under.
    pub fn cname(&self) -> String {
        format!("node_{}", crate::util::cify(&self.onnx_name))
    }

    /// Registers a resolved output tensor and its in-body local name (§3
    /// "register_output"). Appends to both `outputs` and `output_params`.
    pub fn register_output(&mut self, tensor: TensorId, local_name: impl Into<String>) {
        self.outputs.push(Some(tensor));
        self.output_params.push(Param {
            tensor,
            local_name: local_name.into(),
        });
    }

    /// Registers an input tensor's in-body local name (§3 "register_input"
    /// via `input_params`). The tensor itself must already be present in
    /// `inputs`.
    pub fn register_input(&mut self, tensor: TensorId, local_name: impl Into<String>) {
        self.input_params.push(Param {
            tensor,
            local_name: local_name.into(),
        });
    }

    pub fn input(&self, i: usize) -> Option<TensorId> {
        self.inputs.get(i).copied().flatten()
    }

    pub fn output(&self, i: usize) -> Option<TensorId> {
        self.outputs.get(i).copied().flatten()
    }
}

/// The capability set every ONNX operator family implements (§4.3).
///
/// Dispatch is a table lookup from `op_kind` string to a factory returning a
/// fresh `Box<dyn Operator>` (§4.4); this is the Rust rendition of "operators
/// form a closed sum type" from §9 Design Notes — a trait object standing in
/// for a tagged union with a method table.
pub trait Operator: fmt::Debug {
    /// Reads op-specific attributes. The conservative default (§4.3) is to
    /// fail on an unrecognized attribute name; ops that tolerate unknown
    /// attributes override this explicitly and `tracing::warn!` instead.
    fn parse_attributes(&mut self, attrs: &[crate::attribute::Attr]) -> Result<()>;

    /// Validates input types/shapes, computes output shape(s)/dtype(s), and
    /// registers output tensors via `inst.register_output`. `inst.inputs`
    /// is already populated by the resolver; this method additionally calls
    /// `inst.register_input` for every input it consumes, in parameter order.
    fn resolve(&mut self, graph: &mut Graph, inst: &mut OperatorInstance) -> Result<()>;

    /// Prints the parameter list for this node's function: at the
    /// definition site (`decorate = true`, with C array types) or at the
    /// call site inside `entry()` (`decorate = false`, identifiers only).
    /// Unused optional tensors are omitted from both.
    fn emit_signature(&self, inst: &OperatorInstance, graph: &Graph, decorate: bool) -> String {
        default_emit_signature(inst, graph, decorate)
    }

    /// Prints the C body computing outputs from inputs. May reference
    /// parameters only by their `local_name`.
    fn emit_body(&self, inst: &OperatorInstance, graph: &Graph, out: &mut String) -> Result<()>;
}

/// Shared default signature printer: one parameter per `input_params` +
/// `output_params` entry, in order. Most operators use this unmodified;
/// LSTM overrides it to skip aliased recursive outputs (§4.3).
pub fn default_emit_signature(inst: &OperatorInstance, graph: &Graph, decorate: bool) -> String {
    let mut parts = Vec::new();
    for p in inst.input_params.iter().chain(inst.output_params.iter()) {
        let t = graph.tensor(p.tensor);
        if decorate {
            parts.push(t.c_param_decl(&p.local_name));
        } else {
            parts.push(t.cname());
        }
    }
    parts.join(", ")
}
