// Copyright (c) ONNX Project Contributors
// SPDX-License-Identifier: Apache-2.0

//! Shared helpers for operator `resolve`/`emit_body` implementations: the
//! type-constraint predicates named in §4.3, attribute parsing shortcuts,
//! and the multidirectional broadcasting law of §8 property 7.

use crate::attribute::Attr;
use crate::enums::DataType;
use crate::error::{CompileError, Result};
use crate::graph::Graph;
use crate::ids::TensorId;
use crate::tensor::Tensor;

pub fn attr<'a>(attrs: &'a [Attr], name: &str) -> Option<&'a Attr> {
    attrs.iter().find(|a| a.name == name)
}

pub fn attr_int(attrs: &[Attr], name: &str, default: i64) -> i64 {
    attr(attrs, name).and_then(|a| a.as_int()).unwrap_or(default)
}

pub fn attr_float(attrs: &[Attr], name: &str, default: f32) -> f32 {
    attr(attrs, name).and_then(|a| a.as_float()).unwrap_or(default)
}

pub fn attr_string<'a>(attrs: &'a [Attr], name: &str, default: &'a str) -> &'a str {
    attr(attrs, name).and_then(|a| a.as_string()).unwrap_or(default)
}

pub fn attr_ints(attrs: &[Attr], name: &str) -> Vec<i64> {
    attr(attrs, name).and_then(|a| a.as_ints()).map(|v| v.to_vec()).unwrap_or_default()
}

/// Fails conservatively (§4.3's "conservative default is fail") on any
/// attribute name outside `known`.
pub fn reject_unknown_attrs(attrs: &[Attr], known: &[&str], op_kind: &str) -> Result<()> {
    for a in attrs {
        if !known.contains(&a.name.as_str()) {
            return Err(CompileError::incorrect_input(
                format!("unknown attribute `{}` for {op_kind}", a.name),
                None,
            ));
        }
    }
    Ok(())
}

// --- Type constraints (§4.3) ------------------------------------------------

pub fn type_constraint_high_precision_numeric(t: &Tensor) -> bool {
    matches!(
        t.data_type,
        DataType::Float | DataType::Double | DataType::Float16 | DataType::Bfloat16 | DataType::Int32 | DataType::Int64
    )
}

pub fn type_constraint_plain_floating_points(t: &Tensor) -> bool {
    matches!(t.data_type, DataType::Float | DataType::Double)
}

pub fn type_constraint_all_floating_points(t: &Tensor) -> bool {
    matches!(t.data_type, DataType::Float | DataType::Double | DataType::Float16 | DataType::Bfloat16)
}

pub fn type_constraint_int64(t: &Tensor) -> bool {
    t.data_type == DataType::Int64
}

pub fn type_constraint_8bit(t: &Tensor) -> bool {
    matches!(t.data_type, DataType::Int8 | DataType::Uint8)
}

pub fn type_constraint_signed_integer(t: &Tensor) -> bool {
    matches!(t.data_type, DataType::Int8 | DataType::Int16 | DataType::Int32 | DataType::Int64)
}

pub fn type_constraint_unsigned_integer(t: &Tensor) -> bool {
    matches!(t.data_type, DataType::Uint8 | DataType::Uint16 | DataType::Uint32 | DataType::Uint64)
}

pub fn require(cond: bool, message: impl Into<String>) -> Result<()> {
    if cond {
        Ok(())
    } else {
        Err(CompileError::incorrect_input(message, None))
    }
}

// --- Shape helpers -----------------------------------------------------------

/// §4.3 "Elementwise": pads the shorter shape with leading 1s, then
/// requires equal-or-one per axis; result is the per-axis max. This is the
/// law §8 property 7 checks.
pub fn multidirectional_broadcast(shapes: &[&[usize]]) -> Result<Vec<usize>> {
    let rank = shapes.iter().map(|s| s.len()).max().unwrap_or(0);
    let padded: Vec<Vec<usize>> = shapes
        .iter()
        .map(|s| {
            let mut v = vec![1usize; rank - s.len()];
            v.extend_from_slice(s);
            v
        })
        .collect();
    let mut out = vec![1usize; rank];
    for axis in 0..rank {
        let mut dim = 1usize;
        for p in &padded {
            let d = p[axis];
            if d == dim || d == 1 {
                dim = dim.max(d);
            } else if dim == 1 {
                dim = d;
            } else {
                return Err(CompileError::incorrect_input(
                    format!("broadcast shape mismatch at axis {axis}: {d} vs {dim}"),
                    None,
                ));
            }
        }
        out[axis] = dim;
    }
    Ok(out)
}

/// The indexing-string for one broadcast operand at a given output rank:
/// collapses any axis where the operand's (left-padded) extent is 1 to
/// `[0]`, per §8 property 7's "emitter's inner index strings" clause.
pub fn broadcast_index_string(operand_shape: &[usize], out_rank: usize, loop_vars: &[String]) -> String {
    let pad = out_rank - operand_shape.len();
    let mut s = String::new();
    for axis in 0..out_rank {
        if axis < pad {
            s.push_str("[0]");
            continue;
        }
        let dim = operand_shape[axis - pad];
        if dim == 1 {
            s.push_str("[0]");
        } else {
            s.push('[');
            s.push_str(&loop_vars[axis]);
            s.push(']');
        }
    }
    s
}

pub fn loop_open(var: &str, bound: usize, indent: usize) -> String {
    format!(
        "{}for (uint32_t {var} = 0; {var} < {bound}; {var}++) {{\n",
        crate::util::indent(indent)
    )
}

pub fn loop_close(indent: usize) -> String {
    format!("{}}}\n", crate::util::indent(indent))
}

/// Fetches the resolved input tensor, erroring with `IncorrectInput` if the
/// (required) input slot is missing.
pub fn require_input<'a>(graph: &'a Graph, inst: &crate::operator::OperatorInstance, i: usize, op_kind: &str) -> Result<&'a Tensor> {
    let id = inst
        .input(i)
        .ok_or_else(|| CompileError::incorrect_input(format!("{op_kind}: missing required input {i}"), inst.onnx_name.clone()))?;
    Ok(graph.tensor(id))
}

pub fn input_id(inst: &crate::operator::OperatorInstance, i: usize, op_kind: &str) -> Result<TensorId> {
    inst.input(i)
        .ok_or_else(|| CompileError::incorrect_input(format!("{op_kind}: missing required input {i}"), inst.onnx_name.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn broadcast_pads_and_takes_max() {
        let out = multidirectional_broadcast(&[&[3, 1, 5], &[1, 4, 1]]).unwrap();
        assert_eq!(out, vec![3, 4, 5]);
    }

    #[test]
    fn broadcast_rejects_mismatch() {
        let err = multidirectional_broadcast(&[&[3], &[4]]);
        assert!(err.is_err());
    }

    #[test]
    fn index_string_collapses_broadcast_axes() {
        let vars = vec!["i0".to_string(), "i1".to_string()];
        let s = broadcast_index_string(&[1, 5], 2, &vars);
        assert_eq!(s, "[0][i1]");
    }
}
