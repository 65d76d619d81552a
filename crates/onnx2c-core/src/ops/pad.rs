// Copyright (c) ONNX Project Contributors
// SPDX-License-Identifier: Apache-2.0

//! `Pad`, grounded in `original_source/src/nodes/pad.h`.
//!
//! `pads` and the optional `constant_value` must be compile-time constants,
//! matching the compiler-wide rule that a shape-affecting input can never be
//! a runtime value (§4.3). Only the whole-rank form of `pads` is supported —
//! an `axes` input selecting a strict subset of axes is rejected as an
//! unimplemented feature rather than silently padding zero on the rest.

use crate::error::{CompileError, Result};
use crate::graph::Graph;
use crate::operator::{Operator, OperatorInstance};
use crate::ops::common::*;
use crate::shape::Shape;
use crate::tensor::Tensor;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Constant,
    Edge,
    Reflect,
}

#[derive(Debug, Default)]
pub struct Pad {
    mode: Option<Mode>,
    begin: Vec<i64>,
}

impl Operator for Pad {
    fn parse_attributes(&mut self, attrs: &[crate::attribute::Attr]) -> Result<()> {
        reject_unknown_attrs(attrs, &["mode"], "Pad")?;
        self.mode = Some(match attr_string(attrs, "mode", "constant") {
            "constant" => Mode::Constant,
            "edge" => Mode::Edge,
            "reflect" => Mode::Reflect,
            other => {
                return Err(CompileError::unimplemented_feature(format!("Pad: mode `{other}`"), None));
            }
        });
        Ok(())
    }

    fn resolve(&mut self, graph: &mut Graph, inst: &mut OperatorInstance) -> Result<()> {
        let data_id = input_id(inst, 0, "Pad")?;
        let pads_id = input_id(inst, 1, "Pad")?;
        inst.register_input(data_id, "X");
        inst.register_input(pads_id, "pads");

        let data = graph.tensor(data_id);
        let pads = graph.tensor(pads_id);
        require(pads.is_const, "Pad: non-const `pads` not handled")?;

        if let Some(cv_id) = inst.input(2) {
            inst.register_input(cv_id, "constant_value");
        }
        require(inst.input(3).is_none(), "Pad: `axes` input (partial-rank padding) is not implemented")?;

        let rank = data.rank();
        let pads_data = pads
            .as_i64_vec()
            .ok_or_else(|| CompileError::incorrect_input("Pad: `pads` is not a readable int64 constant", None))?;
        require(pads_data.len() == rank * 2, "Pad: `pads` must have 2*rank elements")?;

        let begin: Vec<i64> = pads_data[..rank].to_vec();
        let end: Vec<i64> = pads_data[rank..].to_vec();
        self.begin = begin.clone();

        let mut out_dims = Vec::with_capacity(rank);
        for d in 0..rank {
            let v = data.shape.dim(d) as i64 + begin[d] + end[d];
            require(v > 0, "Pad: negative total padding produced empty dimension")?;
            out_dims.push(v as usize);
        }

        let y = Tensor::new(graph.anonymous_name("Pad_out"), data.data_type, Shape::new(out_dims));
        let y_id = graph.add_tensor(y);
        inst.register_output(y_id, "Y");
        Ok(())
    }

    fn emit_body(&self, inst: &OperatorInstance, graph: &Graph, out: &mut String) -> Result<()> {
        let data = graph.tensor(inst.input_params[0].tensor);
        let y = graph.tensor(inst.output_params[0].tensor);
        let rank = data.rank();
        let mode = self.mode.expect("parse_attributes always sets mode");

        let const_value = inst
            .input_params
            .iter()
            .find(|p| p.local_name == "constant_value")
            .map(|p| p.local_name.clone())
            .unwrap_or_default();

        for d in 0..rank {
            out.push_str(&format!(
                "{ind}for (int32_t o{d} = 0; o{d} < {bound}; o{d}++) {{\n",
                ind = crate::util::indent(1 + d),
                bound = y.shape.dim(d)
            ));
        }
        let body_indent = crate::util::indent(1 + rank);

        for d in 0..rank {
            out.push_str(&format!("{body_indent}int32_t ii{d} = o{d} - ({});\n", self.begin[d]));
        }

        let out_idx: String = (0..rank).map(|d| format!("[o{d}]")).collect();
        let in_idx: String = (0..rank).map(|d| format!("[ii{d}]")).collect();

        match mode {
            Mode::Constant => {
                let conds: Vec<String> = (0..rank)
                    .map(|d| format!("ii{d} < 0 || ii{d} >= {}", data.shape.dim(d)))
                    .collect();
                out.push_str(&format!("{body_indent}if ({}) {{\n", conds.join(" || ")));
                if const_value.is_empty() {
                    out.push_str(&format!("{body_indent}    Y{out_idx} = 0;\n"));
                } else {
                    out.push_str(&format!("{body_indent}    Y{out_idx} = *{const_value};\n"));
                }
                out.push_str(&format!("{body_indent}}} else {{\n"));
                out.push_str(&format!("{body_indent}    Y{out_idx} = X{in_idx};\n"));
                out.push_str(&format!("{body_indent}}}\n"));
            }
            Mode::Edge => {
                for d in 0..rank {
                    out.push_str(&format!(
                        "{body_indent}if (ii{d} < 0) ii{d} = 0;\n{body_indent}if (ii{d} >= {dim}) ii{d} = {dim} - 1;\n",
                        dim = data.shape.dim(d)
                    ));
                }
                out.push_str(&format!("{body_indent}Y{out_idx} = X{in_idx};\n"));
            }
            Mode::Reflect => {
                for d in 0..rank {
                    out.push_str(&format!(
                        "{body_indent}if (ii{d} < 0) ii{d} = -ii{d};\n{body_indent}if (ii{d} >= {dim}) ii{d} = 2 * ({dim} - 1) - ii{d};\n",
                        dim = data.shape.dim(d)
                    ));
                }
                out.push_str(&format!("{body_indent}Y{out_idx} = X{in_idx};\n"));
            }
        }

        for d in (0..rank).rev() {
            out.push_str(&format!("{}}}\n", crate::util::indent(1 + d)));
        }
        Ok(())
    }
}

pub fn register(r: &mut crate::registry::OpRegistry) {
    crate::registry::reg(r, "Pad", || Box::new(Pad::default()));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enums::DataType;

    fn push_const_i64(graph: &mut Graph, name: &str, values: &[i64]) -> crate::ids::TensorId {
        let mut buf = Vec::with_capacity(values.len() * 8);
        for v in values {
            buf.extend_from_slice(&v.to_le_bytes());
        }
        graph.add_tensor(Tensor::constant(name, DataType::Int64, Shape::new(vec![values.len()]), buf))
    }

    #[test]
    fn pad_constant_grows_each_axis() {
        let mut graph = Graph::new();
        let mut x = Tensor::new("x", DataType::Float, Shape::new(vec![2, 3]));
        x.is_io = true;
        let x = graph.add_tensor(x);
        let pads = push_const_i64(&mut graph, "pads", &[1, 1, 1, 1]);
        let mut inst = OperatorInstance::new("Pad", "p1", Box::new(Pad::default()));
        inst.inputs = vec![Some(x), Some(pads)];
        let mut op = Pad::default();
        op.parse_attributes(&[]).unwrap();
        op.resolve(&mut graph, &mut inst).unwrap();
        let y = graph.tensor(inst.output_params[0].tensor);
        assert_eq!(y.shape.dims(), &[4, 5]);
    }
}
