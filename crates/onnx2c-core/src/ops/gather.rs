// Copyright (c) ONNX Project Contributors
// SPDX-License-Identifier: Apache-2.0

//! `Gather`, grounded in `original_source/src/nodes/gather.h`.
//!
//! `indices` must be a compile-time constant — this compiler has no
//! representation for a run-time-varying gather index set, so the emitted
//! body is a flattened copy loop with the gathered source offsets baked in
//! as literals, the same approach `slice.rs` takes for its window.

use crate::error::{CompileError, Result};
use crate::graph::Graph;
use crate::operator::{Operator, OperatorInstance};
use crate::ops::common::*;
use crate::shape::Shape;
use crate::tensor::Tensor;

#[derive(Debug, Default)]
pub struct Gather {
    axis_attr: i64,
    axis: usize,
    /// One flattened source index (already resolved, wraparound-adjusted)
    /// per output element, in row-major output order.
    src_offsets: Vec<usize>,
}

impl Operator for Gather {
    fn parse_attributes(&mut self, attrs: &[crate::attribute::Attr]) -> Result<()> {
        reject_unknown_attrs(attrs, &["axis"], "Gather")?;
        self.axis_attr = attr_int(attrs, "axis", 0);
        Ok(())
    }

    fn resolve(&mut self, graph: &mut Graph, inst: &mut OperatorInstance) -> Result<()> {
        let data_id = input_id(inst, 0, "Gather")?;
        let indices_id = input_id(inst, 1, "Gather")?;
        inst.register_input(data_id, "data");
        inst.register_input(indices_id, "indices");

        let data = graph.tensor(data_id);
        let indices = graph.tensor(indices_id);
        require(indices.is_const, "Gather: non-const `indices` not handled")?;

        let axis = data
            .shape
            .resolve_axis(self.axis_attr)
            .ok_or_else(|| CompileError::incorrect_input("Gather: `axis` out of range", inst.onnx_name.clone()))?;
        self.axis = axis;

        let idx_data = indices
            .as_i64_vec()
            .ok_or_else(|| CompileError::incorrect_input("Gather: `indices` is not a readable int64 constant", None))?;

        let axis_dim = data.shape.dim(axis) as i64;
        let mut resolved_indices = Vec::with_capacity(idx_data.len());
        for &raw in &idx_data {
            let v = if raw < 0 { raw + axis_dim } else { raw };
            require(v >= 0 && v < axis_dim, "Gather: index out of bounds")?;
            resolved_indices.push(v as usize);
        }

        let data_dims = data.shape.dims();
        let mut out_dims: Vec<usize> = data_dims[..axis].to_vec();
        out_dims.extend(indices.shape.dims());
        out_dims.extend(&data_dims[axis + 1..]);

        // Flatten: for every combination of (outer, gathered, inner) indices,
        // compute the row-major source offset.
        let outer: usize = data_dims[..axis].iter().product();
        let inner: usize = data_dims[axis + 1..].iter().product();
        let mut src_offsets = Vec::with_capacity(outer * resolved_indices.len() * inner);
        for o in 0..outer {
            for &gi in &resolved_indices {
                for i in 0..inner {
                    src_offsets.push((o * data_dims[axis] as usize + gi) * inner + i);
                }
            }
        }
        self.src_offsets = src_offsets;

        let y = Tensor::new(graph.anonymous_name("Gather_out"), data.data_type, Shape::new(out_dims));
        let y_id = graph.add_tensor(y);
        inst.register_output(y_id, "output");
        Ok(())
    }

    fn emit_body(&self, inst: &OperatorInstance, graph: &Graph, out: &mut String) -> Result<()> {
        let data = graph.tensor(inst.input_params[0].tensor);
        let i1 = crate::util::indent(1);
        let i2 = crate::util::indent(2);
        out.push_str(&format!("{i1}static const uint32_t gather_src[] = {{"));
        out.push_str(
            &self
                .src_offsets
                .iter()
                .map(|o| o.to_string())
                .collect::<Vec<_>>()
                .join(", "),
        );
        out.push_str("};\n");
        out.push_str(&format!(
            "{i1}const {ty} *flat_data = ({ty} *)data;\n",
            ty = data.c_type()
        ));
        out.push_str(&format!(
            "{i1}{ty} *flat_out = ({ty} *)output;\n",
            ty = data.c_type()
        ));
        out.push_str(&format!(
            "{i1}for (uint32_t i = 0; i < {n}; i++) {{\n{i2}flat_out[i] = flat_data[gather_src[i]];\n{i1}}}\n",
            n = self.src_offsets.len()
        ));
        Ok(())
    }
}

pub fn register(r: &mut crate::registry::OpRegistry) {
    crate::registry::reg(r, "Gather", || Box::new(Gather::default()));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enums::DataType;

    fn push_const_i64(graph: &mut Graph, name: &str, values: &[i64], dims: Vec<usize>) -> crate::ids::TensorId {
        let mut buf = Vec::with_capacity(values.len() * 8);
        for v in values {
            buf.extend_from_slice(&v.to_le_bytes());
        }
        graph.add_tensor(Tensor::constant(name, DataType::Int64, Shape::new(dims), buf))
    }

    #[test]
    fn gather_axis0_resolves_output_shape() {
        let mut graph = Graph::new();
        let mut x = Tensor::new("x", DataType::Float, Shape::new(vec![4, 3]));
        x.is_io = true;
        let x = graph.add_tensor(x);
        let indices = push_const_i64(&mut graph, "idx", &[0, 2], vec![2]);
        let mut inst = OperatorInstance::new("Gather", "g1", Box::new(Gather::default()));
        inst.inputs = vec![Some(x), Some(indices)];
        let mut op = Gather::default();
        op.parse_attributes(&[]).unwrap();
        op.resolve(&mut graph, &mut inst).unwrap();
        let y = graph.tensor(inst.output_params[0].tensor);
        assert_eq!(y.shape.dims(), &[2, 3]);
    }
}
