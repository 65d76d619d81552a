// Copyright (c) ONNX Project Contributors
// SPDX-License-Identifier: Apache-2.0

//! `MatMul`, grounded in `original_source/src/nodes/abstractmatmul.h`.
//!
//! Numpy-style matrix multiplication: trailing two axes of each operand are
//! the `(i, k)` / `(k, j)` matrix dims (a rank-1 operand drops its matrix
//! dim entirely), leading axes broadcast per the usual law.

use crate::error::Result;
use crate::graph::Graph;
use crate::operator::{Operator, OperatorInstance};
use crate::ops::common::*;
use crate::shape::Shape;
use crate::tensor::Tensor;

#[derive(Debug, Default)]
pub struct MatMul;

impl Operator for MatMul {
    fn parse_attributes(&mut self, attrs: &[crate::attribute::Attr]) -> Result<()> {
        reject_unknown_attrs(attrs, &[], "MatMul")
    }

    fn resolve(&mut self, graph: &mut Graph, inst: &mut OperatorInstance) -> Result<()> {
        let a_id = input_id(inst, 0, "MatMul")?;
        let b_id = input_id(inst, 1, "MatMul")?;
        inst.register_input(a_id, "A");
        inst.register_input(b_id, "B");

        let a = graph.tensor(a_id);
        let b = graph.tensor(b_id);
        require(a.rank() >= 1 && b.rank() >= 1, "MatMul: operands must have rank >= 1")?;

        let mut y_dim = Vec::new();
        if a.rank() > 2 || b.rank() > 2 {
            let leading = &a.shape.dims()[..a.rank().saturating_sub(2)];
            let leading_b = &b.shape.dims()[..b.rank().saturating_sub(2)];
            let broadcast = multidirectional_broadcast(&[leading, leading_b])?;

            let k_dim_a = a.shape.dim(a.rank() - 1);
            let k_dim_b = if b.rank() > 1 { b.shape.dim(b.rank() - 2) } else { b.shape.dim(0) };
            require(k_dim_a == k_dim_b, "MatMul: reduction dimension mismatch")?;

            y_dim.extend(broadcast);
        } else {
            let k_dim_a = a.shape.dim(a.rank() - 1);
            let k_dim_b = if b.rank() > 1 { b.shape.dim(b.rank() - 2) } else { b.shape.dim(0) };
            require(k_dim_a == k_dim_b, "MatMul: reduction dimension mismatch")?;
        }
        if a.rank() > 1 {
            y_dim.push(a.shape.dim(a.rank() - 2));
        }
        if b.rank() > 1 {
            y_dim.push(b.shape.dim(b.rank() - 1));
        }

        require(
            type_constraint_high_precision_numeric(a) && type_constraint_high_precision_numeric(b),
            "MatMul: incorrect input types",
        )?;

        let y = Tensor::new(graph.anonymous_name("MatMul_out"), a.data_type, Shape::new(y_dim));
        let y_id = graph.add_tensor(y);
        inst.register_output(y_id, "Y");
        Ok(())
    }

    fn emit_body(&self, inst: &OperatorInstance, graph: &Graph, out: &mut String) -> Result<()> {
        let a = graph.tensor(inst.input_params[0].tensor);
        let b = graph.tensor(inst.input_params[1].tensor);
        let y = graph.tensor(inst.output_params[0].tensor);

        out.push_str(&format!("{}/* MatMul */\n", crate::util::indent(1)));

        let mut broadcast_dims = y.rank();
        if a.rank() > 1 {
            broadcast_dims -= 1;
        }
        if b.rank() > 1 {
            broadcast_dims -= 1;
        }

        for i in 0..broadcast_dims {
            out.push_str(&format!(
                "{}for (unsigned i{i} = 0; i{i} < {}; i{i}++)\n",
                crate::util::indent(1),
                y.shape.dim(i)
            ));
        }

        let a_idx = if a.rank() == 1 {
            "[k]".to_string()
        } else {
            let mut s = String::new();
            for i in 0..a.rank() - 2 {
                if a.shape.dim(i) == 1 {
                    s.push_str("[0]");
                } else {
                    s.push_str(&format!("[i{}]", broadcast_dims - (a.rank() - 2) + i));
                }
            }
            s.push_str("[i][k]");
            s
        };

        let b_idx = if b.rank() == 1 {
            "[k]".to_string()
        } else {
            let mut s = String::new();
            for i in 0..b.rank() - 2 {
                if b.shape.dim(i) == 1 {
                    s.push_str("[0]");
                } else {
                    s.push_str(&format!("[i{}]", broadcast_dims - (b.rank() - 2) + i));
                }
            }
            s.push_str("[k][j]");
            s
        };

        let y_idx = if y.is_scalar() {
            "".to_string()
        } else {
            let mut s = String::new();
            for i in 0..broadcast_dims {
                s.push_str(&format!("[i{i}]"));
            }
            if a.rank() > 1 {
                s.push_str("[i]");
            }
            if b.rank() > 1 {
                s.push_str("[j]");
            }
            s
        };
        let y_ref = if y.is_scalar() { "(*Y)".to_string() } else { format!("Y{y_idx}") };

        let i_dim = if a.rank() > 1 { a.shape.dim(a.rank() - 2) } else { 1 };
        let j_dim = if b.rank() > 1 { b.shape.dim(b.rank() - 1) } else { 1 };
        let k_dim = a.shape.dim(a.rank() - 1);

        let i1 = crate::util::indent(1);
        let i2 = crate::util::indent(2);
        let i3 = crate::util::indent(3);

        out.push_str(&format!("{i1}{{\n"));
        out.push_str(&format!("{i2}for (unsigned i = 0; i < {i_dim}; i++)\n"));
        out.push_str(&format!("{i2}for (unsigned j = 0; j < {j_dim}; j++)\n"));
        out.push_str(&format!("{i2}{{\n"));
        out.push_str(&format!("{i3}{y_ref} = 0;\n"));
        out.push_str(&format!("{i3}for (unsigned k = 0; k < {k_dim}; k++)\n"));
        out.push_str(&format!("{i3}{{\n"));
        out.push_str(&format!("{}{y_ref} += A{a_idx} * B{b_idx};\n", crate::util::indent(4)));
        out.push_str(&format!("{i3}}}\n"));
        out.push_str(&format!("{i2}}}\n"));
        out.push_str(&format!("{i1}}}\n"));
        Ok(())
    }
}

pub fn register(r: &mut crate::registry::OpRegistry) {
    crate::registry::reg(r, "MatMul", || Box::new(MatMul));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attribute::Attr;
    use crate::enums::DataType;

    fn make_input(graph: &mut Graph, name: &str, dims: Vec<usize>) -> crate::ids::TensorId {
        let mut t = Tensor::new(name, DataType::Float, Shape::new(dims));
        t.is_io = true;
        graph.add_tensor(t)
    }

    #[test]
    fn matmul_2d_resolves_standard_shape() {
        let mut graph = Graph::new();
        let a = make_input(&mut graph, "a", vec![2, 3]);
        let b = make_input(&mut graph, "b", vec![3, 4]);
        let mut inst = OperatorInstance::new("MatMul", "mm1", Box::new(MatMul));
        inst.inputs = vec![Some(a), Some(b)];
        let mut op = MatMul;
        op.parse_attributes(&[] as &[Attr]).unwrap();
        op.resolve(&mut graph, &mut inst).unwrap();
        let y = graph.tensor(inst.output_params[0].tensor);
        assert_eq!(y.shape.dims(), &[2, 4]);
    }

    #[test]
    fn matmul_rejects_reduction_mismatch() {
        let mut graph = Graph::new();
        let a = make_input(&mut graph, "a", vec![2, 3]);
        let b = make_input(&mut graph, "b", vec![5, 4]);
        let mut inst = OperatorInstance::new("MatMul", "mm1", Box::new(MatMul));
        inst.inputs = vec![Some(a), Some(b)];
        let mut op = MatMul;
        op.parse_attributes(&[] as &[Attr]).unwrap();
        assert!(op.resolve(&mut graph, &mut inst).is_err());
    }
}
