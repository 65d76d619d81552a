// Copyright (c) ONNX Project Contributors
// SPDX-License-Identifier: Apache-2.0

//! `Softmax`, grounded in `original_source/src/nodes/softmax.h`.
//!
//! `exp(x - max) / sum(exp(x - max))`, reduced over every axis at or after
//! `axis`. Three passes over the reduced dimensions share the outer loops
//! over `0..axis`: find `max`, accumulate `exp(x - max)` into `sum` while
//! writing it to `Y`, then divide `Y` by `sum`.

use crate::error::Result;
use crate::graph::Graph;
use crate::operator::{Operator, OperatorInstance};
use crate::ops::common::*;
use crate::tensor::Tensor;

#[derive(Debug)]
pub struct Softmax {
    axis: i64,
}

impl Default for Softmax {
    fn default() -> Self {
        Softmax { axis: 1 }
    }
}

impl Operator for Softmax {
    fn parse_attributes(&mut self, attrs: &[crate::attribute::Attr]) -> Result<()> {
        self.axis = attr_int(attrs, "axis", 1);
        reject_unknown_attrs(attrs, &["axis"], "Softmax")
    }

    fn resolve(&mut self, graph: &mut Graph, inst: &mut OperatorInstance) -> Result<()> {
        let x_id = input_id(inst, 0, "Softmax")?;
        inst.register_input(x_id, "X");
        let x = graph.tensor(x_id);
        require(type_constraint_all_floating_points(x), "Softmax: incorrect input type")?;
        let y = Tensor::new(graph.anonymous_name("Softmax_out"), x.data_type, x.shape.clone());
        let y_id = graph.add_tensor(y);
        inst.register_output(y_id, "Y");
        Ok(())
    }

    fn emit_body(&self, inst: &OperatorInstance, graph: &Graph, out: &mut String) -> Result<()> {
        let x = graph.tensor(inst.input_params[0].tensor);
        let n_dim = x.rank();
        let flatten_axis = if self.axis < 0 { (n_dim as i64 + self.axis) as usize } else { self.axis as usize };
        let expfunc = if x.c_type() == "double" { "exp" } else { "expf" };

        let idxs: String = (0..n_dim).map(|i| format!("[i{i}]")).collect();

        out.push_str(&format!(
            "{ind}/* Softmax: axis = {} */\n{ind}{ty} sum = 0;\n{ind}{ty} max = -INFINITY;\n",
            self.axis,
            ind = crate::util::indent(1),
            ty = x.c_type()
        ));

        for i in 0..n_dim {
            out.push_str(&loop_open(&format!("i{i}"), x.shape.dim(i), 1));
        }

        out.push_str(&format!(
            "{ind}max = max > X{idxs} ? max : X{idxs};\n",
            ind = crate::util::indent(n_dim + 1)
        ));
        for i in (flatten_axis..n_dim).rev() {
            out.push_str(&loop_close(i + 1));
        }

        for i in flatten_axis..n_dim {
            out.push_str(&loop_open(&format!("i{i}"), x.shape.dim(i), i + 1));
        }
        out.push_str(&format!(
            "{ind}Y{idxs} = {expfunc}(X{idxs} - max);\n{ind}sum += Y{idxs};\n",
            ind = crate::util::indent(n_dim + 1)
        ));
        for i in (flatten_axis..n_dim).rev() {
            out.push_str(&loop_close(i + 1));
        }

        for i in flatten_axis..n_dim {
            out.push_str(&loop_open(&format!("i{i}"), x.shape.dim(i), i + 1));
        }
        out.push_str(&format!("{ind}Y{idxs} /= sum;\n", ind = crate::util::indent(n_dim + 1)));
        for i in (flatten_axis..n_dim).rev() {
            out.push_str(&loop_close(i + 1));
        }

        out.push_str(&format!("{ind}sum = 0;\n{ind}max = -INFINITY;\n", ind = crate::util::indent(1)));

        for i in (0..flatten_axis).rev() {
            out.push_str(&loop_close(i + 1));
        }
        Ok(())
    }
}

pub fn register(r: &mut crate::registry::OpRegistry) {
    crate::registry::reg(r, "Softmax", || Box::new(Softmax::default()));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attribute::Attr;
    use crate::enums::DataType;
    use crate::shape::Shape;

    #[test]
    fn softmax_preserves_shape_and_dtype() {
        let mut graph = Graph::new();
        let mut x = Tensor::new("x", DataType::Float, Shape::new(vec![2, 3]));
        x.is_io = true;
        let x_id = graph.add_tensor(x);
        let mut inst = OperatorInstance::new("Softmax", "sm1", Box::new(Softmax::default()));
        inst.inputs = vec![Some(x_id)];
        let mut op = Softmax::default();
        op.parse_attributes(&[] as &[Attr]).unwrap();
        op.resolve(&mut graph, &mut inst).unwrap();
        let y = graph.tensor(inst.output_params[0].tensor);
        assert_eq!(y.shape.dims(), &[2, 3]);
        assert_eq!(y.data_type, DataType::Float);
    }
}
