// Copyright (c) ONNX Project Contributors
// SPDX-License-Identifier: Apache-2.0

//! `Slice`, grounded in `original_source/src/nodes/slice.h`.
//!
//! `starts`/`ends`/`axes`/`steps` must all be compile-time constants — this
//! compiler has no representation for a run-time-varying slice window.

use crate::error::{CompileError, Result};
use crate::graph::Graph;
use crate::operator::{Operator, OperatorInstance};
use crate::ops::common::*;
use crate::shape::Shape;
use crate::tensor::Tensor;

#[derive(Debug, Default)]
pub struct Slice {
    sta: Vec<i64>,
    en: Vec<i64>,
    stp: Vec<i64>,
}

impl Operator for Slice {
    fn parse_attributes(&mut self, attrs: &[crate::attribute::Attr]) -> Result<()> {
        reject_unknown_attrs(attrs, &[], "Slice")
    }

    fn resolve(&mut self, graph: &mut Graph, inst: &mut OperatorInstance) -> Result<()> {
        let data_id = input_id(inst, 0, "Slice")?;
        let starts_id = input_id(inst, 1, "Slice")?;
        let ends_id = input_id(inst, 2, "Slice")?;
        inst.register_input(data_id, "X");
        inst.register_input(starts_id, "starts");
        inst.register_input(ends_id, "ends");

        let data = graph.tensor(data_id);
        let starts = graph.tensor(starts_id);
        let ends = graph.tensor(ends_id);
        require(starts.is_const, "Slice: non-const `starts` not handled")?;
        require(ends.is_const, "Slice: non-const `ends` not handled")?;

        let ddim = data.rank();
        let mut sta = vec![0i64; ddim];
        let mut en: Vec<i64> = (0..ddim).map(|d| data.shape.dim(d) as i64).collect();
        let mut stp = vec![1i64; ddim];

        let axes_id = inst.input(3);
        let steps_id = inst.input(4);
        if let Some(id) = axes_id {
            inst.register_input(id, "axes");
        }
        if let Some(id) = steps_id {
            inst.register_input(id, "steps");
        }

        let starts_data = starts
            .as_i64_vec()
            .ok_or_else(|| CompileError::incorrect_input("Slice: `starts` is not a readable int64 constant", None))?;
        let ends_data = ends
            .as_i64_vec()
            .ok_or_else(|| CompileError::incorrect_input("Slice: `ends` is not a readable int64 constant", None))?;
        let axes_data = match axes_id {
            Some(id) => {
                let t = graph.tensor(id);
                require(t.is_const, "Slice: non-const `axes` not handled")?;
                Some(
                    t.as_i64_vec()
                        .ok_or_else(|| CompileError::incorrect_input("Slice: `axes` is not a readable int64 constant", None))?,
                )
            }
            None => None,
        };
        let steps_data = match steps_id {
            Some(id) => {
                let t = graph.tensor(id);
                require(t.is_const, "Slice: non-const `steps` not handled")?;
                Some(
                    t.as_i64_vec()
                        .ok_or_else(|| CompileError::incorrect_input("Slice: `steps` is not a readable int64 constant", None))?,
                )
            }
            None => None,
        };

        let expected_size = axes_data.as_ref().map(|a| a.len()).unwrap_or(ddim);
        require(starts_data.len() == expected_size, "Slice: `starts` has the wrong element count")?;
        require(ends_data.len() == expected_size, "Slice: `ends` has the wrong element count")?;
        if let Some(s) = &steps_data {
            require(s.len() == expected_size, "Slice: `steps` has the wrong element count")?;
        }

        if let Some(axes) = &axes_data {
            for (i, &raw_d) in axes.iter().enumerate() {
                let d = if raw_d < 0 { ddim as i64 + raw_d } else { raw_d } as usize;
                sta[d] = starts_data[i];
                en[d] = ends_data[i];
                if let Some(s) = &steps_data {
                    stp[d] = s[i];
                }
            }
        } else {
            for d in 0..ddim {
                sta[d] = starts_data[d];
                en[d] = ends_data[d];
                if let Some(s) = &steps_data {
                    stp[d] = s[d];
                }
            }
        }

        let mut out_dims = Vec::with_capacity(ddim);
        for d in 0..ddim {
            let in_size = data.shape.dim(d) as i64;
            let mut s = sta[d];
            let mut e = en[d];
            let mut st = stp[d];
            if s < 0 {
                s += in_size;
            }
            if e < 0 {
                e += in_size;
            }
            if s >= in_size {
                s = in_size;
            }
            if e >= in_size {
                e = in_size;
            }
            sta[d] = s;
            en[d] = e;

            let mut num = 0i64;
            if s > e {
                std::mem::swap(&mut s, &mut e);
                s -= 1;
                e -= 1;
                if s < 0 {
                    s = 0;
                }
                if e > in_size {
                    e = in_size;
                }
                st = -st;
            }
            let mut n = s;
            while n < e {
                num += 1;
                n += st;
            }
            require(num > 0, "Slice: tensor sliced to have dimension of size 0 is not implemented")?;
            out_dims.push(num as usize);
        }

        self.sta = sta;
        self.en = en;
        self.stp = stp;

        let y = Tensor::new(graph.anonymous_name("Slice_out"), data.data_type, Shape::new(out_dims));
        let y_id = graph.add_tensor(y);
        inst.register_output(y_id, "Y");
        Ok(())
    }

    fn emit_body(&self, inst: &OperatorInstance, graph: &Graph, out: &mut String) -> Result<()> {
        let data = graph.tensor(inst.input_params[0].tensor);
        let y = graph.tensor(inst.output_params[0].tensor);
        out.push_str(&format!("{}/* Slice */\n", crate::util::indent(1)));

        let mut out_idx = String::new();
        let mut in_idx = String::new();
        for d in 0..data.rank() {
            let in_size = data.shape.dim(d) as i64;
            let mut s = self.sta[d];
            let e = self.en[d];
            if s > e && s == in_size {
                s -= 1;
            }
            out.push_str(&format!(
                "{ind}for (int i{d} = {s}, o{d} = 0; o{d} < {bound}; i{d} += {step}, o{d}++) {{\n",
                ind = crate::util::indent(1),
                bound = y.shape.dim(d),
                step = self.stp[d]
            ));
            out_idx.push_str(&format!("[o{d}]"));
            in_idx.push_str(&format!("[i{d}]"));
        }
        out.push_str(&format!("{}Y{out_idx} = X{in_idx};\n", crate::util::indent(2)));
        for _ in 0..data.rank() {
            out.push_str(&crate::util::indent(1));
            out.push_str("}\n");
        }
        Ok(())
    }
}

pub fn register(r: &mut crate::registry::OpRegistry) {
    crate::registry::reg(r, "Slice", || Box::new(Slice::default()));
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
    fn slice_basic_range_resolves_output_dims() {
        let mut graph = Graph::new();
        let mut x = Tensor::new("x", DataType::Float, Shape::new(vec![10]));
        x.is_io = true;
        let x = graph.add_tensor(x);
        let starts = push_const_i64(&mut graph, "starts", &[1]);
        let ends = push_const_i64(&mut graph, "ends", &[4]);
        let mut inst = OperatorInstance::new("Slice", "s1", Box::new(Slice::default()));
        inst.inputs = vec![Some(x), Some(starts), Some(ends)];
        let mut op = Slice::default();
        op.resolve(&mut graph, &mut inst).unwrap();
        let y = graph.tensor(inst.output_params[0].tensor);
        assert_eq!(y.shape.dims(), &[3]);
    }
}
