// Copyright (c) ONNX Project Contributors
// SPDX-License-Identifier: Apache-2.0

//! `Reshape`, `Squeeze`, `Unsqueeze`, `Flatten`, `Transpose`: the shape-only
//! family. Grounded in `original_source/src/nodes/{reshape,squeeze,
//! unsqueeze,flatten,transpose}.h`.
//!
//! `Reshape`/`Squeeze`/`Unsqueeze`/`Flatten` never reorder elements — the
//! output tensor occupies the same flat buffer as the input, so their bodies
//! are a single flat-index copy loop. `Transpose` does reorder; it emits a
//! rank-nested loop with input and output index strings built per `perm`.

use crate::enums::DataType;
use crate::error::{CompileError, Result};
use crate::graph::Graph;
use crate::operator::{Operator, OperatorInstance};
use crate::ops::common::*;
use crate::shape::Shape;
use crate::tensor::Tensor;

/// Emits `T *a = (T*)X; T *b = (T*)Y; for (i = 0; i < n; i++) b[i] = a[i];`
/// — the copy idiom shared by Reshape/Squeeze/Unsqueeze/Flatten.
fn emit_flat_copy(out: &mut String, x: &Tensor, y: &Tensor) {
    let n = x.shape.size().max(1);
    let ind = crate::util::indent(1);
    out.push_str(&format!("{ind}{} *data = ({}*)X;\n", x.c_type(), x.c_type()));
    out.push_str(&format!("{ind}{} *out_ = ({}*)Y;\n", y.c_type(), y.c_type()));
    out.push_str(&loop_open("i", n, 1));
    out.push_str(&format!("{}out_[i] = data[i];\n", crate::util::indent(2)));
    out.push_str(&loop_close(1));
}

#[derive(Debug, Default)]
pub struct Reshape;

impl Operator for Reshape {
    fn parse_attributes(&mut self, attrs: &[crate::attribute::Attr]) -> Result<()> {
        reject_unknown_attrs(attrs, &["allowzero"], "Reshape")
    }

    fn resolve(&mut self, graph: &mut Graph, inst: &mut OperatorInstance) -> Result<()> {
        let x_id = input_id(inst, 0, "Reshape")?;
        let shape_id = input_id(inst, 1, "Reshape")?;
        inst.register_input(x_id, "X");
        inst.register_input(shape_id, "shape");

        let x = graph.tensor(x_id);
        let shape_t = graph.tensor(shape_id);
        require(
            type_constraint_int64(shape_t),
            "Reshape: `shape` input must be int64",
        )?;
        require(
            shape_t.initialize,
            "Reshape: reshaping to a run-time-defined shape is not supported",
        )?;
        let new_shape = shape_t
            .as_i64_vec()
            .ok_or_else(|| CompileError::incorrect_input("Reshape: `shape` is not a readable int64 constant", None))?;

        // 0 copies the input's dimension at that axis, -1 infers the unique
        // remaining dimension from the total element count.
        let mut dims = vec![0usize; new_shape.len()];
        let mut infer_axis = None;
        let mut known_total: u64 = 1;
        for (i, d) in new_shape.iter().enumerate() {
            match *d {
                0 => {
                    require(i < x.rank(), "Reshape: dimension 0 (copy) has no corresponding input axis")?;
                    dims[i] = x.shape.dim(i);
                    known_total *= dims[i] as u64;
                }
                -1 => {
                    require(infer_axis.is_none(), "Reshape: at most one dimension may be -1")?;
                    infer_axis = Some(i);
                }
                d if d > 0 => {
                    dims[i] = d as usize;
                    known_total *= d as u64;
                }
                _ => return Err(CompileError::incorrect_input("Reshape: dimension must be >= -1", None)),
            }
        }
        if let Some(i) = infer_axis {
            require(known_total != 0, "Reshape: cannot infer a dimension when other dimensions multiply to 0")?;
            let total_elems = x.shape.size() as u64;
            require(
                total_elems % known_total == 0,
                "Reshape: requested shape does not match input element count",
            )?;
            dims[i] = (total_elems / known_total) as usize;
        } else {
            require(
                known_total == x.shape.size() as u64,
                "Reshape: requested shape does not match input element count",
            )?;
        }

        let y = Tensor::new(graph.anonymous_name("Reshape_out"), x.data_type, Shape::new(dims));
        let y_id = graph.add_tensor(y);
        inst.register_output(y_id, "Y");
        Ok(())
    }

    fn emit_body(&self, inst: &OperatorInstance, graph: &Graph, out: &mut String) -> Result<()> {
        let x = graph.tensor(inst.input_params[0].tensor);
        let y = graph.tensor(inst.output_params[0].tensor);
        emit_flat_copy(out, x, y);
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct Squeeze {
    axes: Vec<i64>,
}

impl Operator for Squeeze {
    fn parse_attributes(&mut self, attrs: &[crate::attribute::Attr]) -> Result<()> {
        self.axes = attr_ints(attrs, "axes");
        reject_unknown_attrs(attrs, &["axes"], "Squeeze")
    }

    fn resolve(&mut self, graph: &mut Graph, inst: &mut OperatorInstance) -> Result<()> {
        let x_id = input_id(inst, 0, "Squeeze")?;
        inst.register_input(x_id, "X");

        let mut axes = self.axes.clone();
        if let Some(axes_id) = inst.input(1) {
            inst.register_input(axes_id, "axes_tensor");
            let axes_t = graph.tensor(axes_id);
            require(axes_t.is_const, "Squeeze: provided axes are dynamic, not implemented")?;
            axes = axes_t
                .as_i64_vec()
                .ok_or_else(|| CompileError::incorrect_input("Squeeze: `axes` is not a readable int64 constant", None))?;
        }

        let x = graph.tensor(x_id);
        let rank = x.rank();
        if axes.is_empty() {
            axes = (0..rank).filter(|&i| x.shape.dim(i) == 1).map(|i| i as i64).collect();
        }
        require(!axes.is_empty(), "Squeeze: no axes to squeeze away")?;
        let axes: Vec<usize> = axes
            .into_iter()
            .map(|a| if a < 0 { (rank as i64 + a) as usize } else { a as usize })
            .collect();

        let mut dims = Vec::new();
        for i in 0..rank {
            if axes.contains(&i) {
                require(x.shape.dim(i) == 1, "Squeeze: attempting to squeeze an unsqueezable dimension")?;
            } else {
                dims.push(x.shape.dim(i));
            }
        }

        let y = Tensor::new(graph.anonymous_name("Squeeze_out"), x.data_type, Shape::new(dims));
        let y_id = graph.add_tensor(y);
        inst.register_output(y_id, "Y");
        Ok(())
    }

    fn emit_body(&self, inst: &OperatorInstance, graph: &Graph, out: &mut String) -> Result<()> {
        let x = graph.tensor(inst.input_params[0].tensor);
        let y = graph.tensor(inst.output_params[0].tensor);
        emit_flat_copy(out, x, y);
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct Unsqueeze {
    axes_attr: Vec<i64>,
}

impl Operator for Unsqueeze {
    fn parse_attributes(&mut self, attrs: &[crate::attribute::Attr]) -> Result<()> {
        self.axes_attr = attr_ints(attrs, "axes");
        reject_unknown_attrs(attrs, &["axes"], "Unsqueeze")
    }

    fn resolve(&mut self, graph: &mut Graph, inst: &mut OperatorInstance) -> Result<()> {
        let x_id = input_id(inst, 0, "Unsqueeze")?;
        inst.register_input(x_id, "X");

        let mut axes = self.axes_attr.clone();
        if axes.is_empty() {
            let axes_id = input_id(inst, 1, "Unsqueeze")?;
            inst.register_input(axes_id, "axes_tensor");
            let axes_t = graph.tensor(axes_id);
            require(
                axes_t.initialize && axes_t.is_const,
                "Unsqueeze: provided axes are dynamic, not implemented",
            )?;
            axes = axes_t
                .as_i64_vec()
                .ok_or_else(|| CompileError::incorrect_input("Unsqueeze: `axes` is not a readable int64 constant", None))?;
        }

        let x = graph.tensor(x_id);
        let expanded_rank = x.rank() + axes.len();
        let mut cleaned: Vec<usize> = axes
            .into_iter()
            .map(|a| if a < 0 { (expanded_rank as i64 + a) as usize } else { a as usize })
            .collect();
        cleaned.sort_unstable();

        let mut dims = vec![0usize; expanded_rank];
        let mut di = 0;
        let mut ai = 0;
        for (i, slot) in dims.iter_mut().enumerate() {
            if ai < cleaned.len() && cleaned[ai] == i {
                *slot = 1;
                ai += 1;
            } else {
                *slot = x.shape.dim(di);
                di += 1;
            }
        }

        let y = Tensor::new(graph.anonymous_name("Unsqueeze_out"), x.data_type, Shape::new(dims));
        let y_id = graph.add_tensor(y);
        inst.register_output(y_id, "Y");
        Ok(())
    }

    fn emit_body(&self, inst: &OperatorInstance, graph: &Graph, out: &mut String) -> Result<()> {
        let x = graph.tensor(inst.input_params[0].tensor);
        let y = graph.tensor(inst.output_params[0].tensor);
        emit_flat_copy(out, x, y);
        Ok(())
    }
}

#[derive(Debug)]
pub struct Flatten {
    axis: i64,
}

impl Default for Flatten {
    fn default() -> Self {
        Flatten { axis: 1 }
    }
}

impl Operator for Flatten {
    fn parse_attributes(&mut self, attrs: &[crate::attribute::Attr]) -> Result<()> {
        self.axis = attr_int(attrs, "axis", 1);
        reject_unknown_attrs(attrs, &["axis"], "Flatten")
    }

    fn resolve(&mut self, graph: &mut Graph, inst: &mut OperatorInstance) -> Result<()> {
        let x_id = input_id(inst, 0, "Flatten")?;
        inst.register_input(x_id, "X");
        let x = graph.tensor(x_id);
        let rank = x.rank() as i64;
        let count_axis = if self.axis < 0 { rank + self.axis } else { self.axis };
        require(count_axis >= 0 && count_axis <= rank, "Flatten: axis out of range")?;

        let outer: usize = (0..count_axis as usize).map(|i| x.shape.dim(i)).product();
        let inner: usize = (count_axis as usize..x.rank()).map(|i| x.shape.dim(i)).product();

        let y = Tensor::new(graph.anonymous_name("Flatten_out"), x.data_type, Shape::new(vec![outer, inner]));
        let y_id = graph.add_tensor(y);
        inst.register_output(y_id, "Y");
        Ok(())
    }

    fn emit_body(&self, inst: &OperatorInstance, graph: &Graph, out: &mut String) -> Result<()> {
        let x = graph.tensor(inst.input_params[0].tensor);
        let y = graph.tensor(inst.output_params[0].tensor);
        emit_flat_copy(out, x, y);
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct Transpose {
    perm: Vec<usize>,
}

impl Operator for Transpose {
    fn parse_attributes(&mut self, attrs: &[crate::attribute::Attr]) -> Result<()> {
        self.perm = attr_ints(attrs, "perm").into_iter().map(|p| p as usize).collect();
        reject_unknown_attrs(attrs, &["perm"], "Transpose")
    }

    fn resolve(&mut self, graph: &mut Graph, inst: &mut OperatorInstance) -> Result<()> {
        let x_id = input_id(inst, 0, "Transpose")?;
        inst.register_input(x_id, "X");
        let x = graph.tensor(x_id);
        let n_dim = x.rank();

        if self.perm.is_empty() {
            self.perm = (0..n_dim).rev().collect();
        }
        require(self.perm.len() == n_dim, "Transpose: `perm` length does not match input rank")?;

        let dims: Vec<usize> = self.perm.iter().map(|&d| x.shape.dim(d)).collect();
        let y = Tensor::new(graph.anonymous_name("Transpose_out"), x.data_type, Shape::new(dims));
        let y_id = graph.add_tensor(y);
        inst.register_output(y_id, "Y");
        Ok(())
    }

    fn emit_body(&self, inst: &OperatorInstance, graph: &Graph, out: &mut String) -> Result<()> {
        let x = graph.tensor(inst.input_params[0].tensor);
        let n_dim = x.rank();
        let vars: Vec<String> = (0..n_dim).map(|i| format!("i{i}")).collect();

        out.push_str(&format!(
            "{ind}/* Transpose: perm = {perm:?} */\n",
            ind = crate::util::indent(1),
            perm = self.perm
        ));

        for (i, v) in vars.iter().enumerate() {
            out.push_str(&loop_open(v, x.shape.dim(i), 1));
        }

        let mut in_idx = String::new();
        let mut out_idx = String::new();
        for i in 0..n_dim {
            in_idx.push_str(&format!("[{}]", vars[i]));
            out_idx.push_str(&format!("[{}]", vars[self.perm[i]]));
        }
        out.push_str(&format!("{}Y{out_idx} = X{in_idx};\n", crate::util::indent(n_dim + 1)));

        for _ in 0..n_dim {
            out.push_str(&loop_close(1));
        }
        Ok(())
    }
}

pub fn register(r: &mut crate::registry::OpRegistry) {
    use crate::registry::reg;
    reg(r, "Reshape", || Box::new(Reshape));
    reg(r, "Squeeze", || Box::new(Squeeze::default()));
    reg(r, "Unsqueeze", || Box::new(Unsqueeze::default()));
    reg(r, "Flatten", || Box::new(Flatten::default()));
    reg(r, "Transpose", || Box::new(Transpose::default()));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attribute::Attr;
    use crate::ids::TensorId;

    fn push_const_i64(graph: &mut Graph, name: &str, values: &[i64]) -> TensorId {
        let mut buf = Vec::with_capacity(values.len() * 8);
        for v in values {
            buf.extend_from_slice(&v.to_le_bytes());
        }
        graph.add_tensor(Tensor::constant(name, DataType::Int64, Shape::new(vec![values.len()]), buf))
    }

    #[test]
    fn reshape_resolves_to_requested_dims() {
        let mut graph = Graph::new();
        let x = graph.add_tensor(Tensor::new("x", DataType::Float, Shape::new(vec![2, 6])));
        let shape = push_const_i64(&mut graph, "shape", &[3, 4]);
        let mut inst = OperatorInstance::new("Reshape", "r1", Box::new(Reshape));
        inst.inputs = vec![Some(x), Some(shape)];
        let mut op = Reshape;
        op.parse_attributes(&[] as &[Attr]).unwrap();
        op.resolve(&mut graph, &mut inst).unwrap();
        let y = graph.tensor(inst.output_params[0].tensor);
        assert_eq!(y.shape.dims(), &[3, 4]);
    }

    #[test]
    fn reshape_supports_zero_copy_and_infer_dim() {
        let mut graph = Graph::new();
        let x = graph.add_tensor(Tensor::new("x", DataType::Float, Shape::new(vec![2, 3, 4])));
        let shape = push_const_i64(&mut graph, "shape", &[0, -1]);
        let mut inst = OperatorInstance::new("Reshape", "r2", Box::new(Reshape));
        inst.inputs = vec![Some(x), Some(shape)];
        let mut op = Reshape;
        op.parse_attributes(&[] as &[Attr]).unwrap();
        op.resolve(&mut graph, &mut inst).unwrap();
        let y = graph.tensor(inst.output_params[0].tensor);
        assert_eq!(y.shape.dims(), &[2, 12]);
    }

    #[test]
    fn transpose_default_perm_reverses_dims() {
        let mut graph = Graph::new();
        let x = graph.add_tensor(Tensor::new("x", DataType::Float, Shape::new(vec![2, 3, 4])));
        let mut inst = OperatorInstance::new("Transpose", "t1", Box::new(Transpose::default()));
        inst.inputs = vec![Some(x)];
        let mut op = Transpose::default();
        op.parse_attributes(&[] as &[Attr]).unwrap();
        op.resolve(&mut graph, &mut inst).unwrap();
        let y = graph.tensor(inst.output_params[0].tensor);
        assert_eq!(y.shape.dims(), &[4, 3, 2]);
    }

    #[test]
    fn squeeze_requires_size_one_dims() {
        let mut graph = Graph::new();
        let x = graph.add_tensor(Tensor::new("x", DataType::Float, Shape::new(vec![1, 3, 1])));
        let mut inst = OperatorInstance::new("Squeeze", "s1", Box::new(Squeeze::default()));
        inst.inputs = vec![Some(x)];
        let mut op = Squeeze::default();
        op.parse_attributes(&[] as &[Attr]).unwrap();
        op.resolve(&mut graph, &mut inst).unwrap();
        let y = graph.tensor(inst.output_params[0].tensor);
        assert_eq!(y.shape.dims(), &[3]);
    }
}
