// Copyright (c) ONNX Project Contributors
// SPDX-License-Identifier: Apache-2.0

//! `Conv`, grounded in `original_source/src/nodes/{conv,convolutions}.h`.
//!
//! Shared shape-resolution logic (`resolve_strides`/`kernel_shape`/
//! `dilations`/`pads`/`output_size`) mirrors the C++ `Convolutions` base
//! class; `group` support (the C++ `SpatialFilter` subclass family folds
//! this into the weight index) is kept as the plain `w[m][c - gi*group_size]`
//! form used there.

use crate::error::Result;
use crate::graph::Graph;
use crate::operator::{Operator, OperatorInstance};
use crate::ops::common::*;
use crate::shape::Shape;
use crate::tensor::Tensor;

/// Shared by `quant::ConvInteger` — the quantized convolution loop nest is
/// identical, only the accumulator type and the final store differ.
#[derive(Debug, Default, Clone)]
pub(crate) struct SpatialAttrs {
    pub(crate) auto_pad: String,
    pub(crate) dilations: Vec<i64>,
    pub(crate) group: i64,
    pub(crate) kernel_shape: Vec<i64>,
    pub(crate) pads: Vec<i64>,
    pub(crate) strides: Vec<i64>,
}

impl SpatialAttrs {
    pub(crate) fn parse(attrs: &[crate::attribute::Attr]) -> Self {
        SpatialAttrs {
            auto_pad: attr_string(attrs, "auto_pad", "NOTSET").to_string(),
            dilations: attr_ints(attrs, "dilations"),
            group: attr_int(attrs, "group", 1),
            kernel_shape: attr_ints(attrs, "kernel_shape"),
            pads: attr_ints(attrs, "pads"),
            strides: attr_ints(attrs, "strides"),
        }
    }

    pub(crate) fn resolve(&mut self, x: &Tensor, w: &Tensor) {
        let num_data_dim = x.rank() - 2;
        if self.strides.is_empty() {
            self.strides = vec![1; num_data_dim];
        }
        if self.dilations.is_empty() {
            self.dilations = vec![1; num_data_dim];
        }
        if self.kernel_shape.is_empty() {
            self.kernel_shape = (2..w.rank()).map(|i| w.shape.dim(i) as i64).collect();
        }
        if self.pads.is_empty() {
            self.pads = vec![0; num_data_dim * 2];
            if self.auto_pad != "VALID" && self.auto_pad != "NOTSET" {
                for i in 0..num_data_dim {
                    let p = self.kernel_shape[i] / 2;
                    self.pads[i] = p;
                    self.pads[i + num_data_dim] = p;
                }
            }
        }
    }

    pub(crate) fn output_size(&self, x: &Tensor, w: &Tensor) -> Vec<usize> {
        let num_data_dim = x.rank() - 2;
        let mut out = vec![x.shape.dim(0), w.shape.dim(0)];
        for xdim in 2..x.rank() {
            let dim = xdim - 2;
            let outdim = if self.auto_pad == "SAME_UPPER" || self.auto_pad == "SAME_LOWER" {
                x.shape.dim(xdim)
            } else {
                let input_size = x.shape.dim(xdim) as i64 + self.pads[dim] + self.pads[dim + num_data_dim];
                let last_out = input_size - self.kernel_shape[dim];
                (last_out / self.strides[dim] + 1).max(0)
            };
            out.push(outdim as usize);
        }
        out
    }
}

#[derive(Debug, Default)]
pub struct Conv {
    attrs: SpatialAttrs,
    has_bias: bool,
}

impl Operator for Conv {
    fn parse_attributes(&mut self, attrs: &[crate::attribute::Attr]) -> Result<()> {
        reject_unknown_attrs(
            attrs,
            &["auto_pad", "dilations", "group", "kernel_shape", "pads", "strides"],
            "Conv",
        )?;
        self.attrs = SpatialAttrs::parse(attrs);
        Ok(())
    }

    fn resolve(&mut self, graph: &mut Graph, inst: &mut OperatorInstance) -> Result<()> {
        let x_id = input_id(inst, 0, "Conv")?;
        let w_id = input_id(inst, 1, "Conv")?;
        inst.register_input(x_id, "X");
        inst.register_input(w_id, "W");
        self.has_bias = inst.input(2).is_some();
        if self.has_bias {
            inst.register_input(inst.input(2).unwrap(), "bias");
        }

        let x = graph.tensor(x_id);
        let w = graph.tensor(w_id);
        require(
            type_constraint_high_precision_numeric(x) && type_constraint_high_precision_numeric(w),
            "Conv: incorrect input types",
        )?;
        require(x.rank() >= 3, "Conv: input must have rank >= 3 (batch, channel, spatial...)")?;

        self.attrs.resolve(x, w);
        let out_dims = self.attrs.output_size(x, w);
        let dtype = x.data_type;

        let y = Tensor::new(graph.anonymous_name("Conv_out"), dtype, Shape::new(out_dims));
        let y_id = graph.add_tensor(y);
        inst.register_output(y_id, "Y");
        Ok(())
    }

    fn emit_body(&self, inst: &OperatorInstance, graph: &Graph, out: &mut String) -> Result<()> {
        let x = graph.tensor(inst.input_params[0].tensor);
        let w = graph.tensor(inst.input_params[1].tensor);
        let y = graph.tensor(inst.output_params[0].tensor);
        let n_data_dims = x.rank() - 2;
        let channels = x.shape.dim(1) as i64;
        let group = self.attrs.group;
        let group_size = channels / group;

        out.push_str(&format!(
            "{i1}/* Conv: auto_pad={ap} group={g} */\n",
            i1 = crate::util::indent(1),
            ap = self.attrs.auto_pad,
            g = group
        ));

        let i1 = crate::util::indent(1);
        let i2 = crate::util::indent(2);
        let i3 = crate::util::indent(3);
        let i4 = crate::util::indent(4);

        out.push_str(&format!("{i1}for (uint32_t b = 0; b < {}; b++) {{\n", x.shape.dim(0)));
        out.push_str(&format!("{i2}for (uint32_t m = 0; m < {}; m++) {{\n", w.shape.dim(0)));

        for d in 0..n_data_dims {
            out.push_str(&format!(
                "{i3}for (int32_t o{d} = 0, i{d} = {start}; o{d} < {bound}; o{d}++, i{d} += {stride}) {{\n",
                start = -self.attrs.pads[d],
                bound = y.shape.dim(2 + d),
                stride = self.attrs.strides[d],
            ));
        }

        let out_idx: String = (0..n_data_dims).map(|d| format!("[o{d}]")).collect();
        if self.has_bias {
            out.push_str(&format!("{i4}Y[b][m]{out_idx} = bias[m];\n"));
        } else {
            out.push_str(&format!("{i4}Y[b][m]{out_idx} = 0;\n"));
        }

        out.push_str(&format!("{i4}for (int32_t c = 0; c < {channels}; c++) {{\n"));
        for d in 0..n_data_dims {
            out.push_str(&format!(
                "{i4}for (uint32_t k{d} = 0; k{d} < {bound}; k{d}++) {{\n",
                bound = self.attrs.kernel_shape[d]
            ));
        }
        let mut ii_decls = String::new();
        for d in 0..n_data_dims {
            ii_decls.push_str(&format!(
                "{i5}int32_t ii{d} = i{d} + k{d} * {dil};\n{i5}if (ii{d} < 0) continue;\n{i5}if (ii{d} >= {bound}) continue;\n",
                i5 = crate::util::indent(5),
                dil = self.attrs.dilations[d],
                bound = x.shape.dim(2 + d),
            ));
        }
        out.push_str(&ii_decls);

        let ii_idx: String = (0..n_data_dims).map(|d| format!("[ii{d}]")).collect();
        let k_idx: String = (0..n_data_dims).map(|d| format!("[k{d}]")).collect();
        let w_c_idx = if group == 1 {
            "c".to_string()
        } else {
            format!("(c - (m / {group_size}) * {group_size})")
        };
        out.push_str(&format!(
            "{i5}Y[b][m]{out_idx} += X[b][c]{ii_idx} * W[m][{w_c_idx}]{k_idx};\n",
            i5 = crate::util::indent(5)
        ));

        for _ in 0..n_data_dims {
            out.push_str(&format!("{i4}}}\n"));
        }
        out.push_str(&format!("{i4}}}\n"));

        for _ in 0..n_data_dims {
            out.push_str(&format!("{i3}}}\n"));
        }
        out.push_str(&format!("{i2}}}\n"));
        out.push_str(&format!("{i1}}}\n"));
        Ok(())
    }
}

pub fn register(r: &mut crate::registry::OpRegistry) {
    crate::registry::reg(r, "Conv", || Box::new(Conv::default()));
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
    fn conv_valid_padding_shrinks_output() {
        let mut graph = Graph::new();
        let x = make_input(&mut graph, "x", vec![1, 3, 8, 8]);
        let w = make_input(&mut graph, "w", vec![4, 3, 3, 3]);
        let mut inst = OperatorInstance::new("Conv", "c1", Box::new(Conv::default()));
        inst.inputs = vec![Some(x), Some(w)];
        let mut op = Conv::default();
        op.parse_attributes(&[] as &[Attr]).unwrap();
        op.resolve(&mut graph, &mut inst).unwrap();
        let y = graph.tensor(inst.output_params[0].tensor);
        assert_eq!(y.shape.dims(), &[1, 4, 6, 6]);
    }

    #[test]
    fn conv_rejects_integer_input() {
        let mut graph = Graph::new();
        let mut x = Tensor::new("x", DataType::Int32, Shape::new(vec![1, 1, 4, 4]));
        x.is_io = true;
        let x = graph.add_tensor(x);
        let w = make_input(&mut graph, "w", vec![1, 1, 3, 3]);
        let mut inst = OperatorInstance::new("Conv", "c1", Box::new(Conv::default()));
        inst.inputs = vec![Some(x), Some(w)];
        let mut op = Conv::default();
        op.parse_attributes(&[] as &[Attr]).unwrap();
        assert!(op.resolve(&mut graph, &mut inst).is_err());
    }
}
