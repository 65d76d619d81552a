// Copyright (c) ONNX Project Contributors
// SPDX-License-Identifier: Apache-2.0

//! Integer quantization operators, grounded in `original_source`'s embedded
//! inference framing: every quantized value is stored `int8_t`, scaled by a
//! single per-tensor `float` scale and an `int8_t` zero point — the
//! asymmetric-but-narrow scheme `original_source/src/nodes/quantization.h`
//! uses for microcontroller targets, rather than full ONNX per-axis
//! quantization.
//!
//! `ConvInteger`/`MatMulInteger` reuse [`crate::ops::conv::SpatialAttrs`] and
//! the dense-loop shape of [`crate::ops::matmul`]; their accumulator is
//! `int32_t`, clamped to `[-127, 127]` on store, matching
//! `Tensor::make_quantized_copy`'s weight encoding.

use crate::error::Result;
use crate::graph::Graph;
use crate::operator::{Operator, OperatorInstance};
use crate::ops::common::*;
use crate::ops::conv::SpatialAttrs;
use crate::shape::Shape;
use crate::tensor::Tensor;
use crate::util::indent;

/// `y = saturate(round(x / y_scale) + y_zero_point)`.
#[derive(Debug, Default)]
pub struct QuantizeLinear;

impl Operator for QuantizeLinear {
    fn parse_attributes(&mut self, attrs: &[crate::attribute::Attr]) -> Result<()> {
        reject_unknown_attrs(attrs, &["axis"], "QuantizeLinear")
    }

    fn resolve(&mut self, graph: &mut Graph, inst: &mut OperatorInstance) -> Result<()> {
        let x_id = input_id(inst, 0, "QuantizeLinear")?;
        let scale_id = input_id(inst, 1, "QuantizeLinear")?;
        inst.register_input(x_id, "x");
        inst.register_input(scale_id, "y_scale");
        if let Some(zp_id) = inst.input(2) {
            inst.register_input(zp_id, "y_zero_point");
        }

        let x = graph.tensor(x_id);
        require(type_constraint_all_floating_points(x), "QuantizeLinear: x must be floating-point")?;

        let y = Tensor::new(graph.anonymous_name("QuantizeLinear_out"), crate::enums::DataType::Int8, x.shape.clone());
        let y_id = graph.add_tensor(y);
        inst.register_output(y_id, "y");
        Ok(())
    }

    fn emit_body(&self, inst: &OperatorInstance, graph: &Graph, out: &mut String) -> Result<()> {
        let x = graph.tensor(inst.input_params[0].tensor);
        let n = x.shape.size().max(1);
        let has_zp = inst.input_params.len() > 2;
        let i1 = indent(1);
        out.push_str(&format!("{i1}for (uint32_t i = 0; i < {n}; i++) {{\n"));
        if has_zp {
            out.push_str(&format!(
                "{}((int8_t*)y)[i] = (int8_t)CLIP(lrintf(((float*)x)[i] / (*y_scale)) + (*y_zero_point), -127, 127);\n",
                indent(2)
            ));
        } else {
            out.push_str(&format!(
                "{}((int8_t*)y)[i] = (int8_t)CLIP(lrintf(((float*)x)[i] / (*y_scale)), -127, 127);\n",
                indent(2)
            ));
        }
        out.push_str(&format!("{i1}}}\n"));
        Ok(())
    }
}

/// `y = (x - x_zero_point) * x_scale`.
#[derive(Debug, Default)]
pub struct DequantizeLinear;

impl Operator for DequantizeLinear {
    fn parse_attributes(&mut self, attrs: &[crate::attribute::Attr]) -> Result<()> {
        reject_unknown_attrs(attrs, &["axis"], "DequantizeLinear")
    }

    fn resolve(&mut self, graph: &mut Graph, inst: &mut OperatorInstance) -> Result<()> {
        let x_id = input_id(inst, 0, "DequantizeLinear")?;
        let scale_id = input_id(inst, 1, "DequantizeLinear")?;
        inst.register_input(x_id, "x");
        inst.register_input(scale_id, "x_scale");
        if let Some(zp_id) = inst.input(2) {
            inst.register_input(zp_id, "x_zero_point");
        }

        let x = graph.tensor(x_id);
        require(type_constraint_8bit(x), "DequantizeLinear: x must be 8-bit integer")?;

        let y = Tensor::new(graph.anonymous_name("DequantizeLinear_out"), crate::enums::DataType::Float, x.shape.clone());
        let y_id = graph.add_tensor(y);
        inst.register_output(y_id, "y");
        Ok(())
    }

    fn emit_body(&self, inst: &OperatorInstance, graph: &Graph, out: &mut String) -> Result<()> {
        let x = graph.tensor(inst.input_params[0].tensor);
        let n = x.shape.size().max(1);
        let has_zp = inst.input_params.len() > 2;
        let i1 = indent(1);
        out.push_str(&format!("{i1}for (uint32_t i = 0; i < {n}; i++) {{\n"));
        if has_zp {
            out.push_str(&format!(
                "{}((float*)y)[i] = (((int8_t*)x)[i] - (*x_zero_point)) * (*x_scale);\n",
                indent(2)
            ));
        } else {
            out.push_str(&format!("{}((float*)y)[i] = ((int8_t*)x)[i] * (*x_scale);\n", indent(2)));
        }
        out.push_str(&format!("{i1}}}\n"));
        Ok(())
    }
}

/// Computes its own per-tensor scale/zero-point from the input's observed
/// min/max, then quantizes (ONNX's "dynamic" variant, used when a graph has
/// no precomputed calibration constants).
#[derive(Debug, Default)]
pub struct DynamicQuantizeLinear;

impl Operator for DynamicQuantizeLinear {
    fn parse_attributes(&mut self, attrs: &[crate::attribute::Attr]) -> Result<()> {
        reject_unknown_attrs(attrs, &[], "DynamicQuantizeLinear")
    }

    fn resolve(&mut self, graph: &mut Graph, inst: &mut OperatorInstance) -> Result<()> {
        let x_id = input_id(inst, 0, "DynamicQuantizeLinear")?;
        inst.register_input(x_id, "x");

        let x = graph.tensor(x_id);
        require(type_constraint_all_floating_points(x), "DynamicQuantizeLinear: x must be floating-point")?;

        let y = Tensor::new(graph.anonymous_name("DynamicQuantizeLinear_y"), crate::enums::DataType::Int8, x.shape.clone());
        let y_id = graph.add_tensor(y);
        inst.register_output(y_id, "y");

        let scale = Tensor::new(graph.anonymous_name("DynamicQuantizeLinear_scale"), crate::enums::DataType::Float, Shape::scalar());
        let scale_id = graph.add_tensor(scale);
        inst.register_output(scale_id, "y_scale");

        let zp = Tensor::new(graph.anonymous_name("DynamicQuantizeLinear_zp"), crate::enums::DataType::Int8, Shape::scalar());
        let zp_id = graph.add_tensor(zp);
        inst.register_output(zp_id, "y_zero_point");
        Ok(())
    }

    fn emit_body(&self, inst: &OperatorInstance, graph: &Graph, out: &mut String) -> Result<()> {
        let x = graph.tensor(inst.input_params[0].tensor);
        let n = x.shape.size().max(1);
        let i1 = indent(1);
        let i2 = indent(2);
        out.push_str(&format!("{i1}float lo = ((float*)x)[0], hi = ((float*)x)[0];\n"));
        out.push_str(&format!("{i1}for (uint32_t i = 1; i < {n}; i++) {{\n"));
        out.push_str(&format!("{i2}lo = MIN(lo, ((float*)x)[i]);\n"));
        out.push_str(&format!("{i2}hi = MAX(hi, ((float*)x)[i]);\n"));
        out.push_str(&format!("{i1}}}\n"));
        out.push_str(&format!("{i1}float scale = MAX(hi - lo, FLT_EPSILON) / 254.0f;\n"));
        out.push_str(&format!("{i1}*y_scale = scale;\n"));
        out.push_str(&format!("{i1}*y_zero_point = (int8_t)CLIP(lrintf(-lo / scale) - 127, -127, 127);\n"));
        out.push_str(&format!("{i1}for (uint32_t i = 0; i < {n}; i++) {{\n"));
        out.push_str(&format!(
            "{i2}((int8_t*)y)[i] = (int8_t)CLIP(lrintf(((float*)x)[i] / scale) + (*y_zero_point), -127, 127);\n"
        ));
        out.push_str(&format!("{i1}}}\n"));
        Ok(())
    }
}

/// `Conv` over `int8_t` weights/activations, `int32_t` accumulation, clamped
/// to `int8_t` on store — shares shape resolution with `Conv`.
#[derive(Debug, Default)]
pub struct ConvInteger {
    attrs: SpatialAttrs,
    has_bias: bool,
}

impl Operator for ConvInteger {
    fn parse_attributes(&mut self, attrs: &[crate::attribute::Attr]) -> Result<()> {
        reject_unknown_attrs(
            attrs,
            &["auto_pad", "dilations", "group", "kernel_shape", "pads", "strides"],
            "ConvInteger",
        )?;
        self.attrs = SpatialAttrs::parse(attrs);
        Ok(())
    }

    fn resolve(&mut self, graph: &mut Graph, inst: &mut OperatorInstance) -> Result<()> {
        let x_id = input_id(inst, 0, "ConvInteger")?;
        let w_id = input_id(inst, 1, "ConvInteger")?;
        inst.register_input(x_id, "X");
        inst.register_input(w_id, "W");
        self.has_bias = inst.input(2).is_some();
        if self.has_bias {
            inst.register_input(inst.input(2).unwrap(), "bias");
        }

        let x = graph.tensor(x_id);
        let w = graph.tensor(w_id);
        require(x.rank() >= 3, "ConvInteger: input must have rank >= 3 (batch, channel, spatial...)")?;

        self.attrs.resolve(x, w);
        let out_dims = self.attrs.output_size(x, w);

        let y = Tensor::new(graph.anonymous_name("ConvInteger_out"), crate::enums::DataType::Int8, Shape::new(out_dims));
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

        let i1 = indent(1);
        let i2 = indent(2);
        let i3 = indent(3);
        let i4 = indent(4);
        let i5 = indent(5);

        out.push_str(&format!("{i1}/* ConvInteger: group={group} */\n"));
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
        out.push_str(&format!("{i4}int32_t acc = {};\n", if self.has_bias { "bias[m]" } else { "0" }));
        out.push_str(&format!("{i4}for (int32_t c = 0; c < {channels}; c++) {{\n"));
        for d in 0..n_data_dims {
            out.push_str(&format!(
                "{i4}for (uint32_t k{d} = 0; k{d} < {bound}; k{d}++) {{\n",
                bound = self.attrs.kernel_shape[d]
            ));
        }
        for d in 0..n_data_dims {
            out.push_str(&format!(
                "{i5}int32_t ii{d} = i{d} + k{d} * {dil};\n{i5}if (ii{d} < 0) continue;\n{i5}if (ii{d} >= {bound}) continue;\n",
                dil = self.attrs.dilations[d],
                bound = x.shape.dim(2 + d),
            ));
        }
        let ii_idx: String = (0..n_data_dims).map(|d| format!("[ii{d}]")).collect();
        let k_idx: String = (0..n_data_dims).map(|d| format!("[k{d}]")).collect();
        let w_c_idx = if group == 1 {
            "c".to_string()
        } else {
            format!("(c - (m / {group_size}) * {group_size})")
        };
        out.push_str(&format!("{i5}acc += (int32_t)X[b][c]{ii_idx} * (int32_t)W[m][{w_c_idx}]{k_idx};\n"));
        for _ in 0..n_data_dims {
            out.push_str(&format!("{i4}}}\n"));
        }
        out.push_str(&format!("{i4}}}\n"));
        out.push_str(&format!("{i4}Y[b][m]{out_idx} = (int8_t)CLIP(acc, -127, 127);\n"));

        for _ in 0..n_data_dims {
            out.push_str(&format!("{i3}}}\n"));
        }
        out.push_str(&format!("{i2}}}\n"));
        out.push_str(&format!("{i1}}}\n"));
        Ok(())
    }
}

/// Matrix multiplication over `int8_t` operands, `int32_t` accumulation,
/// clamped to `int8_t`. 2-D only — embedded targets quantize dense layers,
/// not batched/broadcast matmuls.
#[derive(Debug, Default)]
pub struct MatMulInteger;

impl Operator for MatMulInteger {
    fn parse_attributes(&mut self, attrs: &[crate::attribute::Attr]) -> Result<()> {
        reject_unknown_attrs(attrs, &[], "MatMulInteger")
    }

    fn resolve(&mut self, graph: &mut Graph, inst: &mut OperatorInstance) -> Result<()> {
        let a_id = input_id(inst, 0, "MatMulInteger")?;
        let b_id = input_id(inst, 1, "MatMulInteger")?;
        inst.register_input(a_id, "A");
        inst.register_input(b_id, "B");

        let a = graph.tensor(a_id);
        let b = graph.tensor(b_id);
        require(a.rank() == 2 && b.rank() == 2, "MatMulInteger: operands must be 2-D")?;
        require(a.shape.dim(1) == b.shape.dim(0), "MatMulInteger: reduction dimension mismatch")?;

        let y = Tensor::new(
            graph.anonymous_name("MatMulInteger_out"),
            crate::enums::DataType::Int8,
            Shape::new(vec![a.shape.dim(0), b.shape.dim(1)]),
        );
        let y_id = graph.add_tensor(y);
        inst.register_output(y_id, "Y");
        Ok(())
    }

    fn emit_body(&self, inst: &OperatorInstance, graph: &Graph, out: &mut String) -> Result<()> {
        let a = graph.tensor(inst.input_params[0].tensor);
        let b = graph.tensor(inst.input_params[1].tensor);
        let i_dim = a.shape.dim(0);
        let k_dim = a.shape.dim(1);
        let j_dim = b.shape.dim(1);

        let i1 = indent(1);
        let i2 = indent(2);
        let i3 = indent(3);

        out.push_str(&format!("{i1}/* MatMulInteger */\n"));
        out.push_str(&format!("{i1}for (uint32_t i = 0; i < {i_dim}; i++) {{\n"));
        out.push_str(&format!("{i2}for (uint32_t j = 0; j < {j_dim}; j++) {{\n"));
        out.push_str(&format!("{i3}int32_t acc = 0;\n"));
        out.push_str(&format!("{i3}for (uint32_t k = 0; k < {k_dim}; k++) {{\n"));
        out.push_str(&format!("{}acc += (int32_t)A[i][k] * (int32_t)B[k][j];\n", indent(4)));
        out.push_str(&format!("{i3}}}\n"));
        out.push_str(&format!("{i3}Y[i][j] = (int8_t)CLIP(acc, -127, 127);\n"));
        out.push_str(&format!("{i2}}}\n"));
        out.push_str(&format!("{i1}}}\n"));
        Ok(())
    }
}

/// Fused dequantize(A), dequantize(B), matmul, quantize(Y). Grounded in the
/// same 2-D restriction as `MatMulInteger`.
#[derive(Debug, Default)]
pub struct QLinearMatMul;

impl Operator for QLinearMatMul {
    fn parse_attributes(&mut self, attrs: &[crate::attribute::Attr]) -> Result<()> {
        reject_unknown_attrs(attrs, &[], "QLinearMatMul")
    }

    fn resolve(&mut self, graph: &mut Graph, inst: &mut OperatorInstance) -> Result<()> {
        let a_id = input_id(inst, 0, "QLinearMatMul")?;
        let a_scale_id = input_id(inst, 1, "QLinearMatMul")?;
        let a_zp_id = input_id(inst, 2, "QLinearMatMul")?;
        let b_id = input_id(inst, 3, "QLinearMatMul")?;
        let b_scale_id = input_id(inst, 4, "QLinearMatMul")?;
        let b_zp_id = input_id(inst, 5, "QLinearMatMul")?;
        let y_scale_id = input_id(inst, 6, "QLinearMatMul")?;
        let y_zp_id = input_id(inst, 7, "QLinearMatMul")?;
        inst.register_input(a_id, "A");
        inst.register_input(a_scale_id, "a_scale");
        inst.register_input(a_zp_id, "a_zero_point");
        inst.register_input(b_id, "B");
        inst.register_input(b_scale_id, "b_scale");
        inst.register_input(b_zp_id, "b_zero_point");
        inst.register_input(y_scale_id, "y_scale");
        inst.register_input(y_zp_id, "y_zero_point");

        let a = graph.tensor(a_id);
        let b = graph.tensor(b_id);
        require(a.rank() == 2 && b.rank() == 2, "QLinearMatMul: operands must be 2-D")?;
        require(a.shape.dim(1) == b.shape.dim(0), "QLinearMatMul: reduction dimension mismatch")?;

        let y = Tensor::new(
            graph.anonymous_name("QLinearMatMul_out"),
            crate::enums::DataType::Int8,
            Shape::new(vec![a.shape.dim(0), b.shape.dim(1)]),
        );
        let y_id = graph.add_tensor(y);
        inst.register_output(y_id, "Y");
        Ok(())
    }

    fn emit_body(&self, inst: &OperatorInstance, graph: &Graph, out: &mut String) -> Result<()> {
        let a = graph.tensor(inst.input_params[0].tensor);
        let b = graph.tensor(inst.input_params[3].tensor);
        let i_dim = a.shape.dim(0);
        let k_dim = a.shape.dim(1);
        let j_dim = b.shape.dim(1);

        let i1 = indent(1);
        let i2 = indent(2);
        let i3 = indent(3);

        out.push_str(&format!("{i1}/* QLinearMatMul */\n"));
        out.push_str(&format!("{i1}for (uint32_t i = 0; i < {i_dim}; i++) {{\n"));
        out.push_str(&format!("{i2}for (uint32_t j = 0; j < {j_dim}; j++) {{\n"));
        out.push_str(&format!("{i3}float acc = 0.0f;\n"));
        out.push_str(&format!("{i3}for (uint32_t k = 0; k < {k_dim}; k++) {{\n"));
        out.push_str(&format!(
            "{}acc += (A[i][k] - (*a_zero_point)) * (*a_scale) * (B[k][j] - (*b_zero_point)) * (*b_scale);\n",
            indent(4)
        ));
        out.push_str(&format!("{i3}}}\n"));
        out.push_str(&format!(
            "{i3}Y[i][j] = (int8_t)CLIP(lrintf(acc / (*y_scale)) + (*y_zero_point), -127, 127);\n"
        ));
        out.push_str(&format!("{i2}}}\n"));
        out.push_str(&format!("{i1}}}\n"));
        Ok(())
    }
}

/// Fused dequantize(X), `Conv`, quantize(Y) — shares `ConvInteger`'s spatial
/// loop nest, reading scale/zero-point scalars for input and output.
#[derive(Debug, Default)]
pub struct QLinearConv {
    attrs: SpatialAttrs,
    has_bias: bool,
}

impl Operator for QLinearConv {
    fn parse_attributes(&mut self, attrs: &[crate::attribute::Attr]) -> Result<()> {
        reject_unknown_attrs(
            attrs,
            &["auto_pad", "dilations", "group", "kernel_shape", "pads", "strides"],
            "QLinearConv",
        )?;
        self.attrs = SpatialAttrs::parse(attrs);
        Ok(())
    }

    fn resolve(&mut self, graph: &mut Graph, inst: &mut OperatorInstance) -> Result<()> {
        let x_id = input_id(inst, 0, "QLinearConv")?;
        let x_scale_id = input_id(inst, 1, "QLinearConv")?;
        let x_zp_id = input_id(inst, 2, "QLinearConv")?;
        let w_id = input_id(inst, 3, "QLinearConv")?;
        let w_scale_id = input_id(inst, 4, "QLinearConv")?;
        let w_zp_id = input_id(inst, 5, "QLinearConv")?;
        let y_scale_id = input_id(inst, 6, "QLinearConv")?;
        let y_zp_id = input_id(inst, 7, "QLinearConv")?;
        inst.register_input(x_id, "X");
        inst.register_input(x_scale_id, "x_scale");
        inst.register_input(x_zp_id, "x_zero_point");
        inst.register_input(w_id, "W");
        inst.register_input(w_scale_id, "w_scale");
        inst.register_input(w_zp_id, "w_zero_point");
        inst.register_input(y_scale_id, "y_scale");
        inst.register_input(y_zp_id, "y_zero_point");
        self.has_bias = inst.input(8).is_some();
        if self.has_bias {
            inst.register_input(inst.input(8).unwrap(), "bias");
        }

        let x = graph.tensor(x_id);
        let w = graph.tensor(w_id);
        require(x.rank() >= 3, "QLinearConv: input must have rank >= 3 (batch, channel, spatial...)")?;

        self.attrs.resolve(x, w);
        let out_dims = self.attrs.output_size(x, w);

        let y = Tensor::new(graph.anonymous_name("QLinearConv_out"), crate::enums::DataType::Int8, Shape::new(out_dims));
        let y_id = graph.add_tensor(y);
        inst.register_output(y_id, "Y");
        Ok(())
    }

    fn emit_body(&self, inst: &OperatorInstance, graph: &Graph, out: &mut String) -> Result<()> {
        let x = graph.tensor(inst.input_params[0].tensor);
        let w = graph.tensor(inst.input_params[3].tensor);
        let y = graph.tensor(inst.output_params[0].tensor);
        let n_data_dims = x.rank() - 2;
        let channels = x.shape.dim(1) as i64;
        let group = self.attrs.group;
        let group_size = channels / group;

        let i1 = indent(1);
        let i2 = indent(2);
        let i3 = indent(3);
        let i4 = indent(4);
        let i5 = indent(5);

        out.push_str(&format!("{i1}/* QLinearConv: group={group} */\n"));
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
        out.push_str(&format!(
            "{i4}float acc = {};\n",
            if self.has_bias { "(float)bias[m]" } else { "0.0f" }
        ));
        out.push_str(&format!("{i4}for (int32_t c = 0; c < {channels}; c++) {{\n"));
        for d in 0..n_data_dims {
            out.push_str(&format!(
                "{i4}for (uint32_t k{d} = 0; k{d} < {bound}; k{d}++) {{\n",
                bound = self.attrs.kernel_shape[d]
            ));
        }
        for d in 0..n_data_dims {
            out.push_str(&format!(
                "{i5}int32_t ii{d} = i{d} + k{d} * {dil};\n{i5}if (ii{d} < 0) continue;\n{i5}if (ii{d} >= {bound}) continue;\n",
                dil = self.attrs.dilations[d],
                bound = x.shape.dim(2 + d),
            ));
        }
        let ii_idx: String = (0..n_data_dims).map(|d| format!("[ii{d}]")).collect();
        let k_idx: String = (0..n_data_dims).map(|d| format!("[k{d}]")).collect();
        let w_c_idx = if group == 1 {
            "c".to_string()
        } else {
            format!("(c - (m / {group_size}) * {group_size})")
        };
        out.push_str(&format!(
            "{i5}acc += (X[b][c]{ii_idx} - (*x_zero_point)) * (*x_scale) * (W[m][{w_c_idx}]{k_idx} - (*w_zero_point)) * (*w_scale);\n"
        ));
        for _ in 0..n_data_dims {
            out.push_str(&format!("{i4}}}\n"));
        }
        out.push_str(&format!("{i4}}}\n"));
        out.push_str(&format!(
            "{i4}Y[b][m]{out_idx} = (int8_t)CLIP(lrintf(acc / (*y_scale)) + (*y_zero_point), -127, 127);\n"
        ));

        for _ in 0..n_data_dims {
            out.push_str(&format!("{i3}}}\n"));
        }
        out.push_str(&format!("{i2}}}\n"));
        out.push_str(&format!("{i1}}}\n"));
        Ok(())
    }
}

/// Shared body for the elementwise fused dequant-op-quant pair `QLinearAdd`/
/// `QLinearMul`.
fn resolve_qlinear_elementwise(op_kind: &str, graph: &mut Graph, inst: &mut OperatorInstance) -> Result<()> {
    let a_id = input_id(inst, 0, op_kind)?;
    let a_scale_id = input_id(inst, 1, op_kind)?;
    let a_zp_id = input_id(inst, 2, op_kind)?;
    let b_id = input_id(inst, 3, op_kind)?;
    let b_scale_id = input_id(inst, 4, op_kind)?;
    let b_zp_id = input_id(inst, 5, op_kind)?;
    let y_scale_id = input_id(inst, 6, op_kind)?;
    let y_zp_id = input_id(inst, 7, op_kind)?;
    inst.register_input(a_id, "A");
    inst.register_input(a_scale_id, "a_scale");
    inst.register_input(a_zp_id, "a_zero_point");
    inst.register_input(b_id, "B");
    inst.register_input(b_scale_id, "b_scale");
    inst.register_input(b_zp_id, "b_zero_point");
    inst.register_input(y_scale_id, "y_scale");
    inst.register_input(y_zp_id, "y_zero_point");

    let a = graph.tensor(a_id);
    let b = graph.tensor(b_id);
    let out_dims = multidirectional_broadcast(&[a.shape.dims(), b.shape.dims()])?;

    let y = Tensor::new(graph.anonymous_name(&format!("{op_kind}_out")), crate::enums::DataType::Int8, Shape::new(out_dims));
    let y_id = graph.add_tensor(y);
    inst.register_output(y_id, "Y");
    Ok(())
}

fn emit_qlinear_elementwise(c_op: &str, inst: &OperatorInstance, graph: &Graph, out: &mut String) -> Result<()> {
    let a = graph.tensor(inst.input_params[0].tensor);
    let b = graph.tensor(inst.input_params[3].tensor);
    let y = graph.tensor(inst.output_params[0].tensor);
    let out_rank = y.rank();

    let loop_vars: Vec<String> = (0..out_rank).map(|i| format!("i{i}")).collect();

    for (i, v) in loop_vars.iter().enumerate() {
        out.push_str(&loop_open(v, y.shape.dim(i), 1 + i));
    }
    let a_idx = broadcast_index_string(a.shape.dims(), out_rank, &loop_vars);
    let b_idx = broadcast_index_string(b.shape.dims(), out_rank, &loop_vars);
    let y_idx: String = loop_vars.iter().map(|v| format!("[{v}]")).collect();
    let body_indent = indent(1 + out_rank);
    out.push_str(&format!(
        "{body_indent}float av = (A{a_idx} - (*a_zero_point)) * (*a_scale);\n"
    ));
    out.push_str(&format!(
        "{body_indent}float bv = (B{b_idx} - (*b_zero_point)) * (*b_scale);\n"
    ));
    out.push_str(&format!("{body_indent}float rv = av {c_op} bv;\n"));
    out.push_str(&format!(
        "{body_indent}Y{y_idx} = (int8_t)CLIP(lrintf(rv / (*y_scale)) + (*y_zero_point), -127, 127);\n"
    ));
    for i in (0..out_rank).rev() {
        out.push_str(&loop_close(1 + i));
    }
    Ok(())
}

#[derive(Debug, Default)]
pub struct QLinearAdd;

impl Operator for QLinearAdd {
    fn parse_attributes(&mut self, attrs: &[crate::attribute::Attr]) -> Result<()> {
        reject_unknown_attrs(attrs, &[], "QLinearAdd")
    }

    fn resolve(&mut self, graph: &mut Graph, inst: &mut OperatorInstance) -> Result<()> {
        resolve_qlinear_elementwise("QLinearAdd", graph, inst)
    }

    fn emit_body(&self, inst: &OperatorInstance, graph: &Graph, out: &mut String) -> Result<()> {
        emit_qlinear_elementwise("+", inst, graph, out)
    }
}

#[derive(Debug, Default)]
pub struct QLinearMul;

impl Operator for QLinearMul {
    fn parse_attributes(&mut self, attrs: &[crate::attribute::Attr]) -> Result<()> {
        reject_unknown_attrs(attrs, &[], "QLinearMul")
    }

    fn resolve(&mut self, graph: &mut Graph, inst: &mut OperatorInstance) -> Result<()> {
        resolve_qlinear_elementwise("QLinearMul", graph, inst)
    }

    fn emit_body(&self, inst: &OperatorInstance, graph: &Graph, out: &mut String) -> Result<()> {
        emit_qlinear_elementwise("*", inst, graph, out)
    }
}

pub fn register(r: &mut crate::registry::OpRegistry) {
    crate::registry::reg(r, "QuantizeLinear", || Box::new(QuantizeLinear));
    crate::registry::reg(r, "DequantizeLinear", || Box::new(DequantizeLinear));
    crate::registry::reg(r, "DynamicQuantizeLinear", || Box::new(DynamicQuantizeLinear));
    crate::registry::reg(r, "ConvInteger", || Box::new(ConvInteger::default()));
    crate::registry::reg(r, "MatMulInteger", || Box::new(MatMulInteger));
    crate::registry::reg(r, "QLinearConv", || Box::new(QLinearConv::default()));
    crate::registry::reg(r, "QLinearMatMul", || Box::new(QLinearMatMul));
    crate::registry::reg(r, "QLinearAdd", || Box::new(QLinearAdd));
    crate::registry::reg(r, "QLinearMul", || Box::new(QLinearMul));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attribute::Attr;
    use crate::enums::DataType;
    use crate::shape::Shape;

    fn make_input(graph: &mut Graph, name: &str, dtype: DataType, dims: Vec<usize>) -> crate::ids::TensorId {
        let mut t = Tensor::new(name, dtype, Shape::new(dims));
        t.is_io = true;
        graph.add_tensor(t)
    }

    #[test]
    fn quantize_linear_produces_int8_output() {
        let mut graph = Graph::new();
        let x = make_input(&mut graph, "x", DataType::Float, vec![4]);
        let scale = make_input(&mut graph, "scale", DataType::Float, vec![]);
        let mut inst = OperatorInstance::new("QuantizeLinear", "q1", Box::new(QuantizeLinear));
        inst.inputs = vec![Some(x), Some(scale)];
        let mut op = QuantizeLinear;
        op.parse_attributes(&[] as &[Attr]).unwrap();
        op.resolve(&mut graph, &mut inst).unwrap();
        let y = graph.tensor(inst.output_params[0].tensor);
        assert_eq!(y.data_type, DataType::Int8);
        assert_eq!(y.shape.dims(), &[4]);
    }

    #[test]
    fn matmul_integer_rejects_reduction_mismatch() {
        let mut graph = Graph::new();
        let a = make_input(&mut graph, "a", DataType::Int8, vec![2, 3]);
        let b = make_input(&mut graph, "b", DataType::Int8, vec![5, 4]);
        let mut inst = OperatorInstance::new("MatMulInteger", "mm1", Box::new(MatMulInteger));
        inst.inputs = vec![Some(a), Some(b)];
        let mut op = MatMulInteger;
        op.parse_attributes(&[] as &[Attr]).unwrap();
        assert!(op.resolve(&mut graph, &mut inst).is_err());
    }

    #[test]
    fn conv_integer_shrinks_output_like_conv() {
        let mut graph = Graph::new();
        let x = make_input(&mut graph, "x", DataType::Int8, vec![1, 3, 8, 8]);
        let w = make_input(&mut graph, "w", DataType::Int8, vec![4, 3, 3, 3]);
        let mut inst = OperatorInstance::new("ConvInteger", "c1", Box::new(ConvInteger::default()));
        inst.inputs = vec![Some(x), Some(w)];
        let mut op = ConvInteger::default();
        op.parse_attributes(&[] as &[Attr]).unwrap();
        op.resolve(&mut graph, &mut inst).unwrap();
        let y = graph.tensor(inst.output_params[0].tensor);
        assert_eq!(y.shape.dims(), &[1, 4, 6, 6]);
        assert_eq!(y.data_type, DataType::Int8);
    }
}
