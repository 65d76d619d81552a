// Copyright (c) ONNX Project Contributors
// SPDX-License-Identifier: Apache-2.0

//! `Identity` and `Constant` (SPEC_FULL.md supplemental coverage), grounded
//! in `original_source/src/nodes/{identity,constant}.h`.

use crate::attribute::RawTensor;
use crate::error::{CompileError, Result};
use crate::graph::Graph;
use crate::operator::{Operator, OperatorInstance};
use crate::ops::common::*;
use crate::shape::Shape;
use crate::tensor::Tensor;

#[derive(Debug, Default)]
pub struct Identity;

impl Operator for Identity {
    fn parse_attributes(&mut self, attrs: &[crate::attribute::Attr]) -> Result<()> {
        reject_unknown_attrs(attrs, &[], "Identity")
    }

    fn resolve(&mut self, graph: &mut Graph, inst: &mut OperatorInstance) -> Result<()> {
        let x_id = input_id(inst, 0, "Identity")?;
        inst.register_input(x_id, "X");
        let x = graph.tensor(x_id);
        let y = Tensor::new(graph.anonymous_name("Identity_out"), x.data_type, x.shape.clone());
        let y_id = graph.add_tensor(y);
        inst.register_output(y_id, "Y");
        Ok(())
    }

    fn emit_body(&self, inst: &OperatorInstance, graph: &Graph, out: &mut String) -> Result<()> {
        let x = graph.tensor(inst.input_params[0].tensor);
        let n = x.shape.size().max(1);
        out.push_str(&format!(
            "{ind}memcpy(Y, X, sizeof({ty}) * {n});\n",
            ind = crate::util::indent(1),
            ty = x.c_type()
        ));
        Ok(())
    }
}

/// Embeds its `value` attribute tensor as a compile-time constant output.
/// Only the `value` (dense tensor) form is implemented; `value_float`,
/// `sparse_value`, etc. are rejected as an unimplemented feature. Has no
/// runtime inputs and emits no function: the emitter recognizes `Constant`
/// and treats its sole output purely as initializer data (§4.7).
#[derive(Debug, Default)]
pub struct Constant {
    value: Option<RawTensor>,
}

impl Operator for Constant {
    fn parse_attributes(&mut self, attrs: &[crate::attribute::Attr]) -> Result<()> {
        match attr(attrs, "value").and_then(|a| a.as_tensor()) {
            Some(t) => {
                self.value = Some(t.clone());
                Ok(())
            }
            None => Err(CompileError::unimplemented_feature(
                "Constant without a dense `value` tensor attribute",
                None,
            )),
        }
    }

    fn resolve(&mut self, graph: &mut Graph, inst: &mut OperatorInstance) -> Result<()> {
        let raw = self
            .value
            .as_ref()
            .expect("parse_attributes validated `value` is present");
        let dtype = raw.data_type;
        let shape = Shape::new(raw.dims.iter().map(|&d| d as usize));
        let y = Tensor::constant(graph.anonymous_name("Constant_out"), dtype, shape, raw.raw_data.clone());
        let y_id = graph.add_tensor(y);
        inst.outputs = vec![Some(y_id)];
        Ok(())
    }

    fn emit_signature(&self, _inst: &OperatorInstance, _graph: &Graph, _decorate: bool) -> String {
        String::new()
    }

    fn emit_body(&self, _inst: &OperatorInstance, _graph: &Graph, _out: &mut String) -> Result<()> {
        Ok(())
    }
}

pub fn register(r: &mut crate::registry::OpRegistry) {
    use crate::registry::reg;
    reg(r, "Identity", || Box::new(Identity));
    reg(r, "Constant", || Box::new(Constant));
}
