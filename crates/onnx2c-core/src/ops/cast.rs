// Copyright (c) ONNX Project Contributors
// SPDX-License-Identifier: Apache-2.0

//! `Cast`, grounded in `original_source/src/nodes/cast.cc`.
//!
//! Most `Cast` nodes disappear entirely under the cast-folding pass (§4.6);
//! this implementation handles the remainder — casts the fold can't remove
//! (multi-consumer input, or both ends are graph IO).

use crate::enums::DataType;
use crate::error::{CompileError, Result};
use crate::graph::Graph;
use crate::operator::{Operator, OperatorInstance};
use crate::ops::common::*;
use crate::tensor::Tensor;

#[derive(Debug, Default)]
pub struct Cast {
    to: Option<DataType>,
}

impl Operator for Cast {
    fn parse_attributes(&mut self, attrs: &[crate::attribute::Attr]) -> Result<()> {
        let to = attr(attrs, "to")
            .and_then(|a| a.as_int())
            .ok_or_else(|| CompileError::bad_input("Cast: missing required `to` attribute", None))?;
        self.to = DataType::from_i32(to as i32);
        if self.to.is_none() {
            return Err(CompileError::bad_input(format!("Cast: invalid `to` data type tag {to}"), None));
        }
        Ok(())
    }

    fn resolve(&mut self, graph: &mut Graph, inst: &mut OperatorInstance) -> Result<()> {
        let x_id = input_id(inst, 0, "Cast")?;
        inst.register_input(x_id, "X");
        let x = graph.tensor(x_id);
        let to = self.to.expect("parse_attributes set `to`");
        let y = Tensor::new(graph.anonymous_name("Cast_out"), to, x.shape.clone());
        let y_id = graph.add_tensor(y);
        inst.register_output(y_id, "Y");
        Ok(())
    }

    fn emit_body(&self, inst: &OperatorInstance, graph: &Graph, out: &mut String) -> Result<()> {
        let x = graph.tensor(inst.input_params[0].tensor);
        let y = graph.tensor(inst.output_params[0].tensor);
        let n = x.shape.size().max(1);
        let ind = crate::util::indent(1);
        out.push_str(&format!("{ind}{} *Xf = ({}*)X;\n", x.c_type(), x.c_type()));
        out.push_str(&format!("{ind}{} *Yf = ({}*)Y;\n", y.c_type(), y.c_type()));
        out.push_str(&format!("{ind}for (uint32_t i = 0; i < {n}; i++) {{\n"));
        out.push_str(&format!("{}Yf[i] = ({})Xf[i];\n", crate::util::indent(2), y.c_type()));
        out.push_str(&format!("{ind}}}\n"));
        Ok(())
    }
}

pub fn register(r: &mut crate::registry::OpRegistry) {
    crate::registry::reg(r, "Cast", || Box::new(Cast::default()));
}
