// Copyright (c) ONNX Project Contributors
// SPDX-License-Identifier: Apache-2.0

//! `MaxPool`, `AveragePool`, grounded in `original_source/src/nodes/
//! {maxpool,averagepool,pooling}.h`. Shares the spatial-loop shape with
//! [`crate::ops::conv`] minus the weight tensor and `group`.

use crate::error::Result;
use crate::graph::Graph;
use crate::operator::{Operator, OperatorInstance};
use crate::ops::common::*;
use crate::shape::Shape;
use crate::tensor::Tensor;

#[derive(Debug, Default, Clone)]
struct PoolAttrs {
    auto_pad: String,
    dilations: Vec<i64>,
    kernel_shape: Vec<i64>,
    pads: Vec<i64>,
    strides: Vec<i64>,
}

impl PoolAttrs {
    fn parse(attrs: &[crate::attribute::Attr]) -> Result<Self> {
        let kernel_shape = attr_ints(attrs, "kernel_shape");
        require(!kernel_shape.is_empty(), "Pool: `kernel_shape` is required")?;
        Ok(PoolAttrs {
            auto_pad: attr_string(attrs, "auto_pad", "NOTSET").to_string(),
            dilations: attr_ints(attrs, "dilations"),
            kernel_shape,
            pads: attr_ints(attrs, "pads"),
            strides: attr_ints(attrs, "strides"),
        })
    }

    fn resolve(&mut self, x: &Tensor) {
        let num_data_dim = x.rank() - 2;
        if self.strides.is_empty() {
            self.strides = vec![1; num_data_dim];
        }
        if self.dilations.is_empty() {
            self.dilations = vec![1; num_data_dim];
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

    fn output_size(&self, x: &Tensor) -> Vec<usize> {
        let num_data_dim = x.rank() - 2;
        let mut out = vec![x.shape.dim(0), x.shape.dim(1)];
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

    fn emit_loop_with_padding_checks(
        &self,
        x: &Tensor,
        y: &Tensor,
        init: &str,
        calc: &str,
        finalize: &str,
        out: &mut String,
    ) {
        let n_data_dims = x.rank() - 2;
        let i1 = crate::util::indent(1);
        let i2 = crate::util::indent(2);
        let i3 = crate::util::indent(3);
        let i4 = crate::util::indent(4);

        out.push_str(&format!("{i1}for (uint32_t b = 0; b < {}; b++) {{\n", x.shape.dim(0)));
        out.push_str(&format!("{i2}for (uint32_t c = 0; c < {}; c++) {{\n", x.shape.dim(1)));

        for d in 0..n_data_dims {
            out.push_str(&format!(
                "{i3}for (int32_t o{d} = 0, i{d} = {start}; o{d} < {bound}; o{d}++, i{d} += {stride}) {{\n",
                start = -self.pads[d],
                bound = y.shape.dim(2 + d),
                stride = self.strides[d],
            ));
        }

        out.push_str(init);

        for d in 0..n_data_dims {
            out.push_str(&format!(
                "{i4}for (uint32_t k{d} = 0; k{d} < {bound}; k{d}++) {{\n",
                bound = self.kernel_shape[d]
            ));
        }
        for d in 0..n_data_dims {
            out.push_str(&format!(
                "{i5}int32_t ii{d} = i{d} + k{d} * {dil};\n{i5}if (ii{d} < 0) continue;\n{i5}if (ii{d} >= {bound}) continue;\n",
                i5 = crate::util::indent(5),
                dil = self.dilations[d],
                bound = x.shape.dim(2 + d),
            ));
        }

        out.push_str(calc);

        for _ in 0..n_data_dims {
            out.push_str(&format!("{i4}}}\n"));
        }

        out.push_str(finalize);

        for _ in 0..n_data_dims {
            out.push_str(&format!("{i3}}}\n"));
        }
        out.push_str(&format!("{i2}}}\n"));
        out.push_str(&format!("{i1}}}\n"));
    }
}

fn out_idx(n: usize) -> String {
    (0..n).map(|d| format!("[o{d}]")).collect()
}

fn ii_idx(n: usize) -> String {
    (0..n).map(|d| format!("[ii{d}]")).collect()
}

#[derive(Debug, Default)]
pub struct MaxPool {
    attrs: PoolAttrs,
}

impl Operator for MaxPool {
    fn parse_attributes(&mut self, attrs: &[crate::attribute::Attr]) -> Result<()> {
        reject_unknown_attrs(
            attrs,
            &["auto_pad", "ceil_mode", "dilations", "kernel_shape", "pads", "storage_order", "strides"],
            "MaxPool",
        )?;
        require(attr_int(attrs, "storage_order", 0) == 0, "MaxPool: column-major storage_order is not implemented")?;
        self.attrs = PoolAttrs::parse(attrs)?;
        Ok(())
    }

    fn resolve(&mut self, graph: &mut Graph, inst: &mut OperatorInstance) -> Result<()> {
        let x_id = input_id(inst, 0, "MaxPool")?;
        inst.register_input(x_id, "X");
        let x = graph.tensor(x_id);
        self.attrs.resolve(x);
        let y = Tensor::new(graph.anonymous_name("MaxPool_out"), x.data_type, Shape::new(self.attrs.output_size(x)));
        let y_id = graph.add_tensor(y);
        inst.register_output(y_id, "Y");
        Ok(())
    }

    fn emit_body(&self, inst: &OperatorInstance, graph: &Graph, out: &mut String) -> Result<()> {
        let x = graph.tensor(inst.input_params[0].tensor);
        let y = graph.tensor(inst.output_params[0].tensor);
        let n = x.rank() - 2;
        let min_value = match x.c_type() {
            "float" | "double" => format!("({}) -INFINITY", x.c_type()),
            "int8_t" => "INT8_MIN".to_string(),
            "uint8_t" => "0".to_string(),
            _ => "INT32_MIN".to_string(),
        };
        let init = format!("{}{} curmax = {};\n", crate::util::indent(4), x.c_type(), min_value);
        let calc = format!(
            "{i5}if (curmax < X{ii}) {{\n{i5}curmax = X{ii};\n{i4}}}\n",
            i5 = crate::util::indent(5),
            i4 = crate::util::indent(4),
            ii = ii_idx(n)
        );
        let finalize = format!("{}Y{} = curmax;\n", crate::util::indent(3), out_idx(n));
        self.attrs.emit_loop_with_padding_checks(x, y, &init, &calc, &finalize, out);
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct AveragePool {
    attrs: PoolAttrs,
    count_include_pad: bool,
}

impl Operator for AveragePool {
    fn parse_attributes(&mut self, attrs: &[crate::attribute::Attr]) -> Result<()> {
        reject_unknown_attrs(
            attrs,
            &["auto_pad", "ceil_mode", "count_include_pad", "kernel_shape", "pads", "strides"],
            "AveragePool",
        )?;
        self.count_include_pad = attr_int(attrs, "count_include_pad", 0) != 0;
        self.attrs = PoolAttrs::parse(attrs)?;
        Ok(())
    }

    fn resolve(&mut self, graph: &mut Graph, inst: &mut OperatorInstance) -> Result<()> {
        let x_id = input_id(inst, 0, "AveragePool")?;
        inst.register_input(x_id, "X");
        let x = graph.tensor(x_id);
        require(
            type_constraint_plain_floating_points(x) || type_constraint_8bit(x),
            "AveragePool: incorrect input type",
        )?;
        self.attrs.resolve(x);
        let y = Tensor::new(
            graph.anonymous_name("AveragePool_out"),
            x.data_type,
            Shape::new(self.attrs.output_size(x)),
        );
        let y_id = graph.add_tensor(y);
        inst.register_output(y_id, "Y");
        Ok(())
    }

    fn emit_body(&self, inst: &OperatorInstance, graph: &Graph, out: &mut String) -> Result<()> {
        let x = graph.tensor(inst.input_params[0].tensor);
        let y = graph.tensor(inst.output_params[0].tensor);
        let n = x.rank() - 2;
        let init = format!(
            "{i4}{ty} curavg = 0;\n{i4}int numavg = 0;\n",
            i4 = crate::util::indent(4),
            ty = y.c_type()
        );
        let calc = format!(
            "{i5}numavg += 1;\n{i5}curavg += X{ii};\n",
            i5 = crate::util::indent(5),
            ii = ii_idx(n)
        );
        let mut finalize = String::new();
        if self.count_include_pad {
            let fixed: i64 = self.attrs.kernel_shape.iter().product();
            finalize.push_str(&format!("{}numavg = {fixed};\n", crate::util::indent(3)));
        }
        finalize.push_str(&format!("{}Y{} = curavg / numavg;\n", crate::util::indent(3), out_idx(n)));
        self.attrs.emit_loop_with_padding_checks(x, y, &init, &calc, &finalize, out);
        Ok(())
    }
}

pub fn register(r: &mut crate::registry::OpRegistry) {
    use crate::registry::reg;
    reg(r, "MaxPool", || Box::new(MaxPool::default()));
    reg(r, "AveragePool", || Box::new(AveragePool::default()));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attribute::{Attr, AttrValue};
    use crate::enums::DataType;

    fn make_input(graph: &mut Graph, name: &str, dims: Vec<usize>) -> crate::ids::TensorId {
        let mut t = Tensor::new(name, DataType::Float, Shape::new(dims));
        t.is_io = true;
        graph.add_tensor(t)
    }

    fn kernel_shape_attr(v: Vec<i64>) -> Attr {
        Attr {
            name: "kernel_shape".into(),
            value: AttrValue::Ints(v),
            doc_string: None,
        }
    }

    #[test]
    fn maxpool_valid_padding_shrinks_output() {
        let mut graph = Graph::new();
        let x = make_input(&mut graph, "x", vec![1, 3, 8, 8]);
        let mut inst = OperatorInstance::new("MaxPool", "mp1", Box::new(MaxPool::default()));
        inst.inputs = vec![Some(x)];
        let mut op = MaxPool::default();
        op.parse_attributes(&[kernel_shape_attr(vec![2, 2])]).unwrap();
        op.resolve(&mut graph, &mut inst).unwrap();
        let y = graph.tensor(inst.output_params[0].tensor);
        assert_eq!(y.shape.dims(), &[1, 3, 7, 7]);
    }
}
