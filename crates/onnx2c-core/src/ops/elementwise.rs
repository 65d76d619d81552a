// Copyright (c) ONNX Project Contributors
// SPDX-License-Identifier: Apache-2.0

//! Elementwise unary, binary, and variadic operators (§4.3 "Elementwise").
//!
//! One polymorphic struct per arity, parameterized by a small operation tag
//! (§4.4: "a space-saving collapse, not a capability change"), grounded in
//! `original_source/src/nodes/{elementwise,elementwise_2}.h`.

use crate::enums::DataType;
use crate::error::Result;
use crate::graph::Graph;
use crate::ids::TensorId;
use crate::operator::{Operator, OperatorInstance};
use crate::ops::common::*;
use crate::shape::Shape;
use crate::tensor::Tensor;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Abs,
    Ceil,
    Floor,
    Neg,
    Relu,
    Sigmoid,
    Sqrt,
    Tanh,
}

impl UnaryOp {
    fn c_expr(self, x: &str, dtype: DataType) -> String {
        let is_f64 = dtype == DataType::Double;
        match self {
            UnaryOp::Abs => {
                if dtype.is_integer() {
                    format!("({x} < 0 ? -({x}) : ({x}))")
                } else {
                    format!("fabs{}({x})", if is_f64 { "" } else { "f" })
                }
            }
            UnaryOp::Ceil => format!("ceil{}({x})", if is_f64 { "" } else { "f" }),
            UnaryOp::Floor => format!("floor{}({x})", if is_f64 { "" } else { "f" }),
            UnaryOp::Neg => format!("(-({x}))"),
            UnaryOp::Relu => format!("({x} > 0 ? {x} : 0)"),
            UnaryOp::Sigmoid => format!("(1 / (1 + exp{}(-({x}))))", if is_f64 { "" } else { "f" }),
            UnaryOp::Sqrt => format!("sqrt{}({x})", if is_f64 { "" } else { "f" }),
            UnaryOp::Tanh => format!("tanh{}({x})", if is_f64 { "" } else { "f" }),
        }
    }
}

#[derive(Debug)]
pub struct Unary {
    pub op: UnaryOp,
}

impl Operator for Unary {
    fn parse_attributes(&mut self, attrs: &[crate::attribute::Attr]) -> Result<()> {
        reject_unknown_attrs(attrs, &[], "Unary")
    }

    fn resolve(&mut self, graph: &mut Graph, inst: &mut OperatorInstance) -> Result<()> {
        let x_id = input_id(inst, 0, "Unary")?;
        inst.register_input(x_id, "X");
        let x = graph.tensor(x_id);
        require(type_constraint_all_floating_points(x) || x.data_type.is_integer(), "Unary: unsupported input type")?;
        let y = Tensor::new(
            graph.anonymous_name(&format!("{:?}_out", self.op)),
            x.data_type,
            x.shape.clone(),
        );
        let y_id = graph.add_tensor(y);
        inst.register_output(y_id, "Y");
        Ok(())
    }

    fn emit_body(&self, inst: &OperatorInstance, graph: &Graph, out: &mut String) -> Result<()> {
        let x = graph.tensor(inst.input_params[0].tensor);
        let y = graph.tensor(inst.output_params[0].tensor);
        let rank = y.rank();
        let vars: Vec<String> = (0..rank).map(|i| format!("i{i}")).collect();
        for (i, v) in vars.iter().enumerate() {
            out.push_str(&loop_open(v, y.shape.dim(i), 1));
        }
        let idx: String = vars.iter().map(|v| format!("[{v}]")).collect();
        out.push_str(&format!(
            "{}Y{idx} = {};\n",
            crate::util::indent(rank + 1),
            self.op.c_expr(&format!("X{idx}"), x.data_type)
        ));
        for _ in 0..rank {
            out.push_str(&loop_close(rank));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    And,
    Div,
    Equal,
    Greater,
    GreaterOrEqual,
    Less,
    LessOrEqual,
    Mul,
    Or,
    Pow,
    PRelu,
    Sub,
    Xor,
}

impl BinaryOp {
    fn output_is_bool(self) -> bool {
        matches!(
            self,
            BinaryOp::Equal | BinaryOp::Greater | BinaryOp::GreaterOrEqual | BinaryOp::Less | BinaryOp::LessOrEqual
        )
    }

    fn c_expr(self, a: &str, b: &str, dtype: DataType) -> String {
        match self {
            BinaryOp::Add => format!("{a} + {b}"),
            BinaryOp::And => format!("{a} && {b}"),
            BinaryOp::Div => format!("{a} / {b}"),
            BinaryOp::Equal => format!("{a} == {b}"),
            BinaryOp::Greater => format!("{a} > {b}"),
            BinaryOp::GreaterOrEqual => format!("{a} >= {b}"),
            BinaryOp::Less => format!("{a} < {b}"),
            BinaryOp::LessOrEqual => format!("{a} <= {b}"),
            BinaryOp::Mul => format!("{a} * {b}"),
            BinaryOp::Or => format!("{a} || {b}"),
            BinaryOp::Pow => format!("pow{}({a}, {b})", if dtype == DataType::Double { "" } else { "f" }),
            BinaryOp::PRelu => format!("({a} < 0 ? ({a} * {b}) : {a})"),
            BinaryOp::Sub => format!("{a} - {b}"),
            BinaryOp::Xor => format!("({a} ? 1 : 0) ^ ({b} ? 1 : 0)"),
        }
    }
}

#[derive(Debug)]
pub struct Binary {
    pub op: BinaryOp,
}

impl Operator for Binary {
    fn parse_attributes(&mut self, attrs: &[crate::attribute::Attr]) -> Result<()> {
        reject_unknown_attrs(attrs, &[], "Binary")
    }

    fn resolve(&mut self, graph: &mut Graph, inst: &mut OperatorInstance) -> Result<()> {
        let a_id = input_id(inst, 0, "Binary")?;
        let b_id = input_id(inst, 1, "Binary")?;
        inst.register_input(a_id, "A");
        inst.register_input(b_id, "B");
        let (a_shape, a_dtype) = {
            let a = graph.tensor(a_id);
            (a.shape.dims().to_vec(), a.data_type)
        };
        let b_shape = graph.tensor(b_id).shape.dims().to_vec();
        let out_dims = multidirectional_broadcast(&[&a_shape, &b_shape])?;
        let out_dtype = if self.op.output_is_bool() { DataType::Bool } else { a_dtype };
        let y = Tensor::new(graph.anonymous_name(&format!("{:?}_out", self.op)), out_dtype, Shape::new(out_dims));
        let y_id = graph.add_tensor(y);
        inst.register_output(y_id, "C");
        Ok(())
    }

    fn emit_body(&self, inst: &OperatorInstance, graph: &Graph, out: &mut String) -> Result<()> {
        let a = graph.tensor(inst.input_params[0].tensor);
        let b = graph.tensor(inst.input_params[1].tensor);
        let y = graph.tensor(inst.output_params[0].tensor);
        let rank = y.rank();
        let vars: Vec<String> = (0..rank).map(|i| format!("i{i}")).collect();
        for (i, v) in vars.iter().enumerate() {
            out.push_str(&loop_open(v, y.shape.dim(i), 1));
        }
        let a_idx = format!("A{}", broadcast_index_string(a.shape.dims(), rank, &vars));
        let b_idx = format!("B{}", broadcast_index_string(b.shape.dims(), rank, &vars));
        let y_idx: String = vars.iter().map(|v| format!("[{v}]")).collect();
        out.push_str(&format!(
            "{}C{y_idx} = {};\n",
            crate::util::indent(rank + 1),
            self.op.c_expr(&a_idx, &b_idx, a.data_type)
        ));
        for _ in 0..rank {
            out.push_str(&loop_close(rank));
        }
        Ok(())
    }
}

/// The variadic family: `Sum`/`Max`/`Min` over 1..N same-shaped inputs (no
/// broadcasting required by the ONNX spec for these three).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VariadicOp {
    Sum,
    Max,
    Min,
}

#[derive(Debug)]
pub struct Variadic {
    pub op: VariadicOp,
}

impl Operator for Variadic {
    fn parse_attributes(&mut self, attrs: &[crate::attribute::Attr]) -> Result<()> {
        reject_unknown_attrs(attrs, &[], "Variadic")
    }

    fn resolve(&mut self, graph: &mut Graph, inst: &mut OperatorInstance) -> Result<()> {
        require(!inst.inputs.is_empty(), "Variadic: at least one input required")?;
        let mut shapes = Vec::new();
        for i in 0..inst.inputs.len() {
            let id = input_id(inst, i, "Variadic")?;
            inst.register_input(id, format!("in{i}"));
            shapes.push(graph.tensor(id).shape.dims().to_vec());
        }
        let shape_refs: Vec<&[usize]> = shapes.iter().map(|s| s.as_slice()).collect();
        let out_dims = multidirectional_broadcast(&shape_refs)?;
        let dtype = graph.tensor(inst.input_params[0].tensor).data_type;
        let y = Tensor::new(graph.anonymous_name(&format!("{:?}_out", self.op)), dtype, Shape::new(out_dims));
        let y_id = graph.add_tensor(y);
        inst.register_output(y_id, "Y");
        Ok(())
    }

    fn emit_body(&self, inst: &OperatorInstance, graph: &Graph, out: &mut String) -> Result<()> {
        let y = graph.tensor(inst.output_params[0].tensor);
        let rank = y.rank();
        let vars: Vec<String> = (0..rank).map(|i| format!("i{i}")).collect();
        for (i, v) in vars.iter().enumerate() {
            out.push_str(&loop_open(v, y.shape.dim(i), 1));
        }
        let y_idx: String = vars.iter().map(|v| format!("[{v}]")).collect();
        let mut terms = Vec::new();
        for p in &inst.input_params {
            let t = graph.tensor(p.tensor);
            terms.push(format!("{}{}", p.local_name, broadcast_index_string(t.shape.dims(), rank, &vars)));
        }
        let indent = crate::util::indent(rank + 1);
        match self.op {
            VariadicOp::Sum => {
                out.push_str(&format!("{indent}Y{y_idx} = {};\n", terms.join(" + ")));
            }
            VariadicOp::Max | VariadicOp::Min => {
                let cmp = if self.op == VariadicOp::Max { ">" } else { "<" };
                out.push_str(&format!("{indent}Y{y_idx} = {};\n", terms[0]));
                for term in &terms[1..] {
                    out.push_str(&format!(
                        "{indent}Y{y_idx} = ({term} {cmp} Y{y_idx}) ? {term} : Y{y_idx};\n"
                    ));
                }
            }
        }
        for _ in 0..rank {
            out.push_str(&loop_close(rank));
        }
        Ok(())
    }
}

pub fn register(r: &mut crate::registry::OpRegistry) {
    use crate::registry::reg;

    let unary_ops: &[(&str, UnaryOp)] = &[
        ("Abs", UnaryOp::Abs),
        ("Ceil", UnaryOp::Ceil),
        ("Floor", UnaryOp::Floor),
        ("Neg", UnaryOp::Neg),
        ("Relu", UnaryOp::Relu),
        ("Sigmoid", UnaryOp::Sigmoid),
        ("Sqrt", UnaryOp::Sqrt),
        ("Tanh", UnaryOp::Tanh),
    ];
    for (name, op) in unary_ops.iter().copied() {
        reg(r, name, move || Box::new(Unary { op }));
    }

    let binary_ops: &[(&str, BinaryOp)] = &[
        ("Add", BinaryOp::Add),
        ("And", BinaryOp::And),
        ("Div", BinaryOp::Div),
        ("Equal", BinaryOp::Equal),
        ("Greater", BinaryOp::Greater),
        ("GreaterOrEqual", BinaryOp::GreaterOrEqual),
        ("Less", BinaryOp::Less),
        ("LessOrEqual", BinaryOp::LessOrEqual),
        ("Mul", BinaryOp::Mul),
        ("Or", BinaryOp::Or),
        ("Pow", BinaryOp::Pow),
        ("PRelu", BinaryOp::PRelu),
        ("Sub", BinaryOp::Sub),
        ("Xor", BinaryOp::Xor),
    ];
    for (name, op) in binary_ops.iter().copied() {
        reg(r, name, move || Box::new(Binary { op }));
    }

    reg(r, "Sum", || Box::new(Variadic { op: VariadicOp::Sum }));
    reg(r, "Max", || Box::new(Variadic { op: VariadicOp::Max }));
    reg(r, "Min", || Box::new(Variadic { op: VariadicOp::Min }));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Graph;

    fn make_input(graph: &mut Graph, name: &str, dims: Vec<usize>) -> TensorId {
        let mut t = Tensor::new(name, DataType::Float, Shape::new(dims));
        t.is_io = true;
        graph.add_tensor(t)
    }

    #[test]
    fn binary_add_broadcasts_and_resolves() {
        let mut graph = Graph::new();
        let a = make_input(&mut graph, "a", vec![2, 3]);
        let b = make_input(&mut graph, "b", vec![3]);
        let mut inst = OperatorInstance::new("Add", "add1", Box::new(Binary { op: BinaryOp::Add }));
        inst.inputs = vec![Some(a), Some(b)];
        let mut op = Binary { op: BinaryOp::Add };
        op.resolve(&mut graph, &mut inst).unwrap();
        let y = graph.tensor(inst.output_params[0].tensor);
        assert_eq!(y.shape.dims(), &[2, 3]);
    }

    #[test]
    fn comparison_outputs_bool() {
        let mut graph = Graph::new();
        let a = make_input(&mut graph, "a", vec![4]);
        let b = make_input(&mut graph, "b", vec![4]);
        let mut inst = OperatorInstance::new("Greater", "g1", Box::new(Binary { op: BinaryOp::Greater }));
        inst.inputs = vec![Some(a), Some(b)];
        let mut op = Binary { op: BinaryOp::Greater };
        op.resolve(&mut graph, &mut inst).unwrap();
        let y = graph.tensor(inst.output_params[0].tensor);
        assert_eq!(y.data_type, DataType::Bool);
    }
}
