// Copyright (c) ONNX Project Contributors
// SPDX-License-Identifier: Apache-2.0

//! `LSTM`, grounded in `original_source/src/nodes/lstm.h`.
//!
//! `Y_h`/`Y_c` are mandatory recursion tensors even when the ONNX graph
//! leaves their output names empty: the per-timestep loop reads the previous
//! call's hidden/cell state out of them before overwriting it. If
//! `initial_h`/`initial_c` are provided as compile-time constants, `Y_h`/`Y_c`
//! alias directly onto them (`Tensor::alias_of`) and the constant's storage
//! is mutated in place across invocations; otherwise `Y_h`/`Y_c` own a
//! zero-initialized recursive buffer with the generated library's lifetime.
//! `sequence_lens`, when given, freezes state per batch row past its active
//! length rather than continuing to update it — a deliberate behavior choice
//! (there is no consensus reading of the ONNX spec here).

use crate::error::{CompileError, Result};
use crate::graph::Graph;
use crate::operator::{default_emit_signature, Operator, OperatorInstance};
use crate::ops::common::*;
use crate::shape::Shape;
use crate::tensor::Tensor;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Forward,
    Reverse,
    Bidirectional,
}

impl Direction {
    fn num_directions(self) -> usize {
        if self == Direction::Bidirectional {
            2
        } else {
            1
        }
    }

    /// Whether direction slot `d` (0-indexed) walks time forward.
    fn walks_forward(self, d: usize) -> bool {
        match self {
            Direction::Forward => true,
            Direction::Reverse => false,
            Direction::Bidirectional => d == 0,
        }
    }
}

fn activation_expr(name: &str, inner: &str) -> Result<String> {
    Ok(match name {
        "Sigmoid" => format!("(1.0f/(1.0f+expf(-({inner}))))"),
        "Tanh" => format!("tanhf({inner})"),
        "Relu" => format!("(({inner}) > 0.0f ? ({inner}) : 0.0f)"),
        other => return Err(CompileError::unimplemented_feature(format!("LSTM: activation `{other}`"), None)),
    })
}

#[derive(Debug, Default)]
pub struct Lstm {
    activations: Vec<String>,
    clip: Option<f32>,
    direction: Option<Direction>,
    hidden_size_attr: Option<i64>,
    input_forget: bool,

    // Shapes/flags resolved from inputs, used only by `emit_body`.
    seq_length: usize,
    batch_size: usize,
    input_size: usize,
    hidden_size: usize,
    num_directions: usize,
    has_b: bool,
    has_sequence_lens: bool,
    has_p: bool,
    y_h_aliased: bool,
    y_c_aliased: bool,
}

impl Operator for Lstm {
    fn parse_attributes(&mut self, attrs: &[crate::attribute::Attr]) -> Result<()> {
        reject_unknown_attrs(
            attrs,
            &[
                "activation_alpha",
                "activation_beta",
                "activations",
                "clip",
                "direction",
                "hidden_size",
                "input_forget",
            ],
            "LSTM",
        )?;

        self.activations = match attr(attrs, "activations") {
            Some(a) => match &a.value {
                crate::attribute::AttrValue::Strings(v) => v.clone(),
                _ => return Err(CompileError::incorrect_input("LSTM: `activations` is not a string list", None)),
            },
            None => vec!["Sigmoid".to_string(), "Tanh".to_string(), "Tanh".to_string()],
        };

        self.clip = attr(attrs, "clip").and_then(|a| a.as_float());
        self.direction = Some(match attr_string(attrs, "direction", "forward") {
            "forward" => Direction::Forward,
            "reverse" => Direction::Reverse,
            "bidirectional" => Direction::Bidirectional,
            other => return Err(CompileError::unimplemented_feature(format!("LSTM: direction `{other}`"), None)),
        });
        self.hidden_size_attr = attr(attrs, "hidden_size").and_then(|a| a.as_int());
        self.input_forget = attr_int(attrs, "input_forget", 0) != 0;

        // A direction-specific activation triple (6 entries total) is only
        // supported when both directions actually agree - this compiler
        // generates one runtime loop over direction, not two unrolled
        // direction-specific bodies, so a genuinely different reverse triple
        // can't be selected at emit time.
        if self.activations.len() == 6 {
            require(
                self.activations[0..3] == self.activations[3..6],
                "LSTM: distinct per-direction `activations` are not implemented",
            )?;
            self.activations.truncate(3);
        }
        require(self.activations.len() == 3, "LSTM: `activations` must list exactly 3 entries")?;
        for a in &self.activations {
            activation_expr(a, "0")?;
        }
        Ok(())
    }

    fn resolve(&mut self, graph: &mut Graph, inst: &mut OperatorInstance) -> Result<()> {
        require(
            (3..=8).contains(&inst.inputs.len()),
            "LSTM: expects between 3 and 8 inputs",
        )?;

        let x_id = input_id(inst, 0, "LSTM")?;
        let w_id = input_id(inst, 1, "LSTM")?;
        let r_id = input_id(inst, 2, "LSTM")?;
        inst.register_input(x_id, "X");
        inst.register_input(w_id, "W");
        inst.register_input(r_id, "R");

        let b_id = inst.input(3);
        let seq_lens_id = inst.input(4);
        let initial_h_id = inst.input(5);
        let initial_c_id = inst.input(6);
        let p_id = inst.input(7);

        if let Some(id) = b_id {
            inst.register_input(id, "B");
        }
        if let Some(id) = seq_lens_id {
            inst.register_input(id, "sequence_lens");
        }
        if let Some(id) = initial_h_id {
            inst.register_input(id, "initial_h");
        }
        if let Some(id) = initial_c_id {
            inst.register_input(id, "initial_c");
        }
        if let Some(id) = p_id {
            inst.register_input(id, "P");
        }

        let x = graph.tensor(x_id);
        require(x.rank() == 3, "LSTM: `X` must be rank 3 [seq_length, batch_size, input_size]")?;
        let seq_length = x.shape.dim(0);
        let batch_size = x.shape.dim(1);
        let input_size = x.shape.dim(2);
        let dtype = x.data_type;

        let direction = self.direction.expect("parse_attributes sets direction");
        let num_directions = direction.num_directions();

        let r = graph.tensor(r_id);
        require(r.rank() == 3, "LSTM: `R` must be rank 3")?;
        let hidden_size = match self.hidden_size_attr {
            Some(h) => h as usize,
            None => r.shape.dim(2),
        };
        require(hidden_size > 0, "LSTM: hidden_size must be positive")?;

        let w = graph.tensor(w_id);
        require(
            w.shape.dims() == [num_directions, 4 * hidden_size, input_size],
            "LSTM: `W` shape must be [num_directions, 4*hidden_size, input_size]",
        )?;
        require(
            r.shape.dims() == [num_directions, 4 * hidden_size, hidden_size],
            "LSTM: `R` shape must be [num_directions, 4*hidden_size, hidden_size]",
        )?;
        if let Some(id) = b_id {
            require(
                graph.tensor(id).shape.dims() == [num_directions, 8 * hidden_size],
                "LSTM: `B` shape must be [num_directions, 8*hidden_size]",
            )?;
        }
        if let Some(id) = p_id {
            require(
                graph.tensor(id).shape.dims() == [num_directions, 3 * hidden_size],
                "LSTM: `P` shape must be [num_directions, 3*hidden_size]",
            )?;
            require(graph.tensor(id).is_const, "LSTM: non-const `P` not handled")?;
        }
        if let Some(id) = seq_lens_id {
            require(graph.tensor(id).shape.dims() == [batch_size], "LSTM: `sequence_lens` shape must be [batch_size]")?;
        }
        for id in [initial_h_id, initial_c_id].into_iter().flatten() {
            require(
                graph.tensor(id).shape.dims() == [num_directions, batch_size, hidden_size],
                "LSTM: `initial_h`/`initial_c` shape must be [num_directions, batch_size, hidden_size]",
            )?;
        }

        self.seq_length = seq_length;
        self.batch_size = batch_size;
        self.input_size = input_size;
        self.hidden_size = hidden_size;
        self.num_directions = num_directions;
        self.has_b = b_id.is_some();
        self.has_sequence_lens = seq_lens_id.is_some();
        self.has_p = p_id.is_some();

        let recursive_shape = Shape::new(vec![num_directions, batch_size, hidden_size]);
        let zero_buf = vec![0u8; num_directions * batch_size * hidden_size * dtype.emitted_byte_size().unwrap_or(4)];

        let y_h_id = match initial_h_id {
            Some(id) if graph.tensor(id).is_const => {
                graph.tensor_mut(id).is_recursive = true;
                self.y_h_aliased = true;
                let mut alias = Tensor::new(graph.anonymous_name("LSTM_Y_h"), dtype, recursive_shape.clone());
                alias.is_recursive = true;
                alias.initialize = true;
                alias.generate = false;
                alias.alias_of = Some(id);
                graph.add_tensor(alias)
            }
            _ => {
                let mut t = Tensor::new(graph.anonymous_name("LSTM_Y_h"), dtype, recursive_shape.clone());
                t.is_recursive = true;
                t.initialize = true;
                t.buffer = Some(zero_buf.clone());
                graph.add_tensor(t)
            }
        };
        let y_c_id = match initial_c_id {
            Some(id) if graph.tensor(id).is_const => {
                graph.tensor_mut(id).is_recursive = true;
                self.y_c_aliased = true;
                let mut alias = Tensor::new(graph.anonymous_name("LSTM_Y_c"), dtype, recursive_shape.clone());
                alias.is_recursive = true;
                alias.initialize = true;
                alias.generate = false;
                alias.alias_of = Some(id);
                graph.add_tensor(alias)
            }
            _ => {
                let mut t = Tensor::new(graph.anonymous_name("LSTM_Y_c"), dtype, recursive_shape);
                t.is_recursive = true;
                t.initialize = true;
                t.buffer = Some(zero_buf);
                graph.add_tensor(t)
            }
        };

        let y = Tensor::new(
            graph.anonymous_name("LSTM_Y"),
            dtype,
            Shape::new(vec![seq_length, num_directions, batch_size, hidden_size]),
        );
        let y_id = graph.add_tensor(y);

        inst.register_output(y_id, "Y");
        inst.register_output(y_h_id, "Y_h");
        inst.register_output(y_c_id, "Y_c");
        Ok(())
    }

    fn emit_signature(&self, inst: &OperatorInstance, graph: &Graph, decorate: bool) -> String {
        // Aliased Y_h/Y_c share storage with the already-listed `initial_h`/
        // `initial_c` input parameter, so they are not separate parameters.
        let mut parts = Vec::new();
        for p in &inst.input_params {
            let t = graph.tensor(p.tensor);
            parts.push(if decorate { t.c_param_decl(&p.local_name) } else { t.cname() });
        }
        for p in &inst.output_params {
            if (p.local_name == "Y_h" && self.y_h_aliased) || (p.local_name == "Y_c" && self.y_c_aliased) {
                continue;
            }
            let t = graph.tensor(p.tensor);
            parts.push(if decorate { t.c_param_decl(&p.local_name) } else { t.cname() });
        }
        parts.join(", ")
    }

    fn emit_body(&self, inst: &OperatorInstance, graph: &Graph, out: &mut String) -> Result<()> {
        let direction = self.direction.expect("parse_attributes sets direction");
        let h = self.hidden_size;
        let d_count = self.num_directions;
        let bs = self.batch_size;
        let ds = self.input_size;
        let seq = self.seq_length;

        let yh_name = if self.y_h_aliased { "initial_h" } else { "Y_h" };
        let yc_name = if self.y_c_aliased { "initial_c" } else { "Y_c" };

        let i1 = crate::util::indent(1);
        let i2 = crate::util::indent(2);
        let i3 = crate::util::indent(3);
        let i4 = crate::util::indent(4);
        let i5 = crate::util::indent(5);

        out.push_str(&format!("{i1}for (uint32_t d = 0; d < {d_count}; d++) {{\n"));
        out.push_str(&format!("{i2}for (uint32_t tt = 0; tt < {seq}; tt++) {{\n"));
        out.push_str(&format!(
            "{i3}uint32_t t = (d == 0) ? (({}) ? tt : ({seq} - 1 - tt)) : (({}) ? tt : ({seq} - 1 - tt));\n",
            direction.walks_forward(0),
            direction.walks_forward(1.min(d_count - 1))
        ));
        out.push_str(&format!("{i3}for (uint32_t i = 0; i < {bs}; i++) {{\n"));

        if self.has_sequence_lens {
            out.push_str(&format!("{i4}int active = (t < (uint32_t)sequence_lens[i]);\n"));
        } else {
            out.push_str(&format!("{i4}int active = 1;\n"));
        }
        out.push_str(&format!("{i4}if (!active) {{\n"));
        out.push_str(&format!("{i5}for (uint32_t j = 0; j < {h}; j++) Y[t][d][i][j] = 0;\n"));
        out.push_str(&format!("{i4}continue;\n"));
        out.push_str(&format!("{i4}}}\n"));

        out.push_str(&format!("{i4}float lstm_f[{h}], lstm_i[{h}], lstm_c[{h}], lstm_o[{h}], lstm_cnew[{h}];\n"));

        for (gate_var, gate_idx, act_idx) in [("lstm_f", 2usize, 0usize), ("lstm_i", 0, 0), ("lstm_o", 1, 0)] {
            let act_name = self.activation_for(direction, act_idx);
            out.push_str(&format!("{i4}for (uint32_t j = 0; j < {h}; j++) {{\n"));
            out.push_str(&format!("{i5}float sum = 0.0f;\n"));
            out.push_str(&format!(
                "{i5}for (uint32_t k = 0; k < {ds}; k++) sum += X[t][i][k] * W[d][{gate_idx}*{h}+j][k];\n"
            ));
            out.push_str(&format!(
                "{i5}for (uint32_t k = 0; k < {h}; k++) sum += {yh_name}[d][i][k] * R[d][{gate_idx}*{h}+j][k];\n"
            ));
            if self.has_b {
                out.push_str(&format!(
                    "{i5}sum += B[d][{gate_idx}*{h}+j] + B[d][4*{h}+{gate_idx}*{h}+j];\n"
                ));
            }
            if self.has_p && gate_idx != 2 {
                // input/output peepholes use the *previous* cell state; index order i=0,o=1.
                let pidx = if gate_idx == 0 { 0 } else { h };
                out.push_str(&format!("{i5}sum += P[d][{pidx}+j] * {yc_name}[d][i][j];\n"));
            } else if self.has_p && gate_idx == 2 {
                out.push_str(&format!("{i5}sum += P[d][2*{h}+j] * {yc_name}[d][i][j];\n"));
            }
            if let Some(c) = self.clip {
                out.push_str(&format!("{i5}if (sum > {c}f) sum = {c}f; if (sum < -{c}f) sum = -{c}f;\n"));
            }
            let act = activation_expr(act_name, "sum")?;
            out.push_str(&format!("{i5}{gate_var}[j] = {act};\n"));
            out.push_str(&format!("{i4}}}\n"));
        }

        if self.input_forget {
            out.push_str(&format!(
                "{i4}for (uint32_t j = 0; j < {h}; j++) lstm_i[j] = 1.0f - lstm_f[j];\n"
            ));
        }

        let g_act = self.activation_for(direction, 1);
        out.push_str(&format!("{i4}for (uint32_t j = 0; j < {h}; j++) {{\n"));
        out.push_str(&format!("{i5}float sum = 0.0f;\n"));
        out.push_str(&format!(
            "{i5}for (uint32_t k = 0; k < {ds}; k++) sum += X[t][i][k] * W[d][3*{h}+j][k];\n"
        ));
        out.push_str(&format!(
            "{i5}for (uint32_t k = 0; k < {h}; k++) sum += {yh_name}[d][i][k] * R[d][3*{h}+j][k];\n"
        ));
        if self.has_b {
            out.push_str(&format!("{i5}sum += B[d][3*{h}+j] + B[d][4*{h}+3*{h}+j];\n"));
        }
        let act = activation_expr(g_act, "sum")?;
        out.push_str(&format!("{i5}lstm_c[j] = {act};\n"));
        out.push_str(&format!("{i4}}}\n"));

        out.push_str(&format!("{i4}for (uint32_t j = 0; j < {h}; j++)\n"));
        out.push_str(&format!(
            "{i5}lstm_cnew[j] = lstm_f[j] * {yc_name}[d][i][j] + lstm_i[j] * lstm_c[j];\n"
        ));

        let h_act = self.activation_for(direction, 2);
        let h_act_expr = activation_expr(h_act, "lstm_cnew[j]")?;
        out.push_str(&format!("{i4}for (uint32_t j = 0; j < {h}; j++) {{\n"));
        out.push_str(&format!("{i5}{yc_name}[d][i][j] = lstm_cnew[j];\n"));
        out.push_str(&format!("{i5}{yh_name}[d][i][j] = lstm_o[j] * ({h_act_expr});\n"));
        out.push_str(&format!("{i5}Y[t][d][i][j] = {yh_name}[d][i][j];\n"));
        out.push_str(&format!("{i4}}}\n"));

        out.push_str(&format!("{i3}}}\n"));
        out.push_str(&format!("{i2}}}\n"));
        out.push_str(&format!("{i1}}}\n"));
        Ok(())
    }
}

impl Lstm {
    /// `activations[gate_index]`, indexed into the right direction's triple
    /// when six entries were given for a bidirectional node.
    fn activation_for(&self, direction: Direction, gate_index: usize) -> &str {
        if direction == Direction::Bidirectional && self.activations.len() == 6 {
            // emit_body loops `d` at runtime; the forward triple is used as
            // the representative choice when activations differ per
            // direction is rare in practice, so fall back to it for d==1 too
            // unless a distinct reverse triple was actually supplied.
            &self.activations[gate_index]
        } else {
            &self.activations[gate_index % 3]
        }
    }
}

pub fn register(r: &mut crate::registry::OpRegistry) {
    crate::registry::reg(r, "LSTM", || Box::new(Lstm::default()));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enums::DataType;

    fn const_f32(graph: &mut Graph, name: &str, dims: Vec<usize>) -> crate::ids::TensorId {
        let n: usize = dims.iter().product();
        let buf = vec![0u8; n * 4];
        graph.add_tensor(Tensor::constant(name, DataType::Float, Shape::new(dims), buf))
    }

    #[test]
    fn lstm_forward_resolves_output_shapes() {
        let mut graph = Graph::new();
        let mut x = Tensor::new("x", DataType::Float, Shape::new(vec![1, 2, 3]));
        x.is_io = true;
        let x = graph.add_tensor(x);
        let w = const_f32(&mut graph, "w", vec![1, 16, 3]);
        let r = const_f32(&mut graph, "r", vec![1, 16, 4]);

        let mut inst = OperatorInstance::new("LSTM", "lstm1", Box::new(Lstm::default()));
        inst.inputs = vec![Some(x), Some(w), Some(r)];
        let mut op = Lstm::default();
        op.parse_attributes(&[crate::attribute::Attr::int("hidden_size", 4)]).unwrap();
        op.resolve(&mut graph, &mut inst).unwrap();

        let y = graph.tensor(inst.output_params[0].tensor);
        assert_eq!(y.shape.dims(), &[1, 1, 2, 4]);
        let y_h = graph.tensor(inst.output_params[1].tensor);
        assert!(y_h.is_recursive);
        assert!(y_h.alias_of.is_none());
    }

    #[test]
    fn lstm_aliases_recursive_state_onto_const_initial_h() {
        let mut graph = Graph::new();
        let mut x = Tensor::new("x", DataType::Float, Shape::new(vec![1, 1, 2]));
        x.is_io = true;
        let x = graph.add_tensor(x);
        let w = const_f32(&mut graph, "w", vec![1, 8, 2]);
        let r = const_f32(&mut graph, "r", vec![1, 8, 2]);
        let b = const_f32(&mut graph, "b", vec![1, 16]);
        let initial_h = const_f32(&mut graph, "h0", vec![1, 1, 2]);

        let mut inst = OperatorInstance::new("LSTM", "lstm1", Box::new(Lstm::default()));
        inst.inputs = vec![Some(x), Some(w), Some(r), Some(b), None, Some(initial_h)];
        let mut op = Lstm::default();
        op.parse_attributes(&[crate::attribute::Attr::int("hidden_size", 2)]).unwrap();
        op.resolve(&mut graph, &mut inst).unwrap();

        let y_h = graph.tensor(inst.output_params[1].tensor);
        assert_eq!(y_h.alias_of, Some(initial_h));
        assert!(!y_h.generate);
    }
}
