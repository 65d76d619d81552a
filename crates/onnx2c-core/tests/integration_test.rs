// Copyright (c) ONNX Project Contributors
// SPDX-License-Identifier: Apache-2.0

//! End-to-end tests driving the public [`onnx2c_core::compile_bytes`] entry
//! point against hand-encoded `ModelProto` wire bytes (scenarios S1/S2/S3 of
//! the design, plus the determinism and error-taxonomy properties of §8).
//!
//! `pb::ModelProto` is crate-private (see `lib.rs`), so these tests cannot
//! construct one in-process; instead `onnx` below is a minimal hand-rolled
//! protobuf encoder covering exactly the field subset `proto/onnx.proto`
//! declares. Field numbers are taken straight from that file.

use onnx2c_core::{compile_bytes, CompileOptions};

mod onnx {
    //! A tiny protobuf-2 wire encoder, just enough to build the `ModelProto`
    //! messages these tests need. Not a general-purpose encoder.

    pub fn varint(mut v: u64) -> Vec<u8> {
        let mut out = Vec::new();
        loop {
            let byte = (v & 0x7f) as u8;
            v >>= 7;
            if v == 0 {
                out.push(byte);
                break;
            } else {
                out.push(byte | 0x80);
            }
        }
        out
    }

    fn tag(field: u32, wire_type: u32) -> Vec<u8> {
        varint(((field as u64) << 3) | wire_type as u64)
    }

    pub fn varint_field(field: u32, v: i64) -> Vec<u8> {
        let mut out = tag(field, 0);
        out.extend(varint(v as u64));
        out
    }

    pub fn bytes_field(field: u32, data: &[u8]) -> Vec<u8> {
        let mut out = tag(field, 2);
        out.extend(varint(data.len() as u64));
        out.extend_from_slice(data);
        out
    }

    pub fn string_field(field: u32, s: &str) -> Vec<u8> {
        bytes_field(field, s.as_bytes())
    }

    pub fn message_field(field: u32, msg: &[u8]) -> Vec<u8> {
        bytes_field(field, msg)
    }

    pub struct Dimension;
    impl Dimension {
        pub fn value(v: i64) -> Vec<u8> {
            varint_field(1, v)
        }
    }

    pub fn tensor_shape(dims: &[i64]) -> Vec<u8> {
        let mut out = Vec::new();
        for &d in dims {
            out.extend(message_field(1, &Dimension::value(d)));
        }
        out
    }

    pub fn tensor_type(elem_type: i32, dims: &[i64]) -> Vec<u8> {
        let mut inner = varint_field(1, elem_type as i64);
        inner.extend(message_field(2, &tensor_shape(dims)));
        message_field(1, &inner) // TypeProto.tensor_type = 1
    }

    pub fn value_info(name: &str, elem_type: Option<i32>, dims: Option<&[i64]>) -> Vec<u8> {
        let mut out = string_field(1, name);
        if let Some(elem_type) = elem_type {
            out.extend(message_field(2, &tensor_type(elem_type, dims.unwrap_or(&[]))));
        }
        out
    }

    pub fn node(inputs: &[&str], outputs: &[&str], name: &str, op_type: &str, attrs: &[Vec<u8>]) -> Vec<u8> {
        let mut out = Vec::new();
        for i in inputs {
            out.extend(string_field(1, i));
        }
        for o in outputs {
            out.extend(string_field(2, o));
        }
        out.extend(string_field(3, name));
        out.extend(string_field(4, op_type));
        for a in attrs {
            out.extend(message_field(5, a));
        }
        out
    }

    pub fn attr_ints(name: &str, values: &[i64]) -> Vec<u8> {
        let mut out = string_field(1, name);
        for &v in values {
            out.extend(varint_field(8, v));
        }
        out
    }

    pub fn tensor_proto_int64(name: &str, dims: &[i64], values: &[i64]) -> Vec<u8> {
        let mut out = Vec::new();
        for &d in dims {
            out.extend(varint_field(1, d));
        }
        out.extend(varint_field(2, 7)); // data_type = INT64
        let mut raw = Vec::new();
        for &v in values {
            raw.extend_from_slice(&v.to_le_bytes());
        }
        out.extend(bytes_field(9, &raw)); // raw_data
        out.extend(string_field(8, name));
        out
    }

    pub fn tensor_proto_float(name: &str, dims: &[i64], values: &[f32]) -> Vec<u8> {
        let mut out = Vec::new();
        for &d in dims {
            out.extend(varint_field(1, d));
        }
        out.extend(varint_field(2, 1)); // data_type = FLOAT
        let mut raw = Vec::new();
        for &v in values {
            raw.extend_from_slice(&v.to_le_bytes());
        }
        out.extend(bytes_field(9, &raw));
        out.extend(string_field(8, name));
        out
    }

    #[derive(Default)]
    pub struct GraphBuilder {
        nodes: Vec<Vec<u8>>,
        initializers: Vec<Vec<u8>>,
        inputs: Vec<Vec<u8>>,
        outputs: Vec<Vec<u8>>,
    }

    impl GraphBuilder {
        pub fn node(mut self, n: Vec<u8>) -> Self {
            self.nodes.push(n);
            self
        }
        pub fn initializer(mut self, t: Vec<u8>) -> Self {
            self.initializers.push(t);
            self
        }
        pub fn input(mut self, vi: Vec<u8>) -> Self {
            self.inputs.push(vi);
            self
        }
        pub fn output(mut self, vi: Vec<u8>) -> Self {
            self.outputs.push(vi);
            self
        }

        pub fn build(self) -> Vec<u8> {
            let mut out = Vec::new();
            for n in &self.nodes {
                out.extend(message_field(1, n));
            }
            for t in &self.initializers {
                out.extend(message_field(5, t));
            }
            for vi in &self.inputs {
                out.extend(message_field(11, vi));
            }
            for vi in &self.outputs {
                out.extend(message_field(12, vi));
            }
            out
        }
    }

    pub fn model(graph: Vec<u8>, opset_version: i64) -> Vec<u8> {
        let mut out = varint_field(1, 8); // ir_version
        let mut opset = string_field(1, "");
        opset.extend(varint_field(2, opset_version));
        out.extend(message_field(8, &opset));
        out.extend(message_field(7, &graph));
        out
    }
}

const FLOAT: i32 = 1;

fn add_model_bytes() -> Vec<u8> {
    // S1: two [2,3] float inputs, one Add node, one float output.
    let node = onnx::node(&["A", "B"], &["Y"], "add1", "Add", &[]);
    let graph = onnx::GraphBuilder::default()
        .node(node)
        .input(onnx::value_info("A", Some(FLOAT), Some(&[2, 3])))
        .input(onnx::value_info("B", Some(FLOAT), Some(&[2, 3])))
        .output(onnx::value_info("Y", None, None))
        .build();
    onnx::model(graph, 13)
}

#[test]
fn s1_trivial_add_compiles_and_declares_entry() {
    let bytes = add_model_bytes();
    let c_source = compile_bytes(&bytes, &CompileOptions::default()).expect("S1 Add model should compile");

    assert!(c_source.contains("void entry("), "missing entry() signature:\n{c_source}");
    assert!(c_source.contains("tensor_A"), "missing input symbol:\n{c_source}");
    assert!(c_source.contains("tensor_B"), "missing input symbol:\n{c_source}");
    assert!(c_source.contains("tensor_Y"), "missing output symbol:\n{c_source}");
    assert!(c_source.contains("node_add1("), "missing node function:\n{c_source}");
}

#[test]
fn determinism_same_bytes_produce_byte_identical_output() {
    // §8 property 1 / §6 "Determinism".
    let bytes = add_model_bytes();
    let opts = CompileOptions::default();
    let first = compile_bytes(&bytes, &opts).unwrap();
    let second = compile_bytes(&bytes, &opts).unwrap();
    assert_eq!(first, second);
}

#[test]
fn s2_reshape_with_constant_shape_initializer() {
    // S2: [2,3,4] float input, Reshape to the constant shape [6,4].
    let node = onnx::node(&["X", "shape"], &["Y"], "reshape1", "Reshape", &[]);
    let graph = onnx::GraphBuilder::default()
        .initializer(onnx::tensor_proto_int64("shape", &[2], &[6, 4]))
        .node(node)
        .input(onnx::value_info("X", Some(FLOAT), Some(&[2, 3, 4])))
        .output(onnx::value_info("Y", None, None))
        .build();
    let bytes = onnx::model(graph, 13);

    let c_source = compile_bytes(&bytes, &CompileOptions::default()).expect("S2 Reshape model should compile");
    assert!(c_source.contains("tensor_Y[6][4]"), "expected a [6][4] output array:\n{c_source}");
}

#[test]
fn s3_cast_folding_removes_intermediate_cast_node() {
    // S3: Add(float) -> Cast(to=double) -> Relu. After folding, Add's output
    // dtype becomes double and the Cast node disappears from emission.
    // AttributeProto { name: "to", i: 11 (DOUBLE) }
    let to_attr = {
        let mut out = onnx::string_field(1, "to");
        out.extend(onnx::varint_field(3, 11));
        out
    };
    let cast_attrs = vec![to_attr];

    let add_node = onnx::node(&["A", "B"], &["added"], "add1", "Add", &[]);
    let cast_node = onnx::node(&["added"], &["casted"], "cast1", "Cast", &cast_attrs);
    let relu_node = onnx::node(&["casted"], &["Y"], "relu1", "Relu", &[]);

    let graph = onnx::GraphBuilder::default()
        .node(add_node)
        .node(cast_node)
        .node(relu_node)
        .input(onnx::value_info("A", Some(FLOAT), Some(&[1])))
        .input(onnx::value_info("B", Some(FLOAT), Some(&[1])))
        .output(onnx::value_info("Y", None, None))
        .build();
    let bytes = onnx::model(graph, 13);

    let c_source = compile_bytes(&bytes, &CompileOptions::default()).expect("S3 cast-folding model should compile");
    assert!(!c_source.contains("node_cast1("), "Cast node should have been folded away:\n{c_source}");
    assert!(c_source.contains("double"), "folded tensor should carry the double dtype:\n{c_source}");
}

#[test]
fn unimplemented_operator_reports_op_kind() {
    let node = onnx::node(&["A"], &["Y"], "mystery1", "TotallyMadeUpOperator", &[]);
    let graph = onnx::GraphBuilder::default()
        .node(node)
        .input(onnx::value_info("A", Some(FLOAT), Some(&[1])))
        .output(onnx::value_info("Y", None, None))
        .build();
    let bytes = onnx::model(graph, 13);

    let err = compile_bytes(&bytes, &CompileOptions::default()).unwrap_err();
    assert!(err.to_string().contains("TotallyMadeUpOperator"), "{err}");
}

#[test]
fn unresolvable_graph_reports_dangling_input() {
    // "Y"'s node reads a tensor that is never produced by any initializer,
    // graph input, or other node — the fixed-point resolver can never make
    // progress on it.
    let node = onnx::node(&["never_produced"], &["Y"], "relu1", "Relu", &[]);
    let graph = onnx::GraphBuilder::default()
        .node(node)
        .output(onnx::value_info("Y", None, None))
        .build();
    let bytes = onnx::model(graph, 13);

    let err = compile_bytes(&bytes, &CompileOptions::default()).unwrap_err();
    assert!(matches!(err, onnx2c_core::CompileError::UnresolvableGraph { .. }), "{err}");
}

#[test]
fn only_init_suppresses_function_bodies() {
    let bytes = add_model_bytes();
    let opts = CompileOptions {
        only_init: true,
        ..CompileOptions::default()
    };
    let c_source = compile_bytes(&bytes, &opts).unwrap();
    assert!(!c_source.contains("void entry("), "only_init must not emit entry():\n{c_source}");
    assert!(!c_source.contains("node_add1("), "only_init must not emit node bodies:\n{c_source}");
}

#[test]
fn no_globals_moves_storage_into_entry_frame() {
    let bytes = add_model_bytes();
    let opts = CompileOptions {
        no_globals: true,
        ..CompileOptions::default()
    };
    let c_source = compile_bytes(&bytes, &opts).unwrap();
    assert!(c_source.contains("void entry("), "{c_source}");
    // With no_globals, intermediate/recursive storage is declared inside
    // entry() rather than at module scope; the function body is non-empty
    // beyond the node calls.
    let entry_start = c_source.find("void entry(").unwrap();
    assert!(c_source[entry_start..].contains("node_add1("));
}
