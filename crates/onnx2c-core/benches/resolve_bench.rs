// Copyright (c) ONNX Project Contributors
// SPDX-License-Identifier: Apache-2.0

//! Benchmarks the fixed-point resolver, optimization passes, and emitter
//! (§5 "Performance is not critical... if a model is large enough to make
//! this a bottleneck, it is not this compiler's target") against a long
//! `Relu` chain of varying depth, exercising the §4.1 resolution loop and
//! the §4.5 unionization pass's per-node liveness scan together.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use onnx2c_core::{compile_bytes, CompileOptions};

fn varint(mut v: u64) -> Vec<u8> {
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

fn varint_field(field: u32, v: i64) -> Vec<u8> {
    let mut out = tag(field, 0);
    out.extend(varint(v as u64));
    out
}

fn bytes_field(field: u32, data: &[u8]) -> Vec<u8> {
    let mut out = tag(field, 2);
    out.extend(varint(data.len() as u64));
    out.extend_from_slice(data);
    out
}

fn string_field(field: u32, s: &str) -> Vec<u8> {
    bytes_field(field, s.as_bytes())
}

fn message_field(field: u32, msg: &[u8]) -> Vec<u8> {
    bytes_field(field, msg)
}

fn dimension(v: i64) -> Vec<u8> {
    varint_field(1, v)
}

fn tensor_shape(dims: &[i64]) -> Vec<u8> {
    let mut out = Vec::new();
    for &d in dims {
        out.extend(message_field(1, &dimension(d)));
    }
    out
}

fn tensor_type(elem_type: i32, dims: &[i64]) -> Vec<u8> {
    let mut inner = varint_field(1, elem_type as i64);
    inner.extend(message_field(2, &tensor_shape(dims)));
    message_field(1, &inner)
}

fn value_info(name: &str, elem_type: Option<i32>, dims: &[i64]) -> Vec<u8> {
    let mut out = string_field(1, name);
    if let Some(elem_type) = elem_type {
        out.extend(message_field(2, &tensor_type(elem_type, dims)));
    }
    out
}

fn node(inputs: &[&str], outputs: &[&str], name: &str, op_type: &str) -> Vec<u8> {
    let mut out = Vec::new();
    for i in inputs {
        out.extend(string_field(1, i));
    }
    for o in outputs {
        out.extend(string_field(2, o));
    }
    out.extend(string_field(3, name));
    out.extend(string_field(4, op_type));
    out
}

/// Builds a `Relu` chain `depth` nodes long over a `[100]` float input, the
/// same shape as §8 scenario S4 but scaled up to stress the resolver.
fn relu_chain_model_bytes(depth: usize) -> Vec<u8> {
    const FLOAT: i32 = 1;

    let mut graph = Vec::new();
    graph.extend(message_field(11, &value_info("x0", Some(FLOAT), &[100])));

    let mut prev = "x0".to_string();
    for i in 0..depth {
        let out_name = format!("x{}", i + 1);
        let node_name = format!("relu{i}");
        graph.extend(message_field(1, &node(&[&prev], &[&out_name], &node_name, "Relu")));
        prev = out_name;
    }
    graph.extend(message_field(12, &value_info(&prev, None, &[])));

    let mut opset = string_field(1, "");
    opset.extend(varint_field(2, 13));

    let mut model = varint_field(1, 8);
    model.extend(message_field(8, &opset));
    model.extend(message_field(7, &graph));
    model
}

fn bench_compile_relu_chain(c: &mut Criterion) {
    let mut group = c.benchmark_group("compile_relu_chain");
    for depth in [8usize, 64, 256] {
        let bytes = relu_chain_model_bytes(depth);
        group.bench_with_input(BenchmarkId::from_parameter(depth), &bytes, |b, bytes| {
            b.iter(|| compile_bytes(bytes, &CompileOptions::default()).unwrap());
        });
    }
    group.finish();
}

fn bench_compile_relu_chain_no_unionize(c: &mut Criterion) {
    let mut group = c.benchmark_group("compile_relu_chain_no_unionize");
    let opts = CompileOptions {
        opt_unionize: false,
        ..CompileOptions::default()
    };
    for depth in [8usize, 64, 256] {
        let bytes = relu_chain_model_bytes(depth);
        group.bench_with_input(BenchmarkId::from_parameter(depth), &bytes, |b, bytes| {
            b.iter(|| compile_bytes(bytes, &opts).unwrap());
        });
    }
    group.finish();
}

criterion_group!(benches, bench_compile_relu_chain, bench_compile_relu_chain_no_unionize);
criterion_main!(benches);
