// Copyright (c) ONNX Project Contributors
// SPDX-License-Identifier: Apache-2.0

//! # onnx2c-core
//!
//! An ahead-of-time compiler core that turns an ONNX `ModelProto` into a
//! self-contained C translation unit for inference on resource-constrained
//! targets.
//!
//! ## Pipeline
//!
//! ```text
//! bytes --[pb::ModelProto::decode]--> loader::build_graph --> passes --> emit::emit
//! ```
//!
//! 1. [`pb`] holds the `prost`-generated protobuf types for the ONNX wire
//!    format (a hand-written schema subset compiled by `build.rs`).
//! 2. [`loader`] drives the fixed-point node resolver: seeds tensors from
//!    initializers and graph inputs, then repeatedly resolves ONNX nodes
//!    against the [`registry::OpRegistry`] until no node makes progress.
//! 3. [`passes`] runs the whole-graph optimizations (cast folding, tensor
//!    unionization) over the resolved [`graph::Graph`].
//! 4. [`emit`] walks the graph and prints the C source.
//!
//! [`compile`] is the single entry point gluing these together; `onnx2c-cli`
//! is the only consumer outside this crate's own tests.
//!
//! ## Module organization
//!
//! - [`attribute`]: parsed ONNX attribute values
//! - [`config`]: [`config::CompileOptions`], the closed configuration surface
//! - [`enums`]: `DataType`/`AttributeType`, matching the ONNX protobuf enums
//! - [`error`]: the `CompileError` taxonomy
//! - [`graph`]: the resolved dataflow graph arena
//! - [`ids`]: `TensorId`/`NodeId` arena index newtypes
//! - [`operator`]: the `Operator` trait and `OperatorInstance` record
//! - [`ops`]: one module per ONNX operator family
//! - [`registry`]: the `op_kind -> factory` table
//! - [`shape`]: concrete (non-symbolic) tensor shapes
//! - [`tensor`]: the tensor value type
//! - [`util`]: `cify`/`indent` helpers shared across the crate

pub mod attribute;
pub mod config;
pub mod emit;
pub mod enums;
pub mod error;
pub mod graph;
pub mod ids;
pub mod loader;
pub mod operator;
pub mod ops;
pub(crate) mod pb;
pub mod passes;
pub mod registry;
pub mod shape;
pub mod tensor;
pub mod util;

pub use attribute::{Attr, AttrValue, RawTensor};
pub use config::CompileOptions;
pub use enums::{AttributeType, DataType};
pub use error::{CompileError, Result};
pub use graph::Graph;
pub use ids::{NodeId, TensorId};
pub use operator::{Operator, OperatorInstance};
pub use registry::OpRegistry;
pub use shape::Shape;
pub use tensor::Tensor;

/// Version of this compiler, surfaced by `onnx2c-cli`'s `-v/--version`.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Compiles one ONNX `ModelProto`, already decoded, into a C translation unit.
///
/// This is the non-I/O half of the pipeline described in the module docs:
/// callers that have raw `.onnx` bytes should use [`compile_bytes`] instead.
/// `pb::ModelProto` is crate-private, so this stays crate-internal; the only
/// supported public entry point is [`compile_bytes`].
pub(crate) fn compile_model(model: &pb::ModelProto, opts: &CompileOptions) -> Result<String> {
    let registry = OpRegistry::with_builtin_operators();
    let mut graph = loader::build_graph(model, opts, &registry)?;
    passes::run(&mut graph, opts);
    emit::emit(&graph, opts)
}

/// Decodes `bytes` as an ONNX `ModelProto` and compiles it to a C translation
/// unit (§2 "Control flow": `parse ONNX bytes -> Graph builder -> ...`).
pub fn compile_bytes(bytes: &[u8], opts: &CompileOptions) -> Result<String> {
    let model = loader::decode_model(bytes)?;
    compile_model(&model, opts)
}
