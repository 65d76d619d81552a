// Copyright (c) ONNX Project Contributors
// SPDX-License-Identifier: Apache-2.0

//! Decodes an ONNX `ModelProto` and drives the fixed-point node resolver
//! (§4.1 "Graph construction").
//!
//! Tensors are seeded from initializers and graph inputs first; then the
//! node list is swept repeatedly, resolving whatever node has all of its
//! inputs available, until a full pass makes no progress — at which point
//! any remaining node is a genuine cycle or a reference to an undeclared
//! tensor, reported as [`CompileError::UnresolvableGraph`].

use crate::attribute::{Attr, AttrValue, RawTensor};
use crate::config::CompileOptions;
use crate::enums::{AttributeType, DataType};
use crate::error::{CompileError, Result};
use crate::graph::Graph;
use crate::ids::TensorId;
use crate::operator::{Operator, OperatorInstance};
use crate::pb;
use crate::registry::OpRegistry;
use crate::shape::Shape;
use crate::tensor::Tensor;
use std::collections::{HashMap, HashSet};

/// Decodes raw `.onnx` bytes into a `ModelProto`.
pub fn decode_model(bytes: &[u8]) -> Result<pb::ModelProto> {
    use prost::Message;
    pb::ModelProto::decode(bytes).map_err(|e| CompileError::bad_input(format!("failed to decode ONNX ModelProto: {e}"), None))
}

/// Builds a resolved [`Graph`] from a decoded model (§4.1).
pub fn build_graph(model: &pb::ModelProto, opts: &CompileOptions, registry: &OpRegistry) -> Result<Graph> {
    let graph_pb = model
        .graph
        .as_ref()
        .ok_or_else(|| CompileError::bad_input("ModelProto has no `graph`", None))?;

    let mut graph = Graph::new();
    graph.ir_version = model.ir_version.unwrap_or(0);
    graph.opset_version = model.opset_import.first().and_then(|o| o.version).unwrap_or(0);
    tracing::debug!(
        opset = graph.opset_version,
        nodes = graph_pb.node.len(),
        "building graph"
    );

    seed_initializers(&mut graph, graph_pb)?;
    seed_inputs(&mut graph, graph_pb, opts)?;

    let used_names = compute_used_names(graph_pb);
    let mut quantized_copies: HashMap<TensorId, TensorId> = HashMap::new();

    let total = graph_pb.node.len();
    let mut resolved = vec![false; total];
    let mut remaining = total;

    while remaining > 0 {
        let mut progressed = false;
        for (i, node_pb) in graph_pb.node.iter().enumerate() {
            if resolved[i] {
                continue;
            }
            if try_resolve_node(&mut graph, node_pb, opts, registry, &used_names, &mut quantized_copies)? {
                resolved[i] = true;
                remaining -= 1;
                progressed = true;
            }
        }
        if !progressed {
            let names = graph_pb
                .node
                .iter()
                .enumerate()
                .filter(|(i, _)| !resolved[*i])
                .map(|(_, n)| n.name.clone().unwrap_or_else(|| n.op_type.clone().unwrap_or_default()))
                .collect::<Vec<_>>();
            return Err(CompileError::UnresolvableGraph { count: names.len(), names });
        }
    }

    mark_graph_outputs(&mut graph, graph_pb)?;
    Ok(graph)
}

/// Every name that appears as *some* node's input, or as a graph output —
/// used to decide `output_used` up front, independent of resolution order.
fn compute_used_names(graph_pb: &pb::GraphProto) -> HashSet<String> {
    let mut used = HashSet::new();
    for n in &graph_pb.node {
        for i in &n.input {
            if !i.is_empty() {
                used.insert(i.clone());
            }
        }
    }
    for o in &graph_pb.output {
        if let Some(name) = &o.name {
            used.insert(name.clone());
        }
    }
    used
}

fn seed_initializers(graph: &mut Graph, graph_pb: &pb::GraphProto) -> Result<()> {
    for init in &graph_pb.initializer {
        let name = init.name.clone().unwrap_or_default();
        let (dtype, bytes) = tensor_proto_to_bytes(init)?;
        let shape = Shape::new(init.dims.iter().map(|&d| d.max(0) as usize));
        graph.add_tensor(Tensor::constant(name, dtype, shape, bytes));
    }
    Ok(())
}

fn seed_inputs(graph: &mut Graph, graph_pb: &pb::GraphProto, opts: &CompileOptions) -> Result<()> {
    for vi in &graph_pb.input {
        let name = vi.name.clone().unwrap_or_default();
        // Pre-IR4 models list every initializer in `graph.input` too; such a
        // tensor is a constant weight, not a caller-supplied value, so it
        // must not join `entry()`'s parameter list.
        if graph.find_tensor(&name).map(|id| graph.tensor(id).is_const).unwrap_or(false) {
            continue;
        }
        let (dtype, shape) = value_info_to_type_shape(vi, opts)?;
        let mut t = Tensor::new(name, dtype, shape);
        t.is_io = true;
        t.generate = false;
        let id = graph.add_tensor(t);
        graph.graph_inputs.push(id);
    }
    Ok(())
}

fn mark_graph_outputs(graph: &mut Graph, graph_pb: &pb::GraphProto) -> Result<()> {
    for vi in &graph_pb.output {
        let name = vi.name.clone().unwrap_or_default();
        let id = graph
            .find_tensor(&name)
            .ok_or_else(|| CompileError::bad_input(format!("graph output `{name}` was never produced"), None))?;
        {
            let t = graph.tensor_mut(id);
            t.is_io = true;
            if !t.is_recursive {
                t.generate = false;
            }
        }
        graph.graph_outputs.push(id);
    }
    Ok(())
}

fn value_info_to_type_shape(vi: &pb::ValueInfoProto, opts: &CompileOptions) -> Result<(DataType, Shape)> {
    let name = vi.name.clone().unwrap_or_default();
    let ty = vi
        .r#type
        .as_ref()
        .ok_or_else(|| CompileError::bad_input(format!("`{name}` has no declared type"), None))?;
    let tensor_type = match &ty.value {
        Some(pb::type_proto::Value::TensorType(t)) => t,
        _ => return Err(CompileError::unimplemented_feature("non-tensor ValueInfoProto type", name)),
    };
    let elem = tensor_type
        .elem_type
        .ok_or_else(|| CompileError::bad_input(format!("`{name}` tensor type is missing elem_type"), None))?;
    let dtype = DataType::from_i32(elem).ok_or_else(|| CompileError::bad_input(format!("`{name}` has invalid elem_type tag {elem}"), None))?;
    let dims = match &tensor_type.shape {
        Some(s) => s.dim.iter().map(|d| resolve_dim(d, opts)).collect::<Result<Vec<usize>>>()?,
        None => Vec::new(),
    };
    Ok((dtype, Shape::new(dims)))
}

/// §7 "UnknownDimension": a symbolic or absent dimension is a warning, not a
/// fatal error — resolved to a user-supplied `dim_defines` binding, or 1.
fn resolve_dim(d: &pb::tensor_shape_proto::Dimension, opts: &CompileOptions) -> Result<usize> {
    match &d.value {
        Some(pb::tensor_shape_proto::dimension::Value::DimValue(v)) if *v > 0 => Ok(*v as usize),
        Some(pb::tensor_shape_proto::dimension::Value::DimParam(p)) => {
            if let Some(&bound) = opts.dim_defines.get(p) {
                Ok(bound as usize)
            } else {
                tracing::warn!("unresolved symbolic dimension `{p}`, defaulting to 1");
                Ok(1)
            }
        }
        _ => {
            tracing::warn!("unknown or non-positive tensor dimension, defaulting to 1");
            Ok(1)
        }
    }
}

/// Converts a `TensorProto`'s data into raw little-endian element bytes
/// matching its declared `data_type`. Prefers `raw_data`; falls back to the
/// per-type repeated fields ONNX uses when a tensor is stored "unpacked".
fn tensor_proto_to_bytes(t: &pb::TensorProto) -> Result<(DataType, Vec<u8>)> {
    let raw_type = t.data_type.ok_or_else(|| CompileError::bad_input("TensorProto missing data_type", None))?;
    let dtype = DataType::from_i32(raw_type)
        .ok_or_else(|| CompileError::bad_input(format!("TensorProto has invalid data_type tag {raw_type}"), None))?;

    if let Some(raw) = &t.raw_data {
        if !raw.is_empty() {
            return Ok((dtype, raw.clone()));
        }
    }

    let mut bytes = Vec::new();
    match dtype {
        DataType::Float => {
            for v in &t.float_data {
                bytes.extend_from_slice(&v.to_le_bytes());
            }
        }
        DataType::Double => {
            for v in &t.double_data {
                bytes.extend_from_slice(&v.to_le_bytes());
            }
        }
        DataType::Int64 => {
            for v in &t.int64_data {
                bytes.extend_from_slice(&v.to_le_bytes());
            }
        }
        DataType::Uint64 => {
            for v in &t.uint64_data {
                bytes.extend_from_slice(&v.to_le_bytes());
            }
        }
        // ONNX packs every narrower-than-32-bit int type (and bool) into
        // `int32_data`; narrow each element to the declared width.
        DataType::Bool | DataType::Int8 | DataType::Uint8 => {
            for v in &t.int32_data {
                bytes.push(*v as u8);
            }
        }
        DataType::Int16 | DataType::Uint16 => {
            for v in &t.int32_data {
                bytes.extend_from_slice(&(*v as u16).to_le_bytes());
            }
        }
        DataType::Int32 | DataType::Uint32 => {
            for v in &t.int32_data {
                bytes.extend_from_slice(&v.to_le_bytes());
            }
        }
        _ => {
            return Err(CompileError::unimplemented_feature(
                format!("TensorProto data_type {dtype:?} without raw_data"),
                t.name.clone(),
            ))
        }
    }
    Ok((dtype, bytes))
}

fn convert_attrs(attrs: &[pb::AttributeProto], site: &str) -> Result<Vec<Attr>> {
    attrs.iter().map(|a| convert_attr(a, site)).collect()
}

fn convert_attr(a: &pb::AttributeProto, site: &str) -> Result<Attr> {
    let name = a.name.clone().unwrap_or_default();
    // The explicit `type` tag is advisory in real-world ONNX files (some
    // exporters omit it); the value is inferred from whichever field is
    // actually populated instead of trusting the tag.
    let _ = a.r#type.and_then(AttributeType::from_i32);

    let value = if !a.floats.is_empty() {
        AttrValue::Floats(a.floats.clone())
    } else if !a.ints.is_empty() {
        AttrValue::Ints(a.ints.clone())
    } else if !a.strings.is_empty() {
        AttrValue::Strings(a.strings.iter().map(|s| String::from_utf8_lossy(s).into_owned()).collect())
    } else if let Some(t) = &a.t {
        AttrValue::Tensor(convert_raw_tensor(t)?)
    } else if let Some(f) = a.f {
        AttrValue::Float(f)
    } else if let Some(i) = a.i {
        AttrValue::Int(i)
    } else if let Some(s) = &a.s {
        AttrValue::String(String::from_utf8_lossy(s).into_owned())
    } else {
        return Err(CompileError::bad_input(
            format!("attribute `{name}` has no recognizable value"),
            site.to_string(),
        ));
    };
    Ok(Attr {
        name,
        value,
        doc_string: a.doc_string.clone(),
    })
}

fn convert_raw_tensor(t: &pb::TensorProto) -> Result<RawTensor> {
    let (dtype, raw_data) = tensor_proto_to_bytes(t)?;
    Ok(RawTensor {
        dims: t.dims.clone(),
        data_type: dtype,
        raw_data,
    })
}

/// §4.2 quantization substitution: a constant float input gets a cached
/// `make_quantized_copy`, reused across every node that references it.
fn quantize_input_if_const(graph: &mut Graph, id: TensorId, cache: &mut HashMap<TensorId, TensorId>) -> Option<TensorId> {
    if let Some(&q) = cache.get(&id) {
        return Some(q);
    }
    let t = graph.tensor(id);
    if !t.is_const {
        return None;
    }
    let quantized = t.make_quantized_copy()?;
    let qid = graph.add_tensor(quantized);
    cache.insert(id, qid);
    Some(qid)
}

/// A throwaway `Operator` used only as the target of `mem::replace` while
/// the real operator's `resolve`/`emit_body` needs `&mut inst` and `inst.op`
/// (the same object) simultaneously — see `try_resolve_node`.
#[derive(Debug, Default)]
struct Unresolved;

impl Operator for Unresolved {
    fn parse_attributes(&mut self, _attrs: &[Attr]) -> Result<()> {
        unreachable!("Unresolved is never kept past try_resolve_node")
    }

    fn resolve(&mut self, _graph: &mut Graph, _inst: &mut OperatorInstance) -> Result<()> {
        unreachable!("Unresolved is never kept past try_resolve_node")
    }

    fn emit_body(&self, _inst: &OperatorInstance, _graph: &Graph, _out: &mut String) -> Result<()> {
        unreachable!("Unresolved is never kept past try_resolve_node")
    }
}

/// Attempts to resolve one ONNX node. Returns `Ok(false)` when an input
/// tensor hasn't appeared yet (the node is deferred to a later pass).
fn try_resolve_node(
    graph: &mut Graph,
    node_pb: &pb::NodeProto,
    opts: &CompileOptions,
    registry: &OpRegistry,
    used_names: &HashSet<String>,
    quantized_copies: &mut HashMap<TensorId, TensorId>,
) -> Result<bool> {
    let mut input_ids: Vec<Option<TensorId>> = Vec::with_capacity(node_pb.input.len());
    for name in &node_pb.input {
        if name.is_empty() {
            input_ids.push(None);
            continue;
        }
        match graph.find_tensor(name) {
            Some(id) => input_ids.push(Some(id)),
            None => return Ok(false),
        }
    }

    let mut op_kind = node_pb.op_type.clone().unwrap_or_default();
    if op_kind.is_empty() {
        return Err(CompileError::bad_input("NodeProto missing `op_type`", node_pb.name.clone()));
    }

    if opts.quantize {
        op_kind = match op_kind.as_str() {
            "Conv" => "ConvInteger".to_string(),
            "MatMul" => "MatMulInteger".to_string(),
            other => other.to_string(),
        };
        for slot in input_ids.iter_mut() {
            if let Some(id) = slot {
                if let Some(q) = quantize_input_if_const(graph, *id, quantized_copies) {
                    *id = q;
                }
            }
        }
    }

    let onnx_name = match &node_pb.name {
        Some(n) if !n.is_empty() => n.clone(),
        _ => graph.anonymous_name(&op_kind),
    };

    let op = registry
        .create(&op_kind)
        .ok_or_else(|| CompileError::unimplemented_operator(op_kind.clone(), onnx_name.clone()))?;

    let mut inst = OperatorInstance::new(op_kind.clone(), onnx_name.clone(), op);
    inst.inputs = input_ids;
    inst.output_used = node_pb
        .output
        .iter()
        .map(|name| !name.is_empty() && used_names.contains(name))
        .collect();

    let attrs = convert_attrs(&node_pb.attribute, &onnx_name)?;

    let mut op = std::mem::replace(&mut inst.op, Box::new(Unresolved));
    op.parse_attributes(&attrs)?;
    let resolved = op.resolve(graph, &mut inst);
    inst.op = op;
    resolved?;

    while inst.output_used.len() < inst.outputs.len() {
        inst.output_used.push(false);
    }

    for i in 0..inst.outputs.len() {
        let Some(id) = inst.output(i) else { continue };
        let declared = node_pb.output.get(i).map(|s| s.as_str()).unwrap_or("");
        if !declared.is_empty() {
            graph.rename_tensor(id, declared.to_string());
        } else if graph.tensor(id).is_recursive {
            let name = format!("{}_recursive_{i}", inst.cname());
            graph.rename_tensor(id, name);
            inst.output_used[i] = true;
        }
    }

    graph.push_node(inst);
    Ok(true)
}
