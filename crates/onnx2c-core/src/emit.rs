// Copyright (c) ONNX Project Contributors
// SPDX-License-Identifier: Apache-2.0

//! The code emitter (§4.7): walks the resolved, optimized [`Graph`] and
//! prints a single self-contained C translation unit.
//!
//! Emits, in order: front matter, global tensor storage (or `entry()`-local
//! when `no_globals`), one `static void node_<name>(...)` function per
//! resolved node, and the `void entry(...)` orchestration function.

use crate::config::CompileOptions;
use crate::error::Result;
use crate::graph::Graph;
use crate::util::indent;

pub fn emit(graph: &Graph, opts: &CompileOptions) -> Result<String> {
    let mut out = String::new();
    emit_front_matter(&mut out, opts);

    let union_sizes = union_buffer_sizes(graph);

    if opts.no_globals {
        emit_union_macros(&mut out, graph, 0);
    } else {
        emit_storage(&mut out, graph, opts, &union_sizes);
    }

    if opts.only_init {
        return Ok(out);
    }

    for node in &graph.nodes {
        if node.input_params.is_empty() && node.output_params.is_empty() {
            continue;
        }
        let sig = node.op.emit_signature(node, graph, true);
        out.push_str(&format!("static void {}({sig}) {{\n", node.cname()));
        node.op.emit_body(node, graph, &mut out)?;
        out.push_str("}\n\n");
    }

    emit_entry(&mut out, graph, opts, &union_sizes)?;
    Ok(out)
}

fn emit_front_matter(out: &mut String, opts: &CompileOptions) {
    out.push_str("#include <stdint.h>\n");
    out.push_str("#include <stdbool.h>\n");
    out.push_str("#include <string.h>\n");
    out.push_str("#include <math.h>\n");
    out.push_str("#include <float.h>\n");
    if opts.target_avr {
        out.push_str("#include <avr/pgmspace.h>\n");
    }
    out.push('\n');
    out.push_str("#define MIN(a, b) ((a) < (b) ? (a) : (b))\n");
    out.push_str("#define MAX(a, b) ((a) > (b) ? (a) : (b))\n");
    out.push_str("#define CLIP(x, lo, hi) (MIN(MAX((x), (lo)), (hi)))\n");
    if opts.target_avr {
        out.push_str("#define RD_PROGMEM(type, ptr) (pgm_read_byte(&(ptr)))\n");
    }
    out.push('\n');
}

/// Per §4.5: byte size of slot `k` is the max emitted byte size (times
/// element count) over every tensor ever assigned that index.
fn union_buffer_sizes(graph: &Graph) -> Vec<usize> {
    let mut sizes = Vec::new();
    for t in &graph.tensors {
        if let Some(k) = t.union_index {
            let bytes = t.data_type.emitted_byte_size().unwrap_or(1) * t.shape.size().max(1);
            if k >= sizes.len() {
                sizes.resize(k + 1, 0);
            }
            sizes[k] = sizes[k].max(bytes);
        }
    }
    sizes
}

fn emit_storage(out: &mut String, graph: &Graph, opts: &CompileOptions, union_sizes: &[usize]) {
    for (k, &size) in union_sizes.iter().enumerate() {
        let qualifier = if opts.target_avr { " PROGMEM" } else { "" };
        out.push_str(&format!("static uint8_t union_{k}[{size}]{qualifier};\n"));
    }
    if !union_sizes.is_empty() {
        out.push('\n');
    }

    for t in &graph.tensors {
        if t.union_index.is_some() || !t.generate || t.is_io {
            continue;
        }
        let qualifier = if t.is_const && opts.target_avr { " PROGMEM" } else { "" };
        if t.initialize {
            out.push_str(&format!("{}{qualifier} = {};\n", t.c_storage_decl(), t.c_initializer()));
        } else {
            out.push_str(&format!("{}{qualifier};\n", t.c_storage_decl()));
        }
    }
    out.push('\n');

    emit_union_macros(out, graph, 0);
}

/// `#define tensor_X (*(TYPE (*)[dims])union_K)` — a cast view over the
/// shared buffer, so every reference site reads exactly as if `tensor_X`
/// were its own declared array.
fn emit_union_macros(out: &mut String, graph: &Graph, indent_level: usize) {
    let pad = indent(indent_level);
    for t in &graph.tensors {
        let Some(k) = t.union_index else { continue };
        let cname = t.cname();
        if t.is_scalar() {
            out.push_str(&format!("{pad}#define {cname} (*({} *)union_{k})\n", t.c_type()));
        } else {
            out.push_str(&format!(
                "{pad}#define {cname} (*({} (*){})union_{k})\n",
                t.c_type(),
                t.c_array_dims()
            ));
        }
    }
    out.push('\n');
}

fn emit_entry(out: &mut String, graph: &Graph, opts: &CompileOptions, union_sizes: &[usize]) -> Result<()> {
    let params: Vec<String> = graph
        .graph_inputs
        .iter()
        .chain(graph.graph_outputs.iter())
        .map(|&id| {
            let t = graph.tensor(id);
            t.c_param_decl(&t.cname())
        })
        .collect();

    out.push_str(&format!("void entry({}) {{\n", params.join(", ")));

    if opts.no_globals {
        for (k, &size) in union_sizes.iter().enumerate() {
            out.push_str(&format!("{}uint8_t union_{k}[{size}];\n", indent(1)));
        }
        for t in &graph.tensors {
            if t.union_index.is_some() || !t.generate || t.is_io {
                continue;
            }
            if t.initialize {
                out.push_str(&format!("{}static {} = {};\n", indent(1), t.c_storage_decl(), t.c_initializer()));
            } else {
                out.push_str(&format!("{}{};\n", indent(1), t.c_storage_decl()));
            }
        }
        out.push('\n');
    }

    for node in &graph.nodes {
        if node.input_params.is_empty() && node.output_params.is_empty() {
            continue;
        }
        let call_sig = node.op.emit_signature(node, graph, false);
        out.push_str(&format!("{}{}({call_sig});\n", indent(1), node.cname()));
    }
    out.push_str("}\n");
    Ok(())
}
