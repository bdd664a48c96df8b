//! Graph construction from a root node id

use std::collections::HashMap;
use std::ops::Range;

use crate::error::Result;
use crate::snapshot::{HeapSnapshot, RecordKind};
use super::{EdgeLabel, GraphEdge, StructuredEdge, StructuredGraph, StructuredNode};

/// Decode every field of a node, plus the range of edges it owns
pub fn structured_node(snapshot: &HeapSnapshot, node_id: u64) -> Result<StructuredNode> {
    let (node, index) = snapshot.find_node_by_id(node_id)?;
    let edge_ids = snapshot.node_edge_ids(node_id)?;

    Ok(StructuredNode {
        id: snapshot.node_id(node)?,
        index,
        node_type: snapshot.decode_str(RecordKind::Node, "type", node)?.to_string(),
        name: snapshot.decode_str(RecordKind::Node, "name", node)?.to_string(),
        size: snapshot
            .decode_optional_num(RecordKind::Node, "self_size", node)?
            .unwrap_or(0),
        edge_count: snapshot.node_edge_count(node)?,
        trace_node_id: snapshot.decode_optional_num(RecordKind::Node, "trace_node_id", node)?,
        detachedness: snapshot.decode_optional_num(RecordKind::Node, "detachedness", node)?,
        edge_ids,
    })
}

/// Decode an edge, resolving its target offset to the target's node id
pub fn structured_edge(snapshot: &HeapSnapshot, edge_id: usize) -> Result<StructuredEdge> {
    let edge = snapshot.edge_at_index(edge_id)?;

    let edge_type = snapshot.decode_str(RecordKind::Edge, "type", edge)?;
    let to_node = snapshot.decode_num(RecordKind::Edge, "to_node", edge)?;
    let target = snapshot.node_at_index(snapshot.node_index_for_offset(to_node)?)?;

    let label = if StructuredEdge::is_indexed(edge_type) {
        EdgeLabel::Index(snapshot.decode_num(RecordKind::Edge, "name_or_index", edge)?)
    } else {
        EdgeLabel::Name(
            snapshot
                .decode_str(RecordKind::Edge, "name_or_index", edge)?
                .to_string(),
        )
    };

    Ok(StructuredEdge {
        id: edge_id,
        edge_type: edge_type.to_string(),
        node_id: snapshot.node_id(target)?,
        label,
    })
}

/// A node whose edges are still being expanded
struct Frame {
    node: StructuredNode,
    remaining: Range<usize>,
    edges: Vec<GraphEdge>,
}

impl Frame {
    fn new(node: StructuredNode) -> Self {
        Self {
            remaining: node.edge_ids.clone(),
            edges: Vec::with_capacity(node.edge_count),
            node,
        }
    }

    fn finish(self) -> StructuredGraph {
        StructuredGraph {
            node: self.node,
            edges: self.edges,
        }
    }
}

fn leave_path(on_path: &mut HashMap<u64, usize>, id: u64) {
    if let Some(count) = on_path.get_mut(&id) {
        *count -= 1;
        if *count == 0 {
            on_path.remove(&id);
        }
    }
}

/// Build the graph reachable from `node_id` through edges accepted by `edge_filter`.
///
/// Cycle detection is per path: a target already among the ancestors of the
/// node being expanded is marked circular and not expanded, but the same node
/// reached along another path is expanded again. `max_depth` bounds how many
/// ancestors a node may have before its edges stop being expanded.
///
/// The walk keeps its own frame stack, so heap depth is bounded by memory,
/// not by the thread's stack.
pub fn build_graph<F>(
    snapshot: &HeapSnapshot,
    node_id: u64,
    max_depth: Option<usize>,
    edge_filter: &F,
) -> Result<StructuredGraph>
where
    F: Fn(&StructuredEdge) -> bool + ?Sized,
{
    let mut current = Frame::new(structured_node(snapshot, node_id)?);
    // Suspended ancestors, each with the edge leading to its child frame
    let mut parents: Vec<(Frame, StructuredEdge)> = Vec::new();
    // Ancestor ids of `current`; a self-loop puts the same id on the path twice
    let mut on_path: HashMap<u64, usize> = HashMap::new();

    loop {
        if let Some(edge_id) = current.remaining.next() {
            let edge = structured_edge(snapshot, edge_id)?;
            if !edge_filter(&edge) {
                continue;
            }

            let is_circular = on_path.contains_key(&edge.node_id);
            let within_depth = max_depth.map_or(true, |max| parents.len() < max);

            if !is_circular && within_depth {
                let child = Frame::new(structured_node(snapshot, edge.node_id)?);
                *on_path.entry(current.node.id).or_insert(0) += 1;
                parents.push((std::mem::replace(&mut current, child), edge));
            } else {
                current.edges.push(GraphEdge {
                    edge,
                    is_circular,
                    graph: None,
                });
            }
            continue;
        }

        let graph = current.finish();
        match parents.pop() {
            Some((mut parent, edge)) => {
                leave_path(&mut on_path, parent.node.id);
                parent.edges.push(GraphEdge {
                    edge,
                    is_circular: false,
                    graph: Some(graph),
                });
                current = parent;
            }
            None => return Ok(graph),
        }
    }
}
