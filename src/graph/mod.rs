//! Structured graph: a tree-shaped, cycle-marked view over the snapshot

pub mod builder;

use std::fmt;
use std::ops::Range;

use serde::Serialize;

pub use builder::{build_graph, structured_edge, structured_node};

/// Fully decoded node
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StructuredNode {
    pub id: u64,
    pub index: usize,
    #[serde(rename = "type")]
    pub node_type: String,
    pub name: String,
    pub size: u64,
    pub edge_count: usize,
    pub trace_node_id: Option<u64>,
    pub detachedness: Option<u64>,
    pub edge_ids: Range<usize>,
}

/// Edge name, or position for element/hidden edges
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum EdgeLabel {
    Name(String),
    Index(u64),
}

impl EdgeLabel {
    pub fn name(&self) -> Option<&str> {
        match self {
            EdgeLabel::Name(name) => Some(name),
            EdgeLabel::Index(_) => None,
        }
    }

    pub fn index(&self) -> Option<u64> {
        match self {
            EdgeLabel::Index(index) => Some(*index),
            EdgeLabel::Name(_) => None,
        }
    }
}

impl fmt::Display for EdgeLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EdgeLabel::Name(name) => f.write_str(name),
            EdgeLabel::Index(index) => write!(f, "{}", index),
        }
    }
}

/// Decoded edge; the target is given by node id
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StructuredEdge {
    pub id: usize,
    #[serde(rename = "type")]
    pub edge_type: String,
    pub node_id: u64,
    pub label: EdgeLabel,
}

impl StructuredEdge {
    pub fn name(&self) -> Option<&str> {
        self.label.name()
    }

    /// Element and hidden edges are addressed by index, everything else by name
    pub fn is_indexed(edge_type: &str) -> bool {
        matches!(edge_type, "element" | "hidden")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphEdge {
    pub edge: StructuredEdge,
    /// Target is already an ancestor on this path
    pub is_circular: bool,
    /// Absent for circular edges and past the depth limit
    pub graph: Option<StructuredGraph>,
}

impl GraphEdge {
    pub fn target(&self) -> Option<&StructuredNode> {
        self.graph.as_ref().map(|g| &g.node)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StructuredGraph {
    pub node: StructuredNode,
    pub edges: Vec<GraphEdge>,
}

impl StructuredGraph {
    /// Longest chain of expanded edges below this node
    pub fn depth(&self) -> usize {
        let mut deepest = 0;
        let mut stack = vec![(self, 0usize)];
        while let Some((graph, depth)) = stack.pop() {
            deepest = deepest.max(depth);
            stack.extend(
                graph
                    .edges
                    .iter()
                    .filter_map(|e| e.graph.as_ref())
                    .map(|g| (g, depth + 1)),
            );
        }
        deepest
    }
}

fn write_node(f: &mut fmt::Formatter<'_>, node: &StructuredNode, level: usize) -> fmt::Result {
    writeln!(
        f,
        "{}Node{{{}}} {} (type: {}, size: {})",
        "   ".repeat(level),
        node.id,
        node.name,
        node.node_type,
        node.size
    )
}

fn write_edge(f: &mut fmt::Formatter<'_>, edge: &GraphEdge, level: usize) -> fmt::Result {
    let e = &edge.edge;
    write!(
        f,
        "{}-> Edge{{{}}} {} ({}) -> Node{{{}}}",
        "   ".repeat(level),
        e.id,
        e.label,
        e.edge_type,
        e.node_id
    )?;
    if edge.is_circular {
        f.write_str(" (circular)")?;
    }
    writeln!(f)
}

impl fmt::Display for StructuredGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_node(f, &self.node, 0)?;

        let mut stack = vec![(self.edges.iter(), 0usize)];
        while let Some((edges, level)) = stack.last_mut() {
            let level = *level;
            match edges.next() {
                Some(edge) => {
                    write_edge(f, edge, level)?;
                    if let Some(graph) = &edge.graph {
                        write_node(f, &graph.node, level + 1)?;
                        stack.push((graph.edges.iter(), level + 1));
                    }
                }
                None => {
                    stack.pop();
                }
            }
        }
        Ok(())
    }
}

// Long reference chains nest thousands of levels deep; unlink them
// iteratively instead of through recursive drop glue
impl Drop for StructuredGraph {
    fn drop(&mut self) {
        let mut pending: Vec<StructuredGraph> =
            self.edges.iter_mut().filter_map(|e| e.graph.take()).collect();
        while let Some(mut graph) = pending.pop() {
            pending.extend(graph.edges.iter_mut().filter_map(|e| e.graph.take()));
        }
    }
}
