//! Synthetic snapshot builder for tests

use std::collections::HashMap;

use serde_json::json;

use crate::snapshot::HeapSnapshot;

pub const NODE_TYPES: &[&str] = &[
    "hidden",
    "array",
    "string",
    "object",
    "code",
    "closure",
    "regexp",
    "number",
    "native",
    "synthetic",
    "concatenated string",
    "sliced string",
    "symbol",
    "bigint",
    "object shape",
];

pub const EDGE_TYPES: &[&str] = &[
    "context", "element", "property", "internal", "hidden", "shortcut", "weak",
];

const NODE_WIDTH: u64 = 7;

enum Label {
    Name(String),
    Index(u64),
}

struct TestEdge {
    edge_type: &'static str,
    label: Label,
    to: u64,
}

struct TestNode {
    id: u64,
    node_type: String,
    name: String,
    edges: Vec<TestEdge>,
}

/// Builds a V8-layout snapshot. Nodes keep insertion order; edges are
/// grouped under their owner regardless of when they were added.
#[derive(Default)]
pub struct SnapshotBuilder {
    nodes: Vec<TestNode>,
    positions: HashMap<u64, usize>,
    strings: Vec<String>,
    pub declared_edge_count: Option<usize>,
}

impl SnapshotBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn node(mut self, id: u64, node_type: &str, name: &str) -> Self {
        self.positions.entry(id).or_insert(self.nodes.len());
        self.nodes.push(TestNode {
            id,
            node_type: node_type.to_string(),
            name: name.to_string(),
            edges: Vec::new(),
        });
        self
    }

    pub fn edge(mut self, from: u64, edge_type: &'static str, name: &str, to: u64) -> Self {
        self.owner(from).edges.push(TestEdge {
            edge_type,
            label: Label::Name(name.to_string()),
            to,
        });
        self
    }

    pub fn indexed_edge(mut self, from: u64, edge_type: &'static str, index: u64, to: u64) -> Self {
        self.owner(from).edges.push(TestEdge {
            edge_type,
            label: Label::Index(index),
            to,
        });
        self
    }

    pub fn property(self, from: u64, name: &str, to: u64) -> Self {
        self.edge(from, "property", name, to)
    }

    pub fn internal(self, from: u64, name: &str, to: u64) -> Self {
        self.edge(from, "internal", name, to)
    }

    pub fn element(self, from: u64, index: u64, to: u64) -> Self {
        self.indexed_edge(from, "element", index, to)
    }

    pub fn hidden(self, from: u64, index: u64, to: u64) -> Self {
        self.indexed_edge(from, "hidden", index, to)
    }

    fn owner(&mut self, id: u64) -> &mut TestNode {
        let position = *self
            .positions
            .get(&id)
            .unwrap_or_else(|| panic!("edge from unknown node {}", id));
        &mut self.nodes[position]
    }

    fn intern(&mut self, s: &str) -> u64 {
        if let Some(i) = self.strings.iter().position(|x| x == s) {
            return i as u64;
        }
        self.strings.push(s.to_string());
        (self.strings.len() - 1) as u64
    }

    pub fn to_json(mut self) -> String {
        let positions = std::mem::take(&mut self.positions);
        let offset_of = |id: u64| {
            let index = *positions
                .get(&id)
                .unwrap_or_else(|| panic!("edge to unknown node {}", id));
            index as u64 * NODE_WIDTH
        };

        let mut raw_nodes = Vec::new();
        let mut raw_edges = Vec::new();
        let nodes = std::mem::take(&mut self.nodes);

        for node in &nodes {
            let node_type = NODE_TYPES
                .iter()
                .position(|t| *t == node.node_type)
                .unwrap_or_else(|| panic!("unknown node type {}", node.node_type));
            let name = self.intern(&node.name);

            raw_nodes.extend_from_slice(&[
                node_type as u64,
                name,
                node.id,
                node.name.len() as u64 * 2 + 16,
                node.edges.len() as u64,
                0,
                0,
            ]);

            for edge in &node.edges {
                let edge_type = EDGE_TYPES
                    .iter()
                    .position(|t| *t == edge.edge_type)
                    .unwrap_or_else(|| panic!("unknown edge type {}", edge.edge_type));
                let name_or_index = match &edge.label {
                    Label::Name(name) => self.intern(name),
                    Label::Index(index) => *index,
                };
                raw_edges.extend_from_slice(&[edge_type as u64, name_or_index, offset_of(edge.to)]);
            }
        }

        let edge_count = self
            .declared_edge_count
            .unwrap_or(raw_edges.len() / 3);

        json!({
            "snapshot": {
                "meta": {
                    "node_fields": ["type", "name", "id", "self_size", "edge_count", "trace_node_id", "detachedness"],
                    "node_types": [NODE_TYPES, "string", "number", "number", "number", "number", "number"],
                    "edge_fields": ["type", "name_or_index", "to_node"],
                    "edge_types": [EDGE_TYPES, "string_or_number", "node"],
                    "trace_function_info_fields": ["function_id", "name", "script_name", "script_id", "line", "column"],
                    "trace_node_fields": ["id", "function_info_index", "count", "size", "children"],
                    "sample_fields": ["timestamp_us", "last_assigned_id"],
                    "location_fields": ["object_index", "script_id", "line", "column"]
                },
                "node_count": nodes.len(),
                "edge_count": edge_count,
                "trace_function_count": 0
            },
            "nodes": raw_nodes,
            "edges": raw_edges,
            "trace_function_infos": [],
            "trace_tree": [],
            "samples": [],
            "locations": [],
            "strings": self.strings
        })
        .to_string()
    }

    pub fn build(self) -> HeapSnapshot {
        HeapSnapshot::from_json_str(&self.to_json()).expect("synthetic snapshot must load")
    }
}
