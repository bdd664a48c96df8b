//! Raw snapshot model: flat node/edge arrays, string table and schemas

pub mod decoder;
pub mod index;
pub mod schema;

use std::fs::File;
use std::path::Path;

use memmap2::Mmap;
use serde::Deserialize;

use crate::error::{Result, SnapshotError};

pub use decoder::FieldValue;
pub use index::SnapshotIndex;
pub use schema::{FieldType, MetaValue, RecordKind, RecordSchema, SnapshotMeta};

/// Node fields every snapshot must carry
pub const REQUIRED_NODE_FIELDS: &[&str] = &["type", "name", "id", "edge_count"];

/// Edge fields every snapshot must carry
pub const REQUIRED_EDGE_FIELDS: &[&str] = &["type", "name_or_index", "to_node"];

/// `snapshot` header of the document
#[derive(Debug, Clone, Deserialize)]
pub struct SnapshotInfo {
    pub node_count: usize,
    pub edge_count: usize,
    #[serde(default)]
    pub trace_function_count: usize,
    pub meta: SnapshotMeta,
}

/// Allocation-tracking arrays, carried as-is
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuxiliaryData {
    #[serde(default)]
    pub trace_function_infos: Vec<u64>,
    #[serde(default)]
    pub trace_tree: serde_json::Value,
    #[serde(default)]
    pub samples: Vec<u64>,
    #[serde(default)]
    pub locations: Vec<u64>,
}

#[derive(Debug, Deserialize)]
struct SnapshotDocument {
    snapshot: SnapshotInfo,
    nodes: Vec<u64>,
    edges: Vec<u64>,
    strings: Vec<String>,
    #[serde(flatten)]
    auxiliary: AuxiliaryData,
}

/// A loaded heap snapshot.
///
/// Immutable after loading; every query borrows it, so one instance can be
/// shared across threads without locking.
#[derive(Debug)]
pub struct HeapSnapshot {
    info: SnapshotInfo,
    node_schema: RecordSchema,
    edge_schema: RecordSchema,
    nodes: Vec<u64>,
    edges: Vec<u64>,
    strings: Vec<String>,
    auxiliary: AuxiliaryData,
    pub(crate) index: SnapshotIndex,
}

impl HeapSnapshot {
    /// Parse a complete snapshot document
    pub fn from_json_str(json: &str) -> Result<Self> {
        Self::from_json_slice(json.as_bytes())
    }

    pub fn from_json_slice(bytes: &[u8]) -> Result<Self> {
        let document: SnapshotDocument =
            serde_json::from_slice(bytes).map_err(SnapshotError::from_json)?;
        Self::from_document(document)
    }

    /// Load a snapshot file (memory-mapped, parsed in place)
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)?;

        // Zero-length files cannot be mapped on every platform
        if file.metadata()?.len() == 0 {
            return Self::from_json_slice(&[]);
        }

        let mmap = unsafe { Mmap::map(&file)? };
        let snapshot = Self::from_json_slice(&mmap[..])?;

        tracing::info!(
            "Loaded snapshot {:?}: {} nodes, {} edges, {} strings",
            path,
            snapshot.node_count(),
            snapshot.edge_count(),
            snapshot.strings.len()
        );

        Ok(snapshot)
    }

    fn from_document(document: SnapshotDocument) -> Result<Self> {
        let SnapshotDocument {
            snapshot: info,
            nodes,
            edges,
            strings,
            auxiliary,
        } = document;

        let node_schema =
            RecordSchema::new(RecordKind::Node, &info.meta.node_fields, &info.meta.node_types)?;
        let edge_schema =
            RecordSchema::new(RecordKind::Edge, &info.meta.edge_fields, &info.meta.edge_types)?;
        node_schema.require(REQUIRED_NODE_FIELDS)?;
        edge_schema.require(REQUIRED_EDGE_FIELDS)?;

        check_length("nodes", nodes.len(), info.node_count, node_schema.width())?;
        check_length("edges", edges.len(), info.edge_count, edge_schema.width())?;

        let mut snapshot = Self {
            info,
            node_schema,
            edge_schema,
            nodes,
            edges,
            strings,
            auxiliary,
            index: SnapshotIndex::default(),
        };
        snapshot.index = SnapshotIndex::build(&snapshot)?;

        tracing::debug!(
            "Snapshot indexed: {} nodes, {} edges",
            snapshot.node_count(),
            snapshot.edge_count()
        );

        Ok(snapshot)
    }

    pub fn node_count(&self) -> usize {
        self.info.node_count
    }

    pub fn edge_count(&self) -> usize {
        self.info.edge_count
    }

    pub fn trace_function_count(&self) -> usize {
        self.info.trace_function_count
    }

    pub fn meta(&self) -> &SnapshotMeta {
        &self.info.meta
    }

    pub fn schema(&self, kind: RecordKind) -> &RecordSchema {
        match kind {
            RecordKind::Node => &self.node_schema,
            RecordKind::Edge => &self.edge_schema,
        }
    }

    pub fn node_schema(&self) -> &RecordSchema {
        &self.node_schema
    }

    pub fn edge_schema(&self) -> &RecordSchema {
        &self.edge_schema
    }

    pub fn nodes(&self) -> &[u64] {
        &self.nodes
    }

    pub fn edges(&self) -> &[u64] {
        &self.edges
    }

    pub fn strings(&self) -> &[String] {
        &self.strings
    }

    pub fn string(&self, index: usize) -> Option<&str> {
        self.strings.get(index).map(String::as_str)
    }

    pub fn auxiliary(&self) -> &AuxiliaryData {
        &self.auxiliary
    }

    pub fn index(&self) -> &SnapshotIndex {
        &self.index
    }
}

fn check_length(array: &str, len: usize, count: usize, width: usize) -> Result<()> {
    let expected = count.checked_mul(width).ok_or_else(|| {
        SnapshotError::Validation(format!("{} count {} overflows", array, count))
    })?;

    if len != expected {
        return Err(SnapshotError::Validation(format!(
            "{} array has {} values, expected {} ({} records x {} fields)",
            array, len, expected, count, width
        )));
    }
    Ok(())
}
