//! Error types for snapshot decoding and object reconstruction

use thiserror::Error;

use crate::snapshot::RecordKind;

pub type Result<T> = std::result::Result<T, SnapshotError>;

/// Coarse error category, independent of the concrete variant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Format,
    Schema,
    Bounds,
    NotFound,
    Decode,
    UnsupportedType,
    Validation,
    Io,
}

#[derive(Error, Debug)]
pub enum SnapshotError {
    #[error("Invalid snapshot format: {0}")]
    Format(#[source] serde_json::Error),

    #[error("Schema error: {0}")]
    Schema(String),

    #[error("Unknown {kind} field: {field}")]
    UnknownField { kind: RecordKind, field: String },

    #[error("{kind} index {index} out of bounds (count: {count})")]
    OutOfBounds { kind: RecordKind, index: usize, count: usize },

    #[error("Node offset {offset} is not a valid node position (node width: {width}, nodes length: {len})")]
    BadNodeOffset { offset: u64, width: usize, len: usize },

    #[error("Node not found: {0}")]
    NodeNotFound(u64),

    #[error("Unable to find parent node for edge {0}")]
    EdgeParentNotFound(usize),

    #[error("Node {node_id} has no '{name}' child")]
    ChildNotFound { node_id: u64, name: String },

    #[error("Cannot decode {kind} field '{field}' (raw value: {raw}): {reason}")]
    Decode {
        kind: RecordKind,
        field: String,
        raw: u64,
        reason: String,
    },

    #[error("Node {node_id} is '{node_type}', cannot build object")]
    NotAnObject { node_id: u64, node_type: String },

    #[error("Unsupported node {node_id} (type: {node_type}, name: {name}), unable to compile value")]
    UnsupportedType {
        node_id: u64,
        node_type: String,
        name: String,
    },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl SnapshotError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SnapshotError::Format(_) => ErrorKind::Format,
            SnapshotError::Schema(_) | SnapshotError::UnknownField { .. } => ErrorKind::Schema,
            SnapshotError::OutOfBounds { .. } | SnapshotError::BadNodeOffset { .. } => {
                ErrorKind::Bounds
            }
            SnapshotError::NodeNotFound(_)
            | SnapshotError::EdgeParentNotFound(_)
            | SnapshotError::ChildNotFound { .. } => ErrorKind::NotFound,
            SnapshotError::Decode { .. } => ErrorKind::Decode,
            SnapshotError::NotAnObject { .. } | SnapshotError::UnsupportedType { .. } => {
                ErrorKind::UnsupportedType
            }
            SnapshotError::Validation(_) => ErrorKind::Validation,
            SnapshotError::Io(_) => ErrorKind::Io,
        }
    }

    /// Errors that mean the node/edge arrays contradict each other.
    /// They poison every query on the snapshot, not just the current one.
    pub fn is_malformed_snapshot(&self) -> bool {
        matches!(
            self,
            SnapshotError::EdgeParentNotFound(_) | SnapshotError::BadNodeOffset { .. }
        )
    }

    /// Errors produced while reading the document rather than answering a query
    pub fn is_load_error(&self) -> bool {
        matches!(self.kind(), ErrorKind::Format | ErrorKind::Io)
            || matches!(self, SnapshotError::Schema(_))
    }

    /// serde_json reports both syntax and shape problems; only the former is a format error
    pub(crate) fn from_json(err: serde_json::Error) -> Self {
        use serde_json::error::Category;
        match err.classify() {
            Category::Data => SnapshotError::Schema(err.to_string()),
            Category::Io | Category::Syntax | Category::Eof => SnapshotError::Format(err),
        }
    }
}
