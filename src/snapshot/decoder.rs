//! Field decoding and record lookups over the flat arrays

use std::fmt;
use std::ops::Range;

use crate::error::{Result, SnapshotError};
use super::{FieldType, HeapSnapshot, RecordKind};

/// Raw node or edge record: `width` consecutive integers
pub type Record<'a> = &'a [u64];

/// Decoded field value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldValue<'a> {
    Str(&'a str),
    Num(u64),
}

impl<'a> FieldValue<'a> {
    pub fn as_str(&self) -> Option<&'a str> {
        match self {
            FieldValue::Str(s) => Some(s),
            FieldValue::Num(_) => None,
        }
    }

    pub fn as_num(&self) -> Option<u64> {
        match self {
            FieldValue::Num(n) => Some(*n),
            FieldValue::Str(_) => None,
        }
    }
}

impl fmt::Display for FieldValue<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Str(s) => f.write_str(s),
            FieldValue::Num(n) => write!(f, "{}", n),
        }
    }
}

impl HeapSnapshot {
    /// Decode `field` of a raw record according to the schema.
    ///
    /// `prefer_string` only matters for `string_or_number` fields: when set,
    /// the raw value is looked up in the string table.
    pub fn decode_field<'a>(
        &'a self,
        kind: RecordKind,
        field: &str,
        record: Record<'_>,
        prefer_string: bool,
    ) -> Result<FieldValue<'a>> {
        let (position, field_type) = self.schema(kind).field(field)?;
        let raw = *record.get(position).ok_or(SnapshotError::OutOfBounds {
            kind,
            index: position,
            count: record.len(),
        })?;

        let decode_error = |reason: String| SnapshotError::Decode {
            kind,
            field: field.to_string(),
            raw,
            reason,
        };

        match field_type {
            FieldType::Enum(values) => usize::try_from(raw)
                .ok()
                .and_then(|i| values.get(i))
                .map(|s| FieldValue::Str(s.as_str()))
                .ok_or_else(|| {
                    decode_error(format!("enumeration has {} values", values.len()))
                }),
            FieldType::String => self.lookup_string(raw).ok_or_else(|| {
                decode_error(format!("string table has {} entries", self.strings().len()))
            }),
            FieldType::StringOrNumber if prefer_string => {
                self.lookup_string(raw).ok_or_else(|| {
                    decode_error(format!(
                        "string table has {} entries",
                        self.strings().len()
                    ))
                })
            }
            FieldType::Number | FieldType::Node | FieldType::StringOrNumber => {
                Ok(FieldValue::Num(raw))
            }
        }
    }

    fn lookup_string(&self, raw: u64) -> Option<FieldValue<'_>> {
        usize::try_from(raw)
            .ok()
            .and_then(|i| self.string(i))
            .map(FieldValue::Str)
    }

    /// Decode a field that must be a string (enumeration or string-table entry)
    pub fn decode_str<'a>(
        &'a self,
        kind: RecordKind,
        field: &str,
        record: Record<'_>,
    ) -> Result<&'a str> {
        match self.decode_field(kind, field, record, true)? {
            FieldValue::Str(s) => Ok(s),
            FieldValue::Num(raw) => Err(SnapshotError::Decode {
                kind,
                field: field.to_string(),
                raw,
                reason: "expected a string field".into(),
            }),
        }
    }

    /// Decode a field that must be numeric
    pub fn decode_num(&self, kind: RecordKind, field: &str, record: Record<'_>) -> Result<u64> {
        match self.decode_field(kind, field, record, false)? {
            FieldValue::Num(n) => Ok(n),
            FieldValue::Str(s) => Err(SnapshotError::Decode {
                kind,
                field: field.to_string(),
                raw: 0,
                reason: format!("expected a number, found '{}'", s),
            }),
        }
    }

    /// Like `decode_num`, but `None` when the schema has no such field
    pub fn decode_optional_num(
        &self,
        kind: RecordKind,
        field: &str,
        record: Record<'_>,
    ) -> Result<Option<u64>> {
        if !self.schema(kind).has_field(field) {
            return Ok(None);
        }
        self.decode_num(kind, field, record).map(Some)
    }

    pub fn node_at_index(&self, index: usize) -> Result<Record<'_>> {
        record_at(&self.nodes, RecordKind::Node, index, self.node_count(), self.node_schema().width())
    }

    pub fn edge_at_index(&self, index: usize) -> Result<Record<'_>> {
        record_at(&self.edges, RecordKind::Edge, index, self.edge_count(), self.edge_schema().width())
    }

    pub fn node_id(&self, node: Record<'_>) -> Result<u64> {
        self.decode_num(RecordKind::Node, "id", node)
    }

    pub fn node_edge_count(&self, node: Record<'_>) -> Result<usize> {
        let count = self.decode_num(RecordKind::Node, "edge_count", node)?;
        usize::try_from(count).map_err(|_| SnapshotError::Decode {
            kind: RecordKind::Node,
            field: "edge_count".into(),
            raw: count,
            reason: "does not fit in memory".into(),
        })
    }

    /// Node record and its index for an id
    pub fn find_node_by_id(&self, id: u64) -> Result<(Record<'_>, usize)> {
        let index = self.index.index_of(id).ok_or(SnapshotError::NodeNotFound(id))?;
        Ok((self.node_at_index(index)?, index))
    }

    /// Edge ids owned by a node: a contiguous range
    pub fn node_edge_ids(&self, id: u64) -> Result<Range<usize>> {
        let (_, index) = self.find_node_by_id(id)?;
        self.index
            .edge_range(index)
            .ok_or(SnapshotError::OutOfBounds {
                kind: RecordKind::Node,
                index,
                count: self.node_count(),
            })
    }

    /// Id of the node owning `edge_id`
    pub fn find_edge_parent_node_id(&self, edge_id: usize) -> Result<u64> {
        let index = self
            .index
            .owner_of_edge(edge_id)
            .ok_or(SnapshotError::EdgeParentNotFound(edge_id))?;
        self.node_id(self.node_at_index(index)?)
    }

    /// Convert an edge's `to_node` offset into a node index
    pub fn node_index_for_offset(&self, offset: u64) -> Result<usize> {
        let width = self.node_schema().width();
        let bad_offset = || SnapshotError::BadNodeOffset {
            offset,
            width,
            len: self.nodes.len(),
        };

        let offset = usize::try_from(offset).map_err(|_| bad_offset())?;
        if offset % width != 0 || offset >= self.nodes.len() {
            return Err(bad_offset());
        }
        Ok(offset / width)
    }

    /// Nodes in index order, with their index
    pub fn iter_nodes(&self) -> impl Iterator<Item = (Record<'_>, usize)> + '_ {
        let width = self.node_schema().width();
        self.nodes.chunks_exact(width).zip(0..self.node_count())
    }

    /// Edges in id order, with their id
    pub fn iter_edges(&self) -> impl Iterator<Item = (Record<'_>, usize)> + '_ {
        let width = self.edge_schema().width();
        self.edges.chunks_exact(width).zip(0..self.edge_count())
    }
}

fn record_at(
    array: &[u64],
    kind: RecordKind,
    index: usize,
    count: usize,
    width: usize,
) -> Result<Record<'_>> {
    if index >= count {
        return Err(SnapshotError::OutOfBounds { kind, index, count });
    }
    let offset = index * width;
    array
        .get(offset..offset + width)
        .ok_or(SnapshotError::OutOfBounds { kind, index, count })
}
