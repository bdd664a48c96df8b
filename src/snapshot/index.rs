//! Lookup tables built once per loaded snapshot
//!
//! Node ids are opaque, and edges are owned by position (node 0's edges first,
//! then node 1's, ...). Resolving either by scanning the arrays is linear, so
//! the snapshot keeps an id -> index map and an edge-offset prefix sum.

use std::collections::HashMap;
use std::ops::Range;

use crate::error::{Result, SnapshotError};
use super::HeapSnapshot;

#[derive(Debug, Default, Clone)]
pub struct SnapshotIndex {
    id_to_index: HashMap<u64, usize>,
    /// `edge_offsets[i]` = first edge id of node i; last entry = total edge count
    edge_offsets: Vec<usize>,
}

impl SnapshotIndex {
    pub(crate) fn build(snapshot: &HeapSnapshot) -> Result<Self> {
        let node_count = snapshot.node_count();
        let mut id_to_index = HashMap::with_capacity(node_count);
        let mut edge_offsets = Vec::with_capacity(node_count + 1);
        let mut total = 0usize;

        for index in 0..node_count {
            let node = snapshot.node_at_index(index)?;
            let id = snapshot.node_id(node)?;
            // Linear scan semantics: the first node with a given id wins
            id_to_index.entry(id).or_insert(index);

            edge_offsets.push(total);
            let count = snapshot.node_edge_count(node)?;
            total = total.checked_add(count).ok_or_else(|| {
                SnapshotError::Validation(format!(
                    "Edge count of node {} overflows the running total {}",
                    id, total
                ))
            })?;
        }
        edge_offsets.push(total);

        if total != snapshot.edge_count() {
            return Err(SnapshotError::Validation(format!(
                "Node edge counts sum to {} but snapshot declares {} edges",
                total,
                snapshot.edge_count()
            )));
        }

        Ok(Self {
            id_to_index,
            edge_offsets,
        })
    }

    pub fn index_of(&self, id: u64) -> Option<usize> {
        self.id_to_index.get(&id).copied()
    }

    /// Edge ids owned by the node at `index`
    pub fn edge_range(&self, index: usize) -> Option<Range<usize>> {
        let start = *self.edge_offsets.get(index)?;
        let end = *self.edge_offsets.get(index + 1)?;
        Some(start..end)
    }

    /// Index of the node whose edge range contains `edge_id`
    pub fn owner_of_edge(&self, edge_id: usize) -> Option<usize> {
        let total = *self.edge_offsets.last()?;
        if edge_id >= total {
            return None;
        }

        // First offset strictly past the edge, minus one, is the owner.
        // Nodes without edges share an offset and are skipped naturally.
        let next = self.edge_offsets.partition_point(|&offset| offset <= edge_id);
        Some(next - 1)
    }
}
