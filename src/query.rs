//! Property queries: which objects carry a given set of properties

use std::collections::HashSet;

use rayon::prelude::*;

use crate::error::{Result, SnapshotError};
use crate::snapshot::{HeapSnapshot, RecordKind};
use crate::value::{build_object_from_node_id, BuiltValue};

/// Properties present on a large share of all objects
pub const COMMON_PROPERTIES: &[&str] = &["name"];

/// Above this many roots a query is likely to be slow
pub const SLOW_QUERY_ROOTS: usize = 5;

/// Ids of edges of type `property` named `name`
pub fn find_property_edge_ids(snapshot: &HeapSnapshot, name: &str) -> Result<Vec<usize>> {
    tracing::debug!("finding property edges for string {}", name);

    let mut edge_ids = Vec::new();
    for (edge, edge_id) in snapshot.iter_edges() {
        if snapshot.decode_str(RecordKind::Edge, "type", edge)? != "property" {
            continue;
        }
        if snapshot.decode_str(RecordKind::Edge, "name_or_index", edge)? == name {
            edge_ids.push(edge_id);
        }
    }
    Ok(edge_ids)
}

/// Ids of nodes owning a property named `name`, first occurrence order
pub fn find_node_ids_with_property(snapshot: &HeapSnapshot, name: &str) -> Result<Vec<u64>> {
    if COMMON_PROPERTIES.contains(&name) {
        tracing::debug!("property '{}' is part of many objects and may be slow", name);
    }

    let edge_ids = find_property_edge_ids(snapshot, name)?;
    tracing::debug!("{} edges found with property {}", edge_ids.len(), name);

    let mut seen = HashSet::with_capacity(edge_ids.len());
    let mut node_ids = Vec::new();
    for edge_id in edge_ids {
        let node_id = snapshot.find_edge_parent_node_id(edge_id)?;
        if seen.insert(node_id) {
            node_ids.push(node_id);
        }
    }
    Ok(node_ids)
}

/// Ids of nodes owning every property in `names`
pub fn find_node_ids_with_properties<S: AsRef<str>>(
    snapshot: &HeapSnapshot,
    names: &[S],
) -> Result<Vec<u64>> {
    let (first, rest) = names.split_first().ok_or_else(|| {
        SnapshotError::Validation("at least one property is required".into())
    })?;

    let mut common = find_node_ids_with_property(snapshot, first.as_ref())?;

    for name in rest {
        if common.is_empty() {
            return Ok(common);
        }
        tracing::debug!("{} common nodes", common.len());

        let other: HashSet<u64> = find_node_ids_with_property(snapshot, name.as_ref())?
            .into_iter()
            .collect();
        common.retain(|id| other.contains(id));
    }

    Ok(common)
}

/// Object search: required properties, properties to leave out of the
/// rebuilt values, and an optional traversal depth bound
#[derive(Debug, Clone, Default)]
pub struct ObjectQuery {
    pub required: Vec<String>,
    pub ignored: Vec<String>,
    pub max_depth: Option<usize>,
}

impl ObjectQuery {
    pub fn new<I, S>(required: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            required: required.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    pub fn ignore(mut self, property: impl Into<String>) -> Self {
        self.ignored.push(property.into());
        self
    }

    pub fn ignore_all<I, S>(mut self, properties: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ignored.extend(properties.into_iter().map(Into::into));
        self
    }

    pub fn max_depth(mut self, depth: usize) -> Self {
        self.max_depth = Some(depth);
        self
    }

    /// Find matching roots and rebuild each one.
    ///
    /// Roots are rebuilt in parallel; results keep the order of the ids.
    /// A root that cannot be rebuilt carries its own error, unless the
    /// error means the snapshot itself is corrupt, which fails the query.
    pub fn run(&self, snapshot: &HeapSnapshot) -> Result<Vec<ObjectMatch>> {
        tracing::debug!(
            "finding objects properties={:?} ignore_properties={:?}",
            self.required,
            self.ignored
        );

        let node_ids = find_node_ids_with_properties(snapshot, &self.required)?;
        tracing::debug!("{} node(s) found, compiling object(s) {:?}", node_ids.len(), node_ids);

        if node_ids.len() > SLOW_QUERY_ROOTS {
            tracing::warn!(
                "more than {} nodes found, this may be slow - to improve performance, \
                 increase the specificity of your query or ignore unwanted properties on the target object",
                SLOW_QUERY_ROOTS
            );
        }

        let ignored: HashSet<&str> = self.ignored.iter().map(String::as_str).collect();
        let mut matches: Vec<ObjectMatch> = node_ids
            .par_iter()
            .map(|&node_id| ObjectMatch {
                node_id,
                value: build_object_from_node_id(
                    snapshot,
                    node_id,
                    |property: &str| !ignored.contains(property),
                    self.max_depth,
                ),
            })
            .collect();

        let malformed = matches.iter().position(|m| {
            m.value.as_ref().err().map_or(false, SnapshotError::is_malformed_snapshot)
        });
        if let Some(position) = malformed {
            let fatal = matches.swap_remove(position);
            tracing::error!("snapshot is malformed (while building node {})", fatal.node_id);
            fatal.value?;
        }

        for failed in matches.iter().filter(|m| m.value.is_err()) {
            if let Err(err) = &failed.value {
                tracing::warn!("could not build object for node {}: {}", failed.node_id, err);
            }
        }

        Ok(matches)
    }
}

/// One matching root and its rebuilt value (or why it could not be rebuilt)
#[derive(Debug)]
pub struct ObjectMatch {
    pub node_id: u64,
    pub value: Result<BuiltValue>,
}

impl ObjectMatch {
    pub fn ok(&self) -> Option<&BuiltValue> {
        self.value.as_ref().ok()
    }
}

/// Find every object carrying all of `required` and rebuild it, leaving
/// `ignored` properties (and whatever hangs off them) out of the values
pub fn find_objects_with_properties<S: AsRef<str>>(
    snapshot: &HeapSnapshot,
    required: &[S],
    ignored: &[S],
) -> Result<Vec<ObjectMatch>> {
    ObjectQuery::new(required.iter().map(|s| s.as_ref().to_string()))
        .ignore_all(ignored.iter().map(|s| s.as_ref().to_string()))
        .run(snapshot)
}
