//! heapsnap - V8 heap snapshot decoder and object query engine
//!
//! # Architecture
//!
//! - **Raw model**: flat `nodes`/`edges` integer arrays + string table + meta schema
//! - **Decoder**: schema-driven field decoding, id/edge lookups via load-time index
//! - **Structured graph**: per-root tree view with per-path cycle markers
//! - **Values**: graph shapes compiled back to objects, arrays and primitives
//! - **Queries**: objects owning a set of properties, rebuilt in parallel
//!
//! # Usage example
//!
//! ```no_run
//! use heapsnap::{HeapSnapshot, ObjectQuery};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let snapshot = HeapSnapshot::open("page.heapsnapshot")?;
//!
//! let matches = ObjectQuery::new(["userId", "email"])
//!     .ignore("session")
//!     .run(&snapshot)?;
//!
//! for m in &matches {
//!     match &m.value {
//!         Ok(value) => println!("{}: {}", m.node_id, serde_json::to_string(value)?),
//!         Err(e) => eprintln!("{}: {}", m.node_id, e),
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod graph;
pub mod query;
pub mod snapshot;
pub mod value;

#[cfg(test)]
pub(crate) mod testing;

pub use error::{ErrorKind, Result, SnapshotError};
pub use graph::{build_graph, EdgeLabel, GraphEdge, StructuredEdge, StructuredGraph, StructuredNode};
pub use query::{
    find_node_ids_with_properties, find_node_ids_with_property, find_objects_with_properties,
    ObjectMatch, ObjectQuery,
};
pub use snapshot::{FieldValue, HeapSnapshot, RecordKind};
pub use value::{build_object_from_node_id, compile, BuiltValue, ObjectMap};
