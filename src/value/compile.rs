//! Graph -> value compilation
//!
//! The heap does not tag primitive types. Plain objects, arrays, strings,
//! numbers and regexps have their own node types, but booleans and null are
//! oddball objects recognized only by the names of their children. All of
//! that recognition lives in [`classify`].

use crate::error::{Result, SnapshotError};
use crate::graph::{build_graph, structured_node, GraphEdge, StructuredEdge, StructuredGraph};
use crate::snapshot::{HeapSnapshot, RecordKind};
use super::{BuiltValue, ObjectMap};

/// Value shapes that can be rebuilt from a graph node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    Array,
    Object,
    String,
    RegExp,
    Number,
    Boolean,
    Null,
}

/// Recognize the value shape of a graph's root node
pub fn classify(graph: &StructuredGraph) -> Option<Shape> {
    let node = &graph.node;
    match node.node_type.as_str() {
        "array" => Some(Shape::Array),
        // JS arrays show up as objects named "Array"
        "object" => match node.name.as_str() {
            "Object" => Some(Shape::Object),
            "Array" => Some(Shape::Array),
            _ => None,
        },
        "string" => Some(Shape::String),
        "regexp" => Some(Shape::RegExp),
        "number" => Some(Shape::Number),
        _ if is_boolean(graph) => Some(Shape::Boolean),
        _ if is_null(graph) => Some(Shape::Null),
        _ => None,
    }
}

fn child_named(graph: &StructuredGraph, name: &str) -> bool {
    graph
        .edges
        .iter()
        .filter_map(GraphEdge::target)
        .any(|target| target.name == name)
}

fn is_boolean(graph: &StructuredGraph) -> bool {
    graph.node.node_type == "hidden" && child_named(graph, "boolean")
}

fn is_null(graph: &StructuredGraph) -> bool {
    graph.node.node_type == "hidden" && child_named(graph, "object") && child_named(graph, "null")
}

/// Keep an edge only if its (expanded) target is something `compile` understands
pub fn filter_edge(edge: &GraphEdge) -> bool {
    edge.graph.as_ref().map_or(false, |g| classify(g).is_some())
}

/// Edges worth compiling, paired with their expanded targets
fn children(graph: &StructuredGraph) -> impl Iterator<Item = (&StructuredEdge, &StructuredGraph)> {
    graph
        .edges
        .iter()
        .filter(|e| filter_edge(e))
        .filter_map(|e| e.graph.as_ref().map(|g| (&e.edge, g)))
}

fn unsupported(graph: &StructuredGraph) -> SnapshotError {
    SnapshotError::UnsupportedType {
        node_id: graph.node.id,
        node_type: graph.node.node_type.clone(),
        name: graph.node.name.clone(),
    }
}

/// Array or object whose members are still being compiled
enum Container {
    Array(Vec<BuiltValue>),
    Object(ObjectMap),
}

impl Container {
    fn add(&mut self, edge: &StructuredEdge, value: BuiltValue) {
        match self {
            Container::Array(items) => items.push(value),
            Container::Object(map) => {
                map.insert(edge.label.to_string(), value);
            }
        }
    }

    fn finish(self) -> BuiltValue {
        match self {
            Container::Array(items) => BuiltValue::Array(items),
            Container::Object(map) => BuiltValue::Object(map),
        }
    }
}

struct Frame<'g> {
    children: std::vec::IntoIter<(&'g StructuredEdge, &'g StructuredGraph)>,
    container: Container,
}

enum Step<'g> {
    Done(BuiltValue),
    Open(Frame<'g>),
}

/// Compile one node: scalars are finished here, containers become frames
fn step(graph: &StructuredGraph) -> Result<Step<'_>> {
    let node = &graph.node;
    let shape = classify(graph).ok_or_else(|| unsupported(graph))?;

    let container = match shape {
        Shape::Array => Container::Array(Vec::new()),
        Shape::Object => Container::Object(ObjectMap::new()),

        Shape::String => return Ok(Step::Done(BuiltValue::String(node.name.clone()))),

        Shape::RegExp => return Ok(Step::Done(BuiltValue::RegExp(node.name.clone()))),

        Shape::Number => {
            let (_, value) = children(graph)
                .find(|(edge, _)| edge.name() == Some("value"))
                .ok_or_else(|| SnapshotError::ChildNotFound {
                    node_id: node.id,
                    name: "value".into(),
                })?;

            let text = value.node.name.trim();
            let number = text.parse::<f64>().map_err(|e| SnapshotError::Decode {
                kind: RecordKind::Node,
                field: "name".into(),
                raw: value.node.id,
                reason: format!("'{}' is not a number: {}", text, e),
            })?;
            return Ok(Step::Done(BuiltValue::Number(number)));
        }

        Shape::Boolean => {
            let (_, string) = children(graph)
                .find(|(_, child)| child.node.node_type == "string")
                .ok_or_else(|| SnapshotError::ChildNotFound {
                    node_id: node.id,
                    name: "string".into(),
                })?;
            return Ok(Step::Done(BuiltValue::Bool(string.node.name == "true")));
        }

        Shape::Null => return Ok(Step::Done(BuiltValue::Null)),
    };

    Ok(Step::Open(Frame {
        children: children(graph).collect::<Vec<_>>().into_iter(),
        container,
    }))
}

/// Compile a structured graph into a value.
///
/// Members are compiled depth first in edge order with an explicit frame
/// stack; the first failing member fails the whole value.
pub fn compile(graph: &StructuredGraph) -> Result<BuiltValue> {
    let mut current = match step(graph)? {
        Step::Done(value) => return Ok(value),
        Step::Open(frame) => frame,
    };
    let mut parents: Vec<(Frame<'_>, &StructuredEdge)> = Vec::new();

    loop {
        if let Some((edge, child)) = current.children.next() {
            match step(child)? {
                Step::Done(value) => current.container.add(edge, value),
                Step::Open(frame) => parents.push((std::mem::replace(&mut current, frame), edge)),
            }
            continue;
        }

        let value = current.container.finish();
        match parents.pop() {
            Some((mut parent, edge)) => {
                parent.container.add(edge, value);
                current = parent;
            }
            None => return Ok(value),
        }
    }
}

/// Traversal-time filter used when building objects: data properties
/// (minus `__proto__` and anything `property_filter` rejects), indexed
/// edges, and boxed `value` slots.
pub fn default_edge_filter<P>(property_filter: P) -> impl Fn(&StructuredEdge) -> bool
where
    P: Fn(&str) -> bool,
{
    move |edge: &StructuredEdge| {
        let name = edge.name();
        let data_property = edge.edge_type == "property"
            && name.map_or(false, |n| n != "__proto__" && property_filter(n));

        data_property || StructuredEdge::is_indexed(&edge.edge_type) || name == Some("value")
    }
}

/// Rebuild the object rooted at `node_id`.
///
/// The root must be an `object` node; that is checked before any child is
/// traversed.
pub fn build_object_from_node_id<P>(
    snapshot: &HeapSnapshot,
    node_id: u64,
    property_filter: P,
    max_depth: Option<usize>,
) -> Result<BuiltValue>
where
    P: Fn(&str) -> bool,
{
    tracing::debug!("building object for node {}", node_id);

    let root = structured_node(snapshot, node_id)?;
    if root.node_type != "object" {
        return Err(SnapshotError::NotAnObject {
            node_id,
            node_type: root.node_type,
        });
    }

    let filter = default_edge_filter(property_filter);
    let graph = build_graph(snapshot, node_id, max_depth, &filter)?;

    tracing::debug!("compiling object for node {} (depth {})", node_id, graph.depth());
    compile(&graph)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::testing::SnapshotBuilder;

    fn keep_all(_: &str) -> bool {
        true
    }

    /// `{x: 1, y: "hi"}` plus the engine bookkeeping a real object carries
    fn plain_object() -> SnapshotBuilder {
        SnapshotBuilder::new()
            .node(1, "object", "Object")
            .property(1, "x", 2)
            .property(1, "y", 4)
            .property(1, "__proto__", 5)
            .internal(1, "map", 6)
            .node(2, "number", "heap number")
            .internal(2, "value", 3)
            .node(3, "string", "1")
            .node(4, "string", "hi")
            .node(5, "object", "Object")
            .property(5, "constructor", 7)
            .node(6, "object shape", "system / Map")
            .node(7, "closure", "Object")
    }

    #[test]
    fn test_plain_object() {
        let snapshot = plain_object().build();
        let value = build_object_from_node_id(&snapshot, 1, keep_all, None).unwrap();

        let map = value.as_object().unwrap();
        assert_eq!(map.keys().collect::<Vec<_>>(), vec!["x", "y"]);
        assert_eq!(value.get("x"), Some(&BuiltValue::Number(1.0)));
        assert_eq!(value.get("y"), Some(&BuiltValue::String("hi".into())));
    }

    #[test]
    fn test_ignored_property() {
        let snapshot = plain_object().build();
        let value = build_object_from_node_id(&snapshot, 1, |p: &str| p != "y", None).unwrap();

        let map = value.as_object().unwrap();
        assert_eq!(map.len(), 1);
        assert!(map.contains_key("x"));
    }

    fn oddball(text: &str) -> SnapshotBuilder {
        SnapshotBuilder::new()
            .node(1, "object", "Object")
            .property(1, "flag", 2)
            .node(2, "hidden", "system / Oddball")
            .hidden(2, 0, 3)
            .hidden(2, 1, 4)
            .node(3, "string", text)
            .node(4, "string", "boolean")
    }

    #[test]
    fn test_heap_booleans() {
        let snapshot = oddball("true").build();
        let value = build_object_from_node_id(&snapshot, 1, keep_all, None).unwrap();
        assert_eq!(value.get("flag"), Some(&BuiltValue::Bool(true)));

        let snapshot = oddball("false").build();
        let value = build_object_from_node_id(&snapshot, 1, keep_all, None).unwrap();
        assert_eq!(value.get("flag"), Some(&BuiltValue::Bool(false)));
    }

    #[test]
    fn test_heap_null() {
        let snapshot = SnapshotBuilder::new()
            .node(1, "object", "Object")
            .property(1, "nothing", 2)
            .node(2, "hidden", "system / Oddball")
            .hidden(2, 0, 3)
            .hidden(2, 1, 4)
            .node(3, "string", "null")
            .node(4, "string", "object")
            .build();

        let value = build_object_from_node_id(&snapshot, 1, keep_all, None).unwrap();
        assert_eq!(value.get("nothing"), Some(&BuiltValue::Null));
    }

    #[test]
    fn test_array_object() {
        let snapshot = SnapshotBuilder::new()
            .node(1, "object", "Array")
            .element(1, 0, 2)
            .element(1, 1, 3)
            .element(1, 2, 4)
            .node(2, "string", "a")
            .node(3, "string", "b")
            .node(4, "string", "c")
            .build();

        let value = build_object_from_node_id(&snapshot, 1, keep_all, None).unwrap();
        assert_eq!(
            value,
            BuiltValue::Array(vec!["a".into(), "b".into(), "c".into()])
        );
    }

    #[test]
    fn test_nested_values() {
        let snapshot = SnapshotBuilder::new()
            .node(1, "object", "Object")
            .property(1, "list", 2)
            .property(1, "pattern", 5)
            .property(1, "child", 6)
            .property(1, "fn", 7)
            .node(2, "array", "")
            .element(2, 0, 3)
            .element(2, 1, 4)
            .node(3, "string", "first")
            .node(4, "string", "second")
            .node(5, "regexp", "^id-[0-9]+$")
            .node(6, "object", "Object")
            .property(6, "parent", 1)
            .node(7, "closure", "handler")
            .build();

        let value = build_object_from_node_id(&snapshot, 1, keep_all, None).unwrap();
        let map = value.as_object().unwrap();

        // Closures are not data and are dropped
        assert_eq!(map.keys().collect::<Vec<_>>(), vec!["list", "pattern", "child"]);
        assert_eq!(
            value.get("list").and_then(BuiltValue::as_array).map(|a| a.len()),
            Some(2)
        );
        assert_eq!(value.get("pattern"), Some(&BuiltValue::RegExp("^id-[0-9]+$".into())));

        // The back reference is circular, so it never compiles
        let child = value.get("child").and_then(BuiltValue::as_object).unwrap();
        assert!(child.is_empty());
    }

    #[test]
    fn test_object_index_keys() {
        let snapshot = SnapshotBuilder::new()
            .node(1, "object", "Object")
            .element(1, 3, 2)
            .node(2, "string", "three")
            .build();

        let value = build_object_from_node_id(&snapshot, 1, keep_all, None).unwrap();
        assert_eq!(value.get("3"), Some(&BuiltValue::String("three".into())));
    }

    #[test]
    fn test_non_object_root_rejected() {
        // The root's only edge points past the end of the node array, so
        // any traversal of its children would fail with a bounds error
        let json = r#"{
            "snapshot": {
                "node_count": 1, "edge_count": 1,
                "meta": {
                    "node_fields": ["type", "name", "id", "edge_count"],
                    "node_types": [["hidden", "string", "object"], "string", "number", "number"],
                    "edge_fields": ["type", "name_or_index", "to_node"],
                    "edge_types": [["element", "property"], "string_or_number", "node"]
                }
            },
            "nodes": [1, 0, 1, 1],
            "edges": [1, 1, 999],
            "strings": ["text", "length"]
        }"#;
        let snapshot = HeapSnapshot::from_json_str(json).unwrap();

        let err = build_object_from_node_id(&snapshot, 1, keep_all, None).unwrap_err();
        assert!(matches!(err, SnapshotError::NotAnObject { node_id: 1, .. }));
        assert_eq!(err.kind(), ErrorKind::UnsupportedType);

        let traversal = build_graph(&snapshot, 1, None, &|_: &StructuredEdge| true).unwrap_err();
        assert_eq!(traversal.kind(), ErrorKind::Bounds);
    }

    #[test]
    fn test_unknown_object_class_rejected() {
        let snapshot = SnapshotBuilder::new().node(1, "object", "Map").build();
        let err = build_object_from_node_id(&snapshot, 1, keep_all, None).unwrap_err();
        assert!(matches!(err, SnapshotError::UnsupportedType { .. }));
    }

    #[test]
    fn test_number_without_value_child() {
        let snapshot = SnapshotBuilder::new()
            .node(1, "object", "Object")
            .property(1, "n", 2)
            .node(2, "number", "heap number")
            .build();

        let err = build_object_from_node_id(&snapshot, 1, keep_all, None).unwrap_err();
        assert!(matches!(err, SnapshotError::ChildNotFound { node_id: 2, .. }));
    }

    #[test]
    fn test_unparsable_number() {
        let snapshot = SnapshotBuilder::new()
            .node(1, "object", "Object")
            .property(1, "n", 2)
            .node(2, "number", "heap number")
            .internal(2, "value", 3)
            .node(3, "string", "one")
            .build();

        let err = build_object_from_node_id(&snapshot, 1, keep_all, None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Decode);
    }

    #[test]
    fn test_default_filter() {
        let filter = default_edge_filter(|p: &str| p != "secret");
        let edge = |edge_type: &str, label: crate::graph::EdgeLabel| StructuredEdge {
            id: 0,
            edge_type: edge_type.to_string(),
            node_id: 1,
            label,
        };
        use crate::graph::EdgeLabel::{Index, Name};

        assert!(filter(&edge("property", Name("a".into()))));
        assert!(!filter(&edge("property", Name("__proto__".into()))));
        assert!(!filter(&edge("property", Name("secret".into()))));
        assert!(filter(&edge("element", Index(0))));
        assert!(filter(&edge("hidden", Index(2))));
        assert!(filter(&edge("internal", Name("value".into()))));
        assert!(!filter(&edge("internal", Name("map".into()))));
        assert!(!filter(&edge("context", Name("x".into()))));
    }
}
