//! Reconstructed JavaScript values

pub mod compile;

use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};

pub use compile::{
    build_object_from_node_id, classify, compile, default_edge_filter, filter_edge, Shape,
};

/// A value rebuilt from the heap graph
#[derive(Debug, Clone, PartialEq)]
pub enum BuiltValue {
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    /// Pattern source; never evaluated
    RegExp(String),
    Array(Vec<BuiltValue>),
    Object(ObjectMap),
}

impl BuiltValue {
    pub fn is_null(&self) -> bool {
        matches!(self, BuiltValue::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            BuiltValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            BuiltValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            BuiltValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[BuiltValue]> {
        match self {
            BuiltValue::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&ObjectMap> {
        match self {
            BuiltValue::Object(map) => Some(map),
            _ => None,
        }
    }

    /// Object member lookup; `None` for non-objects
    pub fn get(&self, key: &str) -> Option<&BuiltValue> {
        self.as_object().and_then(|map| map.get(key))
    }

    /// Compile a regexp value's pattern. Engine-specific syntax the
    /// `regex-lite` dialect does not accept yields an error.
    pub fn as_regex(&self) -> Option<Result<regex_lite::Regex, regex_lite::Error>> {
        match self {
            BuiltValue::RegExp(pattern) => Some(regex_lite::Regex::new(pattern)),
            _ => None,
        }
    }
}

// Values rebuilt from long reference chains nest as deep as the heap does
impl Drop for BuiltValue {
    fn drop(&mut self) {
        let mut pending = Vec::new();
        take_members(self, &mut pending);
        while let Some(mut value) = pending.pop() {
            take_members(&mut value, &mut pending);
        }
    }
}

fn take_members(value: &mut BuiltValue, pending: &mut Vec<BuiltValue>) {
    match value {
        BuiltValue::Array(items) => pending.append(items),
        BuiltValue::Object(map) => pending.extend(map.entries.drain(..).map(|(_, v)| v)),
        _ => {}
    }
}

impl From<&str> for BuiltValue {
    fn from(s: &str) -> Self {
        BuiltValue::String(s.to_string())
    }
}

impl From<f64> for BuiltValue {
    fn from(n: f64) -> Self {
        BuiltValue::Number(n)
    }
}

impl From<bool> for BuiltValue {
    fn from(b: bool) -> Self {
        BuiltValue::Bool(b)
    }
}

/// String-keyed map that keeps insertion order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ObjectMap {
    entries: Vec<(String, BuiltValue)>,
}

impl ObjectMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert, replacing an existing key in place. Returns the old value.
    pub fn insert(&mut self, key: impl Into<String>, value: BuiltValue) -> Option<BuiltValue> {
        let key = key.into();
        if let Some(slot) = self.entries.iter_mut().find(|(k, _)| *k == key) {
            return Some(std::mem::replace(&mut slot.1, value));
        }
        self.entries.push((key, value));
        None
    }

    pub fn get(&self, key: &str) -> Option<&BuiltValue> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &BuiltValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl<K: Into<String>> FromIterator<(K, BuiltValue)> for ObjectMap {
    fn from_iter<I: IntoIterator<Item = (K, BuiltValue)>>(iter: I) -> Self {
        let mut map = ObjectMap::new();
        for (k, v) in iter {
            map.insert(k, v);
        }
        map
    }
}

impl Serialize for ObjectMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (k, v) in &self.entries {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

impl Serialize for BuiltValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            BuiltValue::Null => serializer.serialize_unit(),
            BuiltValue::Bool(b) => serializer.serialize_bool(*b),
            BuiltValue::Number(n) => serializer.serialize_f64(*n),
            BuiltValue::String(s) => serializer.serialize_str(s),
            BuiltValue::RegExp(pattern) => serializer.serialize_str(&format!("/{}/", pattern)),
            BuiltValue::Array(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            BuiltValue::Object(map) => map.serialize(serializer),
        }
    }
}
