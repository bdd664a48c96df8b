//! Snapshot metadata: field layout and typing for each record kind

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SnapshotError};

/// Record kinds described by the snapshot meta block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordKind {
    Node,
    Edge,
}

impl RecordKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordKind::Node => "node",
            RecordKind::Edge => "edge",
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Meta entry as it appears in JSON: either a name or a list of names
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetaValue {
    Name(String),
    List(Vec<String>),
}

/// Raw `snapshot.meta` block
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotMeta {
    pub node_fields: Vec<String>,
    pub node_types: Vec<MetaValue>,
    pub edge_fields: Vec<String>,
    pub edge_types: Vec<MetaValue>,
    #[serde(default)]
    pub trace_function_info_fields: Vec<String>,
    #[serde(default)]
    pub trace_node_fields: Vec<String>,
    #[serde(default)]
    pub sample_fields: Vec<String>,
    #[serde(default)]
    pub location_fields: Vec<String>,
}

/// How a raw integer of a field is turned into a value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldType {
    /// Raw value indexes this list of literals
    Enum(Vec<String>),
    /// Raw value indexes the string table
    String,
    /// Raw value is the value
    Number,
    /// Raw value is an absolute offset into the nodes array
    Node,
    /// Name or index, decided by the caller
    StringOrNumber,
}

impl FieldType {
    fn parse(value: &MetaValue) -> Result<Self> {
        match value {
            MetaValue::List(values) => Ok(FieldType::Enum(values.clone())),
            MetaValue::Name(name) => match name.as_str() {
                "string" => Ok(FieldType::String),
                "number" => Ok(FieldType::Number),
                "node" => Ok(FieldType::Node),
                "string_or_number" => Ok(FieldType::StringOrNumber),
                other => Err(SnapshotError::Schema(format!(
                    "Unknown field type '{}'",
                    other
                ))),
            },
        }
    }
}

/// Validated layout of one record kind
#[derive(Debug, Clone)]
pub struct RecordSchema {
    kind: RecordKind,
    fields: Vec<String>,
    types: Vec<FieldType>,
    positions: HashMap<String, usize>,
}

impl RecordSchema {
    pub fn new(kind: RecordKind, fields: &[String], types: &[MetaValue]) -> Result<Self> {
        if fields.is_empty() {
            return Err(SnapshotError::Schema(format!("{} field list is empty", kind)));
        }

        if fields.len() != types.len() {
            return Err(SnapshotError::Schema(format!(
                "{} schema has {} fields but {} types",
                kind,
                fields.len(),
                types.len()
            )));
        }

        let mut positions = HashMap::with_capacity(fields.len());
        for (i, field) in fields.iter().enumerate() {
            if positions.insert(field.clone(), i).is_some() {
                return Err(SnapshotError::Schema(format!(
                    "Duplicate {} field '{}'",
                    kind, field
                )));
            }
        }

        let types = types.iter().map(FieldType::parse).collect::<Result<Vec<_>>>()?;

        Ok(Self {
            kind,
            fields: fields.to_vec(),
            types,
            positions,
        })
    }

    pub fn kind(&self) -> RecordKind {
        self.kind
    }

    /// Number of raw integers per record
    pub fn width(&self) -> usize {
        self.fields.len()
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.positions.contains_key(name)
    }

    /// Position and type of a field
    pub fn field(&self, name: &str) -> Result<(usize, &FieldType)> {
        let position = *self
            .positions
            .get(name)
            .ok_or_else(|| SnapshotError::UnknownField {
                kind: self.kind,
                field: name.to_string(),
            })?;
        Ok((position, &self.types[position]))
    }

    pub(crate) fn require(&self, names: &[&str]) -> Result<()> {
        for name in names {
            if !self.has_field(name) {
                return Err(SnapshotError::Schema(format!(
                    "{} schema lacks required field '{}'",
                    self.kind, name
                )));
            }
        }
        Ok(())
    }
}
