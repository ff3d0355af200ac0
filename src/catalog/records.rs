use serde::{Deserialize, Serialize};

use super::types::ValueType;

/// Declarative metadata as supplied by the metadata source.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetadataDocument {
    #[serde(default)]
    pub tables: Vec<TableRecord>
}

/// One table declaration. Repeated declarations of the same table merge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableRecord {
    pub name:    String,
    #[serde(default)]
    pub columns: Vec<ColumnRecord>,
    #[serde(default)]
    pub indexes: Vec<IndexRecord>
}

impl TableRecord {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name:    name.into(),
            columns: Vec::new(),
            indexes: Vec::new()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnRecord {
    pub name:       String,
    #[serde(rename = "type")]
    pub value_type: ValueType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enum_repr:  Option<ValueType>
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name:    Option<String>,
    pub columns: Vec<String>,
    #[serde(default)]
    pub unique:  bool
}
