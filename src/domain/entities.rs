//! Content nodes as delivered by the storage layer and held by the cache.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;

use crate::domain::{
    error::DomainError,
    types::{ContentKind, NodeId, NodeKey},
};

/// Raw node as enumerated by the storage layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeRecord {
    pub id: NodeId,
    pub key: NodeKey,
    #[serde(default)]
    pub parent: Option<NodeId>,
    #[serde(default)]
    pub sort_order: i32,
    pub content_type: String,
    #[serde(default)]
    pub data: ContentData,
}

impl NodeRecord {
    /// Checks the record-local invariants; tree-level checks live in the store.
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.key.is_nil() {
            return Err(DomainError::validation(format!(
                "node {} has a nil key",
                self.id
            )));
        }
        if self.parent == Some(self.id) {
            return Err(DomainError::validation(format!(
                "node {} lists itself as parent",
                self.id
            )));
        }
        if self.content_type.trim().is_empty() {
            return Err(DomainError::validation(format!(
                "node {} has an empty content type alias",
                self.id
            )));
        }
        Ok(())
    }
}

/// One tree node at one content kind.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContentNode {
    pub id: NodeId,
    pub key: NodeKey,
    pub parent: Option<NodeId>,
    pub sort_order: i32,
    pub kind: ContentKind,
    pub content_type: String,
    pub data: ContentData,
}

impl ContentNode {
    pub fn from_record(kind: ContentKind, record: NodeRecord) -> Self {
        let NodeRecord {
            id,
            key,
            parent,
            sort_order,
            content_type,
            data,
        } = record;
        Self {
            id,
            key,
            parent,
            sort_order,
            kind,
            content_type,
            data,
        }
    }
}

/// Per-culture/segment payload of a node.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContentData {
    #[serde(default)]
    pub name: String,
    /// Variant names keyed by culture code.
    #[serde(default)]
    pub culture_names: BTreeMap<String, String>,
    #[serde(default)]
    pub properties: BTreeMap<String, Vec<PropertyValue>>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub updated_at: Option<OffsetDateTime>,
}

/// A single property value for a culture/segment pair; `None` means invariant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyValue {
    #[serde(default)]
    pub culture: Option<String>,
    #[serde(default)]
    pub segment: Option<String>,
    pub value: Value,
}

impl ContentData {
    /// Resolves a property value, falling back from the exact variant to the
    /// culture's default segment and finally to the invariant value.
    pub fn value_for(
        &self,
        alias: &str,
        culture: Option<&str>,
        segment: Option<&str>,
    ) -> Option<&Value> {
        let values = self.properties.get(alias)?;
        let matches = |c: Option<&str>, s: Option<&str>| {
            values
                .iter()
                .find(|pv| pv.culture.as_deref() == c && pv.segment.as_deref() == s)
                .map(|pv| &pv.value)
        };

        matches(culture, segment)
            .or_else(|| segment.and_then(|_| matches(culture, None)))
            .or_else(|| culture.and_then(|_| matches(None, segment)))
            .or_else(|| matches(None, None))
    }

    /// Name for the given culture, or the invariant name.
    pub fn name_for(&self, culture: Option<&str>) -> &str {
        culture
            .and_then(|c| self.culture_names.get(c))
            .map(String::as_str)
            .unwrap_or(&self.name)
    }
}
