//! Layer (record) model.
//!
//! # Invariants
//! - `id` is assigned by the store on insert and never changes.
//! - `attributes` keeps insertion order so column order survives round-trips.
//! - `name` is typed and never duplicated inside `attributes`.

use super::collection::CollectionId;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt::{Display, Formatter};

/// Open, insertion-ordered attribute payload of a layer.
pub type Attributes = serde_json::Map<String, Value>;

/// Store-assigned identifier of a layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(pub i64);

impl Display for RecordId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A persisted layer as mirrored by the catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: RecordId,
    pub collection_id: CollectionId,
    pub name: String,
    pub attributes: Attributes,
}

impl Record {
    /// Returns the attribute value rendered as text, if present and scalar.
    pub fn attribute_text(&self, field: &str) -> Option<String> {
        scalar_text(self.attributes.get(field)?)
    }

    /// Rebuilds the mirrored record from a draft once the store assigned an id.
    pub fn from_draft(id: RecordId, draft: RecordDraft) -> Self {
        Self {
            id,
            collection_id: draft.collection_id,
            name: draft.name,
            attributes: draft.attributes,
        }
    }
}

/// A layer that has not been persisted yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordDraft {
    pub collection_id: CollectionId,
    pub name: String,
    pub attributes: Attributes,
}

impl RecordDraft {
    pub fn new(collection_id: CollectionId, name: impl Into<String>) -> Self {
        Self {
            collection_id,
            name: name.into(),
            attributes: Attributes::new(),
        }
    }

    /// Builder-style attribute setter used by seeding code and tests.
    pub fn with_attribute(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(field.into(), value.into());
        self
    }
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        Value::Bool(flag) => Some(flag.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::{CollectionId, Record, RecordDraft, RecordId};
    use serde_json::json;

    #[test]
    fn draft_keeps_attribute_insertion_order() {
        let draft = RecordDraft::new(CollectionId(1), "Roads")
            .with_attribute("url", "https://tiles/{z}/{x}/{y}")
            .with_attribute("type", "xyz")
            .with_attribute("is_active", json!(null));

        let keys: Vec<&str> = draft.attributes.keys().map(String::as_str).collect();
        assert_eq!(keys, ["url", "type", "is_active"]);
    }

    #[test]
    fn attribute_text_ignores_null_and_structured_values() {
        let record = Record::from_draft(
            RecordId(7),
            RecordDraft::new(CollectionId(1), "Roads")
                .with_attribute("type", "xyz")
                .with_attribute("layer_order", 2)
                .with_attribute("is_active", json!(null))
                .with_attribute("bbox", json!([1, 2, 3, 4])),
        );

        assert_eq!(record.attribute_text("type").as_deref(), Some("xyz"));
        assert_eq!(record.attribute_text("layer_order").as_deref(), Some("2"));
        assert_eq!(record.attribute_text("is_active"), None);
        assert_eq!(record.attribute_text("bbox"), None);
        assert_eq!(record.attribute_text("missing"), None);
    }
}
