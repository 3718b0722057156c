//! Uniqueness key projection.
//!
//! # Responsibility
//! - Project a layer onto the fields that decide whether two layers in the
//!   same map are duplicates.
//! - Render the projected values for errors and logs.
//!
//! # Invariants
//! - The key is computable from a source layer before anything is persisted.
//! - Encoding is deterministic: same projected values, same text.
//! - Missing attributes project as JSON `null`.

use super::record::{Attributes, Record, RecordDraft};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt::{Display, Formatter};

/// Field name that refers to the typed layer name rather than an attribute.
pub const NAME_FIELD: &str = "name";

/// Ordered list of fields forming the uniqueness key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KeyProjection {
    fields: Vec<String>,
}

impl KeyProjection {
    pub fn new<I, F>(fields: I) -> Self
    where
        I: IntoIterator<Item = F>,
        F: Into<String>,
    {
        Self {
            fields: fields.into_iter().map(Into::into).collect(),
        }
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    pub fn contains(&self, field: &str) -> bool {
        self.fields.iter().any(|candidate| candidate == field)
    }

    /// Projects a persisted layer.
    pub fn key_of(&self, record: &Record) -> UniquenessKey {
        self.project(&record.name, &record.attributes)
    }

    /// Projects a layer that has not been persisted yet.
    pub fn key_of_draft(&self, draft: &RecordDraft) -> UniquenessKey {
        self.project(&draft.name, &draft.attributes)
    }

    fn project(&self, name: &str, attributes: &Attributes) -> UniquenessKey {
        let parts = self
            .fields
            .iter()
            .map(|field| {
                let value = if field == NAME_FIELD {
                    Value::String(name.to_string())
                } else {
                    attributes.get(field).cloned().unwrap_or(Value::Null)
                };
                (field.clone(), value)
            })
            .collect();
        UniquenessKey { parts }
    }
}

impl Default for KeyProjection {
    fn default() -> Self {
        Self::new([NAME_FIELD, "type"])
    }
}

/// Projected key values, paired with the field each came from.
#[derive(Debug, Clone, PartialEq)]
pub struct UniquenessKey {
    parts: Vec<(String, Value)>,
}

impl UniquenessKey {
    pub fn parts(&self) -> &[(String, Value)] {
        &self.parts
    }

    /// Compact JSON array of the projected values, used in errors and logs.
    pub fn encode(&self) -> String {
        Value::Array(self.parts.iter().map(|(_, value)| value.clone()).collect()).to_string()
    }
}

impl Display for UniquenessKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let mut first = true;
        for (field, value) in &self.parts {
            if !first {
                f.write_str(" ")?;
            }
            first = false;
            write!(f, "{field}={value}")?;
        }
        Ok(())
    }
}
