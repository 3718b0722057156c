//! Schema profiles: per-deployment description of the layer payload.
//!
//! # Responsibility
//! - Describe which attributes take part in the uniqueness key.
//! - Describe which layers are loaded and what a copied layer looks like.
//!
//! # Invariants
//! - The key always contains `name` and never contains a field that the copy
//!   rules overwrite, so a source layer and its copy share one key.

use crate::model::key::{KeyProjection, NAME_FIELD};
use crate::model::record::{Attributes, Record};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeSet;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Placeholder substituted with the layer name in derived-field templates.
pub const NAME_PLACEHOLDER: &str = "{name}";

pub const PRESET_BASIC: &str = "basic";
pub const PRESET_EXTENDED: &str = "extended";

/// Attribute equality filter applied when loading the catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadFilter {
    pub field: String,
    pub equals: Value,
}

/// Attribute computed from the layer name when a layer is copied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DerivedField {
    pub field: String,
    /// Text with `{name}` replaced by the (possibly transliterated) name.
    pub template: String,
    /// Substitute a Latin transliteration when the name contains Cyrillic.
    #[serde(default)]
    pub transliterate: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchemaProfile {
    pub key_fields: KeyProjection,
    /// Attribute rendered in parentheses in list labels.
    pub label_field: Option<String>,
    pub load_filter: Option<LoadFilter>,
    /// Values written onto every copy, replacing copied values.
    pub on_insert: Attributes,
    pub derived: Vec<DerivedField>,
}

impl Default for SchemaProfile {
    fn default() -> Self {
        Self::basic()
    }
}

impl SchemaProfile {
    /// `{name, type}` payload keyed by `name + type`.
    pub fn basic() -> Self {
        Self {
            key_fields: KeyProjection::default(),
            label_field: Some("type".to_string()),
            load_filter: None,
            on_insert: Attributes::new(),
            derived: Vec::new(),
        }
    }

    /// Wide layer payload: only `xyz` layers are loaded, copies get fixed
    /// display flags and a `BACKGROUND:` group label.
    pub fn extended() -> Self {
        let mut on_insert = Attributes::new();
        for (field, value) in [
            ("is_active", Value::Null),
            ("is_expanded", json!(false)),
            ("default_opacity", json!(1.0)),
            ("layer_order", json!(2)),
            ("is_base_map", json!(true)),
            ("is_deleted", json!(false)),
            ("is_snappable", json!(false)),
            ("is_unsearchable", json!(false)),
            ("is_reestr", json!(false)),
            ("is_service", json!(false)),
        ] {
            on_insert.insert(field.to_string(), value);
        }

        Self {
            key_fields: KeyProjection::default(),
            label_field: Some("type".to_string()),
            load_filter: Some(LoadFilter {
                field: "type".to_string(),
                equals: json!("xyz"),
            }),
            on_insert,
            derived: vec![DerivedField {
                field: "group_layer".to_string(),
                template: format!("BACKGROUND:{NAME_PLACEHOLDER}"),
                transliterate: true,
            }],
        }
    }

    /// Looks up a built-in preset by name.
    pub fn preset(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            PRESET_BASIC => Some(Self::basic()),
            PRESET_EXTENDED => Some(Self::extended()),
            _ => None,
        }
    }

    /// Returns whether `record` belongs in the catalog under the load filter.
    pub fn accepts(&self, record: &Record) -> bool {
        match &self.load_filter {
            Some(filter) => record.attributes.get(&filter.field) == Some(&filter.equals),
            None => true,
        }
    }

    /// List label in the `Name (type) [ID: 10]` form.
    pub fn label(&self, record: &Record) -> String {
        let detail = self
            .label_field
            .as_deref()
            .and_then(|field| record.attribute_text(field));
        match detail {
            Some(detail) => format!("{} ({detail}) [ID: {}]", record.name, record.id),
            None => format!("{} [ID: {}]", record.name, record.id),
        }
    }

    pub fn validate(&self) -> Result<(), ProfileError> {
        let fields = self.key_fields.fields();
        if fields.is_empty() {
            return Err(ProfileError::EmptyKey);
        }
        if !self.key_fields.contains(NAME_FIELD) {
            return Err(ProfileError::KeyWithoutName);
        }

        let mut seen = BTreeSet::new();
        for field in fields {
            if field.trim().is_empty() {
                return Err(ProfileError::EmptyField);
            }
            if !seen.insert(field.as_str()) {
                return Err(ProfileError::DuplicateKeyField(field.clone()));
            }
        }

        let written = self
            .on_insert
            .keys()
            .map(String::as_str)
            .chain(self.derived.iter().map(|derived| derived.field.as_str()));
        for field in written {
            if field.trim().is_empty() {
                return Err(ProfileError::EmptyField);
            }
            if field == NAME_FIELD {
                return Err(ProfileError::ReservedField(field.to_string()));
            }
            if self.key_fields.contains(field) {
                return Err(ProfileError::KeyFieldOverwritten(field.to_string()));
            }
            if self
                .load_filter
                .as_ref()
                .is_some_and(|filter| filter.field == field)
            {
                return Err(ProfileError::FilterFieldOverwritten(field.to_string()));
            }
        }

        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProfileError {
    EmptyKey,
    KeyWithoutName,
    EmptyField,
    DuplicateKeyField(String),
    /// `name` is typed and copied verbatim; it cannot be rewritten.
    ReservedField(String),
    /// A key field is rewritten on copy, so source and copy keys would differ.
    KeyFieldOverwritten(String),
    /// The load filter field is rewritten on copy, so a copy could be hidden
    /// from the catalog that shows its source.
    FilterFieldOverwritten(String),
}

impl Display for ProfileError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyKey => write!(f, "key_fields must not be empty"),
            Self::KeyWithoutName => write!(f, "key_fields must contain `{NAME_FIELD}`"),
            Self::EmptyField => write!(f, "field names must not be empty"),
            Self::DuplicateKeyField(field) => write!(f, "duplicate key field `{field}`"),
            Self::ReservedField(field) => write!(f, "field `{field}` cannot be rewritten on copy"),
            Self::KeyFieldOverwritten(field) => {
                write!(f, "key field `{field}` is rewritten on copy")
            }
            Self::FilterFieldOverwritten(field) => {
                write!(f, "load filter field `{field}` is rewritten on copy")
            }
        }
    }
}

impl Error for ProfileError {}

#[cfg(test)]
mod tests {
    use super::{DerivedField, LoadFilter, ProfileError, SchemaProfile};
    use crate::model::collection::CollectionId;
    use crate::model::key::KeyProjection;
    use crate::model::record::{Record, RecordDraft, RecordId};
    use serde_json::{json, Value};

    fn record(name: &str, kind: &str) -> Record {
        Record::from_draft(
            RecordId(10),
            RecordDraft::new(CollectionId(1), name).with_attribute("type", kind),
        )
    }

    #[test]
    fn presets_are_valid() {
        SchemaProfile::basic().validate().expect("basic preset");
        SchemaProfile::extended().validate().expect("extended preset");
        assert!(SchemaProfile::preset(" Extended ").is_some());
        assert!(SchemaProfile::preset("legacy").is_none());
    }

    #[test]
    fn extended_filter_accepts_only_xyz_layers() {
        let profile = SchemaProfile::extended();
        assert!(profile.accepts(&record("Roads", "xyz")));
        assert!(!profile.accepts(&record("Roads", "wms")));
        assert!(SchemaProfile::basic().accepts(&record("Roads", "wms")));
    }

    #[test]
    fn label_includes_detail_field_when_present() {
        let profile = SchemaProfile::basic();
        assert_eq!(profile.label(&record("Roads", "xyz")), "Roads (xyz) [ID: 10]");

        let bare = Record::from_draft(RecordId(3), RecordDraft::new(CollectionId(1), "Rivers"));
        assert_eq!(profile.label(&bare), "Rivers [ID: 3]");
    }

    #[test]
    fn validate_rejects_key_without_name() {
        let profile = SchemaProfile {
            key_fields: KeyProjection::new(["type"]),
            ..SchemaProfile::basic()
        };
        assert_eq!(profile.validate(), Err(ProfileError::KeyWithoutName));
    }

    #[test]
    fn validate_rejects_duplicate_key_fields() {
        let profile = SchemaProfile {
            key_fields: KeyProjection::new(["name", "type", "type"]),
            ..SchemaProfile::basic()
        };
        assert_eq!(
            profile.validate(),
            Err(ProfileError::DuplicateKeyField("type".to_string()))
        );
    }

    #[test]
    fn validate_rejects_rewritten_key_fields() {
        let mut profile = SchemaProfile::basic();
        profile.on_insert.insert("type".to_string(), json!("wms"));
        assert_eq!(
            profile.validate(),
            Err(ProfileError::KeyFieldOverwritten("type".to_string()))
        );

        let mut profile = SchemaProfile::basic();
        profile.derived.push(DerivedField {
            field: "name".to_string(),
            template: "{name}".to_string(),
            transliterate: false,
        });
        assert_eq!(
            profile.validate(),
            Err(ProfileError::ReservedField("name".to_string()))
        );
    }

    #[test]
    fn validate_rejects_rewritten_filter_field() {
        let mut profile = SchemaProfile {
            load_filter: Some(LoadFilter {
                field: "is_active".to_string(),
                equals: json!(true),
            }),
            ..SchemaProfile::basic()
        };
        profile.on_insert.insert("is_active".to_string(), Value::Null);
        assert_eq!(
            profile.validate(),
            Err(ProfileError::FilterFieldOverwritten("is_active".to_string()))
        );

        profile.on_insert.clear();
        profile.derived.push(DerivedField {
            field: "is_active".to_string(),
            template: "{name}".to_string(),
            transliterate: false,
        });
        assert_eq!(
            profile.validate(),
            Err(ProfileError::FilterFieldOverwritten("is_active".to_string()))
        );
    }
}
