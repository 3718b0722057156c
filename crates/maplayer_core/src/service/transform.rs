//! Copy rules applied when a layer is inserted into another map.
//!
//! # Responsibility
//! - Build the draft of a copied layer from the source layer and the profile.
//! - Render derived fields, transliterating Cyrillic names where requested.
//!
//! # Invariants
//! - `name` is copied verbatim; transliteration only feeds derived fields.
//! - Source attributes keep their order; `on_insert` values replace copied
//!   values in place, new fields are appended.

use crate::config::profile::{DerivedField, SchemaProfile, NAME_PLACEHOLDER};
use crate::model::collection::CollectionId;
use crate::model::record::{Record, RecordDraft};
use log::debug;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

static CYRILLIC_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[\u{0400}-\u{04FF}]").expect("valid cyrillic regex"));

/// Builds the draft inserted into `target` when copying `source`.
pub fn derive_copy(profile: &SchemaProfile, source: &Record, target: CollectionId) -> RecordDraft {
    let mut draft = RecordDraft {
        collection_id: target,
        name: source.name.clone(),
        attributes: source.attributes.clone(),
    };

    for (field, value) in &profile.on_insert {
        draft.attributes.insert(field.clone(), value.clone());
    }

    for derived in &profile.derived {
        let value = render_derived(derived, &source.name);
        draft
            .attributes
            .insert(derived.field.clone(), Value::String(value));
    }

    draft
}

fn render_derived(derived: &DerivedField, name: &str) -> String {
    let label = if derived.transliterate && contains_cyrillic(name) {
        let latin = transliterate_ru(name);
        debug!(
            "event=name_transliterated module=transform field={} from={:?} to={:?}",
            derived.field, name, latin
        );
        latin
    } else {
        name.to_string()
    };
    derived.template.replace(NAME_PLACEHOLDER, &label)
}

/// Returns whether `text` contains any character in the Cyrillic block.
pub fn contains_cyrillic(text: &str) -> bool {
    CYRILLIC_RE.is_match(text)
}

/// Transliterates Russian Cyrillic into Latin script.
///
/// Characters without a mapping are kept as-is.
pub fn transliterate_ru(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        let lower = ch.to_lowercase().next().unwrap_or(ch);
        match latin_for(lower) {
            Some(latin) if lower != ch => {
                let mut letters = latin.chars();
                if let Some(first) = letters.next() {
                    out.extend(first.to_uppercase());
                    out.push_str(letters.as_str());
                }
            }
            Some(latin) => out.push_str(latin),
            None => out.push(ch),
        }
    }
    out
}

fn latin_for(ch: char) -> Option<&'static str> {
    let latin = match ch {
        'а' => "a",
        'б' => "b",
        'в' => "v",
        'г' => "g",
        'д' => "d",
        'е' | 'ё' | 'э' => "e",
        'ж' => "zh",
        'з' => "z",
        'и' => "i",
        'й' => "j",
        'к' => "k",
        'л' => "l",
        'м' => "m",
        'н' => "n",
        'о' => "o",
        'п' => "p",
        'р' => "r",
        'с' => "s",
        'т' => "t",
        'у' => "u",
        'ф' => "f",
        'х' => "h",
        'ц' => "ts",
        'ч' => "ch",
        'ш' => "sh",
        'щ' => "sch",
        'ъ' | 'ь' => "'",
        'ы' => "y",
        'ю' => "ju",
        'я' => "ja",
        _ => return None,
    };
    Some(latin)
}
