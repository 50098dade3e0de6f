//! Differential attributes.
//!
//! Every value the importer takes from LanguaL is stored with curation flags
//! so that a curator can lock a value or exclude it from the OWL output, and
//! later imports only report (never apply) disagreements with locked values.

use std::collections::BTreeMap;
use std::collections::btree_map::Entry;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attribute {
    pub value: Option<String>,
    /// `false` keeps the attribute in the database but out of the ontology.
    pub import: bool,
    /// Curator lock: imports never overwrite `value`.
    pub locked: bool,
    /// Whether the last import offered a value different from the stored one.
    pub changed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

pub type AttributeMap = BTreeMap<String, Attribute>;

impl Attribute {
    pub fn new(value: Option<&str>, language: Option<&str>) -> Self {
        Self {
            value: value.map(str::to_string),
            import: true,
            locked: false,
            changed: true,
            language: language.map(str::to_string),
        }
    }

    /// Marker recorded when a lookup should not be retried on later passes.
    pub fn unresolved() -> Self {
        Self {
            value: None,
            import: false,
            locked: false,
            changed: false,
            language: None,
        }
    }

    pub fn value(&self) -> Option<&str> {
        self.value.as_deref()
    }

    /// Present, non-null and not excluded from the ontology.
    pub fn is_importable(&self) -> bool {
        self.import && self.value.is_some()
    }

    /// A locked value that the source disagreed with on the last import.
    pub fn is_conflict(&self) -> bool {
        self.locked && self.changed
    }

    pub fn merge(&mut self, candidate: Option<&str>, language: Option<&str>) {
        if self.value.as_deref() == candidate {
            self.changed = false;
            return;
        }
        self.changed = true;
        if !self.locked {
            self.value = candidate.map(str::to_string);
            if let Some(language) = language {
                self.language = Some(language.to_string());
            }
        }
    }
}

/// Creates or differentially updates a single-valued attribute slot.
pub fn set_attribute_diff<'a>(
    slot: &'a mut Option<Attribute>,
    candidate: Option<&str>,
    language: Option<&str>,
) -> &'a mut Attribute {
    match slot {
        Some(attribute) => {
            attribute.merge(candidate, language);
            attribute
        }
        None => slot.insert(Attribute::new(candidate, language)),
    }
}

/// Keyed form of [`set_attribute_diff`] used for is_a, xrefs, synonyms and taxa.
pub fn set_entry_diff<'a>(
    map: &'a mut AttributeMap,
    key: &str,
    candidate: Option<&str>,
    language: Option<&str>,
) -> &'a mut Attribute {
    match map.entry(key.to_string()) {
        Entry::Occupied(entry) => {
            let attribute = entry.into_mut();
            attribute.merge(candidate, language);
            attribute
        }
        Entry::Vacant(entry) => entry.insert(Attribute::new(candidate, language)),
    }
}
