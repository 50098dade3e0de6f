use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;

use camino::Utf8Path;
use serde::{Deserialize, Serialize};
use tempfile::Builder;

use crate::attribute::{Attribute, AttributeMap};
use crate::domain::{DatabaseId, Status};
use crate::error::LangualError;

/// One LanguaL descriptor as kept in the database file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    pub database_id: String,
    pub ontology_id: String,
    #[serde(default)]
    pub status: Status,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active: Option<Attribute>,
    /// Parent LanguaL code -> parent ontology id.
    #[serde(default)]
    pub is_a: AttributeMap,
    #[serde(default)]
    pub xrefs: AttributeMap,
    #[serde(default)]
    pub synonyms: AttributeMap,
    /// `rank:name` -> authority -> code.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub taxon: BTreeMap<String, AttributeMap>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<Attribute>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<Attribute>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub definition: Option<Attribute>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub definition_source: Option<Attribute>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replaced_by: Option<String>,
}

impl Entity {
    pub fn new(database_id: &str, ontology_id: String) -> Self {
        Self {
            database_id: database_id.to_string(),
            ontology_id,
            ..Self::default()
        }
    }

    pub fn label_text(&self) -> Option<&str> {
        self.label.as_ref().and_then(Attribute::value)
    }

    /// Every attribute on the entity with a dotted path naming it, e.g.
    /// `label`, `xrefs.ITIS` or `taxon.species:Sus scrofa.NCBITaxon`.
    pub fn attributes(&self) -> Vec<(String, &Attribute)> {
        let scalars = [
            ("active", &self.active),
            ("label", &self.label),
            ("comment", &self.comment),
            ("definition", &self.definition),
            ("definition_source", &self.definition_source),
        ];
        let mut named: Vec<(String, &Attribute)> = scalars
            .into_iter()
            .filter_map(|(name, slot)| slot.as_ref().map(|attribute| (name.to_string(), attribute)))
            .collect();
        for (field, map) in [("is_a", &self.is_a), ("xrefs", &self.xrefs), ("synonyms", &self.synonyms)] {
            named.extend(
                map.iter()
                    .map(|(key, attribute)| (format!("{field}.{key}"), attribute)),
            );
        }
        for (taxon, authorities) in &self.taxon {
            named.extend(
                authorities
                    .iter()
                    .map(|(authority, attribute)| (format!("taxon.{taxon}.{authority}"), attribute)),
            );
        }
        named
    }

    pub fn attributes_mut(&mut self) -> impl Iterator<Item = &mut Attribute> {
        [
            &mut self.active,
            &mut self.label,
            &mut self.comment,
            &mut self.definition,
            &mut self.definition_source,
        ]
        .into_iter()
        .flatten()
        .chain(self.is_a.values_mut())
        .chain(self.xrefs.values_mut())
        .chain(self.synonyms.values_mut())
        .chain(self.taxon.values_mut().flat_map(|authorities| authorities.values_mut()))
    }
}

/// The differential database: every LanguaL descriptor ever imported.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Store {
    #[serde(default)]
    pub index: BTreeMap<String, Entity>,
    #[serde(default)]
    pub version: u64,
}

impl Store {
    /// Loads the snapshot for a new pass. A missing file starts an empty
    /// store at version 0; an existing one has its version bumped and its
    /// `changed` flags cleared, so after the pass they describe that pass only.
    pub fn begin_pass(path: &Utf8Path) -> Result<Self, LangualError> {
        if !path.as_std_path().exists() {
            return Ok(Self::default());
        }
        let mut store = Self::load(path)?;
        store.version += 1;
        for entity in store.index.values_mut() {
            for attribute in entity.attributes_mut() {
                attribute.changed = false;
            }
        }
        Ok(store)
    }

    pub fn load(path: &Utf8Path) -> Result<Self, LangualError> {
        let content = fs::read_to_string(path.as_std_path()).map_err(|err| {
            LangualError::StoreRead {
                path: path.to_string(),
                message: err.to_string(),
            }
        })?;
        serde_json::from_str(&content).map_err(|err| LangualError::StoreRead {
            path: path.to_string(),
            message: err.to_string(),
        })
    }

    pub fn to_json(&self) -> Result<Vec<u8>, LangualError> {
        let mut content = serde_json::to_vec_pretty(self)
            .map_err(|err| LangualError::Filesystem(err.to_string()))?;
        content.push(b'\n');
        Ok(content)
    }

    pub fn save(&self, path: &Utf8Path) -> Result<(), LangualError> {
        write_atomic(path, &self.to_json()?)
    }

    pub fn get(&self, database_id: &str) -> Option<&Entity> {
        self.index.get(database_id)
    }

    pub fn get_mut(&mut self, database_id: &str) -> Option<&mut Entity> {
        self.index.get_mut(database_id)
    }

    /// Ontology id -> LanguaL code for every entity currently in the store.
    /// Ids replaced by an override are no longer present.
    pub fn ontology_index(&self) -> BTreeMap<&str, &str> {
        self.index
            .values()
            .map(|entity| (entity.ontology_id.as_str(), entity.database_id.as_str()))
            .collect()
    }

    /// Resolves a successor reference that may be a LanguaL code or an
    /// ontology id. Codes missing from this store (e.g. imported by a pass
    /// with another facet filter) fall back to their derived ontology id.
    pub fn resolve_reference<'a>(&'a self, reference: &'a str) -> Cow<'a, str> {
        if let Some(entity) = self.index.get(reference) {
            return Cow::Borrowed(entity.ontology_id.as_str());
        }
        match reference.parse::<DatabaseId>() {
            Ok(database_id) => Cow::Owned(database_id.ontology_id()),
            Err(_) => Cow::Borrowed(reference),
        }
    }
}

/// Writes through a temporary file in the target directory and renames it
/// over `path`, so a crash never leaves a truncated file behind.
pub fn write_atomic(path: &Utf8Path, content: &[u8]) -> Result<(), LangualError> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_str().is_empty() => parent,
        _ => Utf8Path::new("."),
    };
    fs::create_dir_all(parent.as_std_path())
        .map_err(|err| LangualError::Filesystem(err.to_string()))?;
    let mut temp = Builder::new()
        .prefix(".langual-import")
        .tempfile_in(parent.as_std_path())
        .map_err(|err| LangualError::Filesystem(err.to_string()))?;
    temp.write_all(content)
        .map_err(|err| LangualError::Filesystem(err.to_string()))?;
    temp.persist(path.as_std_path())
        .map_err(|err| LangualError::Filesystem(err.to_string()))?;
    Ok(())
}

/// Like [`write_atomic`] but leaves the file untouched when the content is
/// already identical. Returns whether the file was written.
pub fn write_if_changed(path: &Utf8Path, content: &[u8]) -> Result<bool, LangualError> {
    if let Ok(existing) = fs::read(path.as_std_path()) {
        if existing == content {
            return Ok(false);
        }
    }
    write_atomic(path, content)?;
    Ok(true)
}
