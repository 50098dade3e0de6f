use std::collections::BTreeMap;
use std::fs;

use camino::Utf8Path;

use crate::error::LangualError;
use crate::store::Store;

/// LanguaL code -> ontology id taken from a curated lookup file, for
/// descriptors that are better represented by a CHEBI, UBERON or other
/// existing term than by a minted FOODON id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OntologyOverrides {
    entries: BTreeMap<String, String>,
}

impl OntologyOverrides {
    pub fn load(path: &Utf8Path) -> Result<Self, LangualError> {
        let content = fs::read_to_string(path.as_std_path()).map_err(|err| {
            LangualError::SourceRead {
                path: path.to_string(),
                message: err.to_string(),
            }
        })?;
        Ok(Self::parse(&content))
    }

    /// Lines are `code<TAB>ontology id<TAB>label`; `#` starts a comment line.
    pub fn parse(content: &str) -> Self {
        let mut entries = BTreeMap::new();
        for (number, line) in content.lines().enumerate() {
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            let mut columns = line.splitn(3, '\t');
            let database_id = columns.next().unwrap_or_default().trim();
            let ontology_id = columns.next().unwrap_or_default().trim();
            if database_id.is_empty() || ontology_id.is_empty() {
                tracing::warn!(line = number + 1, "skipping malformed ontology id override");
                continue;
            }
            entries.insert(database_id.to_uppercase(), ontology_id.to_string());
        }
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, database_id: &str) -> Option<&str> {
        self.entries.get(database_id).map(String::as_str)
    }

    /// Replaces the ontology id of every stored entity listed in the file.
    /// Returns how many entities changed.
    pub fn apply(&self, store: &mut Store) -> usize {
        let mut replaced = 0;
        for (database_id, ontology_id) in &self.entries {
            let Some(entity) = store.get_mut(database_id) else {
                continue;
            };
            if entity.ontology_id != *ontology_id {
                tracing::debug!(
                    database_id,
                    from = %entity.ontology_id,
                    to = %ontology_id,
                    "replacing ontology id"
                );
                entity.ontology_id = ontology_id.clone();
                replaced += 1;
            }
        }
        replaced
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_skips_comments_and_short_lines() {
        let overrides = OntologyOverrides::parse(
            "# code\turi\tlabel\nC0123\tCHEBI_17234\tglucose\nB1234\n\nc0200\tUBERON_0001913\tmilk\n",
        );
        assert_eq!(overrides.len(), 2);
        assert_eq!(overrides.get("C0123"), Some("CHEBI_17234"));
        assert_eq!(overrides.get("C0200"), Some("UBERON_0001913"));
        assert_eq!(overrides.get("B1234"), None);
    }
}
