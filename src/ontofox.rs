//! OntoFox import specifications for the external terms the fragment uses.

use std::fmt::Write;
use std::fs;

use camino::{Utf8Path, Utf8PathBuf};

use crate::error::LangualError;
use crate::reconcile::NCBI_TAXON;
use crate::store::{Store, write_if_changed};

pub const OBO_PURL: &str = "http://purl.obolibrary.org/obo/";
const TOP_LEVEL_SECTION: &str = "[Top level source term URIs";
pub const NCBITAXON_PREFIX: &str = "ncbitaxon";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OntofoxTarget {
    /// Lower-case id prefix, e.g. `chebi`, or `ncbitaxon` for resolved taxa.
    pub prefix: String,
    pub template: Utf8PathBuf,
    pub output: Utf8PathBuf,
}

/// `IRI # label` lines for every term the target imports.
pub fn term_lines(store: &Store, prefix: &str) -> Result<String, LangualError> {
    let prefix = prefix.to_lowercase();
    let mut lines = String::new();
    for entity in store.index.values() {
        if prefix == NCBITAXON_PREFIX {
            for (key, authorities) in &entity.taxon {
                let taxon_id = authorities
                    .get(NCBI_TAXON)
                    .filter(|attribute| attribute.import)
                    .and_then(|attribute| attribute.value());
                if let Some(taxon_id) = taxon_id {
                    writeln!(lines, "{OBO_PURL}NCBITaxon_{taxon_id} # {key}")?;
                }
            }
            continue;
        }
        if entity.ontology_id.to_lowercase().starts_with(&prefix) {
            writeln!(
                lines,
                "{OBO_PURL}{} # {}",
                entity.ontology_id,
                entity.label_text().unwrap_or_default()
            )?;
        }
    }
    Ok(lines)
}

/// Inserts the term lines ahead of the top level section of the template.
pub fn render_spec(template: &str, lines: &str) -> String {
    match template.find(TOP_LEVEL_SECTION) {
        Some(index) => format!("{}{}\n\n{}", &template[..index], lines, &template[index..]),
        None => format!("{template}\n{lines}"),
    }
}

/// Regenerates one spec file. Returns whether the file was rewritten; nothing
/// is written when the store references no term of the prefix.
pub fn write_spec(store: &Store, target: &OntofoxTarget) -> Result<bool, LangualError> {
    let lines = term_lines(store, &target.prefix)?;
    if lines.is_empty() {
        return Ok(false);
    }
    let template = read_template(&target.template)?;
    let written = write_if_changed(&target.output, render_spec(&template, &lines).as_bytes())?;
    if written {
        tracing::info!(output = %target.output, "generated OntoFox specification");
    }
    Ok(written)
}

pub(crate) fn read_template(path: &Utf8Path) -> Result<String, LangualError> {
    fs::read_to_string(path.as_std_path())
        .map_err(|err| LangualError::Filesystem(format!("{path}: {err}")))
}
