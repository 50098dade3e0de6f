use std::collections::BTreeMap;
use std::fmt::Write;

use serde::Serialize;

use crate::reconcile::SessionStats;
use crate::store::Store;
use crate::taxon::TaxonReport;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RecordCounts {
    pub read: usize,
    pub created: usize,
    pub merged: usize,
    pub extra_parents: usize,
    pub ignored: usize,
    /// Outside the facets configured for the pass.
    pub filtered: usize,
    /// Rejected records (missing or invalid FTC code).
    pub skipped: usize,
}

/// A locked attribute whose source value differed on this pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Conflict {
    pub database_id: String,
    pub attribute: String,
    pub locked_value: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ImportReport {
    pub ontology: String,
    pub source: String,
    pub database: String,
    pub output: String,
    pub store_version: u64,
    pub generated_at: String,
    pub records: RecordCounts,
    pub facet_counts: BTreeMap<char, usize>,
    pub deprecated: Vec<String>,
    pub suppressed_synonyms: usize,
    pub food_additives: usize,
    pub no_taxonomy: usize,
    pub overrides_applied: usize,
    /// Taxon mentions still waiting for a lookup after the pass.
    pub pending_taxa: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub taxon: Option<TaxonReport>,
    pub conflicts: Vec<Conflict>,
    pub owl_written: bool,
    pub ontofox_written: Vec<String>,
}

impl ImportReport {
    pub fn new(ontology: &str, source: &str, database: &str, output: &str) -> Self {
        Self {
            ontology: ontology.to_string(),
            source: source.to_string(),
            database: database.to_string(),
            output: output.to_string(),
            store_version: 0,
            generated_at: chrono::Utc::now().to_rfc3339(),
            records: RecordCounts::default(),
            facet_counts: BTreeMap::new(),
            deprecated: Vec::new(),
            suppressed_synonyms: 0,
            food_additives: 0,
            no_taxonomy: 0,
            overrides_applied: 0,
            pending_taxa: 0,
            taxon: None,
            conflicts: Vec::new(),
            owl_written: false,
            ontofox_written: Vec::new(),
        }
    }

    pub fn absorb_session(&mut self, stats: SessionStats) {
        self.records.created = stats.created;
        self.records.merged = stats.merged;
        self.records.extra_parents = stats.extra_parents;
        self.records.ignored = stats.ignored;
        self.facet_counts = stats.facet_counts;
        self.deprecated = stats.deprecated;
        self.suppressed_synonyms = stats.suppressed_synonyms;
        self.food_additives = stats.food_additives;
        self.no_taxonomy = stats.no_taxonomy;
    }

    /// Short human readable summary for non-JSON output.
    pub fn summary(&self) -> String {
        let mut text = String::new();
        let _ = writeln!(
            text,
            "{} <- {} (database version {})",
            self.ontology, self.source, self.store_version
        );
        let _ = writeln!(
            text,
            "  records: {} read, {} created, {} merged, {} extra parents, {} ignored, {} filtered, {} skipped",
            self.records.read,
            self.records.created,
            self.records.merged,
            self.records.extra_parents,
            self.records.ignored,
            self.records.filtered,
            self.records.skipped
        );
        if !self.facet_counts.is_empty() {
            let counts = self
                .facet_counts
                .iter()
                .map(|(facet, count)| format!("{facet}={count}"))
                .collect::<Vec<_>>()
                .join(" ");
            let _ = writeln!(text, "  facets: {counts}");
        }
        if !self.deprecated.is_empty() {
            let _ = writeln!(text, "  deprecated: {}", self.deprecated.len());
        }
        if let Some(taxon) = &self.taxon {
            let _ = writeln!(
                text,
                "  taxa: {} queued, {} resolved, {} rank mismatches, {} unresolved, {} failed batches",
                taxon.queued,
                taxon.resolved,
                taxon.rank_mismatch,
                taxon.unresolved,
                taxon.failed_batches
            );
        }
        if self.pending_taxa > 0 {
            let _ = writeln!(text, "  taxa pending: {}", self.pending_taxa);
        }
        for conflict in &self.conflicts {
            let _ = writeln!(
                text,
                "  locked {} {} differs from LanguaL",
                conflict.database_id, conflict.attribute
            );
        }
        let _ = writeln!(
            text,
            "  output: {}{}",
            self.output,
            if self.owl_written { "" } else { " (not written)" }
        );
        text
    }
}

/// Locked attributes the last pass disagreed with.
pub fn collect_conflicts(store: &Store) -> Vec<Conflict> {
    store
        .index
        .values()
        .flat_map(|entity| {
            entity
                .attributes()
                .into_iter()
                .filter(|(_, attribute)| attribute.is_conflict())
                .map(move |(path, attribute)| Conflict {
                    database_id: entity.database_id.clone(),
                    attribute: path,
                    locked_value: attribute.value.clone(),
                })
        })
        .collect()
}
