use std::collections::{BTreeMap, HashMap, HashSet};

use serde::Serialize;

use crate::annotation::{Annotation, Patterns, parse_annotation};
use crate::attribute::{Attribute, set_attribute_diff, set_entry_diff};
use crate::domain::{DatabaseId, Status, TaxonKey};
use crate::error::LangualError;
use crate::graph::TaxonomyGraph;
use crate::source::SourceRecord;
use crate::store::{Entity, Store};

pub const DO_NOT_USE_PHRASE: &str = "DO NOT USE for new indexing";
pub const NCBI_TAXON: &str = "NCBITaxon";
pub const LANGUAL_XREF: &str = "LANGUAL";

/// Caller-supplied rules applied while merging records.
#[derive(Debug, Clone)]
pub struct ReconcilePolicy {
    pub synonym_language: String,
    /// Label endings (e.g. " NOT KNOWN", " OTHER") that deprecate a term
    /// outside facet A. Empty by default.
    pub deprecate_label_suffixes: Vec<String>,
    /// Ancestors whose descendants, like facet B, drop synonyms that repeat a
    /// scientific name already held in the taxon map.
    pub food_source_ancestors: Vec<String>,
    /// Authorities whose codes are queued for NCBITaxon resolution.
    pub taxon_authorities: Vec<String>,
}

impl Default for ReconcilePolicy {
    fn default() -> Self {
        Self {
            synonym_language: "en".to_string(),
            deprecate_label_suffixes: Vec::new(),
            food_source_ancestors: vec!["C0228".to_string()],
            taxon_authorities: vec!["ITIS".to_string(), "INDEX FUNGORUM".to_string()],
        }
    }
}

/// A taxon authority code waiting for NCBITaxon resolution.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PendingTaxon {
    pub database_id: String,
    pub taxon_key: String,
    pub authority: String,
    pub code: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    Created,
    Merged,
    /// Repeat of an already merged descriptor that only added an is_a edge.
    ExtraParent,
    /// Entity is marked `ignore`.
    Ignored,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SessionStats {
    pub facet_counts: BTreeMap<char, usize>,
    pub created: usize,
    pub merged: usize,
    pub extra_parents: usize,
    pub ignored: usize,
    pub deprecated: Vec<String>,
    pub suppressed_synonyms: usize,
    pub food_additives: usize,
    pub no_taxonomy: usize,
}

/// State of one import pass. Built fresh for every pass.
pub struct ReconciliationSession {
    patterns: Patterns,
    policy: ReconcilePolicy,
    first_parent: HashMap<String, Option<String>>,
    pending: Vec<PendingTaxon>,
    queued: HashSet<PendingTaxon>,
    pub stats: SessionStats,
}

impl ReconciliationSession {
    pub fn new(policy: ReconcilePolicy) -> Result<Self, LangualError> {
        Ok(Self {
            patterns: Patterns::new()?,
            policy,
            first_parent: HashMap::new(),
            pending: Vec::new(),
            queued: HashSet::new(),
            stats: SessionStats::default(),
        })
    }

    pub fn policy(&self) -> &ReconcilePolicy {
        &self.policy
    }

    pub fn pending(&self) -> &[PendingTaxon] {
        &self.pending
    }

    pub fn take_pending(&mut self) -> Vec<PendingTaxon> {
        self.queued.clear();
        std::mem::take(&mut self.pending)
    }

    fn enqueue(&mut self, pending: PendingTaxon) {
        if self.queued.insert(pending.clone()) {
            self.pending.push(pending);
        }
    }

    /// Merges one descriptor into the store.
    pub fn reconcile(
        &mut self,
        store: &mut Store,
        record: &SourceRecord,
    ) -> Result<RecordOutcome, LangualError> {
        let ftc = record
            .ftc
            .as_deref()
            .ok_or(LangualError::MissingIdentity(record.position))?;
        let database_id: DatabaseId = ftc.parse()?;
        let id = database_id.as_str();

        if store.get(id).is_some_and(|entity| entity.status == Status::Ignore) {
            self.stats.ignored += 1;
            return Ok(RecordOutcome::Ignored);
        }

        let created = !store.index.contains_key(id);
        if created {
            let mut entity = Entity::new(id, database_id.ontology_id());
            let active = entity.active.insert(Attribute::new(record.active.as_deref(), None));
            active.import = false;
            store.index.insert(id.to_string(), entity);
        }

        if let Some(parent) = record.broader.as_deref() {
            let parent_ontology_id = parent_ontology_id(store, parent);
            if let Some(entity) = store.get_mut(id) {
                set_entry_diff(&mut entity.is_a, parent, Some(&parent_ontology_id), None);
            }
        }

        // LanguaL repeats a descriptor once per broader term. Only the
        // occurrence carrying the first parent seen this pass merges content.
        match self.first_parent.get(id) {
            None => {
                self.first_parent
                    .insert(id.to_string(), record.broader.clone());
            }
            Some(first) if *first != record.broader => {
                self.stats.extra_parents += 1;
                return Ok(RecordOutcome::ExtraParent);
            }
            Some(_) => {}
        }

        let facet = database_id.facet();
        let in_food_scope = facet == Some('B')
            || TaxonomyGraph::new(&store.index)
                .is_descendant_of_any(id, &self.policy.food_source_ancestors);

        let Some(entity) = store.index.get_mut(id) else {
            return Err(LangualError::InvalidDatabaseId(id.to_string()));
        };

        set_entry_diff(&mut entity.xrefs, LANGUAL_XREF, Some(id), None);
        let active = set_attribute_diff(&mut entity.active, record.active.as_deref(), None);
        active.import = false;

        if entity.ontology_id.is_empty() {
            entity.ontology_id = database_id.ontology_id();
        }

        if !entity.status.is_terminal() && self.should_deprecate(facet, record) {
            tracing::info!(id, "descriptor deprecated");
            entity.status = Status::Deprecated;
            self.stats.deprecated.push(id.to_string());
        }

        let synonym_language = self.policy.synonym_language.clone();
        let language = Some(synonym_language.as_str());
        // Label, like replaced_by below, is merged for deprecated entities too.
        set_attribute_diff(&mut entity.label, record.term.as_deref(), language);

        let annotation = record
            .annotation
            .as_deref()
            .map(|raw| parse_annotation(raw, &self.patterns))
            .unwrap_or_default();
        if annotation.replaced_by.is_some() {
            entity.replaced_by = annotation.replaced_by.clone();
        }

        if entity.status == Status::Deprecated {
            self.count(created);
            return Ok(if created {
                RecordOutcome::Created
            } else {
                RecordOutcome::Merged
            });
        }

        merge_optional(&mut entity.comment, record.scope_note.as_deref(), language);
        merge_annotation(entity, &annotation, language);

        if let Some(letter) = facet {
            *self.stats.facet_counts.entry(letter).or_default() += 1;
        }
        if facet == Some('B') {
            if record.annotation.is_none() {
                self.stats.no_taxonomy += 1;
            }
            if annotation.food_additive {
                self.stats.food_additives += 1;
            }
            let queued = merge_taxa(entity, &annotation, &self.policy.taxon_authorities);
            for pending in queued {
                self.enqueue(pending);
            }
        }

        // Taxa are merged first so scientific names can be recognised here.
        let suppressed = merge_synonyms(entity, record, in_food_scope, language);
        self.stats.suppressed_synonyms += suppressed;

        self.count(created);
        Ok(if created {
            RecordOutcome::Created
        } else {
            RecordOutcome::Merged
        })
    }

    fn count(&mut self, created: bool) {
        if created {
            self.stats.created += 1;
        } else {
            self.stats.merged += 1;
        }
    }

    fn should_deprecate(&self, facet: Option<char>, record: &SourceRecord) -> bool {
        if record.is_inactive() {
            return true;
        }
        if record
            .scope_note
            .as_deref()
            .is_some_and(|note| note.contains(DO_NOT_USE_PHRASE))
        {
            return true;
        }
        if facet == Some('A') {
            return false;
        }
        let Some(term) = record.term.as_deref() else {
            return false;
        };
        let term = term.to_uppercase();
        self.policy
            .deprecate_label_suffixes
            .iter()
            .any(|suffix| term.ends_with(&suffix.to_uppercase()))
    }
}

fn parent_ontology_id(store: &Store, parent: &str) -> String {
    if let Some(entity) = store.get(parent) {
        return entity.ontology_id.clone();
    }
    match parent.parse::<DatabaseId>() {
        Ok(parent_id) => parent_id.ontology_id(),
        Err(_) => {
            tracing::warn!(parent, "broader term is not a LanguaL code");
            parent.to_string()
        }
    }
}

/// Records a value, or the disappearance of a value that was seen before.
fn merge_optional(slot: &mut Option<Attribute>, candidate: Option<&str>, language: Option<&str>) {
    if candidate.is_some() || slot.is_some() {
        set_attribute_diff(slot, candidate, language);
    }
}

fn merge_annotation(entity: &mut Entity, annotation: &Annotation, language: Option<&str>) {
    merge_optional(
        &mut entity.definition,
        annotation.definition.as_deref(),
        language,
    );
    if let Some(source) = annotation.definition_source.as_deref() {
        set_attribute_diff(
            &mut entity.definition_source,
            Some(source),
            annotation.source_language,
        );
    }
    for (authority, code) in &annotation.xrefs {
        set_entry_diff(&mut entity.xrefs, authority, Some(code), None);
    }
}

fn merge_taxa(
    entity: &mut Entity,
    annotation: &Annotation,
    authorities: &[String],
) -> Vec<PendingTaxon> {
    let mut queued = Vec::new();
    for mention in &annotation.mentions {
        let taxon_key = mention.key.to_string();
        let entry = entity.taxon.entry(taxon_key.clone()).or_default();
        set_entry_diff(entry, &mention.authority, Some(&mention.code), None);
        if mention.code.is_empty()
            || entry.contains_key(NCBI_TAXON)
            || !authorities.iter().any(|name| *name == mention.authority)
        {
            continue;
        }
        queued.push(PendingTaxon {
            database_id: entity.database_id.clone(),
            taxon_key,
            authority: mention.authority.clone(),
            code: mention.code.clone(),
        });
    }
    queued
}

fn merge_synonyms(
    entity: &mut Entity,
    record: &SourceRecord,
    in_food_scope: bool,
    language: Option<&str>,
) -> usize {
    let scientific_names: HashSet<String> = entity
        .taxon
        .keys()
        .filter_map(|key| key.parse::<TaxonKey>().ok())
        .map(|key| key.name.to_lowercase())
        .collect();
    let mut suppressed = 0;
    for synonym in &record.synonyms {
        // Codex Alimentarius INS numbers and EU E numbers are identifiers.
        if let Some(code) = synonym.strip_prefix("INS ") {
            set_entry_diff(&mut entity.xrefs, "Codex", Some(code.trim()), None);
            continue;
        }
        if let Some(code) = synonym.strip_prefix("E ") {
            set_entry_diff(&mut entity.xrefs, "Europe", Some(code.trim()), None);
            continue;
        }
        if in_food_scope && scientific_names.contains(&synonym.to_lowercase()) {
            suppressed += 1;
            continue;
        }
        set_entry_diff(&mut entity.synonyms, synonym, Some(""), language);
    }
    suppressed
}
