//! Resolution of LanguaL taxon authority codes (ITIS TSNs, Index Fungorum
//! numbers) to NCBITaxon ids.
//!
//! Resolution takes two batched hops through EOL: authority code to EOL page,
//! then EOL page to the taxon concepts recorded for it. The concept published
//! by "NCBI Taxonomy" supplies the id. Results are written back only after
//! every batch has returned, so rank validation sees the complete picture.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use crate::attribute::{Attribute, set_entry_diff};
use crate::domain::TaxonKey;
use crate::eol::{NCBI_TAXONOMY_SOURCE, TaxonLookupClient};
use crate::reconcile::{NCBI_TAXON, PendingTaxon};
use crate::store::Store;

pub const DEFAULT_BATCH_SIZE: usize = 100;
pub const EOL_XREF: &str = "EOL";

/// EOL hierarchy ids of the providers LanguaL cites.
pub fn default_providers() -> BTreeMap<String, u32> {
    BTreeMap::from([
        ("ITIS".to_string(), 903),
        ("INDEX FUNGORUM".to_string(), 596),
    ])
}

#[derive(Debug, Clone)]
pub struct ResolverSettings {
    /// Ids per request; EOL answers 413 above 100.
    pub batch_size: usize,
    pub providers: BTreeMap<String, u32>,
}

impl Default for ResolverSettings {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            providers: default_providers(),
        }
    }
}

/// Counts are per taxon mention, except `queued` which counts distinct
/// (authority, code) pairs sent to EOL.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TaxonReport {
    pub queued: usize,
    pub resolved: usize,
    pub rank_mismatch: usize,
    pub unresolved: usize,
    pub failed_batches: usize,
}

type CodeKey = (String, String);

struct Target {
    database_id: String,
    taxon_key: String,
}

struct Hit {
    page_id: String,
    taxon_id: String,
    rank: Option<String>,
}

#[derive(Default)]
struct Lookup {
    hits: BTreeMap<CodeKey, Hit>,
    missing: BTreeSet<CodeKey>,
}

pub struct ExternalTaxonResolver<'c, C: TaxonLookupClient + ?Sized> {
    client: &'c C,
    settings: ResolverSettings,
}

impl<'c, C: TaxonLookupClient + ?Sized> ExternalTaxonResolver<'c, C> {
    pub fn new(client: &'c C, settings: ResolverSettings) -> Self {
        Self { client, settings }
    }

    pub fn resolve(&self, store: &mut Store, pending: &[PendingTaxon]) -> TaxonReport {
        let mut report = TaxonReport::default();
        let mut queue: BTreeMap<CodeKey, Vec<Target>> = BTreeMap::new();
        for item in pending {
            if !needs_lookup(store, item) {
                continue;
            }
            queue
                .entry((item.authority.clone(), item.code.clone()))
                .or_default()
                .push(Target {
                    database_id: item.database_id.clone(),
                    taxon_key: item.taxon_key.clone(),
                });
        }
        report.queued = queue.len();
        if queue.is_empty() {
            return report;
        }

        let mut lookup = Lookup::default();
        let authorities: BTreeSet<&str> = queue.keys().map(|(authority, _)| authority.as_str()).collect();
        for authority in authorities {
            let Some(&hierarchy_id) = self.settings.providers.get(authority) else {
                tracing::warn!(authority, "no EOL hierarchy configured for taxon authority");
                continue;
            };
            let codes: Vec<String> = queue
                .keys()
                .filter(|(name, _)| name == authority)
                .map(|(_, code)| code.clone())
                .collect();
            self.lookup_authority(authority, hierarchy_id, &codes, &mut lookup, &mut report);
        }

        for (key, targets) in &queue {
            let (authority, _) = key;
            if let Some(hit) = lookup.hits.get(key) {
                for target in targets {
                    apply_hit(store, target, authority, hit, &mut report);
                }
            } else if lookup.missing.contains(key) {
                for target in targets {
                    mark_unresolved(store, target, &mut report);
                }
            }
        }
        tracing::info!(
            queued = report.queued,
            resolved = report.resolved,
            rank_mismatch = report.rank_mismatch,
            unresolved = report.unresolved,
            failed_batches = report.failed_batches,
            "taxon resolution finished"
        );
        report
    }

    fn lookup_authority(
        &self,
        authority: &str,
        hierarchy_id: u32,
        codes: &[String],
        lookup: &mut Lookup,
        report: &mut TaxonReport,
    ) {
        let batch_size = self.settings.batch_size.max(1);
        let mut page_codes: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for batch in codes.chunks(batch_size) {
            match self.client.search_by_provider(hierarchy_id, batch) {
                Ok(pages) => {
                    for code in batch {
                        match pages.get(code) {
                            Some(page_id) => page_codes
                                .entry(page_id.clone())
                                .or_default()
                                .push(code.clone()),
                            None => {
                                lookup.missing.insert((authority.to_string(), code.clone()));
                            }
                        }
                    }
                }
                Err(err) => {
                    tracing::warn!(%err, authority, codes = batch.len(), "EOL provider search failed");
                    report.failed_batches += 1;
                }
            }
        }

        let page_ids: Vec<String> = page_codes.keys().cloned().collect();
        for batch in page_ids.chunks(batch_size) {
            let pages = match self.client.pages(batch) {
                Ok(pages) => pages,
                Err(err) => {
                    tracing::warn!(%err, authority, pages = batch.len(), "EOL page lookup failed");
                    report.failed_batches += 1;
                    continue;
                }
            };
            for page_id in batch {
                let concept = pages.get(page_id).and_then(|concepts| {
                    concepts
                        .iter()
                        .find(|concept| concept.name_according_to == NCBI_TAXONOMY_SOURCE)
                });
                for code in page_codes.get(page_id).into_iter().flatten() {
                    let key = (authority.to_string(), code.clone());
                    match concept {
                        Some(concept) => {
                            lookup.hits.insert(
                                key,
                                Hit {
                                    page_id: page_id.clone(),
                                    taxon_id: concept.source_identifier.clone(),
                                    rank: concept.rank.clone(),
                                },
                            );
                        }
                        None => {
                            lookup.missing.insert(key);
                        }
                    }
                }
            }
        }
    }
}

/// A mention is looked up while its taxon entry has no NCBITaxon attribute,
/// resolved or marked.
fn needs_lookup(store: &Store, item: &PendingTaxon) -> bool {
    store
        .get(&item.database_id)
        .and_then(|entity| entity.taxon.get(&item.taxon_key))
        .is_some_and(|authorities| !authorities.contains_key(NCBI_TAXON))
}

fn apply_hit(store: &mut Store, target: &Target, authority: &str, hit: &Hit, report: &mut TaxonReport) {
    let Some(entity) = store.get_mut(&target.database_id) else {
        return;
    };
    let Some(authorities) = entity.taxon.get_mut(&target.taxon_key) else {
        return;
    };
    let mention_rank = target
        .taxon_key
        .parse::<TaxonKey>()
        .map(|key| key.rank)
        .unwrap_or_default();
    let accepted = hit.rank.as_deref().is_none_or(|rank| rank == mention_rank);

    let ncbi = set_entry_diff(authorities, NCBI_TAXON, Some(&hit.taxon_id), None);
    if accepted {
        set_entry_diff(&mut entity.xrefs, EOL_XREF, Some(&hit.page_id), None);
        report.resolved += 1;
        return;
    }
    ncbi.import = false;
    if let Some(source) = authorities.get_mut(authority) {
        source.import = false;
    }
    tracing::info!(
        database_id = %target.database_id,
        taxon = %target.taxon_key,
        eol_rank = hit.rank.as_deref().unwrap_or_default(),
        "NCBITaxon rank does not match LanguaL rank"
    );
    report.rank_mismatch += 1;
}

fn mark_unresolved(store: &mut Store, target: &Target, report: &mut TaxonReport) {
    let Some(authorities) = store
        .get_mut(&target.database_id)
        .and_then(|entity| entity.taxon.get_mut(&target.taxon_key))
    else {
        return;
    };
    authorities
        .entry(NCBI_TAXON.to_string())
        .or_insert_with(Attribute::unresolved);
    report.unresolved += 1;
}

/// Mentions of `pending` that still have no NCBITaxon attribute.
pub fn count_unsettled(store: &Store, pending: &[PendingTaxon]) -> usize {
    pending.iter().filter(|item| needs_lookup(store, item)).count()
}
