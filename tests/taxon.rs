use std::collections::BTreeMap;
use std::sync::Mutex;

use langual_import::attribute::Attribute;
use langual_import::eol::{NCBI_TAXONOMY_SOURCE, TaxonConcept, TaxonLookupClient};
use langual_import::error::LangualError;
use langual_import::owl::{OwlOptions, render_ontology};
use langual_import::reconcile::{NCBI_TAXON, PendingTaxon};
use langual_import::store::{Entity, Store};
use langual_import::taxon::{
    EOL_XREF, ExternalTaxonResolver, ResolverSettings, TaxonReport, count_unsettled,
};

#[derive(Default)]
struct MockEol {
    /// code -> page id
    pages: BTreeMap<String, String>,
    /// page id -> (NCBITaxon id, rank)
    concepts: BTreeMap<String, (String, Option<String>)>,
    fail_search: bool,
    calls: Mutex<Vec<String>>,
}

impl MockEol {
    fn with_page(mut self, code: &str, page: &str, taxon: &str, rank: Option<&str>) -> Self {
        self.pages.insert(code.to_string(), page.to_string());
        self.concepts.insert(
            page.to_string(),
            (taxon.to_string(), rank.map(str::to_string)),
        );
        self
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

impl TaxonLookupClient for MockEol {
    fn search_by_provider(
        &self,
        hierarchy_id: u32,
        codes: &[String],
    ) -> Result<BTreeMap<String, String>, LangualError> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("search {hierarchy_id} {}", codes.join(",")));
        if self.fail_search {
            return Err(LangualError::EolStatus {
                status: 503,
                message: "unavailable".to_string(),
            });
        }
        Ok(codes
            .iter()
            .filter_map(|code| self.pages.get(code).map(|page| (code.clone(), page.clone())))
            .collect())
    }

    fn pages(
        &self,
        page_ids: &[String],
    ) -> Result<BTreeMap<String, Vec<TaxonConcept>>, LangualError> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("pages {}", page_ids.join(",")));
        Ok(page_ids
            .iter()
            .map(|page| {
                let concepts: Vec<TaxonConcept> = self
                    .concepts
                    .get(page)
                    .filter(|(taxon, _)| !taxon.is_empty())
                    .map(|(taxon, rank)| TaxonConcept {
                        scientific_name: None,
                        canonical_form: None,
                        name_according_to: NCBI_TAXONOMY_SOURCE.to_string(),
                        source_identifier: taxon.clone(),
                        rank: rank.clone(),
                    })
                    .into_iter()
                    .collect();
                (page.clone(), concepts)
            })
            .collect())
    }
}

fn store_with(mentions: &[(&str, &str, &str, &str)]) -> (Store, Vec<PendingTaxon>) {
    let mut store = Store::default();
    let mut pending = Vec::new();
    for &(database_id, taxon_key, authority, code) in mentions {
        let entity = store
            .index
            .entry(database_id.to_string())
            .or_insert_with(|| Entity::new(database_id, format!("FOODON_{database_id}")));
        entity
            .taxon
            .entry(taxon_key.to_string())
            .or_default()
            .insert(authority.to_string(), Attribute::new(Some(code), None));
        pending.push(PendingTaxon {
            database_id: database_id.to_string(),
            taxon_key: taxon_key.to_string(),
            authority: authority.to_string(),
            code: code.to_string(),
        });
    }
    (store, pending)
}

#[test]
fn resolves_species_and_records_eol_page() {
    let client = MockEol::default().with_page("180722", "328663", "9823", Some("species"));
    let (mut store, pending) = store_with(&[("B1245", "species:Sus scrofa", "ITIS", "180722")]);

    let report = ExternalTaxonResolver::new(&client, ResolverSettings::default())
        .resolve(&mut store, &pending);

    assert_eq!(
        report,
        TaxonReport {
            queued: 1,
            resolved: 1,
            ..TaxonReport::default()
        }
    );
    let pig = store.get("B1245").unwrap();
    let ncbi = &pig.taxon["species:Sus scrofa"][NCBI_TAXON];
    assert_eq!(ncbi.value(), Some("9823"));
    assert!(ncbi.import);
    assert_eq!(pig.xrefs[EOL_XREF].value(), Some("328663"));
    assert_eq!(client.calls(), vec!["search 903 180722", "pages 328663"]);
    assert_eq!(count_unsettled(&store, &pending), 0);
}

#[test]
fn rank_mismatch_is_kept_out_of_the_ontology() {
    let client = MockEol::default().with_page("17175", "1027", "5340", Some("species"));
    let (mut store, pending) = store_with(&[("B1400", "genus:Agaricus", "INDEX FUNGORUM", "17175")]);

    let report = ExternalTaxonResolver::new(&client, ResolverSettings::default())
        .resolve(&mut store, &pending);

    assert_eq!(report.rank_mismatch, 1);
    assert_eq!(report.resolved, 0);
    let authorities = &store.get("B1400").unwrap().taxon["genus:Agaricus"];
    assert_eq!(authorities[NCBI_TAXON].value(), Some("5340"));
    assert!(!authorities[NCBI_TAXON].import);
    assert!(!authorities["INDEX FUNGORUM"].import);
    assert!(!store.get("B1400").unwrap().xrefs.contains_key(EOL_XREF));
    assert_eq!(client.calls()[0], "search 596 17175");

    let owl = render_ontology(&store, &OwlOptions::new("langual_import")).unwrap();
    assert!(owl.contains("<owl:Class rdf:about=\"&obo;FOODON_B1400\">"));
    assert!(!owl.contains("Agaricus"));
    assert!(!owl.contains("NCBITaxon_5340"));
    assert!(!owl.contains("INDEX FUNGORUM:17175"));
}

#[test]
fn rank_mismatched_species_is_not_rendered() {
    let client = MockEol::default().with_page("17175", "2001", "41234", Some("genus"));
    let (mut store, pending) = store_with(&[
        ("B1700", "species:Foo bar", "ITIS", "17175"),
        ("B1700", "genus:Foo", "ITIS", "17176"),
    ]);

    let report = ExternalTaxonResolver::new(&client, ResolverSettings::default())
        .resolve(&mut store, &pending);
    assert_eq!(report.rank_mismatch, 1);
    assert_eq!(report.unresolved, 1);

    let owl = render_ontology(&store, &OwlOptions::new("langual_import")).unwrap();
    assert!(!owl.contains("Foo bar"));
    assert!(!owl.contains("ITIS:17175"));
    assert!(!owl.contains("hasNarrowSynonym"));
    // The unresolved genus mention is still annotated.
    assert!(owl.contains("<oboInOwl:hasBroadSynonym>Foo</oboInOwl:hasBroadSynonym>"));
    assert!(owl.contains("<oboInOwl:hasDbXref>ITIS:17176</oboInOwl:hasDbXref>"));
}

#[test]
fn missing_page_leaves_an_unresolved_marker() {
    let client = MockEol::default()
        .with_page("180722", "328663", "9823", Some("species"))
        .with_page("555", "1001", "", None);
    let (mut store, pending) = store_with(&[
        ("B1245", "species:Sus scrofa", "ITIS", "180722"),
        ("B1600", "species:Unknown fish", "ITIS", "999999"),
        ("B1601", "species:Odd fish", "ITIS", "555"),
    ]);

    let report = ExternalTaxonResolver::new(&client, ResolverSettings::default())
        .resolve(&mut store, &pending);

    assert_eq!(report.unresolved, 2);
    assert_eq!(report.resolved, 1);
    for (id, key) in [("B1600", "species:Unknown fish"), ("B1601", "species:Odd fish")] {
        let marker = &store.get(id).unwrap().taxon[key][NCBI_TAXON];
        assert_eq!(marker.value(), None);
        assert!(!marker.import);
    }

    // Settled mentions are not looked up again.
    let report = ExternalTaxonResolver::new(&client, ResolverSettings::default())
        .resolve(&mut store, &pending);
    assert_eq!(report.queued, 0);
    assert_eq!(client.calls().len(), 2);
}

#[test]
fn failed_batch_leaves_mentions_pending() {
    let client = MockEol {
        fail_search: true,
        ..MockEol::default()
    };
    let (mut store, pending) = store_with(&[("B1245", "species:Sus scrofa", "ITIS", "180722")]);

    let report = ExternalTaxonResolver::new(&client, ResolverSettings::default())
        .resolve(&mut store, &pending);

    assert_eq!(report.failed_batches, 1);
    assert_eq!(report.unresolved, 0);
    assert!(!store.get("B1245").unwrap().taxon["species:Sus scrofa"].contains_key(NCBI_TAXON));
    assert_eq!(count_unsettled(&store, &pending), 1);
}

#[test]
fn requests_are_split_into_batches() {
    let mut client = MockEol::default();
    let mut mentions = Vec::new();
    let ids: Vec<String> = (0..5).map(|n| format!("B10{n:02}")).collect();
    for (n, id) in ids.iter().enumerate() {
        let code = format!("{}", 100 + n);
        client = client.with_page(&code, &format!("{}", 900 + n), &format!("{}", 7000 + n), None);
        mentions.push((id.clone(), code));
    }
    let borrowed: Vec<(&str, &str, &str, &str)> = mentions
        .iter()
        .map(|(id, code)| (id.as_str(), "species:Fish", "ITIS", code.as_str()))
        .collect();
    let (mut store, pending) = store_with(&borrowed);

    let settings = ResolverSettings {
        batch_size: 2,
        ..ResolverSettings::default()
    };
    let report = ExternalTaxonResolver::new(&client, settings).resolve(&mut store, &pending);

    assert_eq!(report.resolved, 5);
    assert_eq!(
        client.calls(),
        vec![
            "search 903 100,101",
            "search 903 102,103",
            "search 903 104",
            "pages 900,901",
            "pages 902,903",
            "pages 904",
        ]
    );
}

#[test]
fn shared_code_is_requested_once() {
    let client = MockEol::default().with_page("180722", "328663", "9823", Some("species"));
    let (mut store, pending) = store_with(&[
        ("B1245", "species:Sus scrofa", "ITIS", "180722"),
        ("B1246", "species:Sus scrofa", "ITIS", "180722"),
    ]);

    let report = ExternalTaxonResolver::new(&client, ResolverSettings::default())
        .resolve(&mut store, &pending);

    assert_eq!(report.queued, 1);
    assert_eq!(report.resolved, 2);
    assert_eq!(client.calls().len(), 2);
}
