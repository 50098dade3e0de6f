use std::collections::BTreeMap;
use std::fs;
use std::sync::{Arc, Mutex};

use camino::Utf8PathBuf;

use langual_import::app::{ProgressEvent, ProgressSink, ReconciliationDriver, RunOptions, emit};
use langual_import::config::{Config, ConfigLoader, ResolvedConfig};
use langual_import::eol::{NCBI_TAXONOMY_SOURCE, TaxonConcept, TaxonLookupClient};
use langual_import::error::LangualError;
use langual_import::reconcile::NCBI_TAXON;
use langual_import::store::Store;

const SAMPLE: &str = "tests/fixtures/langual_sample.xml";

#[derive(Clone, Default)]
struct MockEol {
    calls: Arc<Mutex<usize>>,
}

impl TaxonLookupClient for MockEol {
    fn search_by_provider(
        &self,
        _hierarchy_id: u32,
        codes: &[String],
    ) -> Result<BTreeMap<String, String>, LangualError> {
        *self.calls.lock().unwrap() += 1;
        Ok(codes
            .iter()
            .filter(|code| code.as_str() == "180722")
            .map(|code| (code.clone(), "328663".to_string()))
            .collect())
    }

    fn pages(
        &self,
        page_ids: &[String],
    ) -> Result<BTreeMap<String, Vec<TaxonConcept>>, LangualError> {
        *self.calls.lock().unwrap() += 1;
        Ok(page_ids
            .iter()
            .map(|page| {
                let concept = TaxonConcept {
                    scientific_name: Some("Sus scrofa".to_string()),
                    canonical_form: Some("Sus scrofa".to_string()),
                    name_according_to: NCBI_TAXONOMY_SOURCE.to_string(),
                    source_identifier: "9823".to_string(),
                    rank: Some("species".to_string()),
                };
                (page.clone(), vec![concept])
            })
            .collect())
    }
}

#[derive(Default)]
struct RecordingSink {
    messages: Mutex<Vec<String>>,
}

impl ProgressSink for RecordingSink {
    fn event(&self, event: ProgressEvent) {
        self.messages.lock().unwrap().push(event.message);
    }
}

struct Workspace {
    _temp: tempfile::TempDir,
    dir: Utf8PathBuf,
}

impl Workspace {
    fn new() -> Self {
        let temp = tempfile::tempdir().unwrap();
        let dir = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
        Self { _temp: temp, dir }
    }

    fn config(&self, extra: &str) -> ResolvedConfig {
        let json = format!(
            r#"{{"imports": [{{
                "source": "{SAMPLE}",
                "database": "{dir}/langual.json",
                "output": "{dir}/langual_import.owl"{extra}
            }}]}}"#,
            dir = self.dir
        );
        let config: Config = serde_json::from_str(&json).unwrap();
        ConfigLoader::resolve_config(config).unwrap()
    }

    fn database(&self) -> Utf8PathBuf {
        self.dir.join("langual.json")
    }

    fn owl(&self) -> Utf8PathBuf {
        self.dir.join("langual_import.owl")
    }
}

#[test]
fn first_pass_imports_and_resolves() {
    let workspace = Workspace::new();
    let config = workspace.config("");
    let client = MockEol::default();
    let driver = ReconciliationDriver::new(client.clone());

    let reports = driver
        .run(&config, RunOptions::default(), &RecordingSink::default())
        .unwrap();
    let report = &reports[0];

    assert_eq!(report.store_version, 0);
    assert_eq!(report.records.read, 16);
    assert_eq!(report.records.created, 13);
    assert_eq!(report.records.extra_parents, 1);
    assert_eq!(report.records.skipped, 2);
    assert_eq!(report.deprecated.len(), 3);
    assert_eq!(report.pending_taxa, 0);
    let taxon = report.taxon.as_ref().unwrap();
    assert_eq!(taxon.resolved, 1);
    assert_eq!(taxon.unresolved, 1);
    assert!(report.owl_written);
    assert_eq!(*client.calls.lock().unwrap(), 3);

    let store = Store::load(&workspace.database()).unwrap();
    assert_eq!(
        store.get("B1245").unwrap().taxon["species:Sus scrofa"][NCBI_TAXON].value(),
        Some("9823")
    );
    let owl = fs::read_to_string(workspace.owl().as_std_path()).unwrap();
    assert!(owl.contains("&obo;NCBITaxon_9823"));
}

#[test]
fn repeated_passes_are_stable() {
    let workspace = Workspace::new();
    let config = workspace.config("");
    let client = MockEol::default();
    let driver = ReconciliationDriver::new(client.clone());
    let sink = RecordingSink::default();

    driver.run(&config, RunOptions::default(), &sink).unwrap();
    let first_owl = fs::read(workspace.owl().as_std_path()).unwrap();

    let second = driver.run(&config, RunOptions::default(), &sink).unwrap();
    let after_second = Store::load(&workspace.database()).unwrap();
    let third = driver.run(&config, RunOptions::default(), &sink).unwrap();
    let after_third = Store::load(&workspace.database()).unwrap();

    assert_eq!(after_second.version, 1);
    assert_eq!(after_third.version, 2);
    assert_eq!(after_second.index, after_third.index);
    for entity in after_third.index.values() {
        for (name, attribute) in entity.attributes() {
            assert!(!attribute.changed, "{} {name} changed", entity.database_id);
        }
    }
    assert!(!second[0].owl_written);
    assert!(!third[0].owl_written);
    assert_eq!(second[0].records.created, 0);
    assert!(second[0].deprecated.is_empty());
    assert!(second[0].taxon.is_none());
    assert_eq!(fs::read(workspace.owl().as_std_path()).unwrap(), first_owl);
    assert_eq!(*client.calls.lock().unwrap(), 3);
}

#[test]
fn offline_pass_keeps_taxa_pending() {
    let workspace = Workspace::new();
    let config = workspace.config("");
    let client = MockEol::default();
    let driver = ReconciliationDriver::new(client.clone());
    let sink = RecordingSink::default();

    let offline = driver
        .run(&config, RunOptions { offline: true }, &sink)
        .unwrap();
    assert_eq!(offline[0].pending_taxa, 2);
    assert!(offline[0].taxon.is_none());
    assert_eq!(*client.calls.lock().unwrap(), 0);

    let online = driver.run(&config, RunOptions::default(), &sink).unwrap();
    assert_eq!(online[0].pending_taxa, 0);
    assert_eq!(online[0].taxon.as_ref().unwrap().queued, 2);
}

#[test]
fn facet_filter_limits_the_pass() {
    let workspace = Workspace::new();
    let config = workspace.config(r#", "facets": {"include": "A"}"#);
    let driver = ReconciliationDriver::new(MockEol::default());

    let reports = driver
        .run(&config, RunOptions::default(), &RecordingSink::default())
        .unwrap();
    let report = &reports[0];

    assert_eq!(report.records.created, 2);
    assert_eq!(report.records.filtered, 13);
    assert_eq!(report.records.skipped, 1);
    let store = Store::load(&workspace.database()).unwrap();
    assert_eq!(store.index.keys().collect::<Vec<_>>(), vec!["A0150", "A0361"]);
}

#[test]
fn overrides_replace_ids_on_the_next_pass() {
    let workspace = Workspace::new();
    let lookup = workspace.dir.join("ontology_lookup.tsv");
    fs::write(
        lookup.as_std_path(),
        "# code\tontology id\tlabel\nC0400\tCHEBI_29073\tascorbic acid\n",
    )
    .unwrap();
    let config = workspace.config(&format!(r#", "lookup": "{lookup}""#));
    let driver = ReconciliationDriver::new(MockEol::default());
    let sink = RecordingSink::default();

    let first = driver.run(&config, RunOptions::default(), &sink).unwrap();
    assert_eq!(first[0].overrides_applied, 0);

    let second = driver.run(&config, RunOptions::default(), &sink).unwrap();
    assert_eq!(second[0].overrides_applied, 1);
    let owl = fs::read_to_string(workspace.owl().as_std_path()).unwrap();
    assert!(owl.contains("<owl:Class rdf:about=\"&obo;CHEBI_29073\">"));
    assert!(owl.contains("<obo:IAO_0000118 xml:lang=\"en\">ascorbic acid</obo:IAO_0000118>"));
    assert!(!owl.contains("FOODON_03420400"));
}

#[test]
fn emit_regenerates_from_database() {
    let workspace = Workspace::new();
    let config = workspace.config("");
    let driver = ReconciliationDriver::new(MockEol::default());
    driver
        .run(&config, RunOptions::default(), &RecordingSink::default())
        .unwrap();
    let original = fs::read(workspace.owl().as_std_path()).unwrap();
    fs::remove_file(workspace.owl().as_std_path()).unwrap();

    let sink = RecordingSink::default();
    let reports = emit(&config, &sink).unwrap();

    assert!(reports[0].owl_written);
    assert_eq!(reports[0].store_version, 0);
    assert_eq!(fs::read(workspace.owl().as_std_path()).unwrap(), original);
    let messages = sink.messages.lock().unwrap();
    assert!(messages[0].starts_with("phase=Load"));
    assert!(messages[1].starts_with("phase=Store"));
}

#[test]
fn unreadable_source_leaves_database_untouched() {
    let workspace = Workspace::new();
    let config = workspace.config("");
    let driver = ReconciliationDriver::new(MockEol::default());
    driver
        .run(&config, RunOptions::default(), &RecordingSink::default())
        .unwrap();
    let before = fs::read(workspace.database().as_std_path()).unwrap();

    let mut broken = config.clone();
    broken.imports[0].source = workspace.dir.join("missing.xml");
    let err = driver
        .run(&broken, RunOptions::default(), &RecordingSink::default())
        .unwrap_err();

    assert!(matches!(err, LangualError::SourceRead { .. }));
    assert_eq!(fs::read(workspace.database().as_std_path()).unwrap(), before);
}
