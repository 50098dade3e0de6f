use std::time::{Duration, Instant};

use crate::config::{ImportJob, ResolvedConfig};
use crate::eol::TaxonLookupClient;
use crate::error::LangualError;
use crate::fs_util::open_source;
use crate::ontofox::{read_template, write_spec};
use crate::overrides::OntologyOverrides;
use crate::owl::{OwlOptions, render_ontology};
use crate::reconcile::ReconciliationSession;
use crate::report::{ImportReport, collect_conflicts};
use crate::source::DescriptorReader;
use crate::store::{Store, write_if_changed};
use crate::taxon::{ExternalTaxonResolver, count_unsettled};

#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    /// Skip the EOL lookups; queued taxa stay pending for the next pass.
    pub offline: bool,
}

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub message: String,
    pub elapsed: Option<Duration>,
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

fn phase(sink: &dyn ProgressSink, message: String) {
    sink.event(ProgressEvent {
        message,
        elapsed: None,
    });
}

/// Runs import passes: load the database, merge the LanguaL release into it,
/// resolve taxa, then write the ontology fragment and the database.
#[derive(Clone)]
pub struct ReconciliationDriver<C: TaxonLookupClient> {
    client: C,
}

impl<C: TaxonLookupClient> ReconciliationDriver<C> {
    pub fn new(client: C) -> Self {
        Self { client }
    }

    pub fn run(
        &self,
        config: &ResolvedConfig,
        options: RunOptions,
        sink: &dyn ProgressSink,
    ) -> Result<Vec<ImportReport>, LangualError> {
        config
            .imports
            .iter()
            .map(|job| self.run_job(job, options, sink))
            .collect()
    }

    pub fn run_job(
        &self,
        job: &ImportJob,
        options: RunOptions,
        sink: &dyn ProgressSink,
    ) -> Result<ImportReport, LangualError> {
        let start = Instant::now();
        let mut report = ImportReport::new(
            &job.ontology,
            job.source.as_str(),
            job.database.as_str(),
            job.output.as_str(),
        );

        phase(sink, format!("phase=Load; reading {}", job.database));
        let mut store = Store::begin_pass(&job.database)?;
        report.store_version = store.version;

        if let Some(lookup) = &job.lookup {
            let overrides = OntologyOverrides::load(lookup)?;
            report.overrides_applied = overrides.apply(&mut store);
        }

        phase(sink, format!("phase=Reconcile; merging {}", job.source));
        let mut session = ReconciliationSession::new(job.policy.clone())?;
        for record in DescriptorReader::new(open_source(&job.source)?) {
            let record = record?;
            report.records.read += 1;
            if record.ftc.is_some() && !job.facets.allows(record_facet(record.ftc.as_deref())) {
                report.records.filtered += 1;
                continue;
            }
            if let Err(err) = session.reconcile(&mut store, &record) {
                tracing::warn!(%err, position = record.position, "skipping descriptor");
                report.records.skipped += 1;
            }
        }

        let pending = session.take_pending();
        if !pending.is_empty() && job.taxon.enabled && !options.offline {
            phase(sink, format!("phase=Resolve; {} taxon mentions", pending.len()));
            let resolver = ExternalTaxonResolver::new(&self.client, job.taxon.settings.clone());
            report.taxon = Some(resolver.resolve(&mut store, &pending));
        }
        report.pending_taxa = count_unsettled(&store, &pending);
        report.absorb_session(std::mem::take(&mut session.stats));
        report.conflicts = collect_conflicts(&store);

        // Everything is rendered before the database is replaced, so a failed
        // write leaves the previous snapshot in place.
        phase(sink, format!("phase=Store; writing {}", job.output));
        write_outputs(&store, job, &mut report)?;
        store.save(&job.database)?;

        sink.event(ProgressEvent {
            message: format!("phase=Done; {}", job.ontology),
            elapsed: Some(start.elapsed()),
        });
        Ok(report)
    }
}

/// Regenerates the ontology fragment and OntoFox specs from the saved
/// databases without reading LanguaL.
pub fn emit(config: &ResolvedConfig, sink: &dyn ProgressSink) -> Result<Vec<ImportReport>, LangualError> {
    config.imports.iter().map(|job| emit_job(job, sink)).collect()
}

pub fn emit_job(job: &ImportJob, sink: &dyn ProgressSink) -> Result<ImportReport, LangualError> {
    let mut report = ImportReport::new(
        &job.ontology,
        job.source.as_str(),
        job.database.as_str(),
        job.output.as_str(),
    );
    phase(sink, format!("phase=Load; reading {}", job.database));
    let store = Store::load(&job.database)?;
    report.store_version = store.version;
    report.conflicts = collect_conflicts(&store);
    phase(sink, format!("phase=Store; writing {}", job.output));
    write_outputs(&store, job, &mut report)?;
    Ok(report)
}

fn write_outputs(store: &Store, job: &ImportJob, report: &mut ImportReport) -> Result<(), LangualError> {
    let owl_options = OwlOptions {
        ontology_name: job.ontology.clone(),
        header_template: job
            .header_template
            .as_deref()
            .map(read_template)
            .transpose()?,
        food_source_ancestors: job.policy.food_source_ancestors.clone(),
    };
    let owl = render_ontology(store, &owl_options)?;
    report.owl_written = write_if_changed(&job.output, owl.as_bytes())?;
    for target in &job.ontofox {
        if write_spec(store, target)? {
            report.ontofox_written.push(target.output.to_string());
        }
    }
    Ok(())
}

fn record_facet(ftc: Option<&str>) -> Option<char> {
    ftc.and_then(|code| code.trim().chars().next())
        .map(|letter| letter.to_ascii_uppercase())
        .filter(char::is_ascii_alphabetic)
}
