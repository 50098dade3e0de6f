use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::PathBuf;

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};

use crate::domain::FACET_ALPHABET;
use crate::eol::DEFAULT_EOL_BASE;
use crate::error::LangualError;
use crate::ontofox::OntofoxTarget;
use crate::reconcile::ReconcilePolicy;
use crate::taxon::{DEFAULT_BATCH_SIZE, ResolverSettings, default_providers};

pub const DEFAULT_CONFIG_FILE: &str = "langual-import.json";
pub const DEFAULT_ONTOLOGY_NAME: &str = "langual_import";
const MAX_BATCH_SIZE: usize = 100;

#[derive(Debug, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub schema_version: Option<u32>,
    #[serde(default)]
    pub imports: Vec<ImportEntry>,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(untagged)]
pub enum ImportEntry {
    /// Path of the LanguaL XML release; everything else defaulted.
    Shorthand(String),
    Detailed(Box<ImportEntryObject>),
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct ImportEntryObject {
    pub source: String,
    /// Ontology name, used for the header and default file names.
    #[serde(default)]
    pub ontology: Option<String>,
    #[serde(default)]
    pub database: Option<String>,
    #[serde(default)]
    pub output: Option<String>,
    #[serde(default)]
    pub header_template: Option<String>,
    #[serde(default)]
    pub lookup: Option<String>,
    #[serde(default)]
    pub facets: Option<FacetEntry>,
    #[serde(default)]
    pub deprecation_policy: Option<DeprecationPolicyEntry>,
    #[serde(default)]
    pub synonym_language: Option<String>,
    #[serde(default)]
    pub food_source_ancestors: Option<Vec<String>>,
    #[serde(default)]
    pub taxon_resolution: Option<TaxonResolutionEntry>,
    #[serde(default)]
    pub ontofox: Vec<OntofoxEntry>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct FacetEntry {
    /// Facet letters to import, e.g. "A". All facets when unset.
    #[serde(default)]
    pub include: Option<String>,
    #[serde(default)]
    pub exclude: Option<String>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct DeprecationPolicyEntry {
    #[serde(default)]
    pub label_suffixes: Vec<String>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct TaxonResolutionEntry {
    #[serde(default)]
    pub enabled: Option<bool>,
    #[serde(default)]
    pub batch_size: Option<usize>,
    #[serde(default)]
    pub base_url: Option<String>,
    /// Authority name -> EOL hierarchy id.
    #[serde(default)]
    pub providers: Option<BTreeMap<String, u32>>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct OntofoxEntry {
    pub prefix: String,
    pub template: String,
    pub output: String,
}

/// Which facets a pass imports. The thesaurus root belongs to no facet and is
/// only imported when no include list is given.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FacetFilter {
    pub include: Option<BTreeSet<char>>,
    pub exclude: BTreeSet<char>,
}

impl FacetFilter {
    pub fn allows(&self, facet: Option<char>) -> bool {
        match facet {
            None => self.include.is_none(),
            Some(letter) => {
                self.include.as_ref().is_none_or(|include| include.contains(&letter))
                    && !self.exclude.contains(&letter)
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct TaxonResolution {
    pub enabled: bool,
    pub base_url: String,
    pub settings: ResolverSettings,
}

#[derive(Debug, Clone)]
pub struct ImportJob {
    pub ontology: String,
    pub source: Utf8PathBuf,
    pub database: Utf8PathBuf,
    pub output: Utf8PathBuf,
    pub header_template: Option<Utf8PathBuf>,
    pub lookup: Option<Utf8PathBuf>,
    pub facets: FacetFilter,
    pub policy: ReconcilePolicy,
    pub taxon: TaxonResolution,
    pub ontofox: Vec<OntofoxTarget>,
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub schema_version: u32,
    pub imports: Vec<ImportJob>,
}

pub struct ConfigLoader;

impl ConfigLoader {
    pub fn resolve(path: Option<&str>) -> Result<ResolvedConfig, LangualError> {
        let config_path = match path {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from(DEFAULT_CONFIG_FILE),
        };

        if path.is_none() && !config_path.exists() {
            return Err(LangualError::MissingConfig);
        }

        let content = fs::read_to_string(&config_path)
            .map_err(|_| LangualError::ConfigRead(config_path.clone()))?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|err| LangualError::ConfigParse(err.to_string()))?;

        Self::resolve_config(config)
    }

    pub fn resolve_config(config: Config) -> Result<ResolvedConfig, LangualError> {
        let schema_version = config.schema_version.unwrap_or(1);
        if schema_version != 1 {
            return Err(LangualError::InvalidConfig(format!(
                "unsupported schema_version {schema_version}"
            )));
        }

        let imports = config
            .imports
            .into_iter()
            .map(|entry| match entry {
                ImportEntry::Shorthand(source) => resolve_entry(ImportEntryObject {
                    source,
                    ..ImportEntryObject::default()
                }),
                ImportEntry::Detailed(obj) => resolve_entry(*obj),
            })
            .collect::<Result<Vec<_>, LangualError>>()?;

        if imports.is_empty() {
            return Err(LangualError::InvalidConfig(
                "no imports configured".to_string(),
            ));
        }

        Ok(ResolvedConfig {
            schema_version,
            imports,
        })
    }
}

fn resolve_entry(obj: ImportEntryObject) -> Result<ImportJob, LangualError> {
    if obj.source.trim().is_empty() {
        return Err(LangualError::InvalidConfig(
            "import source must not be empty".to_string(),
        ));
    }
    let ontology = obj
        .ontology
        .unwrap_or_else(|| DEFAULT_ONTOLOGY_NAME.to_string());

    let facets = match obj.facets {
        Some(entry) => FacetFilter {
            include: entry.include.as_deref().map(parse_facets).transpose()?,
            exclude: entry
                .exclude
                .as_deref()
                .map(parse_facets)
                .transpose()?
                .unwrap_or_default(),
        },
        None => FacetFilter::default(),
    };

    let mut policy = ReconcilePolicy::default();
    if let Some(deprecation) = obj.deprecation_policy {
        policy.deprecate_label_suffixes = deprecation.label_suffixes;
    }
    if let Some(language) = obj.synonym_language {
        policy.synonym_language = language;
    }
    if let Some(ancestors) = obj.food_source_ancestors {
        policy.food_source_ancestors = ancestors
            .iter()
            .map(|id| id.trim().to_uppercase())
            .collect();
    }

    let taxon = resolve_taxon(obj.taxon_resolution.unwrap_or_default())?;
    policy.taxon_authorities = taxon.settings.providers.keys().cloned().collect();

    let ontofox = obj
        .ontofox
        .into_iter()
        .map(|entry| OntofoxTarget {
            prefix: entry.prefix.to_lowercase(),
            template: entry.template.into(),
            output: entry.output.into(),
        })
        .collect();

    Ok(ImportJob {
        database: obj
            .database
            .unwrap_or_else(|| format!("{ontology}.json"))
            .into(),
        output: obj
            .output
            .unwrap_or_else(|| format!("{ontology}.owl"))
            .into(),
        source: obj.source.into(),
        header_template: obj.header_template.map(Into::into),
        lookup: obj.lookup.map(Into::into),
        ontology,
        facets,
        policy,
        taxon,
        ontofox,
    })
}

fn resolve_taxon(entry: TaxonResolutionEntry) -> Result<TaxonResolution, LangualError> {
    let batch_size = entry.batch_size.unwrap_or(DEFAULT_BATCH_SIZE);
    if batch_size == 0 || batch_size > MAX_BATCH_SIZE {
        return Err(LangualError::InvalidConfig(format!(
            "taxon_resolution.batch_size must be between 1 and {MAX_BATCH_SIZE}"
        )));
    }
    Ok(TaxonResolution {
        enabled: entry.enabled.unwrap_or(true),
        base_url: entry
            .base_url
            .unwrap_or_else(|| DEFAULT_EOL_BASE.to_string()),
        settings: ResolverSettings {
            batch_size,
            providers: entry.providers.unwrap_or_else(default_providers),
        },
    })
}

fn parse_facets(letters: &str) -> Result<BTreeSet<char>, LangualError> {
    letters
        .chars()
        .filter(|ch| !ch.is_whitespace() && *ch != ',')
        .map(|ch| {
            let letter = ch.to_ascii_uppercase();
            if FACET_ALPHABET.contains(letter) {
                Ok(letter)
            } else {
                Err(LangualError::InvalidConfig(format!(
                    "unknown LanguaL facet '{ch}'"
                )))
            }
        })
        .collect()
}
