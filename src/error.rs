use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum LangualError {
    #[error("invalid LanguaL code: {0}")]
    InvalidDatabaseId(String),

    #[error("descriptor without FTC code (record {0})")]
    MissingIdentity(usize),

    #[error("invalid taxon key: {0}")]
    InvalidTaxonKey(String),

    #[error("missing config file langual-import.json in current directory")]
    MissingConfig,

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("failed to read database {path}: {message}")]
    StoreRead { path: String, message: String },

    #[error("failed to read LanguaL source {path}: {message}")]
    SourceRead { path: String, message: String },

    #[error("malformed LanguaL XML: {0}")]
    SourceXml(String),

    #[error("failed to compile pattern: {0}")]
    Pattern(String),

    #[error("EOL request failed: {0}")]
    EolHttp(String),

    #[error("EOL returned status {status}: {message}")]
    EolStatus { status: u16, message: String },

    #[error("unexpected EOL response: {0}")]
    EolResponse(String),

    #[error("failed to render ontology: {0}")]
    Render(#[from] std::fmt::Error),

    #[error("filesystem error: {0}")]
    Filesystem(String),
}
