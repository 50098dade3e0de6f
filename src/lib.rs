pub mod annotation;
pub mod app;
pub mod attribute;
pub mod config;
pub mod domain;
pub mod eol;
pub mod error;
pub mod fs_util;
pub mod graph;
pub mod ontofox;
pub mod output;
pub mod overrides;
pub mod owl;
pub mod reconcile;
pub mod report;
pub mod source;
pub mod store;
pub mod taxon;
