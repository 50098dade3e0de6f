use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::LangualError;

/// LanguaL facet letters in the order used to partition the FOODON id range.
/// D, I, L and O are not used by LanguaL.
pub const FACET_ALPHABET: &str = "ABCEFGHJKMNPRZ";

pub const ROOT_DATABASE_ID: &str = "00000";
pub const ROOT_ONTOLOGY_ID: &str = "FOODON_03400000";

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DatabaseId(String);

impl DatabaseId {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Facet letter, or `None` for the thesaurus root.
    pub fn facet(&self) -> Option<char> {
        let first = self.0.chars().next()?;
        first.is_ascii_alphabetic().then_some(first)
    }

    /// Projects the code into the FOODON 034xxxxx range: the facet letter
    /// selects a two digit block starting at 40, the four digit suffix is kept.
    pub fn ontology_id(&self) -> String {
        match self.facet() {
            None => ROOT_ONTOLOGY_ID.to_string(),
            Some(letter) => {
                let offset = FACET_ALPHABET.find(letter).unwrap_or_default();
                format!("FOODON_03{}{}", 40 + offset, &self.0[1..])
            }
        }
    }
}

impl fmt::Display for DatabaseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for DatabaseId {
    type Err = LangualError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_uppercase();
        if normalized == ROOT_DATABASE_ID {
            return Ok(Self(normalized));
        }
        let mut chars = normalized.chars();
        let is_valid = match chars.next() {
            Some(letter) => {
                FACET_ALPHABET.contains(letter)
                    && normalized.len() == 5
                    && chars.all(|ch| ch.is_ascii_digit())
            }
            None => false,
        };
        // A0000 would project onto the root's ontology id.
        if !is_valid || normalized == "A0000" {
            return Err(LangualError::InvalidDatabaseId(value.to_string()));
        }
        Ok(Self(normalized))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    #[default]
    Draft,
    Import,
    Deprecated,
    Ignore,
}

impl Status {
    /// Deprecated and ignored entities take no further content merges.
    pub fn is_terminal(self) -> bool {
        matches!(self, Status::Deprecated | Status::Ignore)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Draft => write!(f, "draft"),
            Status::Import => write!(f, "import"),
            Status::Deprecated => write!(f, "deprecated"),
            Status::Ignore => write!(f, "ignore"),
        }
    }
}

/// `rank:scientific name` key of an entity's taxon map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaxonKey {
    pub rank: String,
    pub name: String,
}

impl TaxonKey {
    pub fn new(rank: &str, name: &str) -> Self {
        Self {
            rank: rank.to_string(),
            name: name.trim().to_string(),
        }
    }
}

impl fmt::Display for TaxonKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.rank, self.name)
    }
}

impl FromStr for TaxonKey {
    type Err = LangualError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let (rank, name) = value
            .split_once(':')
            .ok_or_else(|| LangualError::InvalidTaxonKey(value.to_string()))?;
        if rank.is_empty() || name.trim().is_empty() {
            return Err(LangualError::InvalidTaxonKey(value.to_string()));
        }
        Ok(Self::new(rank, name))
    }
}

/// Maps a LanguaL scientific-name tag to an NCBITaxon rank.
/// SCISUNFAM and SCITRI are misspellings found in the published XML.
pub fn rank_for_tag(tag: &str) -> Option<&'static str> {
    let rank = match tag {
        "SCIDIV" | "SCIPHY" => "phylum",
        "SCISUBPHY" => "subphylum",
        "SCISUPCLASS" => "superclass",
        "SCICLASS" => "class",
        "SCIINFCLASS" => "infraclass",
        "SCIORD" => "order",
        "SCISUBORD" => "suborder",
        "SCIINFORD" => "infraorder",
        "SCISUPFAM" => "superfamily",
        "SCIFAM" => "family",
        "SCISUBFAM" | "SCISUNFAM" => "subfamily",
        "SCITRI" | "SCITRIBE" => "tribe",
        "SCIGEN" => "genus",
        "SCINAM" | "SCISYN" => "species",
        _ => return None,
    };
    Some(rank)
}
