//! Parsing of the LanguaL `<AI>` (additional information) field.
//!
//! AI text is either a plain definition or a run of escaped pseudo-tags such
//! as `<DICTION>`, `<SOURCE>`, `<ITIS>` and scientific-name tags
//! (`<SCINAM>Sus scrofa [ITIS 180722]`).

use regex::Regex;

use crate::domain::{TaxonKey, rank_for_tag};
use crate::error::LangualError;

/// Authorities whose one-line codes are copied from AI into the entity xrefs.
pub const XREF_TAGS: [&str; 3] = ["ITIS", "GRIN", "MANSFELD"];

/// Regular expressions shared by every reconciliation call of a session.
#[derive(Debug, Clone)]
pub struct Patterns {
    wikipedia_url: Regex,
    superseded_by: Regex,
    europe: Regex,
    codex: Regex,
    taxonomy: Regex,
    tag: Regex,
}

impl Patterns {
    pub fn new() -> Result<Self, LangualError> {
        Ok(Self {
            wikipedia_url: compile(r"https?://en\.wikipedia\.org/wiki/(?P<reference>[^\]\s]+)")?,
            // "Duplicate entry of *CHILEAN CROAKER [B1814]*."
            // "The descriptor is a synonym of *RED KINGKLIP [B1859]*."
            superseded_by: compile(
                r"(?:Duplicate entry of|[Ss]ynonym of)[^\[]*\[(?P<id>[^\]]+)\]\*\.?",
            )?,
            europe: compile(r"\nEurope: .*\.")?,
            codex: compile(r"\nCodex: .*\.")?,
            // <SCINAM>Balaenoptera bonaerensis Burmeister, 1867 [FAO ASFIS BFW]
            taxonomy: compile(
                r"<?(?P<rank>[A-Z]+)>(?P<name>[^\]\n]+) ?\[(?:(?P<ref>[A-Z]+[0-9]*|2010 FDA Seafood List)|(?P<db>[A-Z 0-9]+) (?P<id>[^\]]+))\]",
            )?,
            tag: compile(r"<(?P<tag>[A-Z]+)>")?,
        })
    }
}

fn compile(pattern: &str) -> Result<Regex, LangualError> {
    Regex::new(pattern).map_err(|err| LangualError::Pattern(err.to_string()))
}

/// A scientific name mentioned in AI together with the authority code
/// LanguaL cites for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaxonMention {
    pub key: TaxonKey,
    pub authority: String,
    pub code: String,
}

/// Everything the reconciler takes from one AI field.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Annotation {
    pub definition: Option<String>,
    pub definition_source: Option<String>,
    pub source_language: Option<&'static str>,
    pub replaced_by: Option<String>,
    pub xrefs: Vec<(String, String)>,
    pub mentions: Vec<TaxonMention>,
    pub food_additive: bool,
}

/// AI content after markup normalisation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnnotationBody {
    /// Tag-delimited segments, in document order.
    Structured(Vec<(String, String)>),
    Plain(String),
}

impl AnnotationBody {
    /// Text starting with `<` must split cleanly into tagged segments; if it
    /// does not, the whole text is kept as plain content.
    pub fn classify(text: &str, patterns: &Patterns) -> Self {
        if !text.starts_with('<') {
            return AnnotationBody::Plain(text.to_string());
        }
        match split_segments(text, &patterns.tag) {
            Some(segments) => AnnotationBody::Structured(segments),
            None => AnnotationBody::Plain(text.to_string()),
        }
    }
}

fn split_segments(text: &str, tag: &Regex) -> Option<Vec<(String, String)>> {
    let markers: Vec<_> = tag.captures_iter(text).collect();
    let first = markers.first()?.get(0)?;
    if first.start() != 0 {
        return None;
    }
    let mut segments = Vec::with_capacity(markers.len());
    for (i, captures) in markers.iter().enumerate() {
        let whole = captures.get(0)?;
        let end = markers
            .get(i + 1)
            .and_then(|next| next.get(0))
            .map(|next| next.start())
            .unwrap_or(text.len());
        segments.push((
            captures["tag"].to_string(),
            text[whole.end()..end].trim().to_string(),
        ));
    }
    Some(segments)
}

pub fn parse_annotation(raw: &str, patterns: &Patterns) -> Annotation {
    let mut annotation = Annotation::default();
    let mut text = raw
        .replace("$i$", "*")
        .replace("$/i$", "*")
        .replace("$br/$", "\n")
        .replace("$br /$", "\n");

    if let Some(captures) = patterns.wikipedia_url.captures(&text) {
        annotation.definition_source = Some(format!("WIKIPEDIA:{}", &captures["reference"]));
        text = patterns
            .wikipedia_url
            .replace_all(&text, "")
            .replace("[]", "")
            .replace("()", "");
    }

    if let Some(captures) = patterns.superseded_by.captures(&text) {
        annotation.replaced_by = Some(captures["id"].trim().to_string());
        text = patterns.superseded_by.replace_all(&text, "").into_owned();
    }

    // E numbers and INS codes are also published as SYNONYM entries.
    text = patterns.europe.replace_all(&text, "").into_owned();
    text = patterns.codex.replace_all(&text, "").into_owned();

    for line in text.lines() {
        collect_mention(line, patterns, &mut annotation);
    }

    let text = text.trim();
    if text.is_empty() {
        return annotation;
    }
    match AnnotationBody::classify(text, patterns) {
        AnnotationBody::Structured(segments) => {
            apply_structured(&segments, patterns, &mut annotation)
        }
        AnnotationBody::Plain(body) => apply_plain(&body, patterns, &mut annotation),
    }
    annotation
}

fn collect_mention(line: &str, patterns: &Patterns, annotation: &mut Annotation) {
    let Some(captures) = patterns.taxonomy.captures(line) else {
        return;
    };
    let tag = &captures["rank"];
    let name = captures["name"].trim();
    if tag == "DICTION" {
        if name.to_lowercase().starts_with("food additive") {
            annotation.food_additive = true;
        }
        return;
    }
    let Some(rank) = rank_for_tag(tag) else {
        tracing::debug!(tag, name, "unknown taxonomic rank tag");
        return;
    };
    let authority = captures
        .name("db")
        .or_else(|| captures.name("ref"))
        .map(|m| m.as_str().trim().to_string())
        .unwrap_or_default();
    let code = captures
        .name("id")
        .map(|m| m.as_str().trim().to_string())
        .unwrap_or_default();
    annotation.mentions.push(TaxonMention {
        key: TaxonKey::new(rank, name),
        authority,
        code,
    });
}

fn strip_taxonomy(text: &str, patterns: &Patterns) -> Option<String> {
    let cleaned = patterns.taxonomy.replace_all(text, "");
    let cleaned = cleaned.trim();
    (!cleaned.is_empty()).then(|| cleaned.to_string())
}

fn apply_structured(segments: &[(String, String)], patterns: &Patterns, annotation: &mut Annotation) {
    let mut diction = Vec::new();
    for (tag, content) in segments {
        match tag.as_str() {
            "DICTION" => diction.push(content.as_str()),
            "SOURCE" => {
                if !content.is_empty() {
                    annotation.definition_source = Some(content.clone());
                    annotation.source_language = Some("en");
                }
            }
            tag if XREF_TAGS.contains(&tag) => {
                let code = content.lines().next().unwrap_or_default().trim();
                annotation.xrefs.push((tag.to_string(), code.to_string()));
            }
            _ => {}
        }
    }
    if !diction.is_empty() {
        annotation.definition = strip_taxonomy(&diction.join("\n\n"), patterns);
    }
}

fn apply_plain(body: &str, patterns: &Patterns, annotation: &mut Annotation) {
    annotation.definition = strip_taxonomy(body, patterns);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stray_angle_bracket_degrades_to_plain_text() {
        let patterns = Patterns::new().unwrap();
        let body = AnnotationBody::classify("< 5% fat, see <DICTION>", &patterns);
        assert_eq!(
            body,
            AnnotationBody::Plain("< 5% fat, see <DICTION>".to_string())
        );
    }
}
