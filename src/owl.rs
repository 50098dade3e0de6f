//! RDF/XML rendering of the store as `owl:Class` declarations.
//!
//! Only attributes with `import=true` and a value reach the output. The
//! rendering is a pure function of the store, so unchanged stores produce
//! byte-identical files.

use std::collections::{BTreeMap, HashMap};
use std::fmt::Write;

use quick_xml::escape::escape;

use crate::attribute::Attribute;
use crate::domain::{Status, TaxonKey};
use crate::error::LangualError;
use crate::graph::TaxonomyGraph;
use crate::reconcile::NCBI_TAXON;
use crate::store::{Entity, Store};
use crate::taxon::EOL_XREF;

pub const LANGUAL_SOURCE: &str = "http://langual.org";
const ANCESTRO_PREFIX: &str = "http://www.ebi.ac.uk/ancestro/";
const OBSOLETE_CLASS: &str = "http://www.geneontology.org/formats/oboInOwl#ObsoleteClass";
const ADDED_SUFFIX: &str = " added";

pub const DEFAULT_HEADER: &str = r#"<?xml version="1.0"?>
<!DOCTYPE rdf:RDF [
    <!ENTITY obo "http://purl.obolibrary.org/obo/" >
    <!ENTITY owl "http://www.w3.org/2002/07/owl#" >
    <!ENTITY xsd "http://www.w3.org/2001/XMLSchema#" >
    <!ENTITY rdfs "http://www.w3.org/2000/01/rdf-schema#" >
    <!ENTITY rdf "http://www.w3.org/1999/02/22-rdf-syntax-ns#" >
    <!ENTITY oboInOwl "http://www.geneontology.org/formats/oboInOwl#" >
]>

<rdf:RDF xmlns="http://purl.obolibrary.org/obo/foodon/imports/ONTOLOGY_NAME.owl#"
     xml:base="http://purl.obolibrary.org/obo/foodon/imports/ONTOLOGY_NAME.owl"
     xmlns:obo="http://purl.obolibrary.org/obo/"
     xmlns:owl="http://www.w3.org/2002/07/owl#"
     xmlns:xsd="http://www.w3.org/2001/XMLSchema#"
     xmlns:rdfs="http://www.w3.org/2000/01/rdf-schema#"
     xmlns:rdf="http://www.w3.org/1999/02/22-rdf-syntax-ns#"
     xmlns:oboInOwl="http://www.geneontology.org/formats/oboInOwl#"
     xmlns:ncbitaxon="http://purl.obolibrary.org/obo/ncbitaxon#">
    <owl:Ontology rdf:about="http://purl.obolibrary.org/obo/foodon/imports/ONTOLOGY_NAME.owl"/>
"#;

#[derive(Debug, Clone)]
pub struct OwlOptions {
    pub ontology_name: String,
    /// Header text with `ONTOLOGY_NAME` placeholders; [`DEFAULT_HEADER`] when unset.
    pub header_template: Option<String>,
    /// Ancestors whose live descendants (with facet B) are candidates when a
    /// deprecated "X added" term is pointed at its food source "X".
    pub food_source_ancestors: Vec<String>,
}

impl OwlOptions {
    pub fn new(ontology_name: &str) -> Self {
        Self {
            ontology_name: ontology_name.to_string(),
            header_template: None,
            food_source_ancestors: vec!["C0228".to_string()],
        }
    }
}

pub fn render_ontology(store: &Store, options: &OwlOptions) -> Result<String, LangualError> {
    let header = options.header_template.as_deref().unwrap_or(DEFAULT_HEADER);
    let mut out = header.replace("ONTOLOGY_NAME", &options.ontology_name);
    let ontology_index = store.ontology_index();
    let food_sources = food_source_labels(store, &options.food_source_ancestors);

    for entity in store.index.values() {
        if entity.status == Status::Ignore {
            continue;
        }
        write_class(&mut out, store, entity, &ontology_index, &food_sources)?;
    }
    writeln!(out, "\n</rdf:RDF>")?;
    Ok(out)
}

/// Lower-cased label -> ontology id of every live food-source term.
pub fn food_source_labels<'s, S: AsRef<str>>(
    store: &'s Store,
    ancestors: &[S],
) -> HashMap<String, &'s str> {
    let graph = TaxonomyGraph::new(&store.index);
    store
        .index
        .values()
        .filter(|entity| !entity.status.is_terminal())
        .filter(|entity| {
            entity.database_id.starts_with('B')
                || graph.is_descendant_of_any(&entity.database_id, ancestors)
        })
        .filter_map(|entity| {
            let label = entity.label_text()?;
            Some((label.to_lowercase(), entity.ontology_id.as_str()))
        })
        .collect()
}

fn iri(ontology_id: &str) -> String {
    if ontology_id.starts_with("http://") || ontology_id.starts_with("https://") {
        ontology_id.to_string()
    } else if ontology_id.starts_with("ancestro") {
        format!("{ANCESTRO_PREFIX}{ontology_id}")
    } else {
        format!("&obo;{ontology_id}")
    }
}

fn importable(attribute: &Option<Attribute>) -> Option<&str> {
    attribute
        .as_ref()
        .filter(|attribute| attribute.import)
        .and_then(Attribute::value)
}

fn lang_attr(attribute: &Attribute) -> String {
    attribute
        .language
        .as_deref()
        .map(|language| format!(r#" xml:lang="{}""#, escape(language)))
        .unwrap_or_default()
}

/// Synonym scope tag as stored ("", "exact", "narrow", "broad") -> property
/// name suffix. An empty tag means exact.
fn synonym_scope(tag: &str) -> &'static str {
    match tag.trim().to_ascii_lowercase().as_str() {
        "narrow" => "Narrow",
        "broad" => "Broad",
        "related" => "Related",
        _ => "Exact",
    }
}

fn write_class(
    out: &mut String,
    store: &Store,
    entity: &Entity,
    ontology_index: &BTreeMap<&str, &str>,
    food_sources: &HashMap<String, &str>,
) -> Result<(), LangualError> {
    let about = iri(&entity.ontology_id);
    let foodon = entity.ontology_id.starts_with("FOODON_");
    let deprecated = entity.status == Status::Deprecated;
    let mut footer = String::new();

    writeln!(out, "\n<owl:Class rdf:about=\"{about}\">")?;

    let label = importable(&entity.label).map(str::to_lowercase);
    if let (Some(text), Some(attribute)) = (label.as_deref(), entity.label.as_ref()) {
        let tag = if foodon { "rdfs:label" } else { "obo:IAO_0000118" };
        writeln!(out, "\t<{tag}{}>{}</{tag}>", lang_attr(attribute), escape(text))?;
    }

    if deprecated {
        writeln!(out, "\t<rdfs:subClassOf rdf:resource=\"{OBSOLETE_CLASS}\"/>")?;
    } else {
        for attribute in entity.is_a.values().filter(|attribute| attribute.import) {
            let Some(parent) = attribute.value() else {
                continue;
            };
            // Parents replaced by an override are no longer in the index.
            if ontology_index.contains_key(parent) {
                writeln!(out, "\t<rdfs:subClassOf rdf:resource=\"{}\"/>", iri(parent))?;
            }
        }
    }

    writeln!(out, "\t<obo:IAO_0000412>{LANGUAL_SOURCE}</obo:IAO_0000412>")?;

    let definition = importable(&entity.definition).map(|text| {
        escape(text)
            .replace('\u{0091}', "\"")
            .replace('\u{0092}', "\"")
    });
    if foodon {
        if let Some(definition) = definition.as_deref() {
            writeln!(out, "\t<obo:IAO_0000115 xml:lang=\"en\">{definition}</obo:IAO_0000115>")?;
        }
        if let Some(source) = importable(&entity.definition_source) {
            writeln!(out, "\t<obo:IAO_0000119>{}</obo:IAO_0000119>", escape(source))?;
        }
        match entity.status {
            Status::Deprecated => {
                writeln!(
                    out,
                    "\t<owl:deprecated rdf:datatype=\"&xsd;boolean\">true</owl:deprecated>"
                )?;
                writeln!(out, "\t<obo:IAO_0000114 rdf:resource=\"&obo;IAO_0000122\"/>")?;
            }
            Status::Draft => {
                writeln!(out, "\t<obo:IAO_0000114 rdf:resource=\"&obo;IAO_0000428\"/>")?;
            }
            Status::Import | Status::Ignore => {}
        }
    } else if let Some(definition) = definition.as_deref() {
        writeln!(
            out,
            "\t<rdfs:comment xml:lang=\"en\">LanguaL term definition: {definition}</rdfs:comment>"
        )?;
    }

    if let Some(comment) = importable(&entity.comment) {
        writeln!(
            out,
            "\t<rdfs:comment xml:lang=\"en\">LanguaL curation note: {}</rdfs:comment>",
            escape(comment)
        )?;
    }

    if let Some(reference) = entity.replaced_by.as_deref() {
        let successor = store.resolve_reference(reference);
        writeln!(out, "\t<obo:IAO_0100001 rdf:resource=\"{}\"/>", iri(&successor))?;
    } else if deprecated {
        if let Some(base) = label.as_deref().and_then(|text| text.strip_suffix(ADDED_SUFFIX)) {
            writeln!(
                out,
                "\t<rdfs:comment xml:lang=\"en\">deprecation note: Most LanguaL \"[food source] added\" items are now represented as \"has substance added\" some [food source].</rdfs:comment>"
            )?;
            let successor = food_sources.get(base).filter(|_| entity.database_id.starts_with('H'));
            if let Some(successor) = successor {
                writeln!(out, "\t<obo:IAO_0100001 rdf:resource=\"{}\"/>", iri(successor))?;
            }
        }
    }

    for (phrase, attribute) in &entity.synonyms {
        let Some(tag) = attribute.value().filter(|_| attribute.import) else {
            continue;
        };
        let property = format!("oboInOwl:has{}Synonym", synonym_scope(tag));
        writeln!(
            out,
            "\t<{property}{}>{}</{property}>",
            lang_attr(attribute),
            escape(phrase.to_lowercase().as_str())
        )?;
    }

    for (authority, attribute) in &entity.xrefs {
        let Some(code) = attribute.value().filter(|_| attribute.import) else {
            continue;
        };
        if authority == EOL_XREF {
            writeln!(
                out,
                "\t<oboInOwl:hasDbXref>https://eol.org/pages/{}</oboInOwl:hasDbXref>",
                escape(code)
            )?;
        } else {
            writeln!(
                out,
                "\t<oboInOwl:hasDbXref>{}:{}</oboInOwl:hasDbXref>",
                escape(authority.as_str()),
                escape(code)
            )?;
        }
    }

    for (key, authorities) in &entity.taxon {
        write_taxon(out, &mut footer, &about, key, authorities)?;
    }

    writeln!(out, "</owl:Class>")?;
    out.push_str(&footer);
    Ok(())
}

fn write_taxon(
    out: &mut String,
    footer: &mut String,
    about: &str,
    key: &str,
    authorities: &BTreeMap<String, Attribute>,
) -> Result<(), LangualError> {
    let key: TaxonKey = match key.parse() {
        Ok(key) => key,
        Err(err) => {
            tracing::debug!(%err, "skipping taxon entry");
            return Ok(());
        }
    };
    // An NCBITaxon id kept out of the ontology marks a failed rank check.
    let rejected = authorities
        .get(NCBI_TAXON)
        .is_some_and(|attribute| !attribute.import && attribute.value.is_some());
    if rejected {
        return Ok(());
    }
    let species = key.rank == "species";
    let property = if species {
        "hasNarrowSynonym"
    } else {
        "hasBroadSynonym"
    };
    let rank_axiom = if species {
        String::new()
    } else {
        format!(
            "\t\t<ncbitaxon:has_rank rdf:resource=\"&obo;NCBITaxon_{}\"/>\n",
            escape(key.rank.as_str())
        )
    };

    let resolved = authorities
        .get(NCBI_TAXON)
        .filter(|attribute| attribute.import)
        .and_then(Attribute::value);

    if let Some(taxon_id) = resolved {
        if species {
            write_food_role(out, taxon_id)?;
        } else {
            writeln!(
                out,
                "\t<oboInOwl:{property} rdf:resource=\"&obo;NCBITaxon_{taxon_id}\"/>"
            )?;
            write_axiom(
                footer,
                about,
                property,
                &format!("<owl:annotatedTarget rdf:resource=\"&obo;NCBITaxon_{taxon_id}\"/>"),
                &rank_axiom,
            )?;
        }
        return Ok(());
    }

    let name = escape(key.name.as_str());
    writeln!(out, "\t<oboInOwl:{property}>{name}</oboInOwl:{property}>")?;
    let mut content = rank_axiom;
    for (authority, attribute) in authorities {
        if authority == NCBI_TAXON {
            continue;
        }
        let Some(code) = attribute
            .value()
            .filter(|code| attribute.import && !code.is_empty())
        else {
            continue;
        };
        writeln!(
            content,
            "\t\t<oboInOwl:hasDbXref>{}:{}</oboInOwl:hasDbXref>",
            escape(authority.as_str()),
            escape(code)
        )?;
    }
    write_axiom(
        footer,
        about,
        property,
        &format!("<owl:annotatedTarget>{name}</owl:annotatedTarget>"),
        &content,
    )
}

/// Food-source species are defined as the NCBITaxon organism that has the
/// role food (CHEBI_33290).
fn write_food_role(out: &mut String, taxon_id: &str) -> Result<(), LangualError> {
    writeln!(out, "\t<owl:equivalentClass>")?;
    writeln!(out, "\t\t<owl:Class>")?;
    writeln!(out, "\t\t\t<owl:intersectionOf rdf:parseType=\"Collection\">")?;
    writeln!(out, "\t\t\t\t<rdf:Description rdf:about=\"&obo;NCBITaxon_{taxon_id}\"/>")?;
    writeln!(out, "\t\t\t\t<owl:Restriction>")?;
    writeln!(out, "\t\t\t\t\t<owl:onProperty rdf:resource=\"&obo;RO_0000087\"/>")?;
    writeln!(out, "\t\t\t\t\t<owl:someValuesFrom rdf:resource=\"&obo;CHEBI_33290\"/>")?;
    writeln!(out, "\t\t\t\t</owl:Restriction>")?;
    writeln!(out, "\t\t\t</owl:intersectionOf>")?;
    writeln!(out, "\t\t</owl:Class>")?;
    writeln!(out, "\t</owl:equivalentClass>")?;
    Ok(())
}

fn write_axiom(
    footer: &mut String,
    about: &str,
    property: &str,
    target: &str,
    content: &str,
) -> Result<(), LangualError> {
    writeln!(footer, "<owl:Axiom>")?;
    writeln!(footer, "\t<owl:annotatedSource rdf:resource=\"{about}\"/>")?;
    writeln!(footer, "\t<owl:annotatedProperty rdf:resource=\"&oboInOwl;{property}\"/>")?;
    writeln!(footer, "\t{target}")?;
    footer.push_str(content);
    writeln!(footer, "</owl:Axiom>")?;
    Ok(())
}
