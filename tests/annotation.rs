use langual_import::annotation::{AnnotationBody, Patterns, parse_annotation};
use langual_import::domain::TaxonKey;

fn patterns() -> Patterns {
    Patterns::new().unwrap()
}

#[test]
fn structured_annotation_splits_definition_and_taxa() {
    let annotation = parse_annotation(
        "<SCINAM>Sus scrofa [ITIS 180722]$br/$<DICTION>Domestic pig raised for meat.$br/$<ITIS>180722",
        &patterns(),
    );

    assert_eq!(
        annotation.definition.as_deref(),
        Some("Domestic pig raised for meat.")
    );
    assert_eq!(
        annotation.xrefs,
        vec![("ITIS".to_string(), "180722".to_string())]
    );
    assert_eq!(annotation.mentions.len(), 1);
    let mention = &annotation.mentions[0];
    assert_eq!(mention.key, TaxonKey::new("species", "Sus scrofa"));
    assert_eq!(mention.authority, "ITIS");
    assert_eq!(mention.code, "180722");
}

#[test]
fn multi_word_authority_is_kept_whole() {
    let annotation = parse_annotation("<SCIGEN>Agaricus [INDEX FUNGORUM 17175]", &patterns());
    let mention = &annotation.mentions[0];
    assert_eq!(mention.key.to_string(), "genus:Agaricus");
    assert_eq!(mention.authority, "INDEX FUNGORUM");
    assert_eq!(mention.code, "17175");
    assert_eq!(annotation.definition, None);
}

#[test]
fn reference_only_citation_has_no_code() {
    let annotation = parse_annotation(
        "<SCINAM>Balaenoptera bonaerensis [2010 FDA Seafood List]",
        &patterns(),
    );
    let mention = &annotation.mentions[0];
    assert_eq!(mention.authority, "2010 FDA Seafood List");
    assert_eq!(mention.code, "");
}

#[test]
fn unknown_rank_tag_is_not_a_mention() {
    let annotation = parse_annotation("<SCIKINGDOM>Animalia [ITIS 202423]", &patterns());
    assert!(annotation.mentions.is_empty());
}

#[test]
fn food_additive_diction_is_flagged() {
    let annotation = parse_annotation(
        "<DICTION>Food additive [CODEX]$br/$Used as an antioxidant.",
        &patterns(),
    );
    assert!(annotation.food_additive);
}

#[test]
fn wikipedia_link_becomes_definition_source() {
    let annotation = parse_annotation(
        "A mild cheese from the Netherlands [https://en.wikipedia.org/wiki/Gouda_cheese].",
        &patterns(),
    );
    assert_eq!(
        annotation.definition_source.as_deref(),
        Some("WIKIPEDIA:Gouda_cheese")
    );
    assert_eq!(
        annotation.definition.as_deref(),
        Some("A mild cheese from the Netherlands .")
    );
}

#[test]
fn source_tag_sets_english_definition_source() {
    let annotation = parse_annotation(
        "<DICTION>Hard cheese.<SOURCE>Codex Stan 283-1978",
        &patterns(),
    );
    assert_eq!(annotation.definition.as_deref(), Some("Hard cheese."));
    assert_eq!(
        annotation.definition_source.as_deref(),
        Some("Codex Stan 283-1978")
    );
    assert_eq!(annotation.source_language, Some("en"));
}

#[test]
fn duplicate_and_synonym_notes_name_a_successor() {
    let duplicate = parse_annotation("Duplicate entry of *CHILEAN CROAKER [B1300]*.", &patterns());
    assert_eq!(duplicate.replaced_by.as_deref(), Some("B1300"));
    assert_eq!(duplicate.definition, None);

    let synonym = parse_annotation(
        "The descriptor is a synonym of *RED KINGKLIP [B1859]*.",
        &patterns(),
    );
    assert_eq!(synonym.replaced_by.as_deref(), Some("B1859"));
}

#[test]
fn europe_and_codex_lines_are_dropped() {
    let annotation = parse_annotation(
        "Antioxidant.$br/$Europe: E 300.$br/$Codex: INS 300.",
        &patterns(),
    );
    assert_eq!(annotation.definition.as_deref(), Some("Antioxidant."));
}

#[test]
fn malformed_structure_keeps_only_plain_text() {
    let patterns = patterns();
    let text = "see notes <DICTION>Hard cheese.";
    assert_eq!(
        AnnotationBody::classify(text, &patterns),
        AnnotationBody::Plain(text.to_string())
    );

    let annotation = parse_annotation("< 5% fat <ITIS>12345", &patterns);
    assert!(annotation.xrefs.is_empty());
    assert_eq!(annotation.definition.as_deref(), Some("< 5% fat <ITIS>12345"));
}
