pub mod extract;
pub mod jsonld;
pub mod taxonomy;

use extract::Entity;

/// Classify and normalize a single JSON-LD script body.
pub fn extract_script(content: &str) -> Option<Entity> {
    let record = jsonld::parse(content)?;
    let kind = taxonomy::classify(&record)?;
    Some(extract::extract_entity(kind, &record))
}

/// Two-pass pipeline: HTML → JSON-LD script bodies → normalized entities.
pub fn process_document(html: &str) -> Vec<Entity> {
    jsonld::script_contents(html)
        .iter()
        .filter_map(|content| extract_script(content))
        .collect()
}

// ── Tests ──
