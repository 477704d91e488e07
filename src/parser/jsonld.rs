use std::sync::LazyLock;

use scraper::{Html, Selector};
use serde_json::{Map, Value};

pub type RawRecord = Map<String, Value>;

static JSONLD_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(r#"script[type="application/ld+json"]"#).unwrap());

/// Text content of every JSON-LD script in the document, in document order.
pub fn script_contents(html: &str) -> Vec<String> {
    let document = Html::parse_document(html);
    document
        .select(&JSONLD_SELECTOR)
        .map(|script| script.text().collect::<String>())
        .collect()
}

/// Decode a JSON-LD script body. Anything other than a top-level object
/// (syntax errors, arrays, scalars) yields `None`.
pub fn parse(content: &str) -> Option<RawRecord> {
    match serde_json::from_str::<Value>(content) {
        Ok(Value::Object(map)) => Some(map),
        _ => None,
    }
}
