pub mod article;
pub mod product;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::Serialize;
use serde_json::Value;
use url::Url;

use super::jsonld::RawRecord;
use super::taxonomy::EntityType;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArticleEntity {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub categories: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authors: Option<Vec<String>>,
    /// Epoch milliseconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub publish_time: Option<i64>,
    /// Epoch milliseconds; only set when later than `publish_time`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub update_time: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductEntity {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sku: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub brand: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variant: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_price: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_price: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Entity {
    Article(ArticleEntity),
    Product(ProductEntity),
}

/// Normalize a classified record into its entity shape.
pub fn extract_entity(kind: EntityType, record: &RawRecord) -> Entity {
    if kind.is_article_like() {
        Entity::Article(article::extract(record))
    } else {
        Entity::Product(product::extract(record))
    }
}

// ── Shared value helpers ──

/// Trimmed string content, `None` for non-strings and blank strings.
pub(crate) fn non_blank(value: &Value) -> Option<&str> {
    value.as_str().map(str::trim).filter(|s| !s.is_empty())
}

/// First candidate key holding a non-blank string.
pub(crate) fn first_string(record: &RawRecord, keys: &[&str]) -> Option<String> {
    keys.iter()
        .find_map(|k| record.get(*k).and_then(non_blank))
        .map(str::to_string)
}

/// Arrays as their elements, anything else as a single entry.
pub(crate) fn as_list(value: &Value) -> Vec<&Value> {
    match value {
        Value::Array(items) => items.iter().collect(),
        other => vec![other],
    }
}

/// A string, or the `name` of an object.
pub(crate) fn string_or_name(value: &Value) -> Option<String> {
    match value {
        Value::Object(obj) => obj.get("name").and_then(non_blank).map(str::to_string),
        other => non_blank(other).map(str::to_string),
    }
}

/// String elements of a string-or-array value; other entries are dropped.
pub(crate) fn strings(value: &Value) -> Vec<String> {
    as_list(value)
        .into_iter()
        .filter_map(non_blank)
        .map(str::to_string)
        .collect()
}

pub(crate) fn valid_url(candidate: &str) -> Option<String> {
    let candidate = candidate.trim();
    Url::parse(candidate).ok().map(|_| candidate.to_string())
}

/// A URL given directly or through an object's `url` / `@id`.
pub(crate) fn url_of(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => valid_url(s),
        Value::Object(obj) => ["url", "@id"]
            .iter()
            .filter_map(|k| obj.get(*k).and_then(Value::as_str))
            .find_map(valid_url),
        _ => None,
    }
}

/// Non-negative finite number, accepting numeric strings.
pub(crate) fn price(value: &Value) -> Option<f64> {
    let n = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    (n.is_finite() && n >= 0.0).then_some(n)
}

/// ISO-8601 timestamp to epoch milliseconds. Offset-less values are read as UTC.
pub(crate) fn parse_timestamp(value: &str) -> Option<i64> {
    let value = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.timestamp_millis());
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f%z", "%Y-%m-%dT%H:%M%z"] {
        if let Ok(dt) = DateTime::parse_from_str(value, fmt) {
            return Some(dt.timestamp_millis());
        }
    }
    // `%z` rejects a bare `Z`, and the naive forms are UTC already.
    let naive = value.strip_suffix('Z').unwrap_or(value);
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(naive, fmt) {
            return Some(dt.and_utc().timestamp_millis());
        }
    }
    if let Some(d) = calendar_date(value) {
        return d.and_hms_opt(0, 0, 0).map(|dt| dt.and_utc().timestamp_millis());
    }
    DateTime::parse_from_rfc2822(value)
        .ok()
        .map(|dt| dt.timestamp_millis())
}

/// `YYYY-MM-DD`, or the reduced `YYYY-MM` / `YYYY` forms pinned to the first day.
fn calendar_date(value: &str) -> Option<NaiveDate> {
    if let Ok(d) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        return Some(d);
    }
    if value.len() == 7 && value.as_bytes()[4] == b'-' {
        return NaiveDate::parse_from_str(&format!("{value}-01"), "%Y-%m-%d").ok();
    }
    if value.len() == 4 && value.bytes().all(|b| b.is_ascii_digit()) {
        return NaiveDate::from_ymd_opt(value.parse().ok()?, 1, 1);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn first_string_skips_blank_and_non_strings() {
        let record = crate::parser::jsonld::parse(
            r#"{"headline":"   ","alt":42,"name":" Hello "}"#,
        )
        .unwrap();
        assert_eq!(
            first_string(&record, &["headline", "alt", "name"]).as_deref(),
            Some("Hello")
        );
        assert_eq!(first_string(&record, &["missing"]), None);
    }

    #[test]
    fn string_or_name_handles_objects() {
        assert_eq!(string_or_name(&json!("Acme")).as_deref(), Some("Acme"));
        assert_eq!(string_or_name(&json!({"name": "Acme"})).as_deref(), Some("Acme"));
        assert_eq!(string_or_name(&json!({"@id": "x"})), None);
        assert_eq!(string_or_name(&json!(["Acme"])), None);
    }

    #[test]
    fn url_validation() {
        assert_eq!(
            url_of(&json!("https://example.com/a")).as_deref(),
            Some("https://example.com/a")
        );
        assert_eq!(url_of(&json!("/relative/path")), None);
        assert_eq!(url_of(&json!("not a url")), None);
        assert_eq!(
            url_of(&json!({"@id": "https://example.com/b"})).as_deref(),
            Some("https://example.com/b")
        );
        assert_eq!(
            url_of(&json!({"url": "bad", "@id": "https://example.com/c"})).as_deref(),
            Some("https://example.com/c")
        );
    }

    #[test]
    fn price_coercion() {
        assert_eq!(price(&json!(19.99)), Some(19.99));
        assert_eq!(price(&json!("25")), Some(25.0));
        assert_eq!(price(&json!(" 0.5 ")), Some(0.5));
        assert_eq!(price(&json!(-1)), None);
        assert_eq!(price(&json!("free")), None);
        assert_eq!(price(&json!("NaN")), None);
        assert_eq!(price(&json!(null)), None);
    }

    #[test]
    fn timestamps() {
        assert_eq!(parse_timestamp("2024-01-01"), Some(1_704_067_200_000));
        assert_eq!(parse_timestamp("2024-01-01T00:00:00Z"), Some(1_704_067_200_000));
        assert_eq!(parse_timestamp("2024-01-01T02:00:00+02:00"), Some(1_704_067_200_000));
        assert_eq!(parse_timestamp("2024-01-01T00:00:00+0000"), Some(1_704_067_200_000));
        assert_eq!(parse_timestamp("2024-01-01T00:00:00"), Some(1_704_067_200_000));
        assert_eq!(parse_timestamp("Mon, 01 Jan 2024 00:00:00 GMT"), Some(1_704_067_200_000));
        assert_eq!(parse_timestamp("2024-01-01T10:00Z"), Some(1_704_103_200_000));
        assert_eq!(parse_timestamp("2024-01-01T10:00+00:00"), Some(1_704_103_200_000));
        assert_eq!(parse_timestamp("2024-01"), Some(1_704_067_200_000));
        assert_eq!(parse_timestamp("2024"), Some(1_704_067_200_000));
        assert_eq!(parse_timestamp("yesterday"), None);
        assert_eq!(parse_timestamp("2024-13-45"), None);
        assert_eq!(parse_timestamp("2024-13"), None);
        assert_eq!(parse_timestamp("20xx"), None);
    }
}
