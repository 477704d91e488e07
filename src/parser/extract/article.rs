use serde_json::Value;

use super::{
    as_list, first_string, non_blank, parse_timestamp, string_or_name, strings, url_of,
    ArticleEntity,
};
use crate::parser::jsonld::RawRecord;

pub fn extract(record: &RawRecord) -> ArticleEntity {
    let published = first_string(record, &["datePublished", "dateCreated"])
        .and_then(|s| parse_timestamp(&s));
    let modified = first_string(record, &["dateModified"]).and_then(|s| parse_timestamp(&s));

    let publish_time = published.or(modified);
    let update_time = match (modified, publish_time) {
        (Some(m), Some(p)) if m > p => Some(m),
        _ => None,
    };

    ArticleEntity {
        id: first_string(record, &["identifier"]),
        url: ["url", "mainEntityOfPage"]
            .iter()
            .filter_map(|k| record.get(*k))
            .find_map(url_of),
        title: first_string(record, &["headline", "name"]),
        tags: non_empty(tags(record)),
        categories: non_empty(categories(record)),
        authors: non_empty(authors(record)),
        publish_time,
        update_time,
    }
}

fn non_empty(list: Vec<String>) -> Option<Vec<String>> {
    if list.is_empty() {
        None
    } else {
        Some(list)
    }
}

fn tags(record: &RawRecord) -> Vec<String> {
    match record.get("keywords") {
        Some(Value::String(s)) => s
            .split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .collect(),
        Some(v @ Value::Array(_)) => strings(v),
        _ => Vec::new(),
    }
}

fn categories(record: &RawRecord) -> Vec<String> {
    let mut out: Vec<String> = ["articleSection", "genre"]
        .iter()
        .filter_map(|k| record.get(*k))
        .flat_map(strings)
        .collect();

    // `about` only contributes through named objects
    if let Some(about) = record.get("about") {
        out.extend(
            as_list(about)
                .into_iter()
                .filter_map(Value::as_object)
                .filter_map(|obj| obj.get("name").and_then(non_blank))
                .map(str::to_string),
        );
    }
    out
}

fn authors(record: &RawRecord) -> Vec<String> {
    let Some(source) = ["author", "creator"]
        .iter()
        .filter_map(|k| record.get(*k))
        .find(|v| !v.is_null())
    else {
        return Vec::new();
    };
    as_list(source)
        .into_iter()
        .filter_map(string_or_name)
        .collect()
}
