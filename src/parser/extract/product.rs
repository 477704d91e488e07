use serde_json::Value;

use super::{as_list, first_string, price, string_or_name, url_of, valid_url, ProductEntity};
use crate::parser::jsonld::RawRecord;

const VARIANT_FIELDS: &[&str] = &["color", "pattern", "size", "material", "model"];
const OFFER_PRICE_FIELDS: &[&str] = &["price", "lowPrice", "highPrice"];
const SPEC_PRICE_FIELDS: &[&str] = &["price", "minPrice", "maxPrice"];

/// Prices and URLs gathered across every offer.
#[derive(Debug, Default)]
struct OfferPool {
    prices: Vec<f64>,
    urls: Vec<String>,
}

impl OfferPool {
    fn collect(record: &RawRecord) -> Self {
        let mut pool = OfferPool::default();
        let Some(offers) = record.get("offers") else {
            return pool;
        };

        for offer in as_list(offers).into_iter().filter_map(Value::as_object) {
            if let Some(url) = offer.get("url").and_then(url_of) {
                pool.urls.push(url);
            }
            pool.prices
                .extend(OFFER_PRICE_FIELDS.iter().filter_map(|k| offer.get(*k).and_then(price)));

            if let Some(specs) = offer.get("priceSpecification") {
                for spec in as_list(specs).into_iter().filter_map(Value::as_object) {
                    pool.prices.extend(
                        SPEC_PRICE_FIELDS
                            .iter()
                            .filter_map(|k| spec.get(*k).and_then(price)),
                    );
                }
            }
        }
        pool
    }

    /// (display, original); original only when strictly above display.
    fn price_range(&self) -> (Option<f64>, Option<f64>) {
        let min = self.prices.iter().copied().reduce(f64::min);
        let max = self.prices.iter().copied().reduce(f64::max);
        match (min, max) {
            (Some(lo), Some(hi)) if hi > lo => (Some(lo), Some(hi)),
            (lo, _) => (lo, None),
        }
    }
}

pub fn extract(record: &RawRecord) -> ProductEntity {
    let pool = OfferPool::collect(record);
    let (display_price, original_price) = pool.price_range();

    let url = record
        .get("url")
        .and_then(url_of)
        .or_else(|| pool.urls.first().cloned());

    ProductEntity {
        id: first_string(record, &["productID", "identifier"]),
        sku: first_string(record, &["sku"]),
        name: first_string(record, &["name"]),
        category: record.get("category").and_then(string_or_name),
        brand: record.get("brand").and_then(string_or_name),
        variant: variant(record),
        display_price,
        original_price,
        url,
        image_url: image_url(record),
    }
}

fn variant(record: &RawRecord) -> Option<String> {
    let parts: Vec<String> = VARIANT_FIELDS
        .iter()
        .filter_map(|k| record.get(*k).and_then(string_or_name))
        .collect();
    if parts.is_empty() {
        None
    } else {
        Some(parts.join(", "))
    }
}

fn image_url(record: &RawRecord) -> Option<String> {
    as_list(record.get("image")?)
        .into_iter()
        .find_map(|img| match img {
            Value::String(_) => url_of(img),
            Value::Object(obj) => obj.get("url").and_then(Value::as_str).and_then(valid_url),
            _ => None,
        })
}
