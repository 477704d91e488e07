use std::collections::HashSet;

use serde::Serialize;
use tracing::{debug, warn};
use url::Url;

use crate::parser::{
    self,
    extract::{ArticleEntity, Entity, ProductEntity},
};
use crate::tracker::{EventType, Tracker};

const POST_ID_MAX: usize = 200;
const POST_TITLE_MAX: usize = 200;
const TAG_MAX: usize = 50;
const CATEGORY_MAX: usize = 100;
const AUTHOR_MAX: usize = 100;

const PRODUCT_ID_MAX: usize = 50;
const SKU_MAX: usize = 50;
const PRODUCT_NAME_MAX: usize = 200;
const PRODUCT_CATEGORY_MAX: usize = 100;
const BRAND_MAX: usize = 100;
const VARIANT_MAX: usize = 200;

/// Hard cut at `max` characters.
pub fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => s[..idx].to_string(),
        None => s.to_string(),
    }
}

fn truncate_all(list: Option<Vec<String>>, max: usize) -> Option<Vec<String>> {
    list.map(|items| items.iter().map(|s| truncate_chars(s, max)).collect())
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PostPayload {
    pub post_id: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub categories: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authors: Option<Vec<String>>,
    pub publish_time: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub update_time: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductPayload {
    pub product_id: String,
    pub name: String,
    pub display_price: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_price: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sku: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub brand: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variant: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

/// An entity that passed the acceptance gate, ready to forward.
#[derive(Debug, Clone, PartialEq)]
pub enum TrackEvent {
    PostViewed(PostPayload),
    ProductViewed(ProductPayload),
}

impl TrackEvent {
    pub fn event_type(&self) -> EventType {
        match self {
            TrackEvent::PostViewed(_) => EventType::PostViewed,
            TrackEvent::ProductViewed(_) => EventType::ProductViewed,
        }
    }

    /// Payload with the entity wrapped under `post` / `product`.
    pub fn payload(&self) -> serde_json::Value {
        match self {
            TrackEvent::PostViewed(p) => serde_json::json!({ "post": p }),
            TrackEvent::ProductViewed(p) => serde_json::json!({ "product": p }),
        }
    }
}

/// Id for articles lacking `identifier`: the URL without fragment or trailing slash.
fn url_fallback_id(url: &str) -> Option<String> {
    let mut parsed = Url::parse(url).ok()?;
    parsed.set_fragment(None);
    let id = parsed.as_str().trim_end_matches('/');
    (!id.is_empty()).then(|| id.to_string())
}

/// Acceptance gate plus truncation. `now` fills a missing publish time.
/// The returned id is the untruncated one.
fn accept_article(a: ArticleEntity, now: i64) -> Option<(String, PostPayload)> {
    let id = a.id.or_else(|| a.url.as_deref().and_then(url_fallback_id))?;
    let title = a.title?;
    let payload = PostPayload {
        post_id: truncate_chars(&id, POST_ID_MAX),
        title: truncate_chars(&title, POST_TITLE_MAX),
        url: a.url,
        tags: truncate_all(a.tags, TAG_MAX),
        categories: truncate_all(a.categories, CATEGORY_MAX),
        authors: truncate_all(a.authors, AUTHOR_MAX),
        publish_time: a.publish_time.unwrap_or(now),
        update_time: a.update_time,
    };
    Some((id, payload))
}

fn accept_product(p: ProductEntity) -> Option<(String, ProductPayload)> {
    let id = p.id?;
    let name = p.name?;
    let display_price = p.display_price?;
    let payload = ProductPayload {
        product_id: truncate_chars(&id, PRODUCT_ID_MAX),
        name: truncate_chars(&name, PRODUCT_NAME_MAX),
        display_price,
        original_price: p.original_price,
        sku: p.sku.map(|s| truncate_chars(&s, SKU_MAX)),
        category: p.category.map(|s| truncate_chars(&s, PRODUCT_CATEGORY_MAX)),
        brand: p.brand.map(|s| truncate_chars(&s, BRAND_MAX)),
        variant: p.variant.map(|s| truncate_chars(&s, VARIANT_MAX)),
        url: p.url,
        image_url: p.image_url,
    };
    Some((id, payload))
}

/// Gate an entity. Returns its dedup fingerprint, `post:<id>` or
/// `product:<id>` on the full id, and the truncated event.
pub fn accept(entity: Entity, now: i64) -> Option<(String, TrackEvent)> {
    match entity {
        Entity::Article(a) => accept_article(a, now)
            .map(|(id, p)| (format!("post:{id}"), TrackEvent::PostViewed(p))),
        Entity::Product(p) => accept_product(p)
            .map(|(id, p)| (format!("product:{id}"), TrackEvent::ProductViewed(p))),
    }
}

fn system_clock() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Scans pages and forwards each accepted entity once per page view.
pub struct AutoTracker<T: Tracker> {
    tracker: T,
    seen: HashSet<String>,
    page_url: Option<String>,
    scan_pending: bool,
    clock: fn() -> i64,
}

impl<T: Tracker> AutoTracker<T> {
    pub fn new(tracker: T) -> Self {
        Self {
            tracker,
            seen: HashSet::new(),
            page_url: None,
            scan_pending: false,
            clock: system_clock,
        }
    }

    pub fn with_clock(mut self, clock: fn() -> i64) -> Self {
        self.clock = clock;
        self
    }

    #[cfg(test)]
    pub fn tracker(&self) -> &T {
        &self.tracker
    }

    /// Start a new page view when the URL changes. Same-URL navigation keeps dedup state.
    pub fn navigate(&mut self, url: &str) {
        if self.page_url.as_deref() == Some(url) {
            return;
        }
        debug!(url, "page view changed");
        self.page_url = Some(url.to_string());
        self.seen.clear();
        self.scan_pending = false;
        self.tracker.page_view(url);
    }

    /// Page restored from the back/forward cache.
    pub fn restore_from_cache(&mut self) {
        debug!(url = ?self.page_url, "page restored, clearing fingerprints");
        self.seen.clear();
    }

    /// Schedule a scan. Returns false if one was already pending.
    pub fn request_scan(&mut self) -> bool {
        !std::mem::replace(&mut self.scan_pending, true)
    }

    /// Run the pending scan, if any.
    pub fn flush(&mut self, html: &str) -> Option<usize> {
        if !std::mem::take(&mut self.scan_pending) {
            return None;
        }
        Some(self.scan(html))
    }

    pub fn scan(&mut self, html: &str) -> usize {
        self.dispatch(parser::process_document(html))
    }

    /// Gate, dedup and forward. Returns the number of events tracked.
    pub fn dispatch(&mut self, entities: Vec<Entity>) -> usize {
        let now = (self.clock)();
        let mut tracked = 0;

        for entity in entities {
            let Some((fingerprint, event)) = accept(entity, now) else {
                debug!("entity rejected by acceptance gate");
                continue;
            };
            if self.seen.contains(&fingerprint) {
                debug!(%fingerprint, "already tracked on this page view");
                continue;
            }

            match self.tracker.track(event.event_type(), &event.payload()) {
                Ok(()) => {
                    self.seen.insert(fingerprint);
                    tracked += 1;
                }
                Err(e) => warn!(%fingerprint, "tracker rejected event: {}", e),
            }
        }

        tracked
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracker::TrackError;
    use serde_json::Value;

    const NOW: i64 = 1_700_000_000_000;

    #[derive(Default)]
    struct Recording {
        events: Vec<(EventType, Value)>,
        pages: Vec<String>,
        fail: bool,
    }

    impl Tracker for Recording {
        fn track(&mut self, event_type: EventType, payload: &Value) -> Result<(), TrackError> {
            if self.fail {
                return Err(TrackError::Storage(anyhow::anyhow!("sink offline")));
            }
            self.events.push((event_type, payload.clone()));
            Ok(())
        }

        fn page_view(&mut self, url: &str) {
            self.pages.push(url.to_string());
        }
    }

    fn tracker() -> AutoTracker<Recording> {
        AutoTracker::new(Recording::default()).with_clock(|| NOW)
    }

    fn page(json: &str) -> String {
        format!(
            r#"<html><head><script type="application/ld+json">{}</script></head></html>"#,
            json
        )
    }

    const PRODUCT: &str =
        r#"{"@type":"Product","productID":"12345","name":"Test Product","offers":{"price":1}}"#;

    #[test]
    fn truncation() {
        let long = "x".repeat(300);
        assert_eq!(truncate_chars(&long, 200).len(), 200);
        assert_eq!(truncate_chars("short", 200), "short");
        assert_eq!(truncate_chars("héllo", 2), "hé");
        let once = truncate_chars(&long, 200);
        assert_eq!(truncate_chars(&once, 200), once);
    }

    #[test]
    fn product_end_to_end() {
        let mut t = tracker();
        t.navigate("https://shop.example.com/p/12345");
        assert_eq!(t.scan(&page(PRODUCT)), 1);

        let events = &t.tracker().events;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].0, EventType::ProductViewed);
        assert_eq!(
            events[0].1,
            serde_json::json!({"product": {"productId": "12345", "name": "Test Product", "displayPrice": 1.0}})
        );
    }

    #[test]
    fn dedup_within_page_view() {
        let mut t = tracker();
        t.navigate("https://shop.example.com/a");
        assert_eq!(t.scan(&page(PRODUCT)), 1);
        assert_eq!(t.scan(&page(PRODUCT)), 0);

        t.navigate("https://shop.example.com/a");
        assert_eq!(t.scan(&page(PRODUCT)), 0);

        t.navigate("https://shop.example.com/b");
        assert_eq!(t.scan(&page(PRODUCT)), 1);

        t.restore_from_cache();
        assert_eq!(t.scan(&page(PRODUCT)), 1);
        assert_eq!(t.tracker().events.len(), 3);
        assert_eq!(t.tracker().pages.len(), 2);
    }

    #[test]
    fn gate_rejects_incomplete_products() {
        let mut t = tracker();
        let no_price = r#"{"@type":"Product","productID":"1","name":"x","offers":{"price":"TBD"}}"#;
        let no_name = r#"{"@type":"Product","productID":"1","offers":{"price":5}}"#;
        let no_id = r#"{"@type":"Product","name":"x","offers":{"price":5}}"#;
        for json in [no_price, no_name, no_id] {
            assert_eq!(t.scan(&page(json)), 0);
        }
        assert!(t.tracker().events.is_empty());
    }

    #[test]
    fn article_without_dates_uses_clock() {
        let mut t = tracker();
        t.scan(&page(r#"{"@type":"NewsArticle","identifier":"n1","headline":"Hello"}"#));
        let (kind, payload) = &t.tracker().events[0];
        assert_eq!(*kind, EventType::PostViewed);
        assert_eq!(payload["post"]["publishTime"], NOW);
        assert_eq!(payload["post"]["postId"], "n1");
        assert!(payload["post"].get("updateTime").is_none());
    }

    #[test]
    fn article_id_falls_back_to_url() {
        let mut t = tracker();
        let json = r#"{"@type":"Article","headline":"No id","url":"https://blog.example.com/posts/no-id/#top"}"#;
        assert_eq!(t.scan(&page(json)), 1);
        assert_eq!(
            t.tracker().events[0].1["post"]["postId"],
            "https://blog.example.com/posts/no-id"
        );

        let neither = r#"{"@type":"Article","headline":"Nothing"}"#;
        assert_eq!(t.scan(&page(neither)), 0);
        let untitled = r#"{"@type":"Article","identifier":"z"}"#;
        assert_eq!(t.scan(&page(untitled)), 0);
    }

    #[test]
    fn payload_fields_are_truncated() {
        let mut t = tracker();
        let json = format!(
            r#"{{"@type":"Product","productID":"{}","sku":"{}","name":"{}","brand":"{}","offers":{{"price":3}}}}"#,
            "i".repeat(80),
            "s".repeat(80),
            "n".repeat(300),
            "b".repeat(150)
        );
        t.scan(&page(&json));
        let p = &t.tracker().events[0].1["product"];
        assert_eq!(p["productId"].as_str().unwrap().len(), 50);
        assert_eq!(p["sku"].as_str().unwrap().len(), 50);
        assert_eq!(p["name"].as_str().unwrap().len(), 200);
        assert_eq!(p["brand"].as_str().unwrap().len(), 100);
    }

    #[test]
    fn long_ids_sharing_a_prefix_stay_distinct() {
        let mut t = tracker();
        t.navigate("https://shop.example.com/bundle");
        let prefix = "x".repeat(50);
        for suffix in ["A", "B"] {
            let json = format!(
                r#"{{"@type":"Product","productID":"{prefix}{suffix}","name":"Bundle","offers":{{"price":9}}}}"#
            );
            assert_eq!(t.scan(&page(&json)), 1);
        }
        let events = &t.tracker().events;
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].1["product"]["productId"], prefix.as_str());
        assert_eq!(events[1].1["product"]["productId"], prefix.as_str());

        let again = format!(
            r#"{{"@type":"Product","productID":"{prefix}A","name":"Bundle","offers":{{"price":9}}}}"#
        );
        assert_eq!(t.scan(&page(&again)), 0);
    }

    #[test]
    fn tags_truncated_individually() {
        let mut t = tracker();
        let json = format!(
            r#"{{"@type":"BlogPosting","identifier":"t","headline":"T","keywords":["{}","ok"]}}"#,
            "k".repeat(70)
        );
        t.scan(&page(&json));
        let tags = t.tracker().events[0].1["post"]["tags"].as_array().unwrap().clone();
        assert_eq!(tags[0].as_str().unwrap().len(), 50);
        assert_eq!(tags[1], "ok");
    }

    #[test]
    fn failed_track_is_retried_on_next_scan() {
        let mut t = tracker();
        t.tracker.fail = true;
        assert_eq!(t.scan(&page(PRODUCT)), 0);
        t.tracker.fail = false;
        assert_eq!(t.scan(&page(PRODUCT)), 1);
    }

    #[test]
    fn scan_requests_coalesce() {
        let mut t = tracker();
        assert!(t.request_scan());
        assert!(!t.request_scan());
        assert!(!t.request_scan());
        assert_eq!(t.flush(&page(PRODUCT)), Some(1));
        assert_eq!(t.flush(&page(PRODUCT)), None);

        assert!(t.request_scan());
        t.navigate("https://elsewhere.example.com/");
        assert_eq!(t.flush(&page(PRODUCT)), None);
    }
}
