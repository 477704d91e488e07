use std::io::Write;

use rusqlite::Connection;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::db;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum EventType {
    PostViewed,
    ProductViewed,
}

impl EventType {
    pub fn as_str(self) -> &'static str {
        match self {
            EventType::PostViewed => "postViewed",
            EventType::ProductViewed => "productViewed",
        }
    }

    /// Key under which the entity sits in the payload.
    pub fn payload_key(self) -> &'static str {
        match self {
            EventType::PostViewed => "post",
            EventType::ProductViewed => "product",
        }
    }

    /// Id field inside the entity payload.
    pub fn id_field(self) -> &'static str {
        match self {
            EventType::PostViewed => "postId",
            EventType::ProductViewed => "productId",
        }
    }
}

#[derive(Debug, Error)]
pub enum TrackError {
    #[error("failed to write event: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to serialize event: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("failed to store event: {0}")]
    Storage(#[from] anyhow::Error),
}

/// Receiving end of tracked events.
pub trait Tracker {
    fn track(&mut self, event_type: EventType, payload: &Value) -> Result<(), TrackError>;

    /// Called when the dispatcher moves to a new page view.
    fn page_view(&mut self, _url: &str) {}
}

/// Entity id carried in a payload, if any.
pub fn payload_entity_id(event_type: EventType, payload: &Value) -> Option<&str> {
    payload
        .get(event_type.payload_key())?
        .get(event_type.id_field())?
        .as_str()
}

// ── Sinks ──

/// One JSON object per line.
pub struct StdoutTracker<W: Write> {
    out: W,
    page_url: String,
}

impl StdoutTracker<std::io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }
}

impl<W: Write> StdoutTracker<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            page_url: String::new(),
        }
    }
}

impl<W: Write> Tracker for StdoutTracker<W> {
    fn track(&mut self, event_type: EventType, payload: &Value) -> Result<(), TrackError> {
        let line = serde_json::json!({
            "event": event_type,
            "page": self.page_url,
            "payload": payload,
        });
        serde_json::to_writer(&mut self.out, &line)?;
        self.out.write_all(b"\n")?;
        Ok(())
    }

    fn page_view(&mut self, url: &str) {
        self.page_url = url.to_string();
    }
}

/// Stores events in the `events` table.
pub struct SqliteTracker<'a> {
    conn: &'a Connection,
    page_url: String,
}

impl<'a> SqliteTracker<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self {
            conn,
            page_url: String::new(),
        }
    }
}

impl Tracker for SqliteTracker<'_> {
    fn track(&mut self, event_type: EventType, payload: &Value) -> Result<(), TrackError> {
        let row = db::EventRow {
            page_url: self.page_url.clone(),
            event_type: event_type.as_str().to_string(),
            entity_id: payload_entity_id(event_type, payload).unwrap_or_default().to_string(),
            payload: serde_json::to_string(payload)?,
        };
        db::insert_event(self.conn, &row)?;
        Ok(())
    }

    fn page_view(&mut self, url: &str) {
        self.page_url = url.to_string();
    }
}
