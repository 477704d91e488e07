use std::path::Path;

use anyhow::{Context, Result};
use rusqlite::Connection;

pub fn connect(path: &Path) -> Result<Connection> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create {}", dir.display()))?;
    }
    let conn = Connection::open(path)?;
    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS pages (
            id         INTEGER PRIMARY KEY,
            url        TEXT UNIQUE NOT NULL,
            visited    BOOLEAN NOT NULL DEFAULT 0,
            visited_at TEXT,
            status     INTEGER,
            error      TEXT,
            latency_ms INTEGER,
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        );
        CREATE INDEX IF NOT EXISTS idx_pages_visited ON pages(visited);

        CREATE TABLE IF NOT EXISTS events (
            id          INTEGER PRIMARY KEY,
            page_url    TEXT NOT NULL,
            event_type  TEXT NOT NULL CHECK(event_type IN ('postViewed','productViewed')),
            entity_id   TEXT NOT NULL,
            payload     TEXT NOT NULL,
            tracked_at  TEXT NOT NULL DEFAULT (datetime('now'))
        );
        CREATE INDEX IF NOT EXISTS idx_events_type ON events(event_type);
        CREATE INDEX IF NOT EXISTS idx_events_entity ON events(entity_id);
        ",
    )?;
    Ok(())
}

// ── Page queue ──

pub fn insert_pages(conn: &Connection, urls: &[String]) -> Result<usize> {
    let tx = conn.unchecked_transaction()?;
    let mut count = 0;
    {
        let mut stmt = tx.prepare("INSERT OR IGNORE INTO pages (url) VALUES (?1)")?;
        for url in urls {
            count += stmt.execute(rusqlite::params![url])?;
        }
    }
    tx.commit()?;
    Ok(count)
}

pub fn fetch_unvisited(conn: &Connection, limit: Option<usize>) -> Result<Vec<(i64, String)>> {
    let sql = match limit {
        Some(n) => format!(
            "SELECT id, url FROM pages WHERE visited = 0 ORDER BY id LIMIT {}",
            n
        ),
        None => "SELECT id, url FROM pages WHERE visited = 0 ORDER BY id".to_string(),
    };
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Outcome of fetching one queued page.
#[derive(Debug)]
pub struct FetchRow {
    pub page_id: i64,
    pub url: String,
    pub html: Option<String>,
    pub status: Option<i32>,
    pub error: Option<String>,
    pub latency_ms: Option<i64>,
}

pub fn mark_visited(conn: &Connection, row: &FetchRow) -> Result<()> {
    conn.execute(
        "UPDATE pages
         SET visited = 1, visited_at = datetime('now'), status = ?2, error = ?3, latency_ms = ?4
         WHERE id = ?1",
        rusqlite::params![row.page_id, row.status, row.error, row.latency_ms],
    )?;
    Ok(())
}

// ── Events ──

pub struct EventRow {
    pub page_url: String,
    pub event_type: String,
    pub entity_id: String,
    pub payload: String,
}

pub fn insert_event(conn: &Connection, row: &EventRow) -> Result<()> {
    conn.execute(
        "INSERT INTO events (page_url, event_type, entity_id, payload) VALUES (?1, ?2, ?3, ?4)",
        rusqlite::params![row.page_url, row.event_type, row.entity_id, row.payload],
    )?;
    Ok(())
}

pub struct StoredEvent {
    pub id: i64,
    pub page_url: String,
    pub event_type: String,
    pub entity_id: String,
    pub payload: String,
    pub tracked_at: String,
}

pub fn fetch_events(
    conn: &Connection,
    event_type: Option<&str>,
    limit: usize,
) -> Result<Vec<StoredEvent>> {
    let mut stmt = conn.prepare(
        "SELECT id, page_url, event_type, entity_id, payload, tracked_at
         FROM events
         WHERE ?1 IS NULL OR event_type = ?1
         ORDER BY id DESC
         LIMIT ?2",
    )?;
    let rows = stmt
        .query_map(rusqlite::params![event_type, limit as i64], |row| {
            Ok(StoredEvent {
                id: row.get(0)?,
                page_url: row.get(1)?,
                event_type: row.get(2)?,
                entity_id: row.get(3)?,
                payload: row.get(4)?,
                tracked_at: row.get(5)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

// ── Stats ──

pub struct Stats {
    pub pages: i64,
    pub visited: i64,
    pub unvisited: i64,
    pub errors: i64,
    pub events: i64,
    pub posts: i64,
    pub products: i64,
}

pub fn get_stats(conn: &Connection) -> Result<Stats> {
    let count = |sql: &str| -> Result<i64> { Ok(conn.query_row(sql, [], |r| r.get(0))?) };
    Ok(Stats {
        pages: count("SELECT COUNT(*) FROM pages")?,
        visited: count("SELECT COUNT(*) FROM pages WHERE visited = 1")?,
        unvisited: count("SELECT COUNT(*) FROM pages WHERE visited = 0")?,
        errors: count("SELECT COUNT(*) FROM pages WHERE error IS NOT NULL")?,
        events: count("SELECT COUNT(*) FROM events")?,
        posts: count("SELECT COUNT(*) FROM events WHERE event_type = 'postViewed'")?,
        products: count("SELECT COUNT(*) FROM events WHERE event_type = 'productViewed'")?,
    })
}
