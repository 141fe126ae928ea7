//! Event Log (C6)
//!
//! Append-only record of everything that happened during request
//! processing (turns appended, patterns reinforced, rules triggered,
//! corrections recorded). The learning pipeline and any other downstream
//! consumer read the log via a named, durable cursor rather than
//! subscribing to live writes, so a consumer that crashes mid-batch simply
//! resumes from its last-advanced position.

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::sync::Mutex;

use crate::error::{CortexError, Result};
use crate::storage::{migrations::Migration, open_connection};

const MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    description: "events and consumer cursors",
    up: r#"
        CREATE TABLE IF NOT EXISTS events (
            event_id INTEGER PRIMARY KEY AUTOINCREMENT,
            event_type TEXT NOT NULL,
            payload TEXT NOT NULL,
            at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_events_type ON events(event_type);

        CREATE TABLE IF NOT EXISTS consumer_cursors (
            consumer_name TEXT PRIMARY KEY,
            last_event_id INTEGER NOT NULL DEFAULT 0
        );
    "#,
}];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub event_id: i64,
    pub event_type: String,
    pub payload: serde_json::Value,
    pub at: chrono::DateTime<Utc>,
}

fn row_to_event(row: &rusqlite::Row) -> rusqlite::Result<Event> {
    let payload_raw: String = row.get("payload")?;
    let at_raw: String = row.get("at")?;
    Ok(Event {
        event_id: row.get("event_id")?,
        event_type: row.get("event_type")?,
        payload: serde_json::from_str(&payload_raw).unwrap_or(serde_json::Value::Null),
        at: chrono::DateTime::parse_from_rfc3339(&at_raw)
            .map(|d| d.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now()),
    })
}

pub struct EventLog {
    conn: Mutex<Connection>,
}

impl EventLog {
    pub fn open(path: &std::path::Path) -> Result<Self> {
        let conn = open_connection(path)?;
        crate::storage::migrations::apply_migrations(&conn, MIGRATIONS)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Append an event, serializing `payload` to JSON. Returns the assigned
    /// `event_id`.
    pub fn emit(&self, event_type: &str, payload: &serde_json::Value) -> Result<i64> {
        let conn = self.lock();
        conn.execute(
            "INSERT INTO events (event_type, payload, at) VALUES (?1, ?2, ?3)",
            params![event_type, payload.to_string(), Utc::now().to_rfc3339()],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Events with `event_id` strictly greater than `after`, oldest first,
    /// capped at `limit`.
    pub fn read_after(&self, after: i64, limit: usize) -> Result<Vec<Event>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT * FROM events WHERE event_id > ?1 ORDER BY event_id ASC LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![after, limit as i64], row_to_event)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(CortexError::from)
    }

    /// The last position a named consumer has advanced to (0 if it has
    /// never read anything).
    pub fn cursor(&self, consumer_name: &str) -> Result<i64> {
        let conn = self.lock();
        let pos: Option<i64> = conn
            .query_row(
                "SELECT last_event_id FROM consumer_cursors WHERE consumer_name = ?1",
                params![consumer_name],
                |r| r.get(0),
            )
            .optional()?;
        Ok(pos.unwrap_or(0))
    }

    /// Advance `consumer_name`'s cursor to `event_id`. Rejects moving a
    /// cursor backward, since consumers are expected to process events
    /// monotonically.
    pub fn advance(&self, consumer_name: &str, event_id: i64) -> Result<()> {
        let conn = self.lock();
        let current: Option<i64> = conn
            .query_row(
                "SELECT last_event_id FROM consumer_cursors WHERE consumer_name = ?1",
                params![consumer_name],
                |r| r.get(0),
            )
            .optional()?;
        if let Some(current) = current {
            if event_id < current {
                return Err(CortexError::ConfigurationError(format!(
                    "cursor {consumer_name} cannot move backward from {current} to {event_id}"
                )));
            }
        }
        conn.execute(
            "INSERT INTO consumer_cursors (consumer_name, last_event_id) VALUES (?1, ?2)
             ON CONFLICT(consumer_name) DO UPDATE SET last_event_id = excluded.last_event_id",
            params![consumer_name, event_id],
        )?;
        Ok(())
    }

    /// Events a named consumer hasn't processed yet, capped at `limit`.
    pub fn pending_for(&self, consumer_name: &str, limit: usize) -> Result<Vec<Event>> {
        let cursor = self.cursor(consumer_name)?;
        self.read_after(cursor, limit)
    }
}
