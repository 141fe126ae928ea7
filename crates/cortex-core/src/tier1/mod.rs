//! Tier 1 - Working Memory (C3)
//!
//! Capped, insertion-ordered conversation store. One exclusive writer
//! connection, guarded by a `Mutex` - Tier 1's throughput is a handful of
//! turns per request, so a single connection never becomes a bottleneck.

use chrono::{DateTime, Duration, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use uuid::Uuid;

use crate::error::Result;
use crate::storage::{migrations::Migration, open_connection};

const MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    description: "conversations and turns",
    up: r#"
        CREATE TABLE IF NOT EXISTS conversations (
            conversation_id TEXT PRIMARY KEY,
            title TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            quality_score REAL NOT NULL DEFAULT 0 CHECK (quality_score >= 0 AND quality_score <= 10),
            message_count INTEGER NOT NULL DEFAULT 0
        );
        CREATE TABLE IF NOT EXISTS turns (
            turn_id TEXT PRIMARY KEY,
            conversation_id TEXT NOT NULL REFERENCES conversations(conversation_id),
            role TEXT NOT NULL,
            content TEXT NOT NULL,
            timestamp TEXT NOT NULL,
            token_estimate INTEGER NOT NULL DEFAULT 0
        );
        CREATE INDEX IF NOT EXISTS idx_turns_conversation ON turns(conversation_id, timestamp);
        CREATE INDEX IF NOT EXISTS idx_conversations_updated ON conversations(updated_at);
    "#,
}];

/// A role a turn may be attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    Tool,
}

impl Role {
    fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Tool => "tool",
        }
    }

    fn parse(s: &str) -> Self {
        match s {
            "assistant" => Role::Assistant,
            "tool" => Role::Tool,
            _ => Role::User,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    pub turn_id: String,
    pub conversation_id: String,
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    pub token_estimate: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub conversation_id: String,
    pub title: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub quality_score: f64,
    pub message_count: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConversationWithTurns {
    pub conversation: Conversation,
    pub turns: Vec<Turn>,
}

/// Result of an eviction, surfaced to the Event Log as an `evicted` event.
#[derive(Debug, Clone, Serialize)]
pub struct EvictedConversation {
    pub conversation_id: String,
    pub title: Option<String>,
    pub message_count: i64,
}

/// Default "active conversation" window: a conversation appended to within
/// the last 30 minutes is immune to eviction.
pub const DEFAULT_ACTIVITY_WINDOW_MINUTES: i64 = 30;

pub struct WorkingMemory {
    conn: Mutex<Connection>,
    capacity: usize,
    activity_window: Duration,
}

impl WorkingMemory {
    pub fn open(path: &std::path::Path, capacity: usize) -> Result<Self> {
        let conn = open_connection(path)?;
        crate::storage::migrations::apply_migrations(&conn, MIGRATIONS)?;
        Ok(Self {
            conn: Mutex::new(conn),
            capacity,
            activity_window: Duration::minutes(DEFAULT_ACTIVITY_WINDOW_MINUTES),
        })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Append a turn, creating the conversation if it doesn't exist yet.
    /// Returns the evicted conversation, if capacity was exceeded.
    pub fn append_turn(
        &self,
        conversation_id: &str,
        role: Role,
        content: &str,
    ) -> Result<Option<EvictedConversation>> {
        let conn = self.lock();
        let now = Utc::now();

        let exists: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM conversations WHERE conversation_id = ?1",
                params![conversation_id],
                |row| row.get(0),
            )
            .optional()?;

        if exists.is_none() {
            conn.execute(
                "INSERT INTO conversations (conversation_id, title, created_at, updated_at, quality_score, message_count)
                 VALUES (?1, NULL, ?2, ?2, 0, 0)",
                params![conversation_id, now.to_rfc3339()],
            )?;
        }

        let turn_id = Uuid::new_v4().to_string();
        let token_estimate = content.split_whitespace().count() as i64;
        conn.execute(
            "INSERT INTO turns (turn_id, conversation_id, role, content, timestamp, token_estimate)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![turn_id, conversation_id, role.as_str(), content, now.to_rfc3339(), token_estimate],
        )?;

        conn.execute(
            "UPDATE conversations SET updated_at = ?1, message_count = message_count + 1 WHERE conversation_id = ?2",
            params![now.to_rfc3339(), conversation_id],
        )?;

        drop(conn);
        self.evict_if_over_capacity()
    }

    /// The conversation most recently appended to within the activity
    /// window - immune to eviction.
    fn active_conversation_id(&self, conn: &Connection) -> Result<Option<String>> {
        let cutoff = (Utc::now() - self.activity_window).to_rfc3339();
        let id: Option<String> = conn
            .query_row(
                "SELECT conversation_id FROM conversations WHERE updated_at >= ?1 ORDER BY updated_at DESC LIMIT 1",
                params![cutoff],
                |row| row.get(0),
            )
            .optional()?;
        Ok(id)
    }

    /// Deletes the single oldest non-active conversation if over capacity.
    /// Atomic: all of the evicted conversation's turns are removed together.
    pub fn evict_if_over_capacity(&self) -> Result<Option<EvictedConversation>> {
        let conn = self.lock();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM conversations", [], |r| r.get(0))?;
        if count as usize <= self.capacity {
            return Ok(None);
        }

        let active_id = self.active_conversation_id(&conn)?;

        let oldest: Option<(String, Option<String>, i64)> = conn
            .query_row(
                "SELECT conversation_id, title, message_count FROM conversations
                 WHERE conversation_id != ?1
                 ORDER BY updated_at ASC LIMIT 1",
                params![active_id.clone().unwrap_or_default()],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()?;

        let Some((conversation_id, title, message_count)) = oldest else {
            return Ok(None);
        };

        let mut conn = conn;
        let txn = conn.transaction()?;
        txn.execute("DELETE FROM turns WHERE conversation_id = ?1", params![conversation_id])?;
        txn.execute(
            "DELETE FROM conversations WHERE conversation_id = ?1",
            params![conversation_id],
        )?;
        txn.commit()?;

        Ok(Some(EvictedConversation { conversation_id, title, message_count }))
    }

    pub fn get_conversation(&self, id: &str) -> Result<Option<ConversationWithTurns>> {
        let conn = self.lock();
        let conversation = conn
            .query_row(
                "SELECT conversation_id, title, created_at, updated_at, quality_score, message_count
                 FROM conversations WHERE conversation_id = ?1",
                params![id],
                row_to_conversation,
            )
            .optional()?;

        let Some(conversation) = conversation else { return Ok(None) };

        let mut stmt = conn.prepare(
            "SELECT turn_id, conversation_id, role, content, timestamp, token_estimate
             FROM turns WHERE conversation_id = ?1 ORDER BY timestamp ASC",
        )?;
        let turns = stmt
            .query_map(params![id], row_to_turn)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(Some(ConversationWithTurns { conversation, turns }))
    }

    /// Turns across all conversations, most recent first.
    pub fn get_recent_turns(&self, limit: usize) -> Result<Vec<Turn>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT turn_id, conversation_id, role, content, timestamp, token_estimate
             FROM turns ORDER BY timestamp DESC LIMIT ?1",
        )?;
        let turns = stmt
            .query_map(params![limit as i64], row_to_turn)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(turns)
    }

    /// Authoritative conversation count, an unfiltered `SELECT COUNT(*)`.
    pub fn conversation_count(&self) -> Result<i64> {
        let conn = self.lock();
        let count = conn.query_row("SELECT COUNT(*) FROM conversations", [], |r| r.get(0))?;
        Ok(count)
    }
}

fn row_to_conversation(row: &rusqlite::Row) -> rusqlite::Result<Conversation> {
    let created_at: String = row.get(2)?;
    let updated_at: String = row.get(3)?;
    Ok(Conversation {
        conversation_id: row.get(0)?,
        title: row.get(1)?,
        created_at: parse_ts(&created_at),
        updated_at: parse_ts(&updated_at),
        quality_score: row.get(4)?,
        message_count: row.get(5)?,
    })
}

fn row_to_turn(row: &rusqlite::Row) -> rusqlite::Result<Turn> {
    let timestamp: String = row.get(4)?;
    Ok(Turn {
        turn_id: row.get(0)?,
        conversation_id: row.get(1)?,
        role: Role::parse(&row.get::<_, String>(2)?),
        content: row.get(3)?,
        timestamp: parse_ts(&timestamp),
        token_estimate: row.get(5)?,
    })
}

fn parse_ts(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw).map(|dt| dt.with_timezone(&Utc)).unwrap_or_else(|_| Utc::now())
}
