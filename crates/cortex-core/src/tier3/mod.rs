//! Tier 3 - Development Context (C5)
//!
//! Operational telemetry about the codebase itself: aggregate metrics,
//! file hotspots, and a namespace-scoped key/value cache with expiry. None
//! of this feeds routing decisions directly; it exists for introspection
//! and for agents that want to consult recent activity.

pub mod cache;
pub mod hotspots;
pub mod metrics;

use rusqlite::Connection;
use std::sync::Mutex;

use crate::error::Result;
use crate::storage::{migrations::Migration, open_connection};

const MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    description: "metrics, hotspots, cache",
    up: r#"
        CREATE TABLE IF NOT EXISTS metrics (
            namespace TEXT NOT NULL,
            metric_name TEXT NOT NULL,
            value REAL NOT NULL DEFAULT 0,
            updated_at TEXT NOT NULL,
            PRIMARY KEY (namespace, metric_name)
        );

        CREATE TABLE IF NOT EXISTS file_hotspots (
            namespace TEXT NOT NULL,
            file_path TEXT NOT NULL,
            modification_count INTEGER NOT NULL DEFAULT 0,
            last_modified_at TEXT NOT NULL,
            PRIMARY KEY (namespace, file_path)
        );

        CREATE TABLE IF NOT EXISTS dev_cache (
            namespace TEXT NOT NULL,
            cache_key TEXT NOT NULL,
            value TEXT NOT NULL,
            expires_at TEXT NOT NULL,
            PRIMARY KEY (namespace, cache_key)
        );
        CREATE INDEX IF NOT EXISTS idx_dev_cache_expiry ON dev_cache(expires_at);
    "#,
}];

pub const DEFAULT_CACHE_TTL_DAYS: i64 = 30;

pub struct DevContext {
    pub(crate) conn: Mutex<Connection>,
}

impl DevContext {
    pub fn open(path: &std::path::Path) -> Result<Self> {
        let conn = open_connection(path)?;
        crate::storage::migrations::apply_migrations(&conn, MIGRATIONS)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    pub(crate) fn lock(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opens_with_empty_tables() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = DevContext::open(&dir.path().join("tier3.db")).unwrap();
        let conn = ctx.lock();
        let count: i64 =
            conn.query_row("SELECT COUNT(*) FROM file_hotspots", [], |r| r.get(0)).unwrap();
        assert_eq!(count, 0);
    }
}
