//! File hotspots: which files change most often, for agents that want to
//! weight their attention toward volatile areas of a codebase. Scoped per
//! namespace like every other Tier 3 table.

use chrono::Utc;
use rusqlite::params;
use serde::{Deserialize, Serialize};

use super::DevContext;
use crate::error::Result;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileHotspot {
    pub file_path: String,
    pub modification_count: i64,
}

impl DevContext {
    pub fn record_file_touch(&self, namespace: &str, file_path: &str) -> Result<i64> {
        let conn = self.lock();
        let now = Utc::now().to_rfc3339();
        conn.execute(
            "INSERT INTO file_hotspots (namespace, file_path, modification_count, last_modified_at) VALUES (?1, ?2, 1, ?3)
             ON CONFLICT(namespace, file_path) DO UPDATE SET
                modification_count = modification_count + 1,
                last_modified_at = excluded.last_modified_at",
            params![namespace, file_path, now],
        )?;
        conn.query_row(
            "SELECT modification_count FROM file_hotspots WHERE namespace = ?1 AND file_path = ?2",
            params![namespace, file_path],
            |r| r.get(0),
        )
        .map_err(crate::error::CortexError::from)
    }

    pub fn top_hotspots(&self, namespace: &str, limit: usize) -> Result<Vec<FileHotspot>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT file_path, modification_count FROM file_hotspots
             WHERE namespace = ?1
             ORDER BY modification_count DESC LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![namespace, limit as i64], |row| {
            Ok(FileHotspot { file_path: row.get(0)?, modification_count: row.get(1)? })
        })?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(crate::error::CortexError::from)
    }
}
