//! Storage Adapters (C1)
//!
//! Thin façade over the embedded relational store. Each tier owns exactly
//! one connection, guarded by a single writer mutex — callers never see
//! `rusqlite` directly outside this module tree.

pub mod migrations;

use rusqlite::Connection;
use std::path::Path;

use crate::error::{CortexError, Result};

/// Transient I/O failures are retried this many times (with a short linear
/// backoff) before the open is treated as a persistent failure and bubbled
/// up as `StorageUnavailable`, per §4.14.
const OPEN_RETRY_ATTEMPTS: u32 = 3;

/// Open a connection at `path` (creating parent directories as needed) and
/// apply the standard PRAGMA bundle used across every tier. A transient
/// failure to create the parent directory or open the file (e.g. the
/// filesystem is momentarily busy) is retried with a short backoff before
/// giving up.
pub fn open_connection(path: &Path) -> Result<Connection> {
    let mut last_err = None;
    for attempt in 0..OPEN_RETRY_ATTEMPTS {
        match try_open_connection(path) {
            Ok(conn) => return Ok(conn),
            Err(err) => {
                tracing::warn!(
                    attempt = attempt + 1,
                    path = %path.display(),
                    error = %err,
                    "transient storage open failure, retrying"
                );
                last_err = Some(err);
                std::thread::sleep(std::time::Duration::from_millis(20 * (attempt as u64 + 1)));
            }
        }
    }
    Err(last_err.unwrap_or_else(|| {
        CortexError::StorageUnavailable(format!("cannot open {}", path.display()))
    }))
}

fn try_open_connection(path: &Path) -> Result<Connection> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let conn = Connection::open(path).map_err(|e| {
        CortexError::StorageUnavailable(format!("cannot open {}: {e}", path.display()))
    })?;

    conn.execute_batch(
        "PRAGMA journal_mode = WAL;
         PRAGMA synchronous = NORMAL;
         PRAGMA foreign_keys = ON;
         PRAGMA busy_timeout = 5000;",
    )?;

    Ok(conn)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opens_and_configures_a_connection() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("t.db");
        let conn = open_connection(&path).unwrap();
        let mode: String = conn.query_row("PRAGMA journal_mode", [], |r| r.get(0)).unwrap();
        assert_eq!(mode, "wal");
    }
}
