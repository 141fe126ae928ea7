//! Tier 2 - Knowledge Graph (C4)
//!
//! Patterns, triggers, file relationships, corrections, and validation
//! insights, with confidence scoring, decay, and consolidation. All writes
//! to this tier serialize through one connection mutex; pattern
//! reinforcement additionally lock-stripes per `pattern_id` using an
//! in-process map of per-pattern mutexes layered on top of the connection
//! lock.

pub mod consolidate;
pub mod corrections;
pub mod decay;
pub mod insights;
pub mod patterns;
pub mod relationships;

use rusqlite::Connection;
use std::collections::HashMap;
use std::sync::Mutex;

use crate::error::Result;
use crate::storage::{migrations::Migration, open_connection};

const MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    description: "patterns, triggers, relationships, corrections, insights",
    up: r#"
        CREATE TABLE IF NOT EXISTS patterns (
            pattern_id TEXT PRIMARY KEY,
            pattern_type TEXT NOT NULL,
            title TEXT NOT NULL,
            description TEXT NOT NULL DEFAULT '',
            routes_to TEXT NOT NULL,
            action TEXT NOT NULL DEFAULT '',
            confidence REAL NOT NULL DEFAULT 0.5 CHECK (confidence >= 0 AND confidence <= 1),
            successful_routes INTEGER NOT NULL DEFAULT 0,
            failed_routes INTEGER NOT NULL DEFAULT 0,
            access_count INTEGER NOT NULL DEFAULT 0,
            requires_context INTEGER NOT NULL DEFAULT 0,
            pinned INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL,
            last_used_at TEXT NOT NULL
        );
        CREATE TABLE IF NOT EXISTS triggers (
            trigger_id TEXT PRIMARY KEY,
            pattern_id TEXT NOT NULL REFERENCES patterns(pattern_id) ON DELETE CASCADE,
            phrase TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_triggers_pattern ON triggers(pattern_id);

        CREATE TABLE IF NOT EXISTS pattern_reinforcements (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            pattern_id TEXT NOT NULL,
            outcome TEXT NOT NULL,
            confidence_before REAL NOT NULL,
            confidence_after REAL NOT NULL,
            at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS file_relationships (
            file_a TEXT NOT NULL,
            file_b TEXT NOT NULL,
            relationship_type TEXT NOT NULL,
            co_modification_rate REAL NOT NULL DEFAULT 0,
            modification_count INTEGER NOT NULL DEFAULT 0,
            confidence REAL NOT NULL DEFAULT 0.5 CHECK (confidence >= 0 AND confidence <= 1),
            last_seen_at TEXT NOT NULL,
            PRIMARY KEY (file_a, file_b)
        );

        CREATE TABLE IF NOT EXISTS corrections (
            correction_id TEXT PRIMARY KEY,
            type TEXT NOT NULL,
            incorrect_value TEXT NOT NULL,
            correct_value TEXT NOT NULL,
            frequency INTEGER NOT NULL DEFAULT 1,
            confidence REAL NOT NULL DEFAULT 0.5 CHECK (confidence >= 0 AND confidence <= 1),
            prevention_strategy TEXT NOT NULL DEFAULT '',
            last_seen_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_corrections_type ON corrections(type);

        CREATE TABLE IF NOT EXISTS validation_insights (
            insight_id TEXT PRIMARY KEY,
            issue TEXT NOT NULL,
            symptom TEXT NOT NULL DEFAULT '',
            cause TEXT NOT NULL DEFAULT '',
            detection TEXT NOT NULL DEFAULT '',
            prevention TEXT NOT NULL DEFAULT '',
            impact TEXT NOT NULL,
            frequency INTEGER NOT NULL DEFAULT 1,
            confidence REAL NOT NULL DEFAULT 0.5 CHECK (confidence >= 0 AND confidence <= 1),
            time_cost_minutes REAL NOT NULL DEFAULT 0,
            last_seen_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS consolidation_history (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            kind TEXT NOT NULL,
            touched INTEGER NOT NULL,
            deleted INTEGER NOT NULL,
            duration_ms INTEGER NOT NULL,
            at TEXT NOT NULL
        );
    "#,
}, Migration {
    version: 2,
    description: "candidate patterns pending the 3-example rule",
    up: r#"
        CREATE TABLE IF NOT EXISTS candidate_patterns (
            trigger TEXT NOT NULL,
            routes_to TEXT NOT NULL,
            example_count INTEGER NOT NULL DEFAULT 0,
            first_seen_at TEXT NOT NULL,
            PRIMARY KEY (trigger, routes_to)
        );
    "#,
}, Migration {
    version: 3,
    description: "same-day decay idempotence marker",
    up: r#"
        ALTER TABLE patterns ADD COLUMN last_decayed_date TEXT NOT NULL DEFAULT '';
    "#,
}];

/// The outcome of a routing attempt, used to reinforce or weaken a pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Failure,
}

/// Small numerator-stabilizer so confidence never divides by zero on a
/// brand-new pattern: `confidence = successful / (successful + failed + ε)`.
pub const EPSILON: f64 = 1e-9;

pub fn compute_confidence(successful: i64, failed: i64) -> f64 {
    successful as f64 / (successful as f64 + failed as f64 + EPSILON)
}

pub struct KnowledgeGraph {
    pub(crate) conn: Mutex<Connection>,
    /// Per-pattern-id lock striping layered over the connection mutex so
    /// concurrent reinforcement of the *same* pattern serializes without
    /// blocking reinforcement of unrelated patterns on raw contention.
    pattern_locks: Mutex<HashMap<String, std::sync::Arc<Mutex<()>>>>,
}

impl KnowledgeGraph {
    pub fn open(path: &std::path::Path) -> Result<Self> {
        let conn = open_connection(path)?;
        crate::storage::migrations::apply_migrations(&conn, MIGRATIONS)?;
        Ok(Self { conn: Mutex::new(conn), pattern_locks: Mutex::new(HashMap::new()) })
    }

    pub(crate) fn lock(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Acquire (creating if necessary) the per-pattern lock for `pattern_id`.
    pub(crate) fn pattern_lock(&self, pattern_id: &str) -> std::sync::Arc<Mutex<()>> {
        let mut locks = self.pattern_locks.lock().unwrap_or_else(|p| p.into_inner());
        locks
            .entry(pattern_id.to_string())
            .or_insert_with(|| std::sync::Arc::new(Mutex::new(())))
            .clone()
    }

    pub fn pattern_count(&self) -> Result<i64> {
        let conn = self.lock();
        let count = conn.query_row("SELECT COUNT(*) FROM patterns", [], |r| r.get(0))?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn confidence_formula_is_success_over_total() {
        let c = compute_confidence(5, 1);
        assert!((c - 5.0 / (5.0 + 1.0 + EPSILON)).abs() < 1e-12);
    }

    #[test]
    fn confidence_never_exceeds_unit_interval() {
        assert!(compute_confidence(100, 0) <= 1.0);
        assert!(compute_confidence(0, 0) >= 0.0);
    }

    #[test]
    fn opens_with_empty_pattern_table() {
        let dir = tempfile::tempdir().unwrap();
        let kg = KnowledgeGraph::open(&dir.path().join("tier2.db")).unwrap();
        assert_eq!(kg.pattern_count().unwrap(), 0);
    }
}
