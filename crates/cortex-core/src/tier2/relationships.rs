//! File relationships: which files tend to be modified together.

use chrono::Utc;
use rusqlite::{params, OptionalExtension};
use serde::{Deserialize, Serialize};

use super::KnowledgeGraph;
use crate::error::{CortexError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipType {
    CoModified,
    Imports,
    Tests,
}

impl RelationshipType {
    fn as_str(&self) -> &'static str {
        match self {
            RelationshipType::CoModified => "co_modified",
            RelationshipType::Imports => "imports",
            RelationshipType::Tests => "tests",
        }
    }

    fn parse(s: &str) -> Self {
        match s {
            "imports" => RelationshipType::Imports,
            "tests" => RelationshipType::Tests,
            _ => RelationshipType::CoModified,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileRelationship {
    pub file_a: String,
    pub file_b: String,
    pub relationship_type: RelationshipType,
    pub co_modification_rate: f64,
    pub modification_count: i64,
    pub confidence: f64,
}

/// Canonical (lexicographically-ordered) key for an unordered file pair, so
/// `(a, b)` and `(b, a)` always resolve to the same row.
fn canonical_pair<'a>(a: &'a str, b: &'a str) -> (&'a str, &'a str) {
    if a <= b { (a, b) } else { (b, a) }
}

impl KnowledgeGraph {
    /// Record a co-modification observation between two files, creating the
    /// relationship row if it doesn't exist yet and otherwise incrementing
    /// its modification count and recomputing `co_modification_rate` as
    /// `modification_count / (modification_count + 1)` against the running
    /// total of commits considered, supplied by the caller as `total_commits`.
    pub fn record_co_modification(
        &self,
        file_a: &str,
        file_b: &str,
        total_commits: i64,
    ) -> Result<FileRelationship> {
        let (a, b) = canonical_pair(file_a, file_b);
        let conn = self.lock();
        let existing: Option<i64> = conn
            .query_row(
                "SELECT modification_count FROM file_relationships WHERE file_a = ?1 AND file_b = ?2",
                params![a, b],
                |r| r.get(0),
            )
            .optional()?;

        let now = Utc::now().to_rfc3339();
        let new_count = existing.unwrap_or(0) + 1;
        let rate = if total_commits > 0 { new_count as f64 / total_commits as f64 } else { 0.0 };
        let confidence = rate.min(1.0);

        conn.execute(
            "INSERT INTO file_relationships (file_a, file_b, relationship_type, co_modification_rate, modification_count, confidence, last_seen_at)
             VALUES (?1, ?2, 'co_modified', ?3, ?4, ?5, ?6)
             ON CONFLICT(file_a, file_b) DO UPDATE SET
                co_modification_rate = excluded.co_modification_rate,
                modification_count = excluded.modification_count,
                confidence = excluded.confidence,
                last_seen_at = excluded.last_seen_at",
            params![a, b, rate, new_count, confidence, now],
        )?;

        Ok(FileRelationship {
            file_a: a.to_string(),
            file_b: b.to_string(),
            relationship_type: RelationshipType::CoModified,
            co_modification_rate: rate,
            modification_count: new_count,
            confidence,
        })
    }

    pub fn get_relationship(&self, file_a: &str, file_b: &str) -> Result<Option<FileRelationship>> {
        let (a, b) = canonical_pair(file_a, file_b);
        let conn = self.lock();
        conn.query_row(
            "SELECT file_a, file_b, relationship_type, co_modification_rate, modification_count, confidence
             FROM file_relationships WHERE file_a = ?1 AND file_b = ?2",
            params![a, b],
            |row| {
                Ok(FileRelationship {
                    file_a: row.get(0)?,
                    file_b: row.get(1)?,
                    relationship_type: RelationshipType::parse(&row.get::<_, String>(2)?),
                    co_modification_rate: row.get(3)?,
                    modification_count: row.get(4)?,
                    confidence: row.get(5)?,
                })
            },
        )
        .optional()
        .map_err(CortexError::from)
    }

    /// Every file related to `file`, sorted by descending confidence.
    pub fn related_files(&self, file: &str) -> Result<Vec<FileRelationship>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT file_a, file_b, relationship_type, co_modification_rate, modification_count, confidence
             FROM file_relationships WHERE file_a = ?1 OR file_b = ?1
             ORDER BY confidence DESC",
        )?;
        let rows = stmt.query_map(params![file], |row| {
            Ok(FileRelationship {
                file_a: row.get(0)?,
                file_b: row.get(1)?,
                relationship_type: RelationshipType::parse(&row.get::<_, String>(2)?),
                co_modification_rate: row.get(3)?,
                modification_count: row.get(4)?,
                confidence: row.get(5)?,
            })
        })?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(CortexError::from)
    }
}
