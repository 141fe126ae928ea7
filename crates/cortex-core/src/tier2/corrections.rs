//! User corrections: recurring mistakes the assistant made that a human
//! fixed, tracked so the same mistake can be prevented next time.

use chrono::Utc;
use rusqlite::{params, OptionalExtension};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::KnowledgeGraph;
use crate::error::{CortexError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Correction {
    pub correction_id: String,
    pub correction_type: String,
    pub incorrect_value: String,
    pub correct_value: String,
    pub frequency: i64,
    pub confidence: f64,
    pub prevention_strategy: String,
}

fn row_to_correction(row: &rusqlite::Row) -> rusqlite::Result<Correction> {
    Ok(Correction {
        correction_id: row.get("correction_id")?,
        correction_type: row.get("type")?,
        incorrect_value: row.get("incorrect_value")?,
        correct_value: row.get("correct_value")?,
        frequency: row.get("frequency")?,
        confidence: row.get("confidence")?,
        prevention_strategy: row.get("prevention_strategy")?,
    })
}

impl KnowledgeGraph {
    /// Record a correction. When a row with the same `(type, incorrect_value,
    /// correct_value)` already exists, its frequency increments and
    /// confidence rises toward 1.0 (`1 - 1 / (frequency + 1)`) rather than
    /// creating a duplicate, so a recurring mistake strengthens rather than
    /// fragments.
    pub fn record_correction(
        &self,
        correction_type: &str,
        incorrect_value: &str,
        correct_value: &str,
        prevention_strategy: &str,
    ) -> Result<Correction> {
        let conn = self.lock();
        let existing: Option<(String, i64)> = conn
            .query_row(
                "SELECT correction_id, frequency FROM corrections
                 WHERE type = ?1 AND incorrect_value = ?2 AND correct_value = ?3",
                params![correction_type, incorrect_value, correct_value],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )
            .optional()?;

        let now = Utc::now().to_rfc3339();
        let (correction_id, frequency) = match existing {
            Some((id, freq)) => {
                let new_freq = freq + 1;
                let confidence = 1.0 - 1.0 / (new_freq as f64 + 1.0);
                conn.execute(
                    "UPDATE corrections SET frequency = ?1, confidence = ?2, prevention_strategy = ?3, last_seen_at = ?4
                     WHERE correction_id = ?5",
                    params![new_freq, confidence, prevention_strategy, now, id],
                )?;
                (id, new_freq)
            }
            None => {
                let id = Uuid::new_v4().to_string();
                conn.execute(
                    "INSERT INTO corrections (correction_id, type, incorrect_value, correct_value, frequency, confidence, prevention_strategy, last_seen_at)
                     VALUES (?1, ?2, ?3, ?4, 1, 0.5, ?5, ?6)",
                    params![id, correction_type, incorrect_value, correct_value, prevention_strategy, now],
                )?;
                (id, 1)
            }
        };

        conn.query_row(
            "SELECT * FROM corrections WHERE correction_id = ?1",
            params![correction_id],
            row_to_correction,
        )
        .map_err(CortexError::from)
        .map(|mut c| {
            c.frequency = frequency;
            c
        })
    }

    pub fn corrections_for_type(&self, correction_type: &str) -> Result<Vec<Correction>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT * FROM corrections WHERE type = ?1 ORDER BY confidence DESC",
        )?;
        let rows = stmt.query_map(params![correction_type], row_to_correction)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(CortexError::from)
    }
}
