//! Validation insights: recurring classes of bugs or issues discovered
//! during review/test cycles, retained so the same class can be flagged
//! earlier next time.

use chrono::Utc;
use rusqlite::{params, OptionalExtension};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::KnowledgeGraph;
use crate::error::{CortexError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationInsight {
    pub insight_id: String,
    pub issue: String,
    pub symptom: String,
    pub cause: String,
    pub detection: String,
    pub prevention: String,
    pub impact: String,
    pub frequency: i64,
    pub confidence: f64,
    pub time_cost_minutes: f64,
    pub last_seen_at: String,
}

fn row_to_insight(row: &rusqlite::Row) -> rusqlite::Result<ValidationInsight> {
    Ok(ValidationInsight {
        insight_id: row.get("insight_id")?,
        issue: row.get("issue")?,
        symptom: row.get("symptom")?,
        cause: row.get("cause")?,
        detection: row.get("detection")?,
        prevention: row.get("prevention")?,
        impact: row.get("impact")?,
        frequency: row.get("frequency")?,
        confidence: row.get("confidence")?,
        time_cost_minutes: row.get("time_cost_minutes")?,
        last_seen_at: row.get("last_seen_at")?,
    })
}

/// Lower ranks first: retrieval prioritises higher impact, then recency.
fn impact_rank(impact: &str) -> u8 {
    match impact.to_lowercase().as_str() {
        "critical" => 0,
        "high" => 1,
        "medium" => 2,
        "low" => 3,
        _ => 4,
    }
}

impl KnowledgeGraph {
    /// Record an observed issue. A second sighting of the same `issue`
    /// increments frequency, accumulates `time_cost_minutes`, and raises
    /// confidence the same way corrections do.
    #[allow(clippy::too_many_arguments)]
    pub fn record_insight(
        &self,
        issue: &str,
        symptom: &str,
        cause: &str,
        detection: &str,
        prevention: &str,
        impact: &str,
        time_cost_minutes: f64,
    ) -> Result<ValidationInsight> {
        let conn = self.lock();
        let existing: Option<(String, i64, f64)> = conn
            .query_row(
                "SELECT insight_id, frequency, time_cost_minutes FROM validation_insights WHERE issue = ?1",
                params![issue],
                |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
            )
            .optional()?;

        let now = Utc::now().to_rfc3339();
        let insight_id = match existing {
            Some((id, freq, prior_cost)) => {
                let new_freq = freq + 1;
                let confidence = 1.0 - 1.0 / (new_freq as f64 + 1.0);
                conn.execute(
                    "UPDATE validation_insights SET frequency = ?1, confidence = ?2, time_cost_minutes = ?3,
                     symptom = ?4, cause = ?5, detection = ?6, prevention = ?7, impact = ?8, last_seen_at = ?9
                     WHERE insight_id = ?10",
                    params![
                        new_freq,
                        confidence,
                        prior_cost + time_cost_minutes,
                        symptom,
                        cause,
                        detection,
                        prevention,
                        impact,
                        now,
                        id
                    ],
                )?;
                id
            }
            None => {
                let id = Uuid::new_v4().to_string();
                conn.execute(
                    "INSERT INTO validation_insights (insight_id, issue, symptom, cause, detection, prevention, impact, frequency, confidence, time_cost_minutes, last_seen_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 1, 0.5, ?8, ?9)",
                    params![id, issue, symptom, cause, detection, prevention, impact, time_cost_minutes, now],
                )?;
                id
            }
        };

        conn.query_row(
            "SELECT * FROM validation_insights WHERE insight_id = ?1",
            params![insight_id],
            row_to_insight,
        )
        .map_err(CortexError::from)
    }

    /// Insights at or above `min_confidence`, ranked by impact (critical
    /// first) then by recency within the same impact level - per §3,
    /// retrieval prioritises impact over confidence or raw recency alone.
    pub fn high_confidence_insights(&self, min_confidence: f64) -> Result<Vec<ValidationInsight>> {
        let conn = self.lock();
        let mut stmt = conn.prepare("SELECT * FROM validation_insights WHERE confidence >= ?1")?;
        let rows = stmt.query_map(params![min_confidence], row_to_insight)?;
        let mut insights = rows.collect::<rusqlite::Result<Vec<_>>>().map_err(CortexError::from)?;
        insights.sort_by(|a, b| {
            impact_rank(&a.impact)
                .cmp(&impact_rank(&b.impact))
                .then_with(|| b.last_seen_at.cmp(&a.last_seen_at))
        });
        Ok(insights)
    }
}
