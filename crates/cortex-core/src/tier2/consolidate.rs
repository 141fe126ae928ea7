//! Pattern consolidation: merges near-duplicate patterns that accumulate
//! from independent learning events covering the same intent.

use chrono::Utc;
use rusqlite::params;

use super::KnowledgeGraph;
use crate::error::Result;
use crate::text::token_set;

/// Two patterns with trigger-set Jaccard similarity at or above this
/// threshold are considered the same intent and merged.
pub const SIMILARITY_THRESHOLD: f64 = 0.80;

#[derive(Debug, Clone, Copy, Default)]
pub struct ConsolidationReport {
    pub merged_groups: usize,
    pub patterns_removed: usize,
}

impl KnowledgeGraph {
    /// Find clusters of patterns whose trigger sets are near-duplicates
    /// (Jaccard similarity >= [`SIMILARITY_THRESHOLD`]) and merge each
    /// cluster into its highest-confidence member: outcome counts sum,
    /// `requires_context` becomes the union (true if any member required
    /// it), and all triggers move to the surviving pattern. Losing patterns
    /// are deleted and the merge is recorded in `consolidation_history`.
    pub fn consolidate_pass(&self) -> Result<ConsolidationReport> {
        let start = std::time::Instant::now();
        let conn = self.lock();
        let mut report = ConsolidationReport::default();

        let mut stmt = conn.prepare("SELECT pattern_id FROM patterns WHERE pinned = 0")?;
        let ids: Vec<String> =
            stmt.query_map([], |r| r.get(0))?.collect::<rusqlite::Result<_>>()?;
        drop(stmt);

        let mut trigger_sets = Vec::new();
        for id in &ids {
            let mut tstmt = conn.prepare("SELECT phrase FROM triggers WHERE pattern_id = ?1")?;
            let phrases: Vec<String> =
                tstmt.query_map(params![id], |r| r.get(0))?.collect::<rusqlite::Result<_>>()?;
            let set = phrases.iter().flat_map(|p| token_set(p)).collect::<std::collections::HashSet<_>>();
            trigger_sets.push(set);
        }

        let mut merged = vec![false; ids.len()];
        for i in 0..ids.len() {
            if merged[i] || trigger_sets[i].is_empty() {
                continue;
            }
            let mut cluster = vec![i];
            for j in (i + 1)..ids.len() {
                if merged[j] || trigger_sets[j].is_empty() {
                    continue;
                }
                let sim = crate::text::jaccard_similarity(&trigger_sets[i], &trigger_sets[j]);
                if sim >= SIMILARITY_THRESHOLD {
                    cluster.push(j);
                }
            }
            if cluster.len() < 2 {
                continue;
            }

            let mut members: Vec<(String, f64, i64, i64, bool)> = Vec::new();
            for &idx in &cluster {
                let (confidence, successful, failed, requires_context): (f64, i64, i64, i64) =
                    conn.query_row(
                        "SELECT confidence, successful_routes, failed_routes, requires_context
                         FROM patterns WHERE pattern_id = ?1",
                        params![ids[idx]],
                        |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?)),
                    )?;
                members.push((ids[idx].clone(), confidence, successful, failed, requires_context != 0));
            }
            members.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap());
            let (survivor_id, _, _, _, _) = members[0].clone();

            let total_successful: i64 = members.iter().map(|m| m.2).sum();
            let total_failed: i64 = members.iter().map(|m| m.3).sum();
            let any_requires_context = members.iter().any(|m| m.4);
            let new_confidence = super::compute_confidence(total_successful, total_failed);

            conn.execute(
                "UPDATE patterns SET successful_routes = ?1, failed_routes = ?2, confidence = ?3,
                 requires_context = ?4 WHERE pattern_id = ?5",
                params![
                    total_successful,
                    total_failed,
                    new_confidence,
                    any_requires_context as i64,
                    survivor_id
                ],
            )?;

            for (loser_id, ..) in members.iter().skip(1) {
                conn.execute(
                    "UPDATE triggers SET pattern_id = ?1 WHERE pattern_id = ?2",
                    params![survivor_id, loser_id],
                )?;
                conn.execute("DELETE FROM patterns WHERE pattern_id = ?1", params![loser_id])?;
                report.patterns_removed += 1;
            }
            report.merged_groups += 1;

            for &idx in &cluster {
                merged[idx] = true;
            }
        }

        conn.execute(
            "INSERT INTO consolidation_history (kind, touched, deleted, duration_ms, at)
             VALUES ('pattern', ?1, ?2, ?3, ?4)",
            params![
                report.merged_groups as i64,
                report.patterns_removed as i64,
                start.elapsed().as_millis() as i64,
                Utc::now().to_rfc3339(),
            ],
        )?;

        Ok(report)
    }
}
