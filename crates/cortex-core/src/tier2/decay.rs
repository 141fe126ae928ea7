//! Time-based confidence decay for unpinned patterns.

use chrono::{DateTime, Utc};
use rusqlite::params;

use super::KnowledgeGraph;
use crate::config::DecayDays;
use crate::error::Result;

/// Outcome of one decay sweep.
#[derive(Debug, Clone, Copy, Default)]
pub struct DecayReport {
    pub softened: usize,
    pub hardened: usize,
    pub marked_delete_candidate: usize,
    pub deleted: usize,
}

impl KnowledgeGraph {
    /// Apply the four-stage decay schedule to every unpinned pattern based
    /// on days since `last_used_at`:
    /// - `soft`..`hard`: confidence multiplied by 0.9
    /// - `hard`..`delete_candidate`: confidence multiplied by 0.75
    /// - `delete_candidate`..`delete`: flagged as a deletion candidate if
    ///   confidence is already below 0.50 (no further multiplier - §4.4
    ///   names this bucket as a conditional flag, not another decay step)
    /// - beyond `delete`: row removed outright regardless of confidence
    ///
    /// Pinned patterns are immune at every stage. A pattern already
    /// decayed today (`last_decayed_date` matches `now`'s date) is skipped
    /// in the soft/hard multiplier buckets, so running the pass twice in
    /// the same logical day applies at most one reduction per pattern.
    pub fn decay_pass(&self, schedule: &DecayDays) -> Result<DecayReport> {
        let conn = self.lock();
        let now = Utc::now();
        let today = now.date_naive().to_string();
        let mut report = DecayReport::default();

        let mut stmt = conn.prepare(
            "SELECT pattern_id, last_used_at, confidence, last_decayed_date FROM patterns WHERE pinned = 0",
        )?;
        let rows: Vec<(String, String, f64, String)> = stmt
            .query_map([], |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?)))?
            .collect::<rusqlite::Result<_>>()?;
        drop(stmt);

        for (pattern_id, last_used_at, confidence, last_decayed_date) in rows {
            let last_used: DateTime<Utc> =
                DateTime::parse_from_rfc3339(&last_used_at).map(|d| d.with_timezone(&Utc)).unwrap_or(now);
            let age_days = (now - last_used).num_days();
            let already_decayed_today = last_decayed_date == today;

            if age_days > schedule.delete {
                conn.execute("DELETE FROM triggers WHERE pattern_id = ?1", params![pattern_id])?;
                conn.execute("DELETE FROM patterns WHERE pattern_id = ?1", params![pattern_id])?;
                report.deleted += 1;
            } else if age_days > schedule.delete_candidate {
                if confidence < 0.50 {
                    report.marked_delete_candidate += 1;
                }
            } else if age_days > schedule.hard {
                if !already_decayed_today {
                    conn.execute(
                        "UPDATE patterns SET confidence = ?1, last_decayed_date = ?2 WHERE pattern_id = ?3",
                        params![confidence * 0.75, today, pattern_id],
                    )?;
                    report.hardened += 1;
                }
            } else if age_days > schedule.soft {
                if !already_decayed_today {
                    conn.execute(
                        "UPDATE patterns SET confidence = ?1, last_decayed_date = ?2 WHERE pattern_id = ?3",
                        params![confidence * 0.9, today, pattern_id],
                    )?;
                    report.softened += 1;
                }
            }
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tier2::patterns::PatternType;
    use rusqlite::params as p;

    fn open_temp() -> KnowledgeGraph {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tier2.db");
        std::mem::forget(dir);
        KnowledgeGraph::open(&path).unwrap()
    }

    fn backdate(kg: &KnowledgeGraph, pattern_id: &str, days_ago: i64) {
        let ts = (Utc::now() - chrono::Duration::days(days_ago)).to_rfc3339();
        let conn = kg.lock();
        conn.execute(
            "UPDATE patterns SET last_used_at = ?1 WHERE pattern_id = ?2",
            p![ts, pattern_id],
        )
        .unwrap();
    }

    #[test]
    fn stale_pattern_beyond_delete_threshold_is_removed() {
        let kg = open_temp();
        let pattern = kg
            .learn_pattern(PatternType::Routing, "old", "", "agent", "", &[], false)
            .unwrap();
        backdate(&kg, &pattern.pattern_id, 200);

        let report = kg.decay_pass(&DecayDays::default()).unwrap();
        assert_eq!(report.deleted, 1);
        assert!(kg.get_pattern(&pattern.pattern_id).unwrap().is_none());
    }

    #[test]
    fn pinned_pattern_is_immune_to_decay() {
        let kg = open_temp();
        let pattern = kg
            .learn_pattern(PatternType::Routing, "pinned", "", "agent", "", &[], false)
            .unwrap();
        {
            let conn = kg.lock();
            conn.execute(
                "UPDATE patterns SET pinned = 1 WHERE pattern_id = ?1",
                p![pattern.pattern_id],
            )
            .unwrap();
        }
        backdate(&kg, &pattern.pattern_id, 200);

        let report = kg.decay_pass(&DecayDays::default()).unwrap();
        assert_eq!(report.deleted, 0);
        assert!(kg.get_pattern(&pattern.pattern_id).unwrap().is_some());
    }

    #[test]
    fn running_decay_twice_same_day_applies_at_most_one_reduction() {
        let kg = open_temp();
        let pattern = kg
            .learn_pattern(PatternType::Routing, "soft", "", "agent", "", &[], false)
            .unwrap();
        backdate(&kg, &pattern.pattern_id, 65); // lands in the soft bucket

        kg.decay_pass(&DecayDays::default()).unwrap();
        let once = kg.get_pattern(&pattern.pattern_id).unwrap().unwrap();
        assert!((once.confidence - 0.45).abs() < 1e-9);

        let second = kg.decay_pass(&DecayDays::default()).unwrap();
        assert_eq!(second.softened, 0, "same-day second pass should skip the already-decayed pattern");
        let twice = kg.get_pattern(&pattern.pattern_id).unwrap().unwrap();
        assert_eq!(twice.confidence, once.confidence, "confidence must not drop a second time on the same day");
    }

    #[test]
    fn fresh_pattern_is_untouched() {
        let kg = open_temp();
        let pattern = kg
            .learn_pattern(PatternType::Routing, "fresh", "", "agent", "", &[], false)
            .unwrap();
        let report = kg.decay_pass(&DecayDays::default()).unwrap();
        assert_eq!(report.softened + report.hardened + report.marked_delete_candidate + report.deleted, 0);
        let reloaded = kg.get_pattern(&pattern.pattern_id).unwrap().unwrap();
        assert_eq!(reloaded.confidence, 0.5);
    }
}
