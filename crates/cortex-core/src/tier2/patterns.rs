//! Patterns and their triggers - the units the intent router matches
//! against and the learning pipeline writes to.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{compute_confidence, KnowledgeGraph, Outcome};
use crate::error::{CortexError, Result};
use crate::text::token_overlap;

/// A change beyond this magnitude in a single reinforcement is only
/// accepted when backed by at least [`MIN_SUPPORTING_OUTCOMES`] new
/// supporting outcomes; otherwise it is rejected as an anomaly.
pub const MAX_UNSUPPORTED_CONFIDENCE_DELTA: f64 = 0.20;
pub const MIN_SUPPORTING_OUTCOMES: i64 = 5;

/// Number of independent supporting examples a candidate `(trigger,
/// routes_to)` pair needs before [`KnowledgeGraph::record_candidate_example`]
/// promotes it to a real pattern.
pub const CANDIDATE_EXAMPLES_REQUIRED: i64 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternType {
    Routing,
    Workflow,
    Preference,
}

impl PatternType {
    fn as_str(&self) -> &'static str {
        match self {
            PatternType::Routing => "routing",
            PatternType::Workflow => "workflow",
            PatternType::Preference => "preference",
        }
    }

    fn parse(s: &str) -> Self {
        match s {
            "workflow" => PatternType::Workflow,
            "preference" => PatternType::Preference,
            _ => PatternType::Routing,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pattern {
    pub pattern_id: String,
    pub pattern_type: PatternType,
    pub title: String,
    pub description: String,
    pub routes_to: String,
    pub action: String,
    pub confidence: f64,
    pub successful_routes: i64,
    pub failed_routes: i64,
    pub access_count: i64,
    pub requires_context: bool,
    pub pinned: bool,
    pub triggers: Vec<String>,
    pub last_used_at: DateTime<Utc>,
}

/// A pattern together with the fuzzy-match score that surfaced it.
#[derive(Debug, Clone)]
pub struct ScoredPattern {
    pub pattern: Pattern,
    pub score: f64,
}

/// Half-life, in days, of the recency component of pattern ranking: a
/// pattern used exactly one half-life ago ranks at half the weight of one
/// used just now, matching `recency_weight(last_used_at)` below.
pub const RECENCY_HALF_LIFE_DAYS: f64 = 30.0;

/// Exponential recency weight in (0, 1], 1.0 for a pattern used this
/// instant, decaying by half every [`RECENCY_HALF_LIFE_DAYS`]. Used to rank
/// fuzzy-match candidates by `confidence * recency_weight` per spec,
/// rather than by raw token-overlap score alone.
pub fn recency_weight(last_used_at: DateTime<Utc>) -> f64 {
    let days_since = (Utc::now() - last_used_at).num_seconds() as f64 / 86_400.0;
    0.5f64.powf(days_since.max(0.0) / RECENCY_HALF_LIFE_DAYS)
}

fn parse_timestamp(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw).map(|d| d.with_timezone(&Utc)).unwrap_or_else(|_| Utc::now())
}

fn row_to_pattern(conn: &Connection, row: &rusqlite::Row) -> rusqlite::Result<Pattern> {
    let pattern_id: String = row.get("pattern_id")?;
    let triggers = load_triggers(conn, &pattern_id).unwrap_or_default();
    Ok(Pattern {
        pattern_id: pattern_id.clone(),
        pattern_type: PatternType::parse(&row.get::<_, String>("pattern_type")?),
        title: row.get("title")?,
        description: row.get("description")?,
        routes_to: row.get("routes_to")?,
        action: row.get("action")?,
        confidence: row.get("confidence")?,
        successful_routes: row.get("successful_routes")?,
        failed_routes: row.get("failed_routes")?,
        access_count: row.get("access_count")?,
        requires_context: row.get::<_, i64>("requires_context")? != 0,
        pinned: row.get::<_, i64>("pinned")? != 0,
        triggers,
        last_used_at: parse_timestamp(&row.get::<_, String>("last_used_at")?),
    })
}

fn load_triggers(conn: &Connection, pattern_id: &str) -> rusqlite::Result<Vec<String>> {
    let mut stmt = conn.prepare("SELECT phrase FROM triggers WHERE pattern_id = ?1")?;
    let rows = stmt.query_map(params![pattern_id], |r| r.get(0))?;
    rows.collect()
}

impl KnowledgeGraph {
    /// Create a brand-new pattern with its triggers, confidence seeded at
    /// 0.5 (neither proven nor distrusted). Called directly for
    /// operator-supplied patterns; the learning pipeline instead goes
    /// through [`Self::record_candidate_example`], which only calls this
    /// once three supporting examples have accumulated.
    pub fn learn_pattern(
        &self,
        pattern_type: PatternType,
        title: &str,
        description: &str,
        routes_to: &str,
        action: &str,
        triggers: &[String],
        requires_context: bool,
    ) -> Result<Pattern> {
        let conn = self.lock();
        let pattern_id = Uuid::new_v4().to_string();
        let now = Utc::now();
        let now_str = now.to_rfc3339();
        conn.execute(
            "INSERT INTO patterns (
                pattern_id, pattern_type, title, description, routes_to, action,
                confidence, successful_routes, failed_routes, access_count,
                requires_context, pinned, created_at, last_used_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0.5, 0, 0, 0, ?7, 0, ?8, ?8)",
            params![
                pattern_id,
                pattern_type.as_str(),
                title,
                description,
                routes_to,
                action,
                requires_context as i64,
                now_str,
            ],
        )?;
        for phrase in triggers {
            conn.execute(
                "INSERT INTO triggers (trigger_id, pattern_id, phrase) VALUES (?1, ?2, ?3)",
                params![Uuid::new_v4().to_string(), pattern_id, phrase],
            )?;
        }
        Ok(Pattern {
            pattern_id,
            pattern_type,
            title: title.to_string(),
            description: description.to_string(),
            routes_to: routes_to.to_string(),
            action: action.to_string(),
            confidence: 0.5,
            successful_routes: 0,
            failed_routes: 0,
            access_count: 0,
            requires_context,
            pinned: false,
            triggers: triggers.to_vec(),
            last_used_at: now,
        })
    }

    /// Record one supporting example for a learned-pattern candidate keyed
    /// by `(trigger, routes_to)`. The learning pipeline calls this for a
    /// committed request whose agent has no existing pattern covering its
    /// trigger phrase yet. Once [`CANDIDATE_EXAMPLES_REQUIRED`] distinct
    /// calls have accumulated, the candidate is promoted: a new pattern is
    /// created via [`Self::learn_pattern`], the candidate row is cleared,
    /// and the new pattern is returned. Returns `None` while the candidate
    /// is still accumulating examples.
    pub fn record_candidate_example(&self, trigger: &str, routes_to: &str) -> Result<Option<Pattern>> {
        let trigger = trigger.trim().to_lowercase();
        if trigger.is_empty() {
            return Ok(None);
        }
        let conn = self.lock();
        let now = Utc::now().to_rfc3339();
        conn.execute(
            "INSERT INTO candidate_patterns (trigger, routes_to, example_count, first_seen_at)
             VALUES (?1, ?2, 1, ?3)
             ON CONFLICT(trigger, routes_to) DO UPDATE SET example_count = example_count + 1",
            params![trigger, routes_to, now],
        )?;
        let count: i64 = conn.query_row(
            "SELECT example_count FROM candidate_patterns WHERE trigger = ?1 AND routes_to = ?2",
            params![trigger, routes_to],
            |r| r.get(0),
        )?;
        if count < CANDIDATE_EXAMPLES_REQUIRED {
            return Ok(None);
        }
        conn.execute(
            "DELETE FROM candidate_patterns WHERE trigger = ?1 AND routes_to = ?2",
            params![trigger, routes_to],
        )?;
        drop(conn);
        let pattern = self.learn_pattern(
            PatternType::Routing,
            &trigger,
            "learned from recurring routing outcomes",
            routes_to,
            "",
            &[trigger.clone()],
            false,
        )?;
        Ok(Some(pattern))
    }

    pub fn get_pattern(&self, pattern_id: &str) -> Result<Option<Pattern>> {
        let conn = self.lock();
        conn.query_row(
            "SELECT * FROM patterns WHERE pattern_id = ?1",
            params![pattern_id],
            |row| row_to_pattern(&conn, row),
        )
        .optional()
        .map_err(CortexError::from)
    }

    /// Exact trigger-phrase match, case-insensitively.
    pub fn find_pattern_by_exact_trigger(&self, phrase: &str) -> Result<Option<Pattern>> {
        let conn = self.lock();
        let pattern_id: Option<String> = conn
            .query_row(
                "SELECT pattern_id FROM triggers WHERE lower(phrase) = lower(?1) LIMIT 1",
                params![phrase],
                |r| r.get(0),
            )
            .optional()?;
        match pattern_id {
            Some(id) => conn
                .query_row("SELECT * FROM patterns WHERE pattern_id = ?1", params![id], |row| {
                    row_to_pattern(&conn, row)
                })
                .optional()
                .map_err(CortexError::from),
            None => Ok(None),
        }
    }

    /// Fuzzy match: score every pattern's best trigger against `query` by
    /// token overlap, keep matches at or above `min_overlap`, and rank the
    /// survivors by `confidence * recency_weight(last_used_at)` - not by
    /// raw overlap - so a well-established, recently-used pattern outranks
    /// a merely wordier match. `ScoredPattern::score` still carries the raw
    /// overlap the caller used for the threshold cut.
    pub fn find_patterns_by_fuzzy_match(
        &self,
        query: &str,
        min_overlap: f64,
    ) -> Result<Vec<ScoredPattern>> {
        let conn = self.lock();
        let mut stmt = conn.prepare("SELECT pattern_id FROM patterns")?;
        let ids: Vec<String> =
            stmt.query_map([], |r| r.get(0))?.collect::<rusqlite::Result<_>>()?;

        let mut scored = Vec::new();
        for id in ids {
            let triggers = load_triggers(&conn, &id)?;
            let best = triggers
                .iter()
                .map(|t| token_overlap(query, t))
                .fold(0.0_f64, f64::max);
            if best >= min_overlap {
                if let Some(pattern) = conn
                    .query_row("SELECT * FROM patterns WHERE pattern_id = ?1", params![id], |row| {
                        row_to_pattern(&conn, row)
                    })
                    .optional()?
                {
                    scored.push(ScoredPattern { pattern, score: best });
                }
            }
        }
        scored.sort_by(|a, b| {
            let rank_a = a.pattern.confidence * recency_weight(a.pattern.last_used_at);
            let rank_b = b.pattern.confidence * recency_weight(b.pattern.last_used_at);
            rank_b.partial_cmp(&rank_a).unwrap()
        });
        Ok(scored)
    }

    /// Reinforce (or weaken) a pattern with a routing outcome. Confidence is
    /// recomputed as `successful / (successful + failed + ε)`. Once a
    /// pattern has recorded at least one prior outcome, a swing larger than
    /// [`MAX_UNSUPPORTED_CONFIDENCE_DELTA`] is rejected unless its total
    /// outcome count has reached [`MIN_SUPPORTING_OUTCOMES`], guarding
    /// against one anomalous event overturning a thin-but-established
    /// history. A pattern's very first recorded outcome is always accepted
    /// since there is no prior confidence to protect yet.
    pub fn reinforce(&self, pattern_id: &str, outcome: Outcome) -> Result<Pattern> {
        let stripe = self.pattern_lock(pattern_id);
        let _guard = stripe.lock().unwrap_or_else(|p| p.into_inner());

        let conn = self.lock();
        let (successful, failed, confidence_before): (i64, i64, f64) = conn.query_row(
            "SELECT successful_routes, failed_routes, confidence FROM patterns WHERE pattern_id = ?1",
            params![pattern_id],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        ).map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => {
                CortexError::AgentFailed(format!("unknown pattern {pattern_id}"))
            }
            other => CortexError::from(other),
        })?;

        let (new_successful, new_failed) = match outcome {
            Outcome::Success => (successful + 1, failed),
            Outcome::Failure => (successful, failed + 1),
        };
        let confidence_after = compute_confidence(new_successful, new_failed);
        let prior_total = successful + failed;
        let delta = (confidence_after - confidence_before).abs();

        if prior_total > 0
            && delta > MAX_UNSUPPORTED_CONFIDENCE_DELTA
            && prior_total < MIN_SUPPORTING_OUTCOMES
        {
            return Err(CortexError::AnomalyDetected(format!(
                "pattern {pattern_id} confidence swing {delta:.2} exceeds {MAX_UNSUPPORTED_CONFIDENCE_DELTA} with only {prior_total} prior outcomes"
            )));
        }

        let now = Utc::now().to_rfc3339();
        conn.execute(
            "UPDATE patterns SET successful_routes = ?1, failed_routes = ?2, confidence = ?3,
             access_count = access_count + 1, last_used_at = ?4 WHERE pattern_id = ?5",
            params![new_successful, new_failed, confidence_after, now, pattern_id],
        )?;
        conn.execute(
            "INSERT INTO pattern_reinforcements (pattern_id, outcome, confidence_before, confidence_after, at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                pattern_id,
                match outcome { Outcome::Success => "success", Outcome::Failure => "failure" },
                confidence_before,
                confidence_after,
                now,
            ],
        )?;

        conn.query_row("SELECT * FROM patterns WHERE pattern_id = ?1", params![pattern_id], |row| {
            row_to_pattern(&conn, row)
        }).map_err(CortexError::from)
    }
}
