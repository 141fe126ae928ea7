//! Learning Pipeline (C12)
//!
//! Background consumer of the Event Log. A run is triggered when any of
//! three conditions hold: at least [`PENDING_THRESHOLD`] events are
//! backlogged, the oldest pending event is older than
//! [`STALE_EVENT_AGE_HOURS`] hours and there are at least
//! [`STALE_EVENT_MIN_COUNT`] pending, or a `session_complete` event has
//! been observed. A run consumes every pending event for the consumer:
//! reinforcing Tier 2 patterns from `request_committed` events whose
//! trigger already has a matching pattern, accumulating candidate patterns
//! (and promoting them past the 3-example rule) when it doesn't, updating
//! file-relationship counters from `file_edited` events, logging
//! corrections from `user_corrected` events, and running one decay pass
//! and one consolidation pass per run. The cursor only advances once a
//! batch has committed in full.

use chrono::Utc;
use std::sync::Arc;

use crate::config::DecayDays;
use crate::error::Result;
use crate::events::{Event, EventLog};
use crate::tier2::{KnowledgeGraph, Outcome};

pub const CONSUMER_NAME: &str = "learning_pipeline";
pub const PENDING_THRESHOLD: usize = 50;
pub const STALE_EVENT_AGE_HOURS: i64 = 24;
pub const STALE_EVENT_MIN_COUNT: usize = 10;

#[derive(Debug, Clone, Copy, Default)]
pub struct LearningReport {
    pub events_processed: usize,
    pub patterns_reinforced: usize,
    pub patterns_learned: usize,
    pub corrections_logged: usize,
    pub relationships_updated: usize,
}

pub struct LearningPipeline {
    events: Arc<EventLog>,
    tier2: Arc<KnowledgeGraph>,
    decay_days: DecayDays,
}

impl LearningPipeline {
    pub fn new(events: Arc<EventLog>, tier2: Arc<KnowledgeGraph>) -> Self {
        Self { events, tier2, decay_days: DecayDays::default() }
    }

    pub fn with_decay_schedule(mut self, decay_days: DecayDays) -> Self {
        self.decay_days = decay_days;
        self
    }

    /// Whether a run should fire right now, given the current pending
    /// queue for this consumer.
    pub fn should_run(&self) -> Result<bool> {
        let pending = self.events.pending_for(CONSUMER_NAME, PENDING_THRESHOLD + 1)?;
        if pending.len() >= PENDING_THRESHOLD {
            return Ok(true);
        }
        if pending.iter().any(|e| e.event_type == "session_complete") {
            return Ok(true);
        }
        if pending.len() >= STALE_EVENT_MIN_COUNT {
            if let Some(oldest) = pending.first() {
                let age_hours = (Utc::now() - oldest.at).num_hours();
                if age_hours >= STALE_EVENT_AGE_HOURS {
                    return Ok(true);
                }
            }
        }
        Ok(false)
    }

    /// Consume every event currently pending for this consumer, regardless
    /// of whether [`should_run`](Self::should_run) was checked first. Runs
    /// `decay_pass` and `consolidate_pass` exactly once, after every
    /// pending event has been applied, never more than once per call.
    pub fn run_once(&self) -> Result<LearningReport> {
        let mut report = LearningReport::default();
        loop {
            let batch = self.events.pending_for(CONSUMER_NAME, 256)?;
            if batch.is_empty() {
                break;
            }
            let last_id = batch.last().map(|e| e.event_id).unwrap_or(0);
            for event in &batch {
                self.apply_event(event, &mut report)?;
                report.events_processed += 1;
            }
            self.events.advance(CONSUMER_NAME, last_id)?;
        }

        self.tier2.decay_pass(&self.decay_days)?;
        self.tier2.consolidate_pass()?;

        Ok(report)
    }

    fn apply_event(&self, event: &Event, report: &mut LearningReport) -> Result<()> {
        match event.event_type.as_str() {
            "request_committed" => {
                let agent_key = event.payload.get("agent_key").and_then(|v| v.as_str());
                let trigger = event.payload.get("raw_text").and_then(|v| v.as_str());
                let (Some(agent_key), Some(trigger)) = (agent_key, trigger) else { return Ok(()) };

                if let Some(pattern) = self.tier2.find_pattern_by_exact_trigger(trigger)? {
                    self.tier2.reinforce(&pattern.pattern_id, Outcome::Success)?;
                    self.events.emit(
                        "pattern_reinforced",
                        &serde_json::json!({"pattern_id": pattern.pattern_id, "agent_key": agent_key}),
                    )?;
                    report.patterns_reinforced += 1;
                } else if let Some(pattern) =
                    self.tier2.record_candidate_example(trigger, agent_key)?
                {
                    self.events.emit(
                        "pattern_learned",
                        &serde_json::json!({"pattern_id": pattern.pattern_id, "routes_to": agent_key}),
                    )?;
                    report.patterns_learned += 1;
                }
                Ok(())
            }
            "file_edited" => {
                let files: Vec<String> = event
                    .payload
                    .get("files")
                    .and_then(|v| v.as_array())
                    .map(|arr| arr.iter().filter_map(|f| f.as_str().map(str::to_string)).collect())
                    .unwrap_or_default();
                let total_commits =
                    event.payload.get("total_commits").and_then(|v| v.as_i64()).unwrap_or(files.len() as i64);
                for i in 0..files.len() {
                    for j in (i + 1)..files.len() {
                        self.tier2.record_co_modification(&files[i], &files[j], total_commits)?;
                        report.relationships_updated += 1;
                    }
                }
                Ok(())
            }
            "user_corrected" => {
                let get = |k: &str| event.payload.get(k).and_then(|v| v.as_str()).unwrap_or("");
                if !get("incorrect_value").is_empty() {
                    self.tier2.record_correction(
                        get("correction_type"),
                        get("incorrect_value"),
                        get("correct_value"),
                        get("prevention_strategy"),
                    )?;
                    report.corrections_logged += 1;
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn wire() -> (LearningPipeline, Arc<EventLog>, Arc<KnowledgeGraph>) {
        let dir = tempfile::tempdir().unwrap();
        let events = Arc::new(EventLog::open(&dir.path().join("events.db")).unwrap());
        let tier2 = Arc::new(KnowledgeGraph::open(&dir.path().join("tier2.db")).unwrap());
        std::mem::forget(dir);
        (LearningPipeline::new(events.clone(), tier2.clone()), events, tier2)
    }

    #[test]
    fn does_not_run_below_all_thresholds() {
        let (pipeline, events, _) = wire();
        events.emit("request_committed", &json!({})).unwrap();
        assert!(!pipeline.should_run().unwrap());
    }

    #[test]
    fn runs_once_pending_threshold_reached() {
        let (pipeline, events, _) = wire();
        for _ in 0..PENDING_THRESHOLD {
            events.emit("request_committed", &json!({})).unwrap();
        }
        assert!(pipeline.should_run().unwrap());
    }

    #[test]
    fn session_complete_forces_a_run_regardless_of_count() {
        let (pipeline, events, _) = wire();
        events.emit("session_complete", &json!({})).unwrap();
        assert!(pipeline.should_run().unwrap());
    }

    #[test]
    fn run_once_advances_cursor_past_all_pending() {
        let (pipeline, events, _) = wire();
        events.emit("request_committed", &json!({})).unwrap();
        events.emit("request_committed", &json!({})).unwrap();
        let report = pipeline.run_once().unwrap();
        assert_eq!(report.events_processed, 2);
        assert!(!pipeline.should_run().unwrap());
    }

    #[test]
    fn three_committed_requests_for_the_same_untriggered_agent_learn_a_pattern() {
        let (pipeline, events, tier2) = wire();
        for _ in 0..3 {
            events
                .emit(
                    "request_committed",
                    &json!({"agent_key": "deploy_agent", "raw_text": "push to staging"}),
                )
                .unwrap();
        }
        let report = pipeline.run_once().unwrap();
        assert_eq!(report.patterns_learned, 1);
        assert_eq!(tier2.pattern_count().unwrap(), 1);
    }

    #[test]
    fn committed_request_matching_an_existing_trigger_reinforces_it() {
        let (pipeline, events, tier2) = wire();
        let pattern = tier2
            .learn_pattern(
                crate::tier2::patterns::PatternType::Routing,
                "deploy",
                "",
                "deploy_agent",
                "",
                &["push to staging".into()],
                false,
            )
            .unwrap();
        events
            .emit(
                "request_committed",
                &json!({"agent_key": "deploy_agent", "raw_text": "push to staging"}),
            )
            .unwrap();
        let report = pipeline.run_once().unwrap();
        assert_eq!(report.patterns_reinforced, 1);
        let reloaded = tier2.get_pattern(&pattern.pattern_id).unwrap().unwrap();
        assert_eq!(reloaded.successful_routes, 1);
    }

    #[test]
    fn file_edited_events_update_relationship_counters() {
        let (pipeline, events, tier2) = wire();
        events
            .emit("file_edited", &json!({"files": ["a.rs", "b.rs"], "total_commits": 4}))
            .unwrap();
        let report = pipeline.run_once().unwrap();
        assert_eq!(report.relationships_updated, 1);
        assert!(tier2.get_relationship("a.rs", "b.rs").unwrap().is_some());
    }

    #[test]
    fn user_corrected_events_log_a_correction() {
        let (pipeline, events, tier2) = wire();
        events
            .emit(
                "user_corrected",
                &json!({
                    "correction_type": "wrong_path",
                    "incorrect_value": "src/old.rs",
                    "correct_value": "src/new.rs",
                    "prevention_strategy": "check for recent renames first",
                }),
            )
            .unwrap();
        let report = pipeline.run_once().unwrap();
        assert_eq!(report.corrections_logged, 1);
        assert_eq!(tier2.corrections_for_type("wrong_path").unwrap().len(), 1);
    }
}
