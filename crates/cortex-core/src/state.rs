//! Process composition root.
//!
//! Wires every tier, the event log, templates, the operation registry, the
//! intent router, and the dispatcher into one `State`, in the fixed
//! dependency order: Tier 0 → Tier 1 → Tier 2 → Tier 3 → Events →
//! Templates → Registry → Router → Dispatcher. Teardown is simply dropping
//! `State`, which runs in reverse field-declaration order.

use std::sync::Arc;

use crate::agents::builtin_agents;
use crate::config::Config;
use crate::dispatcher::{AgentDispatcher, ResponseEnvelope};
use crate::error::Result;
use crate::events::EventLog;
use crate::git::{GitCollaborator, NullGit};
use crate::learning::LearningPipeline;
use crate::registry::OperationRegistry;
use crate::router::IntentRouter;
use crate::templates::{default_templates_yaml, TemplateStore};
use crate::tier0::InstinctStore;
use crate::tier1::WorkingMemory;
use crate::tier2::KnowledgeGraph;
use crate::tier3::DevContext;
use crate::writer::WorkspaceWriter;

/// Namespace used for Tier 3 bookkeeping when a caller doesn't supply one.
/// Every example in this repo is a single-workspace collaborator, so one
/// fixed namespace is the common case; a future multi-workspace host can
/// thread a real namespace through `process_request` once it exists.
pub const DEFAULT_NAMESPACE: &str = "default";

/// Conversation id used when a caller has no session to resume. Each such
/// call starts a fresh, unrelated conversation.
fn fresh_conversation_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

pub struct State {
    pub config: Config,
    pub instinct: Arc<InstinctStore>,
    pub tier1: Arc<WorkingMemory>,
    pub tier2: Arc<KnowledgeGraph>,
    pub tier3: Arc<DevContext>,
    pub events: Arc<EventLog>,
    pub templates: Arc<TemplateStore>,
    pub registry: Arc<OperationRegistry>,
    pub router: Arc<IntentRouter>,
    pub dispatcher: Arc<AgentDispatcher>,
    pub learning: Arc<LearningPipeline>,
}

impl State {
    pub fn init(config: Config) -> Result<Self> {
        let instinct = Arc::new(InstinctStore::load(&config.instinct_path())?);
        let tier1 = Arc::new(WorkingMemory::open(&config.tier1_path(), config.capacity_tier1)?);
        let tier2 = Arc::new(KnowledgeGraph::open(&config.tier2_path())?);
        let tier3 = Arc::new(DevContext::open(&config.tier3_path())?);
        let events = Arc::new(EventLog::open(&config.events_path())?);

        let templates_path = config.brain_dir.join("templates.yaml");
        let templates = Arc::new(if templates_path.exists() {
            TemplateStore::load(&templates_path)?
        } else {
            TemplateStore::from_yaml(default_templates_yaml())?
        });

        let registry = Arc::new(OperationRegistry::new());

        let router = Arc::new(IntentRouter::new(
            tier1.clone(),
            tier2.clone(),
            tier3.clone(),
            registry.clone(),
            templates.clone(),
            config.token_budget,
            config.min_token_overlap,
        ));

        let writer = WorkspaceWriter::new(config.brain_dir.clone());
        let git: Box<dyn GitCollaborator> = Box::new(NullGit);
        let dispatcher = Arc::new(
            AgentDispatcher::new(
                instinct.clone(),
                tier1.clone(),
                router.clone(),
                builtin_agents(),
                templates.clone(),
                writer,
                git,
            )
            .with_request_deadline_ms(config.request_deadline_ms),
        );

        let learning = Arc::new(
            LearningPipeline::new(events.clone(), tier2.clone())
                .with_decay_schedule(config.decay_days),
        );

        tracing::info!(brain_dir = %config.brain_dir.display(), "cortex state initialized");

        Ok(Self {
            config,
            instinct,
            tier1,
            tier2,
            tier3,
            events,
            templates,
            registry,
            router,
            dispatcher,
            learning,
        })
    }

    /// The single entry point a collaborator calls: dispatch `raw_text`
    /// through the full pipeline and return the envelope it produces.
    ///
    /// `session_hint` identifies the conversation to append to; when absent
    /// a new conversation is started. Every call runs against
    /// [`DEFAULT_NAMESPACE`] - this process model supports one workspace
    /// per `State`, so there is only ever one Tier 3 namespace in play.
    ///
    /// After the request commits, the learning pipeline is given a chance
    /// to run if its thresholds are met. A learning-pipeline failure is
    /// logged but never fails the request it rode in on.
    pub fn process_request(
        &self,
        raw_text: &str,
        session_hint: Option<&str>,
    ) -> Result<ResponseEnvelope> {
        let conversation_id = session_hint.map(str::to_string).unwrap_or_else(fresh_conversation_id);

        let envelope =
            self.dispatcher.dispatch(raw_text, &conversation_id, DEFAULT_NAMESPACE, &self.events)?;

        match self.learning.should_run() {
            Ok(true) => {
                if let Err(err) = self.learning.run_once() {
                    tracing::warn!(error = %err, "learning pipeline run failed");
                }
            }
            Ok(false) => {}
            Err(err) => tracing::warn!(error = %err, "learning pipeline should_run check failed"),
        }

        Ok(envelope)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initializes_every_tier_from_a_fresh_brain_dir() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::from_env();
        config.brain_dir = dir.path().to_path_buf();
        let state = State::init(config).unwrap();
        assert_eq!(state.tier1.conversation_count().unwrap(), 0);
        assert_eq!(state.tier2.pattern_count().unwrap(), 0);
    }

    #[test]
    fn process_request_commits_and_starts_a_fresh_conversation_without_a_hint() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::from_env();
        config.brain_dir = dir.path().to_path_buf();
        let state = State::init(config).unwrap();

        let envelope = state.process_request("can you help me plan the rollout", None).unwrap();
        assert_eq!(envelope.state, crate::dispatcher::RequestState::Committed);
        assert_eq!(state.tier1.conversation_count().unwrap(), 1);
    }

    #[test]
    fn process_request_reuses_the_conversation_named_by_the_session_hint() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::from_env();
        config.brain_dir = dir.path().to_path_buf();
        let state = State::init(config).unwrap();

        state.process_request("can you help me plan the rollout", Some("session-1")).unwrap();
        state.process_request("what's next", Some("session-1")).unwrap();

        assert_eq!(state.tier1.conversation_count().unwrap(), 1);
    }
}
