//! Agent Dispatcher (C9)
//!
//! Drives one request through its full lifecycle: routed, checked against
//! Tier 0 rules before and after execution, executed by the matching
//! agent, rendered, and either emitted or blocked.

use std::sync::Arc;
use uuid::Uuid;

use crate::agents::{Agent, AgentResult, Effect};
use crate::error::{CortexError, Result};
use crate::events::EventLog;
use crate::formatter::{format_response, ResponseParts};
use crate::git::GitCollaborator;
use crate::protection::{PreDispatchContext, PreEmitContext, ProtectionKernel, Verdict};
use crate::router::{ContextBundle, IntentKind, IntentRouter, RouteConfidence};
use crate::templates::{self, TemplateStore};
use crate::tier0::InstinctStore;
use crate::tier1::{Role, WorkingMemory};
use crate::writer::WorkspaceWriter;

/// The request lifecycle. Every request passes through the non-terminal
/// states in order; `Blocked` and `Failed` are terminal and can be reached
/// from any non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestState {
    Parsed,
    Routed,
    Executing,
    Rendering,
    Emitted,
    Committed,
    Blocked,
    Failed,
}

/// The `process_request` return value named in §6: rendered text plus the
/// routing/rendering diagnostics a collaborator needs to log or surface
/// without re-deriving them from the text.
#[derive(Debug, Clone)]
pub struct ResponseEnvelope {
    pub trace_id: Uuid,
    pub text: String,
    pub state: RequestState,
    pub intent: IntentKind,
    pub agent_id: String,
    pub template_id: Option<String>,
    pub suggest_confirm: bool,
    /// Non-blocking rule warnings collected from both protection stages.
    pub warnings: Vec<String>,
    /// One-line human-readable description per effect the agent applied.
    pub effects_summary: Vec<String>,
}

/// Default per-request deadline when a dispatcher is built without an
/// explicit one (only exercised by tests that construct `AgentDispatcher`
/// directly rather than through `State::init`).
const DEFAULT_DEADLINE_MS: u64 = 60_000;

pub struct AgentDispatcher {
    instinct: Arc<InstinctStore>,
    tier1: Arc<WorkingMemory>,
    router: Arc<IntentRouter>,
    agents: Vec<Arc<dyn Agent>>,
    templates: Arc<TemplateStore>,
    writer: WorkspaceWriter,
    git: Box<dyn GitCollaborator>,
    request_deadline_ms: u64,
}

impl AgentDispatcher {
    pub fn new(
        instinct: Arc<InstinctStore>,
        tier1: Arc<WorkingMemory>,
        router: Arc<IntentRouter>,
        agents: Vec<Arc<dyn Agent>>,
        templates: Arc<TemplateStore>,
        writer: WorkspaceWriter,
        git: Box<dyn GitCollaborator>,
    ) -> Self {
        Self { instinct, tier1, router, agents, templates, writer, git, request_deadline_ms: DEFAULT_DEADLINE_MS }
    }

    /// Override the per-request deadline used by [`Self::execute_with_deadline`].
    /// An agent that hasn't returned within 2x this value is cancelled.
    pub fn with_request_deadline_ms(mut self, request_deadline_ms: u64) -> Self {
        self.request_deadline_ms = request_deadline_ms;
        self
    }

    /// Resolve the agent's `template_hint` (falling back to `fallback`) and
    /// fold its rendered content into `parts.response`. A missing template
    /// leaves the response untouched - an empty `TemplateStore` must not
    /// turn a working agent response into an error.
    fn apply_template(&self, result: &AgentResult) -> ResponseParts {
        let mut parts = result.parts.clone();
        let template_id = result.template_hint.as_deref().unwrap_or("fallback");
        if let Some(template) = self.templates.get(template_id) {
            let mut vars = std::collections::BTreeMap::new();
            vars.insert("response".to_string(), parts.response.clone());
            parts.response = templates::render(template, &vars);
        } else {
            tracing::warn!(template_id, "template missing, falling back to the agent's unrendered response");
        }
        parts
    }

    /// Run `agent.execute` on a detached worker thread, giving it up to
    /// 2x [`Self::request_deadline_ms`] before giving up and returning
    /// [`CortexError::Cancelled`]. The agent trait is synchronous, so a
    /// cooperative context handle isn't available to it; an agent that
    /// truly never returns leaves its thread running orphaned rather than
    /// being force-killed - Rust has no safe API for that. Every built-in
    /// agent is a bounded, side-effect-free computation, so this path is
    /// exercised only by pathological or future long-running agents.
    fn execute_with_deadline(
        &self,
        agent: Arc<dyn Agent>,
        raw_text: &str,
        context: &ContextBundle,
    ) -> Result<AgentResult> {
        let (tx, rx) = std::sync::mpsc::channel();
        let owned_text = raw_text.to_string();
        let owned_context = context.clone();
        std::thread::spawn(move || {
            let _ = tx.send(agent.execute(&owned_text, &owned_context));
        });

        let limit = std::time::Duration::from_millis(self.request_deadline_ms.saturating_mul(2));
        match rx.recv_timeout(limit) {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(
                    deadline_ms = self.request_deadline_ms,
                    "agent exceeded 2x its deadline, cancelling"
                );
                Err(CortexError::Cancelled)
            }
        }
    }

    pub fn dispatch(
        &self,
        raw_text: &str,
        conversation_id: &str,
        namespace: &str,
        events: &EventLog,
    ) -> Result<ResponseEnvelope> {
        let trace_id = Uuid::new_v4();
        let kernel = ProtectionKernel::new(&self.instinct);
        let mut warnings = Vec::new();

        // Parsed -> pre-dispatch protection check.
        let pre_dispatch_verdict = kernel.evaluate_pre_dispatch(&PreDispatchContext {
            raw_text: raw_text.to_string(),
            definition_of_ready_score: None,
        });
        match pre_dispatch_verdict {
            Verdict::Block { rule_id, reason, alternatives } => {
                events.emit("request_blocked", &serde_json::json!({"rule_id": rule_id, "stage": "pre_dispatch"}))?;
                return Err(CortexError::blocked(rule_id, reason, alternatives));
            }
            Verdict::Warn { rule_id, reason } => warnings.push(format!("{rule_id}: {reason}")),
            Verdict::Pass => {}
        }

        // A 4th conversation can already push Tier 1 over capacity on this
        // very first append (the user turn), so the eviction this call
        // reports - if any - must be captured here rather than assumed to
        // only ever happen on the later assistant-turn append below.
        let evicted_on_user_turn = self.tier1.append_turn(conversation_id, Role::User, raw_text)?;

        // Routed.
        let decision = self.router.route(raw_text, conversation_id, namespace)?;
        crate::router::record_routing_event(events, &decision)?;

        // Executing.
        let agent = self
            .agents
            .iter()
            .find(|a| a.key() == decision.agent_key)
            .or_else(|| self.agents.iter().find(|a| a.can_handle(decision.intent)))
            .cloned()
            .ok_or_else(|| CortexError::AgentFailed(format!("no agent registered for {}", decision.agent_key)))?;

        let result = self.execute_with_deadline(agent, raw_text, &decision.context)?;
        let parts = self.apply_template(&result);

        // Rendering.
        let text = self.render(&parts, trace_id);

        // Pre-emit protection check.
        let write_paths: Vec<_> = result
            .effects
            .iter()
            .filter_map(|e| match e {
                Effect::WriteFile { path, .. } => Some(path.clone()),
                Effect::DeleteCoreMemory { .. } => None,
            })
            .collect();
        let deletes_core_memory =
            result.effects.iter().any(|e| matches!(e, Effect::DeleteCoreMemory { .. }));

        let pre_emit_verdict = kernel.evaluate_pre_emit(&PreEmitContext {
            response_text: text.clone(),
            write_paths,
            deletes_core_memory,
        });
        match pre_emit_verdict {
            Verdict::Block { rule_id, reason, alternatives } => {
                events.emit("request_blocked", &serde_json::json!({"rule_id": rule_id, "stage": "pre_emit"}))?;
                return Err(CortexError::blocked(rule_id, reason, alternatives));
            }
            Verdict::Warn { rule_id, reason } => warnings.push(format!("{rule_id}: {reason}")),
            Verdict::Pass => {}
        }

        let effects_summary: Vec<String> = result.effects.iter().map(describe_effect).collect();

        // Emitted -> apply effects -> Committed.
        self.apply_effects(&result.effects)?;
        let evicted_on_assistant_turn =
            self.tier1.append_turn(conversation_id, Role::Assistant, &text)?;
        if let Some(evicted) = evicted_on_user_turn.or(evicted_on_assistant_turn) {
            events.emit(
                "conversation_evicted",
                &serde_json::json!({
                    "conversation_id": evicted.conversation_id,
                    "message_count": evicted.message_count,
                }),
            )?;
        }

        events.emit(
            "request_committed",
            &serde_json::json!({
                "trace_id": trace_id.to_string(),
                "agent_key": decision.agent_key,
                "raw_text": raw_text,
            }),
        )?;

        if decision.agent_key == "feedback_agent" {
            events.emit(
                "feedback_recorded",
                &serde_json::json!({"trace_id": trace_id.to_string()}),
            )?;
        }

        Ok(ResponseEnvelope {
            trace_id,
            text,
            state: RequestState::Committed,
            intent: decision.intent,
            agent_id: decision.agent_key,
            template_id: result.template_hint,
            suggest_confirm: decision.confidence == RouteConfidence::SuggestConfirm,
            warnings,
            effects_summary,
        })
    }

    fn render(&self, parts: &ResponseParts, trace_id: Uuid) -> String {
        format_response(parts, &trace_id)
    }

    fn apply_effects(&self, effects: &[Effect]) -> Result<()> {
        for effect in effects {
            match effect {
                Effect::WriteFile { path, content } => {
                    let written = self.writer.write(path, content)?;
                    self.git.stage(&[written])?;
                }
                Effect::DeleteCoreMemory { .. } => {
                    // Reaching here means the pre-emit check already passed,
                    // which only happens when no_core_amnesia is absent
                    // from the active rule set. Nothing to apply by
                    // default: deletion requires an explicit operator-side
                    // handler, which this core does not ship.
                }
            }
        }
        Ok(())
    }
}

fn describe_effect(effect: &Effect) -> String {
    match effect {
        Effect::WriteFile { path, .. } => format!("wrote {}", path.display()),
        Effect::DeleteCoreMemory { description } => format!("requested core memory deletion: {description}"),
    }
}
