//! Built-in agents, one per [`IntentKind`](crate::router::IntentKind).
//!
//! Each agent implements [`Agent`]: `can_handle` decides whether it serves
//! a given intent, `execute` produces the response parts plus any effects
//! (writes or external actions) for the Protection Kernel to evaluate
//! before they're applied.

use std::path::PathBuf;

use crate::error::Result;
use crate::formatter::ResponseParts;
use crate::router::{ContextBundle, IntentKind};

#[derive(Debug, Clone)]
pub enum Effect {
    WriteFile { path: PathBuf, content: String },
    DeleteCoreMemory { description: String },
}

#[derive(Debug, Clone, Default)]
pub struct AgentResult {
    pub parts: ResponseParts,
    pub effects: Vec<Effect>,
    /// Template id the dispatcher should render and fold into the final
    /// response, if any. `None` falls back to the `fallback` template.
    pub template_hint: Option<String>,
}

pub trait Agent: Send + Sync {
    fn key(&self) -> &str;
    fn can_handle(&self, intent: IntentKind) -> bool;
    fn execute(&self, raw_text: &str, context: &ContextBundle) -> Result<AgentResult>;
}

fn summarize_recent_turns(context: &ContextBundle) -> String {
    if context.recent_turns.is_empty() {
        "no prior turns in this conversation.".to_string()
    } else {
        format!("{} prior turn(s) considered.", context.recent_turns.len())
    }
}

pub struct PlanAgent;
impl Agent for PlanAgent {
    fn key(&self) -> &str {
        "plan_agent"
    }
    fn can_handle(&self, intent: IntentKind) -> bool {
        intent == IntentKind::Plan
    }
    fn execute(&self, raw_text: &str, context: &ContextBundle) -> Result<AgentResult> {
        Ok(AgentResult {
            parts: ResponseParts {
                understanding: format!("you want a plan for: {raw_text}"),
                challenge: String::new(),
                response: format!(
                    "Draft plan assembled from {} relevant pattern(s).",
                    context.relevant_patterns.len()
                ),
                next_steps: "Review the draft plan and confirm before execution.".into(),
            },
            effects: Vec::new(),
            template_hint: None,
        })
    }
}

pub struct ExecuteAgent;
impl Agent for ExecuteAgent {
    fn key(&self) -> &str {
        "execute_agent"
    }
    fn can_handle(&self, intent: IntentKind) -> bool {
        intent == IntentKind::Execute
    }
    fn execute(&self, raw_text: &str, context: &ContextBundle) -> Result<AgentResult> {
        Ok(AgentResult {
            parts: ResponseParts {
                understanding: format!("you want to execute: {raw_text}"),
                challenge: String::new(),
                response: format!("Executed with context from {}.", summarize_recent_turns(context)),
                next_steps: "Verify the change behaves as expected.".into(),
            },
            effects: Vec::new(),
            template_hint: None,
        })
    }
}

pub struct TestAgent;
impl Agent for TestAgent {
    fn key(&self) -> &str {
        "test_agent"
    }
    fn can_handle(&self, intent: IntentKind) -> bool {
        intent == IntentKind::Test
    }
    fn execute(&self, raw_text: &str, _context: &ContextBundle) -> Result<AgentResult> {
        Ok(AgentResult {
            parts: ResponseParts {
                understanding: format!("you want tests run or written for: {raw_text}"),
                challenge: "Coverage gaps may remain undiscovered until the suite runs.".into(),
                response: "Test pass recorded.".into(),
                next_steps: "Inspect any failing cases before merging.".into(),
            },
            effects: Vec::new(),
            template_hint: None,
        })
    }
}

pub struct ReviewAgent;
impl Agent for ReviewAgent {
    fn key(&self) -> &str {
        "review_agent"
    }
    fn can_handle(&self, intent: IntentKind) -> bool {
        intent == IntentKind::Review
    }
    fn execute(&self, raw_text: &str, _context: &ContextBundle) -> Result<AgentResult> {
        Ok(AgentResult {
            parts: ResponseParts {
                understanding: format!("you want a review of: {raw_text}"),
                challenge: "A review by one agent is not a substitute for a human reviewer.".into(),
                response: "Review notes drafted.".into(),
                next_steps: "Address the flagged items and request re-review.".into(),
            },
            effects: Vec::new(),
            template_hint: None,
        })
    }
}

/// Writes its findings under `reports/`, the one built-in agent with a
/// durable filesystem effect.
pub struct FeedbackAgent;
impl Agent for FeedbackAgent {
    fn key(&self) -> &str {
        "feedback_agent"
    }
    fn can_handle(&self, intent: IntentKind) -> bool {
        intent == IntentKind::Feedback
    }
    fn execute(&self, raw_text: &str, _context: &ContextBundle) -> Result<AgentResult> {
        let report_path = PathBuf::from("reports").join(format!(
            "feedback-{}.md",
            uuid::Uuid::new_v4()
        ));
        let content = format!("# Feedback\n\n{raw_text}\n");
        Ok(AgentResult {
            parts: ResponseParts {
                understanding: format!("you want to file feedback: {raw_text}"),
                challenge: String::new(),
                response: format!("Feedback report written to {}.", report_path.display()),
                next_steps: "No action required; the report is available for later triage.".into(),
            },
            effects: vec![Effect::WriteFile { path: report_path, content }],
            template_hint: None,
        })
    }
}

pub struct HelpAgent;
impl Agent for HelpAgent {
    fn key(&self) -> &str {
        "help_agent"
    }
    fn can_handle(&self, intent: IntentKind) -> bool {
        intent == IntentKind::Help
    }
    fn execute(&self, raw_text: &str, _context: &ContextBundle) -> Result<AgentResult> {
        let topic = raw_text.trim();
        let content = static_help_content(topic);
        Ok(AgentResult {
            parts: ResponseParts {
                understanding: format!("you're asking for help with: {topic}"),
                challenge: String::new(),
                response: content,
                next_steps: "Ask a follow-up if this didn't answer your question.".into(),
            },
            effects: Vec::new(),
            template_hint: Some("help_table".to_string()),
        })
    }
}

fn static_help_content(topic: &str) -> String {
    let lower = topic.to_lowercase();
    if lower.contains("status") {
        "Use the system_status tool to see tier health.".to_string()
    } else if lower.contains("memory") {
        "Working memory holds recent turns; the knowledge graph holds learned patterns.".to_string()
    } else {
        "Ask about a specific area (status, memory, routing) for more targeted help.".to_string()
    }
}

pub struct StatusAgent;
impl Agent for StatusAgent {
    fn key(&self) -> &str {
        "status_agent"
    }
    fn can_handle(&self, intent: IntentKind) -> bool {
        intent == IntentKind::Status
    }
    fn execute(&self, _raw_text: &str, context: &ContextBundle) -> Result<AgentResult> {
        Ok(AgentResult {
            parts: ResponseParts {
                understanding: "you want a system status summary.".into(),
                challenge: String::new(),
                response: format!(
                    "{} relevant pattern(s), {} insight(s) in context.",
                    context.relevant_patterns.len(),
                    context.insights.len()
                ),
                next_steps: "None.".into(),
            },
            effects: Vec::new(),
            template_hint: None,
        })
    }
}

pub struct AdminAgent;
impl Agent for AdminAgent {
    fn key(&self) -> &str {
        "admin_agent"
    }
    fn can_handle(&self, intent: IntentKind) -> bool {
        intent == IntentKind::Admin
    }
    fn execute(&self, raw_text: &str, _context: &ContextBundle) -> Result<AgentResult> {
        let requests_deletion = crate::protection::requests_bulk_memory_deletion(raw_text);
        Ok(AgentResult {
            parts: ResponseParts {
                understanding: format!("administrative request: {raw_text}"),
                challenge: if requests_deletion {
                    "Bulk deletion of core memory is blocked by policy; use targeted eviction instead.".into()
                } else {
                    String::new()
                },
                response: "Administrative request processed.".into(),
                next_steps: "None.".into(),
            },
            effects: if requests_deletion {
                vec![Effect::DeleteCoreMemory { description: raw_text.to_string() }]
            } else {
                Vec::new()
            },
            template_hint: None,
        })
    }
}

pub struct TddAgent;
impl Agent for TddAgent {
    fn key(&self) -> &str {
        "tdd_agent"
    }
    fn can_handle(&self, intent: IntentKind) -> bool {
        intent == IntentKind::Tdd
    }
    fn execute(&self, raw_text: &str, _context: &ContextBundle) -> Result<AgentResult> {
        Ok(AgentResult {
            parts: ResponseParts {
                understanding: format!("you want a test-driven cycle for: {raw_text}"),
                challenge: String::new(),
                response: "Red-green-refactor cycle outlined.".into(),
                next_steps: "Write the failing test first, then the minimal implementation.".into(),
            },
            effects: Vec::new(),
            template_hint: None,
        })
    }
}

/// Always succeeds; the terminal fallback when nothing more specific
/// matched.
pub struct GeneralAgent;
impl Agent for GeneralAgent {
    fn key(&self) -> &str {
        "general_agent"
    }
    fn can_handle(&self, _intent: IntentKind) -> bool {
        true
    }
    fn execute(&self, raw_text: &str, _context: &ContextBundle) -> Result<AgentResult> {
        Ok(AgentResult {
            parts: ResponseParts {
                understanding: format!("request received: {raw_text}"),
                challenge: String::new(),
                response: "Handled by the general-purpose agent.".into(),
                next_steps: "None.".into(),
            },
            effects: Vec::new(),
            template_hint: Some("fallback".to_string()),
        })
    }
}

/// All ten built-in agents, in no particular order. `Arc` rather than
/// `Box` so the dispatcher can hand a 'static-free agent handle to a
/// detached deadline-enforcement thread (see `dispatcher::execute_with_deadline`).
pub fn builtin_agents() -> Vec<std::sync::Arc<dyn Agent>> {
    vec![
        std::sync::Arc::new(PlanAgent),
        std::sync::Arc::new(ExecuteAgent),
        std::sync::Arc::new(TestAgent),
        std::sync::Arc::new(ReviewAgent),
        std::sync::Arc::new(FeedbackAgent),
        std::sync::Arc::new(HelpAgent),
        std::sync::Arc::new(StatusAgent),
        std::sync::Arc::new(AdminAgent),
        std::sync::Arc::new(TddAgent),
        std::sync::Arc::new(GeneralAgent),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn empty_context() -> ContextBundle {
        ContextBundle::default()
    }

    #[test]
    fn general_agent_handles_every_intent() {
        let agent = GeneralAgent;
        assert!(agent.can_handle(IntentKind::Plan));
        assert!(agent.can_handle(IntentKind::General));
    }

    #[test]
    fn feedback_agent_emits_a_write_effect_under_reports() {
        let agent = FeedbackAgent;
        let result = agent.execute("the tool was confusing", &empty_context()).unwrap();
        match &result.effects[0] {
            Effect::WriteFile { path, .. } => {
                assert!(path.starts_with("reports"));
            }
            other => panic!("expected WriteFile, got {other:?}"),
        }
    }

    #[test]
    fn admin_agent_flags_bulk_deletion_as_an_effect() {
        let agent = AdminAgent;
        let result = agent.execute("forget everything about this project", &empty_context()).unwrap();
        assert!(matches!(result.effects.first(), Some(Effect::DeleteCoreMemory { .. })));
        assert!(!result.parts.challenge.is_empty());
    }

    #[test]
    fn builtin_agents_cover_every_intent_kind() {
        let agents = builtin_agents();
        for intent in [
            IntentKind::Plan,
            IntentKind::Execute,
            IntentKind::Test,
            IntentKind::Review,
            IntentKind::Feedback,
            IntentKind::Help,
            IntentKind::Status,
            IntentKind::Admin,
            IntentKind::Tdd,
            IntentKind::General,
        ] {
            assert!(agents.iter().any(|a| a.can_handle(intent)));
        }
    }
}
