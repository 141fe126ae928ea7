//! Intent Router (C8)
//!
//! Classifies an incoming request and assembles the bounded context bundle
//! the dispatched agent receives. Four-stage algorithm, each stage tried in
//! order until one produces a decision: exact trigger match, keyword scan,
//! fuzzy pattern lookup, fallback.

mod context;
mod keywords;

pub use context::{ContextBundle, ScoredSnippet};
pub use keywords::IntentKind;

use std::sync::Arc;

use crate::error::Result;
use crate::events::EventLog;
use crate::registry::OperationRegistry;
use crate::templates::TemplateStore;
use crate::tier1::WorkingMemory;
use crate::tier2::KnowledgeGraph;
use crate::tier3::DevContext;

pub const AUTO_ROUTE_THRESHOLD: f64 = 0.85;
pub const SUGGEST_CONFIRM_THRESHOLD: f64 = 0.70;

/// How sure the router is that `agent_key` is the right handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteConfidence {
    /// Exact trigger or keyword match, or a pattern at or above
    /// [`AUTO_ROUTE_THRESHOLD`].
    High,
    /// A pattern between [`SUGGEST_CONFIRM_THRESHOLD`] and
    /// [`AUTO_ROUTE_THRESHOLD`]; the dispatcher should surface this as a
    /// suggestion rather than acting unilaterally.
    SuggestConfirm,
    /// No registry, keyword, or pattern match; routed to the fallback agent.
    Fallback,
}

#[derive(Debug, Clone)]
pub struct RoutingDecision {
    pub intent: IntentKind,
    pub agent_key: String,
    pub confidence: RouteConfidence,
    pub context: ContextBundle,
}

pub struct IntentRouter {
    tier1: Arc<WorkingMemory>,
    tier2: Arc<KnowledgeGraph>,
    tier3: Arc<DevContext>,
    registry: Arc<OperationRegistry>,
    templates: Arc<TemplateStore>,
    token_budget: usize,
    min_token_overlap: f64,
}

impl IntentRouter {
    pub fn new(
        tier1: Arc<WorkingMemory>,
        tier2: Arc<KnowledgeGraph>,
        tier3: Arc<DevContext>,
        registry: Arc<OperationRegistry>,
        templates: Arc<TemplateStore>,
        token_budget: usize,
        min_token_overlap: f64,
    ) -> Self {
        Self { tier1, tier2, tier3, registry, templates, token_budget, min_token_overlap }
    }

    pub fn route(
        &self,
        raw_text: &str,
        conversation_id: &str,
        namespace: &str,
    ) -> Result<RoutingDecision> {
        let (intent, agent_key, confidence) = self.classify(raw_text)?;
        let context = self.assemble_context(raw_text, conversation_id, namespace)?;
        Ok(RoutingDecision { intent, agent_key, confidence, context })
    }

    fn classify(&self, raw_text: &str) -> Result<(IntentKind, String, RouteConfidence)> {
        if let Some((intent, agent_key)) = self.trigger_match(raw_text) {
            return Ok((intent, agent_key, RouteConfidence::High));
        }

        if let Some(intent) = keywords::scan(raw_text) {
            let agent_key = intent.default_agent_key().to_string();
            return Ok((intent, agent_key, RouteConfidence::High));
        }

        let matches = self.tier2.find_patterns_by_fuzzy_match(raw_text, self.min_token_overlap)?;
        if let Some(top) = matches.first() {
            if top.pattern.confidence >= AUTO_ROUTE_THRESHOLD {
                return Ok((
                    IntentKind::General,
                    top.pattern.routes_to.clone(),
                    RouteConfidence::High,
                ));
            }
            if top.pattern.confidence >= SUGGEST_CONFIRM_THRESHOLD {
                return Ok((
                    IntentKind::General,
                    top.pattern.routes_to.clone(),
                    RouteConfidence::SuggestConfirm,
                ));
            }
        }

        Ok((IntentKind::General, IntentKind::General.default_agent_key().to_string(), RouteConfidence::Fallback))
    }

    /// Stage 1: exact trigger match against the Operation Registry and the
    /// Template Loader together, longest trigger wins. A tie is broken in
    /// the registry's favor since only operations carry a priority field.
    fn trigger_match(&self, raw_text: &str) -> Option<(IntentKind, String)> {
        let op_hit = self
            .registry
            .longest_trigger_match(raw_text)
            .map(|(len, op)| (len, op.intent, op.key.clone()));
        let tpl_hit = self.templates.longest_trigger_match(raw_text).map(|(len, tpl)| {
            let intent = tpl.intent.unwrap_or(IntentKind::General);
            (len, intent, intent.default_agent_key().to_string())
        });

        match (op_hit, tpl_hit) {
            (Some((olen, ointent, okey)), Some((tlen, tintent, tkey))) => {
                if tlen > olen {
                    Some((tintent, tkey))
                } else {
                    Some((ointent, okey))
                }
            }
            (Some((_, ointent, okey)), None) => Some((ointent, okey)),
            (None, Some((_, tintent, tkey))) => Some((tintent, tkey)),
            (None, None) => None,
        }
    }

    fn assemble_context(
        &self,
        raw_text: &str,
        conversation_id: &str,
        namespace: &str,
    ) -> Result<ContextBundle> {
        context::assemble(
            raw_text,
            conversation_id,
            namespace,
            &self.tier1,
            &self.tier2,
            &self.tier3,
            self.token_budget,
        )
    }
}

/// Emitted to the event log whenever a routing decision is made, so the
/// learning pipeline can later correlate outcomes with the pattern or
/// keyword that produced them.
pub fn record_routing_event(events: &EventLog, decision: &RoutingDecision) -> Result<i64> {
    events.emit(
        "request_routed",
        &serde_json::json!({
            "intent": format!("{:?}", decision.intent),
            "agent_key": decision.agent_key,
            "confidence": format!("{:?}", decision.confidence),
        }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tier2::patterns::PatternType;

    fn wire() -> (IntentRouter, Arc<KnowledgeGraph>) {
        let dir = tempfile::tempdir().unwrap();
        std::mem::forget(dir.path().to_path_buf());
        let tier1 = Arc::new(WorkingMemory::open(&dir.path().join("t1.db"), 70).unwrap());
        let tier2 = Arc::new(KnowledgeGraph::open(&dir.path().join("t2.db")).unwrap());
        let tier3 = Arc::new(DevContext::open(&dir.path().join("t3.db")).unwrap());
        let registry = Arc::new(OperationRegistry::new());
        let templates = Arc::new(TemplateStore::from_yaml(crate::templates::default_templates_yaml()).unwrap());
        std::mem::forget(dir);
        let router =
            IntentRouter::new(tier1, tier2.clone(), tier3, registry, templates, 600, 0.34);
        (router, tier2)
    }

    #[test]
    fn bare_help_trigger_routes_via_the_template_store() {
        let (router, _) = wire();
        let decision = router.route("help", "c1", "default").unwrap();
        assert_eq!(decision.intent, IntentKind::Help);
        assert_eq!(decision.agent_key, "help_agent");
        assert_eq!(decision.confidence, RouteConfidence::High);
    }

    #[test]
    fn keyword_scan_routes_plan_requests() {
        let (router, _) = wire();
        let decision = router.route("can you help me plan the migration", "c1", "default").unwrap();
        assert_eq!(decision.intent, IntentKind::Plan);
        assert_eq!(decision.confidence, RouteConfidence::High);
    }

    #[test]
    fn unrecognized_text_falls_back() {
        let (router, _) = wire();
        let decision = router.route("zzz qqq unrelated gibberish", "c1", "default").unwrap();
        assert_eq!(decision.confidence, RouteConfidence::Fallback);
    }

    #[test]
    fn high_confidence_pattern_auto_routes() {
        let (router, tier2) = wire();
        let pattern = tier2
            .learn_pattern(
                PatternType::Routing,
                "deploy",
                "",
                "deploy_agent",
                "",
                &["push to staging".into()],
                false,
            )
            .unwrap();
        for _ in 0..20 {
            tier2.reinforce(&pattern.pattern_id, crate::tier2::Outcome::Success).unwrap();
        }
        let decision = router.route("push to staging now", "c1", "default").unwrap();
        assert_eq!(decision.agent_key, "deploy_agent");
        assert_eq!(decision.confidence, RouteConfidence::High);
    }
}
