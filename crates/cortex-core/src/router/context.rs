//! Context bundle assembly: the bounded slice of memory handed to a
//! dispatched agent.

use serde::Serialize;
use std::sync::Arc;

use crate::error::Result;
use crate::tier1::{Turn, WorkingMemory};
use crate::tier2::insights::ValidationInsight;
use crate::tier2::patterns::Pattern;
use crate::tier3::DevContext;
use crate::text::tokenize;

pub const DEFAULT_RECENT_TURNS: usize = 5;
pub const DEFAULT_TOP_PATTERNS: usize = 3;

/// One item contributed to the bundle, tagged with the score used to
/// decide what gets truncated first when the token budget is exceeded.
#[derive(Debug, Clone, Serialize)]
pub struct ScoredSnippet {
    pub text: String,
    pub score: f64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ContextBundle {
    pub recent_turns: Vec<Turn>,
    pub relevant_patterns: Vec<Pattern>,
    pub metrics_snapshot: Vec<(String, f64)>,
    pub insights: Vec<ValidationInsight>,
    pub total_tokens: usize,
    pub truncated: bool,
}

/// Insight impact levels at or above which an insight qualifies for
/// inclusion in the bundle.
fn impact_at_least_medium(impact: &str) -> bool {
    matches!(impact.to_lowercase().as_str(), "medium" | "high" | "critical")
}

pub fn assemble(
    raw_text: &str,
    _conversation_id: &str,
    namespace: &str,
    tier1: &Arc<WorkingMemory>,
    tier2: &Arc<crate::tier2::KnowledgeGraph>,
    tier3: &Arc<DevContext>,
    token_budget: usize,
) -> Result<ContextBundle> {
    let recent_turns = tier1.get_recent_turns(DEFAULT_RECENT_TURNS)?;

    let query_tokens = tokenize(raw_text);
    let query_joined = query_tokens.join(" ");
    let scored_patterns = tier2.find_patterns_by_fuzzy_match(&query_joined, 0.0)?;
    let relevant_patterns: Vec<Pattern> = scored_patterns
        .into_iter()
        .take(DEFAULT_TOP_PATTERNS)
        .map(|sp| sp.pattern)
        .collect();

    let metrics_snapshot = tier3.metrics_snapshot(namespace)?;

    let insights: Vec<ValidationInsight> = tier2
        .high_confidence_insights(0.0)?
        .into_iter()
        .filter(|i| impact_at_least_medium(&i.impact))
        .collect();

    let mut snippets: Vec<ScoredSnippet> = Vec::new();
    for (idx, turn) in recent_turns.iter().enumerate() {
        snippets.push(ScoredSnippet { text: turn.content.clone(), score: 1.0 - (idx as f64 * 0.05) });
    }
    for pattern in &relevant_patterns {
        snippets.push(ScoredSnippet { text: pattern.title.clone(), score: pattern.confidence });
    }
    for insight in &insights {
        snippets.push(ScoredSnippet { text: insight.issue.clone(), score: insight.confidence });
    }

    let total_tokens: usize = snippets.iter().map(|s| tokenize(&s.text).len()).sum();
    let truncated = total_tokens > token_budget;

    let bundle = if truncated {
        truncate_lowest_score_first(
            recent_turns,
            relevant_patterns,
            insights,
            metrics_snapshot,
            token_budget,
        )
    } else {
        ContextBundle {
            recent_turns,
            relevant_patterns,
            metrics_snapshot,
            insights,
            total_tokens,
            truncated: false,
        }
    };

    Ok(bundle)
}

/// Drop the lowest-scoring snippets first until the bundle fits the token
/// budget. Turns keep their recency score, patterns and insights keep
/// their confidence; whichever item in the combined pool scores lowest is
/// dropped first.
fn truncate_lowest_score_first(
    mut recent_turns: Vec<Turn>,
    mut relevant_patterns: Vec<Pattern>,
    mut insights: Vec<ValidationInsight>,
    metrics_snapshot: Vec<(String, f64)>,
    token_budget: usize,
) -> ContextBundle {
    #[derive(Clone, Copy)]
    enum Kind {
        Turn,
        Pattern,
        Insight,
    }

    loop {
        let mut candidates: Vec<(Kind, usize, f64, usize)> = Vec::new();
        for (i, t) in recent_turns.iter().enumerate() {
            candidates.push((Kind::Turn, i, 1.0 - (i as f64 * 0.05), tokenize(&t.content).len()));
        }
        for (i, p) in relevant_patterns.iter().enumerate() {
            candidates.push((Kind::Pattern, i, p.confidence, tokenize(&p.title).len()));
        }
        for (i, ins) in insights.iter().enumerate() {
            candidates.push((Kind::Insight, i, ins.confidence, tokenize(&ins.issue).len()));
        }

        let total: usize = candidates.iter().map(|(_, _, _, tokens)| tokens).sum();
        if total <= token_budget || candidates.is_empty() {
            return ContextBundle {
                recent_turns,
                relevant_patterns,
                insights,
                metrics_snapshot,
                total_tokens: total,
                truncated: true,
            };
        }

        let (worst_kind, worst_idx, ..) = *candidates
            .iter()
            .min_by(|a, b| a.2.partial_cmp(&b.2).unwrap())
            .expect("candidates is non-empty");

        match worst_kind {
            Kind::Turn => {
                recent_turns.remove(worst_idx);
            }
            Kind::Pattern => {
                relevant_patterns.remove(worst_idx);
            }
            Kind::Insight => {
                insights.remove(worst_idx);
            }
        }
    }
}
