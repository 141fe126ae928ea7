//! Protection Kernel (C7)
//!
//! Evaluates Tier 0 rules against a request before dispatch and a response
//! before it is emitted. Every rule in the instinct store runs; the
//! predicate named on the rule decides whether it applies to the context in
//! hand. Unrecognized predicate names are skipped with a warning rather
//! than failing the request, so an operator-supplied rule file referencing
//! a predicate this binary doesn't implement degrades safely.

use std::path::PathBuf;

use crate::error::Alternative;
use crate::tier0::{InstinctStore, Rule, Severity};

/// The result of evaluating one or more rules.
#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    Pass,
    Warn { rule_id: String, reason: String },
    Block { rule_id: String, reason: String, alternatives: Vec<Alternative> },
}

impl Verdict {
    pub fn is_blocked(&self) -> bool {
        matches!(self, Verdict::Block { .. })
    }

    /// Combine with another verdict, keeping the more severe of the two
    /// (`Block` > `Warn` > `Pass`).
    fn then(self, other: Verdict) -> Verdict {
        match (&self, &other) {
            (Verdict::Block { .. }, _) => self,
            (_, Verdict::Block { .. }) => other,
            (Verdict::Warn { .. }, _) => self,
            (_, Verdict::Warn { .. }) => other,
            _ => Verdict::Pass,
        }
    }
}

/// What the dispatcher is about to do, evaluated before routing begins.
#[derive(Debug, Clone, Default)]
pub struct PreDispatchContext {
    pub raw_text: String,
    /// 0.0-1.0 estimate of how well-specified a planning request is.
    /// `None` when the request isn't plan-shaped.
    pub definition_of_ready_score: Option<f64>,
}

/// What the dispatcher is about to emit or do, evaluated before commit.
#[derive(Debug, Clone, Default)]
pub struct PreEmitContext {
    pub response_text: String,
    /// Filesystem paths the response's action would write to, if any.
    pub write_paths: Vec<PathBuf>,
    /// True if the action would delete Tier 1 or Tier 2 rows with no
    /// recovery path (e.g. dropping a table rather than evicting rows).
    pub deletes_core_memory: bool,
}

pub struct ProtectionKernel<'a> {
    instinct: &'a InstinctStore,
}

impl<'a> ProtectionKernel<'a> {
    pub fn new(instinct: &'a InstinctStore) -> Self {
        Self { instinct }
    }

    pub fn evaluate_pre_dispatch(&self, ctx: &PreDispatchContext) -> Verdict {
        self.instinct
            .all_rules()
            .iter()
            .map(|rule| check_pre_dispatch(rule, ctx))
            .fold(Verdict::Pass, Verdict::then)
    }

    pub fn evaluate_pre_emit(&self, ctx: &PreEmitContext) -> Verdict {
        self.instinct
            .all_rules()
            .iter()
            .map(|rule| check_pre_emit(rule, ctx))
            .fold(Verdict::Pass, Verdict::then)
    }
}

fn verdict_for(rule: &Rule, triggered: bool) -> Verdict {
    if !triggered {
        return Verdict::Pass;
    }
    match rule.severity {
        Severity::Blocking => Verdict::Block {
            rule_id: rule.id.clone(),
            reason: rule.message.clone(),
            alternatives: Vec::new(),
        },
        Severity::Warning | Severity::Advisory => {
            Verdict::Warn { rule_id: rule.id.clone(), reason: rule.message.clone() }
        }
    }
}

fn check_pre_dispatch(rule: &Rule, ctx: &PreDispatchContext) -> Verdict {
    match rule.predicate.as_str() {
        "challenge_low_dor" => {
            let triggered = ctx.definition_of_ready_score.is_some_and(|s| s < 0.5);
            verdict_for(rule, triggered)
        }
        "no_core_amnesia" => {
            let triggered = requests_bulk_memory_deletion(&ctx.raw_text);
            attach_core_amnesia_alternatives(verdict_for(rule, triggered))
        }
        _ => Verdict::Pass,
    }
}

/// Phrases a request's raw text is scanned for to recognize an
/// irrecoverable bulk-deletion request before it ever reaches an agent.
/// Kept in one place so [`AdminAgent`](crate::agents::AdminAgent) and the
/// pre-dispatch check agree on what counts as "asking to forget
/// everything" - the two call sites (request text, agent-proposed effect)
/// must not drift independently.
const BULK_DELETION_PHRASES: &[&str] = &[
    "forget everything",
    "reset memory",
    "delete all conversation history",
    "delete all memory",
    "wipe memory",
    "erase all memory",
];

pub fn requests_bulk_memory_deletion(raw_text: &str) -> bool {
    let lower = raw_text.to_lowercase();
    BULK_DELETION_PHRASES.iter().any(|phrase| lower.contains(phrase))
}

/// `no_core_amnesia`'s three standard alternatives to an irrecoverable
/// bulk delete, attached whenever the rule actually blocks.
fn attach_core_amnesia_alternatives(verdict: Verdict) -> Verdict {
    if let Verdict::Block { rule_id, reason, .. } = verdict {
        Verdict::Block {
            rule_id,
            reason,
            alternatives: vec![
                Alternative {
                    action: "archive".into(),
                    description: "archive the data instead of deleting it outright".into(),
                },
                Alternative {
                    action: "export_backup".into(),
                    description: "export a backup before any removal".into(),
                },
                Alternative {
                    action: "set_retention".into(),
                    description: "set a retention window instead of an immediate bulk delete"
                        .into(),
                },
            ],
        }
    } else {
        verdict
    }
}

fn check_pre_emit(rule: &Rule, ctx: &PreEmitContext) -> Verdict {
    match rule.predicate.as_str() {
        "no_root_docs" => {
            let triggered = ctx.write_paths.iter().any(is_root_level_doc);
            let verdict = verdict_for(rule, triggered);
            if let Verdict::Block { rule_id, reason, .. } = verdict {
                Verdict::Block {
                    rule_id,
                    reason,
                    alternatives: vec![Alternative {
                        action: "write_to_categorized_subpath".into(),
                        description: format!(
                            "place the document under one of the categorized subpaths ({}) instead of the repository root",
                            crate::writer::ALLOWED_SUBPATHS.join(", ")
                        ),
                    }],
                }
            } else {
                verdict
            }
        }
        "requires_mandatory_format" => {
            verdict_for(rule, !has_mandatory_sections(&ctx.response_text))
        }
        "no_core_amnesia" => attach_core_amnesia_alternatives(verdict_for(rule, ctx.deletes_core_memory)),
        _ => Verdict::Pass,
    }
}

fn is_root_level_doc(path: &std::path::Path) -> bool {
    let is_markdown = path.extension().is_some_and(|ext| ext == "md");
    is_markdown && path.parent().map(|p| p.as_os_str().is_empty()).unwrap_or(true)
}

fn has_mandatory_sections(text: &str) -> bool {
    const REQUIRED: [&str; 4] =
        ["## Understanding", "## Challenge", "## Response", "## Next Steps"];
    REQUIRED.iter().all(|marker| text.contains(marker))
}
