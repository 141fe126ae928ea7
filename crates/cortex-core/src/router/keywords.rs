//! Fixed keyword → intent table, the router's second classification stage.

use serde::{Deserialize, Serialize};

/// The closed set of built-in intents, each served by exactly one built-in
/// agent (see `crate::agents`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentKind {
    Plan,
    Execute,
    Test,
    Review,
    Feedback,
    Help,
    Status,
    Admin,
    Tdd,
    General,
}

impl IntentKind {
    pub fn default_agent_key(&self) -> &'static str {
        match self {
            IntentKind::Plan => "plan_agent",
            IntentKind::Execute => "execute_agent",
            IntentKind::Test => "test_agent",
            IntentKind::Review => "review_agent",
            IntentKind::Feedback => "feedback_agent",
            IntentKind::Help => "help_agent",
            IntentKind::Status => "status_agent",
            IntentKind::Admin => "admin_agent",
            IntentKind::Tdd => "tdd_agent",
            IntentKind::General => "general_agent",
        }
    }
}

/// One `(phrase, intent)` entry. Checked via substring containment against
/// the lowercased request text; the longest matching phrase wins when more
/// than one fires.
const KEYWORD_TABLE: &[(&str, IntentKind)] = &[
    ("plan the", IntentKind::Plan),
    ("help me plan", IntentKind::Plan),
    ("create a plan", IntentKind::Plan),
    ("execute the", IntentKind::Execute),
    ("run the implementation", IntentKind::Execute),
    ("run the tests", IntentKind::Test),
    ("write tests", IntentKind::Test),
    ("test coverage", IntentKind::Test),
    ("review this", IntentKind::Review),
    ("code review", IntentKind::Review),
    ("review the", IntentKind::Review),
    ("give feedback", IntentKind::Feedback),
    ("file feedback", IntentKind::Feedback),
    ("feedback:", IntentKind::Feedback),
    ("how do i", IntentKind::Help),
    ("what is", IntentKind::Help),
    ("help with", IntentKind::Help),
    ("system status", IntentKind::Status),
    ("health check", IntentKind::Status),
    ("are you healthy", IntentKind::Status),
    ("reset memory", IntentKind::Admin),
    ("admin:", IntentKind::Admin),
    ("forget everything", IntentKind::Admin),
    ("tdd", IntentKind::Tdd),
    ("test-driven", IntentKind::Tdd),
    ("test driven development", IntentKind::Tdd),
];

/// Scan `raw_text` for the longest matching keyword phrase. Ties (equal
/// length) are broken by table order, earlier entries winning.
pub fn scan(raw_text: &str) -> Option<IntentKind> {
    let lower = raw_text.to_lowercase();
    KEYWORD_TABLE
        .iter()
        .filter(|(phrase, _)| lower.contains(phrase))
        .max_by_key(|(phrase, _)| phrase.len())
        .map(|(_, intent)| *intent)
}
