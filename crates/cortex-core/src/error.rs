//! Error taxonomy
//!
//! Kinds are distinguished by the caller, not by type: the dispatcher and
//! formatter both need to tell `BlockedByRule` apart from `StorageUnavailable`
//! to decide how a turn is surfaced to the user.

use serde::Serialize;

/// A safer alternative suggested alongside a blocked action.
#[derive(Debug, Clone, Serialize)]
pub struct Alternative {
    pub action: String,
    pub description: String,
}

/// Core error taxonomy shared by every component.
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum CortexError {
    /// Protection refused the request or the proposed response.
    #[error("blocked by rule {rule_id}: {reason}")]
    BlockedByRule {
        rule_id: String,
        reason: String,
        alternatives: Vec<Alternative>,
    },

    /// An agent raised or timed out.
    #[error("agent failed: {0}")]
    AgentFailed(String),

    /// One or more tiers are degraded; writes refused, reads best-effort.
    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),

    /// A data-integrity guard tripped (confidence spike, mass deletion).
    #[error("anomaly detected: {0}")]
    AnomalyDetected(String),

    /// No template matches the requested id.
    #[error("template missing: {0}")]
    TemplateMissing(String),

    /// Template substitution failed in a way that couldn't be masked.
    #[error("render error: {0}")]
    RenderError(String),

    /// Request deadline elapsed or the request was cancelled externally.
    #[error("cancelled")]
    Cancelled,

    /// Fatal, startup-only misconfiguration.
    #[error("configuration error: {0}")]
    ConfigurationError(String),

    /// Underlying SQLite error, wrapped so tiers don't leak rusqlite types.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Underlying I/O error (file loads, brain directory creation).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, CortexError>;

impl CortexError {
    pub fn blocked(
        rule_id: impl Into<String>,
        reason: impl Into<String>,
        alternatives: Vec<Alternative>,
    ) -> Self {
        CortexError::BlockedByRule {
            rule_id: rule_id.into(),
            reason: reason.into(),
            alternatives,
        }
    }

    /// Whether this error should be retried transparently. Transient
    /// storage I/O is retried up to 3 times before bubbling up.
    pub fn is_transient(&self) -> bool {
        matches!(self, CortexError::Database(_) | CortexError::Io(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blocked_by_rule_carries_alternatives() {
        let err = CortexError::blocked(
            "no_core_amnesia",
            "would delete Tier 1/2 data irrecoverably",
            vec![Alternative {
                action: "archive".into(),
                description: "archive instead of delete".into(),
            }],
        );
        match err {
            CortexError::BlockedByRule { rule_id, alternatives, .. } => {
                assert_eq!(rule_id, "no_core_amnesia");
                assert_eq!(alternatives.len(), 1);
            }
            _ => panic!("expected BlockedByRule"),
        }
    }
}
