//! Tier 0 - Instinct (C2)
//!
//! Immutable, versioned rules loaded once at process start. Query-only at
//! runtime: there is no write path. Rule evaluation is pure — lookups never
//! touch I/O.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::Result;

/// The fixed, closed set of rule groupings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Layer {
    Governance,
    MemoryHygiene,
    Solid,
    HemisphereSeparation,
    KnowledgeQuality,
    ChallengeAuthority,
}

/// How strongly a rule's violation is treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Blocking,
    Warning,
    Advisory,
}

/// A single Tier 0 rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rule {
    pub id: String,
    pub layer: Layer,
    pub severity: Severity,
    /// Symbolic reference to a named checker implemented in `protection`.
    pub predicate: String,
    pub message: String,
    pub version: u32,
}

/// Read-only store of Tier 0 rules, grouped by layer and indexed by id.
pub struct InstinctStore {
    rules: Vec<Rule>,
    by_id: HashMap<(String, u32), usize>,
}

impl InstinctStore {
    /// Load rules from a JSON file. Falls back to the compiled-in default
    /// set when `path` doesn't exist. A file that exists but fails to parse
    /// is a hard configuration error rather than a silent fallback.
    pub fn load(path: &std::path::Path) -> Result<Self> {
        let rules: Vec<Rule> = if path.exists() {
            let content = std::fs::read_to_string(path)?;
            serde_json::from_str(&content).map_err(|e| {
                crate::error::CortexError::ConfigurationError(format!(
                    "malformed instinct source {}: {e}",
                    path.display()
                ))
            })?
        } else {
            default_rules()
        };

        Self::from_rules(rules)
    }

    /// Build directly from an in-memory rule set (used by tests and by
    /// `load`'s default-source fallback).
    pub fn from_rules(rules: Vec<Rule>) -> Result<Self> {
        let mut by_id = HashMap::new();
        for (idx, rule) in rules.iter().enumerate() {
            let key = (rule.id.clone(), rule.version);
            if by_id.insert(key, idx).is_some() {
                return Err(crate::error::CortexError::ConfigurationError(format!(
                    "duplicate rule (id, version) pair: ({}, {})",
                    rule.id, rule.version
                )));
            }
        }
        Ok(Self { rules, by_id })
    }

    pub fn get_rule(&self, id: &str) -> Option<&Rule> {
        self.rules.iter().filter(|r| r.id == id).max_by_key(|r| r.version)
    }

    pub fn rules_for_layer(&self, layer: Layer) -> Vec<&Rule> {
        self.rules.iter().filter(|r| r.layer == layer).collect()
    }

    pub fn all_rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// The default rule set shipped with the core, covering the mandatory
/// protection predicates. Operators may override via
/// `CORTEX_BRAIN_DIR/instinct.json`.
pub fn default_rules() -> Vec<Rule> {
    vec![
        Rule {
            id: "no_root_docs".into(),
            layer: Layer::Governance,
            severity: Severity::Blocking,
            predicate: "no_root_docs".into(),
            message: "document writes must use a categorized subpath, never the repository root"
                .into(),
            version: 1,
        },
        Rule {
            id: "requires_mandatory_format".into(),
            layer: Layer::Governance,
            severity: Severity::Blocking,
            predicate: "requires_mandatory_format".into(),
            message: "rendered responses must contain the mandatory 5-part structure".into(),
            version: 1,
        },
        Rule {
            id: "no_core_amnesia".into(),
            layer: Layer::MemoryHygiene,
            severity: Severity::Blocking,
            predicate: "no_core_amnesia".into(),
            message: "operations that would irrecoverably delete Tier 1/2 data are blocked".into(),
            version: 1,
        },
        Rule {
            id: "challenge_low_dor".into(),
            layer: Layer::ChallengeAuthority,
            severity: Severity::Warning,
            predicate: "challenge_low_dor".into(),
            message: "planning requests with low definition-of-ready clarity should be challenged"
                .into(),
            version: 1,
        },
        Rule {
            id: "confidence_spike_guard".into(),
            layer: Layer::KnowledgeQuality,
            severity: Severity::Blocking,
            predicate: "confidence_spike_guard".into(),
            message: "knowledge-graph confidence changes beyond ±0.20 require ≥5 supporting events"
                .into(),
            version: 1,
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_rules_load_without_source_file() {
        let store = InstinctStore::load(std::path::Path::new("/nonexistent/instinct.json"))
            .unwrap();
        assert_eq!(store.len(), 5);
        assert!(store.get_rule("no_core_amnesia").is_some());
    }

    #[test]
    fn duplicate_id_version_pair_is_rejected() {
        let mut rules = default_rules();
        let dup = rules[0].clone();
        rules.push(dup);
        assert!(InstinctStore::from_rules(rules).is_err());
    }

    #[test]
    fn rules_for_layer_filters_correctly() {
        let store = InstinctStore::from_rules(default_rules()).unwrap();
        let governance = store.rules_for_layer(Layer::Governance);
        assert_eq!(governance.len(), 2);
    }

    #[test]
    fn evaluation_is_pure_same_id_same_rule() {
        let store = InstinctStore::from_rules(default_rules()).unwrap();
        let a = store.get_rule("no_root_docs").unwrap().message.clone();
        let b = store.get_rule("no_root_docs").unwrap().message.clone();
        assert_eq!(a, b);
    }
}
