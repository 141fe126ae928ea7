//! Operation Registry (C13)
//!
//! Plugin table of operations, each owning a set of exact trigger phrases.
//! Registration is eager and fatal on conflict: two operations claiming the
//! same trigger is a startup-time `ConfigurationError`, never a silent
//! last-write-wins.

use std::collections::HashMap;

use crate::error::{CortexError, Result};
use crate::router::IntentKind;

#[derive(Debug, Clone)]
pub struct Operation {
    pub key: String,
    pub intent: IntentKind,
    pub triggers: Vec<String>,
    pub priority: i32,
}

pub struct OperationRegistry {
    operations: Vec<Operation>,
    trigger_index: HashMap<String, usize>,
}

impl OperationRegistry {
    pub fn new() -> Self {
        Self { operations: Vec::new(), trigger_index: HashMap::new() }
    }

    /// Register an operation and its triggers. Rejects registration if any
    /// trigger is already claimed by a previously-registered operation.
    pub fn register(&mut self, operation: Operation) -> Result<()> {
        for trigger in &operation.triggers {
            let key = trigger.to_lowercase();
            if let Some(&existing) = self.trigger_index.get(&key) {
                return Err(CortexError::ConfigurationError(format!(
                    "trigger '{trigger}' already claimed by operation '{}', cannot also register to '{}'",
                    self.operations[existing].key, operation.key
                )));
            }
        }

        let idx = self.operations.len();
        for trigger in &operation.triggers {
            self.trigger_index.insert(trigger.to_lowercase(), idx);
        }
        self.operations.push(operation);
        Ok(())
    }

    /// Longest exact trigger match against `raw_text`, ties broken by
    /// operation priority (higher wins). Returns the matching trigger's
    /// length alongside the operation so a caller comparing against another
    /// trigger source (the Template Loader) can tell which one matched
    /// longer.
    pub fn longest_trigger_match(&self, raw_text: &str) -> Option<(usize, &Operation)> {
        let lower = raw_text.to_lowercase();
        self.trigger_index
            .iter()
            .filter(|(trigger, _)| lower.contains(trigger.as_str()))
            .map(|(trigger, &idx)| (trigger.len(), &self.operations[idx]))
            .max_by(|a, b| a.0.cmp(&b.0).then(a.1.priority.cmp(&b.1.priority)))
    }

    pub fn match_trigger(&self, raw_text: &str) -> Option<&Operation> {
        self.longest_trigger_match(raw_text).map(|(_, op)| op)
    }

    pub fn get(&self, key: &str) -> Option<&Operation> {
        self.operations.iter().find(|op| op.key == key)
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }
}

impl Default for OperationRegistry {
    fn default() -> Self {
        Self::new()
    }
}
