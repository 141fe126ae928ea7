//! Template Loader/Renderer (C10)
//!
//! Declarative response templates loaded from a single YAML file.
//! Templates may declare a `base` to inherit from; composition resolves
//! the base's fields first, then applies the child's fields as overrides,
//! iterating in `BTreeMap` key order so the same source file always
//! composes identically regardless of load order.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{CortexError, Result};
use crate::router::IntentKind;

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct RawTemplate {
    pub name: Option<String>,
    #[serde(default)]
    pub triggers: Vec<String>,
    pub response_type: Option<String>,
    pub content: Option<String>,
    pub base: Option<String>,
    /// The intent this template serves, consulted by the router's stage-1
    /// trigger match (registry and template triggers are checked together)
    /// and by the formatter's intent-based template selection.
    pub intent: Option<IntentKind>,
}

#[derive(Debug, Deserialize)]
struct TemplateFile {
    templates: BTreeMap<String, RawTemplate>,
}

/// A template after `base` composition has been resolved; every field is
/// now concrete except `intent`, which has no required default.
#[derive(Debug, Clone, Serialize)]
pub struct Template {
    pub id: String,
    pub name: String,
    pub triggers: Vec<String>,
    pub response_type: String,
    pub content: String,
    pub intent: Option<IntentKind>,
}

/// Baseline templates shipped with the binary, loaded when the brain
/// directory has no `templates.yaml` of its own - mirrors Tier 0's
/// `default_rules()` fallback.
pub fn default_templates_yaml() -> &'static str {
    r#"
templates:
  fallback:
    name: "Fallback"
    response_type: "markdown"
    content: "{{response}}"
  help_table:
    name: "Help Table"
    triggers: ["help"]
    intent: help
    response_type: "markdown"
    content: |
      | Topic | What it covers |
      |---|---|
      | status | Tier health via the system_status tool |
      | memory | Working memory and the knowledge graph |
      | routing | How requests get classified and dispatched |

      {{response}}
"#
}

pub struct TemplateStore {
    templates: BTreeMap<String, Template>,
}

impl TemplateStore {
    pub fn load(path: &std::path::Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_yaml(&raw)
    }

    pub fn from_yaml(raw: &str) -> Result<Self> {
        let file: TemplateFile = serde_yaml::from_str(raw).map_err(|e| {
            CortexError::ConfigurationError(format!("malformed template file: {e}"))
        })?;
        Self::compose(file.templates)
    }

    fn compose(raw: BTreeMap<String, RawTemplate>) -> Result<Self> {
        let mut resolved: BTreeMap<String, Template> = BTreeMap::new();

        for id in raw.keys() {
            resolve_one(id, &raw, &mut resolved, &mut Vec::new())?;
        }

        check_no_duplicate_triggers(&resolved)?;

        Ok(Self { templates: resolved })
    }

    pub fn get(&self, id: &str) -> Option<&Template> {
        self.templates.get(id)
    }

    /// Longest exact trigger match against `raw_text`, mirroring the
    /// Operation Registry's own trigger matching - the router's stage-1
    /// exact-trigger check consults both sources.
    pub fn longest_trigger_match(&self, raw_text: &str) -> Option<(usize, &Template)> {
        let lower = raw_text.to_lowercase();
        self.templates
            .values()
            .flat_map(|template| template.triggers.iter().map(move |trigger| (trigger, template)))
            .filter(|(trigger, _)| lower.contains(trigger.to_lowercase().as_str()))
            .map(|(trigger, template)| (trigger.len(), template))
            .max_by_key(|(len, _)| *len)
    }

    pub fn all(&self) -> impl Iterator<Item = &Template> {
        self.templates.values()
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }
}

fn resolve_one(
    id: &str,
    raw: &BTreeMap<String, RawTemplate>,
    resolved: &mut BTreeMap<String, Template>,
    in_progress: &mut Vec<String>,
) -> Result<Template> {
    if let Some(existing) = resolved.get(id) {
        return Ok(existing.clone());
    }
    if in_progress.contains(&id.to_string()) {
        return Err(CortexError::ConfigurationError(format!(
            "template base cycle detected at '{id}'"
        )));
    }
    let entry = raw
        .get(id)
        .ok_or_else(|| CortexError::TemplateMissing(id.to_string()))?;

    in_progress.push(id.to_string());

    let mut merged = if let Some(base_id) = &entry.base {
        let base = resolve_one(base_id, raw, resolved, in_progress)?;
        Template {
            id: id.to_string(),
            name: base.name,
            triggers: base.triggers,
            response_type: base.response_type,
            content: base.content,
            intent: base.intent,
        }
    } else {
        Template {
            id: id.to_string(),
            name: String::new(),
            triggers: Vec::new(),
            response_type: "text".to_string(),
            content: String::new(),
            intent: None,
        }
    };

    if let Some(name) = &entry.name {
        merged.name = name.clone();
    }
    if !entry.triggers.is_empty() {
        merged.triggers = entry.triggers.clone();
    }
    if let Some(response_type) = &entry.response_type {
        merged.response_type = response_type.clone();
    }
    if let Some(content) = &entry.content {
        merged.content = content.clone();
    }
    if let Some(intent) = entry.intent {
        merged.intent = Some(intent);
    }

    in_progress.pop();
    resolved.insert(id.to_string(), merged.clone());
    Ok(merged)
}

/// Two templates claiming the same trigger phrase (case-insensitive) is a
/// malformed template file per §6, not a silent last-one-wins.
fn check_no_duplicate_triggers(templates: &BTreeMap<String, Template>) -> Result<()> {
    let mut owners: std::collections::HashMap<String, &str> = std::collections::HashMap::new();
    for template in templates.values() {
        for trigger in &template.triggers {
            let key = trigger.to_lowercase();
            if let Some(&existing) = owners.get(&key) {
                if existing != template.id {
                    return Err(CortexError::ConfigurationError(format!(
                        "trigger '{trigger}' is claimed by both template '{existing}' and '{}'",
                        template.id
                    )));
                }
            }
            owners.insert(key, &template.id);
        }
    }
    Ok(())
}

/// Substitute `{{placeholder}}` tokens in `template.content` with values
/// from `vars`. Any `{{placeholder}}` left over after substitution (one
/// the caller didn't supply a value for) is replaced with the empty
/// string and logged, rather than left in the rendered output verbatim.
pub fn render(template: &Template, vars: &BTreeMap<String, String>) -> String {
    let mut out = template.content.clone();
    for (key, value) in vars {
        out = out.replace(&format!("{{{{{key}}}}}"), value);
    }
    strip_unresolved_placeholders(&out, &template.id)
}

fn strip_unresolved_placeholders(text: &str, template_id: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find("{{") {
        let Some(end_rel) = rest[start..].find("}}") else {
            out.push_str(rest);
            return out;
        };
        let end = start + end_rel + 2;
        let placeholder = &rest[start + 2..start + end_rel];
        out.push_str(&rest[..start]);
        tracing::warn!(template_id, placeholder, "unresolved template placeholder replaced with empty string");
        rest = &rest[end..];
    }
    out.push_str(rest);
    out
}
