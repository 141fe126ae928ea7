//! `process_request`: the single primary tool. Takes raw user text and an
//! optional session hint, and returns whatever the dispatcher produced.

use cortex_core::error::CortexError;
use cortex_core::state::State;

pub fn schema() -> serde_json::Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "raw_text": {
                "type": "string",
                "description": "The user's message, verbatim."
            },
            "session_hint": {
                "type": "string",
                "description": "Conversation id to resume. Omit to start a new conversation."
            }
        },
        "required": ["raw_text"]
    })
}

pub async fn execute(
    state: &State,
    arguments: Option<serde_json::Value>,
) -> Result<serde_json::Value, String> {
    let args = arguments.ok_or_else(|| "missing arguments".to_string())?;
    let raw_text = args
        .get("raw_text")
        .and_then(|v| v.as_str())
        .ok_or_else(|| "raw_text is required and must be a string".to_string())?;
    let session_hint = args.get("session_hint").and_then(|v| v.as_str());

    match state.process_request(raw_text, session_hint) {
        Ok(envelope) => Ok(serde_json::json!({
            "trace_id": envelope.trace_id.to_string(),
            "text": envelope.text,
            "state": format!("{:?}", envelope.state),
            "intent": format!("{:?}", envelope.intent),
            "agent_id": envelope.agent_id,
            "template_id": envelope.template_id,
            "suggest_confirm": envelope.suggest_confirm,
            "warnings": envelope.warnings,
            "effects_summary": envelope.effects_summary,
        })),
        Err(CortexError::BlockedByRule { rule_id, reason, alternatives }) => {
            Ok(serde_json::json!({
                "blocked": true,
                "rule_id": rule_id,
                "reason": reason,
                "alternatives": alternatives,
            }))
        }
        Err(CortexError::Cancelled) => Ok(serde_json::json!({
            "cancelled": true,
            "reason": "the dispatched agent exceeded its deadline",
        })),
        Err(err) => Err(err.to_string()),
    }
}
