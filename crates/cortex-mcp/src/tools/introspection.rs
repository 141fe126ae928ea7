//! Read-only tier health and rule introspection, for an operator who wants
//! visibility without going through the chat loop.

use cortex_core::state::State;

pub fn system_status_schema() -> serde_json::Value {
    serde_json::json!({
        "type": "object",
        "properties": {}
    })
}

pub fn list_rules_schema() -> serde_json::Value {
    serde_json::json!({
        "type": "object",
        "properties": {}
    })
}

pub async fn execute_system_status(state: &State) -> Result<serde_json::Value, String> {
    let conversation_count = state.tier1.conversation_count().map_err(|e| e.to_string())?;
    let pattern_count = state.tier2.pattern_count().map_err(|e| e.to_string())?;
    let learning_pending = state.events.pending_for("learning_pipeline", 1).map_err(|e| e.to_string())?;

    Ok(serde_json::json!({
        "conversation_count": conversation_count,
        "pattern_count": pattern_count,
        "instinct_rule_count": state.instinct.len(),
        "learning_pipeline_should_run": state.learning.should_run().map_err(|e| e.to_string())?,
        "learning_pipeline_has_pending": !learning_pending.is_empty(),
    }))
}

pub async fn execute_list_rules(state: &State) -> Result<serde_json::Value, String> {
    Ok(serde_json::json!({ "rules": state.instinct.all_rules() }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use cortex_core::config::Config;

    fn wire() -> (State, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::from_env();
        config.brain_dir = dir.path().to_path_buf();
        (State::init(config).unwrap(), dir)
    }

    #[tokio::test]
    async fn system_status_reports_tier_counts() {
        let (state, _dir) = wire();
        let status = execute_system_status(&state).await.unwrap();
        assert_eq!(status["conversation_count"], 0);
        assert_eq!(status["pattern_count"], 0);
        assert!(status["instinct_rule_count"].as_u64().unwrap() > 0);
    }

    #[tokio::test]
    async fn list_rules_returns_the_compiled_in_defaults() {
        let (state, _dir) = wire();
        let rules = execute_list_rules(&state).await.unwrap();
        assert!(rules["rules"].as_array().unwrap().len() > 0);
    }
}
