//! MCP Server Core
//!
//! Routes JSON-RPC requests to the three tools this server exposes, and
//! handles the `initialize`/`tools/list`/`ping` handshake methods every MCP
//! client expects before it will call a tool.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, warn};

use cortex_core::state::State;

use crate::protocol::messages::{
    CallToolRequest, CallToolResult, InitializeRequest, InitializeResult, ListToolsResult,
    ServerCapabilities, ServerInfo, ToolDescription,
};
use crate::protocol::types::{JsonRpcError, JsonRpcRequest, JsonRpcResponse, MCP_VERSION};
use crate::tools;

pub struct McpServer {
    state: Arc<State>,
    initialized: bool,
}

impl McpServer {
    pub fn new(state: Arc<State>) -> Self {
        Self { state, initialized: false }
    }

    /// Handle an incoming JSON-RPC request. Returns `None` for
    /// notifications, which expect no response.
    pub async fn handle_request(&mut self, request: JsonRpcRequest) -> Option<JsonRpcResponse> {
        debug!("Handling request: {}", request.method);

        if !self.initialized
            && request.method != "initialize"
            && request.method != "notifications/initialized"
        {
            warn!("Rejecting request '{}': server not initialized", request.method);
            return Some(JsonRpcResponse::error(request.id, JsonRpcError::server_not_initialized()));
        }

        let result = match request.method.as_str() {
            "initialize" => self.handle_initialize(request.params).await,
            "notifications/initialized" => return None,
            "tools/list" => self.handle_tools_list().await,
            "tools/call" => self.handle_tools_call(request.params).await,
            "ping" => Ok(serde_json::json!({})),
            method => {
                warn!("Unknown method: {}", method);
                Err(JsonRpcError::method_not_found())
            }
        };

        Some(match result {
            Ok(result) => JsonRpcResponse::success(request.id, result),
            Err(error) => JsonRpcResponse::error(request.id, error),
        })
    }

    async fn handle_initialize(
        &mut self,
        params: Option<serde_json::Value>,
    ) -> Result<serde_json::Value, JsonRpcError> {
        let request: InitializeRequest = match params {
            Some(p) => {
                serde_json::from_value(p).map_err(|e| JsonRpcError::invalid_params(&e.to_string()))?
            }
            None => InitializeRequest::default(),
        };

        // Claude Desktop and other clients reject servers that negotiate a
        // newer protocol version than the one they asked for.
        let negotiated_version = if request.protocol_version.as_str() < MCP_VERSION {
            request.protocol_version.clone()
        } else {
            MCP_VERSION.to_string()
        };

        self.initialized = true;
        tracing::info!(protocol_version = %negotiated_version, "MCP session initialized");

        let result = InitializeResult {
            protocol_version: negotiated_version,
            server_info: ServerInfo {
                name: "cortex".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
            capabilities: ServerCapabilities {
                tools: Some({
                    let mut map = HashMap::new();
                    map.insert("listChanged".to_string(), serde_json::json!(false));
                    map
                }),
            },
            instructions: Some(
                "Cortex is a cognitive substrate: it routes your request through an intent \
                 router, a protection kernel that can block or challenge unsafe actions, and \
                 a dispatched agent, then returns a structured response. Call `process_request` \
                 with `raw_text` for every request; use `session_hint` to keep replies in the \
                 same conversation. `system_status` and `list_rules` are read-only."
                    .to_string(),
            ),
        };

        serde_json::to_value(result).map_err(|e| JsonRpcError::internal_error(&e.to_string()))
    }

    async fn handle_tools_list(&self) -> Result<serde_json::Value, JsonRpcError> {
        let result = ListToolsResult {
            tools: vec![
                ToolDescription {
                    name: "process_request".to_string(),
                    description: Some(
                        "Primary entry point. Routes raw user text through intent \
                         classification, Tier 0 protection checks, the dispatched agent, and \
                         response formatting. Returns a structured envelope; a blocked request \
                         comes back with a rule id, reason, and safer alternatives instead of \
                         an error."
                            .to_string(),
                    ),
                    input_schema: tools::process::schema(),
                },
                ToolDescription {
                    name: "system_status".to_string(),
                    description: Some(
                        "Read-only tier health: conversation and pattern counts, instinct rule \
                         count, and whether the learning pipeline is due to run."
                            .to_string(),
                    ),
                    input_schema: tools::introspection::system_status_schema(),
                },
                ToolDescription {
                    name: "list_rules".to_string(),
                    description: Some("Read-only listing of every active Tier 0 rule.".to_string()),
                    input_schema: tools::introspection::list_rules_schema(),
                },
            ],
        };
        serde_json::to_value(result).map_err(|e| JsonRpcError::internal_error(&e.to_string()))
    }

    async fn handle_tools_call(
        &self,
        params: Option<serde_json::Value>,
    ) -> Result<serde_json::Value, JsonRpcError> {
        let request: CallToolRequest = match params {
            Some(p) => {
                serde_json::from_value(p).map_err(|e| JsonRpcError::invalid_params(&e.to_string()))?
            }
            None => return Err(JsonRpcError::invalid_params("Missing tool call parameters")),
        };

        let result = match request.name.as_str() {
            "process_request" => tools::process::execute(&self.state, request.arguments).await,
            "system_status" => tools::introspection::execute_system_status(&self.state).await,
            "list_rules" => tools::introspection::execute_list_rules(&self.state).await,
            name => {
                return Err(JsonRpcError::method_not_found_with_message(&format!(
                    "Unknown tool: {}",
                    name
                )));
            }
        };

        let call_result = match result {
            Ok(value) => CallToolResult::ok(&value),
            Err(message) => CallToolResult::err(&message),
        };

        serde_json::to_value(call_result).map_err(|e| JsonRpcError::internal_error(&e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cortex_core::config::Config;

    fn wire() -> (McpServer, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::from_env();
        config.brain_dir = dir.path().to_path_buf();
        let state = Arc::new(State::init(config).unwrap());
        (McpServer::new(state), dir)
    }

    fn request(id: i64, method: &str, params: Option<serde_json::Value>) -> JsonRpcRequest {
        JsonRpcRequest {
            jsonrpc: "2.0".to_string(),
            id: Some(serde_json::json!(id)),
            method: method.to_string(),
            params,
        }
    }

    #[tokio::test]
    async fn requests_before_initialize_are_rejected() {
        let (mut server, _dir) = wire();
        let response = server.handle_request(request(1, "tools/list", None)).await.unwrap();
        assert_eq!(response.error.unwrap().code, -32003);
    }

    #[tokio::test]
    async fn initialize_then_tools_list_returns_three_tools() {
        let (mut server, _dir) = wire();
        server.handle_request(request(1, "initialize", None)).await;
        let response = server.handle_request(request(2, "tools/list", None)).await.unwrap();
        let tools = response.result.unwrap()["tools"].as_array().unwrap().len();
        assert_eq!(tools, 3);
    }

    #[tokio::test]
    async fn process_request_tool_call_commits() {
        let (mut server, _dir) = wire();
        server.handle_request(request(1, "initialize", None)).await;
        let params = serde_json::json!({
            "name": "process_request",
            "arguments": {"raw_text": "help me plan the rollout"}
        });
        let response = server.handle_request(request(2, "tools/call", Some(params))).await.unwrap();
        assert!(response.error.is_none());
        let result = response.result.unwrap();
        assert_eq!(result["isError"], false);
    }

    #[tokio::test]
    async fn unknown_tool_is_method_not_found() {
        let (mut server, _dir) = wire();
        server.handle_request(request(1, "initialize", None)).await;
        let params = serde_json::json!({"name": "nonexistent", "arguments": {}});
        let response = server.handle_request(request(2, "tools/call", Some(params))).await.unwrap();
        assert_eq!(response.error.unwrap().code, -32601);
    }

    #[tokio::test]
    async fn ping_is_allowed_once_initialized() {
        let (mut server, _dir) = wire();
        server.handle_request(request(1, "initialize", None)).await;
        let response = server.handle_request(request(2, "ping", None)).await.unwrap();
        assert!(response.error.is_none());
    }
}
