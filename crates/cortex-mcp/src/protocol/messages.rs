//! MCP message payloads layered on top of the raw JSON-RPC envelope:
//! initialize handshake, tool listing, and tool call request/result shapes.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::types::MCP_VERSION;

#[derive(Debug, Clone, Deserialize)]
pub struct InitializeRequest {
    #[serde(rename = "protocolVersion", default = "default_protocol_version")]
    pub protocol_version: String,
}

fn default_protocol_version() -> String {
    MCP_VERSION.to_string()
}

impl Default for InitializeRequest {
    fn default() -> Self {
        Self { protocol_version: default_protocol_version() }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ServerInfo {
    pub name: String,
    pub version: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ServerCapabilities {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<HashMap<String, serde_json::Value>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct InitializeResult {
    #[serde(rename = "protocolVersion")]
    pub protocol_version: String,
    #[serde(rename = "serverInfo")]
    pub server_info: ServerInfo,
    pub capabilities: ServerCapabilities,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ToolDescription {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "inputSchema")]
    pub input_schema: serde_json::Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct ListToolsResult {
    pub tools: Vec<ToolDescription>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CallToolRequest {
    pub name: String,
    #[serde(default)]
    pub arguments: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ToolResultContent {
    #[serde(rename = "type")]
    pub content_type: String,
    pub text: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CallToolResult {
    pub content: Vec<ToolResultContent>,
    #[serde(rename = "isError", skip_serializing_if = "Option::is_none")]
    pub is_error: Option<bool>,
}

impl CallToolResult {
    pub fn ok(value: &serde_json::Value) -> Self {
        Self {
            content: vec![ToolResultContent {
                content_type: "text".to_string(),
                text: serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string()),
            }],
            is_error: Some(false),
        }
    }

    pub fn err(message: &str) -> Self {
        Self {
            content: vec![ToolResultContent {
                content_type: "text".to_string(),
                text: serde_json::json!({ "error": message }).to_string(),
            }],
            is_error: Some(true),
        }
    }
}
