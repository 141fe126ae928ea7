//! MCP wire protocol: JSON-RPC envelope types, message payloads, and the
//! stdio transport loop.

pub mod messages;
pub mod stdio;
pub mod types;
