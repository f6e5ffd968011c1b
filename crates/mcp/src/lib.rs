//! MCP tool server for span-metrics and service-graph queries
//!
//! Speaks JSON-RPC 2.0 over HTTP and answers `tools/call` with range-query
//! results from the same Prometheus-compatible backend the anomaly service
//! uses.

pub mod config;
pub mod rpc;
pub mod server;
pub mod tools;

pub use rpc::{JsonRpcError, JsonRpcRequest, JsonRpcResponse, RpcError};
pub use server::{create_router, McpServer, RangeQuery};
pub use tools::{tool_definitions, Tool, ToolCall};
