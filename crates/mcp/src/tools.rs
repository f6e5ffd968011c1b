//! Tool catalogue and argument handling
//!
//! Every tool maps to one PromQL range query over a recent window.

use detector_lib::source::promql;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::rpc::RpcError;

/// Window used when a call gives none (or a non-positive one)
pub const DEFAULT_WINDOW_MINUTES: u32 = 10;

/// Result count used by the top-N tools
pub const DEFAULT_LIMIT: u32 = 5;

/// Quantile used when a call gives none outside `(0, 1)`
pub const DEFAULT_QUANTILE: f64 = 0.95;

pub const SERVICEGRAPH_TOPOLOGY: &str = "servicegraph_topology";
pub const SERVICEGRAPH_LATENCY_P95: &str = "servicegraph_latency_p95";
pub const SPANMETRICS_LATENCY_QUANTILE: &str = "spanmetrics_latency_quantile";
pub const SPANMETRICS_RPS: &str = "spanmetrics_rps";
pub const SPANMETRICS_TOP_CALLERS: &str = "spanmetrics_top_callers";
pub const SPANMETRICS_TOP_ENDPOINTS: &str = "spanmetrics_top_endpoints";

/// MCP tool definition
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tool {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

impl Tool {
    fn new(name: &str, description: &str, input_schema: Value) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            input_schema,
        }
    }
}

fn window_property() -> Value {
    json!({ "type": "integer", "minimum": 1, "default": DEFAULT_WINDOW_MINUTES })
}

fn limit_property() -> Value {
    json!({ "type": "integer", "minimum": 1, "default": DEFAULT_LIMIT })
}

/// Tools advertised by `tools/list`
pub fn tool_definitions() -> Vec<Tool> {
    vec![
        Tool::new(
            SERVICEGRAPH_TOPOLOGY,
            "Return client->server edge weights from servicegraph_request_total over a recent window",
            json!({
                "type": "object",
                "properties": { "windowMinutes": window_property() },
            }),
        ),
        Tool::new(
            SERVICEGRAPH_LATENCY_P95,
            "Return p95 server-side latency for a given client->server edge using spanmetrics histogram",
            json!({
                "type": "object",
                "required": ["client", "server"],
                "properties": {
                    "client": { "type": "string" },
                    "server": { "type": "string" },
                    "windowMinutes": window_property(),
                },
            }),
        ),
        Tool::new(
            SPANMETRICS_LATENCY_QUANTILE,
            "Return latency quantile for a client->server edge using spanmetrics histogram",
            json!({
                "type": "object",
                "required": ["client", "server", "quantile"],
                "properties": {
                    "client": { "type": "string" },
                    "server": { "type": "string" },
                    "quantile": { "type": "number", "minimum": 0, "maximum": 1, "default": DEFAULT_QUANTILE },
                    "windowMinutes": window_property(),
                },
            }),
        ),
        Tool::new(
            SPANMETRICS_RPS,
            "Return requests per second for a client->server edge using spanmetrics count",
            json!({
                "type": "object",
                "required": ["server"],
                "properties": {
                    "server": { "type": "string" },
                    "client": { "type": "string" },
                    "windowMinutes": window_property(),
                },
            }),
        ),
        Tool::new(
            SPANMETRICS_TOP_CALLERS,
            "Top-N callers (peer_service) to a server by request rate",
            json!({
                "type": "object",
                "required": ["server"],
                "properties": {
                    "server": { "type": "string" },
                    "limit": limit_property(),
                    "windowMinutes": window_property(),
                },
            }),
        ),
        Tool::new(
            SPANMETRICS_TOP_ENDPOINTS,
            "Top-N span names (endpoints) for a server by request rate",
            json!({
                "type": "object",
                "required": ["server"],
                "properties": {
                    "server": { "type": "string" },
                    "limit": limit_property(),
                    "windowMinutes": window_property(),
                },
            }),
        ),
    ]
}

/// Raw arguments shared by all tools; absent fields read as zero/empty
#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct Arguments {
    client: String,
    server: String,
    quantile: f64,
    limit: i64,
    window_minutes: i64,
}

impl Arguments {
    fn window(&self) -> u32 {
        positive_or(self.window_minutes, DEFAULT_WINDOW_MINUTES)
    }

    fn limit(&self) -> u32 {
        positive_or(self.limit, DEFAULT_LIMIT)
    }

    fn quantile(&self) -> f64 {
        if self.quantile > 0.0 && self.quantile < 1.0 {
            self.quantile
        } else {
            DEFAULT_QUANTILE
        }
    }

    fn require_edge(&self) -> Result<(), RpcError> {
        if self.client.is_empty() || self.server.is_empty() {
            return Err(RpcError::InvalidParams("client and server required".into()));
        }
        Ok(())
    }

    fn require_server(&self) -> Result<(), RpcError> {
        if self.server.is_empty() {
            return Err(RpcError::InvalidParams("server required".into()));
        }
        Ok(())
    }
}

fn positive_or(value: i64, default: u32) -> u32 {
    if value > 0 {
        u32::try_from(value).unwrap_or(u32::MAX)
    } else {
        default
    }
}

/// A validated tool invocation
#[derive(Debug, Clone, PartialEq)]
pub enum ToolCall {
    Topology {
        window_minutes: u32,
    },
    LatencyQuantile {
        client: String,
        server: String,
        quantile: f64,
        window_minutes: u32,
    },
    Rps {
        server: String,
        client: Option<String>,
        window_minutes: u32,
    },
    TopCallers {
        server: String,
        limit: u32,
        window_minutes: u32,
    },
    TopEndpoints {
        server: String,
        limit: u32,
        window_minutes: u32,
    },
}

impl ToolCall {
    /// Validate `arguments` for the tool called `name`
    pub fn parse(name: &str, arguments: Option<Value>) -> Result<Self, RpcError> {
        let raw = arguments.unwrap_or_else(|| json!({}));

        if name == SERVICEGRAPH_TOPOLOGY {
            // malformed arguments fall back to the default window
            let args: Arguments = serde_json::from_value(raw).unwrap_or_default();
            return Ok(ToolCall::Topology {
                window_minutes: args.window(),
            });
        }

        let known = [
            SERVICEGRAPH_LATENCY_P95,
            SPANMETRICS_LATENCY_QUANTILE,
            SPANMETRICS_RPS,
            SPANMETRICS_TOP_CALLERS,
            SPANMETRICS_TOP_ENDPOINTS,
        ];
        if !known.contains(&name) {
            return Err(RpcError::UnknownTool(name.to_string()));
        }

        let args: Arguments = serde_json::from_value(raw)?;
        let window_minutes = args.window();

        let call = match name {
            SERVICEGRAPH_LATENCY_P95 => {
                args.require_edge()?;
                ToolCall::LatencyQuantile {
                    quantile: DEFAULT_QUANTILE,
                    client: args.client,
                    server: args.server,
                    window_minutes,
                }
            }
            SPANMETRICS_LATENCY_QUANTILE => {
                args.require_edge()?;
                ToolCall::LatencyQuantile {
                    quantile: args.quantile(),
                    client: args.client,
                    server: args.server,
                    window_minutes,
                }
            }
            SPANMETRICS_RPS => {
                args.require_server()?;
                ToolCall::Rps {
                    client: (!args.client.is_empty()).then_some(args.client),
                    server: args.server,
                    window_minutes,
                }
            }
            SPANMETRICS_TOP_CALLERS => {
                args.require_server()?;
                ToolCall::TopCallers {
                    limit: args.limit(),
                    server: args.server,
                    window_minutes,
                }
            }
            _ => {
                args.require_server()?;
                ToolCall::TopEndpoints {
                    limit: args.limit(),
                    server: args.server,
                    window_minutes,
                }
            }
        };

        Ok(call)
    }

    pub fn window_minutes(&self) -> u32 {
        match self {
            ToolCall::Topology { window_minutes }
            | ToolCall::LatencyQuantile { window_minutes, .. }
            | ToolCall::Rps { window_minutes, .. }
            | ToolCall::TopCallers { window_minutes, .. }
            | ToolCall::TopEndpoints { window_minutes, .. } => *window_minutes,
        }
    }

    /// PromQL answering this call
    pub fn query(&self) -> String {
        match self {
            ToolCall::Topology { .. } => promql::topology_query(),
            ToolCall::LatencyQuantile {
                client,
                server,
                quantile,
                ..
            } => promql::latency_quantile_query(*quantile, server, client),
            ToolCall::Rps { server, client, .. } => {
                promql::edge_rps_query(server, client.as_deref())
            }
            ToolCall::TopCallers { server, limit, .. } => promql::top_callers_query(server, *limit),
            ToolCall::TopEndpoints { server, limit, .. } => {
                promql::top_endpoints_query(server, *limit)
            }
        }
    }
}
