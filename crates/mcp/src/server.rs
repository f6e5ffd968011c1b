//! JSON-RPC dispatch and the HTTP surface

use async_trait::async_trait;
use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use detector_lib::source::MimirClient;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::rpc::{JsonRpcRequest, JsonRpcResponse, RpcError};
use crate::tools::{tool_definitions, ToolCall};

pub const PROTOCOL_VERSION: &str = "2024-11-05";
pub const SERVER_NAME: &str = "mimir-servicegraph";

/// Resolution of every tool query
pub const QUERY_STEP: Duration = Duration::from_secs(30);

/// Range-query backend the tools read from
#[async_trait]
pub trait RangeQuery: Send + Sync {
    /// Run `query` over `[start, end]` and return the `data` field
    async fn query_range(
        &self,
        query: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        step: Duration,
    ) -> detector_lib::Result<Value>;
}

#[async_trait]
impl RangeQuery for MimirClient {
    async fn query_range(
        &self,
        query: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        step: Duration,
    ) -> detector_lib::Result<Value> {
        MimirClient::query_range(self, query, start, end, step).await
    }
}

#[derive(Debug, Deserialize)]
struct CallParams {
    #[serde(default)]
    name: String,
    #[serde(default)]
    arguments: Option<Value>,
}

/// Answers JSON-RPC requests against a range-query backend
pub struct McpServer {
    backend: Arc<dyn RangeQuery>,
}

impl McpServer {
    pub fn new(backend: Arc<dyn RangeQuery>) -> Self {
        Self { backend }
    }

    pub async fn handle(&self, request: JsonRpcRequest) -> JsonRpcResponse {
        info!(method = %request.method, "rpc request");

        match self.dispatch(&request.method, request.params).await {
            Ok(result) => JsonRpcResponse::ok(request.id, result),
            Err(e) => {
                warn!(method = %request.method, code = e.code(), error = %e, "rpc request failed");
                JsonRpcResponse::fail(request.id, &e)
            }
        }
    }

    async fn dispatch(&self, method: &str, params: Option<Value>) -> Result<Value, RpcError> {
        match method {
            "initialize" => Ok(json!({
                "capabilities": { "tools": {} },
                "protocolVersion": PROTOCOL_VERSION,
                "serverInfo": {
                    "name": SERVER_NAME,
                    "version": env!("CARGO_PKG_VERSION"),
                },
            })),
            "tools/list" => Ok(json!({ "tools": tool_definitions() })),
            "tools/call" => {
                let params = params
                    .ok_or_else(|| RpcError::InvalidParams("missing parameters".into()))?;
                let params: CallParams = serde_json::from_value(params)?;
                let call = ToolCall::parse(&params.name, params.arguments)?;
                self.call_tool(&call).await
            }
            "shutdown" => Ok(json!({})),
            _ => Err(RpcError::MethodNotFound),
        }
    }

    async fn call_tool(&self, call: &ToolCall) -> Result<Value, RpcError> {
        let end = Utc::now();
        let start = end - chrono::Duration::minutes(i64::from(call.window_minutes()));
        let query = call.query();

        let data = self
            .backend
            .query_range(&query, start, end, QUERY_STEP)
            .await?;

        Ok(json!({
            "content": [{ "type": "text", "text": data.to_string() }]
        }))
    }
}

async fn rpc(State(server): State<Arc<McpServer>>, body: Bytes) -> Response {
    let request: JsonRpcRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => {
            warn!(error = %e, "undecodable rpc body");
            return (StatusCode::BAD_REQUEST, "bad request").into_response();
        }
    };

    Json(server.handle(request).await).into_response()
}

async fn healthz() -> &'static str {
    "ok"
}

/// Create the tool server router
pub fn create_router(server: Arc<McpServer>) -> Router {
    Router::new()
        .route("/rpc", post(rpc))
        .route("/healthz", get(healthz))
        .with_state(server)
}

/// Start the tool server
pub async fn serve(addr: String, server: Arc<McpServer>) -> anyhow::Result<()> {
    let app = create_router(server);

    info!(addr = %addr, "mcp server listening");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
