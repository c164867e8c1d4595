//! JSON-RPC 2.0 adapter over standard streams.
//!
//! A thin transport: `initialize`, `tools/list`, and `tools/call` are the
//! only methods. Tool-domain failures are carried inside a successful RPC
//! result (`isError: true`); protocol-level error objects are reserved for
//! malformed requests and unknown methods. Logging goes to stderr — stdout
//! belongs to the protocol.

use serde::Serialize;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{debug, info, warn};

use crate::tools::{self, ToolContext};
use crate::Result;

/// JSON-RPC error codes used by the adapter.
const PARSE_ERROR: i64 = -32700;
const INVALID_REQUEST: i64 = -32600;
const METHOD_NOT_FOUND: i64 = -32601;

/// Server identity reported on `initialize`.
const SERVER_NAME: &str = "hydramcp";
const PROTOCOL_VERSION: &str = "2024-11-05";

#[derive(Debug, Serialize)]
struct RpcResponse {
    jsonrpc: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<RpcError>,
}

#[derive(Debug, Serialize)]
struct RpcError {
    code: i64,
    message: String,
}

impl RpcResponse {
    fn result(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: "2.0",
            id: Some(id),
            result: Some(result),
            error: None,
        }
    }

    fn error(id: Option<Value>, code: i64, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            result: None,
            error: Some(RpcError {
                code,
                message: message.into(),
            }),
        }
    }
}

/// Serve tool calls over stdin/stdout until EOF.
pub async fn serve(ctx: ToolContext) -> Result<()> {
    let stdin = BufReader::new(tokio::io::stdin());
    let mut stdout = tokio::io::stdout();
    let mut lines = stdin.lines();

    info!(server = SERVER_NAME, "serving tools on standard streams");
    while let Some(line) = lines.next_line().await? {
        let line = line.trim().to_string();
        if line.is_empty() {
            continue;
        }
        let Some(response) = handle_line(&ctx, &line).await else {
            continue; // notification, nothing to write
        };
        let mut body = serde_json::to_string(&response)?;
        body.push('\n');
        stdout.write_all(body.as_bytes()).await?;
        stdout.flush().await?;
    }
    info!("stdin closed, shutting down");
    Ok(())
}

/// Handle one request line. Returns `None` for notifications.
async fn handle_line(ctx: &ToolContext, line: &str) -> Option<RpcResponse> {
    let request: Value = match serde_json::from_str(line) {
        Ok(v) => v,
        Err(e) => {
            warn!(error = %e, "unparseable request line");
            return Some(RpcResponse::error(None, PARSE_ERROR, e.to_string()));
        }
    };

    let id = request.get("id").cloned();
    let Some(method) = request.get("method").and_then(Value::as_str) else {
        return Some(RpcResponse::error(
            id,
            INVALID_REQUEST,
            "missing method field",
        ));
    };
    debug!(method, "handling request");

    // Notifications (no id) get no response.
    let id = id?;

    let response = match method {
        "initialize" => RpcResponse::result(
            id,
            json!({
                "protocolVersion": PROTOCOL_VERSION,
                "capabilities": {"tools": {}},
                "serverInfo": {
                    "name": SERVER_NAME,
                    "version": env!("CARGO_PKG_VERSION"),
                }
            }),
        ),
        "ping" => RpcResponse::result(id, json!({})),
        "tools/list" => {
            let tools: Vec<Value> = tools::tool_specs()
                .iter()
                .map(|spec| {
                    json!({
                        "name": spec.name,
                        "description": spec.description,
                        "inputSchema": spec.input_schema,
                    })
                })
                .collect();
            RpcResponse::result(id, json!({"tools": tools}))
        }
        "tools/call" => {
            let name = request
                .pointer("/params/name")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            let args = request
                .pointer("/params/arguments")
                .cloned()
                .unwrap_or_else(|| json!({}));
            let output = tools::dispatch(ctx, &name, args).await;
            RpcResponse::result(
                id,
                json!({
                    "content": [{"type": "text", "text": output.text}],
                    "isError": output.is_error,
                }),
            )
        }
        other => RpcResponse::error(
            Some(id),
            METHOD_NOT_FOUND,
            format!("unknown method '{other}'"),
        ),
    };
    Some(response)
}
