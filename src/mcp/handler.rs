//! JSON-RPC method dispatch for `POST /mcp`.

use std::time::Instant;

use serde_json::{json, Value};

use crate::mcp::protocol::{
    JsonRpcRequest, JsonRpcResponse, RpcError, ToolResult, INTERNAL_ERROR, INVALID_PARAMS,
    INVALID_REQUEST, METHOD_NOT_FOUND, PARSE_ERROR, PROTOCOL_VERSION,
};
use crate::mcp::tools::{ToolError, ToolRegistry};
use crate::observability::metrics;

const SERVER_NAME: &str = "memory-gateway";

/// Handle one request body. `None` means the call was a notification and gets
/// no response body.
pub async fn handle(registry: &ToolRegistry, body: &[u8]) -> Option<JsonRpcResponse> {
    let value: Value = match serde_json::from_slice(body) {
        Ok(value) => value,
        Err(e) => {
            return Some(JsonRpcResponse::failure(
                Value::Null,
                RpcError::new(PARSE_ERROR, format!("Parse error: {e}")),
            ))
        }
    };

    let id_hint = value.get("id").cloned().unwrap_or(Value::Null);
    let request: JsonRpcRequest = match serde_json::from_value(value) {
        Ok(request) => request,
        Err(e) => {
            return Some(JsonRpcResponse::failure(
                id_hint,
                RpcError::new(INVALID_REQUEST, format!("Invalid request: {e}")),
            ))
        }
    };

    metrics::record_request(&request.method);
    tracing::debug!(method = %request.method, id = ?request.id, "RPC call");

    if request.is_notification() {
        if request.method != "notifications/initialized" {
            tracing::debug!(method = %request.method, "Ignoring notification");
        }
        return None;
    }

    let id = request.id.clone().unwrap_or(Value::Null);
    let outcome = dispatch(registry, request).await;
    Some(match outcome {
        Ok(result) => JsonRpcResponse::success(id, result),
        Err(error) => JsonRpcResponse::failure(id, error),
    })
}

async fn dispatch(registry: &ToolRegistry, request: JsonRpcRequest) -> Result<Value, RpcError> {
    match request.method.as_str() {
        "initialize" => Ok(json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": { "tools": { "listChanged": false } },
            "serverInfo": {
                "name": SERVER_NAME,
                "version": env!("CARGO_PKG_VERSION"),
            },
        })),
        "ping" => Ok(json!({})),
        "tools/list" => Ok(json!({ "tools": registry.descriptors() })),
        "tools/call" => call_tool(registry, request.params).await,
        other => Err(RpcError::new(
            METHOD_NOT_FOUND,
            format!("Unknown method: {other}"),
        )),
    }
}

async fn call_tool(registry: &ToolRegistry, params: Value) -> Result<Value, RpcError> {
    let name = params
        .get("name")
        .and_then(Value::as_str)
        .ok_or_else(|| RpcError::new(INVALID_PARAMS, "tools/call requires a string 'name'"))?
        .to_string();
    let arguments = params.get("arguments").cloned().unwrap_or(Value::Null);

    let started = Instant::now();
    let result = match registry.call(&name, arguments).await {
        Ok(value) => {
            metrics::record_tool_call(&name, true, started);
            ToolResult::success(&value)
        }
        Err(ToolError::UnknownTool(name)) => {
            return Err(RpcError::new(INVALID_PARAMS, format!("Unknown tool: {name}")));
        }
        Err(ToolError::Join(e)) => {
            metrics::record_tool_call(&name, false, started);
            tracing::error!(tool = %name, error = %e, "Tool task failed");
            return Err(RpcError::new(INTERNAL_ERROR, "Tool execution failed"));
        }
        Err(e) => {
            metrics::record_tool_call(&name, false, started);
            tracing::warn!(tool = %name, error = %e, "Tool returned an error");
            ToolResult::error(&e.to_string())
        }
    };

    serde_json::to_value(result).map_err(|e| RpcError::new(INTERNAL_ERROR, e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::store::SnapshotStore;
    use crate::vault::Vault;

    fn registry(dir: &tempfile::TempDir) -> ToolRegistry {
        ToolRegistry::new(
            Arc::new(SnapshotStore::in_memory()),
            Arc::new(Vault::new(dir.path(), 4096)),
        )
    }

    async fn rpc(registry: &ToolRegistry, body: Value) -> JsonRpcResponse {
        handle(registry, body.to_string().as_bytes()).await.unwrap()
    }

    #[tokio::test]
    async fn test_initialize_and_ping() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry(&dir);

        let init = rpc(&registry, json!({"jsonrpc": "2.0", "id": 1, "method": "initialize", "params": {}})).await;
        let result = init.result.unwrap();
        assert_eq!(result["protocolVersion"], PROTOCOL_VERSION);
        assert_eq!(result["serverInfo"]["name"], "memory-gateway");

        let ping = rpc(&registry, json!({"jsonrpc": "2.0", "id": "p", "method": "ping"})).await;
        assert_eq!(ping.id, json!("p"));
        assert_eq!(ping.result, Some(json!({})));
    }

    #[tokio::test]
    async fn test_notification_has_no_response() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry(&dir);
        let body = json!({"jsonrpc": "2.0", "method": "notifications/initialized"}).to_string();
        assert!(handle(&registry, body.as_bytes()).await.is_none());
    }

    #[tokio::test]
    async fn test_protocol_errors() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry(&dir);

        let parse = handle(&registry, b"{not json").await.unwrap();
        assert_eq!(parse.error.unwrap().code, PARSE_ERROR);
        assert_eq!(parse.id, Value::Null);

        let invalid = rpc(&registry, json!({"jsonrpc": "2.0", "id": 3})).await;
        assert_eq!(invalid.error.unwrap().code, INVALID_REQUEST);
        assert_eq!(invalid.id, json!(3));

        let unknown = rpc(&registry, json!({"jsonrpc": "2.0", "id": 4, "method": "resources/list"})).await;
        assert_eq!(unknown.error.unwrap().code, METHOD_NOT_FOUND);

        let no_name = rpc(&registry, json!({"jsonrpc": "2.0", "id": 5, "method": "tools/call", "params": {}})).await;
        assert_eq!(no_name.error.unwrap().code, INVALID_PARAMS);

        let bad_tool = rpc(
            &registry,
            json!({"jsonrpc": "2.0", "id": 6, "method": "tools/call", "params": {"name": "drop_tables"}}),
        )
        .await;
        assert_eq!(bad_tool.error.unwrap().code, INVALID_PARAMS);
    }

    #[tokio::test]
    async fn test_tools_list_and_call() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry(&dir);

        let list = rpc(&registry, json!({"jsonrpc": "2.0", "id": 1, "method": "tools/list"})).await;
        let tools = list.result.unwrap()["tools"].as_array().unwrap().len();
        assert_eq!(tools, 34);

        let call = rpc(
            &registry,
            json!({
                "jsonrpc": "2.0", "id": 2, "method": "tools/call",
                "params": {"name": "memory_add", "arguments": {"content": "first"}},
            }),
        )
        .await;
        let result: ToolResult = serde_json::from_value(call.result.unwrap()).unwrap();
        assert!(!result.is_error);
        let payload: Value = serde_json::from_str(&result.content[0].text).unwrap();
        assert_eq!(payload["memory"]["content"], "first");

        let failed = rpc(
            &registry,
            json!({
                "jsonrpc": "2.0", "id": 3, "method": "tools/call",
                "params": {"name": "memory_get", "arguments": {"row_id": "missing"}},
            }),
        )
        .await;
        let result: ToolResult = serde_json::from_value(failed.result.unwrap()).unwrap();
        assert!(result.is_error);
        assert!(result.content[0].text.contains("not found"));
    }
}
