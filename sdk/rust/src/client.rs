use std::sync::atomic::{AtomicU64, Ordering};

use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInfo {
    pub name: String,
    pub description: String,
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

/// Decoded `tools/call` result.
#[derive(Debug, Clone)]
pub struct ToolOutput {
    /// The tool's JSON payload (parsed from the text content).
    pub value: Value,
    pub is_error: bool,
}

#[derive(Debug)]
pub enum ClientError {
    Http(reqwest::Error),
    /// Non-2xx status with the response body.
    Status(StatusCode, String),
    /// JSON-RPC error object.
    Rpc { code: i64, message: String },
    Decode(String),
}

impl std::fmt::Display for ClientError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClientError::Http(e) => write!(f, "HTTP error: {e}"),
            ClientError::Status(status, body) => write!(f, "Gateway returned {status}: {body}"),
            ClientError::Rpc { code, message } => write!(f, "RPC error {code}: {message}"),
            ClientError::Decode(msg) => write!(f, "Unexpected response: {msg}"),
        }
    }
}

impl std::error::Error for ClientError {}

impl From<reqwest::Error> for ClientError {
    fn from(e: reqwest::Error) -> Self {
        ClientError::Http(e)
    }
}

pub struct GatewayClient {
    client: Client,
    gateway_url: String,
    api_key: Option<String>,
    next_id: AtomicU64,
}

impl GatewayClient {
    pub fn new(gateway_url: &str) -> Self {
        Self {
            client: Client::new(),
            gateway_url: gateway_url.trim_end_matches('/').to_string(),
            api_key: None,
            next_id: AtomicU64::new(1),
        }
    }

    /// Send `Authorization: Bearer <key>` on every request.
    pub fn with_api_key(mut self, key: &str) -> Self {
        self.api_key = Some(key.to_string());
        self
    }

    fn authorize(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => builder.bearer_auth(key),
            None => builder,
        }
    }

    /// Raw GET, for callers that want to inspect status and headers.
    pub async fn get(&self, path: &str) -> Result<Response, reqwest::Error> {
        self.authorize(self.client.get(format!("{}{}", self.gateway_url, path)))
            .send()
            .await
    }

    pub async fn health(&self) -> Result<HealthResponse, ClientError> {
        let resp = self.get("/health").await?;
        let status = resp.status();
        let text = resp.text().await?;
        if !status.is_success() {
            return Err(ClientError::Status(status, text));
        }
        serde_json::from_str(&text).map_err(|e| ClientError::Decode(e.to_string()))
    }

    /// Send one JSON-RPC call and return its `result`.
    pub async fn rpc(&self, method: &str, params: Value) -> Result<Value, ClientError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({ "jsonrpc": "2.0", "id": id, "method": method, "params": params });

        let resp = self
            .authorize(self.client.post(format!("{}/mcp", self.gateway_url)))
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        let text = resp.text().await?;
        if !status.is_success() {
            return Err(ClientError::Status(status, text));
        }

        let mut reply: Value =
            serde_json::from_str(&text).map_err(|e| ClientError::Decode(e.to_string()))?;
        if let Some(error) = reply.get("error") {
            return Err(ClientError::Rpc {
                code: error.get("code").and_then(Value::as_i64).unwrap_or_default(),
                message: error
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
            });
        }
        reply
            .get_mut("result")
            .map(Value::take)
            .ok_or_else(|| ClientError::Decode("missing result".to_string()))
    }

    pub async fn list_tools(&self) -> Result<Vec<ToolInfo>, ClientError> {
        let mut result = self.rpc("tools/list", json!({})).await?;
        serde_json::from_value(result["tools"].take()).map_err(|e| ClientError::Decode(e.to_string()))
    }

    /// Call a tool. Tool-level failures come back as `is_error: true`, not `Err`.
    pub async fn call_tool(&self, name: &str, arguments: Value) -> Result<ToolOutput, ClientError> {
        let result = self
            .rpc("tools/call", json!({ "name": name, "arguments": arguments }))
            .await?;

        let is_error = result["isError"].as_bool().unwrap_or(false);
        let text = result["content"][0]["text"]
            .as_str()
            .ok_or_else(|| ClientError::Decode("missing text content".to_string()))?;
        let value = serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_string()));
        Ok(ToolOutput { value, is_error })
    }
}
