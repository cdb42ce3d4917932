//! ============================================================================
//! MCP Server - JSON-RPC 2.0 over newline-delimited stdio
//! ============================================================================
//! Exposes the tool gateway to a tool-invocation host. One request is read,
//! handled, and answered before the next line is read. Logging must go to
//! stderr; stdout carries protocol messages only.
//! ============================================================================

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, info, warn};

use crate::gateway::{GatewayError, ToolGateway};

pub const PROTOCOL_VERSION: &str = "2024-11-05";
pub const SERVER_NAME: &str = "chat-history-server";

const PARSE_ERROR: i64 = -32700;
const METHOD_NOT_FOUND: i64 = -32601;
const INVALID_PARAMS: i64 = -32602;
const INTERNAL_ERROR: i64 = -32603;

#[derive(Debug, Serialize, PartialEq)]
pub struct JsonRpcResponse {
    jsonrpc: &'static str,
    pub id: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct JsonRpcRequest {
    #[allow(dead_code)]
    jsonrpc: Option<String>,
    pub id: Option<Value>,
    pub method: String,
    pub params: Option<Value>,
}

impl JsonRpcResponse {
    fn result(id: Option<Value>, result: Value) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            result: Some(result),
            error: None,
        }
    }

    fn error(id: Option<Value>, code: i64, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            result: None,
            error: Some(JsonRpcError {
                code,
                message: message.into(),
            }),
        }
    }
}

/// Protocol adapter around a [`ToolGateway`]
pub struct McpServer {
    gateway: Arc<ToolGateway>,
}

impl McpServer {
    pub fn new(gateway: Arc<ToolGateway>) -> Self {
        Self { gateway }
    }

    /// Handle one request; `None` for notifications, which get no reply.
    /// Any request without an `id` is a notification.
    pub async fn handle_request(&self, request: JsonRpcRequest) -> Option<JsonRpcResponse> {
        if request.id.is_none() || request.method.starts_with("notifications/") {
            debug!("Notification: {}", request.method);
            return None;
        }

        let id = request.id;
        let params = request.params.unwrap_or(Value::Null);

        let response = match request.method.as_str() {
            "initialize" => JsonRpcResponse::result(id, self.initialize_result()),
            "ping" => JsonRpcResponse::result(id, json!({})),
            "tools/list" => {
                JsonRpcResponse::result(id, json!({ "tools": self.gateway.tool_definitions() }))
            }
            "tools/call" => self.handle_tools_call(id, &params).await,
            "resources/list" => {
                JsonRpcResponse::result(id, json!({ "resources": self.gateway.list_resources() }))
            }
            "resources/read" => self.handle_resources_read(id, &params).await,
            "prompts/list" => JsonRpcResponse::result(id, json!({ "prompts": [] })),
            other => JsonRpcResponse::error(id, METHOD_NOT_FOUND, format!("Method not found: {}", other)),
        };

        Some(response)
    }

    fn initialize_result(&self) -> Value {
        json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": {
                "tools": {},
                "resources": {}
            },
            "serverInfo": {
                "name": SERVER_NAME,
                "version": env!("CARGO_PKG_VERSION")
            }
        })
    }

    async fn handle_tools_call(&self, id: Option<Value>, params: &Value) -> JsonRpcResponse {
        let Some(name) = params.get("name").and_then(Value::as_str) else {
            return JsonRpcResponse::error(id, INVALID_PARAMS, "Missing tool name");
        };
        let arguments = match params.get("arguments") {
            None | Some(Value::Null) => json!({}),
            Some(args) => args.clone(),
        };

        match self.gateway.call_tool(name, &arguments).await {
            Ok(output) => {
                let content: Vec<Value> = output
                    .blocks
                    .into_iter()
                    .map(|text| json!({ "type": "text", "text": text }))
                    .collect();
                JsonRpcResponse::result(id, json!({ "content": content, "isError": output.is_error }))
            }
            Err(e) => JsonRpcResponse::error(id, INVALID_PARAMS, e.to_string()),
        }
    }

    async fn handle_resources_read(&self, id: Option<Value>, params: &Value) -> JsonRpcResponse {
        let Some(uri) = params.get("uri").and_then(Value::as_str) else {
            return JsonRpcResponse::error(id, INVALID_PARAMS, "Missing resource uri");
        };

        match self.gateway.read_resource(uri).await {
            Ok(text) => JsonRpcResponse::result(
                id,
                json!({
                    "contents": [{
                        "uri": uri,
                        "mimeType": "application/json",
                        "text": text
                    }]
                }),
            ),
            Err(e @ GatewayError::ResourceUnavailable { .. }) => {
                JsonRpcResponse::error(id, INTERNAL_ERROR, e.to_string())
            }
            Err(e) => JsonRpcResponse::error(id, INVALID_PARAMS, e.to_string()),
        }
    }

    /// Handle one raw line; `None` when nothing should be written back
    pub async fn handle_line(&self, line: &str) -> Option<String> {
        let response = match serde_json::from_str::<JsonRpcRequest>(line) {
            Ok(request) => self.handle_request(request).await?,
            Err(e) => JsonRpcResponse::error(None, PARSE_ERROR, format!("Parse error: {}", e)),
        };

        match serde_json::to_string(&response) {
            Ok(text) => Some(text),
            Err(e) => {
                warn!("Failed to serialize response: {}", e);
                None
            }
        }
    }

    /// Serve until the reader reaches EOF
    pub async fn serve<R, W>(&self, reader: R, mut writer: W) -> std::io::Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        info!("{} listening on stdio", SERVER_NAME);

        let mut lines = reader.lines();
        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }

            if let Some(reply) = self.handle_line(&line).await {
                writer.write_all(reply.as_bytes()).await?;
                writer.write_all(b"\n").await?;
                writer.flush().await?;
            }
        }

        info!("stdin closed, shutting down");
        Ok(())
    }

    /// Serve on the process's stdin/stdout
    pub async fn serve_stdio(&self) -> std::io::Result<()> {
        let stdin = tokio::io::BufReader::new(tokio::io::stdin());
        self.serve(stdin, tokio::io::stdout()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::{HistoryStore, LocalStore};
    use crate::test_support::{FailingBackend, FakeCompletion, HashEmbedder, TEST_DIMS};
    use tempfile::TempDir;

    async fn server(dir: &TempDir) -> McpServer {
        let backend = LocalStore::open(&dir.path().join("history.redb")).unwrap();
        let history = HistoryStore::open(Arc::new(backend), Arc::new(HashEmbedder), TEST_DIMS)
            .await
            .unwrap();
        let gateway = ToolGateway::new(Arc::new(history), Arc::new(FakeCompletion::answering()));
        McpServer::new(Arc::new(gateway))
    }

    async fn call(server: &McpServer, line: &str) -> Value {
        let reply = server.handle_line(line).await.expect("expected a reply");
        serde_json::from_str(&reply).unwrap()
    }

    #[tokio::test]
    async fn test_initialize() {
        let dir = TempDir::new().unwrap();
        let server = server(&dir).await;

        let reply = call(&server, r#"{"jsonrpc":"2.0","id":1,"method":"initialize","params":{}}"#).await;
        assert_eq!(reply["id"], 1);
        assert_eq!(reply["result"]["protocolVersion"], PROTOCOL_VERSION);
        assert_eq!(reply["result"]["serverInfo"]["name"], SERVER_NAME);
        assert!(reply.get("error").is_none());
    }

    #[tokio::test]
    async fn test_notifications_get_no_reply() {
        let dir = TempDir::new().unwrap();
        let server = server(&dir).await;
        let reply = server
            .handle_line(r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#)
            .await;
        assert!(reply.is_none());

        let reply = server.handle_line(r#"{"jsonrpc":"2.0","method":"ping"}"#).await;
        assert!(reply.is_none());

        let reply = server
            .handle_line(r#"{"jsonrpc":"2.0","method":"tools/call","params":{"name":"get_chat_stats"}}"#)
            .await;
        assert!(reply.is_none());
    }

    #[tokio::test]
    async fn test_tools_list() {
        let dir = TempDir::new().unwrap();
        let server = server(&dir).await;

        let reply = call(&server, r#"{"jsonrpc":"2.0","id":2,"method":"tools/list"}"#).await;
        let names: Vec<&str> = reply["result"]["tools"]
            .as_array()
            .unwrap()
            .iter()
            .map(|t| t["name"].as_str().unwrap())
            .collect();
        assert_eq!(names, vec!["search_chat_history", "ask_llm", "get_chat_stats"]);
    }

    #[tokio::test]
    async fn test_tools_call_round_trip() {
        let dir = TempDir::new().unwrap();
        let server = server(&dir).await;

        let reply = call(
            &server,
            r#"{"jsonrpc":"2.0","id":"a","method":"tools/call","params":{"name":"ask_llm","arguments":{"question":"2+2?","provider":"google"}}}"#,
        )
        .await;
        assert_eq!(reply["id"], "a");
        assert_eq!(reply["result"]["isError"], false);
        assert!(reply["result"]["content"][0]["text"]
            .as_str()
            .unwrap()
            .contains("Response from GOOGLE"));

        let reply = call(
            &server,
            r#"{"jsonrpc":"2.0","id":"b","method":"tools/call","params":{"name":"get_chat_stats"}}"#,
        )
        .await;
        let text = reply["result"]["content"][0]["text"].as_str().unwrap();
        assert!(text.contains("Total conversations: 1"));
        assert!(text.contains("- GOOGLE: 1"));
    }

    #[tokio::test]
    async fn test_unknown_tool_is_rpc_error() {
        let dir = TempDir::new().unwrap();
        let server = server(&dir).await;
        let reply = call(
            &server,
            r#"{"jsonrpc":"2.0","id":3,"method":"tools/call","params":{"name":"nope"}}"#,
        )
        .await;
        assert_eq!(reply["error"]["code"], INVALID_PARAMS);
        assert_eq!(reply["error"]["message"], "Unknown tool: nope");
    }

    #[tokio::test]
    async fn test_resources() {
        let dir = TempDir::new().unwrap();
        let server = server(&dir).await;

        let reply = call(&server, r#"{"jsonrpc":"2.0","id":4,"method":"resources/list"}"#).await;
        assert_eq!(reply["result"]["resources"][0]["uri"], "chat://history");

        let reply = call(
            &server,
            r#"{"jsonrpc":"2.0","id":5,"method":"resources/read","params":{"uri":"chat://history"}}"#,
        )
        .await;
        assert_eq!(reply["result"]["contents"][0]["text"], "[]");

        let reply = call(
            &server,
            r#"{"jsonrpc":"2.0","id":6,"method":"resources/read","params":{"uri":"chat://other"}}"#,
        )
        .await;
        assert_eq!(reply["error"]["code"], INVALID_PARAMS);
    }

    #[tokio::test]
    async fn test_resource_backend_failure_is_internal_error() {
        let history = HistoryStore::new(Arc::new(FailingBackend), Arc::new(HashEmbedder), TEST_DIMS);
        let gateway = ToolGateway::new(Arc::new(history), Arc::new(FakeCompletion::answering()));
        let server = McpServer::new(Arc::new(gateway));

        let reply = call(
            &server,
            r#"{"jsonrpc":"2.0","id":7,"method":"resources/read","params":{"uri":"chat://history"}}"#,
        )
        .await;
        assert_eq!(reply["error"]["code"], INTERNAL_ERROR);
    }

    #[tokio::test]
    async fn test_parse_error_and_unknown_method() {
        let dir = TempDir::new().unwrap();
        let server = server(&dir).await;

        let reply = call(&server, "{not json").await;
        assert_eq!(reply["error"]["code"], PARSE_ERROR);
        assert!(reply["id"].is_null());

        let reply = call(&server, r#"{"jsonrpc":"2.0","id":8,"method":"sampling/createMessage"}"#).await;
        assert_eq!(reply["error"]["code"], METHOD_NOT_FOUND);
    }

    #[tokio::test]
    async fn test_serve_writes_one_line_per_reply() {
        let dir = TempDir::new().unwrap();
        let server = server(&dir).await;

        let input = concat!(
            r#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#,
            "\n\n",
            r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#,
            "\n",
            r#"{"jsonrpc":"2.0","id":2,"method":"prompts/list"}"#,
            "\n"
        );
        let mut output = Vec::new();
        server.serve(input.as_bytes(), &mut output).await.unwrap();

        let text = String::from_utf8(output).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("\"id\":1"));
        assert!(lines[1].contains("\"prompts\":[]"));
    }
}
