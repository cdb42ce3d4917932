//! ============================================================================
//! Tool Gateway - Host-invoked operations over the chat history
//! ============================================================================
//! - search_chat_history: semantic search over past exchanges
//! - ask_llm: ask a provider, store the exchange, return the answer
//! - get_chat_stats: total and per-provider counts
//!
//! Operation failures become text results. Only an unknown tool name or a
//! failed resource read is a hard error.
//! ============================================================================

use std::sync::Arc;

use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::history::HistoryStore;
use crate::providers::Completion;
use crate::types::{HistoryStats, LlmProvider, SearchHit};

pub const DEFAULT_SEARCH_LIMIT: usize = 5;
pub const RESPONSE_PREVIEW_CHARS: usize = 200;
pub const HISTORY_RESOURCE_URI: &str = "chat://history";
pub const HISTORY_RESOURCE_SIZE: usize = 10;

pub const NO_RESULTS: &str = "No similar conversations found.";
pub const MISSING_QUESTION: &str = "Please provide a question to ask.";
pub const MISSING_QUERY: &str = "Please provide a search query.";

/// Text blocks returned by a tool call
#[derive(Debug, Clone, PartialEq)]
pub struct ToolOutput {
    pub blocks: Vec<String>,
    pub is_error: bool,
}

impl ToolOutput {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            blocks: vec![text.into()],
            is_error: false,
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self {
            blocks: vec![text.into()],
            is_error: true,
        }
    }

    /// All blocks joined, for terminals
    pub fn joined(&self) -> String {
        self.blocks.join("\n\n")
    }
}

/// Hard failures surfaced to the host
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Unknown resource: {0}")]
    UnknownResource(String),

    #[error("Failed to read resource {uri}: {message}")]
    ResourceUnavailable { uri: String, message: String },
}

/// Stateless adapter from tool calls to the history store
pub struct ToolGateway {
    history: Arc<HistoryStore>,
    llm: Arc<dyn Completion>,
}

impl ToolGateway {
    pub fn new(history: Arc<HistoryStore>, llm: Arc<dyn Completion>) -> Self {
        Self { history, llm }
    }

    pub fn history(&self) -> &HistoryStore {
        &self.history
    }

    /// JSON schema for each tool
    pub fn tool_definitions(&self) -> Vec<Value> {
        let providers: Vec<&str> = LlmProvider::ALL.iter().map(|p| p.as_str()).collect();

        vec![
            json!({
                "name": "search_chat_history",
                "description": "Search through past chat conversations using semantic similarity",
                "inputSchema": {
                    "type": "object",
                    "properties": {
                        "query": {
                            "type": "string",
                            "description": "The search query to find similar past conversations"
                        },
                        "limit": {
                            "type": "integer",
                            "minimum": 1,
                            "description": "Maximum number of results to return (default: 5)",
                            "default": DEFAULT_SEARCH_LIMIT
                        }
                    },
                    "required": ["query"]
                }
            }),
            json!({
                "name": "ask_llm",
                "description": "Ask a question to an LLM provider and store the response",
                "inputSchema": {
                    "type": "object",
                    "properties": {
                        "question": {
                            "type": "string",
                            "description": "The question to ask the LLM"
                        },
                        "provider": {
                            "type": "string",
                            "description": "LLM provider to use",
                            "enum": providers,
                            "default": LlmProvider::OpenAi.as_str()
                        }
                    },
                    "required": ["question"]
                }
            }),
            json!({
                "name": "get_chat_stats",
                "description": "Get statistics about stored chat history",
                "inputSchema": {
                    "type": "object",
                    "properties": {}
                }
            }),
        ]
    }

    /// Route a tool call by name
    pub async fn call_tool(&self, name: &str, arguments: &Value) -> Result<ToolOutput, GatewayError> {
        debug!("Tool call: {}", name);

        match name {
            "search_chat_history" => {
                let query = arguments.get("query").and_then(Value::as_str).unwrap_or("");
                let limit = match parse_limit(arguments.get("limit")) {
                    Ok(limit) => limit,
                    Err(message) => return Ok(ToolOutput::error(message)),
                };
                Ok(self.search_chat_history(query, limit).await)
            }
            "ask_llm" => {
                let question = arguments.get("question").and_then(Value::as_str).unwrap_or("");
                let provider = match arguments.get("provider") {
                    None | Some(Value::Null) => LlmProvider::OpenAi.as_str().to_string(),
                    Some(Value::String(s)) => s.clone(),
                    Some(other) => other.to_string(),
                };
                Ok(self.ask_llm(question, &provider).await)
            }
            "get_chat_stats" => Ok(self.get_chat_stats().await),
            other => Err(GatewayError::UnknownTool(other.to_string())),
        }
    }

    pub async fn search_chat_history(&self, query: &str, limit: usize) -> ToolOutput {
        if query.trim().is_empty() {
            return ToolOutput::error(MISSING_QUERY);
        }

        match self.history.search(query, limit).await {
            Ok(hits) if hits.is_empty() => ToolOutput::text(NO_RESULTS),
            Ok(hits) => ToolOutput::text(format_search_results(&hits)),
            Err(e) => ToolOutput::error(format!("Error searching chat history: {}", e)),
        }
    }

    pub async fn ask_llm(&self, question: &str, provider: &str) -> ToolOutput {
        if question.is_empty() {
            return ToolOutput::text(MISSING_QUESTION);
        }

        let provider = match provider.parse::<LlmProvider>() {
            Ok(p) => p,
            Err(_) => return ToolOutput::error(format!("Unknown provider: {}", provider)),
        };

        let answer = match self.llm.complete(provider, question).await {
            Ok(answer) => answer,
            Err(e) => return ToolOutput::error(format!("Error asking {}: {}", provider, e)),
        };

        let mut output = ToolOutput::text(format!(
            "**Question:** {}\n\n**Response from {}:**\n{}",
            question,
            provider.as_str().to_uppercase(),
            answer
        ));

        match self.history.index(question, &answer, provider).await {
            Ok(record) => debug!("Stored exchange {}", record.id),
            Err(e) => {
                warn!("Answer from {} was not saved: {}", provider, e);
                output.blocks.push(format!(
                    "Note: this exchange could not be saved to chat history: {}",
                    e
                ));
            }
        }

        output
    }

    pub async fn get_chat_stats(&self) -> ToolOutput {
        match self.history.stats().await {
            Ok(stats) => ToolOutput::text(format_stats(&stats)),
            Err(e) => ToolOutput::error(format!("Error getting stats: {}", e)),
        }
    }

    /// Resources advertised to the host
    pub fn list_resources(&self) -> Vec<Value> {
        vec![json!({
            "uri": HISTORY_RESOURCE_URI,
            "name": "Chat History",
            "description": "Access to stored chat history and responses",
            "mimeType": "application/json"
        })]
    }

    /// Pretty JSON for a known resource
    pub async fn read_resource(&self, uri: &str) -> Result<String, GatewayError> {
        if uri != HISTORY_RESOURCE_URI {
            return Err(GatewayError::UnknownResource(uri.to_string()));
        }

        let unavailable = |message: String| GatewayError::ResourceUnavailable {
            uri: uri.to_string(),
            message,
        };

        let recent = self
            .history
            .recent(HISTORY_RESOURCE_SIZE)
            .await
            .map_err(|e| unavailable(e.to_string()))?;

        info!("Serving {} recent chats", recent.len());
        serde_json::to_string_pretty(&recent).map_err(|e| unavailable(e.to_string()))
    }
}

/// Positive integer, defaulting when absent
fn parse_limit(value: Option<&Value>) -> Result<usize, String> {
    let value = match value {
        None | Some(Value::Null) => return Ok(DEFAULT_SEARCH_LIMIT),
        Some(v) => v,
    };

    let limit = value.as_u64().or_else(|| {
        value
            .as_f64()
            .filter(|f| f.fract() == 0.0 && *f >= 1.0 && *f <= u32::MAX as f64)
            .map(|f| f as u64)
    });

    match limit {
        Some(n) if n > 0 => Ok(n as usize),
        _ => Err(format!(
            "Invalid limit: {}. Expected a positive integer.",
            value
        )),
    }
}

/// Cut to `RESPONSE_PREVIEW_CHARS` characters, marking the cut
pub fn truncate_response(response: &str) -> String {
    match response.char_indices().nth(RESPONSE_PREVIEW_CHARS) {
        Some((cut, _)) => format!("{}...", &response[..cut]),
        None => response.to_string(),
    }
}

pub fn format_search_results(hits: &[SearchHit]) -> String {
    let mut text = format!("Found {} similar conversations:\n\n", hits.len());

    for (i, hit) in hits.iter().enumerate() {
        let chat = &hit.chat;
        text.push_str(&format!(
            "{}. **[{}]** {}\n",
            i + 1,
            chat.provider.as_str().to_uppercase(),
            chat.timestamp.to_rfc3339()
        ));
        text.push_str(&format!("   **Q:** {}\n", chat.query));
        text.push_str(&format!("   **A:** {}\n\n", truncate_response(&chat.response)));
    }

    text
}

pub fn format_stats(stats: &HistoryStats) -> String {
    let mut text = String::from("**Chat History Statistics:**\n\n");
    text.push_str(&format!("Total conversations: {}\n\n", stats.total));
    text.push_str("**By Provider:**\n");
    for (provider, count) in &stats.by_provider {
        text.push_str(&format!("- {}: {}\n", provider.as_str().to_uppercase(), count));
    }
    text
}
