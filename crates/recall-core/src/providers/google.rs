//! Google Gemini generateContent client.

use std::time::Duration;

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{http_client, read_body};

/// Client for `POST {base}/v1beta/models/{model}:generateContent`
pub struct GoogleClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl GoogleClient {
    pub fn new(api_key: String, base_url: &str, model: &str, timeout: Duration) -> Self {
        Self {
            client: http_client(timeout),
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
        }
    }

    pub async fn complete(&self, prompt: &str) -> Result<String> {
        debug!("Calling Gemini ({}) with {} chars", self.model, prompt.len());

        let request = GenerateContentRequest {
            contents: vec![Content {
                role: "user",
                parts: vec![Part {
                    text: prompt.to_string(),
                }],
            }],
        };

        let response = self
            .client
            .post(format!(
                "{}/v1beta/models/{}:generateContent",
                self.base_url, self.model
            ))
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| anyhow!("Failed to call Gemini API: {}", e.without_url()))?;

        let body = read_body(response, "Gemini").await?;
        parse_response(&body)
    }
}

/// Text of the first candidate, all parts joined
fn parse_response(body: &str) -> Result<String> {
    let response: GenerateContentResponse = serde_json::from_str(body)
        .map_err(|e| anyhow!("Failed to parse Gemini response: {}", e))?;

    let candidate = response
        .candidates
        .unwrap_or_default()
        .into_iter()
        .next()
        .ok_or_else(|| match response.prompt_feedback.and_then(|f| f.block_reason) {
            Some(reason) => anyhow!("Gemini blocked the prompt: {}", reason),
            None => anyhow!("No candidates in Gemini response"),
        })?;

    let text: String = candidate
        .content
        .map(|c| c.parts)
        .unwrap_or_default()
        .into_iter()
        .filter_map(|p| p.text)
        .collect();

    if text.is_empty() {
        return Err(anyhow!("Gemini candidate had no text"));
    }
    Ok(text)
}

#[derive(Serialize)]
struct GenerateContentRequest {
    contents: Vec<Content>,
}

#[derive(Serialize)]
struct Content {
    role: &'static str,
    parts: Vec<Part>,
}

#[derive(Serialize)]
struct Part {
    text: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    candidates: Option<Vec<Candidate>>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_joins_parts() {
        let body = r#"{
            "candidates": [{
                "content": {"role": "model", "parts": [{"text": "Four"}, {"text": "."}]},
                "finishReason": "STOP"
            }],
            "usageMetadata": {"totalTokenCount": 7}
        }"#;
        assert_eq!(parse_response(body).unwrap(), "Four.");
    }

    #[test]
    fn test_parse_blocked_prompt() {
        let body = r#"{"promptFeedback": {"blockReason": "SAFETY"}}"#;
        let err = parse_response(body).unwrap_err();
        assert!(err.to_string().contains("SAFETY"));
    }

    #[tokio::test]
    async fn test_transport_error_does_not_leak_key() {
        let client = GoogleClient::new(
            "SECRET-GOOGLE-KEY".to_string(),
            "http://127.0.0.1:1",
            "gemini-pro",
            Duration::from_secs(5),
        );
        let err = client.complete("hi").await.unwrap_err();
        let text = format!("{:#}", err);
        assert!(text.starts_with("Failed to call Gemini API"));
        assert!(!text.contains("SECRET-GOOGLE-KEY"));
    }

    #[test]
    fn test_parse_empty_candidate() {
        let body = r#"{"candidates": [{"finishReason": "MAX_TOKENS"}]}"#;
        assert!(parse_response(body).is_err());
    }
}
