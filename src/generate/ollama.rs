use anyhow::Context;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{ChatMessage, ChatModel, ChatRequest};
use crate::Result;

#[derive(Debug, Serialize)]
struct OllamaChatBody<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
    options: OllamaOptions,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    temperature: f32,
    num_predict: u32,
}

#[derive(Debug, Deserialize)]
struct OllamaChatResponse {
    message: Option<OllamaMessage>,
}

#[derive(Debug, Deserialize)]
struct OllamaMessage {
    #[serde(default)]
    content: String,
}

/// Chat client for an Ollama server (`/api/chat`)
pub struct OllamaChat {
    client: Client,
    base_url: String,
    model: String,
}

impl OllamaChat {
    pub fn new(base_url: &str, model: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client for Ollama")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.into(),
        })
    }
}

#[async_trait]
impl ChatModel for OllamaChat {
    async fn chat(&self, request: ChatRequest) -> Result<String> {
        let body = OllamaChatBody {
            model: &self.model,
            messages: &request.messages,
            stream: false,
            options: OllamaOptions {
                temperature: request.temperature,
                num_predict: request.max_tokens,
            },
        };

        let response = self
            .client
            .post(format!("{}/api/chat", self.base_url))
            .json(&body)
            .send()
            .await
            .context("Failed to reach Ollama")?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            anyhow::bail!("ollama returned {}: {}", status, error_text.trim());
        }

        let parsed: OllamaChatResponse = response
            .json()
            .await
            .context("Failed to parse Ollama response")?;

        Ok(parsed.message.map(|m| m.content).unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generate::{build_prompt, is_quota_error};
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn request() -> ChatRequest {
        ChatRequest {
            messages: build_prompt("transcript text"),
            temperature: 0.7,
            max_tokens: 1200,
        }
    }

    #[tokio::test]
    async fn test_chat_sends_options_and_reads_content() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .and(body_partial_json(json!({
                "model": "llama3.1",
                "stream": false,
                "options": { "num_predict": 1200 },
                "messages": [{ "role": "system" }, { "role": "user" }]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "model": "llama3.1",
                "message": { "role": "assistant", "content": "# Article" },
                "done": true
            })))
            .mount(&server)
            .await;

        let chat = OllamaChat::new(&server.uri(), "llama3.1", Duration::from_secs(5)).unwrap();
        assert_eq!(chat.chat(request()).await.unwrap(), "# Article");
    }

    #[tokio::test]
    async fn test_rate_limited_response_is_detectable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).set_body_json(json!({ "error": "too many requests" })))
            .mount(&server)
            .await;

        let chat = OllamaChat::new(&server.uri(), "llama3.1", Duration::from_secs(5)).unwrap();
        let err = chat.chat(request()).await.unwrap_err();
        assert!(is_quota_error(&err.to_string()));
    }

    #[tokio::test]
    async fn test_missing_message_is_empty() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "done": true })))
            .mount(&server)
            .await;

        let chat = OllamaChat::new(&server.uri(), "llama3.1", Duration::from_secs(5)).unwrap();
        assert_eq!(chat.chat(request()).await.unwrap(), "");
    }
}
