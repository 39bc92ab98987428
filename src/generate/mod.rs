//! Article generation from a transcript.

use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;

pub mod ollama;

pub use ollama::OllamaChat;

use crate::{Result, ScribeError};

const SYSTEM_PROMPT: &str = "You are a helpful writing assistant. \
Write a polished blog article based on a transcript. \
Make it read like a proper blog post (not a video script), \
with a clear intro, logical sections, and a concise conclusion. \
Do NOT mention that it was based on a transcript.";

const USER_PREAMBLE: &str = "Based on the following transcript from a YouTube video, \
write a comprehensive blog article. Structure with headings where appropriate.\n\n";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

/// One non-streaming chat call
#[derive(Debug, Clone, PartialEq)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    pub max_tokens: u32,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Returns the assistant message content
    async fn chat(&self, request: ChatRequest) -> Result<String>;
}

/// Fixed two-message prompt around the transcript
pub fn build_prompt(transcript: &str) -> Vec<ChatMessage> {
    vec![
        ChatMessage {
            role: Role::System,
            content: SYSTEM_PROMPT.to_string(),
        },
        ChatMessage {
            role: Role::User,
            content: format!("{}{}", USER_PREAMBLE, transcript),
        },
    ]
}

/// Whether an upstream failure message points at quota exhaustion or rate limiting
pub fn is_quota_error(message: &str) -> bool {
    let lower = message.to_lowercase();
    lower.contains("429 too many")
        || lower.contains(" 429 ")
        || lower.ends_with(" 429")
        || lower.contains("quota")
        || lower.contains("rate limit")
}

pub struct ArticleGenerator {
    model: Arc<dyn ChatModel>,
    temperature: f32,
    max_tokens: u32,
}

impl ArticleGenerator {
    pub fn new(model: Arc<dyn ChatModel>, temperature: f32, max_tokens: u32) -> Self {
        Self {
            model,
            temperature,
            max_tokens,
        }
    }

    pub async fn generate(&self, transcript: &str) -> std::result::Result<String, ScribeError> {
        let request = ChatRequest {
            messages: build_prompt(transcript),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };

        tracing::info!(transcript_chars = transcript.len(), "generating article");

        let content = self
            .model
            .chat(request)
            .await
            .map_err(|e| ScribeError::GenerationFailed(format!("{:#}", e)))?;

        let content = content.trim();
        if content.is_empty() {
            return Err(ScribeError::GenerationFailed(
                "model returned empty content".to_string(),
            ));
        }

        Ok(content.to_string())
    }
}
