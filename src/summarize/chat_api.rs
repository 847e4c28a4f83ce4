//! OpenAI-compatible chat-completions summarization backend.
//!
//! Works against a local Ollama server by default; any endpoint speaking the
//! `/chat/completions` wire format can be configured instead.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::AppConfig;
use crate::error::AppError;
use crate::summarize::Summarizer;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

const SYSTEM_PROMPT: &str = "You are a summarization engine. Condense the transcript you are \
given into one concise paragraph of roughly 30 to 100 words. Respond with the summary text \
only, without preamble.";

/// Summarization backend that posts to an OpenAI-compatible endpoint.
pub struct ChatApiSummarizer {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: Option<String>,
    max_tokens: usize,
}

impl ChatApiSummarizer {
    pub fn new(cfg: &AppConfig) -> Result<Self, AppError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|err| {
                AppError::internal(format!("failed to create summarizer HTTP client: {err}"))
            })?;

        Ok(Self {
            client,
            endpoint: chat_completions_url(&cfg.summarizer_base_url),
            model: cfg.summarizer_model.clone(),
            api_key: cfg.summarizer_api_key.clone(),
            max_tokens: cfg.summary_max_tokens,
        })
    }
}

#[async_trait]
impl Summarizer for ChatApiSummarizer {
    async fn summarize(&self, transcript: &str) -> Result<String, AppError> {
        let body = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: transcript,
                },
            ],
            temperature: 0.0,
            max_tokens: self.max_tokens,
        };

        let mut request = self.client.post(&self.endpoint).json(&body);
        if let Some(key) = self.api_key.as_deref() {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|err| {
            AppError::inference(format!(
                "summarization request to {} failed: {err}",
                self.endpoint
            ))
        })?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(AppError::inference(format!(
                "summarization endpoint returned {status}: {}",
                detail.trim()
            )));
        }

        let parsed = response.json::<ChatResponse>().await.map_err(|err| {
            AppError::inference(format!("invalid summarization response: {err}"))
        })?;

        let summary = extract_summary(&parsed)?;
        debug!(model = %self.model, summary_chars = summary.len(), "summary generated");
        Ok(summary)
    }
}

fn chat_completions_url(base_url: &str) -> String {
    format!("{}/chat/completions", base_url.trim_end_matches('/'))
}

fn extract_summary(response: &ChatResponse) -> Result<String, AppError> {
    let summary = response
        .choices
        .first()
        .map(|choice| choice.message.content.trim().to_string())
        .unwrap_or_default();

    if summary.is_empty() {
        return Err(AppError::inference(
            "summarization endpoint returned an empty summary",
        ));
    }

    Ok(summary)
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: usize,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    content: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_join_handles_trailing_slash() {
        assert_eq!(
            chat_completions_url("http://127.0.0.1:11434/v1/"),
            "http://127.0.0.1:11434/v1/chat/completions"
        );
        assert_eq!(
            chat_completions_url("https://api.example.com/v1"),
            "https://api.example.com/v1/chat/completions"
        );
    }

    #[test]
    fn parses_completion_response() {
        let raw = r#"{
            "choices": [
                {"message": {"role": "assistant", "content": "  A short summary.  "}}
            ]
        }"#;
        let parsed: ChatResponse = serde_json::from_str(raw).expect("parse");
        assert_eq!(extract_summary(&parsed).unwrap(), "A short summary.");
    }

    #[test]
    fn rejects_empty_choices() {
        let parsed: ChatResponse = serde_json::from_str(r#"{"choices": []}"#).expect("parse");
        assert!(extract_summary(&parsed).is_err());
    }

    #[test]
    fn request_serializes_expected_fields() {
        let body = ChatRequest {
            model: "llama3.2",
            messages: vec![ChatMessage {
                role: "user",
                content: "transcript",
            }],
            temperature: 0.0,
            max_tokens: 100,
        };
        let value = serde_json::to_value(&body).expect("serialize");
        assert_eq!(value["model"], "llama3.2");
        assert_eq!(value["max_tokens"], 100);
        assert_eq!(value["messages"][0]["role"], "user");
    }
}
