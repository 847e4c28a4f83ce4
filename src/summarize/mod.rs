//! Text-summarization seam.
//!
//! Mirrors the transcription seam: route handlers depend on the
//! [`Summarizer`] trait, the concrete backend talks to an OpenAI-compatible
//! chat-completions endpoint.

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::AppConfig;
use crate::error::AppError;

pub mod chat_api;

/// Backend contract implemented by summarization engines.
#[async_trait]
pub trait Summarizer: Send + Sync {
    /// Condenses a transcript into a short summary.
    async fn summarize(&self, transcript: &str) -> Result<String, AppError>;
}

/// Builds the configured summarization backend.
pub fn build_summarizer(cfg: &AppConfig) -> Result<Arc<dyn Summarizer>, AppError> {
    Ok(Arc::new(chat_api::ChatApiSummarizer::new(cfg)?))
}
