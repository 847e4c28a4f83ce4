//! Speech-to-text seam.
//!
//! The HTTP layer depends on the [`Transcriber`] trait instead of a concrete
//! implementation, which keeps request handling decoupled from inference code.

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::AppConfig;
use crate::error::AppError;

pub mod whisper_rs;

/// Input payload consumed by a transcription backend.
#[derive(Debug, Clone)]
pub struct TranscribeRequest {
    /// Audio samples as 16 kHz mono PCM in `f32` range `[-1.0, 1.0]`.
    pub audio_16khz_mono_f32: Vec<f32>,
}

/// Inference result returned by a backend.
#[derive(Debug, Clone)]
pub struct TranscriptResult {
    /// Whitespace-normalized transcript text.
    pub text: String,
    /// Detected language if available.
    pub language: Option<String>,
}

/// Backend contract implemented by speech-to-text engines.
#[async_trait]
pub trait Transcriber: Send + Sync {
    /// Runs inference and returns a transcript result.
    async fn transcribe(&self, req: TranscribeRequest) -> Result<TranscriptResult, AppError>;
}

/// Builds the configured transcription backend.
pub fn build_transcriber(cfg: &AppConfig) -> Result<Arc<dyn Transcriber>, AppError> {
    Ok(Arc::new(whisper_rs::WhisperRsTranscriber::new(cfg)?))
}

/// Normalizes transcript text by collapsing all whitespace runs to one space.
pub fn normalize_text(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::normalize_text;

    #[test]
    fn normalize_collapses_spaces() {
        assert_eq!(
            normalize_text("  hello   world\nagain"),
            "hello world again"
        );
    }

    #[test]
    fn normalize_empty_input() {
        assert_eq!(normalize_text("   \n\t "), "");
    }
}
