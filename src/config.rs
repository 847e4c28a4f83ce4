//! Configuration loading from environment variables.
//!
//! Values are intentionally validated early so startup fails fast with
//! actionable errors.

use crate::error::AppError;
use std::env;

pub const DEFAULT_ASR_PARALLELISM: usize = 1;
pub const MAX_ASR_PARALLELISM: usize = 8;

const DEFAULT_UPLOAD_MAX_BYTES: usize = 100 * 1024 * 1024;
const MAX_UPLOAD_MAX_BYTES: usize = 1024 * 1024 * 1024;

const DEFAULT_SUMMARY_MAX_TOKENS: usize = 100;
const MAX_SUMMARY_MAX_TOKENS: usize = 4096;

/// Runtime configuration for the HTTP server and both inference backends.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Host interface to bind, for example `0.0.0.0`.
    pub host: String,
    /// TCP port to bind.
    pub port: u16,
    /// Maximum accepted upload body size in bytes.
    pub upload_max_bytes: usize,
    /// Name or path of the ffmpeg binary used for media conversion.
    pub ffmpeg_bin: String,
    /// Path to a speech-recognition model file on disk.
    pub asr_model: String,
    /// Whether `asr_model` came from explicit `ASR_MODEL`.
    pub asr_model_explicit: bool,
    /// Enables startup download when the model file is missing.
    pub asr_auto_download: bool,
    /// Hugging Face repository used for model download.
    pub asr_hf_repo: String,
    /// Model filename in the Hugging Face repository.
    pub asr_hf_filename: String,
    /// Local cache directory for downloaded models.
    pub asr_cache_dir: String,
    /// Optional Hugging Face token for authenticated model downloads.
    pub hf_token: Option<String>,
    /// Number of parallel ASR inference workers.
    pub asr_parallelism: usize,
    /// Base URL of the OpenAI-compatible summarization endpoint.
    pub summarizer_base_url: String,
    /// Model identifier sent to the summarization endpoint.
    pub summarizer_model: String,
    /// Optional bearer token for the summarization endpoint.
    pub summarizer_api_key: Option<String>,
    /// Token budget for generated summaries.
    pub summary_max_tokens: usize,
}

impl AppConfig {
    /// Builds configuration from environment variables.
    ///
    /// Variables:
    /// - `HOST` (default `0.0.0.0`)
    /// - `PORT` (default `5000`)
    /// - `UPLOAD_MAX_BYTES` (default 100 MiB)
    /// - `FFMPEG_BIN` (default `ffmpeg`)
    /// - `ASR_MODEL` (optional explicit local model path)
    /// - `ASR_AUTO_DOWNLOAD` (default `true`)
    /// - `ASR_HF_REPO` (default `ggerganov/whisper.cpp`)
    /// - `ASR_HF_FILENAME` (default `ggml-base.bin`)
    /// - `ASR_CACHE_DIR` (default `$HOME/.cache/whispercpp/models`)
    /// - `HF_TOKEN` (optional Hugging Face token)
    /// - `ASR_PARALLELISM` (default `1`, min `1`, max `8`)
    /// - `SUMMARIZER_BASE_URL` (default `http://127.0.0.1:11434/v1`)
    /// - `SUMMARIZER_MODEL` (default `llama3.2`)
    /// - `SUMMARIZER_API_KEY` (optional)
    /// - `SUMMARY_MAX_TOKENS` (default `100`)
    pub fn from_env() -> Result<Self, AppError> {
        let host = env_str("HOST", "0.0.0.0");
        let port = env_u16("PORT", 5000)?;
        let upload_max_bytes = env_usize_bounded(
            "UPLOAD_MAX_BYTES",
            DEFAULT_UPLOAD_MAX_BYTES,
            1024,
            MAX_UPLOAD_MAX_BYTES,
        )?;
        let ffmpeg_bin = env_str("FFMPEG_BIN", "ffmpeg");

        let asr_auto_download = env_bool("ASR_AUTO_DOWNLOAD", true)?;
        let asr_hf_repo = env_str("ASR_HF_REPO", "ggerganov/whisper.cpp");
        let asr_hf_filename = env_str("ASR_HF_FILENAME", "ggml-base.bin");
        let asr_cache_dir = env_str("ASR_CACHE_DIR", &default_asr_cache_dir());
        let asr_model_explicit = env_opt("ASR_MODEL").is_some();
        let asr_model = env_opt("ASR_MODEL")
            .unwrap_or_else(|| format!("{}/{}", asr_cache_dir, asr_hf_filename));
        let asr_parallelism = env_usize_bounded(
            "ASR_PARALLELISM",
            DEFAULT_ASR_PARALLELISM,
            1,
            MAX_ASR_PARALLELISM,
        )?;

        let summarizer_base_url = env_str("SUMMARIZER_BASE_URL", "http://127.0.0.1:11434/v1");
        let summarizer_model = env_str("SUMMARIZER_MODEL", "llama3.2");
        let summary_max_tokens = env_usize_bounded(
            "SUMMARY_MAX_TOKENS",
            DEFAULT_SUMMARY_MAX_TOKENS,
            1,
            MAX_SUMMARY_MAX_TOKENS,
        )?;

        Ok(Self {
            host,
            port,
            upload_max_bytes,
            ffmpeg_bin,
            asr_model,
            asr_model_explicit,
            asr_auto_download,
            asr_hf_repo,
            asr_hf_filename,
            asr_cache_dir,
            hf_token: env_opt("HF_TOKEN"),
            asr_parallelism,
            summarizer_base_url,
            summarizer_model,
            summarizer_api_key: env_opt("SUMMARIZER_API_KEY"),
            summary_max_tokens,
        })
    }
}

fn default_asr_cache_dir() -> String {
    format!(
        "{}/.cache/whispercpp/models",
        std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string())
    )
}

fn env_str(name: &str, default: &str) -> String {
    match env::var(name) {
        Ok(value) => {
            let trimmed = value.trim();
            if trimmed.is_empty() {
                default.to_string()
            } else {
                trimmed.to_string()
            }
        }
        Err(_) => default.to_string(),
    }
}

fn env_opt(name: &str) -> Option<String> {
    match env::var(name) {
        Ok(value) => {
            let trimmed = value.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_string())
            }
        }
        Err(_) => None,
    }
}

fn env_u16(name: &str, default: u16) -> Result<u16, AppError> {
    let raw = env::var(name).unwrap_or_else(|_| default.to_string());
    let parsed = raw.trim().parse::<u16>().map_err(|_| {
        AppError::internal(format!("invalid {name}={raw:?}; expected integer 1-65535"))
    })?;
    if parsed == 0 {
        return Err(AppError::internal(format!(
            "invalid {name}={raw:?}; expected > 0"
        )));
    }
    Ok(parsed)
}

fn env_bool(name: &str, default: bool) -> Result<bool, AppError> {
    let raw = env::var(name).unwrap_or_else(|_| default.to_string());
    let normalized = raw.trim().to_ascii_lowercase();
    match normalized.as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(AppError::internal(format!(
            "invalid {name}={raw:?}; expected true/false"
        ))),
    }
}

fn env_usize_bounded(
    name: &str,
    default: usize,
    min: usize,
    max: usize,
) -> Result<usize, AppError> {
    let raw = env::var(name).unwrap_or_else(|_| default.to_string());
    parse_usize_bounded(name, &raw, min, max)
}

fn parse_usize_bounded(name: &str, raw: &str, min: usize, max: usize) -> Result<usize, AppError> {
    let trimmed = raw.trim();
    let parsed = trimmed.parse::<usize>().map_err(|_| {
        AppError::internal(format!(
            "invalid {name}={raw:?}; expected integer in range [{min}, {max}]"
        ))
    })?;
    if parsed < min || parsed > max {
        return Err(AppError::internal(format!(
            "invalid {name}={raw:?}; expected integer in range [{min}, {max}]"
        )));
    }
    Ok(parsed)
}
