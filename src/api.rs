//! HTTP API surface.
//!
//! This module owns request parsing and input validation while delegating
//! media conversion and inference to the configured backends. The pipeline
//! for `POST /transcribe` is straight-line: persist upload, convert,
//! transcribe, summarize, respond.

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use tower_http::cors::CorsLayer;
use tracing::{debug, info};

use crate::asr::{TranscribeRequest, Transcriber};
use crate::audio::validate_extension;
use crate::config::AppConfig;
use crate::error::AppError;
use crate::media::MediaConverter;
use crate::summarize::Summarizer;

/// Human-readable service name returned by health endpoints.
pub const APP_NAME: &str = "audio-brief-server";
/// Service version string returned by health endpoints.
pub const APP_VERSION: &str = "0.1.0";

/// Shared state injected into all route handlers.
pub struct AppState {
    /// Runtime configuration loaded at startup.
    pub cfg: AppConfig,
    /// Media-to-waveform converter (ffmpeg in production).
    pub converter: Arc<dyn MediaConverter>,
    /// Active speech-to-text backend.
    pub transcriber: Arc<dyn Transcriber>,
    /// Active summarization backend.
    pub summarizer: Arc<dyn Summarizer>,
}

impl AppState {
    /// Constructs shared handler state.
    pub fn new(
        cfg: AppConfig,
        converter: Arc<dyn MediaConverter>,
        transcriber: Arc<dyn Transcriber>,
        summarizer: Arc<dyn Summarizer>,
    ) -> Self {
        Self {
            cfg,
            converter,
            transcriber,
            summarizer,
        }
    }
}

/// Builds the Axum router for all public endpoints.
///
/// CORS is permissive because the service fronts browser clients directly.
pub fn build_router(state: Arc<AppState>) -> Router {
    let upload_limit = state.cfg.upload_max_bytes;
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/transcribe", post(transcribe))
        .layer(DefaultBodyLimit::max(upload_limit))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Root status endpoint (`GET /`).
pub async fn root(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let asr_model = Path::new(&state.cfg.asr_model)
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("unknown");

    Json(json!({
        "status": "ok",
        "name": APP_NAME,
        "version": APP_VERSION,
        "asr_model": asr_model,
        "summarizer_model": state.cfg.summarizer_model,
    }))
}

/// Alias status endpoint (`GET /health`).
pub async fn health(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    root(State(state)).await
}

/// Transcribes and summarizes an uploaded media file (`POST /transcribe`).
pub async fn transcribe(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<serde_json::Value>, AppError> {
    let started = Instant::now();

    let upload = parse_upload_form(&mut multipart).await?;
    let extension = validate_extension(&upload.filename)?;
    debug!(
        filename = %upload.filename,
        upload_bytes = upload.bytes.len(),
        "accepted upload"
    );

    let samples = state
        .converter
        .extract_waveform(&upload.bytes, &extension)
        .await?;

    let result = state
        .transcriber
        .transcribe(TranscribeRequest {
            audio_16khz_mono_f32: samples,
        })
        .await?;

    if result.text.is_empty() {
        return Err(AppError::inference(
            "transcription produced an empty transcript",
        ));
    }

    let summary = state.summarizer.summarize(&result.text).await?;

    info!(
        filename = %upload.filename,
        language = result.language.as_deref().unwrap_or("unknown"),
        transcript_chars = result.text.len(),
        summary_chars = summary.len(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "request completed"
    );

    Ok(Json(json!({
        "transcript": result.text,
        "summary": summary,
    })))
}

struct UploadForm {
    filename: String,
    bytes: Vec<u8>,
}

/// Parses and validates the multipart form for the transcribe endpoint.
async fn parse_upload_form(multipart: &mut Multipart) -> Result<UploadForm, AppError> {
    let mut filename: Option<String> = None;
    let mut file_bytes: Option<Vec<u8>> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| AppError::bad_multipart(format!("invalid multipart body: {err}")))?
    {
        let Some(name) = field.name().map(ToOwned::to_owned) else {
            continue;
        };

        if name == "file" {
            let field_filename = field.file_name().map(ToOwned::to_owned).unwrap_or_default();
            let bytes = field.bytes().await.map_err(|err| {
                AppError::bad_multipart(format!("failed to read file bytes: {err}"))
            })?;
            filename = Some(field_filename);
            file_bytes = Some(bytes.to_vec());
        }
    }

    let filename =
        filename.ok_or_else(|| AppError::invalid_request("no file part in request"))?;
    if filename.trim().is_empty() {
        return Err(AppError::invalid_request("no file selected"));
    }

    let bytes =
        file_bytes.ok_or_else(|| AppError::invalid_request("no file part in request"))?;
    if bytes.is_empty() {
        return Err(AppError::invalid_request("uploaded file is empty"));
    }

    Ok(UploadForm { filename, bytes })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use serde_json::Value;
    use tower::ServiceExt;

    use crate::asr::{TranscribeRequest, Transcriber, TranscriptResult};
    use crate::config::AppConfig;
    use crate::error::AppError;
    use crate::media::MediaConverter;
    use crate::summarize::Summarizer;

    use super::{build_router, AppState};

    struct MockConverter;

    #[async_trait]
    impl MediaConverter for MockConverter {
        async fn extract_waveform(
            &self,
            _bytes: &[u8],
            _extension: &str,
        ) -> Result<Vec<f32>, AppError> {
            Ok(vec![0.0; 16_000])
        }
    }

    struct MockTranscriber {
        text: &'static str,
    }

    #[async_trait]
    impl Transcriber for MockTranscriber {
        async fn transcribe(&self, _req: TranscribeRequest) -> Result<TranscriptResult, AppError> {
            Ok(TranscriptResult {
                text: self.text.to_string(),
                language: Some("en".to_string()),
            })
        }
    }

    struct MockSummarizer;

    #[async_trait]
    impl Summarizer for MockSummarizer {
        async fn summarize(&self, _transcript: &str) -> Result<String, AppError> {
            Ok("a short summary".to_string())
        }
    }

    fn test_cfg() -> AppConfig {
        AppConfig {
            host: "127.0.0.1".to_string(),
            port: 5000,
            upload_max_bytes: 1024 * 1024,
            ffmpeg_bin: "ffmpeg".to_string(),
            asr_model: "/tmp/ggml-base.bin".to_string(),
            asr_model_explicit: true,
            asr_auto_download: false,
            asr_hf_repo: "ggerganov/whisper.cpp".to_string(),
            asr_hf_filename: "ggml-base.bin".to_string(),
            asr_cache_dir: "/tmp".to_string(),
            hf_token: None,
            asr_parallelism: 1,
            summarizer_base_url: "http://127.0.0.1:11434/v1".to_string(),
            summarizer_model: "llama3.2".to_string(),
            summarizer_api_key: None,
            summary_max_tokens: 100,
        }
    }

    fn app(transcript: &'static str) -> axum::Router {
        let state = Arc::new(AppState::new(
            test_cfg(),
            Arc::new(MockConverter),
            Arc::new(MockTranscriber { text: transcript }),
            Arc::new(MockSummarizer),
        ));
        build_router(state)
    }

    fn multipart_request(body: String, boundary: &str) -> Request<Body> {
        Request::builder()
            .uri("/transcribe")
            .method("POST")
            .header(
                "Content-Type",
                format!("multipart/form-data; boundary={boundary}"),
            )
            .body(Body::from(body))
            .expect("request")
    }

    fn file_part_body(boundary: &str, filename: &str, content: &str) -> String {
        format!(
            "--{b}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{filename}\"\r\nContent-Type: application/octet-stream\r\n\r\n{content}\r\n--{b}--\r\n",
            b = boundary
        )
    }

    async fn parse_json_response(res: axum::response::Response) -> Value {
        let bytes = to_bytes(res.into_body(), 1024 * 1024)
            .await
            .expect("body bytes");
        serde_json::from_slice(&bytes).expect("json body")
    }

    #[tokio::test]
    async fn health_reports_ok() {
        let req = Request::builder()
            .uri("/health")
            .method("GET")
            .body(Body::empty())
            .expect("request");

        let res = app("hello world").oneshot(req).await.expect("response");
        assert_eq!(res.status(), StatusCode::OK);

        let payload = parse_json_response(res).await;
        assert_eq!(payload["status"], "ok");
        assert_eq!(payload["name"], "audio-brief-server");
    }

    #[tokio::test]
    async fn missing_file_part_returns_400_with_error() {
        let boundary = "X-BOUNDARY";
        let body = format!(
            "--{b}\r\nContent-Disposition: form-data; name=\"language\"\r\n\r\nen\r\n--{b}--\r\n",
            b = boundary
        );

        let res = app("hello world")
            .oneshot(multipart_request(body, boundary))
            .await
            .expect("response");
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);

        let payload = parse_json_response(res).await;
        assert!(payload["error"].as_str().is_some_and(|e| !e.is_empty()));
    }

    #[tokio::test]
    async fn empty_filename_returns_400() {
        let boundary = "X-BOUNDARY";
        let body = file_part_body(boundary, "", "RIFF____WAVE");

        let res = app("hello world")
            .oneshot(multipart_request(body, boundary))
            .await
            .expect("response");
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);

        let payload = parse_json_response(res).await;
        assert_eq!(payload["error"], "no file selected");
    }

    #[tokio::test]
    async fn empty_file_content_returns_400() {
        let boundary = "X-BOUNDARY";
        let body = file_part_body(boundary, "clip.wav", "");

        let res = app("hello world")
            .oneshot(multipart_request(body, boundary))
            .await
            .expect("response");
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);

        let payload = parse_json_response(res).await;
        assert_eq!(payload["error"], "uploaded file is empty");
    }

    #[tokio::test]
    async fn unsupported_extension_returns_415() {
        let boundary = "X-BOUNDARY";
        let body = file_part_body(boundary, "notes.txt", "not media");

        let res = app("hello world")
            .oneshot(multipart_request(body, boundary))
            .await
            .expect("response");
        assert_eq!(res.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
    }

    #[tokio::test]
    async fn successful_request_returns_transcript_and_summary() {
        let boundary = "X-BOUNDARY";
        let body = file_part_body(boundary, "lecture.mp4", "fake-media-bytes");

        let res = app("hello world")
            .oneshot(multipart_request(body, boundary))
            .await
            .expect("response");
        assert_eq!(res.status(), StatusCode::OK);

        let payload = parse_json_response(res).await;
        assert!(payload["transcript"]
            .as_str()
            .is_some_and(|t| !t.is_empty()));
        assert!(payload["summary"].as_str().is_some_and(|s| !s.is_empty()));
    }

    #[tokio::test]
    async fn empty_transcript_returns_500() {
        let boundary = "X-BOUNDARY";
        let body = file_part_body(boundary, "silence.wav", "fake-media-bytes");

        let res = app("")
            .oneshot(multipart_request(body, boundary))
            .await
            .expect("response");
        assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let payload = parse_json_response(res).await;
        assert!(payload["error"].as_str().is_some_and(|e| !e.is_empty()));
    }
}
