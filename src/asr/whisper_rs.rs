//! `whisper-rs` transcription backend.
//!
//! Keeps a pool of Whisper contexts in memory and runs inference on blocking
//! worker threads.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::task;
use tracing::{info, warn};
use whisper_rs::{
    get_lang_str, FullParams, SamplingStrategy, WhisperContext, WhisperContextParameters,
    WhisperState,
};

use crate::asr::{normalize_text, TranscribeRequest, Transcriber, TranscriptResult};
use crate::config::AppConfig;
use crate::error::AppError;

/// Local inference backend powered by `whisper-rs`.
pub struct WhisperRsTranscriber {
    model_path: String,
    contexts: Vec<Arc<Mutex<WhisperContext>>>,
    next_context_idx: AtomicUsize,
}

impl WhisperRsTranscriber {
    /// Loads the configured model and prepares reusable contexts.
    pub fn new(cfg: &AppConfig) -> Result<Self, AppError> {
        let model_path = cfg.asr_model.clone();
        let mut contexts = Vec::with_capacity(cfg.asr_parallelism);

        for worker_idx in 0..cfg.asr_parallelism {
            let mut params = WhisperContextParameters::default();
            params.use_gpu(cfg!(any(feature = "metal", feature = "cuda")));

            let context = WhisperContext::new_with_params(&model_path, params).map_err(|err| {
                AppError::inference(format!(
                    "failed to load model at {model_path:?} for worker {}: {err}",
                    worker_idx + 1,
                ))
            })?;

            contexts.push(Arc::new(Mutex::new(context)));
        }

        info!(
            model = %model_path,
            asr_parallelism = cfg.asr_parallelism,
            "loaded speech-recognition model"
        );

        Ok(Self {
            model_path,
            contexts,
            next_context_idx: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl Transcriber for WhisperRsTranscriber {
    async fn transcribe(&self, req: TranscribeRequest) -> Result<TranscriptResult, AppError> {
        let model_path = self.model_path.clone();
        let context_idx =
            self.next_context_idx.fetch_add(1, Ordering::Relaxed) % self.contexts.len();
        let context = Arc::clone(&self.contexts[context_idx]);
        task::spawn_blocking(move || run_whisper(req, &model_path, context))
            .await
            .map_err(|err| AppError::inference(format!("whisper worker task failed: {err}")))?
    }
}

fn run_whisper(
    req: TranscribeRequest,
    model_path: &str,
    context: Arc<Mutex<WhisperContext>>,
) -> Result<TranscriptResult, AppError> {
    let context_guard = context
        .lock()
        .map_err(|_| AppError::inference("failed to lock whisper model context"))?;

    let mut state = context_guard
        .create_state()
        .map_err(|err| AppError::inference(format!("failed to create whisper state: {err}")))?;

    state
        .full(base_params(None), &req.audio_16khz_mono_f32)
        .map_err(|err| {
            AppError::inference(format!(
                "whisper inference failed using {model_path:?}: {err}"
            ))
        })?;

    let mut text = collect_text(&state)?;
    let mut fallback_language = None;

    // Auto-detect occasionally yields nothing on short clips; retry once
    // with a fixed language before giving up.
    if text.is_empty() {
        state
            .full(base_params(Some("en")), &req.audio_16khz_mono_f32)
            .map_err(|err| {
                AppError::inference(format!(
                    "whisper fallback inference failed using {model_path:?}: {err}"
                ))
            })?;

        let retried = collect_text(&state)?;
        if !retried.is_empty() {
            warn!(
                audio_samples = req.audio_16khz_mono_f32.len(),
                "whisper fallback used fixed language after empty auto-detect output"
            );
            text = retried;
            fallback_language = Some("en".to_string());
        }
    }

    if text.is_empty() {
        warn!(
            audio_samples = req.audio_16khz_mono_f32.len(),
            "whisper inference completed with empty transcript"
        );
    }

    let language = fallback_language
        .or_else(|| get_lang_str(state.full_lang_id_from_state()).map(ToOwned::to_owned));

    Ok(TranscriptResult { text, language })
}

fn base_params(language: Option<&str>) -> FullParams<'_, '_> {
    let mut params = FullParams::new(SamplingStrategy::Greedy { best_of: 1 });
    params.set_no_timestamps(true);
    params.set_print_special(false);
    params.set_print_progress(false);
    params.set_print_realtime(false);
    params.set_print_timestamps(false);
    match language {
        Some(language) => params.set_language(Some(language)),
        None => params.set_detect_language(true),
    }
    params
}

fn collect_text(state: &WhisperState) -> Result<String, AppError> {
    let count = state.full_n_segments();
    let mut pieces = Vec::with_capacity(count as usize);
    for i in 0..count {
        let Some(seg) = state.get_segment(i) else {
            continue;
        };
        let text = seg
            .to_str_lossy()
            .map_err(|err| AppError::inference(format!("failed to read segment text: {err}")))?
            .trim()
            .to_string();
        if text.is_empty() {
            continue;
        }
        pieces.push(text);
    }

    Ok(normalize_text(&pieces.join(" ")))
}
