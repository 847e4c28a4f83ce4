mod api;
mod asr;
mod audio;
mod config;
mod error;
mod media;
mod model_store;
mod summarize;

use std::sync::Arc;

use tracing::info;

use crate::api::{build_router, AppState};
use crate::config::AppConfig;
use crate::media::FfmpegConverter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "audio_brief_server=info,axum=info".into()),
        )
        .compact()
        .init();

    let cfg = AppConfig::from_env()?;

    // Model download uses a blocking HTTP client; keep it off the runtime.
    let cfg = tokio::task::spawn_blocking(move || -> Result<AppConfig, error::AppError> {
        let mut cfg = cfg;
        model_store::ensure_model_ready(&mut cfg)?;
        Ok(cfg)
    })
    .await??;

    let converter = Arc::new(FfmpegConverter::new(cfg.ffmpeg_bin.clone()));
    let transcriber = asr::build_transcriber(&cfg)?;
    let summarizer = summarize::build_summarizer(&cfg)?;
    let state = Arc::new(AppState::new(cfg.clone(), converter, transcriber, summarizer));

    let app = build_router(state);

    let addr = format!("{}:{}", cfg.host, cfg.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    info!(
        host = %cfg.host,
        port = cfg.port,
        asr_model = %cfg.asr_model,
        summarizer_model = %cfg.summarizer_model,
        "starting audio-brief-server"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
            let _ = sigterm.recv().await;
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
