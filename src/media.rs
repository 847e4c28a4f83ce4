//! Temp-file handling and the ffmpeg process boundary.
//!
//! Uploaded bytes are written to a uniquely named temp file, converted to a
//! 16 kHz mono WAV by an external ffmpeg process, then decoded to samples.
//! Both temp files are `tempfile::TempPath`s, so removal happens on drop on
//! every exit path and removal failures are ignored.

use std::ffi::OsString;
use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use tempfile::TempPath;
use tokio::process::Command;
use tokio::task;
use tracing::debug;

use crate::audio::{self, TARGET_SAMPLE_RATE};
use crate::error::AppError;

/// Converts uploaded media bytes into normalized ASR input samples.
///
/// The HTTP layer depends on this trait so route handlers can be exercised
/// without a real ffmpeg binary.
#[async_trait]
pub trait MediaConverter: Send + Sync {
    /// Produces 16 kHz mono f32 samples from raw upload bytes.
    async fn extract_waveform(&self, bytes: &[u8], extension: &str) -> Result<Vec<f32>, AppError>;
}

/// ffmpeg-backed converter used in production.
pub struct FfmpegConverter {
    ffmpeg_bin: String,
}

impl FfmpegConverter {
    pub fn new(ffmpeg_bin: impl Into<String>) -> Self {
        Self {
            ffmpeg_bin: ffmpeg_bin.into(),
        }
    }
}

#[async_trait]
impl MediaConverter for FfmpegConverter {
    async fn extract_waveform(&self, bytes: &[u8], extension: &str) -> Result<Vec<f32>, AppError> {
        let input = persist_upload(bytes, extension).await?;
        let wav = convert_to_wav(&self.ffmpeg_bin, &input).await?;

        let wav_path = wav.to_path_buf();
        let samples = task::spawn_blocking(move || audio::read_wav_mono_16khz_f32(&wav_path))
            .await
            .map_err(|err| AppError::internal(format!("audio decode task failed: {err}")))??;

        debug!(samples = samples.len(), "extracted waveform from upload");
        Ok(samples)
    }
}

/// Writes upload bytes to a temp file that keeps the original extension.
///
/// The extension matters: ffmpeg picks the demuxer from it.
pub async fn persist_upload(bytes: &[u8], extension: &str) -> Result<TempPath, AppError> {
    let file = tempfile::Builder::new()
        .prefix("brief-upload-")
        .suffix(&format!(".{extension}"))
        .tempfile()
        .map_err(|err| AppError::internal(format!("failed to create upload temp file: {err}")))?;
    let path = file.into_temp_path();

    tokio::fs::write(&path, bytes)
        .await
        .map_err(|err| AppError::internal(format!("failed to write upload temp file: {err}")))?;

    Ok(path)
}

/// Runs ffmpeg to resample/remix the input into a 16 kHz mono WAV temp file.
pub async fn convert_to_wav(ffmpeg_bin: &str, input: &Path) -> Result<TempPath, AppError> {
    let file = tempfile::Builder::new()
        .prefix("brief-audio-")
        .suffix(".wav")
        .tempfile()
        .map_err(|err| AppError::internal(format!("failed to create audio temp file: {err}")))?;
    let wav_path = file.into_temp_path();

    let output = Command::new(ffmpeg_bin)
        .args(ffmpeg_args(input, &wav_path))
        .stdin(Stdio::null())
        .output()
        .await
        .map_err(|err| {
            AppError::conversion(format!("failed to run {ffmpeg_bin:?}: {err}"))
        })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(AppError::conversion(format!(
            "ffmpeg exited with {}: {}",
            output.status,
            stderr.trim()
        )));
    }

    Ok(wav_path)
}

fn ffmpeg_args(input: &Path, output: &Path) -> Vec<OsString> {
    vec![
        OsString::from("-i"),
        input.as_os_str().to_owned(),
        OsString::from("-ar"),
        OsString::from(TARGET_SAMPLE_RATE.to_string()),
        OsString::from("-ac"),
        OsString::from("1"),
        output.as_os_str().to_owned(),
        OsString::from("-y"),
        OsString::from("-loglevel"),
        OsString::from("error"),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ffmpeg_args_request_16khz_mono() {
        let args = ffmpeg_args(Path::new("/tmp/in.mp3"), Path::new("/tmp/out.wav"));
        let args = args
            .iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect::<Vec<_>>();
        assert_eq!(
            args,
            vec![
                "-i",
                "/tmp/in.mp3",
                "-ar",
                "16000",
                "-ac",
                "1",
                "/tmp/out.wav",
                "-y",
                "-loglevel",
                "error",
            ]
        );
    }

    #[tokio::test]
    async fn persist_upload_writes_and_removes_on_drop() {
        let path = persist_upload(b"payload", "mp3").await.expect("persist");
        let on_disk = path.to_path_buf();

        assert!(on_disk.exists());
        assert!(on_disk.to_string_lossy().ends_with(".mp3"));
        assert_eq!(std::fs::read(&on_disk).expect("read back"), b"payload");

        drop(path);
        assert!(!on_disk.exists());
    }

    #[tokio::test]
    async fn convert_reports_missing_binary() {
        let input = persist_upload(b"payload", "mp3").await.expect("persist");
        let err = convert_to_wav("ffmpeg-binary-that-does-not-exist", &input)
            .await
            .expect_err("spawn should fail");
        assert!(err
            .to_string()
            .contains("ffmpeg-binary-that-does-not-exist"));
    }
}
