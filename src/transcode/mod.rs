//! Container normalization and mux policy
//!
//! Decides whether a post-processing step is needed and drives the
//! external transcode tool through [`ProcessRunner`]. The command
//! parameters are fixed configuration constants; nothing here inspects
//! codec details of the input.

use crate::runner::{ProcessRunner, RunRequest, RunnerEvent};
use crate::utils::config::TranscodeSettings;
use crate::utils::error::ClipfetchError;
use anyhow::Result;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Drives remux/transcode invocations of the external tool
pub struct TranscodePolicy {
    runner: Arc<ProcessRunner>,
    settings: TranscodeSettings,
}

impl TranscodePolicy {
    pub fn new(runner: Arc<ProcessRunner>, settings: TranscodeSettings) -> Self {
        Self { runner, settings }
    }

    pub fn tool_available(&self) -> bool {
        self.tool_path().is_some()
    }

    fn tool_path(&self) -> Option<PathBuf> {
        self.runner.locate_tool(&self.settings.tool)
    }

    /// Bring `path` into the desired container.
    ///
    /// Idempotent: a file that already carries the target extension is
    /// returned unchanged. Failure to transcode is non-fatal: the error
    /// is logged and the original path is returned.
    pub async fn ensure_container(
        &self,
        path: &Path,
        events: mpsc::Sender<RunnerEvent>,
        cancel: CancellationToken,
    ) -> PathBuf {
        if has_extension(path, &self.settings.container) {
            debug!("{} already in target container", path.display());
            return path.to_path_buf();
        }

        let tool = match self.tool_path() {
            Some(tool) => tool,
            None => {
                warn!(
                    "{} unavailable, keeping {} as-is",
                    self.settings.tool,
                    path.display()
                );
                return path.to_path_buf();
            }
        };

        let output = path.with_extension(&self.settings.container);
        info!(
            "Transcoding {} -> {}",
            path.display(),
            output.display()
        );

        let request = RunRequest {
            program: tool,
            args: vec![
                "-y".into(),
                "-i".into(),
                path.to_string_lossy().into_owned(),
                "-c:v".into(),
                self.settings.video_codec.clone(),
                "-c:a".into(),
                self.settings.audio_codec.clone(),
                "-crf".into(),
                self.settings.crf.clone(),
                "-preset".into(),
                self.settings.preset.clone(),
                "-loglevel".into(),
                "error".into(),
                "-stats".into(),
                output.to_string_lossy().into_owned(),
            ],
            working_dir: None,
            timeout: None,
        };

        let failed = match self.runner.run(request, events, cancel).await {
            Ok(outcome) if outcome.success() => false,
            Ok(outcome) => {
                warn!(
                    "Transcode exited with {:?}: {}",
                    outcome.exit_code,
                    outcome.stderr_excerpt()
                );
                true
            }
            Err(e) => {
                warn!("Transcode could not run: {}", e);
                true
            }
        };

        if failed {
            // Drop any partial output; the original stays authoritative.
            if output.exists() {
                let _ = tokio::fs::remove_file(&output).await;
            }
            return path.to_path_buf();
        }

        if let Err(e) = tokio::fs::remove_file(path).await {
            warn!("Failed to remove source {}: {}", path.display(), e);
        }
        info!("Transcode complete: {}", output.display());
        output
    }

    /// Merge a separately-downloaded video/audio pair into one file.
    ///
    /// The video stream is copied verbatim, the audio stream is
    /// re-encoded to the configured codec. The inputs are deleted only
    /// after the merge process reports success. Unlike
    /// [`ensure_container`](Self::ensure_container) this is fallible:
    /// without a merge there is no single playable artifact, so the
    /// caller decides how to degrade.
    pub async fn mux(
        &self,
        video: &Path,
        audio: &Path,
        events: mpsc::Sender<RunnerEvent>,
        cancel: CancellationToken,
    ) -> Result<PathBuf> {
        let tool = self
            .tool_path()
            .ok_or_else(|| ClipfetchError::ToolUnavailable(self.settings.tool.clone()))?;

        let stem = video
            .file_stem()
            .ok_or_else(|| {
                ClipfetchError::OperationFailed(format!(
                    "Cannot derive output name from {}",
                    video.display()
                ))
            })?
            .to_string_lossy()
            .into_owned();
        let dir = video.parent().unwrap_or_else(|| Path::new("."));
        let merged = dir.join(format!("{}.{}", stem, self.settings.container));
        // Write to a sibling temp name first so the target never
        // collides with one of the inputs.
        let scratch = dir.join(format!("{}.merge.{}", stem, self.settings.container));

        info!(
            "Muxing {} + {} -> {}",
            video.display(),
            audio.display(),
            merged.display()
        );

        let request = RunRequest {
            program: tool,
            args: vec![
                "-y".into(),
                "-i".into(),
                video.to_string_lossy().into_owned(),
                "-i".into(),
                audio.to_string_lossy().into_owned(),
                "-c:v".into(),
                "copy".into(),
                "-c:a".into(),
                self.settings.audio_codec.clone(),
                "-loglevel".into(),
                "error".into(),
                "-stats".into(),
                scratch.to_string_lossy().into_owned(),
            ],
            working_dir: None,
            timeout: None,
        };

        let outcome = self.runner.run(request, events, cancel).await?;
        if let Err(e) = outcome.ensure_success() {
            if scratch.exists() {
                let _ = tokio::fs::remove_file(&scratch).await;
            }
            return Err(e.into());
        }

        // Merge succeeded, the inputs are now redundant.
        for input in [video, audio] {
            if let Err(e) = tokio::fs::remove_file(input).await {
                warn!("Failed to remove mux input {}: {}", input.display(), e);
            }
        }
        tokio::fs::rename(&scratch, &merged).await?;
        info!("Mux complete: {}", merged.display());
        Ok(merged)
    }
}

fn has_extension(path: &Path, ext: &str) -> bool {
    path.extension()
        .map(|e| e.to_string_lossy().eq_ignore_ascii_case(ext))
        .unwrap_or(false)
}
