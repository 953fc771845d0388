//! yt-dlp CLI extraction backend
//!
//! Builds an argument vector from the closed options struct, streams
//! the tool's output through [`ProcessRunner`], and recovers the
//! produced filepath from the destination lines yt-dlp prints.

use crate::backend::models::{ExtractionOptions, ExtractionResult, RequestedDownload};
use crate::backend::traits::ExtractionBackend;
use crate::runner::{ProcessRunner, RunRequest, RunnerEvent};
use crate::utils::error::ClipfetchError;
use anyhow::Result;
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

const YTDLP_BINARY: &str = "yt-dlp";

pub struct YtDlpBackend {
    runner: Arc<ProcessRunner>,
    timeout: Option<Duration>,
}

impl YtDlpBackend {
    pub fn new(runner: Arc<ProcessRunner>, timeout: Option<Duration>) -> Self {
        Self { runner, timeout }
    }
}

#[async_trait]
impl ExtractionBackend for YtDlpBackend {
    fn id(&self) -> &'static str {
        "yt-dlp"
    }

    async fn extract(
        &self,
        url: &str,
        options: &ExtractionOptions,
        events: mpsc::Sender<RunnerEvent>,
        cancel: CancellationToken,
    ) -> Result<ExtractionResult> {
        let program = self
            .runner
            .locate_tool(YTDLP_BINARY)
            .ok_or_else(|| ClipfetchError::ToolUnavailable(YTDLP_BINARY.to_string()))?;

        tokio::fs::create_dir_all(&options.output_dir).await?;

        let request = RunRequest {
            program,
            args: build_args(url, options),
            working_dir: None,
            timeout: self.timeout,
        };

        // Tap the event stream for destination lines while forwarding
        // everything to the caller unchanged.
        let destination: Arc<Mutex<Option<PathBuf>>> = Arc::new(Mutex::new(None));
        let (tap_tx, mut tap_rx) = mpsc::channel::<RunnerEvent>(256);
        let forward_dest = Arc::clone(&destination);
        let forward = tokio::spawn(async move {
            while let Some(event) = tap_rx.recv().await {
                if let RunnerEvent::Log(line) = &event {
                    if let Some(path) = parse_destination_line(line) {
                        debug!("Backend reported destination: {}", path.display());
                        *forward_dest.lock().unwrap() = Some(path);
                    }
                }
                if events.send(event).await.is_err() {
                    break;
                }
            }
        });

        let outcome = self.runner.run(request, tap_tx, cancel.clone()).await?;
        let _ = forward.await;

        if cancel.is_cancelled() {
            return Err(ClipfetchError::Cancelled.into());
        }
        if let Err(e) = outcome.ensure_success() {
            // The whole download step failed; the most specific cause
            // available is the tool's own stderr.
            return Err(ClipfetchError::BackendExtraction(e.to_string()).into());
        }

        let filepath = destination.lock().unwrap().take().ok_or_else(|| {
            ClipfetchError::BackendExtraction(
                "backend reported no destination for the download".to_string(),
            )
        })?;

        let title = filepath
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "Unknown".to_string());
        info!("Extraction finished: '{}' -> {}", title, filepath.display());

        Ok(ExtractionResult {
            title,
            requested_downloads: vec![RequestedDownload { filepath }],
        })
    }
}

fn build_args(url: &str, options: &ExtractionOptions) -> Vec<String> {
    let mut args = vec![
        // One progress line per update instead of carriage returns
        "--newline".to_string(),
        "-f".to_string(),
        options.format_expr.clone(),
        "-o".to_string(),
        options.rendered_template().to_string_lossy().into_owned(),
        "--user-agent".to_string(),
        options.user_agent.clone(),
    ];
    if options.no_playlist {
        args.push("--no-playlist".to_string());
    }
    if options.no_warnings {
        args.push("--no-warnings".to_string());
    }
    if let Some(referer) = &options.referer {
        args.push("--referer".to_string());
        args.push(referer.clone());
    }
    if let Some(cookies) = &options.cookie_file {
        args.push("--cookies".to_string());
        args.push(cookies.to_string_lossy().into_owned());
    }
    if let Some(sleep) = options.sleep_interval {
        args.push("--sleep-interval".to_string());
        args.push(sleep.to_string());
    }
    args.push(url.to_string());
    args
}

/// Pick the produced filepath out of yt-dlp's output. The merger line
/// wins over plain destinations because it names the final container.
fn parse_destination_line(line: &str) -> Option<PathBuf> {
    let line = line.trim();

    if let Some(rest) = line.strip_prefix("[Merger] Merging formats into \"") {
        let path = rest.trim_end_matches('"');
        if !path.is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    if let Some(rest) = line.strip_prefix("[download] Destination:") {
        let path = rest.trim();
        if !path.is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    if let Some(rest) = line.strip_prefix("[download] ") {
        if let Some(path) = rest.strip_suffix(" has already been downloaded") {
            if !path.is_empty() {
                return Some(PathBuf::from(path));
            }
        }
    }

    None
}
