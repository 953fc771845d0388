//! Data structures at the extraction-backend boundary

use crate::utils::error::ClipfetchError;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Browser User-Agent presented to media sites by default
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

/// Output filename template handed to the backend
pub const DEFAULT_OUTPUT_TEMPLATE: &str = "%(title)s.%(ext)s";

/// Every option the extraction backend accepts, as a closed struct.
/// Validated once at job submission; immutable afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionOptions {
    pub output_dir: PathBuf,
    /// Filename template within `output_dir`
    pub output_template: String,
    /// Format-selection expression, e.g. `bestvideo+bestaudio/best`
    pub format_expr: String,
    pub user_agent: String,
    pub referer: Option<String>,
    pub cookie_file: Option<PathBuf>,
    pub no_playlist: bool,
    pub no_warnings: bool,
    /// Seconds to sleep between requests, for rate limiting
    pub sleep_interval: Option<f64>,
}

impl ExtractionOptions {
    pub fn new(output_dir: PathBuf, format_expr: String) -> Self {
        Self {
            output_dir,
            output_template: DEFAULT_OUTPUT_TEMPLATE.to_string(),
            format_expr,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            referer: None,
            cookie_file: None,
            no_playlist: true,
            no_warnings: true,
            sleep_interval: None,
        }
    }

    /// Submission-time validation: catch bad options before any
    /// process is spawned.
    pub fn validate(&self) -> Result<()> {
        if self.format_expr.trim().is_empty() {
            return Err(
                ClipfetchError::OperationFailed("empty format expression".to_string()).into(),
            );
        }
        if self.output_template.trim().is_empty() {
            return Err(
                ClipfetchError::OperationFailed("empty output template".to_string()).into(),
            );
        }
        if let Some(cookies) = &self.cookie_file {
            if !cookies.is_file() {
                return Err(ClipfetchError::OperationFailed(format!(
                    "cookie file does not exist: {}",
                    cookies.display()
                ))
                .into());
            }
        }
        Ok(())
    }

    /// The template rendered as a path under the output directory
    pub fn rendered_template(&self) -> PathBuf {
        self.output_dir.join(&self.output_template)
    }
}

/// One produced download, as reported by the backend
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestedDownload {
    pub filepath: PathBuf,
}

/// What a successful backend call hands back
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionResult {
    pub title: String,
    pub requested_downloads: Vec<RequestedDownload>,
}

impl ExtractionResult {
    /// The primary artifact the backend claims to have written
    pub fn primary_path(&self) -> Option<&Path> {
        self.requested_downloads.first().map(|d| d.filepath.as_path())
    }
}
