//! Job submission parameters

use crate::backend::models::ExtractionOptions;
use crate::utils::error::ClipfetchError;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::warn;

/// Requested video quality ceiling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TargetResolution {
    /// Highest available quality
    Max,
    /// Best quality not exceeding this pixel height
    PixelHeight(u32),
}

impl Default for TargetResolution {
    fn default() -> Self {
        Self::PixelHeight(1080)
    }
}

impl TargetResolution {
    /// Parse a user-supplied resolution argument. Accepts `max`,
    /// `720`, `720p` (case-insensitive). Anything unparsable falls
    /// back to 1080 with a warning instead of refusing the job.
    pub fn parse_lenient(value: &str) -> Self {
        let value = value.trim();
        if value.eq_ignore_ascii_case("max") {
            return Self::Max;
        }
        match value.trim_end_matches(['p', 'P']).parse::<u32>() {
            Ok(height) if height > 0 => Self::PixelHeight(height),
            _ => {
                warn!("Unrecognized resolution '{}', using 1080", value);
                Self::default()
            }
        }
    }

    /// The backend format-selection expression for this ceiling
    pub fn format_expr(&self) -> String {
        match self {
            Self::Max => "bestvideo+bestaudio/best".to_string(),
            Self::PixelHeight(h) => {
                format!("bestvideo[height<={h}]+bestaudio/best[height<={h}]")
            }
        }
    }
}

/// Everything a caller provides when submitting a job.
/// Immutable once the job starts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSpec {
    pub url: String,
    pub output_dir: PathBuf,
    pub target_resolution: TargetResolution,
    pub transcode_requested: bool,
    pub credentials_file: Option<PathBuf>,
}

impl JobSpec {
    pub fn new(url: impl Into<String>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            url: url.into(),
            output_dir: output_dir.into(),
            target_resolution: TargetResolution::default(),
            transcode_requested: true,
            credentials_file: None,
        }
    }

    /// Submission-time validation
    pub fn validate(&self) -> Result<()> {
        if self.url.trim().is_empty() {
            return Err(ClipfetchError::InvalidUrl("empty URL".to_string()).into());
        }
        if let Some(credentials) = &self.credentials_file {
            if !credentials.is_file() {
                return Err(ClipfetchError::OperationFailed(format!(
                    "credentials file does not exist: {}",
                    credentials.display()
                ))
                .into());
            }
        }
        Ok(())
    }

    /// The submitted URL with a missing scheme defaulted to https
    pub fn normalized_url(&self) -> String {
        let url = self.url.trim();
        if url.starts_with("http://") || url.starts_with("https://") {
            url.to_string()
        } else {
            format!("https://{}", url)
        }
    }

    /// Backend options derived from this spec
    pub fn extraction_options(&self) -> ExtractionOptions {
        let mut options = ExtractionOptions::new(
            self.output_dir.clone(),
            self.target_resolution.format_expr(),
        );
        options.cookie_file = self.credentials_file.clone();
        options.referer = referer_for(&self.normalized_url());
        options
    }
}

/// Some sites refuse requests without a Referer header matching their
/// own origin; pin it for the ones known to do so.
fn referer_for(url: &str) -> Option<String> {
    if url.contains("bilibili.com") {
        Some("https://www.bilibili.com/".to_string())
    } else {
        None
    }
}
