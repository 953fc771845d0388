//! Candidate classification for the directory scan

use std::path::{Path, PathBuf};

/// Coarse classification of a scanned file, by extension only
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtensionClass {
    /// Video track without a guaranteed audio stream (webm, mkv)
    Video,
    /// Audio-only track (m4a)
    Audio,
    /// Target container (mp4)
    Container,
}

impl ExtensionClass {
    /// Classify by extension. None for anything the scan ignores.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "mp4" => Some(Self::Container),
            "webm" | "mkv" => Some(Self::Video),
            "m4a" => Some(Self::Audio),
            _ => None,
        }
    }

    /// Could this file carry the image planes of an unmuxed pair?
    pub fn is_video_side(self) -> bool {
        matches!(self, Self::Video | Self::Container)
    }

    pub fn is_audio_side(self) -> bool {
        self == Self::Audio
    }
}

/// One plausible result file found during the directory scan.
/// Ephemeral: discarded as soon as resolution picks a winner.
#[derive(Debug, Clone)]
pub struct CandidateArtifact {
    pub path: PathBuf,
    pub size_bytes: u64,
    pub class: ExtensionClass,
}

impl CandidateArtifact {
    pub fn classify(path: &Path, size_bytes: u64) -> Option<Self> {
        let ext = path.extension()?.to_string_lossy();
        let class = ExtensionClass::from_extension(&ext)?;
        Some(Self {
            path: path.to_path_buf(),
            size_bytes,
            class,
        })
    }

    pub fn is_target_container(&self) -> bool {
        self.class == ExtensionClass::Container
    }
}
