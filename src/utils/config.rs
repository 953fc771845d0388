//! Application configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppSettings {
    /// Download location
    pub download_dir: PathBuf,

    /// Extra directories searched for external tools, in addition to
    /// PATH and the common install locations. Passed explicitly so the
    /// process environment is never mutated.
    pub extra_tool_dirs: Vec<PathBuf>,

    /// Deadline for a single subprocess invocation (None = unbounded)
    pub process_timeout: Option<Duration>,

    /// How long a cancelled child may keep running before it is killed
    pub kill_grace: Duration,

    /// Transcode/mux command constants
    pub transcode: TranscodeSettings,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            download_dir: dirs::download_dir().unwrap_or_else(|| PathBuf::from("./downloads")),
            extra_tool_dirs: Vec::new(),
            process_timeout: None,
            kill_grace: Duration::from_secs(5),
            transcode: TranscodeSettings::default(),
        }
    }
}

/// Fixed transcode parameters. These are configuration constants, not
/// derived from the input file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscodeSettings {
    /// Name of the transcode/mux binary
    pub tool: String,
    pub video_codec: String,
    pub audio_codec: String,
    pub crf: String,
    pub preset: String,
    /// Desired container extension, without the dot
    pub container: String,
}

impl Default for TranscodeSettings {
    fn default() -> Self {
        Self {
            tool: "ffmpeg".to_string(),
            video_codec: "libx264".to_string(),
            audio_codec: "aac".to_string(),
            crf: "23".to_string(),
            preset: "fast".to_string(),
            container: "mp4".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = AppSettings::default();
        assert!(settings.kill_grace > Duration::from_secs(0));
        assert!(settings.extra_tool_dirs.is_empty());
        assert_eq!(settings.transcode.container, "mp4");
    }

    #[test]
    fn test_default_transcode_constants() {
        let t = TranscodeSettings::default();
        assert_eq!(t.tool, "ffmpeg");
        assert_eq!(t.video_codec, "libx264");
        assert_eq!(t.audio_codec, "aac");
        assert_eq!(t.crf, "23");
        assert_eq!(t.preset, "fast");
    }
}
