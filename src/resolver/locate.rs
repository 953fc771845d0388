//! Result-path resolution
//!
//! Extraction backends sometimes deviate from the requested output
//! name: format suffixes get inserted, extensions change during a
//! silent remux, or separate audio/video streams are left behind when
//! no merge tool was available at download time. The resolver recovers
//! the artifact from what is actually on disk instead of re-running
//! the extraction.

use crate::resolver::artifact::CandidateArtifact;
use crate::runner::RunnerEvent;
use crate::transcode::TranscodePolicy;
use crate::utils::error::ClipfetchError;
use anyhow::Result;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Upper bound on directory entries quoted in a NotFound diagnostic
const DIAGNOSTIC_LISTING_LIMIT: usize = 15;

/// Locates the media file a finished extraction actually produced
pub struct PathResolver {
    transcode: Arc<TranscodePolicy>,
}

impl PathResolver {
    pub fn new(transcode: Arc<TranscodePolicy>) -> Self {
        Self { transcode }
    }

    /// Resolve the produced file for `expected`, in priority order:
    ///
    /// 1. A lone same-stem video/audio pair is merged via the
    ///    transcode policy. This outranks an exact match: when the
    ///    audio track sits in its own file, the video-side file alone
    ///    is not the deliverable.
    /// 2. The exact expected path.
    /// 3. The same base name with an `.mp4` extension.
    /// 4. Any remaining scan candidate containing the expected base
    ///    name with a known media extension, preferring `.mp4`.
    /// 5. Otherwise an `ArtifactNotFound` carrying a bounded listing
    ///    of what the directory actually holds.
    pub async fn resolve(
        &self,
        expected: &Path,
        events: mpsc::Sender<RunnerEvent>,
        cancel: CancellationToken,
    ) -> Result<PathBuf> {
        let directory = parent_dir(expected);
        let stem = expected
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();

        let candidates = scan_directory(directory, &stem).await?;
        debug!(
            "Scan of {} found {} candidate(s) for '{}'",
            directory.display(),
            candidates.len(),
            stem
        );

        let videos: Vec<&CandidateArtifact> =
            candidates.iter().filter(|c| c.class.is_video_side()).collect();
        let audios: Vec<&CandidateArtifact> =
            candidates.iter().filter(|c| c.class.is_audio_side()).collect();

        // Exactly one of each side means the backend downloaded the
        // streams but never merged them.
        if videos.len() == 1 && audios.len() == 1 {
            let video = videos[0].path.clone();
            let audio = audios[0].path.clone();
            info!(
                "Detected unmuxed pair: {} + {}",
                video.display(),
                audio.display()
            );
            return match self.transcode.mux(&video, &audio, events, cancel).await {
                Ok(merged) => Ok(merged),
                Err(e) => {
                    warn!("Could not merge unmuxed pair: {}", e);
                    let diagnostic = format!(
                        "found unmuxed pair ({}, {}) but merging failed: {}",
                        video.display(),
                        audio.display(),
                        e
                    );
                    Err(ClipfetchError::ArtifactNotFound(diagnostic).into())
                }
            };
        }

        if expected.is_file() {
            debug!("Expected path exists: {}", expected.display());
            return Ok(expected.to_path_buf());
        }

        let mp4_variant = expected.with_extension("mp4");
        if mp4_variant != expected && mp4_variant.is_file() {
            info!(
                "Expected file missing, found container rename: {}",
                mp4_variant.display()
            );
            return Ok(mp4_variant);
        }

        if let Some(best) = pick_candidate(&candidates) {
            info!("Fuzzy scan resolved {}", best.display());
            return Ok(best);
        }

        let diagnostic = not_found_diagnostic(expected, directory).await;
        warn!("Artifact resolution exhausted: {}", diagnostic);
        Err(ClipfetchError::ArtifactNotFound(diagnostic).into())
    }
}

fn parent_dir(expected: &Path) -> &Path {
    match expected.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    }
}

/// List candidate files whose name contains the expected base name
/// and whose extension the scan recognizes. Partial downloads
/// (`.part`, `.ytdl`) never classify and are skipped implicitly.
async fn scan_directory(directory: &Path, stem: &str) -> Result<Vec<CandidateArtifact>> {
    let mut candidates = Vec::new();
    if stem.is_empty() {
        return Ok(candidates);
    }

    let mut entries = tokio::fs::read_dir(directory).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let name = match path.file_name() {
            Some(n) => n.to_string_lossy().into_owned(),
            None => continue,
        };
        if !name.contains(stem) {
            continue;
        }
        let meta = match entry.metadata().await {
            Ok(m) if m.is_file() => m,
            _ => continue,
        };
        if let Some(candidate) = CandidateArtifact::classify(&path, meta.len()) {
            candidates.push(candidate);
        }
    }
    Ok(candidates)
}

/// Prefer the target container; otherwise take the largest candidate,
/// which is the best guess for "the actual video" among leftovers.
fn pick_candidate(candidates: &[CandidateArtifact]) -> Option<PathBuf> {
    if let Some(mp4) = candidates.iter().find(|c| c.is_target_container()) {
        return Some(mp4.path.clone());
    }
    candidates
        .iter()
        .max_by_key(|c| c.size_bytes)
        .map(|c| c.path.clone())
}

async fn not_found_diagnostic(expected: &Path, directory: &Path) -> String {
    let mut names = Vec::new();
    let mut total = 0usize;
    if let Ok(mut entries) = tokio::fs::read_dir(directory).await {
        while let Ok(Some(entry)) = entries.next_entry().await {
            total += 1;
            if names.len() < DIAGNOSTIC_LISTING_LIMIT {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
    }
    names.sort();
    let suffix = if total > names.len() {
        format!(", ... ({} entries total)", total)
    } else {
        String::new()
    };
    format!(
        "expected '{}'; directory '{}' contains [{}{}]",
        expected.display(),
        directory.display(),
        names.join(", "),
        suffix
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::{ProcessRunner, ToolLocator};
    use crate::utils::config::TranscodeSettings;
    use std::time::Duration;
    use tempfile::TempDir;

    fn resolver_without_tool() -> PathResolver {
        resolver_with_dirs("clipfetch-test-missing-tool", vec![])
    }

    fn resolver_with_dirs(tool: &str, extra_dirs: Vec<PathBuf>) -> PathResolver {
        let runner = Arc::new(ProcessRunner::new(
            ToolLocator::new(extra_dirs),
            Duration::from_millis(100),
        ));
        let settings = TranscodeSettings {
            tool: tool.to_string(),
            ..TranscodeSettings::default()
        };
        PathResolver::new(Arc::new(TranscodePolicy::new(runner, settings)))
    }

    // Event delivery is best-effort; tests that only care about the
    // resolved path can drop the receiver immediately.
    fn channel() -> mpsc::Sender<RunnerEvent> {
        mpsc::channel(8).0
    }

    #[tokio::test]
    async fn test_exact_path_returned_unchanged() {
        let temp = TempDir::new().unwrap();
        let expected = temp.path().join("My Video.webm");
        std::fs::write(&expected, b"video").unwrap();

        let resolved = resolver_without_tool()
            .resolve(&expected, channel(), CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(resolved, expected);
    }

    #[tokio::test]
    async fn test_mp4_rename_is_recovered() {
        let temp = TempDir::new().unwrap();
        let expected = temp.path().join("My Video.webm");
        let actual = temp.path().join("My Video.mp4");
        std::fs::write(&actual, b"video").unwrap();

        let resolved = resolver_without_tool()
            .resolve(&expected, channel(), CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(resolved, actual);
    }

    #[tokio::test]
    async fn test_fuzzy_scan_matches_format_suffix() {
        let temp = TempDir::new().unwrap();
        let expected = temp.path().join("Talk.webm");
        let actual = temp.path().join("Talk.f616.webm");
        std::fs::write(&actual, b"video").unwrap();
        std::fs::write(temp.path().join("unrelated.webm"), b"other").unwrap();

        let resolved = resolver_without_tool()
            .resolve(&expected, channel(), CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(resolved, actual);
    }

    #[tokio::test]
    async fn test_fuzzy_scan_prefers_mp4() {
        let temp = TempDir::new().unwrap();
        let expected = temp.path().join("Talk.mkv");
        let webm = temp.path().join("Talk.f1.webm");
        let mp4 = temp.path().join("Talk.f2.mp4");
        // No pair here: both candidates are video-side.
        std::fs::write(&webm, vec![0u8; 4096]).unwrap();
        std::fs::write(&mp4, vec![0u8; 16]).unwrap();

        let resolved = resolver_without_tool()
            .resolve(&expected, channel(), CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(resolved, mp4, "mp4 wins even when smaller");
    }

    #[tokio::test]
    async fn test_unmuxed_pair_without_tool_degrades_with_diagnostic() {
        let temp = TempDir::new().unwrap();
        let expected = temp.path().join("Title.webm");
        std::fs::write(temp.path().join("Title.mp4"), b"video-track").unwrap();
        std::fs::write(temp.path().join("Title.m4a"), b"audio-track").unwrap();

        let err = resolver_without_tool()
            .resolve(&expected, channel(), CancellationToken::new())
            .await
            .unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("unmuxed pair"), "got: {}", msg);
        assert!(temp.path().join("Title.mp4").exists(), "inputs untouched");
        assert!(temp.path().join("Title.m4a").exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_unmuxed_pair_is_merged() {
        use std::os::unix::fs::PermissionsExt;

        let tools = TempDir::new().unwrap();
        let script = tools.path().join("ffmpeg");
        std::fs::write(
            &script,
            "#!/bin/sh\nfor a in \"$@\"; do out=$a; done\necho merged > \"$out\"\n",
        )
        .unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let temp = TempDir::new().unwrap();
        let expected = temp.path().join("Title.webm");
        let video = temp.path().join("Title.mp4");
        let audio = temp.path().join("Title.m4a");
        std::fs::write(&video, b"video-track").unwrap();
        std::fs::write(&audio, b"audio-track").unwrap();

        let resolver = resolver_with_dirs("ffmpeg", vec![tools.path().to_path_buf()]);
        let resolved = resolver
            .resolve(&expected, channel(), CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(resolved, temp.path().join("Title.mp4"));
        assert!(resolved.exists());
        assert!(!audio.exists(), "audio input removed after merge");
    }

    #[tokio::test]
    async fn test_exact_match_with_audio_sibling_requires_merge() {
        // The expected file exists, but a same-stem audio track next
        // to it means the video is audio-less; without a merge tool
        // resolution must fail rather than hand back the silent file.
        let temp = TempDir::new().unwrap();
        let video = temp.path().join("Title.mp4");
        std::fs::write(&video, b"video-track").unwrap();
        std::fs::write(temp.path().join("Title.m4a"), b"audio-track").unwrap();

        let err = resolver_without_tool()
            .resolve(&video, channel(), CancellationToken::new())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("unmuxed pair"), "got: {}", err);
        assert!(video.exists(), "inputs untouched");
        assert!(temp.path().join("Title.m4a").exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_exact_match_with_audio_sibling_is_muxed() {
        use std::os::unix::fs::PermissionsExt;

        let tools = TempDir::new().unwrap();
        let script = tools.path().join("ffmpeg");
        std::fs::write(
            &script,
            "#!/bin/sh\nfor a in \"$@\"; do out=$a; done\necho merged > \"$out\"\n",
        )
        .unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let temp = TempDir::new().unwrap();
        let video = temp.path().join("Title.mp4");
        let audio = temp.path().join("Title.m4a");
        std::fs::write(&video, b"video-track").unwrap();
        std::fs::write(&audio, b"audio-track").unwrap();

        let resolver = resolver_with_dirs("ffmpeg", vec![tools.path().to_path_buf()]);
        let resolved = resolver
            .resolve(&video, channel(), CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(resolved, video);
        assert_eq!(std::fs::read_to_string(&resolved).unwrap().trim(), "merged");
        assert!(!audio.exists(), "audio input removed after merge");
    }

    #[tokio::test]
    async fn test_not_found_lists_directory_contents() {
        let temp = TempDir::new().unwrap();
        let expected = temp.path().join("Missing.webm");
        std::fs::write(temp.path().join("something-else.txt"), b"x").unwrap();

        let err = resolver_without_tool()
            .resolve(&expected, channel(), CancellationToken::new())
            .await
            .unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("Missing.webm"), "got: {}", msg);
        assert!(msg.contains("something-else.txt"), "got: {}", msg);
    }

    #[tokio::test]
    async fn test_diagnostic_listing_is_bounded() {
        let temp = TempDir::new().unwrap();
        for i in 0..40 {
            std::fs::write(temp.path().join(format!("file-{:02}.txt", i)), b"x").unwrap();
        }
        let expected = temp.path().join("Missing.webm");

        let err = resolver_without_tool()
            .resolve(&expected, channel(), CancellationToken::new())
            .await
            .unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("40 entries total"), "got: {}", msg);
        assert!(
            msg.matches("file-").count() <= DIAGNOSTIC_LISTING_LIMIT,
            "listing must be truncated, got: {}",
            msg
        );
    }
}
