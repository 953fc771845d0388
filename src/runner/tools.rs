//! External tool discovery
//!
//! Locates backend and transcode binaries without mutating the process
//! environment: callers inject extra search directories instead of
//! prepending to PATH.

use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Locates external binaries against an explicit search order
#[derive(Debug, Clone, Default)]
pub struct ToolLocator {
    extra_dirs: Vec<PathBuf>,
}

impl ToolLocator {
    pub fn new(extra_dirs: Vec<PathBuf>) -> Self {
        Self { extra_dirs }
    }

    /// Find a tool by name.
    ///
    /// Search order:
    /// 1. Explicitly injected extra directories
    /// 2. System PATH
    /// 3. Common installation paths (Homebrew, ~/.local/bin, etc.)
    pub fn locate(&self, name: &str) -> Option<PathBuf> {
        for dir in &self.extra_dirs {
            let candidate = dir.join(name);
            if candidate.is_file() && is_executable(&candidate) {
                info!("Found {} in extra dir: {}", name, candidate.display());
                return Some(candidate);
            }
        }

        if let Ok(path) = which::which(name) {
            debug!("Found {} on PATH: {}", name, path.display());
            return Some(path);
        }

        if let Some(path) = find_in_common_paths(name) {
            info!("Found {} in common path: {}", name, path.display());
            return Some(path);
        }

        warn!("{} not found anywhere", name);
        None
    }
}

/// Probe well-known install locations that tend to be missing from
/// PATH when the process is launched outside a login shell.
fn find_in_common_paths(name: &str) -> Option<PathBuf> {
    let mut candidates = vec![
        PathBuf::from("/opt/homebrew/bin").join(name),
        PathBuf::from("/usr/local/bin").join(name),
        PathBuf::from("/usr/bin").join(name),
    ];

    if let Some(home) = dirs::home_dir() {
        candidates.push(home.join(".local/bin").join(name));
    }

    candidates
        .into_iter()
        .find(|p| p.is_file() && is_executable(p))
}

/// Check if a file is executable
fn is_executable(path: &Path) -> bool {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;

        if let Ok(metadata) = std::fs::metadata(path) {
            return metadata.permissions().mode() & 0o111 != 0;
        }
        false
    }

    #[cfg(not(unix))]
    {
        path.exists()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_locate_common_shell() {
        // sh exists on every unix host this runs on
        let locator = ToolLocator::default();
        let found = locator.locate("sh");
        println!("sh found at: {:?}", found);
        #[cfg(unix)]
        assert!(found.is_some());
    }

    #[test]
    fn test_locate_missing_tool() {
        let locator = ToolLocator::default();
        assert!(locator.locate("clipfetch-no-such-binary").is_none());
    }

    #[cfg(unix)]
    #[test]
    fn test_extra_dir_takes_priority() {
        use std::os::unix::fs::PermissionsExt;

        let temp = tempfile::TempDir::new().unwrap();
        let fake = temp.path().join("sh");
        std::fs::write(&fake, "#!/bin/sh\n").unwrap();
        std::fs::set_permissions(&fake, std::fs::Permissions::from_mode(0o755)).unwrap();

        let locator = ToolLocator::new(vec![temp.path().to_path_buf()]);
        assert_eq!(locator.locate("sh"), Some(fake));
    }

    #[cfg(unix)]
    #[test]
    fn test_non_executable_is_skipped() {
        use std::os::unix::fs::PermissionsExt;

        let temp = tempfile::TempDir::new().unwrap();
        let fake = temp.path().join("clipfetch-no-such-binary");
        std::fs::write(&fake, "not a program").unwrap();
        std::fs::set_permissions(&fake, std::fs::Permissions::from_mode(0o644)).unwrap();

        let locator = ToolLocator::new(vec![temp.path().to_path_buf()]);
        assert!(locator.locate("clipfetch-no-such-binary").is_none());
    }

    #[test]
    fn test_is_executable_known_binary() {
        let path = PathBuf::from("/bin/ls");
        if path.exists() {
            assert!(is_executable(&path));
        }
    }
}
