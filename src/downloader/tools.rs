// yt-dlp binary resolution
//
// Preference order: a pinned (manually updated) copy at a well-known
// path, then common install locations, then whatever `which` finds on
// PATH. The pinned copy exists so an operator can drop in a newer
// yt-dlp without touching the system package.

use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::debug;

const COMMON_PATHS: [&str; 2] = ["/usr/local/bin/yt-dlp", "/usr/bin/yt-dlp"];

pub struct ToolLocator {
    pinned: PathBuf,
}

impl ToolLocator {
    pub fn new(pinned: PathBuf) -> Self {
        Self { pinned }
    }

    /// Resolve the yt-dlp executable to invoke, or None if no copy is
    /// installed anywhere we look.
    pub fn resolve(&self) -> Option<String> {
        if is_executable(&self.pinned) {
            debug!(path = %self.pinned.display(), "using pinned yt-dlp");
            return Some(self.pinned.to_string_lossy().into_owned());
        }

        for path in COMMON_PATHS {
            if is_executable(Path::new(path)) {
                return Some(path.to_string());
            }
        }

        // Fall back to PATH lookup
        if let Ok(output) = Command::new("which").arg("yt-dlp").output() {
            if output.status.success() {
                let path = String::from_utf8_lossy(&output.stdout).trim().to_string();
                if !path.is_empty() {
                    return Some(path);
                }
            }
        }

        None
    }

    /// Availability probe backing the connection-test endpoint: the
    /// binary must resolve and answer `--version`.
    pub fn is_available(&self) -> bool {
        self.version().is_some()
    }

    pub fn version(&self) -> Option<String> {
        let path = self.resolve()?;
        match Command::new(&path).arg("--version").output() {
            Ok(output) if output.status.success() => {
                Some(String::from_utf8_lossy(&output.stdout).trim().to_string())
            }
            _ => None,
        }
    }
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}
