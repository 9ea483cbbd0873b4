// Temporary file store
//
// Owns the directory the external tool writes into. Every path derived
// from client input goes through resolve(), which enforces the
// containment invariant: the store never touches a file outside its own
// root. Artifacts live until the retention sweep or the post-serve
// grace delete removes them.

use std::collections::HashSet;
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};

use tracing::{debug, info, warn};

use crate::downloader::errors::DownloadError;

/// Size ceiling for a single artifact
pub const MAX_ARTIFACT_BYTES: u64 = 500 * 1024 * 1024;

/// Age after which an unserved artifact is swept
pub const RETENTION: Duration = Duration::from_secs(3600);

/// Fixed wait before deleting a just-served artifact
pub const SERVE_GRACE: Duration = Duration::from_secs(5);

/// Outcome of resolving a client-supplied file reference
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveError {
    /// No such artifact
    NotFound,
    /// The reference tried to escape the store root
    OutsideRoot,
}

pub struct TempStore {
    /// Canonicalized store root; all containment checks compare
    /// against this path
    root: PathBuf,
    /// Artifacts currently being streamed (or inside the grace window).
    /// The sweep skips these, and a second serve of one is refused.
    in_flight: Arc<Mutex<HashSet<PathBuf>>>,
}

impl TempStore {
    pub fn new(root: impl AsRef<Path>) -> std::io::Result<Self> {
        fs::create_dir_all(root.as_ref())?;
        let root = root.as_ref().canonicalize()?;
        debug!(root = %root.display(), "temp store ready");
        Ok(Self {
            root,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Deterministic output template for one job. The `%(ext)s` suffix
    /// is substituted by the external tool, not by the store.
    pub fn reserve(&self, timestamp: u64, id: &str) -> PathBuf {
        self.root.join(format!("{}_{}.%(ext)s", timestamp, id))
    }

    /// Find the file a finished job produced: the first entry whose
    /// name starts with `<timestamp>_<id>.` (only one is expected).
    pub fn locate(&self, timestamp: u64, id: &str) -> Option<PathBuf> {
        let prefix = format!("{}_{}.", timestamp, id);
        let entries = fs::read_dir(&self.root).ok()?;
        for entry in entries.flatten() {
            let name = entry.file_name();
            if name.to_string_lossy().starts_with(&prefix) {
                let path = entry.path();
                if path.is_file() {
                    return Some(path);
                }
            }
        }
        None
    }

    /// Enforce the size ceiling; an oversized artifact is deleted as
    /// part of rejection so it can never be served.
    pub fn validate_size(&self, path: &Path) -> Result<u64, DownloadError> {
        let size = fs::metadata(path)?.len();
        if size > MAX_ARTIFACT_BYTES {
            if let Err(e) = fs::remove_file(path) {
                warn!(path = %path.display(), error = %e, "failed to delete oversized artifact");
            }
            return Err(DownloadError::TooLarge);
        }
        Ok(size)
    }

    /// Opportunistic retention sweep, run at the start of every
    /// download request.
    pub fn sweep(&self) -> usize {
        self.sweep_older_than(RETENTION)
    }

    pub fn sweep_older_than(&self, max_age: Duration) -> usize {
        let Ok(entries) = fs::read_dir(&self.root) else {
            return 0;
        };

        let now = SystemTime::now();
        let mut removed = 0;
        for entry in entries.flatten() {
            let path = entry.path();
            if !path.is_file() || self.is_in_flight(&path) {
                continue;
            }
            let stale = entry
                .metadata()
                .and_then(|m| m.modified())
                .ok()
                .and_then(|mtime| now.duration_since(mtime).ok())
                .map(|age| age >= max_age)
                .unwrap_or(false);
            if stale && fs::remove_file(&path).is_ok() {
                removed += 1;
            }
        }

        if removed > 0 {
            info!(removed, "swept stale artifacts");
        }
        removed
    }

    /// Resolve a client-supplied file reference to a path strictly
    /// inside the store root. Traversal attempts are a security
    /// failure, not a retryable miss.
    pub fn resolve(&self, reference: &str) -> Result<PathBuf, ResolveError> {
        if reference.is_empty() {
            return Err(ResolveError::NotFound);
        }

        // Only a bare file name is acceptable: any parent/root/prefix
        // component is an escape attempt.
        let rel = Path::new(reference);
        if rel
            .components()
            .any(|c| !matches!(c, Component::Normal(_)))
        {
            return Err(ResolveError::OutsideRoot);
        }

        let candidate = self.root.join(rel);
        let canonical = candidate.canonicalize().map_err(|_| ResolveError::NotFound)?;

        // Strict prefix check catches symlinks pointing out of the root
        if !canonical.starts_with(&self.root) || canonical == self.root {
            return Err(ResolveError::OutsideRoot);
        }
        if !canonical.is_file() {
            return Err(ResolveError::NotFound);
        }
        Ok(canonical)
    }

    /// Mark an artifact as being served. Returns false if a serve is
    /// already in progress (or the grace delete is pending), in which
    /// case the artifact must not be streamed again.
    pub fn begin_serve(&self, path: &Path) -> bool {
        self.in_flight
            .lock()
            .expect("in-flight set poisoned")
            .insert(path.to_path_buf())
    }

    /// Undo begin_serve when streaming never started.
    pub fn release(&self, path: &Path) {
        self.in_flight
            .lock()
            .expect("in-flight set poisoned")
            .remove(path);
    }

    pub fn is_in_flight(&self, path: &Path) -> bool {
        self.in_flight
            .lock()
            .expect("in-flight set poisoned")
            .contains(path)
    }

    /// Delete an artifact after a fixed grace delay. Deletion is
    /// unconditional: it happens whether or not the client finished
    /// reading the stream.
    pub fn schedule_delete(&self, path: PathBuf, delay: Duration) {
        let in_flight = Arc::clone(&self.in_flight);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            match fs::remove_file(&path) {
                Ok(()) => debug!(path = %path.display(), "deleted served artifact"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!(path = %path.display(), error = %e, "post-serve delete failed"),
            }
            in_flight
                .lock()
                .expect("in-flight set poisoned")
                .remove(&path);
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (tempfile::TempDir, TempStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = TempStore::new(dir.path()).unwrap();
        (dir, store)
    }

    fn put(store: &TempStore, name: &str, contents: &[u8]) -> PathBuf {
        let path = store.root().join(name);
        fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn reserve_builds_ext_template() {
        let (_dir, store) = store();
        let template = store.reserve(1700000000, "x7f3k");
        assert_eq!(
            template.file_name().unwrap().to_str().unwrap(),
            "1700000000_x7f3k.%(ext)s"
        );
        assert!(template.starts_with(store.root()));
    }

    #[test]
    fn locate_finds_file_by_job_prefix() {
        let (_dir, store) = store();
        put(&store, "1700000000_x7f3k.mp4", b"video");
        put(&store, "1700000000_other.mp4", b"video");

        let found = store.locate(1700000000, "x7f3k").unwrap();
        assert_eq!(found.file_name().unwrap().to_str().unwrap(), "1700000000_x7f3k.mp4");
        assert!(store.locate(1700000000, "missing").is_none());
    }

    #[test]
    fn validate_size_accepts_small_files() {
        let (_dir, store) = store();
        let path = put(&store, "a.mp3", b"tiny");
        assert_eq!(store.validate_size(&path).unwrap(), 4);
        assert!(path.exists());
    }

    #[test]
    fn oversized_artifact_is_rejected_and_deleted() {
        let (_dir, store) = store();
        let path = store.root().join("big.mp4");
        let file = fs::File::create(&path).unwrap();
        // Sparse file: reports the oversize without writing 500 MB
        file.set_len(MAX_ARTIFACT_BYTES + 1).unwrap();
        drop(file);

        assert_eq!(store.validate_size(&path), Err(DownloadError::TooLarge));
        assert!(!path.exists(), "oversized artifact must not be left behind");
    }

    #[test]
    fn sweep_removes_only_files_past_max_age() {
        let (_dir, store) = store();
        put(&store, "fresh.mp4", b"x");
        // Fresh files survive the retention window
        assert_eq!(store.sweep(), 0);
        // With a zero window everything qualifies
        assert_eq!(store.sweep_older_than(Duration::ZERO), 1);
        assert!(!store.root().join("fresh.mp4").exists());
    }

    #[test]
    fn sweep_skips_files_mid_serve() {
        let (_dir, store) = store();
        let serving = put(&store, "serving.mp4", b"x");
        put(&store, "idle.mp4", b"x");
        assert!(store.begin_serve(&serving));

        assert_eq!(store.sweep_older_than(Duration::ZERO), 1);
        assert!(serving.exists());
        assert!(!store.root().join("idle.mp4").exists());
    }

    #[test]
    fn resolve_accepts_bare_names_only() {
        let (_dir, store) = store();
        let path = put(&store, "ok.mp4", b"x");
        assert_eq!(store.resolve("ok.mp4").unwrap(), path.canonicalize().unwrap());

        assert_eq!(store.resolve(""), Err(ResolveError::NotFound));
        assert_eq!(store.resolve("nope.mp4"), Err(ResolveError::NotFound));
        assert_eq!(
            store.resolve("../../etc/passwd"),
            Err(ResolveError::OutsideRoot)
        );
        assert_eq!(store.resolve("/etc/passwd"), Err(ResolveError::OutsideRoot));
        assert_eq!(store.resolve(".."), Err(ResolveError::OutsideRoot));
    }

    #[cfg(unix)]
    #[test]
    fn resolve_refuses_symlink_escape() {
        let (_dir, store) = store();
        let outside = tempfile::NamedTempFile::new().unwrap();
        std::os::unix::fs::symlink(outside.path(), store.root().join("link.mp4")).unwrap();
        assert_eq!(store.resolve("link.mp4"), Err(ResolveError::OutsideRoot));
    }

    #[test]
    fn begin_serve_is_single_admission() {
        let (_dir, store) = store();
        let path = put(&store, "one.mp4", b"x");
        assert!(store.begin_serve(&path));
        assert!(!store.begin_serve(&path));
        store.release(&path);
        assert!(store.begin_serve(&path));
    }

    #[tokio::test(start_paused = true)]
    async fn scheduled_delete_fires_after_grace() {
        let (_dir, store) = store();
        let path = put(&store, "served.mp4", b"x");
        store.begin_serve(&path);
        store.schedule_delete(path.clone(), SERVE_GRACE);

        // Paused clock: this sleep auto-advances past the grace delay
        tokio::time::sleep(SERVE_GRACE + Duration::from_secs(1)).await;
        tokio::task::yield_now().await;

        assert!(!path.exists());
        assert!(!store.is_in_flight(&path));
    }
}
