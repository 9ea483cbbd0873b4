// Download job orchestration
//
// One job per request: reserve a uniquely named output template, run
// the external tool against it, locate whatever file it produced and
// enforce the size policy. Jobs are never retried; a failure is
// surfaced to the caller who may resubmit.

use std::time::{SystemTime, UNIX_EPOCH};

use rand::Rng;
use tracing::{debug, info, warn};

use crate::store::TempStore;

use super::errors::DownloadError;
use super::models::{Format, JobStage, StoredArtifact};
use super::presets;
use super::runner::CommandRunner;
use super::tools::ToolLocator;

/// State of one download job; lives only for the duration of a single
/// handler invocation.
#[derive(Debug)]
pub struct DownloadJob {
    pub timestamp: u64,
    pub id: String,
    pub stage: JobStage,
}

impl DownloadJob {
    pub fn new() -> Self {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        Self {
            timestamp,
            id: job_id(),
            stage: JobStage::Validating,
        }
    }

    fn advance(&mut self, stage: JobStage) {
        debug!(job = %self.id, stage = stage.as_str(), "job stage");
        self.stage = stage;
    }
}

impl Default for DownloadJob {
    fn default() -> Self {
        Self::new()
    }
}

/// Random per-job id; together with the timestamp it namespaces the
/// output path so concurrent jobs never collide.
fn job_id() -> String {
    let mut rng = rand::thread_rng();
    (0..13)
        .map(|_| {
            let chars = b"0123456789abcdefghijklmnopqrstuvwxyz";
            chars[rng.gen_range(0..chars.len())] as char
        })
        .collect()
}

/// Run one download job to completion. URL and format are already
/// validated; the yt-dlp executable is resolved here so an uninstalled
/// tool fails the job before anything is spawned.
pub async fn run_download(
    runner: &dyn CommandRunner,
    store: &TempStore,
    tools: &ToolLocator,
    url: &str,
    format: Format,
) -> Result<StoredArtifact, DownloadError> {
    let mut job = DownloadJob::new();

    job.advance(JobStage::ToolCheck);
    let tool = tools.resolve().ok_or(DownloadError::ToolUnavailable)?;

    job.advance(JobStage::Running);
    let template = store.reserve(job.timestamp, &job.id);
    let args = presets::build_args(format, &template.to_string_lossy(), url);

    info!(job = %job.id, %format, runner = runner.name(), "starting download");
    let output = runner.run(&tool, &args).await?;

    if !output.success() {
        let combined = output.combined();
        warn!(
            job = %job.id,
            exit = ?output.exit_code,
            tail = combined.lines().last().unwrap_or(""),
            "tool exited non-zero"
        );
        return Err(DownloadError::from_tool_output(&combined));
    }

    job.advance(JobStage::LocatingFile);
    let path = store
        .locate(job.timestamp, &job.id)
        .ok_or(DownloadError::ArtifactMissing)?;

    job.advance(JobStage::SizeCheck);
    let size = store.validate_size(&path)?;

    let extension = path
        .extension()
        .map(|e| e.to_string_lossy().into_owned())
        .unwrap_or_default();

    job.advance(JobStage::Done);
    info!(job = %job.id, size, extension = %extension, "download complete");

    Ok(StoredArtifact { path, size, extension })
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::downloader::runner::RunOutput;

    /// Scripted runner: optionally writes a file matching the -o
    /// template, then reports the configured exit.
    struct MockRunner {
        exit_code: i32,
        stderr: &'static str,
        produce_ext: Option<&'static str>,
        calls: AtomicUsize,
    }

    impl MockRunner {
        fn succeeding(ext: &'static str) -> Self {
            Self {
                exit_code: 0,
                stderr: "",
                produce_ext: Some(ext),
                calls: AtomicUsize::new(0),
            }
        }

        fn failing(stderr: &'static str) -> Self {
            Self {
                exit_code: 1,
                stderr,
                produce_ext: None,
                calls: AtomicUsize::new(0),
            }
        }

        fn lying() -> Self {
            // Exits 0 but writes nothing
            Self {
                exit_code: 0,
                stderr: "",
                produce_ext: None,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl CommandRunner for MockRunner {
        fn name(&self) -> &'static str {
            "mock"
        }

        async fn run(&self, _program: &str, args: &[String]) -> Result<RunOutput, DownloadError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(ext) = self.produce_ext {
                let template = args
                    .iter()
                    .zip(args.iter().skip(1))
                    .find(|(flag, _)| *flag == "-o")
                    .map(|(_, value)| value.clone())
                    .expect("-o template present");
                let path = template.replace("%(ext)s", ext);
                std::fs::write(path, b"media bytes").unwrap();
            }
            Ok(RunOutput {
                exit_code: Some(self.exit_code),
                stdout: String::new(),
                stderr: self.stderr.to_string(),
            })
        }
    }

    fn store() -> (tempfile::TempDir, TempStore, ToolLocator) {
        let dir = tempfile::tempdir().unwrap();
        let store = TempStore::new(dir.path().join("artifacts")).unwrap();
        let tools = ToolLocator::new(stub_tool(dir.path()));
        (dir, store, tools)
    }

    /// Executable stub so resolution succeeds; the mock runner never
    /// actually invokes it.
    fn stub_tool(dir: &std::path::Path) -> std::path::PathBuf {
        let path = dir.join("yt-dlp-stub");
        std::fs::write(&path, "#!/bin/sh\n").unwrap();
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        }
        path
    }

    const URL: &str = "https://youtu.be/abc123";

    #[tokio::test]
    async fn successful_job_yields_located_artifact() {
        let (_dir, store, tools) = store();
        let runner = MockRunner::succeeding("mp3");

        let artifact = run_download(&runner, &store, &tools, URL, Format::Mp3)
            .await
            .unwrap();
        assert_eq!(artifact.extension, "mp3");
        assert_eq!(artifact.size, 11);
        assert!(artifact.path.exists());
        assert!(artifact.basename().ends_with(".mp3"));
        assert_eq!(runner.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn tool_failure_is_classified_not_retried() {
        let (_dir, store, tools) = store();
        let runner = MockRunner::failing("ERROR: Private video");

        let err = run_download(&runner, &store, &tools, URL, Format::Hd)
            .await
            .unwrap_err();
        assert_eq!(err, DownloadError::Subprocess("This is a private video"));
        assert_eq!(err.to_string(), "Download failed: This is a private video");
        assert_eq!(runner.calls.load(Ordering::SeqCst), 1, "failed jobs are terminal");
    }

    #[tokio::test]
    async fn clean_exit_without_file_is_artifact_missing() {
        let (_dir, store, tools) = store();
        let runner = MockRunner::lying();

        let err = run_download(&runner, &store, &tools, URL, Format::Mp4)
            .await
            .unwrap_err();
        assert_eq!(err, DownloadError::ArtifactMissing);
    }

    #[test]
    fn job_ids_are_unique_enough() {
        let a = job_id();
        let b = job_id();
        assert_eq!(a.len(), 13);
        assert_ne!(a, b);
    }
}
