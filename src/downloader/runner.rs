// Subprocess capability seam
//
// The external tool is invoked through a trait object so the whole
// pipeline can be exercised in tests with a scripted runner instead of
// a real binary. The server deliberately imposes no timeout of its own;
// yt-dlp's --socket-timeout and retry flags bound the run.

use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use super::errors::DownloadError;

/// Captured result of one subprocess invocation
#[derive(Debug, Clone)]
pub struct RunOutput {
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl RunOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// Combined output used for failure classification; the original
    /// invocation merged both streams.
    pub fn combined(&self) -> String {
        let mut text = self.stdout.clone();
        if !self.stderr.is_empty() {
            if !text.is_empty() {
                text.push('\n');
            }
            text.push_str(&self.stderr);
        }
        text
    }
}

#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Name of the runner (for logging)
    fn name(&self) -> &'static str;

    /// Run program to completion, capturing exit code and output
    async fn run(&self, program: &str, args: &[String]) -> Result<RunOutput, DownloadError>;
}

/// Runner that spawns the real external tool
pub struct SystemRunner;

#[async_trait]
impl CommandRunner for SystemRunner {
    fn name(&self) -> &'static str {
        "system"
    }

    async fn run(&self, program: &str, args: &[String]) -> Result<RunOutput, DownloadError> {
        debug!(program, args = args.len(), "spawning external tool");

        let output = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    DownloadError::ToolUnavailable
                } else {
                    DownloadError::Internal(format!("failed to start {}: {}", program, e))
                }
            })?;

        Ok(RunOutput {
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn combined_joins_both_streams() {
        let out = RunOutput {
            exit_code: Some(1),
            stdout: "[download] starting".to_string(),
            stderr: "ERROR: Private video".to_string(),
        };
        assert_eq!(out.combined(), "[download] starting\nERROR: Private video");
        assert!(!out.success());
    }

    #[test]
    fn combined_with_empty_stdout_is_just_stderr() {
        let out = RunOutput {
            exit_code: Some(2),
            stdout: String::new(),
            stderr: "ERROR: boom".to_string(),
        };
        assert_eq!(out.combined(), "ERROR: boom");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn system_runner_captures_exit_and_output() {
        let runner = SystemRunner;
        let out = runner
            .run("sh", &["-c".to_string(), "echo out; echo err >&2; exit 3".to_string()])
            .await
            .unwrap();
        assert_eq!(out.exit_code, Some(3));
        assert_eq!(out.stdout.trim(), "out");
        assert_eq!(out.stderr.trim(), "err");
    }

    #[tokio::test]
    async fn missing_program_maps_to_tool_unavailable() {
        let runner = SystemRunner;
        let err = runner
            .run("definitely-not-a-real-binary-9f3k", &[])
            .await
            .unwrap_err();
        assert_eq!(err, DownloadError::ToolUnavailable);
    }
}
