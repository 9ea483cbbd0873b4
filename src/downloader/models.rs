// Common data models for the download pipeline

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Quality/format preset requested by the client
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    /// Best available HD video, mp4 container
    Hd,
    /// Full HD 1080p video
    P1080,
    /// HD 720p video
    P720,
    /// Audio only, transcoded to mp3
    Mp3,
    /// Same selector as Hd, kept as a distinct wire name
    Mp4,
}

impl Format {
    pub const ALLOWED: [&'static str; 5] = ["hd", "1080p", "720p", "mp3", "mp4"];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hd => "hd",
            Self::P1080 => "1080p",
            Self::P720 => "720p",
            Self::Mp3 => "mp3",
            Self::Mp4 => "mp4",
        }
    }

    pub fn is_audio(&self) -> bool {
        matches!(self, Self::Mp3)
    }
}

impl FromStr for Format {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "hd" => Ok(Self::Hd),
            "1080p" => Ok(Self::P1080),
            "720p" => Ok(Self::P720),
            "mp3" => Ok(Self::Mp3),
            "mp4" => Ok(Self::Mp4),
            _ => Err(()),
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stages a download job moves through. Failures are terminal at any
/// stage; the caller may resubmit, the server never retries on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStage {
    Validating,
    ToolCheck,
    Running,
    LocatingFile,
    SizeCheck,
    Done,
}

impl JobStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Validating => "validating",
            Self::ToolCheck => "tool-check",
            Self::Running => "running",
            Self::LocatingFile => "locating-file",
            Self::SizeCheck => "size-check",
            Self::Done => "done",
        }
    }
}

/// The single media file produced by one download job
#[derive(Debug, Clone)]
pub struct StoredArtifact {
    /// Absolute path inside the temp store directory
    pub path: PathBuf,
    /// Size in bytes, already validated against the ceiling
    pub size: u64,
    /// Extension chosen by the external tool
    pub extension: String,
}

impl StoredArtifact {
    /// Basename used as the one-time download reference
    pub fn basename(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// Form body of POST /download
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DownloadForm {
    pub url: Option<String>,
    pub format: Option<String>,
    /// Connection-test marker; when present no download runs
    pub test: Option<String>,
}

/// Successful response of POST /download
#[derive(Debug, Clone, Serialize)]
pub struct DownloadReady {
    pub success: bool,
    pub filename: String,
    pub download_url: String,
    pub filesize: u64,
}

/// Response to the connection-test request
#[derive(Debug, Clone, Serialize)]
pub struct TestReply {
    pub success: bool,
    pub message: String,
    pub tool_available: bool,
}
