// Error types for the download pipeline

use std::fmt;

/// Ordered mapping of known yt-dlp output fragments to user-facing
/// messages. Matching is case-sensitive substring search and the order
/// is load-bearing: earlier, more specific patterns must win over later
/// overlapping ones. Do not reorder.
const TOOL_ERROR_PATTERNS: [(&str, &str); 8] = [
    ("Video unavailable", "Video is unavailable or private"),
    ("This video is not available", "Video is not available in your region"),
    ("Private video", "This is a private video"),
    ("Sign in to confirm your age", "Age-restricted video cannot be downloaded"),
    ("Video removed", "Video has been removed"),
    ("Copyright", "Video is copyright protected"),
    ("network", "Network connection error"),
    ("No video formats found", "No suitable video format found"),
];

const GENERIC_TOOL_ERROR: &str =
    "Unable to download video. Please check the URL and try again.";

/// Map the captured output of a failed yt-dlp run to a friendly message.
/// First matching pattern wins; unknown output gets the generic message.
pub fn classify_tool_output(output: &str) -> &'static str {
    for (pattern, message) in TOOL_ERROR_PATTERNS {
        if output.contains(pattern) {
            return message;
        }
    }
    GENERIC_TOOL_ERROR
}

/// Failure taxonomy for a single download request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadError {
    /// Bad URL or format; the caller must correct the input
    Validation(String),

    /// yt-dlp could not be resolved; environment misconfiguration
    ToolUnavailable,

    /// yt-dlp exited non-zero; carries the classified friendly message
    Subprocess(&'static str),

    /// The tool claimed success but produced no file
    ArtifactMissing,

    /// Artifact exceeded the size ceiling and was deleted
    TooLarge,

    /// A file reference tried to escape the store directory
    Security,

    /// Unexpected internal fault; detail is logged, never shown
    Internal(String),
}

impl DownloadError {
    /// Build a subprocess failure from captured output
    pub fn from_tool_output(output: &str) -> Self {
        Self::Subprocess(classify_tool_output(output))
    }
}

impl fmt::Display for DownloadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Validation(msg) => f.write_str(msg),
            Self::ToolUnavailable => f.write_str("yt-dlp is not installed or not accessible"),
            Self::Subprocess(msg) => write!(f, "Download failed: {}", msg),
            Self::ArtifactMissing => f.write_str("Downloaded file not found"),
            Self::TooLarge => f.write_str("File too large (max 500MB allowed)"),
            Self::Security => f.write_str("Access denied"),
            // Internal detail stays in the logs
            Self::Internal(_) => f.write_str("Internal server error"),
        }
    }
}

impl std::error::Error for DownloadError {}

impl From<std::io::Error> for DownloadError {
    fn from(e: std::io::Error) -> Self {
        Self::Internal(e.to_string())
    }
}
