// Downloader module - wraps the external tool behind a capability seam

pub mod errors;
pub mod job;
pub mod models;
pub mod presets;
pub mod runner;
pub mod tools;

pub use errors::DownloadError;
pub use job::{run_download, DownloadJob};
pub use models::{DownloadForm, DownloadReady, Format, JobStage, StoredArtifact, TestReply};
pub use runner::{CommandRunner, RunOutput, SystemRunner};
pub use tools::ToolLocator;
