// HTTP surface: initiate-download and serve-artifact endpoints
//
// POST /download runs one blocking yt-dlp job and answers with a
// one-time download reference; GET /serve streams the artifact back in
// bounded chunks and schedules its deletion. Every failure is
// serialized as {success:false, error} with no internal detail.

use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use axum::{
    body::{Body, Bytes},
    extract::{Query, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Form, Json, Router,
};
use futures::Stream;
use lazy_static::lazy_static;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use regex::Regex;
use serde::Deserialize;
use tokio_util::io::ReaderStream;
use tracing::{error, info, warn};

use crate::downloader::{
    run_download, CommandRunner, DownloadError, DownloadForm, DownloadReady, Format, TestReply,
    ToolLocator,
};
use crate::store::{ResolveError, TempStore, SERVE_GRACE};

/// Chunk size for serving artifacts; memory use stays independent of
/// file size.
const SERVE_CHUNK_BYTES: usize = 8 * 1024;

lazy_static! {
    /// Accepted YouTube watch/embed/short-link shapes
    static ref YOUTUBE_URL_RE: Regex = Regex::new(
        r"^https?://(www\.)?(youtube\.com/(watch\?v=|embed/|v/)|youtu\.be/)"
    )
    .expect("youtube url pattern compiles");
}

/// urlencode-style escaping for the one-time file reference
const FILE_REF: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.');

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<TempStore>,
    pub runner: Arc<dyn CommandRunner>,
    pub tools: Arc<ToolLocator>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/download", post(initiate_download).options(preflight))
        .route("/serve", get(serve_artifact))
        .with_state(state)
}

/// Uniform error response: {success:false, error:<message>}
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
        }
    }

    fn forbidden(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::FORBIDDEN,
            message: message.into(),
        }
    }

    fn gone(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::GONE,
            message: message.into(),
        }
    }

    fn internal() -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: "Internal server error".to_string(),
        }
    }
}

impl From<DownloadError> for ApiError {
    fn from(e: DownloadError) -> Self {
        let status = match &e {
            DownloadError::Security => StatusCode::FORBIDDEN,
            DownloadError::Internal(detail) => {
                error!(%detail, "unexpected internal fault");
                StatusCode::INTERNAL_SERVER_ERROR
            }
            _ => StatusCode::BAD_REQUEST,
        };
        Self {
            status,
            message: e.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({
            "success": false,
            "error": self.message,
        });
        (self.status, cors_headers(), Json(body)).into_response()
    }
}

fn validation(message: &str) -> ApiError {
    DownloadError::Validation(message.to_string()).into()
}

/// Run blocking fs/exec work off the async worker thread.
async fn run_blocking<T, F>(work: F) -> Result<T, ApiError>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work).await.map_err(|e| {
        error!(error = %e, "blocking task failed");
        ApiError::internal()
    })
}

/// Permissive CORS, kept from the original deployment where the front
/// end could live on a different origin.
fn cors_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static("*"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("POST"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("Content-Type"),
    );
    headers
}

async fn preflight() -> impl IntoResponse {
    (StatusCode::OK, cors_headers())
}

/// POST /download: validate, run the external tool, answer with the
/// one-time reference. Blocks for the full subprocess duration.
pub async fn initiate_download(
    State(state): State<AppState>,
    Form(form): Form<DownloadForm>,
) -> Result<Response, ApiError> {
    // Opportunistic retention sweep on every request start; the store
    // scans the directory with blocking fs calls, so it runs off the
    // async worker.
    let store = Arc::clone(&state.store);
    run_blocking(move || store.sweep()).await?;

    // Connection test: report tool availability without downloading.
    // The probe execs `yt-dlp --version` synchronously.
    if form.test.is_some() {
        let tools = Arc::clone(&state.tools);
        let tool_available = run_blocking(move || tools.is_available()).await?;
        let reply = TestReply {
            success: true,
            message: "Connection successful".to_string(),
            tool_available,
        };
        return Ok((cors_headers(), Json(reply)).into_response());
    }

    let url = form.url.as_deref().unwrap_or("").trim().to_string();
    if url.is_empty() {
        return Err(validation("URL is required"));
    }
    if !YOUTUBE_URL_RE.is_match(&url) {
        return Err(validation("Please provide a valid YouTube URL"));
    }

    let format: Format = form
        .format
        .as_deref()
        .unwrap_or("")
        .parse()
        .map_err(|_| {
            validation(&format!(
                "Invalid format. Allowed formats: {}",
                Format::ALLOWED.join(", ")
            ))
        })?;

    let artifact = run_download(
        state.runner.as_ref(),
        &state.store,
        &state.tools,
        &url,
        format,
    )
    .await?;

    let reference = artifact.basename();
    let ready = DownloadReady {
        success: true,
        filename: display_filename(&artifact.extension),
        download_url: format!("/serve?file={}", utf8_percent_encode(&reference, FILE_REF)),
        filesize: artifact.size,
    };
    info!(%reference, filesize = artifact.size, "artifact ready to serve");

    Ok((cors_headers(), Json(ready)).into_response())
}

/// Clean display name offered to the browser, independent of the
/// stored basename.
fn display_filename(extension: &str) -> String {
    let description = time::macros::format_description!(
        "[year]-[month]-[day]_[hour]-[minute]-[second]"
    );
    let stamp = time::OffsetDateTime::now_utc()
        .format(&description)
        .unwrap_or_else(|_| "now".to_string());
    if extension.is_empty() {
        format!("download_{}", stamp)
    } else {
        format!("download_{}.{}", stamp, extension)
    }
}

#[derive(Debug, Deserialize)]
pub struct ServeParams {
    pub file: Option<String>,
}

/// GET /serve?file=<basename>: stream the artifact once, then delete
/// it after the grace delay.
pub async fn serve_artifact(
    State(state): State<AppState>,
    Query(params): Query<ServeParams>,
) -> Result<Response, ApiError> {
    let reference = params.file.as_deref().unwrap_or("");

    let path = state.store.resolve(reference).map_err(|e| match e {
        ResolveError::NotFound => ApiError::not_found("File not found"),
        ResolveError::OutsideRoot => {
            // Never echo the attempted path back
            warn!(reference, "blocked file reference outside store");
            ApiError::forbidden("Access denied")
        }
    })?;

    // Single-serve admission: a repeat request inside the grace window
    // is refused instead of racing the pending delete.
    if !state.store.begin_serve(&path) {
        return Err(ApiError::gone("File has already been retrieved"));
    }

    let file = match tokio::fs::File::open(&path).await {
        Ok(file) => file,
        Err(_) => {
            state.store.release(&path);
            return Err(ApiError::not_found("File not found"));
        }
    };
    let size = match file.metadata().await {
        Ok(metadata) => metadata.len(),
        Err(e) => {
            state.store.release(&path);
            error!(error = %e, "failed to stat artifact");
            return Err(ApiError::internal());
        }
    };

    let basename = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let disposition = HeaderValue::try_from(format!("attachment; filename=\"{}\"", basename))
        .map_err(|_| {
            state.store.release(&path);
            ApiError::internal()
        })?;

    // The guard schedules the grace-delay delete when the body stream
    // is dropped: after the last chunk or on client abort.
    let stream = ArtifactStream {
        inner: ReaderStream::with_capacity(file, SERVE_CHUNK_BYTES),
        _cleanup: CleanupGuard {
            store: Arc::clone(&state.store),
            path,
        },
    };

    let mut response = Response::new(Body::from_stream(stream));
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/octet-stream"),
    );
    headers.insert(header::CONTENT_DISPOSITION, disposition);
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(size));
    headers.insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static("must-revalidate, post-check=0, pre-check=0"),
    );
    headers.insert(header::PRAGMA, HeaderValue::from_static("public"));
    headers.insert(header::EXPIRES, HeaderValue::from_static("0"));
    Ok(response)
}

struct CleanupGuard {
    store: Arc<TempStore>,
    path: PathBuf,
}

impl Drop for CleanupGuard {
    fn drop(&mut self) {
        self.store.schedule_delete(self.path.clone(), SERVE_GRACE);
    }
}

struct ArtifactStream {
    inner: ReaderStream<tokio::fs::File>,
    _cleanup: CleanupGuard,
}

impl Stream for ArtifactStream {
    type Item = std::io::Result<Bytes>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.get_mut().inner).poll_next(cx)
    }
}
