// SPDX-License-Identifier: MIT OR Apache-2.0

//! Upload endpoint for visit recordings.
//!
//! Endpoints:
//! - GET  /        - upload form
//! - GET  /health  - liveness check
//! - POST /upload  - multipart field `file`; transcribes the recording and
//!   returns `{"success": true, "transcript", "report"}`

use std::path::Path;
use std::sync::Arc;

use axum::extract::multipart::{MultipartError, MultipartRejection};
use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use tracing::{error, info, warn};

use crate::config::ServerConfig;
use crate::errors::FaqError;
use crate::report::{process_recording, ProcessedRecording, ReportGenerator, Transcriber};
use crate::utils::{file_extension, sanitize_filename};

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub transcriber: Arc<dyn Transcriber>,
    pub generator: Arc<dyn ReportGenerator>,
    pub allowed_extensions: Arc<Vec<String>>,
}

impl AppState {
    pub fn new(
        transcriber: Arc<dyn Transcriber>,
        generator: Arc<dyn ReportGenerator>,
        allowed_extensions: Vec<String>,
    ) -> Self {
        Self {
            transcriber,
            generator,
            allowed_extensions: Arc::new(allowed_extensions),
        }
    }

    fn is_allowed(&self, file_name: &str) -> bool {
        file_extension(file_name)
            .map(|ext| self.allowed_extensions.iter().any(|allowed| *allowed == ext))
            .unwrap_or(false)
    }
}

/// Errors returned by the upload handler.
#[derive(Debug)]
pub enum UploadError {
    /// Missing, unnamed or disallowed file.
    BadRequest(String),
    /// The multipart stream could not be read (includes oversized bodies).
    Multipart { status: StatusCode, message: String },
    /// Transcription or report generation failed.
    Processing(FaqError),
    /// The blocking worker died.
    Internal(String),
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl IntoResponse for UploadError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            UploadError::BadRequest(message) => (
                StatusCode::BAD_REQUEST,
                ErrorBody {
                    error: message,
                    details: None,
                },
            ),
            UploadError::Multipart { status, message } => (
                status,
                ErrorBody {
                    error: message,
                    details: None,
                },
            ),
            UploadError::Processing(e) if e.is_client_error() => (
                StatusCode::BAD_REQUEST,
                ErrorBody {
                    error: e.to_string(),
                    details: None,
                },
            ),
            UploadError::Processing(e) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorBody {
                    error: "processing failed".to_string(),
                    details: Some(e.to_string()),
                },
            ),
            UploadError::Internal(message) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorBody {
                    error: "processing failed".to_string(),
                    details: Some(message),
                },
            ),
        };
        (status, Json(body)).into_response()
    }
}

impl From<MultipartError> for UploadError {
    fn from(e: MultipartError) -> Self {
        UploadError::Multipart {
            status: e.status(),
            message: e.body_text(),
        }
    }
}

impl From<MultipartRejection> for UploadError {
    fn from(e: MultipartRejection) -> Self {
        UploadError::Multipart {
            status: e.status(),
            message: e.body_text(),
        }
    }
}

#[derive(Serialize)]
struct UploadResponse {
    success: bool,
    transcript: String,
    report: String,
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
}

/// Builds the router with the upload size limit applied.
pub fn router(state: AppState, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/health", get(health))
        .route("/upload", post(upload))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .with_state(state)
}

/// Binds `config.bind()` and serves until the process is stopped.
pub async fn run(state: AppState, config: &ServerConfig) -> std::io::Result<()> {
    let app = router(state, config.max_upload_bytes());
    let listener = tokio::net::TcpListener::bind(config.bind()).await?;
    info!(addr = %listener.local_addr()?, "upload server listening");
    axum::serve(listener, app).await
}

const INDEX_HTML: &str = r#"<!DOCTYPE html>
<html>
<head><meta charset="utf-8"><title>Visit recording upload</title></head>
<body style="font-family:sans-serif;max-width:48em;margin:2em auto">
<h1>Visit recording upload</h1>
<form id="upload" enctype="multipart/form-data">
  <input type="file" name="file" accept=".m4a,.mp3,.wav,.mp4">
  <button type="submit">Upload</button>
</form>
<h2>Transcript</h2><pre id="transcript"></pre>
<h2>Report</h2><pre id="report"></pre>
<script>
document.getElementById('upload').addEventListener('submit', async (ev) => {
  ev.preventDefault();
  const res = await fetch('/upload', { method: 'POST', body: new FormData(ev.target) });
  const body = await res.json();
  document.getElementById('transcript').textContent = body.transcript || body.error || '';
  document.getElementById('report').textContent = body.report || body.details || '';
});
</script>
</body>
</html>"#;

async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

async fn upload(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<UploadResponse>, UploadError> {
    let mut multipart = multipart?;

    let mut upload = None;
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some("file") {
            continue;
        }
        let file_name = field.file_name().unwrap_or_default().to_string();
        let bytes = field.bytes().await?;
        upload = Some((file_name, bytes));
        break;
    }

    let Some((file_name, bytes)) = upload else {
        warn!("upload without a file field");
        return Err(UploadError::BadRequest("no file selected".to_string()));
    };
    if file_name.is_empty() {
        warn!("upload with an empty file name");
        return Err(UploadError::BadRequest("no file selected".to_string()));
    }
    if !state.is_allowed(&file_name) {
        warn!(file = %file_name, "rejected upload with disallowed extension");
        return Err(UploadError::BadRequest("file type not allowed".to_string()));
    }

    let safe_name = sanitize_filename(&file_name);
    info!(file = %safe_name, bytes = bytes.len(), "received upload");

    let ProcessedRecording { transcript, report } =
        tokio::task::spawn_blocking(move || -> Result<ProcessedRecording, FaqError> {
            let dir = tempfile::tempdir()?;
            let path = dir.path().join(&safe_name);
            std::fs::write(&path, &bytes)?;
            process_saved(&state, &path)
        })
        .await
        .map_err(|e| UploadError::Internal(e.to_string()))?
        .map_err(|e| {
            error!(error = %e, "upload processing failed");
            UploadError::Processing(e)
        })?;

    Ok(Json(UploadResponse {
        success: true,
        transcript,
        report,
    }))
}

fn process_saved(state: &AppState, path: &Path) -> Result<ProcessedRecording, FaqError> {
    process_recording(state.transcriber.as_ref(), state.generator.as_ref(), path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::Result;
    use axum::body::Body;
    use axum::http::Request;
    use serde_json::Value;
    use tower::ServiceExt;

    const BOUNDARY: &str = "homecare-test-boundary";

    /// Reports the saved file's name and contents as the transcript.
    struct FileEchoTranscriber;

    impl Transcriber for FileEchoTranscriber {
        fn transcribe(&self, audio_path: &Path) -> Result<String> {
            let name = audio_path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            let content = std::fs::read_to_string(audio_path)?;
            Ok(format!("{}: {}", name, content))
        }
    }

    struct UpperGenerator;

    impl ReportGenerator for UpperGenerator {
        fn generate_report(&self, transcript: &str) -> Result<String> {
            Ok(format!("## summary\n{}", transcript.to_uppercase()))
        }
    }

    struct FailingGenerator;

    impl ReportGenerator for FailingGenerator {
        fn generate_report(&self, _transcript: &str) -> Result<String> {
            Err(FaqError::Collaborator("generator exited with status 1".to_string()))
        }
    }

    fn state_with(generator: Arc<dyn ReportGenerator>) -> AppState {
        AppState::new(
            Arc::new(FileEchoTranscriber),
            generator,
            ServerConfig::default().allowed_extensions(),
        )
    }

    fn app() -> Router {
        router(state_with(Arc::new(UpperGenerator)), 1024)
    }

    fn multipart_body(field: &str, file_name: &str, content: &[u8]) -> Vec<u8> {
        let mut body = Vec::new();
        body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
        body.extend_from_slice(
            format!(
                "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n",
                field, file_name
            )
            .as_bytes(),
        );
        body.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
        body.extend_from_slice(content);
        body.extend_from_slice(format!("\r\n--{}--\r\n", BOUNDARY).as_bytes());
        body
    }

    fn upload_request(body: Vec<u8>) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/upload")
            .header(
                "content-type",
                format!("multipart/form-data; boundary={}", BOUNDARY),
            )
            .body(Body::from(body))
            .unwrap()
    }

    async fn json_body(resp: Response) -> Value {
        let body = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn health_is_ok() {
        let resp = app()
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(json_body(resp).await["status"], "ok");
    }

    #[tokio::test]
    async fn index_serves_form() {
        let resp = app()
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        assert!(String::from_utf8_lossy(&body).contains("name=\"file\""));
    }

    #[tokio::test]
    async fn upload_returns_transcript_and_report() {
        let resp = app()
            .oneshot(upload_request(multipart_body("file", "visit.M4A", b"pulse stable")))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let body = json_body(resp).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["transcript"], "visit.M4A: pulse stable");
        assert_eq!(body["report"], "## summary\nVISIT.M4A: PULSE STABLE");
    }

    #[tokio::test]
    async fn upload_sanitizes_file_name() {
        let resp = app()
            .oneshot(upload_request(multipart_body(
                "file",
                "../../etc/訪問 記録.wav",
                b"x",
            )))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = json_body(resp).await;
        let transcript = body["transcript"].as_str().unwrap();
        assert!(transcript.ends_with(".wav: x"), "{}", transcript);
        assert!(!transcript.contains('/'));
    }

    #[tokio::test]
    async fn upload_without_file_field_is_bad_request() {
        let resp = app()
            .oneshot(upload_request(multipart_body("other", "visit.mp3", b"x")))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(resp).await["error"], "no file selected");
    }

    #[tokio::test]
    async fn upload_with_empty_name_is_bad_request() {
        let resp = app()
            .oneshot(upload_request(multipart_body("file", "", b"x")))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn upload_with_disallowed_extension_is_bad_request() {
        let resp = app()
            .oneshot(upload_request(multipart_body("file", "notes.txt", b"x")))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(resp).await["error"], "file type not allowed");
    }

    #[tokio::test]
    async fn oversized_upload_is_rejected() {
        let resp = app()
            .oneshot(upload_request(multipart_body("file", "visit.wav", &[b'a'; 4096])))
            .await
            .unwrap();
        assert_ne!(resp.status(), StatusCode::OK);
        assert!(json_body(resp).await["error"].is_string());
    }

    #[tokio::test]
    async fn processing_failure_is_server_error_with_details() {
        let app = router(state_with(Arc::new(FailingGenerator)), 1024);
        let resp = app
            .oneshot(upload_request(multipart_body("file", "visit.mp3", b"x")))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = json_body(resp).await;
        assert_eq!(body["error"], "processing failed");
        assert!(body["details"]
            .as_str()
            .unwrap()
            .contains("generator exited"));
    }
}
