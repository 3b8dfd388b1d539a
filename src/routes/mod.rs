//! HTTP routes for Palimpsest Server
//!
//! - `GET  /health`               liveness
//! - `POST /upload`               store a PDF, start its session, return spans
//! - `POST /edit`                 patch a stored PDF into `edited_<name>`
//! - `GET  /download/:filename`   fetch a stored file and end its session

pub mod download;
pub mod edit;
pub mod upload;

use std::time::Duration;

use axum::{
    extract::{DefaultBodyLimit, State},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::error::{AppError, Result};
use crate::state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    status: &'static str,
    version: &'static str,
    active_sessions: usize,
}

async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        active_sessions: state.registry().len().await,
    })
}

/// Build the full application router
pub fn router(state: AppState) -> Router {
    let body_limit = state.config().upload.max_file_size;

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_check))
        .route("/upload", post(upload::upload_file))
        .route("/edit", post(edit::edit_file))
        .route("/download/:filename", get(download::download_file))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Run document work on the blocking pool, giving up after `limit`.
///
/// A timed-out task is not cancelled; it finishes in the background and
/// whatever it writes is left to the orphan sweep.
pub(crate) async fn run_blocking<T, F>(limit: Duration, what: &'static str, f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    match tokio::time::timeout(limit, tokio::task::spawn_blocking(f)).await {
        Ok(Ok(result)) => result,
        Ok(Err(e)) => Err(AppError::Internal(format!("{} task failed: {}", what, e))),
        Err(_) => {
            tracing::warn!(task = what, limit_secs = limit.as_secs(), "Blocking task timed out");
            Err(AppError::Timeout(format!(
                "{} did not finish within {}s",
                what,
                limit.as_secs()
            )))
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use tempfile::TempDir;
    use tower::ServiceExt;

    use super::*;
    use crate::config::Config;
    use crate::document::PdfProvider;
    use crate::ocr::{DisabledOcr, OcrProcessor};
    use crate::storage::LocalStorage;

    pub(crate) const BOUNDARY: &str = "palimpsest-test-boundary";

    /// State over a temporary upload folder with OCR disabled
    pub(crate) async fn test_state() -> (AppState, TempDir) {
        test_state_with(|_| {}, Arc::new(DisabledOcr)).await
    }

    pub(crate) async fn test_state_with(
        configure: impl FnOnce(&mut Config),
        ocr: Arc<dyn OcrProcessor>,
    ) -> (AppState, TempDir) {
        let dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.upload.folder = dir.path().to_path_buf();
        config.ocr.enabled = false;
        configure(&mut config);

        let storage = LocalStorage::new(dir.path()).await.unwrap();
        let state = AppState::new(config, Arc::new(storage), Arc::new(PdfProvider), ocr);
        (state, dir)
    }

    pub(crate) fn sample_pdf_bytes() -> Vec<u8> {
        let mut doc = crate::document::sample_pdf();
        let mut bytes = Vec::new();
        doc.save_to(&mut bytes).unwrap();
        bytes
    }

    /// A multipart body with a single field
    pub(crate) fn multipart_body(field: &str, filename: &str, data: &[u8]) -> Vec<u8> {
        let mut body = Vec::new();
        body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
        body.extend_from_slice(
            format!(
                "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n",
                field, filename
            )
            .as_bytes(),
        );
        body.extend_from_slice(b"Content-Type: application/pdf\r\n\r\n");
        body.extend_from_slice(data);
        body.extend_from_slice(format!("\r\n--{}--\r\n", BOUNDARY).as_bytes());
        body
    }

    pub(crate) fn upload_request(field: &str, filename: &str, data: &[u8]) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/upload")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={}", BOUNDARY),
            )
            .body(Body::from(multipart_body(field, filename, data)))
            .unwrap()
    }

    pub(crate) async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let (state, _dir) = test_state().await;
        let server = axum_test::TestServer::new(router(state)).unwrap();

        let response = server.get("/health").await;
        response.assert_status_ok();
        let body: serde_json::Value = response.json();
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["active_sessions"], 0);
    }

    #[tokio::test]
    async fn test_body_limit_rejects_oversized_upload() {
        let (state, _dir) = test_state().await;
        let limit = state.config().upload.max_file_size;
        let app = router(state);

        let oversized = vec![b'x'; limit + 1];
        let response = app
            .oneshot(upload_request("file", "big.pdf", &oversized))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn test_run_blocking_times_out() {
        let result: Result<()> = run_blocking(Duration::from_millis(10), "Sleep", || {
            std::thread::sleep(Duration::from_millis(200));
            Ok(())
        })
        .await;

        assert!(matches!(result, Err(AppError::Timeout(_))));
    }

    #[tokio::test]
    async fn test_run_blocking_passes_errors_through() {
        let result: Result<()> = run_blocking(Duration::from_secs(5), "Fail", || {
            Err(AppError::BadRequest("nope".into()))
        })
        .await;

        assert!(matches!(result, Err(AppError::BadRequest(_))));
    }
}
