//! Upload endpoint
//!
//! Stores the file under its sanitized name, starts its session before the
//! first byte hits storage, runs OCR when available and returns the
//! editable spans of every page.

use axum::{
    extract::{multipart::MultipartError, Multipart, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;

use super::run_blocking;
use crate::error::{AppError, Result};
use crate::ocr::OcrStatus;
use crate::patch::PageSpans;
use crate::state::AppState;
use crate::storage::secure_filename;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadStatus {
    Success,
    /// Processed, but without OCR although it was wanted
    Warning,
}

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub status: UploadStatus,
    pub message: String,
    pub filename: String,
    pub pages: Vec<PageSpans>,
    /// Seconds until the file is reclaimed unless renewed
    pub expires_in_secs: u64,
    #[serde(flatten)]
    pub ocr: OcrStatus,
}

/// Accept a PDF in the multipart field `file`
pub async fn upload_file(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>> {
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() != Some("file") {
            tracing::debug!(field = ?field.name(), "Ignoring multipart field");
            continue;
        }

        let original = field.file_name().unwrap_or_default().to_string();
        if original.is_empty() {
            return Err(AppError::BadRequest("No selected file".to_string()));
        }
        let filename = secure_filename(&original)
            .ok_or_else(|| AppError::BadRequest(format!("Unusable file name: {}", original)))?;
        if !state.config().is_allowed_file(&filename) {
            return Err(AppError::UnsupportedMediaType(format!(
                "Invalid file type: {}",
                original
            )));
        }

        let data = field.bytes().await.map_err(multipart_error)?;
        tracing::debug!(filename = %filename, bytes = data.len(), "Received upload");

        return store_and_extract(&state, filename, &data).await.map(Json);
    }

    tracing::warn!("No file field found in multipart upload");
    Err(AppError::BadRequest("No file part".to_string()))
}

async fn store_and_extract(
    state: &AppState,
    filename: String,
    data: &[u8],
) -> Result<UploadResponse> {
    let config = state.config();
    let retention = config.retention.file_retention;
    // Covers the slowest OCR run plus extraction, so the reaper cannot
    // reclaim the file while it is still being processed
    let processing_hold = retention
        .saturating_add(config.ocr.timeout)
        .saturating_add(config.patch.edit_timeout);
    let registry = state.registry();
    let storage = state.storage();

    registry.start_or_renew(&filename, processing_hold).await;
    storage.write(&filename, data).await?;

    let path = storage
        .path_for(&filename)
        .ok_or_else(|| AppError::Internal("Storage backend has no file paths".to_string()))?;

    let outcome = state.ocr().process(&path).await;
    let ocr = if outcome.is_applied() {
        // Extraction and later edits read the stored key, so OCR output replaces it
        let replaced = match tokio::fs::read(&outcome.path).await {
            Ok(bytes) => storage.write(&filename, &bytes).await.map_err(AppError::from),
            Err(e) => Err(AppError::from(e)),
        };
        if let Err(e) = tokio::fs::remove_file(&outcome.path).await {
            tracing::debug!(path = %outcome.path.display(), error = %e, "Failed to remove OCR output");
        }
        match replaced {
            Ok(()) => OcrStatus::Applied,
            Err(e) => {
                tracing::warn!(filename = %filename, error = %e, "Keeping upload without OCR layer");
                OcrStatus::Skipped {
                    reason: e.to_string(),
                }
            }
        }
    } else {
        outcome.status
    };

    let provider = state.provider().clone();
    let extractor = *state.extractor();
    let pages = run_blocking(config.patch.edit_timeout, "Span extraction", move || {
        let mut doc = provider.open(&path)?;
        Ok(extractor.extract(doc.as_mut())?)
    })
    .await?;

    registry.start_or_renew(&filename, retention).await;

    let (status, message) = match &ocr {
        OcrStatus::Applied => (UploadStatus::Success, "File processed successfully with OCR".to_string()),
        OcrStatus::Disabled => (UploadStatus::Success, "File processed without OCR".to_string()),
        OcrStatus::Skipped { reason } => (
            UploadStatus::Warning,
            format!("OCR unavailable ({}). Processing without OCR.", reason),
        ),
    };

    tracing::info!(
        filename = %filename,
        pages = pages.len(),
        ocr = ?ocr,
        "Upload processed"
    );

    Ok(UploadResponse {
        status,
        message,
        filename,
        pages,
        expires_in_secs: retention.as_secs(),
        ocr,
    })
}

fn multipart_error(e: MultipartError) -> AppError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::PayloadTooLarge(e.body_text())
    } else {
        tracing::error!("Failed to read multipart field: {}", e);
        AppError::BadRequest(format!("Failed to read upload: {}", e.body_text()))
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use axum::http::StatusCode;
    use tower::ServiceExt;

    use super::super::router;
    use super::super::tests::{
        body_json, sample_pdf_bytes, test_state, test_state_with, upload_request,
    };
    use crate::ocr::{OcrOutcome, OcrProcessor, OcrStatus};
    use crate::session::Reaper;

    /// OCR that takes longer than the retention period
    struct SlowOcr(Duration);

    #[async_trait]
    impl OcrProcessor for SlowOcr {
        async fn is_available(&self) -> bool {
            true
        }

        async fn process(&self, input: &Path) -> OcrOutcome {
            tokio::time::sleep(self.0).await;
            OcrOutcome {
                path: input.to_path_buf(),
                status: OcrStatus::Disabled,
            }
        }
    }

    #[tokio::test]
    async fn test_slow_ocr_outlives_retention() {
        let (state, dir) = test_state_with(
            |config| {
                config.retention.file_retention = Duration::from_secs(1);
                config.ocr.timeout = Duration::from_secs(3);
            },
            Arc::new(SlowOcr(Duration::from_millis(1500))),
        )
        .await;
        let reaper = Reaper::new(state.registry().clone(), Duration::from_millis(100)).spawn();

        let response = router(state.clone())
            .oneshot(upload_request("file", "scan.pdf", &sample_pdf_bytes()))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["expires_in_secs"], 1);
        assert!(dir.path().join("scan.pdf").exists());
        assert!(!state.registry().was_reclaimed("scan.pdf"));

        // Back on the normal retention once processing is done
        let session = state.registry().get("scan.pdf").await.unwrap();
        assert!(session.expires_at <= state.registry().now() + Duration::from_secs(1));

        state.registry().shutdown();
        reaper.await.unwrap();
    }

    #[tokio::test]
    async fn test_upload_returns_spans_and_starts_session() {
        let (state, dir) = test_state().await;
        let app = router(state.clone());

        let response = app
            .oneshot(upload_request("file", "My Report.pdf", &sample_pdf_bytes()))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["status"], "success");
        assert_eq!(body["filename"], "My_Report.pdf");
        assert_eq!(body["ocr"], "disabled");
        assert_eq!(body["expires_in_secs"], 120);

        let spans = body["pages"][0]["spans"].as_array().unwrap();
        assert_eq!(body["pages"][0]["page_index"], 0);
        assert_eq!(spans[0]["text"], "Hello world");
        assert_eq!(spans[1]["text"], "Second");

        assert!(dir.path().join("My_Report.pdf").exists());
        assert!(state.registry().contains("My_Report.pdf").await);
    }

    #[tokio::test]
    async fn test_missing_file_part() {
        let (state, _dir) = test_state().await;
        let response = router(state)
            .oneshot(upload_request("attachment", "a.pdf", b"%PDF-1.5"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["error"], "bad_request");
        assert!(body["message"].as_str().unwrap().contains("No file part"));
    }

    #[tokio::test]
    async fn test_empty_file_name() {
        let (state, _dir) = test_state().await;
        let response = router(state)
            .oneshot(upload_request("file", "", b"%PDF-1.5"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert!(body["message"].as_str().unwrap().contains("No selected file"));
    }

    #[tokio::test]
    async fn test_rejects_other_extensions() {
        let (state, dir) = test_state().await;
        let response = router(state.clone())
            .oneshot(upload_request("file", "notes.txt", b"hello"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
        assert!(!dir.path().join("notes.txt").exists());
        assert!(state.registry().is_empty().await);
    }

    #[tokio::test]
    async fn test_unparsable_pdf_is_unprocessable() {
        let (state, _dir) = test_state().await;
        let response = router(state)
            .oneshot(upload_request("file", "broken.pdf", b"not a pdf at all"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let body = body_json(response).await;
        assert_eq!(body["error"], "invalid_document");
    }
}
