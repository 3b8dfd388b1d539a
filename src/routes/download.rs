//! Download endpoint

use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, StatusCode},
    response::Response,
};

use super::edit::missing;
use crate::error::{AppError, Result};
use crate::state::AppState;
use crate::storage::{secure_filename, StorageError};

/// Send a stored file as an attachment and end its session.
///
/// The file itself stays until the orphan sweep picks it up, so a retried
/// download within the grace period still succeeds.
pub async fn download_file(
    State(state): State<AppState>,
    Path(filename): Path<String>,
) -> Result<Response> {
    let key = secure_filename(&filename)
        .ok_or_else(|| AppError::BadRequest(format!("Unusable file name: {}", filename)))?;

    let data = match state.storage().read(&key).await {
        Ok(data) => data,
        Err(StorageError::NotFound(_)) => return Err(missing(state.registry(), &key)),
        Err(e) => return Err(e.into()),
    };

    state.registry().end(&key).await;
    tracing::info!(filename = %key, bytes = data.len(), "Serving download");

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/pdf")
        .header(header::CONTENT_LENGTH, data.len())
        .header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", key),
        )
        .body(Body::from(data))
        .map_err(|e| AppError::Internal(e.to_string()))
}
