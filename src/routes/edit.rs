//! Edit endpoint

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};

use super::run_blocking;
use crate::error::{AppError, Result};
use crate::patch::{ChangeSet, PatchReport};
use crate::session::SessionRegistry;
use crate::state::AppState;
use crate::storage::secure_filename;

/// Prefix of the file an edit writes
pub const EDITED_PREFIX: &str = "edited_";

#[derive(Debug, Deserialize)]
pub struct EditRequest {
    pub filename: String,
    /// Changes keyed by zero-based page index
    pub changes: ChangeSet,
}

#[derive(Debug, Serialize)]
pub struct EditResponse {
    /// The edited file was written. Individual changes may still have failed.
    pub success: bool,
    pub edited_file: String,
    #[serde(flatten)]
    pub report: PatchReport,
}

/// Apply a change set to a stored upload and save it as `edited_<filename>`
pub async fn edit_file(
    State(state): State<AppState>,
    Json(request): Json<EditRequest>,
) -> Result<Json<EditResponse>> {
    let key = secure_filename(&request.filename)
        .ok_or_else(|| AppError::BadRequest(format!("Unusable file name: {}", request.filename)))?;
    let retention = state.config().retention.file_retention;
    let registry = state.registry();
    let storage = state.storage();

    // Held past the edit timeout so the reaper cannot reclaim the source
    // while the patch still reads it
    let hold = retention.saturating_add(state.config().patch.edit_timeout);
    if registry.renew_if_stored(&key, hold).await.is_none() {
        return Err(missing(registry, &key));
    }

    let edited_key = format!("{}{}", EDITED_PREFIX, key);
    let (source, target) = match (storage.path_for(&key), storage.path_for(&edited_key)) {
        (Some(source), Some(target)) => (source, target),
        _ => {
            return Err(AppError::Internal(
                "Storage backend has no file paths".to_string(),
            ))
        }
    };

    registry.start_or_renew(&edited_key, retention).await;

    let provider = state.provider().clone();
    let applier = state.applier().clone();
    let changes = request.changes;
    let change_count: usize = changes.values().map(Vec::len).sum();

    let result = run_blocking(state.config().patch.edit_timeout, "Edit", move || {
        let mut doc = provider.open(&source)?;
        let report = applier.apply(doc.as_mut(), &changes);
        doc.save(&target)?;
        Ok(report)
    })
    .await;

    let report = match result {
        Ok(report) => report,
        Err(e) => {
            registry.end(&edited_key).await;
            return Err(e);
        }
    };

    // The source session ends with a successful edit. Its file stays until
    // the orphan sweep, so a follow-up edit within the grace period works.
    registry.end(&key).await;

    tracing::info!(
        filename = %key,
        edited_file = %edited_key,
        changes = change_count,
        applied = report.applied.len(),
        failures = report.failures.len(),
        "Edit saved"
    );

    Ok(Json(EditResponse {
        success: true,
        edited_file: edited_key,
        report,
    }))
}

/// 410 when the file was reclaimed by expiry, 404 when it never existed
pub(crate) fn missing(registry: &SessionRegistry, key: &str) -> AppError {
    if registry.was_reclaimed(key) {
        AppError::Gone(format!("{} expired and was deleted", key))
    } else {
        AppError::NotFound(key.to_string())
    }
}
