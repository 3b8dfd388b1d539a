//! OCR Types

use std::path::PathBuf;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

/// What happened to a document sent through OCR
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "ocr", rename_all = "lowercase")]
pub enum OcrStatus {
    /// A text layer was added; the outcome path is a new file
    Applied,
    /// OCR is switched off
    Disabled,
    /// OCR could not run; the outcome path is the input
    Skipped { reason: String },
}

/// Result of OCR processing. Never an error: failures degrade to the input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OcrOutcome {
    pub path: PathBuf,
    pub status: OcrStatus,
}

impl OcrOutcome {
    pub fn applied(path: PathBuf) -> Self {
        Self {
            path,
            status: OcrStatus::Applied,
        }
    }

    pub fn skipped(path: PathBuf, reason: impl Into<String>) -> Self {
        Self {
            path,
            status: OcrStatus::Skipped {
                reason: reason.into(),
            },
        }
    }

    pub fn is_applied(&self) -> bool {
        self.status == OcrStatus::Applied
    }
}

/// Internal OCR failures, reported as [`OcrStatus::Skipped`] reasons
#[derive(Debug, Error)]
pub enum OcrError {
    #[error("Missing dependency: {0}")]
    MissingDependency(String),

    #[error("Failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("OCR exited with {code:?}: {stderr}")]
    Failed { code: Option<i32>, stderr: String },

    #[error("OCR timed out after {0:?}")]
    Timeout(Duration),
}
