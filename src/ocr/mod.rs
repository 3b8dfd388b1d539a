//! OCR Module
//!
//! Adds a recognized text layer to scanned PDFs before span extraction so
//! image-only pages become editable. OCR is best effort: a missing tool, a
//! crash or a timeout leaves the upload as it was.

mod provider;
mod types;

pub use provider::{DisabledOcr, OcrMyPdf, OcrProcessor};
pub use types::{OcrError, OcrOutcome, OcrStatus};
