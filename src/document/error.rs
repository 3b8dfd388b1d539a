//! Document error types
//!
//! Errors raised by document providers while opening, reading, drawing on
//! or saving a document.

use thiserror::Error;

/// Unified document error type
#[derive(Debug, Error)]
pub enum DocumentError {
    /// Failed to open or parse the document
    #[error("Failed to open document: {0}")]
    Open(String),

    /// Page index outside the document
    #[error("Page {index} not found (document has {count} pages)")]
    PageNotFound { index: usize, count: usize },

    /// The renderer cannot encode a character in the requested font
    #[error("Character {ch:?} cannot be rendered with {font}")]
    UnsupportedGlyph { ch: char, font: String },

    /// The provider does not implement an optional primitive
    #[error("Unsupported operation: {0}")]
    Unsupported(&'static str),

    /// Document structure the provider cannot interpret
    #[error("Malformed document: {0}")]
    Malformed(String),

    /// Failed to write the document out
    #[error("Failed to save document: {0}")]
    Save(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for document operations
pub type DocumentResult<T> = std::result::Result<T, DocumentError>;

impl From<lopdf::Error> for DocumentError {
    fn from(err: lopdf::Error) -> Self {
        DocumentError::Malformed(err.to_string())
    }
}
