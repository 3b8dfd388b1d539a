//! Document traits
//!
//! The narrow surface the patch engine needs from a document model:
//! line extraction plus a handful of drawing primitives.

use std::path::Path;

use super::error::{DocumentError, DocumentResult};
use super::types::{Point, RawLine, Rect, Rgb, StandardFont};

/// Opens documents from disk
pub trait DocumentProvider: Send + Sync {
    fn open(&self, path: &Path) -> DocumentResult<Box<dyn DocumentModel>>;
}

/// An opened, mutable document
pub trait DocumentModel: Send {
    /// Number of pages
    fn page_count(&self) -> usize;

    /// Borrow a page for reading and drawing
    fn page(&mut self, index: usize) -> DocumentResult<Box<dyn PageSurface + '_>>;

    /// Write the document, including every pending mutation, to `path`
    fn save(&mut self, path: &Path) -> DocumentResult<()>;
}

/// One page of a document
pub trait PageSurface {
    /// Extract text runs grouped by visual line
    fn extract_lines(&self) -> DocumentResult<Vec<RawLine>>;

    /// Fill and stroke a rectangle with a solid color
    fn fill_rect(&mut self, rect: Rect, color: Rgb) -> DocumentResult<()>;

    /// Stroke a straight line
    fn draw_line(&mut self, from: Point, to: Point, color: Rgb, width: f32) -> DocumentResult<()>;

    /// Whether `font` can draw every character of `text`.
    ///
    /// `insert_text` must accept any text this accepts.
    fn check_text(&self, _text: &str, _font: StandardFont) -> DocumentResult<()> {
        Ok(())
    }

    /// Draw `text` with its baseline starting at `at`
    fn insert_text(
        &mut self,
        at: Point,
        text: &str,
        font: StandardFont,
        size: f32,
        color: Rgb,
    ) -> DocumentResult<()>;

    /// Exact advance width of `text`, when the provider knows font metrics
    fn measure_text(&self, _text: &str, _font: StandardFont, _size: f32) -> DocumentResult<f32> {
        Err(DocumentError::Unsupported("text measurement"))
    }
}
