//! In-memory document model
//!
//! A JSON-serializable document that records every drawing call instead of
//! rendering it. Used to inspect exactly what the patch engine emits.

use std::path::Path;

use serde::{Deserialize, Serialize};

use super::error::{DocumentError, DocumentResult};
use super::traits::{DocumentModel, DocumentProvider, PageSurface};
use super::types::{Point, RawLine, Rect, Rgb, StandardFont};

/// A drawing call recorded on a page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum DrawOp {
    FillRect {
        rect: Rect,
        color: Rgb,
    },
    Line {
        from: Point,
        to: Point,
        color: Rgb,
        width: f32,
    },
    Text {
        at: Point,
        text: String,
        font: StandardFont,
        size: f32,
        color: Rgb,
    },
}

/// A page with pre-extracted lines and a log of drawing calls
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemoryPage {
    pub lines: Vec<RawLine>,
    #[serde(default)]
    pub ops: Vec<DrawOp>,
    /// Advance width per character as a fraction of the font size.
    /// `None` disables measurement.
    #[serde(default)]
    pub em_width: Option<f32>,
    /// Fonts whose text insertion is rejected
    #[serde(default)]
    pub rejected_fonts: Vec<StandardFont>,
}

impl MemoryPage {
    pub fn with_lines(lines: Vec<RawLine>) -> Self {
        Self {
            lines,
            ..Default::default()
        }
    }

    /// Recorded text insertions, in order
    pub fn inserted_text(&self) -> Vec<&DrawOp> {
        self.ops
            .iter()
            .filter(|op| matches!(op, DrawOp::Text { .. }))
            .collect()
    }
}

/// Recording document
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemoryDocument {
    pub pages: Vec<MemoryPage>,
}

impl MemoryDocument {
    pub fn new(pages: Vec<MemoryPage>) -> Self {
        Self { pages }
    }
}

impl DocumentModel for MemoryDocument {
    fn page_count(&self) -> usize {
        self.pages.len()
    }

    fn page(&mut self, index: usize) -> DocumentResult<Box<dyn PageSurface + '_>> {
        let count = self.pages.len();
        self.pages
            .get_mut(index)
            .map(|page| Box::new(page) as Box<dyn PageSurface + '_>)
            .ok_or(DocumentError::PageNotFound { index, count })
    }

    fn save(&mut self, path: &Path) -> DocumentResult<()> {
        let json =
            serde_json::to_vec_pretty(self).map_err(|e| DocumentError::Save(e.to_string()))?;
        std::fs::write(path, json)?;
        Ok(())
    }
}

impl PageSurface for &mut MemoryPage {
    fn extract_lines(&self) -> DocumentResult<Vec<RawLine>> {
        Ok(self.lines.clone())
    }

    fn check_text(&self, text: &str, font: StandardFont) -> DocumentResult<()> {
        if self.rejected_fonts.contains(&font) {
            let ch = text.chars().next().unwrap_or(' ');
            return Err(DocumentError::UnsupportedGlyph {
                ch,
                font: font.to_string(),
            });
        }
        Ok(())
    }

    fn fill_rect(&mut self, rect: Rect, color: Rgb) -> DocumentResult<()> {
        self.ops.push(DrawOp::FillRect { rect, color });
        Ok(())
    }

    fn draw_line(&mut self, from: Point, to: Point, color: Rgb, width: f32) -> DocumentResult<()> {
        self.ops.push(DrawOp::Line {
            from,
            to,
            color,
            width,
        });
        Ok(())
    }

    fn insert_text(
        &mut self,
        at: Point,
        text: &str,
        font: StandardFont,
        size: f32,
        color: Rgb,
    ) -> DocumentResult<()> {
        self.check_text(text, font)?;
        self.ops.push(DrawOp::Text {
            at,
            text: text.to_string(),
            font,
            size,
            color,
        });
        Ok(())
    }

    fn measure_text(&self, text: &str, _font: StandardFont, size: f32) -> DocumentResult<f32> {
        match self.em_width {
            Some(em) => Ok(text.chars().count() as f32 * em * size),
            None => Err(DocumentError::Unsupported("text measurement")),
        }
    }
}

/// Opens JSON-serialized [`MemoryDocument`]s
#[derive(Debug, Clone, Default)]
pub struct MemoryProvider;

impl DocumentProvider for MemoryProvider {
    fn open(&self, path: &Path) -> DocumentResult<Box<dyn DocumentModel>> {
        let bytes = std::fs::read(path)?;
        let doc: MemoryDocument =
            serde_json::from_slice(&bytes).map_err(|e| DocumentError::Open(e.to_string()))?;
        Ok(Box::new(doc))
    }
}
