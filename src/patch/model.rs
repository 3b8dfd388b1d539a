//! Span model
//!
//! A [`Span`] is one visual line of text merged from its styled runs. Spans
//! are what a client sees after upload; [`Change`]s are what it sends back.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::color::ColorClassifier;
use crate::document::{DocumentModel, DocumentResult, RawColor, RawLine, Rect, Rgb, StyleFlags};

/// A merged line of text with the style of its first run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Span {
    pub text: String,
    pub bbox: Rect,
    #[serde(rename = "font")]
    pub font_name: String,
    pub size: f32,
    #[serde(rename = "flags", default)]
    pub style_flags: StyleFlags,
    pub color: Rgb,
}

/// Spans of one page, keyed by the page's position in the document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageSpans {
    pub page_index: usize,
    pub spans: Vec<Span>,
}

/// A requested replacement of the text inside `bbox`
///
/// The page is given by the key this change is filed under in a
/// [`ChangeSet`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Change {
    pub bbox: Rect,
    #[serde(default)]
    pub original_text: Option<String>,
    pub new_text: String,
    #[serde(rename = "font", default)]
    pub font_name: String,
    pub size: f32,
    #[serde(rename = "flags", default)]
    pub style_flags: StyleFlags,
    #[serde(default)]
    pub color: RawColor,
}

impl Change {
    /// A change that rewrites `span` to `new_text`, keeping its style
    pub fn from_span(span: &Span, new_text: impl Into<String>) -> Self {
        Self {
            bbox: span.bbox,
            original_text: Some(span.text.clone()),
            new_text: new_text.into(),
            font_name: span.font_name.clone(),
            size: span.size,
            style_flags: span.style_flags,
            color: RawColor::from(span.color),
        }
    }

    /// Characters in the original text, zero when unknown
    pub fn original_len(&self) -> usize {
        self.original_text
            .as_deref()
            .map(|t| t.chars().count())
            .unwrap_or(0)
    }
}

/// Changes grouped by zero-based page index, applied in ascending page order
pub type ChangeSet = BTreeMap<usize, Vec<Change>>;

/// Turns provider lines into [`Span`]s
#[derive(Debug, Clone, Copy, Default)]
pub struct SpanExtractor {
    colors: ColorClassifier,
}

impl SpanExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Extract every non-empty line of every page.
    ///
    /// Pages without text are omitted; `page_index` still refers to the
    /// page's position in the document.
    pub fn extract(&self, doc: &mut dyn DocumentModel) -> DocumentResult<Vec<PageSpans>> {
        let mut pages = Vec::new();
        for page_index in 0..doc.page_count() {
            let lines = doc.page(page_index)?.extract_lines()?;
            let spans: Vec<Span> = lines.iter().filter_map(|l| self.merge_line(l)).collect();
            if !spans.is_empty() {
                pages.push(PageSpans { page_index, spans });
            }
        }
        Ok(pages)
    }

    /// Merge a line's runs. Whitespace-only lines yield nothing.
    pub fn merge_line(&self, line: &RawLine) -> Option<Span> {
        let first = line.spans.first()?;
        let text: String = line.spans.iter().map(|s| s.text.as_str()).collect();
        if text.trim().is_empty() {
            return None;
        }

        let bbox = line
            .spans
            .iter()
            .skip(1)
            .fold(first.bbox, |acc, s| acc.union(&s.bbox));

        let size = if first.size.is_finite() && first.size > 0.0 {
            first.size
        } else {
            bbox.height().max(1.0)
        };

        Some(Span {
            text,
            bbox,
            font_name: first.font.clone(),
            size,
            style_flags: first.flags,
            color: self.colors.normalize(&first.color),
        })
    }
}
