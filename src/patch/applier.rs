//! Patch application
//!
//! Applies a [`ChangeSet`] to an open document. For each change:
//!
//! 1. resolve a standard font from the recorded font name and flags
//! 2. compute cover rectangle and insertion point
//! 3. check the font can draw the new text, else fall back once to the
//!    fallback font and black; if neither can, nothing is painted
//! 4. paint the cover white and draw the new text
//! 5. underline it in the text color when the source color is the
//!    hyperlink blue, or when a URL or e-mail address is replaced by
//!    another one; a URL in default black is drawn in link blue
//!
//! Changes are isolated: one failing change never stops its siblings.

use serde::Serialize;
use thiserror::Error;

use super::color::ColorClassifier;
use super::font::{FontResolver, StandardFontResolver};
use super::geometry::{CoverGeometry, GeometryEngine, Measure, Placement, WidthSource};
use super::link::{LinkDetector, LinkKind};
use super::model::{Change, ChangeSet};
use crate::document::{DocumentError, DocumentModel, PageSurface, Point, Rect, Rgb, StandardFont};

/// Underline stroke width, in points
pub const UNDERLINE_WIDTH: f32 = 0.5;

/// Underline offset above the cover's bottom edge, in points
pub const UNDERLINE_OFFSET: f32 = 0.5;

// =============================================================================
// Report
// =============================================================================

/// Why a change could not be applied
#[derive(Debug, Error)]
pub enum PatchError {
    #[error("Invalid font size {0}")]
    InvalidSize(f32),

    #[error("Page unavailable: {0}")]
    Page(#[source] DocumentError),

    #[error("Failed to paint cover: {0}")]
    Cover(#[source] DocumentError),

    #[error("Failed to insert text: {0}")]
    Insert(#[source] DocumentError),
}

/// A change that made it onto the page
#[derive(Debug, Clone, Serialize)]
pub struct AppliedChange {
    pub page_index: usize,
    pub change_index: usize,
    pub font: StandardFont,
    pub color: Rgb,
    pub cover: Rect,
    pub width_source: WidthSource,
    pub underlined: bool,
}

/// Degraded but successful application
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WarningKind {
    /// Text went in with the fallback font and black
    FontFallback {
        requested: StandardFont,
        used: StandardFont,
        reason: String,
    },
    /// Text went in but the link underline did not
    UnderlineSkipped { reason: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct PatchWarning {
    pub page_index: usize,
    pub change_index: usize,
    #[serde(flatten)]
    pub kind: WarningKind,
}

#[derive(Debug, Clone, Serialize)]
pub struct PatchFailure {
    pub page_index: usize,
    pub change_index: usize,
    pub reason: String,
}

/// Outcome of applying a change set
#[derive(Debug, Clone, Default, Serialize)]
pub struct PatchReport {
    pub applied: Vec<AppliedChange>,
    pub warnings: Vec<PatchWarning>,
    pub failures: Vec<PatchFailure>,
}

impl PatchReport {
    /// True when every change went in without degradation
    pub fn is_clean(&self) -> bool {
        self.warnings.is_empty() && self.failures.is_empty()
    }

    fn fail(&mut self, page_index: usize, change_index: usize, error: &PatchError) {
        self.failures.push(PatchFailure {
            page_index,
            change_index,
            reason: error.to_string(),
        });
    }
}

// =============================================================================
// Applier
// =============================================================================

/// Applies change sets using pluggable font and geometry strategies
pub struct PatchApplier {
    fonts: Box<dyn FontResolver>,
    geometry: Box<dyn GeometryEngine>,
    colors: ColorClassifier,
    links: LinkDetector,
    fallback_font: StandardFont,
    fallback_color: Rgb,
}

impl Default for PatchApplier {
    fn default() -> Self {
        Self::new(
            Box::new(StandardFontResolver),
            Box::new(CoverGeometry::default()),
        )
    }
}

impl PatchApplier {
    pub fn new(fonts: Box<dyn FontResolver>, geometry: Box<dyn GeometryEngine>) -> Self {
        Self {
            fonts,
            geometry,
            colors: ColorClassifier,
            links: LinkDetector::default(),
            fallback_font: StandardFont::Helvetica,
            fallback_color: Rgb::BLACK,
        }
    }

    /// Font and color for the single insertion retry
    pub fn with_fallback(mut self, font: StandardFont, color: Rgb) -> Self {
        self.fallback_font = font;
        self.fallback_color = color;
        self
    }

    /// Apply every change, page by page in ascending order.
    ///
    /// Mutations are made in place; saving is the caller's job.
    pub fn apply(&self, doc: &mut dyn DocumentModel, changes: &ChangeSet) -> PatchReport {
        let mut report = PatchReport::default();

        for (&page_index, page_changes) in changes {
            let mut page = match doc.page(page_index) {
                Ok(page) => page,
                Err(e) => {
                    tracing::warn!(page_index, error = %e, "Skipping changes for unavailable page");
                    let error = PatchError::Page(e);
                    for change_index in 0..page_changes.len() {
                        report.fail(page_index, change_index, &error);
                    }
                    continue;
                }
            };

            for (change_index, change) in page_changes.iter().enumerate() {
                let mut ctx = ChangeContext {
                    page_index,
                    change_index,
                    report: &mut report,
                };
                if let Err(e) = self.apply_change(page.as_mut(), change, &mut ctx) {
                    tracing::warn!(page_index, change_index, error = %e, "Change not applied");
                    report.fail(page_index, change_index, &e);
                }
            }
        }

        tracing::info!(
            applied = report.applied.len(),
            warnings = report.warnings.len(),
            failures = report.failures.len(),
            "Applied change set"
        );
        report
    }

    fn apply_change(
        &self,
        page: &mut dyn PageSurface,
        change: &Change,
        ctx: &mut ChangeContext<'_>,
    ) -> Result<(), PatchError> {
        if !change.size.is_finite() || change.size <= 0.0 {
            return Err(PatchError::InvalidSize(change.size));
        }

        let font = self.fonts.resolve(&change.font_name, change.style_flags);
        let link = self
            .links
            .preserved(change.original_text.as_deref(), &change.new_text);
        let color = match link {
            Some(LinkKind::Url) if !self.colors.is_non_default(&change.color) => Rgb::LINK_BLUE,
            _ => self.colors.normalize(&change.color),
        };

        let placement: Placement = {
            let surface: &dyn PageSurface = &*page;
            let measure: Measure<'_> =
                &|text: &str, font: StandardFont, size: f32| surface.measure_text(text, font, size);
            self.geometry.cover_and_place(change, font, Some(measure))
        };

        // The font is settled before anything is painted, so a change that
        // cannot be drawn leaves the page untouched
        let (used_font, used_color, fallback_reason) =
            match page.check_text(&change.new_text, font) {
                Ok(()) => (font, color, None),
                Err(first) => {
                    tracing::warn!(
                        page_index = ctx.page_index,
                        change_index = ctx.change_index,
                        font = %font,
                        fallback = %self.fallback_font,
                        error = %first,
                        "Font cannot draw the text, using fallback font"
                    );
                    page.check_text(&change.new_text, self.fallback_font)
                        .map_err(PatchError::Insert)?;
                    (self.fallback_font, self.fallback_color, Some(first.to_string()))
                }
            };

        page.fill_rect(placement.cover, Rgb::WHITE)
            .map_err(PatchError::Cover)?;
        page.insert_text(
            placement.insert_at,
            &change.new_text,
            used_font,
            change.size,
            used_color,
        )
        .map_err(PatchError::Insert)?;

        if let Some(reason) = fallback_reason {
            ctx.warn(WarningKind::FontFallback {
                requested: font,
                used: used_font,
                reason,
            });
        }

        let mut underlined = false;
        if link.is_some() || self.colors.is_link_color(&change.color) {
            let y = placement.cover.y1 - UNDERLINE_OFFSET;
            let from = Point::new(placement.insert_at.x, y);
            let to = Point::new(placement.insert_at.x + placement.cover.width(), y);
            match page.draw_line(from, to, used_color, UNDERLINE_WIDTH) {
                Ok(()) => underlined = true,
                Err(e) => {
                    tracing::warn!(error = %e, "Link underline not drawn");
                    ctx.warn(WarningKind::UnderlineSkipped {
                        reason: e.to_string(),
                    });
                }
            }
        }

        tracing::debug!(
            page_index = ctx.page_index,
            change_index = ctx.change_index,
            font = %used_font,
            width_source = ?placement.width_source,
            colored = self.colors.is_non_default(&change.color),
            link = ?link,
            underlined,
            "Change applied"
        );

        ctx.report.applied.push(AppliedChange {
            page_index: ctx.page_index,
            change_index: ctx.change_index,
            font: used_font,
            color: used_color,
            cover: placement.cover,
            width_source: placement.width_source,
            underlined,
        });
        Ok(())
    }
}

struct ChangeContext<'a> {
    page_index: usize,
    change_index: usize,
    report: &'a mut PatchReport,
}

impl ChangeContext<'_> {
    fn warn(&mut self, kind: WarningKind) {
        self.report.warnings.push(PatchWarning {
            page_index: self.page_index,
            change_index: self.change_index,
            kind,
        });
    }
}
