//! Cover and placement geometry
//!
//! For every change two things are computed: the rectangle painted white
//! over the old text, and the baseline point where the new text starts.
//!
//! The cover is exactly as tall as the font size, centered on the original
//! line and nudged slightly down. Its width is the replacement's measured
//! advance when the document can measure text, otherwise a proportional
//! estimate from the original line's width.

use serde::Serialize;

use super::model::Change;
use crate::document::{DocumentResult, Point, Rect, StandardFont};

/// Measures the advance width of text set in a font at a size
pub type Measure<'a> = &'a dyn Fn(&str, StandardFont, f32) -> DocumentResult<f32>;

/// Numeric knobs of the cover heuristic
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeometryTuning {
    /// Cover height as a multiple of the font size
    pub height_factor: f32,
    /// Downward shift of the cover, in points
    pub vertical_bias: f32,
    /// Horizontal inset of the insertion point, in points
    pub insert_inset: f32,
    /// Baseline lift above the original bottom edge, as a multiple of size
    pub baseline_lift: f32,
    /// Floor on the character count dividing the original width
    pub min_divisor_chars: usize,
}

impl Default for GeometryTuning {
    fn default() -> Self {
        Self {
            height_factor: 1.0,
            vertical_bias: 0.5,
            insert_inset: 0.8,
            baseline_lift: 0.1,
            min_divisor_chars: 10,
        }
    }
}

/// Where a width came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WidthSource {
    Measured,
    Proportional,
}

/// Computed geometry for one change
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Placement {
    pub cover: Rect,
    pub insert_at: Point,
    pub width_source: WidthSource,
}

/// Pure geometry strategy
pub trait GeometryEngine: Send + Sync {
    /// `measure` is `None` when the document cannot measure text
    fn cover_and_place(
        &self,
        change: &Change,
        font: StandardFont,
        measure: Option<Measure<'_>>,
    ) -> Placement;
}

/// The standard cover heuristic
#[derive(Debug, Clone, Copy)]
pub struct CoverGeometry {
    tuning: GeometryTuning,
    prefer_measured: bool,
}

impl Default for CoverGeometry {
    fn default() -> Self {
        Self::new(GeometryTuning::default())
    }
}

impl CoverGeometry {
    /// Measured widths when available, proportional otherwise
    pub fn new(tuning: GeometryTuning) -> Self {
        Self {
            tuning,
            prefer_measured: true,
        }
    }

    /// Proportional widths only
    pub fn proportional(tuning: GeometryTuning) -> Self {
        Self {
            tuning,
            prefer_measured: false,
        }
    }

    /// Original width scaled by character count.
    ///
    /// The divisor is floored so short originals (including empty ones)
    /// never blow the width up.
    pub fn proportional_width(&self, change: &Change) -> f32 {
        let divisor = change
            .original_len()
            .max(self.tuning.min_divisor_chars)
            .max(1) as f32;
        let per_char = change.bbox.width().max(0.0) / divisor;
        per_char * change.new_text.chars().count() as f32
    }

    fn width(
        &self,
        change: &Change,
        font: StandardFont,
        measure: Option<Measure<'_>>,
    ) -> (f32, WidthSource) {
        if self.prefer_measured {
            if let Some(measure) = measure {
                match measure(&change.new_text, font, change.size) {
                    Ok(width) if width.is_finite() && width >= 0.0 => {
                        return (width, WidthSource::Measured)
                    }
                    Ok(width) => {
                        tracing::debug!(width, "Discarding unusable measured width");
                    }
                    Err(e) => {
                        tracing::debug!(error = %e, "Text measurement unavailable");
                    }
                }
            }
        }
        (self.proportional_width(change), WidthSource::Proportional)
    }
}

impl GeometryEngine for CoverGeometry {
    fn cover_and_place(
        &self,
        change: &Change,
        font: StandardFont,
        measure: Option<Measure<'_>>,
    ) -> Placement {
        let (width, width_source) = self.width(change, font, measure);

        let half_height = change.size * self.tuning.height_factor / 2.0;
        let mid = change.bbox.mid_y() + self.tuning.vertical_bias;
        let cover = Rect::new(
            change.bbox.x0,
            mid - half_height,
            change.bbox.x0 + width,
            mid + half_height,
        );

        let insert_at = Point::new(
            cover.x0 + self.tuning.insert_inset,
            change.bbox.y1 - change.size * self.tuning.baseline_lift,
        );

        Placement {
            cover,
            insert_at,
            width_source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{DocumentError, RawColor, StyleFlags};

    fn change(original: Option<&str>, new_text: &str) -> Change {
        Change {
            bbox: Rect::new(10.0, 100.0, 60.0, 112.0),
            original_text: original.map(str::to_string),
            new_text: new_text.to_string(),
            font_name: "Helvetica".to_string(),
            size: 12.0,
            style_flags: StyleFlags(0),
            color: RawColor::Absent,
        }
    }

    #[test]
    fn test_cover_height_and_center() {
        let geometry = CoverGeometry::default();
        let placement = geometry.cover_and_place(&change(Some("Hello"), "Hi"), StandardFont::Helvetica, None);

        assert_eq!(placement.width_source, WidthSource::Proportional);
        assert!((placement.cover.height() - 12.0).abs() < 1e-4);
        assert!((placement.cover.mid_y() - 106.5).abs() < 1e-4);
        // 50pt over max(5, 10) chars, times two new characters
        assert!((placement.cover.width() - 10.0).abs() < 1e-4);
        assert!((placement.insert_at.x - 10.8).abs() < 1e-4);
        assert!((placement.insert_at.y - 110.8).abs() < 1e-4);
    }

    #[test]
    fn test_long_original_divides_by_its_length() {
        let geometry = CoverGeometry::default();
        let c = change(Some("Twenty characters!!!"), "Ten chars.");
        let placement = geometry.cover_and_place(&c, StandardFont::Helvetica, None);
        assert!((placement.cover.width() - 25.0).abs() < 1e-4);
    }

    #[test]
    fn test_empty_original_is_finite() {
        let geometry = CoverGeometry::default();
        for original in [None, Some("")] {
            let placement =
                geometry.cover_and_place(&change(original, "New"), StandardFont::Helvetica, None);
            assert!(placement.cover.width().is_finite());
            assert!(placement.cover.width() > 0.0);
        }
    }

    #[test]
    fn test_measured_width_preferred() {
        let geometry = CoverGeometry::default();
        let measure: Measure<'_> = &|text: &str, _font: StandardFont, size: f32| -> DocumentResult<f32> {
            Ok(text.len() as f32 * size * 0.5)
        };
        let placement =
            geometry.cover_and_place(&change(Some("Hello"), "Hi"), StandardFont::Helvetica, Some(measure));
        assert_eq!(placement.width_source, WidthSource::Measured);
        assert!((placement.cover.width() - 12.0).abs() < 1e-4);
    }

    #[test]
    fn test_failed_measurement_falls_back() {
        let geometry = CoverGeometry::default();
        let failing = |_: &str, _: StandardFont, _: f32| -> DocumentResult<f32> {
            Err(DocumentError::Unsupported("text measurement"))
        };
        let nan = |_: &str, _: StandardFont, _: f32| -> DocumentResult<f32> { Ok(f32::NAN) };

        for measure in [&failing as Measure<'_>, &nan as Measure<'_>] {
            let placement = geometry.cover_and_place(
                &change(Some("Hello"), "Hi"),
                StandardFont::Helvetica,
                Some(measure),
            );
            assert_eq!(placement.width_source, WidthSource::Proportional);
        }
    }

    #[test]
    fn test_proportional_only_ignores_measurement() {
        let geometry = CoverGeometry::proportional(GeometryTuning::default());
        let measure: Measure<'_> = &|_: &str, _: StandardFont, _: f32| -> DocumentResult<f32> { Ok(99.0) };
        let placement =
            geometry.cover_and_place(&change(Some("Hello"), "Hi"), StandardFont::Helvetica, Some(measure));
        assert_eq!(placement.width_source, WidthSource::Proportional);
    }
}
