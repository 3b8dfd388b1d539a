//! Color classification
//!
//! Normalizes whatever color encoding arrives (packed integer, 0-255 or 0-1
//! channel list, nothing at all) to RGB in [0, 1] and answers the two
//! questions the patcher asks: is this explicitly colored, and is this the
//! hyperlink blue.

use crate::document::{RawColor, Rgb};

/// Channels at or below this magnitude count as black
pub const NON_DEFAULT_EPSILON: f32 = 0.01;

/// Stateless color normalizer and classifier
#[derive(Debug, Clone, Copy, Default)]
pub struct ColorClassifier;

impl ColorClassifier {
    /// Normalize to RGB in [0, 1]. Malformed or absent input becomes black.
    pub fn normalize(&self, color: &RawColor) -> Rgb {
        match color {
            RawColor::Packed(value) if (0..=0xFF_FFFF).contains(value) => {
                let v = *value as u32;
                Rgb::new(
                    ((v >> 16) & 0xFF) as f32 / 255.0,
                    ((v >> 8) & 0xFF) as f32 / 255.0,
                    (v & 0xFF) as f32 / 255.0,
                )
            }
            RawColor::Channels(channels) if channels.len() >= 3 => Rgb::new(
                normalize_channel(channels[0]),
                normalize_channel(channels[1]),
                normalize_channel(channels[2]),
            ),
            _ => Rgb::BLACK,
        }
    }

    /// Pure red and green with some blue: the hyperlink convention.
    ///
    /// This is a heuristic; deliberately blue prose is classified as a link.
    pub fn is_link_color(&self, color: &RawColor) -> bool {
        let rgb = self.normalize(color);
        rgb.r == 0.0 && rgb.g == 0.0 && rgb.b > 0.0
    }

    /// Anything distinguishable from default black
    pub fn is_non_default(&self, color: &RawColor) -> bool {
        self.normalize(color)
            .channels()
            .iter()
            .any(|c| c.abs() > NON_DEFAULT_EPSILON)
    }
}

/// Values above 1 are on the 0-255 scale
fn normalize_channel(value: f32) -> f32 {
    if !value.is_finite() {
        return 0.0;
    }
    let scaled = if value > 1.0 { value / 255.0 } else { value };
    scaled.clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channels(r: f32, g: f32, b: f32) -> RawColor {
        RawColor::Channels(vec![r, g, b])
    }

    fn samples() -> Vec<RawColor> {
        vec![
            RawColor::Absent,
            RawColor::Packed(0),
            RawColor::Packed(0x0000FF),
            RawColor::Packed(0xFF8000),
            RawColor::Packed(-5),
            RawColor::Packed(0x1_000_000),
            channels(0.0, 0.0, 0.5),
            channels(0.2, 0.4, 0.6),
            channels(255.0, 128.0, 0.0),
            channels(1.0, 1.0, 1.0),
            channels(300.0, -4.0, 2.0),
            channels(f32::NAN, f32::INFINITY, 0.5),
            RawColor::Channels(vec![0.5]),
            RawColor::Channels(vec![0.1, 0.2, 0.3, 0.9]),
            RawColor::Malformed(serde_json::json!("blue")),
        ]
    }

    #[test]
    fn test_normalize_stays_in_unit_range() {
        let classifier = ColorClassifier;
        for color in samples() {
            let rgb = classifier.normalize(&color);
            for c in rgb.channels() {
                assert!((0.0..=1.0).contains(&c), "{:?} -> {:?}", color, rgb);
            }
        }
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let classifier = ColorClassifier;
        for color in samples() {
            let once = classifier.normalize(&color);
            let twice = classifier.normalize(&RawColor::from(once));
            assert_eq!(once, twice, "{:?}", color);
        }
    }

    #[test]
    fn test_normalize_scales() {
        let classifier = ColorClassifier;
        assert_eq!(
            classifier.normalize(&channels(255.0, 0.0, 0.5)),
            Rgb::new(1.0, 0.0, 0.5)
        );
        assert_eq!(classifier.normalize(&RawColor::Packed(0x0000FF)), Rgb::new(0.0, 0.0, 1.0));
        assert_eq!(classifier.normalize(&RawColor::Absent), Rgb::BLACK);
        assert_eq!(classifier.normalize(&RawColor::Channels(vec![1.0])), Rgb::BLACK);
    }

    #[test]
    fn test_link_color() {
        let classifier = ColorClassifier;
        assert!(classifier.is_link_color(&channels(0.0, 0.0, 0.5)));
        assert!(classifier.is_link_color(&RawColor::Packed(0x0000EE)));
        assert!(!classifier.is_link_color(&channels(0.0, 0.0, 0.0)));
        assert!(!classifier.is_link_color(&channels(0.1, 0.0, 0.5)));
        assert!(!classifier.is_link_color(&RawColor::Absent));
    }

    #[test]
    fn test_non_default() {
        let classifier = ColorClassifier;
        assert!(!classifier.is_non_default(&channels(0.0, 0.0, 0.0)));
        assert!(!classifier.is_non_default(&channels(0.005, 0.0, 0.01)));
        assert!(classifier.is_non_default(&channels(0.02, 0.0, 0.0)));
        assert!(classifier.is_non_default(&RawColor::Packed(0xFF0000)));
        assert!(!classifier.is_non_default(&RawColor::Malformed(serde_json::json!({}))));
    }
}
