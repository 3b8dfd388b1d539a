//! Core document types
//!
//! Geometry, color and font primitives shared by the document providers
//! and the patch engine. Coordinates are page points with the origin at the
//! top-left corner and y growing downwards.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Axis-aligned rectangle in page points
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f32; 4]", into = "[f32; 4]")]
pub struct Rect {
    pub x0: f32,
    pub y0: f32,
    pub x1: f32,
    pub y1: f32,
}

impl Rect {
    pub fn new(x0: f32, y0: f32, x1: f32, y1: f32) -> Self {
        Self { x0, y0, x1, y1 }
    }

    pub fn width(&self) -> f32 {
        self.x1 - self.x0
    }

    pub fn height(&self) -> f32 {
        self.y1 - self.y0
    }

    /// Vertical midpoint
    pub fn mid_y(&self) -> f32 {
        (self.y0 + self.y1) / 2.0
    }

    /// Smallest rectangle containing both
    pub fn union(&self, other: &Rect) -> Rect {
        Rect {
            x0: self.x0.min(other.x0),
            y0: self.y0.min(other.y0),
            x1: self.x1.max(other.x1),
            y1: self.y1.max(other.y1),
        }
    }
}

impl From<[f32; 4]> for Rect {
    fn from(v: [f32; 4]) -> Self {
        Rect::new(v[0], v[1], v[2], v[3])
    }
}

impl From<Rect> for [f32; 4] {
    fn from(r: Rect) -> Self {
        [r.x0, r.y0, r.x1, r.y1]
    }
}

/// Point in page points
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// Normalized RGB color, every channel in [0, 1]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f32; 3]", into = "[f32; 3]")]
pub struct Rgb {
    pub r: f32,
    pub g: f32,
    pub b: f32,
}

impl Rgb {
    pub const BLACK: Rgb = Rgb { r: 0.0, g: 0.0, b: 0.0 };
    pub const WHITE: Rgb = Rgb { r: 1.0, g: 1.0, b: 1.0 };
    /// Browser default hyperlink blue
    pub const LINK_BLUE: Rgb = Rgb { r: 0.0, g: 0.0, b: 0.93 };

    pub fn new(r: f32, g: f32, b: f32) -> Self {
        Self { r, g, b }
    }

    pub fn channels(&self) -> [f32; 3] {
        [self.r, self.g, self.b]
    }
}

impl From<[f32; 3]> for Rgb {
    fn from(v: [f32; 3]) -> Self {
        Rgb::new(v[0], v[1], v[2])
    }
}

impl From<Rgb> for [f32; 3] {
    fn from(c: Rgb) -> Self {
        c.channels()
    }
}

/// Color as it arrives from extraction or from a client request
///
/// Packed integers are `0xRRGGBB`. Channel lists may be on the 0-1 or the
/// 0-255 scale. Anything else is kept as `Malformed` and later treated as
/// black.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawColor {
    #[default]
    Absent,
    Packed(i64),
    Channels(Vec<f32>),
    Malformed(serde_json::Value),
}

impl From<Rgb> for RawColor {
    fn from(c: Rgb) -> Self {
        RawColor::Channels(c.channels().to_vec())
    }
}

/// Style bits attached to a text run: bit 0 italic, bit 1 bold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StyleFlags(pub u32);

impl StyleFlags {
    pub const ITALIC: u32 = 1 << 0;
    pub const BOLD: u32 = 1 << 1;

    pub fn is_italic(&self) -> bool {
        self.0 & Self::ITALIC != 0
    }

    pub fn is_bold(&self) -> bool {
        self.0 & Self::BOLD != 0
    }
}

/// The fourteen standard PDF fonts every renderer ships without embedding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "&'static str", try_from = "String")]
pub enum StandardFont {
    Helvetica,
    HelveticaBold,
    HelveticaOblique,
    HelveticaBoldOblique,
    TimesRoman,
    TimesBold,
    TimesItalic,
    TimesBoldItalic,
    Courier,
    CourierBold,
    CourierOblique,
    CourierBoldOblique,
    Symbol,
    ZapfDingbats,
}

impl StandardFont {
    pub const ALL: [StandardFont; 14] = [
        Self::Helvetica,
        Self::HelveticaBold,
        Self::HelveticaOblique,
        Self::HelveticaBoldOblique,
        Self::TimesRoman,
        Self::TimesBold,
        Self::TimesItalic,
        Self::TimesBoldItalic,
        Self::Courier,
        Self::CourierBold,
        Self::CourierOblique,
        Self::CourierBoldOblique,
        Self::Symbol,
        Self::ZapfDingbats,
    ];

    /// PostScript base font name
    pub fn base_font_name(&self) -> &'static str {
        match self {
            Self::Helvetica => "Helvetica",
            Self::HelveticaBold => "Helvetica-Bold",
            Self::HelveticaOblique => "Helvetica-Oblique",
            Self::HelveticaBoldOblique => "Helvetica-BoldOblique",
            Self::TimesRoman => "Times-Roman",
            Self::TimesBold => "Times-Bold",
            Self::TimesItalic => "Times-Italic",
            Self::TimesBoldItalic => "Times-BoldItalic",
            Self::Courier => "Courier",
            Self::CourierBold => "Courier-Bold",
            Self::CourierOblique => "Courier-Oblique",
            Self::CourierBoldOblique => "Courier-BoldOblique",
            Self::Symbol => "Symbol",
            Self::ZapfDingbats => "ZapfDingbats",
        }
    }

    /// Whether the font uses its own built-in glyph set
    pub fn is_symbolic(&self) -> bool {
        matches!(self, Self::Symbol | Self::ZapfDingbats)
    }
}

impl fmt::Display for StandardFont {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.base_font_name())
    }
}

impl From<StandardFont> for &'static str {
    fn from(font: StandardFont) -> Self {
        font.base_font_name()
    }
}

impl FromStr for StandardFont {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|font| font.base_font_name().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("Unknown standard font: {}", s))
    }
}

impl TryFrom<String> for StandardFont {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// One styled run as reported by a document provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawSpan {
    pub text: String,
    pub bbox: Rect,
    pub font: String,
    pub size: f32,
    #[serde(default)]
    pub flags: StyleFlags,
    #[serde(default)]
    pub color: RawColor,
}

/// Runs sharing one visual line, in reading order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawLine {
    pub spans: Vec<RawSpan>,
}
