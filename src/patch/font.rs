//! Font resolution
//!
//! Source documents name fonts freely ("ABCDEF+TimesNewRomanPS-BoldMT",
//! "Arial,Italic", ...). Replacement text is always drawn with one of the
//! twelve Helvetica, Times or Courier variants, chosen by family and style.
//! Symbolic source fonts resolve to Helvetica like any other unknown family.

use crate::document::{StandardFont, StyleFlags};

/// Maps a source font to a standard font. Total: never fails.
pub trait FontResolver: Send + Sync {
    fn resolve(&self, font_name: &str, flags: StyleFlags) -> StandardFont;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Family {
    Helvetica,
    Times,
    Courier,
}

/// Substring-based resolver.
///
/// Style comes from the name ("Bold", "Italic", "Oblique") or from the style
/// flags; either signal is enough.
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardFontResolver;

impl FontResolver for StandardFontResolver {
    fn resolve(&self, font_name: &str, flags: StyleFlags) -> StandardFont {
        let family = if font_name.contains("Times") {
            Family::Times
        } else if font_name.contains("Courier") {
            Family::Courier
        } else {
            Family::Helvetica
        };

        let bold = font_name.contains("Bold") || flags.is_bold();
        let italic =
            font_name.contains("Italic") || font_name.contains("Oblique") || flags.is_italic();

        match (family, bold, italic) {
            (Family::Helvetica, false, false) => StandardFont::Helvetica,
            (Family::Helvetica, true, false) => StandardFont::HelveticaBold,
            (Family::Helvetica, false, true) => StandardFont::HelveticaOblique,
            (Family::Helvetica, true, true) => StandardFont::HelveticaBoldOblique,
            (Family::Times, false, false) => StandardFont::TimesRoman,
            (Family::Times, true, false) => StandardFont::TimesBold,
            (Family::Times, false, true) => StandardFont::TimesItalic,
            (Family::Times, true, true) => StandardFont::TimesBoldItalic,
            (Family::Courier, false, false) => StandardFont::Courier,
            (Family::Courier, true, false) => StandardFont::CourierBold,
            (Family::Courier, false, true) => StandardFont::CourierOblique,
            (Family::Courier, true, true) => StandardFont::CourierBoldOblique,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NONE: StyleFlags = StyleFlags(0);
    const ITALIC: StyleFlags = StyleFlags(StyleFlags::ITALIC);
    const BOLD: StyleFlags = StyleFlags(StyleFlags::BOLD);
    const BOTH: StyleFlags = StyleFlags(StyleFlags::BOLD | StyleFlags::ITALIC);

    #[test]
    fn test_resolution_table_from_names() {
        let resolver = StandardFontResolver;
        let cases = [
            ("Times-Roman", StandardFont::TimesRoman),
            ("Times-Bold", StandardFont::TimesBold),
            ("Times-Italic", StandardFont::TimesItalic),
            ("Times-BoldItalic", StandardFont::TimesBoldItalic),
            ("Courier", StandardFont::Courier),
            ("Courier-Bold", StandardFont::CourierBold),
            ("Courier-Oblique", StandardFont::CourierOblique),
            ("Courier-BoldOblique", StandardFont::CourierBoldOblique),
            ("Helvetica", StandardFont::Helvetica),
            ("Helvetica-Bold", StandardFont::HelveticaBold),
            ("Helvetica-Oblique", StandardFont::HelveticaOblique),
            ("Helvetica-BoldOblique", StandardFont::HelveticaBoldOblique),
        ];
        for (name, expected) in cases {
            assert_eq!(resolver.resolve(name, NONE), expected, "{}", name);
        }
    }

    #[test]
    fn test_resolution_table_from_flags() {
        let resolver = StandardFontResolver;
        let cases = [
            ("TimesNewRoman", NONE, StandardFont::TimesRoman),
            ("TimesNewRoman", BOLD, StandardFont::TimesBold),
            ("TimesNewRoman", ITALIC, StandardFont::TimesItalic),
            ("TimesNewRoman", BOTH, StandardFont::TimesBoldItalic),
            ("CourierNew", BOLD, StandardFont::CourierBold),
            ("CourierNew", ITALIC, StandardFont::CourierOblique),
            ("CourierNew", BOTH, StandardFont::CourierBoldOblique),
            ("Arial", BOLD, StandardFont::HelveticaBold),
            ("Arial", ITALIC, StandardFont::HelveticaOblique),
            ("Arial", BOTH, StandardFont::HelveticaBoldOblique),
        ];
        for (name, flags, expected) in cases {
            assert_eq!(resolver.resolve(name, flags), expected, "{} {:?}", name, flags);
        }
    }

    #[test]
    fn test_name_and_flags_combine() {
        let resolver = StandardFontResolver;
        // Bold from the name, italic from the flags
        assert_eq!(resolver.resolve("Times-Bold", ITALIC), StandardFont::TimesBoldItalic);
        // Italic from the name, bold from the flags
        assert_eq!(
            resolver.resolve("Helvetica-Oblique", BOLD),
            StandardFont::HelveticaBoldOblique
        );
        // Flags never remove a style the name asserts
        assert_eq!(resolver.resolve("Courier-BoldOblique", NONE), StandardFont::CourierBoldOblique);
    }

    #[test]
    fn test_bold_italic_names_pick_bold_italic_member() {
        let resolver = StandardFontResolver;
        assert_eq!(
            resolver.resolve("ABCDEF+TimesNewRomanPS-BoldItalicMT", NONE),
            StandardFont::TimesBoldItalic
        );
        assert_eq!(resolver.resolve("Arial-BoldItalicMT", NONE), StandardFont::HelveticaBoldOblique);
        assert_eq!(resolver.resolve("Courier-BoldItalic", NONE), StandardFont::CourierBoldOblique);
    }

    #[test]
    fn test_unmatched_family_defaults_to_helvetica() {
        let resolver = StandardFontResolver;
        assert_eq!(resolver.resolve("", NONE), StandardFont::Helvetica);
        assert_eq!(resolver.resolve("Garamond", NONE), StandardFont::Helvetica);
    }

    #[test]
    fn test_symbolic_names_draw_as_helvetica() {
        let resolver = StandardFontResolver;
        assert_eq!(resolver.resolve("SymbolMT", NONE), StandardFont::Helvetica);
        assert_eq!(resolver.resolve("ZapfDingbats", BOLD), StandardFont::HelveticaBold);
    }
}
