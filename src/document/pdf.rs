//! PDF document model backed by lopdf
//!
//! Extraction interprets the text operators of each page content stream and
//! estimates glyph extents from the font size, which is enough to locate
//! runs for patching but not for typesetting. Drawing never rewrites the
//! original content: mutations are collected per page and appended as one
//! overlay stream on save, with the original content wrapped in `q`/`Q` so
//! its graphics state cannot leak into the overlay.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream, StringFormat};

use super::error::{DocumentError, DocumentResult};
use super::traits::{DocumentModel, DocumentProvider, PageSurface};
use super::types::{Point, RawColor, RawLine, RawSpan, Rect, Rgb, StandardFont, StyleFlags};

/// Letter-size fallback when no MediaBox can be found
const DEFAULT_MEDIA_BOX: [f32; 4] = [0.0, 0.0, 612.0, 792.0];

/// Average glyph advance as a fraction of the font size
const AVG_GLYPH_WIDTH: f32 = 0.5;

/// Advance of every Courier glyph as a fraction of the font size
const COURIER_ADVANCE: f32 = 0.6;

/// Ascent and descent as fractions of the font size
const ASCENT: f32 = 0.8;
const DESCENT: f32 = 0.2;

/// Runs whose baselines differ by less than this share a line
const BASELINE_TOLERANCE: f32 = 1.0;

/// Prefix for font resources added by the overlay
const FONT_ALIAS_PREFIX: &str = "PalimpsestF";

/// Opens PDF files with lopdf
#[derive(Debug, Clone, Default)]
pub struct PdfProvider;

impl DocumentProvider for PdfProvider {
    fn open(&self, path: &Path) -> DocumentResult<Box<dyn DocumentModel>> {
        Ok(Box::new(PdfDocument::open(path)?))
    }
}

/// An opened PDF with pending overlay drawing
pub struct PdfDocument {
    inner: Document,
    page_ids: Vec<ObjectId>,
    overlays: HashMap<ObjectId, Vec<Operation>>,
    fonts: HashMap<StandardFont, ObjectId>,
    registered: HashSet<(ObjectId, StandardFont)>,
}

impl PdfDocument {
    pub fn open(path: &Path) -> DocumentResult<Self> {
        let inner = Document::load(path).map_err(|e| DocumentError::Open(e.to_string()))?;
        Ok(Self::from_document(inner))
    }

    pub fn from_document(inner: Document) -> Self {
        let page_ids = inner.get_pages().into_values().collect();
        Self {
            inner,
            page_ids,
            overlays: HashMap::new(),
            fonts: HashMap::new(),
            registered: HashSet::new(),
        }
    }

    /// Append one overlay stream per touched page
    fn flush_overlays(&mut self) -> DocumentResult<()> {
        let overlays: Vec<(ObjectId, Vec<Operation>)> = self.overlays.drain().collect();

        for (page_id, ops) in overlays {
            let mut closing = vec![Operation::new("Q", vec![])];
            closing.extend(ops);

            let open = Content {
                operations: vec![Operation::new("q", vec![])],
            }
            .encode()?;
            let close = Content { operations: closing }.encode()?;

            let existing = existing_contents(&self.inner, page_id)?;
            let open_id = self.inner.add_object(Stream::new(Dictionary::new(), open));
            let close_id = self.inner.add_object(Stream::new(Dictionary::new(), close));

            let mut contents = Vec::with_capacity(existing.len() + 2);
            contents.push(Object::Reference(open_id));
            contents.extend(existing);
            contents.push(Object::Reference(close_id));

            let page = self.inner.get_object_mut(page_id)?.as_dict_mut()?;
            page.set("Contents", Object::Array(contents));
        }

        Ok(())
    }

    /// Make `font` available to `page_id` and return its resource name
    fn register_font(&mut self, page_id: ObjectId, font: StandardFont) -> DocumentResult<Vec<u8>> {
        let alias = format!("{}{}", FONT_ALIAS_PREFIX, font_index(font)).into_bytes();
        if self.registered.contains(&(page_id, font)) {
            return Ok(alias);
        }

        let inner = &mut self.inner;
        let font_id = *self
            .fonts
            .entry(font)
            .or_insert_with(|| inner.add_object(standard_font_dict(font)));

        let mut resources = inherited(&self.inner, page_id, b"Resources")
            .and_then(|obj| obj.as_dict().ok())
            .cloned()
            .unwrap_or_else(Dictionary::new);
        let mut fonts = resources
            .get(b"Font")
            .ok()
            .map(|obj| resolve(&self.inner, obj))
            .and_then(|obj| obj.as_dict().ok())
            .cloned()
            .unwrap_or_else(Dictionary::new);

        fonts.set(alias.clone(), Object::Reference(font_id));
        resources.set("Font", Object::Dictionary(fonts));

        let page = self.inner.get_object_mut(page_id)?.as_dict_mut()?;
        page.set("Resources", Object::Dictionary(resources));

        self.registered.insert((page_id, font));
        Ok(alias)
    }
}

impl DocumentModel for PdfDocument {
    fn page_count(&self) -> usize {
        self.page_ids.len()
    }

    fn page(&mut self, index: usize) -> DocumentResult<Box<dyn PageSurface + '_>> {
        let page_id = *self.page_ids.get(index).ok_or(DocumentError::PageNotFound {
            index,
            count: self.page_ids.len(),
        })?;
        let media_box = media_box(&self.inner, page_id);

        Ok(Box::new(PdfPage {
            doc: self,
            page_id,
            top: media_box[3],
        }))
    }

    fn save(&mut self, path: &Path) -> DocumentResult<()> {
        self.flush_overlays()?;
        self.inner
            .save(path)
            .map_err(|e| DocumentError::Save(e.to_string()))?;
        Ok(())
    }
}

/// A page borrowed from a [`PdfDocument`]
struct PdfPage<'a> {
    doc: &'a mut PdfDocument,
    page_id: ObjectId,
    /// Upper edge of the MediaBox, used to flip y
    top: f32,
}

impl PdfPage<'_> {
    fn flip(&self, y: f32) -> f32 {
        self.top - y
    }

    fn push(&mut self, ops: Vec<Operation>) {
        self.doc
            .overlays
            .entry(self.page_id)
            .or_default()
            .extend(ops);
    }
}

impl PageSurface for PdfPage<'_> {
    fn extract_lines(&self) -> DocumentResult<Vec<RawLine>> {
        let bytes = self.doc.inner.get_page_content(self.page_id)?;
        let content = Content::decode(&bytes)?;
        let fonts = page_fonts(&self.doc.inner, self.page_id);

        let mut scanner = TextScanner::new(self.top, fonts);
        for op in &content.operations {
            scanner.apply(op);
        }
        Ok(scanner.into_lines())
    }

    fn fill_rect(&mut self, rect: Rect, color: Rgb) -> DocumentResult<()> {
        let y = self.flip(rect.y1);
        self.push(vec![
            Operation::new("q", vec![]),
            color_op("rg", color),
            color_op("RG", color),
            Operation::new(
                "re",
                vec![real(rect.x0), real(y), real(rect.width()), real(rect.height())],
            ),
            Operation::new("B", vec![]),
            Operation::new("Q", vec![]),
        ]);
        Ok(())
    }

    fn draw_line(&mut self, from: Point, to: Point, color: Rgb, width: f32) -> DocumentResult<()> {
        let (y0, y1) = (self.flip(from.y), self.flip(to.y));
        self.push(vec![
            Operation::new("q", vec![]),
            color_op("RG", color),
            Operation::new("w", vec![real(width)]),
            Operation::new("m", vec![real(from.x), real(y0)]),
            Operation::new("l", vec![real(to.x), real(y1)]),
            Operation::new("S", vec![]),
            Operation::new("Q", vec![]),
        ]);
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
        let encoded = encode_text(text, font)?;
        let alias = self.doc.register_font(self.page_id, font)?;
        let y = self.flip(at.y);

        self.push(vec![
            Operation::new("q", vec![]),
            color_op("rg", color),
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec![Object::Name(alias), real(size)]),
            Operation::new("Td", vec![real(at.x), real(y)]),
            Operation::new("Tj", vec![Object::String(encoded, StringFormat::Literal)]),
            Operation::new("ET", vec![]),
            Operation::new("Q", vec![]),
        ]);
        Ok(())
    }

    fn check_text(&self, text: &str, font: StandardFont) -> DocumentResult<()> {
        encode_text(text, font).map(|_| ())
    }

    /// Only the monospaced Courier family has metrics known without AFM tables
    fn measure_text(&self, text: &str, font: StandardFont, size: f32) -> DocumentResult<f32> {
        match font {
            StandardFont::Courier
            | StandardFont::CourierBold
            | StandardFont::CourierOblique
            | StandardFont::CourierBoldOblique => {
                Ok(text.chars().count() as f32 * COURIER_ADVANCE * size)
            }
            _ => Err(DocumentError::Unsupported("text measurement")),
        }
    }
}

// ============================================================================
// Text extraction
// ============================================================================

/// Affine matrix `[a b c d e f]`
type Matrix = [f32; 6];

const IDENTITY: Matrix = [1.0, 0.0, 0.0, 1.0, 0.0, 0.0];

/// Pre-multiply `m` by a translation
fn translate(m: &Matrix, tx: f32, ty: f32) -> Matrix {
    [
        m[0],
        m[1],
        m[2],
        m[3],
        tx * m[0] + ty * m[2] + m[4],
        tx * m[1] + ty * m[3] + m[5],
    ]
}

/// Walks text operators and records shown strings
struct TextScanner {
    top: f32,
    fonts: HashMap<Vec<u8>, FontInfo>,
    tm: Matrix,
    tlm: Matrix,
    font: String,
    flags: StyleFlags,
    size: f32,
    leading: f32,
    fill: RawColor,
    fill_stack: Vec<RawColor>,
    runs: Vec<(f32, RawSpan)>,
}

impl TextScanner {
    fn new(top: f32, fonts: HashMap<Vec<u8>, FontInfo>) -> Self {
        Self {
            top,
            fonts,
            tm: IDENTITY,
            tlm: IDENTITY,
            font: String::new(),
            flags: StyleFlags::default(),
            size: 0.0,
            leading: 0.0,
            fill: RawColor::Absent,
            fill_stack: Vec::new(),
            runs: Vec::new(),
        }
    }

    fn apply(&mut self, op: &Operation) {
        let args = &op.operands;
        match op.operator.as_str() {
            "q" => self.fill_stack.push(self.fill.clone()),
            "Q" => {
                if let Some(fill) = self.fill_stack.pop() {
                    self.fill = fill;
                }
            }
            "BT" | "ET" => {
                self.tm = IDENTITY;
                self.tlm = IDENTITY;
            }
            "Tf" => {
                if let Some(name) = args.first().and_then(|o| o.as_name().ok()) {
                    match self.fonts.get(name) {
                        Some(info) => {
                            self.font = info.base_font.clone();
                            self.flags = info.flags;
                        }
                        None => {
                            self.font = String::from_utf8_lossy(name).into_owned();
                            self.flags = StyleFlags::default();
                        }
                    }
                }
                if let Some(size) = args.get(1).and_then(number) {
                    self.size = size;
                }
            }
            "TL" => {
                if let Some(leading) = args.first().and_then(number) {
                    self.leading = leading;
                }
            }
            "Td" | "TD" => {
                if let (Some(tx), Some(ty)) = (args.first().and_then(number), args.get(1).and_then(number)) {
                    if op.operator == "TD" {
                        self.leading = -ty;
                    }
                    self.move_line(tx, ty);
                }
            }
            "Tm" => {
                let values: Vec<f32> = args.iter().filter_map(number).collect();
                if values.len() == 6 {
                    self.tlm = [values[0], values[1], values[2], values[3], values[4], values[5]];
                    self.tm = self.tlm;
                }
            }
            "T*" => self.move_line(0.0, -self.leading),
            "Tj" => {
                if let Some(Object::String(bytes, _)) = args.first() {
                    self.show(bytes);
                }
            }
            "'" => {
                self.move_line(0.0, -self.leading);
                if let Some(Object::String(bytes, _)) = args.first() {
                    self.show(bytes);
                }
            }
            "\"" => {
                self.move_line(0.0, -self.leading);
                if let Some(Object::String(bytes, _)) = args.get(2) {
                    self.show(bytes);
                }
            }
            "TJ" => {
                if let Some(Object::Array(items)) = args.first() {
                    for item in items {
                        match item {
                            Object::String(bytes, _) => self.show(bytes),
                            other => {
                                if let Some(adjust) = number(other) {
                                    self.advance(-adjust / 1000.0 * self.size);
                                }
                            }
                        }
                    }
                }
            }
            "g" => {
                if let Some(gray) = args.first().and_then(number) {
                    self.fill = RawColor::Channels(vec![gray, gray, gray]);
                }
            }
            "rg" => {
                let channels: Vec<f32> = args.iter().filter_map(number).collect();
                if channels.len() == 3 {
                    self.fill = RawColor::Channels(channels);
                }
            }
            "k" => {
                let cmyk: Vec<f32> = args.iter().filter_map(number).collect();
                if cmyk.len() == 4 {
                    let k = 1.0 - cmyk[3];
                    self.fill = RawColor::Channels(vec![
                        (1.0 - cmyk[0]) * k,
                        (1.0 - cmyk[1]) * k,
                        (1.0 - cmyk[2]) * k,
                    ]);
                }
            }
            _ => {}
        }
    }

    fn move_line(&mut self, tx: f32, ty: f32) {
        self.tlm = translate(&self.tlm, tx, ty);
        self.tm = self.tlm;
    }

    fn advance(&mut self, tx: f32) {
        self.tm = translate(&self.tm, tx, 0.0);
    }

    fn show(&mut self, bytes: &[u8]) {
        let text = decode_pdf_string(bytes);
        let glyphs = text.chars().count();
        if glyphs == 0 {
            return;
        }

        let scale_x = (self.tm[0] * self.tm[0] + self.tm[1] * self.tm[1]).sqrt();
        let scale_y = (self.tm[2] * self.tm[2] + self.tm[3] * self.tm[3]).sqrt();
        let size = if scale_y > 0.0 { self.size * scale_y } else { self.size };
        let advance = glyphs as f32 * self.size * AVG_GLYPH_WIDTH;

        let x = self.tm[4];
        let baseline = self.top - self.tm[5];
        let bbox = Rect::new(
            x,
            baseline - size * ASCENT,
            x + advance * scale_x,
            baseline + size * DESCENT,
        );

        self.runs.push((
            baseline,
            RawSpan {
                text,
                bbox,
                font: self.font.clone(),
                size,
                flags: self.flags,
                color: self.fill.clone(),
            },
        ));
        self.advance(advance);
    }

    /// Group consecutive runs by baseline
    fn into_lines(self) -> Vec<RawLine> {
        let mut lines: Vec<RawLine> = Vec::new();
        let mut current_baseline: Option<f32> = None;

        for (baseline, span) in self.runs {
            match (current_baseline, lines.last_mut()) {
                (Some(b), Some(line)) if (b - baseline).abs() < BASELINE_TOLERANCE => {
                    line.spans.push(span);
                }
                _ => {
                    lines.push(RawLine { spans: vec![span] });
                    current_baseline = Some(baseline);
                }
            }
        }

        lines
    }
}

// ============================================================================
// Object helpers
// ============================================================================

fn number(obj: &Object) -> Option<f32> {
    match obj {
        Object::Integer(i) => Some(*i as f32),
        Object::Real(f) => Some(*f as f32),
        _ => None,
    }
}

fn real(value: f32) -> Object {
    Object::Real(value.into())
}

fn color_op(operator: &str, color: Rgb) -> Operation {
    Operation::new(operator, vec![real(color.r), real(color.g), real(color.b)])
}

fn resolve<'a>(doc: &'a Document, obj: &'a Object) -> &'a Object {
    match obj {
        Object::Reference(id) => doc.get_object(*id).unwrap_or(obj),
        _ => obj,
    }
}

/// Look up a page attribute, following the `Parent` chain
fn inherited<'a>(doc: &'a Document, page_id: ObjectId, key: &[u8]) -> Option<&'a Object> {
    let mut current = doc.get_dictionary(page_id).ok()?;
    for _ in 0..32 {
        if let Ok(value) = current.get(key) {
            return Some(resolve(doc, value));
        }
        let parent = current.get(b"Parent").ok()?.as_reference().ok()?;
        current = doc.get_dictionary(parent).ok()?;
    }
    None
}

fn media_box(doc: &Document, page_id: ObjectId) -> [f32; 4] {
    inherited(doc, page_id, b"MediaBox")
        .and_then(|obj| obj.as_array().ok())
        .map(|items| items.iter().map(|o| number(resolve(doc, o))).collect::<Vec<_>>())
        .and_then(|values| match values.as_slice() {
            [Some(x0), Some(y0), Some(x1), Some(y1)] => Some([*x0, *y0, *x1, *y1]),
            _ => None,
        })
        .unwrap_or(DEFAULT_MEDIA_BOX)
}

/// A page font resource
struct FontInfo {
    /// Base font name with any subset tag stripped
    base_font: String,
    flags: StyleFlags,
}

/// FontDescriptor flag bits (bit 7 Italic, bit 19 ForceBold)
const DESCRIPTOR_ITALIC: i64 = 1 << 6;
const DESCRIPTOR_FORCE_BOLD: i64 = 1 << 18;

/// Map font resource names to their base font and style
fn page_fonts(doc: &Document, page_id: ObjectId) -> HashMap<Vec<u8>, FontInfo> {
    let Some(fonts) = inherited(doc, page_id, b"Resources")
        .and_then(|obj| obj.as_dict().ok())
        .and_then(|res| res.get(b"Font").ok())
        .map(|obj| resolve(doc, obj))
        .and_then(|obj| obj.as_dict().ok())
    else {
        return HashMap::new();
    };

    fonts
        .iter()
        .filter_map(|(name, obj)| {
            let font = resolve(doc, obj).as_dict().ok()?;
            let base = font.get(b"BaseFont").ok()?.as_name().ok()?;
            let base = String::from_utf8_lossy(base);
            let base_font = base.split_once('+').map_or(&*base, |(_, rest)| rest).to_string();
            Some((
                name.clone(),
                FontInfo {
                    base_font,
                    flags: descriptor_flags(doc, font),
                },
            ))
        })
        .collect()
}

/// Style bits from a font's descriptor, if it has one
fn descriptor_flags(doc: &Document, font: &Dictionary) -> StyleFlags {
    let bits = font
        .get(b"FontDescriptor")
        .ok()
        .map(|obj| resolve(doc, obj))
        .and_then(|obj| obj.as_dict().ok())
        .and_then(|descriptor| descriptor.get(b"Flags").ok())
        .and_then(|flags| flags.as_i64().ok())
        .unwrap_or(0);

    let mut flags = 0;
    if bits & DESCRIPTOR_ITALIC != 0 {
        flags |= StyleFlags::ITALIC;
    }
    if bits & DESCRIPTOR_FORCE_BOLD != 0 {
        flags |= StyleFlags::BOLD;
    }
    StyleFlags(flags)
}

/// Current page content as a list of references or inline streams
fn existing_contents(doc: &Document, page_id: ObjectId) -> DocumentResult<Vec<Object>> {
    let page = doc.get_dictionary(page_id)?;
    Ok(match page.get(b"Contents") {
        Ok(Object::Reference(id)) => match doc.get_object(*id) {
            Ok(Object::Array(items)) => items.clone(),
            _ => vec![Object::Reference(*id)],
        },
        Ok(Object::Array(items)) => items.clone(),
        _ => Vec::new(),
    })
}

fn standard_font_dict(font: StandardFont) -> Dictionary {
    let mut dict = dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => Object::Name(font.base_font_name().as_bytes().to_vec()),
    };
    if !font.is_symbolic() {
        dict.set("Encoding", Object::Name(b"WinAnsiEncoding".to_vec()));
    }
    dict
}

fn font_index(font: StandardFont) -> usize {
    StandardFont::ALL
        .iter()
        .position(|f| *f == font)
        .unwrap_or_default()
}

/// WinAnsiEncoding codes 0x80-0x9F that differ from Latin-1
const WIN_ANSI_HIGH: [(u8, char); 27] = [
    (0x80, '\u{20AC}'),
    (0x82, '\u{201A}'),
    (0x83, '\u{0192}'),
    (0x84, '\u{201E}'),
    (0x85, '\u{2026}'),
    (0x86, '\u{2020}'),
    (0x87, '\u{2021}'),
    (0x88, '\u{02C6}'),
    (0x89, '\u{2030}'),
    (0x8A, '\u{0160}'),
    (0x8B, '\u{2039}'),
    (0x8C, '\u{0152}'),
    (0x8E, '\u{017D}'),
    (0x91, '\u{2018}'),
    (0x92, '\u{2019}'),
    (0x93, '\u{201C}'),
    (0x94, '\u{201D}'),
    (0x95, '\u{2022}'),
    (0x96, '\u{2013}'),
    (0x97, '\u{2014}'),
    (0x98, '\u{02DC}'),
    (0x99, '\u{2122}'),
    (0x9A, '\u{0161}'),
    (0x9B, '\u{203A}'),
    (0x9C, '\u{0153}'),
    (0x9E, '\u{017E}'),
    (0x9F, '\u{0178}'),
];

fn win_ansi_byte(ch: char) -> Option<u8> {
    match ch {
        ' '..='~' | '\u{A0}'..='\u{FF}' => u8::try_from(u32::from(ch)).ok(),
        _ => WIN_ANSI_HIGH
            .iter()
            .find(|(_, c)| *c == ch)
            .map(|(code, _)| *code),
    }
}

fn win_ansi_char(byte: u8) -> char {
    WIN_ANSI_HIGH
        .iter()
        .find(|(code, _)| *code == byte)
        .map_or(byte as char, |(_, ch)| *ch)
}

/// Decode a PDF string: UTF-16BE with BOM, otherwise WinAnsi bytes
fn decode_pdf_string(bytes: &[u8]) -> String {
    if let Some(rest) = bytes.strip_prefix(&[0xFE, 0xFF]) {
        let units = rest
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]));
        return char::decode_utf16(units)
            .map(|c| c.unwrap_or(char::REPLACEMENT_CHARACTER))
            .collect();
    }
    bytes.iter().map(|&b| win_ansi_char(b)).collect()
}

/// Encode for a standard font. Text fonts use WinAnsiEncoding; the
/// symbolic fonts keep their built-in one-byte encoding.
fn encode_text(text: &str, font: StandardFont) -> DocumentResult<Vec<u8>> {
    text.chars()
        .map(|ch| {
            let code = if font.is_symbolic() {
                u8::try_from(u32::from(ch)).ok()
            } else {
                win_ansi_byte(ch)
            };
            code.ok_or_else(|| DocumentError::UnsupportedGlyph {
                ch,
                font: font.to_string(),
            })
        })
        .collect()
}
