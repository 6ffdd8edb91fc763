//! TrueType font support
//!
//! Fonts are embedded as simple TrueType fonts with WinAnsiEncoding, so
//! text is shown as single-byte codes and widths are only needed for codes
//! 32..=255.

use crate::error::{PdfToolError, Result};
use crate::object::{Dictionary, Object, ObjectId};
use crate::writer::DocumentWriter;
use std::io::Write;
use std::path::Path;
use ttf_parser::Face;

const FIRST_CHAR: u8 = 32;
const LAST_CHAR: u8 = 255;

/// WinAnsiEncoding codes 0x80..=0x9F; `None` where the code is unassigned
const WIN_ANSI_HIGH: [Option<char>; 32] = [
    Some('\u{20AC}'), None, Some('\u{201A}'), Some('\u{0192}'),
    Some('\u{201E}'), Some('\u{2026}'), Some('\u{2020}'), Some('\u{2021}'),
    Some('\u{02C6}'), Some('\u{2030}'), Some('\u{0160}'), Some('\u{2039}'),
    Some('\u{0152}'), None, Some('\u{017D}'), None,
    None, Some('\u{2018}'), Some('\u{2019}'), Some('\u{201C}'),
    Some('\u{201D}'), Some('\u{2022}'), Some('\u{2013}'), Some('\u{2014}'),
    Some('\u{02DC}'), Some('\u{2122}'), Some('\u{0161}'), Some('\u{203A}'),
    Some('\u{0153}'), None, Some('\u{017E}'), Some('\u{0178}'),
];

/// Character for a WinAnsi code
fn win_ansi_char(code: u8) -> Option<char> {
    match code {
        0x80..=0x9F => WIN_ANSI_HIGH[(code - 0x80) as usize],
        _ => Some(code as char),
    }
}

/// WinAnsi code for a character, if it has one
pub fn win_ansi_code(c: char) -> Option<u8> {
    match c as u32 {
        0x20..=0x7E | 0xA0..=0xFF => Some(c as u32 as u8),
        _ => WIN_ANSI_HIGH
            .iter()
            .position(|h| *h == Some(c))
            .map(|i| 0x80 + i as u8),
    }
}

/// Encode text as WinAnsi bytes; characters outside the encoding become '?'
pub fn encode_win_ansi(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| win_ansi_code(c).unwrap_or(b'?'))
        .collect()
}

/// Per-code metrics in glyph units
#[derive(Debug, Clone, Copy, Default)]
struct GlyphMetrics {
    advance: u16,
    y_min: i16,
    y_max: i16,
}

/// A TrueType font loaded from disk, ready to measure text and be embedded
#[derive(Debug, Clone)]
pub struct TrueTypeFont {
    data: Vec<u8>,
    base_font: String,
    units_per_em: f64,
    ascent: i16,
    descent: i16,
    cap_height: i16,
    bbox: [i16; 4],
    metrics: Vec<GlyphMetrics>,
}

impl TrueTypeFont {
    /// Load a font file
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read(path)?;
        Self::from_bytes(data)
            .map_err(|e| PdfToolError::Font(format!("{}: {}", path.display(), e)))
    }

    /// Parse font data
    pub fn from_bytes(data: Vec<u8>) -> Result<Self> {
        let face = Face::parse(&data, 0).map_err(|e| PdfToolError::Font(e.to_string()))?;

        let base_font = face
            .names()
            .into_iter()
            .find(|name| name.name_id == ttf_parser::name_id::POST_SCRIPT_NAME)
            .and_then(|name| name.to_string())
            .map(|name| name.replace(' ', ""))
            .unwrap_or_else(|| "EmbeddedFont".to_string());

        let mut metrics = Vec::with_capacity((LAST_CHAR - FIRST_CHAR) as usize + 1);
        for code in FIRST_CHAR..=LAST_CHAR {
            let glyph = win_ansi_char(code).and_then(|c| face.glyph_index(c));
            let m = match glyph {
                Some(glyph) => {
                    let bbox = face.glyph_bounding_box(glyph);
                    GlyphMetrics {
                        advance: face.glyph_hor_advance(glyph).unwrap_or(0),
                        y_min: bbox.map(|b| b.y_min).unwrap_or(0),
                        y_max: bbox.map(|b| b.y_max).unwrap_or(0),
                    }
                }
                None => GlyphMetrics::default(),
            };
            metrics.push(m);
        }

        let global = face.global_bounding_box();
        let units_per_em = face.units_per_em() as f64;
        let ascent = face.ascender();
        let descent = face.descender();
        let cap_height = face.capital_height().unwrap_or(ascent);

        Ok(Self {
            data,
            base_font,
            units_per_em,
            ascent,
            descent,
            cap_height,
            bbox: [global.x_min, global.y_min, global.x_max, global.y_max],
            metrics,
        })
    }

    pub fn base_font(&self) -> &str {
        &self.base_font
    }

    fn metrics_for(&self, code: u8) -> GlyphMetrics {
        if code < FIRST_CHAR {
            return GlyphMetrics::default();
        }
        self.metrics[(code - FIRST_CHAR) as usize]
    }

    fn to_points(&self, units: f64, size: f64) -> f64 {
        units * size / self.units_per_em
    }

    /// Advance width of `text` at `size` points
    pub fn text_width(&self, text: &str, size: f64) -> f64 {
        let units: f64 = encode_win_ansi(text)
            .into_iter()
            .map(|code| self.metrics_for(code).advance as f64)
            .sum();
        self.to_points(units, size)
    }

    /// Height of the ink of `text` at `size` points
    pub fn text_height(&self, text: &str, size: f64) -> f64 {
        let mut y_min = i16::MAX;
        let mut y_max = i16::MIN;
        for code in encode_win_ansi(text) {
            let m = self.metrics_for(code);
            if m.y_max > m.y_min {
                y_min = y_min.min(m.y_min);
                y_max = y_max.max(m.y_max);
            }
        }
        if y_max < y_min {
            return 0.0;
        }
        self.to_points((y_max as f64) - (y_min as f64), size)
    }

    /// Width and height of `text` at `size` points
    pub fn dimensions(&self, text: &str, size: f64) -> (f64, f64) {
        (self.text_width(text, size), self.text_height(text, size))
    }

    /// Bytes to show `text` with this font
    pub fn encode(&self, text: &str) -> Vec<u8> {
        encode_win_ansi(text)
    }

    fn scaled(&self, units: i16) -> Object {
        Object::Integer((units as f64 * 1000.0 / self.units_per_em).round() as i64)
    }

    /// Write the font program, descriptor and font dictionary; returns the font's ID
    pub fn embed<W: Write>(&self, writer: &mut DocumentWriter<W>) -> Result<ObjectId> {
        let mut file_dict = Dictionary::new();
        file_dict.set("Length1", Object::Integer(self.data.len() as i64));
        let file_id = writer.write_stream(None, file_dict, self.data.clone())?;

        let mut descriptor = Dictionary::new();
        descriptor.set("Type", Object::Name(b"FontDescriptor".to_vec()));
        descriptor.set("FontName", Object::Name(self.base_font.as_bytes().to_vec()));
        // Nonsymbolic
        descriptor.set("Flags", Object::Integer(32));
        descriptor.set(
            "FontBBox",
            Object::Array(self.bbox.iter().map(|v| self.scaled(*v)).collect()),
        );
        descriptor.set("ItalicAngle", Object::Integer(0));
        descriptor.set("Ascent", self.scaled(self.ascent));
        descriptor.set("Descent", self.scaled(self.descent));
        descriptor.set("CapHeight", self.scaled(self.cap_height));
        descriptor.set("StemV", Object::Integer(80));
        descriptor.set("FontFile2", Object::Reference(file_id));
        let descriptor_id = writer.write_new_object(None, &Object::Dictionary(descriptor))?;

        let widths = self
            .metrics
            .iter()
            .map(|m| Object::Integer((m.advance as f64 * 1000.0 / self.units_per_em).round() as i64))
            .collect();

        let mut font = Dictionary::new();
        font.set("Type", Object::Name(b"Font".to_vec()));
        font.set("Subtype", Object::Name(b"TrueType".to_vec()));
        font.set("BaseFont", Object::Name(self.base_font.as_bytes().to_vec()));
        font.set("FirstChar", Object::Integer(FIRST_CHAR as i64));
        font.set("LastChar", Object::Integer(LAST_CHAR as i64));
        font.set("Widths", Object::Array(widths));
        font.set("Encoding", Object::Name(b"WinAnsiEncoding".to_vec()));
        font.set("FontDescriptor", Object::Reference(descriptor_id));
        let font_id = writer.write_new_object(None, &Object::Dictionary(font))?;
        log::debug!("embedded font {} as {} {} R", self.base_font, font_id.0, font_id.1);
        Ok(font_id)
    }
}
