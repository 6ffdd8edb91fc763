//! PDF object model helpers
//!
//! The value types themselves are lopdf's (`Object`, `Dictionary`, `Stream`).
//! This module adds dereference-on-read accessors that fail loudly, the
//! text codec used for form field strings, and stream (de)compression.

use crate::error::{PdfToolError, Result};
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use std::io::{Read, Write};

pub use lopdf::{Dictionary, Object, ObjectId, Stream, StringFormat};

/// Maximum number of references followed when resolving a value
const MAX_REFERENCE_DEPTH: usize = 32;

/// Anything that can look up an indirect object by ID
pub trait Resolver {
    /// Fetch the object stored under `id`, if any
    fn lookup(&self, id: ObjectId) -> Option<&Object>;

    /// Follow references until a direct value is reached
    fn resolve<'a>(&'a self, obj: &'a Object) -> Result<&'a Object> {
        let mut current = obj;
        for _ in 0..MAX_REFERENCE_DEPTH {
            match current {
                Object::Reference(id) => {
                    current = self.lookup(*id).ok_or(PdfToolError::MissingObject(*id))?;
                }
                _ => return Ok(current),
            }
        }
        Err(PdfToolError::DocumentCorrupt("reference chain too deep".to_string()))
    }

    /// Resolve `dict[key]`; a missing key is an error
    fn query<'a>(&'a self, dict: &'a Dictionary, key: &[u8]) -> Result<&'a Object> {
        let value = dict.get(key).map_err(|_| missing_key(key))?;
        self.resolve(value)
    }

    /// Resolve `dict[key]`, treating a missing key or dangling reference as absent
    fn query_opt<'a>(&'a self, dict: &'a Dictionary, key: &[u8]) -> Option<&'a Object> {
        dict.get(key).ok().and_then(|v| self.resolve(v).ok())
    }
}

impl Resolver for lopdf::Document {
    fn lookup(&self, id: ObjectId) -> Option<&Object> {
        self.objects.get(&id)
    }
}

fn missing_key(key: &[u8]) -> PdfToolError {
    PdfToolError::MissingKey(String::from_utf8_lossy(key).to_string())
}

fn mismatch(key: &[u8], expected: &'static str, found: &Object) -> PdfToolError {
    PdfToolError::TypeMismatch {
        key: String::from_utf8_lossy(key).to_string(),
        expected,
        found: type_name(found),
    }
}

/// Human readable name of an object's variant
pub fn type_name(obj: &Object) -> &'static str {
    match obj {
        Object::Null => "null",
        Object::Boolean(_) => "boolean",
        Object::Integer(_) | Object::Real(_) => "number",
        Object::Name(_) => "name",
        Object::String(_, StringFormat::Literal) => "literal string",
        Object::String(_, StringFormat::Hexadecimal) => "hex string",
        Object::Array(_) => "array",
        Object::Dictionary(_) => "dictionary",
        Object::Stream(_) => "stream",
        Object::Reference(_) => "reference",
    }
}

/// Presence check only; the value is not resolved
pub fn exists(dict: &Dictionary, key: &[u8]) -> bool {
    dict.has(key)
}

/// Resolve `dict[key]` as a dictionary (a stream's dictionary also qualifies)
pub fn get_dict<'a, R: Resolver + ?Sized>(
    r: &'a R,
    dict: &'a Dictionary,
    key: &[u8],
) -> Result<&'a Dictionary> {
    match r.query(dict, key)? {
        Object::Dictionary(d) => Ok(d),
        Object::Stream(s) => Ok(&s.dict),
        other => Err(mismatch(key, "dictionary", other)),
    }
}

/// Resolve `dict[key]` as an array
pub fn get_array<'a, R: Resolver + ?Sized>(
    r: &'a R,
    dict: &'a Dictionary,
    key: &[u8],
) -> Result<&'a Vec<Object>> {
    match r.query(dict, key)? {
        Object::Array(a) => Ok(a),
        other => Err(mismatch(key, "array", other)),
    }
}

/// Resolve `dict[key]` as a name
pub fn get_name<'a, R: Resolver + ?Sized>(
    r: &'a R,
    dict: &'a Dictionary,
    key: &[u8],
) -> Result<&'a [u8]> {
    match r.query(dict, key)? {
        Object::Name(n) => Ok(n),
        other => Err(mismatch(key, "name", other)),
    }
}

/// Resolve `dict[key]` as a number (integer or real)
pub fn get_number<R: Resolver + ?Sized>(r: &R, dict: &Dictionary, key: &[u8]) -> Result<f64> {
    let value = r.query(dict, key)?;
    as_number(value).ok_or_else(|| mismatch(key, "number", value))
}

/// Resolve `dict[key]` as an integer
pub fn get_integer<R: Resolver + ?Sized>(r: &R, dict: &Dictionary, key: &[u8]) -> Result<i64> {
    match r.query(dict, key)? {
        Object::Integer(i) => Ok(*i),
        other => Err(mismatch(key, "integer", other)),
    }
}

/// Resolve `dict[key]` as a four-number rectangle
pub fn get_rectangle<R: Resolver + ?Sized>(
    r: &R,
    dict: &Dictionary,
    key: &[u8],
) -> Result<[f64; 4]> {
    match r.query(dict, key)? {
        Object::Array(items) if items.len() == 4 => {
            let mut rect = [0.0; 4];
            for (slot, item) in rect.iter_mut().zip(items) {
                let item = r.resolve(item)?;
                *slot = as_number(item).ok_or_else(|| mismatch(key, "number", item))?;
            }
            Ok(rect)
        }
        other => Err(mismatch(key, "rectangle", other)),
    }
}

/// Numeric value of an integer or real object
pub fn as_number(obj: &Object) -> Option<f64> {
    match obj {
        Object::Integer(i) => Some(*i as f64),
        Object::Real(f) => Some(*f as f64),
        _ => None,
    }
}

/// Build a rectangle array object
pub fn rectangle(rect: [f64; 4]) -> Object {
    Object::Array(rect.iter().map(|v| number(*v)).collect())
}

/// Integral values become integers, everything else a real
pub fn number(value: f64) -> Object {
    if value.fract() == 0.0 && value.abs() < i64::MAX as f64 {
        Object::Integer(value as i64)
    } else {
        Object::Real(value as f32)
    }
}

/// Format a number for PDF output: no exponent, trailing zeros trimmed
pub fn format_number(value: f64) -> String {
    if !value.is_finite() {
        return "0".to_string();
    }
    if value.fract() == 0.0 && value.abs() < 1e15 {
        return format!("{}", value as i64);
    }
    let formatted = format!("{:.4}", value);
    let trimmed = formatted.trim_end_matches('0').trim_end_matches('.');
    match trimmed {
        "-0" | "" => "0".to_string(),
        t => t.to_string(),
    }
}

/// Text value of an object.
///
/// Strings are decoded according to their byte-order mark. Other scalars
/// fall back to their natural textual form instead of failing.
pub fn to_text(obj: &Object) -> String {
    match obj {
        Object::String(bytes, StringFormat::Literal) => decode_text(bytes),
        Object::String(bytes, StringFormat::Hexadecimal) => decode_text(bytes),
        Object::Name(name) => String::from_utf8_lossy(name).to_string(),
        Object::Integer(i) => i.to_string(),
        Object::Real(f) => format_number(*f as f64),
        Object::Boolean(b) => b.to_string(),
        _ => String::new(),
    }
}

/// PDFDocEncoding code points 0x80..=0xA0 that differ from Latin-1
const PDF_DOC_HIGH: [char; 33] = [
    '\u{2022}', '\u{2020}', '\u{2021}', '\u{2026}', '\u{2014}', '\u{2013}', '\u{0192}', '\u{2044}',
    '\u{2039}', '\u{203A}', '\u{2212}', '\u{2030}', '\u{201E}', '\u{201C}', '\u{201D}', '\u{2018}',
    '\u{2019}', '\u{201A}', '\u{2122}', '\u{FB01}', '\u{FB02}', '\u{0141}', '\u{0152}', '\u{0160}',
    '\u{0178}', '\u{017D}', '\u{0131}', '\u{0142}', '\u{0153}', '\u{0161}', '\u{017E}', '\u{FFFD}',
    '\u{20AC}',
];

/// Decode a PDF text string (UTF-16BE or UTF-8 with BOM, else PDFDocEncoding)
pub fn decode_text(bytes: &[u8]) -> String {
    if let Some(rest) = bytes.strip_prefix(&[0xFE, 0xFF]) {
        let units: Vec<u16> = rest
            .chunks(2)
            .map(|pair| match pair {
                [hi, lo] => u16::from_be_bytes([*hi, *lo]),
                [hi] => u16::from_be_bytes([*hi, 0]),
                _ => 0,
            })
            .collect();
        return String::from_utf16_lossy(&units);
    }
    if let Some(rest) = bytes.strip_prefix(&[0xEF, 0xBB, 0xBF]) {
        return String::from_utf8_lossy(rest).to_string();
    }
    bytes
        .iter()
        .map(|&b| match b {
            0x80..=0xA0 => PDF_DOC_HIGH[(b - 0x80) as usize],
            _ => b as char,
        })
        .collect()
}

fn pdf_doc_byte(c: char) -> Option<u8> {
    match c as u32 {
        0x09 | 0x0A | 0x0D | 0x20..=0x7E => Some(c as u8),
        0xA1..=0xFF if c != '\u{AD}' => Some(c as u32 as u8),
        _ => PDF_DOC_HIGH
            .iter()
            .position(|&h| h == c && h != '\u{FFFD}')
            .map(|i| 0x80 + i as u8),
    }
}

/// Encode text as PDFDocEncoding when possible, else UTF-16BE with a BOM
pub fn encode_text(text: &str) -> Vec<u8> {
    let doc_bytes: Option<Vec<u8>> = text.chars().map(pdf_doc_byte).collect();
    match doc_bytes {
        Some(bytes) => bytes,
        None => {
            let mut out = vec![0xFE, 0xFF];
            for unit in text.encode_utf16() {
                out.extend_from_slice(&unit.to_be_bytes());
            }
            out
        }
    }
}

/// Literal string object holding encoded text
pub fn text_string(text: &str) -> Object {
    Object::String(encode_text(text), StringFormat::Literal)
}

/// Copy a dictionary, skipping the listed keys; key order is preserved
pub fn copy_dictionary_excluding(dict: &Dictionary, excluded: &[&[u8]]) -> Dictionary {
    let mut copy = Dictionary::new();
    for (key, value) in dict.iter() {
        if !excluded.contains(&key.as_slice()) {
            copy.set(key.clone(), value.clone());
        }
    }
    copy
}

/// Names in a stream's `Filter` entry, in decoding order
fn stream_filters(stream: &Stream) -> Vec<&[u8]> {
    match stream.dict.get(b"Filter") {
        Ok(Object::Name(name)) => vec![name.as_slice()],
        Ok(Object::Array(items)) => items.iter().filter_map(|item| item.as_name().ok()).collect(),
        _ => Vec::new(),
    }
}

/// Decoded content of a stream.
///
/// Only Flate (and its `Fl` abbreviation) is decoded; any other filter is an
/// `UnsupportedFilter` error.
pub fn decode_stream(stream: &Stream) -> Result<Vec<u8>> {
    let mut data = stream.content.clone();
    for filter in stream_filters(stream) {
        match filter {
            b"FlateDecode" | b"Fl" => {
                let mut decoded = Vec::new();
                ZlibDecoder::new(data.as_slice())
                    .read_to_end(&mut decoded)
                    .map_err(|e| PdfToolError::DocumentCorrupt(format!("bad Flate data: {}", e)))?;
                data = decoded;
            }
            other => {
                return Err(PdfToolError::UnsupportedFilter(
                    String::from_utf8_lossy(other).to_string(),
                ))
            }
        }
    }
    Ok(data)
}

/// Flate-compress a buffer
pub fn compress(data: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::best());
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::Document;

    #[test]
    fn test_decode_utf16_with_bom() {
        let bytes = [0xFE, 0xFF, 0x00, 0x48, 0x00, 0x69, 0x04, 0x14];
        assert_eq!(decode_text(&bytes), "Hi\u{0414}");
    }

    #[test]
    fn test_decode_pdf_doc_encoding() {
        assert_eq!(decode_text(b"caf\xe9 \x80"), "caf\u{e9} \u{2022}");
    }

    #[test]
    fn test_encode_prefers_pdf_doc_encoding() {
        assert_eq!(encode_text("Jos\u{e9}"), b"Jos\xe9".to_vec());
        assert_eq!(encode_text("\u{2014}"), vec![0x84]);
        assert_eq!(encode_text("\u{0414}"), vec![0xFE, 0xFF, 0x04, 0x14]);
    }

    #[test]
    fn test_to_text_falls_back_for_scalars() {
        assert_eq!(to_text(&Object::Integer(42)), "42");
        assert_eq!(to_text(&Object::Boolean(true)), "true");
        assert_eq!(to_text(&Object::Name(b"Off".to_vec())), "Off");
        assert_eq!(to_text(&Object::Array(vec![])), "");
        assert_eq!(
            to_text(&Object::String(b"abc".to_vec(), StringFormat::Hexadecimal)),
            "abc"
        );
    }

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(12.0), "12");
        assert_eq!(format_number(0.5), "0.5");
        assert_eq!(format_number(-3.25), "-3.25");
        assert_eq!(format_number(1.0 / 3.0), "0.3333");
        assert_eq!(format_number(-0.00001), "0");
    }

    #[test]
    fn test_accessors_resolve_references() {
        let mut doc = Document::with_version("1.5");
        let inner_id = doc.add_object(Object::Array(vec![Object::Integer(1)]));
        let mut dict = Dictionary::new();
        dict.set("Kids", Object::Reference(inner_id));
        dict.set("FT", Object::Name(b"Tx".to_vec()));

        assert_eq!(get_array(&doc, &dict, b"Kids").unwrap().len(), 1);
        assert_eq!(get_name(&doc, &dict, b"FT").unwrap(), b"Tx");
        assert!(exists(&dict, b"Kids"));
        assert!(!exists(&dict, b"V"));
    }

    #[test]
    fn test_numeric_accessors() {
        let mut doc = Document::with_version("1.5");
        let width_id = doc.add_object(Object::Real(12.5));
        let mut dict = Dictionary::new();
        dict.set("W", Object::Reference(width_id));
        dict.set("Ff", Object::Integer(4));
        dict.set(
            "Rect",
            Object::Array(vec![
                Object::Integer(10),
                Object::Real(20.5),
                Object::Reference(width_id),
                Object::Integer(40),
            ]),
        );

        assert_eq!(get_number(&doc, &dict, b"W").unwrap(), 12.5);
        assert_eq!(get_number(&doc, &dict, b"Ff").unwrap(), 4.0);
        assert_eq!(get_integer(&doc, &dict, b"Ff").unwrap(), 4);
        assert_eq!(
            get_rectangle(&doc, &dict, b"Rect").unwrap(),
            [10.0, 20.5, 12.5, 40.0]
        );
        assert!(matches!(
            get_integer(&doc, &dict, b"W"),
            Err(PdfToolError::TypeMismatch { expected: "integer", .. })
        ));
        assert!(matches!(
            get_rectangle(&doc, &dict, b"Ff"),
            Err(PdfToolError::TypeMismatch { expected: "rectangle", .. })
        ));
    }

    #[test]
    fn test_accessors_fail_loudly() {
        let doc = Document::with_version("1.5");
        let mut dict = Dictionary::new();
        dict.set("FT", Object::Integer(3));
        dict.set("P", Object::Reference((99, 0)));

        assert!(matches!(
            get_name(&doc, &dict, b"FT"),
            Err(PdfToolError::TypeMismatch { expected: "name", .. })
        ));
        assert!(matches!(
            get_dict(&doc, &dict, b"Missing"),
            Err(PdfToolError::MissingKey(_))
        ));
        assert!(matches!(
            get_dict(&doc, &dict, b"P"),
            Err(PdfToolError::MissingObject((99, 0)))
        ));
    }

    #[test]
    fn test_copy_dictionary_excluding_keeps_order() {
        let mut dict = Dictionary::new();
        dict.set("A", Object::Integer(1));
        dict.set("B", Object::Integer(2));
        dict.set("C", Object::Integer(3));
        let copy = copy_dictionary_excluding(&dict, &[b"B"]);
        let keys: Vec<&[u8]> = copy.iter().map(|(k, _)| k.as_slice()).collect();
        assert_eq!(keys, vec![b"A".as_slice(), b"C".as_slice()]);
    }

    #[test]
    fn test_decode_flate_filter_chain() {
        let data = b"q 1 0 0 1 0 0 cm Q".to_vec();
        let mut dict = Dictionary::new();
        dict.set(
            "Filter",
            Object::Array(vec![
                Object::Name(b"Fl".to_vec()),
                Object::Name(b"FlateDecode".to_vec()),
            ]),
        );
        let stream = Stream::new(dict, compress(&compress(&data).unwrap()).unwrap());
        assert_eq!(decode_stream(&stream).unwrap(), data);
    }

    #[test]
    fn test_decode_rejects_other_filters() {
        let mut dict = Dictionary::new();
        dict.set("Filter", Object::Name(b"DCTDecode".to_vec()));
        let stream = Stream::new(dict, vec![0xFF, 0xD8]);
        assert!(matches!(
            decode_stream(&stream),
            Err(PdfToolError::UnsupportedFilter(name)) if name == "DCTDecode"
        ));

        let mut dict = Dictionary::new();
        dict.set("Filter", Object::Name(b"FlateDecode".to_vec()));
        let stream = Stream::new(dict, b"not zlib".to_vec());
        assert!(matches!(
            decode_stream(&stream),
            Err(PdfToolError::DocumentCorrupt(_))
        ));
    }
}
