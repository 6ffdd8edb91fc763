//! `fill`: draw data marks onto the pages of a PDF
//!
//! The data file is JSON5:
//!
//! ```json5
//! {
//!   md5: "...",                        // optional checksum of the input PDF
//!   fields: [{ page: 0, rect: [x0, y0, x1, y1], type: "plaintext", value: "..." }],
//!   formFields: { "full.name": "..." } // optional AcroForm values
//! }
//! ```
//!
//! Marks are drawn directly into page content, not as form widgets. The
//! output is an incremental update of the input.

use super::{md5_hex, require_input, require_output};
use crate::content::ContentComposer;
use crate::error::{PdfToolError, Result};
use crate::font::TrueTypeFont;
use crate::form_writer::{fill_form, FieldValues};
use crate::object::{rectangle, Dictionary, Object, ObjectId};
use crate::page::{add_named_resource, PageModifier};
use crate::qr::embed_qr_code;
use crate::reader::DocumentReader;
use crate::writer::{DocumentWriter, WriterOptions};
use serde::Deserialize;
use serde_json::Value;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Point size of plaintext marks
const TEXT_SIZE: f64 = 14.0;
/// Point size of the text inside a sign-here stamp
const SIGN_HERE_SIZE: f64 = 12.0;
const SIGN_HERE_OPACITY: f64 = 0.5;

/// Options for `fill`
#[derive(Debug, Clone, Default)]
pub struct FillOptions {
    pub pdf_file: Option<PathBuf>,
    pub output_file: Option<PathBuf>,
    /// JSON5 data file
    pub data_file: Option<PathBuf>,
    /// TrueType font for plaintext and signhere marks
    pub font_file: Option<PathBuf>,
    /// Stroke a border around checkbox marks
    pub checkbox_borders: bool,
    pub writer: WriterOptions,
}

/// Contents of the data file
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FillData {
    #[serde(default)]
    pub md5: Option<String>,
    #[serde(default)]
    pub fields: Vec<MarkField>,
    #[serde(default)]
    pub form_fields: Option<FieldValues>,
}

/// One mark to draw
#[derive(Debug, Clone, Deserialize)]
pub struct MarkField {
    pub page: i64,
    /// `[x0, y0, x1, y1]`
    pub rect: [f64; 4],
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub value: Value,
}

impl MarkField {
    fn origin(&self) -> (f64, f64) {
        (self.rect[0], self.rect[1])
    }

    fn size(&self) -> (f64, f64) {
        (self.rect[2] - self.rect[0], self.rect[3] - self.rect[1])
    }

    /// Whether the value counts as set, the way a checkbox reads it
    fn is_checked(&self) -> bool {
        match &self.value {
            Value::Null => false,
            Value::Bool(on) => *on,
            Value::Number(n) => n.as_f64().map(|n| n != 0.0).unwrap_or(false),
            Value::String(s) => !s.is_empty(),
            Value::Array(_) | Value::Object(_) => true,
        }
    }

    /// The value as display text; unset values show nothing
    fn text(&self) -> String {
        match &self.value {
            Value::Null | Value::Bool(false) => String::new(),
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

/// Parse a JSON5 data file
pub fn read_fill_data(path: &Path) -> Result<FillData> {
    let text = fs::read_to_string(path).map_err(|e| PdfToolError::InvalidData {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    json5::from_str(&text).map_err(|e| PdfToolError::InvalidData {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

pub fn fill(options: &FillOptions) -> Result<()> {
    let pdf_file = require_input(options.pdf_file.as_ref(), "an input PDF file")?;
    let output = require_output(options.output_file.as_ref())?;
    let data_file = options
        .data_file
        .as_ref()
        .ok_or_else(|| PdfToolError::Usage("Must specify a data file".to_string()))?;
    let data = read_fill_data(data_file)?;

    let bytes = fs::read(pdf_file)?;
    if let Some(expected) = &data.md5 {
        if !md5_hex(&bytes).eq_ignore_ascii_case(expected) {
            return Err(PdfToolError::IntegrityMismatch {
                path: pdf_file.to_path_buf(),
            });
        }
    }

    let reader = DocumentReader::from_bytes(bytes)?;
    let font = options
        .font_file
        .as_deref()
        .map(TrueTypeFont::load)
        .transpose()?;

    let mut writer = DocumentWriter::create_modified(&reader, output, options.writer.clone())?;
    let marks = fill_document(&reader, &mut writer, &data, font.as_ref(), options.checkbox_borders)?;
    writer.end()?;

    log::info!("Drew {} marks into {}", marks, output.display());
    Ok(())
}

/// Apply `data` to `reader`'s document through `writer`; returns the number of marks drawn
pub fn fill_document<W: Write>(
    reader: &DocumentReader,
    writer: &mut DocumentWriter<W>,
    data: &FillData,
    font: Option<&TrueTypeFont>,
    checkbox_borders: bool,
) -> Result<usize> {
    match &data.form_fields {
        Some(values) if reader.has_acroform() => fill_form(reader, writer, values)?,
        Some(_) => log::warn!("formFields given but the PDF has no AcroForm"),
        None if reader.has_acroform() => log::warn!("PDF still has an AcroForm"),
        None => {}
    }

    let num_pages = reader.pages_count();
    for field in &data.fields {
        if field.page < 0 || field.page as usize >= num_pages {
            log::warn!(
                "{} mark on page {} skipped, document has {} pages",
                field.kind,
                field.page,
                num_pages
            );
        }
    }

    let mut painter = MarkPainter {
        font,
        font_id: None,
        ext_gstate_id: None,
        checkbox_borders,
    };
    let mut drawn = 0;
    for index in 0..num_pages {
        let marks: Vec<&MarkField> = data
            .fields
            .iter()
            .filter(|f| f.page >= 0 && f.page as usize == index)
            .collect();
        if marks.is_empty() {
            continue;
        }
        let mut modifier = PageModifier::new(reader, index)?;
        let mut font_name = None;
        for mark in marks {
            if painter.draw(writer, &mut modifier, &mut font_name, mark)? {
                drawn += 1;
            }
        }
        modifier.write(reader, writer)?;
    }
    Ok(drawn)
}

/// Draws marks, embedding shared resources once per document
struct MarkPainter<'f> {
    font: Option<&'f TrueTypeFont>,
    font_id: Option<ObjectId>,
    ext_gstate_id: Option<ObjectId>,
    checkbox_borders: bool,
}

impl<'f> MarkPainter<'f> {
    /// Draw one mark; `false` when its type is unknown and it was skipped
    fn draw<W: Write>(
        &mut self,
        writer: &mut DocumentWriter<W>,
        page: &mut PageModifier,
        font_name: &mut Option<String>,
        mark: &MarkField,
    ) -> Result<bool> {
        let (x, y) = mark.origin();
        let (w, h) = mark.size();

        match mark.kind.as_str() {
            "highlight" => {
                page.content()
                    .save_state()
                    .set_fill_color(1.0, 1.0, 0.6)
                    .rect(x, y, w, h)
                    .fill()
                    .restore_state();
            }
            "plaintext" => {
                let font = self.require_font("plaintext")?;
                let name = self.page_font(writer, page, font_name, font)?;
                page.content()
                    .save_state()
                    .begin_text()
                    .set_fill_gray(0.0)
                    .set_text_matrix(1.0, 0.0, 0.0, 1.0, x, y + h / 4.0)
                    .set_font(&name, TEXT_SIZE)
                    .show_text(&font.encode(&mark.text()))
                    .end_text()
                    .restore_state();
            }
            "qrcode" => {
                let image = embed_qr_code(writer, &mark.text())?;
                let name = page.add_resource("XObject", "Im", Object::Reference(image.id));
                page.content()
                    .save_state()
                    .transform(image.width as f64, 0.0, 0.0, image.height as f64, x, y)
                    .draw_xobject(&name)
                    .restore_state();
            }
            "checkbox" => {
                let content = page.content();
                content.save_state().set_stroke_gray(0.0).set_line_width(2.5);
                if self.checkbox_borders {
                    content.set_line_cap(2).rect(x, y, w, h).stroke();
                }
                if mark.is_checked() {
                    let dx = w / 5.0;
                    let dy = h / 5.0;
                    content
                        .set_line_cap(1)
                        .move_to(x + dx, y + dy)
                        .line_to(x + w - dx, y + h - dy)
                        .stroke()
                        .move_to(x + dx, y + h - dy)
                        .line_to(x + w - dx, y + dy)
                        .stroke();
                }
                content.restore_state();
            }
            "signhere" => {
                let font = self.require_font("signhere")?;
                let form_id = self.sign_here_form(writer, font, w, h, &mark.text())?;
                let name = page.add_resource("XObject", "Fm", Object::Reference(form_id));
                page.content()
                    .save_state()
                    .translate(x, y + h / 2.0)
                    .rotate_degrees(45.0)
                    .translate(0.0, -h / 2.0)
                    .draw_xobject(&name)
                    .restore_state();
            }
            other => {
                log::warn!("{}", PdfToolError::UnknownFieldType(other.to_string()));
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn require_font(&self, kind: &str) -> Result<&'f TrueTypeFont> {
        self.font
            .ok_or_else(|| PdfToolError::MissingFont(kind.to_string()))
    }

    fn embedded_font<W: Write>(
        &mut self,
        writer: &mut DocumentWriter<W>,
        font: &TrueTypeFont,
    ) -> Result<ObjectId> {
        match self.font_id {
            Some(id) => Ok(id),
            None => {
                let id = font.embed(writer)?;
                self.font_id = Some(id);
                Ok(id)
            }
        }
    }

    /// Resource name of the font on the current page, registering it on first use
    fn page_font<W: Write>(
        &mut self,
        writer: &mut DocumentWriter<W>,
        page: &mut PageModifier,
        font_name: &mut Option<String>,
        font: &TrueTypeFont,
    ) -> Result<String> {
        if let Some(name) = font_name {
            return Ok(name.clone());
        }
        let id = self.embedded_font(writer, font)?;
        let name = page.add_resource("Font", "F", Object::Reference(id));
        *font_name = Some(name.clone());
        Ok(name)
    }

    fn ext_gstate<W: Write>(&mut self, writer: &mut DocumentWriter<W>) -> Result<ObjectId> {
        if let Some(id) = self.ext_gstate_id {
            return Ok(id);
        }
        let mut dict = Dictionary::new();
        dict.set("Type", Object::Name(b"ExtGState".to_vec()));
        dict.set("ca", Object::Real(SIGN_HERE_OPACITY as f32));
        dict.set("CA", Object::Real(SIGN_HERE_OPACITY as f32));
        let id = writer.write_new_object(None, &Object::Dictionary(dict))?;
        self.ext_gstate_id = Some(id);
        Ok(id)
    }

    /// A translucent pink arrow with "Sign Here" text, authored unrotated
    fn sign_here_form<W: Write>(
        &mut self,
        writer: &mut DocumentWriter<W>,
        font: &TrueTypeFont,
        w: f64,
        h: f64,
        value: &str,
    ) -> Result<ObjectId> {
        let half_h = h / 2.0;
        let cap_height = font.text_height("X", TEXT_SIZE);
        let gs_id = self.ext_gstate(writer)?;
        let font_id = self.embedded_font(writer, font)?;

        let mut resources = Dictionary::new();
        let gs = add_named_resource(&mut resources, "ExtGState", "GS", Object::Reference(gs_id));
        let font_name = add_named_resource(&mut resources, "Font", "F", Object::Reference(font_id));

        let mut content = ContentComposer::new();
        content
            .save_state()
            .set_ext_gstate(&gs)
            .set_line_width(1.0)
            .set_stroke_gray(0.0)
            .set_fill_color(1.0, 0.6, 1.0)
            .move_to(0.0, half_h)
            .line_to(half_h, 0.0)
            .line_to(w, 0.0)
            .line_to(w, h)
            .line_to(half_h, h)
            .close_path()
            .fill_stroke()
            .begin_text()
            .set_fill_gray(0.0)
            .set_text_matrix(1.0, 0.0, 0.0, 1.0, half_h, half_h - cap_height / 2.0)
            .set_font(&font_name, SIGN_HERE_SIZE)
            .show_text(&font.encode(&format!("Sign Here {}", value)))
            .end_text()
            .restore_state();

        let mut dict = Dictionary::new();
        dict.set("Type", Object::Name(b"XObject".to_vec()));
        dict.set("Subtype", Object::Name(b"Form".to_vec()));
        dict.set("BBox", rectangle([0.0, 0.0, w, h]));
        dict.set("Resources", Object::Dictionary(resources));
        writer.write_stream(None, dict, content.into_bytes())
    }
}
