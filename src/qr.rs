//! QR code marks
//!
//! A QR code is rendered to a temporary PNG file and then embedded as an
//! RGB image XObject. The temporary file is removed when it goes out of
//! scope, whether or not embedding succeeded.

use crate::error::{PdfToolError, Result};
use crate::object::{Dictionary, Object, ObjectId};
use crate::writer::DocumentWriter;
use image::{ImageFormat, Rgb, RgbImage};
use qrcode::{Color, EcLevel, QrCode};
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

/// Pixels per QR module
const MODULE_SIZE: u32 = 4;
/// Light modules around the code
const QUIET_ZONE: u32 = 4;

/// An embedded image and its natural size in pixels
#[derive(Debug, Clone, Copy)]
pub struct ImageXObject {
    pub id: ObjectId,
    pub width: u32,
    pub height: u32,
}

/// Render `text` as a QR code image
pub fn render_qr_code(text: &str) -> Result<RgbImage> {
    let code = QrCode::with_error_correction_level(text.as_bytes(), EcLevel::M)
        .map_err(|e| PdfToolError::QrCode(format!("QR code encoding error: {}", e)))?;

    let modules = code.width() as u32;
    let size = (modules + QUIET_ZONE * 2) * MODULE_SIZE;
    let mut img = RgbImage::from_pixel(size, size, Rgb([255, 255, 255]));

    for (y, row) in code.to_colors().chunks(modules as usize).enumerate() {
        for (x, &module) in row.iter().enumerate() {
            if module != Color::Dark {
                continue;
            }
            let start_x = (QUIET_ZONE + x as u32) * MODULE_SIZE;
            let start_y = (QUIET_ZONE + y as u32) * MODULE_SIZE;
            for dy in 0..MODULE_SIZE {
                for dx in 0..MODULE_SIZE {
                    img.put_pixel(start_x + dx, start_y + dy, Rgb([0, 0, 0]));
                }
            }
        }
    }
    Ok(img)
}

/// Write `text` as a QR code PNG into a new temporary file
pub fn write_qr_png(text: &str) -> Result<NamedTempFile> {
    let img = render_qr_code(text)?;
    let file = tempfile::Builder::new()
        .prefix("pdf-o-rama-")
        .suffix(".png")
        .tempfile()?;
    img.save_with_format(file.path(), ImageFormat::Png)?;
    log::debug!("wrote QR code to {}", file.path().display());
    Ok(file)
}

/// Embed a PNG file as an image XObject
pub fn embed_png<W: Write>(writer: &mut DocumentWriter<W>, path: &Path) -> Result<ImageXObject> {
    let img = image::open(path)?.to_rgb8();
    let (width, height) = img.dimensions();

    let mut dict = Dictionary::new();
    dict.set("Type", Object::Name(b"XObject".to_vec()));
    dict.set("Subtype", Object::Name(b"Image".to_vec()));
    dict.set("Width", Object::Integer(width as i64));
    dict.set("Height", Object::Integer(height as i64));
    dict.set("ColorSpace", Object::Name(b"DeviceRGB".to_vec()));
    dict.set("BitsPerComponent", Object::Integer(8));
    let id = writer.write_stream(None, dict, img.into_raw())?;

    Ok(ImageXObject { id, width, height })
}

/// Render `text` as a QR code and embed it; the temporary PNG is always removed
pub fn embed_qr_code<W: Write>(
    writer: &mut DocumentWriter<W>,
    text: &str,
) -> Result<ImageXObject> {
    let png = write_qr_png(text)?;
    embed_png(writer, png.path())
}
