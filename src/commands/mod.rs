//! Command handlers
//!
//! One module per CLI command. Handlers take an options struct, do their
//! own argument checks and return `Result<()>`; `exit_status` turns that
//! into the process exit code.

pub mod concat;
pub mod fields;
pub mod fill;
pub mod strip;
pub mod watermark;

pub use concat::{concat, ConcatOptions};
pub use fields::{field_report, fields, FieldsOptions, FieldsReport};
pub use fill::{fill, FillData, FillOptions, MarkField};
pub use strip::{strip, strip_acroform_and_annotations, strip_incremental, StripOptions};
pub use watermark::{watermark, WatermarkOptions};

use crate::error::{PdfToolError, Result};
use crate::object::Resolver;
use crate::page::Page;
use crate::reader::{DocumentReader, PageInput};
use crate::writer::DocumentWriter;
use md5::{Digest, Md5};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Map a handler result to an exit code, logging any error
pub fn exit_status(result: Result<()>) -> i32 {
    match result {
        Ok(()) => 0,
        Err(err) => {
            log::error!("{}", err);
            log::debug!("{:?}", err);
            -1
        }
    }
}

/// Lowercase hex MD5 of `bytes`
pub fn md5_hex(bytes: &[u8]) -> String {
    format!("{:x}", Md5::digest(bytes))
}

/// The input path, which must be given and exist
pub(crate) fn require_input<'a>(path: Option<&'a PathBuf>, what: &str) -> Result<&'a Path> {
    let path = path.ok_or_else(|| PdfToolError::Usage(format!("Must specify {}", what)))?;
    require_existing(path)?;
    Ok(path)
}

pub(crate) fn require_existing(path: &Path) -> Result<()> {
    if path.exists() {
        Ok(())
    } else {
        Err(PdfToolError::Usage(format!(
            "File '{}' does not exist",
            path.display()
        )))
    }
}

pub(crate) fn require_output(path: Option<&PathBuf>) -> Result<&Path> {
    path.map(PathBuf::as_path)
        .ok_or_else(|| PdfToolError::Usage("No output file specified".to_string()))
}

/// A fresh page with `input`'s MediaBox, CropBox and Rotate
pub(crate) fn rebuilt_page<W: Write>(
    reader: &DocumentReader,
    writer: &mut DocumentWriter<W>,
    input: &PageInput,
) -> Result<Page> {
    let mut page = writer.create_page(input.media_box);
    if let Some(crop_box) = &input.crop_box {
        page.set_attribute("CropBox", reader.resolve(crop_box)?.clone());
    }
    if let Some(rotate) = &input.rotate {
        page.set_attribute("Rotate", reader.resolve(rotate)?.clone());
    }
    Ok(page)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_status() {
        assert_eq!(exit_status(Ok(())), 0);
        assert_eq!(exit_status(Err(PdfToolError::NoAcroForm)), -1);
    }

    #[test]
    fn test_md5_hex() {
        assert_eq!(md5_hex(b""), "d41d8cd98f00b204e9800998ecf8427e");
    }

    #[test]
    fn test_missing_paths_are_usage_errors() {
        assert!(matches!(require_output(None), Err(PdfToolError::Usage(_))));
        let missing = PathBuf::from("/nonexistent/input.pdf");
        match require_input(Some(&missing), "an input PDF file") {
            Err(PdfToolError::Usage(msg)) => {
                assert_eq!(msg, "File '/nonexistent/input.pdf' does not exist")
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
