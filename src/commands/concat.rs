//! `concat`: join the pages of several PDFs into a new file

use super::{require_existing, require_output};
use crate::copying::append_pdf_pages_from_pdf;
use crate::error::{PdfToolError, Result};
use crate::reader::DocumentReader;
use crate::writer::{DocumentWriter, WriterOptions};
use std::path::PathBuf;

/// Options for `concat`
#[derive(Debug, Clone, Default)]
pub struct ConcatOptions {
    /// Input files, in output page order
    pub pdf_files: Vec<PathBuf>,
    pub output_file: Option<PathBuf>,
    pub writer: WriterOptions,
}

/// Append every page of every input, in order, to a new document
pub fn concat(options: &ConcatOptions) -> Result<()> {
    if options.pdf_files.len() < 2 {
        return Err(PdfToolError::Usage(
            "Must specify at least two PDF files".to_string(),
        ));
    }
    let output = require_output(options.output_file.as_ref())?;
    for pdf_file in &options.pdf_files {
        require_existing(pdf_file)?;
    }

    let mut writer = DocumentWriter::create(output, options.writer.clone())?;
    let mut total = 0;
    for pdf_file in &options.pdf_files {
        let reader = DocumentReader::load(pdf_file)?;
        let pages = append_pdf_pages_from_pdf(&mut writer, &reader)?;
        log::debug!("{}: {} pages", pdf_file.display(), pages.len());
        total += pages.len();
    }
    writer.end()?;

    log::info!("Wrote {} pages to {}", total, output.display());
    Ok(())
}
