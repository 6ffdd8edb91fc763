//! `fields`: describe the AcroForm fields of a PDF as JSON

use super::strip::strip_acroform_and_annotations;
use super::{md5_hex, require_input};
use crate::error::{PdfToolError, Result};
use crate::form_reader::{read_fields, FieldRecord};
use crate::reader::DocumentReader;
use crate::writer::WriterOptions;
use serde::Serialize;
use std::fs;
use std::path::PathBuf;

/// Options for `fields`
#[derive(Debug, Clone, Default)]
pub struct FieldsOptions {
    pub pdf_file: Option<PathBuf>,
    /// Where the JSON description goes
    pub data_file: Option<PathBuf>,
    /// Optional stripped copy of the input; its MD5 is added to the report
    pub output_file: Option<PathBuf>,
    pub writer: WriterOptions,
}

/// The document written by `fields`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldsReport {
    pub num_pages: usize,
    pub fields: Vec<FieldRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub md5: Option<String>,
}

/// Page count and field tree; a document without a form has no fields
pub fn field_report(reader: &DocumentReader) -> Result<FieldsReport> {
    let fields = match read_fields(reader) {
        Ok(fields) => fields,
        Err(PdfToolError::NoAcroForm) => {
            log::info!("PDF has no AcroForm");
            Vec::new()
        }
        Err(err) => return Err(err),
    };
    Ok(FieldsReport {
        num_pages: reader.pages_count(),
        fields,
        md5: None,
    })
}

pub fn fields(options: &FieldsOptions) -> Result<()> {
    let pdf_file = require_input(
        options.pdf_file.as_ref(),
        "a PDF from which to extract information",
    )?;
    let data_file = options
        .data_file
        .as_ref()
        .ok_or_else(|| PdfToolError::Usage("No output data file specified".to_string()))?;

    let reader = DocumentReader::load(pdf_file)?;
    let mut report = field_report(&reader)?;

    if let Some(output) = &options.output_file {
        strip_acroform_and_annotations(&reader, output, options.writer.clone())?;
        report.md5 = Some(md5_hex(&fs::read(output)?));
    }

    fs::write(data_file, serde_json::to_string_pretty(&report)?)?;
    log::info!(
        "Wrote {} top-level fields to {}",
        report.fields.len(),
        data_file.display()
    );
    Ok(())
}
