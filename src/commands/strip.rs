//! `strip`: remove the AcroForm and page annotations

use super::{rebuilt_page, require_input, require_output};
use crate::copying::{merge_pdf_page_to_page, CopyingContext};
use crate::error::Result;
use crate::form_writer::remove_acroform;
use crate::object::{copy_dictionary_excluding, Dictionary, Object, ObjectId, Resolver};
use crate::reader::DocumentReader;
use crate::writer::{DocumentWriter, WriterOptions};
use std::collections::HashSet;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Options for `strip`
#[derive(Debug, Clone, Default)]
pub struct StripOptions {
    pub pdf_file: Option<PathBuf>,
    pub output_file: Option<PathBuf>,
    /// Append an incremental update instead of rebuilding the file
    pub incremental: bool,
    pub writer: WriterOptions,
}

pub fn strip(options: &StripOptions) -> Result<()> {
    let pdf_file = require_input(
        options.pdf_file.as_ref(),
        "a PDF from which to remove the AcroForm",
    )?;
    let output = require_output(options.output_file.as_ref())?;

    let reader = DocumentReader::load(pdf_file)?;
    if !reader.has_acroform() {
        log::warn!("{} has no AcroForm", pdf_file.display());
    }
    if options.incremental {
        let mut writer = DocumentWriter::create_modified(&reader, output, options.writer.clone())?;
        strip_incremental(&reader, &mut writer)?;
        writer.end()?;
    } else {
        strip_acroform_and_annotations(&reader, output, options.writer.clone())?;
    }
    log::info!("Wrote {}", output.display());
    Ok(())
}

/// Rebuild `reader`'s pages into a new file at `output`.
///
/// Merging each page onto a fresh one drops its annotations, and the new
/// catalog never gets an AcroForm.
pub fn strip_acroform_and_annotations(
    reader: &DocumentReader,
    output: &Path,
    options: WriterOptions,
) -> Result<()> {
    let mut writer = DocumentWriter::create(output, options)?;
    let mut context = CopyingContext::new(reader);
    for index in 0..reader.pages_count() {
        let input = reader.parse_page(index)?;
        let mut page = rebuilt_page(reader, &mut writer, &input)?;
        merge_pdf_page_to_page(&mut context, &mut writer, &mut page, index)?;
        writer.write_page(page)?;
    }
    writer.end()?;
    Ok(())
}

/// Remove the AcroForm and all page annotations in an incremental update.
///
/// The removed top-level objects are freed; objects they reference are left
/// in place.
pub fn strip_incremental<W: Write>(
    reader: &DocumentReader,
    writer: &mut DocumentWriter<W>,
) -> Result<()> {
    let mut freed: HashSet<ObjectId> = HashSet::new();

    if reader.has_acroform() {
        let form_entry = reader.catalog()?.get(b"AcroForm").ok().cloned();
        remove_acroform(reader, writer)?;
        if let Some(Object::Reference(id)) = form_entry {
            free(writer, &mut freed, id)?;
        }
    }

    for index in 0..reader.pages_count() {
        let input = reader.parse_page(index)?;
        let annots = match input.dict.get(b"Annots") {
            Ok(annots) => annots,
            Err(_) => continue,
        };
        if let Object::Reference(id) = annots {
            free(writer, &mut freed, *id)?;
        }
        if let Object::Array(items) = reader.resolve(annots)? {
            for item in items {
                if let Object::Reference(id) = item {
                    free(writer, &mut freed, *id)?;
                }
            }
        }
        let page: Dictionary = copy_dictionary_excluding(&input.dict, &[b"Annots"]);
        writer.write_modified_object(input.id, &Object::Dictionary(page))?;
        log::debug!("removed annotations from page {}", index);
    }
    Ok(())
}

fn free<W: Write>(
    writer: &mut DocumentWriter<W>,
    freed: &mut HashSet<ObjectId>,
    id: ObjectId,
) -> Result<()> {
    if freed.insert(id) {
        writer.delete_object(id)?;
    }
    Ok(())
}
