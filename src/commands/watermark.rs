//! `watermark`: draw the first page of one PDF centred on every page of another

use super::{rebuilt_page, require_input, require_output};
use crate::content::ContentComposer;
use crate::copying::{create_form_xobjects_from_pdf, merge_pdf_page_to_page, CopyingContext};
use crate::error::{PdfToolError, Result};
use crate::object::Object;
use crate::reader::DocumentReader;
use crate::writer::{DocumentWriter, WriterOptions};
use std::io::Write;
use std::path::PathBuf;

/// Options for `watermark`
#[derive(Debug, Clone, Default)]
pub struct WatermarkOptions {
    pub pdf_file: Option<PathBuf>,
    /// PDF whose first page is the watermark
    pub watermark_file: Option<PathBuf>,
    pub output_file: Option<PathBuf>,
    pub writer: WriterOptions,
}

pub fn watermark(options: &WatermarkOptions) -> Result<()> {
    let pdf_file = require_input(options.pdf_file.as_ref(), "a PDF to watermark")?;
    let watermark_file = require_input(options.watermark_file.as_ref(), "a watermark PDF file")?;
    let output = require_output(options.output_file.as_ref())?;

    let reader = DocumentReader::load(pdf_file)?;
    let mark = DocumentReader::load(watermark_file)?;
    let mut writer = DocumentWriter::create(output, options.writer.clone())?;
    let pages = watermark_pages(&reader, &mark, &mut writer)?;
    writer.end()?;

    log::info!("Watermarked {} pages into {}", pages, output.display());
    Ok(())
}

/// Rebuild every page of `reader` with `mark`'s first page drawn over it.
///
/// Annotations and the AcroForm are not carried over. Returns the page count.
pub fn watermark_pages<W: Write>(
    reader: &DocumentReader,
    mark: &DocumentReader,
    writer: &mut DocumentWriter<W>,
) -> Result<usize> {
    let forms = create_form_xobjects_from_pdf(writer, mark)?;
    let form = forms
        .first()
        .ok_or_else(|| PdfToolError::Usage("Watermark PDF has no pages".to_string()))?;

    let mut context = CopyingContext::new(reader);
    for index in 0..reader.pages_count() {
        let input = reader.parse_page(index)?;
        let mut page = rebuilt_page(reader, writer, &input)?;
        merge_pdf_page_to_page(&mut context, writer, &mut page, index)?;

        let name = page.add_resource("XObject", "Wm", Object::Reference(form.id));
        let mut content = ContentComposer::new();
        content
            .save_state()
            .translate(
                (input.media_box[2] - form.bbox[2]) / 2.0,
                (input.media_box[3] - form.bbox[3]) / 2.0,
            )
            .draw_xobject(&name)
            .restore_state();
        writer.add_page_content(&mut page, content.into_bytes())?;
        writer.write_page(page)?;
    }
    Ok(reader.pages_count())
}
