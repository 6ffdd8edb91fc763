//! Copying objects from a source document into a writer
//!
//! A `CopyingContext` deep-copies values from a `DocumentReader` into a
//! `DocumentWriter`. Every indirect reference met along the way is given a
//! destination ID once and queued; `flush` then writes the queued objects,
//! which may queue further ones, until the closure is complete.

use crate::error::Result;
use crate::object::{
    copy_dictionary_excluding, decode_stream, rectangle, Dictionary, Object, ObjectId,
    Resolver, Stream,
};
use crate::page::Page;
use crate::reader::DocumentReader;
use crate::writer::DocumentWriter;
use std::collections::{HashMap, VecDeque};
use std::io::Write;

/// A page of another document turned into a form XObject
#[derive(Debug, Clone, Copy)]
pub struct FormXObject {
    /// Object ID in the destination document
    pub id: ObjectId,
    /// Bounding box, taken from the source page's MediaBox
    pub bbox: [f64; 4],
}

/// Tracks which source objects have been (or will be) written to the destination
pub struct CopyingContext<'a> {
    source: &'a DocumentReader,
    mapping: HashMap<ObjectId, ObjectId>,
    pending: VecDeque<(ObjectId, ObjectId)>,
    same_document: bool,
}

impl<'a> CopyingContext<'a> {
    /// Copy from `source` into a different document
    pub fn new(source: &'a DocumentReader) -> Self {
        Self {
            source,
            mapping: HashMap::new(),
            pending: VecDeque::new(),
            same_document: false,
        }
    }

    /// Copy within the document being updated; references are kept verbatim
    pub fn same_document(source: &'a DocumentReader) -> Self {
        Self {
            same_document: true,
            ..Self::new(source)
        }
    }

    pub fn source(&self) -> &'a DocumentReader {
        self.source
    }

    /// Declare that `source_id` already exists in the destination as `dest_id`
    pub fn register_mapping(&mut self, source_id: ObjectId, dest_id: ObjectId) {
        self.mapping.insert(source_id, dest_id);
    }

    /// Destination ID for `source_id`, allocating and queueing it if unseen
    pub fn map_reference<W: Write>(
        &mut self,
        writer: &mut DocumentWriter<W>,
        source_id: ObjectId,
    ) -> ObjectId {
        if self.same_document {
            return source_id;
        }
        if let Some(dest) = self.mapping.get(&source_id) {
            return *dest;
        }
        let dest = writer.allocate_object_id();
        self.mapping.insert(source_id, dest);
        self.pending.push_back((source_id, dest));
        dest
    }

    /// Clone a value, rewriting every nested reference to its destination ID
    pub fn copy_direct_object_as_is<W: Write>(
        &mut self,
        writer: &mut DocumentWriter<W>,
        object: &Object,
    ) -> Object {
        match object {
            Object::Reference(id) => Object::Reference(self.map_reference(writer, *id)),
            Object::Array(items) => Object::Array(
                items
                    .iter()
                    .map(|item| self.copy_direct_object_as_is(writer, item))
                    .collect(),
            ),
            Object::Dictionary(dict) => Object::Dictionary(self.copy_dictionary(writer, dict)),
            Object::Stream(stream) => {
                let dict = self.copy_dictionary(writer, &stream.dict);
                Object::Stream(Stream::new(dict, stream.content.clone()))
            }
            other => other.clone(),
        }
    }

    fn copy_dictionary<W: Write>(
        &mut self,
        writer: &mut DocumentWriter<W>,
        dict: &Dictionary,
    ) -> Dictionary {
        let mut copy = Dictionary::new();
        for (key, value) in dict.iter() {
            copy.set(key.clone(), self.copy_direct_object_as_is(writer, value));
        }
        copy
    }

    /// Copy a dictionary without the listed keys, rewriting nested references
    pub fn copy_dictionary_excluding<W: Write>(
        &mut self,
        writer: &mut DocumentWriter<W>,
        dict: &Dictionary,
        excluded: &[&[u8]],
    ) -> Dictionary {
        let trimmed = copy_dictionary_excluding(dict, excluded);
        self.copy_dictionary(writer, &trimmed)
    }

    /// Copy an indirect object (and everything it reaches) into the destination
    pub fn copy_object<W: Write>(
        &mut self,
        writer: &mut DocumentWriter<W>,
        source_id: ObjectId,
    ) -> Result<ObjectId> {
        let dest = self.map_reference(writer, source_id);
        self.flush(writer)?;
        Ok(dest)
    }

    /// Write every queued object; objects missing from the source become null
    pub fn flush<W: Write>(&mut self, writer: &mut DocumentWriter<W>) -> Result<()> {
        while let Some((source_id, dest_id)) = self.pending.pop_front() {
            let copied = match self.source.lookup(source_id) {
                Some(object) => self.copy_direct_object_as_is(writer, object),
                None => {
                    log::warn!(
                        "object {} {} R is missing, writing null",
                        source_id.0,
                        source_id.1
                    );
                    Object::Null
                }
            };
            writer.write_new_object(Some(dest_id), &copied)?;
        }
        Ok(())
    }
}

/// Append every page of `source` to a new document, keeping annotations
pub fn append_pdf_pages_from_pdf<W: Write>(
    writer: &mut DocumentWriter<W>,
    source: &DocumentReader,
) -> Result<Vec<ObjectId>> {
    let mut context = CopyingContext::new(source);

    // Pages referenced from elsewhere (annotation /P, link destinations) must
    // land on the new page objects, so map them all up front.
    let mut targets = Vec::with_capacity(source.pages_count());
    for index in 0..source.pages_count() {
        let dest = writer.allocate_object_id();
        context.register_mapping(source.page_object_id(index)?, dest);
        targets.push(dest);
    }

    for (index, dest) in targets.iter().enumerate() {
        let page = source.parse_page(index)?;
        let mut dict = copy_dictionary_excluding(&page.dict, &[b"Parent"]);
        dict.set("MediaBox", rectangle(page.media_box));
        dict.set("Resources", Object::Dictionary(page.resources.clone()));
        if let Some(crop_box) = &page.crop_box {
            dict.set("CropBox", crop_box.clone());
        }
        if let Some(rotate) = &page.rotate {
            dict.set("Rotate", rotate.clone());
        }
        let copied = match context.copy_direct_object_as_is(writer, &Object::Dictionary(dict)) {
            Object::Dictionary(copied) => copied,
            _ => Dictionary::new(),
        };
        writer.write_page_dictionary(*dest, copied)?;
        context.flush(writer)?;
    }
    log::debug!("appended {} pages", targets.len());
    Ok(targets)
}

/// Copy the content and resources of source page `index` onto `page`.
///
/// Annotations are not carried over.
pub fn merge_pdf_page_to_page<W: Write>(
    context: &mut CopyingContext<'_>,
    writer: &mut DocumentWriter<W>,
    page: &mut Page,
    index: usize,
) -> Result<()> {
    let source = context.source();
    let input = source.parse_page(index)?;

    let open = writer.write_new_object(
        None,
        &Object::Stream(Stream::new(Dictionary::new(), b"q\n".to_vec())),
    )?;
    page.push_content(open);
    for stream_id in source.content_stream_ids(&input.dict)? {
        let dest = context.map_reference(writer, stream_id);
        page.push_content(dest);
    }
    let close = writer.write_new_object(
        None,
        &Object::Stream(Stream::new(Dictionary::new(), b"Q\n".to_vec())),
    )?;
    page.push_content(close);

    merge_resources(context, writer, page.resources_mut(), &input.resources)?;
    context.flush(writer)
}

/// Merge source resources into `target`, category by category; existing names win
fn merge_resources<W: Write>(
    context: &mut CopyingContext<'_>,
    writer: &mut DocumentWriter<W>,
    target: &mut Dictionary,
    resources: &Dictionary,
) -> Result<()> {
    let source = context.source();
    for (category, value) in resources.iter() {
        let resolved = source.resolve(value)?;
        let entries = match resolved {
            Object::Dictionary(entries) => entries,
            // ProcSet and other non-dictionary entries are copied whole
            other => {
                if !target.has(category) {
                    let copied = context.copy_direct_object_as_is(writer, other);
                    target.set(category.clone(), copied);
                }
                continue;
            }
        };
        let mut merged = match target.remove(category) {
            Some(Object::Dictionary(existing)) => existing,
            _ => Dictionary::new(),
        };
        for (name, entry) in entries.iter() {
            if merged.has(name) {
                log::warn!(
                    "resource /{} already present, keeping the first",
                    String::from_utf8_lossy(name)
                );
                continue;
            }
            let copied = context.copy_direct_object_as_is(writer, entry);
            merged.set(name.clone(), copied);
        }
        target.set(category.clone(), Object::Dictionary(merged));
    }
    Ok(())
}

/// Turn every page of `source` into a form XObject in the destination
pub fn create_form_xobjects_from_pdf<W: Write>(
    writer: &mut DocumentWriter<W>,
    source: &DocumentReader,
) -> Result<Vec<FormXObject>> {
    let mut context = CopyingContext::new(source);
    let mut forms = Vec::with_capacity(source.pages_count());

    for index in 0..source.pages_count() {
        let input = source.parse_page(index)?;

        let mut dict = Dictionary::new();
        dict.set("Type", Object::Name(b"XObject".to_vec()));
        dict.set("Subtype", Object::Name(b"Form".to_vec()));
        dict.set("FormType", Object::Integer(1));
        dict.set("BBox", rectangle(input.media_box));
        let resources = context.copy_direct_object_as_is(
            writer,
            &Object::Dictionary(input.resources.clone()),
        );
        dict.set("Resources", resources);

        let stream_ids = source.content_stream_ids(&input.dict)?;
        let single = match stream_ids.as_slice() {
            [only] => match source.parse_new_object(*only)? {
                Object::Stream(stream) => Some(stream),
                _ => None,
            },
            _ => None,
        };

        let id = match single {
            // A single stream keeps its encoded bytes and filters
            Some(stream) => {
                for key in [b"Filter".as_slice(), b"DecodeParms".as_slice()] {
                    if let Ok(value) = stream.dict.get(key) {
                        let copied = context.copy_direct_object_as_is(writer, value);
                        dict.set(key.to_vec(), copied);
                    }
                }
                writer.write_new_object(
                    None,
                    &Object::Stream(Stream::new(dict, stream.content.clone())),
                )?
            }
            None => {
                let mut content = Vec::new();
                for stream_id in stream_ids {
                    if let Object::Stream(stream) = source.parse_new_object(stream_id)? {
                        content.extend(decode_stream(stream)?);
                        content.push(b'\n');
                    }
                }
                writer.write_stream(None, dict, content)?
            }
        };
        context.flush(writer)?;
        forms.push(FormXObject {
            id,
            bbox: input.media_box,
        });
    }
    log::debug!("created {} form xobjects", forms.len());
    Ok(forms)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::tests::create_nested_pdf;
    use crate::writer::WriterOptions;
    use lopdf::Document;

    #[test]
    fn test_append_pages_keeps_order_and_content() {
        let source = DocumentReader::from_bytes(create_nested_pdf(3)).unwrap();
        let mut writer = DocumentWriter::new(Vec::new(), WriterOptions::default()).unwrap();
        let ids = append_pdf_pages_from_pdf(&mut writer, &source).unwrap();
        assert_eq!(ids.len(), 3);

        let out = DocumentReader::from_bytes(writer.end().unwrap()).unwrap();
        assert_eq!(out.pages_count(), 3);
        for index in 0..3 {
            let content = String::from_utf8(out.page_content(index).unwrap()).unwrap();
            assert!(content.contains(&format!("(Page-{}) Tj", index + 1)));
            // inherited attributes are now explicit on the page
            let page = out.parse_page(index).unwrap();
            assert_eq!(page.media_box, [0.0, 0.0, 300.0, 400.0]);
            assert!(page.dict.has(b"Resources"));
        }
    }

    #[test]
    fn test_copy_reuses_shared_objects() {
        let mut doc = Document::with_version("1.5");
        let shared = doc.add_object(Object::Integer(42));
        let array = doc.add_object(Object::Array(vec![
            Object::Reference(shared),
            Object::Reference(shared),
        ]));
        let mut catalog = Dictionary::new();
        catalog.set("Type", Object::Name(b"Catalog".to_vec()));
        let pages = doc.add_object(Object::Dictionary({
            let mut p = Dictionary::new();
            p.set("Type", Object::Name(b"Pages".to_vec()));
            p.set("Kids", Object::Array(vec![]));
            p.set("Count", Object::Integer(0));
            p
        }));
        catalog.set("Pages", Object::Reference(pages));
        let catalog_id = doc.add_object(Object::Dictionary(catalog));
        doc.trailer.set("Root", Object::Reference(catalog_id));
        let mut bytes = Vec::new();
        doc.save_to(&mut bytes).unwrap();

        let source = DocumentReader::from_bytes(bytes).unwrap();
        let mut writer = DocumentWriter::new(Vec::new(), WriterOptions::default()).unwrap();
        let mut context = CopyingContext::new(&source);
        let copied = context.copy_object(&mut writer, array).unwrap();
        let out = DocumentReader::from_bytes(writer.end().unwrap()).unwrap();

        match out.parse_new_object(copied).unwrap() {
            Object::Array(items) => {
                assert_eq!(items[0], items[1]);
                assert_eq!(out.resolve(&items[0]).unwrap(), &Object::Integer(42));
            }
            other => panic!("expected array, got {:?}", other),
        }
    }

    #[test]
    fn test_same_document_keeps_references() {
        let source = DocumentReader::from_bytes(create_nested_pdf(1)).unwrap();
        let mut writer = DocumentWriter::modify(&source, Vec::new(), WriterOptions::default()).unwrap();
        let mut context = CopyingContext::same_document(&source);
        let value = Object::Array(vec![Object::Reference((3, 0))]);
        assert_eq!(context.copy_direct_object_as_is(&mut writer, &value), value);
    }

    #[test]
    fn test_merge_drops_annotations() {
        let source = DocumentReader::from_bytes(create_nested_pdf(1)).unwrap();
        let mut writer = DocumentWriter::new(Vec::new(), WriterOptions::default()).unwrap();
        let mut context = CopyingContext::new(&source);
        let mut page = writer.create_page([0.0, 0.0, 300.0, 400.0]);
        merge_pdf_page_to_page(&mut context, &mut writer, &mut page, 0).unwrap();
        writer.write_page(page).unwrap();

        let out = DocumentReader::from_bytes(writer.end().unwrap()).unwrap();
        let merged = out.parse_page(0).unwrap();
        assert!(!merged.dict.has(b"Annots"));
        let content = String::from_utf8(out.page_content(0).unwrap()).unwrap();
        assert!(content.starts_with("q\n"));
        assert!(content.contains("(Page-1) Tj"));
        assert!(content.trim_end().ends_with('Q'));
    }

    #[test]
    fn test_form_xobjects_use_media_box() {
        let source = DocumentReader::from_bytes(create_nested_pdf(2)).unwrap();
        let mut writer = DocumentWriter::new(Vec::new(), WriterOptions::default()).unwrap();
        let forms = create_form_xobjects_from_pdf(&mut writer, &source).unwrap();
        assert_eq!(forms.len(), 2);
        assert_eq!(forms[0].bbox, [0.0, 0.0, 300.0, 400.0]);
    }
}
