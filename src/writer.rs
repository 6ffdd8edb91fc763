//! Document writer and incremental updater
//!
//! A `DocumentWriter` either produces a complete new PDF (objects numbered
//! from 1, fresh xref and trailer) or appends an incremental update to an
//! existing file: the original bytes are copied unchanged, new and replaced
//! objects follow, and a new xref section points back to the previous one
//! through `Prev`.

use crate::error::{PdfToolError, Result};
use crate::object::{compress, format_number, Dictionary, Object, ObjectId, Stream, StringFormat};
use crate::page::Page;
use crate::reader::DocumentReader;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Header written at the top of new files; the comment marks the file as binary
const PDF_HEADER: &[u8] = b"%PDF-1.7\n%\xE2\xE3\xCF\xD3\n";

/// Trailer keys carried over from the previous revision in modify mode
const PRESERVED_TRAILER_KEYS: [&[u8]; 3] = [b"Root", b"Info", b"ID"];

/// Writer options
#[derive(Debug, Clone)]
pub struct WriterOptions {
    /// Flate-compress newly created XObject streams
    pub compress_streams: bool,
}

impl Default for WriterOptions {
    fn default() -> Self {
        Self {
            compress_streams: true,
        }
    }
}

/// A `Write` adapter that tracks how many bytes went through it
pub struct CountingWriter<W: Write> {
    inner: W,
    position: usize,
}

impl<W: Write> CountingWriter<W> {
    fn new(inner: W) -> Self {
        Self { inner, position: 0 }
    }

    fn position(&self) -> usize {
        self.position
    }
}

impl<W: Write> Write for CountingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let written = self.inner.write(buf)?;
        self.position += written;
        Ok(written)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }
}

#[derive(Debug, Clone, Copy)]
enum XrefEntry {
    InUse { offset: usize, generation: u16 },
    Free { generation: u16 },
}

enum WriteMode {
    /// Building a document from scratch
    New {
        pages_root: ObjectId,
        kids: Vec<ObjectId>,
    },
    /// Appending an incremental update
    Modify {
        prev_xref: usize,
        prev_size: u32,
        trailer: Dictionary,
    },
}

/// Writes PDF objects, cross-reference data and the trailer
pub struct DocumentWriter<W: Write> {
    out: CountingWriter<W>,
    mode: WriteMode,
    next_number: u32,
    entries: BTreeMap<u32, XrefEntry>,
    options: WriterOptions,
}

impl DocumentWriter<BufWriter<File>> {
    /// Create a new PDF file at `path`
    pub fn create(path: &Path, options: WriterOptions) -> Result<Self> {
        let file = File::create(path)?;
        DocumentWriter::new(BufWriter::new(file), options)
    }

    /// Create `path` as an incremental update of `reader`'s document
    pub fn create_modified(
        reader: &DocumentReader,
        path: &Path,
        options: WriterOptions,
    ) -> Result<Self> {
        let file = File::create(path)?;
        DocumentWriter::modify(reader, BufWriter::new(file), options)
    }
}

impl<W: Write> DocumentWriter<W> {
    /// Start a new document
    pub fn new(out: W, options: WriterOptions) -> Result<Self> {
        let mut out = CountingWriter::new(out);
        out.write_all(PDF_HEADER)?;
        let pages_root = (1, 0);
        Ok(Self {
            out,
            mode: WriteMode::New {
                pages_root,
                kids: Vec::new(),
            },
            next_number: 2,
            entries: BTreeMap::new(),
            options,
        })
    }

    /// Start an incremental update on top of `reader`'s bytes
    pub fn modify(reader: &DocumentReader, out: W, options: WriterOptions) -> Result<Self> {
        let mut out = CountingWriter::new(out);
        let base = reader.bytes();
        out.write_all(base)?;
        if !base.ends_with(b"\n") && !base.ends_with(b"\r") {
            out.write_all(b"\n")?;
        }

        let mut trailer = Dictionary::new();
        for key in PRESERVED_TRAILER_KEYS {
            if let Ok(value) = reader.trailer().get(key) {
                trailer.set(key.to_vec(), value.clone());
            }
        }
        let next_number = reader.next_object_number();
        log::debug!(
            "incremental update: base {} bytes, previous xref at {}, next object {}",
            base.len(),
            reader.last_xref_offset(),
            next_number
        );

        Ok(Self {
            out,
            mode: WriteMode::Modify {
                prev_xref: reader.last_xref_offset(),
                prev_size: next_number,
                trailer,
            },
            next_number,
            entries: BTreeMap::new(),
            options,
        })
    }

    pub fn options(&self) -> &WriterOptions {
        &self.options
    }

    /// Whether this writer appends to an existing file
    pub fn is_modifying(&self) -> bool {
        matches!(self.mode, WriteMode::Modify { .. })
    }

    /// Reserve a fresh object ID
    pub fn allocate_object_id(&mut self) -> ObjectId {
        let id = (self.next_number, 0);
        self.next_number += 1;
        id
    }

    /// Write a new indirect object, allocating an ID when none is given
    pub fn write_new_object(&mut self, id: Option<ObjectId>, object: &Object) -> Result<ObjectId> {
        let id = match id {
            Some(id) => id,
            None => self.allocate_object_id(),
        };
        self.emit(id, object)?;
        Ok(id)
    }

    /// Write a replacement for an existing object; its new offset shadows the old one
    pub fn write_modified_object(&mut self, id: ObjectId, object: &Object) -> Result<()> {
        self.emit(id, object)
    }

    /// Mark an object as free in this revision.
    ///
    /// Only the object itself is freed; objects it references stay in place.
    pub fn delete_object(&mut self, id: ObjectId) -> Result<()> {
        if self.entries.contains_key(&id.0) {
            return Err(PdfToolError::DuplicateObject(id));
        }
        self.entries.insert(
            id.0,
            XrefEntry::Free {
                generation: id.1.saturating_add(1),
            },
        );
        log::debug!("freed object {} {} R", id.0, id.1);
        Ok(())
    }

    /// Write a stream object, compressing it first when enabled and not already filtered
    pub fn write_stream(
        &mut self,
        id: Option<ObjectId>,
        mut dict: Dictionary,
        content: Vec<u8>,
    ) -> Result<ObjectId> {
        let content = if self.options.compress_streams && !dict.has(b"Filter") {
            dict.set("Filter", Object::Name(b"FlateDecode".to_vec()));
            compress(&content)?
        } else {
            content
        };
        self.write_new_object(id, &Object::Stream(Stream::new(dict, content)))
    }

    /// Start a new page with the given MediaBox
    pub fn create_page(&mut self, media_box: [f64; 4]) -> Page {
        let id = self.allocate_object_id();
        Page::new(id, media_box)
    }

    /// Write a content stream and append it to `page`'s Contents
    pub fn add_page_content(&mut self, page: &mut Page, content: Vec<u8>) -> Result<ObjectId> {
        let id = self.write_new_object(
            None,
            &Object::Stream(Stream::new(Dictionary::new(), content)),
        )?;
        page.push_content(id);
        Ok(id)
    }

    /// Finalize `page` and add it to the page tree
    pub fn write_page(&mut self, page: Page) -> Result<ObjectId> {
        let (id, dict) = page.into_dictionary();
        self.write_page_dictionary(id, dict)
    }

    /// Add a prepared page dictionary to the page tree (new documents only)
    pub fn write_page_dictionary(&mut self, id: ObjectId, mut dict: Dictionary) -> Result<ObjectId> {
        let pages_root = match &mut self.mode {
            WriteMode::New { pages_root, kids } => {
                kids.push(id);
                *pages_root
            }
            WriteMode::Modify { .. } => {
                return Err(PdfToolError::Usage(
                    "pages can only be added to a new document".to_string(),
                ))
            }
        };
        dict.set("Type", Object::Name(b"Page".to_vec()));
        dict.set("Parent", Object::Reference(pages_root));
        self.emit(id, &Object::Dictionary(dict))?;
        log::debug!("wrote page {} {} R", id.0, id.1);
        Ok(id)
    }

    /// Write the page tree (new documents), the xref section and the trailer.
    ///
    /// Consumes the writer and hands back the underlying output.
    pub fn end(mut self) -> Result<W> {
        let modifying = self.is_modifying();
        let trailer = match std::mem::replace(
            &mut self.mode,
            WriteMode::New {
                pages_root: (0, 0),
                kids: Vec::new(),
            },
        ) {
            WriteMode::New { pages_root, kids } => {
                let mut pages = Dictionary::new();
                pages.set("Type", Object::Name(b"Pages".to_vec()));
                pages.set("Count", Object::Integer(kids.len() as i64));
                pages.set(
                    "Kids",
                    Object::Array(kids.into_iter().map(Object::Reference).collect()),
                );
                self.emit(pages_root, &Object::Dictionary(pages))?;

                let mut catalog = Dictionary::new();
                catalog.set("Type", Object::Name(b"Catalog".to_vec()));
                catalog.set("Pages", Object::Reference(pages_root));
                let catalog_id = self.write_new_object(None, &Object::Dictionary(catalog))?;

                let mut trailer = Dictionary::new();
                trailer.set("Size", Object::Integer(self.next_number as i64));
                trailer.set("Root", Object::Reference(catalog_id));
                trailer
            }
            WriteMode::Modify {
                prev_xref,
                prev_size,
                trailer: preserved,
            } => {
                let mut trailer = Dictionary::new();
                let size = self.next_number.max(prev_size);
                trailer.set("Size", Object::Integer(size as i64));
                for (key, value) in preserved.iter() {
                    trailer.set(key.clone(), value.clone());
                }
                trailer.set("Prev", Object::Integer(prev_xref as i64));
                trailer
            }
        };

        let xref_offset = self.out.position();
        self.write_xref(modifying)?;
        self.out.write_all(b"trailer\n")?;
        write_dictionary(&mut self.out, &trailer)?;
        write!(self.out, "\nstartxref\n{}\n%%EOF\n", xref_offset)?;
        self.out.flush()?;
        log::debug!("wrote {} xref entries at {}", self.entries.len(), xref_offset);
        Ok(self.out.inner)
    }

    fn emit(&mut self, id: ObjectId, object: &Object) -> Result<()> {
        if self.entries.contains_key(&id.0) {
            return Err(PdfToolError::DuplicateObject(id));
        }
        let offset = self.out.position();
        write!(self.out, "{} {} obj\n", id.0, id.1)?;
        write_object(&mut self.out, object)?;
        self.out.write_all(b"\nendobj\n")?;
        self.entries.insert(
            id.0,
            XrefEntry::InUse {
                offset,
                generation: id.1,
            },
        );
        if id.0 >= self.next_number {
            self.next_number = id.0 + 1;
        }
        Ok(())
    }

    /// Incremental sections carry only the entries of this revision; a new
    /// file also gets the head of the free list at object 0.
    fn write_xref(&mut self, modifying: bool) -> Result<()> {
        let mut entries: Vec<(u32, XrefEntry)> =
            self.entries.iter().map(|(n, e)| (*n, *e)).collect();
        if !modifying {
            entries.insert(0, (0, XrefEntry::Free { generation: 65535 }));
        }
        let free: Vec<u32> = entries
            .iter()
            .filter(|(n, e)| *n != 0 && matches!(e, XrefEntry::Free { .. }))
            .map(|(n, _)| *n)
            .collect();
        let next_free = |number: u32| free.iter().copied().find(|n| *n > number).unwrap_or(0);

        self.out.write_all(b"xref\n")?;
        let mut start = 0;
        while start < entries.len() {
            let mut end = start + 1;
            while end < entries.len() && entries[end].0 == entries[end - 1].0 + 1 {
                end += 1;
            }
            write!(self.out, "{} {}\n", entries[start].0, end - start)?;
            for (number, entry) in &entries[start..end] {
                match entry {
                    XrefEntry::InUse { offset, generation } => {
                        write!(self.out, "{:010} {:05} n \n", offset, generation)?
                    }
                    XrefEntry::Free { generation } => {
                        write!(self.out, "{:010} {:05} f \n", next_free(*number), generation)?
                    }
                }
            }
            start = end;
        }
        Ok(())
    }
}

/// Serialize one object in PDF syntax
pub fn write_object<W: Write>(out: &mut W, object: &Object) -> Result<()> {
    match object {
        Object::Null => out.write_all(b"null")?,
        Object::Boolean(b) => out.write_all(if *b { b"true" } else { b"false" })?,
        Object::Integer(i) => write!(out, "{}", i)?,
        Object::Real(f) => out.write_all(format_number(*f as f64).as_bytes())?,
        Object::Name(name) => write_name(out, name)?,
        Object::String(bytes, StringFormat::Literal) => write_literal_string(out, bytes)?,
        Object::String(bytes, StringFormat::Hexadecimal) => {
            out.write_all(b"<")?;
            for b in bytes {
                write!(out, "{:02X}", b)?;
            }
            out.write_all(b">")?;
        }
        Object::Array(items) => {
            out.write_all(b"[")?;
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.write_all(b" ")?;
                }
                write_object(out, item)?;
            }
            out.write_all(b"]")?;
        }
        Object::Dictionary(dict) => write_dictionary(out, dict)?,
        Object::Stream(stream) => {
            let mut dict = stream.dict.clone();
            dict.set("Length", Object::Integer(stream.content.len() as i64));
            write_dictionary(out, &dict)?;
            out.write_all(b"\nstream\n")?;
            out.write_all(&stream.content)?;
            out.write_all(b"\nendstream")?;
        }
        Object::Reference(id) => write!(out, "{} {} R", id.0, id.1)?,
    }
    Ok(())
}

fn write_dictionary<W: Write>(out: &mut W, dict: &Dictionary) -> Result<()> {
    out.write_all(b"<<")?;
    for (key, value) in dict.iter() {
        write_name(out, key)?;
        out.write_all(b" ")?;
        write_object(out, value)?;
        out.write_all(b"\n")?;
    }
    out.write_all(b">>")?;
    Ok(())
}

fn write_name<W: Write>(out: &mut W, name: &[u8]) -> Result<()> {
    out.write_all(b"/")?;
    for &b in name {
        let delimiter = matches!(
            b,
            b'(' | b')' | b'<' | b'>' | b'[' | b']' | b'{' | b'}' | b'/' | b'%' | b'#'
        );
        if (0x21..=0x7E).contains(&b) && !delimiter {
            out.write_all(&[b])?;
        } else {
            write!(out, "#{:02X}", b)?;
        }
    }
    Ok(())
}

fn write_literal_string<W: Write>(out: &mut W, bytes: &[u8]) -> Result<()> {
    out.write_all(b"(")?;
    for &b in bytes {
        match b {
            b'(' | b')' | b'\\' => out.write_all(&[b'\\', b])?,
            b'\r' => out.write_all(b"\\r")?,
            b'\n' => out.write_all(b"\\n")?,
            _ => out.write_all(&[b])?,
        }
    }
    out.write_all(b")")?;
    Ok(())
}

/// Bytes as a parenthesised, escaped literal string for content streams
pub fn literal_string(bytes: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(bytes.len() + 2);
    // Writing into a Vec cannot fail
    let _ = write_literal_string(&mut out, bytes);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::tests::create_nested_pdf;
    use lopdf::Document;

    fn serialize(object: &Object) -> String {
        let mut out = Vec::new();
        write_object(&mut out, object).unwrap();
        String::from_utf8_lossy(&out).to_string()
    }

    #[test]
    fn test_serializes_scalars() {
        assert_eq!(serialize(&Object::Real(0.5)), "0.5");
        assert_eq!(serialize(&Object::Name(b"A B#".to_vec())), "/A#20B#23");
        assert_eq!(
            serialize(&Object::String(b"a(b)\\".to_vec(), StringFormat::Literal)),
            "(a\\(b\\)\\\\)"
        );
        assert_eq!(
            serialize(&Object::String(vec![0xFE, 0xFF], StringFormat::Hexadecimal)),
            "<FEFF>"
        );
        assert_eq!(serialize(&Object::Reference((12, 3))), "12 3 R");
    }

    #[test]
    fn test_new_document_round_trips_through_lopdf() {
        let mut writer = DocumentWriter::new(Vec::new(), WriterOptions::default()).unwrap();
        for _ in 0..2 {
            let mut page = writer.create_page([0.0, 0.0, 200.0, 100.0]);
            writer
                .add_page_content(&mut page, b"0 0 10 10 re f".to_vec())
                .unwrap();
            writer.write_page(page).unwrap();
        }
        let bytes = writer.end().unwrap();

        assert!(bytes.starts_with(b"%PDF-1.7"));
        let doc = Document::load_mem(&bytes).unwrap();
        assert_eq!(doc.get_pages().len(), 2);
        assert!(doc.trailer.get(b"Prev").is_err());
    }

    #[test]
    fn test_xref_entries_are_twenty_bytes() {
        let writer = DocumentWriter::new(Vec::new(), WriterOptions::default()).unwrap();
        let bytes = writer.end().unwrap();
        let text = String::from_utf8_lossy(&bytes).to_string();
        let xref = text.split("xref\n").nth(1).unwrap();
        let mut lines = xref.split_inclusive('\n');
        assert_eq!(lines.next().unwrap(), "0 3\n");
        for line in lines.take(3) {
            assert_eq!(line.len(), 20);
        }
    }

    #[test]
    fn test_incremental_update_preserves_original_bytes() {
        let original = create_nested_pdf(2);
        let reader = DocumentReader::from_bytes(original.clone()).unwrap();
        let catalog_id = reader.catalog_id().unwrap();
        let mut catalog = reader.catalog().unwrap().clone();
        catalog.set("Lang", Object::string_literal("en"));

        let mut writer = DocumentWriter::modify(&reader, Vec::new(), WriterOptions::default()).unwrap();
        let added = writer
            .write_new_object(None, &Object::Integer(7))
            .unwrap();
        writer
            .write_modified_object(catalog_id, &Object::Dictionary(catalog))
            .unwrap();
        let bytes = writer.end().unwrap();

        assert_eq!(&bytes[..original.len()], original.as_slice());
        assert!(added.0 >= reader.next_object_number());

        let appended = String::from_utf8_lossy(&bytes[original.len()..]).to_string();
        let trailer = &appended[appended.find("trailer").unwrap()..];
        assert!(trailer.contains(&format!("/Prev {}", reader.last_xref_offset())));
        assert!(!appended.contains("\nxref\n0 1\n"));

        let updated = DocumentReader::from_bytes(bytes).unwrap();
        assert_eq!(updated.pages_count(), 2);
        assert!(updated.catalog().unwrap().has(b"Lang"));
        assert_eq!(updated.parse_new_object(added).unwrap(), &Object::Integer(7));
    }

    #[test]
    fn test_duplicate_object_is_rejected() {
        let mut writer = DocumentWriter::new(Vec::new(), WriterOptions::default()).unwrap();
        let id = writer.write_new_object(None, &Object::Null).unwrap();
        assert!(matches!(
            writer.write_modified_object(id, &Object::Null),
            Err(PdfToolError::DuplicateObject(_))
        ));
    }

    #[test]
    fn test_pages_cannot_be_added_in_modify_mode() {
        let reader = DocumentReader::from_bytes(create_nested_pdf(1)).unwrap();
        let mut writer = DocumentWriter::modify(&reader, Vec::new(), WriterOptions::default()).unwrap();
        let page = writer.create_page([0.0, 0.0, 10.0, 10.0]);
        assert!(writer.write_page(page).is_err());
    }

    #[test]
    fn test_deleted_object_is_free_in_update() {
        let reader = DocumentReader::from_bytes(create_nested_pdf(1)).unwrap();
        let content_id = reader
            .content_stream_ids(&reader.parse_page(0).unwrap().dict)
            .unwrap()[0];
        let mut writer = DocumentWriter::modify(&reader, Vec::new(), WriterOptions::default()).unwrap();
        writer.delete_object(content_id).unwrap();
        let bytes = writer.end().unwrap();
        let text = String::from_utf8_lossy(&bytes).to_string();
        let section = &text[text.rfind("\nxref\n").unwrap() + 6..];
        assert!(section.starts_with(&format!("{} 1\n0000000000 00001 f \n", content_id.0)));
    }

    #[test]
    fn test_freed_objects_are_chained() {
        let reader = DocumentReader::from_bytes(create_nested_pdf(2)).unwrap();
        let ids = reader
            .content_stream_ids(&reader.parse_page(0).unwrap().dict)
            .unwrap();
        let first = ids[0];
        let second = reader
            .content_stream_ids(&reader.parse_page(1).unwrap().dict)
            .unwrap()[0];
        let (low, high) = if first.0 < second.0 { (first, second) } else { (second, first) };

        let mut writer = DocumentWriter::modify(&reader, Vec::new(), WriterOptions::default()).unwrap();
        writer.delete_object(high).unwrap();
        writer.delete_object(low).unwrap();
        let bytes = writer.end().unwrap();
        let text = String::from_utf8_lossy(&bytes).to_string();
        let section = &text[text.rfind("\nxref\n").unwrap() + 6..];
        assert!(section.contains(&format!("{:010} 00001 f \n", high.0)));
        assert!(section.contains("0000000000 00001 f \n"));
        assert!(!section.starts_with("0 1\n"));
    }
}
