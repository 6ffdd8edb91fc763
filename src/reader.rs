//! Document reader
//!
//! Wraps a parsed lopdf `Document` together with its raw bytes, the offset of
//! the last cross-reference section and the page list in page-tree order.

use crate::error::{PdfToolError, Result};
use crate::object::{as_number, decode_stream, Dictionary, Object, ObjectId, Resolver};
use lopdf::Document;
use std::collections::{HashMap, HashSet};
use std::path::Path;

/// Default page size when no MediaBox can be found (US Letter)
pub const DEFAULT_MEDIA_BOX: [f64; 4] = [0.0, 0.0, 612.0, 792.0];

/// How far from the end of the file `startxref` is searched for
const STARTXREF_WINDOW: usize = 1024;

/// Attributes a page may inherit from its ancestors
const INHERITABLE_PAGE_KEYS: [&[u8]; 4] = [b"Resources", b"MediaBox", b"CropBox", b"Rotate"];

/// A page with its inheritable attributes resolved
#[derive(Debug, Clone)]
pub struct PageInput {
    /// Object ID of the page dictionary
    pub id: ObjectId,
    /// The page dictionary as stored in the file
    pub dict: Dictionary,
    /// Effective MediaBox
    pub media_box: [f64; 4],
    /// Effective CropBox, if any
    pub crop_box: Option<Object>,
    /// Effective Rotate, if any
    pub rotate: Option<Object>,
    /// Effective resources, resolved to a dictionary
    pub resources: Dictionary,
}

/// Read access to an existing PDF
pub struct DocumentReader {
    document: Document,
    bytes: Vec<u8>,
    startxref: usize,
    pages: Vec<ObjectId>,
}

impl Resolver for DocumentReader {
    fn lookup(&self, id: ObjectId) -> Option<&Object> {
        self.document.objects.get(&id)
    }
}

impl DocumentReader {
    /// Read and parse a PDF file
    pub fn load(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        Self::from_bytes(bytes).map_err(|e| match e {
            PdfToolError::DocumentCorrupt(msg) => {
                PdfToolError::DocumentCorrupt(format!("{}: {}", path.display(), msg))
            }
            other => other,
        })
    }

    /// Parse a PDF held in memory
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self> {
        let startxref = locate_startxref(&bytes)?;
        let mut document = Document::load_mem(&bytes)
            .map_err(|e| PdfToolError::DocumentCorrupt(e.to_string()))?;

        let freed = freed_object_numbers(&bytes, startxref);
        if !freed.is_empty() {
            log::debug!("dropping {} objects freed by later revisions", freed.len());
            document.objects.retain(|(number, _), _| !freed.contains(number));
        }

        let mut reader = Self {
            document,
            bytes,
            startxref,
            pages: Vec::new(),
        };
        reader.catalog()?;
        reader.pages = reader.collect_pages()?;
        log::debug!(
            "parsed document: {} objects, {} pages, startxref {}",
            reader.document.objects.len(),
            reader.pages.len(),
            reader.startxref
        );
        Ok(reader)
    }

    /// The trailer of the most recent revision
    pub fn trailer(&self) -> &Dictionary {
        &self.document.trailer
    }

    /// The raw file bytes
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// The underlying parsed document
    pub fn document(&self) -> &Document {
        &self.document
    }

    /// Byte offset of the last cross-reference section
    pub fn last_xref_offset(&self) -> usize {
        self.startxref
    }

    /// First object number not used by any revision of the file
    pub fn next_object_number(&self) -> u32 {
        let size = match self.document.trailer.get(b"Size") {
            Ok(Object::Integer(n)) if *n > 0 => *n as u32,
            _ => 0,
        };
        let max_id = self
            .document
            .objects
            .keys()
            .map(|(n, _)| *n)
            .max()
            .unwrap_or(0)
            .max(self.document.max_id);
        size.max(max_id + 1)
    }

    /// Object ID of the document catalog
    pub fn catalog_id(&self) -> Result<ObjectId> {
        match self.document.trailer.get(b"Root") {
            Ok(Object::Reference(id)) => Ok(*id),
            Ok(_) => Err(PdfToolError::DocumentCorrupt(
                "trailer Root is not a reference".to_string(),
            )),
            Err(_) => Err(PdfToolError::DocumentCorrupt(
                "trailer has no Root".to_string(),
            )),
        }
    }

    /// The document catalog
    pub fn catalog(&self) -> Result<&Dictionary> {
        let id = self.catalog_id()?;
        match self.lookup(id) {
            Some(Object::Dictionary(dict)) => Ok(dict),
            _ => Err(PdfToolError::DocumentCorrupt(
                "Root does not point at a dictionary".to_string(),
            )),
        }
    }

    /// The interactive form dictionary
    pub fn acroform(&self) -> Result<&Dictionary> {
        let catalog = self.catalog()?;
        match self.query_opt(catalog, b"AcroForm") {
            Some(Object::Dictionary(dict)) => Ok(dict),
            _ => Err(PdfToolError::NoAcroForm),
        }
    }

    /// Whether the catalog carries an AcroForm entry
    pub fn has_acroform(&self) -> bool {
        self.catalog().map(|c| c.has(b"AcroForm")).unwrap_or(false)
    }

    pub fn pages_count(&self) -> usize {
        self.pages.len()
    }

    /// Object ID of the page at `index`
    pub fn page_object_id(&self, index: usize) -> Result<ObjectId> {
        self.pages
            .get(index)
            .copied()
            .ok_or(PdfToolError::PageOutOfRange {
                index,
                count: self.pages.len(),
            })
    }

    /// Map from page object ID to zero-based page index
    pub fn page_map(&self) -> HashMap<ObjectId, usize> {
        self.pages
            .iter()
            .enumerate()
            .map(|(index, id)| (*id, index))
            .collect()
    }

    /// Parse the page at `index`, resolving inherited attributes
    pub fn parse_page(&self, index: usize) -> Result<PageInput> {
        let id = self.page_object_id(index)?;
        let dict = match self.parse_new_object(id)? {
            Object::Dictionary(dict) => dict.clone(),
            _ => {
                return Err(PdfToolError::DocumentCorrupt(format!(
                    "page {} is not a dictionary",
                    index
                )))
            }
        };

        let mut inherited: HashMap<&[u8], Object> = HashMap::new();
        let mut node = Some(&dict);
        let mut seen = HashSet::new();
        while let Some(current) = node {
            for key in INHERITABLE_PAGE_KEYS {
                if !inherited.contains_key(key) {
                    if let Some(value) = self.query_opt(current, key) {
                        inherited.insert(key, value.clone());
                    }
                }
            }
            node = match current.get(b"Parent") {
                Ok(Object::Reference(parent)) if seen.insert(*parent) => match self.lookup(*parent)
                {
                    Some(Object::Dictionary(parent_dict)) => Some(parent_dict),
                    _ => None,
                },
                _ => None,
            };
        }

        let media_box = match inherited.get(b"MediaBox".as_slice()) {
            Some(Object::Array(items)) if items.len() == 4 => {
                let mut rect = DEFAULT_MEDIA_BOX;
                for (slot, item) in rect.iter_mut().zip(items) {
                    if let Some(v) = self.resolve(item).ok().and_then(as_number) {
                        *slot = v;
                    }
                }
                rect
            }
            _ => DEFAULT_MEDIA_BOX,
        };
        let resources = match inherited.remove(b"Resources".as_slice()) {
            Some(Object::Dictionary(res)) => res,
            _ => Dictionary::new(),
        };

        Ok(PageInput {
            id,
            dict,
            media_box,
            crop_box: inherited.remove(b"CropBox".as_slice()),
            rotate: inherited.remove(b"Rotate".as_slice()),
            resources,
        })
    }

    /// Resolve `dict[key]`, following references
    pub fn query_dictionary_object<'a>(
        &'a self,
        dict: &'a Dictionary,
        key: &[u8],
    ) -> Result<&'a Object> {
        self.query(dict, key)
    }

    /// Resolve `array[index]`, following references
    pub fn query_array_object<'a>(&'a self, array: &'a [Object], index: usize) -> Result<&'a Object> {
        let item = array.get(index).ok_or_else(|| {
            PdfToolError::MissingKey(format!("array index {}", index))
        })?;
        self.resolve(item)
    }

    /// Fetch an object by ID, outside any dictionary context
    pub fn parse_new_object(&self, id: ObjectId) -> Result<&Object> {
        self.lookup(id).ok_or(PdfToolError::MissingObject(id))
    }

    /// Decoded content of the page at `index`, streams joined by newlines
    pub fn page_content(&self, index: usize) -> Result<Vec<u8>> {
        let page = self.parse_page(index)?;
        let mut combined = Vec::new();
        for stream_id in self.content_stream_ids(&page.dict)? {
            if let Object::Stream(stream) = self.parse_new_object(stream_id)? {
                combined.extend(decode_stream(stream)?);
                combined.push(b'\n');
            }
        }
        Ok(combined)
    }

    /// Object IDs of a page's content streams, in drawing order
    pub fn content_stream_ids(&self, page: &Dictionary) -> Result<Vec<ObjectId>> {
        let contents = match page.get(b"Contents") {
            Ok(contents) => contents,
            Err(_) => return Ok(Vec::new()),
        };
        let items: Vec<Object> = match contents {
            Object::Reference(id) => match self.parse_new_object(*id)? {
                Object::Array(items) => items.clone(),
                _ => vec![Object::Reference(*id)],
            },
            Object::Array(items) => items.clone(),
            _ => Vec::new(),
        };
        Ok(items
            .into_iter()
            .filter_map(|item| match item {
                Object::Reference(id) => Some(id),
                _ => None,
            })
            .collect())
    }

    /// Walk the page tree from `Root -> Pages`
    fn collect_pages(&self) -> Result<Vec<ObjectId>> {
        let catalog = self.catalog()?;
        let root = match catalog.get(b"Pages") {
            Ok(Object::Reference(id)) => *id,
            _ => {
                return Err(PdfToolError::DocumentCorrupt(
                    "catalog has no Pages reference".to_string(),
                ))
            }
        };
        let mut pages = Vec::new();
        let mut visited = HashSet::new();
        self.walk_page_tree(root, &mut pages, &mut visited);
        Ok(pages)
    }

    fn walk_page_tree(
        &self,
        node_id: ObjectId,
        pages: &mut Vec<ObjectId>,
        visited: &mut HashSet<ObjectId>,
    ) {
        if !visited.insert(node_id) {
            log::warn!("page tree loops back to {} {} R", node_id.0, node_id.1);
            return;
        }
        let node = match self.lookup(node_id) {
            Some(Object::Dictionary(dict)) => dict,
            _ => return,
        };
        let node_type: &[u8] = match node.get(b"Type") {
            Ok(Object::Name(name)) => name,
            _ => &[],
        };
        match node_type {
            b"Page" => pages.push(node_id),
            b"Pages" | b"" => {
                let kids = match kids_of(self, node) {
                    Some(kids) => kids,
                    None if node_type.is_empty() => {
                        pages.push(node_id);
                        return;
                    }
                    None => return,
                };
                for kid in kids {
                    if let Object::Reference(kid_id) = kid {
                        self.walk_page_tree(*kid_id, pages, visited);
                    }
                }
            }
            _ => {}
        }
    }
}

fn kids_of<'a>(reader: &'a DocumentReader, node: &'a Dictionary) -> Option<&'a Vec<Object>> {
    match reader.query_opt(node, b"Kids") {
        Some(Object::Array(kids)) => Some(kids),
        _ => None,
    }
}

/// Find the byte offset recorded after the last `startxref` keyword
fn locate_startxref(bytes: &[u8]) -> Result<usize> {
    let window_start = bytes.len().saturating_sub(STARTXREF_WINDOW);
    let tail = &bytes[window_start..];
    let keyword = b"startxref";
    let position = tail
        .windows(keyword.len())
        .rposition(|w| w == keyword)
        .ok_or_else(|| PdfToolError::DocumentCorrupt("startxref not found".to_string()))?;

    let digits: String = tail[position + keyword.len()..]
        .iter()
        .skip_while(|b| b.is_ascii_whitespace())
        .take_while(|b| b.is_ascii_digit())
        .map(|b| *b as char)
        .collect();
    digits
        .parse()
        .map_err(|_| PdfToolError::DocumentCorrupt("startxref offset unreadable".to_string()))
}

/// Object numbers whose newest cross-reference entry is free.
///
/// Walks the `Prev` chain of classic xref tables from the newest section
/// back; the first entry seen for a number wins. The walk stops at the first
/// section that is not a table, since lopdf already resolved those.
fn freed_object_numbers(bytes: &[u8], startxref: usize) -> HashSet<u32> {
    let mut seen = HashSet::new();
    let mut freed = HashSet::new();
    let mut visited = HashSet::new();
    let mut offset = Some(startxref);

    while let Some(at) = offset {
        if !visited.insert(at) {
            break;
        }
        let table = match parse_xref_table(bytes, at) {
            Some(table) => table,
            None => break,
        };
        for (number, is_free) in table.entries {
            if seen.insert(number) && is_free && number != 0 {
                freed.insert(number);
            }
        }
        offset = table.prev;
    }
    freed
}

struct XrefTable {
    /// (object number, entry is free)
    entries: Vec<(u32, bool)>,
    prev: Option<usize>,
}

fn parse_xref_table(bytes: &[u8], at: usize) -> Option<XrefTable> {
    let mut tokens = Tokens::new(bytes, at);
    if tokens.next_token()? != b"xref" {
        return None;
    }
    let mut entries = Vec::new();
    loop {
        let token = tokens.next_token()?;
        if token == b"trailer" {
            break;
        }
        let start: u32 = parse_ascii(token)?;
        let count: u32 = parse_ascii(tokens.next_token()?)?;
        for i in 0..count {
            tokens.next_token()?;
            tokens.next_token()?;
            let kind = tokens.next_token()?;
            entries.push((start.checked_add(i)?, kind == b"f"));
        }
    }

    let trailer_start = tokens.pos;
    let trailer_end = find(bytes, trailer_start, b"startxref").unwrap_or(bytes.len());
    let trailer = &bytes[..trailer_end];
    let prev = find(trailer, trailer_start, b"/Prev")
        .and_then(|p| Tokens::new(trailer, p + 5).next_token())
        .and_then(parse_ascii);
    Some(XrefTable { entries, prev })
}

/// Whitespace and delimiter separated tokens, enough for xref tables
struct Tokens<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Tokens<'a> {
    fn new(bytes: &'a [u8], pos: usize) -> Self {
        Self { bytes, pos }
    }

    fn next_token(&mut self) -> Option<&'a [u8]> {
        let bytes = self.bytes;
        while self.pos < bytes.len() && is_whitespace(bytes[self.pos]) {
            self.pos += 1;
        }
        let start = self.pos;
        while self.pos < bytes.len()
            && !is_whitespace(bytes[self.pos])
            && !b"<>[]()/%".contains(&bytes[self.pos])
        {
            self.pos += 1;
        }
        if self.pos == start {
            None
        } else {
            Some(&bytes[start..self.pos])
        }
    }
}

fn is_whitespace(b: u8) -> bool {
    matches!(b, b' ' | b'\t' | b'\r' | b'\n' | b'\x0c' | 0)
}

fn parse_ascii<T: std::str::FromStr>(token: &[u8]) -> Option<T> {
    std::str::from_utf8(token).ok()?.parse().ok()
}

fn find(bytes: &[u8], from: usize, needle: &[u8]) -> Option<usize> {
    bytes
        .get(from..)?
        .windows(needle.len())
        .position(|w| w == needle)
        .map(|p| p + from)
}
