//! Page composition
//!
//! `Page` builds a fresh page for a new document. `PageModifier` overlays new
//! content on an existing page during an incremental update: the original
//! content is wrapped in `q`/`Q` so its graphics state cannot leak into the
//! overlay, and the page's resources are made explicit before new names are
//! added.

use crate::content::ContentComposer;
use crate::error::Result;
use crate::object::{rectangle, Dictionary, Object, ObjectId, Resolver, Stream};
use crate::reader::DocumentReader;
use crate::writer::DocumentWriter;
use std::io::Write;

/// A page being assembled for a new document
#[derive(Debug, Clone)]
pub struct Page {
    id: ObjectId,
    media_box: [f64; 4],
    resources: Dictionary,
    contents: Vec<ObjectId>,
    attributes: Dictionary,
}

impl Page {
    pub(crate) fn new(id: ObjectId, media_box: [f64; 4]) -> Self {
        Self {
            id,
            media_box,
            resources: Dictionary::new(),
            contents: Vec::new(),
            attributes: Dictionary::new(),
        }
    }

    pub fn id(&self) -> ObjectId {
        self.id
    }

    pub fn media_box(&self) -> [f64; 4] {
        self.media_box
    }

    pub fn resources(&self) -> &Dictionary {
        &self.resources
    }

    pub fn resources_mut(&mut self) -> &mut Dictionary {
        &mut self.resources
    }

    /// Set an extra page attribute such as `CropBox` or `Rotate`
    pub fn set_attribute(&mut self, key: &str, value: Object) {
        self.attributes.set(key, value);
    }

    /// Register a resource under a fresh name and return the name
    pub fn add_resource(&mut self, category: &str, prefix: &str, value: Object) -> String {
        add_named_resource(&mut self.resources, category, prefix, value)
    }

    pub(crate) fn push_content(&mut self, id: ObjectId) {
        self.contents.push(id);
    }

    pub(crate) fn into_dictionary(self) -> (ObjectId, Dictionary) {
        let mut dict = Dictionary::new();
        dict.set("Type", Object::Name(b"Page".to_vec()));
        dict.set("MediaBox", rectangle(self.media_box));
        for (key, value) in self.attributes.iter() {
            dict.set(key.clone(), value.clone());
        }
        dict.set("Resources", Object::Dictionary(self.resources));
        match self.contents.len() {
            0 => {}
            1 => dict.set("Contents", Object::Reference(self.contents[0])),
            _ => dict.set(
                "Contents",
                Object::Array(self.contents.into_iter().map(Object::Reference).collect()),
            ),
        }
        (self.id, dict)
    }
}

/// Insert `value` into `resources[category]` under an unused name built from `prefix`.
///
/// The category entry must already be an inline dictionary, or absent.
pub fn add_named_resource(
    resources: &mut Dictionary,
    category: &str,
    prefix: &str,
    value: Object,
) -> String {
    let mut entries = match resources.remove(category.as_bytes()) {
        Some(Object::Dictionary(dict)) => dict,
        _ => Dictionary::new(),
    };
    let mut counter = 1;
    let name = loop {
        let candidate = format!("{}{}", prefix, counter);
        if !entries.has(candidate.as_bytes()) {
            break candidate;
        }
        counter += 1;
    };
    entries.set(name.clone(), value);
    resources.set(category, Object::Dictionary(entries));
    name
}

/// Draws on top of an existing page in modify mode
pub struct PageModifier {
    page_id: ObjectId,
    page: Dictionary,
    media_box: [f64; 4],
    resources: Dictionary,
    content: ContentComposer,
}

impl PageModifier {
    /// Prepare page `index` of `reader` for overlay drawing
    pub fn new(reader: &DocumentReader, index: usize) -> Result<Self> {
        let input = reader.parse_page(index)?;

        // Resource categories become inline dictionaries so new names never
        // touch objects shared with other pages.
        let mut resources = Dictionary::new();
        for (key, value) in input.resources.iter() {
            let inline = match reader.resolve(value) {
                Ok(Object::Dictionary(dict)) => Object::Dictionary(dict.clone()),
                _ => value.clone(),
            };
            resources.set(key.clone(), inline);
        }

        Ok(Self {
            page_id: input.id,
            page: input.dict,
            media_box: input.media_box,
            resources,
            content: ContentComposer::new(),
        })
    }

    pub fn page_id(&self) -> ObjectId {
        self.page_id
    }

    pub fn media_box(&self) -> [f64; 4] {
        self.media_box
    }

    /// Register a resource under a fresh name and return the name
    pub fn add_resource(&mut self, category: &str, prefix: &str, value: Object) -> String {
        add_named_resource(&mut self.resources, category, prefix, value)
    }

    /// The overlay content being built
    pub fn content(&mut self) -> &mut ContentComposer {
        &mut self.content
    }

    /// Write the overlay streams and the rewritten page dictionary
    pub fn write<W: Write>(
        self,
        reader: &DocumentReader,
        writer: &mut DocumentWriter<W>,
    ) -> Result<()> {
        if self.content.is_empty() {
            return Ok(());
        }
        let original = reader.content_stream_ids(&self.page)?;

        let save_id = writer.write_new_object(
            None,
            &Object::Stream(Stream::new(Dictionary::new(), b"q\n".to_vec())),
        )?;
        let mut overlay = b"Q\n".to_vec();
        overlay.extend_from_slice(self.content.as_bytes());
        let overlay_id = writer.write_new_object(
            None,
            &Object::Stream(Stream::new(Dictionary::new(), overlay)),
        )?;

        let mut contents = vec![Object::Reference(save_id)];
        contents.extend(original.into_iter().map(Object::Reference));
        contents.push(Object::Reference(overlay_id));

        let mut page = self.page;
        page.set("Contents", Object::Array(contents));
        page.set("Resources", Object::Dictionary(self.resources));
        writer.write_modified_object(self.page_id, &Object::Dictionary(page))?;
        log::debug!("overlaid page {} {} R", self.page_id.0, self.page_id.1);
        Ok(())
    }
}
