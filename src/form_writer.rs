//! AcroForm filling
//!
//! Rewrites the form of a document being updated incrementally. Every field
//! node reachable from `Fields` is written again; direct kid dictionaries
//! are promoted to indirect objects on the way. Fields named in the value
//! map get their value entries and appearances replaced, the rest are
//! copied through unchanged.

use crate::content::ContentComposer;
use crate::copying::CopyingContext;
use crate::error::{PdfToolError, Result};
use crate::form_reader::{
    appearance_names, is_widget, on_appearance_name, InheritedProperties, FLAG_PUSH_BUTTON,
    FLAG_RADIO, FLAG_RICH_TEXT, MAX_FIELD_DEPTH,
};
use crate::object::{
    as_number, encode_text, format_number, rectangle, text_string, to_text, Dictionary, Object,
    ObjectId, Resolver,
};
use crate::reader::DocumentReader;
use crate::writer::DocumentWriter;
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::io::Write;

/// Field values keyed by fully qualified field name
pub type FieldValues = HashMap<String, FieldInput>;

/// A value supplied for one field
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum FieldInput {
    Clear,
    Flag(bool),
    Index(usize),
    Text(String),
    Texts(Vec<String>),
    Rich { v: String, rv: String },
}

/// Target state of a checkbox or radio group
#[derive(Debug, Clone, PartialEq)]
enum ButtonState {
    Off,
    On,
    Kid(usize),
    Appearance(Vec<u8>),
}

impl FieldInput {
    fn is_set(&self) -> bool {
        match self {
            FieldInput::Clear => false,
            FieldInput::Flag(on) => *on,
            FieldInput::Index(i) => *i != 0,
            FieldInput::Text(s) => !s.is_empty() && s != "Off",
            FieldInput::Texts(items) => !items.is_empty(),
            FieldInput::Rich { .. } => true,
        }
    }

    fn checkbox_state(&self) -> ButtonState {
        if self.is_set() {
            ButtonState::On
        } else {
            ButtonState::Off
        }
    }

    fn radio_state(&self) -> ButtonState {
        match self {
            FieldInput::Index(i) => ButtonState::Kid(*i),
            FieldInput::Flag(true) => ButtonState::On,
            FieldInput::Text(s) if self.is_set() => ButtonState::Appearance(s.as_bytes().to_vec()),
            _ => ButtonState::Off,
        }
    }

    /// Plain and rich text; rich text defaults to the plain value
    fn text_value(&self) -> (String, String) {
        let plain = match self {
            FieldInput::Clear => String::new(),
            FieldInput::Flag(on) => on.to_string(),
            FieldInput::Index(i) => i.to_string(),
            FieldInput::Text(s) => s.clone(),
            FieldInput::Texts(items) => items.first().cloned().unwrap_or_default(),
            FieldInput::Rich { v, rv } => return (v.clone(), rv.clone()),
        };
        (plain.clone(), plain)
    }
}

/// A kid of a field node, once it has an object ID
enum KidReference {
    /// Already an indirect object in the source
    Existing(ObjectId),
    /// A direct dictionary given a fresh ID
    Pending { id: ObjectId, value: Dictionary },
}

impl KidReference {
    fn id(&self) -> ObjectId {
        match self {
            KidReference::Existing(id) => *id,
            KidReference::Pending { id, .. } => *id,
        }
    }

    fn dictionary<'s>(&'s self, reader: &'s DocumentReader) -> Option<&'s Dictionary> {
        match self {
            KidReference::Existing(id) => match reader.lookup(*id) {
                Some(Object::Dictionary(dict)) => Some(dict),
                _ => None,
            },
            KidReference::Pending { value, .. } => Some(value),
        }
    }
}

fn kid_array(kids: &[KidReference]) -> Object {
    Object::Array(kids.iter().map(|kid| Object::Reference(kid.id())).collect())
}

/// Fill the form of `reader`'s document into `writer`, which must be in modify mode
pub fn fill_form<W: Write>(
    reader: &DocumentReader,
    writer: &mut DocumentWriter<W>,
    values: &FieldValues,
) -> Result<()> {
    let catalog_id = reader.catalog_id()?;
    let catalog = reader.catalog()?;
    let acroform = reader.acroform()?;

    let mut filler = FormFiller {
        reader,
        writer,
        copier: CopyingContext::same_document(reader),
        values,
        written: HashSet::new(),
    };

    let acroform_id = match catalog.get(b"AcroForm") {
        Ok(Object::Reference(id)) => *id,
        _ => {
            // a direct form dictionary moves into its own object
            let id = filler.writer.allocate_object_id();
            let mut new_catalog = filler.copy_excluding(catalog, &[b"AcroForm"]);
            new_catalog.set("AcroForm", Object::Reference(id));
            filler.write(catalog_id, new_catalog)?;
            id
        }
    };
    filler.write_acroform(acroform_id, acroform)?;
    filler.copier.flush(filler.writer)
}

/// Rewrite the catalog without its AcroForm entry
pub fn remove_acroform<W: Write>(
    reader: &DocumentReader,
    writer: &mut DocumentWriter<W>,
) -> Result<()> {
    let catalog_id = reader.catalog_id()?;
    let catalog = reader.catalog()?;
    let mut copier = CopyingContext::same_document(reader);
    let stripped = copier.copy_dictionary_excluding(writer, catalog, &[b"AcroForm"]);
    writer.write_modified_object(catalog_id, &Object::Dictionary(stripped))?;
    copier.flush(writer)
}

struct FormFiller<'a, 'w, W: Write> {
    reader: &'a DocumentReader,
    writer: &'w mut DocumentWriter<W>,
    copier: CopyingContext<'a>,
    values: &'a FieldValues,
    written: HashSet<ObjectId>,
}

impl<W: Write> FormFiller<'_, '_, W> {
    fn copy_excluding(&mut self, dict: &Dictionary, excluded: &[&[u8]]) -> Dictionary {
        self.copier
            .copy_dictionary_excluding(self.writer, dict, excluded)
    }

    /// Write `dict` under `id`; an object reached twice is only written once
    fn write(&mut self, id: ObjectId, dict: Dictionary) -> Result<()> {
        if !self.written.insert(id) {
            log::warn!("field object {} {} R is shared, keeping first rewrite", id.0, id.1);
            return Ok(());
        }
        let object = Object::Dictionary(dict);
        if self.reader.lookup(id).is_some() {
            self.writer.write_modified_object(id, &object)
        } else {
            self.writer.write_new_object(Some(id), &object).map(|_| ())
        }
    }

    fn promote_kids(&mut self, kids: &[Object]) -> Vec<KidReference> {
        let mut promoted = Vec::with_capacity(kids.len());
        for kid in kids {
            match kid {
                Object::Reference(id) => promoted.push(KidReference::Existing(*id)),
                Object::Dictionary(dict) => promoted.push(KidReference::Pending {
                    id: self.writer.allocate_object_id(),
                    value: dict.clone(),
                }),
                other => log::warn!("dropping kid that is not a dictionary: {:?}", other),
            }
        }
        promoted
    }

    fn write_acroform(&mut self, id: ObjectId, acroform: &Dictionary) -> Result<()> {
        let reader = self.reader;
        let mut form = self.copy_excluding(acroform, &[b"Fields"]);
        let fields = match reader.query_opt(acroform, b"Fields") {
            Some(Object::Array(fields)) => fields,
            _ => return self.write(id, form),
        };
        let fields = self.promote_kids(fields);
        form.set("Fields", kid_array(&fields));
        self.write(id, form)?;

        let root = InheritedProperties::default();
        for field in &fields {
            if let Some(dict) = field.dictionary(reader) {
                self.write_filled_field(field.id(), dict, &root, "", 0)?;
            }
        }
        Ok(())
    }

    fn write_filled_field(
        &mut self,
        id: ObjectId,
        dict: &Dictionary,
        inherited: &InheritedProperties,
        base_name: &str,
        depth: usize,
    ) -> Result<()> {
        if depth > MAX_FIELD_DEPTH {
            return Err(PdfToolError::DocumentCorrupt(
                "field tree is too deep".to_string(),
            ));
        }
        let reader = self.reader;
        let values = self.values;
        let full_name = reader
            .query_opt(dict, b"T")
            .map(|t| format!("{}{}", base_name, to_text(t)));
        let kid_base = match &full_name {
            Some(full) => format!("{}.", full),
            None => base_name.to_string(),
        };

        match full_name.as_ref().and_then(|name| values.get(name)) {
            Some(value) => {
                log::debug!("filling field {}", full_name.as_deref().unwrap_or_default());
                self.update_field_with_value(id, dict, value, inherited, &kid_base, depth)
            }
            None => self.write_field_and_kids(id, dict, inherited, &kid_base, depth),
        }
    }

    fn write_field_and_kids(
        &mut self,
        id: ObjectId,
        dict: &Dictionary,
        inherited: &InheritedProperties,
        kid_base: &str,
        depth: usize,
    ) -> Result<()> {
        let reader = self.reader;
        let kids = match reader.query_opt(dict, b"Kids") {
            Some(Object::Array(kids)) => kids,
            _ => {
                let node = self.copy_excluding(dict, &[]);
                return self.write(id, node);
            }
        };
        let frame = inherited.merged_with(reader, dict);
        let kids = self.promote_kids(kids);
        let mut node = self.copy_excluding(dict, &[b"Kids"]);
        node.set("Kids", kid_array(&kids));
        self.write(id, node)?;

        for kid in &kids {
            if let Some(kid_dict) = kid.dictionary(reader) {
                self.write_filled_field(kid.id(), kid_dict, &frame, kid_base, depth + 1)?;
            }
        }
        Ok(())
    }

    fn update_field_with_value(
        &mut self,
        id: ObjectId,
        dict: &Dictionary,
        value: &FieldInput,
        inherited: &InheritedProperties,
        kid_base: &str,
        depth: usize,
    ) -> Result<()> {
        let reader = self.reader;
        let field_type = inherited.effective_type(reader, dict);
        let flags = inherited.effective_flags(reader, dict);

        match field_type.as_deref() {
            Some(b"Btn") if flags & FLAG_PUSH_BUTTON != 0 => {
                self.write_field_and_kids(id, dict, inherited, kid_base, depth)
            }
            Some(b"Btn") if flags & FLAG_RADIO != 0 => {
                self.update_option_button_value(id, dict, value.radio_state())
            }
            Some(b"Btn") => self.update_option_button_value(id, dict, value.checkbox_state()),
            Some(b"Tx") => {
                let (plain, rich) = value.text_value();
                let mut entries = vec![("V", text_string(&plain))];
                if flags & FLAG_RICH_TEXT != 0 {
                    entries.push(("RV", text_string(&rich)));
                }
                self.update_text_value(id, dict, entries, &plain, inherited)
            }
            Some(b"Ch") => {
                let (v, shown) = match value {
                    FieldInput::Texts(items) => (
                        Object::Array(items.iter().map(|item| text_string(item)).collect()),
                        items.first().cloned().unwrap_or_default(),
                    ),
                    other => {
                        let (plain, _) = other.text_value();
                        (text_string(&plain), plain)
                    }
                };
                self.update_text_value(id, dict, vec![("V", v)], &shown, inherited)
            }
            _ => self.write_field_and_kids(id, dict, inherited, kid_base, depth),
        }
    }

    fn update_option_button_value(
        &mut self,
        id: ObjectId,
        dict: &Dictionary,
        state: ButtonState,
    ) -> Result<()> {
        let reader = self.reader;
        let kids = match reader.query_opt(dict, b"Kids") {
            Some(Object::Array(kids)) if !is_widget(reader, dict) => kids,
            _ => {
                let name = match state {
                    ButtonState::Off => None,
                    ButtonState::On | ButtonState::Kid(0) => on_appearance_name(reader, dict)
                        .or_else(|| Some(b"Yes".to_vec())),
                    ButtonState::Kid(index) => {
                        log::warn!("option index {} is out of range", index);
                        None
                    }
                    ButtonState::Appearance(name) => Some(name),
                };
                let name = Object::Name(name.unwrap_or_else(|| b"Off".to_vec()));
                let mut node = self.copy_excluding(dict, &[b"V", b"AS"]);
                node.set("V", name.clone());
                node.set("AS", name);
                return self.write(id, node);
            }
        };

        let kids = self.promote_kids(kids);
        let selected = match &state {
            ButtonState::Off => None,
            ButtonState::On if !kids.is_empty() => Some(0),
            ButtonState::On => None,
            ButtonState::Kid(index) if *index < kids.len() => Some(*index),
            ButtonState::Kid(index) => {
                log::warn!("option index {} is out of range", index);
                None
            }
            ButtonState::Appearance(name) => {
                let found = kids.iter().position(|kid| {
                    kid.dictionary(reader)
                        .map(|d| appearance_names(reader, d).contains(name))
                        .unwrap_or(false)
                });
                if found.is_none() {
                    log::warn!("no option has appearance {}", String::from_utf8_lossy(name));
                }
                found
            }
        };
        let on_name = match (&state, selected) {
            (ButtonState::Appearance(name), Some(_)) => Some(name.clone()),
            (_, Some(index)) => kids[index]
                .dictionary(reader)
                .and_then(|d| on_appearance_name(reader, d)),
            (_, None) => None,
        };
        if selected.is_some() && on_name.is_none() {
            log::warn!("selected option has no on appearance");
        }
        let value = Object::Name(on_name.unwrap_or_else(|| b"Off".to_vec()));

        let mut node = self.copy_excluding(dict, &[b"V", b"Kids"]);
        node.set("V", value.clone());
        node.set("Kids", kid_array(&kids));
        self.write(id, node)?;

        for (index, kid) in kids.iter().enumerate() {
            let kid_dict = match kid.dictionary(reader) {
                Some(kid_dict) => kid_dict,
                None => continue,
            };
            let mut widget = self.copy_excluding(kid_dict, &[b"AS"]);
            if Some(index) == selected {
                widget.set("AS", value.clone());
            } else {
                widget.set("AS", Object::Name(b"Off".to_vec()));
            }
            self.write(kid.id(), widget)?;
        }
        Ok(())
    }

    /// Set value entries and give the field, or its first widget, a new appearance
    fn update_text_value(
        &mut self,
        id: ObjectId,
        dict: &Dictionary,
        entries: Vec<(&str, Object)>,
        shown: &str,
        inherited: &InheritedProperties,
    ) -> Result<()> {
        let reader = self.reader;
        let appearance = inherited.effective_appearance(reader, dict);
        let mut excluded: Vec<&[u8]> = entries.iter().map(|(key, _)| key.as_bytes()).collect();

        let kids = match reader.query_opt(dict, b"Kids") {
            Some(Object::Array(kids)) if !is_widget(reader, dict) => kids,
            _ => {
                excluded.push(b"AP");
                let mut node = self.copy_excluding(dict, &excluded);
                for (key, value) in entries {
                    node.set(key, value);
                }
                let appearance_id = self.writer.allocate_object_id();
                node.set("AP", normal_appearance(appearance_id));
                let size = widget_size(reader, dict);
                self.write(id, node)?;
                return self.write_appearance(appearance_id, size, appearance, shown);
            }
        };

        let kids = self.promote_kids(kids);
        excluded.push(b"Kids");
        let mut node = self.copy_excluding(dict, &excluded);
        for (key, value) in entries {
            node.set(key, value);
        }
        node.set("Kids", kid_array(&kids));
        self.write(id, node)?;

        for (index, kid) in kids.iter().enumerate() {
            let kid_dict = match kid.dictionary(reader) {
                Some(kid_dict) => kid_dict,
                None => continue,
            };
            if index > 0 {
                let widget = self.copy_excluding(kid_dict, &[]);
                self.write(kid.id(), widget)?;
                continue;
            }
            let mut widget = self.copy_excluding(kid_dict, &[b"AP"]);
            let appearance_id = self.writer.allocate_object_id();
            widget.set("AP", normal_appearance(appearance_id));
            let kid_appearance = match reader.query_opt(kid_dict, b"DA") {
                Some(Object::String(da, _)) => Some(da.clone()),
                _ => appearance.clone(),
            };
            let size = widget_size(reader, kid_dict);
            self.write(kid.id(), widget)?;
            self.write_appearance(appearance_id, size, kid_appearance, shown)?;
        }
        Ok(())
    }

    /// Form XObject showing `text` with the field's default appearance
    fn write_appearance(
        &mut self,
        id: ObjectId,
        (width, height): (f64, f64),
        default_appearance: Option<Vec<u8>>,
        text: &str,
    ) -> Result<()> {
        let reader = self.reader;
        let mut default_appearance = default_appearance;
        let mut font_size = default_appearance
            .as_deref()
            .and_then(font_size_of)
            .unwrap_or(0.0);
        if font_size <= 0.0 {
            if let Some(da) = &default_appearance {
                font_size = auto_font_size(height);
                default_appearance = Some(with_font_size(da, font_size));
            }
        }

        let mut content = ContentComposer::new();
        content.begin_marked_content("Tx").save_state().begin_text();
        if let Some(da) = &default_appearance {
            content.raw(da);
        }
        content
            .move_text(2.0, text_baseline(height, font_size))
            .show_text(&encode_text(text))
            .end_text()
            .restore_state()
            .end_marked_content();

        let mut dict = Dictionary::new();
        dict.set("Type", Object::Name(b"XObject".to_vec()));
        dict.set("Subtype", Object::Name(b"Form".to_vec()));
        dict.set("BBox", rectangle([0.0, 0.0, width, height]));
        let resources = match reader.acroform()?.get(b"DR") {
            Ok(dr) => match reader.resolve(dr) {
                Ok(Object::Dictionary(dr)) => Some(self.copy_excluding(dr, &[b"ProcSet"])),
                _ => None,
            },
            Err(_) => None,
        };
        if let Some(resources) = resources {
            dict.set("Resources", Object::Dictionary(resources));
        }
        self.writer.write_stream(Some(id), dict, content.into_bytes())?;
        Ok(())
    }
}

fn normal_appearance(id: ObjectId) -> Object {
    let mut ap = Dictionary::new();
    ap.set("N", Object::Reference(id));
    Object::Dictionary(ap)
}

/// Width and height of a widget's `Rect`, zero when absent
fn widget_size(reader: &DocumentReader, dict: &Dictionary) -> (f64, f64) {
    let values: Vec<f64> = match reader.query_opt(dict, b"Rect") {
        Some(Object::Array(items)) => items
            .iter()
            .filter_map(|item| reader.resolve(item).ok().and_then(as_number))
            .collect(),
        _ => Vec::new(),
    };
    match values.as_slice() {
        [x1, y1, x2, y2] => ((x2 - x1).abs(), (y2 - y1).abs()),
        _ => (0.0, 0.0),
    }
}

/// Operand of the `Tf` operator in a default appearance string
fn font_size_of(da: &[u8]) -> Option<f64> {
    let da = String::from_utf8_lossy(da);
    let tokens: Vec<&str> = da.split_whitespace().collect();
    let tf = tokens.iter().rposition(|token| *token == "Tf")?;
    tokens.get(tf.checked_sub(1)?)?.parse().ok()
}

/// Size used for an auto-sized (`0 Tf`) single line of text
fn auto_font_size(height: f64) -> f64 {
    ((height - 4.0) * 5.0 / 6.0).clamp(4.0, 12.0)
}

/// `da` with the `Tf` size operand replaced by `size`
fn with_font_size(da: &[u8], size: f64) -> Vec<u8> {
    let da = String::from_utf8_lossy(da);
    let mut tokens: Vec<String> = da.split_whitespace().map(str::to_string).collect();
    if let Some(tf) = tokens.iter().rposition(|token| token == "Tf") {
        if tf > 0 {
            tokens[tf - 1] = format_number(size);
        }
    }
    tokens.join(" ").into_bytes()
}

/// Baseline that vertically centres one line of `font_size` text in `height`
fn text_baseline(height: f64, font_size: f64) -> f64 {
    let size = if font_size > 0.0 { font_size } else { 12.0 };
    ((height - size) / 2.0 + size * 0.22).max(0.0)
}
