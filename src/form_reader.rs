//! AcroForm field reader
//!
//! Walks `Root -> AcroForm -> Fields` and produces one `FieldRecord` per
//! field node. `FT`, `Ff`, `DA` and `Opt` are inherited down through `Kids`
//! unless a node sets them itself.

use crate::error::{PdfToolError, Result};
use crate::object::{
    as_number, decode_stream, decode_text, exists, to_text, Dictionary, Object, ObjectId,
    Resolver,
};
use crate::reader::DocumentReader;
use serde::Serialize;
use std::collections::HashMap;

/// Push button flag, bit 17 (one-based)
pub const FLAG_PUSH_BUTTON: i64 = 1 << 16;
/// Radio flag, bit 16 (one-based)
pub const FLAG_RADIO: i64 = 1 << 15;
/// Rich text flag, bit 26 (one-based)
pub const FLAG_RICH_TEXT: i64 = 1 << 25;
/// File select flag, bit 21 (one-based)
pub const FLAG_FILE_SELECT: i64 = 1 << 20;
/// No export flag, bit 3 (one-based)
pub const FLAG_NO_EXPORT: i64 = 1 << 2;

/// Deeper field trees than this are treated as cycles
pub(crate) const MAX_FIELD_DEPTH: usize = 64;

/// Field attributes inherited from ancestor nodes
#[derive(Debug, Clone, Default)]
pub struct InheritedProperties {
    pub field_type: Option<Vec<u8>>,
    pub flags: Option<i64>,
    pub default_appearance: Option<Vec<u8>>,
    pub options: Option<Vec<Object>>,
}

impl InheritedProperties {
    /// This frame overridden by whatever `dict` sets itself
    pub fn merged_with<R: Resolver + ?Sized>(&self, r: &R, dict: &Dictionary) -> Self {
        let mut merged = self.clone();
        if let Some(Object::Name(ft)) = r.query_opt(dict, b"FT") {
            merged.field_type = Some(ft.clone());
        }
        if let Some(ff) = r.query_opt(dict, b"Ff").and_then(as_number) {
            merged.flags = Some(ff as i64);
        }
        if let Some(Object::String(da, _)) = r.query_opt(dict, b"DA") {
            merged.default_appearance = Some(da.clone());
        }
        if let Some(Object::Array(opt)) = r.query_opt(dict, b"Opt") {
            merged.options = Some(opt.clone());
        }
        merged
    }

    /// The node's own `FT`, else the inherited one
    pub fn effective_type<R: Resolver + ?Sized>(&self, r: &R, dict: &Dictionary) -> Option<Vec<u8>> {
        match r.query_opt(dict, b"FT") {
            Some(Object::Name(ft)) => Some(ft.clone()),
            _ => self.field_type.clone(),
        }
    }

    /// The node's own `Ff`, else the inherited one, else 0
    pub fn effective_flags<R: Resolver + ?Sized>(&self, r: &R, dict: &Dictionary) -> i64 {
        r.query_opt(dict, b"Ff")
            .and_then(as_number)
            .map(|f| f as i64)
            .or(self.flags)
            .unwrap_or(0)
    }

    /// The node's own `DA`, else the inherited one
    pub fn effective_appearance<R: Resolver + ?Sized>(
        &self,
        r: &R,
        dict: &Dictionary,
    ) -> Option<Vec<u8>> {
        match r.query_opt(dict, b"DA") {
            Some(Object::String(da, _)) => Some(da.clone()),
            _ => self.default_appearance.clone(),
        }
    }
}

/// Kind of a terminal field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    Button,
    Radio,
    Checkbox,
    Richtext,
    Plaintext,
    Choice,
    Signature,
}

/// Decoded value of a field
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Null,
    Flag(bool),
    Index(usize),
    Text(String),
    Texts(Vec<String>),
}

/// One node of the field tree as reported by the `fields` command
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldRecord {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alternate_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mapping_name: Option<String>,
    pub is_no_export: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rect: Option<Vec<f64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kids: Option<Vec<FieldRecord>>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<FieldKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_file_select: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<FieldValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plain_value: Option<FieldValue>,
}

/// Read the field tree of `reader`'s document.
///
/// Fails with `NoAcroForm` when the catalog has no form; a form without
/// `Fields` yields an empty list.
pub fn read_fields(reader: &DocumentReader) -> Result<Vec<FieldRecord>> {
    let acroform = reader.acroform()?;
    let fields = match reader.query_opt(acroform, b"Fields") {
        Some(Object::Array(fields)) => fields,
        _ => return Ok(Vec::new()),
    };
    let walker = FieldWalker {
        reader,
        page_map: reader.page_map(),
    };
    walker.parse_fields_array(fields, &InheritedProperties::default(), "", 0)
}

struct FieldWalker<'a> {
    reader: &'a DocumentReader,
    page_map: HashMap<ObjectId, usize>,
}

impl FieldWalker<'_> {
    fn parse_fields_array(
        &self,
        fields: &[Object],
        inherited: &InheritedProperties,
        base_name: &str,
        depth: usize,
    ) -> Result<Vec<FieldRecord>> {
        if depth > MAX_FIELD_DEPTH {
            return Err(PdfToolError::DocumentCorrupt(
                "field tree is too deep".to_string(),
            ));
        }
        let mut records = Vec::new();
        for (index, item) in fields.iter().enumerate() {
            match self.reader.query_array_object(fields, index)? {
                Object::Dictionary(dict) => {
                    if let Some(record) = self.parse_field(dict, inherited, base_name, depth)? {
                        records.push(record);
                    }
                }
                other => log::warn!(
                    "skipping field entry {:?}: {} is not a dictionary",
                    item,
                    crate::object::type_name(other)
                ),
            }
        }
        Ok(records)
    }

    fn parse_field(
        &self,
        dict: &Dictionary,
        inherited: &InheritedProperties,
        base_name: &str,
        depth: usize,
    ) -> Result<Option<FieldRecord>> {
        let r = self.reader;
        let partial_name = r.query_opt(dict, b"T").map(to_text);
        let has_kids = exists(dict, b"Kids");

        if partial_name.is_none() && !has_kids && is_widget(r, dict) {
            return Ok(None);
        }

        let flags = inherited.effective_flags(r, dict);
        let full_name = partial_name
            .as_ref()
            .map(|name| format!("{}{}", base_name, name));
        let page = match dict.get(b"P") {
            Ok(Object::Reference(id)) => self.page_map.get(id).copied(),
            _ => None,
        };
        let rect = match r.query_opt(dict, b"Rect") {
            Some(Object::Array(items)) => Some(
                items
                    .iter()
                    .filter_map(|item| r.resolve(item).ok().and_then(as_number))
                    .collect(),
            ),
            _ => None,
        };

        let mut record = FieldRecord {
            name: partial_name,
            alternate_name: r.query_opt(dict, b"TU").map(to_text),
            mapping_name: r.query_opt(dict, b"TM").map(to_text),
            is_no_export: flags & FLAG_NO_EXPORT != 0,
            full_name,
            rect,
            page,
            ..FieldRecord::default()
        };

        if has_kids {
            let kids = match r.query_opt(dict, b"Kids") {
                Some(Object::Array(kids)) => kids.as_slice(),
                _ => &[],
            };
            let kid_base = match &record.full_name {
                Some(full) => format!("{}.", full),
                None => base_name.to_string(),
            };
            let frame = inherited.merged_with(r, dict);
            let kid_records = self.parse_fields_array(kids, &frame, &kid_base, depth + 1)?;
            if !kid_records.is_empty() {
                record.kids = Some(kid_records);
                return Ok(Some(record));
            }
        }

        self.parse_value_data(&mut record, dict, flags, inherited);
        Ok(Some(record))
    }

    fn parse_value_data(
        &self,
        record: &mut FieldRecord,
        dict: &Dictionary,
        flags: i64,
        inherited: &InheritedProperties,
    ) {
        let r = self.reader;
        let field_type = match inherited.effective_type(r, dict) {
            Some(ft) => ft,
            None => return,
        };
        match field_type.as_slice() {
            b"Btn" => {
                if flags & FLAG_PUSH_BUTTON != 0 {
                    record.kind = Some(FieldKind::Button);
                } else if flags & FLAG_RADIO != 0 {
                    record.kind = Some(FieldKind::Radio);
                    record.value = Some(self.parse_radio_value(dict));
                } else {
                    record.kind = Some(FieldKind::Checkbox);
                    record.value = Some(FieldValue::Flag(self.parse_on_off_value(dict)));
                }
            }
            b"Tx" => {
                record.is_file_select = Some(flags & FLAG_FILE_SELECT != 0);
                if flags & FLAG_RICH_TEXT != 0 {
                    record.kind = Some(FieldKind::Richtext);
                    record.value = Some(self.parse_text_value(dict, b"RV"));
                    record.plain_value = Some(self.parse_text_value(dict, b"V"));
                } else {
                    record.kind = Some(FieldKind::Plaintext);
                    record.value = Some(self.parse_text_value(dict, b"V"));
                }
            }
            b"Ch" => {
                record.kind = Some(FieldKind::Choice);
                record.value = self.parse_choice_value(dict);
            }
            b"Sig" => record.kind = Some(FieldKind::Signature),
            other => log::debug!("field type {} not reported", String::from_utf8_lossy(other)),
        }
    }

    /// `V` as text, or `None` when absent
    fn state_name(&self, dict: &Dictionary) -> Option<String> {
        self.reader.query_opt(dict, b"V").map(to_text)
    }

    fn parse_on_off_value(&self, dict: &Dictionary) -> bool {
        match self.state_name(dict) {
            Some(state) => state != "Off" && !state.is_empty(),
            None => false,
        }
    }

    fn parse_radio_value(&self, dict: &Dictionary) -> FieldValue {
        let r = self.reader;
        let state = match self.state_name(dict) {
            Some(state) if state != "Off" && !state.is_empty() => state,
            _ => return FieldValue::Null,
        };
        let kids = match r.query_opt(dict, b"Kids") {
            Some(Object::Array(kids)) => kids,
            _ => return FieldValue::Flag(true),
        };
        for (index, kid) in kids.iter().enumerate() {
            let widget = match r.resolve(kid) {
                Ok(Object::Dictionary(widget)) => widget,
                _ => continue,
            };
            if appearance_names(r, widget)
                .iter()
                .any(|name| name.as_slice() == state.as_bytes())
            {
                return FieldValue::Index(index);
            }
        }
        FieldValue::Flag(true)
    }

    fn parse_text_value(&self, dict: &Dictionary, key: &[u8]) -> FieldValue {
        match self.reader.query_opt(dict, key) {
            Some(value @ Object::String(_, _)) => FieldValue::Text(to_text(value)),
            Some(Object::Stream(stream)) => match decode_stream(stream) {
                Ok(bytes) => FieldValue::Text(decode_text(&bytes)),
                Err(err) => {
                    log::warn!("Could not read text stream value: {}", err);
                    FieldValue::Null
                }
            },
            _ => FieldValue::Null,
        }
    }

    fn parse_choice_value(&self, dict: &Dictionary) -> Option<FieldValue> {
        match self.reader.query_opt(dict, b"V")? {
            value @ Object::String(..) => Some(FieldValue::Text(to_text(value))),
            Object::Array(items) => Some(FieldValue::Texts(
                items
                    .iter()
                    .filter_map(|item| self.reader.resolve(item).ok())
                    .map(to_text)
                    .collect(),
            )),
            _ => None,
        }
    }
}

/// Whether `dict` is a widget annotation
pub fn is_widget<R: Resolver + ?Sized>(r: &R, dict: &Dictionary) -> bool {
    matches!(r.query_opt(dict, b"Subtype"), Some(Object::Name(n)) if n == b"Widget")
}

/// Appearance state names in `AP/N`, in dictionary order
pub fn appearance_names<R: Resolver + ?Sized>(r: &R, widget: &Dictionary) -> Vec<Vec<u8>> {
    let ap = match r.query_opt(widget, b"AP") {
        Some(Object::Dictionary(ap)) => ap,
        _ => return Vec::new(),
    };
    match r.query_opt(ap, b"N") {
        Some(Object::Dictionary(normal)) => normal.iter().map(|(k, _)| k.clone()).collect(),
        _ => Vec::new(),
    }
}

/// First appearance state of `widget` other than `Off`
pub fn on_appearance_name<R: Resolver + ?Sized>(r: &R, widget: &Dictionary) -> Option<Vec<u8>> {
    appearance_names(r, widget)
        .into_iter()
        .find(|name| name.as_slice() != b"Off")
}
