//! Fixture PDFs for the command tests, built with lopdf

#![allow(dead_code)]

use lopdf::{Dictionary, Document, Object, ObjectId, Stream};
use std::fs;
use std::path::{Path, PathBuf};

fn name(n: &str) -> Object {
    Object::Name(n.as_bytes().to_vec())
}

fn rect(values: [i64; 4]) -> Object {
    Object::Array(values.iter().map(|v| Object::Integer(*v)).collect())
}

fn helvetica(doc: &mut Document) -> ObjectId {
    let mut font = Dictionary::new();
    font.set("Type", name("Font"));
    font.set("Subtype", name("Type1"));
    font.set("BaseFont", name("Helvetica"));
    doc.add_object(Object::Dictionary(font))
}

/// Add `count` pages showing `<label>-<index>`; returns the page IDs
fn add_pages(doc: &mut Document, pages_id: ObjectId, label: &str, count: usize) -> Vec<ObjectId> {
    let font_id = helvetica(doc);
    let mut fonts = Dictionary::new();
    fonts.set("F1", Object::Reference(font_id));
    let mut resources = Dictionary::new();
    resources.set("Font", Object::Dictionary(fonts));
    let resources_id = doc.add_object(Object::Dictionary(resources));

    (0..count)
        .map(|index| {
            let content = format!("BT /F1 12 Tf 72 720 Td ({}-{}) Tj ET", label, index);
            let content_id =
                doc.add_object(Object::Stream(Stream::new(Dictionary::new(), content.into_bytes())));
            let mut page = Dictionary::new();
            page.set("Type", name("Page"));
            page.set("Parent", Object::Reference(pages_id));
            page.set("MediaBox", rect([0, 0, 612, 792]));
            page.set("Resources", Object::Reference(resources_id));
            page.set("Contents", Object::Reference(content_id));
            doc.add_object(Object::Dictionary(page))
        })
        .collect()
}

fn finish(mut doc: Document, pages_id: ObjectId, page_ids: &[ObjectId], catalog: Dictionary) -> Vec<u8> {
    let mut pages = Dictionary::new();
    pages.set("Type", name("Pages"));
    pages.set("Count", Object::Integer(page_ids.len() as i64));
    pages.set(
        "Kids",
        Object::Array(page_ids.iter().map(|id| Object::Reference(*id)).collect()),
    );
    doc.objects.insert(pages_id, Object::Dictionary(pages));

    let mut catalog = catalog;
    catalog.set("Type", name("Catalog"));
    catalog.set("Pages", Object::Reference(pages_id));
    let catalog_id = doc.add_object(Object::Dictionary(catalog));
    doc.trailer.set("Root", Object::Reference(catalog_id));

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).unwrap();
    bytes
}

/// A plain PDF whose pages show `<label>-0`, `<label>-1`, ...
pub fn simple_pdf(label: &str, count: usize) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let page_ids = add_pages(&mut doc, pages_id, label, count);
    finish(doc, pages_id, &page_ids, Dictionary::new())
}

fn appearance(doc: &mut Document, states: &[&str]) -> Object {
    let stream_id = doc.add_object(Object::Stream(Stream::new(Dictionary::new(), Vec::new())));
    let mut normal = Dictionary::new();
    for state in states {
        normal.set(*state, Object::Reference(stream_id));
    }
    let mut ap = Dictionary::new();
    ap.set("N", Object::Dictionary(normal));
    Object::Dictionary(ap)
}

/// A one-page form: checkbox `agree`, three-widget radio group `size`, and a
/// `person` node whose kids `first` and `last` inherit `FT` and `DA`
pub fn form_pdf() -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let page_ids = add_pages(&mut doc, pages_id, "form", 1);
    let page_id = page_ids[0];
    let mut annots = Vec::new();

    let mut agree = Dictionary::new();
    agree.set("T", Object::string_literal("agree"));
    agree.set("FT", name("Btn"));
    agree.set("V", name("Off"));
    agree.set("AS", name("Off"));
    agree.set("Subtype", name("Widget"));
    agree.set("Rect", rect([50, 700, 70, 720]));
    agree.set("P", Object::Reference(page_id));
    let agree_ap = appearance(&mut doc, &["Yes", "Off"]);
    agree.set("AP", agree_ap);
    let agree_id = doc.add_object(Object::Dictionary(agree));
    annots.push(Object::Reference(agree_id));

    let size_id = doc.new_object_id();
    let mut size_kids = Vec::new();
    for (i, state) in ["S", "M", "L"].iter().enumerate() {
        let mut widget = Dictionary::new();
        widget.set("Subtype", name("Widget"));
        widget.set("Parent", Object::Reference(size_id));
        widget.set("Rect", rect([50 + 30 * i as i64, 600, 70 + 30 * i as i64, 620]));
        widget.set("P", Object::Reference(page_id));
        widget.set("AS", name("Off"));
        let ap = appearance(&mut doc, &[state, "Off"]);
        widget.set("AP", ap);
        let widget_id = doc.add_object(Object::Dictionary(widget));
        annots.push(Object::Reference(widget_id));
        size_kids.push(Object::Reference(widget_id));
    }
    let mut size = Dictionary::new();
    size.set("T", Object::string_literal("size"));
    size.set("FT", name("Btn"));
    size.set("Ff", Object::Integer(1 << 15));
    size.set("V", name("Off"));
    size.set("Kids", Object::Array(size_kids));
    doc.objects.insert(size_id, Object::Dictionary(size));

    let person_id = doc.new_object_id();
    let mut person_kids = Vec::new();
    for (i, part) in ["first", "last"].iter().enumerate() {
        let mut widget = Dictionary::new();
        widget.set("T", Object::string_literal(*part));
        widget.set("Parent", Object::Reference(person_id));
        widget.set("Subtype", name("Widget"));
        widget.set("Rect", rect([50, 500 - 40 * i as i64, 250, 520 - 40 * i as i64]));
        widget.set("P", Object::Reference(page_id));
        let widget_id = doc.add_object(Object::Dictionary(widget));
        annots.push(Object::Reference(widget_id));
        person_kids.push(Object::Reference(widget_id));
    }
    let mut person = Dictionary::new();
    person.set("T", Object::string_literal("person"));
    person.set("FT", name("Tx"));
    person.set("DA", Object::string_literal("/Helv 11 Tf 0 g"));
    person.set("Kids", Object::Array(person_kids));
    doc.objects.insert(person_id, Object::Dictionary(person));

    if let Ok(Object::Dictionary(page)) = doc.get_object_mut(page_id) {
        page.set("Annots", Object::Array(annots));
    }

    let helv_id = helvetica(&mut doc);
    let mut fonts = Dictionary::new();
    fonts.set("Helv", Object::Reference(helv_id));
    let mut dr = Dictionary::new();
    dr.set("Font", Object::Dictionary(fonts));

    let mut acroform = Dictionary::new();
    acroform.set(
        "Fields",
        Object::Array(vec![
            Object::Reference(agree_id),
            Object::Reference(size_id),
            Object::Reference(person_id),
        ]),
    );
    acroform.set("DR", Object::Dictionary(dr));
    let acroform_id = doc.add_object(Object::Dictionary(acroform));

    let mut catalog = Dictionary::new();
    catalog.set("AcroForm", Object::Reference(acroform_id));
    finish(doc, pages_id, &page_ids, catalog)
}

/// Write `bytes` to `dir/file_name`
pub fn write_file(dir: &Path, file_name: &str, bytes: &[u8]) -> PathBuf {
    let path = dir.join(file_name);
    fs::write(&path, bytes).unwrap();
    path
}
