mod common;

use common::{simple_pdf, write_file};
use lopdf::{Dictionary, Object, ObjectId, Stream};
use pdf_o_rama::commands::{self, FillOptions};
use pdf_o_rama::object::{as_number, decode_stream, Resolver};
use pdf_o_rama::DocumentReader;
use pretty_assertions::assert_eq;
use std::path::{Path, PathBuf};

fn font_fixture() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/DejaVuSans.ttf")
}

/// Fill `simple_pdf("d", pages)` with `fields` (a JSON5 array) and read the result back
fn fill_marks(pages: usize, fields: &str) -> DocumentReader {
    let dir = tempfile::tempdir().unwrap();
    let pdf = write_file(dir.path(), "doc.pdf", &simple_pdf("d", pages));
    let data = write_file(
        dir.path(),
        "data.json5",
        format!("{{fields: {}}}", fields).as_bytes(),
    );
    let out = dir.path().join("out.pdf");

    commands::fill(&FillOptions {
        pdf_file: Some(pdf),
        output_file: Some(out.clone()),
        data_file: Some(data),
        font_file: Some(font_fixture()),
        ..FillOptions::default()
    })
    .unwrap();
    DocumentReader::load(&out).unwrap()
}

fn page_text(reader: &DocumentReader, index: usize) -> String {
    String::from_utf8_lossy(&reader.page_content(index).unwrap()).to_string()
}

fn dict<'a>(reader: &'a DocumentReader, object: &'a Object) -> &'a Dictionary {
    match reader.resolve(object).unwrap() {
        Object::Dictionary(dict) => dict,
        Object::Stream(stream) => &stream.dict,
        other => panic!("expected a dictionary, got {:?}", other),
    }
}

fn stream<'a>(reader: &'a DocumentReader, object: &'a Object) -> &'a Stream {
    match reader.resolve(object).unwrap() {
        Object::Stream(stream) => stream,
        other => panic!("expected a stream, got {:?}", other),
    }
}

/// `Resources/<category>/<name>` of page `index`
fn page_resource(reader: &DocumentReader, index: usize, category: &[u8], name: &[u8]) -> Object {
    let page = reader.parse_page(index).unwrap();
    let entries = dict(reader, page.resources.get(category).unwrap());
    entries.get(name).unwrap().clone()
}

fn reference(object: &Object) -> ObjectId {
    match object {
        Object::Reference(id) => *id,
        other => panic!("expected a reference, got {:?}", other),
    }
}

#[test]
fn plaintext_marks_share_one_embedded_font() {
    let reader = fill_marks(
        2,
        "[{page: 0, rect: [100, 200, 200, 220], type: 'plaintext', value: 'One'},
          {page: 0, rect: [100, 300, 200, 320], type: 'plaintext', value: 'Two'},
          {page: 1, rect: [100, 200, 200, 220], type: 'plaintext', value: 'Three'}]",
    );

    let first = page_text(&reader, 0);
    assert!(first.contains("q\nBT\n0 g\n1 0 0 1 100 205 Tm\n/F2 14 Tf\n(One) Tj\nET\nQ\n"));
    assert!(first.contains("1 0 0 1 100 305 Tm\n/F2 14 Tf\n(Two) Tj\n"));
    assert!(!first.contains("/F3"));
    // the page's own font keeps its name
    assert!(first.contains("(d-0) Tj"));

    let font_ref = page_resource(&reader, 0, b"Font", b"F2");
    assert_eq!(
        reference(&font_ref),
        reference(&page_resource(&reader, 1, b"Font", b"F2"))
    );

    let font = dict(&reader, &font_ref);
    assert_eq!(font.get(b"Subtype").unwrap(), &Object::Name(b"TrueType".to_vec()));
    assert_eq!(
        font.get(b"Encoding").unwrap(),
        &Object::Name(b"WinAnsiEncoding".to_vec())
    );
    let first_char = as_number(font.get(b"FirstChar").unwrap()).unwrap() as usize;
    let last_char = as_number(font.get(b"LastChar").unwrap()).unwrap() as usize;
    let widths = match reader.resolve(font.get(b"Widths").unwrap()).unwrap() {
        Object::Array(widths) => widths.len(),
        other => panic!("Widths is {:?}", other),
    };
    assert_eq!(widths, last_char - first_char + 1);

    let descriptor = dict(&reader, font.get(b"FontDescriptor").unwrap());
    let program = stream(&reader, descriptor.get(b"FontFile2").unwrap());
    let program_bytes = decode_stream(program).unwrap();
    assert_eq!(
        as_number(program.dict.get(b"Length1").unwrap()).unwrap() as usize,
        program_bytes.len()
    );
    assert_eq!(program_bytes, std::fs::read(font_fixture()).unwrap());
}

#[test]
fn signhere_is_a_rotated_translucent_form() {
    let reader = fill_marks(
        1,
        "[{page: 0, rect: [50, 60, 150, 80], type: 'signhere', value: 'A'},
          {page: 0, rect: [50, 100, 150, 120], type: 'signhere', value: 'B'}]",
    );

    let content = page_text(&reader, 0);
    assert!(content.contains(
        "q\n1 0 0 1 50 70 cm\n0.7071 0.7071 -0.7071 0.7071 0 0 cm\n1 0 0 1 0 -10 cm\n/Fm1 Do\nQ\n"
    ));
    assert!(content.contains(
        "q\n1 0 0 1 50 110 cm\n0.7071 0.7071 -0.7071 0.7071 0 0 cm\n1 0 0 1 0 -10 cm\n/Fm2 Do\nQ\n"
    ));

    let mut gstates = Vec::new();
    for (name, label) in [(b"Fm1".as_slice(), "A"), (b"Fm2".as_slice(), "B")] {
        let form_ref = page_resource(&reader, 0, b"XObject", name);
        let form = stream(&reader, &form_ref);
        assert_eq!(form.dict.get(b"Subtype").unwrap(), &Object::Name(b"Form".to_vec()));
        let bbox: Vec<f64> = match form.dict.get(b"BBox").unwrap() {
            Object::Array(items) => items.iter().filter_map(as_number).collect(),
            other => panic!("BBox is {:?}", other),
        };
        assert_eq!(bbox, vec![0.0, 0.0, 100.0, 20.0]);

        let text = String::from_utf8(decode_stream(form).unwrap()).unwrap();
        assert!(text.starts_with(
            "q\n/GS1 gs\n1 w\n0 G\n1 0.6 1 rg\n0 10 m\n10 0 l\n100 0 l\n100 20 l\n10 20 l\nh\nB\nBT\n0 g\n"
        ));
        assert!(text.contains(&format!("/F1 12 Tf\n(Sign Here {}) Tj\nET\nQ\n", label)));

        let resources = dict(&reader, form.dict.get(b"Resources").unwrap());
        let gs_ref = dict(&reader, resources.get(b"ExtGState").unwrap())
            .get(b"GS1")
            .unwrap()
            .clone();
        gstates.push(reference(&gs_ref));
        let gs = dict(&reader, &gs_ref);
        assert_eq!(as_number(gs.get(b"ca").unwrap()), Some(0.5));
        assert_eq!(as_number(gs.get(b"CA").unwrap()), Some(0.5));
    }
    assert_eq!(gstates[0], gstates[1]);
}

#[test]
fn qrcode_is_drawn_at_natural_size() {
    let reader = fill_marks(
        1,
        "[{page: 0, rect: [300, 300, 320, 320], type: 'qrcode', value: 'https://example.com'}]",
    );

    let image_ref = page_resource(&reader, 0, b"XObject", b"Im1");
    let image = stream(&reader, &image_ref);
    assert_eq!(image.dict.get(b"Subtype").unwrap(), &Object::Name(b"Image".to_vec()));
    assert_eq!(
        image.dict.get(b"ColorSpace").unwrap(),
        &Object::Name(b"DeviceRGB".to_vec())
    );
    let width = as_number(image.dict.get(b"Width").unwrap()).unwrap();
    let height = as_number(image.dict.get(b"Height").unwrap()).unwrap();
    assert_eq!(width, height);
    assert_eq!(
        decode_stream(image).unwrap().len(),
        (width * height * 3.0) as usize
    );

    let content = page_text(&reader, 0);
    assert!(content.contains(&format!(
        "q\n{w} 0 0 {w} 300 300 cm\n/Im1 Do\nQ\n",
        w = width as i64
    )));
}
