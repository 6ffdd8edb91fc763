//! pdf-o-rama library
//!
//! PDF object graph reading, writing and incremental updating, plus the
//! command handlers behind the `pdf-o-rama` CLI: concatenation, AcroForm
//! field extraction, form/annotation stripping, watermarking and filling.
//!
//! Parsing is done by `lopdf`; serialization is done here so that updates can
//! be appended to the original bytes without touching them.

pub mod commands;
pub mod content;
pub mod copying;
pub mod error;
pub mod font;
pub mod form_reader;
pub mod form_writer;
pub mod object;
pub mod page;
pub mod qr;
pub mod reader;
pub mod writer;

pub use error::{PdfToolError, Result};
pub use form_reader::{read_fields, FieldKind, FieldRecord, FieldValue};
pub use form_writer::{fill_form, FieldInput, FieldValues};
pub use reader::DocumentReader;
pub use writer::{DocumentWriter, WriterOptions};
