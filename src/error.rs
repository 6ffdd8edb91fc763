//! Error types for pdf-o-rama

use lopdf::ObjectId;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias used throughout the crate
pub type Result<T> = std::result::Result<T, PdfToolError>;

/// Error type for PDF tool operations
#[derive(Error, Debug)]
pub enum PdfToolError {
    /// Missing or invalid command line argument or input file
    #[error("{0}")]
    Usage(String),

    /// Trailer, cross-reference data or document structure unreadable
    #[error("Document is corrupt: {0}")]
    DocumentCorrupt(String),

    /// The document has no interactive form
    #[error("PDF has no AcroForm")]
    NoAcroForm,

    /// Data file checksum does not match the input document
    #[error("MD5 for {} does not match", path.display())]
    IntegrityMismatch { path: PathBuf },

    /// A text-bearing mark was requested without a font file
    #[error("Font file must be specified for {0} fields")]
    MissingFont(String),

    /// Visual mark type not recognised
    #[error("Unknown field type {0}")]
    UnknownFieldType(String),

    /// Typed accessor found a value of another type
    #[error("Expected {expected} for key '{key}', found {found}")]
    TypeMismatch {
        key: String,
        expected: &'static str,
        found: &'static str,
    },

    /// Required dictionary key absent
    #[error("Missing required key '{0}'")]
    MissingKey(String),

    /// Referenced object not present in the document
    #[error("Object {} {} R not found", .0.0, .0.1)]
    MissingObject(ObjectId),

    /// Page index outside the document
    #[error("Page {index} out of range (document has {count} pages)")]
    PageOutOfRange { index: usize, count: usize },

    /// Object written twice within the same revision
    #[error("Object {} {} R already written in this revision", .0.0, .0.1)]
    DuplicateObject(ObjectId),

    /// Stream encoded with a filter other than Flate
    #[error("Unsupported stream filter /{0}")]
    UnsupportedFilter(String),

    /// Data file could not be parsed
    #[error("Invalid data file {}: {reason}", path.display())]
    InvalidData { path: PathBuf, reason: String },

    /// Font file could not be parsed
    #[error("Font error: {0}")]
    Font(String),

    /// QR code could not be produced
    #[error("QR code error: {0}")]
    QrCode(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// Image encode/decode error
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),
}

impl From<lopdf::Error> for PdfToolError {
    fn from(err: lopdf::Error) -> Self {
        PdfToolError::DocumentCorrupt(err.to_string())
    }
}
