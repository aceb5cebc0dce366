//! Error types for the examcrop library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`CropError`]: **Fatal for one PDF**: the document cannot be processed
//!   at all (no catalog entry, incomplete entry, unreadable file, corrupt
//!   PDF). The driver logs it and moves on to the next PDF. Only a catalog
//!   that cannot be loaded aborts a whole run.
//!
//! * [`QuestionError`]: **Non-fatal**: a single question could not be
//!   cropped or written, but its siblings are fine. Stored inside
//!   [`crate::report::PdfReport`] so an operator can target manual review.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the examcrop library.
///
/// Question-level failures use [`QuestionError`] and are stored in
/// [`crate::report::PdfReport`] rather than propagated here.
#[derive(Debug, Error)]
pub enum CropError {
    // ── Catalog errors ────────────────────────────────────────────────────
    /// The catalog file could not be read.
    #[error("Failed to read catalog '{path}': {source}")]
    CatalogRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The catalog file is not valid YAML or has an unexpected shape.
    #[error("Catalog is malformed: {0}")]
    CatalogParse(String),

    /// No catalog entry matches the PDF's base filename.
    #[error("No configuration found for '{path}'")]
    ConfigNotFound { path: PathBuf },

    /// The catalog entry lacks a start marker or a non-empty section map.
    #[error("Incomplete configuration for '{path}': {missing}")]
    IncompleteConfig { path: PathBuf, missing: String },

    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("PDF file not found: '{path}'")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'")]
    PermissionDenied { path: PathBuf },

    /// The file exists and was read, but is not a PDF.
    #[error("File is not a valid PDF: '{path}'\nFirst bytes: {magic:?}")]
    NotAPdf { path: PathBuf, magic: [u8; 4] },

    /// The PDF does not sit under `{exam_root}/{EXAM}/{YEAR}/`.
    #[error("'{path}' is not inside an exam/year directory under the exam root")]
    OutsideExamRoot { path: PathBuf },

    // ── PDF errors ────────────────────────────────────────────────────────
    /// PDF header/trailer/xref is corrupt and cannot be parsed.
    #[error("PDF '{path}' is corrupt: {detail}")]
    CorruptPdf { path: PathBuf, detail: String },

    /// PDF requires a password but none (or a wrong one) was provided.
    #[error("PDF '{path}' is encrypted and the password is missing or wrong")]
    PasswordRequired { path: PathBuf },

    /// Text or geometry could not be read from a page.
    #[error("Failed to read layout of page {page}: {detail}")]
    LayoutFailed { page: usize, detail: String },

    // ── Output errors ─────────────────────────────────────────────────────
    /// Could not create a section output directory.
    #[error("Failed to create output directory '{path}': {source}")]
    OutputDirFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Pdfium binding errors ─────────────────────────────────────────────
    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\n\
You can:\n\
  • Set PDFIUM_LIB_PATH=/path/to/libpdfium.\n\
  • Place libpdfium in the examcrop cache directory.\n\
  • Install pdfium system-wide.\n"
    )]
    PdfiumBindingFailed(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CropError {
    /// `true` for the configuration-class errors that mean "skip this PDF,
    /// fix the catalog, re-run".
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            CropError::ConfigNotFound { .. } | CropError::IncompleteConfig { .. }
        )
    }
}

/// A non-fatal error for a single question.
///
/// Stored in [`crate::report::PdfReport::failures`]. Processing continues
/// with the next anchor on the page.
#[derive(Debug, Clone, PartialEq, Error, serde::Serialize, serde::Deserialize)]
pub enum QuestionError {
    /// The question's text could not be located visually on the page.
    #[error("[{section}] Question {question}: text not found on page {page}")]
    TextNotFound {
        section: String,
        question: u32,
        page: usize,
    },

    /// No answer-choice block below the anchor, so the extent is unknown.
    #[error("[{section}] Question {question}: no answer block below anchor on page {page}")]
    NoExtent {
        section: String,
        question: u32,
        page: usize,
    },

    /// The synthesized rectangle has non-positive width or height.
    #[error("[{section}] Question {question}: empty crop region ({width:.2}x{height:.2})")]
    EmptyRegion {
        section: String,
        question: u32,
        width: f32,
        height: f32,
    },

    /// Rendering the page region failed.
    #[error("[{section}] Question {question}: rasterisation failed: {detail}")]
    RenderFailed {
        section: String,
        question: u32,
        detail: String,
    },

    /// The rendered image could not be written.
    #[error("[{section}] Question {question}: failed to write '{path}': {detail}")]
    WriteFailed {
        section: String,
        question: u32,
        path: PathBuf,
        detail: String,
    },
}

impl QuestionError {
    /// Question number the failure refers to.
    pub fn question(&self) -> u32 {
        match self {
            QuestionError::TextNotFound { question, .. }
            | QuestionError::NoExtent { question, .. }
            | QuestionError::EmptyRegion { question, .. }
            | QuestionError::RenderFailed { question, .. }
            | QuestionError::WriteFailed { question, .. } => *question,
        }
    }

    /// `true` when the failure happened while producing pixels, i.e. after a
    /// region was successfully synthesized.
    pub fn is_rasterisation(&self) -> bool {
        matches!(
            self,
            QuestionError::RenderFailed { .. } | QuestionError::WriteFailed { .. }
        )
    }
}
