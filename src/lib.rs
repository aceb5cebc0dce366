//! # examcrop
//!
//! Crop individual questions out of exam-booklet PDFs into PNG images.
//!
//! Exam booklets carry no structure beyond their printed text: questions are
//! numbered `1. `, `2. `… within each section, answer choices are labelled
//! `A)` to `E)`, and a fixed phrase opens every section. This crate finds
//! those anchors in the extracted page text, grows each question into a
//! rectangle using the page's layout blocks, renders that rectangle via
//! pdfium, and reports what looks wrong so the remaining manual work is
//! targeted.
//!
//! ## Pipeline Overview
//!
//! ```text
//! exam root
//!  │
//!  ├─ 1. Discover  {EXAM}/{YEAR}/…/*.pdf
//!  ├─ 2. Resolve   catalog entry by filename (start marker + sections)
//!  ├─ 3. Layout    per-page text, glyph boxes, blocks (pdfium, spawn_blocking)
//!  ├─ 4. Anchors   "<n>. " questions, "<A-E>)" answers, section markers
//!  ├─ 5. Box       anchor → rectangle down to the last answer block
//!  ├─ 6. Raster    rectangle → {output}/{EXAM}/{YEAR}/{SECTION}/{n}.png
//!  └─ 7. Report    height anomalies + missing question numbers
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use examcrop::{discover, run, ConfigCatalog, CropConfig};
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let catalog = Arc::new(ConfigCatalog::load(Path::new("config.yaml"))?);
//!     let jobs = discover(Path::new("EXAM_PDFS"), None)?;
//!     let config = CropConfig::default();
//!     let summary = run(jobs, catalog, &config, Path::new("output")).await;
//!     eprintln!("{} images written, {} missing", summary.written(), summary.missing());
//!     Ok(())
//! }
//! ```
//!
//! ## Logging
//!
//! Everything goes through `tracing`. Two targets carry the operator-facing
//! logs and are meant to be routed to their own files:
//!
//! | Target | Content |
//! |--------|---------|
//! | [`CONVERSION_TARGET`] | one line per question rendered or failed |
//! | [`PROCESS_TARGET`]    | catalog and discovery errors, anomaly report |
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `examcrop` binary (clap + anyhow + tracing-subscriber + indicatif) |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod audit;
pub mod catalog;
pub mod config;
pub mod error;
pub mod extract;
pub mod layout;
pub mod pipeline;
pub mod progress;
pub mod report;

/// `tracing` target of per-question rasterisation events.
pub const CONVERSION_TARGET: &str = "examcrop::conversion";
/// `tracing` target of per-PDF process events and the anomaly report.
pub const PROCESS_TARGET: &str = "examcrop::process";

// ── Re-exports ───────────────────────────────────────────────────────────

pub use audit::{audit, AuditSummary, PdfAudit, SectionAudit};
pub use catalog::{scaffold, CatalogNode, ConfigCatalog, ExpectedCount, ProcessingConfig, Section};
pub use config::{CropConfig, CropConfigBuilder};
pub use error::{CropError, QuestionError};
pub use extract::{extract_document, extract_pdf, run, run_sync};
pub use layout::{ExamDocument, PageLayout, Rect, TextBlock};
pub use pipeline::input::{discover, PdfJob};
pub use progress::{NoopProgressCallback, ProgressCallback, RunProgressCallback};
pub use report::{HeightAnomaly, PdfFailure, PdfReport, RunSummary, SectionReport};
