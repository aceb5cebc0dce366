//! Pipeline driver: PDFs → pages → anchors → crop rectangles → PNGs.
//!
//! [`extract_document`] runs the per-PDF loop against any [`ExamDocument`];
//! [`extract_pdf`] wires it to pdfium; [`run`] fans a list of PDFs out over
//! blocking workers and collects a [`RunSummary`].

use crate::catalog::{ConfigCatalog, ProcessingConfig};
use crate::config::CropConfig;
use crate::error::{CropError, QuestionError};
use crate::layout::ExamDocument;
use crate::pipeline::anchors::{block_text, locate_question_anchors, ScanState};
use crate::pipeline::bbox::{synthesize, BoxFailure};
use crate::pipeline::input::{validate_pdf, PdfJob};
use crate::pipeline::raster::{question_path, rasterize, RasterFailure, RasterOutcome};
use crate::pipeline::render::{bind_pdfium, PdfiumDocument};
use crate::report::{
    log_report, summarise_sections, PdfFailure, PdfReport, RunSummary, SectionProgress,
};
use crate::{CONVERSION_TARGET, PROCESS_TARGET};
use futures::stream::{self, StreamExt};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Crop every question of one opened document.
///
/// Page-level layout failures are logged and the page is skipped; only an
/// unusable output directory aborts the document.
pub fn extract_document(
    doc: &dyn ExamDocument,
    job: &PdfJob,
    processing: &ProcessingConfig,
    config: &CropConfig,
    output_root: &Path,
) -> Result<PdfReport, CropError> {
    let out_dir = job.output_dir(output_root);
    let pages = doc.page_count();
    info!("Processing {} ({} pages)", job.path.display(), pages);

    let mut state = ScanState::new(processing.sections.len(), config.recover_first_question);
    let mut progress: Vec<(String, SectionProgress)> = Vec::new();
    let mut invalid_reported: HashSet<usize> = HashSet::new();
    let mut failures: Vec<QuestionError> = Vec::new();
    let mut written = 0usize;
    let mut already_present = 0usize;

    for index in 0..pages {
        let layout = match doc.layout(index) {
            Ok(l) => l,
            Err(e) => {
                error!(target: PROCESS_TARGET, "{}: {}", job.path.display(), e);
                continue;
            }
        };

        let Some(section_idx) = state.enter_page(&layout.text, &processing.start_marker) else {
            continue;
        };
        let section = &processing.sections[section_idx];
        let Some(max_questions) = section.expected_count() else {
            if invalid_reported.insert(section_idx) {
                error!(
                    target: PROCESS_TARGET,
                    "[{}] Invalid question count in {}: skipping section.",
                    section.name,
                    job.path.display()
                );
            }
            continue;
        };

        let slot = match progress.iter().position(|(name, _)| name == &section.name) {
            Some(i) => i,
            None => {
                progress.push((section.name.clone(), SectionProgress::default()));
                progress.len() - 1
            }
        };
        let section_dir = out_dir.join(&section.output_name);
        let marker_bottom = if config.recover_first_question {
            layout.find_text(&processing.start_marker).map(|r| r.bottom)
        } else {
            None
        };

        let anchors = locate_question_anchors(&layout.text);
        debug!(
            "Page {}: section '{}', {} anchors",
            index + 1,
            section.name,
            anchors.len()
        );

        for (i, anchor) in anchors.iter().enumerate() {
            let n = anchor.number;
            if !state.admit(n) {
                continue;
            }
            if n > max_questions || progress[slot].1.is_produced(n) {
                continue;
            }

            let text = block_text(&layout.text, &anchors, i);
            let rect = match synthesize(&layout, text, marker_bottom, config) {
                Ok(rect) => rect,
                Err(BoxFailure::OnMarkerLine) => {
                    debug!("[{}] Anchor {} sits on the start-marker line", section.name, n);
                    state.await_first_question();
                    continue;
                }
                Err(BoxFailure::TextNotFound) => {
                    debug!("[{}] Question {}: text not found on page {}", section.name, n, index + 1);
                    failures.push(QuestionError::TextNotFound {
                        section: section.name.clone(),
                        question: n,
                        page: index + 1,
                    });
                    continue;
                }
                Err(BoxFailure::NoExtent) => {
                    let e = QuestionError::NoExtent {
                        section: section.name.clone(),
                        question: n,
                        page: index + 1,
                    };
                    warn!(target: CONVERSION_TARGET, "{}", e);
                    failures.push(e);
                    continue;
                }
                Err(BoxFailure::EmptyRegion { width, height }) => {
                    let e = QuestionError::EmptyRegion {
                        section: section.name.clone(),
                        question: n,
                        width,
                        height,
                    };
                    error!(target: CONVERSION_TARGET, "{}", e);
                    failures.push(e);
                    continue;
                }
            };

            std::fs::create_dir_all(&section_dir).map_err(|e| CropError::OutputDirFailed {
                path: section_dir.clone(),
                source: e,
            })?;
            let target = question_path(&section_dir, n);

            match rasterize(doc, index, &rect, &target, config) {
                Ok(RasterOutcome::Written) => {
                    info!(
                        target: CONVERSION_TARGET,
                        "[{}] Question {} saved: {} (page {}, height {:.2})",
                        section.name,
                        n,
                        target.display(),
                        index + 1,
                        rect.height()
                    );
                    written += 1;
                    progress[slot].1.record(n, rect.height());
                }
                Ok(RasterOutcome::AlreadyPresent) => {
                    already_present += 1;
                    progress[slot].1.record(n, rect.height());
                }
                Err(RasterFailure::Render(detail)) => {
                    let e = QuestionError::RenderFailed {
                        section: section.name.clone(),
                        question: n,
                        detail,
                    };
                    error!(target: CONVERSION_TARGET, "{}", e);
                    failures.push(e);
                }
                Err(RasterFailure::Write(detail)) => {
                    let e = QuestionError::WriteFailed {
                        section: section.name.clone(),
                        question: n,
                        path: target.clone(),
                        detail,
                    };
                    error!(target: CONVERSION_TARGET, "{}", e);
                    failures.push(e);
                }
            }
        }
    }

    // A number that failed on one page may still have been produced later.
    failures.retain(|f| {
        let section = match f {
            QuestionError::TextNotFound { section, .. }
            | QuestionError::NoExtent { section, .. }
            | QuestionError::EmptyRegion { section, .. }
            | QuestionError::RenderFailed { section, .. }
            | QuestionError::WriteFailed { section, .. } => section,
        };
        !progress
            .iter()
            .any(|(name, p)| name == section && p.is_produced(f.question()))
    });
    failures.dedup();

    let sections = summarise_sections(&processing.sections, &progress);
    info!(target: PROCESS_TARGET, "{}", job.path.display());
    log_report(&sections);

    Ok(PdfReport {
        job: job.clone(),
        pages,
        written,
        already_present,
        sections,
        failures,
    })
}

/// Validate, resolve and crop one PDF through pdfium.
///
/// Blocking; call from `spawn_blocking` inside async code.
pub fn extract_pdf(
    job: &PdfJob,
    catalog: &ConfigCatalog,
    config: &CropConfig,
    output_root: &Path,
) -> Result<PdfReport, CropError> {
    validate_pdf(&job.path)?;
    let processing = catalog.resolve(&job.path)?;
    let pdfium = bind_pdfium()?;
    let doc = PdfiumDocument::open(&pdfium, &job.path, config.password.as_deref())?;
    extract_document(&doc, job, &processing, config, output_root)
}

/// Process `jobs`, `config.concurrency` PDFs at a time.
///
/// Never fails: PDFs that cannot be processed are logged on the process
/// target and listed in [`RunSummary::failures`].
pub async fn run(
    jobs: Vec<PdfJob>,
    catalog: Arc<ConfigCatalog>,
    config: &CropConfig,
    output_root: &Path,
) -> RunSummary {
    let start = Instant::now();
    let total = jobs.len();
    info!("Starting run: {} PDFs, concurrency {}", total, config.concurrency);
    if let Some(ref cb) = config.progress_callback {
        cb.on_run_start(total);
    }

    let mut results: Vec<(PathBuf, Result<PdfReport, CropError>)> =
        stream::iter(jobs.into_iter().map(|job| {
            let catalog = Arc::clone(&catalog);
            let config = config.clone();
            let output_root = output_root.to_path_buf();
            async move {
                let path = job.path.clone();
                if let Some(ref cb) = config.progress_callback {
                    cb.on_pdf_start(&path);
                }

                let worker_config = config.clone();
                let result = tokio::task::spawn_blocking(move || {
                    extract_pdf(&job, &catalog, &worker_config, &output_root)
                })
                .await
                .unwrap_or_else(|e| Err(CropError::Internal(format!("PDF worker panicked: {}", e))));

                if let Some(ref cb) = config.progress_callback {
                    match &result {
                        Ok(report) => cb.on_pdf_complete(&path, report.produced(), report.missing()),
                        Err(e) => cb.on_pdf_error(&path, &e.to_string()),
                    }
                }
                (path, result)
            }
        }))
        .buffer_unordered(config.concurrency)
        .collect()
        .await;

    results.sort_by(|a, b| a.0.cmp(&b.0));

    let mut summary = RunSummary::default();
    for (path, result) in results {
        match result {
            Ok(report) => summary.reports.push(report),
            Err(e) => {
                error!(target: PROCESS_TARGET, "{}", e);
                summary.failures.push(PdfFailure {
                    path,
                    configuration: e.is_configuration(),
                    error: e.to_string(),
                });
            }
        }
    }
    summary.duration_ms = start.elapsed().as_millis() as u64;

    info!(
        "Run complete: {}/{} PDFs, {} images written, {} missing, {}ms",
        summary.reports.len(),
        total,
        summary.written(),
        summary.missing(),
        summary.duration_ms
    );
    if let Some(ref cb) = config.progress_callback {
        cb.on_run_complete(total, summary.reports.len());
    }
    summary
}

/// Synchronous wrapper around [`run`].
///
/// Creates a temporary tokio runtime internally.
pub fn run_sync(
    jobs: Vec<PdfJob>,
    catalog: Arc<ConfigCatalog>,
    config: &CropConfig,
    output_root: &Path,
) -> Result<RunSummary, CropError> {
    Ok(tokio::runtime::Runtime::new()
        .map_err(|e| CropError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(run(jobs, catalog, config, output_root)))
}
