//! Offline check of the output tree against the catalog.
//!
//! Nothing is rendered: for each PDF the declared sections are compared
//! with the `{n}.png` files already on disk. Handy after a manual clean-up
//! pass, when the logs of the original run are stale.

use crate::catalog::{ConfigCatalog, ProcessingConfig};
use crate::pipeline::input::PdfJob;
use crate::report::{missing_questions, PdfFailure};
use crate::PROCESS_TARGET;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;
use tracing::{error, info};

/// On-disk state of one section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionAudit {
    pub name: String,
    pub output_name: String,
    pub expected: Option<u32>,
    /// Question numbers with an image on disk.
    pub present: Vec<u32>,
    pub missing: Vec<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PdfAudit {
    pub job: PdfJob,
    pub sections: Vec<SectionAudit>,
}

impl PdfAudit {
    pub fn is_complete(&self) -> bool {
        self.sections.iter().all(|s| s.missing.is_empty())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuditSummary {
    pub audits: Vec<PdfAudit>,
    pub failures: Vec<PdfFailure>,
}

impl AuditSummary {
    pub fn missing(&self) -> usize {
        self.audits
            .iter()
            .flat_map(|a| &a.sections)
            .map(|s| s.missing.len())
            .sum()
    }
}

/// Audit every job; catalog errors are logged and collected.
pub fn audit(jobs: &[PdfJob], catalog: &ConfigCatalog, output_root: &Path) -> AuditSummary {
    let mut summary = AuditSummary::default();
    for job in jobs {
        match catalog.resolve(&job.path) {
            Ok(processing) => {
                let result = audit_job(job, &processing, output_root);
                for s in result.sections.iter().filter(|s| !s.missing.is_empty()) {
                    error!(
                        target: PROCESS_TARGET,
                        "{}: [{}] Eksik sorular: {:?}",
                        job.path.display(),
                        s.name,
                        s.missing
                    );
                }
                summary.audits.push(result);
            }
            Err(e) => {
                error!(target: PROCESS_TARGET, "{}", e);
                summary.failures.push(PdfFailure {
                    path: job.path.clone(),
                    configuration: e.is_configuration(),
                    error: e.to_string(),
                });
            }
        }
    }
    info!(
        "Audit complete: {} PDFs checked, {} questions missing",
        summary.audits.len(),
        summary.missing()
    );
    summary
}

/// Compare one PDF's declared sections with its output directories.
pub fn audit_job(job: &PdfJob, processing: &ProcessingConfig, output_root: &Path) -> PdfAudit {
    let out_dir = job.output_dir(output_root);
    let sections = processing
        .sections
        .iter()
        .map(|section| {
            let present = images_on_disk(&out_dir.join(&section.output_name));
            let expected = section.expected_count();
            SectionAudit {
                name: section.name.clone(),
                output_name: section.output_name.clone(),
                expected,
                missing: expected
                    .map(|n| missing_questions(n, &present))
                    .unwrap_or_default(),
                present: present.into_iter().collect(),
            }
        })
        .collect();
    PdfAudit {
        job: job.clone(),
        sections,
    }
}

/// Numbers `n` for which `{dir}/{n}.png` exists. A missing directory is
/// simply empty.
fn images_on_disk(dir: &Path) -> BTreeSet<u32> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return BTreeSet::new();
    };
    entries
        .filter_map(|e| e.ok())
        .filter_map(|e| {
            let name = e.file_name();
            let name = name.to_string_lossy();
            name.strip_suffix(".png")?.parse::<u32>().ok()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    const CATALOG: &str = "TYT:\n  tyt.pdf:\n    start_text: T\n    sections:\n      turkce: 4\n      fen: bad\n";

    fn job(root: &Path) -> PdfJob {
        PdfJob {
            exam_type: "TYT".into(),
            year: "2019".into(),
            path: root.join("TYT/2019/tyt.pdf"),
        }
    }

    #[test]
    fn counts_images_and_lists_gaps() {
        let out = tempfile::tempdir().unwrap();
        let dir = out.path().join("TYT/2019/turkce");
        std::fs::create_dir_all(&dir).unwrap();
        for name in ["1.png", "2.png", "4.png", "4.png.tmp", "notes.txt"] {
            std::fs::write(dir.join(name), b"x").unwrap();
        }

        let catalog = ConfigCatalog::from_yaml_str(CATALOG).unwrap();
        let summary = audit(&[job(Path::new("/exams"))], &catalog, out.path());

        assert!(summary.failures.is_empty());
        let a = &summary.audits[0];
        assert!(!a.is_complete());
        assert_eq!(a.sections[0].present, vec![1, 2, 4]);
        assert_eq!(a.sections[0].missing, vec![3]);
        // Invalid count: nothing expected, nothing missing.
        assert_eq!(a.sections[1].expected, None);
        assert!(a.sections[1].missing.is_empty());
        assert_eq!(summary.missing(), 1);
    }

    #[test]
    fn unknown_pdf_is_a_failure() {
        let catalog = ConfigCatalog::from_yaml_str(CATALOG).unwrap();
        let other = PdfJob {
            exam_type: "AYT".into(),
            year: "2020".into(),
            path: PathBuf::from("/exams/AYT/2020/ayt.pdf"),
        };
        let summary = audit(&[other], &catalog, Path::new("/nonexistent"));
        assert!(summary.audits.is_empty());
        assert_eq!(summary.failures.len(), 1);
        assert!(summary.failures[0].configuration);
    }
}
