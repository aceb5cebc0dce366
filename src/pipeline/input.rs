//! Input discovery and validation.
//!
//! PDFs live under `{exam_root}/{EXAM_TYPE}/{YEAR}/…/*.pdf`. Every PDF found
//! becomes a [`PdfJob`] carrying the exam type and year taken from the first
//! two path components below the root; those two names also key the output
//! tree. Files are validated by their magic bytes (`%PDF`) before pdfium
//! sees them so callers get a meaningful error rather than a pdfium crash.

use crate::error::CropError;
use crate::PROCESS_TARGET;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::{debug, error};

/// One PDF to process.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct PdfJob {
    pub exam_type: String,
    pub year: String,
    pub path: PathBuf,
}

impl PdfJob {
    /// Build a job for a PDF somewhere below `exam_root`.
    pub fn from_path(exam_root: &Path, pdf: &Path) -> Result<Self, CropError> {
        let relative = pdf
            .strip_prefix(exam_root)
            .map_err(|_| CropError::OutsideExamRoot {
                path: pdf.to_path_buf(),
            })?;
        let parts: Vec<String> = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        // EXAM / YEAR / at least the file itself.
        if parts.len() < 3 {
            return Err(CropError::OutsideExamRoot {
                path: pdf.to_path_buf(),
            });
        }
        Ok(Self {
            exam_type: parts[0].clone(),
            year: parts[1].clone(),
            path: pdf.to_path_buf(),
        })
    }

    /// `{output_root}/{EXAM_TYPE}/{YEAR}`
    pub fn output_dir(&self, output_root: &Path) -> PathBuf {
        output_root.join(&self.exam_type).join(&self.year)
    }
}

/// Check that `path` exists, is readable and starts with `%PDF`.
pub fn validate_pdf(path: &Path) -> Result<(), CropError> {
    if !path.exists() {
        return Err(CropError::FileNotFound {
            path: path.to_path_buf(),
        });
    }

    match std::fs::File::open(path) {
        Ok(mut f) => {
            let mut magic = [0u8; 4];
            if f.read_exact(&mut magic).is_ok() && &magic != b"%PDF" {
                return Err(CropError::NotAPdf {
                    path: path.to_path_buf(),
                    magic,
                });
            }
        }
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            return Err(CropError::PermissionDenied {
                path: path.to_path_buf(),
            });
        }
        Err(_) => {
            return Err(CropError::FileNotFound {
                path: path.to_path_buf(),
            });
        }
    }

    debug!("Validated PDF: {}", path.display());
    Ok(())
}

/// Walk `exam_root` and return every PDF, sorted by path.
///
/// `exam_filter` restricts the walk to one exam-type directory. A missing
/// root is fatal; unreadable directories below it are logged and skipped.
pub fn discover(exam_root: &Path, exam_filter: Option<&str>) -> Result<Vec<PdfJob>, CropError> {
    if !exam_root.is_dir() {
        return Err(CropError::FileNotFound {
            path: exam_root.to_path_buf(),
        });
    }

    let mut jobs = Vec::new();
    for exam_dir in sorted_entries(exam_root) {
        if !exam_dir.is_dir() {
            continue;
        }
        let exam_name = exam_dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        if exam_filter.is_some_and(|f| f != exam_name) {
            continue;
        }
        for year_dir in sorted_entries(&exam_dir) {
            if year_dir.is_dir() {
                collect_pdfs(exam_root, &year_dir, &mut jobs);
            }
        }
    }

    if let Some(filter) = exam_filter {
        if !exam_root.join(filter).is_dir() {
            error!(
                target: PROCESS_TARGET,
                "Exam type directory {} does not exist.",
                exam_root.join(filter).display()
            );
        }
    }

    jobs.sort_by(|a, b| a.path.cmp(&b.path));
    debug!("Discovered {} PDFs under {}", jobs.len(), exam_root.display());
    Ok(jobs)
}

fn collect_pdfs(exam_root: &Path, dir: &Path, jobs: &mut Vec<PdfJob>) {
    for entry in sorted_entries(dir) {
        if entry.is_dir() {
            collect_pdfs(exam_root, &entry, jobs);
        } else if is_pdf(&entry) {
            match PdfJob::from_path(exam_root, &entry) {
                Ok(job) => jobs.push(job),
                Err(e) => error!(target: PROCESS_TARGET, "{}", e),
            }
        }
    }
}

/// Case-insensitive `.pdf` extension check.
pub fn is_pdf(path: &Path) -> bool {
    path.extension()
        .is_some_and(|ext| ext.to_string_lossy().eq_ignore_ascii_case("pdf"))
}

fn sorted_entries(dir: &Path) -> Vec<PathBuf> {
    match std::fs::read_dir(dir) {
        Ok(rd) => {
            let mut entries: Vec<PathBuf> = rd.filter_map(|e| e.ok().map(|e| e.path())).collect();
            entries.sort();
            entries
        }
        Err(e) => {
            error!(
                target: PROCESS_TARGET,
                "Cannot read directory {}: {}",
                dir.display(),
                e
            );
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch(path: &Path, bytes: &[u8]) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, bytes).unwrap();
    }

    #[test]
    fn discovers_pdfs_sorted_with_exam_and_year() {
        let root = tempfile::tempdir().unwrap();
        let r = root.path();
        touch(&r.join("TYT/2019/b.pdf"), b"%PDF");
        touch(&r.join("TYT/2019/a.PDF"), b"%PDF");
        touch(&r.join("TYT/2019/notes.txt"), b"x");
        touch(&r.join("KPSS/2021-KPSS/kitapcik/gy.pdf"), b"%PDF");
        // Directly under the exam type: no year directory.
        touch(&r.join("KPSS/stray.pdf"), b"%PDF");

        let jobs = discover(r, None).unwrap();
        let names: Vec<String> = jobs
            .iter()
            .map(|j| format!("{}/{}/{}", j.exam_type, j.year, j.path.file_name().unwrap().to_string_lossy()))
            .collect();
        assert_eq!(
            names,
            vec!["KPSS/2021-KPSS/gy.pdf", "TYT/2019/a.PDF", "TYT/2019/b.pdf"]
        );
    }

    #[test]
    fn exam_filter_limits_the_walk() {
        let root = tempfile::tempdir().unwrap();
        touch(&root.path().join("TYT/2019/a.pdf"), b"%PDF");
        touch(&root.path().join("AYT/2019/b.pdf"), b"%PDF");
        let jobs = discover(root.path(), Some("AYT")).unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].exam_type, "AYT");
        assert!(discover(root.path(), Some("LGS")).unwrap().is_empty());
    }

    #[test]
    fn missing_root_is_fatal() {
        let err = discover(Path::new("/definitely/not/here"), None).unwrap_err();
        assert!(matches!(err, CropError::FileNotFound { .. }));
    }

    #[test]
    fn job_outside_root_is_rejected() {
        let err = PdfJob::from_path(Path::new("/exams"), Path::new("/other/TYT/2019/a.pdf"))
            .unwrap_err();
        assert!(matches!(err, CropError::OutsideExamRoot { .. }));
        let err = PdfJob::from_path(Path::new("/exams"), Path::new("/exams/TYT/a.pdf")).unwrap_err();
        assert!(matches!(err, CropError::OutsideExamRoot { .. }));
    }

    #[test]
    fn output_dir_mirrors_exam_and_year() {
        let job = PdfJob::from_path(Path::new("/exams"), Path::new("/exams/TYT/2019/a.pdf")).unwrap();
        assert_eq!(job.output_dir(Path::new("out")), PathBuf::from("out/TYT/2019"));
    }

    #[test]
    fn magic_bytes_are_checked() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("good.pdf");
        let bad = dir.path().join("bad.pdf");
        touch(&good, b"%PDF-1.7\n");
        touch(&bad, b"PK\x03\x04zip");
        assert!(validate_pdf(&good).is_ok());
        match validate_pdf(&bad).unwrap_err() {
            CropError::NotAPdf { magic, .. } => assert_eq!(&magic, b"PK\x03\x04"),
            other => panic!("unexpected: {other:?}"),
        }
        assert!(matches!(
            validate_pdf(&dir.path().join("nope.pdf")).unwrap_err(),
            CropError::FileNotFound { .. }
        ));
    }
}
