//! Per-section bookkeeping and the end-of-PDF anomaly report.
//!
//! Nothing here is fatal. The report lists questions whose crop height is
//! far from the section's typical height (usually a merged or truncated
//! crop) and question numbers that were never produced, so an operator
//! knows exactly which images need manual work.

use crate::catalog::{ExpectedCount, Section};
use crate::error::QuestionError;
use crate::pipeline::input::PdfJob;
use crate::PROCESS_TARGET;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::PathBuf;
use tracing::{error, info, warn};

const SEPARATOR: &str = "------------------------------------------------";

/// Heights outside `[LOW, HIGH] × reference` are anomalous.
const LOW: f32 = 0.5;
const HIGH: f32 = 1.5;

/// What has been produced so far for one section of one PDF.
#[derive(Debug, Clone, Default)]
pub struct SectionProgress {
    produced: BTreeSet<u32>,
    /// `(question, height)` in processing order.
    heights: Vec<(u32, f32)>,
}

impl SectionProgress {
    pub fn record(&mut self, question: u32, height: f32) {
        if self.produced.insert(question) {
            self.heights.push((question, height));
        }
    }

    pub fn is_produced(&self, question: u32) -> bool {
        self.produced.contains(&question)
    }

    pub fn produced(&self) -> &BTreeSet<u32> {
        &self.produced
    }

    pub fn heights(&self) -> &[(u32, f32)] {
        &self.heights
    }
}

/// Direction of a height anomaly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyKind {
    TooLarge,
    TooSmall,
}

impl AnomalyKind {
    /// Word used in the process log.
    pub fn label(&self) -> &'static str {
        match self {
            AnomalyKind::TooLarge => "buyuk",
            AnomalyKind::TooSmall => "kucuk",
        }
    }
}

/// A crop whose height deviates from the section's reference height.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeightAnomaly {
    pub kind: AnomalyKind,
    /// 1-based position in processing order.
    pub position: usize,
    pub question: u32,
    pub height: f32,
    pub reference: f32,
}

/// Outcome for one declared section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectionReport {
    pub name: String,
    pub output_name: String,
    /// `None` when the declared count is invalid.
    pub expected: Option<u32>,
    /// Set when the declared count is not a positive integer.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub invalid_count: Option<String>,
    pub produced: Vec<u32>,
    pub missing: Vec<u32>,
    pub anomalies: Vec<HeightAnomaly>,
}

/// Everything that happened to one PDF.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PdfReport {
    pub job: PdfJob,
    pub pages: usize,
    /// Images rendered during this run.
    pub written: usize,
    /// Images already on disk and left untouched.
    pub already_present: usize,
    pub sections: Vec<SectionReport>,
    pub failures: Vec<QuestionError>,
}

impl PdfReport {
    /// Images present for this PDF after the run, new or cached.
    pub fn produced(&self) -> usize {
        self.sections.iter().map(|s| s.produced.len()).sum()
    }

    pub fn missing(&self) -> usize {
        self.sections.iter().map(|s| s.missing.len()).sum()
    }
}

/// A PDF that could not be processed at all.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PdfFailure {
    pub path: PathBuf,
    pub error: String,
    /// `true` for catalog problems (no entry, incomplete entry).
    pub configuration: bool,
}

/// Result of a whole run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub reports: Vec<PdfReport>,
    pub failures: Vec<PdfFailure>,
    pub duration_ms: u64,
}

impl RunSummary {
    pub fn total_pdfs(&self) -> usize {
        self.reports.len() + self.failures.len()
    }

    pub fn written(&self) -> usize {
        self.reports.iter().map(|r| r.written).sum()
    }

    pub fn missing(&self) -> usize {
        self.reports.iter().map(PdfReport::missing).sum()
    }

    pub fn anomalies(&self) -> usize {
        self.reports
            .iter()
            .flat_map(|r| &r.sections)
            .map(|s| s.anomalies.len())
            .sum()
    }
}

/// Height rounded to two decimals in shortest form: `10.0`, `10.25`, `33.33`.
pub fn format_height(value: f32) -> String {
    let rounded = (f64::from(value) * 100.0).round() / 100.0;
    let text = rounded.to_string();
    if text.contains('.') || !rounded.is_finite() {
        text
    } else {
        format!("{text}.0")
    }
}

/// Median; the mean of the two middle values for even counts.
pub fn median(values: &[f32]) -> Option<f32> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    Some(if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    })
}

/// Mean of the heights within `[0.5, 1.5] × median`, or the median when
/// none qualify.
pub fn reference_height(heights: &[f32]) -> Option<f32> {
    let m = median(heights)?;
    let kept: Vec<f32> = heights
        .iter()
        .copied()
        .filter(|&h| h >= LOW * m && h <= HIGH * m)
        .collect();
    if kept.is_empty() {
        Some(m)
    } else {
        Some(kept.iter().sum::<f32>() / kept.len() as f32)
    }
}

/// Flag heights above `1.5 × reference` or below `0.5 × reference`.
pub fn height_anomalies(heights: &[(u32, f32)]) -> Vec<HeightAnomaly> {
    let values: Vec<f32> = heights.iter().map(|&(_, h)| h).collect();
    let Some(reference) = reference_height(&values) else {
        return Vec::new();
    };
    heights
        .iter()
        .enumerate()
        .filter_map(|(i, &(question, height))| {
            let kind = if height > HIGH * reference {
                AnomalyKind::TooLarge
            } else if height < LOW * reference {
                AnomalyKind::TooSmall
            } else {
                return None;
            };
            Some(HeightAnomaly {
                kind,
                position: i + 1,
                question,
                height,
                reference,
            })
        })
        .collect()
}

/// `{1..=expected} − produced`, ascending.
pub fn missing_questions(expected: u32, produced: &BTreeSet<u32>) -> Vec<u32> {
    (1..=expected).filter(|n| !produced.contains(n)).collect()
}

/// Build the report for every declared section, in declaration order.
///
/// `progress` holds one entry per section that was reached in the PDF.
pub fn summarise_sections(
    sections: &[Section],
    progress: &[(String, SectionProgress)],
) -> Vec<SectionReport> {
    let empty = SectionProgress::default();
    sections
        .iter()
        .map(|section| {
            let p = progress
                .iter()
                .find(|(name, _)| name == &section.name)
                .map(|(_, p)| p)
                .unwrap_or(&empty);
            let (expected, invalid_count) = match &section.expected {
                ExpectedCount::Count(n) => (Some(*n), None),
                ExpectedCount::Invalid(raw) => (None, Some(raw.clone())),
            };
            SectionReport {
                name: section.name.clone(),
                output_name: section.output_name.clone(),
                expected,
                invalid_count,
                produced: p.produced().iter().copied().collect(),
                missing: expected
                    .map(|n| missing_questions(n, p.produced()))
                    .unwrap_or_default(),
                anomalies: height_anomalies(p.heights()),
            }
        })
        .collect()
}

/// Write the anomaly report of one PDF to the process log.
pub fn log_report(sections: &[SectionReport]) {
    for s in sections.iter().filter(|s| !s.produced.is_empty()) {
        info!(target: PROCESS_TARGET, "{}", SEPARATOR);
        for a in &s.anomalies {
            warn!(
                target: PROCESS_TARGET,
                "[{}] Soru {} {}. Yukseklik: {} (ortalama yukseklik: {}).",
                s.name,
                a.position,
                a.kind.label(),
                format_height(a.height),
                format_height(a.reference)
            );
        }
    }

    for s in sections {
        if let Some(raw) = &s.invalid_count {
            error!(
                target: PROCESS_TARGET,
                "[{}] Invalid question count: expected a positive integer, got {}.", s.name, raw
            );
        } else if !s.missing.is_empty() {
            error!(target: PROCESS_TARGET, "{}", SEPARATOR);
            error!(target: PROCESS_TARGET, "[{}] Eksik sorular: {:?}", s.name, s.missing);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn numbered(heights: &[f32]) -> Vec<(u32, f32)> {
        heights
            .iter()
            .enumerate()
            .map(|(i, &h)| (i as u32 + 1, h))
            .collect()
    }

    #[test]
    fn heights_print_like_two_decimal_rounding() {
        assert_eq!(format_height(10.0), "10.0");
        assert_eq!(format_height(50.0), "50.0");
        assert_eq!(format_height(10.25), "10.25");
        assert_eq!(format_height(33.333_33), "33.33");
        assert_eq!(format_height(12.5), "12.5");
    }

    #[test]
    fn median_handles_odd_and_even_counts() {
        assert_eq!(median(&[3.0, 1.0, 2.0]), Some(2.0));
        assert_eq!(median(&[4.0, 1.0, 3.0, 2.0]), Some(2.5));
        assert_eq!(median(&[]), None);
    }

    #[test]
    fn tall_outlier_is_flagged_too_large() {
        let anomalies = height_anomalies(&numbered(&[10.0, 10.0, 10.0, 10.0, 50.0]));
        assert_eq!(anomalies.len(), 1);
        let a = &anomalies[0];
        assert_eq!(a.kind, AnomalyKind::TooLarge);
        assert_eq!(a.position, 5);
        assert_eq!(a.height, 50.0);
        assert_eq!(a.reference, 10.0);
    }

    #[test]
    fn short_outlier_is_flagged_too_small() {
        let anomalies = height_anomalies(&numbered(&[10.0, 10.0, 10.0, 10.0, 2.0]));
        assert_eq!(anomalies.len(), 1);
        assert_eq!(anomalies[0].kind, AnomalyKind::TooSmall);
        assert_eq!(anomalies[0].position, 5);
        assert_eq!(anomalies[0].kind.label(), "kucuk");
    }

    #[test]
    fn uniform_heights_have_no_anomalies() {
        assert!(height_anomalies(&numbered(&[80.0, 95.0, 90.0, 110.0])).is_empty());
        assert!(height_anomalies(&[]).is_empty());
    }

    #[test]
    fn position_differs_from_question_number() {
        // Question 2 was never produced, so question 6 sits at position 5.
        let heights = vec![(1, 10.0), (3, 10.0), (4, 10.0), (5, 10.0), (6, 50.0)];
        let a = &height_anomalies(&heights)[0];
        assert_eq!((a.position, a.question), (5, 6));
    }

    #[test]
    fn reference_falls_back_to_median() {
        // Even count: the median 50.5 is not itself a sample, and neither
        // sample lies within [25.25, 75.75].
        assert_eq!(reference_height(&[1.0, 100.0]), Some(50.5));
        assert_eq!(reference_height(&[1.0, 10.0, 100.0]), Some(10.0));
    }

    #[test]
    fn missing_is_sorted_difference() {
        let produced: BTreeSet<u32> = [1, 2, 4].into_iter().collect();
        assert_eq!(missing_questions(5, &produced), vec![3, 5]);
        assert!(missing_questions(3, &[1, 2, 3].into_iter().collect()).is_empty());
    }

    #[test]
    fn progress_ignores_duplicates() {
        let mut p = SectionProgress::default();
        p.record(1, 100.0);
        p.record(1, 300.0);
        p.record(2, 90.0);
        assert_eq!(p.heights(), &[(1, 100.0), (2, 90.0)]);
        assert!(p.is_produced(2));
        assert!(!p.is_produced(3));
    }

    #[test]
    fn sections_are_summarised_in_declaration_order() {
        let sections = vec![
            Section {
                name: "turkce".into(),
                expected: ExpectedCount::Count(3),
                output_name: "turkce".into(),
            },
            Section {
                name: "fen".into(),
                expected: ExpectedCount::Invalid("null".into()),
                output_name: "fen".into(),
            },
            Section {
                name: "sosyal".into(),
                expected: ExpectedCount::Count(2),
                output_name: "sosyal-testi".into(),
            },
        ];
        let mut turkce = SectionProgress::default();
        turkce.record(2, 50.0);
        let reports = summarise_sections(&sections, &[("turkce".into(), turkce)]);

        assert_eq!(reports.len(), 3);
        assert_eq!(reports[0].missing, vec![1, 3]);
        assert_eq!(reports[1].expected, None);
        assert_eq!(reports[1].invalid_count.as_deref(), Some("null"));
        assert!(reports[1].missing.is_empty());
        assert_eq!(reports[2].missing, vec![1, 2]);
        assert_eq!(reports[2].output_name, "sosyal-testi");
    }
}
