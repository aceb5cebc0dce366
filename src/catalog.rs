//! The processing catalog: which start marker and which sections each PDF has.
//!
//! A catalog is a YAML document whose shape mirrors the directory layout of
//! the source PDFs. Categories nest to any depth; leaves are keyed by PDF
//! base filename:
//!
//! ```yaml
//! KPSS:
//!   2021-KPSS:
//!     2021-KPSS LİSANS GY-GK.pdf:
//!       start_text: "Bu testte"
//!       sections:
//!         genel-yetenek-testi: 60
//!         genel-kultur-testi: 60
//! TYT:
//!   tyt-2019.pdf:
//!     start_text: "TEMEL YETERLİLİK"
//!     sections: { turkce-testi: 40, sosyal-bilimler-testi: 20 }
//!     aliases: { sosyal-bilimler-testi: sosyal-testi }
//! overrides:
//!   - exam: LYS
//!     year: 2017
//!     sections: { matematik-testi: sayisal-testi }
//! ```
//!
//! Real catalogs were written by hand over several years and are not
//! consistently nested, so lookup is by filename at any depth rather than by
//! path. `overrides` is reserved at the top level: each entry remaps section
//! output directories for one exam type (and optionally one year).

use crate::error::CropError;
use serde_yaml::{Mapping, Value};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Start marker written into scaffolded entries.
pub const DEFAULT_START_MARKER: &str = "Bu testte";

const OVERRIDES_KEY: &str = "overrides";
const ENTRY_KEYS: [&str; 4] = ["start_text", "start_marker", "sections", "aliases"];

/// Declared question count of a section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExpectedCount {
    /// A positive integer.
    Count(u32),
    /// Anything else, kept verbatim for the error message.
    Invalid(String),
}

/// One section of an exam PDF, in declaration order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    /// Name as declared in the catalog.
    pub name: String,
    pub expected: ExpectedCount,
    /// Output directory name; equals `name` unless an alias or override
    /// remaps it.
    pub output_name: String,
}

impl Section {
    /// The declared count when it is a valid positive integer.
    pub fn expected_count(&self) -> Option<u32> {
        match self.expected {
            ExpectedCount::Count(n) => Some(n),
            ExpectedCount::Invalid(_) => None,
        }
    }
}

/// Resolved configuration for one PDF.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessingConfig {
    /// Text whose N-th page occurrence opens the N-th section.
    pub start_marker: String,
    /// Sections in the order they appear in the PDF. Never empty.
    pub sections: Vec<Section>,
}

/// A leaf of the catalog tree, possibly incomplete.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntrySpec {
    pub start_marker: Option<String>,
    pub sections: Vec<Section>,
}

/// A node of the catalog tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatalogNode {
    Category(Vec<(String, CatalogNode)>),
    Entry(EntrySpec),
}

/// Output-directory remapping for one exam type and optionally one year.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionOverride {
    pub exam: String,
    pub year: Option<String>,
    /// `(section name, output directory name)` pairs.
    pub sections: Vec<(String, String)>,
}

impl SectionOverride {
    /// An override applies when the PDF path has a component equal to
    /// `exam` and, if a year is given, a component starting with it
    /// (year directories are often named `2021-KPSS`).
    fn applies_to(&self, pdf_path: &Path) -> bool {
        let components: Vec<String> = pdf_path
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        let exam_matches = components.iter().any(|c| c == &self.exam);
        let year_matches = match &self.year {
            None => true,
            Some(year) => components.iter().any(|c| c.starts_with(year.as_str())),
        };
        exam_matches && year_matches
    }
}

/// The whole catalog, immutable for the duration of a run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigCatalog {
    nodes: Vec<(String, CatalogNode)>,
    overrides: Vec<SectionOverride>,
}

impl ConfigCatalog {
    /// Build a catalog from already-parsed nodes.
    pub fn new(nodes: Vec<(String, CatalogNode)>, overrides: Vec<SectionOverride>) -> Self {
        Self { nodes, overrides }
    }

    /// Read and parse a YAML catalog file.
    pub fn load(path: &Path) -> Result<Self, CropError> {
        let raw = std::fs::read_to_string(path).map_err(|e| CropError::CatalogRead {
            path: path.to_path_buf(),
            source: e,
        })?;
        let catalog = Self::from_yaml_str(&raw)?;
        debug!(
            "Loaded catalog {} ({} top-level categories, {} overrides)",
            path.display(),
            catalog.nodes.len(),
            catalog.overrides.len()
        );
        Ok(catalog)
    }

    /// Parse a YAML catalog document.
    pub fn from_yaml_str(raw: &str) -> Result<Self, CropError> {
        let value: Value =
            serde_yaml::from_str(raw).map_err(|e| CropError::CatalogParse(e.to_string()))?;
        let root = match value {
            Value::Mapping(m) => m,
            Value::Null => Mapping::new(),
            other => {
                return Err(CropError::CatalogParse(format!(
                    "top level must be a mapping, got {}",
                    describe(&other)
                )))
            }
        };

        let mut nodes = Vec::new();
        let mut overrides = Vec::new();
        for (k, v) in &root {
            let key = key_string(k)?;
            if key == OVERRIDES_KEY {
                overrides = parse_overrides(v)?;
            } else {
                nodes.push((key.clone(), parse_node(&key, v)?));
            }
        }
        Ok(Self { nodes, overrides })
    }

    /// Resolve the configuration of `pdf_path` by its base filename.
    ///
    /// Returns [`CropError::ConfigNotFound`] when no entry matches and
    /// [`CropError::IncompleteConfig`] when the matching entry lacks a start
    /// marker or sections.
    pub fn resolve(&self, pdf_path: &Path) -> Result<ProcessingConfig, CropError> {
        let filename = pdf_path
            .file_name()
            .map(|f| f.to_string_lossy().into_owned())
            .ok_or_else(|| CropError::ConfigNotFound {
                path: pdf_path.to_path_buf(),
            })?;

        let entry = find_entry(&self.nodes, &filename).ok_or_else(|| CropError::ConfigNotFound {
            path: pdf_path.to_path_buf(),
        })?;

        let start_marker = match entry.start_marker.as_deref() {
            Some(m) if !m.is_empty() => m.to_string(),
            _ => {
                return Err(CropError::IncompleteConfig {
                    path: pdf_path.to_path_buf(),
                    missing: "start_text".into(),
                })
            }
        };
        if entry.sections.is_empty() {
            return Err(CropError::IncompleteConfig {
                path: pdf_path.to_path_buf(),
                missing: "sections".into(),
            });
        }

        let mut sections = entry.sections.clone();
        for ov in self.overrides.iter().filter(|o| o.applies_to(pdf_path)) {
            for (name, output) in &ov.sections {
                for section in sections.iter_mut().filter(|s| &s.name == name) {
                    debug!(
                        "{}: mapped section '{}' from '{}' to '{}'",
                        pdf_path.display(),
                        name,
                        section.output_name,
                        output
                    );
                    section.output_name = output.clone();
                }
            }
        }

        Ok(ProcessingConfig {
            start_marker,
            sections,
        })
    }

    /// Top-level nodes in declaration order.
    pub fn nodes(&self) -> &[(String, CatalogNode)] {
        &self.nodes
    }

    pub fn overrides(&self) -> &[SectionOverride] {
        &self.overrides
    }
}

/// Depth-first search in declaration order; first match wins.
fn find_entry<'a>(nodes: &'a [(String, CatalogNode)], filename: &str) -> Option<&'a EntrySpec> {
    for (key, node) in nodes {
        match node {
            CatalogNode::Entry(spec) if key == filename => return Some(spec),
            CatalogNode::Entry(_) => {}
            CatalogNode::Category(children) => {
                if let Some(found) = find_entry(children, filename) {
                    return Some(found);
                }
            }
        }
    }
    None
}

fn is_pdf_name(key: &str) -> bool {
    key.to_lowercase().ends_with(".pdf")
}

fn parse_node(key: &str, value: &Value) -> Result<CatalogNode, CropError> {
    match value {
        Value::Mapping(m) => {
            let looks_like_entry = m
                .iter()
                .any(|(k, _)| k.as_str().is_some_and(|k| ENTRY_KEYS.contains(&k)));
            if looks_like_entry || is_pdf_name(key) {
                Ok(CatalogNode::Entry(parse_entry(m)?))
            } else {
                let mut children = Vec::with_capacity(m.len());
                for (k, v) in m {
                    let child_key = key_string(k)?;
                    children.push((child_key.clone(), parse_node(&child_key, v)?));
                }
                Ok(CatalogNode::Category(children))
            }
        }
        // `file.pdf: ~` is an entry nobody filled in yet.
        _ => Ok(CatalogNode::Entry(EntrySpec::default())),
    }
}

fn parse_entry(m: &Mapping) -> Result<EntrySpec, CropError> {
    let mut spec = EntrySpec::default();
    let mut aliases: Vec<(String, String)> = Vec::new();

    for (k, v) in m {
        match k.as_str() {
            Some("start_text") | Some("start_marker") => {
                spec.start_marker = v.as_str().map(str::to_string);
            }
            Some("sections") => {
                if let Value::Mapping(sections) = v {
                    for (name, count) in sections {
                        let name = key_string(name)?;
                        spec.sections.push(Section {
                            output_name: name.clone(),
                            name,
                            expected: parse_count(count),
                        });
                    }
                }
            }
            Some("aliases") => aliases = parse_string_pairs(v)?,
            _ => {}
        }
    }

    for (name, output) in aliases {
        for section in spec.sections.iter_mut().filter(|s| s.name == name) {
            section.output_name = output.clone();
        }
    }
    Ok(spec)
}

fn parse_count(value: &Value) -> ExpectedCount {
    match value.as_u64() {
        Some(n) if n > 0 && n <= u64::from(u32::MAX) => ExpectedCount::Count(n as u32),
        _ => ExpectedCount::Invalid(describe(value)),
    }
}

fn parse_overrides(value: &Value) -> Result<Vec<SectionOverride>, CropError> {
    let items = match value {
        Value::Sequence(items) => items,
        Value::Null => return Ok(Vec::new()),
        other => {
            return Err(CropError::CatalogParse(format!(
                "'overrides' must be a list, got {}",
                describe(other)
            )))
        }
    };

    let mut overrides = Vec::with_capacity(items.len());
    for item in items {
        let Value::Mapping(m) = item else {
            return Err(CropError::CatalogParse(format!(
                "override must be a mapping, got {}",
                describe(item)
            )));
        };
        let mut exam = None;
        let mut year = None;
        let mut sections = Vec::new();
        for (k, v) in m {
            match k.as_str() {
                Some("exam") => exam = Some(key_string(v)?),
                Some("year") => year = Some(key_string(v)?),
                Some("sections") => sections = parse_string_pairs(v)?,
                _ => {}
            }
        }
        let exam = exam
            .ok_or_else(|| CropError::CatalogParse("override without 'exam'".to_string()))?;
        overrides.push(SectionOverride {
            exam,
            year,
            sections,
        });
    }
    Ok(overrides)
}

fn parse_string_pairs(value: &Value) -> Result<Vec<(String, String)>, CropError> {
    match value {
        Value::Mapping(m) => m
            .iter()
            .map(|(k, v)| Ok((key_string(k)?, key_string(v)?)))
            .collect(),
        Value::Null => Ok(Vec::new()),
        other => Err(CropError::CatalogParse(format!(
            "expected a mapping, got {}",
            describe(other)
        ))),
    }
}

/// Keys are usually strings, but bare years (`2021:`) parse as numbers.
fn key_string(value: &Value) -> Result<String, CropError> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        other => Err(CropError::CatalogParse(format!(
            "unsupported key {}",
            describe(other)
        ))),
    }
}

fn describe(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => format!("bool {b}"),
        Value::Number(n) => format!("number {n}"),
        Value::String(s) => format!("string {s:?}"),
        Value::Sequence(_) => "a list".to_string(),
        Value::Mapping(_) => "a mapping".to_string(),
        Value::Tagged(t) => format!("tagged value {}", t.tag),
    }
}

// ── Scaffolding ──────────────────────────────────────────────────────────

/// Build a skeleton catalog mirroring the PDF tree under `exam_root`.
///
/// Every PDF becomes an entry with `start_marker` and `sections: null`, to be
/// filled in by hand. Directories without any PDF below them are omitted.
pub fn scaffold(exam_root: &Path, start_marker: &str) -> Result<String, CropError> {
    let tree = scaffold_dir(exam_root, start_marker)?;
    serde_yaml::to_string(&Value::Mapping(tree))
        .map_err(|e| CropError::Internal(format!("catalog serialisation failed: {e}")))
}

fn scaffold_dir(dir: &Path, start_marker: &str) -> Result<Mapping, CropError> {
    let mut entries: Vec<PathBuf> = std::fs::read_dir(dir)
        .map_err(|e| CropError::CatalogRead {
            path: dir.to_path_buf(),
            source: e,
        })?
        .filter_map(|e| e.ok().map(|e| e.path()))
        .collect();
    entries.sort();

    let mut mapping = Mapping::new();
    for path in entries {
        let name = match path.file_name() {
            Some(n) => n.to_string_lossy().into_owned(),
            None => continue,
        };
        if path.is_dir() {
            let child = scaffold_dir(&path, start_marker)?;
            if !child.is_empty() {
                mapping.insert(Value::String(name), Value::Mapping(child));
            }
        } else if is_pdf_name(&name) {
            let mut entry = Mapping::new();
            entry.insert(
                Value::String("start_text".into()),
                Value::String(start_marker.to_string()),
            );
            entry.insert(Value::String("sections".into()), Value::Null);
            mapping.insert(Value::String(name), Value::Mapping(entry));
        }
    }
    Ok(mapping)
}

#[cfg(test)]
mod tests {
    use super::*;

    const ENTRY: &str = "start_text: \"Bu testte\"\n    sections:\n      matematik-testi: 40\n      fen-testi: 20";

    fn catalog(yaml: &str) -> ConfigCatalog {
        ConfigCatalog::from_yaml_str(yaml).expect("valid catalog")
    }

    fn expected_config() -> ProcessingConfig {
        ProcessingConfig {
            start_marker: "Bu testte".into(),
            sections: vec![
                Section {
                    name: "matematik-testi".into(),
                    expected: ExpectedCount::Count(40),
                    output_name: "matematik-testi".into(),
                },
                Section {
                    name: "fen-testi".into(),
                    expected: ExpectedCount::Count(20),
                    output_name: "fen-testi".into(),
                },
            ],
        }
    }

    #[test]
    fn resolves_at_depth_one() {
        let yaml = "TYT:\n  tyt.pdf:\n    start_text: \"Bu testte\"\n    sections:\n      matematik-testi: 40\n      fen-testi: 20\n";
        let cfg = catalog(yaml).resolve(Path::new("/pdfs/TYT/2019/tyt.pdf")).unwrap();
        assert_eq!(cfg, expected_config());
    }

    #[test]
    fn resolves_at_depth_two() {
        let yaml = format!("TYT:\n  2019:\n    tyt.pdf:\n      {}\n", ENTRY.replace("\n    ", "\n      "));
        let cfg = catalog(&yaml).resolve(Path::new("tyt.pdf")).unwrap();
        assert_eq!(cfg, expected_config());
    }

    #[test]
    fn resolves_at_depth_three() {
        let yaml = "TYT:\n  2019:\n    kitapcik-a:\n      tyt.pdf:\n        start_text: \"Bu testte\"\n        sections:\n          matematik-testi: 40\n          fen-testi: 20\n";
        let cfg = catalog(yaml).resolve(Path::new("tyt.pdf")).unwrap();
        assert_eq!(cfg, expected_config());
    }

    #[test]
    fn first_match_in_declaration_order_wins() {
        let yaml = "A:\n  x.pdf:\n    start_text: first\n    sections: { s: 1 }\nB:\n  x.pdf:\n    start_text: second\n    sections: { s: 1 }\n";
        let cfg = catalog(yaml).resolve(Path::new("x.pdf")).unwrap();
        assert_eq!(cfg.start_marker, "first");
    }

    #[test]
    fn unknown_file_is_not_found() {
        let yaml = "TYT:\n  tyt.pdf:\n    start_text: x\n    sections: { s: 1 }\n";
        let err = catalog(yaml).resolve(Path::new("ayt.pdf")).unwrap_err();
        assert!(matches!(err, CropError::ConfigNotFound { .. }));
        assert!(err.to_string().contains("ayt.pdf"));
    }

    #[test]
    fn missing_sections_is_incomplete() {
        let yaml = "TYT:\n  tyt.pdf:\n    start_text: \"Bu testte\"\n    sections: null\n";
        let err = catalog(yaml).resolve(Path::new("tyt.pdf")).unwrap_err();
        match err {
            CropError::IncompleteConfig { missing, .. } => assert_eq!(missing, "sections"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn missing_start_text_is_incomplete() {
        let yaml = "TYT:\n  tyt.pdf:\n    sections: { s: 3 }\n";
        let err = catalog(yaml).resolve(Path::new("tyt.pdf")).unwrap_err();
        assert!(err.is_configuration());
        assert!(matches!(err, CropError::IncompleteConfig { .. }));
    }

    #[test]
    fn null_entry_is_incomplete() {
        let yaml = "TYT:\n  tyt.pdf: ~\n";
        let err = catalog(yaml).resolve(Path::new("tyt.pdf")).unwrap_err();
        assert!(matches!(err, CropError::IncompleteConfig { .. }));
    }

    #[test]
    fn start_marker_alias_is_accepted() {
        let yaml = "x.pdf:\n  start_marker: TEST\n  sections: { a: 2 }\n";
        let cfg = catalog(yaml).resolve(Path::new("x.pdf")).unwrap();
        assert_eq!(cfg.start_marker, "TEST");
    }

    #[test]
    fn non_positive_counts_are_invalid() {
        let yaml = "x.pdf:\n  start_text: T\n  sections:\n    a: 0\n    b: -3\n    c: \"40\"\n    d: 2.5\n    e: 7\n";
        let cfg = catalog(yaml).resolve(Path::new("x.pdf")).unwrap();
        let counts: Vec<Option<u32>> = cfg.sections.iter().map(Section::expected_count).collect();
        assert_eq!(counts, vec![None, None, None, None, Some(7)]);
        assert!(matches!(&cfg.sections[2].expected, ExpectedCount::Invalid(s) if s.contains("40")));
    }

    #[test]
    fn section_order_is_preserved() {
        let yaml = "x.pdf:\n  start_text: T\n  sections:\n    zeta: 1\n    alpha: 1\n    mid: 1\n";
        let cfg = catalog(yaml).resolve(Path::new("x.pdf")).unwrap();
        let names: Vec<&str> = cfg.sections.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["zeta", "alpha", "mid"]);
    }

    #[test]
    fn entry_aliases_rename_output_directories() {
        let yaml = "x.pdf:\n  start_text: T\n  sections: { sosyal-bilimler-testi: 20 }\n  aliases: { sosyal-bilimler-testi: sosyal-testi }\n";
        let cfg = catalog(yaml).resolve(Path::new("x.pdf")).unwrap();
        assert_eq!(cfg.sections[0].name, "sosyal-bilimler-testi");
        assert_eq!(cfg.sections[0].output_name, "sosyal-testi");
    }

    #[test]
    fn overrides_apply_only_to_matching_exam_and_year() {
        let yaml = "LYS:\n  lys.pdf:\n    start_text: T\n    sections: { matematik-testi: 50 }\noverrides:\n  - exam: LYS\n    year: 2017\n    sections: { matematik-testi: sayisal-testi }\n";
        let cat = catalog(yaml);
        assert_eq!(cat.overrides().len(), 1);

        let hit = cat.resolve(Path::new("EXAM_PDFS/LYS/2017-LYS/lys.pdf")).unwrap();
        assert_eq!(hit.sections[0].output_name, "sayisal-testi");

        let miss = cat.resolve(Path::new("EXAM_PDFS/LYS/2018/lys.pdf")).unwrap();
        assert_eq!(miss.sections[0].output_name, "matematik-testi");
    }

    #[test]
    fn non_mapping_top_level_is_rejected() {
        let err = ConfigCatalog::from_yaml_str("- a\n- b\n").unwrap_err();
        assert!(matches!(err, CropError::CatalogParse(_)));
    }

    #[test]
    fn scaffold_mirrors_pdf_tree() {
        let dir = tempfile::tempdir().unwrap();
        let year = dir.path().join("KPSS").join("2021");
        std::fs::create_dir_all(&year).unwrap();
        std::fs::create_dir_all(dir.path().join("EMPTY")).unwrap();
        std::fs::write(year.join("gy-gk.PDF"), b"%PDF-1.4").unwrap();
        std::fs::write(year.join("notes.txt"), b"x").unwrap();

        let yaml = scaffold(dir.path(), DEFAULT_START_MARKER).unwrap();
        assert!(yaml.contains("gy-gk.PDF"), "got:\n{yaml}");
        assert!(!yaml.contains("notes.txt"));
        assert!(!yaml.contains("EMPTY"));

        let cat = catalog(&yaml);
        let err = cat.resolve(Path::new("gy-gk.PDF")).unwrap_err();
        assert!(matches!(err, CropError::IncompleteConfig { .. }));
    }
}
