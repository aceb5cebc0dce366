//! Page layout primitives shared by the anchor, bounding-box and raster
//! stages.
//!
//! All coordinates are PDF points with the origin at the top-left corner of
//! the page and y growing downward. Backends that report bottom-left
//! coordinates (pdfium does) must flip them before building a
//! [`PageLayout`].

use crate::error::CropError;
use crate::pipeline::anchors::{ends_with_last_choice, starts_with_question_anchor};
use image::DynamicImage;

/// An axis-aligned rectangle in page points, top-left origin.
#[derive(Debug, Clone, Copy, PartialEq, Default, serde::Serialize, serde::Deserialize)]
pub struct Rect {
    pub left: f32,
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
}

impl Rect {
    pub fn new(left: f32, top: f32, right: f32, bottom: f32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    pub fn width(&self) -> f32 {
        self.right - self.left
    }

    pub fn height(&self) -> f32 {
        self.bottom - self.top
    }

    /// `true` when both sides are strictly positive.
    pub fn is_valid(&self) -> bool {
        self.width() > 0.0 && self.height() > 0.0
    }

    /// Smallest rectangle containing both.
    pub fn union(&self, other: &Rect) -> Rect {
        Rect {
            left: self.left.min(other.left),
            top: self.top.min(other.top),
            right: self.right.max(other.right),
            bottom: self.bottom.max(other.bottom),
        }
    }

    fn overlaps_horizontally(&self, other: &Rect) -> bool {
        self.left < other.right && other.left < self.right
    }
}

/// A paragraph-level block of text with its bounding box.
#[derive(Debug, Clone, PartialEq)]
pub struct TextBlock {
    pub rect: Rect,
    pub text: String,
}

/// Everything the pipeline needs to know about one page.
#[derive(Debug, Clone, Default)]
pub struct PageLayout {
    /// 0-based page index.
    pub index: usize,
    pub width: f32,
    pub height: f32,
    /// Extracted text in reading order, lines separated by `\n`.
    pub text: String,
    /// One entry per `char` of `text`; `None` for generated characters
    /// (line breaks, synthesized spaces) that have no ink on the page.
    pub char_boxes: Vec<Option<Rect>>,
    /// Layout blocks in no particular order.
    pub blocks: Vec<TextBlock>,
}

impl PageLayout {
    /// Locate the first visual occurrence of `needle` on the page.
    ///
    /// Matching ignores whitespace on both sides, so a question stem that
    /// wraps over several lines still matches the page text. The returned
    /// rectangle covers the matched characters on the *first* line only,
    /// so its left/top is where the question starts.
    pub fn find_text(&self, needle: &str) -> Option<Rect> {
        let wanted: Vec<char> = needle.chars().filter(|c| !c.is_whitespace()).collect();
        if wanted.is_empty() {
            return None;
        }

        let text: Vec<char> = self.text.chars().collect();
        let haystack: Vec<(char, usize)> = text
            .iter()
            .enumerate()
            .filter(|(_, c)| !c.is_whitespace())
            .map(|(i, c)| (*c, i))
            .collect();
        if haystack.len() < wanted.len() {
            return None;
        }

        let start = (0..=haystack.len() - wanted.len()).find(|&s| {
            haystack[s..s + wanted.len()]
                .iter()
                .zip(&wanted)
                .all(|((h, _), w)| h == w)
        })?;

        let mut rect: Option<Rect> = None;
        let mut prev_index: Option<usize> = None;
        for &(_, idx) in &haystack[start..start + wanted.len()] {
            if let Some(prev) = prev_index {
                if text[prev..idx].contains(&'\n') {
                    break;
                }
            }
            prev_index = Some(idx);
            if let Some(Some(b)) = self.char_boxes.get(idx) {
                rect = Some(match rect {
                    Some(r) => r.union(b),
                    None => *b,
                });
            }
        }
        rect
    }

    /// Blocks sorted top-to-bottom, then left-to-right.
    pub fn blocks_in_reading_order(&self) -> Vec<&TextBlock> {
        let mut sorted: Vec<&TextBlock> = self.blocks.iter().collect();
        sorted.sort_by(|a, b| {
            a.rect
                .top
                .total_cmp(&b.rect.top)
                .then(a.rect.left.total_cmp(&b.rect.left))
        });
        sorted
    }
}

/// Merge line-level text runs into paragraph blocks.
///
/// A run joins an existing block when it overlaps the block horizontally
/// and starts no further below the block's bottom than half its own
/// height. Runs on the same line join with a space, later lines with `\n`.
///
/// A run opening with a question anchor always starts a new block, and a
/// block whose last choice is `E)` takes no further runs, so tightly set
/// questions never share a block.
pub fn group_into_blocks(mut runs: Vec<TextBlock>) -> Vec<TextBlock> {
    runs.sort_by(|a, b| {
        a.rect
            .top
            .total_cmp(&b.rect.top)
            .then(a.rect.left.total_cmp(&b.rect.left))
    });

    let mut blocks: Vec<TextBlock> = Vec::new();
    for run in runs {
        let max_gap = run.rect.height().max(0.0) * 0.5;
        let target = blocks.iter_mut().rev().find(|b| {
            b.rect.overlaps_horizontally(&run.rect) && run.rect.top - b.rect.bottom <= max_gap
        });
        let target = target.filter(|b| {
            !starts_with_question_anchor(&run.text) && !ends_with_last_choice(&b.text)
        });
        match target {
            Some(block) => {
                let same_line = run.rect.top < block.rect.bottom - run.rect.height() * 0.5;
                block.text.push(if same_line { ' ' } else { '\n' });
                block.text.push_str(&run.text);
                block.rect = block.rect.union(&run.rect);
            }
            None => blocks.push(run),
        }
    }
    blocks
}

/// Read access to an exam PDF, one page at a time.
///
/// The pipeline only ever talks to this trait, so tests can drive it with
/// synthetic pages while production uses pdfium.
pub trait ExamDocument {
    fn page_count(&self) -> usize;

    /// Text and geometry of page `index` (0-based).
    fn layout(&self, index: usize) -> Result<PageLayout, CropError>;

    /// Rasterise `region` of page `index` at `dpi`. Errors are plain
    /// descriptions; the caller attaches the question context.
    fn render_region(&self, index: usize, region: &Rect, dpi: u32) -> Result<DynamicImage, String>;
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Lays `lines` out with 6pt-wide glyphs on 12pt lines starting at (x, y).
    fn page(lines: &[&str], x: f32, y: f32) -> PageLayout {
        let mut text = String::new();
        let mut boxes = Vec::new();
        for (row, line) in lines.iter().enumerate() {
            if row > 0 {
                text.push('\n');
                boxes.push(None);
            }
            let top = y + row as f32 * 12.0;
            for (col, c) in line.chars().enumerate() {
                text.push(c);
                let left = x + col as f32 * 6.0;
                boxes.push(Some(Rect::new(left, top, left + 6.0, top + 10.0)));
            }
        }
        PageLayout {
            index: 0,
            width: 595.0,
            height: 842.0,
            text,
            char_boxes: boxes,
            blocks: Vec::new(),
        }
    }

    #[test]
    fn rect_geometry() {
        let r = Rect::new(10.0, 20.0, 30.0, 60.0);
        assert_eq!(r.width(), 20.0);
        assert_eq!(r.height(), 40.0);
        assert!(r.is_valid());
        assert!(!Rect::new(10.0, 20.0, 10.0, 60.0).is_valid());
        let u = r.union(&Rect::new(0.0, 30.0, 15.0, 70.0));
        assert_eq!(u, Rect::new(0.0, 20.0, 30.0, 70.0));
    }

    #[test]
    fn find_text_returns_first_line_box() {
        let p = page(&["1. What is", "two plus two?", "A) 3 B) 4"], 50.0, 100.0);
        let r = p.find_text("1. What is two plus two?").unwrap();
        assert_eq!(r.left, 50.0);
        assert_eq!(r.top, 100.0);
        assert_eq!(r.bottom, 110.0);
        // "1. What is" is 10 chars, the last being 's' at column 9.
        assert_eq!(r.right, 50.0 + 10.0 * 6.0);
    }

    #[test]
    fn find_text_ignores_whitespace_differences() {
        let p = page(&["12.   Hangisi", "dogrudur?"], 300.0, 40.0);
        let r = p.find_text("12. Hangisi\n  dogrudur?").unwrap();
        assert_eq!((r.left, r.top), (300.0, 40.0));
    }

    #[test]
    fn find_text_returns_first_occurrence() {
        let p = page(&["x 2. a", "2. a"], 0.0, 0.0);
        let r = p.find_text("2. a").unwrap();
        assert_eq!(r.top, 0.0);
        assert_eq!(r.left, 12.0);
    }

    #[test]
    fn find_text_misses_absent_text() {
        let p = page(&["1. soru"], 0.0, 0.0);
        assert!(p.find_text("2. soru").is_none());
        assert!(p.find_text("   ").is_none());
    }

    #[test]
    fn runs_group_into_paragraphs() {
        let run = |l: f32, t: f32, text: &str| TextBlock {
            rect: Rect::new(l, t, l + 200.0, t + 10.0),
            text: text.to_string(),
        };
        let blocks = group_into_blocks(vec![
            run(50.0, 100.0, "1. Stem line one"),
            run(50.0, 112.0, "stem line two"),
            run(50.0, 124.0, "A) x B) y"),
            // Large gap: next question.
            run(50.0, 180.0, "2. Next"),
            // Other column, same height as the first run.
            run(320.0, 100.0, "7. Other column"),
        ]);
        assert_eq!(blocks.len(), 3);
        let first = blocks.iter().find(|b| b.text.starts_with("1.")).unwrap();
        assert_eq!(first.text, "1. Stem line one\nstem line two\nA) x B) y");
        assert_eq!(first.rect.bottom, 134.0);
    }

    #[test]
    fn tightly_spaced_questions_stay_apart() {
        let run = |t: f32, text: &str| TextBlock {
            rect: Rect::new(50.0, t, 250.0, t + 10.0),
            text: text.to_string(),
        };
        let blocks = group_into_blocks(vec![
            run(100.0, "1. Birinci soru"),
            run(112.0, "A) 1 B) 2 C) 3 D) 4 E) 5"),
            run(126.0, "2. Ikinci soru"),
            run(138.0, "A) 6 B) 7 C) 8 D) 9 E) 10"),
            // Directly under a finished choice list.
            run(150.0, "Diger metin"),
        ]);
        let texts: Vec<&str> = blocks.iter().map(|b| b.text.as_str()).collect();
        assert_eq!(
            texts,
            vec![
                "1. Birinci soru\nA) 1 B) 2 C) 3 D) 4 E) 5",
                "2. Ikinci soru\nA) 6 B) 7 C) 8 D) 9 E) 10",
                "Diger metin",
            ]
        );
        assert_eq!(blocks[0].rect.bottom, 122.0);
    }

    #[test]
    fn reading_order_sorts_by_top_then_left() {
        let block = |l: f32, t: f32| TextBlock {
            rect: Rect::new(l, t, l + 10.0, t + 10.0),
            text: String::new(),
        };
        let p = PageLayout {
            blocks: vec![block(300.0, 50.0), block(50.0, 80.0), block(50.0, 50.0)],
            ..Default::default()
        };
        let order: Vec<(f32, f32)> = p
            .blocks_in_reading_order()
            .iter()
            .map(|b| (b.rect.left, b.rect.top))
            .collect();
        assert_eq!(order, vec![(50.0, 50.0), (300.0, 50.0), (50.0, 80.0)]);
    }
}
