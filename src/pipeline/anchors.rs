//! Text-anchor detection and section tracking.
//!
//! Question anchors are `"<digits>. "` runs anywhere in the page text;
//! answer anchors are `"<A-E>)"`. Both patterns also hit page numbers,
//! footnotes and prose, and later stages tolerate that.

use regex::Regex;
use std::sync::LazyLock;

static QUESTION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([0-9]+)\.\s").expect("valid question regex"));
static ANSWER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[A-E]\)").expect("valid answer regex"));
static LEADING_QUESTION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9]+\.\s").expect("valid leading question regex"));

/// A question-number match in a page's text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuestionAnchor {
    pub number: u32,
    /// Byte range of the whole match within the page text.
    pub span: (usize, usize),
}

/// All question anchors in `page_text`, in text order.
///
/// Zero and numbers that overflow `u32` are dropped.
pub fn locate_question_anchors(page_text: &str) -> Vec<QuestionAnchor> {
    QUESTION_RE
        .captures_iter(page_text)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let number: u32 = caps.get(1)?.as_str().parse().ok()?;
            (number > 0).then_some(QuestionAnchor {
                number,
                span: (whole.start(), whole.end()),
            })
        })
        .collect()
}

/// Choice letters of every answer anchor in `block_text`, in text order.
pub fn locate_answer_anchors(block_text: &str) -> Vec<char> {
    ANSWER_RE
        .find_iter(block_text)
        .filter_map(|m| m.as_str().chars().next())
        .collect()
}

/// `true` when `text` opens with a question anchor.
pub fn starts_with_question_anchor(text: &str) -> bool {
    LEADING_QUESTION_RE.is_match(text)
}

/// `true` when the last answer anchor in `block_text` is the final choice.
pub fn ends_with_last_choice(block_text: &str) -> bool {
    locate_answer_anchors(block_text).last() == Some(&'E')
}

/// Text from anchor `i` up to the next anchor (or the end of the page),
/// trimmed.
pub fn block_text<'a>(page_text: &'a str, anchors: &[QuestionAnchor], i: usize) -> &'a str {
    let start = anchors[i].span.0;
    let end = anchors
        .get(i + 1)
        .map(|next| next.span.0)
        .unwrap_or(page_text.len());
    page_text[start..end].trim()
}

/// Section bookkeeping threaded through the per-page loop of one PDF.
///
/// The N-th page whose text contains the start marker opens the N-th
/// declared section. A page counts once however many times the marker
/// appears on it.
#[derive(Debug, Clone)]
pub struct ScanState {
    marker_pages: usize,
    section_count: usize,
    awaiting_first: bool,
    recovery: bool,
}

impl ScanState {
    pub fn new(section_count: usize, recovery: bool) -> Self {
        Self {
            marker_pages: 0,
            section_count,
            awaiting_first: false,
            recovery,
        }
    }

    /// Advance to a new page and return the 0-based index of the section it
    /// belongs to, or `None` when the page precedes the first marker or
    /// follows the last declared section.
    pub fn enter_page(&mut self, page_text: &str, start_marker: &str) -> Option<usize> {
        if page_text.contains(start_marker) {
            self.marker_pages += 1;
            if self.recovery {
                self.awaiting_first = true;
            }
        }
        self.current_section()
    }

    pub fn current_section(&self) -> Option<usize> {
        (self.marker_pages >= 1 && self.marker_pages <= self.section_count)
            .then(|| self.marker_pages - 1)
    }

    /// Decide whether anchor `number` may be cropped given the
    /// skip-until-question-1 mode. Accepting question 1 leaves the mode.
    pub fn admit(&mut self, number: u32) -> bool {
        if !self.awaiting_first {
            return true;
        }
        if number == 1 {
            self.awaiting_first = false;
            true
        } else {
            false
        }
    }

    /// Re-enter skip-until-question-1 mode, e.g. after an anchor was found
    /// on the start-marker line.
    pub fn await_first_question(&mut self) {
        if self.recovery {
            self.awaiting_first = true;
        }
    }

    pub fn awaiting_first(&self) -> bool {
        self.awaiting_first
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_question_numbers_in_order() {
        let text = "1. Birinci soru\nA) x B) y\n2. Ikinci\n10. Onuncu";
        let nums: Vec<u32> = locate_question_anchors(text).iter().map(|a| a.number).collect();
        assert_eq!(nums, vec![1, 2, 10]);
    }

    #[test]
    fn period_must_be_followed_by_whitespace() {
        let nums: Vec<u32> = locate_question_anchors("3.14 is pi, 0. zero, 7.\tseven")
            .iter()
            .map(|a| a.number)
            .collect();
        assert_eq!(nums, vec![7]);
    }

    #[test]
    fn oversized_numbers_are_dropped() {
        assert!(locate_question_anchors("99999999999. x").is_empty());
    }

    #[test]
    fn answer_letters_a_to_e_only() {
        assert_eq!(
            locate_answer_anchors("A) 1 B) 2 C) 3 F) 4 D) 5 E) 6"),
            vec!['A', 'B', 'C', 'D', 'E']
        );
        assert!(locate_answer_anchors("no choices here (a) b)").is_empty());
    }

    #[test]
    fn leading_question_anchor_and_last_choice() {
        assert!(starts_with_question_anchor("12. Hangisi"));
        assert!(!starts_with_question_anchor("Soru 12. Hangisi"));
        assert!(!starts_with_question_anchor("3.14 pi"));
        assert!(ends_with_last_choice("A) 1 B) 2 C) 3 D) 4 E) 5"));
        assert!(!ends_with_last_choice("A) 1 E) 5 C) 3"));
        assert!(!ends_with_last_choice("no choices"));
    }

    #[test]
    fn block_text_runs_to_next_anchor() {
        let text = "1. First\nA) a\n  2. Second\nE) e  ";
        let anchors = locate_question_anchors(text);
        assert_eq!(block_text(text, &anchors, 0), "1. First\nA) a");
        assert_eq!(block_text(text, &anchors, 1), "2. Second\nE) e");
    }

    #[test]
    fn nth_marker_page_opens_nth_section() {
        let mut state = ScanState::new(2, true);
        assert_eq!(state.enter_page("cover page", "Bu testte"), None);
        assert_eq!(state.enter_page("Bu testte 40 soru", "Bu testte"), Some(0));
        assert_eq!(state.enter_page("1. soru", "Bu testte"), Some(0));
        assert_eq!(
            state.enter_page("Bu testte ... Bu testte", "Bu testte"),
            Some(1)
        );
        assert_eq!(state.enter_page("more", "Bu testte"), Some(1));
        // A third marker page has no declared section.
        assert_eq!(state.enter_page("Bu testte", "Bu testte"), None);
        assert_eq!(state.enter_page("trailing page", "Bu testte"), None);
    }

    #[test]
    fn section_start_waits_for_question_one() {
        let mut state = ScanState::new(1, true);
        state.enter_page("Bu testte", "Bu testte");
        assert!(state.awaiting_first());
        assert!(!state.admit(40));
        assert!(state.admit(1));
        assert!(state.admit(2));
        state.await_first_question();
        assert!(!state.admit(3));
    }

    #[test]
    fn recovery_off_admits_everything() {
        let mut state = ScanState::new(1, false);
        state.enter_page("Bu testte", "Bu testte");
        assert!(!state.awaiting_first());
        state.await_first_question();
        assert!(state.admit(7));
    }
}
