//! Bounding-box synthesis: from a question anchor to the rectangle that
//! holds its stem and answer choices.
//!
//! The top-left corner is where the question's text first appears on the
//! page. The bottom is the lowest answer-choice block found in the column
//! below it, stopping at the first block that ends with `E)`.

use crate::config::CropConfig;
use crate::layout::{PageLayout, Rect};
use crate::pipeline::anchors::{ends_with_last_choice, locate_answer_anchors};

/// Slack in points when comparing text boxes against block edges; glyph
/// boxes and block boxes come from different extraction calls.
const EDGE_TOLERANCE: f32 = 1.0;

/// Why no rectangle could be produced for an anchor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BoxFailure {
    /// The anchor sits on or above the start-marker line.
    OnMarkerLine,
    /// The block text has no visual occurrence on the page.
    TextNotFound,
    /// No answer block below the anchor.
    NoExtent,
    /// Degenerate geometry.
    EmptyRegion { width: f32, height: f32 },
}

/// Compute the crop rectangle for one question.
///
/// `marker_bottom` is the bottom edge of the start marker's line on this
/// page, passed only when recovery is enabled.
pub fn synthesize(
    layout: &PageLayout,
    block_text: &str,
    marker_bottom: Option<f32>,
    config: &CropConfig,
) -> Result<Rect, BoxFailure> {
    let origin = layout.find_text(block_text).ok_or(BoxFailure::TextNotFound)?;
    let (x0, y0) = (origin.left, origin.top);

    if marker_bottom.is_some_and(|bottom| y0 <= bottom) {
        return Err(BoxFailure::OnMarkerLine);
    }

    let max_y = lowest_answer_edge(layout, x0, y0, config.crop_width);
    if max_y <= y0 {
        return Err(BoxFailure::NoExtent);
    }

    let rect = Rect::new(
        x0 + config.x_margin,
        y0,
        x0 + config.crop_width,
        max_y + config.y_margin,
    );
    if !rect.is_valid() {
        return Err(BoxFailure::EmptyRegion {
            width: rect.width(),
            height: rect.height(),
        });
    }
    Ok(rect)
}

/// Bottom edge of the lowest answer block in the column starting at
/// `(x0, y0)`; `y0` itself when there is none.
fn lowest_answer_edge(layout: &PageLayout, x0: f32, y0: f32, crop_width: f32) -> f32 {
    let mut max_y = y0;
    for block in layout.blocks_in_reading_order() {
        let r = &block.rect;
        let in_column = r.left >= x0 - EDGE_TOLERANCE
            && r.top >= y0 - EDGE_TOLERANCE
            && r.right <= x0 + crop_width + EDGE_TOLERANCE;
        if !in_column {
            continue;
        }
        if locate_answer_anchors(&block.text).is_empty() {
            continue;
        }
        max_y = max_y.max(r.bottom);
        if ends_with_last_choice(&block.text) {
            break;
        }
    }
    max_y
}
