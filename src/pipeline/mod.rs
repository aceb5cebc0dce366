//! Pipeline stages for question cropping.
//!
//! Each submodule implements one step of the per-PDF loop and is testable
//! on its own; only [`render`] touches pdfium.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ render ──▶ anchors ──▶ bbox ──▶ raster
//! (walk)    (layout)   (regex)     (geometry) (PNG)
//! ```
//!
//! 1. [`input`]  : discover `{EXAM}/{YEAR}/…/*.pdf` and check magic bytes
//! 2. [`render`] : open the PDF with pdfium, extract per-page text, glyph
//!    boxes and blocks, render page regions
//! 3. [`anchors`]: find `"<n>. "` question anchors and `"<A-E>)"` answer
//!    anchors; track which section each page belongs to
//! 4. [`bbox`]   : grow each anchor into a crop rectangle down to its last
//!    answer block
//! 5. [`raster`] : render the rectangle, mask the number label and write
//!    `{n}.png` unless it already exists

pub mod anchors;
pub mod bbox;
pub mod input;
pub mod raster;
pub mod render;
