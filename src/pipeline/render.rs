//! pdfium backend: page layout extraction and region rendering.
//!
//! pdfium is not async-safe, so everything here is blocking and the driver
//! calls it from `tokio::task::spawn_blocking`. Each worker binds its own
//! [`Pdfium`] instance.
//!
//! pdfium reports rectangles with a bottom-left origin; they are flipped to
//! the top-left convention of [`crate::layout`] as soon as they leave this
//! module.

use crate::error::CropError;
use crate::layout::{group_into_blocks, ExamDocument, PageLayout, Rect, TextBlock};
use crate::pipeline::raster::crop_rendered_page;
use image::DynamicImage;
use pdfium_render::prelude::*;
use std::cell::RefCell;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Environment variable naming an explicit pdfium shared library.
pub const PDFIUM_LIB_PATH_ENV: &str = "PDFIUM_LIB_PATH";

/// Bind to a pdfium library.
///
/// Lookup order: `PDFIUM_LIB_PATH` (a file or a directory), the examcrop
/// cache directory, the working directory, then the system library path.
pub fn bind_pdfium() -> Result<Pdfium, CropError> {
    let mut tried: Vec<String> = Vec::new();

    for candidate in library_candidates() {
        match Pdfium::bind_to_library(&candidate) {
            Ok(bindings) => {
                debug!("Bound pdfium from {}", candidate.display());
                return Ok(Pdfium::new(bindings));
            }
            Err(e) => tried.push(format!("{}: {:?}", candidate.display(), e)),
        }
    }

    Pdfium::bind_to_system_library()
        .map(Pdfium::new)
        .map_err(|e| {
            tried.push(format!("system library: {e:?}"));
            CropError::PdfiumBindingFailed(tried.join("; "))
        })
}

fn library_candidates() -> Vec<PathBuf> {
    let mut candidates = Vec::new();
    if let Ok(p) = std::env::var(PDFIUM_LIB_PATH_ENV) {
        let p = PathBuf::from(p);
        if p.is_dir() {
            candidates.push(Pdfium::pdfium_platform_library_name_at_path(&p));
        } else {
            candidates.push(p);
        }
    }
    if let Some(cache) = dirs::cache_dir() {
        candidates.push(Pdfium::pdfium_platform_library_name_at_path(
            &cache.join("examcrop"),
        ));
    }
    candidates.push(Pdfium::pdfium_platform_library_name_at_path("./"));
    candidates.retain(|p| p.exists());
    candidates
}

/// An exam PDF opened through pdfium.
pub struct PdfiumDocument<'a> {
    path: PathBuf,
    document: PdfDocument<'a>,
    /// Last full-page render as `(page, dpi, page width in points, image)`.
    /// Consecutive questions almost always share a page.
    last_render: RefCell<Option<(usize, u32, f32, DynamicImage)>>,
}

impl<'a> PdfiumDocument<'a> {
    /// Open `path`, mapping pdfium's load errors onto [`CropError`].
    pub fn open(
        pdfium: &'a Pdfium,
        path: &Path,
        password: Option<&'a str>,
    ) -> Result<Self, CropError> {
        let document = pdfium.load_pdf_from_file(path, password).map_err(|e| {
            let err_str = format!("{:?}", e);
            if err_str.contains("Password") || err_str.contains("password") {
                CropError::PasswordRequired {
                    path: path.to_path_buf(),
                }
            } else {
                CropError::CorruptPdf {
                    path: path.to_path_buf(),
                    detail: err_str,
                }
            }
        })?;

        info!(
            "PDF loaded: {} ({} pages)",
            path.display(),
            document.pages().len()
        );

        Ok(Self {
            path: path.to_path_buf(),
            document,
            last_render: RefCell::new(None),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn page(&self, index: usize) -> Result<PdfPage<'a>, String> {
        let idx = u16::try_from(index).map_err(|_| format!("page index {index} out of range"))?;
        self.document
            .pages()
            .get(idx)
            .map_err(|e| format!("{:?}", e))
    }
}

/// Flip a pdfium rectangle into top-left page coordinates.
fn to_top_left(r: &PdfRect, page_height: f32) -> Rect {
    Rect::new(
        r.left().value,
        page_height - r.top().value,
        r.right().value,
        page_height - r.bottom().value,
    )
}

impl ExamDocument for PdfiumDocument<'_> {
    fn page_count(&self) -> usize {
        self.document.pages().len() as usize
    }

    fn layout(&self, index: usize) -> Result<PageLayout, CropError> {
        let layout_err = |detail: String| CropError::LayoutFailed {
            page: index + 1,
            detail,
        };
        let page = self.page(index).map_err(layout_err)?;
        let width = page.width().value;
        let height = page.height().value;
        let text = page.text().map_err(|e| layout_err(format!("{:?}", e)))?;

        let mut page_text = String::new();
        let mut char_boxes = Vec::new();
        for ch in text.chars().iter() {
            let Some(c) = ch.unicode_char() else {
                continue;
            };
            // pdfium ends lines with a generated "\r\n".
            if c == '\r' {
                continue;
            }
            let bounds = if c.is_whitespace() {
                None
            } else {
                ch.loose_bounds().ok().map(|r| to_top_left(&r, height))
            };
            page_text.push(c);
            char_boxes.push(bounds);
        }

        let runs: Vec<TextBlock> = text
            .segments()
            .iter()
            .filter_map(|segment| {
                let content = segment.text();
                let content = content.trim();
                if content.is_empty() {
                    return None;
                }
                Some(TextBlock {
                    rect: to_top_left(&segment.bounds(), height),
                    text: content.to_string(),
                })
            })
            .collect();

        let blocks = group_into_blocks(runs);
        debug!(
            "Page {}: {} chars, {} blocks",
            index + 1,
            char_boxes.len(),
            blocks.len()
        );

        Ok(PageLayout {
            index,
            width,
            height,
            text: page_text,
            char_boxes,
            blocks,
        })
    }

    fn render_region(&self, index: usize, region: &Rect, dpi: u32) -> Result<DynamicImage, String> {
        let mut cache = self.last_render.borrow_mut();
        let cached = matches!(&*cache, Some((i, d, _, _)) if *i == index && *d == dpi);

        if !cached {
            let page = self.page(index)?;
            let width = page.width().value;
            let height = page.height().value;
            let scale = dpi as f32 / 72.0;

            let render_config = PdfRenderConfig::new()
                .set_target_width((width * scale).round() as i32)
                .set_target_height((height * scale).round() as i32);
            let bitmap = page
                .render_with_config(&render_config)
                .map_err(|e| format!("{:?}", e))?;
            let image = bitmap.as_image();
            debug!(
                "Rendered page {} → {}x{} px",
                index + 1,
                image.width(),
                image.height()
            );
            *cache = Some((index, dpi, width, image));
        }

        match &*cache {
            Some((_, _, width, image)) => crop_rendered_page(image, *width, region),
            None => Err("page render cache is empty".to_string()),
        }
    }
}
