//! Page rasterisation: turn a crop rectangle into `{n}.png`.
//!
//! The output directory doubles as a cache. A question whose PNG already
//! exists is never rendered again, which is what makes interrupted runs
//! resumable. Writes go through a temp file and a rename so a crash never
//! leaves a truncated image behind that would be mistaken for a finished
//! one.

use crate::config::CropConfig;
use crate::layout::{ExamDocument, Rect};
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use std::path::{Path, PathBuf};

/// Result of a successful rasterisation call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RasterOutcome {
    /// A new PNG was rendered and written.
    Written,
    /// The PNG was already on disk; nothing was rendered.
    AlreadyPresent,
}

/// Why a question could not be rasterised.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RasterFailure {
    Render(String),
    Write(String),
}

/// `{section_dir}/{n}.png`
pub fn question_path(section_dir: &Path, question: u32) -> PathBuf {
    section_dir.join(format!("{question}.png"))
}

/// Render `region` of page `page` into `target` unless it already exists.
pub fn rasterize(
    doc: &dyn ExamDocument,
    page: usize,
    region: &Rect,
    target: &Path,
    config: &CropConfig,
) -> Result<RasterOutcome, RasterFailure> {
    if target.exists() {
        return Ok(RasterOutcome::AlreadyPresent);
    }

    let rendered = doc
        .render_region(page, region, config.dpi)
        .map_err(RasterFailure::Render)?;
    let mut rgb = rendered.to_rgb8();
    if let Some(size) = config.mask_size {
        apply_corner_mask(&mut rgb, size);
    }

    write_png_atomic(&rgb, target).map_err(RasterFailure::Write)?;
    Ok(RasterOutcome::Written)
}

/// Paint a white `size`×`size` square over the top-left corner, clipped to
/// the image.
pub fn apply_corner_mask(img: &mut RgbImage, size: u32) {
    let w = size.min(img.width());
    let h = size.min(img.height());
    for y in 0..h {
        for x in 0..w {
            img.put_pixel(x, y, Rgb([255, 255, 255]));
        }
    }
}

/// Pixel rectangle `(x, y, width, height)` of `region` in an image rendered
/// at `scale` pixels per point, clamped to the image. `None` when nothing
/// of the region falls inside the image.
pub fn pixel_bounds(
    region: &Rect,
    scale: f32,
    img_width: u32,
    img_height: u32,
) -> Option<(u32, u32, u32, u32)> {
    let clamp = |v: f32, max: u32| (v.max(0.0) as u32).min(max);
    let x0 = clamp((region.left * scale).floor(), img_width);
    let y0 = clamp((region.top * scale).floor(), img_height);
    let x1 = clamp((region.right * scale).ceil(), img_width);
    let y1 = clamp((region.bottom * scale).ceil(), img_height);
    (x1 > x0 && y1 > y0).then_some((x0, y0, x1 - x0, y1 - y0))
}

/// Cut `region` (page points) out of a full-page render.
pub fn crop_rendered_page(
    page_image: &DynamicImage,
    page_width_pt: f32,
    region: &Rect,
) -> Result<DynamicImage, String> {
    if page_width_pt <= 0.0 {
        return Err(format!("page width is {page_width_pt}pt"));
    }
    let scale = page_image.width() as f32 / page_width_pt;
    let (x, y, w, h) = pixel_bounds(region, scale, page_image.width(), page_image.height())
        .ok_or_else(|| {
            format!(
                "region ({:.1}, {:.1}, {:.1}, {:.1}) lies outside the page",
                region.left, region.top, region.right, region.bottom
            )
        })?;
    Ok(page_image.crop_imm(x, y, w, h))
}

/// Write a PNG via `{target}.tmp` and rename it into place.
pub fn write_png_atomic(img: &RgbImage, target: &Path) -> Result<(), String> {
    let tmp = target.with_extension("png.tmp");
    if let Err(e) = img.save_with_format(&tmp, ImageFormat::Png) {
        let _ = std::fs::remove_file(&tmp);
        return Err(e.to_string());
    }
    std::fs::rename(&tmp, target).map_err(|e| {
        let _ = std::fs::remove_file(&tmp);
        e.to_string()
    })
}
