//! Pipeline-wide configuration for question cropping.
//!
//! Every geometric constant and behavioural switch lives in [`CropConfig`],
//! built via its [`CropConfigBuilder`]. The per-PDF knowledge (start marker,
//! section counts) is *not* here: it comes from the catalog, see
//! [`crate::catalog`].

use crate::error::CropError;
use crate::progress::ProgressCallback;
use std::fmt;

/// Lowest accepted rendering resolution.
pub const MIN_DPI: u32 = 72;
/// Highest accepted rendering resolution.
pub const MAX_DPI: u32 = 600;

/// Configuration shared by every PDF in a run.
///
/// Built via [`CropConfig::builder()`] or using [`CropConfig::default()`].
///
/// # Example
/// ```rust
/// use examcrop::CropConfig;
///
/// let config = CropConfig::builder()
///     .dpi(200)
///     .x_margin(15.0)
///     .mask_size(None)
///     .build()
///     .unwrap();
/// assert_eq!(config.dpi, 200);
/// ```
#[derive(Clone)]
pub struct CropConfig {
    /// Rendering DPI. Range: 72–600. Default: 300.
    ///
    /// The zoom factor applied to the 72-dpi PDF coordinate space is
    /// `dpi / 72`, so 300 DPI renders at roughly 4.17×.
    pub dpi: u32,

    /// Width of every crop in PDF points, measured from the anchor's left
    /// edge. Default: 247.
    ///
    /// Exam booklets are two-column; 247pt spans one column.
    pub crop_width: f32,

    /// Points trimmed from the left edge of the crop. Default: 0.
    pub x_margin: f32,

    /// Points added below the last answer block. Default: 10.
    pub y_margin: f32,

    /// Side length in pixels of the white square painted over the image's
    /// top-left corner, hiding the question-number label. `None` disables
    /// the mask. Default: `Some(50)`.
    pub mask_size: Option<u32>,

    /// Discard anchors sitting on the start-marker line and, on every page
    /// that opens a section, wait for question 1 before cropping.
    /// Default: true.
    pub recover_first_question: bool,

    /// PDF user password for encrypted documents.
    pub password: Option<String>,

    /// Number of PDFs processed at once. Default: 1 (sequential).
    pub concurrency: usize,

    /// Per-PDF progress events. Default: None.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for CropConfig {
    fn default() -> Self {
        Self {
            dpi: 300,
            crop_width: 247.0,
            x_margin: 0.0,
            y_margin: 10.0,
            mask_size: Some(50),
            recover_first_question: true,
            password: None,
            concurrency: 1,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for CropConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CropConfig")
            .field("dpi", &self.dpi)
            .field("crop_width", &self.crop_width)
            .field("x_margin", &self.x_margin)
            .field("y_margin", &self.y_margin)
            .field("mask_size", &self.mask_size)
            .field("recover_first_question", &self.recover_first_question)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("concurrency", &self.concurrency)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn ProgressCallback>"),
            )
            .finish()
    }
}

impl CropConfig {
    /// Create a new builder for `CropConfig`.
    pub fn builder() -> CropConfigBuilder {
        CropConfigBuilder {
            config: Self::default(),
        }
    }

    /// Zoom factor relative to the PDF's native 72-dpi space.
    pub fn zoom(&self) -> f32 {
        self.dpi as f32 / 72.0
    }
}

/// Builder for [`CropConfig`].
#[derive(Debug)]
pub struct CropConfigBuilder {
    config: CropConfig,
}

impl CropConfigBuilder {
    pub fn dpi(mut self, dpi: u32) -> Self {
        self.config.dpi = dpi.clamp(MIN_DPI, MAX_DPI);
        self
    }

    pub fn crop_width(mut self, points: f32) -> Self {
        self.config.crop_width = points;
        self
    }

    pub fn x_margin(mut self, points: f32) -> Self {
        self.config.x_margin = points;
        self
    }

    pub fn y_margin(mut self, points: f32) -> Self {
        self.config.y_margin = points;
        self
    }

    /// `None` or `Some(0)` disables the corner mask.
    pub fn mask_size(mut self, px: Option<u32>) -> Self {
        self.config.mask_size = px.filter(|&p| p > 0);
        self
    }

    pub fn recover_first_question(mut self, v: bool) -> Self {
        self.config.recover_first_question = v;
        self
    }

    pub fn password(mut self, pwd: impl Into<String>) -> Self {
        self.config.password = Some(pwd.into());
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<CropConfig, CropError> {
        let c = &self.config;
        if !(c.crop_width.is_finite() && c.crop_width > 0.0) {
            return Err(CropError::InvalidConfig(format!(
                "crop width must be > 0pt, got {}",
                c.crop_width
            )));
        }
        if !(c.x_margin.is_finite() && c.x_margin >= 0.0 && c.x_margin < c.crop_width) {
            return Err(CropError::InvalidConfig(format!(
                "x margin must be in [0, crop width), got {}",
                c.x_margin
            )));
        }
        if !(c.y_margin.is_finite() && c.y_margin >= 0.0) {
            return Err(CropError::InvalidConfig(format!(
                "y margin must be ≥ 0pt, got {}",
                c.y_margin
            )));
        }
        Ok(self.config)
    }
}
