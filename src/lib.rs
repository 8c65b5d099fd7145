//! RFox Export Engine
//!
//! Captures rendered page regions as rasters and assembles them into
//! paginated, fixed-page-size PDF documents. Oversized captures are split
//! across pages and several independently captured regions can be composed
//! into one ordered, titled document.
//!
//! # Features
//!
//! - **Pluggable capture**: any [`Rasterizer`] can feed the engine; files and
//!   JSON manifests are supported out of the box, headless Chrome behind the
//!   `cdp` feature
//! - **Pluggable output**: any [`DocumentEncoder`]; the default is a
//!   `lopdf`-backed [`pdf::PdfEncoder`]
//! - **Async facade**: [`async_api::ExportService`] runs exports on a
//!   dedicated worker thread
//!
//! # Example
//!
//! ```no_run
//! use rfexport::{ExportOptions, Exporter, PageFormat, RegionSection};
//! use rfexport::rendering::raster::FileRasterizer;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let rasterizer = FileRasterizer::open("captures")?;
//! let mut exporter = Exporter::new(rasterizer);
//!
//! let options = ExportOptions {
//!     filename: "report.pdf".to_string(),
//!     page_format: PageFormat::Letter,
//!     ..Default::default()
//! };
//! exporter.export_sections(
//!     &[
//!         RegionSection::new("overview", "Overview"),
//!         RegionSection::new("revenue", "Revenue"),
//!     ],
//!     &options,
//! )?;
//! # Ok(())
//! # }
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;

pub mod error;
pub use error::{Error, Result};

pub mod assembler;
pub mod async_api;
pub mod pdf;
pub mod rendering;

// Chrome DevTools Protocol rasterizer
#[cfg(feature = "cdp")]
pub mod cdp;

pub use assembler::{Exporter, SectionReport};
pub use async_api::ExportService;
pub use rendering::layout::{plan_pages, PagePlan, PageSlice};
pub use rendering::raster::CapturedRegion;

/// Physical page format of the exported document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PageFormat {
    #[default]
    A4,
    Letter,
    Legal,
}

/// Page orientation of the exported document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Orientation {
    #[default]
    Portrait,
    Landscape,
}

impl FromStr for PageFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "a4" => Ok(PageFormat::A4),
            "letter" => Ok(PageFormat::Letter),
            "legal" => Ok(PageFormat::Legal),
            other => Err(Error::ConfigError(format!("unknown page format '{}'", other))),
        }
    }
}

impl FromStr for Orientation {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "portrait" => Ok(Orientation::Portrait),
            "landscape" => Ok(Orientation::Landscape),
            other => Err(Error::ConfigError(format!("unknown orientation '{}'", other))),
        }
    }
}

/// Physical page dimensions in millimeters
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PageSize {
    pub width_mm: f64,
    pub height_mm: f64,
}

impl PageSize {
    /// Page dimensions for a format/orientation pair.
    ///
    /// Width follows the format only (A4 is 210mm, Letter and Legal share
    /// 216mm) and height follows the orientation only (297mm portrait, 210mm
    /// landscape).
    pub fn for_format(format: PageFormat, orientation: Orientation) -> Self {
        let width_mm = match format {
            PageFormat::A4 => 210.0,
            PageFormat::Letter | PageFormat::Legal => 216.0,
        };
        let height_mm = match orientation {
            Orientation::Portrait => 297.0,
            Orientation::Landscape => 210.0,
        };
        Self { width_mm, height_mm }
    }
}

/// Options for a single export call
///
/// The defaults mirror what the dashboard export buttons use: A4 portrait,
/// 2x capture scale and near-lossless JPEG quality.
///
/// # Examples
///
/// ```
/// let opts = rfexport::ExportOptions::default();
/// assert_eq!(opts.scale, 2.0);
/// assert!(opts.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ExportOptions {
    /// Output file name (`.pdf` is appended when there is no extension)
    pub filename: String,
    /// JPEG quality used for embedded page images, in (0, 1]
    pub quality: f64,
    /// Device pixel ratio requested from the rasterizer, > 0
    pub scale: f64,
    /// Physical page format
    pub page_format: PageFormat,
    /// Page orientation
    pub orientation: Orientation,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            filename: "export.pdf".to_string(),
            quality: 0.98,
            scale: 2.0,
            page_format: PageFormat::A4,
            orientation: Orientation::Portrait,
        }
    }
}

impl ExportOptions {
    /// Check value ranges; returns `Error::ConfigError` describing the first violation.
    pub fn validate(&self) -> Result<()> {
        if self.filename.trim().is_empty() {
            return Err(Error::ConfigError("filename must not be empty".into()));
        }
        if !(self.quality > 0.0 && self.quality <= 1.0) {
            return Err(Error::ConfigError(format!(
                "quality must be in (0, 1], got {}",
                self.quality
            )));
        }
        if !(self.scale > 0.0 && self.scale.is_finite()) {
            return Err(Error::ConfigError(format!(
                "scale must be a positive number, got {}",
                self.scale
            )));
        }
        Ok(())
    }

    /// Page dimensions implied by `page_format` and `orientation`.
    pub fn page_size(&self) -> PageSize {
        PageSize::for_format(self.page_format, self.orientation)
    }

    /// Load options from a JSON file; missing fields take their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let opts: ExportOptions = serde_json::from_str(&raw).map_err(|e| {
            Error::ConfigError(format!("{}: {}", path.as_ref().display(), e))
        })?;
        opts.validate()?;
        Ok(opts)
    }
}

/// One capturable region and the title it gets in a multi-section export
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegionSection {
    pub id: String,
    pub display_name: String,
}

impl RegionSection {
    pub fn new(id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
        }
    }
}

/// Background fill used behind transparent capture pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgb(pub u8, pub u8, pub u8);

impl Rgb {
    pub const WHITE: Rgb = Rgb(255, 255, 255);
}

/// Parameters handed to a [`Rasterizer`] for one capture
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureRequest {
    /// Device pixel ratio
    pub scale: f64,
    /// Fill color behind transparent content
    pub background: Rgb,
    /// Whether cross-origin images may be drawn into the capture
    pub allow_cross_origin: bool,
    /// Whether the rasterizer may wait on user-facing interaction (animations, logging UI)
    pub interactive: bool,
    /// Explicit capture width in CSS pixels; `None` means the region's full content extent
    pub width: Option<u32>,
    /// Explicit capture height in CSS pixels; `None` means the region's full content extent
    pub height: Option<u32>,
}

impl CaptureRequest {
    /// The request used by both export paths: full extent, white background.
    pub fn for_export(options: &ExportOptions) -> Self {
        Self {
            scale: options.scale,
            background: Rgb::WHITE,
            allow_cross_origin: true,
            interactive: false,
            width: None,
            height: None,
        }
    }
}

/// Produces pixels for a named screen region
pub trait Rasterizer {
    /// Capture `region_id`. Returns `Error::RegionNotFound` when the id does not
    /// resolve to a live region.
    fn capture(&mut self, region_id: &str, request: &CaptureRequest) -> Result<CapturedRegion>;
}

impl<R: Rasterizer + ?Sized> Rasterizer for Box<R> {
    fn capture(&mut self, region_id: &str, request: &CaptureRequest) -> Result<CapturedRegion> {
        (**self).capture(region_id, request)
    }
}

/// Stateful page-drawing builder that finally persists a document
///
/// Coordinates are millimeters with the origin at the top-left corner of the
/// current page. A new encoder already holds one empty page.
pub trait DocumentEncoder {
    /// Create an encoder for the page size and quality in `options`
    fn new(options: &ExportOptions) -> Result<Self>
    where
        Self: Sized;

    /// Start a new page; subsequent drawing goes there
    fn new_page(&mut self) -> Result<()>;

    /// Draw `image` scaled to `width_mm` x `height_mm` with its top-left corner at (`x_mm`, `y_mm`).
    /// Content outside the page is clipped.
    fn draw_image(
        &mut self,
        image: &CapturedRegion,
        x_mm: f64,
        y_mm: f64,
        width_mm: f64,
        height_mm: f64,
    ) -> Result<()>;

    /// Draw a single line of text with its baseline at (`x_mm`, `y_mm`)
    fn draw_text(&mut self, text: &str, x_mm: f64, y_mm: f64, size_pt: f64) -> Result<()>;

    /// Number of pages currently in the document
    fn page_count(&self) -> usize;

    /// Finalize and persist the document under `filename`
    fn save(self, filename: &str) -> Result<()>;
}
