//! Page layout planning: maps a raster's pixel size onto fixed-size pages.
//!
//! The captured image is always scaled so its width exactly fills the page
//! width. Taller images are split by placing the full image on every page at
//! an increasingly negative vertical offset; the page box clips it so only the
//! next band is visible.

use crate::{Error, ExportOptions, PageSize, Result};
use serde::Serialize;

/// Heights within this distance (mm) of zero count as fully consumed.
const EPSILON_MM: f64 = 1e-6;

/// One placement of the full-height image onto one page
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageSlice {
    /// Top of the visible band, measured from the top of the image
    pub source_offset_mm: f64,
    /// Where the image's top edge is drawn on the page (negative once the image slides up)
    pub dest_offset_mm: f64,
    /// Height of the band of the image visible on this page
    pub height_mm: f64,
    /// Image height still to be placed after this slice
    pub remaining_height_after_mm: f64,
    /// Whether this slice begins a fresh physical page
    pub is_page_start: bool,
}

/// Lazy sequence of [`PageSlice`]s for one captured region.
#[derive(Debug, Clone)]
pub struct PagePlan {
    img_width_mm: f64,
    img_height_mm: f64,
    page_height_mm: f64,
    start_offset_mm: f64,
    consumed_mm: f64,
    emitted: usize,
}

/// Plan the pages for a `pixel_width` x `pixel_height` raster.
///
/// `start_offset_mm` reserves space at the top of the first page (a section
/// title, for instance); later pages use the full page height.
pub fn plan_pages(
    pixel_width: u32,
    pixel_height: u32,
    options: &ExportOptions,
    start_offset_mm: f64,
) -> Result<PagePlan> {
    PagePlan::new(pixel_width, pixel_height, options.page_size(), start_offset_mm)
}

impl PagePlan {
    pub fn new(
        pixel_width: u32,
        pixel_height: u32,
        page: PageSize,
        start_offset_mm: f64,
    ) -> Result<Self> {
        if pixel_width == 0 || pixel_height == 0 {
            return Err(Error::EmptyCapture);
        }
        if !(start_offset_mm >= 0.0 && start_offset_mm < page.height_mm) {
            return Err(Error::ConfigError(format!(
                "start offset {}mm does not fit on a {}mm page",
                start_offset_mm, page.height_mm
            )));
        }

        let img_width_mm = page.width_mm;
        let img_height_mm = f64::from(pixel_height) * page.width_mm / f64::from(pixel_width);

        Ok(Self {
            img_width_mm,
            img_height_mm,
            page_height_mm: page.height_mm,
            start_offset_mm,
            consumed_mm: 0.0,
            emitted: 0,
        })
    }

    /// Width the image is drawn at (always the page width)
    pub fn img_width_mm(&self) -> f64 {
        self.img_width_mm
    }

    /// Full converted height of the image
    pub fn img_height_mm(&self) -> f64 {
        self.img_height_mm
    }

    /// Total number of slices the plan produces, including ones already emitted.
    pub fn total_slices(&self) -> usize {
        let first = self.page_height_mm - self.start_offset_mm;
        let rest = self.img_height_mm - first;
        if rest <= EPSILON_MM {
            1
        } else {
            1 + ((rest - EPSILON_MM) / self.page_height_mm).ceil() as usize
        }
    }

    fn available_on(&self, slice_index: usize) -> f64 {
        if slice_index == 0 {
            self.page_height_mm - self.start_offset_mm
        } else {
            self.page_height_mm
        }
    }
}

impl Iterator for PagePlan {
    type Item = PageSlice;

    fn next(&mut self) -> Option<PageSlice> {
        let remaining = self.img_height_mm - self.consumed_mm;
        // checked before allocating a page so exact multiples leave no empty trailer
        if self.emitted > 0 && remaining <= EPSILON_MM {
            return None;
        }

        let available = self.available_on(self.emitted);
        let height_mm = remaining.min(available);
        let source_offset_mm = self.consumed_mm;
        let dest_offset_mm = if self.emitted == 0 {
            self.start_offset_mm
        } else {
            -source_offset_mm
        };

        self.consumed_mm += height_mm;
        self.emitted += 1;

        let mut remaining_after = self.img_height_mm - self.consumed_mm;
        if remaining_after <= EPSILON_MM {
            remaining_after = 0.0;
        }

        Some(PageSlice {
            source_offset_mm,
            dest_offset_mm,
            height_mm,
            remaining_height_after_mm: remaining_after,
            is_page_start: true,
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = self.total_slices().saturating_sub(self.emitted);
        (left, Some(left))
    }
}

impl ExactSizeIterator for PagePlan {}
