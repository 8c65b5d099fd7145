//! Rendering module: page planning, capture decoding and draw-command recording

pub mod layout;
pub mod paint;
pub mod raster;

/// Millimeters per inch
pub const MM_PER_INCH: f64 = 25.4;

/// PDF points (1/72 inch) per millimeter
pub const PT_PER_MM: f64 = 72.0 / MM_PER_INCH;

/// Convert millimeters to PDF points
pub fn mm_to_pt(mm: f64) -> f64 {
    mm * PT_PER_MM
}
