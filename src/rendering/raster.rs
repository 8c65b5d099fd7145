//! Captured rasters and a rasterizer backed by pre-rendered image files.
//!
//! `FileRasterizer` resolves region ids either against a directory
//! (`<dir>/<id>.png`, `.jpg` or `.jpeg`) or against a JSON manifest:
//!
//! ```json
//! { "regions": { "revenue": "captures/revenue.png", "kpis": "data:image/png;base64,..." } }
//! ```

use crate::{CaptureRequest, Error, Rasterizer, Result, Rgb};
use base64::Engine as Base64Engine;
use image::{DynamicImage, ImageFormat, RgbaImage};
use serde::Deserialize;
use std::collections::HashMap;
use std::io::Cursor;
use std::path::{Path, PathBuf};

const EXTENSIONS: [&str; 3] = ["png", "jpg", "jpeg"];

/// The rasterizer's output for one region
#[derive(Debug, Clone, PartialEq)]
pub struct CapturedRegion {
    pub pixel_width: u32,
    pub pixel_height: u32,
    /// Encoded image bytes (PNG or JPEG)
    pub data: Vec<u8>,
}

impl CapturedRegion {
    /// Wrap encoded image bytes, reading the dimensions from the image header.
    pub fn from_encoded(data: Vec<u8>) -> Result<Self> {
        let (pixel_width, pixel_height) = image::ImageReader::new(Cursor::new(&data))
            .with_guessed_format()?
            .into_dimensions()?;
        Ok(Self {
            pixel_width,
            pixel_height,
            data,
        })
    }

    /// Encode an in-memory RGBA buffer as PNG.
    pub fn from_rgba(pixels: &RgbaImage) -> Result<Self> {
        let mut data = Vec::new();
        pixels.write_to(&mut Cursor::new(&mut data), ImageFormat::Png)?;
        Ok(Self {
            pixel_width: pixels.width(),
            pixel_height: pixels.height(),
            data,
        })
    }

    /// Decode the raster into pixels.
    pub fn decode(&self) -> Result<DynamicImage> {
        Ok(image::load_from_memory(&self.data)?)
    }
}

/// Composite `img` over an opaque `background`, dropping the alpha channel's effect.
pub fn flatten_onto(img: &DynamicImage, background: Rgb) -> RgbaImage {
    let mut out = img.to_rgba8();
    let Rgb(br, bg, bb) = background;
    for px in out.pixels_mut() {
        let [r, g, b, a] = px.0;
        if a == 255 {
            continue;
        }
        let alpha = u32::from(a);
        let blend = |fg: u8, bgc: u8| -> u8 {
            ((u32::from(fg) * alpha + u32::from(bgc) * (255 - alpha) + 127) / 255) as u8
        };
        px.0 = [blend(r, br), blend(g, bg), blend(b, bb), 255];
    }
    out
}

/// Decode a `data:` URL into its raw bytes.
pub fn decode_data_url(url: &str) -> Result<Vec<u8>> {
    let rest = url
        .strip_prefix("data:")
        .ok_or_else(|| Error::CaptureError("not a data URL".into()))?;
    let (header, payload) = rest
        .split_once(',')
        .ok_or_else(|| Error::CaptureError("data URL has no payload".into()))?;
    if !header.split(';').any(|part| part == "base64") {
        return Err(Error::CaptureError(
            "only base64 data URLs are supported".into(),
        ));
    }
    base64::engine::general_purpose::STANDARD
        .decode(payload.trim())
        .map_err(|e| Error::CaptureError(format!("invalid base64 payload: {}", e)))
}

#[derive(Debug, Deserialize)]
struct Manifest {
    regions: HashMap<String, String>,
}

#[derive(Debug, Clone)]
enum Source {
    Directory(PathBuf),
    Manifest {
        base: PathBuf,
        regions: HashMap<String, String>,
    },
}

/// Rasterizer that serves captures rendered ahead of time.
#[derive(Debug, Clone)]
pub struct FileRasterizer {
    source: Source,
}

impl FileRasterizer {
    /// Open a capture directory or a JSON manifest file.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if path.is_dir() {
            return Ok(Self::from_dir(path));
        }
        if path.is_file() {
            return Self::from_manifest(path);
        }
        Err(Error::ConfigError(format!(
            "capture source {} does not exist",
            path.display()
        )))
    }

    pub fn from_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            source: Source::Directory(dir.into()),
        }
    }

    pub fn from_manifest(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let manifest: Manifest = serde_json::from_str(&raw)
            .map_err(|e| Error::ConfigError(format!("{}: {}", path.display(), e)))?;
        // relative paths in the manifest are resolved against its own directory
        let base = path.parent().map(Path::to_path_buf).unwrap_or_default();
        Ok(Self {
            source: Source::Manifest {
                base,
                regions: manifest.regions,
            },
        })
    }

    fn load_bytes(&self, region_id: &str) -> Result<Vec<u8>> {
        match &self.source {
            Source::Directory(dir) => {
                if region_id.is_empty() || region_id.contains(['/', '\\']) || region_id.starts_with('.') {
                    return Err(Error::RegionNotFound(region_id.to_string()));
                }
                let found = EXTENSIONS
                    .iter()
                    .map(|ext| dir.join(format!("{}.{}", region_id, ext)))
                    .find(|p| p.is_file())
                    .ok_or_else(|| Error::RegionNotFound(region_id.to_string()))?;
                log::debug!("region '{}' resolved to {}", region_id, found.display());
                Ok(std::fs::read(found)?)
            }
            Source::Manifest { base, regions } => {
                let entry = regions
                    .get(region_id)
                    .ok_or_else(|| Error::RegionNotFound(region_id.to_string()))?;
                if entry.starts_with("data:") {
                    return decode_data_url(entry);
                }
                let path = base.join(entry);
                if !path.is_file() {
                    return Err(Error::RegionNotFound(region_id.to_string()));
                }
                Ok(std::fs::read(path)?)
            }
        }
    }
}

impl Rasterizer for FileRasterizer {
    fn capture(&mut self, region_id: &str, request: &CaptureRequest) -> Result<CapturedRegion> {
        let bytes = self.load_bytes(region_id)?;
        let decoded = image::load_from_memory(&bytes)
            .map_err(|e| Error::CaptureError(format!("{}: {}", region_id, e)))?;

        // pre-rendered captures already carry their pixel density
        if request.scale != 1.0 {
            log::debug!(
                "ignoring scale {} for pre-rendered capture '{}'",
                request.scale,
                region_id
            );
        }

        if decoded.color().has_alpha() {
            return CapturedRegion::from_rgba(&flatten_onto(&decoded, request.background));
        }
        Ok(CapturedRegion {
            pixel_width: decoded.width(),
            pixel_height: decoded.height(),
            data: bytes,
        })
    }
}
