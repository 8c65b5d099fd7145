//! PDF document encoder built on `lopdf`
//!
//! Every captured raster is embedded once as a JPEG image XObject (keyed by
//! the SHA-256 of its encoded bytes) and referenced from each page that shows
//! part of it. Pages clip to their MediaBox, which is what turns a full-height
//! image drawn at a negative offset into one visible band.

use crate::rendering::raster::flatten_onto;
use crate::rendering::mm_to_pt;
use crate::{CapturedRegion, DocumentEncoder, Error, ExportOptions, PageSize, Result, Rgb};
use image::codecs::jpeg::JpegEncoder;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, ObjectId, Stream, StringFormat};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::Path;

const FONT_NAME: &str = "F1";

#[derive(Debug, Clone)]
struct EmbeddedImage {
    name: String,
    id: ObjectId,
}

#[derive(Debug, Default)]
struct PageBuilder {
    operations: Vec<Operation>,
    xobjects: Vec<(String, ObjectId)>,
}

/// `DocumentEncoder` that writes a PDF file
pub struct PdfEncoder {
    page: PageSize,
    jpeg_quality: u8,
    doc: Document,
    pages_id: ObjectId,
    font_id: ObjectId,
    pages: Vec<PageBuilder>,
    images: HashMap<String, EmbeddedImage>,
}

impl PdfEncoder {
    /// Number of distinct image XObjects embedded so far
    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    fn current_page(&mut self) -> &mut PageBuilder {
        if self.pages.is_empty() {
            self.pages.push(PageBuilder::default());
        }
        let last = self.pages.len() - 1;
        &mut self.pages[last]
    }

    fn embed(&mut self, image: &CapturedRegion) -> Result<EmbeddedImage> {
        let digest = hex::encode(Sha256::digest(&image.data));
        if let Some(existing) = self.images.get(&digest) {
            return Ok(existing.clone());
        }

        let decoded = image
            .decode()
            .map_err(|e| Error::EncodingFailed(format!("cannot decode capture: {}", e)))?;
        let rgb = image::DynamicImage::ImageRgba8(flatten_onto(&decoded, Rgb::WHITE)).to_rgb8();

        let mut jpeg = Vec::new();
        JpegEncoder::new_with_quality(&mut jpeg, self.jpeg_quality)
            .encode_image(&rgb)
            .map_err(|e| Error::EncodingFailed(format!("cannot encode page image: {}", e)))?;

        let dict = dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => Object::Integer(i64::from(rgb.width())),
            "Height" => Object::Integer(i64::from(rgb.height())),
            "ColorSpace" => "DeviceRGB",
            "BitsPerComponent" => Object::Integer(8),
            "Filter" => "DCTDecode",
        };
        // already DCT-compressed
        let id = self.doc.add_object(Stream::new(dict, jpeg).with_compression(false));
        let embedded = EmbeddedImage {
            name: format!("Im{}", self.images.len() + 1),
            id,
        };
        log::debug!(
            "embedded {}x{} capture as /{} ({})",
            rgb.width(),
            rgb.height(),
            embedded.name,
            &digest[..12]
        );
        self.images.insert(digest, embedded.clone());
        Ok(embedded)
    }

    fn build(mut self) -> Result<Document> {
        let width_pt = mm_to_pt(self.page.width_mm) as f32;
        let height_pt = mm_to_pt(self.page.height_mm) as f32;
        let media_box = vec![
            Object::Integer(0),
            Object::Integer(0),
            width_pt.into(),
            height_pt.into(),
        ];

        let pages = std::mem::take(&mut self.pages);
        let mut kids = Vec::with_capacity(pages.len());
        for page in pages {
            let content = Content {
                operations: page.operations,
            };
            let content_id = self.doc.add_object(Stream::new(dictionary! {}, content.encode()?));

            let mut xobjects = lopdf::Dictionary::new();
            for (name, id) in page.xobjects {
                xobjects.set(name, Object::Reference(id));
            }
            let resources = dictionary! {
                "Font" => dictionary! { FONT_NAME => Object::Reference(self.font_id) },
                "XObject" => xobjects,
            };
            let page_id = self.doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => Object::Reference(self.pages_id),
                "Contents" => Object::Reference(content_id),
                "Resources" => resources,
            });
            kids.push(Object::Reference(page_id));
        }

        let count = kids.len() as i64;
        let pages_dict = dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => Object::Integer(count),
            "MediaBox" => media_box,
        };
        self.doc
            .objects
            .insert(self.pages_id, Object::Dictionary(pages_dict));

        let catalog_id = self.doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => Object::Reference(self.pages_id),
        });
        let info_id = self.doc.add_object(dictionary! {
            "Producer" => Object::string_literal("rfexport"),
        });
        self.doc.trailer.set("Root", Object::Reference(catalog_id));
        self.doc.trailer.set("Info", Object::Reference(info_id));
        self.doc.compress();
        Ok(self.doc)
    }

    /// Serialize the finished document into memory.
    pub fn into_bytes(self) -> Result<Vec<u8>> {
        let mut doc = self.build()?;
        let mut out = Vec::new();
        doc.save_to(&mut out)
            .map_err(|e| Error::EncodingFailed(format!("cannot serialize PDF: {}", e)))?;
        Ok(out)
    }
}

/// Append `.pdf` when `filename` carries no extension.
pub fn output_path(filename: &str) -> std::path::PathBuf {
    let path = Path::new(filename);
    if path.extension().is_some() {
        path.to_path_buf()
    } else {
        path.with_extension("pdf")
    }
}

/// Map text to single-byte WinAnsi codes; characters the encoding lacks become `?`.
fn encode_win_ansi(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| match u32::from(c) {
            cp @ 0x20..=0x7E | cp @ 0xA0..=0xFF => cp as u8,
            _ => win_ansi_extra(c).unwrap_or(b'?'),
        })
        .collect()
}

/// WinAnsi codes 0x80..=0x9F, which differ from Latin-1
fn win_ansi_extra(c: char) -> Option<u8> {
    let code = match c {
        '\u{20AC}' => 0x80,
        '\u{201A}' => 0x82,
        '\u{0192}' => 0x83,
        '\u{201E}' => 0x84,
        '\u{2026}' => 0x85,
        '\u{2020}' => 0x86,
        '\u{2021}' => 0x87,
        '\u{02C6}' => 0x88,
        '\u{2030}' => 0x89,
        '\u{0160}' => 0x8A,
        '\u{2039}' => 0x8B,
        '\u{0152}' => 0x8C,
        '\u{017D}' => 0x8E,
        '\u{2018}' => 0x91,
        '\u{2019}' => 0x92,
        '\u{201C}' => 0x93,
        '\u{201D}' => 0x94,
        '\u{2022}' => 0x95,
        '\u{2013}' => 0x96,
        '\u{2014}' => 0x97,
        '\u{02DC}' => 0x98,
        '\u{2122}' => 0x99,
        '\u{0161}' => 0x9A,
        '\u{203A}' => 0x9B,
        '\u{0153}' => 0x9C,
        '\u{017E}' => 0x9E,
        '\u{0178}' => 0x9F,
        _ => return None,
    };
    Some(code)
}

impl DocumentEncoder for PdfEncoder {
    fn new(options: &ExportOptions) -> Result<Self> {
        options.validate()?;
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
            "Encoding" => "WinAnsiEncoding",
        });
        let jpeg_quality = (options.quality * 100.0).round().clamp(1.0, 100.0) as u8;

        Ok(Self {
            page: options.page_size(),
            jpeg_quality,
            doc,
            pages_id,
            font_id,
            pages: vec![PageBuilder::default()],
            images: HashMap::new(),
        })
    }

    fn new_page(&mut self) -> Result<()> {
        self.pages.push(PageBuilder::default());
        Ok(())
    }

    fn draw_image(
        &mut self,
        image: &CapturedRegion,
        x_mm: f64,
        y_mm: f64,
        width_mm: f64,
        height_mm: f64,
    ) -> Result<()> {
        if !(width_mm > 0.0 && height_mm > 0.0) {
            return Err(Error::EncodingFailed(format!(
                "image size must be positive, got {}x{}mm",
                width_mm, height_mm
            )));
        }
        let embedded = self.embed(image)?;
        let page_height_mm = self.page.height_mm;

        let w = mm_to_pt(width_mm) as f32;
        let h = mm_to_pt(height_mm) as f32;
        let x = mm_to_pt(x_mm) as f32;
        // PDF origin is bottom-left
        let y = mm_to_pt(page_height_mm - (y_mm + height_mm)) as f32;

        let page = self.current_page();
        if !page.xobjects.iter().any(|(name, _)| *name == embedded.name) {
            page.xobjects.push((embedded.name.clone(), embedded.id));
        }
        page.operations.push(Operation::new("q", vec![]));
        page.operations.push(Operation::new(
            "cm",
            vec![w.into(), 0f32.into(), 0f32.into(), h.into(), x.into(), y.into()],
        ));
        page.operations
            .push(Operation::new("Do", vec![Object::Name(embedded.name.into_bytes())]));
        page.operations.push(Operation::new("Q", vec![]));
        Ok(())
    }

    fn draw_text(&mut self, text: &str, x_mm: f64, y_mm: f64, size_pt: f64) -> Result<()> {
        let x = mm_to_pt(x_mm) as f32;
        let y = mm_to_pt(self.page.height_mm - y_mm) as f32;
        let page = self.current_page();
        page.operations.push(Operation::new("BT", vec![]));
        page.operations.push(Operation::new(
            "Tf",
            vec![Object::Name(FONT_NAME.as_bytes().to_vec()), (size_pt as f32).into()],
        ));
        page.operations.push(Operation::new("Td", vec![x.into(), y.into()]));
        page.operations.push(Operation::new(
            "Tj",
            vec![Object::String(encode_win_ansi(text), StringFormat::Literal)],
        ));
        page.operations.push(Operation::new("ET", vec![]));
        Ok(())
    }

    fn page_count(&self) -> usize {
        self.pages.len()
    }

    fn save(self, filename: &str) -> Result<()> {
        let path = output_path(filename);
        let pages = self.pages.len();
        let bytes = self.into_bytes()?;
        std::fs::write(&path, &bytes).map_err(|e| {
            Error::EncodingFailed(format!("cannot write {}: {}", path.display(), e))
        })?;
        log::info!("wrote {} ({} pages, {} bytes)", path.display(), pages, bytes.len());
        Ok(())
    }
}
