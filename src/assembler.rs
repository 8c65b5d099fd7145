//! Document assembly: capture regions, plan their pages and drive an encoder.
//!
//! Two entry points share one pipeline:
//!
//! - [`Exporter::export_region`] exports a single region and fails fast on any
//!   error.
//! - [`Exporter::export_sections`] exports several titled regions in order,
//!   skipping regions that cannot be found but aborting on any other failure.

use crate::pdf::PdfEncoder;
use crate::rendering::layout::plan_pages;
use crate::{
    CaptureRequest, CapturedRegion, DocumentEncoder, Error, ExportOptions, Rasterizer,
    RegionSection, Result,
};
use serde::Serialize;
use std::marker::PhantomData;

/// Left margin of the timestamp and section titles
pub const LABEL_X_MM: f64 = 10.0;
/// Baseline of the generation timestamp on the first page
pub const TIMESTAMP_Y_MM: f64 = 8.0;
pub const TIMESTAMP_SIZE_PT: f64 = 8.0;
/// Baseline of a section title
pub const TITLE_Y_MM: f64 = 16.0;
pub const TITLE_SIZE_PT: f64 = 16.0;
/// Space reserved above a section's image for its title
pub const TITLE_BAND_MM: f64 = 22.0;

/// Text stamped on the first page of every export
pub fn timestamp_label(now: chrono::DateTime<chrono::Local>) -> String {
    format!("Generated: {}", now.format("%Y-%m-%d %H:%M:%S"))
}

/// Outcome of a multi-section export
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SectionReport {
    /// Ids of sections written to the document, in document order
    pub included: Vec<String>,
    /// Ids of sections whose region could not be found
    pub skipped: Vec<String>,
    /// Total pages in the document
    pub pages: usize,
}

impl SectionReport {
    pub fn is_complete(&self) -> bool {
        self.skipped.is_empty()
    }
}

/// Drives a [`Rasterizer`] and a [`DocumentEncoder`] to produce documents.
///
/// The encoder type is chosen per exporter; it defaults to [`PdfEncoder`].
pub struct Exporter<R, E = PdfEncoder> {
    rasterizer: R,
    _encoder: PhantomData<fn() -> E>,
}

impl<R: Rasterizer> Exporter<R, PdfEncoder> {
    pub fn new(rasterizer: R) -> Self {
        Self::with_encoder(rasterizer)
    }
}

impl<R: Rasterizer, E: DocumentEncoder> Exporter<R, E> {
    /// Build an exporter that emits documents through encoder type `E`.
    pub fn with_encoder(rasterizer: R) -> Self {
        Self {
            rasterizer,
            _encoder: PhantomData,
        }
    }

    pub fn rasterizer(&self) -> &R {
        &self.rasterizer
    }

    /// Export one region to `options.filename`.
    ///
    /// Any failure is logged with its cause and returned as `Error::ExportFailed`.
    pub fn export_region(&mut self, region_id: &str, options: &ExportOptions) -> Result<()> {
        let result = self
            .assemble_region(region_id, options)
            .and_then(|encoder| encoder.save(&options.filename));
        match result {
            Ok(()) => {
                log::info!("exported region '{}' to {}", region_id, options.filename);
                Ok(())
            }
            Err(err) => {
                log::error!("export of region '{}' failed: {}", region_id, err.detailed_message());
                Err(err.into_export_failed())
            }
        }
    }

    /// Capture one region and lay it out, returning the unsaved encoder.
    pub fn assemble_region(&mut self, region_id: &str, options: &ExportOptions) -> Result<E> {
        options.validate()?;
        let request = CaptureRequest::for_export(options);
        let capture = self.rasterizer.capture(region_id, &request)?;
        log::debug!(
            "captured '{}' at {}x{}px",
            region_id,
            capture.pixel_width,
            capture.pixel_height
        );

        let mut encoder = E::new(options)?;
        // stamped over the first slice, before later pages are opened
        place_capture(&mut encoder, &capture, options, 0.0, |encoder| {
            encoder.draw_text(
                &timestamp_label(chrono::Local::now()),
                LABEL_X_MM,
                TIMESTAMP_Y_MM,
                TIMESTAMP_SIZE_PT,
            )
        })?;
        Ok(encoder)
    }

    /// Export `sections` in order to `options.filename`, one or more pages per section.
    ///
    /// Sections whose region is missing are skipped and listed in the report;
    /// any other failure aborts the export with `Error::ExportFailed`.
    pub fn export_sections(
        &mut self,
        sections: &[RegionSection],
        options: &ExportOptions,
    ) -> Result<SectionReport> {
        let result = self.assemble_sections(sections, options).and_then(|(encoder, report)| {
            encoder.save(&options.filename)?;
            Ok(report)
        });
        match result {
            Ok(report) => {
                if report.included.is_empty() {
                    log::warn!(
                        "none of the {} sections could be captured; {} holds no content",
                        sections.len(),
                        options.filename
                    );
                } else {
                    log::info!(
                        "exported {} of {} sections to {} ({} pages)",
                        report.included.len(),
                        sections.len(),
                        options.filename,
                        report.pages
                    );
                }
                Ok(report)
            }
            Err(err) => {
                log::error!("multi-section export failed: {}", err.detailed_message());
                Err(err.into_export_failed())
            }
        }
    }

    /// Capture and lay out every section, returning the unsaved encoder and a report.
    pub fn assemble_sections(
        &mut self,
        sections: &[RegionSection],
        options: &ExportOptions,
    ) -> Result<(E, SectionReport)> {
        options.validate()?;
        let request = CaptureRequest::for_export(options);
        let mut encoder = E::new(options)?;
        let mut report = SectionReport::default();

        encoder.draw_text(
            &timestamp_label(chrono::Local::now()),
            LABEL_X_MM,
            TIMESTAMP_Y_MM,
            TIMESTAMP_SIZE_PT,
        )?;

        for section in sections {
            let capture = match self.rasterizer.capture(&section.id, &request) {
                Ok(capture) => capture,
                Err(Error::RegionNotFound(id)) => {
                    log::warn!("section '{}' skipped: region '{}' not found", section.display_name, id);
                    report.skipped.push(section.id.clone());
                    continue;
                }
                Err(err) => return Err(err),
            };

            // every section starts on its own page
            if !report.included.is_empty() {
                encoder.new_page()?;
            }
            encoder.draw_text(&section.display_name, LABEL_X_MM, TITLE_Y_MM, TITLE_SIZE_PT)?;
            place_capture(&mut encoder, &capture, options, TITLE_BAND_MM, |_| Ok(()))?;
            report.included.push(section.id.clone());
        }

        report.pages = encoder.page_count();
        Ok((encoder, report))
    }
}

/// Emit the planned slices of `capture` starting on the encoder's current page.
///
/// `after_first` runs once the first slice is drawn, while that page is still current.
fn place_capture<E, F>(
    encoder: &mut E,
    capture: &CapturedRegion,
    options: &ExportOptions,
    start_offset_mm: f64,
    after_first: F,
) -> Result<()>
where
    E: DocumentEncoder,
    F: FnOnce(&mut E) -> Result<()>,
{
    let plan = plan_pages(capture.pixel_width, capture.pixel_height, options, start_offset_mm)?;
    let width_mm = plan.img_width_mm();
    let height_mm = plan.img_height_mm();
    log::debug!(
        "placing {:.1}x{:.1}mm image over {} page(s)",
        width_mm,
        height_mm,
        plan.len()
    );

    let mut after_first = Some(after_first);
    for (index, slice) in plan.enumerate() {
        // the first slice goes on the page the caller prepared
        if slice.is_page_start && index > 0 {
            encoder.new_page()?;
        }
        encoder.draw_image(capture, 0.0, slice.dest_offset_mm, width_mm, height_mm)?;
        if let Some(hook) = after_first.take() {
            hook(encoder)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rendering::paint::{PaintCommand, RecordingEncoder};
    use std::collections::HashMap;

    /// Rasterizer serving fixed-size blank captures by id
    struct FakeRasterizer {
        regions: HashMap<String, (u32, u32)>,
        captured: Vec<String>,
        requests: Vec<CaptureRequest>,
    }

    impl FakeRasterizer {
        fn new(regions: &[(&str, u32, u32)]) -> Self {
            Self {
                regions: regions
                    .iter()
                    .map(|(id, w, h)| (id.to_string(), (*w, *h)))
                    .collect(),
                captured: Vec::new(),
                requests: Vec::new(),
            }
        }
    }

    impl Rasterizer for FakeRasterizer {
        fn capture(&mut self, region_id: &str, request: &CaptureRequest) -> Result<CapturedRegion> {
            self.captured.push(region_id.to_string());
            self.requests.push(request.clone());
            let (w, h) = self
                .regions
                .get(region_id)
                .copied()
                .ok_or_else(|| Error::RegionNotFound(region_id.to_string()))?;
            Ok(CapturedRegion {
                pixel_width: w,
                pixel_height: h,
                data: Vec::new(),
            })
        }
    }

    struct BrokenRasterizer;

    impl Rasterizer for BrokenRasterizer {
        fn capture(&mut self, _region_id: &str, _request: &CaptureRequest) -> Result<CapturedRegion> {
            Err(Error::CaptureError("renderer crashed".into()))
        }
    }

    fn images(page: &[PaintCommand]) -> Vec<(f64, f64)> {
        page.iter()
            .filter_map(|c| match c {
                PaintCommand::Image { y_mm, height_mm, .. } => Some((*y_mm, *height_mm)),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn single_region_spans_two_pages() {
        let raster = FakeRasterizer::new(&[("dashboard", 1600, 4000)]);
        let mut exporter: Exporter<_, RecordingEncoder> = Exporter::with_encoder(raster);
        let enc = exporter.assemble_region("dashboard", &ExportOptions::default()).unwrap();

        let pages = enc.pages();
        assert_eq!(pages.len(), 2);
        let first = images(&pages[0]);
        let second = images(&pages[1]);
        assert_eq!(first.len(), 1);
        assert_eq!(second.len(), 1);
        assert!((first[0].0 - 0.0).abs() < 1e-9);
        assert!((first[0].1 - 525.0).abs() < 1e-9);
        assert!((second[0].0 + 297.0).abs() < 1e-9);

        // timestamp only on the first page, after the image
        let texts = enc.texts();
        assert_eq!(texts[0].len(), 1);
        assert!(texts[0][0].starts_with("Generated: "));
        assert!(texts[1].is_empty());
        assert!(matches!(pages[0].last(), Some(PaintCommand::Text { .. })));
    }

    #[test]
    fn capture_request_asks_for_full_white_extent() {
        let raster = FakeRasterizer::new(&[("kpis", 800, 600)]);
        let mut exporter: Exporter<_, RecordingEncoder> = Exporter::with_encoder(raster);
        let opts = ExportOptions { scale: 3.0, ..Default::default() };
        exporter.assemble_region("kpis", &opts).unwrap();

        let req = &exporter.rasterizer().requests[0];
        assert_eq!(req.scale, 3.0);
        assert_eq!(req.background, crate::Rgb::WHITE);
        assert!(req.allow_cross_origin);
        assert!(!req.interactive);
        assert_eq!((req.width, req.height), (None, None));
    }

    #[test]
    fn missing_region_fails_with_message() {
        let raster = FakeRasterizer::new(&[]);
        let mut exporter: Exporter<_, RecordingEncoder> = Exporter::with_encoder(raster);
        let err = exporter.export_region("ghost", &ExportOptions::default()).unwrap_err();
        assert!(matches!(err, Error::ExportFailed(_)));
        assert!(err.is_region_not_found());
        assert!(!err.to_string().is_empty());
    }

    #[test]
    fn invalid_options_fail_before_capture() {
        let raster = FakeRasterizer::new(&[("a", 10, 10)]);
        let mut exporter: Exporter<_, RecordingEncoder> = Exporter::with_encoder(raster);
        let opts = ExportOptions { quality: 0.0, ..Default::default() };
        let err = exporter.export_region("a", &opts).unwrap_err();
        assert!(matches!(err.root_cause(), Error::ConfigError(_)));
        assert!(exporter.rasterizer().captured.is_empty());
    }

    #[test]
    fn missing_section_is_skipped() {
        let raster = FakeRasterizer::new(&[("revenue", 1000, 500)]);
        let mut exporter: Exporter<_, RecordingEncoder> = Exporter::with_encoder(raster);
        let sections = [
            RegionSection::new("churn", "Churn"),
            RegionSection::new("revenue", "Revenue"),
        ];
        let (enc, report) = exporter
            .assemble_sections(&sections, &ExportOptions::default())
            .unwrap();

        assert_eq!(report.included, vec!["revenue".to_string()]);
        assert_eq!(report.skipped, vec!["churn".to_string()]);
        assert_eq!(report.pages, 1);
        assert!(!report.is_complete());

        let texts = enc.texts();
        assert_eq!(texts.len(), 1);
        assert!(texts[0][0].starts_with("Generated: "));
        assert_eq!(texts[0][1], "Revenue");
        let imgs = images(&enc.pages()[0]);
        assert_eq!(imgs.len(), 1);
        assert!((imgs[0].0 - TITLE_BAND_MM).abs() < 1e-9);
    }

    #[test]
    fn sections_keep_order_and_own_pages() {
        // 210px wide: 1px == 1mm on A4
        let raster = FakeRasterizer::new(&[("a", 210, 100), ("b", 210, 400), ("c", 210, 50)]);
        let mut exporter: Exporter<_, RecordingEncoder> = Exporter::with_encoder(raster);
        let sections = [
            RegionSection::new("a", "Alpha"),
            RegionSection::new("b", "Beta"),
            RegionSection::new("c", "Gamma"),
        ];
        let (enc, report) = exporter
            .assemble_sections(&sections, &ExportOptions::default())
            .unwrap();

        assert_eq!(exporter.rasterizer().captured, vec!["a", "b", "c"]);
        // a: 1 page, b: 400mm with a 22mm band -> 2 pages, c: 1 page
        assert_eq!(report.pages, 4);
        let texts = enc.texts();
        assert_eq!(texts[0].len(), 2);
        assert_eq!(texts[0][1], "Alpha");
        assert_eq!(texts[1], vec!["Beta".to_string()]);
        assert!(texts[2].is_empty());
        assert_eq!(texts[3], vec!["Gamma".to_string()]);

        let pages = enc.pages();
        assert!((images(&pages[2])[0].0 + 275.0).abs() < 1e-9);
    }

    #[test]
    fn all_sections_missing_still_produces_document() {
        let raster = FakeRasterizer::new(&[]);
        let mut exporter: Exporter<_, RecordingEncoder> = Exporter::with_encoder(raster);
        let sections = [RegionSection::new("x", "X"), RegionSection::new("y", "Y")];
        let report = exporter
            .export_sections(&sections, &ExportOptions::default())
            .unwrap();
        assert!(report.included.is_empty());
        assert_eq!(report.skipped.len(), 2);
        assert_eq!(report.pages, 1);
    }

    #[test]
    fn capture_failure_aborts_sections() {
        let mut exporter: Exporter<_, RecordingEncoder> = Exporter::with_encoder(BrokenRasterizer);
        let err = exporter
            .export_sections(&[RegionSection::new("a", "A")], &ExportOptions::default())
            .unwrap_err();
        assert!(matches!(err.root_cause(), Error::CaptureError(_)));
    }

    /// Encoder whose drawing and saving always fail
    struct FailingEncoder;

    impl DocumentEncoder for FailingEncoder {
        fn new(_options: &ExportOptions) -> Result<Self> {
            Ok(FailingEncoder)
        }

        fn new_page(&mut self) -> Result<()> {
            Err(Error::EncodingFailed("page allocation failed".into()))
        }

        fn draw_image(&mut self, _: &CapturedRegion, _: f64, _: f64, _: f64, _: f64) -> Result<()> {
            Err(Error::EncodingFailed("image rejected".into()))
        }

        fn draw_text(&mut self, _: &str, _: f64, _: f64, _: f64) -> Result<()> {
            Ok(())
        }

        fn page_count(&self) -> usize {
            1
        }

        fn save(self, filename: &str) -> Result<()> {
            std::fs::write(filename, b"partial")?;
            Err(Error::EncodingFailed("disk full".into()))
        }
    }

    #[test]
    fn encoder_failure_aborts_exports() {
        let dir = tempfile::tempdir().unwrap();
        let filename = dir.path().join("out.pdf").to_string_lossy().into_owned();
        let opts = ExportOptions { filename: filename.clone(), ..Default::default() };
        let raster = FakeRasterizer::new(&[("a", 100, 100), ("b", 100, 100)]);
        let mut exporter: Exporter<_, FailingEncoder> = Exporter::with_encoder(raster);

        let err = exporter.export_region("a", &opts).unwrap_err();
        assert!(matches!(err, Error::ExportFailed(_)));
        assert!(matches!(err.root_cause(), Error::EncodingFailed(_)));

        let sections = [RegionSection::new("a", "A"), RegionSection::new("b", "B")];
        let err = exporter.export_sections(&sections, &opts).unwrap_err();
        assert!(matches!(err, Error::ExportFailed(_)));
        assert!(matches!(err.root_cause(), Error::EncodingFailed(_)));
        // the first draw fails, so the second section is never captured
        assert_eq!(exporter.rasterizer().captured, vec!["a", "a"]);
        assert!(!std::path::Path::new(&filename).exists());
    }

    #[test]
    fn empty_capture_is_rejected() {
        let raster = FakeRasterizer::new(&[("blank", 0, 0)]);
        let mut exporter: Exporter<_, RecordingEncoder> = Exporter::with_encoder(raster);
        let err = exporter.export_region("blank", &ExportOptions::default()).unwrap_err();
        assert!(matches!(err.root_cause(), Error::EmptyCapture));
    }

    #[test]
    fn timestamp_format() {
        use chrono::TimeZone;
        let at = chrono::Local.with_ymd_and_hms(2026, 3, 4, 5, 6, 7).unwrap();
        assert_eq!(timestamp_label(at), "Generated: 2026-03-04 05:06:07");
    }
}
