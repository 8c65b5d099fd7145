//! End-to-end exports: image files in, PDF files out

use image::{Rgba, RgbaImage};
use lopdf::Document;
use rfexport::rendering::raster::FileRasterizer;
use rfexport::{Error, ExportOptions, Exporter, PageFormat, RegionSection};
use std::path::Path;

fn write_capture(dir: &Path, id: &str, width: u32, height: u32) {
    // top half dark, bottom half light so pages differ visibly
    let img = RgbaImage::from_fn(width, height, |_, y| {
        if y < height / 2 {
            Rgba([30, 60, 90, 255])
        } else {
            Rgba([220, 230, 240, 255])
        }
    });
    img.save(dir.join(format!("{}.png", id))).expect("write capture");
}

fn options(dir: &Path, name: &str) -> ExportOptions {
    ExportOptions {
        filename: dir.join(name).to_string_lossy().into_owned(),
        ..Default::default()
    }
}

fn page_count(path: &Path) -> usize {
    Document::load(path).expect("load produced PDF").get_pages().len()
}

#[test]
fn tall_region_becomes_two_pages() {
    let dir = tempfile::tempdir().unwrap();
    write_capture(dir.path(), "dashboard", 160, 400);

    let mut exporter = Exporter::new(FileRasterizer::from_dir(dir.path()));
    let opts = options(dir.path(), "dashboard.pdf");
    exporter.export_region("dashboard", &opts).expect("export");

    assert_eq!(page_count(&dir.path().join("dashboard.pdf")), 2);
}

#[test]
fn missing_region_rejects_without_file() {
    let dir = tempfile::tempdir().unwrap();
    let mut exporter = Exporter::new(FileRasterizer::from_dir(dir.path()));
    let opts = options(dir.path(), "nothing.pdf");

    let err = exporter.export_region("does-not-exist", &opts).unwrap_err();
    assert!(matches!(err, Error::ExportFailed(_)));
    assert!(err.is_region_not_found());
    assert!(!err.to_string().is_empty());
    assert!(!dir.path().join("nothing.pdf").exists());
}

#[test]
fn sections_skip_missing_regions() {
    let dir = tempfile::tempdir().unwrap();
    write_capture(dir.path(), "revenue", 200, 100);

    let mut exporter = Exporter::new(FileRasterizer::from_dir(dir.path()));
    let opts = options(dir.path(), "report");
    let report = exporter
        .export_sections(
            &[
                RegionSection::new("churn", "Churn"),
                RegionSection::new("revenue", "Revenue"),
            ],
            &opts,
        )
        .expect("partial export succeeds");

    assert_eq!(report.included, vec!["revenue".to_string()]);
    assert_eq!(report.skipped, vec!["churn".to_string()]);
    // extension appended to the bare filename
    assert_eq!(page_count(&dir.path().join("report.pdf")), 1);
}

#[test]
fn every_section_starts_a_page() {
    let dir = tempfile::tempdir().unwrap();
    write_capture(dir.path(), "a", 200, 50);
    write_capture(dir.path(), "b", 200, 50);
    write_capture(dir.path(), "c", 100, 400);

    let mut exporter = Exporter::new(FileRasterizer::from_dir(dir.path()));
    let opts = ExportOptions {
        page_format: PageFormat::Letter,
        ..options(dir.path(), "sections.pdf")
    };
    let report = exporter
        .export_sections(
            &[
                RegionSection::new("a", "Alpha"),
                RegionSection::new("b", "Beta"),
                RegionSection::new("c", "Gamma"),
            ],
            &opts,
        )
        .unwrap();

    // c is 864mm tall on Letter: 275 + 297 + 292
    assert_eq!(report.pages, 5);
    assert_eq!(page_count(&dir.path().join("sections.pdf")), 5);
}

#[test]
fn manifest_source_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    write_capture(dir.path(), "kpis", 120, 60);
    let manifest = serde_json::json!({ "regions": { "overview": "kpis.png" } });
    let manifest_path = dir.path().join("captures.json");
    std::fs::write(&manifest_path, manifest.to_string()).unwrap();

    let mut exporter = Exporter::new(FileRasterizer::open(&manifest_path).unwrap());
    let opts = options(dir.path(), "overview.pdf");
    exporter.export_region("overview", &opts).unwrap();
    assert_eq!(page_count(&dir.path().join("overview.pdf")), 1);
}
