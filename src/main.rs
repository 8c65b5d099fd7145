use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use rfexport::rendering::paint::RecordingEncoder;
use rfexport::rendering::raster::FileRasterizer;
use rfexport::{
    plan_pages, DocumentEncoder, ExportOptions, ExportService, Orientation, PageFormat, RegionSection,
};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "rfexport", version, about = "Export captured page regions to paginated PDF")]
struct Cli {
    /// Enable debug logging (RUST_LOG still takes precedence)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Export a single region
    Region {
        /// Region id
        id: String,
        /// Capture directory or JSON manifest
        #[arg(long)]
        captures: PathBuf,
        #[command(flatten)]
        opts: OptionArgs,
    },
    /// Export several titled regions into one document
    Sections {
        /// Capture directory or JSON manifest
        #[arg(long)]
        captures: PathBuf,
        /// Section as `id=Display Name` (repeatable, order is kept)
        #[arg(long = "section", required = true, value_parser = parse_section)]
        sections: Vec<RegionSection>,
        #[command(flatten)]
        opts: OptionArgs,
    },
    /// Print the page plan for a raster size as JSON
    Plan {
        #[arg(long)]
        width: u32,
        #[arg(long)]
        height: u32,
        /// Space reserved at the top of the first page, in mm
        #[arg(long, default_value_t = 0.0)]
        offset: f64,
        #[command(flatten)]
        opts: OptionArgs,
    },
    /// Capture regions of a live page through headless Chrome (needs the `cdp` feature)
    Url {
        url: String,
        /// Region ids; more than one produces a sectioned document titled by id
        #[arg(required = true)]
        ids: Vec<String>,
        #[command(flatten)]
        opts: OptionArgs,
    },
}

#[derive(Args, Clone)]
struct OptionArgs {
    /// JSON file with export options; flags override its values
    #[arg(long)]
    config: Option<PathBuf>,
    /// Output file name
    #[arg(short, long)]
    output: Option<String>,
    /// a4, letter or legal
    #[arg(long)]
    format: Option<PageFormat>,
    /// portrait or landscape
    #[arg(long)]
    orientation: Option<Orientation>,
    #[arg(long)]
    scale: Option<f64>,
    /// JPEG quality in (0, 1]
    #[arg(long)]
    quality: Option<f64>,
    /// Record drawing commands and print them instead of writing a file
    #[arg(long)]
    dry_run: bool,
}

impl OptionArgs {
    fn resolve(&self) -> anyhow::Result<ExportOptions> {
        let mut opts = match &self.config {
            Some(path) => ExportOptions::from_json_file(path)?,
            None => ExportOptions::default(),
        };
        if let Some(output) = &self.output {
            opts.filename = output.clone();
        }
        if let Some(format) = self.format {
            opts.page_format = format;
        }
        if let Some(orientation) = self.orientation {
            opts.orientation = orientation;
        }
        if let Some(scale) = self.scale {
            opts.scale = scale;
        }
        if let Some(quality) = self.quality {
            opts.quality = quality;
        }
        opts.validate()?;
        Ok(opts)
    }
}

fn parse_section(raw: &str) -> Result<RegionSection, String> {
    match raw.split_once('=') {
        Some((id, name)) if !id.trim().is_empty() => Ok(RegionSection::new(id.trim(), name.trim())),
        Some(_) => Err(format!("section '{}' has an empty id", raw)),
        None => Ok(RegionSection::new(raw.trim(), raw.trim())),
    }
}

fn print_recording(encoder: &RecordingEncoder) -> anyhow::Result<()> {
    let summary = serde_json::json!({
        "pageSize": encoder.page_size(),
        "pages": encoder.page_count(),
        "commands": encoder.pages(),
    });
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

async fn run_files(
    captures: PathBuf,
    sections: Option<Vec<RegionSection>>,
    region: Option<String>,
    opts: &OptionArgs,
) -> anyhow::Result<()> {
    let options = opts.resolve()?;

    if opts.dry_run {
        let rasterizer = FileRasterizer::open(&captures)?;
        let mut exporter: rfexport::Exporter<_, RecordingEncoder> =
            rfexport::Exporter::with_encoder(rasterizer);
        let encoder = match (&sections, &region) {
            (Some(sections), _) => {
                let (encoder, report) = exporter.assemble_sections(sections, &options)?;
                eprintln!("skipped sections: {:?}", report.skipped);
                encoder
            }
            (None, Some(id)) => exporter.assemble_region(id, &options)?,
            (None, None) => anyhow::bail!("nothing to export"),
        };
        return print_recording(&encoder);
    }

    let service = ExportService::spawn::<_, rfexport::pdf::PdfEncoder, _>(move || {
        FileRasterizer::open(captures)
    })
    .await?;

    match (sections, region) {
        (Some(sections), _) => {
            let report = service
                .export_sections(sections, Some(options.clone()))
                .await
                .map_err(|e| anyhow::anyhow!(e.detailed_message()))?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        (None, Some(id)) => {
            service
                .export_region(&id, Some(options.clone()))
                .await
                .map_err(|e| anyhow::anyhow!(e.detailed_message()))?;
            println!("{}", rfexport::pdf::output_path(&options.filename).display());
        }
        (None, None) => anyhow::bail!("nothing to export"),
    }
    service.close().await?;
    Ok(())
}

#[cfg(feature = "cdp")]
async fn run_url(url: String, ids: Vec<String>, opts: &OptionArgs) -> anyhow::Result<()> {
    use rfexport::cdp::{CdpConfig, CdpRasterizer};

    let options = opts.resolve()?;
    let service = ExportService::spawn::<_, rfexport::pdf::PdfEncoder, _>(move || {
        CdpRasterizer::launch(&url, CdpConfig::default())
    })
    .await?;

    if let [id] = ids.as_slice() {
        service
            .export_region(id, Some(options))
            .await
            .map_err(|e| anyhow::anyhow!(e.detailed_message()))?;
    } else {
        let sections = ids.iter().map(|id| RegionSection::new(id.as_str(), id.as_str())).collect();
        let report = service
            .export_sections(sections, Some(options))
            .await
            .map_err(|e| anyhow::anyhow!(e.detailed_message()))?;
        println!("{}", serde_json::to_string_pretty(&report)?);
    }
    service.close().await?;
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level)).init();

    match cli.command {
        Command::Region { id, captures, opts } => run_files(captures, None, Some(id), &opts).await,
        Command::Sections {
            captures,
            sections,
            opts,
        } => run_files(captures, Some(sections), None, &opts).await,
        Command::Plan {
            width,
            height,
            offset,
            opts,
        } => {
            let options = opts.resolve()?;
            let plan = plan_pages(width, height, &options, offset)
                .with_context(|| format!("cannot plan a {}x{} raster", width, height))?;
            let (img_width_mm, img_height_mm) = (plan.img_width_mm(), plan.img_height_mm());
            let slices: Vec<_> = plan.collect();
            let summary = serde_json::json!({
                "pageSize": options.page_size(),
                "imgWidthMm": img_width_mm,
                "imgHeightMm": img_height_mm,
                "slices": slices,
            });
            println!("{}", serde_json::to_string_pretty(&summary)?);
            Ok(())
        }
        #[cfg(feature = "cdp")]
        Command::Url { url, ids, opts } => run_url(url, ids, &opts).await,
        #[cfg(not(feature = "cdp"))]
        Command::Url { .. } => anyhow::bail!("rfexport was built without the `cdp` feature"),
    }
}
