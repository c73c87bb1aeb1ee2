//! Subject cutout CLI tool
//!
//! Reads one image (a file or stdin), cuts out its subject and writes a PNG
//! composited onto the requested background.

use super::config::CliConfigBuilder;
use crate::{
    config::BackgroundMode,
    processor::CutoutProcessor,
    services::ImageIOService,
    tracing_config::{init_cli_tracing, TracingFormat},
    types::ProcessingOutcome,
};
use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use log::{info, warn};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

/// Subject cutout CLI tool
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(name = "imgly-cutout")]
#[allow(clippy::struct_excessive_bools)]
pub struct Cli {
    /// Input image file (use "-" for stdin)
    #[arg(value_name = "INPUT", required_unless_present = "show_capabilities")]
    pub input: Option<String>,

    /// Output PNG file. Use "-" for stdout [default: <INPUT>_cutout.png, stdout for stdin]
    #[arg(short, long, value_name = "OUTPUT")]
    pub output: Option<String>,

    /// Background to composite the subject onto
    #[arg(short, long, value_enum, default_value_t = CliBackground::Transparent)]
    pub background: CliBackground,

    /// Background color as hex RGB (e.g. "#ffffff"), for solid backgrounds
    #[arg(short, long, value_name = "HEX")]
    pub color: Option<String>,

    /// Background image file, for image backgrounds
    #[arg(long, value_name = "PATH")]
    pub background_image: Option<PathBuf>,

    /// ONNX model file for the primary extractor [default: $IMGLY_CUTOUT_MODEL]
    #[arg(short, long, value_name = "PATH")]
    pub model: Option<PathBuf>,

    /// Comma-separated classical tier order, ending with edge (e.g. "watershed,threshold,edge")
    #[arg(long, value_name = "LIST")]
    pub tiers: Option<String>,

    /// Skip the primary extractor and use the classical tiers only
    #[arg(long)]
    pub no_oracle: bool,

    /// Discard primary extractor results slower than this many milliseconds
    #[arg(long, value_name = "MS")]
    pub oracle_timeout_ms: Option<u64>,

    /// Keep only the largest foreground region of classical masks
    #[arg(long)]
    pub largest_component: bool,

    /// Print available backends as JSON and exit
    #[arg(long)]
    pub show_capabilities: bool,

    /// Print a JSON summary of the run to stderr
    #[arg(long)]
    pub json_summary: bool,

    /// Enable verbose logging (-v: INFO, -vv: DEBUG, -vvv: TRACE)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

/// Background selector accepted on the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum CliBackground {
    Transparent,
    Solid,
    Image,
}

impl From<CliBackground> for BackgroundMode {
    fn from(background: CliBackground) -> Self {
        match background {
            CliBackground::Transparent => Self::Transparent,
            CliBackground::Solid => Self::Solid,
            CliBackground::Image => Self::Image,
        }
    }
}

/// Main CLI entry point
pub async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_cli_tracing(cli.verbose, TracingFormat::Console)
        .context("Failed to initialize tracing subscriber")?;

    run(cli).await
}

/// Execute parsed arguments; tracing must already be set up by the caller
pub async fn run(cli: Cli) -> Result<()> {
    CliConfigBuilder::validate_cli(&cli)?;
    let config = CliConfigBuilder::from_cli(&cli)?;

    let processor =
        CutoutProcessor::new(config).context("Failed to create cutout processor")?;

    if cli.show_capabilities {
        let json = serde_json::to_string_pretty(processor.capabilities())
            .context("Failed to serialize capabilities")?;
        println!("{json}");
        return Ok(());
    }

    let input = cli
        .input
        .as_deref()
        .context("No input given. Pass an image path or \"-\" for stdin")?;

    let start_time = Instant::now();
    let subject = read_input(input).await?;
    let background_bytes = match &cli.background_image {
        Some(path) if cli.background == CliBackground::Image => Some(
            tokio::fs::read(path)
                .await
                .with_context(|| format!("Failed to read background image: {}", path.display()))?,
        ),
        _ => None,
    };
    let background = CliConfigBuilder::background_input(&cli, background_bytes.as_deref())?;

    let mut outcome = processor
        .process_bytes(&subject, background)
        .context("Failed to cut out subject")?;
    report_outcome(&outcome);

    let png = outcome.to_png_bytes().context("Failed to encode PNG")?;
    match output_target(input, cli.output.as_deref()) {
        None => {
            write_stdout(&png)?;
            info!("Image written to stdout");
        },
        Some(path) => {
            ImageIOService::write_bytes(&path, &png)
                .with_context(|| format!("Failed to write output: {}", path.display()))?;
            info!("Image saved to: {}", path.display());
        },
    }

    if cli.json_summary {
        let json = serde_json::to_string(&outcome.summary())
            .context("Failed to serialize summary")?;
        eprintln!("{json}");
    }

    info!(
        "Processed {} in {:.2}s",
        input,
        start_time.elapsed().as_secs_f64()
    );
    Ok(())
}

async fn read_input(input: &str) -> Result<Vec<u8>> {
    if input == "-" {
        info!("Reading image from stdin");
        let bytes = ImageIOService::read_all(tokio::io::stdin())
            .await
            .context("Failed to read image data from stdin")?;
        if bytes.is_empty() {
            anyhow::bail!("No data received from stdin");
        }
        return Ok(bytes);
    }

    tokio::fs::read(input)
        .await
        .with_context(|| format!("Failed to read input: {input}"))
}

/// Where to write the PNG; `None` means stdout
fn output_target(input: &str, output: Option<&str>) -> Option<PathBuf> {
    match output {
        Some("-") => None,
        Some(path) => Some(PathBuf::from(path)),
        None if input == "-" => None,
        None => Some(generate_output_path(Path::new(input))),
    }
}

/// `photo.jpg` becomes `photo_cutout.png` next to the input
pub(crate) fn generate_output_path(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or("output");
    input.with_file_name(format!("{stem}_cutout.png"))
}

fn report_outcome(outcome: &ProcessingOutcome) {
    info!("Mask source: {}", outcome.source);
    for event in &outcome.fallbacks {
        info!("  ├─ skipped {}: {:?}", event.source, event.reason);
    }
    if let Some(reason) = &outcome.degraded {
        warn!("Background degraded: {reason}");
    }
    let timings = &outcome.timings;
    info!(
        "  └─ decode {}ms, extraction {}ms, compositing {}ms, total {}ms",
        timings.decode_ms, timings.extraction_ms, timings.compositing_ms, timings.total_ms
    );
}

fn write_stdout(data: &[u8]) -> Result<()> {
    let mut stdout = io::stdout().lock();
    stdout
        .write_all(data)
        .context("Failed to write image data to stdout")?;
    stdout.flush().context("Failed to flush stdout")?;
    Ok(())
}
