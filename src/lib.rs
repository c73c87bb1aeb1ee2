#![allow(clippy::too_many_lines)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::module_name_repetitions)]

//! # IMG.LY Cutout Library
//!
//! Subject cutout and background compositing that keeps working when the
//! high-quality extractor does not.
//!
//! A primary subject oracle (for example an ONNX salient-object model run with
//! tract) is tried first. When it is missing, fails, panics, returns malformed
//! output or exceeds its time budget, a chain of classical segmentation tiers
//! takes over:
//!
//! 1. **grabcut**: iterative color-model refinement of a central seed rectangle
//! 2. **watershed**: seeded flooding from smoothed intensity maxima
//! 3. **threshold**: global mean + k·stddev threshold with component selection
//! 4. **edge**: Sobel edges, contrast boost and morphology; always available
//!
//! Tier masks are cleaned up morphologically and the subject is composited onto
//! a transparent, solid-color or image background. Fallbacks and degraded
//! backgrounds never fail a request; they are recorded on the
//! [`ProcessingOutcome`].
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use imgly_cutout::{remove_background_from_bytes, BackgroundInput, CutoutConfig};
//!
//! # fn example() -> anyhow::Result<()> {
//! let subject = std::fs::read("photo.jpg")?;
//! let config = CutoutConfig::default();
//!
//! let mut outcome = remove_background_from_bytes(
//!     &subject,
//!     BackgroundInput::Solid([255, 255, 255]),
//!     &config,
//! )?;
//! println!("mask from {}", outcome.source);
//! outcome.save_png("cutout.png")?;
//! # Ok(())
//! # }
//! ```
//!
//! ### Feature Flags
//!
//! - `tier-grabcut`, `tier-watershed`, `tier-threshold` (default): classical tiers
//! - `tract`: tract-onnx backed primary oracle (`IMGLY_CUTOUT_MODEL` or
//!   [`CutoutConfig::oracle`] selects the model file)
//! - `cli` (default): command-line interface and tracing setup
//! - `webp-support` (default): WebP input decoding

pub mod capability;
#[cfg(feature = "cli")]
pub mod cli;
pub mod compositor;
pub mod config;
pub mod error;
pub mod oracle;
pub mod postprocess;
pub mod processor;
pub mod services;
pub mod tiers;
#[cfg(feature = "cli")]
pub mod tracing_config;
pub mod types;
pub mod utils;

use tokio::io::AsyncRead;

pub use capability::{probe, probe_tiers, reset_probe, CapabilityProbe, CapabilitySet};
pub use compositor::{CompositeOutput, Compositor};
pub use config::{
    parse_hex_color, BackgroundInput, BackgroundMode, CleanupParams, CutoutConfig,
    CutoutConfigBuilder, OracleConfig, TierParams,
};
pub use error::{CutoutError, Result};
pub use oracle::{OracleFactory, OracleHandle, SharedOracle, SubjectOracle};
pub use postprocess::MaskPostProcessor;
pub use processor::{CutoutProcessor, ExtractionReport, FallbackOrchestrator};
pub use services::ImageIOService;
pub use tiers::{SegmentationTier, TierKind};
pub use types::{
    BackgroundSpec, FallbackEvent, FallbackReason, Mask, MaskSource, MaskStatistics,
    OutcomeSummary, PixelBuffer, ProcessingOutcome, ProcessingTimings,
};

#[cfg(feature = "cli")]
pub use tracing_config::{init_cli_tracing, TracingConfig, TracingFormat};

/// Cut out the subject of encoded image bytes and composite it
///
/// # Examples
///
/// ```rust,no_run
/// use imgly_cutout::{remove_background_from_bytes, BackgroundInput, CutoutConfig};
///
/// # fn example(upload: Vec<u8>, backdrop: Vec<u8>) -> anyhow::Result<()> {
/// let outcome = remove_background_from_bytes(
///     &upload,
///     BackgroundInput::Image(&backdrop),
///     &CutoutConfig::default(),
/// )?;
/// if outcome.is_degraded() {
///     eprintln!("background unusable: {:?}", outcome.degraded);
/// }
/// # Ok(())
/// # }
/// ```
///
/// # Errors
/// - Invalid configuration
/// - `DecodeFailed` when the subject cannot be decoded
pub fn remove_background_from_bytes(
    subject: &[u8],
    background: BackgroundInput<'_>,
    config: &CutoutConfig,
) -> Result<ProcessingOutcome> {
    CutoutProcessor::new(config.clone())?.process_bytes(subject, background)
}

/// Cut out the subject of an already decoded image
///
/// # Errors
/// - Invalid configuration
pub fn remove_background_from_image(
    image: &image::DynamicImage,
    background: &BackgroundSpec,
    config: &CutoutConfig,
) -> Result<ProcessingOutcome> {
    let subject = PixelBuffer::from_dynamic_image(image);
    CutoutProcessor::new(config.clone())?.process_image(&subject, background)
}

/// Read a subject from an async stream, cut it out and composite it
///
/// # Examples
///
/// ```rust,no_run
/// use imgly_cutout::{remove_background_from_reader, BackgroundInput, CutoutConfig};
/// use tokio::fs::File;
///
/// # async fn example() -> anyhow::Result<()> {
/// let file = File::open("photo.jpg").await?;
/// let mut outcome =
///     remove_background_from_reader(file, BackgroundInput::Transparent, &CutoutConfig::default())
///         .await?;
/// outcome.save_png("cutout.png")?;
/// # Ok(())
/// # }
/// ```
///
/// # Errors
/// - Stream failures
/// - Invalid configuration
/// - `DecodeFailed` when the subject cannot be decoded
pub async fn remove_background_from_reader<R: AsyncRead + Unpin>(
    reader: R,
    background: BackgroundInput<'_>,
    config: &CutoutConfig,
) -> Result<ProcessingOutcome> {
    CutoutProcessor::new(config.clone())?
        .process_reader(reader, background)
        .await
}

/// Full request path: subject bytes and background selector in, PNG out
///
/// The output is RGBA for transparent backgrounds and RGB otherwise.
///
/// # Errors
/// - Invalid configuration
/// - `DecodeFailed` when the subject cannot be decoded
/// - PNG encoding failures
pub fn cutout_png(
    subject: &[u8],
    background: BackgroundInput<'_>,
    config: &CutoutConfig,
) -> Result<Vec<u8>> {
    remove_background_from_bytes(subject, background, config)?.to_png_bytes()
}
