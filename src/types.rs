//! Core types for cutout and compositing operations

use crate::{
    error::{CutoutError, Result},
    services::ImageIOService,
    tiers::TierKind,
};
use image::{DynamicImage, GrayImage, RgbImage, RgbaImage};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// In-memory 8-bit image with 3 (RGB) or 4 (RGBA) interleaved channels
///
/// Pixel data is stored row-major. The length of the data always equals
/// `width * height * channels`; constructors reject anything else.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelBuffer {
    width: u32,
    height: u32,
    channels: u8,
    data: Vec<u8>,
}

impl PixelBuffer {
    /// Create a buffer from raw interleaved samples
    ///
    /// # Errors
    /// - Zero width or height
    /// - Channel count other than 3 or 4
    /// - Data length not equal to `width * height * channels`
    pub fn new(width: u32, height: u32, channels: u8, data: Vec<u8>) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(CutoutError::invalid_buffer(format!(
                "dimensions must be non-zero, got {}x{}",
                width, height
            )));
        }
        if channels != 3 && channels != 4 {
            return Err(CutoutError::invalid_buffer(format!(
                "channel count must be 3 or 4, got {}",
                channels
            )));
        }
        let expected = width as usize * height as usize * usize::from(channels);
        if data.len() != expected {
            return Err(CutoutError::invalid_buffer(format!(
                "expected {} bytes for {}x{}x{}, got {}",
                expected,
                width,
                height,
                channels,
                data.len()
            )));
        }

        Ok(Self {
            width,
            height,
            channels,
            data,
        })
    }

    /// Create an opaque RGB buffer filled with a single color
    ///
    /// Unlike [`PixelBuffer::new`] this does not reject zero dimensions; see
    /// [`PixelBuffer::is_empty`].
    #[must_use]
    pub fn filled_rgb(width: u32, height: u32, color: [u8; 3]) -> Self {
        let pixels = width as usize * height as usize;
        let data = color.iter().copied().cycle().take(pixels * 3).collect();
        Self {
            width,
            height,
            channels: 3,
            data,
        }
    }

    /// Create a buffer from a decoded image, keeping alpha only if the source has it
    #[must_use]
    pub fn from_dynamic_image(image: &DynamicImage) -> Self {
        if image.color().has_alpha() {
            Self::from_rgba_image(image.to_rgba8())
        } else {
            Self::from_rgb_image(image.to_rgb8())
        }
    }

    /// Wrap an RGBA image buffer; an empty image gives an empty buffer
    #[must_use]
    pub fn from_rgba_image(image: RgbaImage) -> Self {
        let (width, height) = image.dimensions();
        Self {
            width,
            height,
            channels: 4,
            data: image.into_raw(),
        }
    }

    /// Wrap an RGB image buffer; an empty image gives an empty buffer
    #[must_use]
    pub fn from_rgb_image(image: RgbImage) -> Self {
        let (width, height) = image.dimensions();
        Self {
            width,
            height,
            channels: 3,
            data: image.into_raw(),
        }
    }

    #[must_use]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[must_use]
    pub fn height(&self) -> u32 {
        self.height
    }

    #[must_use]
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Whether the buffer has no pixels
    ///
    /// Only the infallible constructors can produce one. Processing rejects
    /// empty subjects with `InvalidBuffer`.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    #[must_use]
    pub fn channels(&self) -> u8 {
        self.channels
    }

    #[must_use]
    pub fn has_alpha(&self) -> bool {
        self.channels == 4
    }

    /// Raw interleaved samples
    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    #[must_use]
    pub fn into_raw(self) -> Vec<u8> {
        self.data
    }

    /// Number of pixels in the buffer
    #[must_use]
    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// RGBA value at `(x, y)`; RGB buffers report an opaque alpha
    #[must_use]
    pub fn rgba_at(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let channels = usize::from(self.channels);
        let offset = (y as usize * self.width as usize + x as usize) * channels;
        let pixel = self.data.get(offset..offset + channels)?;
        match *pixel {
            [r, g, b, a] => Some([r, g, b, a]),
            [r, g, b] => Some([r, g, b, 255]),
            _ => None,
        }
    }

    /// Iterate over the RGB triple of every pixel in row-major order
    pub fn rgb_pixels(&self) -> impl Iterator<Item = [u8; 3]> + '_ {
        self.data
            .chunks_exact(usize::from(self.channels))
            .map(|p| [p[0], p[1], p[2]])
    }

    /// Convert to an RGBA image, synthesizing opaque alpha for RGB buffers
    #[must_use]
    pub fn to_rgba_image(&self) -> RgbaImage {
        let data = if self.channels == 4 {
            self.data.clone()
        } else {
            self.rgb_pixels()
                .flat_map(|[r, g, b]| [r, g, b, 255])
                .collect()
        };
        RgbaImage::from_raw(self.width, self.height, data)
            .unwrap_or_else(|| RgbaImage::new(self.width, self.height))
    }

    /// Convert to an RGB image, dropping alpha without blending
    #[must_use]
    pub fn to_rgb_image(&self) -> RgbImage {
        let data = if self.channels == 3 {
            self.data.clone()
        } else {
            self.rgb_pixels().flatten().collect()
        };
        RgbImage::from_raw(self.width, self.height, data)
            .unwrap_or_else(|| RgbImage::new(self.width, self.height))
    }

    /// Convert to a `DynamicImage` preserving the channel layout
    #[must_use]
    pub fn to_dynamic_image(&self) -> DynamicImage {
        if self.has_alpha() {
            DynamicImage::ImageRgba8(self.to_rgba_image())
        } else {
            DynamicImage::ImageRgb8(self.to_rgb_image())
        }
    }

    /// Luminance view used by the segmentation tiers
    #[must_use]
    pub fn to_luma(&self) -> GrayImage {
        self.to_dynamic_image().to_luma8()
    }
}

/// Per-pixel foreground weight (0 = background, 255 = foreground)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mask {
    data: Vec<u8>,
    dimensions: (u32, u32),
}

impl Mask {
    /// Create a mask from raw values
    ///
    /// # Errors
    /// - Data length not equal to `width * height`
    pub fn new(data: Vec<u8>, dimensions: (u32, u32)) -> Result<Self> {
        let expected = dimensions.0 as usize * dimensions.1 as usize;
        if data.len() != expected {
            return Err(CutoutError::invalid_buffer(format!(
                "mask of {}x{} needs {} values, got {}",
                dimensions.0,
                dimensions.1,
                expected,
                data.len()
            )));
        }
        Ok(Self { data, dimensions })
    }

    /// Mask with every pixel set to `value`
    #[must_use]
    pub fn filled(width: u32, height: u32, value: u8) -> Self {
        Self {
            data: vec![value; width as usize * height as usize],
            dimensions: (width, height),
        }
    }

    /// Mask that keeps the whole image
    #[must_use]
    pub fn full_foreground(width: u32, height: u32) -> Self {
        Self::filled(width, height, 255)
    }

    /// Mask that removes the whole image
    #[must_use]
    pub fn empty(width: u32, height: u32) -> Self {
        Self::filled(width, height, 0)
    }

    /// Take the alpha channel of an RGBA buffer as a mask
    ///
    /// # Errors
    /// - Buffer has no alpha channel
    pub fn from_alpha(buffer: &PixelBuffer) -> Result<Self> {
        if !buffer.has_alpha() {
            return Err(CutoutError::invalid_buffer(
                "cannot derive a mask from a buffer without alpha",
            ));
        }
        let data = buffer.data().chunks_exact(4).map(|p| p[3]).collect();
        Ok(Self {
            data,
            dimensions: buffer.dimensions(),
        })
    }

    /// Create mask from a grayscale image
    #[must_use]
    pub fn from_image(image: GrayImage) -> Self {
        let dimensions = image.dimensions();
        Self {
            data: image.into_raw(),
            dimensions,
        }
    }

    /// Convert mask to a grayscale image
    #[must_use]
    pub fn to_image(&self) -> GrayImage {
        let (width, height) = self.dimensions;
        GrayImage::from_raw(width, height, self.data.clone())
            .unwrap_or_else(|| GrayImage::new(width, height))
    }

    #[must_use]
    pub fn width(&self) -> u32 {
        self.dimensions.0
    }

    #[must_use]
    pub fn height(&self) -> u32 {
        self.dimensions.1
    }

    #[must_use]
    pub fn dimensions(&self) -> (u32, u32) {
        self.dimensions
    }

    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Value at `(x, y)`
    #[must_use]
    pub fn get(&self, x: u32, y: u32) -> Option<u8> {
        if x >= self.dimensions.0 || y >= self.dimensions.1 {
            return None;
        }
        self.data
            .get(y as usize * self.dimensions.0 as usize + x as usize)
            .copied()
    }

    /// Whether this mask can be applied to `buffer`
    #[must_use]
    pub fn matches(&self, buffer: &PixelBuffer) -> bool {
        self.dimensions == buffer.dimensions()
    }

    /// Whether every value is either 0 or 255
    #[must_use]
    pub fn is_binary(&self) -> bool {
        self.data.iter().all(|&v| v == 0 || v == 255)
    }

    /// Snap every value above `threshold` to 255 and the rest to 0
    #[must_use]
    pub fn binarize(&self, threshold: u8) -> Self {
        Self {
            data: self
                .data
                .iter()
                .map(|&v| if v > threshold { 255 } else { 0 })
                .collect(),
            dimensions: self.dimensions,
        }
    }

    /// Number of pixels counted as foreground (value > 127)
    #[must_use]
    pub fn foreground_count(&self) -> usize {
        self.data.iter().filter(|&&x| x > 127).count()
    }

    /// Get mask statistics
    #[must_use]
    pub fn statistics(&self) -> MaskStatistics {
        let total_pixels = self.data.len();
        let foreground_pixels = self.foreground_count();
        let background_pixels = total_pixels - foreground_pixels;
        let total = total_pixels.max(1) as f32;

        MaskStatistics {
            total_pixels,
            foreground_pixels,
            background_pixels,
            foreground_ratio: foreground_pixels as f32 / total,
            background_ratio: background_pixels as f32 / total,
        }
    }
}

/// Statistics about a mask
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaskStatistics {
    pub total_pixels: usize,
    pub foreground_pixels: usize,
    pub background_pixels: usize,
    pub foreground_ratio: f32,
    pub background_ratio: f32,
}

/// What the subject is composited onto
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackgroundSpec {
    /// Keep the alpha channel in the output
    Transparent,
    /// Flatten onto a single opaque RGB color
    Solid([u8; 3]),
    /// Flatten onto another image, resized to the subject first
    Image(PixelBuffer),
}

impl BackgroundSpec {
    /// Whether compositing onto this background keeps an alpha channel
    #[must_use]
    pub fn keeps_alpha(&self) -> bool {
        matches!(self, Self::Transparent)
    }
}

/// Which component produced the final mask
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaskSource {
    /// The primary subject oracle
    Oracle,
    /// One of the classical fallback tiers
    Tier(TierKind),
    /// Nothing usable was produced; the whole image is kept
    Passthrough,
}

impl std::fmt::Display for MaskSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Oracle => write!(f, "oracle"),
            Self::Tier(kind) => write!(f, "tier:{}", kind),
            Self::Passthrough => write!(f, "passthrough"),
        }
    }
}

/// Why a mask source was skipped
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackReason {
    /// Flagged unavailable by the capability probe; never invoked
    Unavailable,
    /// Invoked and failed
    Failed(String),
}

/// One skipped step of the fallback walk
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FallbackEvent {
    pub source: MaskSource,
    pub reason: FallbackReason,
}

impl FallbackEvent {
    /// Build an event from the error that caused the skip
    #[must_use]
    pub fn from_error(source: MaskSource, error: &CutoutError) -> Self {
        let reason = match error {
            CutoutError::OracleUnavailable | CutoutError::TierUnavailable(_) => {
                FallbackReason::Unavailable
            },
            CutoutError::TierFailed { cause, .. } => FallbackReason::Failed(cause.clone()),
            CutoutError::OracleFailed(cause) => FallbackReason::Failed(cause.clone()),
            other => FallbackReason::Failed(other.to_string()),
        };
        Self { source, reason }
    }
}

/// Timing breakdown for one request
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessingTimings {
    /// Subject (and background) decoding
    pub decode_ms: u64,
    /// Oracle and tier walk including mask cleanup
    pub extraction_ms: u64,
    /// Alpha application and background blending
    pub compositing_ms: u64,
    /// PNG encoding, if the result was encoded
    pub encode_ms: Option<u64>,
    /// End-to-end processing time
    pub total_ms: u64,
}

/// Result of a cutout request
#[derive(Debug, Clone)]
pub struct ProcessingOutcome {
    /// Composited output (RGBA for transparent backgrounds, RGB otherwise)
    pub image: PixelBuffer,
    /// Cleaned mask that was applied as the subject's alpha
    pub mask: Mask,
    /// Component that produced `mask`
    pub source: MaskSource,
    /// Steps skipped before `mask` produced a result, in walk order
    pub fallbacks: Vec<FallbackEvent>,
    /// Set when the background could not be used and black was substituted
    pub degraded: Option<String>,
    pub timings: ProcessingTimings,
}

impl ProcessingOutcome {
    /// Whether anything other than the oracle produced the mask
    #[must_use]
    pub fn fell_back(&self) -> bool {
        self.source != MaskSource::Oracle
    }

    /// Whether the requested background was replaced by opaque black
    #[must_use]
    pub fn is_degraded(&self) -> bool {
        self.degraded.is_some()
    }

    /// Serializable summary for logs and reports
    #[must_use]
    pub fn summary(&self) -> OutcomeSummary {
        OutcomeSummary {
            source: self.source,
            fallbacks: self.fallbacks.clone(),
            degraded: self.degraded.clone(),
            dimensions: self.image.dimensions(),
            channels: self.image.channels(),
            mask: self.mask.statistics(),
            timings: self.timings.clone(),
        }
    }

    /// Encode the composited image as PNG
    pub fn to_png_bytes(&mut self) -> Result<Vec<u8>> {
        let encode_start = instant::Instant::now();
        let bytes = ImageIOService::encode_png(&self.image)?;
        self.timings.encode_ms = Some(encode_start.elapsed().as_millis() as u64);
        Ok(bytes)
    }

    /// Save the composited image as PNG
    pub fn save_png<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        let bytes = self.to_png_bytes()?;
        ImageIOService::write_bytes(path, &bytes)
    }
}

/// Serializable view of a [`ProcessingOutcome`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutcomeSummary {
    pub source: MaskSource,
    pub fallbacks: Vec<FallbackEvent>,
    pub degraded: Option<String>,
    pub dimensions: (u32, u32),
    pub channels: u8,
    pub mask: MaskStatistics,
    pub timings: ProcessingTimings,
}
