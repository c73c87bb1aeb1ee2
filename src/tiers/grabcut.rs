//! Iterative color-model region tier
//!
//! A seed rectangle covering the center of the image starts as foreground and
//! everything outside it is fixed background. Each round builds quantized color
//! histograms for both classes, reassigns pixels inside the rectangle to the
//! class with the higher likelihood and smooths the labels with a 3×3 majority
//! vote. The walk stops after the configured number of rounds or once the
//! labeling no longer changes.

use super::{SegmentationTier, TierKind};
use crate::{
    config::TierParams,
    error::{CutoutError, Result},
    types::{Mask, PixelBuffer},
};
use tracing::{debug, trace};

const LEVELS_PER_CHANNEL: usize = 16;
const BINS: usize = LEVELS_PER_CHANNEL * LEVELS_PER_CHANNEL * LEVELS_PER_CHANNEL;
/// Pseudo-count added to every bin
const SMOOTHING: f64 = 0.01;

/// Rectangle-seeded foreground extraction
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GrabCutTier {
    iterations: u32,
    margin: f32,
}

/// Half-open pixel rectangle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct SeedRect {
    x0: u32,
    y0: u32,
    x1: u32,
    y1: u32,
}

impl SeedRect {
    fn contains(&self, x: u32, y: u32) -> bool {
        x >= self.x0 && x < self.x1 && y >= self.y0 && y < self.y1
    }
}

impl GrabCutTier {
    #[must_use]
    pub fn new(iterations: u32, margin: f32) -> Self {
        Self { iterations, margin }
    }

    #[must_use]
    pub fn from_params(params: &TierParams) -> Self {
        Self::new(params.grabcut_iterations, params.grabcut_margin)
    }

    fn seed_rect(&self, width: u32, height: u32) -> Result<SeedRect> {
        let x0 = (width as f32 * self.margin).floor() as u32;
        let y0 = (height as f32 * self.margin).floor() as u32;
        let rect = SeedRect {
            x0,
            y0,
            x1: width.saturating_sub(x0),
            y1: height.saturating_sub(y0),
        };

        // Both classes need seed pixels
        if x0 == 0 || y0 == 0 || rect.x1 <= rect.x0 || rect.y1 <= rect.y0 {
            return Err(CutoutError::tier_failed(
                TierKind::GrabCut,
                format!("image {}x{} too small for a seed rectangle", width, height),
            ));
        }
        Ok(rect)
    }
}

impl Default for GrabCutTier {
    fn default() -> Self {
        Self::from_params(&TierParams::default())
    }
}

fn color_bin([r, g, b]: [u8; 3]) -> usize {
    let level = |v: u8| usize::from(v) * LEVELS_PER_CHANNEL / 256;
    (level(r) * LEVELS_PER_CHANNEL + level(g)) * LEVELS_PER_CHANNEL + level(b)
}

/// Additively smoothed class histogram
struct ColorModel {
    counts: Vec<u64>,
    total: u64,
}

impl ColorModel {
    fn build(bins: &[usize], labels: &[bool], class: bool) -> Self {
        let mut counts = vec![0u64; BINS];
        let mut total = 0;
        for (&bin, &label) in bins.iter().zip(labels) {
            if label == class {
                if let Some(count) = counts.get_mut(bin) {
                    *count += 1;
                    total += 1;
                }
            }
        }
        Self { counts, total }
    }

    fn likelihood(&self, bin: usize) -> f64 {
        let count = self.counts.get(bin).copied().unwrap_or(0);
        (count as f64 + SMOOTHING) / (self.total as f64 + SMOOTHING * BINS as f64)
    }
}

impl SegmentationTier for GrabCutTier {
    fn kind(&self) -> TierKind {
        TierKind::GrabCut
    }

    fn segment(&self, image: &PixelBuffer) -> Result<Mask> {
        let (width, height) = image.dimensions();
        let rect = self.seed_rect(width, height)?;
        let w = width as usize;

        let bins: Vec<usize> = image.rgb_pixels().map(color_bin).collect();
        let mut labels: Vec<bool> = (0..height)
            .flat_map(|y| (0..width).map(move |x| rect.contains(x, y)))
            .collect();

        for round in 0..self.iterations {
            let foreground = ColorModel::build(&bins, &labels, true);
            let background = ColorModel::build(&bins, &labels, false);
            if foreground.total == 0 {
                break;
            }

            // Data term
            let mut tentative = labels.clone();
            for y in rect.y0..rect.y1 {
                for x in rect.x0..rect.x1 {
                    let index = y as usize * w + x as usize;
                    let Some(&bin) = bins.get(index) else {
                        continue;
                    };
                    let fg_score = foreground.likelihood(bin);
                    let bg_score = background.likelihood(bin);
                    if (fg_score - bg_score).abs() > f64::EPSILON * fg_score.max(bg_score) {
                        if let Some(label) = tentative.get_mut(index) {
                            *label = fg_score > bg_score;
                        }
                    }
                }
            }

            // Smoothness term: 3×3 majority vote inside the rectangle
            let mut smoothed = tentative.clone();
            for y in rect.y0..rect.y1 {
                for x in rect.x0..rect.x1 {
                    let mut votes = 0u32;
                    let mut total = 0u32;
                    for ny in y.saturating_sub(1)..=(y + 1).min(height - 1) {
                        for nx in x.saturating_sub(1)..=(x + 1).min(width - 1) {
                            total += 1;
                            if tentative
                                .get(ny as usize * w + nx as usize)
                                .copied()
                                .unwrap_or(false)
                            {
                                votes += 1;
                            }
                        }
                    }
                    if let Some(label) = smoothed.get_mut(y as usize * w + x as usize) {
                        *label = votes * 2 > total;
                    }
                }
            }

            let converged = smoothed == labels;
            labels = smoothed;
            trace!(round, converged, "grabcut refinement round");
            if converged {
                break;
            }
        }

        let data: Vec<u8> = labels.iter().map(|&fg| if fg { 255 } else { 0 }).collect();
        let mask = Mask::new(data, (width, height))?;
        debug!(
            foreground = mask.foreground_count(),
            "grabcut tier produced mask"
        );
        Ok(mask)
    }
}
