//! Statistical-threshold tier

use super::{SegmentationTier, TierKind};
use crate::{
    config::TierParams,
    error::Result,
    types::{Mask, PixelBuffer},
    utils::{filters, morphology},
};
use image::{GrayImage, Luma};
use imageproc::region_labelling::Connectivity;
use tracing::debug;

/// Global `mean + k·stddev` threshold on the smoothed luminance
///
/// Pixels strictly brighter than the threshold form the candidate foreground.
/// Holes are filled, only the largest component is kept, and the result is
/// opened then closed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThresholdTier {
    sigma: f32,
    stddev_factor: f32,
    open_iterations: u8,
    close_iterations: u8,
}

impl ThresholdTier {
    #[must_use]
    pub fn from_params(params: &TierParams) -> Self {
        Self {
            sigma: params.threshold_sigma,
            stddev_factor: params.threshold_stddev_factor,
            open_iterations: params.threshold_open_iterations,
            close_iterations: params.threshold_close_iterations,
        }
    }
}

impl Default for ThresholdTier {
    fn default() -> Self {
        Self::from_params(&TierParams::default())
    }
}

impl SegmentationTier for ThresholdTier {
    fn kind(&self) -> TierKind {
        TierKind::Threshold
    }

    fn segment(&self, image: &PixelBuffer) -> Result<Mask> {
        let smoothed = filters::gaussian(&image.to_luma(), self.sigma);
        let (mean, stddev) = filters::mean_and_stddev(&smoothed);
        let level = mean + f64::from(self.stddev_factor) * stddev;
        debug!(mean, stddev, level, "threshold tier statistics");

        let (width, height) = smoothed.dimensions();
        let binary = GrayImage::from_fn(width, height, |x, y| {
            Luma([if f64::from(smoothed.get_pixel(x, y)[0]) > level {
                255
            } else {
                0
            }])
        });

        let filled = morphology::fill_holes(&binary);
        let largest = morphology::largest_component(&filled, Connectivity::Four);
        let opened = morphology::open(&largest, self.open_iterations);
        let closed = morphology::close(&opened, self.close_iterations);

        Ok(Mask::from_image(closed))
    }
}
