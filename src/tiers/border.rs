//! Border-color distance tier
//!
//! Assumes the image border shows background. Pixels whose color is far from
//! the mean border color are foreground. Not part of the default walk.

use super::{SegmentationTier, TierKind};
use crate::{
    config::TierParams,
    error::Result,
    types::{Mask, PixelBuffer},
    utils::filters::mean_and_stddev_of,
};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BorderColorTier {
    stddev_factor: f32,
}

impl BorderColorTier {
    #[must_use]
    pub fn new(stddev_factor: f32) -> Self {
        Self { stddev_factor }
    }

    #[must_use]
    pub fn from_params(params: &TierParams) -> Self {
        Self::new(params.border_stddev_factor)
    }
}

impl Default for BorderColorTier {
    fn default() -> Self {
        Self::from_params(&TierParams::default())
    }
}

/// Mean RGB of the top and bottom rows and the left and right columns
fn mean_border_color(image: &PixelBuffer) -> [f64; 3] {
    let (width, height) = image.dimensions();
    let mut sum = [0.0f64; 3];
    let mut count = 0usize;

    let mut add = |x: u32, y: u32| {
        if let Some([r, g, b, _]) = image.rgba_at(x, y) {
            sum[0] += f64::from(r);
            sum[1] += f64::from(g);
            sum[2] += f64::from(b);
            count += 1;
        }
    };
    for x in 0..width {
        add(x, 0);
        add(x, height - 1);
    }
    for y in 0..height {
        add(0, y);
        add(width - 1, y);
    }

    let count = count.max(1) as f64;
    [sum[0] / count, sum[1] / count, sum[2] / count]
}

impl SegmentationTier for BorderColorTier {
    fn kind(&self) -> TierKind {
        TierKind::Border
    }

    fn segment(&self, image: &PixelBuffer) -> Result<Mask> {
        let [mr, mg, mb] = mean_border_color(image);
        let distances: Vec<f64> = image
            .rgb_pixels()
            .map(|[r, g, b]| {
                let dr = f64::from(r) - mr;
                let dg = f64::from(g) - mg;
                let db = f64::from(b) - mb;
                (dr * dr + dg * dg + db * db).sqrt()
            })
            .collect();

        let (mean, stddev) = mean_and_stddev_of(distances.iter().copied());
        let level = mean + f64::from(self.stddev_factor) * stddev;

        let data = distances
            .iter()
            .map(|&d| if d > level { 255 } else { 0 })
            .collect();
        Mask::new(data, image.dimensions())
    }
}
