//! Seeded watershed tier
//!
//! Regional intensity maxima of the smoothed image seed a priority flood over
//! the negated intensity surface. The largest flooded region is reported as
//! the foreground.

use super::{SegmentationTier, TierKind};
use crate::{
    config::TierParams,
    error::{CutoutError, Result},
    types::{Mask, PixelBuffer},
    utils::{filters, morphology::largest_label},
};
use image::GrayImage;
use std::{cmp::Reverse, collections::BinaryHeap};
use tracing::debug;

const NEIGHBORS_8: [(i64, i64); 8] = [
    (-1, -1),
    (0, -1),
    (1, -1),
    (-1, 0),
    (1, 0),
    (-1, 1),
    (0, 1),
    (1, 1),
];
const NEIGHBORS_4: [(i64, i64); 4] = [(0, -1), (-1, 0), (1, 0), (0, 1)];

/// Marker-based flooding from local maxima
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WatershedTier {
    sigma: f32,
}

impl WatershedTier {
    #[must_use]
    pub fn new(sigma: f32) -> Self {
        Self { sigma }
    }

    #[must_use]
    pub fn from_params(params: &TierParams) -> Self {
        Self::new(params.watershed_sigma)
    }
}

impl Default for WatershedTier {
    fn default() -> Self {
        Self::from_params(&TierParams::default())
    }
}

/// Row-major grid addressing with bounds-checked neighbor offsets
struct Grid {
    width: usize,
    height: usize,
}

impl Grid {
    fn neighbor(&self, index: usize, (dx, dy): (i64, i64)) -> Option<usize> {
        let x = (index % self.width) as i64 + dx;
        let y = (index / self.width) as i64 + dy;
        if x < 0 || y < 0 || x >= self.width as i64 || y >= self.height as i64 {
            return None;
        }
        Some(y as usize * self.width + x as usize)
    }
}

/// Label regional maxima plateaus with 8-connectivity in raster-scan order
///
/// A plateau is a maximum when no pixel on it has a strictly higher
/// 8-neighbour. Returns the label image (0 = not a seed) and the seed count.
fn label_maxima(values: &[u8], grid: &Grid) -> (Vec<u32>, u32) {
    let mut labels = vec![0u32; values.len()];
    let mut visited = vec![false; values.len()];
    let mut next_label = 0u32;
    let mut plateau = Vec::new();
    let mut stack = Vec::new();

    for start in 0..values.len() {
        if visited.get(start).copied().unwrap_or(true) {
            continue;
        }
        let level = values.get(start).copied().unwrap_or(0);

        // Collect the equal-valued 8-connected plateau containing `start`
        plateau.clear();
        stack.push(start);
        if let Some(seen) = visited.get_mut(start) {
            *seen = true;
        }
        let mut is_maximum = true;
        while let Some(index) = stack.pop() {
            plateau.push(index);
            for offset in NEIGHBORS_8 {
                let Some(neighbor) = grid.neighbor(index, offset) else {
                    continue;
                };
                let value = values.get(neighbor).copied().unwrap_or(0);
                if value > level {
                    is_maximum = false;
                } else if value == level && !visited.get(neighbor).copied().unwrap_or(true) {
                    if let Some(seen) = visited.get_mut(neighbor) {
                        *seen = true;
                    }
                    stack.push(neighbor);
                }
            }
        }

        if is_maximum {
            next_label += 1;
            for &index in &plateau {
                if let Some(label) = labels.get_mut(index) {
                    *label = next_label;
                }
            }
        }
    }

    (labels, next_label)
}

/// Flood from the seeds in order of decreasing intensity
///
/// Equal priorities are served first-in first-out, so results do not depend
/// on heap internals.
fn flood(values: &[u8], labels: &mut [u32], grid: &Grid) {
    let mut queue = BinaryHeap::new();
    let mut sequence = 0u64;

    for (index, &label) in labels.iter().enumerate() {
        if label != 0 {
            let depth = u8::MAX - values.get(index).copied().unwrap_or(0);
            queue.push(Reverse((depth, sequence, index)));
            sequence += 1;
        }
    }

    while let Some(Reverse((_, _, index))) = queue.pop() {
        let label = labels.get(index).copied().unwrap_or(0);
        for offset in NEIGHBORS_4 {
            let Some(neighbor) = grid.neighbor(index, offset) else {
                continue;
            };
            if let Some(slot) = labels.get_mut(neighbor) {
                if *slot == 0 {
                    *slot = label;
                    let depth = u8::MAX - values.get(neighbor).copied().unwrap_or(0);
                    queue.push(Reverse((depth, sequence, neighbor)));
                    sequence += 1;
                }
            }
        }
    }
}

fn segment_gray(smoothed: &GrayImage) -> Result<Mask> {
    let (width, height) = smoothed.dimensions();
    let grid = Grid {
        width: width as usize,
        height: height as usize,
    };
    let values = smoothed.as_raw();

    let (mut labels, seeds) = label_maxima(values, &grid);
    if seeds == 0 {
        return Err(CutoutError::tier_failed(
            TierKind::Watershed,
            "no intensity maxima to seed from",
        ));
    }

    flood(values, &mut labels, &grid);

    let best = largest_label(labels.iter().copied()).ok_or_else(|| {
        CutoutError::tier_failed(TierKind::Watershed, "flooding produced no regions")
    })?;
    debug!(seeds, largest = best, "watershed flooding complete");

    let data = labels
        .iter()
        .map(|&label| if label == best { 255 } else { 0 })
        .collect();
    Mask::new(data, (width, height))
}

impl SegmentationTier for WatershedTier {
    fn kind(&self) -> TierKind {
        TierKind::Watershed
    }

    fn segment(&self, image: &PixelBuffer) -> Result<Mask> {
        let smoothed = filters::gaussian(&image.to_luma(), self.sigma);
        segment_gray(&smoothed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    fn grid(width: usize, height: usize) -> Grid {
        Grid { width, height }
    }

    #[test]
    fn test_label_maxima_plateaus() {
        // Two peaks; the 5-plateau touches a 6 so it is not a maximum
        let values = [
            9, 9, 1, 5, 5, //
            9, 1, 1, 5, 6, //
            1, 1, 1, 1, 1, //
        ];
        let (labels, count) = label_maxima(&values, &grid(5, 3));
        assert_eq!(count, 2);
        assert_eq!(&labels[0..5], &[1, 1, 0, 0, 0]);
        assert_eq!(labels[5], 1);
        assert_eq!(labels[9], 2);
        assert_eq!(labels[3], 0);
    }

    #[test]
    fn test_uniform_image_is_single_region() {
        let image = GrayImage::from_pixel(8, 6, Luma([77]));
        let mask = segment_gray(&image).unwrap();
        assert_eq!(mask.foreground_count(), 48);
    }

    #[test]
    fn test_flood_splits_at_valley() {
        // Bright left block, dim right block, dark valley between them;
        // the valley is reached first from the brighter side
        let image = GrayImage::from_fn(9, 3, |x, _| {
            Luma([match x {
                0..=4 => 200,
                5 => 10,
                _ => 100,
            }])
        });
        let mask = segment_gray(&image).unwrap();
        for y in 0..3 {
            for x in 0..9 {
                let expected = if x <= 5 { 255 } else { 0 };
                assert_eq!(mask.get(x, y), Some(expected), "pixel ({}, {})", x, y);
            }
        }
    }

    #[test]
    fn test_mask_dimensions_follow_input() {
        let image = PixelBuffer::filled_rgb(13, 7, [30, 60, 90]);
        let mask = WatershedTier::default().segment(&image).unwrap();
        assert_eq!(mask.dimensions(), (13, 7));
    }
}
