//! Binary morphology and region helpers on 0/255 grayscale masks
//!
//! Structuring elements are squares (L∞ distance): radius `k` is a
//! `(2k+1)×(2k+1)` square, so `k` iterations of a 3×3 element equal radius `k`.

use image::{GrayImage, Luma};
use imageproc::{
    distance_transform::Norm,
    morphology,
    region_labelling::{connected_components, Connectivity},
};

/// Dilate with a square of radius `k`
#[must_use]
pub fn dilate(mask: &GrayImage, k: u8) -> GrayImage {
    if k == 0 {
        return mask.clone();
    }
    morphology::dilate(mask, Norm::LInf, k)
}

/// Erode with a square of radius `k`; pixels outside the image count as foreground
#[must_use]
pub fn erode(mask: &GrayImage, k: u8) -> GrayImage {
    if k == 0 {
        return mask.clone();
    }
    morphology::erode(mask, Norm::LInf, k)
}

/// Erosion followed by dilation
#[must_use]
pub fn open(mask: &GrayImage, k: u8) -> GrayImage {
    if k == 0 {
        return mask.clone();
    }
    morphology::open(mask, Norm::LInf, k)
}

/// Dilation followed by erosion
#[must_use]
pub fn close(mask: &GrayImage, k: u8) -> GrayImage {
    if k == 0 {
        return mask.clone();
    }
    morphology::close(mask, Norm::LInf, k)
}

/// Fill background regions that do not touch the image border
///
/// Background connectivity is 4-neighbour, so diagonal gaps in a foreground
/// outline still enclose a hole.
#[must_use]
pub fn fill_holes(mask: &GrayImage) -> GrayImage {
    let (width, height) = mask.dimensions();
    // Single pixels always touch the border; nothing to fill without background
    if !has_labelable_pixels(mask, |value| value != 255) {
        return mask.clone();
    }
    // Label the zero pixels: everything that is not 255 is a candidate
    let labels = connected_components(mask, Connectivity::Four, Luma([255u8]));

    let mut touches_border = vec![false; label_count(&labels) + 1];
    for (x, y, label) in labels.enumerate_pixels() {
        if x == 0 || y == 0 || x + 1 == width || y + 1 == height {
            if let Some(flag) = touches_border.get_mut(label[0] as usize) {
                *flag = true;
            }
        }
    }

    let mut filled = mask.clone();
    for (pixel, label) in filled.pixels_mut().zip(labels.pixels()) {
        let id = label[0] as usize;
        if id != 0 && !touches_border.get(id).copied().unwrap_or(true) {
            *pixel = Luma([255]);
        }
    }
    filled
}

/// Keep only the largest foreground component
///
/// Ties go to the component discovered first in raster-scan order.
/// Masks without foreground are returned unchanged.
#[must_use]
pub fn largest_component(mask: &GrayImage, connectivity: Connectivity) -> GrayImage {
    if !has_labelable_pixels(mask, |value| value != 0) {
        return mask.clone();
    }
    let labels = connected_components(mask, connectivity, Luma([0u8]));
    let Some(best) = largest_label(labels.pixels().map(|p| p[0])) else {
        return mask.clone();
    };

    let (width, height) = mask.dimensions();
    let data = labels
        .pixels()
        .map(|p| if p[0] == best { 255 } else { 0 })
        .collect();
    GrayImage::from_raw(width, height, data).unwrap_or_else(|| mask.clone())
}

/// Most frequent non-zero label; ties resolve to the lowest label
pub(crate) fn largest_label<I>(labels: I) -> Option<u32>
where
    I: IntoIterator<Item = u32>,
{
    let mut counts: Vec<usize> = Vec::new();
    for label in labels {
        let index = label as usize;
        if index >= counts.len() {
            counts.resize(index + 1, 0);
        }
        if let Some(count) = counts.get_mut(index) {
            *count += 1;
        }
    }

    let mut best: Option<(u32, usize)> = None;
    for (label, &count) in counts.iter().enumerate().skip(1) {
        if count > 0 && best.map_or(true, |(_, best_count)| count > best_count) {
            best = Some((label as u32, count));
        }
    }
    best.map(|(label, _)| label)
}

/// Whether labelling `mask` can find anything
///
/// imageproc's labelling asserts on single-pixel images, and a mask with one
/// pixel has exactly one component anyway.
fn has_labelable_pixels(mask: &GrayImage, is_member: impl Fn(u8) -> bool) -> bool {
    mask.width() * mask.height() > 1 && mask.pixels().any(|p| is_member(p[0]))
}

fn label_count(labels: &image::ImageBuffer<Luma<u32>, Vec<u32>>) -> usize {
    labels.pixels().map(|p| p[0] as usize).max().unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mask_from_rows(rows: &[&str]) -> GrayImage {
        let height = rows.len() as u32;
        let width = rows[0].len() as u32;
        GrayImage::from_fn(width, height, |x, y| {
            let row = rows[y as usize].as_bytes();
            Luma([if row[x as usize] == b'#' { 255 } else { 0 }])
        })
    }

    fn rows_of(mask: &GrayImage) -> Vec<String> {
        (0..mask.height())
            .map(|y| {
                (0..mask.width())
                    .map(|x| if mask.get_pixel(x, y)[0] > 0 { '#' } else { '.' })
                    .collect()
            })
            .collect()
    }

    #[test]
    fn test_fill_holes_keeps_border_background() {
        let mask = mask_from_rows(&[
            ".......", //
            ".#####.", //
            ".#...#.", //
            ".#...#.", //
            ".#####.", //
            ".......", //
        ]);
        let filled = fill_holes(&mask);
        assert_eq!(
            rows_of(&filled),
            vec![".......", ".#####.", ".#####.", ".#####.", ".#####.", "......."]
        );
    }

    #[test]
    fn test_fill_holes_diagonal_gap_still_encloses() {
        let mask = mask_from_rows(&[
            ".....", //
            "..#..", //
            ".#.#.", //
            "..#..", //
            ".....", //
        ]);
        let filled = fill_holes(&mask);
        assert_eq!(filled.get_pixel(2, 2)[0], 255);
        assert_eq!(filled.get_pixel(0, 0)[0], 0);
    }

    #[test]
    fn test_fill_holes_open_region_untouched() {
        let mask = mask_from_rows(&[
            ".#.#.", //
            ".#.#.", //
            ".###.", //
        ]);
        assert_eq!(fill_holes(&mask), mask);
    }

    #[test]
    fn test_largest_component_tie_goes_to_first() {
        let mask = mask_from_rows(&[
            "##..##", //
            "##..##", //
            "......", //
            "#.....", //
        ]);
        let largest = largest_component(&mask, Connectivity::Eight);
        assert_eq!(rows_of(&largest), vec!["##....", "##....", "......", "......"]);
    }

    #[test]
    fn test_largest_component_connectivity() {
        let mask = mask_from_rows(&[
            "#....", //
            ".#...", //
            "..###", //
        ]);
        let eight = largest_component(&mask, Connectivity::Eight);
        assert_eq!(eight, mask);

        let four = largest_component(&mask, Connectivity::Four);
        assert_eq!(rows_of(&four), vec![".....", ".....", "..###"]);
    }

    #[test]
    fn test_largest_component_empty_mask() {
        let mask = GrayImage::new(4, 4);
        assert_eq!(largest_component(&mask, Connectivity::Four), mask);
    }

    #[test]
    fn test_single_pixel_masks_pass_through() {
        for value in [0u8, 255] {
            let mask = GrayImage::from_pixel(1, 1, Luma([value]));
            assert_eq!(fill_holes(&mask), mask);
            assert_eq!(largest_component(&mask, Connectivity::Four), mask);
            assert_eq!(largest_component(&mask, Connectivity::Eight), mask);
        }
    }

    #[test]
    fn test_full_masks_pass_through() {
        let full = GrayImage::from_pixel(3, 2, Luma([255]));
        assert_eq!(fill_holes(&full), full);

        let single_row = mask_from_rows(&["#.#.##."]);
        assert_eq!(fill_holes(&single_row), single_row);
        assert_eq!(
            rows_of(&largest_component(&single_row, Connectivity::Four)),
            vec!["....##."]
        );
    }

    #[test]
    fn test_open_removes_speckle() {
        let mut mask = mask_from_rows(&[
            "........", //
            ".####...", //
            ".####...", //
            ".####...", //
            ".####..#", //
            "........", //
        ]);
        mask = open(&mask, 1);
        assert_eq!(mask.get_pixel(7, 4)[0], 0);
        assert_eq!(mask.get_pixel(2, 2)[0], 255);
    }

    #[test]
    fn test_close_bridges_gap_and_is_idempotent() {
        let mask = mask_from_rows(&[
            "..........", //
            ".###.###..", //
            ".###.###..", //
            ".###.###..", //
            "..........", //
        ]);
        let closed = close(&mask, 1);
        assert_eq!(closed.get_pixel(4, 2)[0], 255);
        assert_eq!(close(&closed, 1), closed);
    }

    #[test]
    fn test_zero_radius_is_identity() {
        let mask = mask_from_rows(&["#.#", ".#.", "#.#"]);
        assert_eq!(dilate(&mask, 0), mask);
        assert_eq!(erode(&mask, 0), mask);
        assert_eq!(open(&mask, 0), mask);
        assert_eq!(close(&mask, 0), mask);
    }

    #[test]
    fn test_largest_label() {
        assert_eq!(largest_label([0, 1, 1, 2, 2]), Some(1));
        assert_eq!(largest_label([0, 2, 2, 2, 1]), Some(2));
        assert_eq!(largest_label([0, 0]), None);
        assert_eq!(largest_label(Vec::<u32>::new()), None);
    }
}
