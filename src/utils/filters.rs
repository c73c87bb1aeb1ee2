//! Grayscale filtering helpers shared by the segmentation tiers

use image::{GrayImage, Luma};
use imageproc::{
    contrast::{threshold, ThresholdType},
    filter::gaussian_blur_f32,
    gradients::sobel_gradients,
};

/// Gaussian smoothing; non-positive sigmas leave the image unchanged
#[must_use]
pub fn gaussian(image: &GrayImage, sigma: f32) -> GrayImage {
    if sigma.is_nan() || sigma <= 0.0 {
        return image.clone();
    }
    gaussian_blur_f32(image, sigma)
}

/// Sobel gradient magnitude clamped to 8 bits
#[must_use]
pub fn sobel_magnitude(image: &GrayImage) -> GrayImage {
    let gradients = sobel_gradients(image);
    let (width, height) = gradients.dimensions();
    GrayImage::from_fn(width, height, |x, y| {
        let magnitude = gradients.get_pixel(x, y)[0];
        Luma([magnitude.min(u16::from(u8::MAX)) as u8])
    })
}

/// Scale each value's distance from the image mean by `factor`
///
/// `out = mean + factor * (v - mean)`, rounded and clamped; the mean is the
/// rounded average intensity.
#[must_use]
pub fn enhance_contrast(image: &GrayImage, factor: f32) -> GrayImage {
    let (mean, _) = mean_and_stddev(image);
    let mean = mean.round() as f32;

    let mut out = image.clone();
    for pixel in out.pixels_mut() {
        let value = mean + factor * (f32::from(pixel[0]) - mean);
        pixel[0] = value.round().clamp(0.0, 255.0) as u8;
    }
    out
}

/// 255 where the value is strictly greater than `level`, 0 elsewhere
#[must_use]
pub fn binarize(image: &GrayImage, level: u8) -> GrayImage {
    threshold(image, level, ThresholdType::Binary)
}

/// Population mean and standard deviation of the intensities
#[must_use]
pub fn mean_and_stddev(image: &GrayImage) -> (f64, f64) {
    mean_and_stddev_of(image.pixels().map(|p| f64::from(p[0])))
}

/// Population mean and standard deviation of arbitrary samples
pub(crate) fn mean_and_stddev_of<I>(values: I) -> (f64, f64)
where
    I: IntoIterator<Item = f64>,
    I::IntoIter: Clone,
{
    let iter = values.into_iter();
    let (count, sum) = iter
        .clone()
        .fold((0usize, 0.0f64), |(n, s), v| (n + 1, s + v));
    if count == 0 {
        return (0.0, 0.0);
    }
    let mean = sum / count as f64;
    let variance = iter.map(|v| (v - mean).powi(2)).sum::<f64>() / count as f64;
    (mean, variance.sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gaussian_dimensions_and_identity() {
        let image = GrayImage::from_fn(17, 9, |x, y| Luma([(x * 7 + y * 13) as u8]));
        assert_eq!(gaussian(&image, 2.0).dimensions(), (17, 9));
        assert_eq!(gaussian(&image, 0.0), image);
        assert_eq!(gaussian(&image, f32::NAN), image);
    }

    #[test]
    fn test_sobel_magnitude_detects_step() {
        let image = GrayImage::from_fn(10, 10, |x, _| Luma([if x < 5 { 0 } else { 255 }]));
        let edges = sobel_magnitude(&image);
        assert_eq!(edges.get_pixel(0, 5)[0], 0);
        assert_eq!(edges.get_pixel(9, 5)[0], 0);
        assert_eq!(edges.get_pixel(4, 5)[0], 255);
        assert_eq!(edges.get_pixel(5, 5)[0], 255);
    }

    #[test]
    fn test_enhance_contrast() {
        let image = GrayImage::from_fn(2, 1, |x, _| Luma([if x == 0 { 100 } else { 140 }]));
        let boosted = enhance_contrast(&image, 2.0);
        assert_eq!(boosted.get_pixel(0, 0)[0], 80);
        assert_eq!(boosted.get_pixel(1, 0)[0], 160);

        let image = GrayImage::from_fn(2, 1, |x, _| Luma([if x == 0 { 0 } else { 250 }]));
        let boosted = enhance_contrast(&image, 4.0);
        assert_eq!(boosted.get_pixel(0, 0)[0], 0);
        assert_eq!(boosted.get_pixel(1, 0)[0], 255);
    }

    #[test]
    fn test_binarize_is_strict() {
        let image = GrayImage::from_fn(3, 1, |x, _| Luma([29 + x as u8]));
        let binary = binarize(&image, 30);
        assert_eq!(binary.as_raw(), &vec![0, 0, 255]);
    }

    #[test]
    fn test_mean_and_stddev() {
        let image = GrayImage::from_fn(4, 1, |x, _| Luma([[2, 4, 4, 6][x as usize]]));
        let (mean, stddev) = mean_and_stddev(&image);
        assert!((mean - 4.0).abs() < 1e-9);
        assert!((stddev - 2.0f64.sqrt()).abs() < 1e-9);

        assert_eq!(mean_and_stddev_of(Vec::<f64>::new()), (0.0, 0.0));
    }
}
