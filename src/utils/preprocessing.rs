//! Oracle input preparation and prediction mapping
//!
//! Images are resized to fit a square model input while keeping their aspect
//! ratio, centered on a padded canvas and normalized into an NCHW tensor. The
//! resulting [`Letterbox`] maps the model's single-channel prediction back onto
//! the original pixel grid.

use crate::{
    error::{CutoutError, Result},
    types::PixelBuffer,
};
use image::{ImageBuffer, Rgb, RgbImage};
use ndarray::Array4;

/// Normalization and sizing expected by the oracle model
#[derive(Debug, Clone, PartialEq)]
pub struct PreprocessingConfig {
    /// Square input edge length
    pub target_size: u32,
    pub normalization_mean: [f32; 3],
    pub normalization_std: [f32; 3],
    pub padding_color: [u8; 3],
}

impl PreprocessingConfig {
    /// ImageNet statistics at the given input size
    #[must_use]
    pub fn imagenet(target_size: u32) -> Self {
        Self {
            target_size,
            normalization_mean: [0.485, 0.456, 0.406],
            normalization_std: [0.229, 0.224, 0.225],
            padding_color: [255, 255, 255],
        }
    }
}

/// Placement of the resized image inside the square canvas
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Letterbox {
    pub original: (u32, u32),
    pub resized: (u32, u32),
    pub offset: (u32, u32),
    pub target_size: u32,
}

impl Letterbox {
    /// Compute the placement of an image of `original` size
    ///
    /// # Errors
    /// - Zero-sized input or target
    pub fn fit(original: (u32, u32), target_size: u32) -> Result<Self> {
        let (width, height) = original;
        if width == 0 || height == 0 || target_size == 0 {
            return Err(CutoutError::invalid_buffer(format!(
                "cannot letterbox {}x{} into {}",
                width, height, target_size
            )));
        }

        let target = target_size as f32;
        let scale = (target / width as f32).min(target / height as f32);
        let resized_width = ((width as f32 * scale).round() as u32).clamp(1, target_size);
        let resized_height = ((height as f32 * scale).round() as u32).clamp(1, target_size);

        Ok(Self {
            original,
            resized: (resized_width, resized_height),
            offset: (
                (target_size - resized_width) / 2,
                (target_size - resized_height) / 2,
            ),
            target_size,
        })
    }

    /// Map a `target_size²` prediction onto the original grid as 8-bit alpha
    ///
    /// Values are min-max normalized first; a constant prediction maps to zero.
    ///
    /// # Errors
    /// - Prediction length does not match the canvas
    pub fn project_prediction(&self, prediction: &[f32]) -> Result<Vec<u8>> {
        let size = self.target_size as usize;
        if prediction.len() != size * size {
            return Err(CutoutError::oracle_failed(format!(
                "prediction has {} values, expected {}",
                prediction.len(),
                size * size
            )));
        }

        let (min, max) = prediction
            .iter()
            .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| {
                (lo.min(v), hi.max(v))
            });
        let range = max - min;

        let (width, height) = self.original;
        let mut alpha = Vec::with_capacity(width as usize * height as usize);
        for y in 0..height {
            let ty = self.offset.1 + (y * self.resized.1 / height).min(self.resized.1 - 1);
            for x in 0..width {
                let tx = self.offset.0 + (x * self.resized.0 / width).min(self.resized.0 - 1);
                let value = prediction
                    .get(ty as usize * size + tx as usize)
                    .copied()
                    .unwrap_or(min);
                let normalized = if range > f32::EPSILON {
                    (value - min) / range
                } else {
                    0.0
                };
                alpha.push((normalized * 255.0).round().clamp(0.0, 255.0) as u8);
            }
        }
        Ok(alpha)
    }
}

/// Builds oracle input tensors
pub struct ImagePreprocessor;

impl ImagePreprocessor {
    /// Letterbox and normalize an image into a `[1, 3, size, size]` tensor
    ///
    /// # Errors
    /// - Degenerate image or target size
    pub fn preprocess(
        image: &PixelBuffer,
        config: &PreprocessingConfig,
    ) -> Result<(Array4<f32>, Letterbox)> {
        let letterbox = Letterbox::fit(image.dimensions(), config.target_size)?;

        let resized = image::imageops::resize(
            &image.to_rgb_image(),
            letterbox.resized.0,
            letterbox.resized.1,
            image::imageops::FilterType::Triangle,
        );

        let mut canvas: RgbImage = ImageBuffer::from_pixel(
            config.target_size,
            config.target_size,
            Rgb(config.padding_color),
        );
        image::imageops::replace(
            &mut canvas,
            &resized,
            i64::from(letterbox.offset.0),
            i64::from(letterbox.offset.1),
        );

        Ok((Self::canvas_to_tensor(&canvas, config), letterbox))
    }

    fn canvas_to_tensor(canvas: &RgbImage, config: &PreprocessingConfig) -> Array4<f32> {
        let size = config.target_size as usize;
        let mut tensor = Array4::<f32>::zeros((1, 3, size, size));

        for (x, y, pixel) in canvas.enumerate_pixels() {
            for channel in 0..3 {
                let value = (f32::from(pixel[channel]) / 255.0
                    - config.normalization_mean[channel])
                    / config.normalization_std[channel];
                if let Some(slot) = tensor.get_mut([0, channel, y as usize, x as usize]) {
                    *slot = value;
                }
            }
        }

        tensor
    }
}
