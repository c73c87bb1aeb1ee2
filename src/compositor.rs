//! Alpha application and background flattening

use crate::{
    error::{CutoutError, Result},
    types::{BackgroundSpec, Mask, PixelBuffer},
};
use image::{imageops::FilterType, RgbImage};
use tracing::{debug, warn};

/// Composited image plus a note when the requested background was unusable
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompositeOutput {
    pub image: PixelBuffer,
    pub degraded: Option<String>,
}

/// Applies masks and blends subjects over backgrounds
pub struct Compositor;

impl Compositor {
    /// Replace the subject's alpha with `mask`, yielding RGBA
    ///
    /// # Errors
    /// - Mask dimensions differ from the subject's
    pub fn apply_mask(subject: &PixelBuffer, mask: &Mask) -> Result<PixelBuffer> {
        ensure_matching(subject, mask)?;

        let data = subject
            .rgb_pixels()
            .zip(mask.data())
            .flat_map(|([r, g, b], &a)| [r, g, b, a])
            .collect();
        PixelBuffer::new(subject.width(), subject.height(), 4, data)
    }

    /// Composite `subject` masked by `mask` over `background`
    ///
    /// Transparent backgrounds produce RGBA; all others are flattened to opaque
    /// RGB. An image background that cannot be matched to the subject's size
    /// is replaced by opaque black and reported through
    /// [`CompositeOutput::degraded`].
    ///
    /// # Errors
    /// - Mask dimensions differ from the subject's
    pub fn composite(
        subject: &PixelBuffer,
        mask: &Mask,
        background: &BackgroundSpec,
    ) -> Result<CompositeOutput> {
        ensure_matching(subject, mask)?;

        match background {
            BackgroundSpec::Transparent => Ok(CompositeOutput {
                image: Self::apply_mask(subject, mask)?,
                degraded: None,
            }),
            BackgroundSpec::Solid(color) => Ok(CompositeOutput {
                image: blend(subject, mask, |_| *color)?,
                degraded: None,
            }),
            BackgroundSpec::Image(bg) => match fit_background(bg, subject.dimensions()) {
                Ok(resized) => {
                    let image = blend(subject, mask, |index| {
                        let (w, _) = subject.dimensions();
                        let x = (index % w as usize) as u32;
                        let y = (index / w as usize) as u32;
                        resized.get_pixel(x, y).0
                    })?;
                    Ok(CompositeOutput {
                        image,
                        degraded: None,
                    })
                },
                Err(err) => Self::degraded(subject, mask, &err.to_string()),
            },
        }
    }

    /// Flatten against opaque black and record why
    ///
    /// # Errors
    /// - Mask dimensions differ from the subject's
    pub fn degraded(subject: &PixelBuffer, mask: &Mask, reason: &str) -> Result<CompositeOutput> {
        warn!(reason, "background unusable, compositing onto black");
        Ok(CompositeOutput {
            image: blend(subject, mask, |_| [0, 0, 0])?,
            degraded: Some(reason.to_string()),
        })
    }
}

fn ensure_matching(subject: &PixelBuffer, mask: &Mask) -> Result<()> {
    if mask.matches(subject) {
        return Ok(());
    }
    Err(CutoutError::invalid_buffer(format!(
        "mask {}x{} does not match subject {}x{}",
        mask.width(),
        mask.height(),
        subject.width(),
        subject.height()
    )))
}

/// Resize an image background to the subject's dimensions with Lanczos3
fn fit_background(background: &PixelBuffer, (width, height): (u32, u32)) -> Result<RgbImage> {
    let rgb = background.to_rgb_image();
    let resized = if rgb.dimensions() == (width, height) {
        rgb
    } else {
        debug!(
            from_width = rgb.width(),
            from_height = rgb.height(),
            to_width = width,
            to_height = height,
            "resizing background"
        );
        image::imageops::resize(&rgb, width, height, FilterType::Lanczos3)
    };

    if resized.dimensions() != (width, height) {
        return Err(CutoutError::CompositeDegraded(format!(
            "background resized to {}x{}, expected {}x{}",
            resized.width(),
            resized.height(),
            width,
            height
        )));
    }
    Ok(resized)
}

/// `out = s·a + c·(1−a)` per channel with integer rounding
fn blend_channel(subject: u8, background: u8, alpha: u8) -> u8 {
    let a = u32::from(alpha);
    let value = u32::from(subject) * a + u32::from(background) * (255 - a);
    ((value + 127) / 255) as u8
}

fn blend<F>(subject: &PixelBuffer, mask: &Mask, background_at: F) -> Result<PixelBuffer>
where
    F: Fn(usize) -> [u8; 3],
{
    let data = subject
        .rgb_pixels()
        .zip(mask.data())
        .enumerate()
        .flat_map(|(index, ([r, g, b], &a))| {
            let [br, bg, bb] = background_at(index);
            [
                blend_channel(r, br, a),
                blend_channel(g, bg, a),
                blend_channel(b, bb, a),
            ]
        })
        .collect();
    PixelBuffer::new(subject.width(), subject.height(), 3, data)
}
