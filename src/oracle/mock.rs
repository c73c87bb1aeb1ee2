//! Scriptable oracle for testing the fallback chain
//!
//! `MockOracle` stands in for a real extractor so that every oracle outcome the
//! pipeline must recover from (errors, panics, malformed output, slowness) can
//! be produced on demand without model files.

use super::SubjectOracle;
use crate::{
    error::{CutoutError, Result},
    types::PixelBuffer,
};
use instant::Duration;
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

/// What a [`MockOracle`] does when asked to extract
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockBehavior {
    /// Opaque ellipse centered in the image, semi-axes a third of each side
    CenteredEllipse,
    /// Every pixel opaque
    FullAlpha,
    /// Every pixel transparent
    EmptyAlpha,
    /// `initialize` fails
    FailInit,
    /// `extract` returns an error
    Fail,
    /// `extract` panics
    Panic,
    /// Output one pixel narrower than the input
    WrongDimensions,
    /// Output is RGB without an alpha channel
    MissingAlpha,
    /// Sleep before returning the centered ellipse
    Slow(Duration),
}

/// Mock oracle for tests
#[derive(Debug, Clone)]
pub struct MockOracle {
    behavior: MockBehavior,
    initialized: bool,
    calls: Arc<AtomicUsize>,
}

impl MockOracle {
    #[must_use]
    pub fn new(behavior: MockBehavior) -> Self {
        Self {
            behavior,
            initialized: false,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Shared counter of `extract` calls, valid after the oracle is moved
    #[must_use]
    pub fn call_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.calls)
    }

    #[must_use]
    pub fn behavior(&self) -> MockBehavior {
        self.behavior
    }
}

/// RGBA copy of `image` with alpha from `alpha_at(x, y)`
fn with_alpha<F>(image: &PixelBuffer, alpha_at: F) -> Result<PixelBuffer>
where
    F: Fn(u32, u32) -> u8,
{
    let width = image.width();
    let data = image
        .rgb_pixels()
        .enumerate()
        .flat_map(|(index, [r, g, b])| {
            let x = (index % width as usize) as u32;
            let y = (index / width as usize) as u32;
            [r, g, b, alpha_at(x, y)]
        })
        .collect();
    PixelBuffer::new(image.width(), image.height(), 4, data)
}

fn centered_ellipse(image: &PixelBuffer) -> Result<PixelBuffer> {
    let (width, height) = image.dimensions();
    let cx = f64::from(width) / 2.0;
    let cy = f64::from(height) / 2.0;
    let rx = (f64::from(width) / 3.0).max(0.5);
    let ry = (f64::from(height) / 3.0).max(0.5);

    with_alpha(image, |x, y| {
        let dx = (f64::from(x) + 0.5 - cx) / rx;
        let dy = (f64::from(y) + 0.5 - cy) / ry;
        if dx * dx + dy * dy <= 1.0 {
            255
        } else {
            0
        }
    })
}

impl SubjectOracle for MockOracle {
    fn name(&self) -> &str {
        "mock"
    }

    fn initialize(&mut self) -> Result<()> {
        if self.behavior == MockBehavior::FailInit {
            return Err(CutoutError::oracle_failed("mock oracle initialization failed"));
        }
        self.initialized = true;
        Ok(())
    }

    fn is_initialized(&self) -> bool {
        self.initialized
    }

    fn extract(&mut self, image: &PixelBuffer) -> Result<PixelBuffer> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.initialized {
            return Err(CutoutError::oracle_failed("mock oracle not initialized"));
        }

        match self.behavior {
            MockBehavior::CenteredEllipse => centered_ellipse(image),
            MockBehavior::FullAlpha => with_alpha(image, |_, _| 255),
            MockBehavior::EmptyAlpha => with_alpha(image, |_, _| 0),
            MockBehavior::FailInit | MockBehavior::Fail => {
                Err(CutoutError::oracle_failed("mock oracle extraction failed"))
            },
            MockBehavior::Panic => panic!("mock oracle panicked"),
            MockBehavior::WrongDimensions => {
                let width = image.width() + 1;
                PixelBuffer::new(
                    width,
                    image.height(),
                    4,
                    vec![255; width as usize * image.height() as usize * 4],
                )
            },
            MockBehavior::MissingAlpha => {
                PixelBuffer::new(image.width(), image.height(), 3, image.rgb_pixels().flatten().collect())
            },
            MockBehavior::Slow(delay) => {
                std::thread::sleep(delay);
                centered_ellipse(image)
            },
        }
    }
}
