//! Shared helpers for the integration tests

#![allow(dead_code)]

use image::{Rgb, RgbImage};
use imgly_cutout::{
    oracle::{self, MockBehavior, MockOracle},
    CapabilitySet, CutoutConfig, CutoutProcessor, ImageIOService, PixelBuffer, SubjectOracle,
    TierKind,
};
use std::sync::{atomic::AtomicUsize, Arc};

/// Solid background with a filled disk
pub fn disk_image(
    size: u32,
    center: (i64, i64),
    radius: i64,
    background: [u8; 3],
    foreground: [u8; 3],
) -> PixelBuffer {
    PixelBuffer::from_rgb_image(RgbImage::from_fn(size, size, |x, y| {
        let dx = i64::from(x) - center.0;
        let dy = i64::from(y) - center.1;
        if dx * dx + dy * dy <= radius * radius {
            Rgb(foreground)
        } else {
            Rgb(background)
        }
    }))
}

/// Dark image with a bright, slightly textured square in the middle
pub fn square_scene(size: u32) -> PixelBuffer {
    let lo = size / 4;
    let hi = size - size / 4;
    PixelBuffer::from_rgb_image(RgbImage::from_fn(size, size, |x, y| {
        if (lo..hi).contains(&x) && (lo..hi).contains(&y) {
            Rgb([220, 190 + ((x + y) % 5) as u8, 60])
        } else {
            Rgb([25, 35, 70 + ((x * y) % 3) as u8])
        }
    }))
}

pub fn png_bytes(buffer: &PixelBuffer) -> Vec<u8> {
    ImageIOService::encode_png(buffer).unwrap()
}

/// Tier-only configuration with the given walk order
pub fn tier_config(order: Vec<TierKind>) -> CutoutConfig {
    CutoutConfig::builder()
        .tier_order(order)
        .use_oracle(false)
        .build()
        .unwrap()
}

/// Processor backed by an initialized mock oracle, plus its call counter
pub fn mock_processor(
    behavior: MockBehavior,
    capabilities: CapabilitySet,
    config: CutoutConfig,
) -> (CutoutProcessor, Arc<AtomicUsize>) {
    let mut mock = MockOracle::new(behavior);
    let calls = mock.call_counter();
    mock.initialize().unwrap();
    let processor =
        CutoutProcessor::with_capabilities(config, capabilities, Some(oracle::shared(Box::new(mock))))
            .unwrap();
    (processor, calls)
}
