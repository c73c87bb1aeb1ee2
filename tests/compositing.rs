//! Compositing properties of masks over each background kind

mod common;

use common::{png_bytes, square_scene, tier_config};
use image::{imageops::FilterType, Rgb, RgbImage};
use imgly_cutout::{
    BackgroundInput, BackgroundSpec, CapabilitySet, Compositor, CutoutProcessor, ImageIOService,
    Mask, PixelBuffer, TierKind,
};

fn gradient(width: u32, height: u32) -> PixelBuffer {
    PixelBuffer::from_rgb_image(RgbImage::from_fn(width, height, |x, y| {
        Rgb([(x * 5 % 256) as u8, (y * 3 % 256) as u8, ((x + y) % 256) as u8])
    }))
}

#[test]
fn test_full_foreground_over_black_keeps_subject() {
    let subject = gradient(37, 23);
    let mask = Mask::full_foreground(37, 23);

    let output = Compositor::composite(&subject, &mask, &BackgroundSpec::Solid([0, 0, 0])).unwrap();

    assert!(output.degraded.is_none());
    assert_eq!(output.image.channels(), 3);
    assert_eq!(output.image.data(), subject.data());
}

#[test]
fn test_full_background_yields_uniform_color() {
    let subject = gradient(20, 30);
    let mask = Mask::empty(20, 30);
    let color = [0x12, 0xab, 0xef];

    let output = Compositor::composite(&subject, &mask, &BackgroundSpec::Solid(color)).unwrap();

    assert!(output.image.rgb_pixels().all(|pixel| pixel == color));
}

#[test]
fn test_image_background_is_resized_to_subject() {
    let subject = gradient(50, 50);
    let background = PixelBuffer::from_rgb_image(RgbImage::from_fn(100, 100, |x, y| {
        Rgb([(x * 2) as u8, (y * 2) as u8, 128])
    }));
    let expected = image::imageops::resize(
        &background.to_rgb_image(),
        50,
        50,
        FilterType::Lanczos3,
    );

    let output = Compositor::composite(
        &subject,
        &Mask::empty(50, 50),
        &BackgroundSpec::Image(background),
    )
    .unwrap();

    assert!(output.degraded.is_none());
    assert_eq!(output.image.dimensions(), (50, 50));
    assert_eq!(output.image.data(), expected.as_raw().as_slice());
}

#[test]
fn test_transparent_keeps_mask_as_alpha() {
    let subject = gradient(16, 16);
    let mut data = vec![0u8; 256];
    data[..128].fill(255);
    let mask = Mask::new(data, (16, 16)).unwrap();

    let output = Compositor::composite(&subject, &mask, &BackgroundSpec::Transparent).unwrap();

    assert_eq!(output.image.channels(), 4);
    assert_eq!(output.image.rgba_at(3, 2).map(|p| p[3]), Some(255));
    assert_eq!(output.image.rgba_at(3, 12).map(|p| p[3]), Some(0));
    // Color is kept under transparent pixels
    let [r, g, b] = subject.rgb_pixels().nth(12 * 16 + 3).unwrap();
    assert_eq!(output.image.rgba_at(3, 12), Some([r, g, b, 0]));
}

#[test]
fn test_partial_alpha_blends() {
    let subject = PixelBuffer::filled_rgb(2, 1, [200, 100, 0]);
    let mask = Mask::new(vec![128, 128], (2, 1)).unwrap();

    let output = Compositor::composite(&subject, &mask, &BackgroundSpec::Solid([0, 0, 200])).unwrap();

    let pixel = output.image.rgba_at(0, 0).unwrap();
    assert_eq!(pixel[3], 255);
    assert!((99..=101).contains(&pixel[0]));
    assert!((49..=51).contains(&pixel[1]));
    assert!((98..=100).contains(&pixel[2]));
}

#[test]
fn test_mismatched_mask_is_rejected() {
    let subject = gradient(10, 10);
    let result = Compositor::composite(&subject, &Mask::empty(9, 10), &BackgroundSpec::Transparent);
    assert!(result.is_err());
}

#[test]
fn test_unreadable_background_degrades_to_black() {
    let processor = CutoutProcessor::with_capabilities(
        tier_config(vec![TierKind::Border, TierKind::Edge]),
        CapabilitySet::tiers_only(),
        None,
    )
    .unwrap();
    let subject = png_bytes(&square_scene(32));

    let outcome = processor
        .process_bytes(&subject, BackgroundInput::Image(b"definitely not an image"))
        .unwrap();

    assert!(outcome.is_degraded());
    assert_eq!(outcome.image.channels(), 3);
    // Corners are background, so they come out black
    assert_eq!(outcome.image.rgba_at(0, 0), Some([0, 0, 0, 255]));
}

#[test]
fn test_png_output_channels_follow_background() {
    let processor = CutoutProcessor::with_capabilities(
        tier_config(vec![TierKind::Border, TierKind::Edge]),
        CapabilitySet::tiers_only(),
        None,
    )
    .unwrap();
    let subject = png_bytes(&square_scene(32));
    let backdrop = png_bytes(&gradient(64, 48));

    for (background, channels) in [
        (BackgroundInput::Transparent, 4),
        (BackgroundInput::Solid([9, 9, 9]), 3),
        (BackgroundInput::Image(&backdrop), 3),
    ] {
        let mut outcome = processor.process_bytes(&subject, background).unwrap();
        assert!(!outcome.is_degraded());
        let png = outcome.to_png_bytes().unwrap();
        let decoded = ImageIOService::decode(&png).unwrap();
        assert_eq!(decoded.channels(), channels, "{:?}", background.mode());
        assert_eq!(decoded.dimensions(), (32, 32));
    }
}
