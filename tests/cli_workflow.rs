//! End-to-end runs of the command-line interface on temporary files

#![cfg(feature = "cli")]

mod common;

use clap::Parser;
use common::{png_bytes, square_scene};
use imgly_cutout::{cli::Cli, ImageIOService, PixelBuffer};
use tempfile::TempDir;

fn parse(args: &[&str]) -> Cli {
    Cli::try_parse_from(std::iter::once("imgly-cutout").chain(args.iter().copied())).unwrap()
}

#[tokio::test]
async fn test_cli_writes_default_output_next_to_input() -> anyhow::Result<()> {
    let temp_dir = TempDir::new()?;
    let input = temp_dir.path().join("photo.png");
    std::fs::write(&input, png_bytes(&square_scene(32)))?;

    let input_arg = input.to_string_lossy().to_string();
    imgly_cutout::cli::run(parse(&[input_arg.as_str(), "--no-oracle"])).await?;

    let output = temp_dir.path().join("photo_cutout.png");
    let result = ImageIOService::load_image(&output)?;
    assert_eq!(result.dimensions(), (32, 32));
    assert_eq!(result.channels(), 4);
    Ok(())
}

#[tokio::test]
async fn test_cli_solid_background_with_tier_list() -> anyhow::Result<()> {
    let temp_dir = TempDir::new()?;
    let input = temp_dir.path().join("subject.png");
    let output = temp_dir.path().join("out").join("result.png");
    std::fs::write(&input, png_bytes(&square_scene(40)))?;

    let input_arg = input.to_string_lossy().to_string();
    let output_arg = output.to_string_lossy().to_string();
    imgly_cutout::cli::run(parse(&[
        input_arg.as_str(),
        "-o",
        output_arg.as_str(),
        "--no-oracle",
        "--background",
        "solid",
        "--color",
        "ff0000",
        "--tiers",
        "border,edge",
    ]))
    .await?;

    let result = ImageIOService::load_image(&output)?;
    assert_eq!(result.channels(), 3);
    // Corner is background and takes the requested color
    assert_eq!(result.rgba_at(0, 0), Some([255, 0, 0, 255]));
    Ok(())
}

#[tokio::test]
async fn test_cli_image_background() -> anyhow::Result<()> {
    let temp_dir = TempDir::new()?;
    let input = temp_dir.path().join("subject.png");
    let backdrop = temp_dir.path().join("backdrop.png");
    let output = temp_dir.path().join("composited.png");
    std::fs::write(&input, png_bytes(&square_scene(32)))?;
    std::fs::write(&backdrop, png_bytes(&PixelBuffer::filled_rgb(64, 64, [0, 0, 255])))?;

    let args = [
        input.to_string_lossy().to_string(),
        "-o".to_string(),
        output.to_string_lossy().to_string(),
        "--no-oracle".to_string(),
        "--background".to_string(),
        "image".to_string(),
        "--background-image".to_string(),
        backdrop.to_string_lossy().to_string(),
    ];
    let args: Vec<&str> = args.iter().map(String::as_str).collect();
    imgly_cutout::cli::run(parse(&args)).await?;

    let result = ImageIOService::load_image(&output)?;
    assert_eq!(result.dimensions(), (32, 32));
    assert_eq!(result.rgba_at(0, 0), Some([0, 0, 255, 255]));
    Ok(())
}

#[tokio::test]
async fn test_cli_rejects_invalid_arguments() -> anyhow::Result<()> {
    let temp_dir = TempDir::new()?;
    let input = temp_dir.path().join("subject.png");
    std::fs::write(&input, png_bytes(&square_scene(16)))?;
    let input_arg = input.to_string_lossy().to_string();

    let missing_color = parse(&[input_arg.as_str(), "--background", "solid"]);
    assert!(imgly_cutout::cli::run(missing_color).await.is_err());

    let bad_tiers = parse(&[input_arg.as_str(), "--tiers", "edge,grabcut"]);
    assert!(imgly_cutout::cli::run(bad_tiers).await.is_err());

    let missing_input = parse(&["/nonexistent/subject.png", "--no-oracle"]);
    assert!(imgly_cutout::cli::run(missing_input).await.is_err());

    let not_an_image = temp_dir.path().join("notes.png");
    std::fs::write(&not_an_image, b"plain text")?;
    let not_an_image_arg = not_an_image.to_string_lossy().to_string();
    let undecodable = parse(&[not_an_image_arg.as_str(), "--no-oracle"]);
    assert!(imgly_cutout::cli::run(undecodable).await.is_err());
    Ok(())
}
