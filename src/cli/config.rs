//! Configuration conversion utilities for CLI arguments

use crate::cli::main_impl::{Cli, CliBackground};
use crate::{
    config::{parse_hex_color, BackgroundInput, CutoutConfig},
    tiers::parse_tier_list,
};
use anyhow::{Context, Result};
use std::time::Duration;

/// Convert CLI arguments to a [`CutoutConfig`]
pub(crate) struct CliConfigBuilder;

impl CliConfigBuilder {
    /// Build a validated `CutoutConfig` from CLI arguments
    pub(crate) fn from_cli(cli: &Cli) -> Result<CutoutConfig> {
        let mut builder = CutoutConfig::builder()
            .use_oracle(!cli.no_oracle)
            .keep_largest_component(cli.largest_component)
            .debug(cli.verbose >= 2);

        if let Some(list) = &cli.tiers {
            let order = parse_tier_list(list).context("Invalid tier list")?;
            builder = builder.tier_order(order);
        }
        if let Some(model) = &cli.model {
            builder = builder.oracle_model(model.clone());
        }
        if let Some(ms) = cli.oracle_timeout_ms {
            builder = builder.oracle_timeout(Duration::from_millis(ms));
        }

        builder.build().context("Invalid configuration")
    }

    /// Validate argument combinations that clap cannot express
    pub(crate) fn validate_cli(cli: &Cli) -> Result<()> {
        match cli.background {
            CliBackground::Solid => {
                let color = cli
                    .color
                    .as_deref()
                    .context("--color is required for a solid background")?;
                parse_hex_color(color).context("Invalid background color")?;
            },
            CliBackground::Image => {
                if cli.background_image.is_none() {
                    anyhow::bail!("--background-image is required for an image background");
                }
            },
            CliBackground::Transparent => {},
        }

        if let Some(model) = &cli.model {
            if !model.is_file() {
                anyhow::bail!("Model file not found: {}", model.display());
            }
        }

        Ok(())
    }

    /// Resolve the background selector once the background bytes are loaded
    pub(crate) fn background_input<'a>(
        cli: &Cli,
        image: Option<&'a [u8]>,
    ) -> Result<BackgroundInput<'a>> {
        BackgroundInput::from_parts(cli.background.into(), cli.color.as_deref(), image)
            .context("Invalid background selection")
    }
}
