//! Configuration types for cutout and compositing operations

use crate::{
    error::{CutoutError, Result},
    tiers::TierKind,
};
use serde::{Deserialize, Serialize};
use std::{path::PathBuf, str::FromStr, time::Duration};

/// Environment variable naming the default oracle model file
pub const ORACLE_MODEL_ENV: &str = "IMGLY_CUTOUT_MODEL";

/// Background selection mode as accepted from callers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackgroundMode {
    /// Keep transparency
    #[default]
    Transparent,
    /// Flatten onto a solid color
    Solid,
    /// Flatten onto a background image
    Image,
}

impl std::fmt::Display for BackgroundMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Transparent => write!(f, "transparent"),
            Self::Solid => write!(f, "solid"),
            Self::Image => write!(f, "image"),
        }
    }
}

impl FromStr for BackgroundMode {
    type Err = CutoutError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "transparent" => Ok(Self::Transparent),
            "solid" => Ok(Self::Solid),
            "image" => Ok(Self::Image),
            other => Err(CutoutError::invalid_config(format!(
                "Invalid background type '{}'. Must be transparent, solid, or image",
                other
            ))),
        }
    }
}

/// Parse a `RRGGBB` color, with or without a leading `#`
///
/// # Examples
/// ```rust
/// use imgly_cutout::config::parse_hex_color;
///
/// assert_eq!(parse_hex_color("#FF8000").unwrap(), [255, 128, 0]);
/// assert_eq!(parse_hex_color("00ff00").unwrap(), [0, 255, 0]);
/// assert!(parse_hex_color("#FFF").is_err());
/// ```
///
/// # Errors
/// - Anything other than exactly six hexadecimal digits after the optional `#`
pub fn parse_hex_color(value: &str) -> Result<[u8; 3]> {
    let trimmed = value.trim();
    let hex = trimmed.strip_prefix('#').unwrap_or(trimmed);

    if hex.len() != 6 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(CutoutError::invalid_config(format!(
            "Invalid color '{}'. Expected 6 hex digits such as #FF0000",
            value
        )));
    }

    let channel = |range: std::ops::Range<usize>| -> Result<u8> {
        let digits = hex
            .get(range)
            .ok_or_else(|| CutoutError::invalid_config(format!("Invalid color '{}'", value)))?;
        u8::from_str_radix(digits, 16)
            .map_err(|e| CutoutError::invalid_config(format!("Invalid color '{}': {}", value, e)))
    };

    Ok([channel(0..2)?, channel(2..4)?, channel(4..6)?])
}

/// Background request before any decoding happens
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackgroundInput<'a> {
    Transparent,
    Solid([u8; 3]),
    /// Encoded background image bytes; decoded during processing
    Image(&'a [u8]),
}

impl<'a> BackgroundInput<'a> {
    /// Validate a mode selector together with its companion fields
    ///
    /// # Errors
    /// - `solid` without a color, or with an invalid color
    /// - `image` without background bytes, or with empty bytes
    pub fn from_parts(
        mode: BackgroundMode,
        color: Option<&str>,
        image: Option<&'a [u8]>,
    ) -> Result<Self> {
        match mode {
            BackgroundMode::Transparent => Ok(Self::Transparent),
            BackgroundMode::Solid => {
                let color = color.ok_or_else(|| {
                    CutoutError::invalid_config("Background color required for solid background")
                })?;
                Ok(Self::Solid(parse_hex_color(color)?))
            },
            BackgroundMode::Image => match image {
                Some(bytes) if !bytes.is_empty() => Ok(Self::Image(bytes)),
                _ => Err(CutoutError::invalid_config(
                    "Background image required for image background",
                )),
            },
        }
    }

    #[must_use]
    pub fn mode(&self) -> BackgroundMode {
        match self {
            Self::Transparent => BackgroundMode::Transparent,
            Self::Solid(_) => BackgroundMode::Solid,
            Self::Image(_) => BackgroundMode::Image,
        }
    }
}

/// Tunable constants of the classical tiers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TierParams {
    /// Refinement rounds of the grabcut tier
    pub grabcut_iterations: u32,
    /// Fraction of width/height excluded on each side of the grabcut seed rectangle
    pub grabcut_margin: f32,
    /// Gaussian sigma before watershed seeding
    pub watershed_sigma: f32,
    /// Gaussian sigma before statistical thresholding
    pub threshold_sigma: f32,
    /// Threshold = mean + factor * stddev
    pub threshold_stddev_factor: f32,
    /// Opening radius applied by the threshold tier
    pub threshold_open_iterations: u8,
    /// Closing radius applied by the threshold tier
    pub threshold_close_iterations: u8,
    /// Contrast factor applied to the edge map
    pub edge_contrast: f32,
    /// Edge magnitudes strictly above this value count as foreground
    pub edge_threshold: u8,
    /// Border tier threshold = mean + factor * stddev of color distances
    pub border_stddev_factor: f32,
}

impl Default for TierParams {
    fn default() -> Self {
        Self {
            grabcut_iterations: 5,
            grabcut_margin: 0.1,
            watershed_sigma: 1.0,
            threshold_sigma: 2.0,
            threshold_stddev_factor: 0.5,
            threshold_open_iterations: 2,
            threshold_close_iterations: 3,
            edge_contrast: 2.0,
            edge_threshold: 30,
            border_stddev_factor: 0.5,
        }
    }
}

impl TierParams {
    /// Validate ranges of every parameter
    ///
    /// # Errors
    /// - Any parameter outside its documented range
    pub fn validate(&self) -> Result<()> {
        if !(1..=20).contains(&self.grabcut_iterations) {
            return Err(CutoutError::config_value_error(
                "grabcut iterations",
                self.grabcut_iterations,
                "1-20",
                Some(5),
            ));
        }
        if !(0.1..=0.2).contains(&self.grabcut_margin) {
            return Err(CutoutError::config_value_error(
                "grabcut margin",
                self.grabcut_margin,
                "0.1-0.2",
                Some(0.1),
            ));
        }
        for (name, sigma, recommended) in [
            ("watershed sigma", self.watershed_sigma, 1.0),
            ("threshold sigma", self.threshold_sigma, 2.0),
        ] {
            if !(sigma > 0.0 && sigma <= 10.0) {
                return Err(CutoutError::config_value_error(
                    name,
                    sigma,
                    "greater than 0 and at most 10",
                    Some(recommended),
                ));
            }
        }
        for (name, factor) in [
            ("threshold stddev factor", self.threshold_stddev_factor),
            ("border stddev factor", self.border_stddev_factor),
        ] {
            if !(0.0..=5.0).contains(&factor) {
                return Err(CutoutError::config_value_error(
                    name,
                    factor,
                    "0-5",
                    Some(0.5),
                ));
            }
        }
        if !(self.edge_contrast > 0.0 && self.edge_contrast <= 10.0) {
            return Err(CutoutError::config_value_error(
                "edge contrast",
                self.edge_contrast,
                "greater than 0 and at most 10",
                Some(2.0),
            ));
        }
        Ok(())
    }
}

/// Morphological cleanup applied to every tier mask
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CleanupParams {
    pub open_iterations: u8,
    pub close_iterations: u8,
    /// Discard every foreground region except the largest one
    pub keep_largest_component: bool,
}

impl Default for CleanupParams {
    fn default() -> Self {
        Self {
            open_iterations: 1,
            close_iterations: 2,
            keep_largest_component: false,
        }
    }
}

/// Primary oracle settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OracleConfig {
    /// Try the oracle before the classical tiers
    pub enabled: bool,
    /// Model file; falls back to the `IMGLY_CUTOUT_MODEL` environment variable
    pub model: Option<PathBuf>,
    /// Square model input resolution
    pub input_size: u32,
    /// Calls slower than this are discarded as failures
    pub timeout: Option<Duration>,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            model: None,
            input_size: 320,
            timeout: None,
        }
    }
}

/// Configuration for cutout operations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CutoutConfig {
    /// Order in which classical tiers are tried; must end with `edge`
    pub tier_order: Vec<TierKind>,
    pub tier_params: TierParams,
    pub cleanup: CleanupParams,
    pub oracle: OracleConfig,
    /// Enable debug mode (additional logging)
    pub debug: bool,
}

impl Default for CutoutConfig {
    fn default() -> Self {
        Self {
            tier_order: TierKind::DEFAULT_ORDER.to_vec(),
            tier_params: TierParams::default(),
            cleanup: CleanupParams::default(),
            oracle: OracleConfig::default(),
            debug: false,
        }
    }
}

impl CutoutConfig {
    /// Create a new configuration builder for fluent API construction
    ///
    /// # Examples
    ///
    /// ```rust
    /// use imgly_cutout::{CutoutConfig, TierKind};
    ///
    /// let config = CutoutConfig::builder()
    ///     .tier_order(vec![TierKind::Threshold, TierKind::Edge])
    ///     .use_oracle(false)
    ///     .build()
    ///     .unwrap();
    /// assert_eq!(config.tier_order.len(), 2);
    /// ```
    #[must_use]
    pub fn builder() -> CutoutConfigBuilder {
        CutoutConfigBuilder::default()
    }

    /// Validate all configuration parameters
    ///
    /// # Validation Rules
    ///
    /// - Tier order: non-empty, no duplicates, ends with `edge`
    /// - Tier parameters: see [`TierParams::validate`]
    /// - Oracle input size: 32-2048
    ///
    /// # Errors
    /// - Any rule above is violated
    pub fn validate(&self) -> Result<()> {
        let Some(last) = self.tier_order.last() else {
            return Err(CutoutError::invalid_config("Tier order cannot be empty"));
        };
        if !last.is_terminal() {
            return Err(CutoutError::invalid_config(format!(
                "Tier order must end with the edge tier, found '{}'",
                last
            )));
        }
        for (index, tier) in self.tier_order.iter().enumerate() {
            if self.tier_order.iter().skip(index + 1).any(|other| other == tier) {
                return Err(CutoutError::invalid_config(format!(
                    "Tier '{}' listed more than once",
                    tier
                )));
            }
        }

        self.tier_params.validate()?;

        if !(32..=2048).contains(&self.oracle.input_size) {
            return Err(CutoutError::config_value_error(
                "oracle input size",
                self.oracle.input_size,
                "32-2048",
                Some(320),
            ));
        }

        Ok(())
    }
}

/// Builder for `CutoutConfig`
#[derive(Debug, Default)]
pub struct CutoutConfigBuilder {
    config: CutoutConfig,
}

impl CutoutConfigBuilder {
    /// Set the tier walk order
    #[must_use]
    pub fn tier_order(mut self, order: Vec<TierKind>) -> Self {
        self.config.tier_order = order;
        self
    }

    /// Replace all tier parameters
    #[must_use]
    pub fn tier_params(mut self, params: TierParams) -> Self {
        self.config.tier_params = params;
        self
    }

    /// Set grabcut refinement rounds
    #[must_use]
    pub fn grabcut_iterations(mut self, iterations: u32) -> Self {
        self.config.tier_params.grabcut_iterations = iterations.clamp(1, 20);
        self
    }

    /// Set the edge threshold
    #[must_use]
    pub fn edge_threshold(mut self, threshold: u8) -> Self {
        self.config.tier_params.edge_threshold = threshold;
        self
    }

    /// Set cleanup opening and closing radii
    #[must_use]
    pub fn cleanup(mut self, open_iterations: u8, close_iterations: u8) -> Self {
        self.config.cleanup.open_iterations = open_iterations;
        self.config.cleanup.close_iterations = close_iterations;
        self
    }

    /// Keep only the largest foreground region after cleanup
    #[must_use]
    pub fn keep_largest_component(mut self, enabled: bool) -> Self {
        self.config.cleanup.keep_largest_component = enabled;
        self
    }

    /// Enable or disable the primary oracle
    #[must_use]
    pub fn use_oracle(mut self, enabled: bool) -> Self {
        self.config.oracle.enabled = enabled;
        self
    }

    /// Set the oracle model file
    #[must_use]
    pub fn oracle_model<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.config.oracle.model = Some(path.into());
        self
    }

    /// Set the oracle input resolution
    #[must_use]
    pub fn oracle_input_size(mut self, size: u32) -> Self {
        self.config.oracle.input_size = size;
        self
    }

    /// Set the oracle time budget
    #[must_use]
    pub fn oracle_timeout(mut self, timeout: Duration) -> Self {
        self.config.oracle.timeout = Some(timeout);
        self
    }

    /// Enable debug mode
    #[must_use]
    pub fn debug(mut self, debug: bool) -> Self {
        self.config.debug = debug;
        self
    }

    /// Build the configuration
    ///
    /// # Errors
    /// - Configuration validation failures, see [`CutoutConfig::validate`]
    pub fn build(self) -> Result<CutoutConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
