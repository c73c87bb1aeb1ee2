//! Classical segmentation tiers used when the primary oracle cannot run
//!
//! Every tier maps a [`PixelBuffer`] to a raw foreground [`Mask`] of the same
//! dimensions. Masks are cleaned up by the post-processor afterwards, so tiers
//! only apply the morphology that is part of their own algorithm.
//!
//! Available tiers:
//! - `grabcut`: iterative color-model region refinement (feature `tier-grabcut`)
//! - `watershed`: seeded flooding from intensity maxima (feature `tier-watershed`)
//! - `threshold`: global statistical threshold (feature `tier-threshold`)
//! - `edge`: gradient edges, always compiled in and terminal
//! - `border`: distance from the mean border color, opt-in only

use crate::{
    config::TierParams,
    error::{CutoutError, Result},
    types::{Mask, PixelBuffer},
};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

pub mod border;
pub mod edge;
#[cfg(feature = "tier-grabcut")]
pub mod grabcut;
#[cfg(feature = "tier-threshold")]
pub mod threshold;
#[cfg(feature = "tier-watershed")]
pub mod watershed;

pub use border::BorderColorTier;
pub use edge::EdgeTier;
#[cfg(feature = "tier-grabcut")]
pub use grabcut::GrabCutTier;
#[cfg(feature = "tier-threshold")]
pub use threshold::ThresholdTier;
#[cfg(feature = "tier-watershed")]
pub use watershed::WatershedTier;

/// Identifier of a fallback tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TierKind {
    /// Iterative foreground/background color model refinement
    GrabCut,
    /// Seeded watershed flooding
    Watershed,
    /// Gaussian smoothing and a mean/stddev threshold
    Threshold,
    /// Sobel edges with contrast boost
    Edge,
    /// Distance from the mean border color
    Border,
}

impl TierKind {
    /// Default walk order; the edge tier is always last
    pub const DEFAULT_ORDER: [Self; 4] = [Self::GrabCut, Self::Watershed, Self::Threshold, Self::Edge];

    /// Every tier known to this build
    pub const ALL: [Self; 5] = [
        Self::GrabCut,
        Self::Watershed,
        Self::Threshold,
        Self::Edge,
        Self::Border,
    ];

    /// Lowercase identifier used in configuration and logs
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::GrabCut => "grabcut",
            Self::Watershed => "watershed",
            Self::Threshold => "threshold",
            Self::Edge => "edge",
            Self::Border => "border",
        }
    }

    /// Whether the tier's implementation was compiled into this build
    #[must_use]
    pub fn is_compiled(self) -> bool {
        match self {
            Self::GrabCut => cfg!(feature = "tier-grabcut"),
            Self::Watershed => cfg!(feature = "tier-watershed"),
            Self::Threshold => cfg!(feature = "tier-threshold"),
            Self::Edge | Self::Border => true,
        }
    }

    /// Whether the walk ends at this tier
    #[must_use]
    pub fn is_terminal(self) -> bool {
        self == Self::Edge
    }
}

impl fmt::Display for TierKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TierKind {
    type Err = CutoutError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "grabcut" | "iterative-region" => Ok(Self::GrabCut),
            "watershed" => Ok(Self::Watershed),
            "threshold" | "statistical-threshold" => Ok(Self::Threshold),
            "edge" | "edge-detection" => Ok(Self::Edge),
            "border" | "border-color" => Ok(Self::Border),
            other => Err(CutoutError::invalid_config(format!(
                "Unknown tier '{}'. Valid tiers: grabcut, watershed, threshold, edge, border",
                other
            ))),
        }
    }
}

/// Parse a comma-separated tier list such as `"watershed,threshold,edge"`
///
/// # Errors
/// - Unknown tier names
/// - Empty list
pub fn parse_tier_list(list: &str) -> Result<Vec<TierKind>> {
    let tiers = list
        .split(',')
        .filter(|part| !part.trim().is_empty())
        .map(TierKind::from_str)
        .collect::<Result<Vec<_>>>()?;

    if tiers.is_empty() {
        return Err(CutoutError::invalid_config("Tier list cannot be empty"));
    }
    Ok(tiers)
}

/// A classical segmentation algorithm
pub trait SegmentationTier {
    /// Which tier this is
    fn kind(&self) -> TierKind;

    /// Produce a raw foreground mask with the image's dimensions
    ///
    /// # Errors
    /// - `TierFailed` when the algorithm cannot produce a mask for this input
    fn segment(&self, image: &PixelBuffer) -> Result<Mask>;
}

/// Instantiate a tier with the given parameters
///
/// Returns `None` when the tier was not compiled into this build.
#[must_use]
pub fn create_tier(kind: TierKind, params: &TierParams) -> Option<Box<dyn SegmentationTier>> {
    match kind {
        #[cfg(feature = "tier-grabcut")]
        TierKind::GrabCut => Some(Box::new(GrabCutTier::from_params(params))),
        #[cfg(feature = "tier-watershed")]
        TierKind::Watershed => Some(Box::new(WatershedTier::from_params(params))),
        #[cfg(feature = "tier-threshold")]
        TierKind::Threshold => Some(Box::new(ThresholdTier::from_params(params))),
        TierKind::Edge => Some(Box::new(EdgeTier::from_params(params))),
        TierKind::Border => Some(Box::new(BorderColorTier::from_params(params))),
        #[allow(unreachable_patterns)]
        _ => None,
    }
}
