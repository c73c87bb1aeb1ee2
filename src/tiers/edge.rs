//! Edge-detection tier
//!
//! The last tier in every walk. It never fails: a uniform image simply yields
//! an all-zero mask, which the orchestrator then treats as "nothing usable".

use super::{SegmentationTier, TierKind};
use crate::{
    config::TierParams,
    error::Result,
    types::{Mask, PixelBuffer},
    utils::{filters, morphology},
};
use tracing::trace;

/// Sobel edges, contrast boost, threshold, then a 3×3 dilate/erode pass
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EdgeTier {
    contrast: f32,
    threshold: u8,
}

impl EdgeTier {
    #[must_use]
    pub fn new(contrast: f32, threshold: u8) -> Self {
        Self {
            contrast,
            threshold,
        }
    }

    #[must_use]
    pub fn from_params(params: &TierParams) -> Self {
        Self::new(params.edge_contrast, params.edge_threshold)
    }
}

impl Default for EdgeTier {
    fn default() -> Self {
        Self::from_params(&TierParams::default())
    }
}

impl SegmentationTier for EdgeTier {
    fn kind(&self) -> TierKind {
        TierKind::Edge
    }

    fn segment(&self, image: &PixelBuffer) -> Result<Mask> {
        let gray = image.to_luma();
        let edges = filters::sobel_magnitude(&gray);
        let boosted = filters::enhance_contrast(&edges, self.contrast);
        let binary = filters::binarize(&boosted, self.threshold);
        let joined = morphology::erode(&morphology::dilate(&binary, 1), 1);

        let mask = Mask::from_image(joined);
        trace!(
            foreground = mask.foreground_count(),
            "edge tier produced mask"
        );
        Ok(mask)
    }
}
