//! Morphological cleanup of raw tier masks

use crate::{
    config::CleanupParams,
    types::Mask,
    utils::morphology,
};
use imageproc::region_labelling::Connectivity;
use tracing::trace;

/// Values above this are treated as foreground before cleanup
const BINARIZE_LEVEL: u8 = 127;

/// Hole filling, speckle removal and gap closing
///
/// Steps, in order: binarize, fill enclosed holes, optionally keep only the
/// largest 8-connected component, open, close. The output always has the
/// input's dimensions and only contains 0 and 255.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MaskPostProcessor {
    open_iterations: u8,
    close_iterations: u8,
    keep_largest_component: bool,
}

impl Default for MaskPostProcessor {
    fn default() -> Self {
        Self::from_params(&CleanupParams::default())
    }
}

impl MaskPostProcessor {
    #[must_use]
    pub fn new(open_iterations: u8, close_iterations: u8) -> Self {
        Self {
            open_iterations,
            close_iterations,
            keep_largest_component: false,
        }
    }

    #[must_use]
    pub fn from_params(params: &CleanupParams) -> Self {
        Self {
            open_iterations: params.open_iterations,
            close_iterations: params.close_iterations,
            keep_largest_component: params.keep_largest_component,
        }
    }

    /// Keep only the largest connected foreground region
    #[must_use]
    pub fn with_largest_component(mut self, enabled: bool) -> Self {
        self.keep_largest_component = enabled;
        self
    }

    /// Clean up a raw mask
    #[must_use]
    pub fn cleanup(&self, mask: Mask) -> Mask {
        let binary = mask.binarize(BINARIZE_LEVEL).to_image();
        let mut cleaned = morphology::fill_holes(&binary);
        if self.keep_largest_component {
            cleaned = morphology::largest_component(&cleaned, Connectivity::Eight);
        }
        cleaned = morphology::open(&cleaned, self.open_iterations);
        cleaned = morphology::close(&cleaned, self.close_iterations);

        let result = Mask::from_image(cleaned);
        trace!(
            before = mask.foreground_count(),
            after = result.foreground_count(),
            "mask cleanup"
        );
        result
    }
}
