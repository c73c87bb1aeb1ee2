//! Image utilities shared by the tiers, the post-processor and the oracle

pub mod filters;
pub mod morphology;
#[cfg(feature = "tract")]
pub mod preprocessing;

#[cfg(feature = "tract")]
pub use preprocessing::{ImagePreprocessor, Letterbox, PreprocessingConfig};
