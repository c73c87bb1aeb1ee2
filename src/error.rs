//! Error types for cutout and compositing operations

use crate::tiers::TierKind;
use thiserror::Error;

/// Result type alias for cutout operations
pub type Result<T> = std::result::Result<T, CutoutError>;

/// Error types for the cutout pipeline
///
/// Only [`CutoutError::DecodeFailed`] and configuration errors ever reach the
/// caller of the pipeline. Oracle and tier failures are recovered by the
/// fallback orchestrator and surface as annotations on the outcome.
#[derive(Error, Debug)]
pub enum CutoutError {
    /// The primary subject oracle is not available in this environment
    #[error("Primary oracle unavailable")]
    OracleUnavailable,

    /// The primary subject oracle was invoked and failed
    #[error("Primary oracle failed: {0}")]
    OracleFailed(String),

    /// A fallback tier is not available in this environment
    #[error("Tier '{0}' unavailable")]
    TierUnavailable(TierKind),

    /// A fallback tier ran but did not produce a usable mask
    #[error("Tier '{tier}' failed: {cause}")]
    TierFailed { tier: TierKind, cause: String },

    /// Input image could not be decoded
    #[error("Failed to decode image: {0}")]
    DecodeFailed(String),

    /// Background could not be used; the subject was flattened onto black
    #[error("Compositing degraded: {0}")]
    CompositeDegraded(String),

    /// Invalid configuration or request parameters
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Pixel data does not match the declared dimensions
    #[error("Invalid pixel buffer: {0}")]
    InvalidBuffer(String),

    /// Output encoding errors
    #[error("Encoding error: {0}")]
    Encode(String),

    /// Input/output errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Errors bubbled up from the image crate
    #[error("Image processing error: {0}")]
    Image(#[from] image::ImageError),
}

impl CutoutError {
    /// Create a new invalid configuration error
    pub fn invalid_config<S: Into<String>>(msg: S) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Create a new invalid buffer error
    pub fn invalid_buffer<S: Into<String>>(msg: S) -> Self {
        Self::InvalidBuffer(msg.into())
    }

    /// Create a new decode error
    pub fn decode_failed<S: Into<String>>(msg: S) -> Self {
        Self::DecodeFailed(msg.into())
    }

    /// Create a new oracle failure
    pub fn oracle_failed<S: Into<String>>(msg: S) -> Self {
        Self::OracleFailed(msg.into())
    }

    /// Create a new tier failure
    pub fn tier_failed<S: Into<String>>(tier: TierKind, cause: S) -> Self {
        Self::TierFailed {
            tier,
            cause: cause.into(),
        }
    }

    /// Create a new encoding error
    pub fn encode<S: Into<String>>(msg: S) -> Self {
        Self::Encode(msg.into())
    }

    /// Create configuration error with valid ranges
    pub fn config_value_error<T: std::fmt::Display>(
        parameter: &str,
        value: T,
        valid_range: &str,
        recommended: Option<T>,
    ) -> Self {
        let recommendation = match recommended {
            Some(rec) => format!(" Recommended: {}", rec),
            None => String::new(),
        };

        Self::InvalidConfig(format!(
            "Invalid {}: {} (valid range: {}).{}",
            parameter, value, valid_range, recommendation
        ))
    }

    /// Whether this error is recoverable by moving on to the next fallback
    #[must_use]
    pub fn is_fallback_failure(&self) -> bool {
        matches!(
            self,
            Self::OracleUnavailable
                | Self::OracleFailed(_)
                | Self::TierUnavailable(_)
                | Self::TierFailed { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = CutoutError::invalid_config("test config error");
        assert!(matches!(err, CutoutError::InvalidConfig(_)));

        let err = CutoutError::tier_failed(TierKind::Watershed, "no seeds");
        assert!(matches!(
            err,
            CutoutError::TierFailed {
                tier: TierKind::Watershed,
                ..
            }
        ));
    }

    #[test]
    fn test_error_display() {
        let err = CutoutError::tier_failed(TierKind::Threshold, "empty mask");
        assert_eq!(err.to_string(), "Tier 'threshold' failed: empty mask");

        let err = CutoutError::TierUnavailable(TierKind::GrabCut);
        assert_eq!(err.to_string(), "Tier 'grabcut' unavailable");

        let err = CutoutError::decode_failed("truncated PNG");
        assert_eq!(err.to_string(), "Failed to decode image: truncated PNG");
    }

    #[test]
    fn test_config_value_error() {
        let err = CutoutError::config_value_error("edge threshold", 300, "0-255", Some(30));
        let error_string = err.to_string();
        assert!(error_string.contains("edge threshold"));
        assert!(error_string.contains("300"));
        assert!(error_string.contains("0-255"));
        assert!(error_string.contains("Recommended: 30"));
    }

    #[test]
    fn test_fallback_classification() {
        assert!(CutoutError::OracleUnavailable.is_fallback_failure());
        assert!(CutoutError::oracle_failed("timeout").is_fallback_failure());
        assert!(CutoutError::TierUnavailable(TierKind::Edge).is_fallback_failure());
        assert!(!CutoutError::decode_failed("bad").is_fallback_failure());
        assert!(!CutoutError::CompositeDegraded("bg".into()).is_fallback_failure());
    }
}
