//! Cutout pipeline: fallback extraction followed by compositing
//!
//! [`FallbackOrchestrator`] turns an image into a foreground mask, trying the
//! primary oracle first and then each classical tier in order. It never fails;
//! every skipped step is recorded instead. [`CutoutProcessor`] wraps it with
//! decoding, compositing and timing, and is what the CLI and the free functions
//! in the crate root use.

use crate::{
    capability::{self, CapabilitySet},
    compositor::{CompositeOutput, Compositor},
    config::{BackgroundInput, CutoutConfig, TierParams},
    error::{CutoutError, Result},
    oracle::{self, SharedOracle},
    postprocess::MaskPostProcessor,
    services::ImageIOService,
    tiers::{create_tier, TierKind},
    types::{
        BackgroundSpec, FallbackEvent, Mask, MaskSource, PixelBuffer, ProcessingOutcome,
        ProcessingTimings,
    },
};
use instant::Instant;
use std::{
    panic::{catch_unwind, AssertUnwindSafe},
    path::Path,
    time::Duration,
};
use tracing::{debug, info, instrument, span, warn, Level};

/// Mask chosen by the fallback walk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionReport {
    pub mask: Mask,
    pub source: MaskSource,
    /// Skipped steps in walk order
    pub fallbacks: Vec<FallbackEvent>,
}

/// Walks the oracle and the tier chain until one produces a usable mask
pub struct FallbackOrchestrator {
    capabilities: CapabilitySet,
    tier_order: Vec<TierKind>,
    tier_params: TierParams,
    post_processor: MaskPostProcessor,
    oracle: Option<SharedOracle>,
    oracle_timeout: Option<Duration>,
}

impl FallbackOrchestrator {
    #[must_use]
    pub fn new(capabilities: CapabilitySet, config: &CutoutConfig) -> Self {
        Self {
            capabilities,
            tier_order: config.tier_order.clone(),
            tier_params: config.tier_params.clone(),
            post_processor: MaskPostProcessor::from_params(&config.cleanup),
            oracle: None,
            oracle_timeout: config.oracle.timeout,
        }
    }

    /// Use `oracle` when the capability set marks the oracle available
    #[must_use]
    pub fn with_oracle(mut self, oracle: SharedOracle) -> Self {
        self.oracle = Some(oracle);
        self
    }

    #[must_use]
    pub fn capabilities(&self) -> &CapabilitySet {
        &self.capabilities
    }

    /// Produce a foreground mask for `image`
    ///
    /// The oracle's alpha is used as is; tier masks are cleaned up and must
    /// keep at least one foreground pixel. When nothing succeeds the whole
    /// image is kept with source [`MaskSource::Passthrough`].
    #[instrument(skip(self, image), fields(width = image.width(), height = image.height()))]
    pub fn extract_subject(&self, image: &PixelBuffer) -> ExtractionReport {
        let mut fallbacks = Vec::new();

        match self.run_oracle(image) {
            Ok(mask) => {
                return ExtractionReport {
                    mask,
                    source: MaskSource::Oracle,
                    fallbacks,
                }
            },
            Err(err) => {
                debug!("Oracle skipped: {err}");
                fallbacks.push(FallbackEvent::from_error(MaskSource::Oracle, &err));
            },
        }

        for &kind in &self.tier_order {
            let _span = span!(Level::DEBUG, "tier", tier = %kind).entered();
            match self.run_tier(kind, image) {
                Ok(mask) => {
                    info!(
                        tier = %kind,
                        foreground = mask.foreground_count(),
                        skipped = fallbacks.len(),
                        "mask produced by fallback tier"
                    );
                    return ExtractionReport {
                        mask,
                        source: MaskSource::Tier(kind),
                        fallbacks,
                    };
                },
                Err(err) => {
                    debug!("Tier {kind} skipped: {err}");
                    fallbacks.push(FallbackEvent::from_error(MaskSource::Tier(kind), &err));
                },
            }
        }

        warn!(
            skipped = fallbacks.len(),
            "no usable mask, keeping the whole image"
        );
        ExtractionReport {
            mask: Mask::full_foreground(image.width(), image.height()),
            source: MaskSource::Passthrough,
            fallbacks,
        }
    }

    fn run_oracle(&self, image: &PixelBuffer) -> Result<Mask> {
        if !self.capabilities.oracle_available() {
            return Err(CutoutError::OracleUnavailable);
        }
        let Some(oracle) = self.oracle.as_ref() else {
            return Err(CutoutError::OracleUnavailable);
        };

        let _span = span!(Level::INFO, "oracle").entered();
        let start = Instant::now();
        let outcome = catch_unwind(AssertUnwindSafe(|| {
            let mut guard = oracle
                .lock()
                .map_err(|_| CutoutError::oracle_failed("oracle unusable after an earlier panic"))?;
            guard.extract(image)
        }));
        let elapsed = start.elapsed();

        let output = match outcome {
            Ok(result) => result.map_err(|err| match err {
                CutoutError::OracleFailed(_) => err,
                other => CutoutError::oracle_failed(other.to_string()),
            })?,
            Err(_) => return Err(CutoutError::oracle_failed("oracle panicked")),
        };

        if let Some(limit) = self.oracle_timeout {
            if elapsed > limit {
                return Err(CutoutError::oracle_failed(format!(
                    "took {}ms, budget {}ms",
                    elapsed.as_millis(),
                    limit.as_millis()
                )));
            }
        }
        if output.dimensions() != image.dimensions() {
            return Err(CutoutError::oracle_failed(format!(
                "returned {}x{} for a {}x{} input",
                output.width(),
                output.height(),
                image.width(),
                image.height()
            )));
        }
        if !output.has_alpha() {
            return Err(CutoutError::oracle_failed("output has no alpha channel"));
        }

        Mask::from_alpha(&output)
    }

    fn run_tier(&self, kind: TierKind, image: &PixelBuffer) -> Result<Mask> {
        if !self.capabilities.is_tier_available(kind) {
            return Err(CutoutError::TierUnavailable(kind));
        }
        let tier = create_tier(kind, &self.tier_params).ok_or(CutoutError::TierUnavailable(kind))?;

        let mask = catch_unwind(AssertUnwindSafe(|| {
            let raw = tier.segment(image)?;
            if !raw.matches(image) {
                return Err(CutoutError::tier_failed(
                    kind,
                    format!(
                        "mask {}x{} does not match image {}x{}",
                        raw.width(),
                        raw.height(),
                        image.width(),
                        image.height()
                    ),
                ));
            }
            Ok(self.post_processor.cleanup(raw))
        }))
        .unwrap_or_else(|_| Err(CutoutError::tier_failed(kind, "tier panicked")))
        .map_err(|err| match err {
            CutoutError::TierFailed { .. } | CutoutError::TierUnavailable(_) => err,
            other => CutoutError::tier_failed(kind, other.to_string()),
        })?;

        if mask.foreground_count() == 0 {
            return Err(CutoutError::tier_failed(kind, "empty mask"));
        }
        Ok(mask)
    }
}

/// Reusable cutout pipeline
pub struct CutoutProcessor {
    config: CutoutConfig,
    orchestrator: FallbackOrchestrator,
}

impl CutoutProcessor {
    /// Create a processor using the process-wide tier probe
    ///
    /// The oracle comes from the process-wide handle for `config.oracle`, so
    /// processors sharing a model share one initialized instance. A disabled
    /// oracle is never initialized.
    ///
    /// # Errors
    /// - Invalid configuration
    pub fn new(config: CutoutConfig) -> Result<Self> {
        config.validate()?;

        let oracle = if config.oracle.enabled {
            oracle::handle_for(&config.oracle).get()
        } else {
            None
        };
        let capabilities = capability::probe_tiers().with_oracle(oracle.is_some());

        Self::with_capabilities(config, capabilities, oracle)
    }

    /// Create a processor with an explicit capability set and oracle
    ///
    /// # Errors
    /// - Invalid configuration
    pub fn with_capabilities(
        config: CutoutConfig,
        capabilities: CapabilitySet,
        oracle: Option<SharedOracle>,
    ) -> Result<Self> {
        config.validate()?;

        let mut orchestrator = FallbackOrchestrator::new(capabilities, &config);
        if let Some(oracle) = oracle {
            orchestrator = orchestrator.with_oracle(oracle);
        }
        info!(
            "Cutout processor ready (oracle: {}, tiers: {:?})",
            orchestrator.capabilities().oracle_available(),
            config.tier_order
        );
        Ok(Self {
            config,
            orchestrator,
        })
    }

    #[must_use]
    pub fn config(&self) -> &CutoutConfig {
        &self.config
    }

    #[must_use]
    pub fn capabilities(&self) -> &CapabilitySet {
        self.orchestrator.capabilities()
    }

    /// Cut out the subject of a decoded image and composite it
    ///
    /// # Errors
    /// - `InvalidBuffer` for a subject without pixels
    /// - Internal buffer inconsistencies; extraction and background
    ///   problems are reported on the outcome
    #[instrument(
        skip(self, subject, background),
        fields(width = subject.width(), height = subject.height())
    )]
    pub fn process_image(
        &self,
        subject: &PixelBuffer,
        background: &BackgroundSpec,
    ) -> Result<ProcessingOutcome> {
        if subject.is_empty() {
            return Err(CutoutError::invalid_buffer(format!(
                "subject has no pixels ({}x{})",
                subject.width(),
                subject.height()
            )));
        }
        let total_start = Instant::now();
        self.finish(
            subject,
            Ok(background),
            ProcessingTimings::default(),
            total_start,
        )
    }

    /// Decode the subject (and background image, if any) and process them
    ///
    /// A background image that cannot be decoded degrades the output to an
    /// opaque black background instead of failing.
    ///
    /// # Errors
    /// - `DecodeFailed` when the subject cannot be decoded
    #[instrument(skip(self, subject, background), fields(bytes = subject.len(), mode = %background.mode()))]
    pub fn process_bytes(
        &self,
        subject: &[u8],
        background: BackgroundInput<'_>,
    ) -> Result<ProcessingOutcome> {
        let total_start = Instant::now();
        let mut timings = ProcessingTimings::default();

        let decode_start = Instant::now();
        let subject = {
            let _span = span!(Level::DEBUG, "decode").entered();
            ImageIOService::decode(subject)?
        };
        let background = match background {
            BackgroundInput::Transparent => Ok(BackgroundSpec::Transparent),
            BackgroundInput::Solid(color) => Ok(BackgroundSpec::Solid(color)),
            BackgroundInput::Image(bytes) => ImageIOService::decode(bytes)
                .map(BackgroundSpec::Image)
                .map_err(|err| format!("background image unusable: {err}")),
        };
        timings.decode_ms = elapsed_ms(decode_start);

        self.finish(&subject, background.as_ref(), timings, total_start)
    }

    /// Read a subject from an async stream and process it
    ///
    /// # Errors
    /// - Stream failures
    /// - `DecodeFailed` when the subject cannot be decoded
    pub async fn process_reader<R: tokio::io::AsyncRead + Unpin>(
        &self,
        reader: R,
        background: BackgroundInput<'_>,
    ) -> Result<ProcessingOutcome> {
        let bytes = ImageIOService::read_all(reader).await?;
        self.process_bytes(&bytes, background)
    }

    /// Read a subject file and process it
    ///
    /// # Errors
    /// - File system failures
    /// - `DecodeFailed` when the subject cannot be decoded
    pub async fn process_file<P: AsRef<Path>>(
        &self,
        path: P,
        background: BackgroundInput<'_>,
    ) -> Result<ProcessingOutcome> {
        let bytes = tokio::fs::read(path.as_ref()).await?;
        self.process_bytes(&bytes, background)
    }

    fn finish(
        &self,
        subject: &PixelBuffer,
        background: std::result::Result<&BackgroundSpec, &String>,
        mut timings: ProcessingTimings,
        total_start: Instant,
    ) -> Result<ProcessingOutcome> {
        let extraction_start = Instant::now();
        let report = {
            let _span = span!(Level::INFO, "extraction").entered();
            self.orchestrator.extract_subject(subject)
        };
        timings.extraction_ms = elapsed_ms(extraction_start);

        let compositing_start = Instant::now();
        let CompositeOutput { image, degraded } = {
            let _span = span!(Level::DEBUG, "compositing").entered();
            match background {
                Ok(spec) => Compositor::composite(subject, &report.mask, spec)?,
                Err(reason) => Compositor::degraded(subject, &report.mask, reason)?,
            }
        };
        timings.compositing_ms = elapsed_ms(compositing_start);
        timings.total_ms = elapsed_ms(total_start);

        let outcome = ProcessingOutcome {
            image,
            mask: report.mask,
            source: report.source,
            fallbacks: report.fallbacks,
            degraded,
            timings,
        };

        info!(
            source = %outcome.source,
            fallbacks = outcome.fallbacks.len(),
            degraded = outcome.is_degraded(),
            total_ms = outcome.timings.total_ms,
            "cutout complete"
        );
        if self.config.debug {
            if let Ok(summary) = serde_json::to_string(&outcome.summary()) {
                debug!("Outcome summary: {summary}");
            }
        }
        Ok(outcome)
    }
}

fn elapsed_ms(start: Instant) -> u64 {
    u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        oracle::{shared, MockBehavior, MockOracle, SubjectOracle},
        types::FallbackReason,
    };
    use image::{Rgb, RgbImage};
    use std::sync::atomic::Ordering;

    /// Green disk of radius 15 centered in a 60×60 light gray image
    fn disk_image() -> PixelBuffer {
        PixelBuffer::from_rgb_image(RgbImage::from_fn(60, 60, |x, y| {
            let dx = x as i32 - 30;
            let dy = y as i32 - 30;
            if dx * dx + dy * dy <= 225 {
                Rgb([20, 180, 40])
            } else {
                Rgb([210, 210, 210])
            }
        }))
    }

    fn border_config() -> CutoutConfig {
        CutoutConfig::builder()
            .tier_order(vec![TierKind::Border, TierKind::Edge])
            .build()
            .unwrap()
    }

    fn orchestrator_with(behavior: MockBehavior, config: &CutoutConfig) -> FallbackOrchestrator {
        let mut oracle = MockOracle::new(behavior);
        oracle.initialize().unwrap();
        FallbackOrchestrator::new(CapabilitySet::all(), config).with_oracle(shared(Box::new(oracle)))
    }

    #[test]
    fn test_oracle_success_is_used() {
        let orchestrator = orchestrator_with(MockBehavior::CenteredEllipse, &border_config());
        let report = orchestrator.extract_subject(&disk_image());
        assert_eq!(report.source, MaskSource::Oracle);
        assert!(report.fallbacks.is_empty());
        assert_eq!(report.mask.get(30, 30), Some(255));
    }

    #[test]
    fn test_oracle_failures_fall_back_to_first_tier() {
        for behavior in [
            MockBehavior::Fail,
            MockBehavior::Panic,
            MockBehavior::WrongDimensions,
            MockBehavior::MissingAlpha,
        ] {
            let orchestrator = orchestrator_with(behavior, &border_config());
            let report = orchestrator.extract_subject(&disk_image());
            assert_eq!(report.source, MaskSource::Tier(TierKind::Border), "{behavior:?}");
            assert_eq!(report.fallbacks.len(), 1);
            assert_eq!(report.fallbacks[0].source, MaskSource::Oracle);
            assert!(matches!(
                report.fallbacks[0].reason,
                FallbackReason::Failed(_)
            ));
            assert_eq!(report.mask.get(30, 30), Some(255));
            assert_eq!(report.mask.get(2, 2), Some(0));
        }
    }

    #[test]
    fn test_oracle_timeout_is_a_failure() {
        let config = CutoutConfig::builder()
            .tier_order(vec![TierKind::Border, TierKind::Edge])
            .oracle_timeout(Duration::from_millis(1))
            .build()
            .unwrap();
        let orchestrator = orchestrator_with(MockBehavior::Slow(Duration::from_millis(30)), &config);
        let report = orchestrator.extract_subject(&disk_image());
        assert_eq!(report.source, MaskSource::Tier(TierKind::Border));
        assert!(matches!(&report.fallbacks[0].reason, FallbackReason::Failed(cause) if cause.contains("budget")));
    }

    #[test]
    fn test_unavailable_oracle_is_never_invoked() {
        let oracle = MockOracle::new(MockBehavior::CenteredEllipse);
        let calls = oracle.call_counter();
        let orchestrator = FallbackOrchestrator::new(CapabilitySet::tiers_only(), &border_config())
            .with_oracle(shared(Box::new(oracle)));

        let report = orchestrator.extract_subject(&disk_image());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(report.source, MaskSource::Tier(TierKind::Border));
        assert_eq!(
            report.fallbacks,
            vec![FallbackEvent {
                source: MaskSource::Oracle,
                reason: FallbackReason::Unavailable,
            }]
        );
    }

    #[test]
    fn test_unavailable_tiers_are_skipped_in_order() {
        let config = CutoutConfig::default();
        let orchestrator = FallbackOrchestrator::new(CapabilitySet::none(), &config);
        let report = orchestrator.extract_subject(&disk_image());

        assert_eq!(report.source, MaskSource::Tier(TierKind::Edge));
        let skipped: Vec<MaskSource> = report.fallbacks.iter().map(|e| e.source).collect();
        assert_eq!(
            skipped,
            vec![
                MaskSource::Oracle,
                MaskSource::Tier(TierKind::GrabCut),
                MaskSource::Tier(TierKind::Watershed),
                MaskSource::Tier(TierKind::Threshold),
            ]
        );
        assert!(report
            .fallbacks
            .iter()
            .all(|event| event.reason == FallbackReason::Unavailable));
    }

    #[test]
    fn test_uniform_image_passes_through() {
        let orchestrator = FallbackOrchestrator::new(CapabilitySet::none(), &CutoutConfig::default());
        let image = PixelBuffer::filled_rgb(40, 30, [90, 90, 90]);
        let report = orchestrator.extract_subject(&image);

        assert_eq!(report.source, MaskSource::Passthrough);
        assert_eq!(report.mask, Mask::full_foreground(40, 30));
        assert_eq!(
            report.fallbacks.last(),
            Some(&FallbackEvent {
                source: MaskSource::Tier(TierKind::Edge),
                reason: FallbackReason::Failed("empty mask".to_string()),
            })
        );
    }

    #[test]
    fn test_single_pixel_subject_completes() {
        let processor = CutoutProcessor::with_capabilities(
            CutoutConfig::default(),
            CapabilitySet::tiers_only(),
            None,
        )
        .unwrap();
        for color in [[0, 0, 0], [40, 200, 90], [255, 255, 255]] {
            let outcome = processor
                .process_image(&PixelBuffer::filled_rgb(1, 1, color), &BackgroundSpec::Solid([9, 9, 9]))
                .unwrap();
            assert_eq!(outcome.mask.dimensions(), (1, 1));
            assert_eq!(outcome.image.dimensions(), (1, 1));
        }
    }

    #[test]
    fn test_empty_subject_is_rejected() {
        let processor =
            CutoutProcessor::with_capabilities(border_config(), CapabilitySet::none(), None).unwrap();
        let result =
            processor.process_image(&PixelBuffer::filled_rgb(0, 7, [1, 2, 3]), &BackgroundSpec::Transparent);
        assert!(matches!(result, Err(CutoutError::InvalidBuffer(_))));
    }

    #[test]
    fn test_process_image_transparent() {
        let processor = CutoutProcessor::with_capabilities(
            border_config(),
            CapabilitySet::tiers_only(),
            None,
        )
        .unwrap();
        let outcome = processor
            .process_image(&disk_image(), &BackgroundSpec::Transparent)
            .unwrap();

        assert_eq!(outcome.image.channels(), 4);
        assert_eq!(outcome.image.dimensions(), (60, 60));
        assert!(outcome.fell_back());
        assert!(!outcome.is_degraded());
        assert_eq!(outcome.image.rgba_at(30, 30).map(|p| p[3]), Some(255));
        assert_eq!(outcome.image.rgba_at(1, 1).map(|p| p[3]), Some(0));
    }

    #[test]
    fn test_process_bytes_with_bad_background_degrades() {
        let processor = CutoutProcessor::with_capabilities(
            border_config(),
            CapabilitySet::tiers_only(),
            None,
        )
        .unwrap();
        let subject = ImageIOService::encode_png(&disk_image()).unwrap();

        let outcome = processor
            .process_bytes(&subject, BackgroundInput::Image(b"not an image"))
            .unwrap();
        assert!(outcome.is_degraded());
        assert_eq!(outcome.image.channels(), 3);
        assert_eq!(outcome.image.rgba_at(1, 1), Some([0, 0, 0, 255]));
    }

    #[test]
    fn test_process_bytes_rejects_undecodable_subject() {
        let processor = CutoutProcessor::with_capabilities(
            CutoutConfig::default(),
            CapabilitySet::tiers_only(),
            None,
        )
        .unwrap();
        assert!(matches!(
            processor.process_bytes(b"garbage", BackgroundInput::Transparent),
            Err(CutoutError::DecodeFailed(_))
        ));
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let config = CutoutConfig {
            tier_order: vec![TierKind::Edge, TierKind::Threshold],
            ..CutoutConfig::default()
        };
        assert!(CutoutProcessor::with_capabilities(config, CapabilitySet::none(), None).is_err());
    }

    #[tokio::test]
    async fn test_process_reader() {
        let processor = CutoutProcessor::with_capabilities(
            border_config(),
            CapabilitySet::tiers_only(),
            None,
        )
        .unwrap();
        let subject = ImageIOService::encode_png(&disk_image()).unwrap();

        let outcome = processor
            .process_reader(&subject[..], BackgroundInput::Solid([0, 0, 255]))
            .await
            .unwrap();
        assert_eq!(outcome.image.channels(), 3);
        assert_eq!(outcome.image.rgba_at(1, 1), Some([0, 0, 255, 255]));
        assert_eq!(outcome.image.rgba_at(30, 30), Some([20, 180, 40, 255]));
    }
}
