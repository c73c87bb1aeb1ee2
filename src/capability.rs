//! Detection of which extraction backends can run in this process
//!
//! A tier is available when it was compiled in and survives a smoke
//! segmentation of a tiny synthetic image. The oracle is available when its
//! handle initializes. Tier checks run once per process and are cached; the
//! oracle handle caches its own initialization.

use crate::{
    config::TierParams,
    oracle::{self, OracleHandle},
    tiers::{create_tier, TierKind},
    types::PixelBuffer,
};
use image::{Rgb, RgbImage};
use serde::Serialize;
use std::{
    collections::BTreeMap,
    panic::{catch_unwind, AssertUnwindSafe},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Mutex,
    },
};
use tracing::{debug, info, warn};

/// Availability of the oracle and each tier
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CapabilitySet {
    oracle: bool,
    tiers: BTreeMap<TierKind, bool>,
}

impl CapabilitySet {
    /// Oracle and every tier available
    #[must_use]
    pub fn all() -> Self {
        Self {
            oracle: true,
            tiers: TierKind::ALL.iter().map(|&kind| (kind, true)).collect(),
        }
    }

    /// Every tier available, no oracle
    #[must_use]
    pub fn tiers_only() -> Self {
        Self::all().with_oracle(false)
    }

    /// Nothing available except the terminal edge tier
    #[must_use]
    pub fn none() -> Self {
        Self {
            oracle: false,
            tiers: TierKind::ALL
                .iter()
                .map(|&kind| (kind, kind.is_terminal()))
                .collect(),
        }
    }

    #[must_use]
    pub fn with_oracle(mut self, available: bool) -> Self {
        self.oracle = available;
        self
    }

    /// Set one tier's flag; the terminal tier cannot be disabled
    #[must_use]
    pub fn with_tier(mut self, kind: TierKind, available: bool) -> Self {
        self.tiers.insert(kind, available || kind.is_terminal());
        self
    }

    #[must_use]
    pub fn oracle_available(&self) -> bool {
        self.oracle
    }

    #[must_use]
    pub fn is_tier_available(&self, kind: TierKind) -> bool {
        kind.is_terminal() || self.tiers.get(&kind).copied().unwrap_or(false)
    }

    /// Tiers flagged available, in [`TierKind::ALL`] order
    #[must_use]
    pub fn available_tiers(&self) -> Vec<TierKind> {
        TierKind::ALL
            .into_iter()
            .filter(|&kind| self.is_tier_available(kind))
            .collect()
    }
}

/// Runs availability checks
pub struct CapabilityProbe<'a> {
    params: TierParams,
    oracle: Option<&'a OracleHandle>,
}

impl<'a> CapabilityProbe<'a> {
    #[must_use]
    pub fn new(params: TierParams) -> Self {
        Self {
            params,
            oracle: None,
        }
    }

    /// Include the oracle behind `handle` in the probe
    #[must_use]
    pub fn with_oracle_handle(mut self, handle: &'a OracleHandle) -> Self {
        self.oracle = Some(handle);
        self
    }

    /// Check every backend; failures only clear that backend's flag
    #[must_use]
    pub fn run(&self) -> CapabilitySet {
        let tiers = TierKind::ALL
            .iter()
            .map(|&kind| (kind, self.check_tier(kind)))
            .collect();
        let oracle = self.oracle.is_some_and(|handle| handle.get().is_some());

        let set = CapabilitySet { oracle, tiers };
        info!(
            oracle = set.oracle,
            tiers = ?set.available_tiers(),
            "capability probe complete"
        );
        set
    }

    fn check_tier(&self, kind: TierKind) -> bool {
        if kind.is_terminal() {
            return true;
        }
        if !kind.is_compiled() {
            debug!(tier = %kind, "tier not compiled in");
            return false;
        }

        let image = smoke_image();
        let outcome = catch_unwind(AssertUnwindSafe(|| {
            create_tier(kind, &self.params).map(|tier| tier.segment(&image))
        }));
        match outcome {
            Ok(Some(Ok(mask))) if mask.matches(&image) => true,
            Ok(Some(Ok(_))) => {
                warn!(tier = %kind, "smoke test produced a mask of the wrong size");
                false
            },
            Ok(Some(Err(err))) => {
                warn!(tier = %kind, error = %err, "smoke test failed");
                false
            },
            Ok(None) => false,
            Err(_) => {
                warn!(tier = %kind, "smoke test panicked");
                false
            },
        }
    }
}

/// 24×24 dark image with a bright centered square
fn smoke_image() -> PixelBuffer {
    PixelBuffer::from_rgb_image(RgbImage::from_fn(24, 24, |x, y| {
        if (8..16).contains(&x) && (8..16).contains(&y) {
            Rgb([230, 200, 40])
        } else {
            Rgb([20, 30, 60])
        }
    }))
}

static PROBE: Mutex<Option<CapabilitySet>> = Mutex::new(None);
static PROBE_RUNS: AtomicUsize = AtomicUsize::new(0);

/// Process-wide capabilities including the default oracle
///
/// Resolves the default oracle handle, which may load a model.
pub fn probe() -> CapabilitySet {
    let oracle = oracle::default_handle().get().is_some();
    probe_tiers().with_oracle(oracle)
}

/// Process-wide tier capabilities, computed once; the oracle flag is unset
///
/// Concurrent first callers wait on the same lock, so the checks run once.
pub fn probe_tiers() -> CapabilitySet {
    let mut cached = PROBE.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
    if let Some(set) = cached.as_ref() {
        return set.clone();
    }

    PROBE_RUNS.fetch_add(1, Ordering::SeqCst);
    let set = CapabilityProbe::new(TierParams::default()).run();
    *cached = Some(set.clone());
    set
}

/// Forget the cached tier checks so the next probe runs them again
pub fn reset_probe() {
    let mut cached = PROBE.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
    *cached = None;
}

/// Number of times the global tier checks have actually run
pub fn probe_runs() -> usize {
    PROBE_RUNS.load(Ordering::SeqCst)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::{MockBehavior, MockOracle};

    #[test]
    fn test_constructed_sets() {
        let all = CapabilitySet::all();
        assert!(all.oracle_available());
        assert!(TierKind::ALL.iter().all(|&kind| all.is_tier_available(kind)));

        let none = CapabilitySet::none();
        assert!(!none.oracle_available());
        assert_eq!(none.available_tiers(), vec![TierKind::Edge]);

        let custom = CapabilitySet::tiers_only().with_tier(TierKind::GrabCut, false);
        assert!(!custom.oracle_available());
        assert!(!custom.is_tier_available(TierKind::GrabCut));
        assert!(custom.is_tier_available(TierKind::Watershed));
    }

    #[test]
    fn test_terminal_tier_cannot_be_disabled() {
        let set = CapabilitySet::all().with_tier(TierKind::Edge, false);
        assert!(set.is_tier_available(TierKind::Edge));
    }

    #[test]
    fn test_probe_reports_compiled_tiers() {
        let set = CapabilityProbe::new(TierParams::default()).run();
        assert!(!set.oracle_available());
        for kind in TierKind::ALL {
            assert_eq!(set.is_tier_available(kind), kind.is_compiled(), "{kind}");
        }
    }

    #[test]
    fn test_probe_with_oracle_handle() {
        let working = OracleHandle::from_oracle(Box::new(MockOracle::new(
            MockBehavior::CenteredEllipse,
        )));
        let set = CapabilityProbe::new(TierParams::default())
            .with_oracle_handle(&working)
            .run();
        assert!(set.oracle_available());

        let broken = OracleHandle::from_oracle(Box::new(MockOracle::new(MockBehavior::FailInit)));
        let set = CapabilityProbe::new(TierParams::default())
            .with_oracle_handle(&broken)
            .run();
        assert!(!set.oracle_available());
        assert!(set.is_tier_available(TierKind::Edge));
    }

    #[test]
    fn test_tier_probe_leaves_oracle_unset() {
        let set = probe_tiers();
        assert!(!set.oracle_available());
        assert!(set.is_tier_available(TierKind::Edge));
    }

    #[test]
    fn test_serializes_to_json() {
        let json = serde_json::to_value(CapabilitySet::none()).unwrap();
        assert_eq!(json["oracle"], false);
        assert_eq!(json["tiers"]["edge"], true);
        assert_eq!(json["tiers"]["grabcut"], false);
    }

    #[test]
    fn test_global_probe_runs_once_and_resets() {
        reset_probe();
        let before = probe_runs();

        let threads: Vec<_> = (0..8).map(|_| std::thread::spawn(probe_tiers)).collect();
        let results: Vec<CapabilitySet> = threads.into_iter().map(|t| t.join().unwrap()).collect();
        assert!(results.iter().all(|set| *set == results[0]));
        assert!(probe_runs() - before <= 1);

        let cached_runs = probe_runs();
        let _ = probe_tiers();
        assert_eq!(probe_runs(), cached_runs);

        reset_probe();
        let _ = probe_tiers();
        assert!(probe_runs() > cached_runs);
    }
}
