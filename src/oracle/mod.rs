//! Primary subject oracle seam
//!
//! The oracle is a black box: given an image it returns the same image with an
//! alpha channel isolating the subject, or fails. The pipeline only ever talks
//! to it through [`SubjectOracle`], and shares a single lazily-initialized
//! instance through [`OracleHandle`].

use crate::{
    config::{OracleConfig, ORACLE_MODEL_ENV},
    error::{CutoutError, Result},
    types::PixelBuffer,
};
use std::{
    collections::HashMap,
    panic::{catch_unwind, AssertUnwindSafe},
    path::PathBuf,
    sync::{Arc, Mutex, OnceLock, PoisonError},
};
use tracing::{info, warn};

pub mod mock;
#[cfg(feature = "tract")]
pub mod tract;

pub use mock::{MockBehavior, MockOracle};
#[cfg(feature = "tract")]
pub use tract::{TractOracle, TractOracleFactory};

/// High-quality subject extractor treated as an external black box
pub trait SubjectOracle: Send {
    /// Short name for logs
    fn name(&self) -> &str;

    /// Prepare the oracle for use (load models, warm up)
    ///
    /// # Errors
    /// - The oracle cannot run in this environment
    fn initialize(&mut self) -> Result<()>;

    /// Check if the oracle is initialized
    fn is_initialized(&self) -> bool;

    /// Return `image` with an alpha channel isolating the subject
    ///
    /// # Errors
    /// - Any failure of the underlying extractor
    fn extract(&mut self, image: &PixelBuffer) -> Result<PixelBuffer>;
}

/// Oracle shared between requests
pub type SharedOracle = Arc<Mutex<Box<dyn SubjectOracle>>>;

/// Wrap an oracle for sharing
#[must_use]
pub fn shared(oracle: Box<dyn SubjectOracle>) -> SharedOracle {
    Arc::new(Mutex::new(oracle))
}

/// Creates oracle instances on first use
pub trait OracleFactory: Send + Sync {
    /// Short name for logs
    fn name(&self) -> &str;

    /// Build an uninitialized oracle
    ///
    /// # Errors
    /// - `OracleUnavailable` when nothing can be built in this environment
    fn create(&self) -> Result<Box<dyn SubjectOracle>>;
}

/// Factory for builds and environments without an oracle
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOracleFactory;

impl OracleFactory for NoOracleFactory {
    fn name(&self) -> &str {
        "none"
    }

    fn create(&self) -> Result<Box<dyn SubjectOracle>> {
        Err(CutoutError::OracleUnavailable)
    }
}

/// Lazily-initialized oracle slot
///
/// The factory runs at most once, even under concurrent first use; callers
/// arriving during initialization wait for its outcome. A failed
/// initialization is remembered and the oracle stays unavailable.
pub struct OracleHandle {
    factory: Box<dyn OracleFactory>,
    slot: OnceLock<Option<SharedOracle>>,
}

impl OracleHandle {
    #[must_use]
    pub fn new(factory: Box<dyn OracleFactory>) -> Self {
        Self {
            factory,
            slot: OnceLock::new(),
        }
    }

    /// Handle that never yields an oracle
    #[must_use]
    pub fn unavailable() -> Self {
        Self::new(Box::new(NoOracleFactory))
    }

    /// Handle around an already-built oracle, initialized on first use
    #[must_use]
    pub fn from_oracle(oracle: Box<dyn SubjectOracle>) -> Self {
        let handle = Self::unavailable();
        let initialized = initialize_oracle(oracle).ok();
        // A fresh OnceLock is always empty
        let _ = handle.slot.set(initialized);
        handle
    }

    /// The initialized oracle, or `None` if it cannot be used
    pub fn get(&self) -> Option<SharedOracle> {
        self.slot
            .get_or_init(|| {
                let created = catch_unwind(AssertUnwindSafe(|| self.factory.create()))
                    .unwrap_or_else(|_| Err(CutoutError::oracle_failed("factory panicked")));
                match created.and_then(initialize_oracle) {
                    Ok(oracle) => {
                        info!(factory = self.factory.name(), "primary oracle ready");
                        Some(oracle)
                    },
                    Err(CutoutError::OracleUnavailable) => {
                        info!(factory = self.factory.name(), "no primary oracle configured");
                        None
                    },
                    Err(err) => {
                        warn!(factory = self.factory.name(), error = %err, "primary oracle unavailable");
                        None
                    },
                }
            })
            .clone()
    }

    /// Whether initialization has already been attempted
    #[must_use]
    pub fn is_resolved(&self) -> bool {
        self.slot.get().is_some()
    }
}

impl std::fmt::Debug for OracleHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OracleHandle")
            .field("factory", &self.factory.name())
            .field("resolved", &self.is_resolved())
            .finish()
    }
}

fn initialize_oracle(mut oracle: Box<dyn SubjectOracle>) -> Result<SharedOracle> {
    let outcome = catch_unwind(AssertUnwindSafe(|| oracle.initialize()))
        .unwrap_or_else(|_| Err(CutoutError::oracle_failed("initialization panicked")));
    outcome?;
    Ok(shared(oracle))
}

/// Factory selected from configuration and the environment
///
/// With the `tract` feature and a model path (from `config.model` or the
/// `IMGLY_CUTOUT_MODEL` environment variable) this builds a tract-backed
/// oracle; otherwise no oracle is available.
#[must_use]
pub fn factory_for(config: &OracleConfig) -> Box<dyn OracleFactory> {
    match resolve_model(config) {
        Some(path) => model_factory(path, config),
        None => Box::new(NoOracleFactory),
    }
}

fn resolve_model(config: &OracleConfig) -> Option<PathBuf> {
    config
        .model
        .clone()
        .or_else(|| std::env::var_os(ORACLE_MODEL_ENV).map(PathBuf::from))
}

#[cfg(feature = "tract")]
fn model_factory(path: PathBuf, config: &OracleConfig) -> Box<dyn OracleFactory> {
    Box::new(TractOracleFactory::new(path, config.input_size))
}

#[cfg(not(feature = "tract"))]
fn model_factory(path: PathBuf, _config: &OracleConfig) -> Box<dyn OracleFactory> {
    warn!(
        model = %path.display(),
        "oracle model configured but the `tract` feature is disabled"
    );
    Box::new(NoOracleFactory)
}

/// Model file and input resolution identifying one oracle instance
pub type OracleKey = (Option<PathBuf>, u32);

/// Handles shared by every processor in the process, one per [`OracleKey`]
#[derive(Default)]
pub struct OracleRegistry {
    handles: Mutex<HashMap<OracleKey, Arc<OracleHandle>>>,
}

impl OracleRegistry {
    /// Handle for `key`, built from `factory` on first lookup
    ///
    /// `factory` is only called when no handle exists for `key` yet.
    pub fn handle<F>(&self, key: OracleKey, factory: F) -> Arc<OracleHandle>
    where
        F: FnOnce() -> Box<dyn OracleFactory>,
    {
        let mut handles = self.handles.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(
            handles
                .entry(key)
                .or_insert_with(|| Arc::new(OracleHandle::new(factory()))),
        )
    }

    /// Number of distinct oracle configurations seen
    #[must_use]
    pub fn len(&self) -> usize {
        self.handles
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// The process-wide registry
pub fn registry() -> &'static OracleRegistry {
    static REGISTRY: OnceLock<OracleRegistry> = OnceLock::new();
    REGISTRY.get_or_init(OracleRegistry::default)
}

/// Process-wide handle for `config`
///
/// Configurations resolving to the same model file and input size share one
/// handle, so the model is loaded at most once per process.
pub fn handle_for(config: &OracleConfig) -> Arc<OracleHandle> {
    let key = (resolve_model(config), config.input_size);
    registry().handle(key, || factory_for(config))
}

/// Process-wide handle for the default configuration
pub fn default_handle() -> Arc<OracleHandle> {
    handle_for(&OracleConfig::default())
}
