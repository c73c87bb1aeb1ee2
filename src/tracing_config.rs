//! Tracing subscriber setup for applications
//!
//! The library only emits events and spans. Binaries call [`init_cli_tracing`]
//! or build a [`TracingConfig`] to decide how those are rendered.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

/// Environment variable holding a filter directive, e.g. `imgly_cutout::tiers=trace`
pub const LOG_ENV: &str = "IMGLY_CUTOUT_LOG";

/// Output format for tracing events
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TracingFormat {
    /// Human-readable colored console output (default for CLI)
    Console,
    /// Compact console output without colors, for CI logs
    Compact,
    /// JSON structured logging
    #[cfg(feature = "tracing-json")]
    Json,
}

/// Tracing configuration builder
#[derive(Debug, Clone)]
pub struct TracingConfig {
    /// Verbosity level (maps to log levels)
    pub verbosity: u8,
    pub format: TracingFormat,
    /// Environment filter string (overrides verbosity if set)
    pub env_filter: Option<String>,
    /// Session ID for correlation
    pub session_id: Option<String>,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            verbosity: 0,
            format: TracingFormat::Console,
            env_filter: None,
            session_id: None,
        }
    }
}

impl TracingConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_verbosity(mut self, verbosity: u8) -> Self {
        self.verbosity = verbosity;
        self
    }

    #[must_use]
    pub fn with_format(mut self, format: TracingFormat) -> Self {
        self.format = format;
        self
    }

    #[must_use]
    pub fn with_env_filter<S: Into<String>>(mut self, filter: S) -> Self {
        self.env_filter = Some(filter.into());
        self
    }

    #[must_use]
    pub fn with_session_id<S: Into<String>>(mut self, session_id: S) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    /// Filter directive for the configured verbosity
    ///
    /// Dependencies stay one level quieter than this crate.
    #[must_use]
    pub fn verbosity_to_filter(&self) -> &'static str {
        match self.verbosity {
            0 => "warn",
            1 => "warn,imgly_cutout=info",
            2 => "info,imgly_cutout=debug",
            _ => "debug,imgly_cutout=trace",
        }
    }

    /// Build the filter
    ///
    /// Precedence: explicit directive, then [`LOG_ENV`], then verbosity.
    ///
    /// # Errors
    /// - Malformed filter directive
    pub fn filter(&self) -> anyhow::Result<EnvFilter> {
        let from_env = std::env::var(LOG_ENV).ok().filter(|v| !v.trim().is_empty());
        let directive = match (&self.env_filter, &from_env) {
            (Some(explicit), _) => explicit.as_str(),
            (None, Some(env)) => env.as_str(),
            (None, None) => self.verbosity_to_filter(),
        };
        EnvFilter::try_new(directive)
            .map_err(|e| anyhow::anyhow!("invalid log filter '{directive}': {e}"))
    }

    /// Install the global subscriber
    ///
    /// # Errors
    /// - Malformed filter directive
    /// - A global subscriber is already installed
    pub fn init(self) -> anyhow::Result<()> {
        let registry = Registry::default().with(self.filter()?);

        match self.format {
            TracingFormat::Console => {
                let layer = fmt::layer()
                    .with_ansi(true)
                    .with_target(false)
                    .with_writer(std::io::stderr)
                    .compact();
                registry.with(layer).try_init()?;
            },
            TracingFormat::Compact => {
                let layer = fmt::layer()
                    .with_ansi(false)
                    .with_target(false)
                    .with_writer(std::io::stderr)
                    .compact();
                registry.with(layer).try_init()?;
            },
            #[cfg(feature = "tracing-json")]
            TracingFormat::Json => {
                let layer = fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(true)
                    .with_writer(std::io::stderr);
                registry.with(layer).try_init()?;
            },
        }

        if let Some(session_id) = &self.session_id {
            tracing::info!(
                session_id = %session_id,
                version = env!("CARGO_PKG_VERSION"),
                "cutout session started"
            );
        }
        Ok(())
    }
}

/// Initialize tracing with CLI defaults and a fresh session id
///
/// # Errors
/// - Tracing could not be installed
pub fn init_cli_tracing(verbosity: u8, format: TracingFormat) -> anyhow::Result<()> {
    TracingConfig::new()
        .with_verbosity(verbosity)
        .with_format(format)
        .with_session_id(uuid::Uuid::new_v4().to_string())
        .init()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verbosity_mapping() {
        let levels: Vec<_> = (0..5)
            .map(|v| TracingConfig::new().with_verbosity(v).verbosity_to_filter())
            .collect();
        assert_eq!(levels[0], "warn");
        assert!(levels[1].contains("imgly_cutout=info"));
        assert!(levels[2].contains("imgly_cutout=debug"));
        assert_eq!(levels[3], levels[4]);
        assert!(levels
            .iter()
            .all(|directive| EnvFilter::try_new(directive).is_ok()));
    }

    #[test]
    fn test_env_filter_overrides_verbosity() {
        let config = TracingConfig::new()
            .with_verbosity(3)
            .with_env_filter("imgly_cutout=debug");
        assert!(config.filter().is_ok());
        assert_eq!(config.env_filter.as_deref(), Some("imgly_cutout=debug"));
    }
}
