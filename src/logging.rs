//! Logging setup
//!
//! The library only emits `tracing` events. Host binaries that have no
//! subscriber of their own can install one here.

use clap::Args;
use tracing::Level;
use tracing_subscriber::{fmt, prelude::*, util::TryInitError, EnvFilter};

/// Logging options
#[derive(Args, Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[arg(long = "log-level", env = "LOG_LEVEL", default_value = "info")]
    pub level: String,

    /// Output logs as JSON
    #[arg(long = "log-json", env = "LOG_JSON")]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl LoggingConfig {
    /// Parsed level; unknown names fall back to INFO
    pub fn level(&self) -> Level {
        match self.level.to_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "info" => Level::INFO,
            "warn" => Level::WARN,
            "error" => Level::ERROR,
            _ => Level::INFO,
        }
    }

    fn filter(&self) -> EnvFilter {
        let mut filter = EnvFilter::from_default_env().add_directive(self.level().into());
        if let Ok(directive) = "redis=warn".parse() {
            filter = filter.add_directive(directive);
        }
        filter
    }
}

/// Install a global subscriber
///
/// Fails if one is already installed.
pub fn init_logging(config: &LoggingConfig) -> Result<(), TryInitError> {
    let filter = config.filter();
    if config.json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true))
            .try_init()
    }
}
