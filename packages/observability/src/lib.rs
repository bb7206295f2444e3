//! # Observability
//!
//! Centralized observability layer for the sign-in workers.
//!
//! ## Design Philosophy
//!
//! Workers are **log producers**, not log consumers. They call
//! `observability::init_with_config()` once at startup and use standard
//! `tracing` macros throughout their code. They have zero knowledge of where
//! logs go or who reads them.
//!
//! ## Dev Mode
//!
//! All worker processes write structured JSONL to a single central file:
//! `~/.rewards-signin/logs/worker.jsonl`
//!
//! - `tail -f ~/.rewards-signin/logs/worker.jsonl | jq` for pretty JSON
//! - `lnav ~/.rewards-signin/logs/worker.jsonl` for interactive exploration
//!
//! Several worker processes may share the file; writes are append-only with
//! per-line flush semantics.
//!
//! Credentials pass through the sign-in code paths, so every field is run
//! through [`redact`] before it reaches the file. Passwords, one-time codes,
//! secrets and tokens never land on disk.
//!
//! ## Usage
//!
//! ```rust,ignore
//! fn main() {
//!     observability::init_with_config(observability::LogConfig {
//!         service_name: "signin-worker".into(),
//!         default_level: "debug".into(),
//!         also_stderr: true,
//!         ..Default::default()
//!     });
//!     tracing::info!("worker started");
//! }
//! ```

#[cfg(feature = "dev")]
mod dev;

mod json_layer;
pub mod redact;

pub use json_layer::LogEntry;

use std::path::PathBuf;

/// Configuration for the logging system.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Name of the service (e.g., "signin-worker").
    /// Included in every log line for filtering.
    pub service_name: String,

    /// Default log level filter (e.g., "debug", "info", "warn").
    /// Can be overridden by `RUST_LOG` environment variable.
    pub default_level: String,

    /// Optional custom log file path.
    /// Defaults to `~/.rewards-signin/logs/worker.jsonl` in dev mode.
    pub log_path: Option<PathBuf>,

    /// Also emit logs to stderr for immediate feedback.
    pub also_stderr: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            service_name: "unknown".into(),
            default_level: "info".into(),
            log_path: None,
            also_stderr: false,
        }
    }
}

/// Initialize the observability layer with default settings.
///
/// # Panics
///
/// Panics if the log file cannot be created or opened.
pub fn init(service_name: &str) {
    init_with_config(LogConfig {
        service_name: service_name.into(),
        ..Default::default()
    });
}

/// Initialize the observability layer with custom configuration.
///
/// Calling this twice in one process is a no-op for the second call.
pub fn init_with_config(config: LogConfig) {
    #[cfg(feature = "dev")]
    {
        dev::init_dev_subscriber(&config);
    }

    #[cfg(not(feature = "dev"))]
    {
        use tracing_subscriber::util::SubscriberInitExt;
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.default_level)),
            )
            .with_target(true)
            .compact()
            .with_writer(std::io::stderr)
            .finish()
            .try_init();
    }
}

/// Re-export tracing macros for convenience.
/// Services can use `observability::info!()` or `tracing::info!()`.
pub use tracing::{debug, error, info, instrument, trace, warn};

/// Re-export the span macro for structured context.
pub use tracing::span;

/// Re-export Level for advanced filtering.
pub use tracing::Level;
