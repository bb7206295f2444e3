//! Configuration management for the sign-in workers.

use crate::{CoreError, CoreResult, Paths};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

/// Default log level.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Default overall sign-in deadline.
pub const DEFAULT_LOGIN_DEADLINE_MS: u64 = 180_000;

/// Shortest accepted sign-in deadline.
pub const MIN_LOGIN_DEADLINE_MS: u64 = 10_000;

/// Longest accepted sign-in deadline.
pub const MAX_LOGIN_DEADLINE_MS: u64 = 600_000;

/// Security documentation linked from incident alerts.
pub const DEFAULT_DOCS_BASE_URL: &str =
    "https://github.com/LightZirconite/Microsoft-Rewards-Script-Private/blob/v2/docs/security.md";

const ENV_LOG_LEVEL: &str = "SIGNIN_LOG_LEVEL";
const ENV_LOGIN_MAX_WAIT_MS: &str = "LOGIN_MAX_WAIT_MS";
const ENV_DOCS_BASE: &str = "DOCS_BASE";

/// Main worker configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Overall sign-in deadline in milliseconds. Always read through [`Config::login_deadline`].
    #[serde(default = "default_login_deadline_ms")]
    pub login_deadline_ms: u64,
    /// Base URL of the security documentation.
    #[serde(default = "default_docs_base_url")]
    pub docs_base_url: String,
    /// Where session cookies are written. Defaults to `~/.rewards-signin/sessions`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_dir: Option<PathBuf>,
    /// Run the desktop and mobile sign-ins of one account concurrently.
    #[serde(default)]
    pub parallel: bool,
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_login_deadline_ms() -> u64 {
    DEFAULT_LOGIN_DEADLINE_MS
}

fn default_docs_base_url() -> String {
    DEFAULT_DOCS_BASE_URL.to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            login_deadline_ms: DEFAULT_LOGIN_DEADLINE_MS,
            docs_base_url: default_docs_base_url(),
            session_dir: None,
            parallel: false,
        }
    }
}

impl Config {
    /// Create a new Config with default values, then override from environment.
    pub fn new() -> Self {
        let mut config = Self::default();
        config.load_from_env();
        config
    }

    /// Load configuration from the config file, falling back to defaults.
    /// Environment variables are applied last.
    pub fn load(paths: &Paths) -> CoreResult<Self> {
        let config_path = paths.config_file();

        let mut config = if config_path.exists() {
            Self::load_from_file(&config_path)?
        } else {
            Self::default()
        };

        config.load_from_env();

        Ok(config)
    }

    /// Load configuration from a specific file.
    pub fn load_from_file(path: &Path) -> CoreResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a file.
    pub fn save(&self, paths: &Paths) -> CoreResult<()> {
        paths.ensure_dirs()?;
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(paths.config_file(), content)?;
        Ok(())
    }

    fn load_from_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides from a key lookup (the process environment in production).
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(level) = lookup(ENV_LOG_LEVEL).and_then(non_empty) {
            self.log_level = level;
        }
        if let Some(raw) = lookup(ENV_LOGIN_MAX_WAIT_MS).and_then(non_empty) {
            self.login_deadline_ms = raw
                .parse::<u64>()
                .map(clamp_deadline_ms)
                .unwrap_or(DEFAULT_LOGIN_DEADLINE_MS);
        }
        if let Some(base) = lookup(ENV_DOCS_BASE).and_then(non_empty) {
            self.docs_base_url = base;
        }
    }

    /// Overall sign-in deadline, clamped to the accepted range.
    pub fn login_deadline(&self) -> Duration {
        Duration::from_millis(clamp_deadline_ms(self.login_deadline_ms))
    }

    /// Resolve the session directory against the default layout.
    pub fn session_dir(&self, paths: &Paths) -> PathBuf {
        self.session_dir
            .clone()
            .unwrap_or_else(|| paths.sessions_dir())
    }

    /// Documentation link for an incident anchor.
    ///
    /// `we-cant-sign-you-in` is published under `#we-cant-sign-you-in-blocked`.
    /// Unknown anchors get the bare base.
    pub fn docs_url(&self, anchor: &str) -> String {
        let base = self
            .docs_base_url
            .split('#')
            .next()
            .unwrap_or(&self.docs_base_url);
        let fragment = match anchor.trim_start_matches('#') {
            "we-cant-sign-you-in" => "we-cant-sign-you-in-blocked",
            "recovery-email-mismatch" => "recovery-email-mismatch",
            _ => return base.to_string(),
        };
        format!("{}#{}", base, fragment)
    }

    /// Get the documentation base as a parsed URL.
    pub fn docs_base(&self) -> CoreResult<Url> {
        Url::parse(&self.docs_base_url).map_err(CoreError::from)
    }
}

fn clamp_deadline_ms(ms: u64) -> u64 {
    ms.clamp(MIN_LOGIN_DEADLINE_MS, MAX_LOGIN_DEADLINE_MS)
}

fn non_empty(raw: String) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
