//! Core types, configuration, and utilities for the rewards sign-in workers.

mod config;
mod error;
mod logging;
mod paths;
pub mod totp;

pub use config::{
    Config, DEFAULT_DOCS_BASE_URL, DEFAULT_LOGIN_DEADLINE_MS, DEFAULT_LOG_LEVEL,
    MAX_LOGIN_DEADLINE_MS, MIN_LOGIN_DEADLINE_MS,
};
pub use error::{CoreError, CoreResult};
pub use logging::{init_logging, init_logging_for_service, parse_level};
pub use paths::Paths;
pub use totp::{generate_totp, Rfc6238Generator};
