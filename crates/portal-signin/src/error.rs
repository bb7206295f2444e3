//! Authentication error types.

use thiserror::Error;

/// Failures reported by a browser driver.
///
/// These never escape a heuristic probe: the orchestration code treats a
/// driver miss as "this branch does not apply" and moves on.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BrowserError {
    /// Navigation failed or timed out
    #[error("Navigation failed for {url}: {reason}")]
    Navigation { url: String, reason: String },

    /// No element matched the selector
    #[error("No element matches {0}")]
    ElementNotFound(String),

    /// The element went away between lookup and action
    #[error("Element detached: {0}")]
    Detached(String),

    /// Driver-level protocol error
    #[error("Driver error: {0}")]
    Protocol(String),

    /// The driver cannot perform this operation
    #[error("Unsupported by driver: {0}")]
    Unsupported(String),
}

/// Authentication error type.
#[derive(Error, Debug)]
pub enum AuthError {
    /// The provider administratively locked the account. Fatal: drop the account.
    #[error("Account {account} is locked by the provider")]
    LockedAccount { account: String },

    /// No authorization code was observed before the deadline
    #[error("Authorization code not received before the deadline")]
    OAuthTimeout,

    /// The redirect carried a state value we did not generate
    #[error("OAuth state mismatch on redirect")]
    OAuthStateMismatch,

    /// Neither the portal marker nor the fallback navigation reached the portal
    #[error("Rewards portal not reached")]
    PortalUnreachable,

    /// Token endpoint rejected the authorization code
    #[error("Token exchange failed: {0}")]
    TokenExchange(String),

    /// One-time code could not be generated
    #[error("One-time code error: {0}")]
    OneTimeCode(String),

    /// Browser driver error
    #[error("Browser error: {0}")]
    Browser(#[from] BrowserError),

    /// HTTP request error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// URL parse error
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Session persistence error
    #[error("Session persistence failed: {0}")]
    Session(String),

    /// Invalid state transition in a sign-in machine
    #[error("Invalid sign-in state transition: {0}")]
    InvalidStateTransition(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl AuthError {
    /// True when the caller must stop using the account entirely.
    pub fn is_fatal_for_account(&self) -> bool {
        matches!(self, AuthError::LockedAccount { .. })
    }

    /// Returns true if this error is transient and the operation can be retried.
    ///
    /// Transient errors include:
    /// - HTTP errors with 5xx status codes
    /// - Connection timeouts
    /// - Browser navigation failures
    pub fn is_transient(&self) -> bool {
        match self {
            AuthError::Browser(BrowserError::Navigation { .. }) => true,
            AuthError::Http(e) => {
                if e.is_connect() || e.is_timeout() {
                    return true;
                }
                if let Some(status) = e.status() {
                    return status.is_server_error();
                }
                false
            }
            _ => false,
        }
    }
}

impl From<signin_config_and_utils::CoreError> for AuthError {
    fn from(err: signin_config_and_utils::CoreError) -> Self {
        match err {
            signin_config_and_utils::CoreError::OneTimeCode(msg) => AuthError::OneTimeCode(msg),
            signin_config_and_utils::CoreError::Io(e) => AuthError::Io(e),
            signin_config_and_utils::CoreError::Json(e) => AuthError::Json(e),
            signin_config_and_utils::CoreError::InvalidUrl(e) => AuthError::InvalidUrl(e),
            other => AuthError::Config(other.to_string()),
        }
    }
}

/// Result type alias using AuthError.
pub type AuthResult<T> = Result<T, AuthError>;
