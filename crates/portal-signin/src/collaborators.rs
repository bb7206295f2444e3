//! Interfaces to the collaborators a sign-in attempt depends on, with their
//! default implementations.

use crate::browser::{BrowserSession, DeviceClass};
use crate::error::{AuthError, AuthResult};
use crate::portal;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use signin_config_and_utils::Rfc6238Generator;
use std::time::SystemTime;
use parking_lot::Mutex;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tracing::{error, warn};

/// Operator lines read ahead of the prompt that will consume them.
const LINE_BUFFER: usize = 8;

/// Produces time-step one-time codes from a shared secret.
pub trait OneTimeCodeGenerator: Send + Sync {
    fn generate(&self, secret: &str, at: SystemTime) -> AuthResult<String>;
}

impl OneTimeCodeGenerator for Rfc6238Generator {
    fn generate(&self, secret: &str, at: SystemTime) -> AuthResult<String> {
        Ok(self.generate_at(secret, at)?)
    }
}

/// Persists the authenticated browser state of an account.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn save(
        &self,
        session: &dyn BrowserSession,
        account: &str,
        device: DeviceClass,
    ) -> AuthResult<()>;
}

/// How loudly an alert should be delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Warning,
    Critical,
}

/// Outbound alert channel (webhook, chat, ...). Delivery is best-effort.
#[async_trait]
pub trait AlertNotifier: Send + Sync {
    async fn notify(&self, title: &str, body: &str, severity: Severity);
}

/// Result of exchanging an authorization code.
#[derive(Clone, Deserialize)]
pub struct TokenGrant {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    pub expires_in: u64,
}

impl std::fmt::Debug for TokenGrant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenGrant")
            .field("access_token", &"[REDACTED]")
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "[REDACTED]"))
            .field("expires_in", &self.expires_in)
            .finish()
    }
}

/// Exchanges an OAuth authorization code for an access token.
#[async_trait]
pub trait TokenExchange: Send + Sync {
    async fn exchange_authorization_code(&self, code: &str) -> AuthResult<TokenGrant>;
}

/// Line-oriented channel to a human operator.
///
/// Cancellation is by dropping the returned future; implementations must not
/// act on a line read after that.
#[async_trait]
pub trait HumanInput: Send + Sync {
    /// `None` when no human is reachable (closed input, headless run).
    async fn request_line(&self, prompt: &str) -> Option<String>;
}

/// Notifier that writes alerts to the structured log.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingNotifier;

#[async_trait]
impl AlertNotifier for TracingNotifier {
    async fn notify(&self, title: &str, body: &str, severity: Severity) {
        let body = body.replace('\n', " | ");
        match severity {
            Severity::Critical => error!(stage = "SECURITY", title, body = %body, "security alert"),
            Severity::Warning => warn!(stage = "SECURITY", title, body = %body, "security alert"),
        }
    }
}

type LineSource = Box<dyn AsyncRead + Send + Unpin>;

/// Operator line input from the process stdin.
///
/// One background task owns the reader and forwards lines over a channel, so a
/// prompt dropped mid-wait leaves the next typed line for the next prompt.
pub struct StdinPrompt {
    pending: Mutex<Option<(LineSource, mpsc::Sender<String>)>>,
    lines: tokio::sync::Mutex<mpsc::Receiver<String>>,
}

impl StdinPrompt {
    pub fn new() -> Self {
        Self::from_reader(tokio::io::stdin())
    }

    /// Read lines from `source` instead of stdin.
    pub fn from_reader(source: impl AsyncRead + Send + Unpin + 'static) -> Self {
        let (tx, rx) = mpsc::channel(LINE_BUFFER);
        Self {
            pending: Mutex::new(Some((Box::new(source), tx))),
            lines: tokio::sync::Mutex::new(rx),
        }
    }

    /// Start the reader task on first use.
    fn ensure_reader(&self) {
        let Some((source, tx)) = self.pending.lock().take() else {
            return;
        };
        tokio::spawn(async move {
            let mut lines = BufReader::new(source).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        if tx.send(line.trim().to_string()).await.is_err() {
                            break;
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        warn!(stage = "LOGIN-2FA", error = %e, "could not read operator input");
                        break;
                    }
                }
            }
        });
    }
}

impl Default for StdinPrompt {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for StdinPrompt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StdinPrompt")
            .field("started", &self.pending.lock().is_none())
            .finish()
    }
}

#[async_trait]
impl HumanInput for StdinPrompt {
    async fn request_line(&self, prompt: &str) -> Option<String> {
        self.ensure_reader();

        let mut stderr = tokio::io::stderr();
        if stderr.write_all(format!("{prompt}\n").as_bytes()).await.is_err() {
            return None;
        }
        let _ = stderr.flush().await;

        self.lines.lock().await.recv().await
    }
}

/// Exchanges authorization codes against the consumer token endpoint.
#[derive(Debug, Clone)]
pub struct HttpTokenExchange {
    client: reqwest::Client,
    token_url: String,
    client_id: String,
    redirect_uri: String,
}

impl HttpTokenExchange {
    /// Exchange against the mobile app registration, reusing `client`.
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            token_url: portal::OAUTH_TOKEN_URL.to_string(),
            client_id: portal::OAUTH_CLIENT_ID.to_string(),
            redirect_uri: portal::OAUTH_REDIRECT_URL.to_string(),
        }
    }

    /// Point the exchange at a different token endpoint.
    pub fn with_token_url(mut self, token_url: impl Into<String>) -> Self {
        self.token_url = token_url.into();
        self
    }

    fn form<'a>(&'a self, code: &'a str) -> [(&'static str, &'a str); 4] {
        [
            ("grant_type", "authorization_code"),
            ("client_id", self.client_id.as_str()),
            ("code", code),
            ("redirect_uri", self.redirect_uri.as_str()),
        ]
    }
}

#[async_trait]
impl TokenExchange for HttpTokenExchange {
    async fn exchange_authorization_code(&self, code: &str) -> AuthResult<TokenGrant> {
        let response = self
            .client
            .post(&self.token_url)
            .form(&self.form(code))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AuthError::TokenExchange(format!("{}: {}", status, body)));
        }

        Ok(response.json::<TokenGrant>().await?)
    }
}
