//! Per-process account loop.
//!
//! Standby is only observed by the worker that owns the [`StandbyState`]. Other
//! worker processes keep running their own shards.

use crate::browser::{BrowserSession, DeviceClass};
use crate::credentials::AccountCredential;
use crate::error::AuthResult;
use crate::orchestrator::{Authenticator, LoginOutcome};
use crate::standby::StandbyReason;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Opens a fresh browser session for one pass of an account.
#[async_trait]
pub trait SessionFactory: Send + Sync {
    async fn open(
        &self,
        credential: &AccountCredential,
        device: DeviceClass,
    ) -> AuthResult<Box<dyn BrowserSession>>;
}

/// Result of one device pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "status", content = "detail")]
pub enum PassStatus {
    SignedIn,
    Halted(StandbyReason),
    Locked,
    Failed(String),
    Skipped,
}

impl PassStatus {
    fn stops_account(&self) -> bool {
        matches!(self, PassStatus::Halted(_) | PassStatus::Locked)
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountReport {
    pub email: String,
    pub desktop: PassStatus,
    pub mobile: PassStatus,
    pub mobile_token_acquired: bool,
    /// The provider locked the account; drop it from future runs.
    pub remove_account: bool,
}

impl AccountReport {
    fn skipped(email: &str) -> Self {
        Self {
            email: email.to_string(),
            desktop: PassStatus::Skipped,
            mobile: PassStatus::Skipped,
            mobile_token_acquired: false,
            remove_account: false,
        }
    }
}

struct PassResult {
    status: PassStatus,
    token_acquired: bool,
}

impl PassResult {
    fn status(status: PassStatus) -> Self {
        Self {
            status,
            token_acquired: false,
        }
    }
}

pub struct AccountWorker {
    authenticator: Arc<Authenticator>,
    sessions: Arc<dyn SessionFactory>,
    parallel: bool,
    held: Mutex<Vec<Box<dyn BrowserSession>>>,
}

impl AccountWorker {
    pub fn new(
        authenticator: Arc<Authenticator>,
        sessions: Arc<dyn SessionFactory>,
        parallel: bool,
    ) -> Self {
        Self {
            authenticator,
            sessions,
            parallel,
            held: Mutex::new(Vec::new()),
        }
    }

    /// Sessions kept open for operator inspection after a halt.
    pub fn held_sessions(&self) -> usize {
        self.held.lock().len()
    }

    /// Sign every account in, in order. Accounts after a standby are skipped.
    pub async fn run(&self, accounts: &[AccountCredential]) -> Vec<AccountReport> {
        let mut reports = Vec::with_capacity(accounts.len());
        for credential in accounts {
            if let Some(reason) = self.authenticator.standby_reason() {
                warn!(
                    stage = "WORKER",
                    account = %credential.email,
                    reason = reason.as_str(),
                    "security standby active; skipping account"
                );
                reports.push(AccountReport::skipped(&credential.email));
                continue;
            }
            reports.push(self.process(credential).await);
        }
        reports
    }

    async fn process(&self, credential: &AccountCredential) -> AccountReport {
        info!(stage = "WORKER", account = %credential.email, parallel = self.parallel, "processing account");

        let (desktop, mobile) = if self.parallel {
            tokio::join!(
                self.run_pass(credential, DeviceClass::Desktop),
                self.run_pass(credential, DeviceClass::Mobile)
            )
        } else {
            let desktop = self.run_pass(credential, DeviceClass::Desktop).await;
            let mobile = if desktop.status.stops_account() || self.authenticator.is_standby_active() {
                PassResult::status(PassStatus::Skipped)
            } else {
                self.run_pass(credential, DeviceClass::Mobile).await
            };
            (desktop, mobile)
        };

        let remove_account =
            desktop.status == PassStatus::Locked || mobile.status == PassStatus::Locked;
        if remove_account {
            warn!(stage = "WORKER", account = %credential.email, "account locked; flag for removal");
        }
        AccountReport {
            email: credential.email.clone(),
            desktop: desktop.status,
            mobile: mobile.status,
            mobile_token_acquired: mobile.token_acquired,
            remove_account,
        }
    }

    async fn run_pass(&self, credential: &AccountCredential, device: DeviceClass) -> PassResult {
        let session = match self.sessions.open(credential, device).await {
            Ok(session) => session,
            Err(e) => {
                error!(stage = "WORKER", account = %credential.email, device = device.as_str(), error = %e, "could not open session");
                return PassResult::status(PassStatus::Failed(e.to_string()));
            }
        };

        match self.authenticator.login(session.as_ref(), credential).await {
            Ok(LoginOutcome::SignedIn) => {
                let token_acquired = device.is_mobile() && self.mobile_token(session.as_ref(), credential).await;
                PassResult {
                    status: PassStatus::SignedIn,
                    token_acquired,
                }
            }
            Ok(LoginOutcome::Halted { reason }) => {
                self.held.lock().push(session);
                PassResult::status(PassStatus::Halted(reason))
            }
            Err(e) if e.is_fatal_for_account() => PassResult::status(PassStatus::Locked),
            Err(e) => {
                error!(stage = "WORKER", account = %credential.email, device = device.as_str(), error = %e, "login failed");
                PassResult::status(PassStatus::Failed(e.to_string()))
            }
        }
    }

    async fn mobile_token(&self, session: &dyn BrowserSession, credential: &AccountCredential) -> bool {
        match self.authenticator.acquire_mobile_token(session, credential).await {
            Ok(_) => true,
            Err(e) => {
                error!(stage = "LOGIN-APP", account = %credential.email, error = %e, "mobile token unavailable");
                false
            }
        }
    }
}
