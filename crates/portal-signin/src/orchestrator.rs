//! End-to-end sign-in sequence.
//!
//! [`Authenticator::login`] walks the `login_machine` from navigation to a
//! persisted session. Incident checks run before every step that submits
//! something to the provider; an incident hands the attempt to standby and the
//! call returns [`LoginOutcome::Halted`] without raising.

use crate::browser::{fido_transform, BrowserSession, DeviceClass};
use crate::collaborators::{
    AlertNotifier, HumanInput, OneTimeCodeGenerator, SessionStore, TokenExchange,
};
use crate::credential_input::{
    enter_email, enter_password_or_challenge, switch_to_password_link, PasswordStep,
};
use crate::credentials::{AccountCredential, LoginAttemptState};
use crate::deadline::Deadline;
use crate::dialogs::{dismiss_prompts, DismissContext};
use crate::error::{AuthError, AuthResult, BrowserError};
use crate::incident::{IncidentDetector, SecurityIncident};
use crate::login_fsm::{LoginMachine, LoginMachineInput, LoginPhase};
use crate::portal::{
    authorize_url, is_portal_url, is_secondary_root, parse_oauth_redirect, OAuthRedirect,
    CREDENTIAL_TYPE_PATTERN, ENTRY_URL, LOCK_MARKER, LOCK_PROBE, NAVIGATION_TIMEOUT, OAUTH_POLL,
    PORTAL_HOME_URL, PORTAL_ROOT_FALLBACK_WAIT, PORTAL_ROOT_MARKERS, PORTAL_ROOT_POLL,
    PORTAL_ROOT_WAIT, PORTAL_URL_POLL, SECONDARY_MARKER_PROBE, SECONDARY_PROBES,
    SECONDARY_PROBE_PAUSE, SECONDARY_SIGNED_IN_MARKER, SECONDARY_SIGNIN_URL, SIGNED_IN_MARKER,
    SIGNED_IN_PROBE,
};
use crate::standby::{StandbyCoordinator, StandbyReason, StandbyState};
use crate::two_factor::TwoFactorResolver;
use serde::Serialize;
use signin_config_and_utils::Config;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

const POST_EMAIL_SETTLE: Duration = Duration::from_millis(1000);
const POST_EMAIL_RELOAD_SETTLE: Duration = Duration::from_millis(500);
const OAUTH_STATE_BYTES: usize = 16;

/// External services the sign-in flow depends on.
#[derive(Clone)]
pub struct Collaborators {
    pub codes: Arc<dyn OneTimeCodeGenerator>,
    pub sessions: Arc<dyn SessionStore>,
    pub notifier: Arc<dyn AlertNotifier>,
    pub tokens: Arc<dyn TokenExchange>,
    pub human: Arc<dyn HumanInput>,
}

/// How a `login` call ended without an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "outcome")]
pub enum LoginOutcome {
    SignedIn,
    /// A security incident froze the attempt. The session is left open.
    Halted { reason: StandbyReason },
}

/// Signs accounts into the rewards portal.
///
/// One instance serves every account of a worker process and shares that
/// process's [`StandbyState`].
pub struct Authenticator {
    deadline_budget: Duration,
    detector: IncidentDetector,
    resolver: TwoFactorResolver,
    sessions: Arc<dyn SessionStore>,
    tokens: Arc<dyn TokenExchange>,
    standby: StandbyCoordinator,
}

impl Authenticator {
    pub fn new(config: &Config, collaborators: Collaborators, standby: Arc<StandbyState>) -> Self {
        let Collaborators {
            codes,
            sessions,
            notifier,
            tokens,
            human,
        } = collaborators;

        Self {
            deadline_budget: config.login_deadline(),
            detector: IncidentDetector::new(config),
            resolver: TwoFactorResolver::new(codes, human, config.parallel),
            sessions,
            tokens,
            standby: StandbyCoordinator::new(standby, notifier),
        }
    }

    pub fn is_standby_active(&self) -> bool {
        self.standby.state().is_active()
    }

    pub fn standby_reason(&self) -> Option<StandbyReason> {
        self.standby.state().reason()
    }

    pub fn standby_coordinator(&self) -> &StandbyCoordinator {
        &self.standby
    }

    /// Sign `credential` in on `session`.
    ///
    /// Fails with [`AuthError::LockedAccount`] when the provider has locked the
    /// account. An incident returns `Ok(LoginOutcome::Halted)`.
    pub async fn login(
        &self,
        session: &dyn BrowserSession,
        credential: &AccountCredential,
    ) -> AuthResult<LoginOutcome> {
        let mut state = LoginAttemptState::new();
        let result = self.login_with_state(session, credential, &mut state).await;
        state.disarm_totp();
        result
    }

    pub(crate) async fn login_with_state(
        &self,
        session: &dyn BrowserSession,
        credential: &AccountCredential,
        state: &mut LoginAttemptState,
    ) -> AuthResult<LoginOutcome> {
        let account = credential.email.as_str();
        let device = session.device_class();

        if let Some(reason) = self.standby_reason() {
            warn!(stage = "LOGIN", account, reason = reason.as_str(), "standby active; not signing in");
            return Ok(LoginOutcome::Halted { reason });
        }

        let deadline = Deadline::after(self.deadline_budget);
        let started = Instant::now();
        let mut machine = LoginMachine::new();
        info!(
            stage = "LOGIN",
            account,
            device = device.as_str(),
            deadline_ms = self.deadline_budget.as_millis() as u64,
            "starting login"
        );

        advance(&mut machine, LoginMachineInput::Begin)?;
        neutralize_fido(session).await;
        if let Err(e) = navigate_within(session, ENTRY_URL, deadline.cap(NAVIGATION_TIMEOUT)).await {
            advance(&mut machine, LoginMachineInput::NavigationFailed)?;
            error!(stage = "LOGIN", account, error = %e, "could not open the portal entry point");
            return Err(e.into());
        }
        if account_locked(session, &deadline).await {
            return locked(&mut machine, account);
        }

        let already = session
            .wait_for_visible(SIGNED_IN_MARKER, deadline.cap(SIGNED_IN_PROBE))
            .await;
        if already {
            info!(stage = "LOGIN", account, "session already authenticated");
            advance(&mut machine, LoginMachineInput::SessionReused)?;
        } else {
            advance(&mut machine, LoginMachineInput::SignInRequired)?;
            if let Some(halted) = self
                .sign_in(&mut machine, session, credential, state, &deadline)
                .await?
            {
                return Ok(halted);
            }
            self.await_portal(&mut machine, session, state, &deadline)
                .await?;
        }

        verify_secondary_context(session, state, device).await;
        advance(&mut machine, LoginMachineInput::ContextVerified)?;

        if let Err(e) = self.sessions.save(session, account, device).await {
            advance(&mut machine, LoginMachineInput::PersistFailed)?;
            error!(stage = "LOGIN", account, error = %e, "could not persist session");
            return Err(e);
        }
        advance(&mut machine, LoginMachineInput::SessionSaved)?;
        info!(
            stage = "LOGIN",
            account,
            device = device.as_str(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "login complete (session saved)"
        );
        Ok(LoginOutcome::SignedIn)
    }

    /// Stop because another attempt on this process already engaged standby.
    fn stand_down(
        &self,
        machine: &mut LoginMachine,
        account: &str,
        reason: StandbyReason,
    ) -> AuthResult<Option<LoginOutcome>> {
        warn!(stage = "LOGIN", account, reason = reason.as_str(), "standby engaged elsewhere; stopping");
        advance(machine, LoginMachineInput::IncidentRaised)?;
        Ok(Some(LoginOutcome::Halted { reason }))
    }

    /// Credential entry through the lock check. `Some` when the attempt halted.
    async fn sign_in(
        &self,
        machine: &mut LoginMachine,
        session: &dyn BrowserSession,
        credential: &AccountCredential,
        state: &mut LoginAttemptState,
        deadline: &Deadline,
    ) -> AuthResult<Option<LoginOutcome>> {
        let account = credential.email.as_str();

        enter_email(session, account, deadline).await;
        deadline.pause(POST_EMAIL_SETTLE).await;
        deadline.pause(POST_EMAIL_RELOAD_SETTLE).await;

        if let Some(incident) = self
            .detector
            .detect_recovery_mismatch(session, credential, deadline)
            .await
        {
            warn!(stage = "LOGIN", account, "recovery mismatch; stopping before password entry");
            return self.halt(machine, session, incident).await.map(Some);
        }
        if let Some(reason) = self.standby_reason() {
            return self.stand_down(machine, account, reason);
        }
        advance(machine, LoginMachineInput::EmailSubmitted)?;

        switch_to_password_link(session, deadline).await;
        let step = enter_password_or_challenge(
            session,
            credential,
            &self.detector,
            self.standby.state(),
            deadline,
        )
        .await;
        match step {
            PasswordStep::Submitted => {
                advance(machine, LoginMachineInput::PasswordSubmitted)?;
            }
            PasswordStep::Blocked(incident) => {
                warn!(stage = "LOGIN", account, "sign-in blocked; stopping");
                return self.halt(machine, session, incident).await.map(Some);
            }
            PasswordStep::Standby(reason) => {
                return self.stand_down(machine, account, reason);
            }
            PasswordStep::ChallengeRequired => {
                advance(machine, LoginMachineInput::ChallengeRequired)?;
                let outcome = self
                    .resolver
                    .resolve(session, state, credential, deadline)
                    .await;
                debug!(stage = "LOGIN", account, outcome = ?outcome, "challenge resolved");
                advance(machine, LoginMachineInput::ChallengeFinished)?;
            }
        }

        if let Some(incident) = self
            .detector
            .detect_sign_in_blocked(session, account, deadline)
            .await
        {
            warn!(stage = "LOGIN", account, "sign-in blocked after credentials; stopping");
            return self.halt(machine, session, incident).await.map(Some);
        }
        if let Some(reason) = self.standby_reason() {
            return self.stand_down(machine, account, reason);
        }

        if account_locked(session, deadline).await {
            return locked(machine, account).map(Some);
        }
        advance(machine, LoginMachineInput::LockClear)?;
        Ok(None)
    }

    async fn halt(
        &self,
        machine: &mut LoginMachine,
        session: &dyn BrowserSession,
        incident: SecurityIncident,
    ) -> AuthResult<LoginOutcome> {
        advance(machine, LoginMachineInput::IncidentRaised)?;
        self.standby.engage(&incident, session).await;
        Ok(LoginOutcome::Halted {
            reason: StandbyReason::from(incident.kind),
        })
    }

    /// Poll until the portal root renders, with one fallback navigation home.
    async fn await_portal(
        &self,
        machine: &mut LoginMachine,
        session: &dyn BrowserSession,
        state: &mut LoginAttemptState,
        deadline: &Deadline,
    ) -> AuthResult<()> {
        loop {
            dismiss_prompts(session, state, DismissContext::Portal, deadline).await;
            if session.current_url().await.is_ok_and(|u| is_portal_url(&u)) {
                break;
            }
            if deadline.expired() {
                debug!(stage = "LOGIN", "deadline reached before portal url");
                break;
            }
            deadline.pause(PORTAL_URL_POLL).await;
        }

        if let Some(marker) = wait_for_portal_root(session, deadline.cap(PORTAL_ROOT_WAIT)).await {
            advance(machine, LoginMachineInput::PortalReached)?;
            info!(stage = "LOGIN", marker, "reached rewards portal");
            return Ok(());
        }

        // One fallback navigation, allowed to run one navigation timeout past the deadline.
        let grace = deadline.extended(NAVIGATION_TIMEOUT);
        if let Err(e) = navigate_within(session, PORTAL_HOME_URL, grace.cap(NAVIGATION_TIMEOUT)).await {
            warn!(stage = "LOGIN", error = %e, "fallback navigation home failed");
        }
        if let Some(marker) =
            wait_for_portal_root(session, grace.cap(PORTAL_ROOT_FALLBACK_WAIT)).await
        {
            advance(machine, LoginMachineInput::PortalReached)?;
            info!(stage = "LOGIN", marker, "reached rewards portal via fallback");
            return Ok(());
        }

        advance(machine, LoginMachineInput::PortalMissing)?;
        error!(stage = "LOGIN", "portal root missing after navigation");
        Err(AuthError::PortalUnreachable)
    }

    /// Authorize the mobile scope and exchange the code for an access token.
    pub async fn acquire_mobile_token(
        &self,
        session: &dyn BrowserSession,
        credential: &AccountCredential,
    ) -> AuthResult<String> {
        let deadline = Deadline::after(self.deadline_budget);
        let started = Instant::now();
        let mut state = LoginAttemptState::new();

        neutralize_fido(session).await;
        let expected_state = random_state();
        let url = authorize_url(&expected_state, &credential.email)?;
        info!(stage = "LOGIN-APP", account = %credential.email, "authorizing mobile scope");
        if let Err(e) = navigate_within(session, url.as_str(), deadline.cap(NAVIGATION_TIMEOUT)).await {
            warn!(stage = "LOGIN-APP", error = %e, "authorization page did not settle");
        }

        let mut saw_bare_redirect = false;
        let code = loop {
            dismiss_prompts(session, &mut state, DismissContext::OAuth, &deadline).await;
            if let Ok(current) = session.current_url().await {
                match parse_oauth_redirect(&current) {
                    OAuthRedirect::Code { code, state } => {
                        if state.as_deref().is_some_and(|s| s != expected_state) {
                            error!(stage = "LOGIN-APP", "redirect state does not match the request");
                            return Err(AuthError::OAuthStateMismatch);
                        }
                        break code;
                    }
                    OAuthRedirect::NoCode if !saw_bare_redirect => {
                        saw_bare_redirect = true;
                        warn!(stage = "LOGIN-APP", "redirect reached without a code");
                    }
                    OAuthRedirect::NoCode | OAuthRedirect::Pending => {}
                }
            }
            if deadline.expired() {
                error!(stage = "LOGIN-APP", "authorization code not received in time");
                return Err(AuthError::OAuthTimeout);
            }
            deadline.pause(OAUTH_POLL).await;
        };

        let grant = self.tokens.exchange_authorization_code(&code).await?;
        info!(
            stage = "LOGIN-APP",
            elapsed_secs = started.elapsed().as_secs(),
            expires_in = grant.expires_in,
            "mobile scope authorized"
        );
        Ok(grant.access_token)
    }
}

fn advance(machine: &mut LoginMachine, input: LoginMachineInput) -> AuthResult<()> {
    machine.consume(&input).map_err(|_| {
        AuthError::InvalidStateTransition(format!(
            "Cannot apply {:?} in phase {:?}",
            input,
            LoginPhase::from(machine.state())
        ))
    })?;
    debug!(stage = "LOGIN", phase = ?LoginPhase::from(machine.state()), "login phase");
    Ok(())
}

fn locked(machine: &mut LoginMachine, account: &str) -> AuthResult<LoginOutcome> {
    advance(machine, LoginMachineInput::LockDetected)?;
    error!(stage = "CHECK-LOCKED", account, "account locked by the provider");
    Err(AuthError::LockedAccount {
        account: account.to_string(),
    })
}

async fn account_locked(session: &dyn BrowserSession, deadline: &Deadline) -> bool {
    session
        .wait_for_visible(LOCK_MARKER, deadline.cap(LOCK_PROBE))
        .await
}

async fn neutralize_fido(session: &dyn BrowserSession) {
    if let Err(e) = session
        .intercept_request(CREDENTIAL_TYPE_PATTERN, fido_transform())
        .await
    {
        warn!(stage = "LOGIN", error = %e, "could not intercept credential-type negotiation");
    }
}

async fn navigate_within(
    session: &dyn BrowserSession,
    url: &str,
    limit: Duration,
) -> Result<(), BrowserError> {
    match tokio::time::timeout(limit, session.navigate(url)).await {
        Ok(result) => result,
        Err(_) => Err(BrowserError::Navigation {
            url: url.to_string(),
            reason: format!("timed out after {}ms", limit.as_millis()),
        }),
    }
}

/// Check the portal-root markers in order until one shows or `budget` runs out.
async fn wait_for_portal_root(session: &dyn BrowserSession, budget: Duration) -> Option<&'static str> {
    let end = Instant::now() + budget;
    loop {
        for &marker in PORTAL_ROOT_MARKERS {
            if session.is_visible(marker).await {
                return Some(marker);
            }
        }
        let now = Instant::now();
        if now >= end {
            return None;
        }
        tokio::time::sleep(PORTAL_ROOT_POLL.min(end - now)).await;
    }
}

/// Best-effort check that the secondary site shares the sign-in.
async fn verify_secondary_context(
    session: &dyn BrowserSession,
    state: &mut LoginAttemptState,
    device: DeviceClass,
) {
    info!(stage = "LOGIN-CONTEXT", "verifying secondary site context");
    if let Err(e) = navigate_within(session, SECONDARY_SIGNIN_URL, NAVIGATION_TIMEOUT).await {
        warn!(stage = "LOGIN-CONTEXT", error = %e, "secondary verification error");
        return;
    }

    let probe_budget = Deadline::after(
        (SECONDARY_MARKER_PROBE + SECONDARY_PROBE_PAUSE) * SECONDARY_PROBES as u32,
    );
    for _ in 0..SECONDARY_PROBES {
        if session.current_url().await.is_ok_and(|u| is_secondary_root(&u)) {
            dismiss_prompts(session, state, DismissContext::Portal, &probe_budget).await;
            let signed_in = session
                .wait_for_visible(SECONDARY_SIGNED_IN_MARKER, SECONDARY_MARKER_PROBE)
                .await;
            if signed_in || device.is_mobile() {
                info!(stage = "LOGIN-CONTEXT", "secondary context verified");
                return;
            }
        }
        tokio::time::sleep(SECONDARY_PROBE_PAUSE).await;
    }
    warn!(stage = "LOGIN-CONTEXT", "secondary context not confirmed");
}

fn random_state() -> String {
    let bytes: [u8; OAUTH_STATE_BYTES] = rand::random();
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}
