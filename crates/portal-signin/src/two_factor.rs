//! Two-factor resolution: automatic one-time codes, authenticator push
//! approval, and a manual operator fallback.
//!
//! The resolver never fails the login. Whatever happens here is reported as a
//! [`TwoFactorOutcome`]; whether sign-in actually succeeded is decided later by
//! the portal wait.

use crate::browser::{soft, BrowserSession};
use crate::collaborators::{HumanInput, OneTimeCodeGenerator};
use crate::credentials::{AccountCredential, LoginAttemptState};
use crate::deadline::Deadline;
use crate::dialogs::{dismiss_prompts, DismissContext, PRIMARY_BUTTON};
use crate::login_fsm::{ChallengeMachine, ChallengeMachineInput, ChallengeStage};
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tracing::{debug, info, warn};

const TOTP_INPUT_SELECTORS: &[&str] = &[
    r#"input[name="otc"]"#,
    "#idTxtBx_SAOTCC_OTC",
    "#idTxtBx_SAOTCS_OTC",
    r#"input[data-testid="otcInput"]"#,
    r#"input[autocomplete="one-time-code"]"#,
    r#"input[type="tel"][name="otc"]"#,
];
pub(crate) const TOTP_ALT_OPTION_SELECTORS: &[&str] = &[
    "#idA_SAOTCS_ProofPickerChange",
    "#idA_SAOTCC_AlternateLogin",
    r#"a:has-text("Use a different verification option")"#,
    r#"a:has-text("Sign in another way")"#,
    r#"a:has-text("I can't use my Microsoft Authenticator app right now")"#,
    r#"button:has-text("Use a different verification option")"#,
    r#"button:has-text("Sign in another way")"#,
];
pub(crate) const TOTP_CHALLENGE_SELECTORS: &[&str] = &[
    r#"[data-value="PhoneAppOTP"]"#,
    r#"[data-value="OneTimeCode"]"#,
    r#"button:has-text("Use a verification code")"#,
    r#"button:has-text("Enter code manually")"#,
    r#"button:has-text("Enter a code from your authenticator app")"#,
    r#"button:has-text("Use code from your authentication app")"#,
    r#"button:has-text("Utiliser un code de vérification")"#,
    r#"button:has-text("Utiliser un code de verification")"#,
    r#"button:has-text("Entrer un code depuis votre application")"#,
    r#"button:has-text("Entrez un code depuis votre application")"#,
    r#"button:has-text("Entrez un code")"#,
    r#"div[role="button"]:has-text("Use a verification code")"#,
    r#"div[role="button"]:has-text("Enter a code")"#,
];
pub(crate) const TOTP_SUBMIT_SELECTORS: &[&str] = &[
    "#idSubmit_SAOTCC_Continue",
    "#idSubmit_SAOTCC_OTC",
    r#"button[type="submit"]:has-text("Verify")"#,
    r#"button[type="submit"]:has-text("Continuer")"#,
    r#"button:has-text("Verify")"#,
    r#"button:has-text("Continuer")"#,
    r#"button:has-text("Submit")"#,
];

pub(crate) const OTC_INPUT: &str = r#"input[name="otc"]"#;
pub(crate) const APPROVAL_NUMBER: &str = r#"#displaySign, div[data-testid="displaySign"]>span"#;
pub(crate) const APPROVAL_FORM: &str = r#"form[name="f1"]"#;
pub(crate) const RESEND_PUSH_BUTTON: &str = r#"button[aria-describedby="pushNotificationsTitle errorDescription"]"#;
pub(crate) const CONFIRM_SEND_BUTTON: &str = r#"button[aria-describedby="confirmSendTitle"]"#;

const TOTP_REVEAL_ROUNDS: usize = 4;
const TOTP_REVEAL_SETTLE: Duration = Duration::from_millis(900);
const CHALLENGE_SETTLE: Duration = Duration::from_millis(500);
const APPROVAL_NUMBER_PROBE: Duration = Duration::from_millis(2500);
const APPROVAL_NUMBER_REFETCH: Duration = Duration::from_millis(2000);
const CONFIRM_SEND_SETTLE: Duration = Duration::from_millis(1500);
const RESEND_PROBE: Duration = Duration::from_millis(1500);
const RESEND_THROTTLE: Duration = Duration::from_secs(60);
const RESEND_ATTEMPTS: usize = 6;
const PUSH_CYCLE_WAIT: Duration = Duration::from_secs(60);
const PUSH_RETRY_PROBE: Duration = Duration::from_millis(3000);
pub const PUSH_MAX_CYCLES: u32 = 6;
const MANUAL_POLL_INTERVAL: Duration = Duration::from_secs(2);
const MANUAL_FIELD_PROBE: Duration = Duration::from_millis(500);
const MANUAL_PROMPT: &str = "Enter 2FA code:";

/// How two-factor resolution ended.
///
/// The provider exposes no denial signal: a rejected push looks exactly like
/// one that timed out, so denial folds into the push outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "outcome")]
pub enum TwoFactorOutcome {
    TotpSubmitted,
    /// Code field found but the code could not be generated or typed.
    TotpFailed,
    PushApproved,
    /// An expired approval number could not be replaced.
    PushRefreshFailed,
    PushExhausted { cycles: u32 },
    ManualSubmitted,
    /// The operator skipped, or the page advanced without a code.
    ManualSkipped,
    /// No operator channel is available.
    ManualUnavailable,
    DeadlineElapsed,
}

enum ManualEvent {
    Line(Option<String>),
    UiAdvanced,
    DeadlineElapsed,
}

/// Drives the `challenge_machine` for one login attempt.
pub(crate) struct TwoFactorResolver {
    codes: Arc<dyn OneTimeCodeGenerator>,
    human: Arc<dyn HumanInput>,
    parallel: bool,
}

impl TwoFactorResolver {
    pub(crate) fn new(
        codes: Arc<dyn OneTimeCodeGenerator>,
        human: Arc<dyn HumanInput>,
        parallel: bool,
    ) -> Self {
        Self {
            codes,
            human,
            parallel,
        }
    }

    /// Resolve the challenge on the current page.
    ///
    /// The credential's secret is armed on `state` for the duration of this
    /// call only.
    pub(crate) async fn resolve(
        &self,
        session: &dyn BrowserSession,
        state: &mut LoginAttemptState,
        credential: &AccountCredential,
        deadline: &Deadline,
    ) -> TwoFactorOutcome {
        state.arm_totp(credential.totp_secret.as_deref());
        let outcome = self.run(session, state, deadline).await;
        state.disarm_totp();
        info!(stage = "LOGIN-2FA", outcome = ?outcome, "two-factor finished");
        outcome
    }

    async fn run(
        &self,
        session: &dyn BrowserSession,
        state: &mut LoginAttemptState,
        deadline: &Deadline,
    ) -> TwoFactorOutcome {
        let mut machine = ChallengeMachine::new();

        dismiss_prompts(session, state, DismissContext::Challenge, deadline).await;
        deadline.pause(CHALLENGE_SETTLE).await;

        if state.active_totp_secret().is_some() {
            if let Some(selector) = ensure_totp_input(session, deadline).await {
                advance(&mut machine, ChallengeMachineInput::TotpFieldReady);
                return self.submit_totp(&mut machine, session, state, selector).await;
            }
        }

        if let Some(number) = self.fetch_approval_number(session, deadline).await {
            advance(&mut machine, ChallengeMachineInput::ApprovalNumberShown);
            return self
                .await_push_approval(&mut machine, session, state, number, deadline)
                .await;
        }

        advance(&mut machine, ChallengeMachineInput::NoAutomaticRoute);
        self.manual_entry(&mut machine, session, state, deadline).await
    }

    async fn submit_totp(
        &self,
        machine: &mut ChallengeMachine,
        session: &dyn BrowserSession,
        state: &LoginAttemptState,
        selector: &'static str,
    ) -> TwoFactorOutcome {
        let Some(secret) = state.active_totp_secret() else {
            advance(machine, ChallengeMachineInput::Abandoned);
            return TwoFactorOutcome::TotpFailed;
        };
        let code = match self.codes.generate(secret, SystemTime::now()) {
            Ok(code) => code,
            Err(e) => {
                warn!(stage = "LOGIN-2FA", error = %e, "could not generate one-time code");
                advance(machine, ChallengeMachineInput::Abandoned);
                return TwoFactorOutcome::TotpFailed;
            }
        };

        if !session.is_visible(selector).await {
            warn!(stage = "LOGIN-2FA", selector, "code input unexpectedly hidden");
            advance(machine, ChallengeMachineInput::Abandoned);
            return TwoFactorOutcome::TotpFailed;
        }
        soft(session.fill(selector, "").await, "LOGIN-2FA", "clear code");
        if !soft(session.fill(selector, &code).await, "LOGIN-2FA", "fill code") {
            advance(machine, ChallengeMachineInput::Abandoned);
            return TwoFactorOutcome::TotpFailed;
        }

        match first_visible(session, TOTP_SUBMIT_SELECTORS).await {
            Some(submit) => {
                soft(session.click(submit).await, "LOGIN-2FA", "submit code");
            }
            None => {
                soft(session.press_key("Enter").await, "LOGIN-2FA", "enter code");
            }
        }
        advance(machine, ChallengeMachineInput::CodeSubmitted);
        info!(stage = "LOGIN-2FA", "one-time code submitted automatically");
        TwoFactorOutcome::TotpSubmitted
    }

    async fn fetch_approval_number(
        &self,
        session: &dyn BrowserSession,
        deadline: &Deadline,
    ) -> Option<String> {
        if let Some(number) = read_approval_number(session, deadline.cap(APPROVAL_NUMBER_PROBE)).await {
            return Some(number);
        }

        if self.parallel {
            info!(stage = "LOGIN-2FA", "parallel mode: throttling authenticator push requests");
            for _ in 0..RESEND_ATTEMPTS {
                if deadline.expired()
                    || !session
                        .wait_for_visible(RESEND_PUSH_BUTTON, deadline.cap(RESEND_PROBE))
                        .await
                {
                    break;
                }
                deadline.pause(RESEND_THROTTLE).await;
                soft(session.click(RESEND_PUSH_BUTTON).await, "LOGIN-2FA", "resend push");
            }
        }

        if session.click(CONFIRM_SEND_BUTTON).await.is_err() {
            debug!(stage = "LOGIN-2FA", "no send-push control");
        }
        deadline.pause(CONFIRM_SEND_SETTLE).await;
        read_approval_number(session, deadline.cap(APPROVAL_NUMBER_REFETCH)).await
    }

    async fn await_push_approval(
        &self,
        machine: &mut ChallengeMachine,
        session: &dyn BrowserSession,
        state: &LoginAttemptState,
        mut number: String,
        deadline: &Deadline,
    ) -> TwoFactorOutcome {
        for cycle in 1..=PUSH_MAX_CYCLES {
            info!(stage = "LOGIN-2FA", number = %number, cycle, "approve sign-in in authenticator");
            if session
                .wait_for_detached(APPROVAL_FORM, deadline.cap(PUSH_CYCLE_WAIT))
                .await
            {
                advance(machine, ChallengeMachineInput::Approved);
                info!(stage = "LOGIN-2FA", "authenticator approval succeeded");
                return TwoFactorOutcome::PushApproved;
            }

            if state.active_totp_secret().is_some() {
                if let Some(selector) = first_visible(session, TOTP_INPUT_SELECTORS).await {
                    advance(machine, ChallengeMachineInput::TotpFieldReady);
                    return self.submit_totp(machine, session, state, selector).await;
                }
            }

            if deadline.expired() {
                advance(machine, ChallengeMachineInput::Abandoned);
                return TwoFactorOutcome::DeadlineElapsed;
            }

            info!(stage = "LOGIN-2FA", "authenticator number expired; refreshing");
            if session
                .wait_for_visible(PRIMARY_BUTTON, deadline.cap(PUSH_RETRY_PROBE))
                .await
            {
                soft(session.click(PRIMARY_BUTTON).await, "LOGIN-2FA", "retry push");
            }
            match self.fetch_approval_number(session, deadline).await {
                Some(refreshed) => number = refreshed,
                None => {
                    warn!(stage = "LOGIN-2FA", "could not refresh authenticator number");
                    advance(machine, ChallengeMachineInput::Abandoned);
                    return TwoFactorOutcome::PushRefreshFailed;
                }
            }
        }

        warn!(
            stage = "LOGIN-2FA",
            cycles = PUSH_MAX_CYCLES,
            "authenticator approval loop exhausted"
        );
        advance(machine, ChallengeMachineInput::Exhausted);
        TwoFactorOutcome::PushExhausted {
            cycles: PUSH_MAX_CYCLES,
        }
    }

    async fn manual_entry(
        &self,
        machine: &mut ChallengeMachine,
        session: &dyn BrowserSession,
        state: &mut LoginAttemptState,
        deadline: &Deadline,
    ) -> TwoFactorOutcome {
        if state.active_totp_secret().is_some() {
            if let Some(selector) = ensure_totp_input(session, deadline).await {
                advance(machine, ChallengeMachineInput::TotpFieldReady);
                return self.submit_totp(machine, session, state, selector).await;
            }
        }

        if deadline.expired() {
            advance(machine, ChallengeMachineInput::Abandoned);
            return TwoFactorOutcome::DeadlineElapsed;
        }

        info!(stage = "LOGIN-2FA", "waiting for operator code (sms/email/app fallback)");
        let event = tokio::select! {
            line = self.human.request_line(MANUAL_PROMPT) => ManualEvent::Line(line),
            _ = watch_for_ui_advance(session, state, deadline) => ManualEvent::UiAdvanced,
            _ = tokio::time::sleep_until(deadline.end()) => ManualEvent::DeadlineElapsed,
        };

        match event {
            ManualEvent::Line(Some(code)) if !code.is_empty() && !code.eq_ignore_ascii_case("skip") => {
                soft(session.fill(OTC_INPUT, &code).await, "LOGIN-2FA", "fill manual code");
                soft(session.press_key("Enter").await, "LOGIN-2FA", "enter manual code");
                advance(machine, ChallengeMachineInput::CodeSubmitted);
                info!(stage = "LOGIN-2FA", "operator code submitted");
                TwoFactorOutcome::ManualSubmitted
            }
            ManualEvent::Line(Some(_)) => {
                info!(stage = "LOGIN-2FA", "operator skipped code entry");
                advance(machine, ChallengeMachineInput::Abandoned);
                TwoFactorOutcome::ManualSkipped
            }
            ManualEvent::Line(None) => {
                warn!(stage = "LOGIN-2FA", "no operator input channel");
                advance(machine, ChallengeMachineInput::Abandoned);
                TwoFactorOutcome::ManualUnavailable
            }
            ManualEvent::UiAdvanced => {
                warn!(stage = "LOGIN-2FA", "page advanced while waiting; pending code request cancelled");
                advance(machine, ChallengeMachineInput::UiAdvanced);
                TwoFactorOutcome::ManualSkipped
            }
            ManualEvent::DeadlineElapsed => {
                warn!(stage = "LOGIN-2FA", "deadline elapsed waiting for operator code");
                advance(machine, ChallengeMachineInput::Abandoned);
                TwoFactorOutcome::DeadlineElapsed
            }
        }
    }
}

fn advance(machine: &mut ChallengeMachine, input: ChallengeMachineInput) {
    if machine.consume(&input).is_err() {
        warn!(
            stage = "LOGIN-2FA",
            input = ?input,
            stage_was = ?ChallengeStage::from(machine.state()),
            "ignored invalid challenge transition"
        );
        return;
    }
    debug!(stage = "LOGIN-2FA", now = ?ChallengeStage::from(machine.state()), "challenge stage");
}

async fn read_approval_number(session: &dyn BrowserSession, wait: Duration) -> Option<String> {
    session
        .text_of(APPROVAL_NUMBER, wait)
        .await
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty())
}

async fn first_visible(session: &dyn BrowserSession, selectors: &[&'static str]) -> Option<&'static str> {
    for &selector in selectors {
        if session.is_visible(selector).await {
            return Some(selector);
        }
    }
    None
}

async fn click_first_visible(session: &dyn BrowserSession, selectors: &[&'static str]) -> bool {
    match first_visible(session, selectors).await {
        Some(selector) => session.click(selector).await.is_ok(),
        None => false,
    }
}

/// Find a code input, revealing it through the alternate-method picker if needed.
async fn ensure_totp_input(session: &dyn BrowserSession, deadline: &Deadline) -> Option<&'static str> {
    if let Some(selector) = first_visible(session, TOTP_INPUT_SELECTORS).await {
        return Some(selector);
    }

    for _ in 0..TOTP_REVEAL_ROUNDS {
        let mut acted = click_first_visible(session, TOTP_ALT_OPTION_SELECTORS).await;
        if !acted {
            acted = click_first_visible(session, TOTP_CHALLENGE_SELECTORS).await;
        }
        if acted {
            deadline.pause(TOTP_REVEAL_SETTLE).await;
        }

        if let Some(selector) = first_visible(session, TOTP_INPUT_SELECTORS).await {
            return Some(selector);
        }
        if !acted {
            break;
        }
    }
    None
}

/// Resolves once the code field leaves the page.
async fn watch_for_ui_advance(
    session: &dyn BrowserSession,
    state: &mut LoginAttemptState,
    deadline: &Deadline,
) {
    loop {
        tokio::time::sleep(MANUAL_POLL_INTERVAL).await;
        dismiss_prompts(session, state, DismissContext::Challenge, deadline).await;
        if !session.wait_for_visible(OTC_INPUT, MANUAL_FIELD_PROBE).await {
            return;
        }
    }
}
