//! Email and password entry, including the localized "use your password"
//! detours some sign-in variants take.

use crate::browser::{soft, BrowserSession};
use crate::credentials::AccountCredential;
use crate::deadline::Deadline;
use crate::incident::{IncidentDetector, SecurityIncident};
use crate::standby::{StandbyReason, StandbyState};
use std::time::Duration;
use tracing::{debug, info, warn};

pub(crate) const EMAIL_INPUT: &str = r#"input[type="email"]"#;
pub(crate) const PASSWORD_INPUT: &str = r#"input[type="password"]"#;
pub(crate) const SUBMIT_BUTTON: &str = r#"button[type="submit"]"#;
const PREFILLED_ACCOUNT: &str = "#userDisplayName";
pub(crate) const SWITCH_TO_PASSWORD_BUTTON: &str = "#idA_PWD_SwitchToPassword";
const USE_PASSWORD_LINK: &str = r#"xpath=//span[@role="button" and (contains(translate(normalize-space(.),"ABCDEFGHIJKLMNOPQRSTUVWXYZ","abcdefghijklmnopqrstuvwxyz"),"use your password") or contains(translate(normalize-space(.),"ABCDEFGHIJKLMNOPQRSTUVWXYZ","abcdefghijklmnopqrstuvwxyz"),"utilisez votre mot de passe"))]"#;

pub(crate) const OTHER_WAYS_SELECTORS: &[&str] = &[
    r#"span[role="button"]:has-text("Other ways to sign in")"#,
    r#"span:has-text("Other ways to sign in")"#,
    r#"button:has-text("Other ways to sign in")"#,
    r#"a:has-text("Other ways to sign in")"#,
    r#"div[role="button"]:has-text("Other ways to sign in")"#,
];
pub(crate) const USE_PASSWORD_SELECTORS: &[&str] = &[
    r#"span[role="button"]:has-text("Use your password")"#,
    r#"span:has-text("Use your password")"#,
    r#"button:has-text("Use your password")"#,
    r#"button:has-text("Password")"#,
    r#"a:has-text("Use your password")"#,
    r#"div[role="button"]:has-text("Use your password")"#,
    r#"div[role="button"]:has-text("Password")"#,
];

const EMAIL_FIELD_WAIT: Duration = Duration::from_millis(5000);
const PREFILLED_PROBE: Duration = Duration::from_millis(1500);
const SUBMIT_WAIT: Duration = Duration::from_millis(2000);
const SWITCH_BUTTON_PROBE: Duration = Duration::from_millis(1500);
const PASSWORD_FIELD_WAIT: Duration = Duration::from_millis(4000);
const PASSWORD_AFTER_DETOUR_WAIT: Duration = Duration::from_millis(3000);
const OTHER_WAYS_PROBE: Duration = Duration::from_millis(1000);
const USE_PASSWORD_PROBE: Duration = Duration::from_millis(1500);
const DETOUR_SETTLE: Duration = Duration::from_millis(2000);
const SWITCH_SETTLE: Duration = Duration::from_millis(1000);
const LINK_SETTLE: Duration = Duration::from_millis(800);

/// How the password step ended.
#[derive(Debug)]
pub(crate) enum PasswordStep {
    Submitted,
    /// The page shows block messaging; nothing was typed.
    Blocked(SecurityIncident),
    /// Standby engaged elsewhere in the process; nothing was typed.
    Standby(StandbyReason),
    /// No password field ever appeared; a second factor is asking instead.
    ChallengeRequired,
}

/// Type the account email unless the provider already shows it.
pub(crate) async fn enter_email(session: &dyn BrowserSession, email: &str, deadline: &Deadline) {
    if !session
        .wait_for_visible(EMAIL_INPUT, deadline.cap(EMAIL_FIELD_WAIT))
        .await
    {
        warn!(stage = "LOGIN", "email field not present");
        return;
    }

    if session
        .wait_for_visible(PREFILLED_ACCOUNT, deadline.cap(PREFILLED_PROBE))
        .await
    {
        info!(stage = "LOGIN", "email already prefilled");
    } else {
        soft(session.fill(EMAIL_INPUT, "").await, "LOGIN", "clear email");
        soft(session.fill(EMAIL_INPUT, email).await, "LOGIN", "fill email");
    }

    submit_if_present(session, deadline, "email submitted").await;
}

/// Follow a localized "use your password" link when one is offered.
pub(crate) async fn switch_to_password_link(session: &dyn BrowserSession, deadline: &Deadline) {
    if !session.is_visible(USE_PASSWORD_LINK).await {
        return;
    }
    if soft(session.click(USE_PASSWORD_LINK).await, "LOGIN", "use password link") {
        deadline.pause(LINK_SETTLE).await;
        info!(stage = "LOGIN", "clicked use-your-password link");
    }
}

/// Submit the password, or report that a second factor is required.
///
/// Standby and block messaging are checked right before the password is
/// typed and before handing off to two-factor.
pub(crate) async fn enter_password_or_challenge(
    session: &dyn BrowserSession,
    credential: &AccountCredential,
    detector: &IncidentDetector,
    standby: &StandbyState,
    deadline: &Deadline,
) -> PasswordStep {
    if session
        .wait_for_visible(SWITCH_TO_PASSWORD_BUTTON, deadline.cap(SWITCH_BUTTON_PROBE))
        .await
        && soft(
            session.click(SWITCH_TO_PASSWORD_BUTTON).await,
            "LOGIN",
            "switch to password",
        )
    {
        deadline.pause(SWITCH_SETTLE).await;
    }

    if session
        .wait_for_visible(PASSWORD_INPUT, deadline.cap(PASSWORD_FIELD_WAIT))
        .await
    {
        return submit_unless_flagged(session, credential, detector, standby, deadline).await;
    }

    info!(stage = "LOGIN", "no password field; trying the get-a-code detour");
    if other_ways_to_sign_in(session, deadline).await
        && session
            .wait_for_visible(PASSWORD_INPUT, deadline.cap(PASSWORD_AFTER_DETOUR_WAIT))
            .await
    {
        info!(stage = "LOGIN", "password field found after other-ways detour");
        return submit_unless_flagged(session, credential, detector, standby, deadline).await;
    }

    if let Some(step) = flagged(session, credential, detector, standby, deadline).await {
        return step;
    }
    warn!(stage = "LOGIN", "password field absent; handing off to two-factor");
    PasswordStep::ChallengeRequired
}

async fn submit_unless_flagged(
    session: &dyn BrowserSession,
    credential: &AccountCredential,
    detector: &IncidentDetector,
    standby: &StandbyState,
    deadline: &Deadline,
) -> PasswordStep {
    if let Some(step) = flagged(session, credential, detector, standby, deadline).await {
        return step;
    }
    type_password(session, &credential.password, deadline).await;
    PasswordStep::Submitted
}

/// `Some` when nothing more may be submitted for this attempt.
///
/// Standby is read after the heading scan with no await before the caller
/// types, so an incident raised by a sibling attempt meanwhile is honored.
async fn flagged(
    session: &dyn BrowserSession,
    credential: &AccountCredential,
    detector: &IncidentDetector,
    standby: &StandbyState,
    deadline: &Deadline,
) -> Option<PasswordStep> {
    if let Some(incident) = detector
        .detect_sign_in_blocked(session, &credential.email, deadline)
        .await
    {
        return Some(PasswordStep::Blocked(incident));
    }
    let reason = standby.reason()?;
    warn!(
        stage = "LOGIN",
        account = %credential.email,
        reason = reason.as_str(),
        "standby active; password withheld"
    );
    Some(PasswordStep::Standby(reason))
}

async fn type_password(session: &dyn BrowserSession, password: &str, deadline: &Deadline) {
    soft(session.fill(PASSWORD_INPUT, "").await, "LOGIN", "clear password");
    soft(session.fill(PASSWORD_INPUT, password).await, "LOGIN", "fill password");
    submit_if_present(session, deadline, "password submitted").await;
}

async fn submit_if_present(session: &dyn BrowserSession, deadline: &Deadline, done: &'static str) {
    if !session
        .wait_for_visible(SUBMIT_BUTTON, deadline.cap(SUBMIT_WAIT))
        .await
    {
        debug!(stage = "LOGIN", "no submit control; page may auto-advance");
        return;
    }
    if soft(session.click(SUBMIT_BUTTON).await, "LOGIN", "submit") {
        info!(stage = "LOGIN", "{}", done);
    }
}

/// "Other ways to sign in" then "Use your password". True if both were clicked.
async fn other_ways_to_sign_in(session: &dyn BrowserSession, deadline: &Deadline) -> bool {
    if !click_first_waiting(session, OTHER_WAYS_SELECTORS, OTHER_WAYS_PROBE, deadline).await {
        return false;
    }
    info!(stage = "LOGIN", "clicked other ways to sign in");
    deadline.pause(DETOUR_SETTLE).await;

    if !click_first_waiting(session, USE_PASSWORD_SELECTORS, USE_PASSWORD_PROBE, deadline).await {
        return false;
    }
    info!(stage = "LOGIN", "clicked use your password");
    deadline.pause(DETOUR_SETTLE).await;
    true
}

/// Wait up to `probe` for each selector in turn and click the first that shows.
async fn click_first_waiting(
    session: &dyn BrowserSession,
    selectors: &[&str],
    probe: Duration,
    deadline: &Deadline,
) -> bool {
    for selector in selectors {
        if session
            .wait_for_visible(selector, deadline.cap(probe))
            .await
        {
            return soft(session.click(selector).await, "LOGIN", "detour control");
        }
    }
    false
}
