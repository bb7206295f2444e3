//! Transient prompt recognition and dismissal (passkey upsell, "keep me signed in").

use crate::browser::BrowserSession;
use crate::credentials::LoginAttemptState;
use crate::deadline::Deadline;
use regex::Regex;
use std::sync::LazyLock;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};

pub(crate) const SECONDARY_BUTTON: &str = r#"button[data-testid="secondaryButton"]"#;
pub(crate) const PRIMARY_BUTTON: &str = r#"button[data-testid="primaryButton"]"#;
pub(crate) const DIALOG_TITLE: &str = r#"[data-testid="title"]"#;
pub(crate) const BIOMETRIC_VIDEO: &str = r#"[data-testid="biometricVideo"]"#;
pub(crate) const KMSI_VIDEO: &str = r#"[data-testid="kmsiVideo"]"#;
const SKIP_TEXT_BUTTON: &str = r#"xpath=//button[contains(normalize-space(.),"Skip for now")]"#;
const CLOSE_BUTTON: &str = "#close-button";

const VIDEO_PROBE: Duration = Duration::from_millis(500);
const BUTTON_PROBE: Duration = Duration::from_millis(500);
const KMSI_PROBE: Duration = Duration::from_millis(400);

static PASSKEY_TITLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)sign in faster|passkey|fingerprint|face|pin").expect("passkey title regex")
});
static SKIP_FOR_NOW: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)skip for now").expect("skip regex"));

/// Where the dismisser is running. Only the portal wait counts empty polls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DismissContext {
    Portal,
    OAuth,
    Challenge,
}

/// Passkey upsell heuristics, evaluated in order; the first that applies wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PasskeyRule {
    /// Promotional biometric video present: take the secondary action.
    BiometricVideo,
    /// Dialog title mentions passkeys and a secondary action exists.
    TitleText,
    /// Button pair whose secondary reads "skip for now".
    SkipButtonText,
    /// Any button with the "Skip for now" label.
    SkipTextFallback,
    /// Generic close control.
    CloseControl,
}

pub const PASSKEY_RULES: [PasskeyRule; 5] = [
    PasskeyRule::BiometricVideo,
    PasskeyRule::TitleText,
    PasskeyRule::SkipButtonText,
    PasskeyRule::SkipTextFallback,
    PasskeyRule::CloseControl,
];

impl PasskeyRule {
    pub fn label(&self) -> &'static str {
        match self {
            PasskeyRule::BiometricVideo => "video heuristic",
            PasskeyRule::TitleText => "title heuristic",
            PasskeyRule::SkipButtonText => "secondary button text",
            PasskeyRule::SkipTextFallback => "text fallback",
            PasskeyRule::CloseControl => "close button",
        }
    }

    /// The control to click when this rule applies to the current page.
    async fn target(&self, session: &dyn BrowserSession, deadline: &Deadline) -> Option<&'static str> {
        match self {
            PasskeyRule::BiometricVideo => {
                let video = session
                    .wait_for_visible(BIOMETRIC_VIDEO, deadline.cap(VIDEO_PROBE))
                    .await;
                (video && session.is_visible(SECONDARY_BUTTON).await).then_some(SECONDARY_BUTTON)
            }
            PasskeyRule::TitleText => {
                let title = session
                    .text_of(DIALOG_TITLE, deadline.cap(BUTTON_PROBE))
                    .await
                    .unwrap_or_default();
                if !is_passkey_title(&title) {
                    return None;
                }
                session
                    .wait_for_visible(SECONDARY_BUTTON, deadline.cap(BUTTON_PROBE))
                    .await
                    .then_some(SECONDARY_BUTTON)
            }
            PasskeyRule::SkipButtonText => {
                let secondary = session
                    .wait_for_visible(SECONDARY_BUTTON, deadline.cap(BUTTON_PROBE))
                    .await;
                if !secondary || !session.is_visible(PRIMARY_BUTTON).await {
                    return None;
                }
                let text = session
                    .text_of(SECONDARY_BUTTON, Duration::ZERO)
                    .await
                    .unwrap_or_default();
                SKIP_FOR_NOW.is_match(&text).then_some(SECONDARY_BUTTON)
            }
            PasskeyRule::SkipTextFallback => session
                .is_visible(SKIP_TEXT_BUTTON)
                .await
                .then_some(SKIP_TEXT_BUTTON),
            PasskeyRule::CloseControl => {
                session.is_visible(CLOSE_BUTTON).await.then_some(CLOSE_BUTTON)
            }
        }
    }
}

/// Whether a dialog title reads like a passkey/biometric upsell.
pub fn is_passkey_title(title: &str) -> bool {
    PASSKEY_TITLE.is_match(title.trim())
}

/// Run every dismissal heuristic once. Returns true if anything was clicked.
pub(crate) async fn dismiss_prompts(
    session: &dyn BrowserSession,
    state: &mut LoginAttemptState,
    context: DismissContext,
    deadline: &Deadline,
) -> bool {
    let mut dismissed = false;

    for rule in PASSKEY_RULES {
        let Some(target) = rule.target(session, deadline).await else {
            continue;
        };
        if session.click(target).await.is_ok() {
            dismissed = true;
            if state.mark_passkey_dismissed() {
                info!(stage = "LOGIN-PASSKEY", reason = rule.label(), "dismissed passkey prompt");
            }
            break;
        }
        debug!(stage = "LOGIN-PASSKEY", selector = target, "passkey control vanished before click");
    }

    if session
        .wait_for_visible(KMSI_VIDEO, deadline.cap(KMSI_PROBE))
        .await
        && session.click(PRIMARY_BUTTON).await.is_ok()
    {
        dismissed = true;
        info!(stage = "LOGIN-KMSI", "accepted keep-me-signed-in prompt");
    }

    if dismissed {
        state.record_dismissal();
    } else if context == DismissContext::Portal {
        if let Some(polls) = state.record_no_prompt(Instant::now()) {
            info!(stage = "LOGIN-NO-PROMPT", polls, "no dialogs");
        }
    }

    dismissed
}
