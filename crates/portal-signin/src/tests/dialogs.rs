//! Passkey upsell and keep-signed-in prompts.

use super::harness::{Effect, ScriptedBrowser};
use crate::credentials::LoginAttemptState;
use crate::deadline::Deadline;
use crate::dialogs::{
    dismiss_prompts, DismissContext, BIOMETRIC_VIDEO, DIALOG_TITLE, KMSI_VIDEO, PRIMARY_BUTTON,
    SECONDARY_BUTTON,
};
use std::time::Duration;

fn deadline() -> Deadline {
    Deadline::after(Duration::from_secs(60))
}

#[tokio::test(start_paused = true)]
async fn biometric_upsell_is_declined() {
    let browser = ScriptedBrowser::desktop();
    browser
        .show(BIOMETRIC_VIDEO)
        .show(SECONDARY_BUTTON)
        .on_click(
            SECONDARY_BUTTON,
            vec![Effect::Hide(BIOMETRIC_VIDEO), Effect::Hide(SECONDARY_BUTTON)],
        );
    let mut state = LoginAttemptState::new();

    assert!(dismiss_prompts(&browser, &mut state, DismissContext::Portal, &deadline()).await);
    assert_eq!(browser.clicks_on(SECONDARY_BUTTON), 1);
    assert!(state.passkey_dismissed_once());

    assert!(!dismiss_prompts(&browser, &mut state, DismissContext::Portal, &deadline()).await);
    assert_eq!(browser.clicks_on(SECONDARY_BUTTON), 1);
}

#[tokio::test(start_paused = true)]
async fn passkey_title_triggers_secondary_action() {
    let browser = ScriptedBrowser::desktop();
    browser
        .set_text(DIALOG_TITLE, "Sign in faster with your face, fingerprint, or PIN")
        .show(SECONDARY_BUTTON);
    let mut state = LoginAttemptState::new();

    assert!(dismiss_prompts(&browser, &mut state, DismissContext::OAuth, &deadline()).await);
    assert_eq!(browser.clicks_on(SECONDARY_BUTTON), 1);
    assert_eq!(browser.clicks_on(PRIMARY_BUTTON), 0);
}

#[tokio::test(start_paused = true)]
async fn skip_for_now_button_is_clicked() {
    let browser = ScriptedBrowser::desktop();
    browser
        .set_text(SECONDARY_BUTTON, "Skip for now")
        .show(PRIMARY_BUTTON);
    let mut state = LoginAttemptState::new();

    assert!(dismiss_prompts(&browser, &mut state, DismissContext::Challenge, &deadline()).await);
    assert_eq!(browser.clicks_on(SECONDARY_BUTTON), 1);
    assert_eq!(browser.clicks_on(PRIMARY_BUTTON), 0);
}

#[tokio::test(start_paused = true)]
async fn keep_signed_in_is_accepted() {
    let browser = ScriptedBrowser::desktop();
    browser
        .show(KMSI_VIDEO)
        .show(PRIMARY_BUTTON)
        .on_click(PRIMARY_BUTTON, vec![Effect::Hide(KMSI_VIDEO)]);
    let mut state = LoginAttemptState::new();

    assert!(dismiss_prompts(&browser, &mut state, DismissContext::Portal, &deadline()).await);
    assert_eq!(browser.clicks_on(PRIMARY_BUTTON), 1);
    assert!(!state.passkey_dismissed_once());
}

#[tokio::test(start_paused = true)]
async fn only_portal_polls_count_as_quiet() {
    let browser = ScriptedBrowser::desktop();
    let mut state = LoginAttemptState::new();

    dismiss_prompts(&browser, &mut state, DismissContext::Portal, &deadline()).await;
    dismiss_prompts(&browser, &mut state, DismissContext::Portal, &deadline()).await;
    assert_eq!(state.consecutive_no_prompt_polls(), 2);

    dismiss_prompts(&browser, &mut state, DismissContext::OAuth, &deadline()).await;
    dismiss_prompts(&browser, &mut state, DismissContext::Challenge, &deadline()).await;
    assert_eq!(state.consecutive_no_prompt_polls(), 2);

    browser
        .show(KMSI_VIDEO)
        .show(PRIMARY_BUTTON)
        .on_click(PRIMARY_BUTTON, vec![Effect::Hide(KMSI_VIDEO)]);
    dismiss_prompts(&browser, &mut state, DismissContext::Portal, &deadline()).await;
    assert_eq!(state.consecutive_no_prompt_polls(), 0);
}
