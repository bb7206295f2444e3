//! Password sign-in, session reuse and persistence.

use super::harness::{credential, Effect, Fixture, ScriptedBrowser, EMAIL, PASSWORD};
use super::{password_page, secondary_site_signed_in, PORTAL_MARKER};
use crate::browser::DeviceClass;
use crate::credential_input::{
    EMAIL_INPUT, OTHER_WAYS_SELECTORS, PASSWORD_INPUT, SUBMIT_BUTTON, USE_PASSWORD_SELECTORS,
};
use crate::credentials::LoginAttemptState;
use crate::error::{AuthError, BrowserError};
use crate::orchestrator::LoginOutcome;
use crate::portal::{CREDENTIAL_TYPE_PATTERN, ENTRY_URL, PORTAL_HOME_URL, SIGNED_IN_MARKER};

#[tokio::test(start_paused = true)]
async fn password_flow_reaches_portal_and_saves_session() {
    let fixture = Fixture::new();
    let auth = fixture.authenticator();
    let browser = ScriptedBrowser::desktop();
    password_page(&browser);

    let outcome = auth.login(&browser, &credential()).await.unwrap();

    assert_eq!(outcome, LoginOutcome::SignedIn);
    assert_eq!(browser.filled(EMAIL_INPUT), vec!["".to_string(), EMAIL.to_string()]);
    assert_eq!(
        browser.filled(PASSWORD_INPUT),
        vec!["".to_string(), PASSWORD.to_string()]
    );
    assert_eq!(fixture.store.saved(), vec![(EMAIL.to_string(), DeviceClass::Desktop)]);
    assert_eq!(browser.navigations_to(ENTRY_URL), 1);
    assert_eq!(browser.navigations_to(PORTAL_HOME_URL), 0);
    assert!(fixture.notifier.alerts().is_empty());
    assert!(!auth.is_standby_active());
}

#[tokio::test(start_paused = true)]
async fn fido_negotiation_is_neutralized_before_navigation() {
    let fixture = Fixture::new();
    let auth = fixture.authenticator();
    let browser = ScriptedBrowser::desktop();
    password_page(&browser);

    auth.login(&browser, &credential()).await.unwrap();

    assert_eq!(browser.activity().intercepts, vec![CREDENTIAL_TYPE_PATTERN.to_string()]);
    let rewritten = browser
        .intercept_body(r#"{"username":"kevin@x.com","isFidoSupported":true}"#)
        .unwrap();
    let body: serde_json::Value = serde_json::from_str(&rewritten).unwrap();
    assert_eq!(body["isFidoSupported"], false);
    assert_eq!(body["username"], "kevin@x.com");
    assert_eq!(browser.intercept_body("not json"), None);
}

#[tokio::test(start_paused = true)]
async fn existing_session_skips_credentials() {
    let fixture = Fixture::new();
    let auth = fixture.authenticator();
    let browser = ScriptedBrowser::desktop();
    browser.show(SIGNED_IN_MARKER);
    secondary_site_signed_in(&browser);

    let outcome = auth.login(&browser, &credential()).await.unwrap();

    assert_eq!(outcome, LoginOutcome::SignedIn);
    assert!(browser.activity().fills.is_empty());
    assert_eq!(fixture.store.saved().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn mobile_accepts_secondary_root_without_marker() {
    let fixture = Fixture::new();
    let auth = fixture.authenticator();
    let browser = ScriptedBrowser::new(DeviceClass::Mobile);
    browser.show(SIGNED_IN_MARKER).on_navigate(
        crate::portal::SECONDARY_SIGNIN_URL,
        vec![Effect::SetUrl("https://www.bing.com/")],
    );

    let outcome = auth.login(&browser, &credential()).await.unwrap();

    assert_eq!(outcome, LoginOutcome::SignedIn);
    assert_eq!(fixture.store.saved(), vec![(EMAIL.to_string(), DeviceClass::Mobile)]);
}

#[tokio::test(start_paused = true)]
async fn persistence_failure_fails_login() {
    let fixture = Fixture::new();
    fixture.store.fail_writes();
    let auth = fixture.authenticator();
    let browser = ScriptedBrowser::desktop();
    password_page(&browser);

    let err = auth.login(&browser, &credential()).await.unwrap_err();

    assert!(matches!(err, AuthError::Session(_)));
    assert!(!err.is_fatal_for_account());
}

#[tokio::test(start_paused = true)]
async fn unreachable_entry_point_is_transient() {
    let fixture = Fixture::new();
    let auth = fixture.authenticator();
    let browser = ScriptedBrowser::desktop();
    browser.fail_navigation();

    let err = auth.login(&browser, &credential()).await.unwrap_err();

    assert!(matches!(
        err,
        AuthError::Browser(BrowserError::Navigation { .. })
    ));
    assert!(err.is_transient());
    assert!(browser.activity().fills.is_empty());
}

#[tokio::test(start_paused = true)]
async fn password_flow_never_arms_a_secret() {
    let fixture = Fixture::new();
    let auth = fixture.authenticator();
    let browser = ScriptedBrowser::desktop();
    password_page(&browser);
    let mut state = LoginAttemptState::new();

    let credential = credential().with_totp_secret(super::harness::TOTP_SECRET);
    auth.login_with_state(&browser, &credential, &mut state)
        .await
        .unwrap();

    assert!(state.active_totp_secret().is_none());
    assert!(fixture.codes.secrets().is_empty());
}

#[tokio::test(start_paused = true)]
async fn password_reached_through_other_ways_detour() {
    let fixture = Fixture::new();
    let auth = fixture.authenticator();
    let browser = ScriptedBrowser::desktop();
    browser
        .show(EMAIL_INPUT)
        .show(SUBMIT_BUTTON)
        .show(OTHER_WAYS_SELECTORS[0])
        .on_click(
            OTHER_WAYS_SELECTORS[0],
            vec![Effect::Show(USE_PASSWORD_SELECTORS[0])],
        )
        .on_click(USE_PASSWORD_SELECTORS[0], vec![Effect::Show(PASSWORD_INPUT)])
        .on_fill(
            PASSWORD_INPUT,
            vec![Effect::SetUrl(PORTAL_HOME_URL), Effect::Show(PORTAL_MARKER)],
        );
    secondary_site_signed_in(&browser);

    let outcome = auth.login(&browser, &credential()).await.unwrap();

    assert_eq!(outcome, LoginOutcome::SignedIn);
    assert_eq!(browser.clicks_on(OTHER_WAYS_SELECTORS[0]), 1);
    assert_eq!(browser.filled(PASSWORD_INPUT).last().map(String::as_str), Some(PASSWORD));
    assert_eq!(fixture.store.saved().len(), 1);
}
