//! Account lock at each checkpoint.

use super::harness::{credential, Effect, Fixture, ScriptedBrowser, EMAIL};
use super::password_page;
use crate::credential_input::{EMAIL_INPUT, PASSWORD_INPUT};
use crate::error::AuthError;
use crate::portal::{LOCK_MARKER, PORTAL_ROOT_MARKERS};
use crate::two_factor::{APPROVAL_NUMBER, OTC_INPUT};

fn assert_locked(err: &AuthError) {
    match err {
        AuthError::LockedAccount { account } => assert_eq!(account, EMAIL),
        other => panic!("expected LockedAccount, got {other:?}"),
    }
    assert!(err.is_fatal_for_account());
}

#[tokio::test(start_paused = true)]
async fn lock_on_entry_stops_before_credentials() {
    let fixture = Fixture::new();
    let auth = fixture.authenticator();
    let browser = ScriptedBrowser::desktop();
    password_page(&browser);
    browser.show(LOCK_MARKER);

    let err = auth.login(&browser, &credential()).await.unwrap_err();

    assert_locked(&err);
    assert!(browser.filled(EMAIL_INPUT).is_empty());
    assert!(!browser.probed(APPROVAL_NUMBER));
    assert!(fixture.notifier.alerts().is_empty());
    assert!(!auth.is_standby_active());
    assert!(fixture.store.saved().is_empty());
}

#[tokio::test(start_paused = true)]
async fn lock_after_password_skips_challenge_and_portal() {
    let fixture = Fixture::new();
    let auth = fixture.authenticator();
    let browser = ScriptedBrowser::desktop();
    password_page(&browser);
    browser.on_fill(PASSWORD_INPUT, vec![Effect::Show(LOCK_MARKER)]);

    let err = auth.login(&browser, &credential()).await.unwrap_err();

    assert_locked(&err);
    assert!(!browser.probed(APPROVAL_NUMBER));
    assert!(!browser.probed(OTC_INPUT));
    assert!(!browser.probed(PORTAL_ROOT_MARKERS[7]));
    assert!(fixture.notifier.alerts().is_empty());
    assert!(auth.standby_reason().is_none());
}

#[tokio::test(start_paused = true)]
async fn lock_after_challenge_is_still_fatal() {
    let fixture = Fixture::new();
    let auth = fixture.authenticator();
    let browser = ScriptedBrowser::desktop();
    browser
        .show(EMAIL_INPUT)
        .show(OTC_INPUT)
        .on_fill(OTC_INPUT, vec![Effect::Show(LOCK_MARKER)]);

    let credential = credential().with_totp_secret(super::harness::TOTP_SECRET);
    let err = auth.login(&browser, &credential).await.unwrap_err();

    assert_locked(&err);
    assert_eq!(fixture.codes.secrets().len(), 1);
    assert!(!browser.probed(PORTAL_ROOT_MARKERS[7]));
}
