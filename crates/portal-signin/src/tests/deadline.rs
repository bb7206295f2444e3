//! Portal wait bound and the single fallback navigation.

use super::harness::{credential, Effect, Fixture, ScriptedBrowser};
use super::{secondary_site_signed_in, PORTAL_MARKER};
use crate::error::AuthError;
use crate::orchestrator::LoginOutcome;
use crate::portal::{NAVIGATION_TIMEOUT, PORTAL_HOME_URL};
use std::time::Duration;
use tokio::time::Instant;

#[tokio::test(start_paused = true)]
async fn missing_portal_root_gives_up_after_one_fallback() {
    let fixture = Fixture::new().with_deadline_ms(10_000);
    let auth = fixture.authenticator();
    let browser = ScriptedBrowser::desktop();

    let started = Instant::now();
    let err = auth.login(&browser, &credential()).await.unwrap_err();
    let elapsed = started.elapsed();

    assert!(matches!(err, AuthError::PortalUnreachable));
    assert_eq!(browser.navigations_to(PORTAL_HOME_URL), 1);
    assert!(
        elapsed <= Duration::from_secs(10) + NAVIGATION_TIMEOUT,
        "took {elapsed:?}"
    );
    assert!(elapsed >= Duration::from_secs(10));
    assert!(fixture.store.saved().is_empty());
    // The manual channel is never consulted once the deadline has passed.
    assert_eq!(fixture.input.prompts(), 0);
}

#[tokio::test(start_paused = true)]
async fn fallback_navigation_can_still_reach_portal() {
    let fixture = Fixture::new().with_deadline_ms(10_000);
    let auth = fixture.authenticator();
    let browser = ScriptedBrowser::desktop();
    browser.on_navigate(PORTAL_HOME_URL, vec![Effect::Show(PORTAL_MARKER)]);
    secondary_site_signed_in(&browser);

    let outcome = auth.login(&browser, &credential()).await.unwrap();

    assert_eq!(outcome, LoginOutcome::SignedIn);
    assert_eq!(browser.navigations_to(PORTAL_HOME_URL), 1);
}

#[tokio::test(start_paused = true)]
async fn deadline_override_is_clamped_to_minimum() {
    let fixture = Fixture::new().with_deadline_ms(1);
    assert_eq!(fixture.config.login_deadline(), Duration::from_secs(10));

    let auth = fixture.authenticator();
    let browser = ScriptedBrowser::desktop();
    let started = Instant::now();
    let _ = auth.login(&browser, &credential()).await;

    assert!(started.elapsed() <= Duration::from_secs(10) + NAVIGATION_TIMEOUT);
}
