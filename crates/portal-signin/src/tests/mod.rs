//! Scenario tests for the sign-in flow.
//!
//! All scenarios run on paused tokio time against a scripted page.
//!
//! - `harness.rs`      - ScriptedBrowser, collaborator fakes, Fixture
//! - `password.rs`     - Password sign-in, session reuse, persistence
//! - `deadline.rs`     - Portal wait bound and the single fallback navigation
//! - `lock.rs`         - Account lock at each checkpoint
//! - `incidents.rs`    - Recovery mismatch, sign-in block, standby
//! - `two_factor.rs`   - One-time codes and authenticator push
//! - `manual.rs`       - Operator code entry raced against the page
//! - `oauth.rs`        - Mobile token authorization
//! - `dialogs.rs`      - Passkey / keep-signed-in dismissal
//! - `worker.rs`       - Account loop and standby between accounts
//! - `persistence.rs`  - Cookie store on disk

mod deadline;
mod dialogs;
mod lock;
mod password;
mod persistence;

use crate::credential_input::{EMAIL_INPUT, PASSWORD_INPUT, SUBMIT_BUTTON};
use crate::portal::{
    PORTAL_HOME_URL, SECONDARY_SIGNED_IN_MARKER, SECONDARY_SIGNIN_URL,
};
use harness::{Effect, ScriptedBrowser};

/// Marker shown once the portal renders.
pub(crate) const PORTAL_MARKER: &str = "#more-activities";

/// A page that asks for email then password; typing the password lands on the portal.
pub(crate) fn password_page(browser: &ScriptedBrowser) {
    browser
        .show(EMAIL_INPUT)
        .show(SUBMIT_BUTTON)
        .show(PASSWORD_INPUT)
        .on_fill(
            PASSWORD_INPUT,
            vec![Effect::SetUrl(PORTAL_HOME_URL), Effect::Show(PORTAL_MARKER)],
        );
    secondary_site_signed_in(browser);
}

/// The secondary site answers with its signed-in root.
pub(crate) fn secondary_site_signed_in(browser: &ScriptedBrowser) {
    browser.on_navigate(
        SECONDARY_SIGNIN_URL,
        vec![
            Effect::SetUrl("https://www.bing.com/"),
            Effect::Show(SECONDARY_SIGNED_IN_MARKER),
        ],
    );
}
