//! Fixed locations, selectors and timeouts of the rewards portal and its
//! identity provider.

use std::time::Duration;
use url::Url;

/// Where every login attempt starts.
pub const ENTRY_URL: &str = "https://www.bing.com/rewards/dashboard";
/// Explicit "go home" target used once when the portal marker never shows.
pub const PORTAL_HOME_URL: &str = "https://rewards.bing.com/";
pub const PORTAL_HOST: &str = "rewards.bing.com";
pub const PORTAL_PATHS: &[&str] = &["/", "/dashboard", "/rewardsapp/dashboard"];

/// Upper bound for a single navigation.
pub const NAVIGATION_TIMEOUT: Duration = Duration::from_secs(30);

/// Present when the session is already authenticated on arrival.
pub const SIGNED_IN_MARKER: &str = r#"html[data-role-name="RewardsPortal"]"#;
pub const SIGNED_IN_PROBE: Duration = Duration::from_millis(8000);

/// Portal-root markers, most specific first.
pub const PORTAL_ROOT_MARKERS: &[&str] = &[
    r#"html[data-role-name="RewardsPortal"]"#,
    r#"html[data-role-name*="RewardsPortal"]"#,
    r#"body[data-role-name*="RewardsPortal"]"#,
    r#"[data-role-name*="RewardsPortal"]"#,
    r#"[data-bi-name="rewards-dashboard"]"#,
    r#"main[data-bi-name="dashboard"]"#,
    "#more-activities",
    "#dashboard",
];
pub const PORTAL_ROOT_WAIT: Duration = Duration::from_millis(8000);
pub const PORTAL_ROOT_FALLBACK_WAIT: Duration = Duration::from_millis(6000);
pub const PORTAL_ROOT_POLL: Duration = Duration::from_millis(350);
pub const PORTAL_URL_POLL: Duration = Duration::from_secs(1);

/// Administrative lock landing page.
pub const LOCK_MARKER: &str = "#serviceAbuseLandingTitle";
pub const LOCK_PROBE: Duration = Duration::from_millis(1200);

/// Secondary site whose sign-in is verified after the portal.
pub const SECONDARY_SIGNIN_URL: &str = "https://www.bing.com/fd/auth/signin?action=interactive&provider=windows_live_id&return_url=https%3A%2F%2Fwww.bing.com%2F";
pub const SECONDARY_HOST: &str = "www.bing.com";
pub const SECONDARY_SIGNED_IN_MARKER: &str = "#id_n";
pub const SECONDARY_MARKER_PROBE: Duration = Duration::from_millis(3000);
pub const SECONDARY_PROBES: usize = 5;
pub const SECONDARY_PROBE_PAUSE: Duration = Duration::from_secs(1);

/// Credential-type negotiation endpoint.
pub const CREDENTIAL_TYPE_PATTERN: &str = "**/GetCredentialType.srf*";

pub const OAUTH_CLIENT_ID: &str = "0000000040170455";
pub const OAUTH_AUTHORIZE_URL: &str = "https://login.live.com/oauth20_authorize.srf";
pub const OAUTH_REDIRECT_URL: &str = "https://login.live.com/oauth20_desktop.srf";
pub const OAUTH_TOKEN_URL: &str = "https://login.microsoftonline.com/consumers/oauth2/v2.0/token";
pub const OAUTH_SCOPE: &str = "service::prod.rewardsplatform.microsoft.com::MBI_SSL";
pub const OAUTH_POLL: Duration = Duration::from_secs(1);

/// True when `url` is one of the portal landing pages.
pub fn is_portal_url(url: &Url) -> bool {
    url.host_str() == Some(PORTAL_HOST) && PORTAL_PATHS.contains(&url.path())
}

/// True when `url` is the secondary site's root.
pub fn is_secondary_root(url: &Url) -> bool {
    url.host_str() == Some(SECONDARY_HOST) && url.path() == "/"
}

/// Authorization URL for the mobile token flow.
pub fn authorize_url(state: &str, login_hint: &str) -> Result<Url, url::ParseError> {
    Url::parse_with_params(
        OAUTH_AUTHORIZE_URL,
        &[
            ("response_type", "code"),
            ("client_id", OAUTH_CLIENT_ID),
            ("redirect_uri", OAUTH_REDIRECT_URL),
            ("scope", OAUTH_SCOPE),
            ("state", state),
            ("access_type", "offline_access"),
            ("login_hint", login_hint),
        ],
    )
}

/// What a redirect to the desktop redirect URI carried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OAuthRedirect {
    /// Not on the redirect URI yet.
    Pending,
    /// Redirect reached without a code.
    NoCode,
    Code { code: String, state: Option<String> },
}

/// Inspect the current URL for the authorization redirect.
pub fn parse_oauth_redirect(url: &Url) -> OAuthRedirect {
    let redirect = match Url::parse(OAUTH_REDIRECT_URL) {
        Ok(redirect) => redirect,
        Err(_) => return OAuthRedirect::Pending,
    };
    if url.host_str() != redirect.host_str() || url.path() != redirect.path() {
        return OAuthRedirect::Pending;
    }

    let mut code = None;
    let mut state = None;
    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "code" if !value.is_empty() => code = Some(value.into_owned()),
            "state" => state = Some(value.into_owned()),
            _ => {}
        }
    }
    match code {
        Some(code) => OAuthRedirect::Code { code, state },
        None => OAuthRedirect::NoCode,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_portal_urls() {
        for raw in [
            "https://rewards.bing.com/",
            "https://rewards.bing.com/?form=ML2PCO",
            "https://rewards.bing.com/dashboard",
            "https://rewards.bing.com/rewardsapp/dashboard",
        ] {
            assert!(is_portal_url(&Url::parse(raw).unwrap()), "{raw}");
        }
        for raw in [
            "https://rewards.bing.com/welcome",
            "https://www.bing.com/rewards/dashboard",
            "https://login.live.com/",
        ] {
            assert!(!is_portal_url(&Url::parse(raw).unwrap()), "{raw}");
        }
    }

    #[test]
    fn test_secondary_root() {
        assert!(is_secondary_root(&Url::parse("https://www.bing.com/?toWww=1").unwrap()));
        assert!(!is_secondary_root(
            &Url::parse("https://www.bing.com/fd/auth/signin").unwrap()
        ));
    }

    #[test]
    fn test_authorize_url_params() {
        let url = authorize_url("00ff", "a@x.com").unwrap();
        let pairs: Vec<(String, String)> = url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        assert!(pairs.contains(&("response_type".into(), "code".into())));
        assert!(pairs.contains(&("state".into(), "00ff".into())));
        assert!(pairs.contains(&("login_hint".into(), "a@x.com".into())));
        assert!(pairs.contains(&("scope".into(), OAUTH_SCOPE.into())));
        assert_eq!(url.host_str(), Some("login.live.com"));
    }

    #[test]
    fn test_parse_redirect() {
        let pending = Url::parse("https://login.live.com/ppsecure/post.srf").unwrap();
        assert_eq!(parse_oauth_redirect(&pending), OAuthRedirect::Pending);

        let bare = Url::parse("https://login.live.com/oauth20_desktop.srf?lc=1033").unwrap();
        assert_eq!(parse_oauth_redirect(&bare), OAuthRedirect::NoCode);

        let done =
            Url::parse("https://login.live.com/oauth20_desktop.srf?code=M.C1&state=ab").unwrap();
        assert_eq!(
            parse_oauth_redirect(&done),
            OAuthRedirect::Code {
                code: "M.C1".into(),
                state: Some("ab".into())
            }
        );
    }
}
