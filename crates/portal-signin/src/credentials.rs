//! Account credentials and per-attempt mutable state.

use serde::Deserialize;
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;

/// Quiet period between two "no dialog" heartbeat lines.
const NO_PROMPT_LOG_INTERVAL: Duration = Duration::from_secs(10);
/// The no-prompt counter wraps after this many polls.
const NO_PROMPT_RESET_AFTER: u32 = 50;

/// Immutable input to one login attempt.
#[derive(Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountCredential {
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub totp_secret: Option<String>,
    #[serde(default, alias = "recoveryEmail")]
    pub recovery_email_hint: Option<String>,
}

impl AccountCredential {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
            totp_secret: None,
            recovery_email_hint: None,
        }
    }

    pub fn with_totp_secret(mut self, secret: impl Into<String>) -> Self {
        self.totp_secret = Some(secret.into());
        self
    }

    pub fn with_recovery_email(mut self, recovery: impl Into<String>) -> Self {
        self.recovery_email_hint = Some(recovery.into());
        self
    }
}

impl fmt::Debug for AccountCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccountCredential")
            .field("email", &self.email)
            .field("password", &"[REDACTED]")
            .field("totp_secret", &self.totp_secret.as_ref().map(|_| "[REDACTED]"))
            .field("recovery_email_hint", &self.recovery_email_hint)
            .finish()
    }
}

/// State owned by a single `login` call and discarded when it returns.
#[derive(Default)]
pub struct LoginAttemptState {
    active_totp_secret: Option<String>,
    passkey_dismissed_once: bool,
    consecutive_no_prompt_polls: u32,
    last_no_prompt_log_at: Option<Instant>,
}

impl LoginAttemptState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the secret available to the two-factor resolver. Blank secrets are ignored.
    pub fn arm_totp(&mut self, secret: Option<&str>) {
        self.active_totp_secret = secret
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string);
    }

    pub fn disarm_totp(&mut self) {
        self.active_totp_secret = None;
    }

    pub fn active_totp_secret(&self) -> Option<&str> {
        self.active_totp_secret.as_deref()
    }

    pub fn passkey_dismissed_once(&self) -> bool {
        self.passkey_dismissed_once
    }

    /// Returns true the first time a passkey prompt is dismissed in this attempt.
    pub fn mark_passkey_dismissed(&mut self) -> bool {
        !std::mem::replace(&mut self.passkey_dismissed_once, true)
    }

    pub fn consecutive_no_prompt_polls(&self) -> u32 {
        self.consecutive_no_prompt_polls
    }

    /// Count a poll that found nothing to dismiss.
    ///
    /// Returns the count to log when a heartbeat line is due: on the first
    /// empty poll and then at most once per ten seconds.
    pub fn record_no_prompt(&mut self, now: Instant) -> Option<u32> {
        self.consecutive_no_prompt_polls += 1;
        let count = self.consecutive_no_prompt_polls;
        let due = count == 1
            || self
                .last_no_prompt_log_at
                .map_or(true, |last| now.duration_since(last) > NO_PROMPT_LOG_INTERVAL);
        if !due {
            return None;
        }
        self.last_no_prompt_log_at = Some(now);
        if count > NO_PROMPT_RESET_AFTER {
            self.consecutive_no_prompt_polls = 0;
        }
        Some(count)
    }

    pub fn record_dismissal(&mut self) {
        self.consecutive_no_prompt_polls = 0;
    }
}

impl fmt::Debug for LoginAttemptState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoginAttemptState")
            .field(
                "active_totp_secret",
                &self.active_totp_secret.as_ref().map(|_| "[REDACTED]"),
            )
            .field("passkey_dismissed_once", &self.passkey_dismissed_once)
            .field("consecutive_no_prompt_polls", &self.consecutive_no_prompt_polls)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_never_prints_secrets() {
        let credential = AccountCredential::new("a@x.com", "hunter2").with_totp_secret("JBSWY3DP");
        let rendered = format!("{:?}", credential);
        assert!(!rendered.contains("hunter2"));
        assert!(!rendered.contains("JBSWY3DP"));
        assert!(rendered.contains("a@x.com"));

        let mut state = LoginAttemptState::new();
        state.arm_totp(credential.totp_secret.as_deref());
        assert!(!format!("{:?}", state).contains("JBSWY3DP"));
    }

    #[test]
    fn test_arm_ignores_blank_secret() {
        let mut state = LoginAttemptState::new();
        state.arm_totp(Some("   "));
        assert!(state.active_totp_secret().is_none());
        state.arm_totp(Some(" JBSWY3DP "));
        assert_eq!(state.active_totp_secret(), Some("JBSWY3DP"));
        state.disarm_totp();
        assert!(state.active_totp_secret().is_none());
    }

    #[test]
    fn test_passkey_logged_once() {
        let mut state = LoginAttemptState::new();
        assert!(state.mark_passkey_dismissed());
        assert!(!state.mark_passkey_dismissed());
        assert!(state.passkey_dismissed_once());
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_prompt_heartbeat_is_throttled() {
        let mut state = LoginAttemptState::new();
        let start = Instant::now();

        assert_eq!(state.record_no_prompt(start), Some(1));
        assert_eq!(state.record_no_prompt(start + Duration::from_secs(2)), None);
        assert_eq!(state.record_no_prompt(start + Duration::from_secs(9)), None);
        assert_eq!(state.record_no_prompt(start + Duration::from_secs(11)), Some(4));

        state.record_dismissal();
        assert_eq!(state.consecutive_no_prompt_polls(), 0);
        assert_eq!(state.record_no_prompt(start + Duration::from_secs(12)), Some(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_prompt_counter_wraps() {
        let mut state = LoginAttemptState::new();
        let start = Instant::now();
        for i in 0..51u64 {
            state.record_no_prompt(start + Duration::from_millis(i));
        }
        assert_eq!(state.consecutive_no_prompt_polls(), 51);
        assert_eq!(
            state.record_no_prompt(start + Duration::from_secs(30)),
            Some(52)
        );
        assert_eq!(state.consecutive_no_prompt_polls(), 0);
    }

    #[test]
    fn test_credential_from_account_file_shape() {
        let credential: AccountCredential = serde_json::from_str(
            r#"{"email":"a@x.com","password":"p","totpSecret":"S","recoveryEmail":"r@y.com"}"#,
        )
        .unwrap();
        assert_eq!(credential.totp_secret.as_deref(), Some("S"));
        assert_eq!(credential.recovery_email_hint.as_deref(), Some("r@y.com"));
    }
}
