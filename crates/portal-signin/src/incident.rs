//! Security incident detection: explicit sign-in blocks and masked
//! recovery-address mismatches.
//!
//! Everything that inspects text is a pure function so the heuristics can be
//! checked against recorded page samples; [`IncidentDetector`] only gathers
//! the text from the page.

use crate::browser::BrowserSession;
use crate::collaborators::Severity;
use crate::credentials::AccountCredential;
use crate::deadline::Deadline;
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::Serialize;
use signin_config_and_utils::Config;
use std::collections::HashSet;
use std::sync::LazyLock;
use std::time::Duration;
use tracing::{debug, info, warn};

pub(crate) const HEADING_SELECTORS: &[&str] = &[
    r#"[data-testid="title"]"#,
    "h1",
    r#"div[role="heading"]"#,
    "div.text-title",
];
const HEADING_PROBE: Duration = Duration::from_millis(600);
const MAX_HEADING_LEN: usize = 300;

pub(crate) const RECOVERY_HINT_SELECTOR: &str = r#"[data-testid="recoveryEmailHint"], #recoveryEmail, [id*="ProofEmail"], [id*="EmailProof"], [data-testid*="Email"], span:has(span.fui-Text)"#;
const RECOVERY_HINT_PROBE: Duration = Duration::from_millis(1500);
pub(crate) const LIST_ITEM_SELECTOR: &str = r#"[role="listitem"], li"#;
pub(crate) const MASKED_TEXT_XPATH: &str = r#"xpath=//*[contains(normalize-space(.), "@") and (contains(normalize-space(.), "*") or contains(normalize-space(.), "•"))]"#;
const MAX_SCANNED_ELEMENTS: usize = 12;
const MAX_CANDIDATE_LEN: usize = 300;

pub(crate) const SIGN_IN_BLOCK_ANCHOR: &str = "we-cant-sign-you-in";
pub(crate) const RECOVERY_MISMATCH_ANCHOR: &str = "recovery-email-mismatch";

/// Block phrases in priority order with the label recorded as evidence.
static SIGN_IN_BLOCK_PATTERNS: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    [
        (r"(?i)we can['’`]?t sign you in", "cant-sign-in"),
        (
            r"(?i)incorrect account or password too many times",
            "too-many-incorrect",
        ),
        (
            r"(?i)used an incorrect account or password too many times",
            "too-many-incorrect-variant",
        ),
        (r"(?i)sign-in has been blocked", "sign-in-blocked-phrase"),
        (r"(?i)your account has been locked", "account-locked"),
        (
            r"(?i)your account or password is incorrect too many times",
            "incorrect-too-many-times",
        ),
    ]
    .into_iter()
    .map(|(pattern, label)| (Regex::new(pattern).expect("sign-in block pattern"), label))
    .collect()
});

static GENERIC_MASK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[A-Za-z0-9]{1,4}[*•]{2,}[A-Za-z0-9*•._-]*@[A-Za-z0-9.-]+").expect("mask regex")
});
static FRENCH_CODE_PHRASE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?is)Nous\s+enverrons\s+un\s+code\s+à\s+(.{1,200}?@[^\s<.]+(?:\.[^\s<.]+)*).{0,120}?Pour\s+vérifier",
    )
    .expect("french phrase regex")
});
static MARKUP_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<[^>]+>").expect("tag regex"));
static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("ws regex"));
static MASK_CHAR: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[*•]").expect("mask char"));
static EMAIL_WORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)email|courriel|adresse|mail").expect("email word"));
static MASKED_ADDRESS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"([a-zA-Z0-9]{1,2})[a-zA-Z0-9*•._-]*@([a-zA-Z0-9.-]+\.[a-zA-Z]{2,})")
        .expect("masked address")
});
static LOOSE_MASKED_ADDRESS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"([a-zA-Z0-9])[*•][a-zA-Z0-9*•._-]*@([a-zA-Z0-9.-]+\.[a-zA-Z]{2,})")
        .expect("loose masked address")
});

/// Class of security incident.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IncidentKind {
    SignInBlocked,
    RecoveryMismatch,
}

impl IncidentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            IncidentKind::SignInBlocked => "sign-in-blocked",
            IncidentKind::RecoveryMismatch => "recovery-mismatch",
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            IncidentKind::SignInBlocked => "We can't sign you in (blocked)",
            IncidentKind::RecoveryMismatch => "Recovery email mismatch",
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            IncidentKind::SignInBlocked => Severity::Warning,
            IncidentKind::RecoveryMismatch => Severity::Critical,
        }
    }
}

/// Evidence that an account is blocked or possibly compromised. Never mutated after creation.
#[derive(Debug, Clone, Serialize)]
pub struct SecurityIncident {
    pub kind: IncidentKind,
    pub account: String,
    pub evidence: Vec<String>,
    pub remediation: Vec<String>,
    pub reference_url: String,
    pub detected_at: DateTime<Utc>,
}

impl SecurityIncident {
    /// Alert body: account, evidence, remediation and reference, one per line.
    pub fn alert_body(&self) -> String {
        let mut lines = vec![format!("Account: {}", self.account)];
        if !self.evidence.is_empty() {
            lines.push(format!("Details: {}", self.evidence.join(" | ")));
        }
        if !self.remediation.is_empty() {
            lines.push(format!("Next: {}", self.remediation.join(" -> ")));
        }
        lines.push(format!("Docs: {}", self.reference_url));
        lines.join("\n")
    }
}

/// First block pattern found in already-collected heading text.
pub fn match_sign_in_block(text: &str) -> Option<&'static str> {
    let lower = text.to_lowercase();
    SIGN_IN_BLOCK_PATTERNS
        .iter()
        .find(|(pattern, _)| pattern.is_match(&lower))
        .map(|(_, label)| *label)
}

/// An address the masked hint is allowed to stand for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailReference {
    pub domain: String,
    pub prefix2: String,
}

impl EmailReference {
    fn render(&self) -> String {
        format!("{}**@{}", self.prefix2, self.domain)
    }
}

/// Reduce an address to its lowercase domain and first two local characters.
pub fn parse_reference(address: &str) -> Option<EmailReference> {
    let (local, domain) = address.trim().split_once('@')?;
    let domain = domain.to_lowercase();
    let prefix2: String = local.chars().take(2).collect::<String>().to_lowercase();
    if domain.is_empty() || prefix2.is_empty() {
        return None;
    }
    Some(EmailReference { domain, prefix2 })
}

/// What could be read from a masked hint such as `ko*****@example.com`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaskedObservation {
    /// The matched masked address, or the whole candidate if none matched.
    pub extracted: String,
    /// One or two visible leading characters, lowercase.
    pub prefix: String,
    pub domain: String,
}

/// Extract the visible prefix and domain from a masked hint.
pub fn observe_mask(candidate: &str) -> MaskedObservation {
    let captures = MASKED_ADDRESS
        .captures(candidate)
        .or_else(|| LOOSE_MASKED_ADDRESS.captures(candidate));

    let extracted = captures
        .as_ref()
        .and_then(|c| c.get(0))
        .map_or_else(|| candidate.to_string(), |m| m.as_str().to_string());
    let lower = extracted.to_lowercase();

    let mut prefix = captures
        .as_ref()
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_lowercase())
        .unwrap_or_default();
    let mut domain = captures
        .as_ref()
        .and_then(|c| c.get(2))
        .map(|m| m.as_str().to_lowercase())
        .unwrap_or_default();

    if let Some((local, host)) = lower.split_once('@') {
        if domain.is_empty() {
            domain = host.to_string();
        }
        if prefix.is_empty() {
            prefix = local
                .chars()
                .filter(|c| c.is_ascii_alphanumeric())
                .take(2)
                .collect();
        }
    }

    MaskedObservation {
        extracted,
        prefix,
        domain,
    }
}

/// Whether `reference` is consistent with the masked observation.
///
/// The provider masks after either one or two characters, so a one-character
/// prefix only constrains the first character.
pub fn reference_matches(observed: &MaskedObservation, reference: &EmailReference) -> bool {
    if reference.domain != observed.domain {
        return false;
    }
    if observed.prefix.chars().count() == 1 {
        return reference.prefix2.starts_with(&observed.prefix);
    }
    reference.prefix2 == observed.prefix
}

/// Collapse whitespace, drop duplicates, and keep only strings that look masked.
pub fn masked_candidates(raw: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    raw.into_iter()
        .map(|text| WHITESPACE.replace_all(text.trim(), " ").into_owned())
        .filter(|text| !text.is_empty() && seen.insert(text.clone()))
        .filter(|text| text.contains('@') && MASK_CHAR.is_match(text))
        .collect()
}

/// Last-resort scan of raw markup for masked addresses.
pub fn scan_markup_for_masks(html: &str) -> Vec<String> {
    let mut found: Vec<String> = Vec::new();
    let mut push = |value: String| {
        if !value.is_empty() && !found.contains(&value) {
            found.push(value);
        }
    };
    for m in GENERIC_MASK.find_iter(html) {
        push(m.as_str().to_string());
    }
    for captures in FRENCH_CODE_PHRASE.captures_iter(html) {
        if let Some(raw) = captures.get(1) {
            push(MARKUP_TAG.replace_all(raw.as_str(), "").trim().to_string());
        }
    }
    found
}

/// Prefer a candidate that names an email address; otherwise the first.
pub fn preferred_candidate(candidates: &[String]) -> Option<&String> {
    candidates
        .iter()
        .find(|c| EMAIL_WORD.is_match(c))
        .or_else(|| candidates.first())
}

/// Reads incident evidence off the page.
#[derive(Debug, Clone)]
pub struct IncidentDetector {
    sign_in_blocked_url: String,
    recovery_mismatch_url: String,
}

impl IncidentDetector {
    pub fn new(config: &Config) -> Self {
        Self {
            sign_in_blocked_url: config.docs_url(SIGN_IN_BLOCK_ANCHOR),
            recovery_mismatch_url: config.docs_url(RECOVERY_MISMATCH_ANCHOR),
        }
    }

    /// Check heading-like elements for explicit sign-in block messaging.
    pub(crate) async fn detect_sign_in_blocked(
        &self,
        session: &dyn BrowserSession,
        account: &str,
        deadline: &Deadline,
    ) -> Option<SecurityIncident> {
        let mut text = String::new();
        for selector in HEADING_SELECTORS {
            let Some(heading) = session.text_of(selector, deadline.cap(HEADING_PROBE)).await else {
                continue;
            };
            let heading = heading.trim();
            if !heading.is_empty() && heading.len() < MAX_HEADING_LEN {
                text.push(' ');
                text.push_str(heading);
            }
        }

        let label = match_sign_in_block(&text)?;
        warn!(stage = "SECURITY", account, pattern = label, "sign-in blocked");
        Some(SecurityIncident {
            kind: IncidentKind::SignInBlocked,
            account: account.to_string(),
            evidence: vec![format!("pattern: {label}")],
            remediation: vec!["Manual recovery required before continuing".to_string()],
            reference_url: self.sign_in_blocked_url.clone(),
            detected_at: Utc::now(),
        })
    }

    /// Compare the provider's masked recovery hint with the declared addresses.
    pub(crate) async fn detect_recovery_mismatch(
        &self,
        session: &dyn BrowserSession,
        credential: &AccountCredential,
        deadline: &Deadline,
    ) -> Option<SecurityIncident> {
        let recovery = credential
            .recovery_email_hint
            .as_deref()
            .filter(|r| r.contains('@'))?;

        let references: Vec<EmailReference> = [recovery, credential.email.as_str()]
            .into_iter()
            .filter_map(parse_reference)
            .collect();
        if references.is_empty() {
            return None;
        }

        let candidates = self.collect_masked_candidates(session, deadline).await;
        let Some(preferred) = preferred_candidate(&candidates) else {
            debug!(stage = "LOGIN-RECOVERY", "no masked recovery hint on page");
            return None;
        };

        let observed = observe_mask(preferred);
        if let Some(reference) = references.iter().find(|r| reference_matches(&observed, r)) {
            let mode = if observed.prefix.chars().count() == 1 {
                "lenient"
            } else {
                "strict"
            };
            info!(
                stage = "LOGIN-RECOVERY",
                mode,
                observed = %observed.extracted,
                reference = %reference.render(),
                "recovery hint matches"
            );
            return None;
        }

        let or_prefix = |s: &str| if s.is_empty() { "??".to_string() } else { s.to_string() };
        let expected: Vec<String> = references.iter().map(EmailReference::render).collect();
        warn!(
            stage = "SECURITY",
            account = %credential.email,
            observed = %observed.extracted,
            "recovery hint matches no declared address"
        );
        Some(SecurityIncident {
            kind: IncidentKind::RecoveryMismatch,
            account: credential.email.clone(),
            evidence: vec![
                format!("masked shown: {preferred}"),
                format!("extracted: {}", observed.extracted),
                format!(
                    "observed => {}**@{}",
                    or_prefix(&observed.prefix),
                    or_prefix(&observed.domain)
                ),
                format!("expected => {}", expected.join(" OR ")),
            ],
            remediation: vec![
                "Automation paused (standby engaged).".to_string(),
                "Verify account security and the recovery email in the account settings.".to_string(),
                "If the change is legitimate, update the account list before restarting.".to_string(),
            ],
            reference_url: self.recovery_mismatch_url.clone(),
            detected_at: Utc::now(),
        })
    }

    async fn collect_masked_candidates(
        &self,
        session: &dyn BrowserSession,
        deadline: &Deadline,
    ) -> Vec<String> {
        let mut raw = Vec::new();

        if let Some(text) = session
            .text_of(RECOVERY_HINT_SELECTOR, deadline.cap(RECOVERY_HINT_PROBE))
            .await
        {
            raw.push(text);
        }
        raw.extend(
            session
                .texts_of(LIST_ITEM_SELECTOR, MAX_SCANNED_ELEMENTS)
                .await
                .into_iter()
                .filter(|t| t.contains('@')),
        );
        raw.extend(
            session
                .texts_of(MASKED_TEXT_XPATH, MAX_SCANNED_ELEMENTS)
                .await
                .into_iter()
                .filter(|t| t.trim().len() < MAX_CANDIDATE_LEN),
        );

        let masked = masked_candidates(raw);
        if !masked.is_empty() {
            return masked;
        }

        match session.content().await {
            Ok(html) => scan_markup_for_masks(&html),
            Err(e) => {
                debug!(stage = "LOGIN-RECOVERY", error = %e, "page markup unavailable");
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn obs(candidate: &str) -> MaskedObservation {
        observe_mask(candidate)
    }

    fn reference(address: &str) -> EmailReference {
        parse_reference(address).unwrap()
    }

    #[test]
    fn test_one_char_prefix_checks_first_char_and_domain() {
        let observed = obs("k***@x.com");
        assert_eq!(observed.prefix, "k");
        assert_eq!(observed.domain, "x.com");
        assert!(reference_matches(&observed, &reference("kevin@x.com")));
        assert!(reference_matches(&observed, &reference("Kate@X.com")));
        assert!(!reference_matches(&observed, &reference("anna@x.com")));
        assert!(!reference_matches(&observed, &reference("kevin@y.com")));
    }

    #[test]
    fn test_two_char_prefix_checks_both_chars() {
        let observed = obs("ko**@x.com");
        assert_eq!(observed.prefix, "ko");
        assert!(!reference_matches(&observed, &reference("ken@x.com")));
        assert!(reference_matches(&observed, &reference("kobe@x.com")));
    }

    #[test]
    fn test_mask_found_inside_sentence() {
        let observed = obs("We'll send a code to ko•••••@outlook.fr to verify");
        assert_eq!(observed.extracted, "ko•••••@outlook.fr");
        assert_eq!(observed.domain, "outlook.fr");
    }

    #[test]
    fn test_unparseable_hint_falls_back_to_split() {
        let observed = obs("k*@localhost");
        assert_eq!(observed.extracted, "k*@localhost");
        assert_eq!(observed.domain, "localhost");
        assert_eq!(observed.prefix, "k");
    }

    #[test]
    fn test_parse_reference_rejects_partial_addresses() {
        assert!(parse_reference("no-at-sign").is_none());
        assert!(parse_reference("@x.com").is_none());
        assert!(parse_reference("kevin@").is_none());
        assert_eq!(
            parse_reference("KEvin@Example.COM").unwrap(),
            EmailReference {
                domain: "example.com".into(),
                prefix2: "ke".into()
            }
        );
    }

    #[test]
    fn test_sign_in_block_first_pattern_wins() {
        assert_eq!(
            match_sign_in_block(" We can’t sign you in  Your account has been locked"),
            Some("cant-sign-in")
        );
        assert_eq!(
            match_sign_in_block("You've used an incorrect account or password too many times"),
            Some("too-many-incorrect")
        );
        assert_eq!(
            match_sign_in_block("SIGN-IN HAS BEEN BLOCKED"),
            Some("sign-in-blocked-phrase")
        );
        assert_eq!(match_sign_in_block("Enter password"), None);
    }

    #[test]
    fn test_block_match_is_order_independent_across_elements() {
        let a = match_sign_in_block("Verify your identity we cant sign you in");
        let b = match_sign_in_block("we cant sign you in Verify your identity");
        assert_eq!(a, b);
    }

    #[test]
    fn test_masked_candidates_dedupe_and_filter() {
        let out = masked_candidates(vec![
            "  ko***@x.com ".to_string(),
            "ko***@x.com".to_string(),
            "plain@x.com".to_string(),
            "no address ***".to_string(),
            "".to_string(),
        ]);
        assert_eq!(out, vec!["ko***@x.com".to_string()]);
    }

    #[test]
    fn test_markup_scan_finds_generic_and_french_phrase() {
        let html = r#"<div>Code: ab***@x.com</div>
            <p>Nous enverrons un code à <b>cd•••@y.fr</b>. Pour vérifier</p>"#;
        let found = scan_markup_for_masks(html);
        assert!(found.contains(&"ab***@x.com".to_string()));
        assert!(found.contains(&"cd•••@y.fr".to_string()));
    }

    #[test]
    fn test_french_phrase_rejoins_mask_split_by_tags() {
        let html = "<p>Nous enverrons un code à <span>zz</span>***@other.com.</p><p>Pour vérifier votre identité</p>";
        assert_eq!(scan_markup_for_masks(html), vec!["zz***@other.com".to_string()]);
    }

    #[test]
    fn test_preferred_candidate_mentions_email() {
        let candidates = vec![
            "Text +33 ** ** 12 to a@*.x".to_string(),
            "Email ko***@x.com".to_string(),
        ];
        assert_eq!(
            preferred_candidate(&candidates).map(String::as_str),
            Some("Email ko***@x.com")
        );
        assert_eq!(preferred_candidate(&[]), None);
    }

    #[test]
    fn test_alert_body_layout() {
        let incident = SecurityIncident {
            kind: IncidentKind::SignInBlocked,
            account: "a@x.com".into(),
            evidence: vec!["pattern: cant-sign-in".into(), "extra".into()],
            remediation: vec!["one".into(), "two".into()],
            reference_url: "https://docs.example/security.md#we-cant-sign-you-in-blocked".into(),
            detected_at: Utc::now(),
        };
        assert_eq!(
            incident.alert_body(),
            "Account: a@x.com\nDetails: pattern: cant-sign-in | extra\nNext: one -> two\nDocs: https://docs.example/security.md#we-cant-sign-you-in-blocked"
        );
        assert_eq!(incident.kind.severity(), Severity::Warning);
        assert_eq!(IncidentKind::RecoveryMismatch.severity(), Severity::Critical);
    }
}
