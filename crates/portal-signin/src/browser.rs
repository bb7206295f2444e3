//! Browser driver seam.
//!
//! The sign-in flow never talks to a concrete automation engine. It drives a
//! [`BrowserSession`], which resolves selector waits cooperatively: a wait that
//! times out returns `false`/`None` instead of failing.

use crate::error::BrowserError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// Rewrites an intercepted request body. `None` lets the request through untouched.
pub type RequestTransform = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Which kind of device the session impersonates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceClass {
    Desktop,
    Mobile,
}

impl DeviceClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceClass::Desktop => "desktop",
            DeviceClass::Mobile => "mobile",
        }
    }

    pub fn is_mobile(&self) -> bool {
        matches!(self, DeviceClass::Mobile)
    }
}

impl fmt::Display for DeviceClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A cookie as persisted between runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionCookie {
    pub name: String,
    pub value: String,
    pub domain: String,
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires: Option<i64>,
    #[serde(default)]
    pub http_only: bool,
    #[serde(default)]
    pub secure: bool,
}

/// One page of an automated browser.
///
/// Selectors are passed through to the driver verbatim (CSS, `xpath=` and
/// text-matching forms alike).
#[async_trait]
pub trait BrowserSession: Send + Sync {
    /// Load `url` in this page.
    async fn navigate(&self, url: &str) -> Result<(), BrowserError>;

    /// Wait up to `timeout` for `selector` to become visible.
    async fn wait_for_visible(&self, selector: &str, timeout: Duration) -> bool;

    /// Whether `selector` is visible right now.
    async fn is_visible(&self, selector: &str) -> bool {
        self.wait_for_visible(selector, Duration::ZERO).await
    }

    /// Wait up to `timeout` for `selector` to leave the page.
    async fn wait_for_detached(&self, selector: &str, timeout: Duration) -> bool;

    async fn click(&self, selector: &str) -> Result<(), BrowserError>;

    async fn fill(&self, selector: &str, text: &str) -> Result<(), BrowserError>;

    async fn press_key(&self, key: &str) -> Result<(), BrowserError>;

    /// Text content of the first element matching `selector`, waiting up to `timeout`.
    async fn text_of(&self, selector: &str, timeout: Duration) -> Option<String>;

    /// Text content of up to `limit` elements matching `selector`, without waiting.
    async fn texts_of(&self, selector: &str, limit: usize) -> Vec<String>;

    /// Raw page markup.
    async fn content(&self) -> Result<String, BrowserError>;

    async fn current_url(&self) -> Result<Url, BrowserError>;

    /// Open an unrelated page in the same browser context.
    async fn open_new_tab(&self) -> Result<Box<dyn BrowserSession>, BrowserError>;

    /// Rewrite the bodies of requests whose URL matches the glob `pattern`.
    async fn intercept_request(
        &self,
        pattern: &str,
        transform: RequestTransform,
    ) -> Result<(), BrowserError>;

    async fn cookies(&self) -> Result<Vec<SessionCookie>, BrowserError>;

    fn device_class(&self) -> DeviceClass;
}

/// Force a credential-type negotiation body to report no hardware-key support.
///
/// Bodies that are not JSON objects are passed through unmodified.
pub fn disable_fido_in_body(body: &str) -> Option<String> {
    let raw = if body.trim().is_empty() { "{}" } else { body };
    let mut value: serde_json::Value = serde_json::from_str(raw).ok()?;
    let object = value.as_object_mut()?;
    object.insert("isFidoSupported".to_string(), serde_json::Value::Bool(false));
    serde_json::to_string(&value).ok()
}

/// Shared transform installed on the credential-type endpoint.
pub fn fido_transform() -> RequestTransform {
    Arc::new(disable_fido_in_body)
}

/// Log a failed best-effort action and report whether it went through.
///
/// A single missed click or fill means "this branch does not apply"; it is
/// never surfaced to the caller.
pub(crate) fn soft(result: Result<(), BrowserError>, stage: &'static str, action: &str) -> bool {
    match result {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(stage, action, error = %e, "browser action missed");
            false
        }
    }
}
