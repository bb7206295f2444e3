//! Cookie store on disk.

use super::harness::{credential, Fixture, ScriptedBrowser, EMAIL};
use super::password_page;
use crate::browser::{DeviceClass, SessionCookie};
use crate::collaborators::SessionStore;
use crate::orchestrator::{Authenticator, Collaborators, LoginOutcome};
use crate::session_store::JsonCookieStore;
use std::sync::Arc;

fn cookie(name: &str, value: &str) -> SessionCookie {
    SessionCookie {
        name: name.to_string(),
        value: value.to_string(),
        domain: ".bing.com".to_string(),
        path: "/".to_string(),
        expires: Some(1_900_000_000),
        http_only: true,
        secure: true,
    }
}

#[tokio::test]
async fn saved_cookies_load_back() {
    let dir = tempfile::tempdir().unwrap();
    let store = JsonCookieStore::new(dir.path());
    let browser = ScriptedBrowser::new(DeviceClass::Mobile);
    browser.set_cookies(vec![cookie("_U", "abc"), cookie("MUID", "def")]);

    store.save(&browser, EMAIL, DeviceClass::Mobile).await.unwrap();

    assert!(store.path_for(EMAIL, DeviceClass::Mobile).exists());
    let loaded = store.load(EMAIL, DeviceClass::Mobile).await.unwrap().unwrap();
    assert_eq!(loaded.account, EMAIL);
    assert_eq!(loaded.device, DeviceClass::Mobile);
    assert_eq!(loaded.cookies, vec![cookie("_U", "abc"), cookie("MUID", "def")]);
    assert!(store.load(EMAIL, DeviceClass::Desktop).await.unwrap().is_none());
}

#[tokio::test]
async fn file_uses_camel_case_keys() {
    let dir = tempfile::tempdir().unwrap();
    let store = JsonCookieStore::new(dir.path());
    let browser = ScriptedBrowser::desktop();
    browser.set_cookies(vec![cookie("_U", "abc")]);

    store.save(&browser, EMAIL, DeviceClass::Desktop).await.unwrap();

    let raw = std::fs::read_to_string(store.path_for(EMAIL, DeviceClass::Desktop)).unwrap();
    let json: serde_json::Value = serde_json::from_str(&raw).unwrap();
    assert!(json.get("savedAt").is_some());
    assert_eq!(json["device"], "desktop");
    assert_eq!(json["cookies"][0]["httpOnly"], true);
}

#[tokio::test(start_paused = true)]
async fn login_writes_through_json_store() {
    let dir = tempfile::tempdir().unwrap();
    let fixture = Fixture::new();
    let store = Arc::new(JsonCookieStore::new(dir.path()));
    let collaborators = Collaborators {
        sessions: store.clone(),
        ..fixture.collaborators()
    };
    let auth = Authenticator::new(&fixture.config, collaborators, fixture.standby.clone());
    let browser = ScriptedBrowser::desktop();
    password_page(&browser);
    browser.set_cookies(vec![cookie("_U", "abc")]);

    let outcome = auth.login(&browser, &credential()).await.unwrap();

    assert_eq!(outcome, LoginOutcome::SignedIn);
    let loaded = store.load(EMAIL, DeviceClass::Desktop).await.unwrap().unwrap();
    assert_eq!(loaded.cookies.len(), 1);
}
