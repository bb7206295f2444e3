//! Cookie persistence for authenticated sessions.

use crate::browser::{BrowserSession, DeviceClass, SessionCookie};
use crate::collaborators::SessionStore;
use crate::error::AuthResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

/// File contents written per account and device.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredSession {
    pub account: String,
    pub device: DeviceClass,
    pub saved_at: chrono::DateTime<chrono::Utc>,
    pub cookies: Vec<SessionCookie>,
}

/// Writes `<dir>/<account>/<device>_cookies.json`.
#[derive(Debug, Clone)]
pub struct JsonCookieStore {
    dir: PathBuf,
}

impl JsonCookieStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, account: &str, device: DeviceClass) -> PathBuf {
        self.dir
            .join(account_dir_name(account))
            .join(format!("{}_cookies.json", device.as_str()))
    }

    /// Read back a previously saved session, if any.
    pub async fn load(&self, account: &str, device: DeviceClass) -> AuthResult<Option<StoredSession>> {
        let path = self.path_for(account, device);
        match tokio::fs::read(&path).await {
            Ok(raw) => Ok(Some(serde_json::from_slice(&raw)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl SessionStore for JsonCookieStore {
    async fn save(
        &self,
        session: &dyn BrowserSession,
        account: &str,
        device: DeviceClass,
    ) -> AuthResult<()> {
        let cookies = session.cookies().await?;
        let stored = StoredSession {
            account: account.to_string(),
            device,
            saved_at: chrono::Utc::now(),
            cookies,
        };

        let path = self.path_for(account, device);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, serde_json::to_vec_pretty(&stored)?).await?;

        info!(
            stage = "LOGIN",
            account,
            device = device.as_str(),
            cookies = stored.cookies.len(),
            path = %path.display(),
            "session saved"
        );
        Ok(())
    }
}

/// One path component for `account`. Separators and leading dots become `_`.
fn account_dir_name(account: &str) -> String {
    let mut leading = true;
    let name: String = account
        .chars()
        .map(|c| {
            let mapped = match c {
                '/' | '\\' | ':' => '_',
                '.' if leading => '_',
                c => c,
            };
            leading = leading && c == '.';
            mapped
        })
        .collect();
    if name.is_empty() {
        "_".to_string()
    } else {
        name
    }
}
