//! Process-scoped standby: once an incident is confirmed, this worker stops
//! starting new account sessions until the process is restarted.
//!
//! Standby is not shared across processes. A sibling worker sharding other
//! accounts keeps running; only accounts queued in this process are held.

use crate::browser::BrowserSession;
use crate::collaborators::AlertNotifier;
use crate::incident::{IncidentKind, SecurityIncident};
use crate::portal::NAVIGATION_TIMEOUT;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Interval of the standby reminder.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Why the worker entered standby.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum StandbyReason {
    SignInBlocked,
    RecoveryMismatch,
}

impl StandbyReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            StandbyReason::SignInBlocked => "sign-in-blocked",
            StandbyReason::RecoveryMismatch => "recovery-mismatch",
        }
    }
}

impl From<IncidentKind> for StandbyReason {
    fn from(kind: IncidentKind) -> Self {
        match kind {
            IncidentKind::SignInBlocked => StandbyReason::SignInBlocked,
            IncidentKind::RecoveryMismatch => StandbyReason::RecoveryMismatch,
        }
    }
}

/// The single transition recorded when standby engages.
#[derive(Debug, Clone, Serialize)]
pub struct StandbyRecord {
    pub reason: StandbyReason,
    pub account: String,
    pub engaged_at: DateTime<Utc>,
}

/// Standby flag owned by one worker process. Set at most once, never cleared.
#[derive(Debug, Default)]
pub struct StandbyState {
    record: OnceLock<StandbyRecord>,
}

impl StandbyState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_active(&self) -> bool {
        self.record.get().is_some()
    }

    pub fn reason(&self) -> Option<StandbyReason> {
        self.record.get().map(|r| r.reason)
    }

    pub fn record(&self) -> Option<&StandbyRecord> {
        self.record.get()
    }

    /// Returns true only for the call that performed the transition.
    pub(crate) fn activate(&self, reason: StandbyReason, account: &str) -> bool {
        self.record
            .set(StandbyRecord {
                reason,
                account: account.to_string(),
                engaged_at: Utc::now(),
            })
            .is_ok()
    }
}

/// Puts the worker into standby and keeps reminding the operator.
pub struct StandbyCoordinator {
    state: Arc<StandbyState>,
    notifier: Arc<dyn AlertNotifier>,
    heartbeat: Mutex<Option<JoinHandle<()>>>,
    heartbeat_interval: Duration,
}

impl StandbyCoordinator {
    pub fn new(state: Arc<StandbyState>, notifier: Arc<dyn AlertNotifier>) -> Self {
        Self {
            state,
            notifier,
            heartbeat: Mutex::new(None),
            heartbeat_interval: HEARTBEAT_INTERVAL,
        }
    }

    pub fn state(&self) -> &Arc<StandbyState> {
        &self.state
    }

    /// Engage standby for `incident`.
    ///
    /// Alerts, flips the state, starts the reminder and opens the reference
    /// page in a fresh tab. The authenticated `session` itself is left as is
    /// for manual inspection. Returns false when standby was already active.
    pub async fn engage(&self, incident: &SecurityIncident, session: &dyn BrowserSession) -> bool {
        if let Some(existing) = self.state.record() {
            info!(
                stage = "SECURITY",
                reason = existing.reason.as_str(),
                incident = incident.kind.as_str(),
                account = %incident.account,
                "standby already engaged"
            );
            return false;
        }

        self.notifier
            .notify(incident.kind.title(), &incident.alert_body(), incident.kind.severity())
            .await;

        let reason = StandbyReason::from(incident.kind);
        if !self.state.activate(reason, &incident.account) {
            debug!(stage = "SECURITY", "standby engaged concurrently");
            return false;
        }
        warn!(
            stage = "SECURITY",
            reason = reason.as_str(),
            account = %incident.account,
            "standby engaged; no further accounts will be started by this worker"
        );

        self.start_heartbeat(reason, incident.account.clone());
        open_reference_tab(session, &incident.reference_url).await;
        true
    }

    fn start_heartbeat(&self, reason: StandbyReason, account: String) {
        let period = self.heartbeat_interval;
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            loop {
                ticker.tick().await;
                warn!(
                    stage = "SECURITY",
                    reason = reason.as_str(),
                    account = %account,
                    "worker in security standby; review before continuing"
                );
            }
        });
        if let Some(previous) = self.heartbeat.lock().replace(handle) {
            previous.abort();
        }
    }

    /// Whether the reminder task is running.
    pub fn heartbeat_running(&self) -> bool {
        self.heartbeat
            .lock()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Stop the reminder. Standby itself stays engaged.
    pub fn shutdown(&self) {
        if let Some(handle) = self.heartbeat.lock().take() {
            handle.abort();
        }
    }
}

impl Drop for StandbyCoordinator {
    fn drop(&mut self) {
        self.shutdown();
    }
}

async fn open_reference_tab(session: &dyn BrowserSession, url: &str) {
    let tab = match session.open_new_tab().await {
        Ok(tab) => tab,
        Err(e) => {
            debug!(stage = "SECURITY", error = %e, "could not open reference tab");
            return;
        }
    };
    match tokio::time::timeout(NAVIGATION_TIMEOUT, tab.navigate(url)).await {
        Ok(Ok(())) => debug!(stage = "SECURITY", url, "opened reference tab"),
        Ok(Err(e)) => debug!(stage = "SECURITY", error = %e, "reference tab navigation failed"),
        Err(_) => debug!(stage = "SECURITY", "reference tab navigation timed out"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_transitions_once() {
        let state = StandbyState::new();
        assert!(!state.is_active());
        assert!(state.activate(StandbyReason::SignInBlocked, "a@x.com"));
        assert!(!state.activate(StandbyReason::RecoveryMismatch, "b@x.com"));
        assert_eq!(state.reason(), Some(StandbyReason::SignInBlocked));
        assert_eq!(state.record().unwrap().account, "a@x.com");
    }

    #[test]
    fn test_reason_labels() {
        assert_eq!(StandbyReason::RecoveryMismatch.as_str(), "recovery-mismatch");
        assert_eq!(
            StandbyReason::from(IncidentKind::SignInBlocked),
            StandbyReason::SignInBlocked
        );
    }
}
