//! Rewards portal sign-in for the worker processes.
//!
//! This crate provides:
//! - The login sequence as an explicit `rust-fsm` phase machine
//! - Two-factor resolution (one-time codes, authenticator push, manual fallback)
//! - Transient dialog dismissal
//! - Security incident detection and the per-process standby it triggers
//! - The account loop that honors standby between accounts

mod browser;
mod collaborators;
mod credential_input;
mod credentials;
mod deadline;
mod dialogs;
mod error;
mod incident;
mod login_fsm;
mod orchestrator;
pub mod portal;
mod session_store;
mod standby;
mod two_factor;
mod worker;

#[cfg(test)]
mod tests;

pub use browser::{
    disable_fido_in_body, fido_transform, BrowserSession, DeviceClass, RequestTransform,
    SessionCookie,
};
pub use collaborators::{
    AlertNotifier, HttpTokenExchange, HumanInput, OneTimeCodeGenerator, SessionStore, Severity,
    StdinPrompt, TokenExchange, TokenGrant, TracingNotifier,
};
pub use credentials::{AccountCredential, LoginAttemptState};
pub use dialogs::{is_passkey_title, DismissContext, PasskeyRule, PASSKEY_RULES};
pub use error::{AuthError, AuthResult, BrowserError};
pub use incident::{
    masked_candidates, match_sign_in_block, observe_mask, parse_reference, preferred_candidate,
    reference_matches, scan_markup_for_masks, EmailReference, IncidentDetector, IncidentKind,
    MaskedObservation, SecurityIncident,
};
pub use login_fsm::{
    challenge_machine, login_machine, ChallengeMachine, ChallengeMachineInput,
    ChallengeMachineState, ChallengeStage, LoginMachine, LoginMachineInput, LoginMachineState,
    LoginPhase,
};
pub use orchestrator::{Authenticator, Collaborators, LoginOutcome};
pub use session_store::{JsonCookieStore, StoredSession};
pub use standby::{
    StandbyCoordinator, StandbyReason, StandbyRecord, StandbyState, HEARTBEAT_INTERVAL,
};
pub use two_factor::{TwoFactorOutcome, PUSH_MAX_CYCLES};
pub use worker::{AccountReport, AccountWorker, PassStatus, SessionFactory};
