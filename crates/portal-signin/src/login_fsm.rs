//! Sign-in state machines using rust-fsm.
//!
//! Two explicit machines drive a login attempt: `login_machine` tracks the
//! phase of the whole attempt and `challenge_machine` tracks two-factor
//! resolution inside the `ResolvingChallenge` phase.
//!
//! ## Login phases
//!
//! ```text
//!   Idle ──Begin──► Navigating ──LockDetected──► Locked
//!                     │    │
//!     SessionReused   │    │ SignInRequired
//!          ┌──────────┘    ▼
//!          │         EnteringEmail ──IncidentRaised──► Halted
//!          │               │ EmailSubmitted
//!          │               ▼
//!          │         EnteringPassword ──ChallengeRequired──► ResolvingChallenge
//!          │               │ PasswordSubmitted                  │ ChallengeFinished
//!          │               ▼                                    │
//!          │         CheckingLock ◄─────────────────────────────┘
//!          │               │ LockClear          (LockDetected ► Locked,
//!          │               ▼                     IncidentRaised ► Halted)
//!          │         AwaitingPortal ──PortalMissing──► Failed
//!          │               │ PortalReached
//!          ▼               ▼
//!        VerifyingContext ──ContextVerified──► Persisting ──SessionSaved──► SignedIn
//! ```
//!
//! ## Two-factor stages
//!
//! ```text
//!   Init ──TotpFieldReady──────► TotpInput ──CodeSubmitted──► Done
//!    │ ──ApprovalNumberShown──► PushApproval ──Approved/Exhausted──► Done
//!    │ ──NoAutomaticRoute─────► SmsManual ──CodeSubmitted/UiAdvanced──► Done
//!   (PushApproval and SmsManual re-enter TotpInput when a code field appears;
//!    every stage can be Abandoned into Done)
//! ```

use rust_fsm::*;
use serde::{Deserialize, Serialize};

state_machine! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub login_machine(Idle)

    Idle => {
        Begin => Navigating
    },
    Navigating => {
        SessionReused => VerifyingContext,
        SignInRequired => EnteringEmail,
        LockDetected => Locked,
        NavigationFailed => Failed
    },
    EnteringEmail => {
        EmailSubmitted => EnteringPassword,
        IncidentRaised => Halted
    },
    EnteringPassword => {
        PasswordSubmitted => CheckingLock,
        ChallengeRequired => ResolvingChallenge,
        IncidentRaised => Halted
    },
    ResolvingChallenge => {
        ChallengeFinished => CheckingLock,
        IncidentRaised => Halted
    },
    CheckingLock => {
        LockDetected => Locked,
        LockClear => AwaitingPortal,
        IncidentRaised => Halted
    },
    AwaitingPortal => {
        PortalReached => VerifyingContext,
        PortalMissing => Failed
    },
    VerifyingContext => {
        ContextVerified => Persisting
    },
    Persisting => {
        SessionSaved => SignedIn,
        PersistFailed => Failed
    }
}

state_machine! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub challenge_machine(Init)

    Init => {
        TotpFieldReady => TotpInput,
        ApprovalNumberShown => PushApproval,
        NoAutomaticRoute => SmsManual,
        Abandoned => Done
    },
    TotpInput => {
        CodeSubmitted => Done,
        Abandoned => Done
    },
    PushApproval => {
        Approved => Done,
        Exhausted => Done,
        TotpFieldReady => TotpInput,
        Abandoned => Done
    },
    SmsManual => {
        TotpFieldReady => TotpInput,
        CodeSubmitted => Done,
        UiAdvanced => Done,
        Abandoned => Done
    }
}

pub use challenge_machine::Input as ChallengeMachineInput;
pub use challenge_machine::State as ChallengeMachineState;
pub use challenge_machine::StateMachine as ChallengeMachine;
pub use login_machine::Input as LoginMachineInput;
pub use login_machine::State as LoginMachineState;
pub use login_machine::StateMachine as LoginMachine;

/// Phase of a login attempt, as reported in logs and outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoginPhase {
    Idle,
    Navigating,
    EnteringEmail,
    EnteringPassword,
    ResolvingChallenge,
    CheckingLock,
    AwaitingPortal,
    VerifyingContext,
    Persisting,
    SignedIn,
    Halted,
    Locked,
    Failed,
}

impl LoginPhase {
    /// Returns true once the attempt can make no further progress.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            LoginPhase::SignedIn | LoginPhase::Halted | LoginPhase::Locked | LoginPhase::Failed
        )
    }

    /// Returns true while credentials may still be typed into the page.
    pub fn accepts_credentials(&self) -> bool {
        matches!(
            self,
            LoginPhase::EnteringEmail | LoginPhase::EnteringPassword | LoginPhase::ResolvingChallenge
        )
    }
}

impl From<&LoginMachineState> for LoginPhase {
    fn from(state: &LoginMachineState) -> Self {
        match state {
            LoginMachineState::Idle => LoginPhase::Idle,
            LoginMachineState::Navigating => LoginPhase::Navigating,
            LoginMachineState::EnteringEmail => LoginPhase::EnteringEmail,
            LoginMachineState::EnteringPassword => LoginPhase::EnteringPassword,
            LoginMachineState::ResolvingChallenge => LoginPhase::ResolvingChallenge,
            LoginMachineState::CheckingLock => LoginPhase::CheckingLock,
            LoginMachineState::AwaitingPortal => LoginPhase::AwaitingPortal,
            LoginMachineState::VerifyingContext => LoginPhase::VerifyingContext,
            LoginMachineState::Persisting => LoginPhase::Persisting,
            LoginMachineState::SignedIn => LoginPhase::SignedIn,
            LoginMachineState::Halted => LoginPhase::Halted,
            LoginMachineState::Locked => LoginPhase::Locked,
            LoginMachineState::Failed => LoginPhase::Failed,
        }
    }
}

/// Stage of two-factor resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChallengeStage {
    Init,
    TotpInput,
    PushApproval,
    SmsManual,
    Done,
}

impl From<&ChallengeMachineState> for ChallengeStage {
    fn from(state: &ChallengeMachineState) -> Self {
        match state {
            ChallengeMachineState::Init => ChallengeStage::Init,
            ChallengeMachineState::TotpInput => ChallengeStage::TotpInput,
            ChallengeMachineState::PushApproval => ChallengeStage::PushApproval,
            ChallengeMachineState::SmsManual => ChallengeStage::SmsManual,
            ChallengeMachineState::Done => ChallengeStage::Done,
        }
    }
}
