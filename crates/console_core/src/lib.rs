//! Setup-console core: debounced connection verification, the cluster setup
//! wizard and the flicker-free access gate.

use std::time::Duration;

pub mod access_gate;
pub mod auth;
pub mod collaborators;
pub mod debounce;
pub mod error;
pub mod validation;
pub mod verification;
pub mod wizard;

pub use access_gate::{AccessGate, AccessGateTask, GateDecision, GateState};
pub use auth::{AuthHandle, AuthSnapshot};
pub use collaborators::{
    ClusterCreator, ClusterDirectory, ConnectionKind, ConnectionVerifier, IdentityProvider,
    Navigator, Notification, Notifier,
};
pub use debounce::{Debounced, Debouncer};
pub use error::CommitError;
pub use validation::{ConnectionForm, ServiceUrlPattern};
pub use verification::{
    Outcome, RequestId, VerificationReducer, VerificationSession, VerificationSnapshot,
};
pub use wizard::{
    Advance, BypassReason, ClusterSetup, Commit, CreateCluster, GuardDecision, Phase, SetupGuard,
    SetupStep, SetupValue, StepController, WizardModel,
};

pub const DEFAULT_DEBOUNCE_WINDOW: Duration = Duration::from_millis(700);
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_millis(150);
pub const DEFAULT_REDIRECT_DELAY: Duration = Duration::from_millis(2000);
pub const DEFAULT_LOGIN_PATH: &str = "/login";
pub const DEFAULT_HOME_PATH: &str = "/";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timings {
    /// Quiescence window applied to connection form input.
    pub debounce_window: Duration,
    /// How long a pending identity check may run before a busy indicator shows.
    pub grace_period: Duration,
    /// Delay between a successful commit and the redirect home.
    pub redirect_delay: Duration,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            debounce_window: DEFAULT_DEBOUNCE_WINDOW,
            grace_period: DEFAULT_GRACE_PERIOD,
            redirect_delay: DEFAULT_REDIRECT_DELAY,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Routes {
    pub login: String,
    pub home: String,
}

impl Default for Routes {
    fn default() -> Self {
        Self {
            login: DEFAULT_LOGIN_PATH.to_string(),
            home: DEFAULT_HOME_PATH.to_string(),
        }
    }
}
