//! Multi-step setup wizard.
//!
//! [`StepController`] sequences the steps of any [`WizardModel`]: it only moves
//! forward when the current step holds a committed value, keeps values when
//! moving back, and commits once the last step is passed. [`ClusterSetup`] is
//! the three-step model for registering the first cluster, and [`SetupGuard`]
//! decides whether the wizard should be shown at all.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use shared::{
    domain::{ClusterConnectionSettings, ClusterCreation, ClusterInfo},
    error::ApiError,
};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::{
    auth::AuthHandle,
    collaborators::{ClusterCreator, ClusterDirectory, Navigator, Notification, Notifier},
    error::CommitError,
    validation::{cluster_info_is_complete, ConnectionForm},
    DEFAULT_HOME_PATH, DEFAULT_REDIRECT_DELAY,
};

#[derive(Debug, Clone, Copy)]
pub struct CommitMessages {
    pub pending: &'static str,
    pub success: &'static str,
    pub failure_prefix: &'static str,
}

pub trait WizardModel: Send {
    type Value;
    type Output: Send + 'static;

    const STEPS: usize;
    const MESSAGES: CommitMessages;

    /// Whether `step` (1-based) holds a committed value.
    fn has_value(&self, step: usize) -> bool;
    fn set_value(&mut self, value: Self::Value);
    /// The commit payload; `None` while any step is still empty.
    fn output(&self) -> Option<Self::Output>;
}

/// The terminal action of a wizard.
#[async_trait]
pub trait Commit<T>: Send + Sync {
    async fn commit(&self, output: T) -> Result<(), ApiError>;
}

pub struct CreateCluster(pub Arc<dyn ClusterCreator>);

#[async_trait]
impl Commit<ClusterCreation> for CreateCluster {
    async fn commit(&self, output: ClusterCreation) -> Result<(), ApiError> {
        self.0.create_cluster(output).await
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Editing,
    Committing,
    Committed,
}

#[derive(Debug)]
pub enum Advance {
    Moved(usize),
    Blocked,
    /// Commit succeeded; the handle resolves once the delayed redirect ran.
    Committed(JoinHandle<()>),
    Failed(CommitError),
}

pub struct StepController<M: WizardModel> {
    model: M,
    current: usize,
    phase: Phase,
    committer: Arc<dyn Commit<M::Output>>,
    navigator: Arc<dyn Navigator>,
    notifier: Arc<dyn Notifier>,
    redirect_delay: Duration,
    home_path: String,
}

impl<M: WizardModel> StepController<M> {
    pub fn new(
        model: M,
        committer: Arc<dyn Commit<M::Output>>,
        navigator: Arc<dyn Navigator>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            model,
            current: 1,
            phase: Phase::Editing,
            committer,
            navigator,
            notifier,
            redirect_delay: DEFAULT_REDIRECT_DELAY,
            home_path: DEFAULT_HOME_PATH.to_string(),
        }
    }

    pub fn with_redirect(mut self, delay: Duration, home_path: impl Into<String>) -> Self {
        self.redirect_delay = delay;
        self.home_path = home_path.into();
        self
    }

    pub fn current_step(&self) -> usize {
        self.current
    }

    pub fn step_count(&self) -> usize {
        M::STEPS
    }

    pub fn is_final_step(&self) -> bool {
        self.current == M::STEPS
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    pub fn set_step_value(&mut self, value: M::Value) {
        self.model.set_value(value);
    }

    pub fn is_advance_enabled(&self) -> bool {
        if !self.model.has_value(self.current) {
            return false;
        }
        !self.is_final_step() || self.phase == Phase::Editing
    }

    pub fn is_retreat_enabled(&self) -> bool {
        self.current > 1 && self.phase == Phase::Editing
    }

    /// Moves back one step. Committed values of all steps are kept.
    pub fn retreat(&mut self) {
        if !self.is_retreat_enabled() {
            return;
        }
        self.current -= 1;
        debug!(step = self.current, "wizard moved back");
    }

    pub async fn advance(&mut self) -> Advance {
        if !self.is_advance_enabled() {
            return Advance::Blocked;
        }
        if !self.is_final_step() {
            self.current += 1;
            debug!(step = self.current, "wizard moved forward");
            return Advance::Moved(self.current);
        }
        match self.commit().await {
            Ok(redirect) => Advance::Committed(redirect),
            Err(err) => Advance::Failed(err),
        }
    }

    /// Runs the terminal commit through the configured committer.
    pub async fn commit(&mut self) -> Result<JoinHandle<()>, CommitError> {
        let output = self.begin_commit()?;
        let result = self.committer.commit(output).await;
        self.complete_commit(result)
    }

    /// First half of [`Self::commit`]: marks the wizard as committing and hands
    /// out the payload. Further commits are refused until completion.
    pub fn begin_commit(&mut self) -> Result<M::Output, CommitError> {
        match self.phase {
            Phase::Committing => return Err(CommitError::AlreadyCommitting),
            Phase::Committed => return Err(CommitError::AlreadyCommitted),
            Phase::Editing => {}
        }
        if let Some(step) = (1..=M::STEPS).find(|step| !self.model.has_value(*step)) {
            return Err(CommitError::MissingStepValue { step });
        }
        let output = self
            .model
            .output()
            .ok_or(CommitError::MissingStepValue { step: M::STEPS })?;

        self.phase = Phase::Committing;
        self.notifier
            .notify(Notification::Loading(M::MESSAGES.pending.to_string()));
        Ok(output)
    }

    /// Second half of [`Self::commit`]. On success the redirect home is
    /// scheduled after the configured delay; on failure the wizard stays on
    /// the last step and can be committed again. Without a preceding
    /// [`Self::begin_commit`] the phase is left untouched.
    pub fn complete_commit(
        &mut self,
        result: Result<(), ApiError>,
    ) -> Result<JoinHandle<()>, CommitError> {
        match self.phase {
            Phase::Committing => {}
            Phase::Committed => return Err(CommitError::AlreadyCommitted),
            Phase::Editing => {
                warn!("commit completion without a commit in progress");
                return Err(CommitError::NotCommitting);
            }
        }
        match result {
            Ok(()) => {
                self.phase = Phase::Committed;
                self.notifier
                    .notify(Notification::Success(M::MESSAGES.success.to_string()));
                info!(delay_ms = self.redirect_delay.as_millis() as u64, "setup committed");

                let navigator = Arc::clone(&self.navigator);
                let delay = self.redirect_delay;
                let home = self.home_path.clone();
                Ok(tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    navigator.navigate_to(&home);
                }))
            }
            Err(err) => {
                self.phase = Phase::Editing;
                warn!(error = %err, "setup commit failed");
                self.notifier.notify(Notification::Error(format!(
                    "{}{}",
                    M::MESSAGES.failure_prefix,
                    err.message
                )));
                Err(CommitError::Creation(err))
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetupStep {
    ClientConnection = 1,
    AdminConnection = 2,
    ClusterInfo = 3,
}

impl SetupStep {
    pub fn from_index(step: usize) -> Option<Self> {
        match step {
            1 => Some(SetupStep::ClientConnection),
            2 => Some(SetupStep::AdminConnection),
            3 => Some(SetupStep::ClusterInfo),
            _ => None,
        }
    }

    pub fn index(self) -> usize {
        self as usize
    }

    /// The connection form shown on this step, if it is a connection step.
    pub fn connection_form(self) -> Option<ConnectionForm> {
        match self {
            SetupStep::ClientConnection => Some(ConnectionForm::broker()),
            SetupStep::AdminConnection => Some(ConnectionForm::admin_api()),
            SetupStep::ClusterInfo => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SetupValue {
    ClientConnection(Option<ClusterConnectionSettings>),
    AdminConnection(Option<ClusterConnectionSettings>),
    ClusterInfo(Option<ClusterInfo>),
}

impl SetupValue {
    /// A cluster info draft only counts once it is complete.
    pub fn cluster_info_draft(draft: ClusterInfo) -> Self {
        let complete = cluster_info_is_complete(&draft);
        SetupValue::ClusterInfo(complete.then_some(draft))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClusterSetup {
    pub client_connection: Option<ClusterConnectionSettings>,
    pub admin_connection: Option<ClusterConnectionSettings>,
    pub cluster_info: Option<ClusterInfo>,
}

impl WizardModel for ClusterSetup {
    type Value = SetupValue;
    type Output = ClusterCreation;

    const STEPS: usize = 3;
    const MESSAGES: CommitMessages = CommitMessages {
        pending: "Creating cluster...",
        success: "Cluster created successfully!",
        failure_prefix: "Failed to create cluster: ",
    };

    fn has_value(&self, step: usize) -> bool {
        match SetupStep::from_index(step) {
            Some(SetupStep::ClientConnection) => self.client_connection.is_some(),
            Some(SetupStep::AdminConnection) => self.admin_connection.is_some(),
            Some(SetupStep::ClusterInfo) => self.cluster_info.is_some(),
            None => false,
        }
    }

    fn set_value(&mut self, value: SetupValue) {
        match value {
            SetupValue::ClientConnection(settings) => self.client_connection = settings,
            SetupValue::AdminConnection(settings) => self.admin_connection = settings,
            SetupValue::ClusterInfo(info) => self.cluster_info = info,
        }
    }

    fn output(&self) -> Option<ClusterCreation> {
        Some(ClusterCreation {
            cluster_info: self.cluster_info.clone()?,
            client_connection_settings: self.client_connection.clone()?,
            admin_connection_settings: self.admin_connection.clone()?,
        })
    }
}

impl StepController<ClusterSetup> {
    pub fn cluster_setup(
        creator: Arc<dyn ClusterCreator>,
        navigator: Arc<dyn Navigator>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self::new(
            ClusterSetup::default(),
            Arc::new(CreateCluster(creator)),
            navigator,
            notifier,
        )
    }

    pub fn setup_step(&self) -> SetupStep {
        SetupStep::from_index(self.current).unwrap_or(SetupStep::ClientConnection)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BypassReason {
    ClusterExists,
    AdminAccount,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardDecision {
    Proceed,
    Bypass(BypassReason),
}

/// Decides, once per mount, whether the setup wizard is needed at all.
pub struct SetupGuard {
    directory: Arc<dyn ClusterDirectory>,
    navigator: Arc<dyn Navigator>,
    home_path: String,
}

impl SetupGuard {
    pub fn new(directory: Arc<dyn ClusterDirectory>, navigator: Arc<dyn Navigator>) -> Self {
        Self {
            directory,
            navigator,
            home_path: DEFAULT_HOME_PATH.to_string(),
        }
    }

    pub fn with_home_path(mut self, home_path: impl Into<String>) -> Self {
        self.home_path = home_path.into();
        self
    }

    /// Waits for the identity check and the cluster listing, then redirects
    /// home if a cluster already exists or the account is an administrator.
    pub async fn check(&self, auth: &mut AuthHandle) -> GuardDecision {
        let (snapshot, clusters) = tokio::join!(auth.settled(), self.directory.list_cluster_info());

        let cluster_count = match clusters {
            Ok(clusters) => clusters.len(),
            Err(err) => {
                warn!(error = %err, "could not list clusters; assuming none exist");
                0
            }
        };

        let decision = if cluster_count > 0 {
            GuardDecision::Bypass(BypassReason::ClusterExists)
        } else if snapshot.is_admin() {
            GuardDecision::Bypass(BypassReason::AdminAccount)
        } else {
            GuardDecision::Proceed
        };

        if let GuardDecision::Bypass(reason) = decision {
            info!(?reason, cluster_count, "setup not needed; redirecting home");
            self.navigator.navigate_to(&self.home_path);
        }
        decision
    }
}

#[cfg(test)]
#[path = "tests/wizard_tests.rs"]
mod tests;
