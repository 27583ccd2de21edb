//! Scripted setup sessions: a TOML description of what the backend answers and
//! what the operator types, replayed through the console core.

use std::{
    fmt,
    path::Path,
    sync::{Arc, Mutex},
    time::Duration,
};

use anyhow::Context;
use async_trait::async_trait;
use console_core::{
    AccessGateTask, Advance, AuthHandle, ClusterCreator, ClusterDirectory, ConnectionForm,
    ConnectionVerifier, Debouncer, GateDecision, GuardDecision, IdentityProvider, Navigator,
    Notification, Notifier, Routes, SetupGuard, SetupStep, SetupValue, StepController, Timings,
    VerificationSession,
};
use serde::Deserialize;
use shared::{
    domain::{AccountInfo, ClusterConnectionSettings, ClusterCreation, ClusterInfo},
    error::{ApiError, ErrorCode},
};
use tokio::time::{sleep, Instant};
use tracing::{info, warn};

#[derive(Debug, Clone, Deserialize)]
pub struct Scenario {
    #[serde(default)]
    pub identity: IdentityScript,
    #[serde(default)]
    pub directory: DirectoryScript,
    #[serde(default)]
    pub verifier: VerifierScript,
    #[serde(default)]
    pub client: Vec<Typing>,
    #[serde(default)]
    pub admin: Vec<Typing>,
    #[serde(default)]
    pub cluster: ClusterScript,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct IdentityScript {
    pub latency_ms: u64,
    pub username: String,
    pub roles: Vec<String>,
    pub fails: bool,
}

impl Default for IdentityScript {
    fn default() -> Self {
        Self {
            latency_ms: 100,
            username: "operator".into(),
            roles: Vec::new(),
            fails: false,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DirectoryScript {
    /// Display names of clusters that already exist.
    pub clusters: Vec<String>,
    pub fails: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct VerifierScript {
    pub latency_ms: u64,
    /// Service URLs the backend can reach; everything else is refused.
    pub reachable: Vec<String>,
}

impl Default for VerifierScript {
    fn default() -> Self {
        Self {
            latency_ms: 80,
            reachable: Vec::new(),
        }
    }
}

/// One round of typing into a connection form, one character per keystroke.
#[derive(Debug, Clone, Deserialize)]
pub struct Typing {
    pub text: String,
    #[serde(default = "default_keystroke_ms")]
    pub keystroke_ms: u64,
}

fn default_keystroke_ms() -> u64 {
    100
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ClusterScript {
    pub display_name: String,
    pub color: Option<String>,
    /// How many creation attempts the backend refuses before accepting one.
    pub failing_attempts: u32,
    pub max_attempts: u32,
}

impl Default for ClusterScript {
    fn default() -> Self {
        Self {
            display_name: String::new(),
            color: None,
            failing_attempts: 0,
            max_attempts: 1,
        }
    }
}

impl Scenario {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read scenario '{}'", path.display()))?;
        toml::from_str(&raw).with_context(|| format!("invalid scenario '{}'", path.display()))
    }
}

/// Backend and browser stand-ins answering from the scenario script.
pub struct ScriptedBackend {
    started: Instant,
    script: Scenario,
    journal: Mutex<Journal>,
    creation_attempts: Mutex<u32>,
}

#[derive(Debug, Default, Clone)]
pub struct Journal {
    pub verify_calls: Vec<(Duration, &'static str, String)>,
    pub notifications: Vec<(Duration, Notification)>,
    pub navigations: Vec<(Duration, String)>,
    pub created: Vec<ClusterCreation>,
}

impl ScriptedBackend {
    pub fn new(script: Scenario) -> Arc<Self> {
        Arc::new(Self {
            started: Instant::now(),
            script,
            journal: Mutex::new(Journal::default()),
            creation_attempts: Mutex::new(0),
        })
    }

    pub fn journal(&self) -> Journal {
        self.with_journal(|journal| journal.clone())
    }

    fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    fn with_journal<T>(&self, f: impl FnOnce(&mut Journal) -> T) -> T {
        let mut journal = self
            .journal
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&mut journal)
    }

    async fn check(
        &self,
        endpoint: &'static str,
        settings: &ClusterConnectionSettings,
    ) -> Result<(), ApiError> {
        let at = self.elapsed();
        self.with_journal(|journal| {
            journal
                .verify_calls
                .push((at, endpoint, settings.service_url.clone()))
        });
        sleep(Duration::from_millis(self.script.verifier.latency_ms)).await;

        if self
            .script
            .verifier
            .reachable
            .iter()
            .any(|url| *url == settings.service_url)
        {
            Ok(())
        } else {
            Err(ApiError::connection_failed(format!(
                "{} is not reachable",
                settings.service_url
            )))
        }
    }
}

#[async_trait]
impl IdentityProvider for ScriptedBackend {
    async fn account_info(&self) -> Result<AccountInfo, ApiError> {
        let identity = &self.script.identity;
        sleep(Duration::from_millis(identity.latency_ms)).await;
        if identity.fails {
            return Err(ApiError::unauthorized("session expired"));
        }
        Ok(AccountInfo {
            username: identity.username.clone(),
            roles: identity.roles.clone(),
        })
    }
}

#[async_trait]
impl ConnectionVerifier for ScriptedBackend {
    async fn verify_client_connection(
        &self,
        settings: &ClusterConnectionSettings,
    ) -> Result<(), ApiError> {
        self.check("client", settings).await
    }

    async fn verify_admin_connection(
        &self,
        settings: &ClusterConnectionSettings,
    ) -> Result<(), ApiError> {
        self.check("admin", settings).await
    }
}

#[async_trait]
impl ClusterDirectory for ScriptedBackend {
    async fn list_cluster_info(&self) -> Result<Vec<ClusterInfo>, ApiError> {
        let directory = &self.script.directory;
        if directory.fails {
            return Err(ApiError::new(ErrorCode::Internal, "directory unavailable"));
        }
        Ok(directory.clusters.iter().map(ClusterInfo::named).collect())
    }
}

#[async_trait]
impl ClusterCreator for ScriptedBackend {
    async fn create_cluster(&self, creation: ClusterCreation) -> Result<(), ApiError> {
        let attempt = {
            let mut attempts = self
                .creation_attempts
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            *attempts += 1;
            *attempts
        };
        if attempt <= self.script.cluster.failing_attempts {
            return Err(ApiError::internal(format!(
                "cluster '{}' could not be stored",
                creation.cluster_info.display_name
            )));
        }
        self.with_journal(|journal| journal.created.push(creation));
        Ok(())
    }
}

impl Navigator for ScriptedBackend {
    fn navigate_to(&self, path: &str) {
        let at = self.elapsed();
        info!(at_ms = at.as_millis() as u64, path, "navigate");
        self.with_journal(|journal| journal.navigations.push((at, path.to_string())));
    }
}

impl Notifier for ScriptedBackend {
    fn notify(&self, notification: Notification) {
        let at = self.elapsed();
        info!(at_ms = at.as_millis() as u64, ?notification, "toast");
        self.with_journal(|journal| journal.notifications.push((at, notification)));
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Ending {
    RedirectedToLogin,
    SetupBypassed,
    StuckAtStep(SetupStep),
    CreationFailed { attempts: u32 },
    ClusterCreated,
}

#[derive(Debug, Clone)]
pub struct Summary {
    pub ending: Ending,
    pub gate: Vec<(Duration, GateDecision)>,
    pub journal: Journal,
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "ending: {:?}", self.ending)?;
        for (at, decision) in &self.gate {
            writeln!(f, "  {:>6}ms gate      {decision:?}", at.as_millis())?;
        }
        for (at, endpoint, url) in &self.journal.verify_calls {
            writeln!(f, "  {:>6}ms verify    {endpoint} {url}", at.as_millis())?;
        }
        for (at, notification) in &self.journal.notifications {
            writeln!(f, "  {:>6}ms toast     {notification:?}", at.as_millis())?;
        }
        for (at, path) in &self.journal.navigations {
            writeln!(f, "  {:>6}ms navigate  {path}", at.as_millis())?;
        }
        write!(f, "clusters created: {}", self.journal.created.len())
    }
}

pub async fn replay(script: Scenario, timings: Timings, routes: Routes) -> anyhow::Result<Summary> {
    let backend = ScriptedBackend::new(script.clone());
    let mut gate_log = Vec::new();

    let (auth, _identity) = AuthHandle::spawn(backend.clone());
    let mut gate = AccessGateTask::spawn(
        auth.clone(),
        timings.grace_period,
        routes.login.clone(),
        backend.clone(),
    );

    let denied = loop {
        let Some(decision) = gate.changed().await else {
            break true;
        };
        let at = backend.elapsed();
        info!(at_ms = at.as_millis() as u64, ?decision, "gate");
        gate_log.push((at, decision));
        match decision {
            GateDecision::ShowContent => break false,
            GateDecision::Redirecting => break true,
            GateDecision::ShowBusy | GateDecision::ShowNothing => {}
        }
    };

    let ending = if denied {
        Ending::RedirectedToLogin
    } else {
        run_wizard(&script, &backend, auth, timings, &routes).await?
    };
    info!(?ending, "replay finished");

    Ok(Summary {
        ending,
        gate: gate_log,
        journal: backend.journal(),
    })
}

async fn run_wizard(
    script: &Scenario,
    backend: &Arc<ScriptedBackend>,
    mut auth: AuthHandle,
    timings: Timings,
    routes: &Routes,
) -> anyhow::Result<Ending> {
    let guard = SetupGuard::new(backend.clone(), backend.clone()).with_home_path(routes.home.clone());
    if let GuardDecision::Bypass(reason) = guard.check(&mut auth).await {
        info!(?reason, "setup bypassed");
        return Ok(Ending::SetupBypassed);
    }

    let mut wizard = StepController::cluster_setup(backend.clone(), backend.clone(), backend.clone())
        .with_redirect(timings.redirect_delay, routes.home.clone());

    for (step, typing) in [
        (SetupStep::ClientConnection, &script.client),
        (SetupStep::AdminConnection, &script.admin),
    ] {
        let form = step
            .connection_form()
            .context("connection step without a form")?;
        let verified = fill_connection_form(&form, typing, backend, timings).await;
        let value = match step {
            SetupStep::AdminConnection => SetupValue::AdminConnection(verified),
            _ => SetupValue::ClientConnection(verified),
        };
        wizard.set_step_value(value);
        if !matches!(wizard.advance().await, Advance::Moved(_)) {
            warn!(?step, "step has no verified connection");
            return Ok(Ending::StuckAtStep(step));
        }
    }

    let mut draft = ClusterInfo::named(script.cluster.display_name.clone());
    if let Some(color) = &script.cluster.color {
        draft.color = color.clone();
    }
    wizard.set_step_value(SetupValue::cluster_info_draft(draft));
    if !wizard.is_advance_enabled() {
        warn!("cluster info is incomplete");
        return Ok(Ending::StuckAtStep(SetupStep::ClusterInfo));
    }

    let max_attempts = script.cluster.max_attempts.max(1);
    for attempt in 1..=max_attempts {
        match wizard.advance().await {
            Advance::Committed(redirect) => {
                redirect.await.context("redirect task failed")?;
                return Ok(Ending::ClusterCreated);
            }
            Advance::Failed(err) => warn!(attempt, error = %err, "cluster creation failed"),
            other => anyhow::bail!("unexpected wizard state on commit: {other:?}"),
        }
    }
    Ok(Ending::CreationFailed {
        attempts: max_attempts,
    })
}

/// Types each round into a freshly mounted form and returns the settings the
/// backend accepted after the last round, if any.
async fn fill_connection_form(
    form: &ConnectionForm,
    rounds: &[Typing],
    backend: &Arc<ScriptedBackend>,
    timings: Timings,
) -> Option<ClusterConnectionSettings> {
    let session = VerificationSession::for_connection_form(
        form,
        Debouncer::new(timings.debounce_window),
        backend.clone(),
        None,
    );
    let mut snapshots = session.subscribe();

    for round in rounds {
        if round.text.is_empty() {
            warn!(form = form.title, "skipping empty typing round");
            continue;
        }
        let mut typed = String::new();
        for (i, ch) in round.text.chars().enumerate() {
            if i > 0 {
                sleep(Duration::from_millis(round.keystroke_ms)).await;
            }
            typed.push(ch);
            session.set_input(form.settings_from_input(&typed));
        }

        // Let the window close, then wait until the final value has been
        // taken up and its verification settled.
        sleep(timings.debounce_window + Duration::from_millis(1)).await;
        let expected = form.settings_from_input(&typed);
        let settled = snapshots
            .wait_for(|snapshot| {
                snapshot.input.as_ref() == Some(&expected) && !snapshot.in_flight
            })
            .await
            .map(|snapshot| snapshot.clone())
            .unwrap_or_default();
        info!(
            form = form.title,
            input = %typed,
            outcome = ?settled.outcome,
            message = form.message_for(settled.outcome).unwrap_or(""),
            "connection form settled"
        );
    }

    session.snapshot().verified
}

#[cfg(test)]
#[path = "tests/scenario_tests.rs"]
mod tests;
