//! Access gate in front of protected content.
//!
//! A fast identity check should never flash a spinner, so the busy indicator
//! only shows once loading has lasted longer than the grace period. A settled
//! "not authenticated" answer redirects to the login page, once per
//! settlement.

use std::{future::pending, pin::Pin, sync::Arc, time::Duration};

use tokio::{
    sync::watch,
    task::JoinHandle,
    time::{sleep, Sleep},
};
use tracing::{debug, info};

use crate::{auth::AuthHandle, auth::AuthSnapshot, collaborators::Navigator};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateState {
    Idle,
    WaitingGrace,
    Busy,
    SettledAuthenticated,
    SettledDenied,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    ShowContent,
    ShowBusy,
    Redirecting,
    ShowNothing,
}

/// Identifies one armed grace timer so a late firing can be told apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GraceToken(u64);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateEffect {
    StartGraceTimer(GraceToken),
    CancelGraceTimer,
    Redirect(String),
}

#[derive(Debug)]
pub struct AccessGate {
    state: GateState,
    login_path: String,
    armed: Option<GraceToken>,
    next_token: u64,
}

impl AccessGate {
    pub fn new(login_path: impl Into<String>) -> Self {
        Self {
            state: GateState::Idle,
            login_path: login_path.into(),
            armed: None,
            next_token: 0,
        }
    }

    pub fn state(&self) -> GateState {
        self.state
    }

    pub fn decision(&self) -> GateDecision {
        match self.state {
            GateState::Idle | GateState::WaitingGrace => GateDecision::ShowNothing,
            GateState::Busy => GateDecision::ShowBusy,
            GateState::SettledAuthenticated => GateDecision::ShowContent,
            GateState::SettledDenied => GateDecision::Redirecting,
        }
    }

    /// Applies one observation of the identity signals. Observing the same
    /// signals again produces no effects.
    pub fn observe(&mut self, loading: bool, authenticated: bool) -> Vec<GateEffect> {
        let mut effects = Vec::new();

        // A known-good answer wins over a stale loading flag.
        if authenticated {
            self.disarm(&mut effects);
            self.state = GateState::SettledAuthenticated;
            return effects;
        }

        if loading {
            if !matches!(self.state, GateState::WaitingGrace | GateState::Busy) {
                self.disarm(&mut effects);
                self.next_token += 1;
                let token = GraceToken(self.next_token);
                self.armed = Some(token);
                self.state = GateState::WaitingGrace;
                effects.push(GateEffect::StartGraceTimer(token));
            }
            return effects;
        }

        self.disarm(&mut effects);
        if self.state != GateState::SettledDenied {
            self.state = GateState::SettledDenied;
            effects.push(GateEffect::Redirect(self.login_path.clone()));
        }
        effects
    }

    pub fn observe_snapshot(&mut self, snapshot: &AuthSnapshot) -> Vec<GateEffect> {
        self.observe(snapshot.loading, snapshot.authenticated)
    }

    /// Returns `true` if the timer moved the gate to `Busy`.
    pub fn on_grace_elapsed(&mut self, token: GraceToken) -> bool {
        if self.state != GateState::WaitingGrace || self.armed != Some(token) {
            return false;
        }
        self.armed = None;
        self.state = GateState::Busy;
        true
    }

    fn disarm(&mut self, effects: &mut Vec<GateEffect>) {
        if self.armed.take().is_some() {
            effects.push(GateEffect::CancelGraceTimer);
        }
    }
}

type ArmedTimer = Option<(GraceToken, Pin<Box<Sleep>>)>;

/// Runs an [`AccessGate`] against a live [`AuthHandle`]. Dropping the task
/// releases any armed timer; nothing fires afterwards.
pub struct AccessGateTask {
    decisions: watch::Receiver<GateDecision>,
    task: JoinHandle<()>,
}

impl AccessGateTask {
    pub fn spawn(
        auth: AuthHandle,
        grace_period: Duration,
        login_path: impl Into<String>,
        navigator: Arc<dyn Navigator>,
    ) -> Self {
        let gate = AccessGate::new(login_path);
        let (decision_tx, decisions) = watch::channel(gate.decision());
        let task = tokio::spawn(run(gate, auth, grace_period, navigator, decision_tx));
        Self { decisions, task }
    }

    pub fn decision(&self) -> GateDecision {
        *self.decisions.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<GateDecision> {
        self.decisions.clone()
    }

    pub async fn changed(&mut self) -> Option<GateDecision> {
        self.decisions.changed().await.ok()?;
        Some(*self.decisions.borrow_and_update())
    }
}

impl Drop for AccessGateTask {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn run(
    mut gate: AccessGate,
    mut auth: AuthHandle,
    grace_period: Duration,
    navigator: Arc<dyn Navigator>,
    decisions: watch::Sender<GateDecision>,
) {
    let mut timer: ArmedTimer = None;
    let mut source_open = true;

    let initial = auth.current();
    apply(&mut gate, &initial, &mut timer, grace_period, navigator.as_ref(), &decisions);

    loop {
        tokio::select! {
            next = auth.changed(), if source_open => {
                let snapshot = match next {
                    Some(snapshot) => snapshot,
                    None => {
                        source_open = false;
                        auth.final_snapshot()
                    }
                };
                apply(&mut gate, &snapshot, &mut timer, grace_period, navigator.as_ref(), &decisions);
            }
            token = grace_elapsed(&mut timer) => {
                timer = None;
                if gate.on_grace_elapsed(token) {
                    info!("identity check still loading after grace period; showing busy indicator");
                    publish(&decisions, gate.decision());
                }
            }
        }
    }
}

fn apply(
    gate: &mut AccessGate,
    snapshot: &AuthSnapshot,
    timer: &mut ArmedTimer,
    grace_period: Duration,
    navigator: &dyn Navigator,
    decisions: &watch::Sender<GateDecision>,
) {
    for effect in gate.observe_snapshot(snapshot) {
        match effect {
            GateEffect::StartGraceTimer(token) => {
                *timer = Some((token, Box::pin(sleep(grace_period))));
            }
            GateEffect::CancelGraceTimer => *timer = None,
            GateEffect::Redirect(path) => {
                info!(path = %path, "not authenticated; redirecting");
                navigator.navigate_to(&path);
            }
        }
    }
    debug!(state = ?gate.state(), "access gate observed identity signals");
    publish(decisions, gate.decision());
}

fn publish(decisions: &watch::Sender<GateDecision>, decision: GateDecision) {
    decisions.send_if_modified(|current| {
        if *current == decision {
            return false;
        }
        *current = decision;
        true
    });
}

async fn grace_elapsed(timer: &mut ArmedTimer) -> GraceToken {
    match timer {
        Some((token, deadline)) => {
            deadline.as_mut().await;
            *token
        }
        None => pending().await,
    }
}

#[cfg(test)]
#[path = "tests/access_gate_tests.rs"]
mod tests;
