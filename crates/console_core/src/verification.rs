//! Debounced verification of form input.
//!
//! [`VerificationReducer`] is the synchronous state machine: every settled
//! input gets a fresh [`RequestId`], and only the settlement carrying the
//! newest id may change the outcome. [`VerificationSession`] drives the
//! reducer for one mounted form, wiring it to the debounce primitive and to
//! the verification call.

use std::sync::Arc;

use async_trait::async_trait;
use shared::{domain::ClusterConnectionSettings, error::ApiError};
use tokio::{
    sync::{mpsc, watch},
    task::JoinHandle,
};
use tracing::{debug, info, warn};

use crate::{
    collaborators::{ConnectionKind, ConnectionVerifier},
    debounce::Debouncer,
    validation::ConnectionForm,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Unknown,
    Valid,
    Invalid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerificationState {
    Unknown,
    Pending(RequestId),
    Valid,
    Invalid,
}

impl VerificationState {
    pub fn outcome(self) -> Outcome {
        match self {
            VerificationState::Unknown | VerificationState::Pending(_) => Outcome::Unknown,
            VerificationState::Valid => Outcome::Valid,
            VerificationState::Invalid => Outcome::Invalid,
        }
    }

    pub fn in_flight(self) -> bool {
        matches!(self, VerificationState::Pending(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationSnapshot<V> {
    pub outcome: Outcome,
    pub in_flight: bool,
    /// The latest debounced input the outcome refers to.
    pub input: Option<V>,
    /// The input the latest successful verification ran against, if any.
    pub verified: Option<V>,
}

impl<V> Default for VerificationSnapshot<V> {
    fn default() -> Self {
        Self {
            outcome: Outcome::Unknown,
            in_flight: false,
            input: None,
            verified: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect<V> {
    /// Input is incomplete: nothing to verify, previously verified value dropped.
    Cleared,
    /// Run the verification call once for `value` and report back under `id`.
    Dispatch { id: RequestId, value: V },
}

pub type Predicate<V> = Box<dyn Fn(&V) -> bool + Send + Sync>;

pub struct VerificationReducer<V> {
    predicate: Predicate<V>,
    state: VerificationState,
    next_id: u64,
    latest: Option<RequestId>,
    input: Option<V>,
    pending: Option<V>,
    verified: Option<V>,
}

impl<V: Clone> VerificationReducer<V> {
    pub fn new(predicate: impl Fn(&V) -> bool + Send + Sync + 'static) -> Self {
        Self {
            predicate: Box::new(predicate),
            state: VerificationState::Unknown,
            next_id: 0,
            latest: None,
            input: None,
            pending: None,
            verified: None,
        }
    }

    pub fn state(&self) -> VerificationState {
        self.state
    }

    pub fn latest_request(&self) -> Option<RequestId> {
        self.latest
    }

    /// Feeds one debounced input. Incomplete input still supersedes whatever
    /// request is in flight.
    pub fn on_input(&mut self, value: V) -> Effect<V> {
        self.next_id += 1;
        let id = RequestId(self.next_id);
        self.latest = Some(id);
        self.input = Some(value.clone());
        self.verified = None;

        if !(self.predicate)(&value) {
            self.state = VerificationState::Unknown;
            self.pending = None;
            return Effect::Cleared;
        }

        self.state = VerificationState::Pending(id);
        self.pending = Some(value.clone());
        Effect::Dispatch { id, value }
    }

    /// Applies a settled call. Returns `false` when the result was stale and
    /// got discarded.
    pub fn on_settled(&mut self, id: RequestId, ok: bool) -> bool {
        if self.state != VerificationState::Pending(id) {
            return false;
        }

        if ok {
            self.state = VerificationState::Valid;
            self.verified = self.pending.take();
        } else {
            self.state = VerificationState::Invalid;
            self.pending = None;
        }
        true
    }

    pub fn snapshot(&self) -> VerificationSnapshot<V> {
        VerificationSnapshot {
            outcome: self.state.outcome(),
            in_flight: self.state.in_flight(),
            input: self.input.clone(),
            verified: self.verified.clone(),
        }
    }
}

/// The verification call a session dispatches. Any `Err` counts as invalid.
#[async_trait]
pub trait Verify<V>: Send + Sync {
    async fn verify(&self, value: &V) -> Result<(), ApiError>;
}

/// Verifies connection settings against one of the two backend endpoints.
pub struct ConnectionCheck {
    kind: ConnectionKind,
    verifier: Arc<dyn ConnectionVerifier>,
}

impl ConnectionCheck {
    pub fn new(kind: ConnectionKind, verifier: Arc<dyn ConnectionVerifier>) -> Self {
        Self { kind, verifier }
    }
}

#[async_trait]
impl Verify<ClusterConnectionSettings> for ConnectionCheck {
    async fn verify(&self, value: &ClusterConnectionSettings) -> Result<(), ApiError> {
        self.kind.verify(self.verifier.as_ref(), value).await
    }
}

/// One mounted verification form. Dropping the session unmounts it: pending
/// debounce timers are released and late verification results are ignored.
pub struct VerificationSession<V> {
    inputs: mpsc::UnboundedSender<V>,
    snapshots: watch::Receiver<VerificationSnapshot<V>>,
    task: JoinHandle<()>,
}

impl<V> VerificationSession<V>
where
    V: Clone + Send + Sync + std::fmt::Debug + 'static,
{
    /// Mounts a session. An `initial` value (e.g. settings entered before the
    /// user navigated back) is verified right away, without debouncing.
    pub fn spawn(
        debouncer: Debouncer,
        reducer: VerificationReducer<V>,
        verify: Arc<dyn Verify<V>>,
        initial: Option<V>,
    ) -> Self {
        let (inputs, raw_inputs) = mpsc::unbounded_channel();
        let (snapshot_tx, snapshots) = watch::channel(reducer.snapshot());
        let task = tokio::spawn(drive(
            debouncer,
            reducer,
            verify,
            initial,
            raw_inputs,
            snapshot_tx,
        ));
        Self {
            inputs,
            snapshots,
            task,
        }
    }

    /// Records a raw edit; it reaches the reducer once typing pauses.
    pub fn set_input(&self, value: V) {
        if self.inputs.send(value).is_err() {
            debug!("verification session closed; dropping input");
        }
    }

    pub fn snapshot(&self) -> VerificationSnapshot<V> {
        self.snapshots.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<VerificationSnapshot<V>> {
        self.snapshots.clone()
    }

    /// Waits for the next published snapshot.
    pub async fn changed(&mut self) -> Option<VerificationSnapshot<V>> {
        self.snapshots.changed().await.ok()?;
        Some(self.snapshots.borrow_and_update().clone())
    }
}

impl VerificationSession<ClusterConnectionSettings> {
    /// Mounts the session behind one of the setup wizard's connection steps.
    pub fn for_connection_form(
        form: &ConnectionForm,
        debouncer: Debouncer,
        verifier: Arc<dyn ConnectionVerifier>,
        initial: Option<ClusterConnectionSettings>,
    ) -> Self {
        let pattern = form.pattern.clone();
        let reducer = VerificationReducer::new(move |settings: &ClusterConnectionSettings| {
            pattern.is_complete(settings)
        });
        let check = Arc::new(ConnectionCheck::new(form.kind, verifier));
        Self::spawn(debouncer, reducer, check, initial)
    }
}

impl<V> Drop for VerificationSession<V> {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn drive<V>(
    debouncer: Debouncer,
    mut reducer: VerificationReducer<V>,
    verify: Arc<dyn Verify<V>>,
    initial: Option<V>,
    mut raw_inputs: mpsc::UnboundedReceiver<V>,
    snapshots: watch::Sender<VerificationSnapshot<V>>,
) where
    V: Clone + Send + Sync + std::fmt::Debug + 'static,
{
    let mut debounced = debouncer.spawn::<V>();
    let (settled_tx, mut settled_rx) = mpsc::unbounded_channel::<(RequestId, bool)>();

    if let Some(value) = initial {
        apply_input(&mut reducer, value, &verify, &settled_tx);
        snapshots.send_replace(reducer.snapshot());
    }

    loop {
        tokio::select! {
            raw = raw_inputs.recv() => match raw {
                Some(value) => debounced.push(value),
                None => break,
            },
            Some(value) = debounced.next() => {
                apply_input(&mut reducer, value, &verify, &settled_tx);
                snapshots.send_replace(reducer.snapshot());
            }
            Some((id, ok)) = settled_rx.recv() => {
                if reducer.on_settled(id, ok) {
                    info!(request_id = id.0, ok, "verification settled");
                    snapshots.send_replace(reducer.snapshot());
                } else {
                    debug!(request_id = id.0, ok, "discarding stale verification result");
                }
            }
        }
    }
}

fn apply_input<V>(
    reducer: &mut VerificationReducer<V>,
    value: V,
    verify: &Arc<dyn Verify<V>>,
    settled_tx: &mpsc::UnboundedSender<(RequestId, bool)>,
) where
    V: Clone + Send + Sync + std::fmt::Debug + 'static,
{
    match reducer.on_input(value) {
        Effect::Cleared => debug!("input incomplete; verification skipped"),
        Effect::Dispatch { id, value } => {
            debug!(request_id = id.0, ?value, "dispatching verification");
            let verify = Arc::clone(verify);
            let settled_tx = settled_tx.clone();
            // Superseded calls run to completion; their results are ignored.
            let call = tokio::spawn(async move { verify.verify(&value).await });
            tokio::spawn(async move {
                let ok = match call.await {
                    Ok(Ok(())) => true,
                    Ok(Err(err)) => {
                        debug!(request_id = id.0, error = %err, "verification rejected");
                        false
                    }
                    Err(err) => {
                        warn!(request_id = id.0, error = %err, "verification call aborted");
                        false
                    }
                };
                let _ = settled_tx.send((id, ok));
            });
        }
    }
}

#[cfg(test)]
#[path = "tests/verification_tests.rs"]
mod tests;
