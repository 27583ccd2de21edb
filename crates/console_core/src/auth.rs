//! Read-only view of the identity check, passed explicitly to the access gate
//! and the setup guard.

use std::sync::Arc;

use shared::{domain::AccountInfo, error::ApiError};
use tokio::{sync::watch, task::JoinHandle};
use tracing::{info, warn};

use crate::collaborators::IdentityProvider;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AuthSnapshot {
    pub loading: bool,
    pub authenticated: bool,
    pub account_info: Option<AccountInfo>,
}

impl AuthSnapshot {
    pub fn loading() -> Self {
        Self {
            loading: true,
            ..Self::default()
        }
    }

    pub fn unauthenticated() -> Self {
        Self::default()
    }

    pub fn authenticated(account_info: AccountInfo) -> Self {
        Self {
            loading: false,
            authenticated: true,
            account_info: Some(account_info),
        }
    }

    /// Errors and payloads without a username count as unauthenticated.
    pub fn from_result(result: Result<AccountInfo, ApiError>) -> Self {
        match result {
            Ok(account_info) if !account_info.username.trim().is_empty() => {
                Self::authenticated(account_info)
            }
            Ok(_) => {
                warn!("identity check returned an account without a username");
                Self::unauthenticated()
            }
            Err(err) => {
                info!(error = %err, "identity check failed; treating as unauthenticated");
                Self::unauthenticated()
            }
        }
    }

    pub fn is_admin(&self) -> bool {
        self.authenticated && self.account_info.as_ref().is_some_and(AccountInfo::is_admin)
    }
}

#[derive(Debug, Clone)]
pub struct AuthHandle {
    rx: watch::Receiver<AuthSnapshot>,
}

impl AuthHandle {
    /// Creates a handle fed by the returned sender.
    pub fn channel(initial: AuthSnapshot) -> (watch::Sender<AuthSnapshot>, Self) {
        let (tx, rx) = watch::channel(initial);
        (tx, Self { rx })
    }

    /// Runs the identity check once and publishes its result. The handle
    /// reports `loading` until the provider answers.
    pub fn spawn(provider: Arc<dyn IdentityProvider>) -> (Self, JoinHandle<()>) {
        let (tx, handle) = Self::channel(AuthSnapshot::loading());
        let task = tokio::spawn(async move {
            let snapshot = AuthSnapshot::from_result(provider.account_info().await);
            tx.send_replace(snapshot);
        });
        (handle, task)
    }

    pub fn current(&self) -> AuthSnapshot {
        self.rx.borrow().clone()
    }

    /// Waits for the next change; `None` once the identity source is gone.
    pub async fn changed(&mut self) -> Option<AuthSnapshot> {
        self.rx.changed().await.ok()?;
        Some(self.rx.borrow_and_update().clone())
    }

    /// Last known snapshot, where a source that vanished mid-check reads as
    /// unauthenticated.
    pub fn final_snapshot(&self) -> AuthSnapshot {
        let current = self.current();
        if current.loading {
            AuthSnapshot::unauthenticated()
        } else {
            current
        }
    }

    pub fn is_closed(&self) -> bool {
        self.rx.has_changed().is_err()
    }

    /// Waits until the identity check is no longer loading.
    pub async fn settled(&mut self) -> AuthSnapshot {
        match self.rx.wait_for(|snapshot| !snapshot.loading).await {
            Ok(snapshot) => snapshot.clone(),
            Err(_) => AuthSnapshot::unauthenticated(),
        }
    }
}
