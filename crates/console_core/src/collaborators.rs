//! External collaborators the core observes or calls. Transport lives behind
//! these traits.

use async_trait::async_trait;
use shared::{
    domain::{AccountInfo, ClusterConnectionSettings, ClusterCreation, ClusterInfo},
    error::ApiError,
};

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn account_info(&self) -> Result<AccountInfo, ApiError>;
}

/// Idempotent connection checks. `Ok` means the backend reached the cluster.
#[async_trait]
pub trait ConnectionVerifier: Send + Sync {
    async fn verify_client_connection(
        &self,
        settings: &ClusterConnectionSettings,
    ) -> Result<(), ApiError>;
    async fn verify_admin_connection(
        &self,
        settings: &ClusterConnectionSettings,
    ) -> Result<(), ApiError>;
}

#[async_trait]
pub trait ClusterDirectory: Send + Sync {
    async fn list_cluster_info(&self) -> Result<Vec<ClusterInfo>, ApiError>;
}

#[async_trait]
pub trait ClusterCreator: Send + Sync {
    async fn create_cluster(&self, creation: ClusterCreation) -> Result<(), ApiError>;
}

pub trait Navigator: Send + Sync {
    fn navigate_to(&self, path: &str);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    Loading(String),
    Success(String),
    Error(String),
}

impl Notification {
    pub fn message(&self) -> &str {
        match self {
            Notification::Loading(message)
            | Notification::Success(message)
            | Notification::Error(message) => message,
        }
    }
}

pub trait Notifier: Send + Sync {
    fn notify(&self, notification: Notification);
}

/// Which of the two verification endpoints a connection form uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionKind {
    Client,
    Admin,
}

impl ConnectionKind {
    pub async fn verify(
        self,
        verifier: &dyn ConnectionVerifier,
        settings: &ClusterConnectionSettings,
    ) -> Result<(), ApiError> {
        match self {
            ConnectionKind::Client => verifier.verify_client_connection(settings).await,
            ConnectionKind::Admin => verifier.verify_admin_connection(settings).await,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ConnectionKind::Client => "client",
            ConnectionKind::Admin => "admin",
        }
    }
}
