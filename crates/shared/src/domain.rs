use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub i64);
    };
}

id_newtype!(ConnectionSettingsId);

pub const ADMIN_ROLE: &str = "ROLE_ADMIN";
pub const DEFAULT_CLUSTER_ICON: &str = "box";
pub const DEFAULT_CLUSTER_COLOR: &str = "#009869";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuthenticationMethod {
    #[default]
    NoAuth,
    BasicAuth,
    Jwt,
    Oidc,
}

impl AuthenticationMethod {
    /// Only unauthenticated connections can be configured during setup.
    pub fn is_supported(self) -> bool {
        matches!(self, AuthenticationMethod::NoAuth)
    }
}

/// Connection settings for either the Pulsar client (broker) or the admin API.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterConnectionSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<ConnectionSettingsId>,
    pub service_url: String,
    pub authentication_method: AuthenticationMethod,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authentication_details: Option<String>,
}

impl ClusterConnectionSettings {
    pub fn new(service_url: impl Into<String>) -> Self {
        Self {
            id: None,
            service_url: service_url.into(),
            authentication_method: AuthenticationMethod::NoAuth,
            authentication_details: None,
        }
    }
}

impl Default for ClusterConnectionSettings {
    fn default() -> Self {
        Self::new("")
    }
}

// Authentication details carry secrets and stay out of logs.
impl fmt::Debug for ClusterConnectionSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClusterConnectionSettings")
            .field("id", &self.id)
            .field("service_url", &self.service_url)
            .field("authentication_method", &self.authentication_method)
            .finish_non_exhaustive()
    }
}

impl fmt::Display for ClusterConnectionSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({:?})", self.service_url, self.authentication_method)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub internal_name: Option<String>,
    pub display_name: String,
    pub icon: String,
    pub color: String,
}

impl ClusterInfo {
    pub fn named(display_name: impl Into<String>) -> Self {
        Self {
            display_name: display_name.into(),
            ..Self::default()
        }
    }
}

impl Default for ClusterInfo {
    fn default() -> Self {
        Self {
            cluster_id: None,
            internal_name: None,
            display_name: String::new(),
            icon: DEFAULT_CLUSTER_ICON.to_string(),
            color: DEFAULT_CLUSTER_COLOR.to_string(),
        }
    }
}

/// Everything the console needs to register a new cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterCreation {
    pub cluster_info: ClusterInfo,
    pub client_connection_settings: ClusterConnectionSettings,
    pub admin_connection_settings: ClusterConnectionSettings,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountInfo {
    pub username: String,
    #[serde(default)]
    pub roles: Vec<String>,
}

impl AccountInfo {
    pub fn is_admin(&self) -> bool {
        self.roles.iter().any(|role| role == ADMIN_ROLE)
    }
}
