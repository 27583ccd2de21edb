//! Completeness predicates for setup input and the connection form model that
//! turns typed text into connection settings.

use std::sync::LazyLock;

use regex::Regex;
use shared::domain::{ClusterConnectionSettings, ClusterInfo};

use crate::{collaborators::ConnectionKind, verification::Outcome};

const BROKER_URL_PATTERN: &str = r"^pulsar://[a-zA-Z0-9.-]+(:\d+)?$";
const ADMIN_URL_PATTERN: &str = r"^https?://[a-zA-Z0-9.-]+(:\d+)?$";

static COLOR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^#([A-Fa-f0-9]{6})$").expect("color pattern is valid"));

/// Decides whether a service URL is complete enough to be worth verifying.
#[derive(Debug, Clone)]
pub struct ServiceUrlPattern {
    regex: Regex,
}

impl ServiceUrlPattern {
    pub fn new(pattern: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            regex: Regex::new(pattern)?,
        })
    }

    pub fn broker() -> Self {
        Self::new(BROKER_URL_PATTERN).expect("broker url pattern is valid")
    }

    pub fn admin() -> Self {
        Self::new(ADMIN_URL_PATTERN).expect("admin url pattern is valid")
    }

    pub fn matches(&self, service_url: &str) -> bool {
        self.regex.is_match(service_url)
    }

    pub fn is_complete(&self, settings: &ClusterConnectionSettings) -> bool {
        settings.authentication_method.is_supported() && self.matches(&settings.service_url)
    }
}

/// Static description of one connection step of the setup wizard.
#[derive(Debug, Clone)]
pub struct ConnectionForm {
    pub kind: ConnectionKind,
    pub title: &'static str,
    pub description: &'static str,
    pub service_url_label: &'static str,
    pub service_url_placeholder: &'static str,
    /// Fixed scheme shown in front of the input and prepended to typed text.
    pub service_url_prefix: &'static str,
    pub pattern: ServiceUrlPattern,
    pub success_message: &'static str,
    pub failure_message: &'static str,
}

impl ConnectionForm {
    pub fn broker() -> Self {
        Self {
            kind: ConnectionKind::Client,
            title: "Broker Connection",
            description: "Configure how Interfero connects to the Pulsar broker",
            service_url_label: "Broker Service URL",
            service_url_placeholder: "cluster.pulsar.local:6650",
            service_url_prefix: "pulsar://",
            pattern: ServiceUrlPattern::broker(),
            success_message: "Connection to Pulsar Broker successfully established!",
            failure_message: "Could not establish connection to the Pulsar broker",
        }
    }

    pub fn admin_api() -> Self {
        Self {
            kind: ConnectionKind::Admin,
            title: "Admin API Connection",
            description: "Configure how Interfero connects to the Pulsar Admin API",
            service_url_label: "Admin API URL",
            service_url_placeholder: "https://cluster.pulsar.local:8080",
            service_url_prefix: "",
            pattern: ServiceUrlPattern::admin(),
            success_message: "Connection to Pulsar Admin API successfully established",
            failure_message: "Could not establish connection to the Pulsar Admin API",
        }
    }

    /// Builds settings from what the user typed after the fixed prefix.
    pub fn settings_from_input(&self, typed: &str) -> ClusterConnectionSettings {
        ClusterConnectionSettings::new(format!("{}{}", self.service_url_prefix, typed))
    }

    /// Text to show in the input for previously entered settings.
    pub fn input_from_settings<'a>(&self, settings: &'a ClusterConnectionSettings) -> &'a str {
        settings
            .service_url
            .strip_prefix(self.service_url_prefix)
            .unwrap_or(&settings.service_url)
    }

    pub fn is_complete(&self, settings: &ClusterConnectionSettings) -> bool {
        self.pattern.is_complete(settings)
    }

    /// Nothing is shown until a verification has settled.
    pub fn message_for(&self, outcome: Outcome) -> Option<&'static str> {
        match outcome {
            Outcome::Unknown => None,
            Outcome::Valid => Some(self.success_message),
            Outcome::Invalid => Some(self.failure_message),
        }
    }
}

/// A cluster info draft counts once it has a name, an icon and a well-formed
/// color.
pub fn cluster_info_is_complete(info: &ClusterInfo) -> bool {
    !info.display_name.trim().is_empty()
        && !info.icon.trim().is_empty()
        && is_valid_color(&info.color)
}

pub fn is_valid_color(color: &str) -> bool {
    COLOR.is_match(color)
}
