use std::time::Duration;

use chrono::{DateTime, Utc};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::{schemas, Condition};

/// Protocol version stamped into derived cards when the spec leaves it unset.
pub const DEFAULT_PROTOCOL_VERSION: &str = "0.3.0";

const DEFAULT_SYNC_INTERVAL: Duration = Duration::from_secs(5 * 60);
const MIN_SYNC_INTERVAL: Duration = Duration::from_secs(1);

#[derive(CustomResource, Deserialize, Serialize, Debug, Default, PartialEq, Clone, JsonSchema)]
#[kube(
    group = "registrar.dev",
    version = "v1alpha1",
    kind = "Registry",
    plural = "registries",
    shortname = "reg",
    namespaced,
    status = "RegistryStatus",
    printcolumn = r#"{"name":"Registered","type":"integer","jsonPath":".status.registeredCount"}"#,
    printcolumn = r#"{"name":"Phase","type":"string","jsonPath":".status.phase"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct RegistrySpec {
    /// Which agents to discover and how often to resync them.
    #[serde(default)]
    pub discovery: DiscoverySpec,

    /// Protocol version stamped into every derived card and its public
    /// document. Defaults to "0.3.0".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol_version: Option<String>,
}

#[derive(Deserialize, Serialize, Debug, Default, PartialEq, Clone, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DiscoverySpec {
    /// When false, the registry publishes nothing and its phase stays NotStarted.
    #[serde(default)]
    pub enabled: bool,

    /// Selects the namespaces to search for agents. When absent, only the
    /// registry's own namespace is searched.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace_selector: Option<LabelSelector>,

    /// Requeue delay after each successful pass, e.g. "5m". Minimum 1s.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sync_interval: Option<String>,
}

/// Outcome of the most recent reconciliation pass.
#[derive(Deserialize, Serialize, Debug, PartialEq, Eq, Clone, Copy, JsonSchema)]
pub enum RegistryPhase {
    NotStarted,
    Discovering,
    Ready,
    Error,
}

#[derive(Deserialize, Serialize, Debug, PartialEq, Clone, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RegistryStatus {
    pub phase: RegistryPhase,

    /// Number of agents registered by the most recent pass.
    #[serde(default)]
    pub registered_count: i32,

    /// Set when a pass reaches a terminal phase (Ready or Error).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_sync: Option<DateTime<Utc>>,

    /// The last reconciled generation.
    #[schemars(schema_with = "schemas::observed_generation")]
    pub observed_generation: Option<i64>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    #[schemars(schema_with = "schemas::conditions")]
    pub conditions: Vec<Condition>,
}

impl Registry {
    pub fn protocol_version(&self) -> &str {
        self.spec
            .protocol_version
            .as_deref()
            .filter(|v| !v.is_empty())
            .unwrap_or(DEFAULT_PROTOCOL_VERSION)
    }

    /// The requeue delay after a completed pass, bounded below at one second.
    pub fn sync_interval(&self) -> Result<Duration, humantime::DurationError> {
        match self.spec.discovery.sync_interval.as_deref() {
            Some(raw) => humantime::parse_duration(raw).map(|d| d.max(MIN_SYNC_INTERVAL)),
            None => Ok(DEFAULT_SYNC_INTERVAL),
        }
    }

    /// Like [`Registry::sync_interval`], falling back to the default cadence
    /// when the configured value does not parse.
    pub fn sync_interval_or_default(&self) -> Duration {
        self.sync_interval().unwrap_or(DEFAULT_SYNC_INTERVAL)
    }

    pub fn phase(&self) -> Option<RegistryPhase> {
        self.status.as_ref().map(|status| status.phase)
    }
}
