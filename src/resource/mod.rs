// https://github.com/GREsau/schemars/pull/65
#![allow(clippy::field_reassign_with_default)]
// From `CustomResource`
#![allow(clippy::default_trait_access)]

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

mod agent;
mod card;
mod registry;
mod schemas;

pub use agent::{
    A2aConfig, Agent, AgentSkill, AgentSpec, AgentTool, CAPABILITIES_ANNOTATION,
    DISABLED_ANNOTATION, ENDPOINT_ANNOTATION, METADATA_ANNOTATION_PREFIX, REGISTER_ANNOTATION,
};
pub use card::{Card, CardEndpoint, CardSpec, CardStatus, SourceRef};
pub use registry::{
    DiscoverySpec, Registry, RegistryPhase, RegistrySpec, RegistryStatus, DEFAULT_PROTOCOL_VERSION,
};

/// A single entry of `.status.conditions`, shared by `Registry` and `Card`.
#[derive(Deserialize, Serialize, Debug, PartialEq, Clone, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Type of condition.
    #[serde(rename = "type")]
    pub type_: String,

    /// Status of the condition. Maps to String enum: Unknown, True, False.
    #[serde(
        default,
        serialize_with = "condition_status_ser",
        deserialize_with = "condition_status_de"
    )]
    pub status: Option<bool>,

    /// Machine readable reason for the last transition.
    pub reason: String,

    /// Human readable description of the last transition.
    pub message: String,

    /// The generation the condition was set for.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,

    /// Last time the condition transitioned from one status to another.
    pub last_transition_time: DateTime<Utc>,
}

impl Condition {
    pub fn new(
        type_: &str,
        status: Option<bool>,
        reason: &str,
        message: impl Into<String>,
        observed_generation: Option<i64>,
    ) -> Self {
        Self {
            type_: type_.to_owned(),
            status,
            reason: reason.to_owned(),
            message: message.into(),
            observed_generation,
            last_transition_time: Utc::now(),
        }
    }
}

pub(crate) fn condition_status_de<'de, D>(deserializer: D) -> Result<Option<bool>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    match String::deserialize(deserializer)?.as_ref() {
        "Unknown" => Ok(None),
        "True" => Ok(Some(true)),
        "False" => Ok(Some(false)),
        other => Err(serde::de::Error::invalid_value(
            serde::de::Unexpected::Str(other),
            &"Unknown or True or False",
        )),
    }
}

#[allow(clippy::trivially_copy_pass_by_ref)]
pub(crate) fn condition_status_ser<S>(status: &Option<bool>, s: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    s.serialize_str(match status {
        Some(true) => "True",
        Some(false) => "False",
        None => "Unknown",
    })
}

#[cfg(test)]
mod tests {
    use super::Condition;

    #[test]
    fn condition_status_serializes_as_tristate_string() {
        let ready = Condition::new("Ready", Some(true), "ReconcileSucceeded", "ok", Some(1));
        let value = serde_json::to_value(&ready).unwrap();
        assert_eq!(value["type"], "Ready");
        assert_eq!(value["status"], "True");
        assert_eq!(value["observedGeneration"], 1);

        let unknown = Condition::new("Ready", None, "Pending", "", None);
        let value = serde_json::to_value(&unknown).unwrap();
        assert_eq!(value["status"], "Unknown");
        assert!(value.get("observedGeneration").is_none());
    }

    #[test]
    fn condition_status_deserializes_from_string() {
        let json = serde_json::json!({
            "type": "Ready",
            "status": "False",
            "reason": "ReconcileFailed",
            "message": "boom",
            "lastTransitionTime": "2024-01-01T00:00:00Z",
        });
        let condition: Condition = serde_json::from_value(json).unwrap();
        assert_eq!(condition.status, Some(false));
    }
}
