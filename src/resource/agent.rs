use kube::{CustomResource, ResourceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Opts an agent into registration when set to "true".
pub const REGISTER_ANNOTATION: &str = "registrar.dev/register-to-registry";
/// Overrides registration; an opted-in agent is skipped when set to "true".
pub const DISABLED_ANNOTATION: &str = "registrar.dev/discovery-disabled";
/// Comma separated capability list overriding skill derivation.
pub const CAPABILITIES_ANNOTATION: &str = "registrar.dev/capabilities";
/// Single URL overriding endpoint derivation.
pub const ENDPOINT_ANNOTATION: &str = "registrar.dev/a2a-endpoint";
/// Annotations carrying this prefix contribute `<suffix> -> value` to card metadata.
pub const METADATA_ANNOTATION_PREFIX: &str = "registrar.dev/card-";

/// Client-side view of the agent runtime's resource. The controller only ever
/// reads these; their CRD is installed by the runtime.
#[derive(CustomResource, Deserialize, Serialize, Debug, Default, PartialEq, Clone, JsonSchema)]
#[kube(
    group = "agents.dev",
    version = "v1alpha1",
    kind = "Agent",
    plural = "agents",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct AgentSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Reference to the model configuration the agent runs with.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_config: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<AgentTool>,

    /// Agent-to-agent protocol settings, present when the agent speaks it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub a2a_config: Option<A2aConfig>,
}

#[derive(Deserialize, Serialize, Debug, Default, PartialEq, Clone, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AgentTool {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

#[derive(Deserialize, Serialize, Debug, Default, PartialEq, Clone, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct A2aConfig {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub skills: Vec<AgentSkill>,
}

#[derive(Deserialize, Serialize, Debug, Default, PartialEq, Clone, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AgentSkill {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

impl Agent {
    fn annotation_is_true(&self, key: &str) -> bool {
        self.annotations().get(key).map_or(false, |v| v == "true")
    }

    pub fn registration_requested(&self) -> bool {
        self.annotation_is_true(REGISTER_ANNOTATION)
    }

    pub fn discovery_disabled(&self) -> bool {
        self.annotation_is_true(DISABLED_ANNOTATION)
    }

    /// Whether this agent should have a card under a selecting registry.
    pub fn is_registrable(&self) -> bool {
        self.registration_requested() && !self.discovery_disabled()
    }
}
