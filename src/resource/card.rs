use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::{condition_status_de, condition_status_ser, schemas, Condition};

/// Derived descriptor of a registered agent. Created and mutated only by the
/// registry controller; deleted by cascade when its registry goes away.
#[derive(CustomResource, Deserialize, Serialize, Debug, PartialEq, Clone, JsonSchema)]
#[kube(
    group = "registrar.dev",
    version = "v1alpha1",
    kind = "Card",
    plural = "cards",
    shortname = "card",
    namespaced,
    status = "CardStatus",
    printcolumn = r#"{"name":"Agent","type":"string","jsonPath":".spec.sourceRef.name"}"#,
    printcolumn = r#"{"name":"Version","type":"string","jsonPath":".spec.version"}"#,
    printcolumn = r#"{"name":"Hash","type":"string","jsonPath":".status.hash"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct CardSpec {
    /// Version advertised for the agent.
    pub version: String,

    /// Discovery protocol version inherited from the owning registry.
    pub protocol_version: String,

    /// Identity of the agent this card was derived from.
    pub source_ref: SourceRef,

    /// Resolved endpoints in precedence order. Empty, not absent, when
    /// nothing resolved.
    #[serde(default)]
    pub endpoints: Vec<CardEndpoint>,

    #[serde(default)]
    pub capabilities: Vec<String>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,

    /// Serialized public agent-card document, when translation succeeded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_document: Option<String>,
}

#[derive(Deserialize, Serialize, Debug, PartialEq, Eq, Clone, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SourceRef {
    pub kind: String,
    pub name: String,
    pub namespace: String,
    pub uid: String,
}

#[derive(Deserialize, Serialize, Debug, PartialEq, Eq, Clone, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CardEndpoint {
    #[schemars(schema_with = "schemas::url")]
    pub url: String,

    pub protocol: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(schema_with = "schemas::port")]
    pub port: Option<i32>,
}

#[derive(Deserialize, Serialize, Debug, Default, PartialEq, Clone, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CardStatus {
    /// Hex SHA-256 digest of the applied spec.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,

    /// When the controller last derived this card from its agent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_seen: Option<DateTime<Utc>>,

    /// Probe outcome. Maps to String enum: Unknown, True, False.
    #[serde(
        default,
        serialize_with = "condition_status_ser",
        deserialize_with = "condition_status_de"
    )]
    #[schemars(schema_with = "schemas::condition_status")]
    pub endpoint_healthy: Option<bool>,

    /// The last reconciled generation.
    #[schemars(schema_with = "schemas::observed_generation")]
    pub observed_generation: Option<i64>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    #[schemars(schema_with = "schemas::conditions")]
    pub conditions: Vec<Condition>,
}

impl Card {
    /// The content hash recorded by the last successful apply, if any.
    pub fn spec_hash(&self) -> Option<&str> {
        self.status.as_ref().and_then(|s| s.hash.as_deref())
    }

    pub fn endpoint_healthy(&self) -> Option<bool> {
        self.status.as_ref().and_then(|s| s.endpoint_healthy)
    }
}

#[cfg(test)]
mod tests {
    use super::{Card, CardEndpoint, CardSpec, CardStatus, SourceRef};

    fn spec() -> CardSpec {
        CardSpec {
            version: "1".into(),
            protocol_version: "0.3.0".into(),
            source_ref: SourceRef {
                kind: "Agent".into(),
                name: "a1".into(),
                namespace: "n".into(),
                uid: "u-1".into(),
            },
            endpoints: Vec::new(),
            capabilities: Vec::new(),
            metadata: Default::default(),
            public_document: None,
        }
    }

    #[test]
    fn empty_endpoints_serialize_as_empty_list() {
        let value = serde_json::to_value(&spec()).unwrap();
        assert_eq!(value["endpoints"], serde_json::json!([]));
        assert_eq!(value["capabilities"], serde_json::json!([]));
        assert!(value.get("publicDocument").is_none());
    }

    #[test]
    fn unspecified_port_is_omitted() {
        let endpoint = CardEndpoint {
            url: "https://x.example:9000".into(),
            protocol: "http".into(),
            port: None,
        };
        let value = serde_json::to_value(&endpoint).unwrap();
        assert!(value.get("port").is_none());

        let endpoint = CardEndpoint {
            url: "http://a1.n.svc.cluster.local:8080".into(),
            protocol: "tcp".into(),
            port: Some(8080),
        };
        let value = serde_json::to_value(&endpoint).unwrap();
        assert_eq!(value["port"], 8080);
    }

    #[test]
    fn endpoint_health_round_trips_as_tristate() {
        let status = CardStatus {
            endpoint_healthy: Some(true),
            ..CardStatus::default()
        };
        let value = serde_json::to_value(&status).unwrap();
        assert_eq!(value["endpointHealthy"], "True");

        let parsed: CardStatus =
            serde_json::from_value(serde_json::json!({ "endpointHealthy": "Unknown" })).unwrap();
        assert_eq!(parsed.endpoint_healthy, None);

        // Absent means unknown.
        let parsed: CardStatus = serde_json::from_value(serde_json::json!({})).unwrap();
        assert_eq!(parsed.endpoint_healthy, None);
    }

    #[test]
    fn spec_hash_reads_through_status() {
        let mut card = Card::new("a1", spec());
        assert_eq!(card.spec_hash(), None);
        card.status = Some(CardStatus {
            hash: Some("abc123".into()),
            ..CardStatus::default()
        });
        assert_eq!(card.spec_hash(), Some("abc123"));
    }
}
