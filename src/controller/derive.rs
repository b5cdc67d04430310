//! Derivation of card specs from agents.
//!
//! Everything here is pure: the same registry, agent and service view always
//! produce the same spec, and therefore the same content hash. Resolution
//! rules are ordered chains with first match wins.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::Service;
use kube::{Resource, ResourceExt};
use sha2::{Digest, Sha256};

use super::{translate, Gateway};
use crate::{
    resource::{CAPABILITIES_ANNOTATION, ENDPOINT_ANNOTATION, METADATA_ANNOTATION_PREFIX},
    Agent, CardEndpoint, CardSpec, Registry, SourceRef,
};

const VERSION_LABEL: &str = "version";
const APP_VERSION_LABEL: &str = "app.kubernetes.io/version";
const CLUSTER_DOMAIN: &str = "svc.cluster.local";

const MODEL_CONFIG_KEY: &str = "modelConfig";
const TOOLS_KEY: &str = "tools";

/// Derives the desired card spec for an agent.
pub(super) fn derive_card(
    registry: &Registry,
    agent: &Agent,
    service: Option<&Service>,
    gateway: &Gateway,
) -> CardSpec {
    let mut spec = CardSpec {
        version: resolve_version(agent),
        protocol_version: registry.protocol_version().to_owned(),
        source_ref: source_ref(agent),
        endpoints: resolve_endpoints(agent, service, gateway),
        capabilities: resolve_capabilities(agent),
        metadata: resolve_metadata(agent),
        public_document: None,
    };
    // Translation failures are soft: the card ships without a public document.
    spec.public_document = translate::public_document(&spec).ok();
    spec
}

/// Hex SHA-256 digest of the canonical serialization of a card spec.
pub(super) fn content_hash(spec: &CardSpec) -> Result<String, serde_json::Error> {
    let canonical = serde_json::to_vec(spec)?;
    Ok(hex::encode(Sha256::digest(&canonical)))
}

fn resolve_version(agent: &Agent) -> String {
    let labels = agent.labels();
    labels
        .get(VERSION_LABEL)
        .or_else(|| labels.get(APP_VERSION_LABEL))
        .cloned()
        .or_else(|| agent.resource_version())
        .unwrap_or_default()
}

fn source_ref(agent: &Agent) -> SourceRef {
    SourceRef {
        kind: Agent::kind(&()).into_owned(),
        name: agent.name(),
        namespace: agent.namespace().unwrap_or_default(),
        uid: agent.metadata.uid.clone().unwrap_or_default(),
    }
}

fn resolve_endpoints(
    agent: &Agent,
    service: Option<&Service>,
    gateway: &Gateway,
) -> Vec<CardEndpoint> {
    if let Some(url) = agent.annotations().get(ENDPOINT_ANNOTATION) {
        if !url.is_empty() {
            return vec![CardEndpoint {
                url: url.clone(),
                protocol: "http".to_owned(),
                port: None,
            }];
        }
    }
    if agent.spec.a2a_config.is_some() {
        return vec![CardEndpoint {
            url: gateway.endpoint_url(&agent.namespace().unwrap_or_default(), &agent.name()),
            protocol: "http".to_owned(),
            port: Some(gateway.port),
        }];
    }
    if let Some(service) = service {
        return service_endpoints(agent, service);
    }
    Vec::new()
}

// One endpoint per declared service port, preserving the service's order.
fn service_endpoints(agent: &Agent, service: &Service) -> Vec<CardEndpoint> {
    let name = agent.name();
    let namespace = agent.namespace().unwrap_or_default();
    let ports = service.spec.as_ref().and_then(|spec| spec.ports.as_ref());
    ports.map_or_else(Vec::new, |ports| {
        ports
            .iter()
            .map(|port| CardEndpoint {
                url: format!(
                    "http://{}.{}.{}:{}",
                    name, namespace, CLUSTER_DOMAIN, port.port
                ),
                protocol: port
                    .protocol
                    .as_deref()
                    .unwrap_or("TCP")
                    .to_ascii_lowercase(),
                port: Some(port.port),
            })
            .collect()
    })
}

fn resolve_capabilities(agent: &Agent) -> Vec<String> {
    if let Some(csv) = agent.annotations().get(CAPABILITIES_ANNOTATION) {
        return split_csv(csv);
    }
    agent.spec.a2a_config.as_ref().map_or_else(Vec::new, |config| {
        config
            .skills
            .iter()
            .filter_map(|skill| skill.name.clone())
            .filter(|name| !name.is_empty())
            .collect()
    })
}

fn split_csv(csv: &str) -> Vec<String> {
    csv.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(str::to_owned)
        .collect()
}

fn resolve_metadata(agent: &Agent) -> BTreeMap<String, String> {
    let mut metadata = BTreeMap::new();
    if let Some(description) = &agent.spec.description {
        if !description.is_empty() {
            metadata.insert(translate::DESCRIPTION_KEY.to_owned(), description.clone());
        }
    }
    if let Some(model_config) = &agent.spec.model_config {
        metadata.insert(MODEL_CONFIG_KEY.to_owned(), model_config.clone());
    }
    let tools: Vec<&str> = agent
        .spec
        .tools
        .iter()
        .filter_map(|tool| tool.name.as_deref())
        .filter(|name| !name.is_empty())
        .collect();
    if !tools.is_empty() {
        metadata.insert(TOOLS_KEY.to_owned(), tools.join(","));
    }
    // `card-` annotations win over derived values.
    for (key, value) in agent.annotations() {
        if let Some(suffix) = key.strip_prefix(METADATA_ANNOTATION_PREFIX) {
            if !suffix.is_empty() {
                metadata.insert(suffix.to_owned(), value.clone());
            }
        }
    }
    metadata
}

#[cfg(test)]
mod tests {
    use k8s_openapi::api::core::v1::{Service, ServicePort, ServiceSpec};

    use super::{content_hash, derive_card};
    use crate::{
        resource::{A2aConfig, AgentSkill, AgentTool, ENDPOINT_ANNOTATION, REGISTER_ANNOTATION},
        Agent, AgentSpec, Registry, RegistrySpec,
    };

    use super::super::Gateway;

    fn registry() -> Registry {
        let mut registry = Registry::new("r1", RegistrySpec::default());
        registry.metadata.namespace = Some("n".to_owned());
        registry
    }

    fn agent(spec: AgentSpec) -> Agent {
        let mut agent = Agent::new("a1", spec);
        agent.metadata.namespace = Some("n".to_owned());
        agent.metadata.uid = Some("uid-a1".to_owned());
        agent.metadata.resource_version = Some("42".to_owned());
        annotate(&mut agent, REGISTER_ANNOTATION, "true");
        agent
    }

    fn annotate(agent: &mut Agent, key: &str, value: &str) {
        agent
            .metadata
            .annotations
            .get_or_insert_with(Default::default)
            .insert(key.to_owned(), value.to_owned());
    }

    fn label(agent: &mut Agent, key: &str, value: &str) {
        agent
            .metadata
            .labels
            .get_or_insert_with(Default::default)
            .insert(key.to_owned(), value.to_owned());
    }

    fn service(ports: &[(&str, i32, &str)]) -> Service {
        Service {
            spec: Some(ServiceSpec {
                ports: Some(
                    ports
                        .iter()
                        .map(|(name, port, protocol)| ServicePort {
                            name: Some((*name).to_owned()),
                            port: *port,
                            protocol: Some((*protocol).to_owned()),
                            ..ServicePort::default()
                        })
                        .collect(),
                ),
                ..ServiceSpec::default()
            }),
            ..Service::default()
        }
    }

    #[test]
    fn minimal_agent_derives_a_bare_card() {
        let agent = agent(AgentSpec {
            description: Some("hello".to_owned()),
            ..AgentSpec::default()
        });
        let spec = derive_card(&registry(), &agent, None, &Gateway::default());

        assert_eq!(spec.protocol_version, "0.3.0");
        assert_eq!(spec.source_ref.kind, "Agent");
        assert_eq!(spec.source_ref.name, "a1");
        assert_eq!(spec.source_ref.namespace, "n");
        assert_eq!(spec.source_ref.uid, "uid-a1");
        assert!(spec.endpoints.is_empty());
        assert!(spec.capabilities.is_empty());
        assert_eq!(spec.metadata["description"], "hello");
        // Without version labels the resource version token is used.
        assert_eq!(spec.version, "42");
        assert!(!content_hash(&spec).unwrap().is_empty());
    }

    #[test]
    fn version_labels_take_precedence_in_order() {
        let mut a = agent(AgentSpec::default());
        label(&mut a, "app.kubernetes.io/version", "2.0.0");
        let spec = derive_card(&registry(), &a, None, &Gateway::default());
        assert_eq!(spec.version, "2.0.0");

        label(&mut a, "version", "1.2.3");
        let spec = derive_card(&registry(), &a, None, &Gateway::default());
        assert_eq!(spec.version, "1.2.3");
    }

    #[test]
    fn service_ports_become_endpoints_in_declared_order() {
        let a = agent(AgentSpec::default());
        let svc = service(&[("http", 8080, "TCP"), ("grpc", 9090, "TCP")]);
        let spec = derive_card(&registry(), &a, Some(&svc), &Gateway::default());

        assert_eq!(spec.endpoints.len(), 2);
        assert_eq!(
            spec.endpoints[0].url,
            "http://a1.n.svc.cluster.local:8080"
        );
        assert_eq!(spec.endpoints[0].protocol, "tcp");
        assert_eq!(spec.endpoints[0].port, Some(8080));
        assert_eq!(
            spec.endpoints[1].url,
            "http://a1.n.svc.cluster.local:9090"
        );
        assert_eq!(spec.endpoints[1].port, Some(9090));
    }

    #[test]
    fn endpoint_annotation_overrides_everything() {
        let mut a = agent(AgentSpec {
            a2a_config: Some(A2aConfig::default()),
            ..AgentSpec::default()
        });
        annotate(&mut a, ENDPOINT_ANNOTATION, "https://x.example:9000");
        let svc = service(&[("http", 8080, "TCP")]);
        let spec = derive_card(&registry(), &a, Some(&svc), &Gateway::default());

        assert_eq!(spec.endpoints.len(), 1);
        assert_eq!(spec.endpoints[0].url, "https://x.example:9000");
        assert_eq!(spec.endpoints[0].protocol, "http");
        assert_eq!(spec.endpoints[0].port, None);
    }

    #[test]
    fn a2a_config_routes_through_the_gateway() {
        let a = agent(AgentSpec {
            a2a_config: Some(A2aConfig::default()),
            ..AgentSpec::default()
        });
        let svc = service(&[("http", 8080, "TCP")]);
        let spec = derive_card(&registry(), &a, Some(&svc), &Gateway::default());

        assert_eq!(spec.endpoints.len(), 1);
        assert_eq!(
            spec.endpoints[0].url,
            "http://a2a-gateway.agents.svc.cluster.local:8083/a2a/n/a1"
        );
        assert_eq!(spec.endpoints[0].port, Some(8083));
    }

    #[test]
    fn capabilities_annotation_overrides_skills() {
        let mut a = agent(AgentSpec {
            a2a_config: Some(A2aConfig {
                skills: vec![AgentSkill {
                    name: Some("ignored".to_owned()),
                    ..AgentSkill::default()
                }],
            }),
            ..AgentSpec::default()
        });
        annotate(
            &mut a,
            super::CAPABILITIES_ANNOTATION,
            "kubernetes, monitoring, alerting",
        );
        let spec = derive_card(&registry(), &a, None, &Gateway::default());
        assert_eq!(spec.capabilities, ["kubernetes", "monitoring", "alerting"]);
    }

    #[test]
    fn skills_provide_capabilities_in_declared_order() {
        let a = agent(AgentSpec {
            a2a_config: Some(A2aConfig {
                skills: vec![
                    AgentSkill {
                        name: Some("summarize".to_owned()),
                        ..AgentSkill::default()
                    },
                    AgentSkill {
                        name: Some(String::new()),
                        ..AgentSkill::default()
                    },
                    AgentSkill {
                        name: Some("translate".to_owned()),
                        ..AgentSkill::default()
                    },
                ],
            }),
            ..AgentSpec::default()
        });
        let spec = derive_card(&registry(), &a, None, &Gateway::default());
        assert_eq!(spec.capabilities, ["summarize", "translate"]);
    }

    #[test]
    fn metadata_merges_with_annotations_last() {
        let mut a = agent(AgentSpec {
            description: Some("from spec".to_owned()),
            model_config: Some("gpt-like".to_owned()),
            tools: vec![
                AgentTool {
                    name: Some("search".to_owned()),
                },
                AgentTool { name: None },
                AgentTool {
                    name: Some("fetch".to_owned()),
                },
            ],
            ..AgentSpec::default()
        });
        annotate(&mut a, "registrar.dev/card-description", "from annotation");
        annotate(&mut a, "registrar.dev/card-iconUrl", "https://icons/x.png");
        let spec = derive_card(&registry(), &a, None, &Gateway::default());

        assert_eq!(spec.metadata["description"], "from annotation");
        assert_eq!(spec.metadata["modelConfig"], "gpt-like");
        assert_eq!(spec.metadata["tools"], "search,fetch");
        assert_eq!(spec.metadata["iconUrl"], "https://icons/x.png");
    }

    #[test]
    fn derivation_is_deterministic() {
        let a = agent(AgentSpec {
            description: Some("hello".to_owned()),
            ..AgentSpec::default()
        });
        let first = derive_card(&registry(), &a, None, &Gateway::default());
        let second = derive_card(&registry(), &a, None, &Gateway::default());
        assert_eq!(first, second);
        assert_eq!(
            content_hash(&first).unwrap(),
            content_hash(&second).unwrap()
        );
    }

    #[test]
    fn hash_covers_the_public_document() {
        let a = agent(AgentSpec {
            description: Some("hello".to_owned()),
            ..AgentSpec::default()
        });
        let mut spec = derive_card(&registry(), &a, None, &Gateway::default());
        assert!(spec.public_document.is_some());
        let with_document = content_hash(&spec).unwrap();
        spec.public_document = None;
        let without_document = content_hash(&spec).unwrap();
        assert_ne!(with_document, without_document);
    }

    #[test]
    fn hash_tracks_spec_changes() {
        let a = agent(AgentSpec {
            description: Some("hello".to_owned()),
            ..AgentSpec::default()
        });
        let base = derive_card(&registry(), &a, None, &Gateway::default());

        let changed = agent(AgentSpec {
            description: Some("goodbye".to_owned()),
            ..AgentSpec::default()
        });
        let changed = derive_card(&registry(), &changed, None, &Gateway::default());

        assert_ne!(
            content_hash(&base).unwrap(),
            content_hash(&changed).unwrap()
        );
    }
}
