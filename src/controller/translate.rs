//! Translation of card specs into the public agent-description document.
//!
//! The document is what third parties fetch to discover an agent. It is
//! embedded into the card spec as a string, so the content hash notices any
//! drift in its bytes.

use serde::Serialize;

use crate::CardSpec;

/// Conventional metadata keys the translator reads. Values for these come
/// from the agent spec or its `card-` annotations; sensible defaults are
/// synthesized when they are absent.
pub(super) const DESCRIPTION_KEY: &str = "description";
const URL_KEY: &str = "url";
const ORGANIZATION_KEY: &str = "organization";
const ORGANIZATION_URL_KEY: &str = "organizationUrl";
const ICON_URL_KEY: &str = "iconUrl";
const DOCUMENTATION_URL_KEY: &str = "documentationUrl";

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
struct AgentDocument<'a> {
    protocol_version: &'a str,
    name: &'a str,
    description: &'a str,
    url: &'a str,
    version: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    provider: Option<Provider<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    icon_url: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    documentation_url: Option<&'a str>,
    capabilities: Capabilities,
    default_input_modes: [&'a str; 1],
    default_output_modes: [&'a str; 1],
    skills: Vec<Skill<'a>>,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
struct Provider<'a> {
    organization: &'a str,
    url: &'a str,
}

#[derive(Serialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
struct Capabilities {
    streaming: bool,
    push_notifications: bool,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
struct Skill<'a> {
    id: &'a str,
    name: &'a str,
    description: &'a str,
    tags: [&'a str; 0],
}

/// Renders the public document for a card spec. Deterministic for a given
/// spec value.
pub(super) fn public_document(spec: &CardSpec) -> Result<String, serde_json::Error> {
    let metadata = &spec.metadata;
    let name = spec.source_ref.name.as_str();
    let url = metadata
        .get(URL_KEY)
        .map(String::as_str)
        .or_else(|| spec.endpoints.first().map(|endpoint| endpoint.url.as_str()))
        .unwrap_or("");
    let provider = match (
        metadata.get(ORGANIZATION_KEY),
        metadata.get(ORGANIZATION_URL_KEY),
    ) {
        (None, None) => None,
        (organization, organization_url) => Some(Provider {
            organization: organization.map_or("", String::as_str),
            url: organization_url.map_or("", String::as_str),
        }),
    };
    let document = AgentDocument {
        protocol_version: &spec.protocol_version,
        name,
        description: metadata.get(DESCRIPTION_KEY).map_or(name, String::as_str),
        url,
        version: &spec.version,
        provider,
        icon_url: metadata.get(ICON_URL_KEY).map(String::as_str),
        documentation_url: metadata.get(DOCUMENTATION_URL_KEY).map(String::as_str),
        capabilities: Capabilities::default(),
        default_input_modes: ["text"],
        default_output_modes: ["text"],
        skills: spec
            .capabilities
            .iter()
            .map(|capability| Skill {
                id: capability,
                name: capability,
                description: capability,
                tags: [],
            })
            .collect(),
    };
    serde_json::to_string(&document)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::public_document;
    use crate::{CardEndpoint, CardSpec, SourceRef};

    fn spec() -> CardSpec {
        CardSpec {
            version: "1.2.3".to_owned(),
            protocol_version: "0.3.0".to_owned(),
            source_ref: SourceRef {
                kind: "Agent".to_owned(),
                name: "a1".to_owned(),
                namespace: "n".to_owned(),
                uid: "uid-a1".to_owned(),
            },
            endpoints: vec![CardEndpoint {
                url: "http://a1.n.svc.cluster.local:8080".to_owned(),
                protocol: "tcp".to_owned(),
                port: Some(8080),
            }],
            capabilities: vec!["summarize".to_owned()],
            metadata: BTreeMap::new(),
            public_document: None,
        }
    }

    #[test]
    fn document_defaults_are_synthesized() {
        let document: serde_json::Value =
            serde_json::from_str(&public_document(&spec()).unwrap()).unwrap();

        assert_eq!(document["protocolVersion"], "0.3.0");
        assert_eq!(document["name"], "a1");
        // Description falls back to the agent name.
        assert_eq!(document["description"], "a1");
        // The url falls back to the first endpoint.
        assert_eq!(document["url"], "http://a1.n.svc.cluster.local:8080");
        assert_eq!(document["version"], "1.2.3");
        assert!(document.get("provider").is_none());
        assert_eq!(document["defaultInputModes"], serde_json::json!(["text"]));
        assert_eq!(document["skills"][0]["name"], "summarize");
    }

    #[test]
    fn conventional_metadata_keys_are_read() {
        let mut spec = spec();
        spec.metadata
            .insert("description".to_owned(), "hello".to_owned());
        spec.metadata
            .insert("url".to_owned(), "https://a1.example".to_owned());
        spec.metadata
            .insert("organization".to_owned(), "acme".to_owned());
        spec.metadata
            .insert("organizationUrl".to_owned(), "https://acme.example".to_owned());
        spec.metadata
            .insert("iconUrl".to_owned(), "https://acme.example/icon.png".to_owned());

        let document: serde_json::Value =
            serde_json::from_str(&public_document(&spec).unwrap()).unwrap();

        assert_eq!(document["description"], "hello");
        assert_eq!(document["url"], "https://a1.example");
        assert_eq!(document["provider"]["organization"], "acme");
        assert_eq!(document["provider"]["url"], "https://acme.example");
        assert_eq!(document["iconUrl"], "https://acme.example/icon.png");
        assert!(document.get("documentationUrl").is_none());
    }

    #[test]
    fn translation_is_deterministic() {
        assert_eq!(
            public_document(&spec()).unwrap(),
            public_document(&spec()).unwrap()
        );
    }
}
