use k8s_openapi::{
    api::core::v1::Namespace, apimachinery::pkg::apis::meta::v1::LabelSelector,
};
use kube::{api::ListParams, Api, Client, ResourceExt};
use thiserror::Error;
use tracing::trace;

use crate::{Agent, Registry};

#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to list namespaces: {0}")]
    ListNamespaces(#[source] kube::Error),

    #[error("failed to list agents: {0}")]
    ListAgents(#[source] kube::Error),

    #[error("namespace selector uses unsupported operator {operator}")]
    InvalidSelector { operator: String },
}
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Lists the agents in the registry's scope that opted into registration and
/// were not disabled again.
pub(super) async fn selected_agents(client: Client, registry: &Registry) -> Result<Vec<Agent>> {
    let mut agents = Vec::new();
    match &registry.spec.discovery.namespace_selector {
        Some(selector) => {
            let lp = match selector_to_string(selector)? {
                Some(labels) => ListParams::default().labels(&labels),
                None => ListParams::default(),
            };
            let namespaces: Api<Namespace> = Api::all(client.clone());
            let matching = namespaces.list(&lp).await.map_err(Error::ListNamespaces)?;
            for namespace in matching.items {
                let api: Api<Agent> = Api::namespaced(client.clone(), &namespace.name());
                agents.append(&mut agents_in(&api).await?);
            }
        }
        None => {
            // Without a selector only the registry's own namespace is searched.
            let namespace = registry.namespace().unwrap_or_default();
            let api: Api<Agent> = Api::namespaced(client.clone(), &namespace);
            agents.append(&mut agents_in(&api).await?);
        }
    }
    trace!("{} agents before annotation filtering", agents.len());
    agents.retain(Agent::is_registrable);
    Ok(agents)
}

async fn agents_in(api: &Api<Agent>) -> Result<Vec<Agent>> {
    Ok(api
        .list(&ListParams::default())
        .await
        .map_err(Error::ListAgents)?
        .items)
}

/// Renders a label selector into the form list calls take. Returns `None`
/// for the match-everything selector.
fn selector_to_string(selector: &LabelSelector) -> Result<Option<String>> {
    let mut parts = Vec::new();
    if let Some(labels) = &selector.match_labels {
        for (key, value) in labels {
            parts.push(format!("{}={}", key, value));
        }
    }
    if let Some(expressions) = &selector.match_expressions {
        for expression in expressions {
            let values = expression.values.clone().unwrap_or_default().join(",");
            match expression.operator.as_str() {
                "In" => parts.push(format!("{} in ({})", expression.key, values)),
                "NotIn" => parts.push(format!("{} notin ({})", expression.key, values)),
                "Exists" => parts.push(expression.key.clone()),
                "DoesNotExist" => parts.push(format!("!{}", expression.key)),
                other => {
                    return Err(Error::InvalidSelector {
                        operator: other.to_owned(),
                    })
                }
            }
        }
    }
    if parts.is_empty() {
        Ok(None)
    } else {
        Ok(Some(parts.join(",")))
    }
}
