use std::collections::HashSet;

use chrono::Utc;
use k8s_openapi::api::core::v1::Service;
use kube::{
    api::{DeleteParams, ListParams, Patch, PatchParams},
    error::ErrorResponse,
    Api, Client, Resource, ResourceExt,
};
use serde_json::json;
use thiserror::Error;
use tracing::{debug, warn};

use super::{
    card_labels, derive, probe, to_owner_reference, Gateway, MANAGER, REGISTRY_LABEL,
    REGISTRY_NAMESPACE_LABEL,
};
use crate::{
    resource::{CardStatus, Condition},
    Agent, Card, CardSpec, Registry,
};

#[derive(Debug, Error)]
pub enum Error {
    #[error("agent is missing a namespace")]
    MissingNamespace,

    #[error("failed to get service: {0}")]
    GetService(#[source] kube::Error),

    #[error("failed to get card: {0}")]
    GetCard(#[source] kube::Error),

    #[error("failed to apply card: {0}")]
    ApplyCard(#[source] kube::Error),

    #[error("failed to list cards: {0}")]
    ListCards(#[source] kube::Error),

    #[error("failed to serialize card spec: {0}")]
    SerializeSpec(#[source] serde_json::Error),
}
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// What a per-agent reconciliation did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Spec and status were applied.
    Applied,
    /// The derived spec matched the recorded hash; no write was issued.
    Unchanged,
}

/// Derives and applies the card for one agent.
pub(super) async fn reconcile(
    client: &Client,
    registry: &Registry,
    agent: &Agent,
    gateway: &Gateway,
) -> Result<Outcome> {
    let name = agent.name();
    let namespace = agent.namespace().ok_or(Error::MissingNamespace)?;

    let service = lookup_service(client, &namespace, &name).await?;
    let spec = derive::derive_card(registry, agent, service.as_ref(), gateway);
    let hash = derive::content_hash(&spec).map_err(Error::SerializeSpec)?;

    let cards: Api<Card> = Api::namespaced(client.clone(), &namespace);
    let existing = match cards.get(&name).await {
        Ok(card) => Some(card),
        Err(kube::Error::Api(ErrorResponse { code: 404, .. })) => None,
        Err(err) => return Err(Error::GetCard(err)),
    };
    if let Some(card) = &existing {
        // Dedup fast path: an unchanged derivation issues no writes.
        if card.spec_hash() == Some(hash.as_str()) {
            return Ok(Outcome::Unchanged);
        }
    }

    let endpoint_healthy = if spec.endpoints.is_empty() {
        None
    } else {
        probe::check_endpoints(&spec.endpoints, probe::PROBE_TIMEOUT).await
    };

    // > It is strongly recommended for controllers to always "force" conflicts,
    // > since they might not be able to resolve or act on these conflicts.
    // > https://kubernetes.io/docs/reference/using-api/server-side-apply/#using-server-side-apply-in-a-controller
    let ssapply = PatchParams::apply(MANAGER).force();
    let apply = build_apply(registry, &name, &spec);
    let applied = cards
        .patch(&name, &ssapply, &Patch::Apply(&apply))
        .await
        .map_err(Error::ApplyCard)?;

    let status = CardStatus {
        hash: Some(hash),
        last_seen: Some(Utc::now()),
        endpoint_healthy,
        observed_generation: applied.metadata.generation,
        conditions: vec![Condition::new(
            "Published",
            Some(true),
            "Applied",
            format!("derived from agent {}/{}", namespace, name),
            applied.metadata.generation,
        )],
    };
    let status_patch = json!({
        "apiVersion": Card::api_version(&()),
        "kind": Card::kind(&()),
        "status": status,
    });
    if let Err(err) = cards
        .patch_status(&name, &ssapply, &Patch::Apply(&status_patch))
        .await
    {
        // Status drift heals on the next pass; the applied spec stands.
        warn!("failed to update status of card {}/{}: {}", namespace, name, err);
    }

    Ok(Outcome::Applied)
}

fn build_apply(registry: &Registry, name: &str, spec: &CardSpec) -> serde_json::Value {
    json!({
        "apiVersion": Card::api_version(&()),
        "kind": Card::kind(&()),
        "metadata": {
            "name": name,
            "labels": card_labels(registry, name),
            "ownerReferences": [to_owner_reference(registry)],
        },
        "spec": spec,
    })
}

async fn lookup_service(
    client: &Client,
    namespace: &str,
    name: &str,
) -> Result<Option<Service>> {
    let services: Api<Service> = Api::namespaced(client.clone(), namespace);
    match services.get(name).await {
        Ok(service) => Ok(Some(service)),
        Err(kube::Error::Api(ErrorResponse { code: 404, .. })) => Ok(None),
        Err(err) => Err(Error::GetService(err)),
    }
}

/// Deletes cards owned by this registry whose agents fell out of selection,
/// so a disabled or de-annotated agent disappears within the same pass.
pub(super) async fn purge_unselected(
    client: &Client,
    registry: &Registry,
    selected: &HashSet<(String, String)>,
) -> Result<usize> {
    let labels = format!(
        "{}={},{}={}",
        REGISTRY_LABEL,
        registry.name(),
        REGISTRY_NAMESPACE_LABEL,
        registry.namespace().unwrap_or_default(),
    );
    let cards: Api<Card> = Api::all(client.clone());
    let owned = cards
        .list(&ListParams::default().labels(&labels))
        .await
        .map_err(Error::ListCards)?;

    let mut deleted = 0;
    for card in owned.items {
        let name = card.name();
        let namespace = card.namespace().unwrap_or_default();
        if selected.contains(&(namespace.clone(), name.clone())) {
            continue;
        }
        // The label match is advisory; only delete what we actually own.
        if !is_owned_by(&card, registry) {
            continue;
        }
        debug!("deleting unselected card {}/{}", namespace, name);
        let api: Api<Card> = Api::namespaced(client.clone(), &namespace);
        match api.delete(&name, &DeleteParams::default()).await {
            Ok(_) => deleted += 1,
            Err(kube::Error::Api(ErrorResponse { code: 404, .. })) => {}
            Err(err) => warn!("failed to delete card {}/{}: {}", namespace, name, err),
        }
    }
    Ok(deleted)
}

fn is_owned_by(card: &Card, registry: &Registry) -> bool {
    let uid = registry.metadata.uid.as_deref().unwrap_or_default();
    card.metadata
        .owner_references
        .as_deref()
        .unwrap_or(&[])
        .iter()
        .any(|reference| reference.controller == Some(true) && reference.uid == uid)
}
