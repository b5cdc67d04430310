use chrono::Utc;
use kube::{
    api::{Patch, PatchParams},
    Api, Client, Resource, ResourceExt,
};
use thiserror::Error;

use super::MANAGER;
use crate::{
    resource::{Condition, RegistryPhase, RegistryStatus},
    Registry,
};

#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to update registry status: {0}")]
    UpdateStatus(#[source] kube::Error),
}
pub type Result<T, E = Error> = std::result::Result<T, E>;

const READY_CONDITION: &str = "Ready";

pub(super) async fn not_started(registry: &Registry, client: Client) -> Result<()> {
    patch_status(registry, client, not_started_status(registry)).await
}

pub(super) async fn discovering(registry: &Registry, client: Client) -> Result<()> {
    patch_status(registry, client, discovering_status(registry)).await
}

pub(super) async fn ready(registry: &Registry, client: Client, registered_count: i32) -> Result<()> {
    patch_status(registry, client, ready_status(registry, registered_count)).await
}

pub(super) async fn error(
    registry: &Registry,
    client: Client,
    registered_count: i32,
    message: impl Into<String>,
) -> Result<()> {
    patch_status(
        registry,
        client,
        error_status(registry, registered_count, message),
    )
    .await
}

fn not_started_status(registry: &Registry) -> RegistryStatus {
    let generation = registry.metadata.generation;
    RegistryStatus {
        phase: RegistryPhase::NotStarted,
        registered_count: 0,
        last_sync: None,
        observed_generation: generation,
        conditions: vec![Condition::new(
            READY_CONDITION,
            Some(false),
            "DiscoveryDisabled",
            "discovery is disabled",
            generation,
        )],
    }
}

// The pre-mark keeps the previous pass's terminal fields; it only flips the
// phase while a pass is running.
fn discovering_status(registry: &Registry) -> RegistryStatus {
    let previous = registry.status.as_ref();
    RegistryStatus {
        phase: RegistryPhase::Discovering,
        registered_count: previous.map_or(0, |status| status.registered_count),
        last_sync: previous.and_then(|status| status.last_sync),
        observed_generation: previous.and_then(|status| status.observed_generation),
        conditions: previous.map_or_else(Vec::new, |status| status.conditions.clone()),
    }
}

fn ready_status(registry: &Registry, registered_count: i32) -> RegistryStatus {
    let generation = registry.metadata.generation;
    RegistryStatus {
        phase: RegistryPhase::Ready,
        registered_count,
        last_sync: Some(Utc::now()),
        observed_generation: generation,
        conditions: vec![Condition::new(
            READY_CONDITION,
            Some(true),
            "ReconcileSucceeded",
            format!("registered {} agents", registered_count),
            generation,
        )],
    }
}

fn error_status(
    registry: &Registry,
    registered_count: i32,
    message: impl Into<String>,
) -> RegistryStatus {
    let generation = registry.metadata.generation;
    RegistryStatus {
        phase: RegistryPhase::Error,
        registered_count,
        last_sync: Some(Utc::now()),
        observed_generation: generation,
        conditions: vec![Condition::new(
            READY_CONDITION,
            Some(false),
            "ReconcileFailed",
            message,
            generation,
        )],
    }
}

async fn patch_status(registry: &Registry, client: Client, status: RegistryStatus) -> Result<()> {
    // > It is strongly recommended for controllers to always "force" conflicts,
    // > since they might not be able to resolve or act on these conflicts.
    // > https://kubernetes.io/docs/reference/using-api/server-side-apply/#using-server-side-apply-in-a-controller
    let ssapply = PatchParams::apply(MANAGER).force();
    let name = registry.name();
    let namespace = registry.namespace().unwrap_or_default();
    let api: Api<Registry> = Api::namespaced(client, &namespace);
    api.patch_status(
        &name,
        &ssapply,
        &Patch::Apply(serde_json::json!({
            "apiVersion": Registry::api_version(&()),
            "kind": Registry::kind(&()),
            "status": status,
        })),
    )
    .await
    .map_err(Error::UpdateStatus)?;

    Ok(())
}
