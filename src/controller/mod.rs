use std::{
    collections::{BTreeMap, HashSet},
    sync::Arc,
    time::Duration,
};

use futures::{FutureExt, StreamExt};
use k8s_openapi::{api::core::v1::Service, apimachinery::pkg::apis::meta::v1::OwnerReference};
use kube::{
    api::ListParams,
    runtime::{
        controller::{Action, Context, Controller},
        reflector::{ObjectRef, Store},
    },
    Api, Client, Resource, ResourceExt,
};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::{Agent, Card, Registry};

mod card;
mod conditions;
mod derive;
mod discovery;
mod leader;
mod probe;
mod translate;

const PROJECT_NAME: &str = "registrar";

/// Field ownership identifier for every write this controller issues.
pub const MANAGER: &str = "registrar";

/// Labels linking a card back to the registry that published it. The purge
/// step lists by these to find cards whose agents fell out of selection.
const REGISTRY_LABEL: &str = "registrar.dev/registry";
const REGISTRY_NAMESPACE_LABEL: &str = "registrar.dev/registry-namespace";

const LEASE_NAME: &str = "registrar-leader";
const LEASE_TTL: Duration = Duration::from_secs(15);
const RENEW_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum Error {
    #[error("registry is missing a namespace")]
    MissingNamespace,

    #[error("failed to enumerate agents: {0}")]
    Discover(#[source] discovery::Error),
}
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Runtime settings for the controller process.
#[derive(Debug, Clone)]
pub struct Settings {
    pub gateway: Gateway,
    /// Namespace holding the leader election lease.
    pub lease_namespace: String,
    /// Identity this replica competes for leadership with.
    pub identity: String,
}

/// Well-known in-cluster gateway serving agent-to-agent traffic for agents
/// that declare an a2a config but expose no endpoint of their own.
#[derive(Debug, Clone)]
pub struct Gateway {
    pub host: String,
    pub port: i32,
}

impl Gateway {
    pub fn endpoint_url(&self, namespace: &str, name: &str) -> String {
        format!(
            "http://{}:{}/a2a/{}/{}",
            self.host, self.port, namespace, name
        )
    }
}

impl Default for Gateway {
    fn default() -> Self {
        Self {
            host: "a2a-gateway.agents.svc.cluster.local".to_owned(),
            port: 8083,
        }
    }
}

#[derive(Debug, Error)]
#[error("gateway must be of the form host:port")]
pub struct InvalidGateway;

impl std::str::FromStr for Gateway {
    type Err = InvalidGateway;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let (host, port) = s.rsplit_once(':').ok_or(InvalidGateway)?;
        if host.is_empty() {
            return Err(InvalidGateway);
        }
        let port = port.parse().map_err(|_| InvalidGateway)?;
        Ok(Self {
            host: host.to_owned(),
            port,
        })
    }
}

// Data to store in context
struct ContextData {
    client: Client,
    gateway: Gateway,
}

/// Runs leader election and drives the controller while this replica holds
/// the lease. Returns when a termination signal arrives.
pub async fn run(client: Client, settings: Settings) {
    let shutdown = CancellationToken::new();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            shutdown_signal().await;
            shutdown.cancel();
        }
    });

    let lock = leader::LeaseLock::new(
        client.clone(),
        &settings.lease_namespace,
        LEASE_NAME,
        &settings.identity,
        LEASE_TTL,
    );

    let mut controller_task: Option<tokio::task::JoinHandle<()>> = None;
    let mut tick = tokio::time::interval(RENEW_INTERVAL);
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = tick.tick() => {}
        }
        match lock.try_acquire_or_renew().await {
            Ok(true) => {
                if controller_task.is_none() {
                    info!("acquired leadership; starting controller");
                    controller_task = Some(tokio::spawn(run_controller(
                        client.clone(),
                        settings.gateway.clone(),
                        shutdown.clone(),
                    )));
                }
            }
            Ok(false) => {
                if let Some(task) = controller_task.take() {
                    warn!("lost leadership; stopping controller");
                    task.abort();
                }
            }
            Err(err) => {
                // Without a renewable lease we must assume another replica
                // may take over the field manager.
                warn!("leader election failed: {}", err);
                if let Some(task) = controller_task.take() {
                    task.abort();
                }
            }
        }
    }
    if let Some(task) = controller_task.take() {
        // Let the workqueue drain before exiting.
        let _ = task.await;
    }
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("install SIGTERM handler");
        tokio::select! {
            _ = ctrl_c => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = ctrl_c.await;
    }
}

async fn run_controller(client: Client, gateway: Gateway, shutdown: CancellationToken) {
    let (graceful_tx, graceful_rx) = futures::channel::oneshot::channel::<()>();
    tokio::spawn(async move {
        shutdown.cancelled().await;
        let _ = graceful_tx.send(());
    });

    let context = Context::new(ContextData {
        client: client.clone(),
        gateway,
    });

    let lp = ListParams::default();
    let controller = Controller::new(Api::<Registry>::all(client.clone()), lp.clone());

    // Agent and service events fan out to every cached registry. The mapping
    // is deliberately coarse; the content hash fast path absorbs the passes
    // this schedules for unaffected registries.
    let agent_trigger = all_registries(controller.store());
    let service_trigger = all_registries(controller.store());

    controller
        .owns::<Card>(Api::all(client.clone()), lp.clone())
        .watches::<Agent, _>(Api::all(client.clone()), lp.clone(), move |agent| {
            if agent.registration_requested() {
                agent_trigger()
            } else {
                Vec::new()
            }
        })
        .watches::<Service, _>(Api::all(client), lp, move |_service| service_trigger())
        .graceful_shutdown_on(graceful_rx.map(|_| ()))
        .run(reconciler, error_policy, context)
        .filter_map(|x| async move { x.ok() })
        .for_each(|(registry, _)| async move {
            trace!("reconciled {}", registry);
        })
        .await;
}

fn all_registries(store: Store<Registry>) -> impl Fn() -> Vec<ObjectRef<Registry>> {
    move || {
        store
            .state()
            .iter()
            .map(|registry| ObjectRef::from_obj(&**registry))
            .collect()
    }
}

/// One reconciliation pass over a single registry.
#[tracing::instrument(skip(registry, ctx), level = "debug")]
async fn reconciler(registry: Arc<Registry>, ctx: Context<ContextData>) -> Result<Action> {
    let client = ctx.get_ref().client.clone();
    let name = registry.name();
    let namespace = registry.namespace().ok_or(Error::MissingNamespace)?;
    debug!("reconciling registry {}/{}", namespace, name);

    if !registry.spec.discovery.enabled {
        log_status(conditions::not_started(&registry, client).await);
        return Ok(Action::requeue(registry.sync_interval_or_default()));
    }

    let interval = match registry.sync_interval() {
        Ok(interval) => interval,
        Err(err) => {
            // Configuration mistakes retry at the default cadence, not with
            // error backoff.
            let message = format!("invalid sync interval: {}", err);
            warn!("registry {}/{}: {}", namespace, name, message);
            log_status(conditions::error(&registry, client, 0, message).await);
            return Ok(Action::requeue(registry.sync_interval_or_default()));
        }
    };

    log_status(conditions::discovering(&registry, client.clone()).await);

    let agents = match discovery::selected_agents(client.clone(), &registry).await {
        Ok(agents) => agents,
        Err(err @ discovery::Error::InvalidSelector { .. }) => {
            warn!("registry {}/{}: {}", namespace, name, err);
            log_status(conditions::error(&registry, client, 0, err.to_string()).await);
            return Ok(Action::requeue(interval));
        }
        Err(err) => {
            log_status(conditions::error(&registry, client, 0, err.to_string()).await);
            return Err(Error::Discover(err));
        }
    };
    debug!(
        "registry {}/{} selected {} agents",
        namespace,
        name,
        agents.len()
    );

    let mut registered = 0;
    let mut selected = HashSet::new();
    for agent in &agents {
        let agent_name = agent.name();
        let agent_namespace = agent.namespace().unwrap_or_else(|| namespace.clone());
        selected.insert((agent_namespace.clone(), agent_name.clone()));
        match card::reconcile(&client, &registry, agent, &ctx.get_ref().gateway).await {
            Ok(outcome) => {
                registered += 1;
                debug!("card {}/{}: {:?}", agent_namespace, agent_name, outcome);
            }
            // One failing agent must not end the pass for the rest.
            Err(err) => warn!(
                "failed to publish card for agent {}/{}: {}",
                agent_namespace, agent_name, err
            ),
        }
    }

    if let Err(err) = card::purge_unselected(&client, &registry, &selected).await {
        warn!(
            "failed to prune stale cards of registry {}/{}: {}",
            namespace, name, err
        );
    }

    log_status(conditions::ready(&registry, client, registered).await);
    info!(
        "registry {}/{} ready with {} registered agents",
        namespace, name, registered
    );
    Ok(Action::requeue(interval))
}

#[allow(clippy::needless_pass_by_value)]
/// An error handler called when the reconciler fails.
fn error_policy(error: &Error, _ctx: Context<ContextData>) -> Action {
    warn!("reconciler failed: {}", error);
    Action::requeue(Duration::from_secs(15))
}

// Status write failures are not retried within a pass; the next pass resyncs.
fn log_status(result: std::result::Result<(), conditions::Error>) {
    if let Err(err) = result {
        warn!("failed to update registry status: {}", err);
    }
}

fn card_labels(registry: &Registry, name: &str) -> BTreeMap<String, String> {
    let mut labels = BTreeMap::new();
    labels.insert("app.kubernetes.io/name".to_owned(), name.to_owned());
    labels.insert(
        "app.kubernetes.io/managed-by".to_owned(),
        PROJECT_NAME.to_owned(),
    );
    labels.insert(REGISTRY_LABEL.to_owned(), registry.name());
    labels.insert(
        REGISTRY_NAMESPACE_LABEL.to_owned(),
        registry.namespace().unwrap_or_default(),
    );
    labels
}

fn to_owner_reference(registry: &Registry) -> OwnerReference {
    OwnerReference {
        api_version: Registry::api_version(&()).into_owned(),
        kind: Registry::kind(&()).into_owned(),
        name: registry.name(),
        uid: registry.metadata.uid.clone().expect(".metadata.uid"),
        controller: Some(true),
        block_owner_deletion: Some(true),
    }
}
