//! Lease-based leader election.
//!
//! Only one replica may write under the shared field manager at a time, so
//! the controller runs behind a `coordination.k8s.io/v1` Lease. Claims use
//! plain replace calls; the resource version makes them optimistic, and a
//! conflict simply means another replica won the tick.

use chrono::{DateTime, Utc};
use k8s_openapi::{
    api::coordination::v1::{Lease, LeaseSpec},
    apimachinery::pkg::apis::meta::v1::MicroTime,
};
use kube::{
    api::{ObjectMeta, PostParams},
    error::ErrorResponse,
    Api, Client,
};
use thiserror::Error;
use tracing::trace;

#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to read lease: {0}")]
    Get(#[source] kube::Error),

    #[error("failed to create lease: {0}")]
    Create(#[source] kube::Error),

    #[error("failed to renew lease: {0}")]
    Renew(#[source] kube::Error),
}
pub type Result<T, E = Error> = std::result::Result<T, E>;

pub(super) struct LeaseLock {
    api: Api<Lease>,
    name: String,
    identity: String,
    ttl_seconds: i32,
}

impl LeaseLock {
    pub(super) fn new(
        client: Client,
        namespace: &str,
        name: &str,
        identity: &str,
        ttl: std::time::Duration,
    ) -> Self {
        Self {
            api: Api::namespaced(client, namespace),
            name: name.to_owned(),
            identity: identity.to_owned(),
            ttl_seconds: ttl.as_secs() as i32,
        }
    }

    /// Returns true while this replica holds the lease.
    pub(super) async fn try_acquire_or_renew(&self) -> Result<bool> {
        match self.api.get(&self.name).await {
            Ok(lease) => self.renew_or_take_over(lease).await,
            Err(kube::Error::Api(ErrorResponse { code: 404, .. })) => self.create().await,
            Err(err) => Err(Error::Get(err)),
        }
    }

    async fn create(&self) -> Result<bool> {
        let lease = Lease {
            metadata: ObjectMeta {
                name: Some(self.name.clone()),
                ..ObjectMeta::default()
            },
            spec: Some(self.next_spec(&LeaseSpec::default(), Utc::now())),
        };
        match self.api.create(&PostParams::default(), &lease).await {
            Ok(_) => {
                trace!("created lease {} as {}", self.name, self.identity);
                Ok(true)
            }
            // Somebody else created it first.
            Err(kube::Error::Api(ErrorResponse { code: 409, .. })) => Ok(false),
            Err(err) => Err(Error::Create(err)),
        }
    }

    async fn renew_or_take_over(&self, lease: Lease) -> Result<bool> {
        let now = Utc::now();
        let spec = lease.spec.clone().unwrap_or_default();
        if !can_claim(&spec, &self.identity, now) {
            return Ok(false);
        }
        let updated = Lease {
            metadata: ObjectMeta {
                name: Some(self.name.clone()),
                resource_version: lease.metadata.resource_version.clone(),
                ..ObjectMeta::default()
            },
            spec: Some(self.next_spec(&spec, now)),
        };
        match self
            .api
            .replace(&self.name, &PostParams::default(), &updated)
            .await
        {
            Ok(_) => Ok(true),
            // Lost the optimistic concurrency race; stand by.
            Err(kube::Error::Api(ErrorResponse { code: 409, .. })) => Ok(false),
            Err(err) => Err(Error::Renew(err)),
        }
    }

    fn next_spec(&self, previous: &LeaseSpec, now: DateTime<Utc>) -> LeaseSpec {
        let fresh_acquire = previous.holder_identity.as_deref() != Some(self.identity.as_str());
        LeaseSpec {
            holder_identity: Some(self.identity.clone()),
            lease_duration_seconds: Some(self.ttl_seconds),
            acquire_time: if fresh_acquire {
                Some(MicroTime(now))
            } else {
                previous.acquire_time.clone()
            },
            renew_time: Some(MicroTime(now)),
            lease_transitions: Some(
                previous.lease_transitions.unwrap_or(0) + i32::from(fresh_acquire),
            ),
        }
    }
}

/// Whether `identity` may write the lease: it already holds it, nobody does,
/// or the current holder let it expire.
fn can_claim(spec: &LeaseSpec, identity: &str, now: DateTime<Utc>) -> bool {
    match spec.holder_identity.as_deref() {
        None => true,
        Some(holder) if holder == identity => true,
        Some(_) => match &spec.renew_time {
            Some(renewed) => {
                let ttl = chrono::Duration::seconds(i64::from(
                    spec.lease_duration_seconds.unwrap_or(0),
                ));
                renewed.0 + ttl < now
            }
            None => true,
        },
    }
}
