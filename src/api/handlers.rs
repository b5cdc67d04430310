use std::{collections::BTreeMap, convert::Infallible};

use chrono::{DateTime, Utc};
use kube::{api::ListParams, Api, Client, ResourceExt};
use thiserror::Error;
use warp::{http::StatusCode, reply, Reply};

use crate::{Card, CardEndpoint, SourceRef};

#[derive(Debug, Error)]
pub(super) enum Error {
    #[error("failed to list cards: {0}")]
    ListCards(#[source] kube::Error),

    #[error("failed to get card: {0}")]
    GetCard(#[source] kube::Error),

    #[error("card has no public document")]
    NoDocument,
}

impl Reply for Error {
    fn into_response(self) -> reply::Response {
        match self {
            err @ Error::NoDocument => json_error_response(err.to_string(), StatusCode::NOT_FOUND),

            Error::ListCards(source) | Error::GetCard(source) => match source {
                kube::Error::Api(err) => {
                    tracing::debug!("kube api error: {:?}", err);
                    json_error_response(
                        err.message,
                        StatusCode::from_u16(err.code).unwrap_or(StatusCode::BAD_REQUEST),
                    )
                }

                err => {
                    tracing::warn!("unexpected error: {:?}", err);
                    json_error_response(
                        "Internal Server Error".to_owned(),
                        StatusCode::INTERNAL_SERVER_ERROR,
                    )
                }
            },
        }
    }
}

/// What callers of the discovery API see for one card.
#[derive(serde::Serialize)]
#[serde(rename_all = "camelCase")]
struct CardView {
    name: String,
    namespace: String,
    version: String,
    protocol_version: String,
    source_ref: SourceRef,
    endpoints: Vec<CardEndpoint>,
    capabilities: Vec<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    metadata: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    endpoint_healthy: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    last_seen: Option<DateTime<Utc>>,
}

#[derive(serde::Serialize)]
struct ErrorMessage {
    message: String,
}

impl From<&Card> for CardView {
    fn from(card: &Card) -> Self {
        let status = card.status.as_ref();
        Self {
            name: card.name(),
            namespace: card.namespace().unwrap_or_default(),
            version: card.spec.version.clone(),
            protocol_version: card.spec.protocol_version.clone(),
            source_ref: card.spec.source_ref.clone(),
            endpoints: card.spec.endpoints.clone(),
            capabilities: card.spec.capabilities.clone(),
            metadata: card.spec.metadata.clone(),
            endpoint_healthy: status.and_then(|status| status.endpoint_healthy),
            hash: status.and_then(|status| status.hash.clone()),
            last_seen: status.and_then(|status| status.last_seen),
        }
    }
}

// Use this instead of `?` to avoid rejecting.
macro_rules! warp_try {
    ($expr:expr) => {
        match $expr {
            Ok(val) => val,
            Err(err) => {
                return Ok(err.into_response());
            }
        }
    };
}

#[tracing::instrument(skip(client), level = "debug")]
pub(super) async fn list(
    query: super::ListQuery,
    client: Client,
) -> Result<impl Reply, Infallible> {
    let api: Api<Card> = match &query.namespace {
        Some(namespace) => Api::namespaced(client, namespace),
        None => Api::all(client),
    };
    let cards = warp_try!(api
        .list(&ListParams::default())
        .await
        .map_err(Error::ListCards));
    let views = cards.items.iter().map(CardView::from).collect::<Vec<_>>();
    Ok(json_response(&views, StatusCode::OK))
}

#[tracing::instrument(skip(client), level = "debug")]
pub(super) async fn get(
    namespace: String,
    name: String,
    client: Client,
) -> Result<impl Reply, Infallible> {
    let api: Api<Card> = Api::namespaced(client, &namespace);
    let card = warp_try!(api.get(&name).await.map_err(Error::GetCard));
    Ok(json_response(&CardView::from(&card), StatusCode::OK))
}

#[tracing::instrument(skip(client), level = "debug")]
pub(super) async fn document(
    namespace: String,
    name: String,
    client: Client,
) -> Result<impl Reply, Infallible> {
    let api: Api<Card> = Api::namespaced(client, &namespace);
    let card = warp_try!(api.get(&name).await.map_err(Error::GetCard));
    let document = warp_try!(card.spec.public_document.clone().ok_or(Error::NoDocument));
    // The stored document is already serialized JSON; pass the bytes through.
    Ok(reply::with_header(document, "content-type", "application/json").into_response())
}

fn json_response<T: serde::Serialize>(res: &T, status: StatusCode) -> reply::Response {
    reply::with_status(reply::json(res), status).into_response()
}

fn json_error_response(message: String, status: StatusCode) -> reply::Response {
    reply::with_status(reply::json(&ErrorMessage { message }), status).into_response()
}
