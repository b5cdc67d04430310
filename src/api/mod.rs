// Provides the read-only discovery API over cards.
//
// Routes:
//
// - `GET /`: Liveness check. Responds with "OK".
// - `GET /cards`: List card views. Optional `?namespace=` filter.
// - `GET /cards/:namespace/:name`: Single card view.
// - `GET /cards/:namespace/:name/document`: The raw public document.
use std::convert::Infallible;

use kube::Client;
use serde::Deserialize;
use warp::{Filter, Rejection, Reply};

mod handlers;

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub namespace: Option<String>,
}

#[must_use]
pub fn new(client: Client) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    healthz()
        .or(list(client.clone()))
        .or(document(client.clone()))
        .or(get(client))
}

// GET /
fn healthz() -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    warp::get().and(warp::path::end()).map(|| "OK")
}

// GET /cards
fn list(client: Client) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    warp::get()
        .and(warp::path("cards"))
        .and(warp::path::end())
        .and(warp::query::<ListQuery>())
        .and(with_client(client))
        .and_then(handlers::list)
}

// GET /cards/:namespace/:name
fn get(client: Client) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    warp::get()
        .and(warp::path("cards"))
        .and(warp::path::param::<String>())
        .and(warp::path::param::<String>())
        .and(warp::path::end())
        .and(with_client(client))
        .and_then(handlers::get)
}

// GET /cards/:namespace/:name/document
fn document(client: Client) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    warp::get()
        .and(warp::path("cards"))
        .and(warp::path::param::<String>())
        .and(warp::path::param::<String>())
        .and(warp::path("document"))
        .and(warp::path::end())
        .and(with_client(client))
        .and_then(handlers::document)
}

fn with_client(client: Client) -> impl Filter<Extract = (Client,), Error = Infallible> + Clone {
    warp::any().map(move || client.clone())
}
