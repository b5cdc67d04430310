// Provides the read-only discovery API
use kube::Client;
use tracing_subscriber::fmt::format::FmtSpan;
use warp::{
    http::{header, Method},
    Filter,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_owned());
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_span_events(FmtSpan::CLOSE)
        .init();

    let addr: std::net::SocketAddr = std::env::var("REGISTRAR_API_ADDR")
        .unwrap_or_else(|_| "0.0.0.0:3030".to_owned())
        .parse()?;

    let client = Client::try_default().await?;
    let cors = warp::cors()
        .allow_any_origin()
        .allow_headers(&[header::CONTENT_TYPE])
        .allow_methods(&[Method::GET, Method::OPTIONS]);
    let api = registrar::api::new(client).with(cors);
    warp::serve(api).run(addr).await;
    Ok(())
}
