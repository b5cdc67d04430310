// Start the controller
use kube::Client;
use registrar::{Gateway, Settings};
use tracing_subscriber::fmt::format::FmtSpan;

type Result<T> = std::result::Result<T, Box<dyn std::error::Error>>;

#[tokio::main]
async fn main() -> Result<()> {
    let filter =
        std::env::var("RUST_LOG").unwrap_or_else(|_| "tracing=info,registrar=debug".to_owned());
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_span_events(FmtSpan::CLOSE)
        .init();

    let gateway = match std::env::var("REGISTRAR_A2A_GATEWAY") {
        Ok(raw) => raw.parse::<Gateway>()?,
        Err(_) => Gateway::default(),
    };
    let lease_namespace =
        std::env::var("REGISTRAR_NAMESPACE").unwrap_or_else(|_| "default".to_owned());
    // Downward-API pod name is the preferred identity; fall back for local runs.
    let identity = std::env::var("POD_NAME")
        .or_else(|_| std::env::var("HOSTNAME"))
        .unwrap_or_else(|_| format!("registrar-{}", std::process::id()));

    let client = Client::try_default().await?;
    registrar::run(
        client,
        Settings {
            gateway,
            lease_namespace,
            identity,
        },
    )
    .await;
    Ok(())
}
