use tracing_subscriber::{EnvFilter, fmt};
use tracing::info;

use courtbook::config::Settings;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Init logging
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))?;
    fmt().with_env_filter(filter).init();

    let settings = Settings::from_env()?;

    // Startup banner at info level so something always prints at default verbosity
    let rust_log = std::env::var("RUST_LOG").unwrap_or_else(|_| "<unset>".to_string());
    info!(
        target: "courtbook",
        "courtbook starting: RUST_LOG='{}', http_port={}, data_dir={:?}, local_issuer='{}', federated_issuer={:?}, request_timeout={}s",
        rust_log,
        settings.http_port,
        settings.data_dir,
        settings.local_issuer,
        settings.federated_issuer,
        settings.request_timeout_secs
    );

    courtbook::server::run(settings).await
}
