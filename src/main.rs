use std::sync::Arc;

use error_pages_proxy::{Config, build_client, serve, shutdown_signal};
use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

const DEFAULT_CONFIG_PATH: &str = "./config.yml";

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_owned());

    let config = Config::load_from_file(&config_path)
        .and_then(Config::into_runtime)
        .unwrap_or_else(|e| {
            error!(%e, path = %config_path, "failed to load configuration");
            std::process::exit(1);
        });
    let config = Arc::new(config);

    let listener = TcpListener::bind(config.listen).await.unwrap_or_else(|e| {
        error!(%e, addr = %config.listen, "failed to bind listener");
        std::process::exit(1);
    });

    info!(
        version = env!("CARGO_PKG_VERSION"),
        addr = %config.listen,
        upstream = %config.upstream,
        theme = config.pages.renderer().theme(),
        show_details = config.pages.show_details(),
        "error pages proxy listening"
    );

    let client = build_client(&config);
    serve(listener, client, config, shutdown_signal()).await;
}
