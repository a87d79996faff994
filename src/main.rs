use std::{path::PathBuf, sync::Arc};

use anyhow::Context as _;
use tracing::{Instrument as _, debug, error, info, info_span, instrument};
use tunnel_proxy_core::{ProxyConfig, Resolver, TunnelProxy, client::build_client, server::Server};

mod logging;

const CONFIG_ENV: &str = "TUNNEL_PROXY_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "./tunnel-proxy.yaml";

#[tokio::main]
async fn main() {
    if let Err(e) = logging::init_logging_from_env() {
        eprintln!("Failed to initialize logging: {}", e);
        std::process::exit(1);
    }

    if let Err(e) = run().await {
        error!("Failed to start proxy server: {:#}", e);
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let proxy = startup()
        .instrument(info_span!("tunnel_proxy_startup"))
        .await?;

    tokio::select! {
        _ = run_server(proxy.server()) => {}
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                error!("Cannot listen for shutdown signal: {}", e);
            }
            info!("Shutdown signal received");
        }
    }

    proxy.shutdown().await;
    info!("Tunnel proxy stopped");
    Ok(())
}

async fn startup() -> anyhow::Result<TunnelProxy> {
    info!(version = env!("CARGO_PKG_VERSION"), "Starting tunnel proxy");
    let config = load_config()?;

    let client = build_client();
    let resolver = Arc::new(Resolver::from_config(&config, client.clone())?);

    // No point serving without a tunnel; fail fast instead.
    let proxy = TunnelProxy::start(&config, resolver, client)
        .await
        .with_context(|| format!("cannot start proxy on {}", config.listen))?;

    info!(listen = %config.listen, "HTTP proxy server listening");
    if let Some(target) = proxy.store().get() {
        info!("Proxying to: {}", target);
    }
    info!("Removing specified headers from all requests");

    Ok(proxy)
}

/// Reads `$TUNNEL_PROXY_CONFIG`, else `./tunnel-proxy.yaml` when present,
/// else the built-in defaults.
fn load_config() -> anyhow::Result<ProxyConfig> {
    let path = match std::env::var_os(CONFIG_ENV) {
        Some(path) => Some(PathBuf::from(path)),
        None => Some(PathBuf::from(DEFAULT_CONFIG_PATH)).filter(|p| p.exists()),
    };

    match path {
        Some(path) => {
            let config = ProxyConfig::load(&path)
                .with_context(|| format!("cannot load config {}", path.display()))?;
            info!(config_path = %path.display(), "Loaded configuration");
            Ok(config)
        }
        None => {
            info!("Using default configuration");
            Ok(ProxyConfig::default())
        }
    }
}

#[instrument(skip(server))]
async fn run_server(server: &Server) {
    loop {
        match server.accept().await {
            Ok(_) => debug!("Accepted new connection"),
            Err(e) => error!("Failed to accept connection: {}", e),
        }
    }
}
