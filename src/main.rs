//! janus-proxy - Main entry point

use clap::Parser;
use janus_proxy::api::{CmApiClient, JanusHttpClient};
use janus_proxy::args::Args;
use janus_proxy::config::Config;
use janus_proxy::jobs::SpoolDirectory;
use janus_proxy::web::{self, SharedState};
use janus_proxy::{JanusProxy, ProxyContext};
use log::{error, info, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::task;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Load configuration
    let mut config = match args.load_config() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Failed to load config {:?}: {}, using defaults", args.config, e);
            Config::default()
        }
    };
    config.apply_env_overrides();
    args.apply_overrides(&mut config);

    // Initialize logging with noise filtering for transport crates
    env_logger::Builder::new()
        .parse_filters(&std::env::var("JANUS_PROXY_LOG").unwrap_or_else(|_| config.logging.level.clone()))
        .filter_module("tungstenite", log::LevelFilter::Warn)
        .filter_module("tokio_tungstenite", log::LevelFilter::Warn)
        .filter_module("hyper", log::LevelFilter::Warn)
        .filter_module("reqwest", log::LevelFilter::Warn)
        .init();

    info!("janus-proxy v{}", env!("CARGO_PKG_VERSION"));
    info!("Using configuration from {:?}", args.config);

    // Validate configuration
    if let Err(e) = config.validate() {
        error!("Invalid configuration: {}", e);
        return Err(e);
    }
    if config.media_api.server_key.is_empty() {
        warn!("Media API server key is empty");
    }

    let media = CmApiClient::new(
        config.media_api.base_url.clone(),
        config.media_api.server_key.clone(),
        Duration::from_secs(config.media_api.timeout_secs),
    )?;
    let gateway = JanusHttpClient::new(
        config.gateway_http.address.clone(),
        Duration::from_secs(config.gateway_http.timeout_secs),
    )?;
    let jobs = SpoolDirectory::new(config.jobs.spool_dir.clone());
    info!("Spooling jobs to {:?}", jobs.dir());

    let context = ProxyContext::new(Arc::new(media), Arc::new(gateway), Arc::new(jobs))
        .with_transaction_timeout(config.proxy.transaction_timeout());
    let proxy = JanusProxy::new(config.proxy.clone(), Arc::new(context));

    // Start status HTTP server
    let mut http_handle = if config.http.enabled {
        let state = Arc::new(SharedState::new(proxy.clone()));
        let host = config.http.host.clone();
        let port = config.http.port;
        Some(task::spawn(async move {
            if let Err(e) = web::run_http_server(&host, port, state).await {
                error!("HTTP server error: {}", e);
            }
        }))
    } else {
        info!("Status HTTP server disabled");
        None
    };

    // Wait for shutdown signal
    let shutdown = async {
        let _ = signal::ctrl_c().await;
        info!("Shutdown signal received");
    };

    if let Err(e) = proxy.run_until(shutdown).await {
        error!("Proxy failed: {}", e);
    }

    info!("Initiating graceful shutdown...");
    proxy.stop().await;

    if let Some(handle) = http_handle.take() {
        if !handle.is_finished() {
            handle.abort();
            let _ = handle.await;
        }
    }

    info!("janus-proxy stopped");
    Ok(())
}
