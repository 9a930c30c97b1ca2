mod cli;
mod nic;
mod orchestrator;
mod supervisor;

use clap::Parser;
use signal_hook::consts::SIGHUP;
use signal_hook_tokio::Signals;
use tokio_stream::StreamExt;
use tracing::{error, info, warn};

use nb_common::config::{DeploymentMap, ServerConfig};
use nb_common::service_registry::new_service_registry;
use nb_common::{parse_tolerant, ConfigStore};
use nb_http::ReloadReason;

use cli::Args;
use orchestrator::Orchestrator;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_new(&args.log_level)
                .unwrap_or_else(|_| "info".parse().unwrap()),
        )
        .init();

    info!("nb-server starting (network-boot provisioning)");

    let mut config = load_server_config(args.config.as_deref()).unwrap_or_else(|e| {
        error!("startup config validation failed: {e}");
        std::process::exit(2);
    });
    let deployment = load_deployment_map(args.deployment.as_deref()).unwrap_or_else(|e| {
        error!("startup deployment-map parse failed: {e}");
        std::process::exit(2);
    });

    config = args.overlay(config);
    nic::autodetect(&mut config.adapter_name, &mut config.dhcp_address);
    config = config.apply_defaults();

    if let Err(e) = config.validate() {
        error!("startup config validation failed: {e}");
        std::process::exit(2);
    }

    info!(
        "config: adapter={} dhcp={} tftp={} http={} dhcp_enabled={} tftp_enabled={} http_enabled={}",
        config.adapter_name, config.dhcp_address, config.tftp_address, config.http_address,
        config.enable_dhcp, config.enable_tftp, config.enable_http,
    );

    let store = ConfigStore::new(config, deployment);
    let registry = new_service_registry();
    let (reload_tx, mut reload_rx) = tokio::sync::mpsc::unbounded_channel::<ReloadReason>();

    let orchestrator = std::sync::Arc::new(Orchestrator::new(store, registry, reload_tx));

    if let Err(e) = orchestrator.start_services().await {
        error!("failed to start services: {e:#}");
        std::process::exit(1);
    }
    info!("nb-server started successfully");

    // Reconfiguration API notifies us over `reload_tx`; a ConfigChanged
    // reason means some engine's enable flag or bound address may have
    // changed, so we resync the whole set (§4.E). DeploymentChanged never
    // touches which engines run, so it's acknowledged and otherwise ignored
    // here — the HTTP plane already swapped the map in under its own lock.
    {
        let orchestrator = orchestrator.clone();
        tokio::spawn(async move {
            while let Some(reason) = reload_rx.recv().await {
                match reason {
                    ReloadReason::ConfigChanged => {
                        if let Err(e) = orchestrator.resync().await {
                            error!("resync after /config reload failed: {e:#}");
                        }
                    }
                    ReloadReason::DeploymentChanged => {
                        info!("deployment map replaced via /deployment");
                    }
                }
            }
        });
    }

    // SIGHUP re-reads the on-disk files named by --config/--deployment, the
    // same tolerant YAML-or-JSON loader the startup path and the HTTP
    // reconfiguration API share (§4.A, §6 scenario 6).
    {
        let orchestrator = orchestrator.clone();
        let config_path = args.config.clone();
        let deployment_path = args.deployment.clone();
        tokio::spawn(async move {
            if let Err(e) = handle_sighup(orchestrator, config_path, deployment_path).await {
                error!("SIGHUP handler error: {e:#}");
            }
        });
    }

    tokio::signal::ctrl_c().await?;
    info!("shutting down...");
    orchestrator.stop_all().await;
    info!("shutdown complete");

    Ok(())
}

/// Load a `ServerConfig` from `path` if given, defaulting otherwise. Startup
/// applies the same tolerant YAML-or-JSON parse the reconfiguration API uses
/// (§4.A), but validation happens after the CLI overlay and NIC
/// auto-detection run, not here.
fn load_server_config(path: Option<&str>) -> anyhow::Result<ServerConfig> {
    match path {
        Some(path) => {
            let bytes = std::fs::read(path)
                .map_err(|e| anyhow::anyhow!("reading config file {path:?}: {e}"))?;
            let config = nb_common::parse_server_config(&bytes)
                .map_err(|e| anyhow::anyhow!("parsing config file {path:?}: {e}"))?;
            Ok(config)
        }
        None => Ok(ServerConfig::default()),
    }
}

fn load_deployment_map(path: Option<&str>) -> anyhow::Result<DeploymentMap> {
    match path {
        Some(path) => {
            let bytes = std::fs::read(path)
                .map_err(|e| anyhow::anyhow!("reading deployment file {path:?}: {e}"))?;
            let map = parse_tolerant::<DeploymentMap>(&bytes)
                .map_err(|e| anyhow::anyhow!("parsing deployment file {path:?}: {e}"))?;
            Ok(map)
        }
        None => Ok(DeploymentMap::default()),
    }
}

async fn handle_sighup(
    orchestrator: std::sync::Arc<Orchestrator>,
    config_path: Option<String>,
    deployment_path: Option<String>,
) -> anyhow::Result<()> {
    let mut signals = Signals::new([SIGHUP])?;

    while let Some(signal) = signals.next().await {
        if signal == SIGHUP {
            info!("received SIGHUP, reloading config from disk");

            if let Some(path) = &config_path {
                match orchestrator.reload_config_from_disk(path).await {
                    Ok(()) => info!("config reloaded from {path}"),
                    Err(e) => error!("failed to reload config from {path}: {e:#}"),
                }
            } else {
                warn!("SIGHUP received but no --config path was given at startup; nothing to reload");
            }

            if let Some(path) = &deployment_path {
                match orchestrator.reload_deployment_from_disk(path).await {
                    Ok(()) => info!("deployment map reloaded from {path}"),
                    Err(e) => error!("failed to reload deployment map from {path}: {e:#}"),
                }
            }
        }
    }

    Ok(())
}
