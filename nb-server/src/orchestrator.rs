//! Boot orchestrator (§4.E): owns `ConfigStore`/`ServiceRegistry`, starts the
//! three engines under supervision, and diffs/restarts them on reload.
//!
//! Each engine has an explicit "relevant signature" — the subset of
//! `ServerConfig` fields whose change actually requires stopping and
//! restarting that engine's listening socket. Unlike a generic deep-diff,
//! this keeps the restart decision legible per engine and matches §4.D's
//! "restarts only the engines whose `enable_*` flag or bound address
//! changed".

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::{mpsc, watch, Mutex};

use nb_common::service_registry::{mark_disabled, set_status, ServiceState, SharedServiceRegistry};
use nb_common::{ConfigStore, ServerConfig};

use nb_dhcp::{run_dhcp_server, DhcpEngineConfig, DhcpState, SharedDhcpState};
use nb_http::{run_http_server, ApiState, ReloadReason};
use nb_tftp::{run_tftp_server, TftpServerConfig, DEFAULT_MAX_CONCURRENT_TRANSFERS};

use crate::supervisor::{spawn_supervised, ServicePriority};

const DHCP: &str = "dhcp";
const TFTP: &str = "tftp";
const HTTP: &str = "http";
const GRACE_PERIOD: Duration = Duration::from_secs(5);
const STARTUP_PROBE_DELAY: Duration = Duration::from_millis(200);

#[derive(Debug, Clone, PartialEq)]
struct DhcpSignature {
    enabled: bool,
    adapter_name: String,
    dhcp_address: String,
    tftp_address: String,
    pxe_filename: String,
    gateway: String,
    dns: String,
    start_address: String,
    lease_count: u32,
    lease_time_secs: u64,
}

impl DhcpSignature {
    fn of(config: &ServerConfig) -> Self {
        Self {
            enabled: config.enable_dhcp,
            adapter_name: config.adapter_name.clone(),
            dhcp_address: config.dhcp_address.clone(),
            tftp_address: config.tftp_address.clone(),
            pxe_filename: config.pxe_filename.clone(),
            gateway: config.dhcp_pool.gateway.clone(),
            dns: config.dhcp_pool.dns.clone(),
            start_address: config.dhcp_pool.start_address.clone(),
            lease_count: config.dhcp_pool.lease_count,
            lease_time_secs: config.lease_time_secs,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
struct TftpSignature {
    enabled: bool,
    adapter_name: String,
    tftp_address: String,
    doc_root: String,
}

impl TftpSignature {
    fn of(config: &ServerConfig) -> Self {
        Self {
            enabled: config.enable_tftp,
            adapter_name: config.adapter_name.clone(),
            tftp_address: config.tftp_address.clone(),
            doc_root: config.doc_root.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
struct HttpSignature {
    enabled: bool,
    http_address: String,
    doc_root: String,
}

impl HttpSignature {
    fn of(config: &ServerConfig) -> Self {
        Self {
            enabled: config.enable_http,
            http_address: config.http_address.clone(),
            doc_root: config.doc_root.clone(),
        }
    }
}

struct EngineHandle {
    shutdown_tx: watch::Sender<bool>,
    join: tokio::task::JoinHandle<()>,
}

impl EngineHandle {
    /// Close the listening socket and wait up to the grace period for the
    /// in-flight supervised task to drain (§5 "Cancellation").
    async fn stop(self, name: &str) {
        let _ = self.shutdown_tx.send(true);
        if tokio::time::timeout(GRACE_PERIOD, self.join).await.is_err() {
            tracing::warn!("{name} did not stop within the {GRACE_PERIOD:?} grace period");
        }
    }
}

pub struct Orchestrator {
    store: ConfigStore,
    registry: SharedServiceRegistry,
    reload_tx: mpsc::UnboundedSender<ReloadReason>,

    dhcp_state: Mutex<Option<SharedDhcpState>>,
    dhcp: Mutex<Option<(EngineHandle, DhcpSignature)>>,
    tftp: Mutex<Option<(EngineHandle, TftpSignature)>>,
    http: Mutex<Option<(EngineHandle, HttpSignature, ApiState)>>,
}

impl Orchestrator {
    pub fn new(store: ConfigStore, registry: SharedServiceRegistry, reload_tx: mpsc::UnboundedSender<ReloadReason>) -> Self {
        Self {
            store,
            registry,
            reload_tx,
            dhcp_state: Mutex::new(None),
            dhcp: Mutex::new(None),
            tftp: Mutex::new(None),
            http: Mutex::new(None),
        }
    }

    /// Start every engine enabled in the current config. Returns an error if
    /// any engine's listening socket fails to bind before reaching `Running`
    /// (§6 "exit 1 if a listening socket cannot be bound").
    pub async fn start_services(&self) -> Result<()> {
        let config = self.store.config().await;
        self.sync_dhcp(&config).await?;
        self.sync_tftp(&config).await?;
        self.sync_http(&config).await?;
        Ok(())
    }

    /// Re-read the current `ServerConfig` and restart whichever engines'
    /// signatures changed since they were last (re)started. This is the one
    /// diff/restart code path shared by the HTTP reconfiguration API and the
    /// SIGHUP handler (§4.E "Reload trigger").
    pub async fn resync(&self) -> Result<()> {
        let config = self.store.config().await;
        self.sync_dhcp(&config).await?;
        self.sync_tftp(&config).await?;
        self.sync_http(&config).await?;
        Ok(())
    }

    /// Parse+validate a new config from disk, swap it in, rebuild the HTTP
    /// dispatch cache, and resync — the SIGHUP path's mirror of what POST
    /// `/config` already does for the HTTP-triggered path (§4.E).
    pub async fn reload_config_from_disk(&self, path: &str) -> Result<()> {
        let bytes = std::fs::read(path).with_context(|| format!("reading config file {path}"))?;
        let new_config = nb_common::parse_and_validate(&bytes).with_context(|| format!("parsing config file {path}"))?;
        self.store.swap_config(new_config.clone()).await;
        if let Some((_, _, api_state)) = self.http.lock().await.as_ref() {
            api_state.rebuild_dispatch(&new_config).await;
        }
        self.resync().await
    }

    pub async fn reload_deployment_from_disk(&self, path: &str) -> Result<()> {
        let bytes = std::fs::read(path).with_context(|| format!("reading deployment file {path}"))?;
        let new_deployment = nb_common::parse_tolerant(&bytes).with_context(|| format!("parsing deployment file {path}"))?;
        self.store.swap_deployment(new_deployment).await;
        Ok(())
    }

    /// Build an `ApiState` bound to this orchestrator's store and reload
    /// channel, for the caller to hand to `start_services`'s first HTTP
    /// startup. Exposed so `main.rs` can wire `--doc-root` once up front.
    pub fn reload_sender(&self) -> mpsc::UnboundedSender<ReloadReason> {
        self.reload_tx.clone()
    }

    async fn sync_dhcp(&self, config: &ServerConfig) -> Result<()> {
        let wanted = DhcpSignature::of(config);
        let mut slot = self.dhcp.lock().await;

        let unchanged = slot.as_ref().map(|(_, sig)| sig == &wanted).unwrap_or(false);
        if unchanged {
            return Ok(());
        }

        if let Some((handle, _)) = slot.take() {
            handle.stop(DHCP).await;
        }

        if !wanted.enabled {
            mark_disabled(&self.registry, DHCP, ServicePriority::Critical).await;
            return Ok(());
        }

        let engine_config = DhcpEngineConfig::from_server_config(config).context("building DHCP engine config")?;
        let state = {
            let mut guard = self.dhcp_state.lock().await;
            match guard.as_ref() {
                Some(existing) => {
                    existing.replace_config(engine_config).await;
                    existing.clone()
                }
                None => {
                    let fresh: SharedDhcpState = Arc::new(DhcpState::new(engine_config));
                    *guard = Some(fresh.clone());
                    fresh
                }
            }
        };

        let handle = self.spawn_dhcp(state).await?;
        *slot = Some((handle, wanted));
        Ok(())
    }

    async fn spawn_dhcp(&self, state: SharedDhcpState) -> Result<EngineHandle> {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let registry = self.registry.clone();
        let join = spawn_supervised(registry, DHCP, ServicePriority::Critical, move || {
            let state = state.clone();
            let shutdown_rx = shutdown_rx.clone();
            async move { run_dhcp_server(state, shutdown_rx).await }
        });
        self.probe_startup(DHCP, ServicePriority::Critical).await?;
        Ok(EngineHandle { shutdown_tx, join })
    }

    async fn sync_tftp(&self, config: &ServerConfig) -> Result<()> {
        let wanted = TftpSignature::of(config);
        let mut slot = self.tftp.lock().await;

        let unchanged = slot.as_ref().map(|(_, sig)| sig == &wanted).unwrap_or(false);
        if unchanged {
            return Ok(());
        }

        if let Some((handle, _)) = slot.take() {
            handle.stop(TFTP).await;
        }

        if !wanted.enabled {
            mark_disabled(&self.registry, TFTP, ServicePriority::Important).await;
            return Ok(());
        }

        let tftp_config = TftpServerConfig {
            adapter_name: config.adapter_name.clone(),
            doc_root: PathBuf::from(&config.doc_root),
            max_concurrent_transfers: DEFAULT_MAX_CONCURRENT_TRANSFERS,
        };

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let registry = self.registry.clone();
        let join = spawn_supervised(registry, TFTP, ServicePriority::Important, move || {
            let shutdown_rx = shutdown_rx.clone();
            let tftp_config = TftpServerConfig {
                adapter_name: tftp_config.adapter_name.clone(),
                doc_root: tftp_config.doc_root.clone(),
                max_concurrent_transfers: tftp_config.max_concurrent_transfers,
            };
            async move { run_tftp_server(tftp_config, shutdown_rx).await }
        });
        self.probe_startup(TFTP, ServicePriority::Important).await?;

        *slot = Some((EngineHandle { shutdown_tx, join }, wanted));
        Ok(())
    }

    async fn sync_http(&self, config: &ServerConfig) -> Result<()> {
        let wanted = HttpSignature::of(config);
        let mut slot = self.http.lock().await;

        if let Some((_, sig, _)) = slot.as_ref() {
            if sig == &wanted {
                return Ok(());
            }
        }

        let previous_state = slot.as_ref().map(|(_, _, state)| state.clone());
        if let Some((handle, _, _)) = slot.take() {
            handle.stop(HTTP).await;
        }

        if !wanted.enabled {
            mark_disabled(&self.registry, HTTP, ServicePriority::Critical).await;
            return Ok(());
        }

        let api_state = previous_state.unwrap_or_else(|| {
            ApiState::new(self.store.clone(), PathBuf::from(&config.doc_root), config, self.reload_tx.clone())
        });

        let addr: SocketAddr = format!("{}:80", config.http_address)
            .parse()
            .with_context(|| format!("http_address {:?} does not parse as a socket address", config.http_address))?;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let registry = self.registry.clone();
        let task_state = api_state.clone();
        let join = spawn_supervised(registry, HTTP, ServicePriority::Critical, move || {
            let state = task_state.clone();
            let shutdown_rx = shutdown_rx.clone();
            async move { run_http_server(addr, state, shutdown_rx).await }
        });
        self.probe_startup(HTTP, ServicePriority::Critical).await?;

        *slot = Some((EngineHandle { shutdown_tx, join }, wanted, api_state));
        Ok(())
    }

    /// Heuristic startup probe (§6): engines bind their listening socket
    /// synchronously before entering their request loop, so a brief sleep
    /// followed by a registry check tells us whether the bind already
    /// failed — without needing a dedicated "ready" channel per engine.
    async fn probe_startup(&self, name: &str, priority: ServicePriority) -> Result<()> {
        tokio::time::sleep(STARTUP_PROBE_DELAY).await;
        let failed = matches!(
            self.registry.read().await.get(name).map(|s| s.state.clone()),
            Some(ServiceState::Failed)
        );
        if failed {
            anyhow::bail!("{name} failed to start (see logs for the bind error)");
        }
        set_status(&self.registry, name, priority, ServiceState::Running, None, 0).await;
        Ok(())
    }

    /// Stop every running engine, each within its own grace period (§5).
    pub async fn stop_all(&self) {
        if let Some((handle, _)) = self.dhcp.lock().await.take() {
            handle.stop(DHCP).await;
        }
        if let Some((handle, _)) = self.tftp.lock().await.take() {
            handle.stop(TFTP).await;
        }
        if let Some((handle, _, _)) = self.http.lock().await.take() {
            handle.stop(HTTP).await;
        }
    }
}
