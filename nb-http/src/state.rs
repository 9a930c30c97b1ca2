use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::{mpsc, RwLock};

use nb_common::{BootConfig, ConfigStore, ServerConfig};

/// The derived "boot dispatch table" of §3: a cache from boot-config name to
/// `BootConfig`, rebuilt on each successful configuration swap so request
/// handlers never have to linear-scan `ServerConfig::boot_configs`.
pub type DispatchCache = Arc<RwLock<HashMap<String, BootConfig>>>;

pub fn build_dispatch_cache(config: &ServerConfig) -> HashMap<String, BootConfig> {
    config.boot_configs.iter().map(|bc| (bc.name.clone(), bc.clone())).collect()
}

pub fn new_dispatch_cache(config: &ServerConfig) -> DispatchCache {
    Arc::new(RwLock::new(build_dispatch_cache(config)))
}

/// What changed, so the orchestrator's reload loop knows whether it needs to
/// diff engines (`ConfigChanged`) or can just note the swap (`DeploymentChanged`
/// never touches which engines run — only `ServerConfig` does).
#[derive(Debug, Clone, Copy)]
pub enum ReloadReason {
    ConfigChanged,
    DeploymentChanged,
}

/// Shared state for every HTTP handler (§4.D, §4.E). `store` is the single
/// place `ServerConfig`/`DeploymentMap` live; `reload_tx` is how a successful
/// POST tells the orchestrator "go diff and restart what changed" without the
/// HTTP plane itself knowing anything about engine lifecycles.
#[derive(Clone)]
pub struct ApiState {
    pub store: ConfigStore,
    pub doc_root: PathBuf,
    pub dispatch: DispatchCache,
    pub reload_tx: mpsc::UnboundedSender<ReloadReason>,
}

impl ApiState {
    pub fn new(store: ConfigStore, doc_root: PathBuf, initial_config: &ServerConfig, reload_tx: mpsc::UnboundedSender<ReloadReason>) -> Self {
        Self {
            store,
            doc_root,
            dispatch: new_dispatch_cache(initial_config),
            reload_tx,
        }
    }

    pub async fn rebuild_dispatch(&self, config: &ServerConfig) {
        *self.dispatch.write().await = build_dispatch_cache(config);
    }
}
