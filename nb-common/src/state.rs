use std::sync::Arc;
use tokio::sync::RwLock;

use crate::config::{DeploymentMap, ServerConfig};

/// Single point of ownership for the two pieces of state the orchestrator
/// exclusively writes: `ServerConfig` and `DeploymentMap`. Engines clone the
/// `Arc` and take a read guard for the duration of one request/packet — they
/// never hold a guard across I/O.
///
/// Replacement is atomic: `ConfigStore::swap_config`/`swap_deployment` install
/// a new, already-validated value under the write lock. In-flight readers
/// keep seeing the previous value until they drop their guard.
#[derive(Clone)]
pub struct ConfigStore {
    config: Arc<RwLock<ServerConfig>>,
    deployment: Arc<RwLock<DeploymentMap>>,
}

impl ConfigStore {
    pub fn new(config: ServerConfig, deployment: DeploymentMap) -> Self {
        Self {
            config: Arc::new(RwLock::new(config)),
            deployment: Arc::new(RwLock::new(deployment)),
        }
    }

    pub async fn config(&self) -> ServerConfig {
        self.config.read().await.clone()
    }

    pub async fn deployment(&self) -> Arc<DeploymentMap> {
        // DeploymentMap can be large; hand back a read-guard clone only when
        // a caller needs to mutate it. Readers get a cheap owned snapshot via
        // the same pattern as `config()`.
        Arc::new(self.deployment.read().await.clone())
    }

    pub async fn swap_config(&self, new_config: ServerConfig) {
        *self.config.write().await = new_config;
    }

    pub async fn swap_deployment(&self, new_deployment: DeploymentMap) {
        *self.deployment.write().await = new_deployment;
    }
}

/// The minimal shape a real SSH transport needs for one target host
/// (component F, §4.F). `auth` is either a password or a private-key path.
#[derive(Debug, Clone)]
pub struct HostSshConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub auth: SshAuth,
    pub connect_timeout_secs: u64,
}

#[derive(Debug, Clone)]
pub enum SshAuth {
    Password(String),
    PrivateKeyPath(std::path::PathBuf),
}

impl HostSshConfig {
    /// `host:port`, appending the default port 22 when the configured host
    /// has no port of its own.
    pub fn host_port(&self) -> (String, u16) {
        if let Some((h, p)) = self.host.split_once(':') {
            if let Ok(port) = p.parse() {
                return (h.to_string(), port);
            }
        }
        (self.host.clone(), self.port)
    }
}
