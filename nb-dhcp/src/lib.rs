pub mod config;
pub mod lease_store;
pub mod options;
pub mod packet;
pub mod server;
pub mod state_machine;

pub use config::{DhcpEngineConfig, EngineConfigError};
pub use lease_store::LeaseStore;
pub use server::run_dhcp_server;

use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};

/// Shared engine state: the working config (swapped wholesale on reload) and
/// the lease table (mutated in place, never swapped).
pub struct DhcpState {
    pub config: RwLock<DhcpEngineConfig>,
    pub leases: Mutex<LeaseStore>,
}

impl DhcpState {
    pub fn new(config: DhcpEngineConfig) -> Self {
        Self {
            config: RwLock::new(config),
            leases: Mutex::new(LeaseStore::new()),
        }
    }

    pub async fn replace_config(&self, config: DhcpEngineConfig) {
        *self.config.write().await = config;
    }
}

pub type SharedDhcpState = Arc<DhcpState>;
