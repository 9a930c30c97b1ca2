use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ServiceState {
    Starting,
    Running,
    Failed,
    Stopped,
    Disabled,
}

/// Only two tiers are actually used (§4.E): DHCP and HTTP are `Critical`,
/// TFTP is `Important`. There is no `Background` tier in this server — every
/// engine here is on the PXE critical path to some degree.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum ServicePriorityLevel {
    Critical,
    Important,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceStatus {
    pub name: String,
    pub state: ServiceState,
    pub priority: ServicePriorityLevel,
    pub restart_count: u32,
    pub last_state_change: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub type SharedServiceRegistry = Arc<RwLock<HashMap<String, ServiceStatus>>>;

pub fn new_service_registry() -> SharedServiceRegistry {
    Arc::new(RwLock::new(HashMap::new()))
}

pub fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Record a state transition for `name`, replacing whatever entry was there.
/// Both the supervisor (crash/restart lifecycle) and the orchestrator
/// (enable/disable, startup-probe "now Running") write through this single
/// function so `ServiceStatus` always reflects one coherent timeline.
pub async fn set_status(
    registry: &SharedServiceRegistry,
    name: &str,
    priority: ServicePriorityLevel,
    state: ServiceState,
    error: Option<String>,
    restart_count: u32,
) {
    registry.write().await.insert(
        name.to_string(),
        ServiceStatus {
            name: name.to_string(),
            state,
            priority,
            restart_count,
            last_state_change: now_millis(),
            error,
        },
    );
}

/// Shorthand for the common "this engine's enable flag is false" case.
pub async fn mark_disabled(registry: &SharedServiceRegistry, name: &str, priority: ServicePriorityLevel) {
    set_status(registry, name, priority, ServiceState::Disabled, None, 0).await;
}
