//! Generic supervised-task runner (component G, §4.E "Supervision (ambient)").
//!
//! Each long-lived engine is started through `spawn_supervised`, which
//! restarts the factory's future on an unexpected exit or panic with a
//! priority-scaled backoff, and mirrors every transition into the shared
//! `ServiceRegistry` so `ServiceStatus` stays the one place that answers
//! "is this engine up right now".

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use nb_common::service_registry::{set_status, ServicePriorityLevel, ServiceState, SharedServiceRegistry};

/// Two tiers only (§4.E): DHCP and HTTP are `Critical` — unbounded retries,
/// short backoff, because losing either mid-fleet-boot is the worst outcome.
/// TFTP is `Important` — bounded retries, longer backoff, since a transient
/// TFTP hiccup is recoverable by the client's own retry logic.
pub use nb_common::service_registry::ServicePriorityLevel as ServicePriority;

fn max_retries(priority: ServicePriority) -> u32 {
    match priority {
        ServicePriority::Critical => u32::MAX,
        ServicePriority::Important => 10,
    }
}

fn backoff(priority: ServicePriority, retry: u32) -> Duration {
    match priority {
        ServicePriority::Critical => Duration::from_millis(100 * retry as u64),
        ServicePriority::Important => Duration::from_secs(retry as u64),
    }
}

/// Spawn `factory` under supervision. The service restarts automatically on
/// panic or an `Err` return, according to `priority`'s retry budget and
/// backoff curve. A clean `Ok(())` return — which only happens when an
/// engine observes its shutdown signal — ends supervision without marking
/// the service failed.
pub fn spawn_supervised<F, Fut>(
    registry: SharedServiceRegistry,
    name: &'static str,
    priority: ServicePriority,
    factory: F,
) -> JoinHandle<()>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    let factory = Arc::new(factory);
    tokio::spawn(async move {
        let retry_limit = max_retries(priority);
        let mut retries: u32 = 0;
        let mut last_restart = Instant::now();

        loop {
            info!("[supervisor] starting service: {name}");
            set_status(&registry, name, priority.clone(), ServiceState::Starting, None, retries).await;

            let f = Arc::clone(&factory);
            let result = tokio::spawn(async move { AssertUnwindSafe(f()).await }).await;

            match result {
                Ok(Ok(())) => {
                    info!("[supervisor] {name} exited cleanly");
                    set_status(&registry, name, priority.clone(), ServiceState::Stopped, None, retries).await;
                    break;
                }
                Ok(Err(e)) => {
                    error!("[supervisor] {name} failed: {e:#}");
                    set_status(&registry, name, priority.clone(), ServiceState::Failed, Some(e.to_string()), retries).await;
                }
                Err(join_error) => {
                    error!("[supervisor] {name} task panicked: {join_error}");
                    set_status(&registry, name, priority.clone(), ServiceState::Failed, Some(join_error.to_string()), retries).await;
                }
            }

            // A service that ran for more than a minute before failing again
            // is treated as a fresh failure, not a continuation of a crash loop.
            if last_restart.elapsed() > Duration::from_secs(60) {
                retries = 0;
            }

            retries = retries.saturating_add(1);

            if retries > retry_limit {
                error!("[supervisor] {name} exceeded max retries ({retry_limit}), giving up");
                set_status(&registry, name, priority.clone(), ServiceState::Failed, Some("max retries exceeded".to_string()), retries).await;
                break;
            }

            let delay = backoff(priority.clone(), retries);
            warn!("[supervisor] {name} restarting in {delay:?} (attempt {retries}/{retry_limit})");
            tokio::time::sleep(delay).await;
            last_restart = Instant::now();
        }
    })
}
