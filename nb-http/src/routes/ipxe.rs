//! `/preseed.ipxe`, `/kickstart.ipxe`, `/anyboot.ipxe`, `/reboot.ipxe` (§4.D).

use axum::extract::{Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use serde::Deserialize;

use nb_common::config::{BOOT_CONFIG_DEFAULT, BOOT_CONFIG_KICKSTART, BOOT_CONFIG_PREESEED};

use crate::render::{render_ipxe, REBOOT_IPXE};
use crate::state::ApiState;

const PLAIN_TEXT: &str = "text/plain; charset=utf-8";

#[derive(Debug, Deserialize)]
pub struct MacQuery {
    mac: Option<String>,
}

pub fn router() -> Router<ApiState> {
    Router::new()
        .route("/preseed.ipxe", get(preseed))
        .route("/kickstart.ipxe", get(kickstart))
        .route("/anyboot.ipxe", get(anyboot))
        .route("/reboot.ipxe", get(reboot))
}

async fn preseed(State(state): State<ApiState>, Query(q): Query<MacQuery>) -> Response {
    render_named(&state, BOOT_CONFIG_PREESEED, q.mac).await
}

async fn kickstart(State(state): State<ApiState>, Query(q): Query<MacQuery>) -> Response {
    render_named(&state, BOOT_CONFIG_KICKSTART, q.mac).await
}

/// Unconditional (§4.D): always the default boot config, regardless of any
/// MAC the client may have supplied.
async fn anyboot(State(state): State<ApiState>) -> Response {
    render_response(&state, BOOT_CONFIG_DEFAULT).await
}

async fn reboot() -> impl IntoResponse {
    ([(header::CONTENT_TYPE, PLAIN_TEXT)], REBOOT_IPXE)
}

/// Render the literal privileged name, unless the request is MAC-qualified
/// (§4.D Per-MAC selection) — iPXE is instructed by DHCP to request a
/// MAC-qualified URL, so a `?mac=` query parameter here means "use the
/// deployment map's pick for this MAC, not the path's own name".
async fn render_named(state: &ApiState, privileged_name: &str, mac: Option<String>) -> Response {
    let name = match mac {
        Some(raw_mac) => match resolve_mac(state, &raw_mac).await {
            Some(resolved) => resolved,
            None => return (StatusCode::NOT_FOUND, "MAC is not deployed and any_boot is disabled").into_response(),
        },
        None => privileged_name.to_string(),
    };
    render_response(state, &name).await
}

async fn resolve_mac(state: &ApiState, raw_mac: &str) -> Option<String> {
    let deployment = state.store.deployment().await;
    if let Some(entry) = deployment.get(raw_mac) {
        return Some(entry.boot_config_name.clone());
    }
    let config = state.store.config().await;
    if config.any_boot {
        Some(BOOT_CONFIG_DEFAULT.to_string())
    } else {
        None
    }
}

async fn render_response(state: &ApiState, name: &str) -> Response {
    let http_address = state.store.config().await.http_address;
    let dispatch = state.dispatch.read().await;
    match dispatch.get(name) {
        Some(boot_config) => {
            let body = render_ipxe(boot_config, &http_address);
            ([(header::CONTENT_TYPE, PLAIN_TEXT)], body).into_response()
        }
        None => (StatusCode::NOT_FOUND, format!("no boot config named {name:?}")).into_response(),
    }
}
