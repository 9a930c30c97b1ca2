//! GET/POST `/config` (§4.D). POST validates fully before writing any status
//! (§4.D "HTTP status ordering", §9) and, on success, tells the orchestrator
//! to diff and restart whichever engines changed.

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};

use nb_common::parse_and_validate;

use crate::envelope::Envelope;
use crate::state::{ApiState, ReloadReason};

pub fn router() -> Router<ApiState> {
    Router::new().route("/config", get(get_config).post(post_config))
}

async fn get_config(State(state): State<ApiState>) -> Json<Envelope> {
    let config = state.store.config().await;
    let value = serde_json::to_value(&config).unwrap_or(serde_json::Value::Null);
    Json(Envelope::ok(value))
}

async fn post_config(State(state): State<ApiState>, body: axum::body::Bytes) -> (StatusCode, Json<Envelope>) {
    match parse_and_validate(&body) {
        Ok(new_config) => {
            state.store.swap_config(new_config.clone()).await;
            state.rebuild_dispatch(&new_config).await;
            let _ = state.reload_tx.send(ReloadReason::ConfigChanged);
            let value = serde_json::to_value(&new_config).unwrap_or(serde_json::Value::Null);
            (StatusCode::OK, Json(Envelope::ok(value)))
        }
        Err(e) => {
            let friendly = e.friendly().to_string();
            (StatusCode::BAD_REQUEST, Json(Envelope::err(e.to_string(), friendly)))
        }
    }
}
