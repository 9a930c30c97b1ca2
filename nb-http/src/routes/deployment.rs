//! GET/POST `/deployment` (§4.D). Replacing the `DeploymentMap` never
//! changes which engines run, so unlike `/config` this only notifies the
//! orchestrator for bookkeeping — no diff/restart follows.

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};

use nb_common::parse_tolerant;
use nb_common::DeploymentMap;

use crate::envelope::Envelope;
use crate::state::{ApiState, ReloadReason};

pub fn router() -> Router<ApiState> {
    Router::new().route("/deployment", get(get_deployment).post(post_deployment))
}

async fn get_deployment(State(state): State<ApiState>) -> Json<Envelope> {
    let deployment = state.store.deployment().await;
    let value = serde_json::to_value(&*deployment).unwrap_or(serde_json::Value::Null);
    Json(Envelope::ok(value))
}

async fn post_deployment(State(state): State<ApiState>, body: axum::body::Bytes) -> (StatusCode, Json<Envelope>) {
    match parse_tolerant::<DeploymentMap>(&body) {
        Ok(new_deployment) => {
            state.store.swap_deployment(new_deployment.clone()).await;
            let _ = state.reload_tx.send(ReloadReason::DeploymentChanged);
            let value = serde_json::to_value(&new_deployment).unwrap_or(serde_json::Value::Null);
            (StatusCode::OK, Json(Envelope::ok(value)))
        }
        Err(e) => (StatusCode::BAD_REQUEST, Json(Envelope::err(e.to_string(), "could not parse deployment map as yaml or json"))),
    }
}
