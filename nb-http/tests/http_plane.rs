//! Integration tests for the HTTP delivery plane, driven without a real
//! socket via `axum::Router` + `tower::ServiceExt::oneshot` (§1 Test tooling).

use axum::body::Body;
use axum::http::{Request, StatusCode};
use tower::ServiceExt;

use nb_common::{BootConfig, ConfigStore, DeploymentMap, ServerConfig};
use nb_http::{build_router, ApiState};

fn base_config() -> ServerConfig {
    ServerConfig {
        enable_http: true,
        http_address: "10.0.0.1".to_string(),
        boot_configs: vec![BootConfig {
            name: "default".into(),
            kernel_path: "vmlinuz".into(),
            initrd_path: "initrd.img".into(),
            cmdline: "console=ttyS0".into(),
        }],
        ..ServerConfig::default()
    }
    .apply_defaults()
}

fn state_with(config: ServerConfig) -> ApiState {
    let store = ConfigStore::new(config.clone(), DeploymentMap::default());
    let (reload_tx, _reload_rx) = tokio::sync::mpsc::unbounded_channel();
    ApiState::new(store, std::env::temp_dir(), &config, reload_tx)
}

#[tokio::test]
async fn health_reports_alive() {
    let router = build_router(state_with(base_config()));
    let response = router
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(value["alive"], true);
}

#[tokio::test]
async fn anyboot_renders_default_boot_config_unconditionally() {
    let router = build_router(state_with(base_config()));
    let response = router
        .oneshot(Request::builder().uri("/anyboot.ipxe").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let text = String::from_utf8(body.to_vec()).unwrap();
    assert!(text.contains("kernel http://10.0.0.1/vmlinuz console=ttyS0"));
    assert!(text.contains("initrd http://10.0.0.1/initrd.img"));
}

#[tokio::test]
async fn preseed_404s_when_no_preeseed_boot_config_exists() {
    let router = build_router(state_with(base_config()));
    let response = router
        .oneshot(Request::builder().uri("/preseed.ipxe").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn reboot_ipxe_is_a_fixed_stanza() {
    let router = build_router(state_with(base_config()));
    let response = router
        .oneshot(Request::builder().uri("/reboot.ipxe").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(body.as_ref(), b"#!ipxe\nreboot\n");
}

#[tokio::test]
async fn config_round_trips_through_post_then_get() {
    let router = build_router(state_with(base_config()));

    let mut config = base_config();
    config.pxe_filename = "snponly.efi".to_string();
    let body = serde_json::to_vec(&config).unwrap();

    let post_response = router
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/config")
                .header("content-type", "application/json")
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(post_response.status(), StatusCode::OK);

    let get_response = router
        .oneshot(Request::builder().uri("/config").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(get_response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(get_response.into_body(), usize::MAX).await.unwrap();
    let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(value["response"]["pxe_filename"], "snponly.efi");
}

#[tokio::test]
async fn post_config_rejects_malformed_body_without_swapping_state() {
    let router = build_router(state_with(base_config()));

    let post_response = router
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/config")
                .header("content-type", "application/json")
                .body(Body::from("not valid json or yaml: [") )
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(post_response.status(), StatusCode::BAD_REQUEST);

    let get_response = router
        .oneshot(Request::builder().uri("/config").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let body = axum::body::to_bytes(get_response.into_body(), usize::MAX).await.unwrap();
    let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(value["response"]["pxe_filename"], "undionly.kpxe");
}
