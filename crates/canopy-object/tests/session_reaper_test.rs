//! Idle-session retention: the reaper aborts sessions past the retention
//! window and leaves active ones alone.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use canopy_common::error::CanopyError;
use canopy_namespace::{LocalNamespace, NamespaceStore};
use canopy_object::{GatewayConfig, ObjectGateway};
use tempfile::TempDir;

async fn new_gateway(config: GatewayConfig) -> (ObjectGateway, Arc<LocalNamespace>, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let ns = Arc::new(
        LocalNamespace::new(temp_dir.path().to_path_buf())
            .await
            .unwrap(),
    );
    let gateway = ObjectGateway::new(ns.clone(), config).await.unwrap();
    (gateway, ns, temp_dir)
}

#[tokio::test]
async fn idle_sessions_are_reaped() {
    let config = GatewayConfig {
        idle_retention: Duration::ZERO,
        ..GatewayConfig::default()
    };
    let (gateway, ns, _dir) = new_gateway(config).await;
    gateway.create_bucket("bucket").await.unwrap();
    let upload_id = gateway.initiate_upload("bucket", "object").await.unwrap();
    gateway
        .upload_part(&upload_id, 0, Bytes::from_static(b"data"), None)
        .await
        .unwrap();

    assert_eq!(gateway.reap_idle_uploads().await, 1);

    let err = gateway.list_parts(&upload_id).await.unwrap_err();
    assert!(matches!(err, CanopyError::NoSuchUpload(_)));
    assert!(
        !ns.stat(&format!("bucket/object_{upload_id}"))
            .await
            .unwrap()
            .exists
    );
}

#[tokio::test]
async fn active_sessions_survive_the_sweep() {
    let (gateway, _ns, _dir) = new_gateway(GatewayConfig::default()).await;
    gateway.create_bucket("bucket").await.unwrap();
    let upload_id = gateway.initiate_upload("bucket", "object").await.unwrap();

    assert_eq!(gateway.reap_idle_uploads().await, 0);
    assert!(gateway.list_parts(&upload_id).await.is_ok());
}

#[tokio::test]
async fn spawned_reaper_sweeps_periodically() {
    let config = GatewayConfig {
        idle_retention: Duration::ZERO,
        reap_interval: Duration::from_millis(25),
        ..GatewayConfig::default()
    };
    let (gateway, _ns, _dir) = new_gateway(config).await;
    gateway.create_bucket("bucket").await.unwrap();
    let upload_id = gateway.initiate_upload("bucket", "object").await.unwrap();

    let handle = gateway.spawn_reaper();
    tokio::time::sleep(Duration::from_millis(250)).await;
    handle.abort();

    let err = gateway.list_parts(&upload_id).await.unwrap_err();
    assert!(matches!(err, CanopyError::NoSuchUpload(_)));
}
