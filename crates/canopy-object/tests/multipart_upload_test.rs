//! Session lifecycle and part-receiver behavior: staging durability at
//! initiate, strict NoSuchUpload handling, part replacement, digest
//! validation, and abort cleanup.

use std::sync::Arc;

use bytes::Bytes;
use canopy_common::error::CanopyError;
use canopy_namespace::{LocalNamespace, NamespaceStore};
use canopy_object::{GatewayConfig, ObjectGateway};
use md5::{Digest, Md5};
use tempfile::TempDir;

async fn new_gateway() -> (ObjectGateway, Arc<LocalNamespace>, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let ns = Arc::new(
        LocalNamespace::new(temp_dir.path().to_path_buf())
            .await
            .unwrap(),
    );
    let config = GatewayConfig {
        min_part_size: 1024,
        ..GatewayConfig::default()
    };
    let gateway = ObjectGateway::new(ns.clone(), config).await.unwrap();
    (gateway, ns, temp_dir)
}

#[tokio::test]
async fn initiate_creates_staging_and_session_record() {
    let (gateway, ns, _dir) = new_gateway().await;
    gateway.create_bucket("bucket").await.unwrap();

    let upload_id = gateway.initiate_upload("bucket", "object").await.unwrap();

    let staging = ns
        .stat(&format!("bucket/object_{upload_id}"))
        .await
        .unwrap();
    assert!(staging.exists);
    assert!(staging.is_dir);

    let record = ns
        .stat(&format!(".canopy.sys/multipart/{upload_id}.json"))
        .await
        .unwrap();
    assert!(record.is_file);
}

#[tokio::test]
async fn initiate_requires_an_existing_bucket() {
    let (gateway, _ns, _dir) = new_gateway().await;

    let err = gateway
        .initiate_upload("missing", "object")
        .await
        .unwrap_err();
    assert!(matches!(err, CanopyError::BucketNotFound(_)));
    assert!(gateway.head_bucket("missing").await.is_err());
}

#[tokio::test]
async fn upload_part_with_unknown_id_fails() {
    let (gateway, _ns, _dir) = new_gateway().await;
    gateway.create_bucket("bucket").await.unwrap();

    // Before any session was ever initiated.
    let err = gateway
        .upload_part("wrong", 1, Bytes::from_static(b"data"), None)
        .await
        .unwrap_err();
    assert!(matches!(err, CanopyError::NoSuchUpload(_)));

    // A live session for the same key does not make other ids valid.
    gateway.initiate_upload("bucket", "object").await.unwrap();
    let err = gateway
        .upload_part("wrong", 1, Bytes::from_static(b"data"), None)
        .await
        .unwrap_err();
    assert!(matches!(err, CanopyError::NoSuchUpload(_)));
}

#[tokio::test]
async fn negative_part_numbers_are_rejected() {
    let (gateway, _ns, _dir) = new_gateway().await;
    gateway.create_bucket("bucket").await.unwrap();
    let upload_id = gateway.initiate_upload("bucket", "object").await.unwrap();

    let err = gateway
        .upload_part(&upload_id, -1, Bytes::from_static(b"data"), None)
        .await
        .unwrap_err();
    assert!(matches!(err, CanopyError::InvalidPart(-1)));
}

#[tokio::test]
async fn reuploading_a_part_number_replaces_it() {
    let (gateway, _ns, _dir) = new_gateway().await;
    gateway.create_bucket("bucket").await.unwrap();
    let upload_id = gateway.initiate_upload("bucket", "object").await.unwrap();

    let first = gateway
        .upload_part(&upload_id, 3, Bytes::from_static(b"first payload"), None)
        .await
        .unwrap();
    let second = gateway
        .upload_part(&upload_id, 3, Bytes::from_static(b"second"), None)
        .await
        .unwrap();
    assert_ne!(first.etag, second.etag);

    let parts = gateway.list_parts(&upload_id).await.unwrap();
    assert_eq!(parts.len(), 1);
    assert_eq!(parts[0].part_number, 3);
    assert_eq!(parts[0].size, 6);
    assert_eq!(parts[0].etag, second.etag);

    // The staging object reflects the replacement too.
    let (_, data) = gateway
        .get_object("bucket", &format!("object_{upload_id}/3"))
        .await
        .unwrap();
    assert_eq!(&data[..], b"second");

    // And so does a completed object referencing that part number.
    gateway
        .complete_upload(&upload_id, &[canopy_object::ManifestEntry::new(3)], false)
        .await
        .unwrap();
    let (_, data) = gateway.get_object("bucket", "object").await.unwrap();
    assert_eq!(&data[..], b"second");
}

#[tokio::test]
async fn part_checksum_is_verified_when_supplied() {
    let (gateway, _ns, _dir) = new_gateway().await;
    gateway.create_bucket("bucket").await.unwrap();
    let upload_id = gateway.initiate_upload("bucket", "object").await.unwrap();

    let payload = Bytes::from_static(b"checksummed part");
    let good = format!("{:x}", Md5::digest(&payload));

    let err = gateway
        .upload_part(&upload_id, 0, payload.clone(), Some("00000000000000000000000000000000"))
        .await
        .unwrap_err();
    assert!(matches!(err, CanopyError::BadDigest { .. }));
    assert!(gateway.list_parts(&upload_id).await.unwrap().is_empty());

    let part = gateway
        .upload_part(&upload_id, 0, payload, Some(&good))
        .await
        .unwrap();
    assert_eq!(part.etag, good);
}

#[tokio::test]
async fn staged_parts_are_individually_retrievable() {
    let (gateway, _ns, _dir) = new_gateway().await;
    gateway.create_bucket("bucket").await.unwrap();
    let upload_id = gateway.initiate_upload("bucket", "object").await.unwrap();

    for number in [0, 1, 2] {
        let payload = Bytes::from(vec![b'a' + number as u8; 64]);
        gateway
            .upload_part(&upload_id, number, payload, None)
            .await
            .unwrap();
    }

    for number in [0, 1, 2] {
        let (stat, data) = gateway
            .get_object("bucket", &format!("object_{upload_id}/{number}"))
            .await
            .unwrap();
        assert_eq!(stat.size, 64);
        assert_eq!(data, Bytes::from(vec![b'a' + number as u8; 64]));
    }

    // The final object path stays untouched while the session is open.
    let err = gateway.head_object("bucket", "object").await.unwrap_err();
    assert!(matches!(err, CanopyError::ObjectNotFound { .. }));
}

#[tokio::test]
async fn abort_removes_staging_and_retires_the_session() {
    let (gateway, ns, _dir) = new_gateway().await;
    gateway.create_bucket("bucket").await.unwrap();
    let upload_id = gateway.initiate_upload("bucket", "object").await.unwrap();
    gateway
        .upload_part(&upload_id, 0, Bytes::from_static(b"data"), None)
        .await
        .unwrap();

    gateway.abort_upload(&upload_id).await.unwrap();

    assert!(
        !ns.stat(&format!("bucket/object_{upload_id}"))
            .await
            .unwrap()
            .exists
    );
    assert!(
        !ns.stat(&format!(".canopy.sys/multipart/{upload_id}.json"))
            .await
            .unwrap()
            .exists
    );

    for err in [
        gateway.abort_upload(&upload_id).await.unwrap_err(),
        gateway
            .upload_part(&upload_id, 0, Bytes::from_static(b"data"), None)
            .await
            .unwrap_err(),
        gateway
            .complete_upload(&upload_id, &[], false)
            .await
            .unwrap_err(),
    ] {
        assert!(matches!(err, CanopyError::NoSuchUpload(_)));
    }
}

#[tokio::test]
async fn list_uploads_reports_open_sessions_per_bucket() {
    let (gateway, _ns, _dir) = new_gateway().await;
    gateway.create_bucket("alpha").await.unwrap();
    gateway.create_bucket("beta").await.unwrap();

    let a1 = gateway.initiate_upload("alpha", "one").await.unwrap();
    let a2 = gateway.initiate_upload("alpha", "two").await.unwrap();
    let b1 = gateway.initiate_upload("beta", "three").await.unwrap();

    let uploads = gateway.list_uploads("alpha").await.unwrap();
    assert_eq!(
        uploads
            .iter()
            .map(|u| u.upload_id.as_str())
            .collect::<Vec<_>>(),
        vec![a1.as_str(), a2.as_str()]
    );

    gateway.abort_upload(&b1).await.unwrap();
    assert!(gateway.list_uploads("beta").await.unwrap().is_empty());
}
