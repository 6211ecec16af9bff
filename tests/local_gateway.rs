//! LocalGateway primitives: listing, copy, multipart assembly, CORS.

mod common;

use backup_store::{
    CompletedPart, GatewayError, ObjectStoreGateway,
    models::{
        bucket::CorsRule,
        metadata::{Acl, CopyOptions, ObjectMetadata},
    },
    services::gateway::PresignRequest,
};
use chrono::Utc;
use common::{TestEnv, body, put_bytes};
use futures::TryStreamExt;

fn service_code(err: &GatewayError) -> &str {
    match err {
        GatewayError::Service { code, .. } => code,
        other => panic!("expected service error, got {other:?}"),
    }
}

#[tokio::test]
async fn list_paginates_lazily_and_restarts() {
    let env = TestEnv::new("bucket/backups").await;
    let gw = &env.gateway;
    for i in 0..1005 {
        sqlx::query(
            "INSERT INTO objects (bucket, key, size_bytes, etag, last_modified)
             VALUES ('bucket', ?, ?, 'etag', ?)",
        )
        .bind(format!("backups/site-{:04}.tar.gz", i))
        .bind(i as i64)
        .bind(Utc::now())
        .execute(&*env.db)
        .await
        .unwrap();
    }
    put_bytes(gw, "elsewhere/x.tar.gz", b"x").await;

    let first = gw.list_page(None).await.unwrap();
    assert_eq!(first.objects.len(), 1000);
    let token = first.next_continuation_token.clone().unwrap();
    let second = gw.list_page(Some(&token)).await.unwrap();
    assert_eq!(second.objects.len(), 5);
    assert!(second.next_continuation_token.is_none());
    assert_eq!(second.objects[0].key, "backups/site-1000.tar.gz");

    let all: Vec<_> = gw.list().try_collect().await.unwrap();
    assert_eq!(all.len(), 1005);
    assert!(all.iter().all(|o| o.key.starts_with("backups/")));

    let again: Vec<_> = gw.list().try_collect().await.unwrap();
    assert_eq!(again.len(), 1005);
}

#[tokio::test]
async fn put_get_and_delete_round_trip() {
    let env = TestEnv::new("bucket").await;
    let gw = &env.gateway;

    let stored = put_bytes(gw, "a/b.tar.gz", b"hello").await;
    assert_eq!(stored.size, 5);
    assert_eq!(stored.etag.as_deref(), Some("5d41402abc4b2a76b9719d911017c592"));
    assert!(gw.exists("a/b.tar.gz").await.unwrap());

    gw.delete("a/b.tar.gz").await.unwrap();
    assert!(gw.get("a/b.tar.gz").await.unwrap().is_none());
    gw.delete("a/b.tar.gz").await.unwrap();
}

#[tokio::test]
async fn rejected_overwrite_keeps_previous_object() {
    let env = TestEnv::new("bucket").await;
    let gw = &env.gateway;
    let original = put_bytes(gw, "a/b.tar.gz", b"original").await;

    sqlx::query(
        "CREATE TRIGGER objects_read_only BEFORE UPDATE ON objects
         BEGIN SELECT RAISE(ABORT, 'objects are read-only'); END",
    )
    .execute(&*env.db)
    .await
    .unwrap();

    let err = gw
        .put_object("a/b.tar.gz", Some("application/gzip"), body(b"replacement"))
        .await
        .unwrap_err();
    assert!(matches!(err, GatewayError::Sqlx(_)));

    let stored = gw.get("a/b.tar.gz").await.unwrap().unwrap();
    assert_eq!(stored.etag, original.etag);
    let dest = env.dir.path().join("kept.bin");
    gw.download_file("a/b.tar.gz", &dest).await.unwrap();
    assert_eq!(std::fs::read(dest).unwrap(), b"original");
}

#[tokio::test]
async fn failed_payload_removal_keeps_metadata() {
    let env = TestEnv::new("bucket").await;
    let gw = &env.gateway;
    let key = "a/b.tar.gz";
    put_bytes(gw, key, b"payload").await;

    // Swap the payload file for a non-empty directory so unlinking fails.
    let digest = md5::compute(format!("bucket/{}", key));
    let payload = env
        .dir
        .path()
        .join("objects")
        .join("bucket")
        .join(format!("{:02x}", digest[0]))
        .join(format!("{:02x}", digest[1]))
        .join(key);
    std::fs::remove_file(&payload).unwrap();
    std::fs::create_dir_all(payload.join("child")).unwrap();

    assert!(gw.delete(key).await.is_err());
    assert!(gw.exists(key).await.unwrap());
}

#[tokio::test]
async fn copy_applies_destination_metadata_or_keeps_source() {
    let env = TestEnv::new("bucket").await;
    let gw = &env.gateway;
    put_bytes(gw, "src.tar.gz", b"payload").await;

    let opts = CopyOptions {
        acl: Acl::Private,
        apply_metadata_to_destination: true,
        content_type: Some("application/x-tar".into()),
        metadata: ObjectMetadata::new(),
    };
    gw.copy("src.tar.gz", "dst/one.tar.gz", &opts).await.unwrap();
    gw.copy("src.tar.gz", "dst/two.tar.gz", &CopyOptions::default())
        .await
        .unwrap();

    let one = gw.get("dst/one.tar.gz").await.unwrap().unwrap();
    let two = gw.get("dst/two.tar.gz").await.unwrap().unwrap();
    assert_eq!(one.content_type.as_deref(), Some("application/x-tar"));
    assert_eq!(two.content_type.as_deref(), Some("application/gzip"));
    assert_eq!(one.size, 7);
    assert!(gw.exists("src.tar.gz").await.unwrap());

    let dest = env.dir.path().join("out.bin");
    gw.download_file("dst/one.tar.gz", &dest).await.unwrap();
    assert_eq!(std::fs::read(dest).unwrap(), b"payload");

    let err = gw
        .copy("missing.tar.gz", "dst/three.tar.gz", &CopyOptions::default())
        .await
        .unwrap_err();
    assert_eq!(service_code(&err), "NoSuchKey");
}

#[tokio::test]
async fn multipart_parts_assemble_in_order() {
    let env = TestEnv::new("bucket").await;
    let gw = &env.gateway;
    let key = "temp/default/abc/def.gz";

    let upload_id = gw
        .create_multipart(key, "application/gzip", &ObjectMetadata::new())
        .await
        .unwrap();
    let e1 = gw.upload_part(&upload_id, key, 1, body(&[b'A'; 100])).await.unwrap();
    let e2 = gw.upload_part(&upload_id, key, 2, body(&[b'B'; 50])).await.unwrap();
    let e3 = gw.upload_part(&upload_id, key, 3, body(&[b'C'; 25])).await.unwrap();

    let parts = gw.list_parts(&upload_id, key).await.unwrap();
    let numbers: Vec<u32> = parts.iter().map(|p| p.part_number).collect();
    assert_eq!(numbers, vec![1, 2, 3]);

    gw.complete_multipart(
        &upload_id,
        key,
        &[
            CompletedPart::new(1, format!("\"{}\"", e1)),
            CompletedPart::new(2, e2),
            CompletedPart::new(3, e3),
        ],
    )
    .await
    .unwrap();

    let obj = gw.get(key).await.unwrap().unwrap();
    assert_eq!(obj.size, 175);
    assert!(obj.etag.unwrap().ends_with("-3"));

    let dest = env.dir.path().join("assembled.gz");
    gw.download_file(key, &dest).await.unwrap();
    let data = std::fs::read(dest).unwrap();
    assert_eq!(&data[..100], &[b'A'; 100][..]);
    assert_eq!(&data[100..150], &[b'B'; 50][..]);
    assert_eq!(&data[150..], &[b'C'; 25][..]);

    // The session is gone once completed.
    let err = gw.list_parts(&upload_id, key).await.unwrap_err();
    assert_eq!(service_code(&err), "NoSuchUpload");
}

#[tokio::test]
async fn complete_rejects_bad_part_lists() {
    let env = TestEnv::new("bucket").await;
    let gw = &env.gateway;
    let key = "temp/default/abc/def.gz";
    let upload_id = gw
        .create_multipart(key, "application/gzip", &ObjectMetadata::new())
        .await
        .unwrap();
    let e1 = gw.upload_part(&upload_id, key, 1, body(b"one")).await.unwrap();
    let e2 = gw.upload_part(&upload_id, key, 2, body(b"two")).await.unwrap();

    let err = gw.complete_multipart(&upload_id, key, &[]).await.unwrap_err();
    assert_eq!(service_code(&err), "InvalidPartOrder");

    let err = gw
        .complete_multipart(
            &upload_id,
            key,
            &[CompletedPart::new(2, e2.clone()), CompletedPart::new(1, e1.clone())],
        )
        .await
        .unwrap_err();
    assert_eq!(service_code(&err), "InvalidPartOrder");

    let err = gw
        .complete_multipart(&upload_id, key, &[CompletedPart::new(1, e1), CompletedPart::new(3, e2)])
        .await
        .unwrap_err();
    assert_eq!(service_code(&err), "InvalidPart");
    assert!(!gw.exists(key).await.unwrap());

    let err = gw
        .upload_part(&upload_id, key, 0, body(b"zero"))
        .await
        .unwrap_err();
    assert_eq!(service_code(&err), "InvalidArgument");
}

#[tokio::test]
async fn abort_discards_staged_parts() {
    let env = TestEnv::new("bucket").await;
    let gw = &env.gateway;
    let key = "temp/default/abc/def.gz";
    let upload_id = gw
        .create_multipart(key, "application/gzip", &ObjectMetadata::new())
        .await
        .unwrap();
    gw.upload_part(&upload_id, key, 1, body(b"one")).await.unwrap();

    let staged = env.dir.path().join("objects").join(".multipart").join(&upload_id);
    assert!(staged.exists());

    gw.abort_multipart(&upload_id, key).await.unwrap();
    assert!(!staged.exists());
    let err = gw.abort_multipart(&upload_id, key).await.unwrap_err();
    assert_eq!(service_code(&err), "NoSuchUpload");
}

#[tokio::test]
async fn cors_rule_installation_is_idempotent() {
    let env = TestEnv::new("bucket").await;
    let gw = &env.gateway;
    let rule = CorsRule::put_from("https://forum.example.com");

    gw.ensure_cors_rule(&rule).await.unwrap();
    gw.ensure_cors_rule(&rule).await.unwrap();
    gw.ensure_cors_rule(&CorsRule::put_from("https://other.example.com"))
        .await
        .unwrap();

    let rules = gw.cors_rules().await.unwrap();
    assert_eq!(rules.len(), 2);
    assert_eq!(rules[0], rule);
}

#[tokio::test]
async fn presign_validates_key_and_expiry() {
    let env = TestEnv::new("bucket").await;
    let gw = &env.gateway;

    let err = gw
        .presigned_url("../etc/passwd", &PresignRequest::get(60))
        .await
        .unwrap_err();
    assert_eq!(service_code(&err), "InvalidObjectKey");

    let err = gw
        .presigned_url("a.tar.gz", &PresignRequest::get(0))
        .await
        .unwrap_err();
    assert_eq!(service_code(&err), "InvalidRequest");

    let url = gw
        .presign_part("upload-1", "temp/a.gz", 7, 600)
        .await
        .unwrap();
    assert!(url.starts_with("http://localhost:9000/bucket/temp/a.gz?"));
    assert!(url.contains("partNumber=7"));
    assert!(url.contains("uploadId=upload-1"));
}
