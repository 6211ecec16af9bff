#![allow(dead_code)]
//! Shared fixtures: a LocalGateway over a throwaway SQLite file and data dir.

use backup_store::{
    BackupStoreConfig, BucketLocation, LocalGateway, ObjectHandle, Presigner,
    services::local_gateway::run_migrations,
};
use bytes::Bytes;
use futures::stream;
use sqlx::{
    SqlitePool,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
};
use std::{io, path::PathBuf, sync::Arc};
use tempfile::TempDir;

pub struct TestEnv {
    /// Keeps the directory alive for the duration of the test.
    pub dir: TempDir,
    pub db: Arc<SqlitePool>,
    pub gateway: LocalGateway,
}

impl TestEnv {
    pub async fn new(bucket: &str) -> Self {
        let dir = TempDir::new().unwrap();
        let options = SqliteConnectOptions::new()
            .filename(dir.path().join("meta.db"))
            .create_if_missing(true);
        let db = Arc::new(
            SqlitePoolOptions::new()
                .max_connections(5)
                .connect_with(options)
                .await
                .unwrap(),
        );
        run_migrations(&db).await.unwrap();

        let presigner = Presigner::new(
            "http://localhost:9000",
            "us-east-1",
            "test-access",
            "test-secret",
        );
        let gateway = LocalGateway::new(
            db.clone(),
            dir.path().join("objects"),
            presigner,
            BucketLocation::parse(bucket),
        );
        Self { dir, db, gateway }
    }

    /// Write `contents` to a scratch file and return its path.
    pub fn source_file(&self, name: &str, contents: &[u8]) -> PathBuf {
        let path = self.dir.path().join("sources").join(name);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, contents).unwrap();
        path
    }
}

pub fn body(data: &[u8]) -> impl futures::Stream<Item = io::Result<Bytes>> + Send + use<> {
    stream::iter(vec![Ok(Bytes::copy_from_slice(data))])
}

pub async fn put_bytes(gateway: &LocalGateway, key: &str, data: &[u8]) -> ObjectHandle {
    gateway
        .put_object(key, Some("application/gzip"), body(data))
        .await
        .unwrap()
}

/// Tenant `acme` under the `backups` folder: prefix `backups/acme`.
pub fn acme_config() -> BackupStoreConfig {
    BackupStoreConfig {
        bucket_name: "s3-backups".into(),
        key_prefix_folder: Some("backups".into()),
        tenant_id: "acme".into(),
        multisite: true,
        base_url: "https://forum.example.com/community".into(),
        ..BackupStoreConfig::default()
    }
}
