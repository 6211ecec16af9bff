//! src/services/local_gateway.rs
//!
//! LocalGateway: an S3-like object store backed by SQLite for metadata and
//! local disk for payloads, sharded beneath
//! `base_path/{bucket}/{shard}/{shard}/{key}`. Multipart parts are staged under
//! `base_path/.multipart/{upload_id}/{part_number}` until completion.
//!
//! Presigned URLs are SigV4-signed against the configured endpoint, so a
//! development deployment can point them at any S3-compatible receiver.

use crate::{
    errors::{GatewayError, GatewayResult},
    models::{
        bucket::CorsRule,
        metadata::{Acl, CopyOptions, ObjectMetadata},
        multipart::{CompletedPart, PartSummary},
        object::ObjectHandle,
    },
    services::{
        gateway::{ObjectStoreGateway, PresignRequest},
        location::BucketLocation,
        presign::Presigner,
    },
};
use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::{
    Stream, StreamExt, TryStreamExt, pin_mut,
    stream::{self, BoxStream},
};
use md5::Context;
use sqlx::{FromRow, SqlitePool};
use std::{
    collections::HashMap,
    io::{self, ErrorKind},
    path::{Path, PathBuf},
    sync::Arc,
};
use tokio::{
    fs::{self, File},
    io::AsyncWriteExt,
};
use tokio_util::io::ReaderStream;
use tracing::debug;
use uuid::Uuid;

const MAX_OBJECT_KEY_LEN: usize = 1024;
const MAX_PART_NUMBER: u32 = 10_000;
const LIST_PAGE_SIZE: usize = 1000;
const MULTIPART_DIR: &str = ".multipart";

const INIT_SQL: &str = include_str!("../../migrations/0001_init.sql");

/// One page of a listing plus the token for the next one.
#[derive(Debug)]
pub struct ListPage {
    pub objects: Vec<ObjectHandle>,
    pub next_continuation_token: Option<String>,
}

#[derive(FromRow, Debug)]
struct ObjectRow {
    key: String,
    size_bytes: i64,
    etag: String,
    content_type: Option<String>,
    metadata: String,
    last_modified: DateTime<Utc>,
}

impl From<ObjectRow> for ObjectHandle {
    fn from(row: ObjectRow) -> Self {
        ObjectHandle {
            key: row.key,
            size: row.size_bytes.max(0) as u64,
            last_modified: row.last_modified,
            etag: Some(row.etag),
            content_type: row.content_type,
        }
    }
}

#[derive(FromRow, Debug)]
struct UploadRow {
    upload_id: String,
    content_type: Option<String>,
    metadata: String,
}

#[derive(FromRow, Debug)]
struct PartRow {
    part_number: i64,
    size_bytes: i64,
    etag: String,
}

/// Fields written to the `objects` table on every put, copy or completion.
struct ObjectWrite<'a> {
    key: &'a str,
    size_bytes: u64,
    etag: &'a str,
    content_type: Option<&'a str>,
    acl: Acl,
    metadata: &'a str,
}

/// A fully written payload waiting beside its final path.
struct StagedPayload {
    tmp_path: PathBuf,
    size_bytes: u64,
    digest: md5::Digest,
}

/// Create the metadata tables if they are missing.
pub async fn run_migrations(db: &SqlitePool) -> GatewayResult<()> {
    let statements = INIT_SQL
        .split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>();

    tracing::info!("Running {} migration statements...", statements.len());

    for stmt in statements {
        debug!("Executing migration SQL: {}", stmt);
        sqlx::query(stmt).execute(db).await?;
    }

    Ok(())
}

/// Object store gateway over SQLite + local disk, scoped to one bucket and
/// key prefix.
#[derive(Clone)]
pub struct LocalGateway {
    /// Shared SQLite connection pool used for metadata operations.
    db: Arc<SqlitePool>,

    /// Base directory on disk where payloads are stored.
    base_path: PathBuf,

    presigner: Presigner,

    location: BucketLocation,
}

impl LocalGateway {
    pub fn new(
        db: Arc<SqlitePool>,
        base_path: impl Into<PathBuf>,
        presigner: Presigner,
        location: BucketLocation,
    ) -> Self {
        Self {
            db,
            base_path: base_path.into(),
            presigner,
            location,
        }
    }

    fn bucket(&self) -> &str {
        &self.location.bucket
    }

    /// Basic key validation to avoid trivial path traversal vectors.
    fn ensure_key_safe(key: &str) -> GatewayResult<()> {
        let invalid = key.is_empty()
            || key.len() > MAX_OBJECT_KEY_LEN
            || key.starts_with('/')
            || key.split('/').any(|segment| segment == "..")
            || key.bytes().any(|b| b.is_ascii_control() || b == b'\\');
        if invalid {
            return Err(GatewayError::service(
                "InvalidObjectKey",
                format!("object key `{}` is not acceptable", key),
            ));
        }
        Ok(())
    }

    fn bucket_root(&self) -> PathBuf {
        self.base_path.join(self.bucket())
    }

    /// Two-level shard identifiers from MD5(bucket/key), keeping per-directory
    /// file counts small.
    fn object_shards(bucket: &str, key: &str) -> (String, String) {
        let digest = md5::compute(format!("{}/{}", bucket, key));
        (format!("{:02x}", digest[0]), format!("{:02x}", digest[1]))
    }

    fn object_path(&self, key: &str) -> PathBuf {
        let (shard_a, shard_b) = Self::object_shards(self.bucket(), key);
        let mut path = self.bucket_root();
        path.push(shard_a);
        path.push(shard_b);
        path.push(key);
        path
    }

    fn upload_dir(&self, upload_id: &str) -> PathBuf {
        self.base_path.join(MULTIPART_DIR).join(upload_id)
    }

    fn part_path(&self, upload_id: &str, part_number: u32) -> PathBuf {
        self.upload_dir(upload_id).join(part_number.to_string())
    }

    async fn fetch_object(&self, key: &str) -> GatewayResult<Option<ObjectRow>> {
        let row = sqlx::query_as::<_, ObjectRow>(
            "SELECT key, size_bytes, etag, content_type, metadata, last_modified
             FROM objects WHERE bucket = ? AND key = ?",
        )
        .bind(self.bucket())
        .bind(key)
        .fetch_optional(&*self.db)
        .await?;
        Ok(row)
    }

    async fn require_object(&self, key: &str) -> GatewayResult<ObjectRow> {
        self.fetch_object(key).await?.ok_or_else(|| {
            GatewayError::service(
                "NoSuchKey",
                format!("object `{}` not found in bucket `{}`", key, self.bucket()),
            )
        })
    }

    async fn fetch_upload(&self, upload_id: &str, key: &str) -> GatewayResult<UploadRow> {
        sqlx::query_as::<_, UploadRow>(
            "SELECT upload_id, content_type, metadata
             FROM multipart_uploads WHERE upload_id = ? AND bucket = ? AND key = ?",
        )
        .bind(upload_id)
        .bind(self.bucket())
        .bind(key)
        .fetch_optional(&*self.db)
        .await?
        .ok_or_else(|| {
            GatewayError::service(
                "NoSuchUpload",
                format!("upload `{}` for `{}` does not exist", upload_id, key),
            )
        })
    }

    async fn fetch_parts(&self, upload_id: &str) -> GatewayResult<Vec<PartRow>> {
        let rows = sqlx::query_as::<_, PartRow>(
            "SELECT part_number, size_bytes, etag FROM multipart_parts
             WHERE upload_id = ? ORDER BY part_number ASC",
        )
        .bind(upload_id)
        .fetch_all(&*self.db)
        .await?;
        Ok(rows)
    }

    /// Stream bytes into a temporary sibling of `path`, fsynced but not yet
    /// visible. The temporary file is removed on any error.
    async fn stage_payload<S>(&self, path: &Path, stream: S) -> GatewayResult<StagedPayload>
    where
        S: Stream<Item = io::Result<Bytes>> + Send,
    {
        let tmp_path = Self::staging_path(path).await?;
        let mut file = File::create(&tmp_path).await?;

        let mut size_bytes: u64 = 0;
        let mut digest = Context::new();
        pin_mut!(stream);
        while let Some(chunk_res) = stream.next().await {
            let chunk = match chunk_res {
                Ok(chunk) => chunk,
                Err(err) => {
                    let _ = fs::remove_file(&tmp_path).await;
                    return Err(GatewayError::Io(err));
                }
            };
            size_bytes += chunk.len() as u64;
            digest.consume(&chunk);
            if let Err(err) = file.write_all(&chunk).await {
                let _ = fs::remove_file(&tmp_path).await;
                return Err(GatewayError::Io(err));
            }
        }

        Self::sync_staged(file, &tmp_path).await?;
        Ok(StagedPayload {
            tmp_path,
            size_bytes,
            digest: digest.compute(),
        })
    }

    /// Create the parent of `path` and pick a temporary name beside it.
    async fn staging_path(path: &Path) -> GatewayResult<PathBuf> {
        let parent = path.parent().map(Path::to_path_buf).ok_or_else(|| {
            GatewayError::Io(io::Error::new(
                ErrorKind::Other,
                "payload path missing parent directory",
            ))
        })?;
        fs::create_dir_all(&parent).await?;
        Ok(parent.join(format!(".tmp-{}", Uuid::new_v4())))
    }

    async fn sync_staged(mut file: File, tmp_path: &Path) -> GatewayResult<()> {
        if let Err(err) = file.flush().await {
            let _ = fs::remove_file(tmp_path).await;
            return Err(GatewayError::Io(err));
        }
        if let Err(err) = file.sync_all().await {
            let _ = fs::remove_file(tmp_path).await;
            return Err(GatewayError::Io(err));
        }
        Ok(())
    }

    /// Rename a staged payload over `path`.
    async fn commit_payload(tmp_path: &Path, path: &Path) -> GatewayResult<()> {
        if let Err(err) = fs::rename(tmp_path, path).await {
            if err.kind() == ErrorKind::AlreadyExists {
                fs::remove_file(path).await?;
                fs::rename(tmp_path, path).await?;
            } else {
                let _ = fs::remove_file(tmp_path).await;
                return Err(GatewayError::Io(err));
            }
        }
        Ok(())
    }

    /// Record `write` in the metadata table, then move the staged payload
    /// into place. A rejected upsert leaves the previous object untouched.
    async fn publish(
        &self,
        write: ObjectWrite<'_>,
        tmp_path: &Path,
    ) -> GatewayResult<ObjectRow> {
        let row = match self.upsert_object(write).await {
            Ok(row) => row,
            Err(err) => {
                let _ = fs::remove_file(tmp_path).await;
                return Err(err);
            }
        };
        Self::commit_payload(tmp_path, &self.object_path(&row.key)).await?;
        Ok(row)
    }

    /// Upsert metadata for an object (S3-like overwrite semantics).
    async fn upsert_object(&self, write: ObjectWrite<'_>) -> GatewayResult<ObjectRow> {
        let row = sqlx::query_as::<_, ObjectRow>(
            r#"
            INSERT INTO objects (
                bucket, key, size_bytes, etag, content_type, acl, metadata, last_modified
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(bucket, key) DO UPDATE SET
                size_bytes = excluded.size_bytes,
                etag = excluded.etag,
                content_type = excluded.content_type,
                acl = excluded.acl,
                metadata = excluded.metadata,
                last_modified = excluded.last_modified
            RETURNING key, size_bytes, etag, content_type, metadata, last_modified
            "#,
        )
        .bind(self.bucket())
        .bind(write.key)
        .bind(write.size_bytes as i64)
        .bind(write.etag)
        .bind(write.content_type)
        .bind(write.acl.as_str())
        .bind(write.metadata)
        .bind(Utc::now())
        .fetch_one(&*self.db)
        .await?;
        Ok(row)
    }

    /// Stream-upload an object, replacing any existing one.
    pub async fn put_object<S>(
        &self,
        key: &str,
        content_type: Option<&str>,
        stream: S,
    ) -> GatewayResult<ObjectHandle>
    where
        S: Stream<Item = io::Result<Bytes>> + Send,
    {
        Self::ensure_key_safe(key)?;
        let staged = self.stage_payload(&self.object_path(key), stream).await?;
        let etag = format!("{:x}", staged.digest);

        let row = self
            .publish(
                ObjectWrite {
                    key,
                    size_bytes: staged.size_bytes,
                    etag: &etag,
                    content_type,
                    acl: Acl::Private,
                    metadata: "{}",
                },
                &staged.tmp_path,
            )
            .await?;
        debug!(bucket = %self.bucket(), key, size_bytes = staged.size_bytes, "stored object");
        Ok(row.into())
    }

    /// Receive one part of an open multipart upload, as a presigned part PUT
    /// would. Returns the part's ETag.
    pub async fn upload_part<S>(
        &self,
        upload_id: &str,
        key: &str,
        part_number: u32,
        stream: S,
    ) -> GatewayResult<String>
    where
        S: Stream<Item = io::Result<Bytes>> + Send,
    {
        if part_number == 0 || part_number > MAX_PART_NUMBER {
            return Err(GatewayError::service(
                "InvalidArgument",
                format!("part number must be between 1 and {}", MAX_PART_NUMBER),
            ));
        }
        self.fetch_upload(upload_id, key).await?;

        let path = self.part_path(upload_id, part_number);
        let staged = self.stage_payload(&path, stream).await?;
        Self::commit_payload(&staged.tmp_path, &path).await?;
        let size_bytes = staged.size_bytes;
        let etag = format!("{:x}", staged.digest);

        sqlx::query(
            r#"
            INSERT INTO multipart_parts (upload_id, part_number, size_bytes, etag, uploaded_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(upload_id, part_number) DO UPDATE SET
                size_bytes = excluded.size_bytes,
                etag = excluded.etag,
                uploaded_at = excluded.uploaded_at
            "#,
        )
        .bind(upload_id)
        .bind(part_number as i64)
        .bind(size_bytes as i64)
        .bind(&etag)
        .bind(Utc::now())
        .execute(&*self.db)
        .await?;

        debug!(upload_id, part_number, size_bytes, "stored multipart part");
        Ok(etag)
    }

    /// One page of the listing under this gateway's prefix, ordered by key.
    ///
    /// Continuation tokens are opaque (base64 of the last key returned).
    pub async fn list_page(&self, continuation_token: Option<&str>) -> GatewayResult<ListPage> {
        let prefix = match &self.location.prefix {
            Some(prefix) => format!("{}/", prefix),
            None => String::new(),
        };
        let after = continuation_token
            .map(decode_continuation_token)
            .unwrap_or_default();
        let fetch_limit = LIST_PAGE_SIZE + 1;

        let mut rows = sqlx::query_as::<_, ObjectRow>(
            "SELECT key, size_bytes, etag, content_type, metadata, last_modified
             FROM objects
             WHERE bucket = ? AND substr(key, 1, ?) = ? AND key > ?
             ORDER BY key ASC LIMIT ?",
        )
        .bind(self.bucket())
        .bind(prefix.chars().count() as i64)
        .bind(&prefix)
        .bind(&after)
        .bind(fetch_limit as i64)
        .fetch_all(&*self.db)
        .await?;

        let mut next_continuation_token = None;
        if rows.len() == fetch_limit {
            rows.pop();
            next_continuation_token = rows.last().map(|r| encode_continuation_token(&r.key));
        }

        Ok(ListPage {
            objects: rows.into_iter().map(ObjectHandle::from).collect(),
            next_continuation_token,
        })
    }

    /// CORS rules currently installed on the bucket.
    pub async fn cors_rules(&self) -> GatewayResult<Vec<CorsRule>> {
        let stored: Option<String> =
            sqlx::query_scalar("SELECT rules FROM bucket_cors WHERE bucket = ?")
                .bind(self.bucket())
                .fetch_optional(&*self.db)
                .await?;
        match stored {
            Some(json) => Ok(serde_json::from_str(&json)?),
            None => Ok(Vec::new()),
        }
    }

    async fn remove_upload(&self, upload_id: &str) -> GatewayResult<()> {
        sqlx::query("DELETE FROM multipart_parts WHERE upload_id = ?")
            .bind(upload_id)
            .execute(&*self.db)
            .await?;
        sqlx::query("DELETE FROM multipart_uploads WHERE upload_id = ?")
            .bind(upload_id)
            .execute(&*self.db)
            .await?;

        let dir = self.upload_dir(upload_id);
        match fs::remove_dir_all(&dir).await {
            Ok(_) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(GatewayError::Io(err)),
        }
    }

    /// Recursively remove empty directories up to the bucket root.
    async fn prune_empty_dirs(&self, start: &Path, stop: &Path) {
        let mut current = start.to_path_buf();
        while current.starts_with(stop) && current != stop {
            match fs::remove_dir(&current).await {
                Ok(_) => {
                    if let Some(parent) = current.parent() {
                        current = parent.to_path_buf();
                    } else {
                        break;
                    }
                }
                Err(err) if err.kind() == ErrorKind::NotFound => break,
                Err(err) if err.kind() == ErrorKind::DirectoryNotEmpty => break,
                Err(err) => {
                    debug!("failed to prune directory {}: {}", current.display(), err);
                    break;
                }
            }
        }
    }
}

#[async_trait]
impl ObjectStoreGateway for LocalGateway {
    fn location(&self) -> &BucketLocation {
        &self.location
    }

    fn scoped_to(&self, location: BucketLocation) -> Self {
        Self {
            location,
            ..self.clone()
        }
    }

    async fn exists(&self, key: &str) -> GatewayResult<bool> {
        Ok(self.fetch_object(key).await?.is_some())
    }

    async fn get(&self, key: &str) -> GatewayResult<Option<ObjectHandle>> {
        Ok(self.fetch_object(key).await?.map(ObjectHandle::from))
    }

    async fn put_file(
        &self,
        key: &str,
        source: &Path,
        content_type: &str,
    ) -> GatewayResult<ObjectHandle> {
        let file = File::open(source).await?;
        self.put_object(key, Some(content_type), ReaderStream::new(file))
            .await
    }

    async fn download_file(&self, key: &str, destination: &Path) -> GatewayResult<()> {
        self.require_object(key).await?;
        if let Some(parent) = destination.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::copy(self.object_path(key), destination).await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> GatewayResult<()> {
        if self.fetch_object(key).await?.is_none() {
            debug!(bucket = %self.bucket(), key, "delete of absent object");
            return Ok(());
        }

        // Payload first: a failure here keeps the object fully intact.
        let file_path = self.object_path(key);
        match fs::remove_file(&file_path).await {
            Ok(_) => debug!("removed physical file {}", file_path.display()),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!("file {} already missing", file_path.display());
            }
            Err(err) => return Err(GatewayError::Io(err)),
        }

        sqlx::query("DELETE FROM objects WHERE bucket = ? AND key = ?")
            .bind(self.bucket())
            .bind(key)
            .execute(&*self.db)
            .await?;

        if let Some(parent) = file_path.parent() {
            let bucket_root = self.bucket_root();
            self.prune_empty_dirs(parent, &bucket_root).await;
        }
        Ok(())
    }

    async fn copy(&self, src_key: &str, dst_key: &str, opts: &CopyOptions) -> GatewayResult<()> {
        Self::ensure_key_safe(dst_key)?;
        let source = self.require_object(src_key).await?;

        let (content_type, metadata) = if opts.apply_metadata_to_destination {
            (
                opts.content_type.clone().or(source.content_type.clone()),
                serde_json::to_string(&opts.metadata)?,
            )
        } else {
            (source.content_type.clone(), source.metadata.clone())
        };
        let write = ObjectWrite {
            key: dst_key,
            size_bytes: source.size_bytes.max(0) as u64,
            etag: &source.etag,
            content_type: content_type.as_deref(),
            acl: opts.acl,
            metadata: &metadata,
        };

        if src_key == dst_key {
            self.upsert_object(write).await?;
        } else {
            let tmp_path = Self::staging_path(&self.object_path(dst_key)).await?;
            if let Err(err) = fs::copy(self.object_path(src_key), &tmp_path).await {
                let _ = fs::remove_file(&tmp_path).await;
                return Err(GatewayError::Io(err));
            }
            let file = File::open(&tmp_path).await?;
            Self::sync_staged(file, &tmp_path).await?;
            self.publish(write, &tmp_path).await?;
        }

        debug!(bucket = %self.bucket(), src_key, dst_key, "copied object");
        Ok(())
    }

    fn list(&self) -> BoxStream<'_, GatewayResult<ObjectHandle>> {
        // State: None once exhausted, Some(token) while pages remain.
        stream::try_unfold(Some(None::<String>), move |state| async move {
            let Some(token) = state else {
                return Ok::<_, GatewayError>(None);
            };
            let page = self.list_page(token.as_deref()).await?;
            let next = page.next_continuation_token.map(Some);
            let objects = stream::iter(page.objects.into_iter().map(Ok::<_, GatewayError>));
            Ok(Some((objects, next)))
        })
        .try_flatten()
        .boxed()
    }

    async fn create_multipart(
        &self,
        key: &str,
        content_type: &str,
        metadata: &ObjectMetadata,
    ) -> GatewayResult<String> {
        Self::ensure_key_safe(key)?;
        let upload_id = Uuid::new_v4().simple().to_string();

        sqlx::query(
            "INSERT INTO multipart_uploads (upload_id, bucket, key, content_type, metadata, initiated_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&upload_id)
        .bind(self.bucket())
        .bind(key)
        .bind(content_type)
        .bind(serde_json::to_string(metadata)?)
        .bind(Utc::now())
        .execute(&*self.db)
        .await?;

        debug!(bucket = %self.bucket(), key, upload_id = %upload_id, "created multipart upload");
        Ok(upload_id)
    }

    async fn list_parts(&self, upload_id: &str, key: &str) -> GatewayResult<Vec<PartSummary>> {
        self.fetch_upload(upload_id, key).await?;
        let parts = self
            .fetch_parts(upload_id)
            .await?
            .into_iter()
            .map(|row| PartSummary {
                part_number: row.part_number as u32,
                etag: row.etag,
                size: row.size_bytes.max(0) as u64,
            })
            .collect();
        Ok(parts)
    }

    async fn complete_multipart(
        &self,
        upload_id: &str,
        key: &str,
        parts: &[CompletedPart],
    ) -> GatewayResult<()> {
        let upload = self.fetch_upload(upload_id, key).await?;

        if parts.is_empty()
            || parts
                .windows(2)
                .any(|pair| pair[0].part_number >= pair[1].part_number)
        {
            return Err(GatewayError::service(
                "InvalidPartOrder",
                "parts must be non-empty and in ascending part-number order",
            ));
        }

        let stored: HashMap<u32, PartRow> = self
            .fetch_parts(upload_id)
            .await?
            .into_iter()
            .map(|row| (row.part_number as u32, row))
            .collect();

        let mut digests = Vec::with_capacity(parts.len() * 16);
        let mut size_bytes: u64 = 0;
        for part in parts {
            let etag = part.etag.trim_matches('"');
            let row = stored
                .get(&part.part_number)
                .filter(|row| row.etag == etag)
                .ok_or_else(|| {
                    GatewayError::service(
                        "InvalidPart",
                        format!(
                            "part {} with etag `{}` was not uploaded",
                            part.part_number, part.etag
                        ),
                    )
                })?;
            let raw = hex::decode(&row.etag).map_err(|err| {
                GatewayError::Unavailable(format!("stored part etag is corrupt: {}", err))
            })?;
            digests.extend_from_slice(&raw);
            size_bytes += row.size_bytes.max(0) as u64;
        }

        let mut readers = Vec::with_capacity(parts.len());
        for part in parts {
            let file = File::open(self.part_path(upload_id, part.part_number)).await?;
            readers.push(ReaderStream::new(file));
        }
        let assembled = stream::iter(readers).flatten();

        let staged = self.stage_payload(&self.object_path(key), assembled).await?;
        let etag = format!("{:x}-{}", md5::compute(&digests), parts.len());

        self.publish(
            ObjectWrite {
                key,
                size_bytes,
                etag: &etag,
                content_type: upload.content_type.as_deref(),
                acl: Acl::Private,
                metadata: &upload.metadata,
            },
            &staged.tmp_path,
        )
        .await?;
        self.remove_upload(&upload.upload_id).await?;

        debug!(bucket = %self.bucket(), key, upload_id, size_bytes, "completed multipart upload");
        Ok(())
    }

    async fn abort_multipart(&self, upload_id: &str, key: &str) -> GatewayResult<()> {
        self.fetch_upload(upload_id, key).await?;
        self.remove_upload(upload_id).await?;
        debug!(bucket = %self.bucket(), key, upload_id, "aborted multipart upload");
        Ok(())
    }

    async fn presigned_url(&self, key: &str, request: &PresignRequest) -> GatewayResult<String> {
        Self::ensure_key_safe(key)?;
        self.presigner
            .presign(
                request.method.http_verb(),
                self.bucket(),
                key,
                request.expires_in_secs,
                &request.extra_params,
            )
            .map_err(|err| GatewayError::service("InvalidRequest", err.to_string()))
    }

    async fn ensure_cors_rule(&self, rule: &CorsRule) -> GatewayResult<()> {
        let mut rules = self.cors_rules().await?;
        if rules.contains(rule) {
            return Ok(());
        }
        rules.push(rule.clone());

        sqlx::query(
            "INSERT INTO bucket_cors (bucket, rules) VALUES (?, ?)
             ON CONFLICT(bucket) DO UPDATE SET rules = excluded.rules",
        )
        .bind(self.bucket())
        .bind(serde_json::to_string(&rules)?)
        .execute(&*self.db)
        .await?;

        debug!(bucket = %self.bucket(), "installed CORS rule");
        Ok(())
    }
}

fn encode_continuation_token(token: &str) -> String {
    general_purpose::STANDARD.encode(token)
}

fn decode_continuation_token(token: &str) -> String {
    general_purpose::STANDARD
        .decode(token)
        .ok()
        .and_then(|bytes| String::from_utf8(bytes).ok())
        .unwrap_or_else(|| token.to_string())
}
