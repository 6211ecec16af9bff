//! Backup archive lifecycle on top of an [`ObjectStoreGateway`].
//!
//! The store derives the tenant's bucket and prefix from configuration, then
//! applies backup policy on top of raw gateway calls:
//! - uploads are create-only; an occupied key yields `BackupFileExists`
//! - listings only include `*.gz` / `*.tgz` archives directly under the prefix
//! - every mutation invalidates the cached listing
//!
//! Service failures are logged here and surfaced as `BackupStoreError::Storage`.
//! Transport faults pass through as `StoreUnavailable`.

use crate::{
    config::BackupStoreConfig,
    errors::{BackupStoreError, BackupStoreResult, GatewayError},
    models::{
        backup_file::{BackupFile, BackupStats},
        bucket::CorsRule,
        metadata::{Acl, CopyOptions, ObjectMetadata},
        multipart::{CompletedPart, MultipartSession, PartSummary},
        object::{ObjectHandle, basename},
    },
    services::{
        gateway::{ObjectStoreGateway, PresignRequest},
        location::{BucketLocation, join_segments},
    },
};
use futures::TryStreamExt;
use regex::{Regex, RegexBuilder};
use std::path::Path;
use tokio::sync::{Mutex, OnceCell};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Reserved namespace for in-progress uploads, outside every tenant prefix.
pub const TEMPORARY_UPLOAD_PREFIX: &str = "temp";

/// Remote backup archive store for one tenant.
pub struct BackupStore<G: ObjectStoreGateway> {
    config: BackupStoreConfig,

    /// Gateway scoped to the tenant's current location.
    gateway: G,

    /// Archive matcher, built on first use.
    file_regex: OnceCell<Regex>,

    /// Listing sorted newest-first; `None` until computed or after a mutation.
    files_cache: Mutex<Option<Vec<BackupFile>>>,
}

impl<G: ObjectStoreGateway> BackupStore<G> {
    /// Create a store for the tenant described by `config`.
    ///
    /// `gateway` supplies the backend and credentials; it is rescoped to the
    /// location derived from `config`.
    pub fn new(config: BackupStoreConfig, gateway: G) -> Self {
        let gateway = gateway.scoped_to(BucketLocation::current(&config));
        debug!(location = %gateway.location(), "backup store ready");
        Self {
            config,
            gateway,
            file_regex: OnceCell::new(),
            files_cache: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &BackupStoreConfig {
        &self.config
    }

    pub fn gateway(&self) -> &G {
        &self.gateway
    }

    pub fn remote(&self) -> bool {
        true
    }

    pub fn cleanup_allowed(&self) -> bool {
        !self.config.disable_cleanup
    }

    /// Every archive under the tenant prefix, in store order. Download
    /// sources are not populated.
    pub async fn list_files(&self) -> BackupStoreResult<Vec<BackupFile>> {
        let regex = self.file_regex().await?;
        let mut files = Vec::new();
        let mut listing = self.gateway.list();
        while let Some(obj) = listing
            .try_next()
            .await
            .map_err(|err| self.failure("list backups", err))?
        {
            if regex.is_match(&obj.key) {
                files.push(self.create_file_from_object(&obj, false).await?);
            }
        }
        Ok(files)
    }

    /// Cached listing, newest first.
    pub async fn files(&self) -> BackupStoreResult<Vec<BackupFile>> {
        let mut cache = self.files_cache.lock().await;
        if let Some(files) = cache.as_ref() {
            return Ok(files.clone());
        }
        let mut files = self.list_files().await?;
        files.sort_by(|a, b| b.last_modified.cmp(&a.last_modified));
        *cache = Some(files.clone());
        Ok(files)
    }

    pub async fn latest_file(&self) -> BackupStoreResult<Option<BackupFile>> {
        Ok(self.files().await?.into_iter().next())
    }

    pub async fn reset_cache(&self) {
        *self.files_cache.lock().await = None;
    }

    pub async fn stats(&self) -> BackupStoreResult<BackupStats> {
        let files = self.files().await?;
        Ok(BackupStats {
            used_bytes: files.iter().map(|f| f.size).sum(),
            free_bytes: None,
            count: files.len(),
            last_backup_taken_at: files.first().map(|f| f.last_modified),
        })
    }

    /// Look up one archive. `None` when absent.
    pub async fn fetch(
        &self,
        filename: &str,
        include_download_source: bool,
    ) -> BackupStoreResult<Option<BackupFile>> {
        validate_filename(filename)?;
        let key = self.gateway.object_key(filename);
        let obj = self
            .gateway
            .get(&key)
            .await
            .map_err(|err| self.failure("read backup metadata", err))?;
        match obj {
            Some(obj) => Ok(Some(
                self.create_file_from_object(&obj, include_download_source)
                    .await?,
            )),
            None => Ok(None),
        }
    }

    /// Delete an archive. Absent archives are left alone.
    pub async fn delete_file(&self, filename: &str) -> BackupStoreResult<()> {
        validate_filename(filename)?;
        let key = self.gateway.object_key(filename);
        if self.exists(&key).await? {
            self.gateway
                .delete(&key)
                .await
                .map_err(|err| self.failure("delete backup", err))?;
            self.reset_cache().await;
            info!(key = %key, "deleted backup");
        }
        Ok(())
    }

    /// Copy an archive to a local path.
    pub async fn download_file(
        &self,
        filename: &str,
        destination: &Path,
        failure_message: Option<&str>,
    ) -> BackupStoreResult<()> {
        validate_filename(filename)?;
        let key = self.gateway.object_key(filename);
        match self.gateway.download_file(&key, destination).await {
            Ok(()) => Ok(()),
            Err(err) if err.is_service() => {
                warn!(key = %key, "Failed to download backup: {}", err.diagnostic());
                Err(BackupStoreError::Storage(
                    failure_message
                        .map(str::to_string)
                        .unwrap_or_else(|| err.diagnostic()),
                ))
            }
            Err(err) => Err(self.failure("download backup", err)),
        }
    }

    /// Upload a local archive. Never overwrites an existing one.
    pub async fn upload_file(
        &self,
        filename: &str,
        source_path: &Path,
        content_type: &str,
    ) -> BackupStoreResult<()> {
        validate_filename(filename)?;
        let key = self.gateway.object_key(filename);
        if self.exists(&key).await? {
            return Err(BackupStoreError::BackupFileExists(filename.to_string()));
        }

        let obj = self
            .gateway
            .put_file(&key, source_path, content_type)
            .await
            .map_err(|err| self.failure("upload backup", err))?;
        self.reset_cache().await;
        info!(key = %obj.key, size = obj.size, "uploaded backup");
        Ok(())
    }

    /// Presigned PUT URL for a browser upload of `filename`.
    pub async fn generate_upload_url(&self, filename: &str) -> BackupStoreResult<String> {
        validate_filename(filename)?;
        let key = self.gateway.object_key(filename);
        if self.exists(&key).await? {
            return Err(BackupStoreError::BackupFileExists(filename.to_string()));
        }

        self.ensure_cors().await?;
        let request = PresignRequest::put(self.config.upload_url_expires_secs);
        self.gateway
            .presigned_url(&key, &request)
            .await
            .map_err(|err| self.failure("generate upload URL", err))
    }

    /// Collision-resistant key for an in-progress upload:
    /// `temp/{prefix}/{random}/{random}{ext}`.
    ///
    /// Only the extension of `filename` survives, and only when it is plain
    /// alphanumeric.
    pub fn temporary_upload_path(&self, filename: &str) -> String {
        let random_name = format!("{}{}", Uuid::new_v4().simple(), extension_of(filename));
        let random_dir = Uuid::new_v4().simple().to_string();
        join_segments([
            TEMPORARY_UPLOAD_PREFIX,
            self.gateway.location().prefix.as_deref().unwrap_or(""),
            random_dir.as_str(),
            random_name.as_str(),
        ])
    }

    /// Open a multipart upload for `filename` against a temporary key.
    ///
    /// Fails fast with `BackupFileExists` before any session is opened.
    pub async fn create_multipart(
        &self,
        filename: &str,
        content_type: &str,
        metadata: &ObjectMetadata,
    ) -> BackupStoreResult<MultipartSession> {
        validate_filename(filename)?;
        if self.exists(&self.gateway.object_key(filename)).await? {
            return Err(BackupStoreError::BackupFileExists(filename.to_string()));
        }

        let key = self.temporary_upload_path(filename);
        let upload_id = self
            .gateway
            .create_multipart(&key, content_type, metadata)
            .await
            .map_err(|err| self.failure("create multipart upload", err))?;
        info!(key = %key, upload_id = %upload_id, "opened multipart upload");
        Ok(MultipartSession::new(upload_id, key))
    }

    pub async fn presign_multipart_part(
        &self,
        upload_id: &str,
        key: &str,
        part_number: u32,
    ) -> BackupStoreResult<String> {
        self.gateway
            .presign_part(
                upload_id,
                key,
                part_number,
                self.config.part_url_expires_secs,
            )
            .await
            .map_err(|err| self.failure("presign multipart part", err))
    }

    pub async fn list_multipart_parts(
        &self,
        upload_id: &str,
        key: &str,
    ) -> BackupStoreResult<Vec<PartSummary>> {
        self.gateway
            .list_parts(upload_id, key)
            .await
            .map_err(|err| self.failure("list multipart parts", err))
    }

    /// Finalize an upload from the caller-assembled, ordered part list.
    pub async fn complete_multipart(
        &self,
        upload_id: &str,
        key: &str,
        parts: &[CompletedPart],
    ) -> BackupStoreResult<()> {
        self.gateway
            .complete_multipart(upload_id, key, parts)
            .await
            .map_err(|err| self.failure("complete multipart upload", err))?;
        info!(key = %key, upload_id = %upload_id, parts = parts.len(), "completed multipart upload");
        Ok(())
    }

    pub async fn abort_multipart(&self, upload_id: &str, key: &str) -> BackupStoreResult<()> {
        self.gateway
            .abort_multipart(upload_id, key)
            .await
            .map_err(|err| self.failure("abort multipart upload", err))?;
        info!(key = %key, upload_id = %upload_id, "aborted multipart upload");
        Ok(())
    }

    /// Move a completed upload from its temporary key to the tenant path.
    ///
    /// Copy then delete: a crash in between leaves both objects, never
    /// neither. An occupied destination is refused and the temporary object is
    /// left in place.
    pub async fn move_existing_stored_upload(
        &self,
        existing_upload_key: &str,
        original_filename: &str,
        secure: bool,
        content_type: Option<&str>,
    ) -> BackupStoreResult<()> {
        validate_filename(original_filename)?;
        let destination = self.gateway.object_key(original_filename);
        if self.exists(&destination).await? {
            return Err(BackupStoreError::BackupFileExists(
                original_filename.to_string(),
            ));
        }

        // Backups stay private whatever the upload's security flag says.
        let opts = CopyOptions {
            acl: Acl::Private,
            apply_metadata_to_destination: true,
            content_type: content_type.map(str::to_string),
            metadata: ObjectMetadata::new(),
        };
        self.gateway
            .copy(existing_upload_key, &destination, &opts)
            .await
            .map_err(|err| self.failure("copy stored upload", err))?;
        // The destination exists from here on, whatever the delete does.
        let deleted = self.delete_file_by_path(existing_upload_key).await;
        self.reset_cache().await;
        deleted?;

        info!(from = %existing_upload_key, to = %destination, secure, "moved stored upload");
        Ok(())
    }

    /// Delete a raw key with no existence check.
    pub async fn delete_file_by_path(&self, key: &str) -> BackupStoreResult<()> {
        self.gateway
            .delete(key)
            .await
            .map_err(|err| self.failure("delete object", err))
    }

    /// Move every object under the legacy prefix to the current one, keeping
    /// only its basename. Returns how many objects moved.
    ///
    /// Keys already under the current prefix, and in-progress uploads, are
    /// skipped, so a second run moves nothing.
    pub async fn vacate_legacy_prefix(&self) -> BackupStoreResult<usize> {
        let legacy = self
            .gateway
            .scoped_to(BucketLocation::legacy(&self.config));
        let current = self.gateway.location().clone();
        let temporary = BucketLocation {
            bucket: current.bucket.clone(),
            prefix: Some(TEMPORARY_UPLOAD_PREFIX.to_string()),
        };

        let mut legacy_keys = Vec::new();
        {
            let mut listing = legacy.list();
            while let Some(obj) = listing
                .try_next()
                .await
                .map_err(|err| self.failure("list legacy backups", err))?
            {
                if !current.contains(&obj.key) && !temporary.contains(&obj.key) {
                    legacy_keys.push(obj.key);
                }
            }
        }

        let mut moved = 0;
        let mut copied_any = false;
        let mut outcome = Ok(());
        for legacy_key in &legacy_keys {
            let destination = current.key_for(basename(legacy_key));
            if let Err(err) = self
                .gateway
                .copy(legacy_key, &destination, &CopyOptions::default())
                .await
            {
                outcome = Err(self.failure("copy legacy backup", err));
                break;
            }
            copied_any = true;
            if let Err(err) = legacy.delete(legacy_key).await {
                outcome = Err(self.failure("delete legacy backup", err));
                break;
            }
            moved += 1;
            debug!(from = %legacy_key, to = %destination, "moved legacy backup");
        }

        if copied_any {
            self.reset_cache().await;
        }
        outcome?;
        info!(
            legacy = %legacy.location(),
            current = %current,
            moved,
            "vacated legacy prefix"
        );
        Ok(moved)
    }

    async fn exists(&self, key: &str) -> BackupStoreResult<bool> {
        self.gateway
            .exists(key)
            .await
            .map_err(|err| self.failure("check backup existence", err))
    }

    async fn create_file_from_object(
        &self,
        obj: &ObjectHandle,
        include_download_source: bool,
    ) -> BackupStoreResult<BackupFile> {
        let source = if include_download_source {
            let request = PresignRequest::get(self.config.download_url_expires_secs);
            Some(
                self.gateway
                    .presigned_url(&obj.key, &request)
                    .await
                    .map_err(|err| self.failure("generate download URL", err))?,
            )
        } else {
            None
        };

        Ok(BackupFile {
            filename: obj.basename().to_string(),
            size: obj.size,
            last_modified: obj.last_modified,
            source,
        })
    }

    async fn ensure_cors(&self) -> BackupStoreResult<()> {
        let rule = CorsRule::put_from(self.config.allowed_origin());
        self.gateway
            .ensure_cors_rule(&rule)
            .await
            .map_err(|err| self.failure("install CORS rule", err))
    }

    async fn file_regex(&self) -> BackupStoreResult<&Regex> {
        self.file_regex
            .get_or_try_init(|| async {
                build_file_regex(self.gateway.location().prefix.as_deref())
            })
            .await
            .map_err(|err| BackupStoreError::Storage(format!("invalid archive pattern: {}", err)))
    }

    fn failure(&self, action: &str, err: GatewayError) -> BackupStoreError {
        warn!(
            location = %self.gateway.location(),
            "Failed to {}: {}",
            action,
            err.diagnostic()
        );
        err.into()
    }
}

/// `^{prefix}/[^/]*\.t?gz$`, case-insensitive.
fn build_file_regex(prefix: Option<&str>) -> Result<Regex, regex::Error> {
    let path = match prefix {
        Some(prefix) if !prefix.is_empty() => {
            let with_slash = if prefix.ends_with('/') {
                prefix.to_string()
            } else {
                format!("{}/", prefix)
            };
            regex::escape(&with_slash)
        }
        _ => String::new(),
    };
    RegexBuilder::new(&format!(r"^{}[^/]*\.t?gz$", path))
        .case_insensitive(true)
        .build()
}

/// Extension of `filename` including the dot, or empty when it has none or
/// it is not plain alphanumeric.
fn extension_of(filename: &str) -> String {
    Path::new(basename(filename))
        .extension()
        .and_then(|ext| ext.to_str())
        .filter(|ext| !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(|ext| format!(".{}", ext))
        .unwrap_or_default()
}

fn validate_filename(filename: &str) -> BackupStoreResult<()> {
    if filename.is_empty()
        || filename == "."
        || filename == ".."
        || filename.contains('/')
        || filename.contains('\\')
    {
        return Err(BackupStoreError::InvalidFilename(filename.to_string()));
    }
    Ok(())
}
