//! The object store capability surface.
//!
//! A gateway is the single point of contact with one bucket, scoped to one
//! key prefix. It owns no backup policy and never retries: every transport or
//! service failure is returned to the caller as a [`GatewayError`].

use crate::{
    errors::GatewayResult,
    models::{
        bucket::CorsRule,
        metadata::{CopyOptions, ObjectMetadata},
        multipart::{CompletedPart, PartSummary},
        object::ObjectHandle,
    },
    services::location::BucketLocation,
};
use async_trait::async_trait;
use futures::stream::BoxStream;
use std::{collections::BTreeMap, path::Path};

/// Operation a presigned URL grants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresignMethod {
    Get,
    Put,
    /// PUT of a single multipart part; needs `partNumber` and `uploadId`.
    UploadPart,
}

impl PresignMethod {
    /// HTTP verb the URL is signed for.
    pub fn http_verb(&self) -> &'static str {
        match self {
            PresignMethod::Get => "GET",
            PresignMethod::Put | PresignMethod::UploadPart => "PUT",
        }
    }
}

/// Everything needed to presign one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresignRequest {
    pub method: PresignMethod,
    pub expires_in_secs: u64,
    /// Method-specific query parameters, signed along with the request.
    pub extra_params: BTreeMap<String, String>,
}

impl PresignRequest {
    pub fn get(expires_in_secs: u64) -> Self {
        Self {
            method: PresignMethod::Get,
            expires_in_secs,
            extra_params: BTreeMap::new(),
        }
    }

    pub fn put(expires_in_secs: u64) -> Self {
        Self {
            method: PresignMethod::Put,
            expires_in_secs,
            extra_params: BTreeMap::new(),
        }
    }

    pub fn upload_part(upload_id: &str, part_number: u32, expires_in_secs: u64) -> Self {
        let mut extra_params = BTreeMap::new();
        extra_params.insert("partNumber".to_string(), part_number.to_string());
        extra_params.insert("uploadId".to_string(), upload_id.to_string());
        Self {
            method: PresignMethod::UploadPart,
            expires_in_secs,
            extra_params,
        }
    }
}

/// Capability interface over one bucket + key prefix.
///
/// Keys passed to and returned from these methods are full keys within the
/// bucket. [`object_key`](ObjectStoreGateway::object_key) maps a bare filename
/// into the gateway's prefix.
#[async_trait]
pub trait ObjectStoreGateway: Send + Sync {
    /// Bucket and key prefix this gateway is scoped to.
    fn location(&self) -> &BucketLocation;

    /// Gateway sharing this one's backend and credentials, scoped to another
    /// location in the same store.
    fn scoped_to(&self, location: BucketLocation) -> Self
    where
        Self: Sized;

    /// Full key for `filename` under this gateway's prefix.
    fn object_key(&self, filename: &str) -> String {
        self.location().key_for(filename)
    }

    async fn exists(&self, key: &str) -> GatewayResult<bool>;

    /// Metadata for `key`, or `None` when absent.
    async fn get(&self, key: &str) -> GatewayResult<Option<ObjectHandle>>;

    /// Upload a local file to `key`, replacing any existing object.
    async fn put_file(
        &self,
        key: &str,
        source: &Path,
        content_type: &str,
    ) -> GatewayResult<ObjectHandle>;

    /// Write the payload of `key` to `destination`.
    async fn download_file(&self, key: &str, destination: &Path) -> GatewayResult<()>;

    /// Delete `key`. Deleting an absent key is not an error.
    async fn delete(&self, key: &str) -> GatewayResult<()>;

    /// Server-side copy within the bucket.
    async fn copy(&self, src_key: &str, dst_key: &str, opts: &CopyOptions) -> GatewayResult<()>;

    /// Every object under the gateway's prefix, paginated lazily.
    ///
    /// Each call starts a fresh pagination from the beginning.
    fn list(&self) -> BoxStream<'_, GatewayResult<ObjectHandle>>;

    /// Open a multipart upload and return its upload id.
    async fn create_multipart(
        &self,
        key: &str,
        content_type: &str,
        metadata: &ObjectMetadata,
    ) -> GatewayResult<String>;

    async fn list_parts(&self, upload_id: &str, key: &str) -> GatewayResult<Vec<PartSummary>>;

    async fn complete_multipart(
        &self,
        upload_id: &str,
        key: &str,
        parts: &[CompletedPart],
    ) -> GatewayResult<()>;

    async fn abort_multipart(&self, upload_id: &str, key: &str) -> GatewayResult<()>;

    /// Presign a request against `key`.
    async fn presigned_url(&self, key: &str, request: &PresignRequest) -> GatewayResult<String>;

    /// Presign the upload of one part of an open multipart upload.
    async fn presign_part(
        &self,
        upload_id: &str,
        key: &str,
        part_number: u32,
        expires_in_secs: u64,
    ) -> GatewayResult<String> {
        let request = PresignRequest::upload_part(upload_id, part_number, expires_in_secs);
        self.presigned_url(key, &request).await
    }

    /// Install `rule` on the bucket unless an identical rule is already there.
    async fn ensure_cors_rule(&self, rule: &CorsRule) -> GatewayResult<()>;
}
