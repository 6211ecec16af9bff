//! Bucket + key prefix derivation.
//!
//! A location is never stored. It is recomputed from configuration so the
//! tenant segment is always present in multi-tenant deployments and two tenants
//! can never share a prefix.

use crate::config::BackupStoreConfig;
use std::fmt;

/// Folder used by multisite deployments before backups moved to
/// `{bucket}/{tenant}`.
const LEGACY_BACKUPS_FOLDER: &str = "backups";

/// A bucket name plus an optional key prefix within it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketLocation {
    pub bucket: String,
    pub prefix: Option<String>,
}

impl BucketLocation {
    /// Split `bucket/folder/...` into the bucket and the remaining prefix.
    pub fn parse(path: &str) -> Self {
        let trimmed = path.trim_matches('/');
        match trimmed.split_once('/') {
            Some((bucket, prefix)) => {
                let prefix = prefix.trim_matches('/');
                Self {
                    bucket: bucket.to_string(),
                    prefix: (!prefix.is_empty()).then(|| prefix.to_string()),
                }
            }
            None => Self {
                bucket: trimmed.to_string(),
                prefix: None,
            },
        }
    }

    /// Where the tenant's backups live now:
    /// `{bucket_name}/{key_prefix_folder}/{tenant_id}`.
    pub fn current(config: &BackupStoreConfig) -> Self {
        let path = join_segments([
            config.bucket_name.as_str(),
            config.key_prefix_folder.as_deref().unwrap_or(""),
            config.tenant_id.as_str(),
        ]);
        Self::parse(&path)
    }

    /// Where older releases put backups: `{bucket_name}/backups/{tenant_id}`
    /// for multisite deployments, the bare bucket otherwise.
    pub fn legacy(config: &BackupStoreConfig) -> Self {
        if config.multisite {
            Self::parse(&join_segments([
                config.bucket_name.as_str(),
                LEGACY_BACKUPS_FOLDER,
                config.tenant_id.as_str(),
            ]))
        } else {
            Self::parse(&config.bucket_name)
        }
    }

    /// Full key for `filename` under this location's prefix.
    pub fn key_for(&self, filename: &str) -> String {
        match &self.prefix {
            Some(prefix) => join_segments([prefix.as_str(), filename]),
            None => filename.trim_matches('/').to_string(),
        }
    }

    /// True if `key` sits under this location's prefix (segment-aligned).
    pub fn contains(&self, key: &str) -> bool {
        match &self.prefix {
            Some(prefix) => key
                .strip_prefix(prefix.as_str())
                .is_some_and(|rest| rest.starts_with('/')),
            None => true,
        }
    }
}

impl fmt::Display for BucketLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.prefix {
            Some(prefix) => write!(f, "{}/{}", self.bucket, prefix),
            None => f.write_str(&self.bucket),
        }
    }
}

/// Join path segments with `/`, skipping empty ones and stray slashes.
pub fn join_segments<'a>(segments: impl IntoIterator<Item = &'a str>) -> String {
    segments
        .into_iter()
        .map(|s| s.trim_matches('/'))
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("/")
}
