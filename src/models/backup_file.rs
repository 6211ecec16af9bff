//! Represents one backup archive as seen by callers of the backup store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A backup archive stored remotely.
///
/// Built fresh from store metadata on every listing or fetch.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct BackupFile {
    /// Base name only, derived from the storage key.
    pub filename: String,

    /// Byte length as reported by the store.
    pub size: u64,

    /// Timestamp from store metadata.
    pub last_modified: DateTime<Utc>,

    /// Presigned download URL. Only set when explicitly requested.
    pub source: Option<String>,
}

/// Aggregate figures over the current backup listing.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct BackupStats {
    pub used_bytes: u64,

    /// Remote stores have no meaningful free space figure.
    pub free_bytes: Option<u64>,

    pub count: usize,

    pub last_backup_taken_at: Option<DateTime<Utc>>,
}
