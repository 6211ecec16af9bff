//! Represents an object (blob) as reported by the store's metadata.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Metadata handle for one stored object.
///
/// The handle does not carry payload bytes. `size` and `last_modified` are
/// authoritative values from the store.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct ObjectHandle {
    /// Full key within the bucket (including any folder prefix).
    pub key: String,

    /// Size in bytes.
    pub size: u64,

    /// Timestamp when the object was last written.
    pub last_modified: DateTime<Utc>,

    /// Entity tag reported by the store.
    pub etag: Option<String>,

    /// Content type (MIME type).
    pub content_type: Option<String>,
}

impl ObjectHandle {
    /// Base name of the key, without any folder segments.
    pub fn basename(&self) -> &str {
        basename(&self.key)
    }
}

/// Last `/`-separated segment of a key.
pub fn basename(key: &str) -> &str {
    key.rsplit('/').next().unwrap_or(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basename_strips_folders() {
        assert_eq!(basename("backups/acme/site.tar.gz"), "site.tar.gz");
        assert_eq!(basename("site.tar.gz"), "site.tar.gz");
        assert_eq!(basename("backups/acme/"), "");
    }
}
