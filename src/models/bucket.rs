//! Bucket-level configuration applied through the gateway.

use serde::{Deserialize, Serialize};

/// A single CORS rule on a bucket.
///
/// Browsers upload backup archives and parts straight to presigned URLs, which
/// is a cross-origin PUT from the application's origin.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct CorsRule {
    pub allowed_headers: Vec<String>,
    pub allowed_methods: Vec<String>,
    pub allowed_origins: Vec<String>,
    pub max_age_seconds: u32,
}

impl CorsRule {
    /// Rule allowing `origin` to PUT with any header, cached for 3000 seconds.
    pub fn put_from(origin: impl Into<String>) -> Self {
        Self {
            allowed_headers: vec!["*".into()],
            allowed_methods: vec!["PUT".into()],
            allowed_origins: vec![origin.into()],
            max_age_seconds: 3000,
        }
    }
}
