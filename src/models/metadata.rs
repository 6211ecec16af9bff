//! User metadata and access-control options attached to objects.

use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fmt};

/// User-defined metadata (`x-amz-meta-*` style) for an object.
pub type ObjectMetadata = BTreeMap<String, String>;

/// Canned access-control list applied to an object.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum Acl {
    #[default]
    Private,
    PublicRead,
}

impl Acl {
    pub fn as_str(&self) -> &'static str {
        match self {
            Acl::Private => "private",
            Acl::PublicRead => "public-read",
        }
    }
}

impl fmt::Display for Acl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Options for a server-side copy.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CopyOptions {
    pub acl: Acl,

    /// Replace the destination's metadata with `content_type`/`metadata`
    /// below instead of carrying over the source's.
    pub apply_metadata_to_destination: bool,

    pub content_type: Option<String>,

    pub metadata: ObjectMetadata,
}
