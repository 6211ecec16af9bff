//! Remote backup archive store.
//!
//! [`BackupStore`] manages backup archives inside one tenant's prefix of a
//! remote bucket: listing, fetch, create-only upload, delete, browser upload
//! URLs, multipart upload orchestration, and migration away from the legacy
//! key layout. All remote calls go through an [`ObjectStoreGateway`];
//! [`LocalGateway`] is the SQLite + disk implementation shipped with the crate.

pub mod config;
pub mod errors;
pub mod models;
pub mod services;

pub use config::BackupStoreConfig;
pub use errors::{BackupStoreError, BackupStoreResult, GatewayError, GatewayResult};
pub use models::{
    backup_file::{BackupFile, BackupStats},
    multipart::{CompletedPart, MultipartSession, PartSummary},
    object::ObjectHandle,
};
pub use services::{
    backup_store::BackupStore,
    gateway::{ObjectStoreGateway, PresignMethod, PresignRequest},
    local_gateway::LocalGateway,
    location::BucketLocation,
    presign::Presigner,
};
