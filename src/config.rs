use anyhow::{Context, Result};
use clap::Parser;
use std::env;

/// Whole-file browser uploads may crawl over slow uplinks.
pub const UPLOAD_URL_EXPIRES_AFTER_SECONDS: u64 = 21_600;
pub const PART_URL_EXPIRES_AFTER_SECONDS: u64 = 600;
pub const DOWNLOAD_URL_EXPIRES_AFTER_SECONDS: u64 = 300;

/// Settings the backup store reads. Passed in explicitly; nothing is read from
/// global state after construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupStoreConfig {
    /// Backup bucket, optionally followed by a folder (`bucket/folder`).
    pub bucket_name: String,

    /// Keep old backups around; exposed to retention tooling.
    pub disable_cleanup: bool,

    /// Extra folder between the bucket and the tenant segment.
    pub key_prefix_folder: Option<String>,

    /// Tenant identity, embedded as a path segment.
    pub tenant_id: String,

    /// Multi-tenant deployment. Affects the legacy key layout only.
    pub multisite: bool,

    /// Canonical base URL of the deployment; its origin is allowed to PUT.
    pub base_url: String,

    pub download_url_expires_secs: u64,
    pub upload_url_expires_secs: u64,
    pub part_url_expires_secs: u64,
}

impl Default for BackupStoreConfig {
    fn default() -> Self {
        Self {
            bucket_name: String::new(),
            disable_cleanup: false,
            key_prefix_folder: None,
            tenant_id: "default".into(),
            multisite: false,
            base_url: "http://localhost:3000".into(),
            download_url_expires_secs: DOWNLOAD_URL_EXPIRES_AFTER_SECONDS,
            upload_url_expires_secs: UPLOAD_URL_EXPIRES_AFTER_SECONDS,
            part_url_expires_secs: PART_URL_EXPIRES_AFTER_SECONDS,
        }
    }
}

impl BackupStoreConfig {
    /// `scheme://host[:port]` of `base_url`, without any subfolder.
    pub fn allowed_origin(&self) -> String {
        let url = self.base_url.trim_end_matches('/');
        let authority_start = url.find("://").map(|i| i + 3).unwrap_or(0);
        match url[authority_start..].find('/') {
            Some(path_start) => url[..authority_start + path_start].to_string(),
            None => url.to_string(),
        }
    }
}

/// Local object store backend plus credentials used to sign URLs.
#[derive(Debug, Clone)]
pub struct GatewayOptions {
    pub data_dir: String,
    pub database_url: String,
    pub endpoint: String,
    pub region: String,
    pub access_key: String,
    pub secret_key: String,
}

/// Centralized application configuration for the operator binary.
/// Combines environment variables and CLI arguments.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub store: BackupStoreConfig,
    pub gateway: GatewayOptions,
}

/// What the binary should do once configured.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Migrate,
    VacateLegacyPrefix,
    List,
}

/// Command-line + environment configuration.
#[derive(Parser, Debug)]
#[command(author, version, about = "Remote backup archive store")]
pub struct Args {
    /// Backup bucket, optionally `bucket/folder` (overrides BACKUP_STORE_BUCKET)
    #[arg(long)]
    pub bucket: Option<String>,

    /// Folder between bucket and tenant (overrides BACKUP_STORE_KEY_PREFIX_FOLDER)
    #[arg(long)]
    pub key_prefix_folder: Option<String>,

    /// Tenant identity (overrides BACKUP_STORE_TENANT)
    #[arg(long)]
    pub tenant: Option<String>,

    /// Multi-tenant deployment (overrides BACKUP_STORE_MULTISITE)
    #[arg(long)]
    pub multisite: bool,

    /// Keep old backups (overrides BACKUP_STORE_DISABLE_CLEANUP)
    #[arg(long)]
    pub disable_cleanup: bool,

    /// Canonical base URL (overrides BACKUP_STORE_BASE_URL)
    #[arg(long)]
    pub base_url: Option<String>,

    /// Directory holding object payloads (overrides BACKUP_STORE_DATA_DIR)
    #[arg(long)]
    pub data_dir: Option<String>,

    /// Metadata database URL (overrides BACKUP_STORE_DATABASE_URL)
    #[arg(long)]
    pub database_url: Option<String>,

    /// Endpoint presigned URLs point at (overrides BACKUP_STORE_ENDPOINT)
    #[arg(long)]
    pub endpoint: Option<String>,

    /// Signing region (overrides BACKUP_STORE_REGION)
    #[arg(long)]
    pub region: Option<String>,

    /// Run migrations and exit
    #[arg(long)]
    pub migrate: bool,

    /// Move archives from the legacy prefix and exit
    #[arg(long)]
    pub vacate_legacy_prefix: bool,
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig and the command to run.
    pub fn from_env_and_args() -> Result<(Self, Command)> {
        // Parse CLI once
        let args = Args::parse();

        // --- Environment fallback ---
        let env_bucket = env::var("BACKUP_STORE_BUCKET").ok();
        let env_folder = env::var("BACKUP_STORE_KEY_PREFIX_FOLDER").ok();
        let env_tenant = env::var("BACKUP_STORE_TENANT").unwrap_or_else(|_| "default".into());
        let env_multisite = env_flag("BACKUP_STORE_MULTISITE")?;
        let env_disable_cleanup = env_flag("BACKUP_STORE_DISABLE_CLEANUP")?;
        let env_base_url =
            env::var("BACKUP_STORE_BASE_URL").unwrap_or_else(|_| "http://localhost:3000".into());
        let env_data_dir =
            env::var("BACKUP_STORE_DATA_DIR").unwrap_or_else(|_| "./data/objects".into());
        let env_db = env::var("BACKUP_STORE_DATABASE_URL")
            .unwrap_or_else(|_| "sqlite://./data/meta/backup_store.db".into());
        let env_endpoint =
            env::var("BACKUP_STORE_ENDPOINT").unwrap_or_else(|_| "http://localhost:9000".into());
        let env_region = env::var("BACKUP_STORE_REGION").unwrap_or_else(|_| "us-east-1".into());
        let access_key = env::var("BACKUP_STORE_ACCESS_KEY").unwrap_or_else(|_| "local".into());
        let secret_key = env::var("BACKUP_STORE_SECRET_KEY")
            .context("reading BACKUP_STORE_SECRET_KEY (required to sign URLs)")?;

        let bucket_name = args
            .bucket
            .or(env_bucket)
            .context("a backup bucket is required (--bucket or BACKUP_STORE_BUCKET)")?;

        // --- Merge ---
        let store = BackupStoreConfig {
            bucket_name,
            disable_cleanup: args.disable_cleanup || env_disable_cleanup,
            key_prefix_folder: args.key_prefix_folder.or(env_folder),
            tenant_id: args.tenant.unwrap_or(env_tenant),
            multisite: args.multisite || env_multisite,
            base_url: args.base_url.unwrap_or(env_base_url),
            ..BackupStoreConfig::default()
        };
        let gateway = GatewayOptions {
            data_dir: args.data_dir.unwrap_or(env_data_dir),
            database_url: args.database_url.unwrap_or(env_db),
            endpoint: args.endpoint.unwrap_or(env_endpoint),
            region: args.region.unwrap_or(env_region),
            access_key,
            secret_key,
        };

        let command = if args.migrate {
            Command::Migrate
        } else if args.vacate_legacy_prefix {
            Command::VacateLegacyPrefix
        } else {
            Command::List
        };

        Ok((Self { store, gateway }, command))
    }
}

fn env_flag(name: &str) -> Result<bool> {
    match env::var(name) {
        Ok(value) => match value.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" => Ok(true),
            "0" | "false" | "no" | "" => Ok(false),
            other => anyhow::bail!("parsing {} value `{}`", name, other),
        },
        Err(env::VarError::NotPresent) => Ok(false),
        Err(err) => Err(err).with_context(|| format!("reading {}", name)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allowed_origin_drops_subfolder() {
        let cfg = BackupStoreConfig {
            base_url: "https://forum.example.com/community/".into(),
            ..BackupStoreConfig::default()
        };
        assert_eq!(cfg.allowed_origin(), "https://forum.example.com");

        let cfg = BackupStoreConfig {
            base_url: "http://localhost:3000".into(),
            ..BackupStoreConfig::default()
        };
        assert_eq!(cfg.allowed_origin(), "http://localhost:3000");
    }
}
