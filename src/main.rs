use anyhow::Result;
use backup_store::{
    BackupStore, BucketLocation, LocalGateway, Presigner,
    config::{AppConfig, Command},
    services::local_gateway::run_migrations,
};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use std::{fs, path::Path, str::FromStr, sync::Arc};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // --- Logging setup ---
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // --- Parse config + command ---
    let (cfg, command) = AppConfig::from_env_and_args()?;

    tracing::info!(
        bucket = %cfg.store.bucket_name,
        tenant = %cfg.store.tenant_id,
        multisite = cfg.store.multisite,
        data_dir = %cfg.gateway.data_dir,
        "Starting backup-store"
    );

    // --- Ensure payload directory exists ---
    if !Path::new(&cfg.gateway.data_dir).exists() {
        fs::create_dir_all(&cfg.gateway.data_dir)?;
        tracing::info!("Created data directory at {}", cfg.gateway.data_dir);
    }

    // --- Initialize SQLite connection ---
    let db_url = &cfg.gateway.database_url;
    let db_path = db_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("file:");
    if let Some(parent) = Path::new(db_path).parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent)?;
            tracing::info!("Created missing directory {:?}", parent);
        }
    }

    let options = SqliteConnectOptions::from_str(db_url)?.create_if_missing(true);
    let db = Arc::new(
        SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?,
    );

    run_migrations(&db).await?;
    if command == Command::Migrate {
        tracing::info!("Database migration complete.");
        return Ok(());
    }

    // --- Initialize store ---
    let presigner = Presigner::new(
        &cfg.gateway.endpoint,
        &cfg.gateway.region,
        cfg.gateway.access_key.clone(),
        cfg.gateway.secret_key.clone(),
    );
    let gateway = LocalGateway::new(
        db.clone(),
        cfg.gateway.data_dir.clone(),
        presigner,
        BucketLocation::parse(&cfg.store.bucket_name),
    );
    let store = BackupStore::new(cfg.store.clone(), gateway);

    match command {
        Command::VacateLegacyPrefix => {
            let moved = store.vacate_legacy_prefix().await?;
            tracing::info!("Moved {} legacy backups", moved);
        }
        Command::List | Command::Migrate => {
            let files = store.files().await?;
            let stats = store.stats().await?;
            println!(
                "{}",
                serde_json::to_string_pretty(&serde_json::json!({
                    "files": files,
                    "stats": stats,
                }))?
            );
        }
    }

    Ok(())
}
