use sentry::ClientInitGuard;
use server::config::DirectoryConfig;
use server::persistence::SqliteStore;
use server::service::DirectoryService;
use std::path::PathBuf;
use std::str::FromStr;
use tokio_rusqlite::Connection;
use tracing::{info, warn, Level};
use tracing_subscriber::filter::Targets;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Boots the key directory and sealed-sender service and runs the C7 epoch worker for
/// the life of the process. There is deliberately no listener socket here: the HTTP or
/// gRPC adapter in front of [`DirectoryService`] is a boundary concern outside this
/// crate (spec §4.7/C8's Non-goals) — whoever stands one up wires its handlers to
/// `DirectoryService`'s methods directly.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let filter = Targets::from_str(std::env::var("RUST_LOG").as_deref().unwrap_or("info"))
        .expect("RUST_LOG should be a valid tracing filter");
    tracing_subscriber::fmt().with_max_level(Level::TRACE).finish().with(filter).try_init()?;

    let _guard: Option<ClientInitGuard> = if let Ok(dsn) = std::env::var("SENTRY_DSN") {
        info!("Creating Sentry guard.");
        Some(sentry::init((dsn, sentry::ClientOptions { release: sentry::release_name!(), ..Default::default() })))
    } else {
        warn!("Not creating Sentry guard.");
        None
    };

    let config = DirectoryConfig::from_env();
    info!("loaded directory configuration: {:?}", config.transparency_signing_algorithm);

    let dirs = directories::BaseDirs::new().unwrap(); // xdg does not support windows
    let mut data_dir = PathBuf::from(dirs.data_dir());
    data_dir.push("gossamer-directory");
    let db_path: PathBuf = if let Ok(db_dir) = std::env::var("DB") {
        [&db_dir, "directory.db3"].iter().collect()
    } else {
        std::fs::create_dir_all(&data_dir)?;
        data_dir.push("directory.db3");
        data_dir
    };
    info!("Database path: {}", db_path.display());

    let connection = Connection::open(db_path).await?;
    let store = std::sync::Arc::new(SqliteStore::new(connection).await?);
    let service = DirectoryService::new(store, &config).await?;

    info!(interval_secs = config.transparency_epoch_interval.as_secs(), "starting epoch worker");
    let worker = service.spawn_epoch_worker(config.transparency_epoch_interval);

    info!("directory service ready; no transport is attached (boundary adapters are a separate concern)");
    worker.await?;
    Ok(())
}
