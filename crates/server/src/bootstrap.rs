use std::path::PathBuf;
use std::sync::Arc;

use recarga_chat::{
    ConnectionHandle, EventDispatcher, NoopTransport, ReconnectPolicy, Stores, TransportRunner,
};
use recarga_core::config::{AppConfig, ConfigError, LoadOptions};
use recarga_db::{connect_with_config, migrations, DbPool, FsBlobStore};
use thiserror::Error;
use tracing::info;

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub connection: Arc<ConnectionHandle>,
    pub runner: TransportRunner,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("screenshot directory `{path}` is not usable: {source}")]
    Storage { path: PathBuf, source: std::io::Error },
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );

    let db_pool =
        connect_with_config(&config.database).await.map_err(BootstrapError::DatabaseConnect)?;
    info!(
        event_name = "system.bootstrap.database_connected",
        correlation_id = "bootstrap",
        "database connection established"
    );

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(
        event_name = "system.bootstrap.migrations_applied",
        correlation_id = "bootstrap",
        "database migrations applied"
    );

    let screenshot_dir = config.storage.screenshot_dir.clone();
    tokio::fs::create_dir_all(&screenshot_dir)
        .await
        .map_err(|source| BootstrapError::Storage { path: screenshot_dir.clone(), source })?;
    let blobs = Arc::new(FsBlobStore::new(screenshot_dir, config.storage.public_base_url.clone()));

    let stores = Stores::sqlite(db_pool.clone(), blobs);
    let dispatcher = Arc::new(EventDispatcher::from_stores(&stores, &config.operator));
    let connection = Arc::new(ConnectionHandle::new());
    let runner = TransportRunner::new(
        Arc::new(NoopTransport),
        dispatcher,
        connection.clone(),
        ReconnectPolicy::from(&config.chat),
    );
    info!(
        event_name = "system.bootstrap.ready",
        correlation_id = "bootstrap",
        operator = %config.operator.identity,
        dialog_replacement = config.operator.dialog_replacement.as_str(),
        "chat services wired"
    );

    Ok(Application { config, db_pool, connection, runner })
}
