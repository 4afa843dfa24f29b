use std::sync::Arc;

use thiserror::Error;
use tracing::info;
use tradelane_core::config::{AppConfig, ConfigError, LoadOptions};
use tradelane_core::{ApplicationError, ConversationService, ConversationSettings, ProviderError};
use tradelane_db::{
    connect_with_config, migrations, DbPool, SqlDirectoryRepository, SqlParticipantRepository,
    SqlThreadRepository,
};
use tradelane_messaging::HttpMessagingProvider;

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub conversations: ConversationService,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("conversation engine settings are invalid: {0}")]
    Settings(#[source] ApplicationError),
    #[error("messaging provider client could not be created: {0}")]
    Messaging(#[source] ProviderError),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    let settings =
        ConversationSettings::from_config(&config.messaging).map_err(BootstrapError::Settings)?;
    let provider =
        HttpMessagingProvider::from_config(&config.messaging).map_err(BootstrapError::Messaging)?;

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

    let conversations = ConversationService::new(
        Arc::new(SqlThreadRepository::new(db_pool.clone())),
        Arc::new(SqlParticipantRepository::new(db_pool.clone())),
        Arc::new(SqlDirectoryRepository::new(db_pool.clone())),
        Arc::new(provider),
        settings,
    );
    info!(
        event_name = "system.bootstrap.conversations_ready",
        correlation_id = "bootstrap",
        messaging_base_url = %config.messaging.base_url,
        provider_timeout_ms = config.messaging.request_timeout_ms,
        "conversation engine initialized"
    );

    Ok(Application { config, db_pool, conversations })
}
