use std::sync::Arc;
use std::time::Duration;

use chavruta_agent::{
    BotError, BotRuntime, LookupError, RuntimeSettings, SefariaClient, ShutdownListener,
};
use chavruta_core::config::{AppConfig, ConfigError};
use chavruta_core::convo::SessionManager;
use chavruta_db::{connect_with_settings, migrations, DbPool, SqlUserRepository};
use chavruta_slack::api::{SlackApi, SlackApiError, WebApiClient};
use chavruta_slack::events::{EventDispatcher, MessageHandler};
use chavruta_slack::socket::{NoopSocketTransport, ReconnectPolicy, SocketModeRunner};
use thiserror::Error;
use tracing::info;

const SLACK_API_TIMEOUT: Duration = Duration::from_secs(10);

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub sessions: SessionManager,
    pub shutdown: ShutdownListener,
    pub slack_runner: SocketModeRunner,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("slack client setup failed: {0}")]
    Slack(#[from] SlackApiError),
    #[error("text lookup client setup failed: {0}")]
    Lookup(#[from] LookupError),
    #[error("bot setup failed: {0}")]
    Bot(#[from] BotError),
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(event_name = "system.bootstrap.start", "starting application bootstrap");

    let db_pool = connect_with_settings(
        &config.database.url,
        config.database.max_connections,
        config.database.timeout_secs,
    )
    .await
    .map_err(BootstrapError::DatabaseConnect)?;
    info!(event_name = "system.bootstrap.database_connected", "database connection established");

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(event_name = "system.bootstrap.migrations_applied", "database migrations applied");

    let api: Arc<dyn SlackApi> = Arc::new(WebApiClient::new(
        config.slack.api_base_url.clone(),
        config.slack.bot_token.clone(),
        SLACK_API_TIMEOUT,
    )?);
    let lookup = SefariaClient::new(
        config.lookup.base_url.clone(),
        Duration::from_secs(config.lookup.timeout_secs),
    )?;
    let users = SqlUserRepository::new(db_pool.clone());

    let settings = RuntimeSettings {
        bot_name: config.slack.bot_name.clone(),
        idle_timeout: config.conversation.idle_timeout(),
        shutdown_delay: config.conversation.shutdown_delay(),
    };
    let (runtime, shutdown) =
        BotRuntime::new(settings, Arc::clone(&api), Arc::new(users), Arc::new(lookup))?;
    let sessions = runtime.sessions();

    let mut dispatcher = EventDispatcher::new();
    dispatcher.register(MessageHandler::new(runtime));
    let slack_runner = SocketModeRunner::new(
        Arc::new(NoopSocketTransport),
        dispatcher,
        api,
        ReconnectPolicy::default(),
    );
    info!(
        event_name = "system.bootstrap.bot_ready",
        bot_name = %config.slack.bot_name,
        socket_mode = config.slack.app_token.is_some(),
        "bot runtime wired"
    );

    Ok(Application { config, db_pool, sessions, shutdown, slack_runner })
}
