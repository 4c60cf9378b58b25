mod bootstrap;
mod health;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use chavruta_core::config::{AppConfig, ConfigOverrides, LoadOptions};
use clap::Parser;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(
    name = "chavruta-server",
    about = "Chavruta Slack study bot",
    after_help = "Examples:\n  chavruta-server\n  chavruta-server --config config/chavruta.toml"
)]
struct Args {
    #[arg(long, help = "Path to a chavruta.toml config file")]
    config: Option<PathBuf>,
    #[arg(long, help = "Override database.url")]
    database_url: Option<String>,
    #[arg(long, help = "Override logging.level")]
    log_level: Option<String>,
}

impl Args {
    fn load_options(self) -> LoadOptions {
        LoadOptions {
            require_file: self.config.is_some(),
            config_path: self.config,
            overrides: ConfigOverrides {
                database_url: self.database_url,
                log_level: self.log_level,
                ..ConfigOverrides::default()
            },
        }
    }
}

fn init_logging(config: &AppConfig) {
    use chavruta_core::config::LogFormat::*;

    let filter =
        EnvFilter::try_new(&config.logging.level).unwrap_or_else(|_| EnvFilter::new("info"));

    match config.logging.format {
        Compact => {
            tracing_subscriber::fmt().with_target(false).with_env_filter(filter).compact().init();
        }
        Pretty => {
            tracing_subscriber::fmt().with_target(false).with_env_filter(filter).pretty().init();
        }
        Json => {
            tracing_subscriber::fmt().with_target(false).with_env_filter(filter).json().init();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    run(Args::parse()).await
}

async fn run(args: Args) -> Result<()> {
    // Config first; the log format and level come from it.
    let config = AppConfig::load(args.load_options())?;
    init_logging(&config);

    let mut app = bootstrap::bootstrap_with_config(config).await?;

    health::spawn(
        &app.config.server.bind_address,
        app.config.server.health_check_port,
        app.db_pool.clone(),
        app.sessions.clone(),
    )
    .await?;

    let runner = app.slack_runner;
    tokio::spawn(async move {
        if let Err(error) = runner.start().await {
            tracing::error!(
                event_name = "system.server.slack_runner_failed",
                error = %error,
                "slack runner stopped"
            );
        }
    });

    tracing::info!(
        event_name = "system.server.started",
        bot_name = %app.config.slack.bot_name,
        "chavruta-server started"
    );

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result?;
            tracing::info!(event_name = "system.server.interrupted", "received ctrl-c");
        }
        () = app.shutdown.wait() => {
            tracing::info!(event_name = "system.server.shutdown_requested", "shutdown requested from chat");
        }
    }

    let grace = Duration::from_secs(app.config.server.graceful_shutdown_secs);
    let active = app.sessions.active_sessions().await;
    tracing::info!(
        event_name = "system.server.stopping",
        active_sessions = active,
        grace_secs = grace.as_secs(),
        "chavruta-server stopping"
    );
    if active > 0 && !grace.is_zero() {
        tokio::time::sleep(grace).await;
    }
    app.db_pool.close().await;

    Ok(())
}
