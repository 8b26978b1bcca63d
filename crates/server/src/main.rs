mod bootstrap;
mod deploy;
mod health;
mod registry;
mod services;
mod telegram;
mod watch;

use anyhow::Result;
use tagwatch_core::config::{AppConfig, LoadOptions};

use crate::health::HealthState;

fn init_logging(config: &AppConfig) {
    use tagwatch_core::config::LogFormat::*;
    use tracing::Level;

    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);

    match config.logging.format {
        Compact => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).compact().init();
        }
        Pretty => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).pretty().init();
        }
        Json => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).json().init();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    run().await
}

pub async fn run() -> Result<()> {
    let config = AppConfig::load(LoadOptions::default())?;
    init_logging(&config);

    let app = bootstrap::bootstrap_with_config(config).await;

    health::spawn(
        &app.config.server.bind_address,
        app.config.server.health_check_port,
        HealthState::new(app.store.clone(), app.watcher.status()),
    )
    .await?;

    tracing::info!(event_name = "system.server.started", "tagwatch-server started");

    tokio::select! {
        result = app.runner.start() => {
            if let Err(error) = result {
                tracing::error!(
                    event_name = "system.server.polling_stopped",
                    error = %error,
                    "update polling stopped"
                );
            }
        }
        _ = app.watcher.run_forever(&app.config.watch) => {}
        signal = tokio::signal::ctrl_c() => signal?,
    }

    tracing::info!(event_name = "system.server.stopping", "tagwatch-server stopping");
    Ok(())
}
