use std::sync::Arc;

use tagwatch_chat::events::{ButtonActionHandler, CommandHandler, EventDispatcher};
use tagwatch_chat::polling::{ReconnectPolicy, UpdatePollingRunner};
use tagwatch_core::config::{AppConfig, ConfigError, LoadOptions};
use tagwatch_db::JsonFileSubscriptionRepository;
use thiserror::Error;
use tracing::{info, warn};

use crate::deploy::WebhookDeployTrigger;
use crate::registry::RegistryClient;
use crate::services::{DeployActionService, SubscriptionService};
use crate::telegram::TelegramBotApi;
use crate::watch::{CycleStatus, TagWatcher};

const RECONNECT_BASE_DELAY_MS: u64 = 1_000;
const RECONNECT_MAX_DELAY_MS: u64 = 60_000;

pub struct Application {
    pub config: AppConfig,
    pub store: Arc<JsonFileSubscriptionRepository>,
    pub watcher: TagWatcher,
    pub runner: UpdatePollingRunner,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    info!(event_name = "system.bootstrap.start", "starting application bootstrap");
    let config = AppConfig::load(options)?;
    Ok(bootstrap_with_config(config).await)
}

/// Wires the store, clients, services and handlers around an already validated config.
pub async fn bootstrap_with_config(config: AppConfig) -> Application {
    let store = Arc::new(JsonFileSubscriptionRepository::new(config.storage.path.clone()));
    match store.verify().await {
        Ok(count) => info!(
            event_name = "system.bootstrap.storage_loaded",
            path = %store.path().display(),
            subscriptions = count,
            "subscription store loaded"
        ),
        Err(error) => warn!(
            event_name = "system.bootstrap.storage_unreadable",
            path = %store.path().display(),
            error = %error,
            "subscription store unreadable; starting from empty state"
        ),
    }

    let telegram = Arc::new(TelegramBotApi::new(&config.telegram));
    let registry = Arc::new(RegistryClient::new(&config.registry));
    let trigger = Arc::new(WebhookDeployTrigger::new(&config.deploy));

    let mut commands = CommandHandler::new(SubscriptionService::new(store.clone(), registry.clone()));
    match telegram.bot_username().await {
        Ok(Some(username)) => {
            info!(event_name = "system.bootstrap.bot_identity", username = %username, "bot identity resolved");
            commands = commands.with_bot_username(username);
        }
        Ok(None) => {}
        Err(error) => warn!(
            event_name = "system.bootstrap.bot_identity_failed",
            error = %error,
            "could not resolve bot username; accepting commands addressed to any bot"
        ),
    }

    let mut dispatcher = EventDispatcher::new();
    dispatcher.register(commands);
    dispatcher.register(ButtonActionHandler::new(DeployActionService::new(
        store.clone(),
        trigger,
        telegram.clone(),
    )));

    let runner = UpdatePollingRunner::new(
        telegram.clone(),
        dispatcher,
        telegram.clone(),
        ReconnectPolicy::persistent(RECONNECT_BASE_DELAY_MS, RECONNECT_MAX_DELAY_MS),
    );
    let watcher = TagWatcher::new(store.clone(), registry, telegram, CycleStatus::default());

    info!(
        event_name = "system.bootstrap.completed",
        storage_path = %config.storage.path.display(),
        interval_secs = config.watch.interval_secs,
        "application bootstrap completed"
    );

    Application { config, store, watcher, runner }
}
