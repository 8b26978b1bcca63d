use serde::Serialize;
use tagwatch_core::config::{AppConfig, LoadOptions};
use tagwatch_core::domain::subscription::{ChatId, Subscription};
use tagwatch_db::{JsonFileSubscriptionRepository, RepositoryError, SubscriptionRepository};

use super::{serialize_payload, CommandResult, EXIT_CONFIG_INVALID, EXIT_STORAGE_UNREADABLE};

const COMMAND: &str = "subscriptions";

#[derive(Debug, Serialize)]
struct SubscriptionView {
    chat_id: i64,
    repository: String,
    last_seen_tags: Vec<String>,
    local_repo_path: Option<String>,
    service_base_url: Option<String>,
    api_token: &'static str,
}

impl From<&Subscription> for SubscriptionView {
    fn from(subscription: &Subscription) -> Self {
        Self {
            chat_id: subscription.key.chat_id.0,
            repository: subscription.repository().to_string(),
            last_seen_tags: subscription.last_seen_tags.clone(),
            local_repo_path: subscription.deploy.local_repo_path.clone(),
            service_base_url: subscription.deploy.service_base_url.clone(),
            api_token: if subscription.deploy.has_token() { "<redacted>" } else { "<unset>" },
        }
    }
}

#[derive(Debug, Serialize)]
struct SubscriptionsOutput {
    command: &'static str,
    status: &'static str,
    path: String,
    count: usize,
    subscriptions: Vec<SubscriptionView>,
}

pub fn run(chat: Option<i64>) -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                COMMAND,
                "config_validation",
                error.to_string(),
                EXIT_CONFIG_INVALID,
            )
        }
    };

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return CommandResult::failure(
                COMMAND,
                "runtime",
                format!("failed to initialize async runtime: {error}"),
                EXIT_STORAGE_UNREADABLE,
            )
        }
    };

    let store = JsonFileSubscriptionRepository::new(config.storage.path.clone());
    match runtime.block_on(list(&store, chat.map(ChatId))) {
        Ok(subscriptions) => {
            let output = SubscriptionsOutput {
                command: COMMAND,
                status: "ok",
                path: store.path().display().to_string(),
                count: subscriptions.len(),
                subscriptions: subscriptions.iter().map(SubscriptionView::from).collect(),
            };
            CommandResult { exit_code: 0, output: serialize_payload(&output) }
        }
        Err(error) => CommandResult::failure(
            COMMAND,
            "storage_unreadable",
            error.to_string(),
            EXIT_STORAGE_UNREADABLE,
        ),
    }
}

/// Strict read: a corrupt store is reported instead of listed as empty.
async fn list(
    store: &JsonFileSubscriptionRepository,
    chat: Option<ChatId>,
) -> Result<Vec<Subscription>, RepositoryError> {
    store.verify().await?;
    match chat {
        Some(chat_id) => store.list_for_chat(chat_id).await,
        None => store.list_all().await,
    }
}
