use async_trait::async_trait;
use thiserror::Error;

use tagwatch_core::domain::subscription::{ChatId, Subscription, SubscriptionKey};

pub mod document;
pub mod json_file;
pub mod memory;

pub use document::{StoreDocument, StoredSubscription};
pub use json_file::JsonFileSubscriptionRepository;
pub use memory::InMemorySubscriptionRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("storage io error on `{path}`: {source}")]
    Io { path: String, source: std::io::Error },
    #[error("decode error: {0}")]
    Decode(String),
    #[error("encode error: {0}")]
    Encode(String),
}

/// Persisted subscriptions, addressed by `(chat, repository)`.
#[async_trait]
pub trait SubscriptionRepository: Send + Sync {
    async fn find(&self, key: &SubscriptionKey) -> Result<Option<Subscription>, RepositoryError>;

    /// Inserts or replaces the subscription stored under `subscription.key`.
    async fn save(&self, subscription: Subscription) -> Result<(), RepositoryError>;

    /// Returns `false` when nothing was stored under `key`.
    async fn remove(&self, key: &SubscriptionKey) -> Result<bool, RepositoryError>;

    async fn list_for_chat(&self, chat_id: ChatId) -> Result<Vec<Subscription>, RepositoryError>;

    async fn list_all(&self) -> Result<Vec<Subscription>, RepositoryError>;

    /// Replaces the last-seen tag set wholesale. Returns `false` when the
    /// subscription no longer exists.
    async fn replace_last_seen(
        &self,
        key: &SubscriptionKey,
        tag_names: Vec<String>,
    ) -> Result<bool, RepositoryError>;
}
