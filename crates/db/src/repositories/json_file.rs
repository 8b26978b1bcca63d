use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tokio::sync::Mutex;
use tracing::{debug, error};

use tagwatch_core::domain::subscription::{ChatId, Subscription, SubscriptionKey};

use super::document::{decode, remove_entry, replace_tags, upsert, StoreDocument};
use super::{RepositoryError, SubscriptionRepository};

type Snapshot = BTreeMap<SubscriptionKey, Subscription>;

/// Subscription store backed by a single JSON document.
///
/// Every operation re-reads the file, so hand edits made while the process
/// runs are picked up. Reads degrade to an empty store when the file cannot be
/// decoded; writes refuse to touch such a file and edit the raw document, so
/// entries that do not decode survive. Read-modify-write sequences are
/// serialized by an in-process mutex; separate processes are not coordinated.
pub struct JsonFileSubscriptionRepository {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonFileSubscriptionRepository {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), lock: Mutex::new(()) }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Strict read used by health checks: a missing file is fine, anything
    /// unreadable or undecodable is reported instead of masked.
    pub async fn verify(&self) -> Result<usize, RepositoryError> {
        let _guard = self.lock.lock().await;
        let document = self.read_document().await?;
        Ok(decode(document).len())
    }

    async fn read_document(&self) -> Result<StoreDocument, RepositoryError> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(source) if source.kind() == ErrorKind::NotFound => {
                return Ok(StoreDocument::new());
            }
            Err(source) => return Err(self.io_error(source)),
        };

        if raw.trim().is_empty() {
            return Ok(StoreDocument::new());
        }

        serde_json::from_str(&raw).map_err(|error| {
            RepositoryError::Decode(format!("{}: {error}", self.path.display()))
        })
    }

    /// Unreadable state degrades to an empty store so the bot keeps serving.
    async fn load(&self) -> Snapshot {
        match self.read_document().await {
            Ok(document) => decode(document),
            Err(error) => {
                error!(
                    event_name = "storage.load.failed",
                    path = %self.path.display(),
                    error = %error,
                    "failed to load subscription store; continuing with empty state"
                );
                Snapshot::new()
            }
        }
    }

    async fn persist(&self, document: &StoreDocument) -> Result<(), RepositoryError> {
        let rendered = serde_json::to_string_pretty(document)
            .map_err(|error| RepositoryError::Encode(error.to_string()))?;

        if let Some(parent) = self.path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(|source| self.io_error(source))?;
        }

        let staging = self.path.with_extension("json.tmp");
        tokio::fs::write(&staging, rendered).await.map_err(|source| self.io_error(source))?;
        tokio::fs::rename(&staging, &self.path).await.map_err(|source| self.io_error(source))?;

        debug!(
            event_name = "storage.save.completed",
            path = %self.path.display(),
            chats = document.len(),
            "subscription store written"
        );
        Ok(())
    }

    fn io_error(&self, source: std::io::Error) -> RepositoryError {
        RepositoryError::Io { path: self.path.display().to_string(), source }
    }
}

#[async_trait::async_trait]
impl SubscriptionRepository for JsonFileSubscriptionRepository {
    async fn find(&self, key: &SubscriptionKey) -> Result<Option<Subscription>, RepositoryError> {
        let _guard = self.lock.lock().await;
        Ok(self.load().await.remove(key))
    }

    async fn save(&self, subscription: Subscription) -> Result<(), RepositoryError> {
        let _guard = self.lock.lock().await;
        let mut document = self.read_document().await?;
        upsert(&mut document, &subscription);
        self.persist(&document).await
    }

    async fn remove(&self, key: &SubscriptionKey) -> Result<bool, RepositoryError> {
        let _guard = self.lock.lock().await;
        let mut document = self.read_document().await?;
        if !remove_entry(&mut document, key) {
            return Ok(false);
        }
        self.persist(&document).await?;
        Ok(true)
    }

    async fn list_for_chat(&self, chat_id: ChatId) -> Result<Vec<Subscription>, RepositoryError> {
        let _guard = self.lock.lock().await;
        Ok(self
            .load()
            .await
            .into_values()
            .filter(|subscription| subscription.key.chat_id == chat_id)
            .collect())
    }

    async fn list_all(&self) -> Result<Vec<Subscription>, RepositoryError> {
        let _guard = self.lock.lock().await;
        Ok(self.load().await.into_values().collect())
    }

    async fn replace_last_seen(
        &self,
        key: &SubscriptionKey,
        tag_names: Vec<String>,
    ) -> Result<bool, RepositoryError> {
        let _guard = self.lock.lock().await;
        let mut document = self.read_document().await?;
        if !replace_tags(&mut document, key, tag_names) {
            return Ok(false);
        }
        self.persist(&document).await?;
        Ok(true)
    }
}
