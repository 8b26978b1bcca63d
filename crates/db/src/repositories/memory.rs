use std::collections::BTreeMap;

use tokio::sync::RwLock;

use tagwatch_core::domain::subscription::{
    unique_names, ChatId, Subscription, SubscriptionKey,
};

use super::{RepositoryError, SubscriptionRepository};

#[derive(Default)]
pub struct InMemorySubscriptionRepository {
    subscriptions: RwLock<BTreeMap<SubscriptionKey, Subscription>>,
}

impl InMemorySubscriptionRepository {
    pub fn with_subscriptions(subscriptions: impl IntoIterator<Item = Subscription>) -> Self {
        let subscriptions = subscriptions
            .into_iter()
            .map(|subscription| (subscription.key.clone(), subscription))
            .collect();
        Self { subscriptions: RwLock::new(subscriptions) }
    }
}

#[async_trait::async_trait]
impl SubscriptionRepository for InMemorySubscriptionRepository {
    async fn find(&self, key: &SubscriptionKey) -> Result<Option<Subscription>, RepositoryError> {
        let subscriptions = self.subscriptions.read().await;
        Ok(subscriptions.get(key).cloned())
    }

    async fn save(&self, subscription: Subscription) -> Result<(), RepositoryError> {
        let mut subscriptions = self.subscriptions.write().await;
        subscriptions.insert(subscription.key.clone(), subscription);
        Ok(())
    }

    async fn remove(&self, key: &SubscriptionKey) -> Result<bool, RepositoryError> {
        let mut subscriptions = self.subscriptions.write().await;
        Ok(subscriptions.remove(key).is_some())
    }

    async fn list_for_chat(&self, chat_id: ChatId) -> Result<Vec<Subscription>, RepositoryError> {
        let subscriptions = self.subscriptions.read().await;
        Ok(subscriptions
            .values()
            .filter(|subscription| subscription.key.chat_id == chat_id)
            .cloned()
            .collect())
    }

    async fn list_all(&self) -> Result<Vec<Subscription>, RepositoryError> {
        let subscriptions = self.subscriptions.read().await;
        Ok(subscriptions.values().cloned().collect())
    }

    async fn replace_last_seen(
        &self,
        key: &SubscriptionKey,
        tag_names: Vec<String>,
    ) -> Result<bool, RepositoryError> {
        let mut subscriptions = self.subscriptions.write().await;
        let Some(subscription) = subscriptions.get_mut(key) else {
            return Ok(false);
        };
        subscription.last_seen_tags = unique_names(tag_names);
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use tagwatch_core::domain::repository::RepositoryName;
    use tagwatch_core::domain::subscription::{
        ChatId, DeployTarget, Subscription, SubscriptionKey,
    };

    use crate::repositories::{InMemorySubscriptionRepository, SubscriptionRepository};

    fn key(chat: i64, repository: &str) -> SubscriptionKey {
        SubscriptionKey::new(ChatId(chat), RepositoryName::parse(repository).expect("valid name"))
    }

    fn subscription(chat: i64, repository: &str, tags: &[&str]) -> Subscription {
        Subscription::new(
            key(chat, repository),
            tags.iter().map(|tag| (*tag).to_owned()).collect(),
            DeployTarget::new("org/app", "https://git.example.org/", "token"),
        )
    }

    #[tokio::test]
    async fn in_memory_subscription_round_trip() {
        let repo = InMemorySubscriptionRepository::default();
        repo.save(subscription(1, "nginx", &["1.0"])).await.expect("save");

        let found = repo.find(&key(1, "library/nginx")).await.expect("find").expect("present");
        assert_eq!(found.last_seen_tags, vec!["1.0"]);
        assert!(repo.find(&key(2, "nginx")).await.expect("find").is_none());
    }

    #[tokio::test]
    async fn lists_are_scoped_per_chat() {
        let repo = InMemorySubscriptionRepository::with_subscriptions([
            subscription(1, "nginx", &[]),
            subscription(1, "redis", &[]),
            subscription(2, "nginx", &[]),
        ]);

        assert_eq!(repo.list_for_chat(ChatId(1)).await.expect("list").len(), 2);
        assert_eq!(repo.list_for_chat(ChatId(2)).await.expect("list").len(), 1);
        assert_eq!(repo.list_all().await.expect("list").len(), 3);
    }

    #[tokio::test]
    async fn replace_last_seen_overwrites_whole_set() {
        let repo = InMemorySubscriptionRepository::with_subscriptions([subscription(
            1,
            "nginx",
            &["1.0", "1.1"],
        )]);

        let replaced = repo
            .replace_last_seen(&key(1, "nginx"), vec!["1.1".into(), "1.2".into()])
            .await
            .expect("replace");
        assert!(replaced);

        let found = repo.find(&key(1, "nginx")).await.expect("find").expect("present");
        assert_eq!(found.last_seen_tags, vec!["1.1", "1.2"]);
    }

    #[tokio::test]
    async fn replace_and_remove_report_missing_subscriptions() {
        let repo = InMemorySubscriptionRepository::default();
        assert!(!repo.replace_last_seen(&key(1, "nginx"), vec![]).await.expect("replace"));
        assert!(!repo.remove(&key(1, "nginx")).await.expect("remove"));
    }
}
