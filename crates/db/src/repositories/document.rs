//! On-disk shape of the subscription store.
//!
//! ```json
//! { "<chat id>": { "<namespace/name>": {
//!     "last_seen_tags": ["1.0"], "local_repo_path": "org/app",
//!     "service_base_url": "https://git.example.org/api/v1/repos/", "api_token": "..." } } }
//! ```

use std::collections::BTreeMap;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::warn;

use tagwatch_core::domain::repository::RepositoryName;
use tagwatch_core::domain::subscription::{
    unique_names, ChatId, DeployTarget, Subscription, SubscriptionKey,
};

pub type StoreDocument = BTreeMap<String, BTreeMap<String, StoredSubscription>>;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredSubscription {
    #[serde(default)]
    pub last_seen_tags: Vec<String>,
    #[serde(default)]
    pub local_repo_path: Option<String>,
    #[serde(default)]
    pub service_base_url: Option<String>,
    #[serde(default)]
    pub api_token: Option<String>,
}

impl From<&Subscription> for StoredSubscription {
    fn from(subscription: &Subscription) -> Self {
        Self {
            last_seen_tags: subscription.last_seen_tags.clone(),
            local_repo_path: subscription.deploy.local_repo_path.clone(),
            service_base_url: subscription.deploy.service_base_url.clone(),
            api_token: subscription
                .deploy
                .api_token
                .as_ref()
                .map(|token| token.expose_secret().to_owned()),
        }
    }
}

impl StoredSubscription {
    fn into_subscription(self, key: SubscriptionKey) -> Subscription {
        Subscription {
            key,
            last_seen_tags: unique_names(self.last_seen_tags),
            deploy: DeployTarget {
                local_repo_path: self.local_repo_path,
                service_base_url: self.service_base_url,
                api_token: self.api_token.map(SecretString::from),
            },
        }
    }
}

/// Entries with an unparseable chat id or repository name are skipped with a warning.
/// Repository keys are normalized, so hand-edited `nginx` becomes `library/nginx`.
pub fn decode(document: StoreDocument) -> BTreeMap<SubscriptionKey, Subscription> {
    let mut subscriptions = BTreeMap::new();

    for (chat_key, repositories) in document {
        let Ok(chat_id) = chat_key.parse::<ChatId>() else {
            warn!(
                event_name = "storage.document.invalid_chat_id",
                chat_key = %chat_key,
                "skipping stored entry with a non-numeric chat id"
            );
            continue;
        };

        for (repository_key, stored) in repositories {
            let repository = match RepositoryName::parse(&repository_key) {
                Ok(repository) => repository,
                Err(error) => {
                    warn!(
                        event_name = "storage.document.invalid_repository",
                        chat_id = %chat_id,
                        repository_key = %repository_key,
                        error = %error,
                        "skipping stored entry with an invalid repository name"
                    );
                    continue;
                }
            };

            let key = SubscriptionKey::new(chat_id, repository);
            subscriptions.insert(key.clone(), stored.into_subscription(key));
        }
    }

    subscriptions
}

/// `(chat key, repository key)` pairs in `document` that decode to `key`,
/// including hand-edited spellings such as `nginx` for `library/nginx`.
fn matching_entries(document: &StoreDocument, key: &SubscriptionKey) -> Vec<(String, String)> {
    document
        .iter()
        .filter(|(chat_key, _)| chat_key.parse::<ChatId>().ok() == Some(key.chat_id))
        .flat_map(|(chat_key, repositories)| {
            repositories
                .keys()
                .filter(|repository_key| {
                    RepositoryName::parse(repository_key).ok().as_ref() == Some(&key.repository)
                })
                .map(move |repository_key| (chat_key.clone(), repository_key.clone()))
        })
        .collect()
}

fn take_entries(document: &mut StoreDocument, key: &SubscriptionKey) -> Vec<StoredSubscription> {
    let mut taken = Vec::new();
    for (chat_key, repository_key) in matching_entries(document, key) {
        if let Some(repositories) = document.get_mut(&chat_key) {
            taken.extend(repositories.remove(&repository_key));
            if repositories.is_empty() {
                document.remove(&chat_key);
            }
        }
    }
    taken
}

/// Writes `subscription` under its canonical keys. Entries this module cannot
/// decode are left in place.
pub fn upsert(document: &mut StoreDocument, subscription: &Subscription) {
    take_entries(document, &subscription.key);
    document
        .entry(subscription.key.chat_id.to_string())
        .or_default()
        .insert(subscription.key.repository.to_string(), StoredSubscription::from(subscription));
}

/// Returns `false` when no entry decodes to `key`.
pub fn remove_entry(document: &mut StoreDocument, key: &SubscriptionKey) -> bool {
    !take_entries(document, key).is_empty()
}

/// Returns `false` when no entry decodes to `key`.
pub fn replace_tags(
    document: &mut StoreDocument,
    key: &SubscriptionKey,
    tag_names: Vec<String>,
) -> bool {
    let Some(stored) = take_entries(document, key).into_iter().next() else {
        return false;
    };
    let mut subscription = stored.into_subscription(key.clone());
    subscription.last_seen_tags = unique_names(tag_names);
    upsert(document, &subscription);
    true
}
