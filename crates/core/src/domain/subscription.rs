use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::domain::repository::RepositoryName;
use crate::errors::DeployError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChatId(pub i64);

impl fmt::Display for ChatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ChatId {
    type Err = std::num::ParseIntError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        value.trim().parse::<i64>().map(Self)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionKey {
    pub chat_id: ChatId,
    pub repository: RepositoryName,
}

impl SubscriptionKey {
    pub fn new(chat_id: ChatId, repository: RepositoryName) -> Self {
        Self { chat_id, repository }
    }
}

impl fmt::Display for SubscriptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.chat_id, self.repository)
    }
}

/// Where a deploy button press is forwarded to.
#[derive(Clone, Debug, Default)]
pub struct DeployTarget {
    pub local_repo_path: Option<String>,
    pub service_base_url: Option<String>,
    pub api_token: Option<SecretString>,
}

/// Fully resolved webhook coordinates for one deploy request.
#[derive(Clone, Debug)]
pub struct DeployEndpoint {
    pub url: String,
    pub local_repo_path: String,
    pub api_token: SecretString,
}

impl DeployTarget {
    pub fn new(
        local_repo_path: impl Into<String>,
        service_base_url: impl Into<String>,
        api_token: impl Into<String>,
    ) -> Self {
        Self {
            local_repo_path: Some(local_repo_path.into()),
            service_base_url: Some(service_base_url.into()),
            api_token: Some(SecretString::from(api_token.into())),
        }
    }

    pub fn has_token(&self) -> bool {
        self.api_token.as_ref().is_some_and(|token| !token.expose_secret().trim().is_empty())
    }

    /// Fails with [`DeployError::IncompleteConfiguration`] when any field is absent or blank.
    pub fn resolve(&self, repository: &RepositoryName) -> Result<DeployEndpoint, DeployError> {
        let incomplete = || DeployError::IncompleteConfiguration { repository: repository.clone() };

        let path = self.local_repo_path.as_deref().map(str::trim).filter(|v| !v.is_empty());
        let base_url = self.service_base_url.as_deref().map(str::trim).filter(|v| !v.is_empty());
        let (Some(path), Some(base_url)) = (path, base_url) else {
            return Err(incomplete());
        };
        if !self.has_token() {
            return Err(incomplete());
        }
        let api_token = self.api_token.clone().ok_or_else(incomplete)?;

        Ok(DeployEndpoint {
            url: format!("{base_url}{path}/tags"),
            local_repo_path: path.to_owned(),
            api_token,
        })
    }
}

#[derive(Clone, Debug)]
pub struct Subscription {
    pub key: SubscriptionKey,
    /// Tag names seen by the last check cycle; order follows the registry, names are unique.
    pub last_seen_tags: Vec<String>,
    pub deploy: DeployTarget,
}

impl Subscription {
    pub fn new(key: SubscriptionKey, initial_tags: Vec<String>, deploy: DeployTarget) -> Self {
        Self { key, last_seen_tags: unique_names(initial_tags), deploy }
    }

    pub fn repository(&self) -> &RepositoryName {
        &self.key.repository
    }

    /// True when `names` describes the same set as the stored last-seen tags.
    pub fn has_same_tags(&self, names: &[String]) -> bool {
        let stored: HashSet<&str> = self.last_seen_tags.iter().map(String::as_str).collect();
        let current: HashSet<&str> = names.iter().map(String::as_str).collect();
        stored == current
    }
}

/// Drops repeated names, keeping the first occurrence.
pub fn unique_names(names: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::with_capacity(names.len());
    names.into_iter().filter(|name| seen.insert(name.clone())).collect()
}
