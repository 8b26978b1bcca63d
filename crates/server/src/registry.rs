//! Docker Hub style tag listing client.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::{debug, warn};

use tagwatch_core::config::RegistryConfig;
use tagwatch_core::domain::repository::RepositoryName;
use tagwatch_core::domain::tag::Tag;
use tagwatch_core::errors::RegistryError;
use tagwatch_core::watch::TagSource;

#[derive(Debug, Deserialize)]
struct TagListResponse {
    results: Option<Vec<TagEntry>>,
}

#[derive(Debug, Deserialize)]
struct TagEntry {
    name: String,
    #[serde(default)]
    last_updated: Option<String>,
}

impl TagEntry {
    fn into_tag(self) -> Tag {
        let last_updated = self
            .last_updated
            .as_deref()
            .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
            .map(|timestamp| timestamp.with_timezone(&Utc));
        Tag { name: self.name, last_updated }
    }
}

pub struct RegistryClient {
    client: Client,
    base_url: String,
    page_size: u32,
}

impl RegistryClient {
    pub fn new(config: &RegistryConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_owned(),
            page_size: config.page_size,
        }
    }

    fn tags_url(&self, repository: &RepositoryName) -> String {
        format!(
            "{}/v2/repositories/{}/{}/tags",
            self.base_url,
            repository.namespace(),
            repository.name()
        )
    }
}

#[async_trait]
impl TagSource for RegistryClient {
    async fn fetch_tags(&self, repository: &RepositoryName) -> Result<Vec<Tag>, RegistryError> {
        let transient = |message: String| RegistryError::Transient {
            repository: repository.clone(),
            message,
        };

        let url = self.tags_url(repository);
        let response = self
            .client
            .get(&url)
            .query(&[("page_size", self.page_size)])
            .send()
            .await
            .map_err(|error| transient(error.to_string()))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(RegistryError::NotFound { repository: repository.clone() });
        }
        if !status.is_success() {
            return Err(transient(format!("registry responded with {status}")));
        }

        let payload: TagListResponse =
            response.json().await.map_err(|error| transient(error.to_string()))?;

        let Some(results) = payload.results else {
            warn!(
                event_name = "registry.tags.missing_results",
                repository = %repository,
                "registry response had no `results`; treating as empty"
            );
            return Ok(Vec::new());
        };

        debug!(
            event_name = "registry.tags.fetched",
            repository = %repository,
            tag_count = results.len(),
            "fetched tag page"
        );
        Ok(results.into_iter().map(TagEntry::into_tag).collect())
    }
}
