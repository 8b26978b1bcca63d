//! Deployment webhook client (Gitea-style "create tag" endpoint).

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{ACCEPT, AUTHORIZATION};
use reqwest::Client;
use secrecy::ExposeSecret;
use serde::Serialize;
use tracing::{info, warn};

use tagwatch_core::config::DeployConfig;
use tagwatch_core::domain::deploy::{DeployOutcome, DeployRequest, DeployTrigger};
use tagwatch_core::errors::DeployError;

#[derive(Debug, Serialize)]
struct CreateTagBody<'a> {
    tag_name: &'a str,
}

pub struct WebhookDeployTrigger {
    client: Client,
}

impl WebhookDeployTrigger {
    pub fn new(config: &DeployConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_else(|_| Client::new());
        Self { client }
    }
}

#[async_trait]
impl DeployTrigger for WebhookDeployTrigger {
    async fn trigger(&self, request: &DeployRequest) -> Result<DeployOutcome, DeployError> {
        let endpoint = &request.endpoint;

        let response = self
            .client
            .post(&endpoint.url)
            .header(AUTHORIZATION, format!("token {}", endpoint.api_token.expose_secret()))
            .header(ACCEPT, "application/json")
            .json(&CreateTagBody { tag_name: &request.tag_name })
            .send()
            .await
            .map_err(|error| {
                warn!(
                    event_name = "deploy.request.failed",
                    url = %endpoint.url,
                    tag = %request.tag_name,
                    error = %error,
                    "deploy webhook unreachable"
                );
                DeployError::Transport(error.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            warn!(
                event_name = "deploy.request.failed",
                url = %endpoint.url,
                tag = %request.tag_name,
                status = status.as_u16(),
                "deploy webhook rejected request"
            );
            return Err(DeployError::Status {
                status: status.as_u16(),
                reason: status.canonical_reason().unwrap_or("Unknown").to_owned(),
            });
        }

        info!(
            event_name = "deploy.request.succeeded",
            url = %endpoint.url,
            tag = %request.tag_name,
            status = status.as_u16(),
            "deploy webhook accepted request"
        );
        Ok(DeployOutcome { status_code: status.as_u16() })
    }
}
