use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::repository::RepositoryName;
use crate::domain::subscription::DeployEndpoint;
use crate::errors::{DeployError, DomainError};

/// Lifecycle of one deploy notification.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeployState {
    Sent,
    Pressed,
    Requesting,
    Succeeded,
    Failed,
}

impl DeployState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sent => "sent",
            Self::Pressed => "pressed",
            Self::Requesting => "requesting",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
        }
    }

    pub fn can_transition_to(&self, next: DeployState) -> bool {
        matches!(
            (self, next),
            (Self::Sent, Self::Pressed)
                | (Self::Pressed, Self::Requesting)
                | (Self::Requesting, Self::Succeeded)
                | (Self::Requesting, Self::Failed)
        )
    }
}

/// One press of a deploy button, tracked through [`DeployState`].
///
/// A button pressed again after a terminal state starts a fresh run; the
/// downstream endpoint decides whether the repeat is harmless.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeployRun {
    pub repository: RepositoryName,
    pub tag_name: String,
    state: DeployState,
}

impl DeployRun {
    pub fn sent(repository: RepositoryName, tag_name: impl Into<String>) -> Self {
        Self { repository, tag_name: tag_name.into(), state: DeployState::Sent }
    }

    pub fn state(&self) -> DeployState {
        self.state
    }

    pub fn transition_to(&mut self, next: DeployState) -> Result<(), DomainError> {
        if self.state.can_transition_to(next) {
            self.state = next;
            return Ok(());
        }

        Err(DomainError::InvalidDeployTransition { from: self.state, to: next })
    }
}

#[derive(Clone, Debug)]
pub struct DeployRequest {
    pub endpoint: DeployEndpoint,
    pub tag_name: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeployOutcome {
    pub status_code: u16,
}

/// Outbound deployment webhook.
#[async_trait]
pub trait DeployTrigger: Send + Sync {
    async fn trigger(&self, request: &DeployRequest) -> Result<DeployOutcome, DeployError>;
}
