use std::fmt;

use crate::domain::repository::RepositoryName;
use crate::errors::DomainError;

/// Chat platforms cap button payloads at 64 bytes.
pub const ACTION_TOKEN_MAX_BYTES: usize = 64;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ActionKind {
    Deploy,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Deploy => "deploy",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "deploy" => Some(Self::Deploy),
            _ => None,
        }
    }
}

/// Opaque button payload `<kind>:<repository>:<tag>`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ActionToken {
    pub kind: ActionKind,
    pub repository: RepositoryName,
    pub tag_name: String,
}

impl ActionToken {
    pub fn deploy(repository: RepositoryName, tag_name: impl Into<String>) -> Self {
        Self { kind: ActionKind::Deploy, repository, tag_name: tag_name.into() }
    }

    pub fn encode(&self) -> String {
        format!("{}:{}:{}", self.kind.as_str(), self.repository, self.tag_name)
    }

    /// Encoded size in bytes, computed without allocating.
    pub fn encoded_len(kind: ActionKind, repository: &RepositoryName, tag_name: &str) -> usize {
        kind.as_str().len() + 1 + repository.as_str().len() + 1 + tag_name.len()
    }

    pub fn parse(value: &str) -> Result<Self, DomainError> {
        let invalid = || DomainError::InvalidActionToken(value.to_owned());

        let mut parts = value.splitn(3, ':');
        let (Some(kind), Some(repository), Some(tag_name)) =
            (parts.next(), parts.next(), parts.next())
        else {
            return Err(invalid());
        };

        let kind = ActionKind::parse(kind).ok_or_else(invalid)?;
        let repository = RepositoryName::parse(repository).map_err(|_| invalid())?;
        if tag_name.trim().is_empty() {
            return Err(invalid());
        }

        Ok(Self { kind, repository, tag_name: tag_name.to_owned() })
    }

    /// Leading segment of a raw payload, used to name unknown actions back to the user.
    pub fn raw_kind(value: &str) -> &str {
        value.split(':').next().unwrap_or_default()
    }
}

impl fmt::Display for ActionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}
