use std::fmt;

use serde::{Deserialize, Serialize};

use crate::errors::DomainError;

pub const DEFAULT_NAMESPACE: &str = "library";

/// Registry repository name in `namespace/name` form.
///
/// The only way to build one is [`RepositoryName::parse`], so every storage
/// key, registry URL and action token goes through the same normalization.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RepositoryName(String);

impl RepositoryName {
    /// Trims and lowercases `input`, prefixing bare names with `library/`.
    pub fn parse(input: &str) -> Result<Self, DomainError> {
        let normalized = input.trim().to_ascii_lowercase();
        if normalized.is_empty() {
            return Err(DomainError::InvalidRepositoryName(input.to_owned()));
        }

        let qualified = if normalized.contains('/') {
            normalized
        } else {
            format!("{DEFAULT_NAMESPACE}/{normalized}")
        };

        let mut segments = qualified.split('/');
        let (Some(namespace), Some(name), None) =
            (segments.next(), segments.next(), segments.next())
        else {
            return Err(DomainError::InvalidRepositoryName(input.to_owned()));
        };
        if namespace.is_empty() || name.is_empty() || qualified.contains(char::is_whitespace) {
            return Err(DomainError::InvalidRepositoryName(input.to_owned()));
        }

        Ok(Self(qualified))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn namespace(&self) -> &str {
        self.0.split_once('/').map(|(namespace, _)| namespace).unwrap_or_default()
    }

    pub fn name(&self) -> &str {
        self.0.split_once('/').map(|(_, name)| name).unwrap_or_default()
    }
}

impl fmt::Display for RepositoryName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for RepositoryName {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<RepositoryName> for String {
    fn from(value: RepositoryName) -> Self {
        value.0
    }
}
