//! Tag delta computation and the deployable filter.
//!
//! A check cycle compares the tag names stored for a subscription (`P`) with
//! the tags just fetched from the registry (`C`). New tags are `C - P` by name.
//! Each new tag is either deployable (gets a button) or informational (listed
//! as text only). The stored set is then replaced by `C` as a whole.

pub mod action;

use std::collections::HashSet;

use async_trait::async_trait;

use crate::domain::repository::RepositoryName;
use crate::domain::subscription::unique_names;
use crate::domain::tag::Tag;
use crate::errors::RegistryError;

use self::action::{ActionKind, ActionToken, ACTION_TOKEN_MAX_BYTES};

pub const SIGNATURE_SUFFIX: &str = ".sig";
pub const DIGEST_PREFIX: &str = "sha256-";

/// Source of the current tag list for a repository (first page only).
#[async_trait]
pub trait TagSource: Send + Sync {
    async fn fetch_tags(&self, repository: &RepositoryName) -> Result<Vec<Tag>, RegistryError>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Exclusion {
    Signature,
    Digest,
    TokenTooLong { bytes: usize },
}

impl Exclusion {
    pub fn describe(&self) -> String {
        match self {
            Self::Signature => format!("signature artifact (`{SIGNATURE_SUFFIX}`)"),
            Self::Digest => format!("digest reference (`{DIGEST_PREFIX}`)"),
            Self::TokenTooLong { bytes } => {
                format!("action payload {bytes} bytes exceeds {ACTION_TOKEN_MAX_BYTES}")
            }
        }
    }
}

pub fn exclusion_for(repository: &RepositoryName, tag_name: &str) -> Option<Exclusion> {
    if tag_name.ends_with(SIGNATURE_SUFFIX) {
        return Some(Exclusion::Signature);
    }
    if tag_name.starts_with(DIGEST_PREFIX) {
        return Some(Exclusion::Digest);
    }

    let bytes = ActionToken::encoded_len(ActionKind::Deploy, repository, tag_name);
    if bytes > ACTION_TOKEN_MAX_BYTES {
        return Some(Exclusion::TokenTooLong { bytes });
    }

    None
}

pub fn is_deployable(repository: &RepositoryName, tag_name: &str) -> bool {
    exclusion_for(repository, tag_name).is_none()
}

/// Tags in `current` whose name is absent from `previous`, in `current` order, unique by name.
pub fn compute_delta<'a>(previous: &[String], current: &'a [Tag]) -> Vec<&'a Tag> {
    let known: HashSet<&str> = previous.iter().map(String::as_str).collect();
    let mut emitted = HashSet::new();

    current
        .iter()
        .filter(|tag| !known.contains(tag.name.as_str()))
        .filter(|tag| emitted.insert(tag.name.as_str()))
        .collect()
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExcludedTag {
    pub tag: Tag,
    pub reason: Exclusion,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TagDelta {
    pub repository: RepositoryName,
    pub deployable: Vec<Tag>,
    pub informational: Vec<ExcludedTag>,
    /// Replacement for the stored last-seen set.
    pub current_names: Vec<String>,
}

impl TagDelta {
    pub fn evaluate(repository: &RepositoryName, previous: &[String], current: &[Tag]) -> Self {
        let mut deployable = Vec::new();
        let mut informational = Vec::new();

        for tag in compute_delta(previous, current) {
            match exclusion_for(repository, &tag.name) {
                Some(reason) => informational.push(ExcludedTag { tag: tag.clone(), reason }),
                None => deployable.push(tag.clone()),
            }
        }

        Self {
            repository: repository.clone(),
            deployable,
            informational,
            current_names: unique_names(current.iter().map(|tag| tag.name.clone()).collect()),
        }
    }

    pub fn has_new_tags(&self) -> bool {
        !self.deployable.is_empty() || !self.informational.is_empty()
    }

    pub fn new_tag_count(&self) -> usize {
        self.deployable.len() + self.informational.len()
    }

    pub fn deploy_token(&self, tag: &Tag) -> ActionToken {
        ActionToken::deploy(self.repository.clone(), tag.name.clone())
    }
}
