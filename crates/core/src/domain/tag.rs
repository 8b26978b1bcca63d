use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub name: String,
    #[serde(default)]
    pub last_updated: Option<DateTime<Utc>>,
}

impl Tag {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), last_updated: None }
    }

    pub fn updated_at(mut self, last_updated: DateTime<Utc>) -> Self {
        self.last_updated = Some(last_updated);
        self
    }

    /// Human-readable timestamp, `N/A` when the registry did not report one.
    pub fn last_updated_label(&self) -> String {
        self.last_updated
            .map(|timestamp| timestamp.format("%Y-%m-%d %H:%M:%S UTC").to_string())
            .unwrap_or_else(|| "N/A".to_owned())
    }
}
