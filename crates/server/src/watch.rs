//! Periodic check cycle: fetch, diff, notify, persist.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use tagwatch_chat::blocks;
use tagwatch_chat::delivery::{deliver, ChatSender};
use tagwatch_core::config::WatchConfig;
use tagwatch_core::watch::{TagDelta, TagSource};
use tagwatch_db::SubscriptionRepository;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct CycleReport {
    pub repositories_checked: usize,
    pub notifications_sent: usize,
    pub new_tags: usize,
    pub fetch_failures: usize,
    pub finished_at: Option<DateTime<Utc>>,
}

/// Last completed cycle, shared with the health endpoint.
#[derive(Clone, Default)]
pub struct CycleStatus {
    last: Arc<RwLock<Option<CycleReport>>>,
}

impl CycleStatus {
    pub async fn last(&self) -> Option<CycleReport> {
        self.last.read().await.clone()
    }

    async fn record(&self, report: CycleReport) {
        *self.last.write().await = Some(report);
    }
}

pub struct TagWatcher {
    store: Arc<dyn SubscriptionRepository>,
    tags: Arc<dyn TagSource>,
    sender: Arc<dyn ChatSender>,
    status: CycleStatus,
}

impl TagWatcher {
    pub fn new(
        store: Arc<dyn SubscriptionRepository>,
        tags: Arc<dyn TagSource>,
        sender: Arc<dyn ChatSender>,
        status: CycleStatus,
    ) -> Self {
        Self { store, tags, sender, status }
    }

    pub fn status(&self) -> CycleStatus {
        self.status.clone()
    }

    /// Runs one pass over every stored subscription. Per-repository failures
    /// are logged and skipped; the stored set is only rewritten when it changed.
    pub async fn run_cycle(&self) -> CycleReport {
        let mut report = CycleReport::default();

        let subscriptions = match self.store.list_all().await {
            Ok(subscriptions) => subscriptions,
            Err(error) => {
                error!(
                    event_name = "watch.cycle.load_failed",
                    error = %error,
                    "could not read subscriptions"
                );
                Vec::new()
            }
        };

        info!(
            event_name = "watch.cycle.started",
            subscriptions = subscriptions.len(),
            "check cycle started"
        );

        for subscription in subscriptions {
            let repository = subscription.repository();
            report.repositories_checked += 1;

            let current = match self.tags.fetch_tags(repository).await {
                Ok(current) => current,
                Err(error) => {
                    report.fetch_failures += 1;
                    warn!(
                        event_name = "watch.repository.fetch_failed",
                        chat_id = %subscription.key.chat_id,
                        repository = %repository,
                        not_found = error.is_not_found(),
                        error = %error,
                        "skipping repository for this cycle"
                    );
                    continue;
                }
            };

            let delta = TagDelta::evaluate(repository, &subscription.last_seen_tags, &current);
            if delta.has_new_tags() {
                report.new_tags += delta.new_tag_count();
                info!(
                    event_name = "watch.repository.new_tags",
                    chat_id = %subscription.key.chat_id,
                    repository = %repository,
                    deployable = delta.deployable.len(),
                    informational = delta.informational.len(),
                    "new tags found"
                );
                for excluded in &delta.informational {
                    debug!(
                        event_name = "watch.repository.tag_excluded",
                        repository = %repository,
                        tag = %excluded.tag.name,
                        reason = %excluded.reason.describe(),
                        "new tag listed without deploy button"
                    );
                }
                let message = blocks::new_tags_notification(&delta);
                if deliver(self.sender.as_ref(), subscription.key.chat_id, &message).await.is_ok() {
                    report.notifications_sent += 1;
                }
            }

            if !subscription.has_same_tags(&delta.current_names) {
                if let Err(error) =
                    self.store.replace_last_seen(&subscription.key, delta.current_names).await
                {
                    error!(
                        event_name = "watch.repository.save_failed",
                        repository = %repository,
                        error = %error,
                        "could not persist last-seen tags"
                    );
                }
            }
        }

        report.finished_at = Some(Utc::now());
        info!(
            event_name = "watch.cycle.completed",
            repositories_checked = report.repositories_checked,
            new_tags = report.new_tags,
            notifications_sent = report.notifications_sent,
            fetch_failures = report.fetch_failures,
            "check cycle completed"
        );
        self.status.record(report.clone()).await;
        report
    }

    /// First cycle after `first_run_delay_secs`, then every `interval_secs`.
    pub async fn run_forever(&self, config: &WatchConfig) {
        let start = Instant::now() + Duration::from_secs(config.first_run_delay_secs);
        let mut ticker = time::interval_at(start, Duration::from_secs(config.interval_secs));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            event_name = "watch.scheduler.started",
            interval_secs = config.interval_secs,
            first_run_delay_secs = config.first_run_delay_secs,
            "watch scheduler started"
        );

        loop {
            ticker.tick().await;
            self.run_cycle().await;
        }
    }
}
