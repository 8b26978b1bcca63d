use std::{sync::Arc, time::Duration};

use anyhow::Result;
use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::delivery::{deliver, ChatSender};
use crate::events::{ChatEnvelope, EventContext, EventDispatcher, HandlerResult};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("update fetch failed: {0}")]
    Receive(String),
    #[error("update payload could not be decoded: {0}")]
    Decode(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self { max_retries: 5, base_delay_ms: 250, max_delay_ms: 5_000 }
    }
}

impl ReconnectPolicy {
    /// Never gives up; backs off to `max_delay_ms` between attempts.
    pub fn persistent(base_delay_ms: u64, max_delay_ms: u64) -> Self {
        Self { max_retries: u32::MAX, base_delay_ms, max_delay_ms }
    }

    fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.min(16);
        let multiplier = 1_u64 << exponent;
        let delay_ms = self.base_delay_ms.saturating_mul(multiplier).min(self.max_delay_ms);
        Duration::from_millis(delay_ms)
    }
}

/// Inbound half of the chat platform: long-polls for update batches.
#[async_trait]
pub trait UpdateTransport: Send + Sync {
    /// `offset` is one past the last processed update id. `Ok(None)` ends the stream.
    async fn next_batch(
        &self,
        offset: Option<i64>,
    ) -> Result<Option<Vec<ChatEnvelope>>, TransportError>;
}

pub struct UpdatePollingRunner {
    transport: Arc<dyn UpdateTransport>,
    dispatcher: EventDispatcher,
    sender: Arc<dyn ChatSender>,
    reconnect_policy: ReconnectPolicy,
}

impl UpdatePollingRunner {
    pub fn new(
        transport: Arc<dyn UpdateTransport>,
        dispatcher: EventDispatcher,
        sender: Arc<dyn ChatSender>,
        reconnect_policy: ReconnectPolicy,
    ) -> Self {
        Self { transport, dispatcher, sender, reconnect_policy }
    }

    pub async fn start(&self) -> Result<()> {
        let mut offset = None;
        let mut consecutive_failures = 0_u32;

        info!(event_name = "chat.polling.started", "update polling started");

        loop {
            match self.transport.next_batch(offset).await {
                Ok(None) => {
                    info!(event_name = "chat.polling.closed", "update stream closed");
                    return Ok(());
                }
                Ok(Some(batch)) => {
                    consecutive_failures = 0;
                    for envelope in batch {
                        offset = Some(envelope.update_id + 1);
                        self.process(&envelope).await;
                    }
                }
                Err(transport_error) => {
                    warn!(
                        event_name = "chat.polling.fetch_failed",
                        attempt = consecutive_failures,
                        max_retries = self.reconnect_policy.max_retries,
                        error = %transport_error,
                        "update fetch failed"
                    );

                    if consecutive_failures >= self.reconnect_policy.max_retries {
                        warn!(
                            max_retries = self.reconnect_policy.max_retries,
                            "update polling retries exhausted; stopping runner without crash"
                        );
                        return Ok(());
                    }

                    let delay = self.reconnect_policy.backoff(consecutive_failures);
                    consecutive_failures = consecutive_failures.saturating_add(1);
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }
    }

    async fn process(&self, envelope: &ChatEnvelope) {
        let correlation_id = format!("update-{}", envelope.update_id);
        let chat_id = envelope.event.chat_id();

        debug!(
            event_name = "chat.update.received",
            update_id = envelope.update_id,
            event_type = ?envelope.event.event_type(),
            correlation_id = %correlation_id,
            "received chat update"
        );

        let context = EventContext { correlation_id: correlation_id.clone() };
        let result = match self.dispatcher.dispatch(envelope, &context).await {
            Ok(result) => result,
            Err(error) => {
                warn!(
                    event_name = "chat.update.dispatch_failed",
                    update_id = envelope.update_id,
                    correlation_id = %correlation_id,
                    error = %error,
                    "event dispatch failed; continuing polling loop"
                );
                return;
            }
        };

        let (HandlerResult::Responded(reply), Some(chat_id)) = (result, chat_id) else {
            return;
        };

        if let Err(error) = deliver(self.sender.as_ref(), chat_id, &reply).await {
            warn!(
                event_name = "chat.reply.failed",
                update_id = envelope.update_id,
                chat_id = %chat_id,
                correlation_id = %correlation_id,
                error = %error,
                "failed to deliver reply"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Arc;

    use async_trait::async_trait;
    use tokio::sync::Mutex;

    use tagwatch_core::domain::repository::RepositoryName;
    use tagwatch_core::domain::subscription::ChatId;

    use super::{ReconnectPolicy, TransportError, UpdatePollingRunner, UpdateTransport};
    use crate::blocks::{self, MessageTemplate};
    use crate::commands::{
        AddRepoRequest, CommandEnvelope, CommandRouteError, IncomingMessage, WatchCommandService,
    };
    use crate::delivery::testing::{RecordingSender, SentItem};
    use crate::events::{ChatEnvelope, ChatEvent, CommandHandler, EventDispatcher};

    #[derive(Default)]
    struct ScriptedTransport {
        state: Mutex<ScriptedState>,
    }

    #[derive(Default)]
    struct ScriptedState {
        batches: VecDeque<Result<Option<Vec<ChatEnvelope>>, TransportError>>,
        offsets: Vec<Option<i64>>,
    }

    impl ScriptedTransport {
        fn with_script(batches: Vec<Result<Option<Vec<ChatEnvelope>>, TransportError>>) -> Self {
            Self {
                state: Mutex::new(ScriptedState { batches: batches.into(), offsets: Vec::new() }),
            }
        }

        async fn offsets(&self) -> Vec<Option<i64>> {
            self.state.lock().await.offsets.clone()
        }
    }

    #[async_trait]
    impl UpdateTransport for ScriptedTransport {
        async fn next_batch(
            &self,
            offset: Option<i64>,
        ) -> Result<Option<Vec<ChatEnvelope>>, TransportError> {
            let mut state = self.state.lock().await;
            state.offsets.push(offset);
            state.batches.pop_front().unwrap_or(Ok(None))
        }
    }

    struct HelpOnly;

    #[async_trait]
    impl WatchCommandService for HelpOnly {
        async fn add_repository(
            &self,
            _request: AddRepoRequest,
            _envelope: &CommandEnvelope,
        ) -> Result<MessageTemplate, CommandRouteError> {
            Err(CommandRouteError::Service("not wired".into()))
        }

        async fn list_repositories(
            &self,
            _envelope: &CommandEnvelope,
        ) -> Result<MessageTemplate, CommandRouteError> {
            Ok(blocks::subscription_list_message(&[]))
        }

        async fn remove_repository(
            &self,
            repository: RepositoryName,
            _envelope: &CommandEnvelope,
        ) -> Result<MessageTemplate, CommandRouteError> {
            Ok(blocks::subscription_removed_message(&repository, false))
        }
    }

    fn command(update_id: i64, text: &str) -> ChatEnvelope {
        ChatEnvelope {
            update_id,
            event: ChatEvent::Message(IncomingMessage {
                chat_id: ChatId(8),
                message_id: update_id,
                user_id: None,
                text: text.to_owned(),
            }),
        }
    }

    fn runner(
        transport: Arc<ScriptedTransport>,
        sender: Arc<RecordingSender>,
        max_retries: u32,
    ) -> UpdatePollingRunner {
        let mut dispatcher = EventDispatcher::new();
        dispatcher.register(CommandHandler::new(HelpOnly));
        UpdatePollingRunner::new(
            transport,
            dispatcher,
            sender,
            ReconnectPolicy { max_retries, base_delay_ms: 0, max_delay_ms: 0 },
        )
    }

    #[tokio::test]
    async fn replies_to_commands_and_advances_offset() {
        let transport = Arc::new(ScriptedTransport::with_script(vec![
            Ok(Some(vec![command(10, "/help"), command(11, "just chatting")])),
            Ok(Some(vec![command(12, "/listrepos")])),
            Ok(None),
        ]));
        let sender = Arc::new(RecordingSender::default());

        runner(transport.clone(), sender.clone(), 2).start().await.expect("runner");

        assert_eq!(transport.offsets().await, vec![None, Some(12), Some(13)]);
        let replies = sender.items().await;
        assert_eq!(replies.len(), 2, "plain chatter gets no reply");
        assert!(matches!(&replies[0], SentItem::Message { chat_id: ChatId(8), .. }));
    }

    #[tokio::test]
    async fn recovers_after_fetch_failure() {
        let transport = Arc::new(ScriptedTransport::with_script(vec![
            Err(TransportError::Receive("network down".to_owned())),
            Ok(Some(vec![command(1, "/start")])),
            Ok(None),
        ]));
        let sender = Arc::new(RecordingSender::default());

        runner(transport.clone(), sender.clone(), 2).start().await.expect("runner");

        assert_eq!(transport.offsets().await.len(), 3);
        assert_eq!(sender.items().await.len(), 1);
    }

    #[tokio::test]
    async fn exhausts_retries_without_crashing() {
        let transport = Arc::new(ScriptedTransport::with_script(vec![
            Err(TransportError::Receive("fail-1".to_owned())),
            Err(TransportError::Receive("fail-2".to_owned())),
            Err(TransportError::Receive("fail-3".to_owned())),
        ]));
        let sender = Arc::new(RecordingSender::default());

        runner(transport.clone(), sender, 2).start().await.expect("runner should degrade gracefully");
        assert_eq!(transport.offsets().await.len(), 3);
    }

    #[tokio::test]
    async fn failing_command_service_does_not_stop_polling() {
        let transport = Arc::new(ScriptedTransport::with_script(vec![
            Ok(Some(vec![command(1, "/addrepo nginx org/web https://git.example.org t")])),
            Ok(Some(vec![command(2, "/help")])),
            Ok(None),
        ]));
        let sender = Arc::new(RecordingSender::default());

        runner(transport.clone(), sender.clone(), 0).start().await.expect("runner");
        assert_eq!(sender.items().await.len(), 1);
    }

    #[test]
    fn backoff_is_capped() {
        let policy = ReconnectPolicy { max_retries: 3, base_delay_ms: 100, max_delay_ms: 1_000 };
        assert_eq!(policy.backoff(0).as_millis(), 100);
        assert_eq!(policy.backoff(2).as_millis(), 400);
        assert_eq!(policy.backoff(10).as_millis(), 1_000);
    }
}
