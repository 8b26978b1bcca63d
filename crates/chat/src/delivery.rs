use async_trait::async_trait;
use thiserror::Error;
use tracing::{error, warn};

use tagwatch_core::domain::subscription::ChatId;

use crate::blocks::MessageTemplate;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SendError {
    /// The platform answered but refused the request (bad markup, blocked bot, ...).
    #[error("chat api rejected request: {description}")]
    Rejected { description: String },
    #[error("chat api transport failed: {0}")]
    Transport(String),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SentMessage {
    pub message_id: i64,
}

/// Outbound half of the chat platform.
#[async_trait]
pub trait ChatSender: Send + Sync {
    async fn send_message(
        &self,
        chat_id: ChatId,
        message: &MessageTemplate,
    ) -> Result<SentMessage, SendError>;

    async fn edit_message(
        &self,
        chat_id: ChatId,
        message_id: i64,
        message: &MessageTemplate,
    ) -> Result<(), SendError>;

    async fn answer_callback(&self, callback_id: &str) -> Result<(), SendError>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Rich(SentMessage),
    PlainFallback(SentMessage),
}

/// Sends `message` as-is, then once more as plain text if the rich send fails.
pub async fn deliver(
    sender: &dyn ChatSender,
    chat_id: ChatId,
    message: &MessageTemplate,
) -> Result<DeliveryOutcome, SendError> {
    let rich_error = match sender.send_message(chat_id, message).await {
        Ok(sent) => return Ok(DeliveryOutcome::Rich(sent)),
        Err(error) => error,
    };

    warn!(
        event_name = "chat.notification.fallback",
        chat_id = %chat_id,
        error = %rich_error,
        "rich message rejected; retrying as plain text"
    );

    match sender.send_message(chat_id, &message.plain_fallback()).await {
        Ok(sent) => Ok(DeliveryOutcome::PlainFallback(sent)),
        Err(fallback_error) => {
            error!(
                event_name = "chat.notification.failed",
                chat_id = %chat_id,
                error = %fallback_error,
                rich_error = %rich_error,
                "plain text fallback also failed"
            );
            Err(fallback_error)
        }
    }
}


#[cfg(test)]
mod tests {
    use tagwatch_core::domain::subscription::ChatId;

    use super::testing::{RecordingSender, SentItem};
    use super::{deliver, DeliveryOutcome};
    use crate::blocks::{self, ParseMode};

    #[tokio::test]
    async fn rich_send_is_used_when_accepted() {
        let sender = RecordingSender::default();
        let outcome = deliver(&sender, ChatId(1), &blocks::help_message()).await.expect("deliver");

        assert!(matches!(outcome, DeliveryOutcome::Rich(_)));
        assert_eq!(sender.items().await.len(), 1);
    }

    #[tokio::test]
    async fn rejected_rich_send_falls_back_to_plain_text_once() {
        let sender = RecordingSender::failing_first(1);
        let outcome = deliver(&sender, ChatId(1), &blocks::help_message()).await.expect("deliver");

        assert!(matches!(outcome, DeliveryOutcome::PlainFallback(_)));
        let items = sender.items().await;
        assert_eq!(items.len(), 2);
        let SentItem::Message { message, .. } = &items[1] else {
            panic!("expected a second send");
        };
        assert_eq!(message.parse_mode, ParseMode::Plain);
    }

    #[tokio::test]
    async fn gives_up_after_fallback_failure() {
        let sender = RecordingSender::failing_first(3);
        assert!(deliver(&sender, ChatId(1), &blocks::help_message()).await.is_err());
        assert_eq!(sender.items().await.len(), 2);
    }
}
